use anyhow::Context;
use std::{net::SocketAddr, sync::Arc};
use tokio::net::TcpListener;
use tracing::{error, info, warn};

use cutmate::{
    create_app, init_observability,
    observability::{BusinessTracingMiddleware, DatabaseTracingMiddleware},
    repositories::{
        DynamoDbOrderRepository, DynamoDbQuizRepository, DynamoDbStoreRepository,
        DynamoDbUserRepository, TableManager,
    },
    services::{
        AuthService, AuthSettings, ChatCompletionClient, EventEmitter, FeedbackGenerator, Mailer,
        NotificationService, OrderService, QuizService, SmtpMailer, StoreDirectory,
    },
    shutdown_observability, AdminState, ApiState, Config, Metrics, RequestLimits,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load configuration first (basic logging only)
    let config = Config::from_environment()
        .await
        .context("failed to load configuration")?;

    init_observability(&config.observability).context("failed to initialize observability")?;

    info!(
        "Starting {} v{}",
        config.observability.service_name, config.observability.service_version
    );
    info!("Region: {}", config.aws.region);

    let metrics = Arc::new(Metrics::new().context("failed to register metrics")?);

    let dynamodb_client = Arc::new(config.aws.dynamodb_client.clone());
    let tables = config.database.table_names();
    let region = config.database.region.clone();
    info!("DynamoDB tables: {:?}", tables);

    let table_manager = Arc::new(TableManager::new(dynamodb_client.clone()));
    if config.database.auto_create_tables {
        let created = table_manager
            .create_all_tables(&tables)
            .await
            .context("failed to create DynamoDB tables")?;
        info!("Tables ready: {:?}", created);
    }

    // Repositories
    let users = Arc::new(DynamoDbUserRepository::new(
        dynamodb_client.clone(),
        tables.users.clone(),
        region.clone(),
    ));
    let stores = Arc::new(DynamoDbStoreRepository::new(
        dynamodb_client.clone(),
        tables.stores.clone(),
        region.clone(),
    ));
    let orders = Arc::new(DynamoDbOrderRepository::new(
        dynamodb_client.clone(),
        tables.orders.clone(),
        region.clone(),
    ));
    let quizzes = Arc::new(DynamoDbQuizRepository::new(
        dynamodb_client.clone(),
        tables.quizzes.clone(),
        tables.questions.clone(),
        region,
    ));

    // Outbound channels: email and EventBridge are both optional
    let mailer: Option<Arc<dyn Mailer>> = if config.email.email_enabled {
        match SmtpMailer::new(config.email.smtp_settings()) {
            Ok(mailer) => {
                info!("SMTP mailer initialized for {}", config.email.smtp_host);
                Some(Arc::new(mailer))
            }
            Err(e) => {
                warn!("Failed to initialize SMTP mailer: {}, continuing without email", e);
                None
            }
        }
    } else {
        info!("Email notifications disabled");
        None
    };

    let mut notifier = NotificationService::new(mailer, config.email.email_retry_attempts)
        .with_metrics(metrics.clone());

    if config.events.events_enabled {
        match EventEmitter::new(
            config.aws.eventbridge_client.clone(),
            config.events.event_config(),
        ) {
            Ok(emitter) => {
                info!(
                    "Events bus_name={}, source_name={}",
                    config.events.event_bus_name, config.events.event_source_name
                );
                notifier = notifier.with_event_emitter(Arc::new(emitter));
            }
            Err(e) => warn!(
                "Failed to initialize event emitter: {}, continuing without events",
                e
            ),
        }
    } else {
        info!("Event emission disabled");
    }

    let feedback: Option<Arc<dyn FeedbackGenerator>> = match config.feedback.chat_settings() {
        Some(settings) => match ChatCompletionClient::new(settings) {
            Ok(client) => Some(Arc::new(client)),
            Err(e) => {
                warn!("Quiz feedback unavailable: {}", e);
                None
            }
        },
        None => {
            warn!("No LLM API key configured, quiz feedback disabled");
            None
        }
    };

    // Services
    let auth = Arc::new(AuthService::new(
        users.clone(),
        AuthSettings {
            jwt_secret: config.auth.jwt_secret.clone(),
            token_ttl_hours: config.auth.token_ttl_hours,
        },
    ));

    if let Some((email, password)) = config.auth.bootstrap_admin() {
        let admin = auth
            .ensure_admin(&config.auth.admin_name, email, password)
            .await
            .context("failed to bootstrap admin account")?;
        info!(user_id = %admin.id, "Admin account ready");
    }

    let store_directory = Arc::new(StoreDirectory::new(stores.clone()));
    let order_service = Arc::new(OrderService::new(
        orders,
        stores,
        users,
        Arc::new(notifier),
    ));
    let quiz_service = Arc::new(QuizService::new(quizzes, feedback));
    info!("Services initialized successfully");

    let api_state = ApiState {
        auth: auth.clone(),
        stores: store_directory,
        orders: order_service,
        quizzes: quiz_service.clone(),
        business: Arc::new(BusinessTracingMiddleware::new(metrics.clone())),
    };
    let admin_state = AdminState {
        auth,
        quizzes: quiz_service,
        table_manager,
        tables,
        database: Arc::new(DatabaseTracingMiddleware::new(metrics.clone())),
    };

    let app = create_app(
        metrics,
        api_state,
        admin_state,
        RequestLimits {
            max_request_size: config.server.max_request_size,
            timeout: config.server.request_timeout(),
        },
    );

    let addr = SocketAddr::new(
        config
            .server
            .host
            .parse()
            .context("invalid server host")?,
        config.server.port,
    );
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    info!("Server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    info!("Server shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for CTRL+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("Shutdown signal received");
    shutdown_observability().await;
}

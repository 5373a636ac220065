#![allow(dead_code)]

pub mod memory;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};
use tokio::net::TcpListener;

use cutmate::models::{QuizAnswer, QuizCategory};
use cutmate::observability::{BusinessTracingMiddleware, DatabaseTracingMiddleware};
use cutmate::repositories::{TableManager, TableNames};
use cutmate::services::{
    AuthService, AuthSettings, FeedbackError, FeedbackGenerator, NotificationService,
    OrderService, QuizService, StoreDirectory,
};
use cutmate::{create_app, AdminState, ApiState, Metrics, RequestLimits};

use memory::{
    MemoryOrderRepository, MemoryQuizRepository, MemoryStoreRepository, MemoryUserRepository,
};

pub const ADMIN_EMAIL: &str = "admin@cutmate.test";
pub const ADMIN_PASSWORD: &str = "admin-password-1";

/// Feedback generator that answers instantly and counts its calls
#[derive(Default)]
pub struct CannedFeedback {
    pub calls: AtomicUsize,
}

#[async_trait]
impl FeedbackGenerator for CannedFeedback {
    async fn generate(
        &self,
        category: QuizCategory,
        answers: &[QuizAnswer],
    ) -> Result<String, FeedbackError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(format!(
            "{} advice #{} based on {} answers",
            category,
            call,
            answers.len()
        ))
    }
}

pub struct TestEnvironment {
    pub client: Client,
    pub base_url: String,
    pub feedback: Arc<CannedFeedback>,
}

impl TestEnvironment {
    /// Full application over in-memory repositories on an ephemeral port
    pub async fn new() -> Self {
        let metrics = Arc::new(Metrics::new().expect("metrics registry"));

        let users = Arc::new(MemoryUserRepository::default());
        let stores = Arc::new(MemoryStoreRepository::default());
        let orders = Arc::new(MemoryOrderRepository::default());
        let quizzes = Arc::new(MemoryQuizRepository::default());
        let feedback = Arc::new(CannedFeedback::default());

        let auth = Arc::new(AuthService::new(
            users.clone(),
            AuthSettings {
                jwt_secret: "integration-test-secret".to_string(),
                token_ttl_hours: 1,
            },
        ));
        auth.ensure_admin("Admin", ADMIN_EMAIL, ADMIN_PASSWORD)
            .await
            .expect("bootstrap admin");

        let quiz_service = Arc::new(QuizService::new(quizzes, Some(feedback.clone())));
        let order_service = Arc::new(OrderService::new(
            orders,
            stores.clone(),
            users,
            Arc::new(NotificationService::disabled()),
        ));

        let dynamodb_config = aws_sdk_dynamodb::Config::builder()
            .behavior_version(aws_sdk_dynamodb::config::BehaviorVersion::latest())
            .region(aws_sdk_dynamodb::config::Region::new("us-west-2"))
            .build();
        let table_manager = Arc::new(TableManager::new(Arc::new(
            aws_sdk_dynamodb::Client::from_conf(dynamodb_config),
        )));

        let api_state = ApiState {
            auth: auth.clone(),
            stores: Arc::new(StoreDirectory::new(stores)),
            orders: order_service,
            quizzes: quiz_service.clone(),
            business: Arc::new(BusinessTracingMiddleware::new(metrics.clone())),
        };
        let admin_state = AdminState {
            auth,
            quizzes: quiz_service,
            table_manager,
            tables: TableNames {
                users: "TestUsers".to_string(),
                stores: "TestStores".to_string(),
                orders: "TestOrders".to_string(),
                quizzes: "TestQuizzes".to_string(),
                questions: "TestQuestions".to_string(),
            },
            database: Arc::new(DatabaseTracingMiddleware::new(metrics.clone())),
        };

        let app = create_app(metrics, api_state, admin_state, RequestLimits::default());

        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind listener");
        let addr = listener.local_addr().expect("Failed to get local address");

        tokio::spawn(async move {
            axum::serve(listener, app)
                .await
                .expect("Failed to serve app");
        });

        Self {
            client: Client::new(),
            base_url: format!("http://{}", addr),
            feedback,
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, email: &str, password: &str) -> String {
        let response = self
            .client
            .post(self.url("/api/auth/login"))
            .json(&json!({ "email": email, "password": password }))
            .send()
            .await
            .expect("login request");
        assert_eq!(response.status().as_u16(), 200, "login failed for {}", email);

        let body: Value = response.json().await.expect("login body");
        body["access_token"]
            .as_str()
            .expect("access token")
            .to_string()
    }

    pub async fn admin_token(&self) -> String {
        self.login(ADMIN_EMAIL, ADMIN_PASSWORD).await
    }

    /// Register with the given role tag (1 customer, 2 supplier) and log in.
    /// Returns `(user_id, token)`.
    pub async fn register_user(&self, name: &str, email: &str, role: u8) -> (String, String) {
        let response = self
            .client
            .post(self.url("/api/auth/register"))
            .json(&json!({
                "name": name,
                "email": email,
                "password": "correct-horse-battery",
                "role": role,
            }))
            .send()
            .await
            .expect("register request");
        assert_eq!(response.status().as_u16(), 201, "register failed for {}", email);

        let user: Value = response.json().await.expect("register body");
        let token = self.login(email, "correct-horse-battery").await;
        (user["id"].as_str().expect("user id").to_string(), token)
    }

    /// Create a store with a haircut and a colour service. Returns the store JSON.
    pub async fn create_store(&self, token: &str, name: &str) -> Value {
        let response = self
            .client
            .post(self.url("/api/stores"))
            .bearer_auth(token)
            .json(&json!({
                "name": name,
                "address": "12 Market Street, Springfield",
                "description": "Walk-ins welcome",
                "services": [
                    { "name": "Haircut", "price": "25.00", "duration_minutes": 30 },
                    { "name": "Colour", "price": "60.50", "duration_minutes": 90 }
                ]
            }))
            .send()
            .await
            .expect("create store request");
        assert_eq!(response.status().as_u16(), 201);
        response.json().await.expect("store body")
    }
}

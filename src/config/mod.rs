use aws_config::BehaviorVersion;
use aws_sdk_dynamodb::Client as DynamoDbClient;
use aws_sdk_eventbridge::Client as EventBridgeClient;
use aws_sdk_ssm::Client as SsmClient;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use thiserror::Error;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::models::EventConfig;
use crate::repositories::TableNames;
use crate::services::{ChatCompletionSettings, SmtpSettings};

/// Prefix for every environment variable read by the service
pub const ENV_PREFIX: &str = "CUTMATE";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading error: {message}")]
    LoadError { message: String },

    #[error("Parameter not found: {name}")]
    ParameterNotFound { name: String },

    #[error("AWS SDK error: {source}")]
    AwsSdk {
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Validation error: {message}")]
    ValidationError { message: String },
}

#[derive(Debug, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub aws: AwsConfig,
    pub observability: ObservabilityConfig,
    pub auth: AuthConfig,
    pub email: EmailConfig,
    pub events: EventsConfig,
    pub feedback: FeedbackConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_timeout")]
    pub request_timeout_seconds: u64,
    #[serde(default = "default_max_request_size")]
    pub max_request_size: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_users_table")]
    pub users_table_name: String,
    #[serde(default = "default_stores_table")]
    pub stores_table_name: String,
    #[serde(default = "default_orders_table")]
    pub orders_table_name: String,
    #[serde(default = "default_quizzes_table")]
    pub quizzes_table_name: String,
    #[serde(default = "default_questions_table")]
    pub questions_table_name: String,
    #[serde(default = "default_region")]
    pub region: String,
    #[serde(default)]
    pub auto_create_tables: bool,
}

#[derive(Debug, Clone)]
pub struct AwsConfig {
    pub region: String,
    pub dynamodb_client: DynamoDbClient,
    pub eventbridge_client: EventBridgeClient,
    pub parameter_store: Arc<ParameterStoreConfig>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ObservabilityConfig {
    #[serde(default = "default_service_name")]
    pub service_name: String,
    #[serde(default = "default_service_version")]
    pub service_version: String,
    #[serde(default)]
    pub otlp_endpoint: Option<String>,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub enable_json_logging: bool,
}

#[derive(Clone, Deserialize)]
pub struct AuthConfig {
    #[serde(default)]
    pub jwt_secret: String,
    /// SSM parameter holding the signing secret; overrides `jwt_secret`
    #[serde(default)]
    pub jwt_secret_parameter: Option<String>,
    #[serde(default = "default_token_ttl_hours")]
    pub token_ttl_hours: u32,
    #[serde(default)]
    pub admin_email: Option<String>,
    #[serde(default)]
    pub admin_password: Option<String>,
    #[serde(default = "default_admin_name")]
    pub admin_name: String,
}

impl std::fmt::Debug for AuthConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthConfig")
            .field("jwt_secret", &"<redacted>")
            .field("jwt_secret_parameter", &self.jwt_secret_parameter)
            .field("token_ttl_hours", &self.token_ttl_hours)
            .field("admin_email", &self.admin_email)
            .finish()
    }
}

#[derive(Clone, Deserialize)]
pub struct EmailConfig {
    #[serde(default)]
    pub email_enabled: bool,
    #[serde(default = "default_smtp_host")]
    pub smtp_host: String,
    #[serde(default = "default_smtp_port")]
    pub smtp_port: u16,
    #[serde(default)]
    pub smtp_username: Option<String>,
    #[serde(default)]
    pub smtp_password: Option<String>,
    #[serde(default = "default_true")]
    pub smtp_use_tls: bool,
    #[serde(default = "default_from_address")]
    pub email_from_address: String,
    #[serde(default = "default_from_name")]
    pub email_from_name: String,
    #[serde(default = "default_retry_attempts")]
    pub email_retry_attempts: u32,
    #[serde(default = "default_smtp_timeout")]
    pub smtp_timeout_seconds: u64,
}

impl std::fmt::Debug for EmailConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmailConfig")
            .field("email_enabled", &self.email_enabled)
            .field("smtp_host", &self.smtp_host)
            .field("smtp_port", &self.smtp_port)
            .field("smtp_use_tls", &self.smtp_use_tls)
            .field("smtp_timeout_seconds", &self.smtp_timeout_seconds)
            .field("email_from_address", &self.email_from_address)
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct EventsConfig {
    #[serde(default)]
    pub events_enabled: bool,
    #[serde(default = "default_event_bus_name")]
    pub event_bus_name: String,
    #[serde(default = "default_event_source_name")]
    pub event_source_name: String,
    #[serde(default = "default_retry_attempts")]
    pub event_retry_attempts: u32,
    #[serde(default = "default_timeout")]
    pub event_timeout_seconds: u64,
}

#[derive(Clone, Deserialize)]
pub struct FeedbackConfig {
    #[serde(default = "default_llm_base_url")]
    pub llm_base_url: String,
    #[serde(default)]
    pub llm_api_key: Option<String>,
    /// SSM parameter holding the API key; overrides `llm_api_key`
    #[serde(default)]
    pub llm_api_key_parameter: Option<String>,
    #[serde(default = "default_llm_model")]
    pub llm_model: String,
    #[serde(default = "default_llm_temperature")]
    pub llm_temperature: f32,
    #[serde(default = "default_llm_max_tokens")]
    pub llm_max_tokens: u32,
    #[serde(default = "default_timeout")]
    pub llm_timeout_seconds: u64,
}

impl std::fmt::Debug for FeedbackConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeedbackConfig")
            .field("llm_base_url", &self.llm_base_url)
            .field("llm_api_key", &self.llm_api_key.as_ref().map(|_| "<redacted>"))
            .field("llm_model", &self.llm_model)
            .finish()
    }
}

/// SSM Parameter Store reader with a TTL cache
pub struct ParameterStoreConfig {
    ssm_client: SsmClient,
    cache: Arc<RwLock<HashMap<String, (String, Instant)>>>,
    cache_ttl: Duration,
}

impl std::fmt::Debug for ParameterStoreConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ParameterStoreConfig")
            .field("cache_ttl", &self.cache_ttl)
            .finish()
    }
}

impl Config {
    pub async fn from_environment() -> Result<Self, ConfigError> {
        info!("Loading configuration from environment and AWS Parameter Store");

        let server: ServerConfig = load_section("server", None)?;
        let database: DatabaseConfig = load_section("database", None)?;
        let observability: ObservabilityConfig = load_section("observability", None)?;
        let mut auth: AuthConfig = load_section("auth", None)?;
        let email: EmailConfig = load_section("email", None)?;
        let events: EventsConfig = load_section("events", None)?;
        let mut feedback: FeedbackConfig = load_section("feedback", None)?;

        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(database.region.clone()))
            .load()
            .await;

        let parameter_store = Arc::new(ParameterStoreConfig::new(
            SsmClient::new(&aws_config),
            Duration::from_secs(5 * 60),
        ));

        if let Some(name) = &auth.jwt_secret_parameter {
            auth.jwt_secret = parameter_store.get_parameter(name).await?;
            info!(parameter = %name, "JWT secret loaded from Parameter Store");
        }

        if let Some(name) = &feedback.llm_api_key_parameter {
            match parameter_store.get_parameter(name).await {
                Ok(key) => feedback.llm_api_key = Some(key),
                Err(e) => warn!(parameter = %name, error = %e, "LLM API key unavailable, quiz feedback disabled"),
            }
        }

        let aws = AwsConfig {
            region: database.region.clone(),
            dynamodb_client: DynamoDbClient::new(&aws_config),
            eventbridge_client: EventBridgeClient::new(&aws_config),
            parameter_store,
        };

        let config = Config {
            server,
            database,
            aws,
            observability,
            auth,
            email,
            events,
            feedback,
        };

        config.validate()?;

        info!("Configuration loaded successfully");
        debug!("Configuration: {:?}", config);

        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.server.validate()?;
        self.database.validate()?;
        self.auth.validate()?;
        Ok(())
    }
}

/// Deserialize one config section from `CUTMATE_*` variables. `vars`
/// replaces the process environment when given.
pub(crate) fn load_section<T: DeserializeOwned>(
    section: &str,
    vars: Option<config::Map<String, String>>,
) -> Result<T, ConfigError> {
    let settings = config::Config::builder()
        .add_source(config::Environment::with_prefix(ENV_PREFIX).source(vars))
        .build()
        .map_err(|e| ConfigError::LoadError {
            message: format!("Failed to load {} config: {}", section, e),
        })?;

    settings
        .try_deserialize()
        .map_err(|e| ConfigError::LoadError {
            message: format!("Failed to deserialize {} config: {}", section, e),
        })
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::ValidationError {
        message: message.to_string(),
    }
}

impl ServerConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(invalid("Server port cannot be 0"));
        }
        if self.request_timeout_seconds == 0 {
            return Err(invalid("Request timeout cannot be 0"));
        }
        Ok(())
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_seconds)
    }
}

impl DatabaseConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let tables = [
            ("Users", &self.users_table_name),
            ("Stores", &self.stores_table_name),
            ("Orders", &self.orders_table_name),
            ("Quizzes", &self.quizzes_table_name),
            ("Questions", &self.questions_table_name),
        ];
        for (label, name) in tables {
            if name.trim().is_empty() {
                return Err(ConfigError::ValidationError {
                    message: format!("{} table name cannot be empty", label),
                });
            }
        }
        Ok(())
    }

    pub fn table_names(&self) -> TableNames {
        TableNames {
            users: self.users_table_name.clone(),
            stores: self.stores_table_name.clone(),
            orders: self.orders_table_name.clone(),
            quizzes: self.quizzes_table_name.clone(),
            questions: self.questions_table_name.clone(),
        }
    }
}

impl AuthConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(invalid(
                "JWT secret cannot be empty; set CUTMATE_JWT_SECRET or CUTMATE_JWT_SECRET_PARAMETER",
            ));
        }
        if self.token_ttl_hours == 0 {
            return Err(invalid("Token TTL cannot be 0"));
        }
        Ok(())
    }

    /// Bootstrap admin credentials, when both are configured
    pub fn bootstrap_admin(&self) -> Option<(&str, &str)> {
        match (&self.admin_email, &self.admin_password) {
            (Some(email), Some(password)) => Some((email.as_str(), password.as_str())),
            _ => None,
        }
    }
}

impl EmailConfig {
    pub fn smtp_settings(&self) -> SmtpSettings {
        SmtpSettings {
            host: self.smtp_host.clone(),
            port: self.smtp_port,
            username: self.smtp_username.clone(),
            password: self.smtp_password.clone(),
            from_address: self.email_from_address.clone(),
            from_name: self.email_from_name.clone(),
            use_tls: self.smtp_use_tls,
            timeout: Duration::from_secs(self.smtp_timeout_seconds.max(1)),
        }
    }
}

impl EventsConfig {
    pub fn event_config(&self) -> EventConfig {
        EventConfig {
            event_bus_name: self.event_bus_name.clone(),
            source_name: self.event_source_name.clone(),
            retry_attempts: self.event_retry_attempts,
            timeout_seconds: self.event_timeout_seconds.max(1),
            enabled: self.events_enabled,
        }
    }
}

impl FeedbackConfig {
    /// `None` when no API key is available
    pub fn chat_settings(&self) -> Option<ChatCompletionSettings> {
        let api_key = self
            .llm_api_key
            .as_ref()
            .filter(|key| !key.trim().is_empty())?;

        Some(ChatCompletionSettings {
            base_url: self.llm_base_url.clone(),
            api_key: api_key.clone(),
            model: self.llm_model.clone(),
            temperature: self.llm_temperature,
            max_tokens: self.llm_max_tokens,
            timeout_seconds: self.llm_timeout_seconds,
        })
    }
}

impl ParameterStoreConfig {
    pub fn new(ssm_client: SsmClient, cache_ttl: Duration) -> Self {
        Self {
            ssm_client,
            cache: Arc::new(RwLock::new(HashMap::new())),
            cache_ttl,
        }
    }

    /// Read a (possibly encrypted) parameter, serving repeats from the cache
    pub async fn get_parameter(&self, name: &str) -> Result<String, ConfigError> {
        if let Some(value) = self.cached(name).await {
            debug!("Parameter found in cache: {}", name);
            return Ok(value);
        }

        debug!("Fetching parameter from AWS SSM: {}", name);
        let result = self
            .ssm_client
            .get_parameter()
            .name(name)
            .with_decryption(true)
            .send()
            .await
            .map_err(|e| ConfigError::AwsSdk {
                source: Box::new(e),
            })?;

        let value = result
            .parameter()
            .and_then(|p| p.value())
            .ok_or_else(|| ConfigError::ParameterNotFound {
                name: name.to_string(),
            })?
            .to_string();

        self.cache
            .write()
            .await
            .insert(name.to_string(), (value.clone(), Instant::now()));

        Ok(value)
    }

    async fn cached(&self, name: &str) -> Option<String> {
        let cache = self.cache.read().await;
        cache
            .get(name)
            .filter(|(_, fetched_at)| fetched_at.elapsed() < self.cache_ttl)
            .map(|(value, _)| value.clone())
    }

    pub async fn clear_cache(&self) {
        self.cache.write().await.clear();
        info!("Parameter store cache cleared");
    }

    pub async fn cache_size(&self) -> usize {
        self.cache.read().await.len()
    }
}

// Default value functions
pub(crate) fn default_host() -> String {
    "0.0.0.0".to_string()
}

pub(crate) fn default_port() -> u16 {
    8080
}

pub(crate) fn default_timeout() -> u64 {
    30
}

pub(crate) fn default_max_request_size() -> usize {
    1024 * 1024 // 1MB
}

pub(crate) fn default_users_table() -> String {
    "CutMateUsers".to_string()
}

pub(crate) fn default_stores_table() -> String {
    "CutMateStores".to_string()
}

pub(crate) fn default_orders_table() -> String {
    "CutMateOrders".to_string()
}

pub(crate) fn default_quizzes_table() -> String {
    "CutMateQuizzes".to_string()
}

pub(crate) fn default_questions_table() -> String {
    "CutMateQuizQuestions".to_string()
}

pub(crate) fn default_region() -> String {
    "us-west-2".to_string()
}

pub(crate) fn default_service_name() -> String {
    "cutmate".to_string()
}

pub(crate) fn default_service_version() -> String {
    env!("CARGO_PKG_VERSION").to_string()
}

pub(crate) fn default_log_level() -> String {
    "info".to_string()
}

pub(crate) fn default_token_ttl_hours() -> u32 {
    24
}

pub(crate) fn default_admin_name() -> String {
    "Administrator".to_string()
}

pub(crate) fn default_smtp_host() -> String {
    "localhost".to_string()
}

pub(crate) fn default_smtp_port() -> u16 {
    587
}

pub(crate) fn default_smtp_timeout() -> u64 {
    10
}

pub(crate) fn default_true() -> bool {
    true
}

pub(crate) fn default_from_address() -> String {
    "bookings@cutmate.app".to_string()
}

pub(crate) fn default_from_name() -> String {
    "CutMate".to_string()
}

pub(crate) fn default_retry_attempts() -> u32 {
    3
}

pub(crate) fn default_event_bus_name() -> String {
    "default".to_string()
}

pub(crate) fn default_event_source_name() -> String {
    "cutmate.bookings".to_string()
}

pub(crate) fn default_llm_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}

pub(crate) fn default_llm_model() -> String {
    "gpt-4o-mini".to_string()
}

pub(crate) fn default_llm_temperature() -> f32 {
    0.7
}

pub(crate) fn default_llm_max_tokens() -> u32 {
    500
}

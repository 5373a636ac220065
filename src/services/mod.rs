// Services module - business logic layer

pub mod auth_service;
pub mod event_emitter;
pub mod feedback_client;
pub mod mailer;
pub mod notification_service;
pub mod order_service;
pub mod quiz_service;
pub mod store_service;

pub use auth_service::{AuthService, AuthSettings};
pub use event_emitter::{EventEmitter, EventEmitterError};
pub use feedback_client::{
    ChatCompletionClient, ChatCompletionSettings, FeedbackError, FeedbackGenerator,
};
pub use mailer::{EmailMessage, Mailer, MailerError, SmtpMailer, SmtpSettings};
pub use notification_service::{NotificationReport, NotificationService};
pub use order_service::OrderService;
pub use quiz_service::QuizService;
pub use store_service::StoreDirectory;

use std::future::Future;

use crate::models::{GeneratedId, RepositoryError, RepositoryResult};

/// Insert a freshly built record, drawing a new id once if the first
/// one is already taken
pub(crate) async fn insert_with_fresh_id<T, F, Fut>(record: T, insert: F) -> RepositoryResult<T>
where
    T: GeneratedId + Clone,
    F: Fn(T) -> Fut,
    Fut: Future<Output = RepositoryResult<T>>,
{
    match insert(record.clone()).await {
        Err(RepositoryError::ConditionalCheckFailed { message }) => {
            crate::warn_with_trace!(error = %message, "Generated id already taken, retrying");
            let mut record = record;
            record.regenerate_id();
            insert(record).await
        }
        other => other,
    }
}

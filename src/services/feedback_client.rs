use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

use crate::models::{QuizAnswer, QuizCategory, ServiceError};

#[derive(Debug, Error)]
pub enum FeedbackError {
    #[error("Feedback provider request failed: {0}")]
    RequestFailed(String),
    #[error("Feedback provider response could not be parsed: {0}")]
    ResponseParseFailed(String),
    #[error("Feedback provider rate limited the request")]
    RateLimited,
    #[error("Feedback provider rejected the API key")]
    Unauthorized,
    #[error("Feedback provider error (status {status}): {message}")]
    ApiError { status: u16, message: String },
    #[error("Feedback provider returned no content")]
    EmptyResponse,
    #[error("Feedback generation is not configured")]
    NotConfigured,
}

impl From<FeedbackError> for ServiceError {
    fn from(err: FeedbackError) -> Self {
        ServiceError::ExternalService {
            service: "feedback".to_string(),
            message: err.to_string(),
        }
    }
}

/// Produces free-text advice for a submitted quiz
#[async_trait]
pub trait FeedbackGenerator: Send + Sync {
    async fn generate(
        &self,
        category: QuizCategory,
        answers: &[QuizAnswer],
    ) -> Result<String, FeedbackError>;
}

/// Settings for an OpenAI-compatible chat completion endpoint
#[derive(Debug, Clone)]
pub struct ChatCompletionSettings {
    pub base_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_seconds: u64,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize, Deserialize)]
struct ChatMessage {
    role: String,
    content: String,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

/// Calls `POST {base_url}/chat/completions` with bearer auth
#[derive(Clone)]
pub struct ChatCompletionClient {
    client: Client,
    settings: ChatCompletionSettings,
}

impl ChatCompletionClient {
    pub fn new(settings: ChatCompletionSettings) -> Result<Self, FeedbackError> {
        if settings.api_key.trim().is_empty() {
            return Err(FeedbackError::NotConfigured);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_seconds.max(1)))
            .build()
            .map_err(|e| FeedbackError::RequestFailed(e.to_string()))?;

        Ok(Self { client, settings })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.settings.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl FeedbackGenerator for ChatCompletionClient {
    #[instrument(skip(self, answers), fields(category = %category, model = %self.settings.model))]
    async fn generate(
        &self,
        category: QuizCategory,
        answers: &[QuizAnswer],
    ) -> Result<String, FeedbackError> {
        let request = ChatRequest {
            model: &self.settings.model,
            messages: vec![
                ChatMessage {
                    role: "system".to_string(),
                    content: system_prompt(category).to_string(),
                },
                ChatMessage {
                    role: "user".to_string(),
                    content: format_answers(answers),
                },
            ],
            temperature: self.settings.temperature,
            max_tokens: self.settings.max_tokens,
        };

        let response = self
            .client
            .post(self.endpoint())
            .bearer_auth(&self.settings.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| FeedbackError::RequestFailed(e.to_string()))?;

        let body = match response.status() {
            status if status.is_success() => response
                .json::<ChatResponse>()
                .await
                .map_err(|e| FeedbackError::ResponseParseFailed(e.to_string()))?,
            StatusCode::TOO_MANY_REQUESTS => return Err(FeedbackError::RateLimited),
            StatusCode::UNAUTHORIZED => return Err(FeedbackError::Unauthorized),
            status => {
                let message = response.text().await.unwrap_or_default();
                return Err(FeedbackError::ApiError {
                    status: status.as_u16(),
                    message,
                });
            }
        };

        let content = body
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content.trim().to_string())
            .unwrap_or_default();

        if content.is_empty() {
            return Err(FeedbackError::EmptyResponse);
        }

        crate::info_with_trace!(length = content.len(), "Quiz feedback generated");
        Ok(content)
    }
}

fn system_prompt(category: QuizCategory) -> &'static str {
    match category {
        QuizCategory::Skin => {
            "You are a licensed esthetician at a beauty salon. Based on the client's quiz \
             answers, describe their likely skin type and concerns, then recommend a simple \
             daily routine and one or two salon treatments. Keep it under 200 words and \
             avoid medical diagnoses."
        }
        QuizCategory::Hair => {
            "You are an experienced hair stylist at a salon. Based on the client's quiz \
             answers, describe their likely hair type and condition, then recommend a care \
             routine, suitable products and one or two salon services. Keep it under 200 words."
        }
    }
}

/// One numbered `Q:`/`A:` pair per answer
fn format_answers(answers: &[QuizAnswer]) -> String {
    answers
        .iter()
        .enumerate()
        .map(|(i, answer)| format!("{}. Q: {}\n   A: {}", i + 1, answer.question, answer.answer))
        .collect::<Vec<_>>()
        .join("\n")
}

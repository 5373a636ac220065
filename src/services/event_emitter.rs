use crate::models::{BookingEvent, EventConfig, EventPayload, SpanContextData};
use aws_sdk_eventbridge::Client as EventBridgeClient;
use aws_smithy_runtime_api::client::result::SdkError;
use aws_smithy_runtime_api::http::Response;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::sleep;
use tracing::{error, info, instrument, warn};

/// Errors that can occur during event emission
#[derive(Error, Debug)]
pub enum EventEmitterError {
    #[error("EventBridge SDK error: {0}")]
    EventBridgeSdk(
        #[from] SdkError<aws_sdk_eventbridge::operation::put_events::PutEventsError, Response>,
    ),
    #[error("EventBridge rejected entry: {code} - {message}")]
    EntryFailed { code: String, message: String },
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("Event emission disabled")]
    Disabled,
    #[error("PutEvents did not complete within {0:?}")]
    Timeout(Duration),
    #[error("Maximum retry attempts exceeded")]
    MaxRetriesExceeded,
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Publishes booking lifecycle events to AWS EventBridge
#[derive(Clone)]
pub struct EventEmitter {
    client: Arc<EventBridgeClient>,
    config: EventConfig,
}

impl EventEmitter {
    #[allow(clippy::result_large_err)]
    pub fn new(client: EventBridgeClient, config: EventConfig) -> Result<Self, EventEmitterError> {
        validate_config(&config)?;

        Ok(Self {
            client: Arc::new(client),
            config,
        })
    }

    #[instrument(skip(self, event), fields(event_type = %event.event_type, order_id = %event.order_id))]
    pub async fn emit_event(&self, event: BookingEvent) -> Result<(), EventEmitterError> {
        if !self.config.enabled {
            warn!("Event emission is disabled, skipping event");
            return Err(EventEmitterError::Disabled);
        }

        let payload = EventPayload::from_event(event, &self.config.source_name);
        self.emit_with_retry(payload).await
    }

    /// Emit event with exponential backoff retry logic
    async fn emit_with_retry(&self, payload: EventPayload) -> Result<(), EventEmitterError> {
        let max_attempts = self.config.retry_attempts.max(1);
        let mut attempts = 0;

        loop {
            match self.send_to_eventbridge(&payload).await {
                Ok(_) => {
                    info!(
                        event_type = %payload.detail_type,
                        order_id = %payload.detail.order_id,
                        attempt = attempts + 1,
                        "Event successfully emitted to EventBridge"
                    );
                    return Ok(());
                }
                Err(e) => {
                    attempts += 1;

                    if attempts >= max_attempts {
                        error!(
                            event_type = %payload.detail_type,
                            order_id = %payload.detail.order_id,
                            attempts = attempts,
                            error = %e,
                            "Failed to emit event after maximum retry attempts"
                        );
                        return Err(EventEmitterError::MaxRetriesExceeded);
                    }

                    let delay = backoff_delay(attempts);
                    warn!(
                        event_type = %payload.detail_type,
                        order_id = %payload.detail.order_id,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Event emission failed, retrying"
                    );

                    sleep(delay).await;
                }
            }
        }
    }

    async fn send_to_eventbridge(&self, payload: &EventPayload) -> Result<(), EventEmitterError> {
        let detail_json = serde_json::to_string(&payload.detail)?;
        let aws_time = aws_smithy_types::DateTime::from_secs(payload.time.timestamp());

        let mut entry_builder = aws_sdk_eventbridge::types::PutEventsRequestEntry::builder()
            .event_bus_name(&self.config.event_bus_name)
            .source(&payload.source)
            .detail_type(&payload.detail_type)
            .detail(detail_json)
            .time(aws_time);

        for resource in &payload.resources {
            entry_builder = entry_builder.resources(resource);
        }

        let limit = Duration::from_secs(self.config.timeout_seconds);
        let response = tokio::time::timeout(
            limit,
            self.client.put_events().entries(entry_builder.build()).send(),
        )
        .await
        .map_err(|_| EventEmitterError::Timeout(limit))??;

        for entry in response.entries() {
            if let Some(error_code) = entry.error_code() {
                let message = entry.error_message().unwrap_or("Unknown error");
                error!(
                    error_code = error_code,
                    error_message = message,
                    "EventBridge entry failed"
                );
                return Err(EventEmitterError::EntryFailed {
                    code: error_code.to_string(),
                    message: message.to_string(),
                });
            }
        }

        Ok(())
    }

    /// Extract OpenTelemetry span context from current tracing span
    pub fn extract_span_context() -> SpanContextData {
        use opentelemetry::trace::TraceContextExt;
        use tracing_opentelemetry::OpenTelemetrySpanExt;

        let current_span = tracing::Span::current();
        let context = current_span.context();

        let span = context.span();
        let span_context = span.span_context();
        if span_context.is_valid() {
            SpanContextData {
                trace_id: format!("{:032x}", span_context.trace_id()),
                span_id: format!("{:016x}", span_context.span_id()),
                trace_flags: format!("{:02x}", span_context.trace_flags()),
            }
        } else {
            SpanContextData::default()
        }
    }

    pub fn config(&self) -> &EventConfig {
        &self.config
    }
}

#[allow(clippy::result_large_err)]
fn validate_config(config: &EventConfig) -> Result<(), EventEmitterError> {
    if config.event_bus_name.is_empty() {
        return Err(EventEmitterError::InvalidConfig(
            "Event bus name cannot be empty".to_string(),
        ));
    }

    if config.source_name.is_empty() {
        return Err(EventEmitterError::InvalidConfig(
            "Source name cannot be empty".to_string(),
        ));
    }

    if config.timeout_seconds == 0 {
        return Err(EventEmitterError::InvalidConfig(
            "Event timeout must be at least one second".to_string(),
        ));
    }

    Ok(())
}

/// 100ms, 200ms, 400ms, ... after the 1st, 2nd, 3rd failure
pub(crate) fn backoff_delay(failed_attempts: u32) -> Duration {
    let exponent = failed_attempts.saturating_sub(1).min(10);
    Duration::from_millis(100 * 2_u64.pow(exponent))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CreateStoreRequest, OrderedService, ServiceOrder, Store};
    use aws_sdk_eventbridge::config::Region;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    fn test_client() -> EventBridgeClient {
        let config = aws_sdk_eventbridge::Config::builder()
            .region(Region::new("us-east-1"))
            .build();
        EventBridgeClient::from_conf(config)
    }

    fn test_event() -> BookingEvent {
        let store = Store::new(
            "Uowner001".to_string(),
            CreateStoreRequest {
                name: "Shear Joy".to_string(),
                address: "12 Market Street".to_string(),
                description: None,
                phone: None,
                services: vec![],
            },
        );
        let order = ServiceOrder::new(
            "Ucust0001".to_string(),
            &store,
            vec![OrderedService {
                service_id: "Vsvc00001".to_string(),
                name: "Haircut".to_string(),
                price: dec!(25.00),
                duration_minutes: 30,
            }],
            Utc::now(),
            None,
        );
        BookingEvent::order_created(&order, SpanContextData::default())
    }

    #[tokio::test]
    async fn test_event_emitter_creation() {
        let emitter = EventEmitter::new(test_client(), EventConfig::default());
        assert!(emitter.is_ok());
    }

    #[tokio::test]
    async fn test_invalid_config() {
        let mut event_config = EventConfig::default();
        event_config.event_bus_name = "".to_string();
        let emitter = EventEmitter::new(test_client(), event_config);
        assert!(matches!(emitter, Err(EventEmitterError::InvalidConfig(_))));

        let mut event_config = EventConfig::default();
        event_config.source_name = "".to_string();
        let emitter = EventEmitter::new(test_client(), event_config);
        assert!(matches!(emitter, Err(EventEmitterError::InvalidConfig(_))));

        let mut event_config = EventConfig::default();
        event_config.timeout_seconds = 0;
        let emitter = EventEmitter::new(test_client(), event_config);
        assert!(matches!(emitter, Err(EventEmitterError::InvalidConfig(_))));
    }

    #[tokio::test]
    async fn test_put_events_gives_up_after_timeout() {
        // Accepts connections and never answers
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((socket, _)) = listener.accept().await {
                held.push(socket);
            }
        });

        let config = aws_sdk_eventbridge::Config::builder()
            .region(Region::new("us-east-1"))
            .endpoint_url(format!("http://{}", addr))
            .credentials_provider(aws_sdk_eventbridge::config::Credentials::new(
                "test", "test", None, None, "static",
            ))
            .build();
        let event_config = EventConfig {
            timeout_seconds: 1,
            ..EventConfig::default()
        };
        let emitter = EventEmitter::new(EventBridgeClient::from_conf(config), event_config).unwrap();
        let payload = EventPayload::from_event(test_event(), "cutmate.bookings");

        let result = tokio::time::timeout(
            Duration::from_secs(10),
            emitter.send_to_eventbridge(&payload),
        )
        .await
        .expect("send_to_eventbridge should not outlive its own timeout");

        assert!(matches!(
            result,
            Err(EventEmitterError::Timeout(limit)) if limit == Duration::from_secs(1)
        ));
    }

    #[test]
    fn test_span_context_extraction() {
        let span_context = EventEmitter::extract_span_context();

        assert_eq!(span_context.trace_id.len(), 32);
        assert_eq!(span_context.span_id.len(), 16);
        assert_eq!(span_context.trace_flags.len(), 2);
    }

    #[tokio::test]
    async fn test_disabled_event_emission() {
        let mut event_config = EventConfig::default();
        event_config.enabled = false;
        let emitter = EventEmitter::new(test_client(), event_config).unwrap();

        let result = emitter.emit_event(test_event()).await;
        assert!(matches!(result, Err(EventEmitterError::Disabled)));
    }

    #[test]
    fn test_backoff_delay() {
        assert_eq!(backoff_delay(1), Duration::from_millis(100));
        assert_eq!(backoff_delay(2), Duration::from_millis(200));
        assert_eq!(backoff_delay(3), Duration::from_millis(400));
    }
}

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{instrument, warn};

use crate::models::{BookingEvent, OrderStatus, ServiceOrder, User};
use crate::observability::Metrics;
use crate::services::event_emitter::{backoff_delay, EventEmitterError};
use crate::services::mailer::{EmailMessage, Mailer};
use crate::services::EventEmitter;

/// Outcome of one notification fan-out
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct NotificationReport {
    pub sent: u32,
    pub failed: u32,
    pub event_published: bool,
}

/// Fans booking changes out to email recipients and the event bus.
/// Failures are logged and counted, never returned to the caller.
pub struct NotificationService {
    mailer: Option<Arc<dyn Mailer>>,
    event_emitter: Option<Arc<EventEmitter>>,
    metrics: Option<Arc<Metrics>>,
    retry_attempts: u32,
}

impl NotificationService {
    pub fn new(mailer: Option<Arc<dyn Mailer>>, retry_attempts: u32) -> Self {
        Self {
            mailer,
            event_emitter: None,
            metrics: None,
            retry_attempts: retry_attempts.max(1),
        }
    }

    /// A service that only logs; used when email and events are both off
    pub fn disabled() -> Self {
        Self::new(None, 1)
    }

    pub fn with_event_emitter(mut self, event_emitter: Arc<EventEmitter>) -> Self {
        self.event_emitter = Some(event_emitter);
        self
    }

    pub fn with_metrics(mut self, metrics: Arc<Metrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    #[instrument(skip_all, fields(order_id = %order.id))]
    pub async fn order_created(
        &self,
        order: &ServiceOrder,
        customer: Option<&User>,
        owner: Option<&User>,
    ) -> NotificationReport {
        let mut messages = Vec::new();
        if let Some(customer) = customer {
            messages.push(booking_confirmation_email(order, customer));
        }
        if let Some(owner) = owner {
            messages.push(new_booking_email(order, owner, customer));
        }

        let mut report = self.deliver(messages).await;

        let event = BookingEvent::order_created(order, EventEmitter::extract_span_context());
        report.event_published = self.publish(event).await;

        crate::info_with_trace!(
            sent = report.sent,
            failed = report.failed,
            event_published = report.event_published,
            "Order creation notifications dispatched"
        );
        report
    }

    /// `changed_by` is the user who made the transition; the owner is
    /// only emailed when the customer cancelled their own booking.
    #[instrument(skip_all, fields(order_id = %order.id, status = %order.status))]
    pub async fn order_status_changed(
        &self,
        order: &ServiceOrder,
        previous: OrderStatus,
        changed_by: &str,
        customer: Option<&User>,
        owner: Option<&User>,
    ) -> NotificationReport {
        let mut messages = Vec::new();
        if let Some(customer) = customer {
            messages.push(status_update_email(order, previous, customer));
        }

        let cancelled_by_customer =
            order.status == OrderStatus::Cancelled && changed_by == order.customer_id;
        if cancelled_by_customer {
            if let Some(owner) = owner {
                messages.push(customer_cancellation_email(order, owner));
            }
        }

        let mut report = self.deliver(messages).await;

        let event = BookingEvent::order_status_changed(
            order,
            previous,
            EventEmitter::extract_span_context(),
        );
        report.event_published = self.publish(event).await;

        crate::info_with_trace!(
            sent = report.sent,
            failed = report.failed,
            event_published = report.event_published,
            "Order status notifications dispatched"
        );
        report
    }

    async fn deliver(&self, messages: Vec<EmailMessage>) -> NotificationReport {
        let mut report = NotificationReport::default();

        let Some(mailer) = self.mailer.as_ref() else {
            if !messages.is_empty() {
                warn!(
                    skipped = messages.len(),
                    "Email delivery is disabled, skipping notifications"
                );
            }
            return report;
        };

        for message in &messages {
            if self.send_with_retry(mailer.as_ref(), message).await {
                report.sent += 1;
            } else {
                report.failed += 1;
            }
        }

        if let Some(metrics) = &self.metrics {
            metrics.record_notifications("email", report.sent, report.failed);
        }

        report
    }

    async fn send_with_retry(&self, mailer: &dyn Mailer, message: &EmailMessage) -> bool {
        let mut attempts = 0;

        loop {
            match mailer.send(message).await {
                Ok(()) => return true,
                Err(e) => {
                    attempts += 1;
                    if attempts >= self.retry_attempts {
                        crate::error_with_trace!(
                            subject = %message.subject,
                            attempts = attempts,
                            error = %e,
                            "Giving up on email notification"
                        );
                        return false;
                    }

                    let delay = backoff_delay(attempts);
                    warn!(
                        subject = %message.subject,
                        attempt = attempts,
                        delay_ms = delay.as_millis(),
                        error = %e,
                        "Email send failed, retrying"
                    );
                    sleep(delay).await;
                }
            }
        }
    }

    async fn publish(&self, event: BookingEvent) -> bool {
        let Some(emitter) = self.event_emitter.as_ref() else {
            return false;
        };

        let outcome = match emitter.emit_event(event).await {
            Ok(()) => Some(true),
            Err(EventEmitterError::Disabled) => None,
            Err(e) => {
                crate::warn_with_trace!(error = %e, "Failed to publish booking event");
                Some(false)
            }
        };

        if let (Some(published), Some(metrics)) = (outcome, &self.metrics) {
            let (sent, failed) = if published { (1, 0) } else { (0, 1) };
            metrics.record_notifications("eventbridge", sent, failed);
        }

        outcome.unwrap_or(false)
    }
}

fn service_summary(order: &ServiceOrder) -> String {
    order
        .services
        .iter()
        .map(|service| format!("  - {} ({} min, {})", service.name, service.duration_minutes, service.price))
        .collect::<Vec<_>>()
        .join("\n")
}

fn booking_confirmation_email(order: &ServiceOrder, customer: &User) -> EmailMessage {
    EmailMessage {
        to: customer.email.clone(),
        subject: format!("Booking received at {}", order.store_name),
        body: format!(
            "Hi {},\n\nYour booking {} at {} is scheduled for {}.\n\n{}\n\nTotal: {} ({} min)\nStatus: {}\n",
            customer.name,
            order.id,
            order.store_name,
            order.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
            service_summary(order),
            order.total_price,
            order.total_duration_minutes,
            order.status,
        ),
    }
}

fn new_booking_email(order: &ServiceOrder, owner: &User, customer: Option<&User>) -> EmailMessage {
    let customer_name = customer
        .map(|customer| customer.name.as_str())
        .unwrap_or("A customer");

    EmailMessage {
        to: owner.email.clone(),
        subject: format!("New booking for {}", order.store_name),
        body: format!(
            "Hi {},\n\n{} booked {} for {}.\n\n{}\n\nNotes: {}\n",
            owner.name,
            customer_name,
            order.store_name,
            order.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
            service_summary(order),
            order.notes.as_deref().unwrap_or("none"),
        ),
    }
}

fn status_update_email(order: &ServiceOrder, previous: OrderStatus, customer: &User) -> EmailMessage {
    let mut body = format!(
        "Hi {},\n\nYour booking {} at {} changed from {} to {}.\n",
        customer.name, order.id, order.store_name, previous, order.status,
    );
    if let Some(reason) = &order.cancellation_reason {
        body.push_str(&format!("Reason: {}\n", reason));
    }

    EmailMessage {
        to: customer.email.clone(),
        subject: format!("Booking {} at {}", order.status, order.store_name),
        body,
    }
}

fn customer_cancellation_email(order: &ServiceOrder, owner: &User) -> EmailMessage {
    EmailMessage {
        to: owner.email.clone(),
        subject: format!("Booking cancelled at {}", order.store_name),
        body: format!(
            "Hi {},\n\nThe customer cancelled booking {} scheduled for {}.\nReason: {}\n",
            owner.name,
            order.id,
            order.scheduled_at.format("%Y-%m-%d %H:%M UTC"),
            order.cancellation_reason.as_deref().unwrap_or("not given"),
        ),
    }
}

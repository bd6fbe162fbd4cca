use async_trait::async_trait;
use tokio::sync::broadcast;
use ulid::Ulid;

use crate::model::Appointment;

const CHANNEL_CAPACITY: usize = 256;

/// Delivery failure reported by a notifier. Never rolls back a booking.
#[derive(Debug)]
pub struct NotifyError(pub String);

impl std::fmt::Display for NotifyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "notification failed: {}", self.0)
    }
}

impl std::error::Error for NotifyError {}

/// Delivers the confirmation link to the client. Email transport lives
/// behind this trait.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify_confirmation(
        &self,
        client_email: &str,
        client_name: &str,
        appointment: &Appointment,
        token: &str,
    ) -> Result<(), NotifyError>;
}

pub fn confirmation_url(public_url: &str, token: &str) -> String {
    format!(
        "{}/appointments/confirm/{token}",
        public_url.trim_end_matches('/')
    )
}

/// Default notifier: writes the confirmation URL to the log.
pub struct LogNotifier {
    public_url: String,
}

impl LogNotifier {
    pub fn new(public_url: impl Into<String>) -> Self {
        Self {
            public_url: public_url.into(),
        }
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify_confirmation(
        &self,
        client_email: &str,
        client_name: &str,
        appointment: &Appointment,
        token: &str,
    ) -> Result<(), NotifyError> {
        tracing::info!(
            appointment = %appointment.id,
            to = client_email,
            "confirmation for {client_name} at {}: {}",
            appointment.scheduled_at,
            confirmation_url(&self.public_url, token)
        );
        Ok(())
    }
}

/// A confirmation request as seen by subscribers of [`ChannelNotifier`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfirmationNotice {
    pub appointment_id: Ulid,
    pub email: String,
    pub name: String,
    pub token: String,
}

/// Broadcast hub for confirmation notices. Sends are a no-op without
/// subscribers.
pub struct ChannelNotifier {
    sender: broadcast::Sender<ConfirmationNotice>,
}

impl Default for ChannelNotifier {
    fn default() -> Self {
        Self::new()
    }
}

impl ChannelNotifier {
    pub fn new() -> Self {
        Self {
            sender: broadcast::channel(CHANNEL_CAPACITY).0,
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConfirmationNotice> {
        self.sender.subscribe()
    }
}

#[async_trait]
impl Notifier for ChannelNotifier {
    async fn notify_confirmation(
        &self,
        client_email: &str,
        client_name: &str,
        appointment: &Appointment,
        token: &str,
    ) -> Result<(), NotifyError> {
        let _ = self.sender.send(ConfirmationNotice {
            appointment_id: appointment.id,
            email: client_email.to_string(),
            name: client_name.to_string(),
            token: token.to_string(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentStatus;
    use chrono::NaiveDate;

    fn appointment() -> Appointment {
        let at = NaiveDate::from_ymd_opt(2024, 6, 10)
            .unwrap()
            .and_hms_opt(10, 0, 0)
            .unwrap();
        Appointment {
            id: Ulid::new(),
            barber_id: Ulid::new(),
            client_id: Ulid::new(),
            service_id: Ulid::new(),
            scheduled_at: at,
            duration: 30,
            status: AppointmentStatus::PendingConfirmation,
            created_at: at,
            confirmed_at: None,
            notes: None,
        }
    }

    #[tokio::test]
    async fn subscribe_and_receive() {
        let hub = ChannelNotifier::new();
        let mut rx = hub.subscribe();
        let appt = appointment();

        hub.notify_confirmation("ana@example.com", "Ana", &appt, "tok")
            .await
            .unwrap();

        let notice = rx.recv().await.unwrap();
        assert_eq!(notice.appointment_id, appt.id);
        assert_eq!(notice.email, "ana@example.com");
        assert_eq!(notice.token, "tok");
    }

    #[tokio::test]
    async fn send_without_subscribers_is_noop() {
        let hub = ChannelNotifier::new();
        hub.notify_confirmation("ana@example.com", "Ana", &appointment(), "tok")
            .await
            .unwrap();
    }

    #[test]
    fn confirmation_url_trims_trailing_slash() {
        assert_eq!(
            confirmation_url("http://localhost:8080/", "abc"),
            "http://localhost:8080/appointments/confirm/abc"
        );
    }
}

use chrono::NaiveDateTime;
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_no_conflict, optional_text, require_text, validate_email};
use super::slots::SlotState;
use super::{Engine, EngineError};

#[derive(Debug, Clone)]
pub struct BookingRequest {
    pub barber_id: Ulid,
    pub service_id: Ulid,
    pub scheduled_at: NaiveDateTime,
    pub client_name: String,
    pub client_email: String,
    pub client_phone: Option<String>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone)]
pub struct BookingReceipt {
    pub appointment: Appointment,
    pub client: Client,
    /// Confirmation token handed to the notifier.
    pub token: String,
}

/// Validated request fields.
struct Contact {
    name: String,
    email: String,
    phone: Option<String>,
    notes: Option<String>,
}

fn validate_request(req: &BookingRequest) -> Result<Contact, EngineError> {
    Ok(Contact {
        name: require_text("name", &req.client_name, MAX_NAME_LEN)?,
        email: validate_email(&req.client_email)?,
        phone: optional_text("phone", req.client_phone.as_deref(), MAX_PHONE_LEN)?,
        notes: optional_text("notes", req.notes.as_deref(), MAX_NOTES_LEN)?,
    })
}

impl Engine {
    /// Re-validate the slot and insert a `pending_confirmation` appointment
    /// as one critical section under the barber's write lock. Of several
    /// concurrent requests for one slot exactly one succeeds.
    pub async fn book(&self, req: BookingRequest) -> Result<BookingReceipt, EngineError> {
        let started = std::time::Instant::now();
        let result = self.book_inner(req).await;
        let outcome = match &result {
            Ok(_) => "booked",
            Err(EngineError::Conflict(_)) | Err(EngineError::SlotUnavailable(_)) => "conflict",
            Err(EngineError::Validation { .. }) | Err(EngineError::NotFound(_)) => "rejected",
            Err(_) => "error",
        };
        metrics::counter!(crate::observability::BOOKINGS_TOTAL, "outcome" => outcome).increment(1);
        metrics::histogram!(crate::observability::BOOKING_DURATION_SECONDS)
            .record(started.elapsed().as_secs_f64());
        result
    }

    async fn book_inner(&self, req: BookingRequest) -> Result<BookingReceipt, EngineError> {
        let contact = validate_request(&req)?;
        let service = self
            .store
            .service(&req.service_id)
            .filter(|s| s.active)
            .ok_or(EngineError::NotFound(req.service_id))?;

        let mut guard = self.barber_write(req.barber_id).await?;
        if !guard.barber.active {
            return Err(EngineError::NotFound(req.barber_id));
        }

        let start = ms_of(req.scheduled_at);
        let span = Span::new(start, start + minutes_ms(service.duration));

        // Must be a generated, non-past, unblocked start for this duration.
        let slot_state = self
            .day_slots(&guard, req.scheduled_at.date(), service.duration)
            .find(|s| s.span.start == start)
            .map(|s| s.state);
        if !matches!(slot_state, Some(SlotState::Available) | Some(SlotState::Booked)) {
            return Err(EngineError::SlotUnavailable(req.scheduled_at));
        }
        check_no_conflict(&guard, &span)?;
        if let Some(existing) = guard.start_taken(start) {
            return Err(EngineError::Conflict(existing));
        }

        let now = self.now();
        let client = self.upsert_client(contact.name, contact.email, contact.phone).await?;
        let appointment = Appointment {
            id: Ulid::new(),
            barber_id: req.barber_id,
            client_id: client.id,
            service_id: service.id,
            scheduled_at: req.scheduled_at,
            duration: service.duration,
            status: AppointmentStatus::PendingConfirmation,
            created_at: now,
            confirmed_at: None,
            notes: contact.notes,
        };
        self.persist_and_apply(&mut guard, &Event::AppointmentBooked {
            appointment: appointment.clone(),
        })
        .await?;
        drop(guard);

        tracing::info!(
            appointment = %appointment.id,
            barber = %appointment.barber_id,
            "booked {} for {} min",
            appointment.scheduled_at,
            appointment.duration
        );

        let token = self.signer.issue(appointment.id, ms_of(now));
        if let Err(e) = self
            .notifier
            .notify_confirmation(&client.email, &client.name, &appointment, &token)
            .await
        {
            tracing::warn!(appointment = %appointment.id, "{e}");
        }

        Ok(BookingReceipt {
            appointment,
            client,
            token,
        })
    }

    /// Find-or-create by email. Name and a newly given phone overwrite the
    /// stored ones.
    async fn upsert_client(
        &self,
        name: String,
        email: String,
        phone: Option<String>,
    ) -> Result<Client, EngineError> {
        let _lock = self.client_updates.lock().await;
        let id = self.store.reserve_client_id(&email);
        let client = match self.store.client(&id) {
            Some(existing) => {
                let mut updated = existing.clone();
                updated.name = name;
                if phone.is_some() {
                    updated.phone = phone;
                }
                if updated == existing {
                    return Ok(existing);
                }
                updated
            }
            None => Client {
                id,
                name,
                email,
                phone,
                total_visits: 0,
                last_visit: None,
                segment: ClientSegment::New,
            },
        };
        self.persist_global(&Event::ClientUpserted {
            client: client.clone(),
        })
        .await?;
        Ok(client)
    }
}

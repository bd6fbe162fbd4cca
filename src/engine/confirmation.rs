use chrono::NaiveDateTime;
use ulid::Ulid;

use crate::model::*;
use crate::token::TokenError;

use super::conflict::confirmed_overlap;
use super::{Engine, EngineError};

/// Outcome of a valid confirmation token.
#[derive(Debug, Clone)]
pub enum Confirmation {
    Confirmed(Appointment),
    /// Another appointment was confirmed for an overlapping time first; this
    /// one is now `cancelled_conflict`.
    Superseded { appointment: Appointment, by: Ulid },
}

impl Engine {
    /// Verify the token and settle the pending appointment it names.
    /// Token failures change nothing.
    pub async fn confirm(&self, token: &str) -> Result<Confirmation, EngineError> {
        let now = self.now();
        let id = self.signer.verify(token, ms_of(now))?;
        let (barber_id, mut guard) = self.resolve_entity_write(&id).await?;
        let appointment = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        if appointment.status != AppointmentStatus::PendingConfirmation {
            return Err(TokenError::AlreadyUsed(appointment.status).into());
        }

        let (status, superseded_by) = match confirmed_overlap(&guard, &appointment.span(), id) {
            Some(other) => (AppointmentStatus::CancelledConflict, Some(other)),
            None => (AppointmentStatus::Confirmed, None),
        };
        self.persist_and_apply(&mut guard, &Event::AppointmentStatusChanged {
            id,
            barber_id,
            status,
            at: now,
        })
        .await?;
        let appointment = guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))?;
        metrics::counter!(crate::observability::CONFIRMATIONS_TOTAL, "status" => status.as_str())
            .increment(1);

        Ok(match superseded_by {
            Some(by) => {
                tracing::warn!(appointment = %id, "confirmation lost to {by}");
                Confirmation::Superseded { appointment, by }
            }
            None => Confirmation::Confirmed(appointment),
        })
    }

    async fn transition(
        &self,
        id: Ulid,
        to: AppointmentStatus,
    ) -> Result<Appointment, EngineError> {
        let (barber_id, mut guard) = self.resolve_entity_write(&id).await?;
        let from = guard.appointment(id).ok_or(EngineError::NotFound(id))?.status;
        if !from.can_transition_to(to) {
            return Err(EngineError::InvalidTransition { from, to });
        }
        self.persist_and_apply(&mut guard, &Event::AppointmentStatusChanged {
            id,
            barber_id,
            status: to,
            at: self.now(),
        })
        .await?;
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }

    /// `confirmed` → `completed`, then refresh the client's visit count and
    /// segment.
    pub async fn complete(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let appointment = self.transition(id, AppointmentStatus::Completed).await?;
        self.record_visit(appointment.client_id, appointment.scheduled_at)
            .await?;
        Ok(appointment)
    }

    /// Any active state → `cancelled`. Frees the slot.
    pub async fn cancel(&self, id: Ulid) -> Result<Appointment, EngineError> {
        self.transition(id, AppointmentStatus::Cancelled).await
    }

    async fn record_visit(&self, client_id: Ulid, visited_at: NaiveDateTime) -> Result<(), EngineError> {
        let _lock = self.client_updates.lock().await;
        let Some(mut client) = self.store.client(&client_id) else {
            tracing::warn!(client = %client_id, "completed appointment for unknown client");
            return Ok(());
        };
        client.total_visits += 1;
        client.last_visit = Some(client.last_visit.map_or(visited_at, |last| last.max(visited_at)));
        client.segment = ClientSegment::classify(client.total_visits, client.last_visit, self.now());
        self.persist_global(&Event::ClientUpserted { client }).await
    }

    /// Re-derive every client's segment against `now`. Clients drift into
    /// `inactive` without any event of their own. Returns how many changed.
    pub async fn refresh_client_segments(&self, now: NaiveDateTime) -> Result<usize, EngineError> {
        let _lock = self.client_updates.lock().await;
        let mut changed = 0;
        for mut client in self.store.clients() {
            let segment = ClientSegment::classify(client.total_visits, client.last_visit, now);
            if segment != client.segment {
                client.segment = segment;
                self.persist_global(&Event::ClientUpserted { client }).await?;
                changed += 1;
            }
        }
        Ok(changed)
    }

    /// Pending appointments whose confirmation window has closed.
    pub async fn collect_stale_pending(&self, now: NaiveDateTime) -> Vec<Ulid> {
        let ttl = self.signer.ttl_ms();
        let now = ms_of(now);
        let mut stale = Vec::new();
        for bs in self.store.barbers() {
            let guard = bs.read().await;
            stale.extend(
                guard
                    .appointments
                    .iter()
                    .filter(|a| {
                        a.status == AppointmentStatus::PendingConfirmation
                            && now - ms_of(a.created_at) > ttl
                    })
                    .map(|a| a.id),
            );
        }
        stale
    }

    /// Flip stale pending appointments to `expired`. Each candidate is
    /// re-checked under its barber's lock, so concurrent sweeps and
    /// confirmations are safe.
    pub async fn expire_stale_pending(&self, now: NaiveDateTime) -> Result<usize, EngineError> {
        let ttl = self.signer.ttl_ms();
        let mut expired = 0;
        for id in self.collect_stale_pending(now).await {
            let (barber_id, mut guard) = match self.resolve_entity_write(&id).await {
                Ok(found) => found,
                Err(EngineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let still_stale = guard.appointment(id).is_some_and(|a| {
                a.status == AppointmentStatus::PendingConfirmation
                    && ms_of(now) - ms_of(a.created_at) > ttl
            });
            if !still_stale {
                tracing::debug!("expiry sweep skip {id}: no longer pending");
                continue;
            }
            self.persist_and_apply(&mut guard, &Event::AppointmentStatusChanged {
                id,
                barber_id,
                status: AppointmentStatus::Expired,
                at: now,
            })
            .await?;
            expired += 1;
        }
        if expired > 0 {
            metrics::counter!(crate::observability::APPOINTMENTS_EXPIRED_TOTAL).increment(expired as u64);
        }
        Ok(expired)
    }
}

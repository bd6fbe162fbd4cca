use chrono::{NaiveDate, TimeDelta};
use ulid::Ulid;

use crate::limits::DEFAULT_SERVICE_MINUTES;
use crate::model::*;

use super::availability::{blocked_spans, resolve_open_ranges};
use super::slots::{generate_slots, Slot, SlotInputs, SlotIter};
use super::{Engine, EngineError, SharedBarberState};

/// Bookable starts for one barber on one date.
#[derive(Debug, Clone)]
pub struct DaySchedule {
    pub barber: Barber,
    pub date: NaiveDate,
    /// Minutes per candidate.
    pub duration: u32,
    /// Whether any active rule exists for that weekday.
    pub has_rules: bool,
    /// Available candidates only, in time order.
    pub slots: Vec<Slot>,
}

fn day_span(date: NaiveDate) -> Span {
    let start = ms_of(date.and_time(chrono::NaiveTime::MIN));
    Span::new(start, start + TimeDelta::days(1).num_milliseconds())
}

impl Engine {
    fn shared_barber(&self, id: Ulid) -> Result<SharedBarberState, EngineError> {
        self.store.get_barber(&id).ok_or(EngineError::NotFound(id))
    }

    pub async fn get_barber(&self, id: Ulid) -> Result<Barber, EngineError> {
        let bs = self.shared_barber(id)?;
        let guard = bs.read().await;
        Ok(guard.barber.clone())
    }

    pub async fn list_barbers(&self) -> Vec<Barber> {
        let mut barbers = Vec::with_capacity(self.store.barber_count());
        for bs in self.store.barbers() {
            barbers.push(bs.read().await.barber.clone());
        }
        barbers.sort_by(|a, b| a.name.cmp(&b.name).then(a.id.cmp(&b.id)));
        barbers
    }

    /// Active barbers without a single active rule.
    pub async fn barbers_without_schedule(&self) -> Vec<Barber> {
        let mut out = Vec::new();
        for bs in self.store.barbers() {
            let guard = bs.read().await;
            if guard.barber.active && !guard.rules.iter().any(|r| r.active) {
                out.push(guard.barber.clone());
            }
        }
        out.sort_by(|a, b| a.name.cmp(&b.name));
        out
    }

    pub async fn list_rules(&self, barber_id: Ulid) -> Result<Vec<AvailabilityRule>, EngineError> {
        let bs = self.shared_barber(barber_id)?;
        let guard = bs.read().await;
        Ok(guard.rules.clone())
    }

    /// Blocks on or after `from` (default: today).
    pub async fn list_exceptions(
        &self,
        barber_id: Ulid,
        from: Option<NaiveDate>,
    ) -> Result<Vec<ScheduleException>, EngineError> {
        let from = from.unwrap_or_else(|| self.clock.today());
        let bs = self.shared_barber(barber_id)?;
        let guard = bs.read().await;
        Ok(guard
            .exceptions
            .iter()
            .filter(|e| e.date >= from)
            .cloned()
            .collect())
    }

    pub fn list_services(&self) -> Vec<Service> {
        self.store.services()
    }

    pub fn get_service(&self, id: Ulid) -> Result<Service, EngineError> {
        self.store.service(&id).ok_or(EngineError::NotFound(id))
    }

    pub fn get_client(&self, id: Ulid) -> Result<Client, EngineError> {
        self.store.client(&id).ok_or(EngineError::NotFound(id))
    }

    /// Duration in minutes for an optional service. Missing means the
    /// default; unknown or inactive is not found.
    pub fn service_duration(&self, service_id: Option<Ulid>) -> Result<u32, EngineError> {
        match service_id {
            None => Ok(DEFAULT_SERVICE_MINUTES),
            Some(id) => match self.store.service(&id) {
                Some(service) if service.active => Ok(service.duration),
                _ => Err(EngineError::NotFound(id)),
            },
        }
    }

    /// Weekly rules minus same-day blocks. Inactive barbers have no public
    /// availability and are reported as not found.
    pub async fn resolve_availability(
        &self,
        barber_id: Ulid,
        date: NaiveDate,
    ) -> Result<Vec<Span>, EngineError> {
        let bs = self.shared_barber(barber_id)?;
        let guard = bs.read().await;
        if !guard.barber.active {
            return Err(EngineError::NotFound(barber_id));
        }
        Ok(resolve_open_ranges(&guard, date))
    }

    /// Candidate iterator over `date`. The caller holds a lock on `bs`.
    pub(super) fn day_slots(&self, bs: &BarberState, date: NaiveDate, duration: u32) -> SlotIter {
        let busy = bs
            .overlapping_active(&day_span(date))
            .map(Appointment::span)
            .collect();
        generate_slots(SlotInputs {
            ranges: resolve_open_ranges(bs, date),
            duration: minutes_ms(duration),
            step: self.step_ms(),
            busy,
            blocked: blocked_spans(bs, date),
            now: ms_of(self.now()),
        })
    }

    /// Every candidate for `date`, flagged available / booked / blocked.
    pub async fn slots(
        &self,
        barber_id: Ulid,
        date: NaiveDate,
        duration: u32,
    ) -> Result<Vec<Slot>, EngineError> {
        let bs = self.shared_barber(barber_id)?;
        let guard = bs.read().await;
        if !guard.barber.active {
            return Err(EngineError::NotFound(barber_id));
        }
        Ok(self.day_slots(&guard, date, duration).collect())
    }

    pub async fn available_slots(
        &self,
        barber_id: Ulid,
        date: NaiveDate,
        service_id: Option<Ulid>,
    ) -> Result<DaySchedule, EngineError> {
        let duration = self.service_duration(service_id)?;
        let bs = self.shared_barber(barber_id)?;
        let guard = bs.read().await;
        if !guard.barber.active {
            return Err(EngineError::NotFound(barber_id));
        }
        let has_rules = guard.rules_for(weekday_index(date)).next().is_some();
        let slots = self
            .day_slots(&guard, date, duration)
            .filter(Slot::is_available)
            .collect();
        Ok(DaySchedule {
            barber: guard.barber.clone(),
            date,
            duration,
            has_rules,
            slots,
        })
    }

    /// Appointments of a barber, optionally limited to one date.
    pub async fn list_appointments(
        &self,
        barber_id: Ulid,
        date: Option<NaiveDate>,
    ) -> Result<Vec<Appointment>, EngineError> {
        let bs = self.shared_barber(barber_id)?;
        let guard = bs.read().await;
        Ok(guard
            .appointments
            .iter()
            .filter(|a| date.is_none_or(|d| a.scheduled_at.date() == d))
            .cloned()
            .collect())
    }

    pub async fn get_appointment(&self, id: Ulid) -> Result<Appointment, EngineError> {
        let barber_id = self
            .store
            .barber_for_entity(&id)
            .ok_or(EngineError::NotFound(id))?;
        let bs = self.shared_barber(barber_id)?;
        let guard = bs.read().await;
        guard.appointment(id).cloned().ok_or(EngineError::NotFound(id))
    }
}

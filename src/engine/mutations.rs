use chrono::{NaiveDate, NaiveTime};
use ulid::Ulid;

use crate::limits::*;
use crate::model::*;

use super::conflict::{check_rule_overlap, optional_text, require_text, validate_time_range};
use super::{Engine, EngineError};

/// Partial update for a weekly rule. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct RuleUpdate {
    pub day_of_week: Option<u8>,
    pub start: Option<NaiveTime>,
    pub end: Option<NaiveTime>,
    pub active: Option<bool>,
}

/// Monday to Saturday, morning and afternoon shifts.
const DEFAULT_SHIFTS: [((u32, u32), (u32, u32)); 2] = [((8, 0), (12, 0)), ((13, 0), (20, 0))];

fn validate_day_of_week(day_of_week: u8) -> Result<(), EngineError> {
    if day_of_week > 6 {
        return Err(EngineError::validation("day_of_week", "must be 0 (Monday) to 6 (Sunday)"));
    }
    Ok(())
}

fn validate_duration(duration: u32) -> Result<(), EngineError> {
    if duration == 0 || duration > MAX_SERVICE_MINUTES {
        return Err(EngineError::validation(
            "duration",
            format!("must be between 1 and {MAX_SERVICE_MINUTES} minutes"),
        ));
    }
    Ok(())
}

/// Minutes for a label such as "45 min" or "1h 30min"; the default when
/// the label has no number.
pub fn duration_from_label(label: &str) -> u32 {
    parse_duration_label(label).unwrap_or(DEFAULT_SERVICE_MINUTES)
}

impl Engine {
    // ── Barbers ──────────────────────────────────────────────

    pub async fn create_barber(&self, name: &str) -> Result<Barber, EngineError> {
        if self.store.barber_count() >= MAX_BARBERS {
            return Err(EngineError::LimitExceeded("too many barbers"));
        }
        let barber = Barber {
            id: Ulid::new(),
            name: require_text("name", name, MAX_NAME_LEN)?,
            active: true,
        };
        self.persist_global(&Event::BarberCreated {
            barber: barber.clone(),
        })
        .await?;
        tracing::info!(barber = %barber.id, "created barber {}", barber.name);
        Ok(barber)
    }

    pub async fn update_barber(
        &self,
        id: Ulid,
        name: Option<&str>,
        active: Option<bool>,
    ) -> Result<Barber, EngineError> {
        let name = name
            .map(|n| require_text("name", n, MAX_NAME_LEN))
            .transpose()?;
        let mut guard = self.barber_write(id).await?;
        let mut barber = guard.barber.clone();
        if let Some(name) = name {
            barber.name = name;
        }
        if let Some(active) = active {
            barber.active = active;
        }
        self.persist_and_apply(&mut guard, &Event::BarberUpdated {
            barber: barber.clone(),
        })
        .await?;
        Ok(barber)
    }

    /// Cascades rules and blocks. Refused while an appointment still holds
    /// a slot.
    pub async fn delete_barber(&self, id: Ulid) -> Result<(), EngineError> {
        let guard = self.barber_write(id).await?;
        if guard.has_open_appointments() {
            return Err(EngineError::HasOpenAppointments(id));
        }
        self.persist_global(&Event::BarberDeleted { id }).await?;
        drop(guard);
        tracing::info!(barber = %id, "deleted barber");
        Ok(())
    }

    // ── Weekly rules ─────────────────────────────────────────

    pub async fn add_rule(
        &self,
        barber_id: Ulid,
        day_of_week: u8,
        start: NaiveTime,
        end: NaiveTime,
    ) -> Result<AvailabilityRule, EngineError> {
        validate_day_of_week(day_of_week)?;
        validate_time_range(start, end)?;
        let mut guard = self.barber_write(barber_id).await?;
        if guard.rules.len() >= MAX_RULES_PER_BARBER {
            return Err(EngineError::LimitExceeded("too many rules for barber"));
        }
        let rule = AvailabilityRule {
            id: Ulid::new(),
            barber_id,
            day_of_week,
            start,
            end,
            active: true,
        };
        check_rule_overlap(&guard, &rule)?;
        self.persist_and_apply(&mut guard, &Event::RuleAdded { rule: rule.clone() })
            .await?;
        Ok(rule)
    }

    pub async fn update_rule(
        &self,
        rule_id: Ulid,
        update: RuleUpdate,
    ) -> Result<AvailabilityRule, EngineError> {
        let (_, mut guard) = self.resolve_entity_write(&rule_id).await?;
        let mut rule = guard
            .rules
            .iter()
            .find(|r| r.id == rule_id)
            .cloned()
            .ok_or(EngineError::NotFound(rule_id))?;
        if let Some(day) = update.day_of_week {
            validate_day_of_week(day)?;
            rule.day_of_week = day;
        }
        rule.start = update.start.unwrap_or(rule.start);
        rule.end = update.end.unwrap_or(rule.end);
        rule.active = update.active.unwrap_or(rule.active);
        validate_time_range(rule.start, rule.end)?;
        check_rule_overlap(&guard, &rule)?;
        self.persist_and_apply(&mut guard, &Event::RuleAdded { rule: rule.clone() })
            .await?;
        Ok(rule)
    }

    pub async fn set_rule_active(
        &self,
        rule_id: Ulid,
        active: bool,
    ) -> Result<AvailabilityRule, EngineError> {
        self.update_rule(
            rule_id,
            RuleUpdate {
                active: Some(active),
                ..RuleUpdate::default()
            },
        )
        .await
    }

    pub async fn remove_rule(&self, rule_id: Ulid) -> Result<(), EngineError> {
        let (barber_id, mut guard) = self.resolve_entity_write(&rule_id).await?;
        if !guard.rules.iter().any(|r| r.id == rule_id) {
            return Err(EngineError::NotFound(rule_id));
        }
        self.persist_and_apply(&mut guard, &Event::RuleRemoved {
            id: rule_id,
            barber_id,
        })
        .await
    }

    /// Adds the standard week. Shifts that would overlap an existing active
    /// rule are skipped. Returns the rules created.
    pub async fn apply_default_schedule(
        &self,
        barber_id: Ulid,
    ) -> Result<Vec<AvailabilityRule>, EngineError> {
        let mut guard = self.barber_write(barber_id).await?;
        let mut created = Vec::new();
        for day_of_week in 0..=5u8 {
            for ((sh, sm), (eh, em)) in DEFAULT_SHIFTS {
                let (Some(start), Some(end)) = (
                    NaiveTime::from_hms_opt(sh, sm, 0),
                    NaiveTime::from_hms_opt(eh, em, 0),
                ) else {
                    continue;
                };
                let rule = AvailabilityRule {
                    id: Ulid::new(),
                    barber_id,
                    day_of_week,
                    start,
                    end,
                    active: true,
                };
                if check_rule_overlap(&guard, &rule).is_err() {
                    continue;
                }
                if guard.rules.len() >= MAX_RULES_PER_BARBER {
                    return Err(EngineError::LimitExceeded("too many rules for barber"));
                }
                self.persist_and_apply(&mut guard, &Event::RuleAdded { rule: rule.clone() })
                    .await?;
                created.push(rule);
            }
        }
        tracing::info!(barber = %barber_id, "default schedule added {} rules", created.len());
        Ok(created)
    }

    // ── Services ─────────────────────────────────────────────

    pub async fn create_service(&self, name: &str, duration: u32) -> Result<Service, EngineError> {
        if self.store.service_count() >= MAX_SERVICES {
            return Err(EngineError::LimitExceeded("too many services"));
        }
        validate_duration(duration)?;
        let service = Service {
            id: Ulid::new(),
            name: require_text("name", name, MAX_NAME_LEN)?,
            duration,
            active: true,
        };
        self.persist_global(&Event::ServiceUpserted {
            service: service.clone(),
        })
        .await?;
        Ok(service)
    }

    pub async fn update_service(
        &self,
        id: Ulid,
        name: Option<&str>,
        duration: Option<u32>,
        active: Option<bool>,
    ) -> Result<Service, EngineError> {
        let mut service = self.store.service(&id).ok_or(EngineError::NotFound(id))?;
        if let Some(name) = name {
            service.name = require_text("name", name, MAX_NAME_LEN)?;
        }
        if let Some(duration) = duration {
            validate_duration(duration)?;
            service.duration = duration;
        }
        if let Some(active) = active {
            service.active = active;
        }
        self.persist_global(&Event::ServiceUpserted {
            service: service.clone(),
        })
        .await?;
        Ok(service)
    }

    // ── Temporary blocks ─────────────────────────────────────

    pub async fn create_exception(
        &self,
        barber_id: Ulid,
        date: NaiveDate,
        start: NaiveTime,
        end: NaiveTime,
        reason: Option<&str>,
    ) -> Result<ScheduleException, EngineError> {
        if date < self.clock.today() {
            return Err(EngineError::validation("date", "cannot block a past date"));
        }
        validate_time_range(start, end)?;
        let reason = optional_text("reason", reason, MAX_REASON_LEN)?;
        let mut guard = self.barber_write(barber_id).await?;
        if guard.exceptions.len() >= MAX_EXCEPTIONS_PER_BARBER {
            return Err(EngineError::LimitExceeded("too many blocks for barber"));
        }
        let exception = ScheduleException {
            id: Ulid::new(),
            barber_id,
            date,
            start,
            end,
            reason,
        };
        self.persist_and_apply(&mut guard, &Event::ExceptionAdded {
            exception: exception.clone(),
        })
        .await?;
        Ok(exception)
    }

    /// Ownership-checked: a block of another barber is reported as not found.
    pub async fn delete_exception(&self, id: Ulid, barber_id: Ulid) -> Result<(), EngineError> {
        if self.store.barber_for_entity(&id) != Some(barber_id) {
            return Err(EngineError::NotFound(id));
        }
        let mut guard = self.barber_write(barber_id).await?;
        if !guard.exceptions.iter().any(|e| e.id == id) {
            return Err(EngineError::NotFound(id));
        }
        self.persist_and_apply(&mut guard, &Event::ExceptionRemoved { id, barber_id })
            .await
    }

    /// Delete every block dated before `today`. Returns how many were
    /// removed; a second call with the same `today` removes nothing.
    pub async fn cleanup_exceptions(&self, today: NaiveDate) -> Result<usize, EngineError> {
        let mut removed = 0;
        for barber_id in self.store.barber_ids() {
            let mut guard = match self.barber_write(barber_id).await {
                Ok(guard) => guard,
                Err(EngineError::NotFound(_)) => continue,
                Err(e) => return Err(e),
            };
            let stale: Vec<Ulid> = guard
                .exceptions
                .iter()
                .take_while(|e| e.date < today)
                .map(|e| e.id)
                .collect();
            for id in stale {
                self.persist_and_apply(&mut guard, &Event::ExceptionRemoved { id, barber_id })
                    .await?;
                removed += 1;
            }
        }
        if removed > 0 {
            metrics::counter!(crate::observability::EXCEPTIONS_PURGED_TOTAL).increment(removed as u64);
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn labels_fall_back_to_default() {
        assert_eq!(duration_from_label("45 min"), 45);
        assert_eq!(duration_from_label("1h 30min"), 90);
        assert_eq!(duration_from_label("consultar"), DEFAULT_SERVICE_MINUTES);
    }

    #[test]
    fn day_of_week_bounds() {
        assert!(validate_day_of_week(0).is_ok());
        assert!(validate_day_of_week(6).is_ok());
        assert!(validate_day_of_week(7).is_err());
    }
}

use chrono::NaiveTime;
use ulid::Ulid;

use crate::model::*;

use super::EngineError;

/// Trimmed non-empty text no longer than `max` bytes.
pub(crate) fn require_text(
    field: &'static str,
    value: &str,
    max: usize,
) -> Result<String, EngineError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(EngineError::validation(field, "required"));
    }
    if value.len() > max {
        return Err(EngineError::validation(field, format!("longer than {max} characters")));
    }
    Ok(value.to_string())
}

/// Optional text: blank becomes `None`.
pub(crate) fn optional_text(
    field: &'static str,
    value: Option<&str>,
    max: usize,
) -> Result<Option<String>, EngineError> {
    match value.map(str::trim) {
        None | Some("") => Ok(None),
        Some(v) if v.len() > max => Err(EngineError::validation(
            field,
            format!("longer than {max} characters"),
        )),
        Some(v) => Ok(Some(v.to_string())),
    }
}

/// Plausibility only: one `@`, non-empty local part, a dot in the domain.
pub(crate) fn validate_email(value: &str) -> Result<String, EngineError> {
    let email = require_text("email", value, crate::limits::MAX_EMAIL_LEN)?;
    let plausible = match email.split_once('@') {
        Some((local, domain)) => {
            !local.is_empty()
                && !domain.contains('@')
                && domain.contains('.')
                && !domain.starts_with('.')
                && !domain.ends_with('.')
                && !email.contains(char::is_whitespace)
        }
        None => false,
    };
    if !plausible {
        return Err(EngineError::validation("email", "not a valid address"));
    }
    Ok(normalize_email(&email))
}

pub(crate) fn validate_time_range(start: NaiveTime, end: NaiveTime) -> Result<(), EngineError> {
    if end <= start {
        return Err(EngineError::validation("end", "must be after start"));
    }
    Ok(())
}

/// First active appointment overlapping `span`.
pub(crate) fn check_no_conflict(bs: &BarberState, span: &Span) -> Result<(), EngineError> {
    match bs.overlapping_active(span).next() {
        Some(existing) => Err(EngineError::Conflict(existing.id)),
        None => Ok(()),
    }
}

/// A `confirmed` appointment other than `own` that overlaps `span`.
pub(crate) fn confirmed_overlap(bs: &BarberState, span: &Span, own: Ulid) -> Option<Ulid> {
    bs.overlapping_active(span)
        .find(|a| a.id != own && a.status == AppointmentStatus::Confirmed)
        .map(|a| a.id)
}

/// Active rules of the same weekday must not intersect.
pub(crate) fn check_rule_overlap(bs: &BarberState, rule: &AvailabilityRule) -> Result<(), EngineError> {
    if !rule.active {
        return Ok(());
    }
    match bs
        .rules
        .iter()
        .find(|r| r.id != rule.id && r.active && r.collides_with(rule))
    {
        Some(existing) => Err(EngineError::RuleOverlap(existing.id)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn email_plausibility() {
        assert_eq!(validate_email("  Ana@Example.COM ").unwrap(), "ana@example.com");
        for bad in ["", "ana", "ana@", "@example.com", "ana@example", "a b@example.com", "a@b@c.com"] {
            assert!(validate_email(bad).is_err(), "{bad:?} should be rejected");
        }
    }

    #[test]
    fn required_text_trims_and_caps() {
        assert_eq!(require_text("name", "  Ana ", 10).unwrap(), "Ana");
        assert!(matches!(
            require_text("name", "   ", 10),
            Err(EngineError::Validation { field: "name", .. })
        ));
        assert!(require_text("name", "abcdefghijk", 10).is_err());
    }

    #[test]
    fn optional_text_blank_is_none() {
        assert_eq!(optional_text("notes", Some("  "), 10).unwrap(), None);
        assert_eq!(optional_text("notes", None, 10).unwrap(), None);
        assert_eq!(optional_text("notes", Some(" hi "), 10).unwrap(), Some("hi".into()));
    }

    #[test]
    fn time_range_must_be_forward() {
        let nine = NaiveTime::from_hms_opt(9, 0, 0).unwrap();
        let ten = NaiveTime::from_hms_opt(10, 0, 0).unwrap();
        assert!(validate_time_range(nine, ten).is_ok());
        assert!(validate_time_range(ten, nine).is_err());
        assert!(validate_time_range(nine, nine).is_err());
    }
}

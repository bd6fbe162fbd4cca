use chrono::NaiveDateTime;
use ulid::Ulid;

use crate::model::AppointmentStatus;
use crate::token::TokenError;

#[derive(Debug)]
pub enum EngineError {
    Validation {
        field: &'static str,
        reason: String,
    },
    NotFound(Ulid),
    /// An active appointment already overlaps the requested time.
    Conflict(Ulid),
    /// The requested start is not a bookable slot (outside open hours,
    /// blocked, misaligned or in the past).
    SlotUnavailable(NaiveDateTime),
    RuleOverlap(Ulid),
    InvalidTransition {
        from: AppointmentStatus,
        to: AppointmentStatus,
    },
    HasOpenAppointments(Ulid),
    Token(TokenError),
    LimitExceeded(&'static str),
    WalError(String),
}

impl EngineError {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        EngineError::Validation {
            field,
            reason: reason.into(),
        }
    }
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::Validation { field, reason } => write!(f, "invalid {field}: {reason}"),
            EngineError::NotFound(id) => write!(f, "not found: {id}"),
            EngineError::Conflict(id) => write!(f, "conflict with appointment: {id}"),
            EngineError::SlotUnavailable(at) => write!(f, "slot not available: {at}"),
            EngineError::RuleOverlap(id) => write!(f, "overlaps existing rule: {id}"),
            EngineError::InvalidTransition { from, to } => {
                write!(f, "cannot move appointment from {from} to {to}")
            }
            EngineError::HasOpenAppointments(id) => {
                write!(f, "cannot delete barber {id}: has open appointments")
            }
            EngineError::Token(e) => write!(f, "{e}"),
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}

impl From<TokenError> for EngineError {
    fn from(e: TokenError) -> Self {
        EngineError::Token(e)
    }
}

//! HTTP surface: the public booking flow plus JSON administration.

pub mod barber;
pub mod error;
pub mod public;

use std::sync::Arc;

use axum::extract::State;
use axum::routing::{get, patch, post};
use axum::{middleware, Json, Router};
use chrono::{NaiveDate, NaiveTime};
use serde_json::{json, Value};
use ulid::Ulid;

use crate::engine::Engine;
use crate::observability;

use self::error::ApiError;

#[derive(Clone)]
pub struct AppState {
    pub engine: Arc<Engine>,
}

impl AppState {
    pub fn new(engine: Arc<Engine>) -> Self {
        Self { engine }
    }
}

pub fn router(state: AppState) -> Router {
    Router::new()
        // public
        .route("/availability/:barber_id/:date", get(public::availability))
        .route("/appointments", post(public::request_appointment))
        .route("/appointments/confirm/:token", get(public::confirm_appointment))
        // administration
        .route("/barbers", get(barber::list_barbers).post(barber::create_barber))
        .route(
            "/barbers/:id",
            get(barber::get_barber)
                .patch(barber::update_barber)
                .delete(barber::delete_barber),
        )
        .route("/barbers/:id/rules", get(barber::list_rules).post(barber::add_rule))
        .route("/barbers/:id/rules/default", post(barber::apply_default_schedule))
        .route(
            "/barbers/:id/exceptions",
            get(barber::list_exceptions).post(barber::create_exception),
        )
        .route(
            "/barbers/:id/exceptions/:exception_id",
            axum::routing::delete(barber::delete_exception),
        )
        .route("/barbers/:id/appointments", get(barber::list_appointments))
        .route("/barbers/:id/slots", get(barber::day_slots))
        .route("/unscheduled-barbers", get(barber::barbers_without_schedule))
        .route("/rules/:id", patch(barber::update_rule).delete(barber::remove_rule))
        .route("/appointments/:id", get(barber::get_appointment))
        .route("/appointments/:id/complete", post(barber::complete_appointment))
        .route("/appointments/:id/cancel", post(barber::cancel_appointment))
        .route("/services", get(barber::list_services).post(barber::create_service))
        .route("/services/:id", patch(barber::update_service))
        .route("/health", get(health_check))
        .layer(middleware::from_fn(observability::track_http))
        .with_state(state)
}

async fn health_check(State(state): State<AppState>) -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "barbers": state.engine.store.barber_count(),
        "wal_appends_since_compact": state.engine.wal_appends_since_compact().await,
    }))
}

// ── Path and query parsing shared by both surfaces ──────────────

/// Ids that do not parse cannot name anything: not found.
pub(crate) fn parse_id(raw: &str) -> Result<Ulid, ApiError> {
    raw.parse::<Ulid>()
        .map_err(|_| ApiError::not_found(format!("No encontrado: {raw}")))
}

pub(crate) fn parse_date(raw: &str) -> Option<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").ok()
}

/// Accepts `HH:MM` and `HH:MM:SS`.
pub(crate) fn parse_time(raw: &str) -> Option<NaiveTime> {
    let raw = raw.trim();
    NaiveTime::parse_from_str(raw, "%H:%M")
        .or_else(|_| NaiveTime::parse_from_str(raw, "%H:%M:%S"))
        .ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn time_formats() {
        assert_eq!(parse_time("09:30"), NaiveTime::from_hms_opt(9, 30, 0));
        assert_eq!(parse_time("09:30:15"), NaiveTime::from_hms_opt(9, 30, 15));
        assert_eq!(parse_time("9h30"), None);
    }

    #[test]
    fn date_format_is_iso() {
        assert_eq!(parse_date("2024-06-10"), NaiveDate::from_ymd_opt(2024, 6, 10));
        assert_eq!(parse_date("10/06/2024"), None);
        assert_eq!(parse_date("2024-02-30"), None);
    }

    #[test]
    fn bad_id_is_not_found() {
        let err = parse_id("not-a-ulid").unwrap_err();
        assert_eq!(err.status, axum::http::StatusCode::NOT_FOUND);
    }
}

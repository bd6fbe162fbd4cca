//! Administration endpoints (JSON). Authentication sits in front of these
//! routes and is not handled here.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::engine::{duration_from_label, RuleUpdate};
use crate::model::*;

use super::error::{ApiError, ApiJson, ApiResult};
use super::{parse_date, parse_id, parse_time, AppState};

fn date_param(field: &str, raw: Option<&str>) -> ApiResult<Option<chrono::NaiveDate>> {
    match raw.map(str::trim).filter(|s| !s.is_empty()) {
        None => Ok(None),
        Some(raw) => parse_date(raw)
            .map(Some)
            .ok_or_else(|| ApiError::bad_request(format!("Fecha inválida en {field}: {raw}"))),
    }
}

fn time_field(field: &str, raw: &str) -> ApiResult<chrono::NaiveTime> {
    parse_time(raw).ok_or_else(|| ApiError::bad_request(format!("Hora inválida en {field}: {raw}")))
}

// ── Barbers ─────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewBarber {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BarberPatch {
    pub name: Option<String>,
    pub active: Option<bool>,
}

pub async fn list_barbers(State(state): State<AppState>) -> Json<Vec<Barber>> {
    Json(state.engine.list_barbers().await)
}

pub async fn barbers_without_schedule(State(state): State<AppState>) -> Json<Vec<Barber>> {
    Json(state.engine.barbers_without_schedule().await)
}

pub async fn create_barber(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewBarber>,
) -> ApiResult<(StatusCode, Json<Barber>)> {
    let barber = state.engine.create_barber(&body.name).await?;
    Ok((StatusCode::CREATED, Json(barber)))
}

pub async fn get_barber(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Barber>> {
    Ok(Json(state.engine.get_barber(parse_id(&id)?).await?))
}

pub async fn update_barber(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<BarberPatch>,
) -> ApiResult<Json<Barber>> {
    let barber = state
        .engine
        .update_barber(parse_id(&id)?, body.name.as_deref(), body.active)
        .await?;
    Ok(Json(barber))
}

pub async fn delete_barber(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.delete_barber(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Weekly rules ────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct NewRule {
    pub day_of_week: u8,
    pub start: String,
    pub end: String,
}

#[derive(Debug, Deserialize)]
pub struct RulePatch {
    pub day_of_week: Option<u8>,
    pub start: Option<String>,
    pub end: Option<String>,
    pub active: Option<bool>,
}

pub async fn list_rules(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<AvailabilityRule>>> {
    Ok(Json(state.engine.list_rules(parse_id(&id)?).await?))
}

pub async fn add_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewRule>,
) -> ApiResult<(StatusCode, Json<AvailabilityRule>)> {
    let barber_id = parse_id(&id)?;
    let start = time_field("start", &body.start)?;
    let end = time_field("end", &body.end)?;
    let rule = state
        .engine
        .add_rule(barber_id, body.day_of_week, start, end)
        .await?;
    Ok((StatusCode::CREATED, Json(rule)))
}

pub async fn apply_default_schedule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<(StatusCode, Json<Vec<AvailabilityRule>>)> {
    let rules = state.engine.apply_default_schedule(parse_id(&id)?).await?;
    Ok((StatusCode::CREATED, Json(rules)))
}

pub async fn update_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<RulePatch>,
) -> ApiResult<Json<AvailabilityRule>> {
    let rule_id = parse_id(&id)?;
    let update = RuleUpdate {
        day_of_week: body.day_of_week,
        start: body.start.as_deref().map(|s| time_field("start", s)).transpose()?,
        end: body.end.as_deref().map(|s| time_field("end", s)).transpose()?,
        active: body.active,
    };
    let rule = match update {
        RuleUpdate {
            day_of_week: None,
            start: None,
            end: None,
            active: Some(active),
        } => state.engine.set_rule_active(rule_id, active).await?,
        update => state.engine.update_rule(rule_id, update).await?,
    };
    Ok(Json(rule))
}

pub async fn remove_rule(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    state.engine.remove_rule(parse_id(&id)?).await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Blocks ──────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct FromQuery {
    pub from: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewException {
    pub date: String,
    pub start: String,
    pub end: String,
    pub reason: Option<String>,
}

pub async fn list_exceptions(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<FromQuery>,
) -> ApiResult<Json<Vec<ScheduleException>>> {
    let from = date_param("from", query.from.as_deref())?;
    Ok(Json(state.engine.list_exceptions(parse_id(&id)?, from).await?))
}

pub async fn create_exception(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<NewException>,
) -> ApiResult<(StatusCode, Json<ScheduleException>)> {
    let barber_id = parse_id(&id)?;
    let date = date_param("date", Some(body.date.as_str()))?
        .ok_or_else(|| ApiError::missing_field("date"))?;
    let start = time_field("start", &body.start)?;
    let end = time_field("end", &body.end)?;
    let exception = state
        .engine
        .create_exception(barber_id, date, start, end, body.reason.as_deref())
        .await?;
    Ok((StatusCode::CREATED, Json(exception)))
}

pub async fn delete_exception(
    State(state): State<AppState>,
    Path((id, exception_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let barber_id = parse_id(&id)?;
    state
        .engine
        .delete_exception(parse_id(&exception_id)?, barber_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}

// ── Appointments and slots ──────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DateQuery {
    pub date: Option<String>,
    pub service_id: Option<String>,
}

pub async fn list_appointments(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Vec<Appointment>>> {
    let date = date_param("date", query.date.as_deref())?;
    Ok(Json(state.engine.list_appointments(parse_id(&id)?, date).await?))
}

#[derive(Debug, Serialize)]
pub struct SlotView {
    pub start: String,
    pub state: crate::engine::SlotState,
}

/// Every candidate of a day with its state, for the barber's own view.
pub async fn day_slots(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(query): Query<DateQuery>,
) -> ApiResult<Json<Vec<SlotView>>> {
    let barber_id = parse_id(&id)?;
    let date = date_param("date", query.date.as_deref())?
        .unwrap_or_else(|| state.engine.clock().today());
    let service_id = query
        .service_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_id)
        .transpose()?;
    let duration = state.engine.service_duration(service_id)?;
    let slots = state.engine.slots(barber_id, date, duration).await?;
    Ok(Json(
        slots
            .iter()
            .map(|s| SlotView {
                start: s.label(),
                state: s.state,
            })
            .collect(),
    ))
}

pub async fn get_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.engine.get_appointment(parse_id(&id)?).await?))
}

pub async fn complete_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.engine.complete(parse_id(&id)?).await?))
}

pub async fn cancel_appointment(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Appointment>> {
    Ok(Json(state.engine.cancel(parse_id(&id)?).await?))
}

// ── Services ────────────────────────────────────────────────────

/// Minutes as a number, or a label such as "1h 30min".
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum DurationInput {
    Minutes(u32),
    Label(String),
}

impl DurationInput {
    fn minutes(&self) -> u32 {
        match self {
            DurationInput::Minutes(m) => *m,
            DurationInput::Label(label) => duration_from_label(label),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct NewService {
    pub name: String,
    pub duration: Option<DurationInput>,
}

#[derive(Debug, Deserialize)]
pub struct ServicePatch {
    pub name: Option<String>,
    pub duration: Option<DurationInput>,
    pub active: Option<bool>,
}

pub async fn list_services(State(state): State<AppState>) -> Json<Vec<Service>> {
    Json(state.engine.list_services())
}

pub async fn create_service(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<NewService>,
) -> ApiResult<(StatusCode, Json<Service>)> {
    let duration = body
        .duration
        .as_ref()
        .map_or(crate::limits::DEFAULT_SERVICE_MINUTES, DurationInput::minutes);
    let service = state.engine.create_service(&body.name, duration).await?;
    Ok((StatusCode::CREATED, Json(service)))
}

pub async fn update_service(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(body): ApiJson<ServicePatch>,
) -> ApiResult<Json<Service>> {
    let service = state
        .engine
        .update_service(
            parse_id(&id)?,
            body.name.as_deref(),
            body.duration.as_ref().map(DurationInput::minutes),
            body.active,
        )
        .await?;
    Ok(Json(service))
}

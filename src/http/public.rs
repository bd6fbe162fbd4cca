//! Client-facing endpoints. Messages are in Spanish.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::engine::{BookingRequest, Confirmation, EngineError};
use crate::model::AppointmentStatus;
use crate::token::TokenError;

use super::error::{ApiError, ApiJson, ApiResult, GENERIC_FAILURE};
use super::{parse_date, parse_id, parse_time, AppState};

const INVALID_DATE: &str = "Formato de fecha inválido. Use YYYY-MM-DD.";
const BOOKING_RECEIVED: &str = "Solicitud de cita recibida. Por favor, revisa tu correo electrónico para confirmar la cita en la próxima hora.";

#[derive(Debug, Deserialize)]
pub struct AvailabilityQuery {
    pub service_id: Option<String>,
}

pub async fn availability(
    State(state): State<AppState>,
    Path((barber_id, date)): Path<(String, String)>,
    Query(query): Query<AvailabilityQuery>,
) -> ApiResult<Json<Value>> {
    let barber_id = parse_id(&barber_id)?;
    let date = parse_date(&date).ok_or_else(|| ApiError::bad_request(INVALID_DATE))?;
    let service_id = query
        .service_id
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(parse_id)
        .transpose()?;

    let schedule = state
        .engine
        .available_slots(barber_id, date, service_id)
        .await?;
    let name = &schedule.barber.name;
    let fecha = date.format("%Y-%m-%d").to_string();
    let mensaje = if !schedule.has_rules {
        format!("{name} no tiene horario configurado para este día.")
    } else if schedule.slots.is_empty() {
        format!(
            "No hay horarios disponibles para {name} el {fecha} con duración de {} min.",
            schedule.duration
        )
    } else {
        format!("Horarios disponibles para {name} el {fecha}")
    };
    let horarios: Vec<String> = schedule.slots.iter().map(|s| s.label()).collect();

    Ok(Json(json!({
        "barbero": name,
        "fecha": fecha,
        "horarios": horarios,
        "mensaje": mensaje,
    })))
}

/// Booking form. Everything is optional here so a missing field is
/// reported by name instead of as a body rejection.
#[derive(Debug, Default, Deserialize)]
pub struct AppointmentForm {
    pub barbero_id: Option<String>,
    pub servicio_id: Option<String>,
    pub fecha: Option<String>,
    pub hora: Option<String>,
    pub nombre: Option<String>,
    pub email: Option<String>,
    pub telefono: Option<String>,
    pub notas: Option<String>,
}

fn required<'a>(field: &'static str, value: &'a Option<String>) -> ApiResult<&'a str> {
    match value.as_deref().map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(ApiError::missing_field(field)),
    }
}

impl AppointmentForm {
    fn into_request(self) -> ApiResult<BookingRequest> {
        let barber_id = required("barbero_id", &self.barbero_id)?;
        let service_id = required("servicio_id", &self.servicio_id)?;
        let fecha = required("fecha", &self.fecha)?;
        let hora = required("hora", &self.hora)?;
        let nombre = required("nombre", &self.nombre)?;
        let email = required("email", &self.email)?;
        let telefono = required("telefono", &self.telefono)?;

        let (Some(date), Some(time)) = (parse_date(fecha), parse_time(hora)) else {
            return Err(ApiError::bad_request(format!(
                "Formato de fecha u hora inválido: {fecha} {hora}"
            )));
        };
        Ok(BookingRequest {
            barber_id: parse_id(barber_id)?,
            service_id: parse_id(service_id)?,
            scheduled_at: date.and_time(time),
            client_name: nombre.to_string(),
            client_email: email.to_string(),
            client_phone: Some(telefono.to_string()),
            notes: self.notas,
        })
    }
}

pub async fn request_appointment(
    State(state): State<AppState>,
    ApiJson(form): ApiJson<AppointmentForm>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let request = form.into_request()?;
    let receipt = state.engine.book(request).await?;
    Ok((
        StatusCode::CREATED,
        Json(json!({
            "success": true,
            "mensaje": BOOKING_RECEIVED,
            "cita_id": receipt.appointment.id.to_string(),
        })),
    ))
}

// ── Confirmation page ───────────────────────────────────────────

const LINK_INVALID: &str = "El enlace de confirmación no es válido o ha expirado.";
const CONFIRMED: &str = "¡Tu cita ha sido confirmada exitosamente!";
const ALREADY_CONFIRMED: &str = "¡Tu cita ya estaba confirmada!";
const TAKEN_BEFORE_CONFIRMATION: &str =
    "Lo sentimos, este horario fue tomado justo antes de tu confirmación. Por favor, agenda de nuevo.";

fn status_label(status: AppointmentStatus) -> &'static str {
    match status {
        AppointmentStatus::PendingConfirmation => "pendiente de confirmación",
        AppointmentStatus::Confirmed => "confirmada",
        AppointmentStatus::Cancelled => "cancelada",
        AppointmentStatus::CancelledConflict => "cancelada por conflicto",
        AppointmentStatus::Completed => "completada",
        AppointmentStatus::Expired => "expirada",
    }
}

fn page(status: StatusCode, success: bool, message: &str) -> Response {
    let title = if success { "Cita confirmada" } else { "No se pudo confirmar la cita" };
    let class = if success { "success" } else { "error" };
    let body = format!(
        "<!DOCTYPE html>\n<html lang=\"es\">\n<head><meta charset=\"utf-8\"><title>{title}</title></head>\n\
         <body><main class=\"{class}\"><h1>{title}</h1><p>{message}</p></main></body>\n</html>\n"
    );
    (status, Html(body)).into_response()
}

/// Renders a status page for every outcome; token problems are 4xx pages.
pub async fn confirm_appointment(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Response {
    match state.engine.confirm(&token).await {
        Ok(Confirmation::Confirmed(_)) => page(StatusCode::OK, true, CONFIRMED),
        Ok(Confirmation::Superseded { .. }) => {
            page(StatusCode::CONFLICT, false, TAKEN_BEFORE_CONFIRMATION)
        }
        Err(EngineError::Token(TokenError::AlreadyUsed(AppointmentStatus::Confirmed))) => {
            page(StatusCode::OK, true, ALREADY_CONFIRMED)
        }
        Err(EngineError::Token(TokenError::AlreadyUsed(status))) => page(
            StatusCode::CONFLICT,
            false,
            &format!(
                "Esta cita ya no puede ser confirmada (estado actual: {}).",
                status_label(status)
            ),
        ),
        Err(EngineError::Token(e)) => page(super::error::token_status(&e), false, LINK_INVALID),
        Err(EngineError::NotFound(_)) => page(StatusCode::NOT_FOUND, false, LINK_INVALID),
        Err(e) => {
            tracing::error!("confirmation failed: {e}");
            page(StatusCode::INTERNAL_SERVER_ERROR, false, GENERIC_FAILURE)
        }
    }
}

use axum::async_trait;
use axum::extract::rejection::JsonRejection;
use axum::extract::{FromRequest, Request};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::engine::EngineError;
use crate::token::TokenError;

pub const GENERIC_FAILURE: &str =
    "Ocurrió un error al procesar tu solicitud. Inténtalo de nuevo más tarde.";
pub const SLOT_TAKEN: &str =
    "Este horario se solapa con otra cita. Por favor, selecciona otro horario.";

/// JSON error body `{"success": false, "error": "<message>"}` with a status.
#[derive(Debug)]
pub struct ApiError {
    pub status: StatusCode,
    pub message: String,
}

pub type ApiResult<T> = Result<T, ApiError>;

impl ApiError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn missing_field(field: &str) -> Self {
        Self::bad_request(format!("Falta el campo o está vacío: {field}"))
    }
}

/// Public (Spanish) name of an engine field.
pub fn public_field(field: &str) -> &str {
    match field {
        "name" => "nombre",
        "phone" => "telefono",
        "notes" => "notas",
        "date" => "fecha",
        "start" => "hora_inicio",
        "end" => "hora_fin",
        "reason" => "motivo",
        "duration" => "duracion",
        "day_of_week" => "dia_semana",
        other => other,
    }
}

pub fn token_status(e: &TokenError) -> StatusCode {
    match e {
        TokenError::Malformed | TokenError::BadSignature => StatusCode::BAD_REQUEST,
        TokenError::Expired => StatusCode::GONE,
        TokenError::AlreadyUsed(_) => StatusCode::CONFLICT,
    }
}

impl From<EngineError> for ApiError {
    fn from(e: EngineError) -> Self {
        match e {
            EngineError::Validation { field, reason } => {
                let field = public_field(field);
                if reason == "required" {
                    ApiError::missing_field(field)
                } else {
                    ApiError::bad_request(format!("Valor inválido para {field}: {reason}"))
                }
            }
            EngineError::NotFound(id) => ApiError::not_found(format!("No encontrado: {id}")),
            EngineError::Conflict(_) | EngineError::SlotUnavailable(_) => {
                ApiError::new(StatusCode::CONFLICT, SLOT_TAKEN)
            }
            EngineError::RuleOverlap(id) => ApiError::new(
                StatusCode::CONFLICT,
                format!("El horario se solapa con otro existente para ese día ({id})."),
            ),
            EngineError::InvalidTransition { from, to } => ApiError::new(
                StatusCode::CONFLICT,
                format!("La cita no puede pasar de {from} a {to}."),
            ),
            EngineError::HasOpenAppointments(_) => ApiError::new(
                StatusCode::CONFLICT,
                "El barbero tiene citas pendientes o confirmadas.",
            ),
            EngineError::Token(ref token) => ApiError::new(token_status(token), e.to_string()),
            EngineError::LimitExceeded(msg) => {
                ApiError::bad_request(format!("Límite excedido: {msg}"))
            }
            EngineError::WalError(detail) => {
                tracing::error!("journal failure: {detail}");
                ApiError::new(StatusCode::INTERNAL_SERVER_ERROR, GENERIC_FAILURE)
            }
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        match rejection {
            JsonRejection::JsonDataError(e) => {
                ApiError::bad_request(format!("Datos inválidos: {}", e.body_text()))
            }
            JsonRejection::JsonSyntaxError(_) => {
                ApiError::bad_request("El cuerpo de la solicitud no es JSON válido.")
            }
            JsonRejection::MissingJsonContentType(_) => {
                ApiError::bad_request("Se requiere Content-Type: application/json.")
            }
            other => ApiError::bad_request(other.body_text()),
        }
    }
}

/// `Json` whose rejections use the `{"success": false, "error"}` body.
pub struct ApiJson<T>(pub T);

#[async_trait]
impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(ApiJson(value))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "success": false,
            "error": self.message,
        }));
        (self.status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::AppointmentStatus;
    use ulid::Ulid;

    #[test]
    fn status_mapping() {
        let cases = [
            (EngineError::validation("name", "required"), StatusCode::BAD_REQUEST),
            (EngineError::NotFound(Ulid::new()), StatusCode::NOT_FOUND),
            (EngineError::Conflict(Ulid::new()), StatusCode::CONFLICT),
            (EngineError::RuleOverlap(Ulid::new()), StatusCode::CONFLICT),
            (EngineError::HasOpenAppointments(Ulid::new()), StatusCode::CONFLICT),
            (
                EngineError::InvalidTransition {
                    from: AppointmentStatus::Completed,
                    to: AppointmentStatus::Cancelled,
                },
                StatusCode::CONFLICT,
            ),
            (EngineError::Token(TokenError::Expired), StatusCode::GONE),
            (EngineError::Token(TokenError::BadSignature), StatusCode::BAD_REQUEST),
            (EngineError::LimitExceeded("x"), StatusCode::BAD_REQUEST),
            (EngineError::WalError("disk".into()), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (err, status) in cases {
            assert_eq!(ApiError::from(err).status, status);
        }
    }

    #[test]
    fn missing_field_names_public_field() {
        let err = ApiError::from(EngineError::validation("name", "required"));
        assert_eq!(err.message, "Falta el campo o está vacío: nombre");
    }

    #[test]
    fn journal_failure_hides_detail() {
        let err = ApiError::from(EngineError::WalError("/data/x.wal: EIO".into()));
        assert_eq!(err.message, GENERIC_FAILURE);
    }
}

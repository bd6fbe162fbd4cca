use hmac::{Hmac, Mac};
use sha2::Sha256;
use ulid::Ulid;

use crate::model::{Ms, MINUTE_MS};

type HmacSha256 = Hmac<Sha256>;

/// Why a confirmation token was refused.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    Malformed,
    BadSignature,
    Expired,
    /// The appointment left `pending_confirmation` (confirmed, cancelled, expired...).
    AlreadyUsed(crate::model::AppointmentStatus),
}

impl std::fmt::Display for TokenError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TokenError::Malformed => write!(f, "malformed confirmation token"),
            TokenError::BadSignature => write!(f, "invalid confirmation token signature"),
            TokenError::Expired => write!(f, "confirmation token expired"),
            TokenError::AlreadyUsed(status) => {
                write!(f, "appointment no longer awaiting confirmation ({status})")
            }
        }
    }
}

impl std::error::Error for TokenError {}

/// Stateless, signed, time-limited confirmation tokens.
///
/// Format: `<appointment ulid>.<issued_at ms>.<hex hmac-sha256>`. The MAC
/// covers `"<ulid>.<issued_at>"`; nothing is stored server-side.
#[derive(Clone)]
pub struct TokenSigner {
    secret: Vec<u8>,
    ttl_ms: Ms,
}

impl TokenSigner {
    pub fn new(secret: impl Into<Vec<u8>>, ttl_minutes: u32) -> Self {
        Self {
            secret: secret.into(),
            ttl_ms: ttl_minutes as Ms * MINUTE_MS,
        }
    }

    pub fn ttl_ms(&self) -> Ms {
        self.ttl_ms
    }

    fn mac(&self) -> HmacSha256 {
        // HMAC accepts keys of any length.
        HmacSha256::new_from_slice(&self.secret).expect("hmac key of any size")
    }

    pub fn issue(&self, appointment_id: Ulid, issued_at: Ms) -> String {
        let payload = format!("{appointment_id}.{issued_at}");
        let mut mac = self.mac();
        mac.update(payload.as_bytes());
        let sig = hex::encode(mac.finalize().into_bytes());
        format!("{payload}.{sig}")
    }

    /// Check signature and age. Returns the bound appointment id.
    pub fn verify(&self, token: &str, now: Ms) -> Result<Ulid, TokenError> {
        let mut parts = token.trim().splitn(3, '.');
        let (Some(id_part), Some(ts_part), Some(sig_part)) = (parts.next(), parts.next(), parts.next())
        else {
            return Err(TokenError::Malformed);
        };
        let appointment_id = Ulid::from_string(id_part).map_err(|_| TokenError::Malformed)?;
        let issued_at: Ms = ts_part.parse().map_err(|_| TokenError::Malformed)?;
        let sig = hex::decode(sig_part).map_err(|_| TokenError::Malformed)?;

        let mut mac = self.mac();
        mac.update(format!("{id_part}.{ts_part}").as_bytes());
        mac.verify_slice(&sig).map_err(|_| TokenError::BadSignature)?;

        if now - issued_at > self.ttl_ms {
            return Err(TokenError::Expired);
        }
        Ok(appointment_id)
    }
}

// Hard caps on input sizes and entity counts.

pub const MAX_BARBERS: usize = 500;
pub const MAX_SERVICES: usize = 500;
pub const MAX_RULES_PER_BARBER: usize = 64;
pub const MAX_EXCEPTIONS_PER_BARBER: usize = 2_000;

pub const MAX_NAME_LEN: usize = 120;
pub const MAX_EMAIL_LEN: usize = 254;
pub const MAX_PHONE_LEN: usize = 32;
pub const MAX_NOTES_LEN: usize = 1_000;
pub const MAX_REASON_LEN: usize = 255;

/// Longest bookable service, in minutes.
pub const MAX_SERVICE_MINUTES: u32 = 8 * 60;

/// Duration used when no service is given or a label cannot be parsed.
pub const DEFAULT_SERVICE_MINUTES: u32 = 30;

pub const DEFAULT_SLOT_STEP_MINUTES: u32 = 15;
pub const DEFAULT_TOKEN_TTL_MINUTES: u32 = 60;

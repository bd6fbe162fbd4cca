use std::collections::BTreeMap;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime, TimeDelta};
use serde::{Deserialize, Serialize};
use ulid::Ulid;

/// Milliseconds since the naive local epoch. All interval math uses this unit.
pub type Ms = i64;

pub const MINUTE_MS: Ms = 60_000;

pub fn ms_of(dt: NaiveDateTime) -> Ms {
    dt.and_utc().timestamp_millis()
}

pub fn datetime_of(ms: Ms) -> NaiveDateTime {
    chrono::DateTime::<chrono::Utc>::from_timestamp_millis(ms)
        .map(|dt| dt.naive_utc())
        .unwrap_or_default()
}

pub fn ms_at(date: NaiveDate, time: NaiveTime) -> Ms {
    ms_of(date.and_time(time))
}

pub fn minutes_ms(minutes: u32) -> Ms {
    minutes as Ms * MINUTE_MS
}

/// Monday = 0 .. Sunday = 6.
pub fn weekday_index(date: NaiveDate) -> u8 {
    date.weekday().num_days_from_monday() as u8
}

/// Half-open interval `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    pub start: Ms,
    pub end: Ms,
}

impl Span {
    pub fn new(start: Ms, end: Ms) -> Self {
        debug_assert!(start < end, "Span start must be before end");
        Self { start, end }
    }

    pub fn on(date: NaiveDate, start: NaiveTime, end: NaiveTime) -> Self {
        Self::new(ms_at(date, start), ms_at(date, end))
    }

    pub fn duration_ms(&self) -> Ms {
        self.end - self.start
    }

    pub fn overlaps(&self, other: &Span) -> bool {
        self.start < other.end && other.start < self.end
    }

    pub fn contains_span(&self, other: &Span) -> bool {
        self.start <= other.start && other.end <= self.end
    }
}

// ── Entities ─────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Barber {
    pub id: Ulid,
    pub name: String,
    pub active: bool,
}

/// Recurring weekly open hours for one barber on one weekday.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvailabilityRule {
    pub id: Ulid,
    pub barber_id: Ulid,
    pub day_of_week: u8,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub active: bool,
}

impl AvailabilityRule {
    pub fn span_on(&self, date: NaiveDate) -> Span {
        Span::on(date, self.start, self.end)
    }

    /// Same weekday and intersecting time ranges.
    pub fn collides_with(&self, other: &AvailabilityRule) -> bool {
        self.day_of_week == other.day_of_week && self.start < other.end && other.start < self.end
    }
}

/// A temporary block: removes availability on one date.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleException {
    pub id: Ulid,
    pub barber_id: Ulid,
    pub date: NaiveDate,
    pub start: NaiveTime,
    pub end: NaiveTime,
    pub reason: Option<String>,
}

impl ScheduleException {
    pub fn span(&self) -> Span {
        Span::on(self.date, self.start, self.end)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Service {
    pub id: Ulid,
    pub name: String,
    /// Minutes.
    pub duration: u32,
    pub active: bool,
}

/// Parse duration labels such as "30 min", "1 hora", "1h 30min" or "45".
/// Returns `None` when no number is found.
pub fn parse_duration_label(label: &str) -> Option<u32> {
    let lower = label.trim().to_lowercase();
    let mut total: u32 = 0;
    let mut found = false;
    let mut chars = lower.chars().peekable();

    while let Some(&c) = chars.peek() {
        if !c.is_ascii_digit() {
            chars.next();
            continue;
        }
        let mut value: u32 = 0;
        while let Some(&d) = chars.peek() {
            match d.to_digit(10) {
                Some(digit) => {
                    value = value.checked_mul(10)?.checked_add(digit)?;
                    chars.next();
                }
                None => break,
            }
        }
        while chars.peek().is_some_and(|c| c.is_whitespace()) {
            chars.next();
        }
        let unit: String = chars
            .clone()
            .take_while(|c| c.is_alphabetic())
            .collect();
        let is_hours = unit.starts_with('h');
        total = total.checked_add(if is_hours { value.checked_mul(60)? } else { value })?;
        found = true;
    }

    if found && total > 0 { Some(total) } else { None }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientSegment {
    New,
    Occasional,
    Recurring,
    Vip,
    Inactive,
}

impl ClientSegment {
    /// Days without a completed visit after which a client counts as inactive.
    pub const INACTIVE_AFTER_DAYS: i64 = 180;

    pub fn classify(total_visits: u32, last_visit: Option<NaiveDateTime>, now: NaiveDateTime) -> Self {
        if let Some(last) = last_visit
            && now - last > TimeDelta::days(Self::INACTIVE_AFTER_DAYS)
        {
            return ClientSegment::Inactive;
        }
        match total_visits {
            0..=1 => ClientSegment::New,
            2..=4 => ClientSegment::Occasional,
            5..=9 => ClientSegment::Recurring,
            _ => ClientSegment::Vip,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Client {
    pub id: Ulid,
    pub name: String,
    pub email: String,
    pub phone: Option<String>,
    pub total_visits: u32,
    pub last_visit: Option<NaiveDateTime>,
    pub segment: ClientSegment,
}

pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AppointmentStatus {
    PendingConfirmation,
    Confirmed,
    Cancelled,
    CancelledConflict,
    Completed,
    Expired,
}

impl AppointmentStatus {
    /// Whether the appointment holds its slot.
    pub fn is_active(self) -> bool {
        matches!(self, AppointmentStatus::PendingConfirmation | AppointmentStatus::Confirmed)
    }

    pub fn is_terminal(self) -> bool {
        !self.is_active()
    }

    pub fn can_transition_to(self, next: AppointmentStatus) -> bool {
        use AppointmentStatus::*;
        matches!(
            (self, next),
            (PendingConfirmation, Confirmed)
                | (PendingConfirmation, Cancelled)
                | (PendingConfirmation, CancelledConflict)
                | (PendingConfirmation, Expired)
                | (Confirmed, Completed)
                | (Confirmed, Cancelled)
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            AppointmentStatus::PendingConfirmation => "pending_confirmation",
            AppointmentStatus::Confirmed => "confirmed",
            AppointmentStatus::Cancelled => "cancelled",
            AppointmentStatus::CancelledConflict => "cancelled_conflict",
            AppointmentStatus::Completed => "completed",
            AppointmentStatus::Expired => "expired",
        }
    }
}

impl std::fmt::Display for AppointmentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Appointment {
    pub id: Ulid,
    pub barber_id: Ulid,
    pub client_id: Ulid,
    pub service_id: Ulid,
    pub scheduled_at: NaiveDateTime,
    /// Minutes, copied from the service when booked.
    pub duration: u32,
    pub status: AppointmentStatus,
    pub created_at: NaiveDateTime,
    pub confirmed_at: Option<NaiveDateTime>,
    pub notes: Option<String>,
}

impl Appointment {
    pub fn span(&self) -> Span {
        let start = ms_of(self.scheduled_at);
        Span::new(start, start + minutes_ms(self.duration))
    }
}

// ── Per-barber state ─────────────────────────────────────────────

/// Everything scheduled for one barber. Guarded by one lock in the store.
#[derive(Debug, Clone)]
pub struct BarberState {
    pub barber: Barber,
    pub rules: Vec<AvailabilityRule>,
    /// Sorted by `(date, start)`.
    pub exceptions: Vec<ScheduleException>,
    /// Sorted by `scheduled_at`.
    pub appointments: Vec<Appointment>,
    /// Start instant → id of the active appointment starting there.
    active_starts: BTreeMap<Ms, Ulid>,
}

impl BarberState {
    pub fn new(barber: Barber) -> Self {
        Self {
            barber,
            rules: Vec::new(),
            exceptions: Vec::new(),
            appointments: Vec::new(),
            active_starts: BTreeMap::new(),
        }
    }

    pub fn rules_for(&self, day_of_week: u8) -> impl Iterator<Item = &AvailabilityRule> {
        self.rules
            .iter()
            .filter(move |r| r.active && r.day_of_week == day_of_week)
    }

    pub fn insert_rule(&mut self, rule: AvailabilityRule) {
        self.rules.retain(|r| r.id != rule.id);
        self.rules.push(rule);
        self.rules.sort_by_key(|r| (r.day_of_week, r.start));
    }

    pub fn remove_rule(&mut self, id: Ulid) -> Option<AvailabilityRule> {
        let pos = self.rules.iter().position(|r| r.id == id)?;
        Some(self.rules.remove(pos))
    }

    pub fn insert_exception(&mut self, exception: ScheduleException) {
        let key = (exception.date, exception.start);
        let pos = self
            .exceptions
            .partition_point(|e| (e.date, e.start) <= key);
        self.exceptions.insert(pos, exception);
    }

    pub fn remove_exception(&mut self, id: Ulid) -> Option<ScheduleException> {
        let pos = self.exceptions.iter().position(|e| e.id == id)?;
        Some(self.exceptions.remove(pos))
    }

    pub fn exceptions_on(&self, date: NaiveDate) -> impl Iterator<Item = &ScheduleException> {
        let from = self.exceptions.partition_point(|e| e.date < date);
        self.exceptions[from..]
            .iter()
            .take_while(move |e| e.date == date)
    }

    /// Insert keeping `scheduled_at` order.
    pub fn insert_appointment(&mut self, appointment: Appointment) {
        let pos = self
            .appointments
            .partition_point(|a| a.scheduled_at <= appointment.scheduled_at);
        if appointment.status.is_active() {
            self.active_starts
                .insert(ms_of(appointment.scheduled_at), appointment.id);
        }
        self.appointments.insert(pos, appointment);
    }

    pub fn appointment(&self, id: Ulid) -> Option<&Appointment> {
        self.appointments.iter().find(|a| a.id == id)
    }

    /// Apply a status change. Returns the updated appointment.
    pub fn set_status(
        &mut self,
        id: Ulid,
        status: AppointmentStatus,
        at: NaiveDateTime,
    ) -> Option<&Appointment> {
        let appt = self.appointments.iter_mut().find(|a| a.id == id)?;
        let start = ms_of(appt.scheduled_at);
        appt.status = status;
        if status == AppointmentStatus::Confirmed {
            appt.confirmed_at = Some(at);
        }
        if status.is_active() {
            self.active_starts.insert(start, id);
        } else if self.active_starts.get(&start) == Some(&id) {
            self.active_starts.remove(&start);
        }
        Some(&*appt)
    }

    /// The uniqueness constraint on `(barber, scheduled_at)` for active appointments.
    pub fn start_taken(&self, start: Ms) -> Option<Ulid> {
        self.active_starts.get(&start).copied()
    }

    /// Active appointments whose span overlaps `query`.
    pub fn overlapping_active(&self, query: &Span) -> impl Iterator<Item = &Appointment> {
        let query = *query;
        self.appointments
            .iter()
            .take_while(move |a| ms_of(a.scheduled_at) < query.end)
            .filter(move |a| a.status.is_active() && a.span().overlaps(&query))
    }

    pub fn has_open_appointments(&self) -> bool {
        !self.active_starts.is_empty()
    }
}

/// The journal record format. One variant per state change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Event {
    BarberCreated {
        barber: Barber,
    },
    BarberUpdated {
        barber: Barber,
    },
    BarberDeleted {
        id: Ulid,
    },
    RuleAdded {
        rule: AvailabilityRule,
    },
    RuleRemoved {
        id: Ulid,
        barber_id: Ulid,
    },
    ExceptionAdded {
        exception: ScheduleException,
    },
    ExceptionRemoved {
        id: Ulid,
        barber_id: Ulid,
    },
    ServiceUpserted {
        service: Service,
    },
    ClientUpserted {
        client: Client,
    },
    AppointmentBooked {
        appointment: Appointment,
    },
    AppointmentStatusChanged {
        id: Ulid,
        barber_id: Ulid,
        status: AppointmentStatus,
        at: NaiveDateTime,
    },
}

impl Event {
    /// Barber whose state this event mutates, for barber-scoped events.
    pub fn barber_id(&self) -> Option<Ulid> {
        match self {
            Event::BarberUpdated { barber } => Some(barber.id),
            Event::RuleAdded { rule } => Some(rule.barber_id),
            Event::ExceptionAdded { exception } => Some(exception.barber_id),
            Event::AppointmentBooked { appointment } => Some(appointment.barber_id),
            Event::RuleRemoved { barber_id, .. }
            | Event::ExceptionRemoved { barber_id, .. }
            | Event::AppointmentStatusChanged { barber_id, .. } => Some(*barber_id),
            Event::BarberCreated { .. }
            | Event::BarberDeleted { .. }
            | Event::ServiceUpserted { .. }
            | Event::ClientUpserted { .. } => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn hm(h: u32, m: u32) -> NaiveTime {
        NaiveTime::from_hms_opt(h, m, 0).unwrap()
    }

    fn appt(start: NaiveDateTime, duration: u32, status: AppointmentStatus) -> Appointment {
        Appointment {
            id: Ulid::new(),
            barber_id: Ulid::new(),
            client_id: Ulid::new(),
            service_id: Ulid::new(),
            scheduled_at: start,
            duration,
            status,
            created_at: start,
            confirmed_at: None,
            notes: None,
        }
    }

    fn state() -> BarberState {
        BarberState::new(Barber {
            id: Ulid::new(),
            name: "Tono".into(),
            active: true,
        })
    }

    #[test]
    fn span_overlap() {
        let a = Span::new(100, 200);
        let b = Span::new(150, 250);
        let c = Span::new(200, 300);
        assert!(a.overlaps(&b));
        assert!(!a.overlaps(&c)); // adjacent, not overlapping
        assert!(Span::new(0, 400).contains_span(&a));
    }

    #[test]
    fn ms_conversion_roundtrips_naive_datetime() {
        let dt = date(2024, 6, 10).and_time(hm(10, 15));
        assert_eq!(datetime_of(ms_of(dt)), dt);
        assert_eq!(ms_at(date(2024, 6, 10), hm(10, 15)) - ms_at(date(2024, 6, 10), hm(10, 0)), 15 * MINUTE_MS);
    }

    #[test]
    fn weekday_starts_monday() {
        assert_eq!(weekday_index(date(2024, 6, 10)), 0); // Monday
        assert_eq!(weekday_index(date(2024, 6, 16)), 6); // Sunday
    }

    #[test]
    fn duration_labels() {
        assert_eq!(parse_duration_label("30 min"), Some(30));
        assert_eq!(parse_duration_label("1 hora"), Some(60));
        assert_eq!(parse_duration_label("1h 30min"), Some(90));
        assert_eq!(parse_duration_label("45"), Some(45));
        assert_eq!(parse_duration_label("2 horas"), Some(120));
        assert_eq!(parse_duration_label("a convenir"), None);
        assert_eq!(parse_duration_label(""), None);
    }

    #[test]
    fn status_transitions() {
        use AppointmentStatus::*;
        assert!(PendingConfirmation.can_transition_to(Confirmed));
        assert!(PendingConfirmation.can_transition_to(Expired));
        assert!(Confirmed.can_transition_to(Completed));
        assert!(Confirmed.can_transition_to(Cancelled));
        assert!(!PendingConfirmation.can_transition_to(Completed));
        assert!(!Completed.can_transition_to(Cancelled));
        assert!(!Cancelled.can_transition_to(Confirmed));
        assert!(!Expired.can_transition_to(Confirmed));
        assert!(Confirmed.is_active());
        assert!(CancelledConflict.is_terminal());
    }

    #[test]
    fn segment_classification() {
        let now = date(2024, 6, 10).and_time(hm(12, 0));
        assert_eq!(ClientSegment::classify(0, None, now), ClientSegment::New);
        assert_eq!(ClientSegment::classify(3, Some(now), now), ClientSegment::Occasional);
        assert_eq!(ClientSegment::classify(6, Some(now), now), ClientSegment::Recurring);
        assert_eq!(ClientSegment::classify(12, Some(now), now), ClientSegment::Vip);
        let long_ago = now - TimeDelta::days(200);
        assert_eq!(ClientSegment::classify(12, Some(long_ago), now), ClientSegment::Inactive);
    }

    #[test]
    fn appointments_stay_sorted_and_index_starts() {
        let mut bs = state();
        let d = date(2024, 6, 10);
        let late = appt(d.and_time(hm(11, 0)), 30, AppointmentStatus::Confirmed);
        let early = appt(d.and_time(hm(9, 0)), 30, AppointmentStatus::PendingConfirmation);
        let early_id = early.id;
        bs.insert_appointment(late);
        bs.insert_appointment(early);
        assert_eq!(bs.appointments[0].id, early_id);
        assert_eq!(bs.start_taken(ms_at(d, hm(9, 0))), Some(early_id));
        assert!(bs.has_open_appointments());
    }

    #[test]
    fn terminal_status_frees_start_index() {
        let mut bs = state();
        let d = date(2024, 6, 10);
        let a = appt(d.and_time(hm(9, 0)), 30, AppointmentStatus::PendingConfirmation);
        let id = a.id;
        bs.insert_appointment(a);
        bs.set_status(id, AppointmentStatus::Cancelled, d.and_time(hm(8, 0)));
        assert_eq!(bs.start_taken(ms_at(d, hm(9, 0))), None);
        assert!(!bs.has_open_appointments());
        let query = Span::on(d, hm(9, 0), hm(9, 30));
        assert_eq!(bs.overlapping_active(&query).count(), 0);
    }

    #[test]
    fn overlapping_active_uses_half_open_intervals() {
        let mut bs = state();
        let d = date(2024, 6, 10);
        bs.insert_appointment(appt(d.and_time(hm(10, 0)), 30, AppointmentStatus::Confirmed));
        let touching = Span::on(d, hm(10, 30), hm(11, 0));
        let inside = Span::on(d, hm(10, 15), hm(10, 45));
        let before = Span::on(d, hm(9, 30), hm(10, 0));
        assert_eq!(bs.overlapping_active(&touching).count(), 0);
        assert_eq!(bs.overlapping_active(&inside).count(), 1);
        assert_eq!(bs.overlapping_active(&before).count(), 0);
    }

    #[test]
    fn exceptions_on_date_only() {
        let mut bs = state();
        let barber_id = bs.barber.id;
        for (day, start) in [(11, 9), (10, 12), (10, 9), (9, 9)] {
            bs.insert_exception(ScheduleException {
                id: Ulid::new(),
                barber_id,
                date: date(2024, 6, day),
                start: hm(start, 0),
                end: hm(start + 1, 0),
                reason: None,
            });
        }
        let on_tenth: Vec<_> = bs.exceptions_on(date(2024, 6, 10)).collect();
        assert_eq!(on_tenth.len(), 2);
        assert_eq!(on_tenth[0].start, hm(9, 0));
        assert_eq!(on_tenth[1].start, hm(12, 0));
    }

    #[test]
    fn rule_collision_same_weekday_only() {
        let barber_id = Ulid::new();
        let mk = |dow, s, e| AvailabilityRule {
            id: Ulid::new(),
            barber_id,
            day_of_week: dow,
            start: hm(s, 0),
            end: hm(e, 0),
            active: true,
        };
        assert!(mk(0, 9, 13).collides_with(&mk(0, 12, 14)));
        assert!(!mk(0, 9, 13).collides_with(&mk(0, 13, 18)));
        assert!(!mk(0, 9, 13).collides_with(&mk(1, 9, 13)));
    }

    #[test]
    fn event_serialization_roundtrip() {
        let event = Event::BarberCreated {
            barber: Barber {
                id: Ulid::new(),
                name: "Tono".into(),
                active: true,
            },
        };
        let bytes = bincode::serialize(&event).unwrap();
        let decoded: Event = bincode::deserialize(&bytes).unwrap();
        assert_eq!(event, decoded);
    }
}

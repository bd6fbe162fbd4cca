use serde::Serialize;

use crate::model::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SlotState {
    Available,
    /// Overlaps an active appointment.
    Booked,
    /// Overlaps a block, or starts at or before "now".
    Blocked,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub span: Span,
    pub state: SlotState,
}

impl Slot {
    pub fn is_available(&self) -> bool {
        self.state == SlotState::Available
    }

    /// `HH:MM` of the start.
    pub fn label(&self) -> String {
        datetime_of(self.span.start).format("%H:%M").to_string()
    }
}

/// Lazy walk over fixed-step candidates inside each open range.
///
/// For a range `[s, e)` the candidates start at `s, s+step, ...` while
/// `start + duration <= e`.
pub struct SlotIter {
    ranges: Vec<Span>,
    range_idx: usize,
    current: Ms,
    duration: Ms,
    step: Ms,
    busy: Vec<Span>,
    blocked: Vec<Span>,
    now: Ms,
}

pub struct SlotInputs {
    pub ranges: Vec<Span>,
    pub duration: Ms,
    pub step: Ms,
    /// Spans of active appointments.
    pub busy: Vec<Span>,
    /// Block spans on the same date.
    pub blocked: Vec<Span>,
    pub now: Ms,
}

pub fn generate_slots(inputs: SlotInputs) -> SlotIter {
    let SlotInputs {
        ranges,
        duration,
        step,
        busy,
        blocked,
        now,
    } = inputs;
    let current = ranges.first().map_or(0, |r| r.start);
    // A zero duration or step would never terminate.
    let ranges = if duration > 0 && step > 0 { ranges } else { Vec::new() };
    SlotIter {
        ranges,
        range_idx: 0,
        current,
        duration,
        step,
        busy,
        blocked,
        now,
    }
}

impl SlotIter {
    fn classify(&self, candidate: &Span) -> SlotState {
        if self.busy.iter().any(|b| b.overlaps(candidate)) {
            SlotState::Booked
        } else if candidate.start <= self.now || self.blocked.iter().any(|b| b.overlaps(candidate)) {
            SlotState::Blocked
        } else {
            SlotState::Available
        }
    }
}

impl Iterator for SlotIter {
    type Item = Slot;

    fn next(&mut self) -> Option<Slot> {
        loop {
            let range = *self.ranges.get(self.range_idx)?;
            if self.current + self.duration <= range.end {
                let span = Span::new(self.current, self.current + self.duration);
                self.current += self.step;
                return Some(Slot {
                    span,
                    state: self.classify(&span),
                });
            }
            self.range_idx += 1;
            if let Some(next) = self.ranges.get(self.range_idx) {
                self.current = next.start;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveTime};

    fn at(h: u32, m: u32) -> Ms {
        let d = NaiveDate::from_ymd_opt(2024, 6, 10).unwrap();
        ms_at(d, NaiveTime::from_hms_opt(h, m, 0).unwrap())
    }

    fn inputs(ranges: Vec<Span>, duration_min: u32) -> SlotInputs {
        SlotInputs {
            ranges,
            duration: minutes_ms(duration_min),
            step: minutes_ms(15),
            busy: Vec::new(),
            blocked: Vec::new(),
            now: 0,
        }
    }

    fn state_at(slots: &[Slot], h: u32, m: u32) -> SlotState {
        slots
            .iter()
            .find(|s| s.span.start == at(h, m))
            .map(|s| s.state)
            .unwrap_or_else(|| panic!("no slot at {h}:{m:02}"))
    }

    #[test]
    fn confirmed_appointment_marks_overlapping_candidates() {
        let mut input = inputs(vec![Span::new(at(9, 0), at(13, 0))], 30);
        input.busy = vec![Span::new(at(10, 0), at(10, 30))];
        let slots: Vec<Slot> = generate_slots(input).collect();

        assert_eq!(state_at(&slots, 9, 45), SlotState::Available);
        assert_eq!(state_at(&slots, 10, 0), SlotState::Booked);
        assert_eq!(state_at(&slots, 10, 15), SlotState::Booked);
        assert_eq!(state_at(&slots, 10, 30), SlotState::Available);
    }

    #[test]
    fn last_slot_fits_exactly() {
        let slots: Vec<Slot> = generate_slots(inputs(vec![Span::new(at(9, 0), at(10, 0))], 30)).collect();
        let starts: Vec<String> = slots.iter().map(Slot::label).collect();
        assert_eq!(starts, vec!["09:00", "09:15", "09:30"]);
        assert!(slots.iter().all(|s| s.span.end <= at(10, 0)));
    }

    #[test]
    fn duration_longer_than_range_yields_nothing() {
        let slots: Vec<Slot> = generate_slots(inputs(vec![Span::new(at(9, 0), at(9, 45))], 60)).collect();
        assert!(slots.is_empty());
    }

    #[test]
    fn walks_every_range_restarting_at_its_start() {
        let ranges = vec![Span::new(at(9, 0), at(9, 30)), Span::new(at(12, 10), at(12, 40))];
        let labels: Vec<String> = generate_slots(inputs(ranges, 30)).map(|s| s.label()).collect();
        assert_eq!(labels, vec!["09:00", "12:10"]);
    }

    #[test]
    fn past_and_blocked_candidates() {
        let mut input = inputs(vec![Span::new(at(9, 0), at(11, 0))], 30);
        input.now = at(9, 15);
        input.blocked = vec![Span::new(at(10, 0), at(10, 15))];
        let slots: Vec<Slot> = generate_slots(input).collect();

        assert_eq!(state_at(&slots, 9, 0), SlotState::Blocked);
        assert_eq!(state_at(&slots, 9, 15), SlotState::Blocked); // starts exactly at now
        assert_eq!(state_at(&slots, 9, 30), SlotState::Available);
        assert_eq!(state_at(&slots, 9, 45), SlotState::Blocked); // ends inside the block
        assert_eq!(state_at(&slots, 10, 15), SlotState::Available);
    }

    #[test]
    fn zero_step_is_empty() {
        let mut input = inputs(vec![Span::new(at(9, 0), at(11, 0))], 30);
        input.step = 0;
        assert_eq!(generate_slots(input).count(), 0);
    }

    #[test]
    fn is_lazy() {
        let input = inputs(vec![Span::new(at(0, 0), at(23, 45))], 15);
        let first_two: Vec<Slot> = generate_slots(input).take(2).collect();
        assert_eq!(first_two.len(), 2);
        assert_eq!(first_two[1].span.start, at(0, 15));
    }
}

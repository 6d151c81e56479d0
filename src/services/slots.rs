use chrono::{Duration, NaiveDate, NaiveDateTime};

use crate::models::{Appointment, AppointmentStatus};

pub const SLOT_MINUTES: i64 = 30;
pub const DATE_WINDOW_DAYS: i64 = 14;

/// Half-open booking slot: `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub start: NaiveDateTime,
    pub end: NaiveDateTime,
}

impl Slot {
    pub fn at(start: NaiveDateTime) -> Self {
        Self {
            start,
            end: start + Duration::minutes(SLOT_MINUTES),
        }
    }

    pub fn overlaps(&self, other_start: NaiveDateTime, other_end: NaiveDateTime) -> bool {
        self.start < other_end && self.end > other_start
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BusinessHours {
    pub start_hour: u32,
    pub end_hour: u32,
}

/// All slots of a business day. Slots step 30 minutes from opening and a
/// slot is included only if it closes at or before closing time.
pub fn day_slots(day: NaiveDate, hours: &BusinessHours) -> Vec<Slot> {
    let (open, close) = match (
        day.and_hms_opt(hours.start_hour, 0, 0),
        day.and_hms_opt(hours.end_hour, 0, 0),
    ) {
        (Some(open), Some(close)) => (open, close),
        _ => return vec![],
    };

    let mut slots = vec![];
    let mut cursor = open;
    while cursor + Duration::minutes(SLOT_MINUTES) <= close {
        slots.push(Slot::at(cursor));
        cursor += Duration::minutes(SLOT_MINUTES);
    }
    slots
}

pub fn within_hours(slot: &Slot, hours: &BusinessHours) -> bool {
    day_slots(slot.start.date(), hours)
        .iter()
        .any(|s| s.start == slot.start)
}

/// Slots not overlapping any non-cancelled appointment.
pub fn free_slots(slots: &[Slot], appointments: &[Appointment]) -> Vec<Slot> {
    slots
        .iter()
        .filter(|slot| {
            !appointments.iter().any(|appt| {
                appt.status != AppointmentStatus::Cancelled
                    && slot.overlaps(
                        appt.starts_at,
                        appt.starts_at + Duration::minutes(appt.duration_minutes as i64),
                    )
            })
        })
        .copied()
        .collect()
}

/// Best free slot for a requested time: exact start match, else the
/// earliest slot at or after the request, else the latest slot of the day.
pub fn pick_best_slot(requested: NaiveDateTime, free: &[Slot]) -> Option<Slot> {
    if let Some(exact) = free.iter().find(|s| s.start == requested) {
        return Some(*exact);
    }
    if let Some(after) = free.iter().find(|s| s.start >= requested) {
        return Some(*after);
    }
    free.last().copied()
}

/// The schedulable date window offered by the date picker: tomorrow
/// through today + 14.
pub fn upcoming_dates(today: NaiveDate) -> Vec<NaiveDate> {
    (1..=DATE_WINDOW_DAYS)
        .map(|i| today + Duration::days(i))
        .collect()
}

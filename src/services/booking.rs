use chrono::{Duration, NaiveDateTime};
use rusqlite::Connection;

use crate::db::queries;
use crate::models::{Appointment, AppointmentStatus};
use crate::services::slots::{self, BusinessHours, Slot, SLOT_MINUTES};

#[derive(Debug)]
pub enum BookingError {
    InPast,
    OutsideBusinessHours { hours: String },
    Conflict,
    Database(anyhow::Error),
}

impl std::fmt::Display for BookingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BookingError::InPast => {
                write!(f, "Esa hora ya pasó. Por favor elija un horario futuro.")
            }
            BookingError::OutsideBusinessHours { hours } => {
                write!(
                    f,
                    "Ese horario está fuera de nuestro horario de atención. Atendemos de {hours}."
                )
            }
            BookingError::Conflict => {
                write!(
                    f,
                    "Lo sentimos, ese horario acaba de ser reservado por otra persona. Por favor elija otro."
                )
            }
            BookingError::Database(_) => {
                write!(
                    f,
                    "No pudimos registrar la cita en este momento. Por favor intente de nuevo."
                )
            }
        }
    }
}

/// The single commit path for every confirmation flow. Re-validates the
/// staged slot and inserts it. The caller holds the connection mutex, so
/// the availability re-check and the insert form one critical section:
/// of two concurrent overlapping commits exactly one succeeds.
pub fn commit_appointment(
    conn: &Connection,
    user_id: &str,
    start: NaiveDateTime,
    now: NaiveDateTime,
    hours: &BusinessHours,
    hours_label: &str,
) -> Result<Appointment, BookingError> {
    if start <= now {
        return Err(BookingError::InPast);
    }

    let slot = Slot::at(start);
    if !slots::within_hours(&slot, hours) {
        return Err(BookingError::OutsideBusinessHours {
            hours: hours_label.to_string(),
        });
    }

    let existing =
        queries::appointments_for_day(conn, start.date()).map_err(BookingError::Database)?;

    for appt in &existing {
        let end = appt.starts_at + Duration::minutes(appt.duration_minutes as i64);
        if slot.overlaps(appt.starts_at, end) {
            return Err(BookingError::Conflict);
        }
    }

    let appt = Appointment {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        starts_at: start,
        duration_minutes: SLOT_MINUTES as i32,
        status: AppointmentStatus::Confirmed,
        notes: None,
        created_at: now,
        updated_at: now,
    };
    queries::insert_appointment(conn, &appt).map_err(BookingError::Database)?;

    Ok(appt)
}

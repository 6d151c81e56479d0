use chrono::{NaiveDate, NaiveDateTime};
use rusqlite::{params, Connection, Row};

use crate::models::{
    Appointment, AppointmentStatus, DialogueState, Faq, Session, SessionData, User, UserType,
};

const DT_FMT: &str = "%Y-%m-%d %H:%M:%S";

fn fmt_dt(dt: &NaiveDateTime) -> String {
    dt.format(DT_FMT).to_string()
}

// ── Users ──

fn parse_user_row(row: &Row) -> anyhow::Result<User> {
    let user_type: String = row.get(6)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;

    Ok(User {
        id: row.get(0)?,
        external_id: row.get(1)?,
        username: row.get(2)?,
        first_name: row.get(3)?,
        last_name: row.get(4)?,
        email: row.get(5)?,
        user_type: UserType::parse(&user_type),
        is_active: row.get::<_, i64>(7)? != 0,
        created_at: NaiveDateTime::parse_from_str(&created_at, DT_FMT)?,
        updated_at: NaiveDateTime::parse_from_str(&updated_at, DT_FMT)?,
    })
}

const USER_COLS: &str =
    "id, external_id, username, first_name, last_name, email, user_type, is_active, created_at, updated_at";

pub fn find_user_by_external_id(
    conn: &Connection,
    external_id: &str,
) -> anyhow::Result<Option<User>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {USER_COLS} FROM users WHERE external_id = ?1"
    ))?;

    let result = stmt.query_row(params![external_id], |row| Ok(parse_user_row(row)));

    match result {
        Ok(user) => Ok(Some(user?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn create_user(conn: &Connection, user: &User) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO users (id, external_id, username, first_name, last_name, email, user_type, is_active, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
        params![
            user.id,
            user.external_id,
            user.username,
            user.first_name,
            user.last_name,
            user.email,
            user.user_type.as_str(),
            user.is_active as i64,
            fmt_dt(&user.created_at),
            fmt_dt(&user.updated_at),
        ],
    )?;
    Ok(())
}

pub fn update_user_email(
    conn: &Connection,
    user_id: &str,
    email: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<bool> {
    let count = conn.execute(
        "UPDATE users SET email = ?1, updated_at = ?2 WHERE id = ?3",
        params![email, fmt_dt(now), user_id],
    )?;
    Ok(count > 0)
}

// ── Appointments ──

fn parse_appointment_row(row: &Row) -> anyhow::Result<Appointment> {
    let starts_at: String = row.get(2)?;
    let status: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    let updated_at: String = row.get(7)?;

    Ok(Appointment {
        id: row.get(0)?,
        user_id: row.get(1)?,
        starts_at: NaiveDateTime::parse_from_str(&starts_at, DT_FMT)?,
        duration_minutes: row.get(3)?,
        status: AppointmentStatus::parse(&status),
        notes: row.get(5)?,
        created_at: NaiveDateTime::parse_from_str(&created_at, DT_FMT)?,
        updated_at: NaiveDateTime::parse_from_str(&updated_at, DT_FMT)?,
    })
}

const APPT_COLS: &str =
    "id, user_id, starts_at, duration_minutes, status, notes, created_at, updated_at";

pub fn insert_appointment(conn: &Connection, appt: &Appointment) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO appointments (id, user_id, starts_at, duration_minutes, status, notes, created_at, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            appt.id,
            appt.user_id,
            fmt_dt(&appt.starts_at),
            appt.duration_minutes,
            appt.status.as_str(),
            appt.notes,
            fmt_dt(&appt.created_at),
            fmt_dt(&appt.updated_at),
        ],
    )?;
    Ok(())
}

/// Non-cancelled appointments whose start falls on the given day.
pub fn appointments_for_day(conn: &Connection, day: NaiveDate) -> anyhow::Result<Vec<Appointment>> {
    let day_start = format!("{} 00:00:00", day.format("%Y-%m-%d"));
    let day_end = format!("{} 23:59:59", day.format("%Y-%m-%d"));

    let mut stmt = conn.prepare(&format!(
        "SELECT {APPT_COLS} FROM appointments
         WHERE starts_at >= ?1 AND starts_at <= ?2 AND status != 'cancelled'
         ORDER BY starts_at ASC"
    ))?;

    let rows = stmt.query_map(params![day_start, day_end], |row| {
        Ok(parse_appointment_row(row))
    })?;

    let mut appointments = vec![];
    for row in rows {
        appointments.push(row??);
    }
    Ok(appointments)
}

// ── FAQs ──

fn parse_faq_row(row: &Row) -> anyhow::Result<Faq> {
    Ok(Faq {
        id: row.get(0)?,
        question: row.get(1)?,
        answer: row.get(2)?,
        category: row.get(3)?,
        is_active: row.get::<_, i64>(4)? != 0,
    })
}

const FAQ_COLS: &str = "id, question, answer, category, is_active";

pub fn list_active_faqs(conn: &Connection) -> anyhow::Result<Vec<Faq>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FAQ_COLS} FROM faqs WHERE is_active = 1 ORDER BY id ASC"
    ))?;

    let rows = stmt.query_map([], |row| Ok(parse_faq_row(row)))?;

    let mut faqs = vec![];
    for row in rows {
        faqs.push(row??);
    }
    Ok(faqs)
}

pub fn list_faqs_by_category(conn: &Connection, category: &str) -> anyhow::Result<Vec<Faq>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {FAQ_COLS} FROM faqs WHERE is_active = 1 AND category = ?1 ORDER BY id ASC"
    ))?;

    let rows = stmt.query_map(params![category], |row| Ok(parse_faq_row(row)))?;

    let mut faqs = vec![];
    for row in rows {
        faqs.push(row??);
    }
    Ok(faqs)
}

pub fn list_faq_categories(conn: &Connection) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn
        .prepare("SELECT DISTINCT category FROM faqs WHERE is_active = 1 ORDER BY category ASC")?;

    let rows = stmt.query_map([], |row| row.get::<_, String>(0))?;

    let mut categories = vec![];
    for row in rows {
        categories.push(row?);
    }
    Ok(categories)
}

pub fn get_faq(conn: &Connection, id: i64) -> anyhow::Result<Option<Faq>> {
    let mut stmt = conn.prepare(&format!("SELECT {FAQ_COLS} FROM faqs WHERE id = ?1"))?;

    let result = stmt.query_row(params![id], |row| Ok(parse_faq_row(row)));

    match result {
        Ok(faq) => Ok(Some(faq?)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

// ── Unanswered questions & feedback ──

pub fn record_user_question(
    conn: &Connection,
    user_id: &str,
    question: &str,
    source: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO user_questions (user_id, question, source, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, question, source, fmt_dt(now)],
    )?;
    Ok(())
}

pub fn record_feedback(
    conn: &Connection,
    user_id: &str,
    faq_id: Option<i64>,
    vote: &str,
    now: &NaiveDateTime,
) -> anyhow::Result<()> {
    conn.execute(
        "INSERT INTO feedback (user_id, faq_id, vote, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![user_id, faq_id, vote, fmt_dt(now)],
    )?;
    Ok(())
}

// ── Sessions ──

pub fn get_session(conn: &Connection, external_id: &str) -> anyhow::Result<Option<Session>> {
    let mut stmt = conn.prepare(
        "SELECT external_id, state, previous_state, data, updated_at FROM sessions WHERE external_id = ?1",
    )?;

    let result = stmt.query_row(params![external_id], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, Option<String>>(2)?,
            row.get::<_, String>(3)?,
            row.get::<_, String>(4)?,
        ))
    });

    match result {
        Ok((external_id, state, previous_state, data_json, updated_at)) => {
            let data: SessionData = serde_json::from_str(&data_json).unwrap_or_default();
            let updated_at = NaiveDateTime::parse_from_str(&updated_at, DT_FMT)?;

            Ok(Some(Session {
                external_id,
                state: DialogueState::parse(&state),
                previous_state: previous_state.as_deref().map(DialogueState::parse),
                data,
                updated_at,
            }))
        }
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn save_session(conn: &Connection, session: &Session) -> anyhow::Result<()> {
    let data_json = serde_json::to_string(&session.data)?;

    conn.execute(
        "INSERT INTO sessions (external_id, state, previous_state, data, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(external_id) DO UPDATE SET
           state = excluded.state,
           previous_state = excluded.previous_state,
           data = excluded.data,
           updated_at = excluded.updated_at",
        params![
            session.external_id,
            session.state.as_str(),
            session.previous_state.map(|s| s.as_str()),
            data_json,
            fmt_dt(&session.updated_at),
        ],
    )?;
    Ok(())
}

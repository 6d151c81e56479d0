use std::sync::Arc;

use chrono::{Datelike, NaiveDate, NaiveDateTime, NaiveTime};

use crate::db::queries;
use crate::models::{DialogueState, Event, Reply, Session, User};
use crate::services::booking::{self, BookingError};
use crate::services::intent::{self, IntentOutcome};
use crate::services::nlu;
use crate::services::relevance;
use crate::services::slots::{self, BusinessHours};
use crate::state::AppState;

/// Drives one inbound event through the per-user state machine and
/// returns the reply descriptor. The session is loaded fresh, mutated,
/// and persisted before returning.
pub async fn process_event(
    state: &Arc<AppState>,
    user: &User,
    event: &Event,
) -> anyhow::Result<Reply> {
    let now = state.config.now();

    let mut session = {
        let db = state.db.lock().unwrap();
        queries::get_session(&db, &user.external_id)?
    }
    .unwrap_or_else(|| Session::new(&user.external_id, now));

    tracing::info!(
        user = %user.external_id,
        state = session.state.as_str(),
        event = ?event,
        "processing event"
    );

    // A finished dialogue restarts on any event
    let reply = if session.state == DialogueState::Ended {
        session.reset();
        menu_reply(user)
    } else {
        match event {
            Event::Button { id } => handle_button(state, user, &mut session, id, now)?,
            Event::Text { text } | Event::VoiceTranscript { text } => {
                handle_text(state, user, &mut session, text, event.is_voice(), now)?
            }
        }
    };

    session.updated_at = now;
    {
        let db = state.db.lock().unwrap();
        queries::save_session(&db, &session)?;
    }

    Ok(reply)
}

fn hours(state: &AppState) -> BusinessHours {
    BusinessHours {
        start_hour: state.config.business_start_hour,
        end_hour: state.config.business_end_hour,
    }
}

// ── Button events ──

fn handle_button(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    id: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    if let Some(date) = id.strip_prefix("date_") {
        return match NaiveDate::parse_from_str(date, "%Y-%m-%d") {
            Ok(day) => Ok(show_times(state, session, day, now)?),
            Err(_) => Ok(unknown_button(user, session, id)),
        };
    }

    if let Some(time) = id.strip_prefix("time_") {
        let staged = NaiveTime::parse_from_str(time, "%H:%M")
            .ok()
            .and_then(|t| session.data.pending_date.map(|d| d.and_time(t)));
        let Some(start) = staged else {
            return Ok(unknown_button(user, session, id));
        };

        // The list the user clicked may be stale: someone else can have
        // taken the slot since it was rendered.
        let free = free_slots_for(state, start.date())?;
        if !free.iter().any(|s| s.start == start) {
            if free.is_empty() {
                session.transition(DialogueState::SelectDate);
                return Ok(dates_reply(now)
                    .with_body_prefix("Ese día ya no tiene horarios disponibles. Elija otra fecha:"));
            }
            return Ok(times_reply(state, start.date())?
                .with_body_prefix("Ese horario ya no está disponible. Estos son los horarios libres:"));
        }

        return Ok(stage_slot(session, start));
    }

    if let Some(category) = id.strip_prefix("faqcat_") {
        return show_category(state, session, category);
    }

    if let Some(faq_id) = id.strip_prefix("faq_") {
        return match faq_id.parse::<i64>() {
            Ok(faq_id) => show_faq_answer(state, user, session, faq_id),
            Err(_) => Ok(unknown_button(user, session, id)),
        };
    }

    match id {
        "menu" => {
            session.transition(DialogueState::Menu);
            Ok(menu_reply(user))
        }
        "schedule" => Ok(start_scheduling(session, now)),
        "pricing" => Ok(Reply::plain(intent::price_summary(&state.config.prices))
            .with_button("Volver al menú", "menu")),
        "contact" => {
            session.transition(DialogueState::ShowContact);
            Ok(contact_reply(state))
        }
        "faqcats" => {
            session.transition(DialogueState::ShowFaqCategory);
            session.data.faq_category = None;
            categories_reply(state)
        }
        "confirm" => confirm_staged(state, user, session, now),
        "cancel" => {
            session.data.pending_date = None;
            session.data.pending_start = None;
            session.transition(DialogueState::Menu);
            Ok(Reply::plain("La reserva fue descartada. ¿Algo más en que pueda ayudarle?")
                .with_button("Volver al menú", "menu"))
        }
        "fb_up" | "fb_down" => record_feedback(state, user, session, id, now),
        "back" => go_back(state, user, session, now),
        _ => Ok(unknown_button(user, session, id)),
    }
}

fn unknown_button(user: &User, session: &mut Session, id: &str) -> Reply {
    tracing::warn!(user = %user.external_id, button = id, "unknown button id");
    session.reset();
    let mut reply = menu_reply(user);
    reply.body = format!("No reconocí esa opción, volvamos al inicio.\n\n{}", reply.body);
    reply
}

// ── Text & voice events ──

fn handle_text(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    text: &str,
    is_voice: bool,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    if nlu::is_quit(text) {
        session.reset();
        session.state = DialogueState::Ended;
        return Ok(Reply::plain(
            "Conversación finalizada. Escríbame cuando quiera retomarla. ¡Hasta pronto!",
        ));
    }

    // A spoken date+time overrides whatever step the dialogue is on,
    // except a plain "sí" in confirmation, which commits the staged slot.
    if is_voice && !(session.state == DialogueState::ConfirmAppointment && nlu::is_affirmative(text))
    {
        if let (Some(day), Some(time)) = (
            nlu::parse_spanish_date(text, now.date()),
            nlu::parse_spanish_time(text),
        ) {
            return voice_fast_path(state, user, session, day.and_time(time), now);
        }
    }

    match session.state {
        DialogueState::CollectEmail => collect_email(state, user, session, text, now),
        DialogueState::ConfirmAppointment => {
            if nlu::is_affirmative(text) {
                confirm_staged(state, user, session, now)
            } else if nlu::is_negative(text) {
                session.data.pending_date = None;
                session.data.pending_start = None;
                session.transition(DialogueState::Menu);
                Ok(Reply::plain("Entendido, la reserva queda descartada.")
                    .with_button("Volver al menú", "menu"))
            } else {
                Ok(confirm_prompt(session))
            }
        }
        DialogueState::ScheduleStart | DialogueState::SelectDate => {
            match nlu::parse_spanish_date(text, now.date()) {
                Some(day) => show_times(state, session, day, now),
                None => Ok(dates_reply(now).with_body_prefix(
                    "No entendí la fecha. Puede escribir \"mañana\", un día de la semana, o elegir una opción:",
                )),
            }
        }
        DialogueState::SelectTime => select_time_from_text(state, session, text, now),
        _ => general_text(state, user, session, text, is_voice, now),
    }
}

/// Free-text handling outside the scheduling flow: intent rules first,
/// then scheduling cues, then FAQ matching.
fn general_text(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    text: &str,
    is_voice: bool,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    if let Some(outcome) = intent::classify(text, &state.config.prices) {
        return match outcome {
            IntentOutcome::Answer(body) => Ok(Reply::plain(body)),
            IntentOutcome::ShowMenu => {
                session.transition(DialogueState::Menu);
                Ok(menu_reply(user))
            }
            IntentOutcome::ShowFaqCategories => {
                session.transition(DialogueState::ShowFaqCategory);
                session.data.faq_category = None;
                categories_reply(state)
            }
            IntentOutcome::ShowContact => {
                session.transition(DialogueState::ShowContact);
                Ok(contact_reply(state))
            }
        };
    }

    let parsed_date = nlu::parse_spanish_date(text, now.date());
    let parsed_time = nlu::parse_spanish_time(text);
    let wants_scheduling =
        nlu::mentions_scheduling(text) || (parsed_date.is_some() && parsed_time.is_some());

    if wants_scheduling {
        // A spoken date jumps straight to that day's times; date+time
        // transcripts were already fast-pathed before the state dispatch.
        if is_voice {
            if let Some(day) = parsed_date {
                return show_times(state, session, day, now);
            }
        }
        return Ok(start_scheduling(session, now));
    }

    // FAQ lookup
    let faqs = {
        let db = state.db.lock().unwrap();
        queries::list_active_faqs(&db)?
    };

    if let Some(faq) = relevance::best_faq_match(text, &faqs) {
        session.data.last_faq_id = Some(faq.id);
        return Ok(faq_answer_reply(&faq.answer));
    }

    let source = if is_voice { "voice" } else { "text" };
    {
        let db = state.db.lock().unwrap();
        queries::record_user_question(&db, &user.id, text, source, &now)?;
    }
    tracing::info!(user = %user.external_id, source, "unanswered question recorded");

    Ok(Reply::plain(
        "Disculpe, no tengo una respuesta para eso todavía. Registré su pregunta \
         y nuestro equipo le responderá pronto. ¿Le ayudo con algo más?",
    )
    .with_button("Ver menú", "menu"))
}

fn voice_fast_path(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    requested: NaiveDateTime,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    let day = requested.date();
    let free = free_slots_for(state, day)?;

    let Some(slot) = slots::pick_best_slot(requested, &free) else {
        session.transition(DialogueState::SelectDate);
        return Ok(dates_reply(now)
            .with_body_prefix("Ese día ya no tiene horarios disponibles. Elija otra fecha:"));
    };

    session.data.pending_date = Some(day);
    session.data.pending_start = Some(slot.start);

    if user.email.is_some() {
        return confirm_staged(state, user, session, now);
    }

    session.transition(DialogueState::CollectEmail);
    Ok(Reply::plain(format!(
        "Puedo reservarle el {} a las {}. Para confirmar la cita, por favor \
         indíqueme su correo electrónico.",
        format_date_es(day),
        slot.start.format("%H:%M")
    )))
}

fn select_time_from_text(
    state: &Arc<AppState>,
    session: &mut Session,
    text: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    let Some(day) = session.data.pending_date else {
        return Ok(start_scheduling(session, now));
    };

    let Some(time) = nlu::parse_spanish_time(text) else {
        return times_reply(state, day)
            .map(|r| r.with_body_prefix("No entendí la hora. Puede escribir por ejemplo \"10:30\" o elegir:"));
    };

    let free = free_slots_for(state, day)?;
    let Some(slot) = slots::pick_best_slot(day.and_time(time), &free) else {
        session.transition(DialogueState::SelectDate);
        return Ok(dates_reply(now)
            .with_body_prefix("Ese día ya no tiene horarios disponibles. Elija otra fecha:"));
    };

    let mut reply = stage_slot(session, slot.start);
    if slot.start.time() != time {
        reply.body = format!(
            "No tenemos las {} disponibles; el horario más cercano es:\n\n{}",
            time.format("%H:%M"),
            reply.body
        );
    }
    Ok(reply)
}

// ── Scheduling flow helpers ──

fn start_scheduling(session: &mut Session, now: NaiveDateTime) -> Reply {
    session.transition(DialogueState::ScheduleStart);
    session.data.pending_date = None;
    session.data.pending_start = None;
    dates_reply(now)
}

fn dates_reply(now: NaiveDateTime) -> Reply {
    let mut reply = Reply::plain("¿Para qué fecha desea la demostración?");
    for day in slots::upcoming_dates(now.date()) {
        reply = reply.with_button(short_date_label(day), format!("date_{}", day.format("%Y-%m-%d")));
    }
    reply.with_button("Volver al menú", "menu")
}

fn free_slots_for(state: &Arc<AppState>, day: NaiveDate) -> anyhow::Result<Vec<slots::Slot>> {
    let appointments = {
        let db = state.db.lock().unwrap();
        queries::appointments_for_day(&db, day)?
    };
    let grid = slots::day_slots(day, &hours(state));
    Ok(slots::free_slots(&grid, &appointments))
}

fn show_times(
    state: &Arc<AppState>,
    session: &mut Session,
    day: NaiveDate,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    let free = free_slots_for(state, day)?;
    if free.is_empty() {
        session.transition(DialogueState::SelectDate);
        return Ok(dates_reply(now)
            .with_body_prefix("Ese día no tiene horarios disponibles. Elija otra fecha:"));
    }

    session.data.pending_date = Some(day);
    session.transition(DialogueState::SelectTime);

    let mut reply = Reply::plain(format!(
        "Horarios disponibles para el {}:",
        format_date_es(day)
    ));
    for slot in &free {
        let label = slot.start.format("%H:%M").to_string();
        reply = reply.with_button(label.clone(), format!("time_{label}"));
    }
    Ok(reply.with_button("Elegir otra fecha", "back").with_button("Volver al menú", "menu"))
}

fn times_reply(state: &Arc<AppState>, day: NaiveDate) -> anyhow::Result<Reply> {
    let free = free_slots_for(state, day)?;
    let mut reply = Reply::plain(format!(
        "Horarios disponibles para el {}:",
        format_date_es(day)
    ));
    for slot in &free {
        let label = slot.start.format("%H:%M").to_string();
        reply = reply.with_button(label.clone(), format!("time_{label}"));
    }
    Ok(reply.with_button("Elegir otra fecha", "back").with_button("Volver al menú", "menu"))
}

fn stage_slot(session: &mut Session, start: NaiveDateTime) -> Reply {
    session.data.pending_start = Some(start);
    session.transition(DialogueState::ConfirmAppointment);
    confirm_prompt(session)
}

fn confirm_prompt(session: &Session) -> Reply {
    let when = session
        .data
        .pending_start
        .map(|start| {
            format!(
                "{} a las {}",
                format_date_es(start.date()),
                start.format("%H:%M")
            )
        })
        .unwrap_or_else(|| "(sin horario)".to_string());

    Reply::plain(format!(
        "Su demostración quedaría para el {when} (duración: 30 minutos). ¿Confirma la cita?"
    ))
    .with_button("✅ Confirmar", "confirm")
    .with_button("❌ Cancelar", "cancel")
    .with_button("Cambiar horario", "back")
}

/// Every confirmation path lands here: button confirm, affirmative text
/// or voice in ConfirmAppointment, voice auto-confirm, and the tail of
/// email collection.
fn confirm_staged(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    let Some(start) = session.data.pending_start else {
        session.transition(DialogueState::Menu);
        return Ok(Reply::plain("No hay ninguna reserva en curso. ¿Desea agendar una?")
            .with_button("Agendar demostración", "schedule")
            .with_button("Volver al menú", "menu"));
    };

    if user.email.is_none() {
        session.transition(DialogueState::CollectEmail);
        return Ok(Reply::plain(
            "Para enviarle la confirmación necesito su correo electrónico. ¿Me lo indica, por favor?",
        ));
    }

    let result = {
        let db = state.db.lock().unwrap();
        booking::commit_appointment(
            &db,
            &user.id,
            start,
            now,
            &hours(state),
            &state.config.business_hours_label(),
        )
    };

    match result {
        Ok(appt) => {
            session.data.pending_date = None;
            session.data.pending_start = None;
            session.transition(DialogueState::Menu);

            let message = format!(
                "Nueva cita: {} ({}) — {} a las {}",
                user.display_name(),
                user.email.as_deref().unwrap_or("sin correo"),
                format_date_es(appt.starts_at.date()),
                appt.starts_at.format("%H:%M")
            );
            let notifier = state.notifier.clone();
            tokio::spawn(async move {
                if let Err(e) = notifier.notify(&message).await {
                    tracing::error!(error = %e, "failed to notify operator");
                }
            });

            Ok(Reply::plain(format!(
                "¡Listo! Su demostración quedó agendada para el {} a las {}. \
                 Le enviaremos un recordatorio a {}.",
                format_date_es(appt.starts_at.date()),
                appt.starts_at.format("%H:%M"),
                user.email.as_deref().unwrap_or("su correo")
            ))
            .with_button("Volver al menú", "menu"))
        }
        Err(BookingError::Conflict) => {
            session.data.pending_start = None;
            let day = start.date();
            let mut reply = show_times(state, session, day, now)?;
            reply.body = format!(
                "Lo sentimos, ese horario acaba de ser reservado por otra persona.\n\n{}",
                reply.body
            );
            Ok(reply)
        }
        Err(e @ (BookingError::InPast | BookingError::OutsideBusinessHours { .. })) => {
            session.data.pending_start = None;
            session.transition(DialogueState::SelectDate);
            Ok(dates_reply(now).with_body_prefix(&e.to_string()))
        }
        Err(BookingError::Database(e)) => {
            tracing::error!(error = %e, "appointment commit failed");
            Ok(Reply::plain(BookingError::Database(e).to_string())
                .with_button("Volver al menú", "menu"))
        }
    }
}

fn collect_email(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    text: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    let email = text.trim();
    if !nlu::is_valid_email(email) {
        return Ok(Reply::plain(
            "Ese correo no parece válido. Por favor escríbalo de nuevo \
             (por ejemplo: nombre@dominio.com).",
        ));
    }

    {
        let db = state.db.lock().unwrap();
        queries::update_user_email(&db, &user.id, email, &now)?;
    }

    if session.data.pending_start.is_some() {
        let mut updated = user.clone();
        updated.email = Some(email.to_string());
        return confirm_staged(state, &updated, session, now);
    }

    session.transition(DialogueState::Menu);
    Ok(Reply::plain("¡Gracias! Guardé su correo.").with_button("Volver al menú", "menu"))
}

// ── FAQ browsing & feedback ──

fn categories_reply(state: &Arc<AppState>) -> anyhow::Result<Reply> {
    let categories = {
        let db = state.db.lock().unwrap();
        queries::list_faq_categories(&db)?
    };

    let mut reply = Reply::plain("¿Sobre qué tema tiene dudas?");
    for category in categories {
        let label = capitalize(&category);
        reply = reply.with_button(label, format!("faqcat_{category}"));
    }
    Ok(reply.with_button("Volver al menú", "menu"))
}

fn show_category(
    state: &Arc<AppState>,
    session: &mut Session,
    category: &str,
) -> anyhow::Result<Reply> {
    let faqs = {
        let db = state.db.lock().unwrap();
        queries::list_faqs_by_category(&db, category)?
    };

    session.transition(DialogueState::ShowFaqCategory);
    session.data.faq_category = Some(category.to_string());

    if faqs.is_empty() {
        return Ok(Reply::plain("Aún no hay preguntas en esa categoría.")
            .with_button("Ver otras categorías", "faqcats")
            .with_button("Volver al menú", "menu"));
    }

    let mut reply = Reply::plain(format!("Preguntas frecuentes — {}:", capitalize(category)));
    for faq in &faqs {
        reply = reply.with_button(faq.question.clone(), format!("faq_{}", faq.id));
    }
    Ok(reply.with_button("Ver otras categorías", "faqcats").with_button("Volver al menú", "menu"))
}

fn show_faq_answer(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    faq_id: i64,
) -> anyhow::Result<Reply> {
    let faq = {
        let db = state.db.lock().unwrap();
        queries::get_faq(&db, faq_id)?
    };

    match faq {
        Some(faq) => {
            session.data.last_faq_id = Some(faq.id);
            Ok(faq_answer_reply(&faq.answer))
        }
        None => Ok(unknown_button(user, session, &format!("faq_{faq_id}"))),
    }
}

fn faq_answer_reply(answer: &str) -> Reply {
    Reply::plain(format!("{answer}\n\n¿Le resultó útil esta respuesta?"))
        .with_button("👍 Sí", "fb_up")
        .with_button("👎 No", "fb_down")
        .with_button("Volver al menú", "menu")
}

fn record_feedback(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    id: &str,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    let vote = if id == "fb_up" { "up" } else { "down" };
    {
        let db = state.db.lock().unwrap();
        queries::record_feedback(&db, &user.id, session.data.last_faq_id, vote, &now)?;
    }

    let body = if vote == "up" {
        "¡Gracias por su valoración!"
    } else {
        "Gracias, tomaremos nota para mejorar la respuesta."
    };
    Ok(Reply::plain(body).with_button("Volver al menú", "menu"))
}

// ── Static views ──

fn menu_reply(user: &User) -> Reply {
    Reply::plain(format!(
        "Hola {}, soy el asistente virtual de Firma Digital. ¿En qué puedo ayudarle?",
        user.display_name()
    ))
    .with_button("📅 Agendar demostración", "schedule")
    .with_button("❓ Preguntas frecuentes", "faqcats")
    .with_button("💰 Precios", "pricing")
    .with_button("📞 Contacto", "contact")
}

fn contact_reply(state: &Arc<AppState>) -> Reply {
    let contact = &state.config.contact;
    Reply::markdown(format!(
        "*Contacto*\n\
         Teléfono: {}\n\
         Correo: {}\n\
         Dirección: {}\n\
         Horario de atención: {}",
        contact.phone,
        contact.email,
        contact.address,
        state.config.business_hours_label()
    ))
    .with_link("Sitio web", contact.website.clone())
    .with_button("Volver al menú", "menu")
}

fn go_back(
    state: &Arc<AppState>,
    user: &User,
    session: &mut Session,
    now: NaiveDateTime,
) -> anyhow::Result<Reply> {
    let previous = session.previous_state.take().unwrap_or(DialogueState::Menu);
    session.state = previous;

    match previous {
        DialogueState::ScheduleStart | DialogueState::SelectDate => Ok(dates_reply(now)),
        DialogueState::SelectTime => match session.data.pending_date {
            Some(day) => times_reply(state, day),
            None => {
                session.state = DialogueState::SelectDate;
                Ok(dates_reply(now))
            }
        },
        DialogueState::ConfirmAppointment if session.data.pending_start.is_some() => {
            Ok(confirm_prompt(session))
        }
        DialogueState::CollectEmail => Ok(Reply::plain(
            "Por favor indíqueme su correo electrónico.",
        )),
        DialogueState::ShowFaqCategory => match session.data.faq_category.clone() {
            Some(category) => show_category(state, session, &category),
            None => categories_reply(state),
        },
        DialogueState::ShowContact => Ok(contact_reply(state)),
        _ => {
            session.state = DialogueState::Menu;
            Ok(menu_reply(user))
        }
    }
}

// ── Formatting ──

const WEEKDAYS_ES: [&str; 7] = [
    "lunes",
    "martes",
    "miércoles",
    "jueves",
    "viernes",
    "sábado",
    "domingo",
];

const WEEKDAYS_ES_SHORT: [&str; 7] = ["lun", "mar", "mié", "jue", "vie", "sáb", "dom"];

pub fn format_date_es(day: NaiveDate) -> String {
    let weekday = WEEKDAYS_ES[day.weekday().num_days_from_monday() as usize];
    format!("{weekday} {:02}/{:02}/{}", day.day(), day.month(), day.year())
}

fn short_date_label(day: NaiveDate) -> String {
    let weekday = WEEKDAYS_ES_SHORT[day.weekday().num_days_from_monday() as usize];
    format!("{weekday} {:02}/{:02}", day.day(), day.month())
}

fn capitalize(s: &str) -> String {
    let mut chars = s.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

impl Reply {
    fn with_body_prefix(mut self, prefix: &str) -> Self {
        self.body = format!("{prefix}\n\n{}", self.body);
        self
    }
}

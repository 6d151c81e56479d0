use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::routing::{get, post};
use axum::Router;
use chrono::Duration;
use tower::ServiceExt;

use citabot::config::{AppConfig, ContactCard, PriceList};
use citabot::db;
use citabot::db::queries;
use citabot::handlers;
use citabot::services::notify::Notifier;
use citabot::services::transcribe::Transcriber;
use citabot::state::AppState;

struct MockNotifier {
    messages: Mutex<Vec<String>>,
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        self.messages.lock().unwrap().push(message.to_string());
        Ok(())
    }
}

struct MockTranscriber {
    transcript: String,
}

#[async_trait]
impl Transcriber for MockTranscriber {
    async fn transcribe(&self, _audio_url: &str) -> anyhow::Result<String> {
        Ok(self.transcript.clone())
    }
}

fn test_config() -> AppConfig {
    AppConfig {
        port: 0,
        database_url: ":memory:".to_string(),
        business_start_hour: 8,
        business_end_hour: 17,
        utc_offset_minutes: 0,
        timezone: "America/Caracas".to_string(),
        prices: PriceList {
            persona_natural: "25 USD".to_string(),
            persona_juridica: "35 USD".to_string(),
            renovacion: "20 USD".to_string(),
            token: "45 USD".to_string(),
            empresarial: "consultar con ventas".to_string(),
        },
        contact: ContactCard {
            phone: "+58 212-555-0134".to_string(),
            email: "soporte@example.com".to_string(),
            address: "Caracas".to_string(),
            website: "https://example.com".to_string(),
        },
        notify_url: "http://notify.test".to_string(),
        transcriber_url: "http://stt.test".to_string(),
    }
}

fn test_state(transcript: &str) -> (Arc<AppState>, Arc<MockNotifier>) {
    let conn = db::init_db(":memory:").unwrap();
    let notifier = Arc::new(MockNotifier {
        messages: Mutex::new(vec![]),
    });
    let transcriber = Box::new(MockTranscriber {
        transcript: transcript.to_string(),
    });
    let state = Arc::new(AppState::new(
        conn,
        test_config(),
        notifier.clone(),
        transcriber,
    ));
    (state, notifier)
}

fn test_app(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(handlers::health::health))
        .route("/webhook/message", post(handlers::webhook::message_webhook))
        .with_state(state)
}

async fn send(app: &Router, payload: serde_json::Value) -> (StatusCode, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/webhook/message")
                .header("content-type", "application/json")
                .body(Body::from(payload.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let body = serde_json::from_slice(&bytes).unwrap_or(serde_json::json!({}));
    (status, body)
}

async fn send_text(app: &Router, user: &str, text: &str) -> serde_json::Value {
    let (status, body) = send(
        app,
        serde_json::json!({ "external_id": user, "first_name": "Ana", "kind": "text", "text": text }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn send_voice(app: &Router, user: &str, transcript: &str) -> serde_json::Value {
    let (status, body) = send(
        app,
        serde_json::json!({ "external_id": user, "kind": "voice", "text": transcript }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

async fn send_button(app: &Router, user: &str, id: &str) -> serde_json::Value {
    let (status, body) = send(
        app,
        serde_json::json!({ "external_id": user, "kind": "button", "button_id": id }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body
}

fn button_ids(body: &serde_json::Value) -> Vec<String> {
    body["buttons"]
        .as_array()
        .map(|buttons| {
            buttons
                .iter()
                .filter_map(|b| b["postback"]["id"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

fn body_text(body: &serde_json::Value) -> String {
    body["body"].as_str().unwrap_or_default().to_string()
}

#[tokio::test]
async fn test_health_endpoint() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn test_menu_button_lists_main_options() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_button(&app, "tg:1", "menu").await;
    assert!(body_text(&body).contains("asistente"));

    let ids = button_ids(&body);
    assert!(ids.contains(&"schedule".to_string()));
    assert!(ids.contains(&"faqcats".to_string()));
    assert!(ids.contains(&"pricing".to_string()));
    assert!(ids.contains(&"contact".to_string()));
}

#[tokio::test]
async fn test_pricing_text_answers_with_price_list() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_text(&app, "tg:2", "¿cuánto cuesta el servicio?").await;
    let text = body_text(&body);
    assert!(text.contains("25 USD"));
    assert!(text.contains("35 USD"));
}

#[tokio::test]
async fn test_full_button_booking_flow_with_email_collection() {
    let (state, notifier) = test_state("");
    let app = test_app(state.clone());
    let user = "tg:3";

    // Date picker: 14 dates + menu button
    let body = send_button(&app, user, "schedule").await;
    let date_ids: Vec<_> = button_ids(&body)
        .into_iter()
        .filter(|id| id.starts_with("date_"))
        .collect();
    assert_eq!(date_ids.len(), 14);

    // Pick a date, then a time
    let day = state.config.now().date() + Duration::days(3);
    let body = send_button(&app, user, &format!("date_{}", day.format("%Y-%m-%d"))).await;
    let time_ids = button_ids(&body);
    assert!(time_ids.contains(&"time_08:00".to_string()));
    assert!(time_ids.contains(&"time_16:30".to_string()));
    assert!(!time_ids.contains(&"time_17:00".to_string()));

    let body = send_button(&app, user, "time_10:00").await;
    assert!(body_text(&body).contains("¿Confirma la cita?"));

    // No email on file yet: confirm asks for one
    let body = send_button(&app, user, "confirm").await;
    assert!(body_text(&body).contains("correo"));

    // Invalid email re-prompts, valid email commits
    let body = send_text(&app, user, "no-es-un-correo").await;
    assert!(body_text(&body).contains("no parece válido"));

    let body = send_text(&app, user, "ana@example.com").await;
    assert!(body_text(&body).contains("agendada"));
    assert!(body_text(&body).contains("10:00"));

    {
        let db = state.db.lock().unwrap();
        let appointments = queries::appointments_for_day(&db, day).unwrap();
        assert_eq!(appointments.len(), 1);
        assert_eq!(
            appointments[0].starts_at,
            day.and_hms_opt(10, 0, 0).unwrap()
        );

        let stored = queries::find_user_by_external_id(&db, user).unwrap().unwrap();
        assert_eq!(stored.email.as_deref(), Some("ana@example.com"));
    }

    // Operator notification fired
    tokio::time::sleep(std::time::Duration::from_millis(50)).await;
    let messages = notifier.messages.lock().unwrap();
    assert_eq!(messages.len(), 1);
    assert!(messages[0].contains("Nueva cita"));
}

#[tokio::test]
async fn test_booked_slot_disappears_from_picker() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let day = state.config.now().date() + Duration::days(2);
    let date_id = format!("date_{}", day.format("%Y-%m-%d"));

    // First user books 09:30
    send_button(&app, "tg:4", "schedule").await;
    send_button(&app, "tg:4", &date_id).await;
    send_button(&app, "tg:4", "time_09:30").await;
    send_button(&app, "tg:4", "confirm").await;
    send_text(&app, "tg:4", "uno@example.com").await;

    // Second user no longer sees 09:30, adjacent slots remain
    send_button(&app, "tg:5", "schedule").await;
    let body = send_button(&app, "tg:5", &date_id).await;
    let ids = button_ids(&body);
    assert!(!ids.contains(&"time_09:30".to_string()));
    assert!(ids.contains(&"time_09:00".to_string()));
    assert!(ids.contains(&"time_10:00".to_string()));
}

#[tokio::test]
async fn test_concurrent_overlapping_commits_one_wins() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let day1 = state.config.now().date() + Duration::days(5);
    let day2 = state.config.now().date() + Duration::days(6);
    let date1 = format!("date_{}", day1.format("%Y-%m-%d"));
    let date2 = format!("date_{}", day2.format("%Y-%m-%d"));

    // Both users first complete a booking so their emails are on file
    for (user, time, email) in [
        ("tg:6", "time_08:00", "seis@example.com"),
        ("tg:7", "time_08:30", "siete@example.com"),
    ] {
        send_button(&app, user, "schedule").await;
        send_button(&app, user, &date1).await;
        send_button(&app, user, time).await;
        send_button(&app, user, "confirm").await;
        send_text(&app, user, email).await;
    }

    // Both stage the same slot on another day
    for user in ["tg:6", "tg:7"] {
        send_button(&app, user, "schedule").await;
        send_button(&app, user, &date2).await;
        let body = send_button(&app, user, "time_10:00").await;
        assert!(body_text(&body).contains("¿Confirma la cita?"));
    }

    // Fire both confirms concurrently
    let (a, b) = tokio::join!(
        send_button(&app, "tg:6", "confirm"),
        send_button(&app, "tg:7", "confirm"),
    );

    let a_text = body_text(&a);
    let b_text = body_text(&b);
    let a_won = a_text.contains("agendada");
    let b_won = b_text.contains("agendada");
    assert!(a_won ^ b_won, "exactly one commit must win: {a_text} / {b_text}");
    assert!(
        (if a_won { &b_text } else { &a_text }).contains("reservado"),
        "loser must see the conflict message"
    );

    let db = state.db.lock().unwrap();
    let at_slot: Vec<_> = queries::appointments_for_day(&db, day2)
        .unwrap()
        .into_iter()
        .filter(|appt| appt.starts_at == day2.and_hms_opt(10, 0, 0).unwrap())
        .collect();
    assert_eq!(at_slot.len(), 1);
}

#[tokio::test]
async fn test_voice_fast_path_collects_email_then_commits() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let user = "tg:8";

    let body = send_voice(&app, user, "quiero agendar una cita el viernes a las 10:00").await;
    assert!(body_text(&body).contains("correo"));

    let body = send_text(&app, user, "ocho@example.com").await;
    assert!(body_text(&body).contains("agendada"));
    assert!(body_text(&body).contains("10:00"));
}

#[tokio::test]
async fn test_voice_fast_path_auto_confirms_with_known_email() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let user = "tg:9";

    // First booking collects the email
    send_voice(&app, user, "quiero agendar una cita el viernes a las 10:00").await;
    send_text(&app, user, "nueve@example.com").await;

    // Second voice booking commits without any button round-trip
    let body = send_voice(&app, user, "agendar otra demo el viernes a las 11:00").await;
    assert!(body_text(&body).contains("agendada"));
    assert!(body_text(&body).contains("11:00"));
}

#[tokio::test]
async fn test_voice_date_only_shows_time_picker() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_voice(&app, "tg:10", "quisiera una cita para mañana").await;
    assert!(body_text(&body).contains("Horarios disponibles"));
    assert!(button_ids(&body).contains(&"time_08:00".to_string()));
}

#[tokio::test]
async fn test_empty_voice_transcript_reprompts() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let (status, body) = send(
        &app,
        serde_json::json!({ "external_id": "tg:11", "kind": "voice", "audio_url": "http://files.test/a.ogg" }),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body_text(&body).contains("No pude escuchar"));
}

#[tokio::test]
async fn test_faq_match_and_feedback() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let user = "tg:12";

    let body = send_text(&app, user, "¿cómo instalo el certificado en mi computadora?").await;
    assert!(body_text(&body).contains("instalarlo"));
    let ids = button_ids(&body);
    assert!(ids.contains(&"fb_up".to_string()));
    assert!(ids.contains(&"fb_down".to_string()));

    let body = send_button(&app, user, "fb_up").await;
    assert!(body_text(&body).contains("Gracias"));

    let db = state.db.lock().unwrap();
    let count: i64 = db
        .query_row("SELECT COUNT(*) FROM feedback WHERE vote = 'up'", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(count, 1);
}

#[tokio::test]
async fn test_faq_category_browsing() {
    let (state, _) = test_state("");
    let app = test_app(state);
    let user = "tg:13";

    let body = send_button(&app, user, "faqcats").await;
    let ids = button_ids(&body);
    assert!(ids.contains(&"faqcat_pagos".to_string()));

    let body = send_button(&app, user, "faqcat_pagos").await;
    let faq_ids: Vec<_> = button_ids(&body)
        .into_iter()
        .filter(|id| id.starts_with("faq_"))
        .collect();
    assert!(!faq_ids.is_empty());

    let body = send_button(&app, user, &faq_ids[0]).await;
    assert!(body_text(&body).contains("útil"));
}

#[tokio::test]
async fn test_unanswered_question_is_recorded() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());

    let body = send_text(&app, "tg:14", "futbol").await;
    assert!(body_text(&body).contains("Registré su pregunta"));

    let db = state.db.lock().unwrap();
    let (question, source): (String, String) = db
        .query_row(
            "SELECT question, source FROM user_questions LIMIT 1",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(question, "futbol");
    assert_eq!(source, "text");
}

#[tokio::test]
async fn test_unanswered_voice_question_tagged_as_voice() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());

    send_voice(&app, "tg:15", "futbol").await;

    let db = state.db.lock().unwrap();
    let source: String = db
        .query_row("SELECT source FROM user_questions LIMIT 1", [], |row| {
            row.get(0)
        })
        .unwrap();
    assert_eq!(source, "voice");
}

#[tokio::test]
async fn test_unknown_button_resets_to_menu() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_button(&app, "tg:16", "what_is_this").await;
    assert!(body_text(&body).contains("No reconocí esa opción"));
    assert!(button_ids(&body).contains(&"schedule".to_string()));
}

#[tokio::test]
async fn test_quit_ends_and_next_event_restarts() {
    let (state, _) = test_state("");
    let app = test_app(state);
    let user = "tg:17";

    let body = send_text(&app, user, "salir").await;
    assert!(body_text(&body).contains("finalizada"));
    assert!(button_ids(&body).is_empty());

    let body = send_text(&app, user, "lo que sea").await;
    assert!(body_text(&body).contains("asistente"));
    assert!(button_ids(&body).contains(&"schedule".to_string()));
}

#[tokio::test]
async fn test_go_back_from_time_picker_returns_dates() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let user = "tg:18";
    let day = state.config.now().date() + Duration::days(4);

    send_button(&app, user, "schedule").await;
    send_button(&app, user, &format!("date_{}", day.format("%Y-%m-%d"))).await;

    let body = send_button(&app, user, "back").await;
    assert!(body_text(&body).contains("fecha"));
    assert!(button_ids(&body).iter().any(|id| id.starts_with("date_")));
}

#[tokio::test]
async fn test_cancel_in_confirmation_discards_reservation() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let user = "tg:19";
    let day = state.config.now().date() + Duration::days(4);

    send_button(&app, user, "schedule").await;
    send_button(&app, user, &format!("date_{}", day.format("%Y-%m-%d"))).await;
    send_button(&app, user, "time_12:00").await;
    let body = send_button(&app, user, "cancel").await;
    assert!(body_text(&body).contains("descartada"));

    let db = state.db.lock().unwrap();
    assert!(queries::appointments_for_day(&db, day).unwrap().is_empty());
}

#[tokio::test]
async fn test_missing_text_is_bad_request() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let (status, _) = send(
        &app,
        serde_json::json!({ "external_id": "tg:20", "kind": "text" }),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_contact_keyword_shows_contact_card() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_text(&app, "tg:22", "contacto").await;
    assert!(body_text(&body).contains("+58 212-555-0134"));

    let body = send_text(&app, "tg:22", "necesito ayuda").await;
    assert!(body_text(&body).contains("soporte@example.com"));
}

#[tokio::test]
async fn test_question_keyword_shows_faq_categories() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_text(&app, "tg:23", "tengo una pregunta frecuente").await;
    assert!(button_ids(&body).iter().any(|id| id.starts_with("faqcat_")));
}

#[tokio::test]
async fn test_about_keyword_describes_company() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_text(&app, "tg:24", "¿quiénes son ustedes?").await;
    assert!(body_text(&body).contains("certificación"));
}

#[tokio::test]
async fn test_stale_time_button_relists_available_times() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let day = state.config.now().date() + Duration::days(2);
    let date_id = format!("date_{}", day.format("%Y-%m-%d"));

    // Second user opens the time list while the slot is still free
    send_button(&app, "tg:26", "schedule").await;
    let body = send_button(&app, "tg:26", &date_id).await;
    assert!(button_ids(&body).contains(&"time_10:00".to_string()));

    // First user books 10:00 in the meantime
    send_button(&app, "tg:25", "schedule").await;
    send_button(&app, "tg:25", &date_id).await;
    send_button(&app, "tg:25", "time_10:00").await;
    send_button(&app, "tg:25", "confirm").await;
    send_text(&app, "tg:25", "otro@example.com").await;

    // The stale button re-lists instead of staging the taken slot
    let body = send_button(&app, "tg:26", "time_10:00").await;
    assert!(body_text(&body).contains("ya no está disponible"));
    let ids = button_ids(&body);
    assert!(!ids.contains(&"time_10:00".to_string()));
    assert!(ids.contains(&"time_10:30".to_string()));

    // Nothing was staged for the second user
    let body = send_button(&app, "tg:26", "confirm").await;
    assert!(body_text(&body).contains("No hay ninguna reserva en curso"));
}

#[tokio::test]
async fn test_voice_date_time_overrides_time_picker_state() {
    let (state, _) = test_state("");
    let app = test_app(state.clone());
    let user = "tg:27";
    let day = state.config.now().date() + Duration::days(3);

    send_button(&app, user, "schedule").await;
    send_button(&app, user, &format!("date_{}", day.format("%Y-%m-%d"))).await;

    // A spoken date+time replaces the pending picker selection entirely
    let body = send_voice(&app, user, "agéndame para pasado mañana a las 3 de la tarde").await;
    let text = body_text(&body);
    assert!(text.contains("15:00"));
    assert!(text.contains("correo"));
}

#[tokio::test]
async fn test_contact_card() {
    let (state, _) = test_state("");
    let app = test_app(state);

    let body = send_button(&app, "tg:21", "contact").await;
    let text = body_text(&body);
    assert!(text.contains("+58 212-555-0134"));
    assert!(text.contains("soporte@example.com"));
    assert_eq!(body["formatting"].as_str(), Some("markdown"));
}

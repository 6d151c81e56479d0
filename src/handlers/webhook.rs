use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use crate::db::queries;
use crate::errors::AppError;
use crate::models::{Event, Reply, User, UserType};
use crate::services::dialogue;
use crate::state::AppState;

/// Normalized inbound event from the chat transport adapter.
#[derive(Deserialize)]
pub struct InboundPayload {
    pub external_id: String,
    pub username: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    /// "text" | "voice" | "button"
    pub kind: String,
    pub text: Option<String>,
    pub button_id: Option<String>,
    pub audio_url: Option<String>,
}

pub async fn message_webhook(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<InboundPayload>,
) -> Result<Json<Reply>, AppError> {
    if payload.external_id.trim().is_empty() {
        return Err(AppError::BadRequest("external_id is required".to_string()));
    }

    // Events for one user are processed in order
    let lock = state.session_lock(&payload.external_id);
    let _guard = lock.lock().await;

    let user = ensure_user(&state, &payload)?;

    let event = match payload.kind.as_str() {
        "text" => match payload.text {
            Some(text) if !text.trim().is_empty() => Event::Text { text },
            _ => return Err(AppError::BadRequest("text is required".to_string())),
        },
        "button" => match payload.button_id {
            Some(id) if !id.is_empty() => Event::Button { id },
            _ => return Err(AppError::BadRequest("button_id is required".to_string())),
        },
        "voice" => {
            let transcript = match (payload.text, payload.audio_url) {
                (Some(text), _) => text,
                (None, Some(audio_url)) => {
                    match state.transcriber.transcribe(&audio_url).await {
                        Ok(text) => text,
                        Err(e) => {
                            tracing::error!(error = %e, "transcription failed");
                            String::new()
                        }
                    }
                }
                (None, None) => {
                    return Err(AppError::BadRequest(
                        "voice events need text or audio_url".to_string(),
                    ))
                }
            };

            if transcript.trim().is_empty() {
                return Ok(Json(Reply::plain(
                    "No pude escuchar bien el audio. ¿Podría repetirlo o escribir su mensaje?",
                )));
            }
            Event::VoiceTranscript { text: transcript }
        }
        other => {
            return Err(AppError::BadRequest(format!("unknown event kind: {other}")));
        }
    };

    match dialogue::process_event(&state, &user, &event).await {
        Ok(reply) => Ok(Json(reply)),
        Err(e) => {
            tracing::error!(error = %e, user = %user.external_id, "dialogue processing failed");
            Ok(Json(Reply::plain(
                "Estamos presentando inconvenientes en este momento. Por favor intente de nuevo en unos minutos.",
            )))
        }
    }
}

fn ensure_user(state: &Arc<AppState>, payload: &InboundPayload) -> Result<User, AppError> {
    let db = state.db.lock().unwrap();

    if let Some(user) = queries::find_user_by_external_id(&db, &payload.external_id)? {
        return Ok(user);
    }

    let now = state.config.now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        external_id: payload.external_id.clone(),
        username: payload.username.clone(),
        first_name: payload.first_name.clone(),
        last_name: payload.last_name.clone(),
        email: None,
        user_type: UserType::Customer,
        is_active: true,
        created_at: now,
        updated_at: now,
    };
    queries::create_user(&db, &user)?;
    tracing::info!(user = %user.external_id, "registered new user");

    Ok(user)
}

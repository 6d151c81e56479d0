use serde::{Deserialize, Serialize};

/// Normalized inbound event from the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Event {
    Text { text: String },
    VoiceTranscript { text: String },
    Button { id: String },
}

impl Event {
    pub fn is_voice(&self) -> bool {
        matches!(self, Event::VoiceTranscript { .. })
    }
}

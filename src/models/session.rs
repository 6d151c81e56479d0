use chrono::{NaiveDate, NaiveDateTime};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum DialogueState {
    Menu,
    ScheduleStart,
    SelectDate,
    SelectTime,
    ConfirmAppointment,
    CollectEmail,
    ShowFaqCategory,
    ShowContact,
    Ended,
}

impl DialogueState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DialogueState::Menu => "menu",
            DialogueState::ScheduleStart => "schedule_start",
            DialogueState::SelectDate => "select_date",
            DialogueState::SelectTime => "select_time",
            DialogueState::ConfirmAppointment => "confirm_appointment",
            DialogueState::CollectEmail => "collect_email",
            DialogueState::ShowFaqCategory => "show_faq_category",
            DialogueState::ShowContact => "show_contact",
            DialogueState::Ended => "ended",
        }
    }

    pub fn parse(s: &str) -> Self {
        match s {
            "schedule_start" => DialogueState::ScheduleStart,
            "select_date" => DialogueState::SelectDate,
            "select_time" => DialogueState::SelectTime,
            "confirm_appointment" => DialogueState::ConfirmAppointment,
            "collect_email" => DialogueState::CollectEmail,
            "show_faq_category" => DialogueState::ShowFaqCategory,
            "show_contact" => DialogueState::ShowContact,
            "ended" => DialogueState::Ended,
            _ => DialogueState::Menu,
        }
    }
}

/// Dialogue scratch data, persisted as a JSON blob alongside the state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionData {
    pub pending_date: Option<NaiveDate>,
    pub pending_start: Option<NaiveDateTime>,
    pub faq_category: Option<String>,
    pub last_faq_id: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub external_id: String,
    pub state: DialogueState,
    pub previous_state: Option<DialogueState>,
    pub data: SessionData,
    pub updated_at: NaiveDateTime,
}

impl Session {
    pub fn new(external_id: &str, now: NaiveDateTime) -> Self {
        Self {
            external_id: external_id.to_string(),
            state: DialogueState::Menu,
            previous_state: None,
            data: SessionData::default(),
            updated_at: now,
        }
    }

    /// Move to a new state, remembering the old one for go-back.
    pub fn transition(&mut self, next: DialogueState) {
        if self.state != next {
            self.previous_state = Some(self.state);
        }
        self.state = next;
    }

    pub fn reset(&mut self) {
        self.state = DialogueState::Menu;
        self.previous_state = None;
        self.data = SessionData::default();
    }
}

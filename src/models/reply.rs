use serde::{Deserialize, Serialize};

/// Outbound reply descriptor handed back to the chat transport.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Reply {
    pub body: String,
    pub buttons: Vec<Button>,
    pub formatting: Formatting,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Button {
    pub label: String,
    #[serde(flatten)]
    pub action: ButtonAction,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ButtonAction {
    Postback { id: String },
    Url { url: String },
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Formatting {
    Plain,
    Markdown,
}

impl Reply {
    pub fn plain(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            buttons: vec![],
            formatting: Formatting::Plain,
        }
    }

    pub fn markdown(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            buttons: vec![],
            formatting: Formatting::Markdown,
        }
    }

    pub fn with_button(mut self, label: impl Into<String>, id: impl Into<String>) -> Self {
        self.buttons.push(Button {
            label: label.into(),
            action: ButtonAction::Postback { id: id.into() },
        });
        self
    }

    pub fn with_link(mut self, label: impl Into<String>, url: impl Into<String>) -> Self {
        self.buttons.push(Button {
            label: label.into(),
            action: ButtonAction::Url { url: url.into() },
        });
        self
    }
}

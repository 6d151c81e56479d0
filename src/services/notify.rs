use anyhow::Context;
use async_trait::async_trait;

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn notify(&self, message: &str) -> anyhow::Result<()>;
}

/// Posts operator notifications as JSON to a configured webhook.
pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn notify(&self, message: &str) -> anyhow::Result<()> {
        if self.url.is_empty() {
            tracing::warn!("NOTIFY_URL not configured, dropping notification");
            return Ok(());
        }

        self.client
            .post(&self.url)
            .json(&serde_json::json!({ "text": message }))
            .send()
            .await
            .context("failed to post notification")?
            .error_for_status()
            .context("notification endpoint returned error")?;

        Ok(())
    }
}

use std::time::Duration;

use anyhow::{Context, Result};

/// One-way notification channel. Failures are logged by the caller, never
/// fatal, and must not stall the poll loop beyond a bounded timeout.
pub trait Notifier {
    async fn send(&self, text: &str) -> Result<()>;
}

/// Posts messages to a chat webhook. With no URL configured every send is a
/// no-op, so the monitor code does not branch on notification setup.
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: Option<String>,
}

impl WebhookNotifier {
    pub fn new(url: Option<String>) -> Result<Self> {
        // The client timeout is the bound on how long a slow webhook can
        // hold up a cycle.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .context("failed to build webhook http client")?;
        Ok(Self { client, url })
    }
}

impl Notifier for WebhookNotifier {
    async fn send(&self, text: &str) -> Result<()> {
        let Some(url) = &self.url else {
            tracing::debug!("no webhook configured, dropping: {}", text);
            return Ok(());
        };
        self.client
            .post(url)
            .json(&serde_json::json!({ "content": text }))
            .send()
            .await
            .context("webhook request failed")?
            .error_for_status()
            .context("webhook rejected message")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn unconfigured_webhook_is_a_noop() {
        let notifier = WebhookNotifier::new(None).unwrap();
        assert!(notifier.send("account main stuck").await.is_ok());
    }
}

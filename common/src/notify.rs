use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, error, info};

#[derive(Serialize)]
struct MailMessage<'a> {
    to: &'a str,
    subject: &'a str,
    text: String,
}

/// Outbound mail sink. Delivery goes through an HTTP webhook; without one the
/// message is only logged.
#[derive(Debug, Clone)]
pub struct Mailer {
    client: reqwest::Client,
    webhook_url: Option<String>,
}

impl Mailer {
    pub fn new(webhook_url: Option<String>) -> Self {
        Mailer {
            client: reqwest::Client::new(),
            webhook_url,
        }
    }

    pub async fn send_reset_code(
        &self,
        email: &str,
        code: &str,
        expires_at: DateTime<Utc>,
    ) -> Result<()> {
        let Some(url) = &self.webhook_url else {
            debug!("Mail delivery disabled, skipping reset code mail to {}", email);
            return Ok(());
        };

        let message = MailMessage {
            to: email,
            subject: "Your password reset code",
            text: reset_code_body(code, expires_at),
        };

        info!("Sending reset code mail to {}", email);
        let response = self.client.post(url).json(&message).send().await?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            error!("Mail webhook error {}: {}", status, error_text);
            bail!("mail webhook responded with {}", status);
        }

        Ok(())
    }
}

fn reset_code_body(code: &str, expires_at: DateTime<Utc>) -> String {
    format!(
        "Your password reset code is {}.\nIt expires at {} UTC. If you did not request a reset, ignore this message.",
        code,
        expires_at.format("%Y-%m-%d %H:%M:%S")
    )
}

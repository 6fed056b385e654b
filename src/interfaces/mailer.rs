use reqwest::Client;
use serde_json::json;
use tracing::info;

use crate::{application::config::RuntimeConfig, domain::models::DeliveryMessageRecord};

/// Outbound mail boundary. The webhook variant hands messages to an external
/// relay over HTTP; the log variant only records what would have been sent.
#[derive(Debug, Clone)]
pub enum Mailer {
    Webhook { client: Client, endpoint: String },
    Log,
}

impl Mailer {
    #[must_use]
    pub fn from_config(config: &RuntimeConfig) -> Self {
        match &config.mail_webhook_url {
            Some(endpoint) => Self::Webhook {
                client: Client::new(),
                endpoint: endpoint.clone(),
            },
            None => Self::Log,
        }
    }

    pub async fn send(&self, message: &DeliveryMessageRecord) -> Result<(), String> {
        match self {
            Self::Webhook { client, endpoint } => {
                let payload = json!({
                    "to": message.destination,
                    "subject": message.subject,
                    "body": message.body,
                    "attachments": message.attachments,
                });
                let response = client
                    .post(endpoint)
                    .json(&payload)
                    .send()
                    .await
                    .map_err(|error| format!("mail webhook request failed: {error}"))?;
                if !response.status().is_success() {
                    return Err(format!("mail webhook returned {}", response.status()));
                }
                Ok(())
            }
            Self::Log => {
                info!(
                    "would send email to {}: {}",
                    message.destination, message.subject
                );
                Ok(())
            }
        }
    }
}

use crate::config::Config;
use crate::errors::AppError;
use chrono::NaiveDate;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Webhook request timeout in seconds. Matches the invoicing-provider
/// client so a hung messaging service cannot pin spawned tasks.
const REQUEST_TIMEOUT_SECS: u64 = 15;

/// Payload sent to the platform messaging service when a public-portal
/// value assignment succeeds.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ManagerNotification {
    pub to: String,
    pub clinic_name: String,
    pub employer_name: String,
    pub contribution_type: String,
    pub competence: String,
    pub due_date: NaiveDate,
    pub value_cents: i64,
    pub invoice_url: String,
}

/// Fire-and-forget dispatcher for manager notifications.
///
/// Dispatch runs in a spawned task; failures are logged and never propagate
/// to the workflow, since invoice issuance already succeeded and must not be
/// undone by a notification error.
#[derive(Clone)]
pub struct ManagerNotifier {
    client: Client,
    webhook_url: Option<String>,
}

impl ManagerNotifier {
    pub fn new(config: &Config) -> Result<Self, AppError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| AppError::Internal(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            webhook_url: config.notify_webhook_url.clone(),
        })
    }

    pub fn notify_manager(&self, notification: ManagerNotification) {
        let url = match &self.webhook_url {
            Some(url) => url.clone(),
            None => {
                tracing::debug!("Manager notification skipped: no webhook configured");
                return;
            }
        };

        let client = self.client.clone();
        // The spawned task inherits the bounded-timeout client, so a hung
        // webhook endpoint cannot keep the task alive past the timeout.
        tokio::spawn(async move {
            let to = notification.to.clone();
            match client.post(&url).json(&notification).send().await {
                Ok(response) if response.status().is_success() => {
                    tracing::info!("Manager notification sent to {}", to);
                }
                Ok(response) => {
                    tracing::warn!(
                        "Manager notification to {} rejected with status {}",
                        to,
                        response.status()
                    );
                }
                Err(e) => {
                    tracing::warn!("Manager notification to {} failed: {}", to, e);
                }
            }
        });
    }
}

use anyhow::Context;
use async_trait::async_trait;

/// The payments service releases a booking's held payment to the company
/// once the service has been delivered.
#[async_trait]
pub trait PaymentCollaborator: Send + Sync {
    async fn mark_service_completed(&self, booking_id: &str) -> anyhow::Result<()>;
}

pub struct HttpPaymentCollaborator {
    base_url: String,
    api_key: String,
    client: reqwest::Client,
}

impl HttpPaymentCollaborator {
    pub fn new(base_url: String, api_key: String) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl PaymentCollaborator for HttpPaymentCollaborator {
    async fn mark_service_completed(&self, booking_id: &str) -> anyhow::Result<()> {
        let url = format!("{}/bookings/{booking_id}/service-completed", self.base_url);

        self.client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&serde_json::json!({ "booking_id": booking_id }))
            .send()
            .await
            .context("failed to reach payments service")?
            .error_for_status()
            .context("payments service returned error")?;

        Ok(())
    }
}

/// Used when no payments service is configured.
pub struct LoggingPaymentCollaborator;

#[async_trait]
impl PaymentCollaborator for LoggingPaymentCollaborator {
    async fn mark_service_completed(&self, booking_id: &str) -> anyhow::Result<()> {
        tracing::warn!(booking_id, "no payments service configured, completion signal dropped");
        Ok(())
    }
}

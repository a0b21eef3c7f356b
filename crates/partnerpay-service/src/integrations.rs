//! Production implementations of the engine's external capability traits.
//!
//! The engine depends on trait objects for the payment processor's
//! recipient directory and the partner notification fan-out; this module
//! provides the HTTP-backed implementations wired up from configuration.
//! Unconfigured integrations fall back to the engine's no-op variants.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use partnerpay_core::Partner;
use partnerpay_engine::{Notifier, RecipientConfig, RecipientDirectory};

/// Timeout for outbound integration requests.
const INTEGRATION_TIMEOUT: Duration = Duration::from_secs(10);

/// Recipient directory backed by the payment processor's HTTP API.
#[derive(Clone)]
pub struct HttpRecipientDirectory {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

/// Processor wire format for a recipient resource.
#[derive(Debug, Deserialize)]
struct RecipientResource {
    #[serde(default)]
    payouts_enabled: bool,
    #[serde(default)]
    default_payout_method: Option<String>,
    #[serde(default)]
    payout_method_fingerprint: Option<String>,
}

impl HttpRecipientDirectory {
    /// Create a directory client for the given processor API.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(base_url: &str, api_key: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(INTEGRATION_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }
}

#[async_trait]
impl RecipientDirectory for HttpRecipientDirectory {
    async fn recipient_config(&self, recipient_id: &str) -> Result<RecipientConfig, String> {
        let url = format!("{}/v1/recipients/{recipient_id}", self.base_url);

        let response = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| format!("recipient fetch failed: {e}"))?;

        if !response.status().is_success() {
            return Err(format!(
                "recipient fetch returned {} for {recipient_id}",
                response.status()
            ));
        }

        let resource: RecipientResource = response
            .json()
            .await
            .map_err(|e| format!("recipient response parse failed: {e}"))?;

        Ok(RecipientConfig {
            payouts_enabled: resource.payouts_enabled,
            default_payout_method: resource.default_payout_method,
            payout_method_fingerprint: resource.payout_method_fingerprint,
        })
    }
}

/// Notifier that posts partner notifications to a webhook URL.
///
/// Delivery is best-effort: failures are logged and never propagated, so a
/// flaky notification endpoint cannot fail webhook reconciliation.
#[derive(Clone)]
pub struct WebhookNotifier {
    client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    /// Create a notifier posting to the given URL.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(url: &str) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(INTEGRATION_TIMEOUT)
            .build()?;

        Ok(Self {
            client,
            url: url.to_string(),
        })
    }
}

#[async_trait]
impl Notifier for WebhookNotifier {
    async fn payout_method_updated(&self, partner: &Partner) {
        let payload = serde_json::json!({
            "event": "payout_method.updated",
            "partner_id": partner.id,
            "email": partner.email,
        });

        match self.client.post(&self.url).json(&payload).send().await {
            Ok(response) if response.status().is_success() => {
                tracing::debug!(partner_id = %partner.id, "payout method notification delivered");
            }
            Ok(response) => {
                tracing::warn!(
                    partner_id = %partner.id,
                    status = %response.status(),
                    "payout method notification rejected"
                );
            }
            Err(e) => {
                tracing::warn!(partner_id = %partner.id, error = %e, "payout method notification failed");
            }
        }
    }
}

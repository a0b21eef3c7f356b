//! Application state.

use std::sync::Arc;

use partnerpay_engine::{
    NoopLinkIndex, NoopNotifier, NoopRecipientDirectory, Notifier, PartnerMerger, RecipientDirectory,
    Reconciler,
};
use partnerpay_store::Ledger;

use crate::config::ServiceConfig;
use crate::integrations::{HttpRecipientDirectory, WebhookNotifier};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The ledger store.
    pub ledger: Arc<dyn Ledger>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Payment event reconciler.
    pub reconciler: Reconciler,

    /// Partner account merger.
    pub merger: PartnerMerger,

    /// HTTP client for cron self-requeue requests.
    pub http: reqwest::Client,
}

impl AppState {
    /// Create a new application state, wiring integrations from config.
    #[must_use]
    pub fn new(ledger: Arc<dyn Ledger>, config: ServiceConfig) -> Self {
        // Recipient directory if the processor API is configured
        let recipients: Arc<dyn RecipientDirectory> = config
            .recipient_api_url
            .as_ref()
            .zip(config.recipient_api_key.as_ref())
            .and_then(
                |(url, key)| match HttpRecipientDirectory::new(url, key) {
                    Ok(client) => {
                        tracing::info!(recipient_api = %url, "recipient directory enabled");
                        Some(Arc::new(client) as Arc<dyn RecipientDirectory>)
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "failed to create recipient directory client");
                        None
                    }
                },
            )
            .unwrap_or_else(|| {
                tracing::warn!(
                    "recipient API not configured - recipient events will not sync payout config"
                );
                Arc::new(NoopRecipientDirectory)
            });

        // Notifier if a webhook URL is configured
        let notifier: Arc<dyn Notifier> = config
            .notify_webhook_url
            .as_ref()
            .and_then(|url| match WebhookNotifier::new(url) {
                Ok(client) => {
                    tracing::info!(notify_url = %url, "partner notifications enabled");
                    Some(Arc::new(client) as Arc<dyn Notifier>)
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to create notification client");
                    None
                }
            })
            .unwrap_or_else(|| {
                tracing::warn!("notification webhook not configured - partner notifications dropped");
                Arc::new(NoopNotifier)
            });

        let reconciler = Reconciler::new(Arc::clone(&ledger), recipients, notifier);
        let merger = PartnerMerger::new(Arc::clone(&ledger), Arc::new(NoopLinkIndex));

        Self {
            ledger,
            config,
            reconciler,
            merger,
            http: reqwest::Client::new(),
        }
    }
}

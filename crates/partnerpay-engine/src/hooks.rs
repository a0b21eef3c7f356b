//! External capability boundaries consumed by the engine.
//!
//! These traits model collaborators outside the payout core: the payment
//! processor's recipient directory, the notification fan-out, and the link
//! search/cache mirror. Each has a no-op implementation used by tests and
//! as the fallback when an integration is unconfigured; production
//! implementations live in the service crate.

use async_trait::async_trait;

use partnerpay_core::{Partner, PartnerId, ProgramId};

/// A recipient's current payout configuration as seen by the payment
/// processor. Treated as a pure function of recipient state.
#[derive(Debug, Clone, Default)]
pub struct RecipientConfig {
    /// Whether the recipient has a verified payout method.
    pub payouts_enabled: bool,
    /// The recipient's default payout method identifier.
    pub default_payout_method: Option<String>,
    /// Fingerprint of the payout method, for duplicate detection.
    pub payout_method_fingerprint: Option<String>,
}

/// Resolves external recipient ids to their current configuration.
#[async_trait]
pub trait RecipientDirectory: Send + Sync {
    /// Fetch the recipient's current payout configuration.
    ///
    /// # Errors
    ///
    /// Returns a message describing the lookup failure; callers surface it
    /// as a processing error so the event is redelivered.
    async fn recipient_config(&self, recipient_id: &str) -> Result<RecipientConfig, String>;
}

/// Fire-and-forget notification sink. Failures are logged by
/// implementations, never propagated to the primary path.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Notify a partner that their payout method changed.
    async fn payout_method_updated(&self, partner: &Partner);
}

/// External search/analytics mirror of link metadata.
#[async_trait]
pub trait LinkIndex: Send + Sync {
    /// Refresh the mirror for a partner's links within a program.
    async fn refresh_links(&self, program_id: &ProgramId, partner_id: &PartnerId);

    /// Invalidate cached link metadata for a program.
    async fn invalidate_cache(&self, program_id: &ProgramId);
}

/// Recipient directory that knows no recipients.
#[derive(Debug, Clone, Default)]
pub struct NoopRecipientDirectory;

#[async_trait]
impl RecipientDirectory for NoopRecipientDirectory {
    async fn recipient_config(&self, recipient_id: &str) -> Result<RecipientConfig, String> {
        Err(format!("recipient directory not configured: {recipient_id}"))
    }
}

/// Notifier that only logs.
#[derive(Debug, Clone, Default)]
pub struct NoopNotifier;

#[async_trait]
impl Notifier for NoopNotifier {
    async fn payout_method_updated(&self, partner: &Partner) {
        tracing::debug!(partner_id = %partner.id, "notifier not configured, dropping payout method notification");
    }
}

/// Link index that only logs.
#[derive(Debug, Clone, Default)]
pub struct NoopLinkIndex;

#[async_trait]
impl LinkIndex for NoopLinkIndex {
    async fn refresh_links(&self, program_id: &ProgramId, partner_id: &PartnerId) {
        tracing::debug!(%program_id, %partner_id, "link index not configured, skipping refresh");
    }

    async fn invalidate_cache(&self, program_id: &ProgramId) {
        tracing::debug!(%program_id, "link index not configured, skipping cache invalidation");
    }
}

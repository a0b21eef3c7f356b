//! Payment processor event reconciliation.
//!
//! Applies the processor's asynchronous lifecycle events — transfer
//! settlement outcomes and recipient account changes — to payout and
//! partner state. Every handler is idempotent: processors redeliver events,
//! and redelivered events must match zero rows rather than re-stamp
//! timestamps or re-send notifications.

use std::sync::Arc;

use chrono::Utc;

use partnerpay_store::Ledger;

use crate::error::{EngineError, Result};
use crate::hooks::{Notifier, RecipientDirectory};
use partnerpay_core::PayoutFailureReason;

/// A payment processor event, decoded from the webhook payload.
#[derive(Debug, Clone)]
pub enum PaymentEvent {
    /// Funds for a transfer were confirmed received.
    TransferPosted {
        /// Processor's identifier for the transfer.
        external_payout_id: String,
        /// Processor trace id, when provided.
        trace_id: Option<String>,
    },
    /// A transfer was returned by the receiving bank.
    TransferReturned {
        /// Processor's identifier for the transfer.
        external_payout_id: String,
        /// Processor reason code, when provided.
        reason_code: Option<String>,
    },
    /// A transfer failed before dispatch.
    TransferFailed {
        /// Processor's identifier for the transfer.
        external_payout_id: String,
        /// Processor reason code, when provided.
        reason_code: Option<String>,
    },
    /// A recipient's account configuration changed.
    RecipientUpdated {
        /// Processor recipient identifier.
        recipient_id: String,
    },
    /// A recipient's account was closed.
    RecipientClosed {
        /// Processor recipient identifier.
        recipient_id: String,
    },
}

/// Applies [`PaymentEvent`]s to ledger state.
#[derive(Clone)]
pub struct Reconciler {
    ledger: Arc<dyn Ledger>,
    recipients: Arc<dyn RecipientDirectory>,
    notifier: Arc<dyn Notifier>,
}

impl Reconciler {
    /// Create a reconciler over the given ledger and integrations.
    pub fn new(
        ledger: Arc<dyn Ledger>,
        recipients: Arc<dyn RecipientDirectory>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            ledger,
            recipients,
            notifier,
        }
    }

    /// Handle one event. Returns a short human-readable summary for the
    /// webhook acknowledgement body.
    ///
    /// # Errors
    ///
    /// Store and recipient-directory failures propagate so the processor
    /// redelivers the event; idempotence makes the retry safe.
    pub async fn handle(&self, event: PaymentEvent) -> Result<String> {
        match event {
            PaymentEvent::TransferPosted {
                external_payout_id,
                trace_id,
            } => self.transfer_posted(&external_payout_id, trace_id.as_deref()).await,
            PaymentEvent::TransferReturned {
                external_payout_id,
                reason_code,
            }
            | PaymentEvent::TransferFailed {
                external_payout_id,
                reason_code,
            } => self.transfer_failed(&external_payout_id, reason_code.as_deref()).await,
            PaymentEvent::RecipientUpdated { recipient_id } => {
                self.recipient_updated(&recipient_id).await
            }
            PaymentEvent::RecipientClosed { recipient_id } => {
                self.recipient_closed(&recipient_id).await
            }
        }
    }

    async fn transfer_posted(
        &self,
        external_payout_id: &str,
        trace_id: Option<&str>,
    ) -> Result<String> {
        let completed = self
            .ledger
            .complete_payouts(external_payout_id, trace_id, Utc::now())
            .await?;

        if completed.is_empty() {
            tracing::info!(external_payout_id, "transfer posted matched no open payouts");
            return Ok(format!(
                "No pending payouts found for external id {external_payout_id}."
            ));
        }

        tracing::info!(
            external_payout_id,
            payouts = completed.len(),
            "marked payouts completed from transfer posting"
        );
        Ok(format!(
            "Completed {} payout(s) for external id {external_payout_id}.",
            completed.len()
        ))
    }

    async fn transfer_failed(
        &self,
        external_payout_id: &str,
        reason_code: Option<&str>,
    ) -> Result<String> {
        let reason = reason_code.and_then(PayoutFailureReason::from_processor_code);
        if let Some(code) = reason_code {
            if reason.is_none() {
                tracing::warn!(external_payout_id, code, "unrecognized processor failure reason");
            }
        }

        let failed = self.ledger.fail_payouts(external_payout_id, reason).await?;

        if failed.is_empty() {
            tracing::info!(external_payout_id, "transfer failure matched no open payouts");
            return Ok(format!(
                "No open payouts found for external id {external_payout_id}."
            ));
        }

        tracing::warn!(
            external_payout_id,
            payouts = failed.len(),
            reason = reason.map(PayoutFailureReason::as_str),
            "marked payouts failed from transfer outcome"
        );
        Ok(format!(
            "Failed {} payout(s) for external id {external_payout_id}.",
            failed.len()
        ))
    }

    async fn recipient_updated(&self, recipient_id: &str) -> Result<String> {
        let Some(partner) = self.ledger.partner_by_recipient(recipient_id).await? else {
            // Recipients are created at the processor before the partner row
            // exists; the linking flow will sync state later.
            tracing::info!(recipient_id, "recipient update for unknown partner, ignoring");
            return Ok(format!("No partner linked to recipient {recipient_id}."));
        };

        let config = self
            .recipients
            .recipient_config(recipient_id)
            .await
            .map_err(EngineError::RecipientDirectory)?;

        // Keep the original enablement timestamp across repeated updates.
        let payouts_enabled_at = if config.payouts_enabled {
            partner.payouts_enabled_at.or_else(|| Some(Utc::now()))
        } else {
            None
        };

        let method_changed = config.default_payout_method.is_some()
            && config.default_payout_method != partner.default_payout_method;

        self.ledger
            .update_partner_payout_config(
                &partner.id,
                payouts_enabled_at,
                config.default_payout_method.as_deref(),
                config.payout_method_fingerprint.as_deref(),
            )
            .await?;

        if method_changed {
            // Only on an actual change, never on redelivery of the same
            // state, so the partner is notified once per change.
            self.notifier.payout_method_updated(&partner).await;

            if let Some(fingerprint) = config.payout_method_fingerprint.as_deref() {
                let flagged = self
                    .ledger
                    .screen_duplicate_payout_method(&partner.id, fingerprint)
                    .await?;
                if flagged {
                    tracing::warn!(
                        partner_id = %partner.id,
                        "payout method fingerprint shared with another partner, flagged for review"
                    );
                }
            }
        }

        tracing::info!(
            recipient_id,
            partner_id = %partner.id,
            payouts_enabled = config.payouts_enabled,
            method_changed,
            "synced partner payout configuration from recipient"
        );
        Ok(format!(
            "Synced payout configuration for partner {}.",
            partner.id
        ))
    }

    async fn recipient_closed(&self, recipient_id: &str) -> Result<String> {
        let Some(partner) = self.ledger.partner_by_recipient(recipient_id).await? else {
            tracing::info!(recipient_id, "recipient closure for unknown partner, ignoring");
            return Ok(format!("No partner linked to recipient {recipient_id}."));
        };

        // Closure revokes eligibility; method details stay for audit.
        self.ledger
            .update_partner_payout_config(
                &partner.id,
                None,
                partner.default_payout_method.as_deref(),
                partner.payout_method_fingerprint.as_deref(),
            )
            .await?;

        tracing::info!(
            recipient_id,
            partner_id = %partner.id,
            "disabled payouts for partner after recipient closure"
        );
        Ok(format!("Disabled payouts for partner {}.", partner.id))
    }
}

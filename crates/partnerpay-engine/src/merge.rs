//! Partner account merge transfer.
//!
//! Moves every financial and relational record from a duplicate partner
//! identity (the source) onto the canonical one (the target), then cleans
//! up what remains of the source. Record reassignment is transactional per
//! program; cleanup and search-index refreshes are best-effort and never
//! fail an otherwise successful merge.

use std::collections::HashSet;
use std::sync::Arc;

use serde::Serialize;

use partnerpay_core::{FraudGroupKind, PartnerId, ProgramId, UserId};
use partnerpay_store::{Ledger, StoreError};

use crate::error::Result;
use crate::hooks::LinkIndex;

/// Outcome of a merge request.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome", content = "detail")]
pub enum MergeOutcome {
    /// Records were transferred; details in the report.
    Merged(MergeReport),
    /// One of the accounts does not exist. The message names which; the
    /// request itself was well-formed, so this is not an error.
    NotFound(String),
}

/// What a completed merge moved.
#[derive(Debug, Default, Serialize)]
pub struct MergeReport {
    /// Source (absorbed) partner.
    pub source_partner_id: Option<PartnerId>,
    /// Target (canonical) partner.
    pub target_partner_id: Option<PartnerId>,
    /// Enrollments moved to the target.
    pub enrollments_moved: u64,
    /// Programs whose records were transferred.
    pub programs_transferred: u64,
    /// Links reassigned.
    pub links_moved: u64,
    /// Commission ledger entries reassigned.
    pub commissions_moved: u64,
    /// Payouts reassigned.
    pub payouts_moved: u64,
    /// Ancillary records reassigned.
    pub records_moved: u64,
    /// Bounty submissions reassigned.
    pub bounties_moved: u64,
    /// Bounty submissions left behind because the target already submitted
    /// for the same bounty.
    pub bounty_conflicts: u64,
    /// Bounty submissions whose reassignment failed outright; the error is
    /// logged and the submission stays on the source.
    pub bounty_failures: u64,
    /// Target's recomputed commission total after the transfer.
    pub target_total_commissions: i64,
    /// Duplicate-payout-method flags resolved because the merged account
    /// made the fingerprint unique again.
    pub fraud_flags_resolved: u64,
}

/// Transfers partner records between identities during an account merge.
#[derive(Clone)]
pub struct PartnerMerger {
    ledger: Arc<dyn Ledger>,
    links: Arc<dyn LinkIndex>,
}

impl PartnerMerger {
    /// Create a merger over the given ledger and link index.
    pub fn new(ledger: Arc<dyn Ledger>, links: Arc<dyn LinkIndex>) -> Self {
        Self { ledger, links }
    }

    /// Merge the partner account at `source_email` into the one at
    /// `target_email`.
    ///
    /// Missing accounts yield [`MergeOutcome::NotFound`] rather than an
    /// error: merge requests race against self-service account deletion and
    /// a vanished side means there is nothing left to move.
    ///
    /// # Errors
    ///
    /// Store failures during per-program record transfer propagate; the
    /// transaction that failed rolls back while earlier programs stay
    /// transferred, and re-running the merge moves only what remains.
    /// Bounty reassignment settles every submission and reports failures in
    /// the outcome instead of propagating them.
    pub async fn merge_partner_accounts(
        &self,
        initiator: &UserId,
        source_email: &str,
        target_email: &str,
    ) -> Result<MergeOutcome> {
        let Some(source) = self.ledger.partner_by_email(source_email).await? else {
            tracing::info!(%initiator, source_email, "merge source partner not found");
            return Ok(MergeOutcome::NotFound(format!(
                "No partner account found for {source_email}."
            )));
        };
        let Some(target) = self.ledger.partner_by_email(target_email).await? else {
            tracing::info!(%initiator, target_email, "merge target partner not found");
            return Ok(MergeOutcome::NotFound(format!(
                "No partner account found for {target_email}."
            )));
        };

        tracing::info!(
            %initiator,
            source_partner_id = %source.id,
            target_partner_id = %target.id,
            "starting partner account merge"
        );

        let mut report = MergeReport {
            source_partner_id: Some(source.id),
            target_partner_id: Some(target.id),
            ..MergeReport::default()
        };

        // Enrollments the target does not already hold move over; a source
        // enrollment in a program the target is already enrolled in stays
        // behind, since at most one enrollment may exist per pair.
        let source_enrollments = self.ledger.enrollments_for_partner(&source.id).await?;
        let target_programs: HashSet<ProgramId> = self
            .ledger
            .enrollments_for_partner(&target.id)
            .await?
            .iter()
            .map(|e| e.program_id)
            .collect();

        let movable: Vec<_> = source_enrollments
            .iter()
            .filter(|e| !target_programs.contains(&e.program_id))
            .map(|e| e.id)
            .collect();
        report.enrollments_moved = self
            .ledger
            .reassign_enrollments(&movable, &target.id)
            .await?;

        // Records move for every program the source touched, including
        // programs where the enrollment itself stayed behind.
        let programs: Vec<ProgramId> = {
            let mut seen = HashSet::new();
            source_enrollments
                .iter()
                .map(|e| e.program_id)
                .filter(|p| seen.insert(*p))
                .collect()
        };

        for program_id in &programs {
            let mut tx = self.ledger.begin().await?;
            report.links_moved += tx.reassign_links(program_id, &source.id, &target.id).await?;
            report.commissions_moved += tx
                .reassign_commissions(program_id, &source.id, &target.id)
                .await?;
            report.payouts_moved += tx
                .reassign_payouts(program_id, &source.id, &target.id)
                .await?;
            report.records_moved += tx
                .reassign_partner_records(program_id, &source.id, &target.id)
                .await?;
            tx.commit().await?;
            report.programs_transferred += 1;

            let (links, program_id) = (Arc::clone(&self.links), *program_id);
            let target_id = target.id;
            tokio::spawn(async move {
                links.refresh_links(&program_id, &target_id).await;
                links.invalidate_cache(&program_id).await;
            });
        }

        // Bounty submissions carry a per-(partner, bounty) uniqueness
        // constraint, so they move one at a time. Every submission is
        // attempted: a conflict with the target's own submission leaves the
        // source's behind, and any other failure is logged and tallied
        // without aborting the remaining moves.
        for submission in self.ledger.bounty_submissions_for_partner(&source.id).await? {
            match self
                .ledger
                .reassign_bounty_submission(&submission.id, &target.id)
                .await
            {
                Ok(()) => report.bounties_moved += 1,
                Err(StoreError::Conflict(_)) => {
                    tracing::info!(
                        submission_id = %submission.id,
                        bounty_id = %submission.bounty_id,
                        "target already submitted for bounty, leaving source submission"
                    );
                    report.bounty_conflicts += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        submission_id = %submission.id,
                        bounty_id = %submission.bounty_id,
                        error = %e,
                        "failed to reassign bounty submission, continuing"
                    );
                    report.bounty_failures += 1;
                }
            }
        }

        report.target_total_commissions =
            self.ledger.recompute_partner_totals(&target.id).await?;

        // Cleanup is best-effort: the records have already moved and a
        // stranded source row is harmless, so failures are logged only.
        if let Some(user_id) = source.user_id {
            match self.ledger.user_workspace_count(&user_id).await {
                Ok(0) => {
                    if let Err(e) = self.ledger.delete_user(&user_id).await {
                        tracing::warn!(%user_id, error = %e, "failed to delete orphaned source user");
                    }
                }
                Ok(n) => {
                    tracing::info!(%user_id, workspaces = n, "source user keeps other workspaces, not deleted");
                }
                Err(e) => {
                    tracing::warn!(%user_id, error = %e, "failed to check source user workspaces");
                }
            }
        }
        if let Err(e) = self.ledger.delete_partner(&source.id).await {
            tracing::warn!(source_partner_id = %source.id, error = %e, "failed to delete source partner");
        }

        // With the duplicate account gone, a previously shared payout
        // method fingerprint may be unique again.
        if let Some(fingerprint) = target.payout_method_fingerprint.as_deref() {
            let others = self
                .ledger
                .partners_sharing_fingerprint(fingerprint, &target.id)
                .await?;
            if others == 0 {
                report.fraud_flags_resolved = self
                    .ledger
                    .resolve_fraud_groups(
                        &target.id,
                        FraudGroupKind::DuplicatePayoutMethod,
                        "duplicate partner accounts merged",
                    )
                    .await?;
            }
        }

        tracing::info!(
            %initiator,
            source_partner_id = %source.id,
            target_partner_id = %target.id,
            programs = report.programs_transferred,
            commissions = report.commissions_moved,
            payouts = report.payouts_moved,
            "partner account merge complete"
        );

        Ok(MergeOutcome::Merged(report))
    }
}

//! Batch scheduling of payout aggregation.
//!
//! Discovers every `(program, partner)` pair with outstanding pending
//! commissions and aggregates each in turn. Work is paged with an explicit
//! cursor so a sweep can be split across repeated short-lived invocations:
//! the caller re-enqueues itself with `next_cursor` until a page comes back
//! partial.

use serde::Serialize;

use partnerpay_core::{Pair, PairCursor};
use partnerpay_store::Ledger;

use crate::aggregator::{create_or_update_payout, PayoutRollup};
use crate::error::Result;

/// Maximum distinct pairs processed per invocation.
///
/// Bounds invocation duration under a platform execution timeout; the
/// continuation cursor trades total-sweep latency for per-invocation
/// boundedness.
pub const PAGE_SIZE: usize = 100;

/// Result of one scheduler invocation.
#[derive(Debug, Serialize)]
pub struct SweepSummary {
    /// Every pair attempted in this page, in sweep order.
    pub attempted: Vec<PairOutcome>,
    /// Continuation cursor when a full page was returned and more work may
    /// remain.
    pub next_cursor: Option<PairCursor>,
}

impl SweepSummary {
    /// Number of pairs whose aggregation produced or extended a payout.
    #[must_use]
    pub fn rolled_up(&self) -> usize {
        self.attempted
            .iter()
            .filter(|o| matches!(o.result, PairResult::Rolled(_)))
            .count()
    }

    /// Number of pairs whose aggregation failed.
    #[must_use]
    pub fn failed(&self) -> usize {
        self.attempted
            .iter()
            .filter(|o| matches!(o.result, PairResult::Failed(_)))
            .count()
    }
}

/// Outcome of one pair within a sweep page.
#[derive(Debug, Serialize)]
pub struct PairOutcome {
    /// The pair that was attempted.
    pub pair: Pair,
    /// What happened.
    pub result: PairResult,
}

/// Per-pair aggregation result.
#[derive(Debug, Serialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "detail")]
pub enum PairResult {
    /// Commissions were rolled into a payout.
    Rolled(PayoutRollup),
    /// Nothing eligible remained by the time the pair was aggregated.
    Skipped,
    /// Aggregation failed; the error was logged and the sweep continued.
    Failed(String),
}

/// Process one page of pairs with outstanding pending commissions.
///
/// Pairs are visited in strict ascending lexicographic
/// `(program_id, partner_id)` order, strictly after `cursor` when given. A
/// failure on one pair is caught and logged; subsequent pairs in the page
/// are still attempted. The cursor advances past attempted pairs whether or
/// not they succeeded — failed pairs are retried by the next cursor-less
/// sweep, and the warning log is the operational alerting hook.
///
/// # Errors
///
/// Only pair discovery itself can fail; per-pair aggregation errors are
/// captured in the summary.
pub async fn process_pending_commissions(
    ledger: &dyn Ledger,
    cursor: Option<PairCursor>,
) -> Result<SweepSummary> {
    let pairs = ledger.pending_pairs(cursor.as_ref(), PAGE_SIZE).await?;

    if pairs.is_empty() {
        tracing::info!(cursor = ?cursor, "no pairs with pending commissions, sweep complete");
        return Ok(SweepSummary {
            attempted: Vec::new(),
            next_cursor: None,
        });
    }

    let mut attempted = Vec::with_capacity(pairs.len());
    for pair in &pairs {
        let result =
            match create_or_update_payout(ledger, &pair.program_id, &pair.partner_id).await {
                Ok(Some(rollup)) => PairResult::Rolled(rollup),
                Ok(None) => PairResult::Skipped,
                Err(e) => {
                    tracing::warn!(
                        program_id = %pair.program_id,
                        partner_id = %pair.partner_id,
                        error = %e,
                        "payout aggregation failed for pair, continuing sweep"
                    );
                    PairResult::Failed(e.to_string())
                }
            };
        attempted.push(PairOutcome { pair: *pair, result });
    }

    // A full page means more work may remain; hand back a continuation
    // cursor built from the last attempted pair.
    let next_cursor = (pairs.len() == PAGE_SIZE)
        .then(|| pairs.last().copied().map(PairCursor::from))
        .flatten();

    tracing::info!(
        pairs = attempted.len(),
        failed = attempted
            .iter()
            .filter(|o| matches!(o.result, PairResult::Failed(_)))
            .count(),
        has_next = next_cursor.is_some(),
        "sweep page processed"
    );

    Ok(SweepSummary {
        attempted,
        next_cursor,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use partnerpay_core::{Commission, CommissionType, PartnerId, ProgramId};
    use partnerpay_store::{Ledger, LedgerTx, MemoryLedger, StoreError};

    async fn seed_pair(ledger: &MemoryLedger, program: ProgramId, partner: PartnerId, amount: i64) {
        ledger
            .insert_commission(&Commission::new(
                program,
                partner,
                CommissionType::Sale,
                1,
                amount,
            ))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn empty_ledger_ends_sweep_cleanly() {
        let ledger = MemoryLedger::new();
        let summary = process_pending_commissions(&ledger, None).await.unwrap();
        assert!(summary.attempted.is_empty());
        assert!(summary.next_cursor.is_none());
    }

    #[tokio::test]
    async fn processes_all_pairs_in_order() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let mut partners: Vec<PartnerId> = (0..5).map(|_| PartnerId::generate()).collect();
        partners.sort();

        for p in &partners {
            seed_pair(&ledger, program, *p, 100).await;
        }

        let summary = process_pending_commissions(&ledger, None).await.unwrap();
        assert_eq!(summary.attempted.len(), 5);
        assert_eq!(summary.rolled_up(), 5);
        assert!(summary.next_cursor.is_none());

        let visited: Vec<PartnerId> = summary.attempted.iter().map(|o| o.pair.partner_id).collect();
        assert_eq!(visited, partners);
    }

    #[tokio::test]
    async fn full_page_yields_cursor_and_next_page_is_strictly_after() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let mut partners: Vec<PartnerId> = (0..PAGE_SIZE + 3).map(|_| PartnerId::generate()).collect();
        partners.sort();

        for p in &partners {
            seed_pair(&ledger, program, *p, 50).await;
        }

        let first = process_pending_commissions(&ledger, None).await.unwrap();
        assert_eq!(first.attempted.len(), PAGE_SIZE);
        let cursor = first.next_cursor.expect("full page must yield a cursor");
        assert_eq!(cursor.partner_id, partners[PAGE_SIZE - 1]);

        let second = process_pending_commissions(&ledger, Some(cursor)).await.unwrap();
        assert_eq!(second.attempted.len(), 3);
        assert!(second.next_cursor.is_none());
        for outcome in &second.attempted {
            assert!(cursor.precedes(&outcome.pair));
        }
    }

    /// Ledger wrapper that fails transactions opened while a poisoned pair
    /// has unclaimed commissions, exercising partial-failure isolation.
    struct FaultyLedger {
        inner: MemoryLedger,
        poison: Pair,
    }

    #[async_trait]
    impl Ledger for FaultyLedger {
        async fn begin(&self) -> partnerpay_store::Result<Box<dyn LedgerTx>> {
            let tx = self.inner.begin().await?;
            Ok(Box::new(FaultyTx {
                inner: tx,
                poison: self.poison,
            }))
        }

        async fn pending_pairs(
            &self,
            cursor: Option<&PairCursor>,
            limit: usize,
        ) -> partnerpay_store::Result<Vec<Pair>> {
            self.inner.pending_pairs(cursor, limit).await
        }

        async fn complete_payouts(
            &self,
            external_payout_id: &str,
            trace_id: Option<&str>,
            paid_at: chrono::DateTime<chrono::Utc>,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::PayoutId>> {
            self.inner
                .complete_payouts(external_payout_id, trace_id, paid_at)
                .await
        }

        async fn fail_payouts(
            &self,
            external_payout_id: &str,
            reason: Option<partnerpay_core::PayoutFailureReason>,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::PayoutId>> {
            self.inner.fail_payouts(external_payout_id, reason).await
        }

        async fn set_payout_submitted(
            &self,
            id: &partnerpay_core::PayoutId,
            external_payout_id: &str,
            status: partnerpay_core::PayoutStatus,
        ) -> partnerpay_store::Result<()> {
            self.inner
                .set_payout_submitted(id, external_payout_id, status)
                .await
        }

        async fn get_payout(
            &self,
            id: &partnerpay_core::PayoutId,
        ) -> partnerpay_store::Result<Option<partnerpay_core::Payout>> {
            self.inner.get_payout(id).await
        }

        async fn payouts_for_pair(
            &self,
            program_id: &ProgramId,
            partner_id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::Payout>> {
            self.inner.payouts_for_pair(program_id, partner_id).await
        }

        async fn insert_commission(
            &self,
            commission: &Commission,
        ) -> partnerpay_store::Result<()> {
            self.inner.insert_commission(commission).await
        }

        async fn get_commission(
            &self,
            id: &partnerpay_core::CommissionId,
        ) -> partnerpay_store::Result<Option<Commission>> {
            self.inner.get_commission(id).await
        }

        async fn commissions_for_pair(
            &self,
            program_id: &ProgramId,
            partner_id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<Commission>> {
            self.inner.commissions_for_pair(program_id, partner_id).await
        }

        async fn put_partner(
            &self,
            partner: &partnerpay_core::Partner,
        ) -> partnerpay_store::Result<()> {
            self.inner.put_partner(partner).await
        }

        async fn get_partner(
            &self,
            id: &PartnerId,
        ) -> partnerpay_store::Result<Option<partnerpay_core::Partner>> {
            self.inner.get_partner(id).await
        }

        async fn partner_by_email(
            &self,
            email: &str,
        ) -> partnerpay_store::Result<Option<partnerpay_core::Partner>> {
            self.inner.partner_by_email(email).await
        }

        async fn partner_by_recipient(
            &self,
            recipient_id: &str,
        ) -> partnerpay_store::Result<Option<partnerpay_core::Partner>> {
            self.inner.partner_by_recipient(recipient_id).await
        }

        async fn update_partner_payout_config(
            &self,
            id: &PartnerId,
            payouts_enabled_at: Option<chrono::DateTime<chrono::Utc>>,
            default_payout_method: Option<&str>,
            payout_method_fingerprint: Option<&str>,
        ) -> partnerpay_store::Result<()> {
            self.inner
                .update_partner_payout_config(
                    id,
                    payouts_enabled_at,
                    default_payout_method,
                    payout_method_fingerprint,
                )
                .await
        }

        async fn partners_sharing_fingerprint(
            &self,
            fingerprint: &str,
            excluding: &PartnerId,
        ) -> partnerpay_store::Result<u64> {
            self.inner
                .partners_sharing_fingerprint(fingerprint, excluding)
                .await
        }

        async fn recompute_partner_totals(
            &self,
            id: &PartnerId,
        ) -> partnerpay_store::Result<i64> {
            self.inner.recompute_partner_totals(id).await
        }

        async fn delete_partner(&self, id: &PartnerId) -> partnerpay_store::Result<()> {
            self.inner.delete_partner(id).await
        }

        async fn put_program(
            &self,
            program: &partnerpay_core::Program,
        ) -> partnerpay_store::Result<()> {
            self.inner.put_program(program).await
        }

        async fn put_enrollment(
            &self,
            enrollment: &partnerpay_core::ProgramEnrollment,
        ) -> partnerpay_store::Result<()> {
            self.inner.put_enrollment(enrollment).await
        }

        async fn enrollments_for_partner(
            &self,
            id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::ProgramEnrollment>> {
            self.inner.enrollments_for_partner(id).await
        }

        async fn reassign_enrollments(
            &self,
            ids: &[partnerpay_core::EnrollmentId],
            target: &PartnerId,
        ) -> partnerpay_store::Result<u64> {
            self.inner.reassign_enrollments(ids, target).await
        }

        async fn insert_link(&self, link: &partnerpay_core::Link) -> partnerpay_store::Result<()> {
            self.inner.insert_link(link).await
        }

        async fn links_for_partner(
            &self,
            program_id: &ProgramId,
            partner_id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::Link>> {
            self.inner.links_for_partner(program_id, partner_id).await
        }

        async fn insert_bounty_submission(
            &self,
            submission: &partnerpay_core::BountySubmission,
        ) -> partnerpay_store::Result<()> {
            self.inner.insert_bounty_submission(submission).await
        }

        async fn bounty_submissions_for_partner(
            &self,
            id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::BountySubmission>> {
            self.inner.bounty_submissions_for_partner(id).await
        }

        async fn reassign_bounty_submission(
            &self,
            id: &partnerpay_core::SubmissionId,
            target: &PartnerId,
        ) -> partnerpay_store::Result<()> {
            self.inner.reassign_bounty_submission(id, target).await
        }

        async fn insert_partner_record(
            &self,
            record: &partnerpay_core::PartnerRecord,
        ) -> partnerpay_store::Result<()> {
            self.inner.insert_partner_record(record).await
        }

        async fn partner_records(
            &self,
            program_id: &ProgramId,
            partner_id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::PartnerRecord>> {
            self.inner.partner_records(program_id, partner_id).await
        }

        async fn put_user(
            &self,
            id: &partnerpay_core::UserId,
            workspace_count: u32,
        ) -> partnerpay_store::Result<()> {
            self.inner.put_user(id, workspace_count).await
        }

        async fn user_workspace_count(
            &self,
            id: &partnerpay_core::UserId,
        ) -> partnerpay_store::Result<u32> {
            self.inner.user_workspace_count(id).await
        }

        async fn delete_user(&self, id: &partnerpay_core::UserId) -> partnerpay_store::Result<()> {
            self.inner.delete_user(id).await
        }

        async fn resolve_fraud_groups(
            &self,
            partner_id: &PartnerId,
            kind: partnerpay_core::FraudGroupKind,
            reason: &str,
        ) -> partnerpay_store::Result<u64> {
            self.inner.resolve_fraud_groups(partner_id, kind, reason).await
        }

        async fn screen_duplicate_payout_method(
            &self,
            partner_id: &PartnerId,
            fingerprint: &str,
        ) -> partnerpay_store::Result<bool> {
            self.inner
                .screen_duplicate_payout_method(partner_id, fingerprint)
                .await
        }

        async fn pending_fraud_groups(
            &self,
            partner_id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<partnerpay_core::FraudGroup>> {
            self.inner.pending_fraud_groups(partner_id).await
        }
    }

    struct FaultyTx {
        inner: Box<dyn LedgerTx>,
        poison: Pair,
    }

    #[async_trait]
    impl LedgerTx for FaultyTx {
        async fn pending_commissions(
            &mut self,
            program_id: &ProgramId,
            partner_id: &PartnerId,
        ) -> partnerpay_store::Result<Vec<Commission>> {
            if self.poison == Pair::new(*program_id, *partner_id) {
                return Err(StoreError::Database("injected failure".into()));
            }
            self.inner.pending_commissions(program_id, partner_id).await
        }

        async fn pending_payout(
            &mut self,
            program_id: &ProgramId,
            partner_id: &PartnerId,
        ) -> partnerpay_store::Result<Option<partnerpay_core::Payout>> {
            self.inner.pending_payout(program_id, partner_id).await
        }

        async fn insert_payout(
            &mut self,
            payout: &partnerpay_core::Payout,
        ) -> partnerpay_store::Result<()> {
            self.inner.insert_payout(payout).await
        }

        async fn merge_into_payout(
            &mut self,
            id: &partnerpay_core::PayoutId,
            amount_delta: i64,
            quantity_delta: i64,
            period_end: chrono::DateTime<chrono::Utc>,
        ) -> partnerpay_store::Result<()> {
            self.inner
                .merge_into_payout(id, amount_delta, quantity_delta, period_end)
                .await
        }

        async fn mark_commissions_processed(
            &mut self,
            ids: &[partnerpay_core::CommissionId],
            payout_id: &partnerpay_core::PayoutId,
        ) -> partnerpay_store::Result<u64> {
            self.inner.mark_commissions_processed(ids, payout_id).await
        }

        async fn reassign_links(
            &mut self,
            program_id: &ProgramId,
            source: &PartnerId,
            target: &PartnerId,
        ) -> partnerpay_store::Result<u64> {
            self.inner.reassign_links(program_id, source, target).await
        }

        async fn reassign_commissions(
            &mut self,
            program_id: &ProgramId,
            source: &PartnerId,
            target: &PartnerId,
        ) -> partnerpay_store::Result<u64> {
            self.inner
                .reassign_commissions(program_id, source, target)
                .await
        }

        async fn reassign_payouts(
            &mut self,
            program_id: &ProgramId,
            source: &PartnerId,
            target: &PartnerId,
        ) -> partnerpay_store::Result<u64> {
            self.inner.reassign_payouts(program_id, source, target).await
        }

        async fn reassign_partner_records(
            &mut self,
            program_id: &ProgramId,
            source: &PartnerId,
            target: &PartnerId,
        ) -> partnerpay_store::Result<u64> {
            self.inner
                .reassign_partner_records(program_id, source, target)
                .await
        }

        async fn commit(self: Box<Self>) -> partnerpay_store::Result<()> {
            self.inner.commit().await
        }
    }

    #[tokio::test]
    async fn one_failing_pair_does_not_block_the_page() {
        let inner = MemoryLedger::new();
        let program = ProgramId::generate();
        let mut partners: Vec<PartnerId> = (0..5).map(|_| PartnerId::generate()).collect();
        partners.sort();

        for p in &partners {
            seed_pair(&inner, program, *p, 100).await;
        }

        let ledger = FaultyLedger {
            inner: inner.clone(),
            poison: Pair::new(program, partners[2]),
        };

        let summary = process_pending_commissions(&ledger, None).await.unwrap();
        assert_eq!(summary.attempted.len(), 5);
        assert_eq!(summary.rolled_up(), 4);
        assert_eq!(summary.failed(), 1);
        assert!(matches!(
            summary.attempted[2].result,
            PairResult::Failed(_)
        ));

        // The failed pair's commissions are untouched and remain
        // discoverable by the next sweep.
        let leftover = inner.pending_pairs(None, 100).await.unwrap();
        assert_eq!(leftover, vec![Pair::new(program, partners[2])]);
    }
}

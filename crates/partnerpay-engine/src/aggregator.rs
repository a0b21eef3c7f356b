//! Payout aggregation.
//!
//! Rolls a pair's pending commissions into a payout inside a single ledger
//! transaction. Safe to invoke concurrently for different pairs and safe to
//! retry for the same pair: a successful run claims the commissions, so a
//! re-run finds nothing pending and no-ops.

use serde::Serialize;

use partnerpay_core::{period_end_exclusive, PartnerId, Payout, PayoutId, ProgramId};
use partnerpay_store::Ledger;

use crate::error::Result;

/// Summary of one aggregation pass over a pair.
#[derive(Debug, Clone, Serialize)]
pub struct PayoutRollup {
    /// The payout the commissions were rolled into.
    pub payout_id: PayoutId,
    /// Amount added in this pass (minor units).
    pub amount: i64,
    /// Quantity added in this pass.
    pub quantity: i64,
    /// Number of commission records claimed.
    pub commissions: u64,
    /// Whether a new payout was created (false means merged into an
    /// existing pending payout).
    pub created: bool,
}

/// Aggregate a pair's pending commissions into its payout.
///
/// Runs inside one ledger transaction. Returns `Ok(None)` when there is
/// nothing to do: no pending commissions, or their amounts sum to zero
/// (zero-value payouts are never created).
///
/// # Errors
///
/// Any store failure aborts the transaction with zero visible side effects;
/// the error is retryable.
pub async fn create_or_update_payout(
    ledger: &dyn Ledger,
    program_id: &ProgramId,
    partner_id: &PartnerId,
) -> Result<Option<PayoutRollup>> {
    let mut tx = ledger.begin().await?;

    let commissions = tx.pending_commissions(program_id, partner_id).await?;
    let Some(latest) = commissions.last() else {
        tracing::info!(%program_id, %partner_id, "no pending commissions for pair");
        return Ok(None);
    };

    // Commissions arrive ordered by created_at ascending.
    let period_start = commissions[0].created_at;
    let period_end = period_end_exclusive(latest.created_at);

    let total_amount: i64 = commissions.iter().map(|c| c.amount).sum();
    let total_quantity: i64 = commissions.iter().map(|c| c.quantity).sum();

    if total_amount == 0 {
        tracing::info!(%program_id, %partner_id, "pending commissions sum to zero, skipping payout");
        return Ok(None);
    }

    let (payout_id, created) = match tx.pending_payout(program_id, partner_id).await? {
        Some(existing) => {
            // Period end only ever moves forward.
            let extended_end = existing.period_end.max(period_end);
            tx.merge_into_payout(&existing.id, total_amount, total_quantity, extended_end)
                .await?;
            (existing.id, false)
        }
        None => {
            let payout = Payout::new(
                *program_id,
                *partner_id,
                period_start,
                period_end,
                total_amount,
                total_quantity,
            );
            tx.insert_payout(&payout).await?;
            (payout.id, true)
        }
    };

    let ids: Vec<_> = commissions.iter().map(|c| c.id).collect();
    let claimed = tx.mark_commissions_processed(&ids, &payout_id).await?;

    tx.commit().await?;

    tracing::info!(
        %program_id,
        %partner_id,
        %payout_id,
        amount = total_amount,
        quantity = total_quantity,
        commissions = claimed,
        created,
        "aggregated pending commissions into payout"
    );

    Ok(Some(PayoutRollup {
        payout_id,
        amount: total_amount,
        quantity: total_quantity,
        commissions: claimed,
        created,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use partnerpay_core::{Commission, CommissionStatus, CommissionType, PayoutStatus};
    use partnerpay_store::MemoryLedger;

    fn commission_at(
        program: ProgramId,
        partner: PartnerId,
        amount: i64,
        y: i32,
        m: u32,
        d: u32,
    ) -> Commission {
        let mut c = Commission::new(program, partner, CommissionType::Sale, 1, amount);
        c.created_at = Utc.with_ymd_and_hms(y, m, d, 12, 0, 0).unwrap();
        c
    }

    async fn seed(ledger: &MemoryLedger, commissions: &[Commission]) {
        for c in commissions {
            ledger.insert_commission(c).await.unwrap();
        }
    }

    #[tokio::test]
    async fn aggregates_all_pending_commissions() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let partner = PartnerId::generate();

        let rows = [
            commission_at(program, partner, 1000, 2024, 3, 5),
            commission_at(program, partner, 2500, 2024, 3, 28),
        ];
        seed(&ledger, &rows).await;

        let rollup = create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap()
            .unwrap();

        assert!(rollup.created);
        assert_eq!(rollup.amount, 3500);
        assert_eq!(rollup.quantity, 2);
        assert_eq!(rollup.commissions, 2);

        let payout = ledger.get_payout(&rollup.payout_id).await.unwrap().unwrap();
        assert_eq!(payout.amount, 3500);
        assert_eq!(payout.quantity, 2);
        assert_eq!(payout.status, PayoutStatus::Pending);
        assert_eq!(
            payout.period_start,
            Utc.with_ymd_and_hms(2024, 3, 5, 12, 0, 0).unwrap()
        );
        assert_eq!(
            payout.period_end,
            Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap()
        );

        for row in &rows {
            let stored = ledger.get_commission(&row.id).await.unwrap().unwrap();
            assert_eq!(stored.status, CommissionStatus::Processed);
            assert_eq!(stored.payout_id, Some(rollup.payout_id));
        }
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let partner = PartnerId::generate();
        seed(&ledger, &[commission_at(program, partner, 500, 2024, 6, 2)]).await;

        let first = create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap()
            .unwrap();
        let second = create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap();
        assert!(second.is_none());

        let payouts = ledger.payouts_for_pair(&program, &partner).await.unwrap();
        assert_eq!(payouts.len(), 1);
        assert_eq!(payouts[0].amount, first.amount);
    }

    #[tokio::test]
    async fn zero_amount_pair_creates_no_payout() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let partner = PartnerId::generate();
        seed(
            &ledger,
            &[
                commission_at(program, partner, 100, 2024, 6, 2),
                commission_at(program, partner, -100, 2024, 6, 3),
            ],
        )
        .await;

        let rollup = create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap();
        assert!(rollup.is_none());

        assert!(ledger
            .payouts_for_pair(&program, &partner)
            .await
            .unwrap()
            .is_empty());
        // Records stay pending and unclaimed.
        for c in ledger.commissions_for_pair(&program, &partner).await.unwrap() {
            assert_eq!(c.status, CommissionStatus::Pending);
            assert!(c.payout_id.is_none());
        }
    }

    #[tokio::test]
    async fn merge_extends_period_and_adds_totals() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let partner = PartnerId::generate();

        seed(&ledger, &[commission_at(program, partner, 1000, 2024, 3, 10)]).await;
        let first = create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap()
            .unwrap();

        seed(&ledger, &[commission_at(program, partner, 400, 2024, 4, 15)]).await;
        let second = create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap()
            .unwrap();

        assert!(!second.created);
        assert_eq!(second.payout_id, first.payout_id);

        let payout = ledger.get_payout(&first.payout_id).await.unwrap().unwrap();
        // Incremented, not recomputed from scratch.
        assert_eq!(payout.amount, 1400);
        assert_eq!(payout.quantity, 2);
        assert_eq!(
            payout.period_end,
            Utc.with_ymd_and_hms(2024, 5, 1, 0, 0, 0).unwrap()
        );
        // Period start keeps the original earliest record.
        assert_eq!(
            payout.period_start,
            Utc.with_ymd_and_hms(2024, 3, 10, 12, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn merge_never_shrinks_period_end() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let partner = PartnerId::generate();

        seed(&ledger, &[commission_at(program, partner, 1000, 2024, 5, 20)]).await;
        let first = create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap()
            .unwrap();

        // A late-arriving record dated before the existing period.
        seed(&ledger, &[commission_at(program, partner, 300, 2024, 4, 2)]).await;
        create_or_update_payout(&ledger, &program, &partner)
            .await
            .unwrap()
            .unwrap();

        let payout = ledger.get_payout(&first.payout_id).await.unwrap().unwrap();
        assert_eq!(
            payout.period_end,
            Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap()
        );
    }

    #[tokio::test]
    async fn pairs_do_not_interfere() {
        let ledger = MemoryLedger::new();
        let program = ProgramId::generate();
        let a = PartnerId::generate();
        let b = PartnerId::generate();

        seed(
            &ledger,
            &[
                commission_at(program, a, 700, 2024, 2, 1),
                commission_at(program, b, 900, 2024, 2, 1),
            ],
        )
        .await;

        let rollup_a = create_or_update_payout(&ledger, &program, &a)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(rollup_a.amount, 700);

        // Partner b's commission is untouched.
        let pending_b = ledger.commissions_for_pair(&program, &b).await.unwrap();
        assert_eq!(pending_b[0].status, CommissionStatus::Pending);
    }
}

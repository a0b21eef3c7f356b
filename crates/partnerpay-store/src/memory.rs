//! In-memory ledger implementation.
//!
//! Backed by a single `tokio::sync::Mutex` over the whole state. A
//! transaction takes the lock for its entire lifetime and mutates a working
//! copy, so open transactions serialize and a dropped transaction discards
//! its changes. That gives the claim-exactly-once isolation the aggregator
//! relies on without any further coordination.
//!
//! Used by tests and development mode; production uses [`crate::PgLedger`].

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, OwnedMutexGuard};

use partnerpay_core::{
    BountySubmission, Commission, CommissionId, CommissionStatus, EnrollmentId, FraudGroup,
    FraudGroupKind, FraudGroupStatus, Link, LinkId, Pair, PairCursor, Partner, PartnerId,
    PartnerRecord, Payout, PayoutFailureReason, PayoutId, PayoutStatus, Program,
    ProgramEnrollment, ProgramId, SubmissionId, UserId, DEFAULT_PAYOUT_DESCRIPTION,
};

use crate::error::{Result, StoreError};
use crate::{Ledger, LedgerTx};

/// In-memory ledger for tests and development.
#[derive(Clone, Default)]
pub struct MemoryLedger {
    state: Arc<Mutex<MemState>>,
}

#[derive(Clone, Default)]
struct MemState {
    programs: HashMap<ProgramId, Program>,
    partners: HashMap<PartnerId, Partner>,
    enrollments: HashMap<EnrollmentId, ProgramEnrollment>,
    commissions: BTreeMap<CommissionId, Commission>,
    payouts: BTreeMap<PayoutId, Payout>,
    links: HashMap<LinkId, Link>,
    submissions: HashMap<SubmissionId, BountySubmission>,
    records: Vec<PartnerRecord>,
    users: HashMap<UserId, u32>,
    fraud_groups: Vec<FraudGroup>,
}

impl MemoryLedger {
    /// Create an empty in-memory ledger.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

// Query helpers shared by the ledger handle and open transactions.

fn pending_commissions_in(
    state: &MemState,
    program_id: &ProgramId,
    partner_id: &PartnerId,
) -> Vec<Commission> {
    let mut rows: Vec<Commission> = state
        .commissions
        .values()
        .filter(|c| {
            c.program_id == *program_id && c.partner_id == *partner_id && c.is_payable()
        })
        .cloned()
        .collect();
    rows.sort_by_key(|c| c.created_at);
    rows
}

fn pending_payout_in(
    state: &MemState,
    program_id: &ProgramId,
    partner_id: &PartnerId,
) -> Option<Payout> {
    state
        .payouts
        .values()
        .find(|p| {
            p.program_id == *program_id
                && p.partner_id == *partner_id
                && p.status == PayoutStatus::Pending
        })
        .cloned()
}

fn reassign_commissions_in(
    state: &mut MemState,
    program_id: &ProgramId,
    source: &PartnerId,
    target: &PartnerId,
) -> u64 {
    let mut n = 0;
    for c in state.commissions.values_mut() {
        if c.program_id == *program_id && c.partner_id == *source {
            c.partner_id = *target;
            n += 1;
        }
    }
    n
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn begin(&self) -> Result<Box<dyn LedgerTx>> {
        let guard = Arc::clone(&self.state).lock_owned().await;
        let working = guard.clone();
        Ok(Box::new(MemTx { guard, working }))
    }

    async fn pending_pairs(&self, cursor: Option<&PairCursor>, limit: usize) -> Result<Vec<Pair>> {
        let state = self.state.lock().await;
        let pairs: BTreeSet<Pair> = state
            .commissions
            .values()
            .filter(|c| c.is_payable() && c.amount != 0)
            .map(|c| Pair::new(c.program_id, c.partner_id))
            .collect();

        Ok(pairs
            .into_iter()
            .filter(|pair| cursor.map_or(true, |cur| cur.precedes(pair)))
            .take(limit)
            .collect())
    }

    async fn complete_payouts(
        &self,
        external_payout_id: &str,
        trace_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<Vec<PayoutId>> {
        let mut state = self.state.lock().await;
        let mut updated = Vec::new();

        for payout in state.payouts.values_mut() {
            if payout.external_payout_id.as_deref() == Some(external_payout_id)
                && payout.status != PayoutStatus::Completed
            {
                payout.status = PayoutStatus::Completed;
                payout.paid_at = Some(paid_at);
                if let Some(trace) = trace_id {
                    payout.trace_id = Some(trace.to_string());
                }
                updated.push(payout.id);
            }
        }

        for commission in state.commissions.values_mut() {
            if commission
                .payout_id
                .is_some_and(|pid| updated.contains(&pid))
                && commission.status == CommissionStatus::Processed
            {
                commission.status = CommissionStatus::Paid;
            }
        }

        Ok(updated)
    }

    async fn fail_payouts(
        &self,
        external_payout_id: &str,
        reason: Option<PayoutFailureReason>,
    ) -> Result<Vec<PayoutId>> {
        let mut state = self.state.lock().await;
        let mut updated = Vec::new();

        for payout in state.payouts.values_mut() {
            if payout.external_payout_id.as_deref() == Some(external_payout_id)
                && !payout.status.is_terminal()
            {
                payout.status = PayoutStatus::Failed;
                payout.failure_reason = reason;
                updated.push(payout.id);
            }
        }

        Ok(updated)
    }

    async fn set_payout_submitted(
        &self,
        id: &PayoutId,
        external_payout_id: &str,
        status: PayoutStatus,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let payout = state.payouts.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "payout",
            id: id.to_string(),
        })?;
        payout.external_payout_id = Some(external_payout_id.to_string());
        payout.status = status;
        Ok(())
    }

    async fn get_payout(&self, id: &PayoutId) -> Result<Option<Payout>> {
        Ok(self.state.lock().await.payouts.get(id).cloned())
    }

    async fn payouts_for_pair(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Payout>> {
        let state = self.state.lock().await;
        Ok(state
            .payouts
            .values()
            .filter(|p| p.program_id == *program_id && p.partner_id == *partner_id)
            .cloned()
            .collect())
    }

    async fn insert_commission(&self, commission: &Commission) -> Result<()> {
        self.state
            .lock()
            .await
            .commissions
            .insert(commission.id, commission.clone());
        Ok(())
    }

    async fn get_commission(&self, id: &CommissionId) -> Result<Option<Commission>> {
        Ok(self.state.lock().await.commissions.get(id).cloned())
    }

    async fn commissions_for_pair(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Commission>> {
        let state = self.state.lock().await;
        let mut rows: Vec<Commission> = state
            .commissions
            .values()
            .filter(|c| c.program_id == *program_id && c.partner_id == *partner_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.created_at);
        Ok(rows)
    }

    async fn put_partner(&self, partner: &Partner) -> Result<()> {
        self.state
            .lock()
            .await
            .partners
            .insert(partner.id, partner.clone());
        Ok(())
    }

    async fn get_partner(&self, id: &PartnerId) -> Result<Option<Partner>> {
        Ok(self.state.lock().await.partners.get(id).cloned())
    }

    async fn partner_by_email(&self, email: &str) -> Result<Option<Partner>> {
        let state = self.state.lock().await;
        Ok(state.partners.values().find(|p| p.email == email).cloned())
    }

    async fn partner_by_recipient(&self, recipient_id: &str) -> Result<Option<Partner>> {
        let state = self.state.lock().await;
        Ok(state
            .partners
            .values()
            .find(|p| p.external_recipient_id.as_deref() == Some(recipient_id))
            .cloned())
    }

    async fn update_partner_payout_config(
        &self,
        id: &PartnerId,
        payouts_enabled_at: Option<DateTime<Utc>>,
        default_payout_method: Option<&str>,
        payout_method_fingerprint: Option<&str>,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let partner = state.partners.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "partner",
            id: id.to_string(),
        })?;
        partner.payouts_enabled_at = payouts_enabled_at;
        partner.default_payout_method = default_payout_method.map(String::from);
        partner.payout_method_fingerprint = payout_method_fingerprint.map(String::from);
        Ok(())
    }

    async fn partners_sharing_fingerprint(
        &self,
        fingerprint: &str,
        excluding: &PartnerId,
    ) -> Result<u64> {
        let state = self.state.lock().await;
        Ok(state
            .partners
            .values()
            .filter(|p| {
                p.id != *excluding && p.payout_method_fingerprint.as_deref() == Some(fingerprint)
            })
            .count() as u64)
    }

    async fn recompute_partner_totals(&self, id: &PartnerId) -> Result<i64> {
        let mut state = self.state.lock().await;
        let total: i64 = state
            .commissions
            .values()
            .filter(|c| c.partner_id == *id && c.counts_toward_totals())
            .map(|c| c.amount)
            .sum();
        let partner = state.partners.get_mut(id).ok_or_else(|| StoreError::NotFound {
            entity: "partner",
            id: id.to_string(),
        })?;
        partner.total_commissions = total;
        Ok(total)
    }

    async fn delete_partner(&self, id: &PartnerId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.partners.remove(id).ok_or_else(|| StoreError::NotFound {
            entity: "partner",
            id: id.to_string(),
        })?;
        Ok(())
    }

    async fn put_program(&self, program: &Program) -> Result<()> {
        self.state
            .lock()
            .await
            .programs
            .insert(program.id, program.clone());
        Ok(())
    }

    async fn put_enrollment(&self, enrollment: &ProgramEnrollment) -> Result<()> {
        let mut state = self.state.lock().await;
        let duplicate = state.enrollments.values().any(|e| {
            e.partner_id == enrollment.partner_id && e.program_id == enrollment.program_id
        });
        if duplicate {
            return Err(StoreError::Conflict(format!(
                "partner {} already enrolled in program {}",
                enrollment.partner_id, enrollment.program_id
            )));
        }
        state.enrollments.insert(enrollment.id, enrollment.clone());
        Ok(())
    }

    async fn enrollments_for_partner(&self, id: &PartnerId) -> Result<Vec<ProgramEnrollment>> {
        let state = self.state.lock().await;
        Ok(state
            .enrollments
            .values()
            .filter(|e| e.partner_id == *id)
            .cloned()
            .collect())
    }

    async fn reassign_enrollments(&self, ids: &[EnrollmentId], target: &PartnerId) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut n = 0;
        for id in ids {
            if let Some(e) = state.enrollments.get_mut(id) {
                e.partner_id = *target;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn insert_link(&self, link: &Link) -> Result<()> {
        self.state.lock().await.links.insert(link.id, link.clone());
        Ok(())
    }

    async fn links_for_partner(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Link>> {
        let state = self.state.lock().await;
        Ok(state
            .links
            .values()
            .filter(|l| l.program_id == *program_id && l.partner_id == *partner_id)
            .cloned()
            .collect())
    }

    async fn insert_bounty_submission(&self, submission: &BountySubmission) -> Result<()> {
        self.state
            .lock()
            .await
            .submissions
            .insert(submission.id, submission.clone());
        Ok(())
    }

    async fn bounty_submissions_for_partner(
        &self,
        id: &PartnerId,
    ) -> Result<Vec<BountySubmission>> {
        let state = self.state.lock().await;
        Ok(state
            .submissions
            .values()
            .filter(|s| s.partner_id == *id)
            .cloned()
            .collect())
    }

    async fn reassign_bounty_submission(
        &self,
        id: &SubmissionId,
        target: &PartnerId,
    ) -> Result<()> {
        let mut state = self.state.lock().await;
        let bounty_id = state
            .submissions
            .get(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "bounty submission",
                id: id.to_string(),
            })?
            .bounty_id;

        let collision = state
            .submissions
            .values()
            .any(|s| s.id != *id && s.bounty_id == bounty_id && s.partner_id == *target);
        if collision {
            return Err(StoreError::Conflict(format!(
                "partner {target} already has a submission for bounty {bounty_id}"
            )));
        }

        if let Some(s) = state.submissions.get_mut(id) {
            s.partner_id = *target;
        }
        Ok(())
    }

    async fn insert_partner_record(&self, record: &PartnerRecord) -> Result<()> {
        self.state.lock().await.records.push(record.clone());
        Ok(())
    }

    async fn partner_records(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<PartnerRecord>> {
        let state = self.state.lock().await;
        Ok(state
            .records
            .iter()
            .filter(|r| r.program_id == *program_id && r.partner_id == *partner_id)
            .cloned()
            .collect())
    }

    async fn put_user(&self, id: &UserId, workspace_count: u32) -> Result<()> {
        self.state.lock().await.users.insert(*id, workspace_count);
        Ok(())
    }

    async fn user_workspace_count(&self, id: &UserId) -> Result<u32> {
        Ok(self.state.lock().await.users.get(id).copied().unwrap_or(0))
    }

    async fn delete_user(&self, id: &UserId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.users.remove(id).ok_or_else(|| StoreError::NotFound {
            entity: "user",
            id: id.to_string(),
        })?;
        Ok(())
    }

    async fn resolve_fraud_groups(
        &self,
        partner_id: &PartnerId,
        kind: FraudGroupKind,
        reason: &str,
    ) -> Result<u64> {
        let mut state = self.state.lock().await;
        let mut n = 0;
        for group in &mut state.fraud_groups {
            if group.partner_id == *partner_id
                && group.kind == kind
                && group.status == FraudGroupStatus::Pending
            {
                group.status = FraudGroupStatus::Resolved;
                group.resolution_reason = Some(reason.to_string());
                n += 1;
            }
        }
        Ok(n)
    }

    async fn screen_duplicate_payout_method(
        &self,
        partner_id: &PartnerId,
        fingerprint: &str,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;
        let shared = state.partners.values().any(|p| {
            p.id != *partner_id && p.payout_method_fingerprint.as_deref() == Some(fingerprint)
        });

        let already_pending = state.fraud_groups.iter().any(|g| {
            g.partner_id == *partner_id
                && g.kind == FraudGroupKind::DuplicatePayoutMethod
                && g.status == FraudGroupStatus::Pending
        });

        if shared && !already_pending {
            state.fraud_groups.push(FraudGroup {
                partner_id: *partner_id,
                kind: FraudGroupKind::DuplicatePayoutMethod,
                status: FraudGroupStatus::Pending,
                resolution_reason: None,
                created_at: Utc::now(),
            });
        }

        Ok(shared || already_pending)
    }

    async fn pending_fraud_groups(&self, partner_id: &PartnerId) -> Result<Vec<FraudGroup>> {
        let state = self.state.lock().await;
        Ok(state
            .fraud_groups
            .iter()
            .filter(|g| g.partner_id == *partner_id && g.status == FraudGroupStatus::Pending)
            .cloned()
            .collect())
    }
}

/// An open in-memory transaction.
///
/// Holds the state lock for its lifetime and mutates a working copy;
/// `commit` swaps the working copy in, dropping discards it.
struct MemTx {
    guard: OwnedMutexGuard<MemState>,
    working: MemState,
}

#[async_trait]
impl LedgerTx for MemTx {
    async fn pending_commissions(
        &mut self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Commission>> {
        Ok(pending_commissions_in(&self.working, program_id, partner_id))
    }

    async fn pending_payout(
        &mut self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Option<Payout>> {
        Ok(pending_payout_in(&self.working, program_id, partner_id))
    }

    async fn insert_payout(&mut self, payout: &Payout) -> Result<()> {
        self.working.payouts.insert(payout.id, payout.clone());
        Ok(())
    }

    async fn merge_into_payout(
        &mut self,
        id: &PayoutId,
        amount_delta: i64,
        quantity_delta: i64,
        period_end: DateTime<Utc>,
    ) -> Result<()> {
        let payout = self
            .working
            .payouts
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound {
                entity: "payout",
                id: id.to_string(),
            })?;
        payout.amount += amount_delta;
        payout.quantity += quantity_delta;
        payout.period_end = period_end;
        payout
            .description
            .get_or_insert_with(|| DEFAULT_PAYOUT_DESCRIPTION.to_string());
        Ok(())
    }

    async fn mark_commissions_processed(
        &mut self,
        ids: &[CommissionId],
        payout_id: &PayoutId,
    ) -> Result<u64> {
        let mut n = 0;
        for id in ids {
            if let Some(c) = self.working.commissions.get_mut(id) {
                c.status = CommissionStatus::Processed;
                c.payout_id = Some(*payout_id);
                n += 1;
            }
        }
        Ok(n)
    }

    async fn reassign_links(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        let mut n = 0;
        for link in self.working.links.values_mut() {
            if link.program_id == *program_id && link.partner_id == *source {
                link.partner_id = *target;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn reassign_commissions(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        Ok(reassign_commissions_in(
            &mut self.working,
            program_id,
            source,
            target,
        ))
    }

    async fn reassign_payouts(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        let mut n = 0;
        for payout in self.working.payouts.values_mut() {
            if payout.program_id == *program_id && payout.partner_id == *source {
                payout.partner_id = *target;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn reassign_partner_records(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64> {
        let mut n = 0;
        for record in &mut self.working.records {
            if record.program_id == *program_id && record.partner_id == *source {
                record.partner_id = *target;
                n += 1;
            }
        }
        Ok(n)
    }

    async fn commit(mut self: Box<Self>) -> Result<()> {
        *self.guard = self.working;
        Ok(())
    }
}

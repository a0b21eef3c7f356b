//! Ledger storage layer for partnerpay.
//!
//! This crate provides durable storage for commissions, payouts, partners,
//! programs, and the relational records the merge transferer moves between
//! partner identities.
//!
//! # Architecture
//!
//! Two traits define the boundary:
//!
//! - [`Ledger`] — the store handle: lookups, update-many reconciliation
//!   writes keyed on stable external identifiers, and `begin()` for opening
//!   a transaction.
//! - [`LedgerTx`] — a unit of work. Everything read or written through a
//!   transaction commits atomically via [`LedgerTx::commit`]; dropping the
//!   transaction without committing rolls every change back.
//!
//! Two implementations are provided: [`MemoryLedger`] for tests and
//! development, and [`PgLedger`] backed by PostgreSQL via sqlx.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod memory;
pub mod pg;

pub use error::{Result, StoreError};
pub use memory::MemoryLedger;
pub use pg::PgLedger;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use partnerpay_core::{
    BountySubmission, Commission, CommissionId, EnrollmentId, FraudGroup, FraudGroupKind, Link,
    Pair, PairCursor, Partner, PartnerId, PartnerRecord, Payout, PayoutFailureReason, PayoutId,
    PayoutStatus, Program, ProgramEnrollment, ProgramId, SubmissionId, UserId,
};

/// The ledger store boundary.
///
/// Non-transactional methods are individually atomic. Multi-entity writes
/// that must commit or roll back together go through [`Ledger::begin`].
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Open a transaction.
    async fn begin(&self) -> Result<Box<dyn LedgerTx>>;

    // =========================================================================
    // Pair Discovery
    // =========================================================================

    /// List distinct `(program, partner)` pairs that have pending,
    /// unassigned, non-zero-amount commissions, in ascending lexicographic
    /// order, strictly after `cursor` when one is given, up to `limit`.
    async fn pending_pairs(&self, cursor: Option<&PairCursor>, limit: usize) -> Result<Vec<Pair>>;

    // =========================================================================
    // Payout Reconciliation (update-many keyed on external identifiers)
    // =========================================================================

    /// Mark every not-yet-completed payout with this external id as
    /// completed, stamping `paid_at` and the processor trace id, and mark
    /// the commissions those payouts aggregate as paid. Atomic.
    ///
    /// Returns the ids of the payouts that transitioned. Redelivered events
    /// match zero rows, so `paid_at` is stamped exactly once.
    async fn complete_payouts(
        &self,
        external_payout_id: &str,
        trace_id: Option<&str>,
        paid_at: DateTime<Utc>,
    ) -> Result<Vec<PayoutId>>;

    /// Mark every non-terminal payout with this external id as failed with
    /// the given reason. Completed payouts stay completed: a failure event
    /// arriving after the transfer settled matches zero rows, keeping the
    /// payout consistent with its already-paid commissions. Returns the ids
    /// that transitioned.
    async fn fail_payouts(
        &self,
        external_payout_id: &str,
        reason: Option<PayoutFailureReason>,
    ) -> Result<Vec<PayoutId>>;

    /// Record submission of a payout to the payment processor: sets the
    /// external payout id and the submission-side status
    /// (processing/processed/sent).
    async fn set_payout_submitted(
        &self,
        id: &PayoutId,
        external_payout_id: &str,
        status: PayoutStatus,
    ) -> Result<()>;

    // =========================================================================
    // Payout / Commission Lookups
    // =========================================================================

    /// Get a payout by id.
    async fn get_payout(&self, id: &PayoutId) -> Result<Option<Payout>>;

    /// List payouts for a pair, oldest first.
    async fn payouts_for_pair(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Payout>>;

    /// Insert a commission ledger entry.
    async fn insert_commission(&self, commission: &Commission) -> Result<()>;

    /// Get a commission by id.
    async fn get_commission(&self, id: &CommissionId) -> Result<Option<Commission>>;

    /// List all commissions for a pair, oldest first.
    async fn commissions_for_pair(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Commission>>;

    // =========================================================================
    // Partners
    // =========================================================================

    /// Insert or update a partner record.
    async fn put_partner(&self, partner: &Partner) -> Result<()>;

    /// Get a partner by id.
    async fn get_partner(&self, id: &PartnerId) -> Result<Option<Partner>>;

    /// Look up a partner by email.
    async fn partner_by_email(&self, email: &str) -> Result<Option<Partner>>;

    /// Look up a partner by payment processor recipient id.
    async fn partner_by_recipient(&self, recipient_id: &str) -> Result<Option<Partner>>;

    /// Update a partner's payout configuration as derived from the payment
    /// processor's view of the recipient.
    async fn update_partner_payout_config(
        &self,
        id: &PartnerId,
        payouts_enabled_at: Option<DateTime<Utc>>,
        default_payout_method: Option<&str>,
        payout_method_fingerprint: Option<&str>,
    ) -> Result<()>;

    /// Count other partners sharing a payout method fingerprint.
    async fn partners_sharing_fingerprint(
        &self,
        fingerprint: &str,
        excluding: &PartnerId,
    ) -> Result<u64>;

    /// Recompute and persist the partner's denormalized commission total
    /// (duplicate/fraud flagged records excluded). Returns the new total.
    async fn recompute_partner_totals(&self, id: &PartnerId) -> Result<i64>;

    /// Delete a partner record.
    async fn delete_partner(&self, id: &PartnerId) -> Result<()>;

    // =========================================================================
    // Programs / Enrollments
    // =========================================================================

    /// Insert a program.
    async fn put_program(&self, program: &Program) -> Result<()>;

    /// Insert an enrollment.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the partner is already enrolled in
    /// the program.
    async fn put_enrollment(&self, enrollment: &ProgramEnrollment) -> Result<()>;

    /// List a partner's enrollments.
    async fn enrollments_for_partner(&self, id: &PartnerId) -> Result<Vec<ProgramEnrollment>>;

    /// Reassign the given enrollments to another partner.
    async fn reassign_enrollments(&self, ids: &[EnrollmentId], target: &PartnerId) -> Result<u64>;

    // =========================================================================
    // Links / Bounties / Ancillary Records
    // =========================================================================

    /// Insert a link.
    async fn insert_link(&self, link: &Link) -> Result<()>;

    /// List a partner's links within a program.
    async fn links_for_partner(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Link>>;

    /// Insert a bounty submission.
    async fn insert_bounty_submission(&self, submission: &BountySubmission) -> Result<()>;

    /// List a partner's bounty submissions.
    async fn bounty_submissions_for_partner(
        &self,
        id: &PartnerId,
    ) -> Result<Vec<BountySubmission>>;

    /// Reassign a single bounty submission to another partner.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Conflict` if the target already has a submission
    /// for the same bounty.
    async fn reassign_bounty_submission(
        &self,
        id: &SubmissionId,
        target: &PartnerId,
    ) -> Result<()>;

    /// Insert an ancillary partner record (notification email, message,
    /// comment).
    async fn insert_partner_record(&self, record: &PartnerRecord) -> Result<()>;

    /// List a partner's ancillary records within a program.
    async fn partner_records(
        &self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<PartnerRecord>>;

    // =========================================================================
    // Users
    // =========================================================================

    /// Record a user identity and its workspace membership count.
    async fn put_user(&self, id: &UserId, workspace_count: u32) -> Result<()>;

    /// Count a user's workspace memberships. Unknown users count zero.
    async fn user_workspace_count(&self, id: &UserId) -> Result<u32>;

    /// Delete a user identity.
    async fn delete_user(&self, id: &UserId) -> Result<()>;

    // =========================================================================
    // Fraud Groups
    // =========================================================================

    /// Resolve all pending fraud groups of a kind for a partner.
    /// Idempotent: already-resolved flags are untouched. Returns the number
    /// of flags resolved.
    async fn resolve_fraud_groups(
        &self,
        partner_id: &PartnerId,
        kind: FraudGroupKind,
        reason: &str,
    ) -> Result<u64>;

    /// Re-run the duplicate-payout-method check for a partner against the
    /// given fingerprint. Flags the partner (at most one pending flag per
    /// kind) when another partner shares the fingerprint. Returns whether
    /// the partner is flagged after the check.
    async fn screen_duplicate_payout_method(
        &self,
        partner_id: &PartnerId,
        fingerprint: &str,
    ) -> Result<bool>;

    /// List a partner's pending fraud groups.
    async fn pending_fraud_groups(&self, partner_id: &PartnerId) -> Result<Vec<FraudGroup>>;
}

/// A ledger unit of work.
///
/// All reads observe a consistent snapshot and all writes become visible
/// atomically on [`LedgerTx::commit`]. Dropping the transaction without
/// committing discards every change.
#[async_trait]
pub trait LedgerTx: Send {
    // =========================================================================
    // Payout Aggregation
    // =========================================================================

    /// Select the pair's pending, unassigned commissions ordered by
    /// `created_at` ascending.
    async fn pending_commissions(
        &mut self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Vec<Commission>>;

    /// Find the pair's pending payout, if one exists.
    async fn pending_payout(
        &mut self,
        program_id: &ProgramId,
        partner_id: &PartnerId,
    ) -> Result<Option<Payout>>;

    /// Insert a new payout.
    async fn insert_payout(&mut self, payout: &Payout) -> Result<()>;

    /// Merge freshly aggregated totals into an existing payout: increment
    /// amount and quantity, set the (already monotonic) period end, and
    /// restore the default description if it is missing.
    async fn merge_into_payout(
        &mut self,
        id: &PayoutId,
        amount_delta: i64,
        quantity_delta: i64,
        period_end: DateTime<Utc>,
    ) -> Result<()>;

    /// Mark the given commissions as processed and owned by `payout_id`.
    /// Returns the number of rows updated.
    async fn mark_commissions_processed(
        &mut self,
        ids: &[CommissionId],
        payout_id: &PayoutId,
    ) -> Result<u64>;

    // =========================================================================
    // Partner Merge Transfer
    // =========================================================================

    /// Reassign a partner's links within a program.
    async fn reassign_links(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64>;

    /// Reassign a partner's commissions within a program.
    async fn reassign_commissions(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64>;

    /// Reassign a partner's payouts within a program.
    async fn reassign_payouts(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64>;

    /// Reassign a partner's ancillary records within a program.
    async fn reassign_partner_records(
        &mut self,
        program_id: &ProgramId,
        source: &PartnerId,
        target: &PartnerId,
    ) -> Result<u64>;

    /// Commit the unit of work.
    async fn commit(self: Box<Self>) -> Result<()>;
}

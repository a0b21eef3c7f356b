//! Payout types and period math.
//!
//! A payout is a batched, periodized aggregation of commissions destined for
//! a single payment to a partner. Amount and quantity always equal the sums
//! over the commissions referencing the payout; the covered period is
//! `[period_start, period_end)` with a month-aligned exclusive upper bound.

use chrono::{DateTime, Datelike, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{PartnerId, PayoutId, ProgramId};

/// Default description for payouts created by the aggregator.
pub const DEFAULT_PAYOUT_DESCRIPTION: &str = "Partner program payout";

/// A payout batch for a single (program, partner) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Payout {
    /// Payout identifier (time-ordered).
    pub id: PayoutId,

    /// Program the payout belongs to.
    pub program_id: ProgramId,

    /// Partner the payout is destined for.
    pub partner_id: PartnerId,

    /// Earliest `created_at` among contributing commissions.
    pub period_start: DateTime<Utc>,

    /// Exclusive month-aligned upper bound of the covered period.
    ///
    /// Monotonically extended on merges, never shrunk.
    pub period_end: DateTime<Utc>,

    /// Total amount in minor units. Equals the sum over contributing
    /// commissions; only ever increases via merges.
    pub amount: i64,

    /// Total count of underlying commission units.
    pub quantity: i64,

    /// Current lifecycle status.
    pub status: PayoutStatus,

    /// Human-readable description shown to the partner.
    pub description: Option<String>,

    /// Payment processor's identifier, set once submitted.
    pub external_payout_id: Option<String>,

    /// Why the payout failed, if it did.
    pub failure_reason: Option<PayoutFailureReason>,

    /// Processor trace identifier from the posting event, if provided.
    pub trace_id: Option<String>,

    /// When the payout completed.
    pub paid_at: Option<DateTime<Utc>>,

    /// When the payout was first created.
    pub created_at: DateTime<Utc>,
}

impl Payout {
    /// Create a new pending payout for a pair.
    #[must_use]
    pub fn new(
        program_id: ProgramId,
        partner_id: PartnerId,
        period_start: DateTime<Utc>,
        period_end: DateTime<Utc>,
        amount: i64,
        quantity: i64,
    ) -> Self {
        Self {
            id: PayoutId::generate(),
            program_id,
            partner_id,
            period_start,
            period_end,
            amount,
            quantity,
            status: PayoutStatus::Pending,
            description: Some(DEFAULT_PAYOUT_DESCRIPTION.to_string()),
            external_payout_id: None,
            failure_reason: None,
            trace_id: None,
            paid_at: None,
            created_at: Utc::now(),
        }
    }
}

/// Lifecycle status of a payout.
///
/// ```text
/// pending -> processing -> processed -> sent -> completed
/// pending/processing/processed/sent -> failed
/// ```
///
/// Only `pending` payouts accept merges from the aggregator; terminal
/// transitions (`completed`/`failed`) are driven exclusively by payment
/// processor events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutStatus {
    /// Accumulating commissions, not yet submitted.
    Pending,
    /// Submitted to the payment processor.
    Processing,
    /// Accepted by the payment processor.
    Processed,
    /// Funds dispatched to the partner's payout method.
    Sent,
    /// Funds confirmed received (terminal).
    Completed,
    /// Transfer returned or failed (terminal).
    Failed,
}

impl PayoutStatus {
    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Processed => "processed",
            Self::Sent => "sent",
            Self::Completed => "completed",
            Self::Failed => "failed",
        }
    }

    /// Whether the status is terminal.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed)
    }
}

/// Processor failure reason vocabulary.
///
/// Mapped from the payment processor's fixed reason codes; unknown codes
/// map to `None` rather than failing the event handler.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PayoutFailureReason {
    /// The destination account is closed.
    AccountClosed,
    /// The destination account is frozen.
    AccountFrozen,
    /// The destination bank account is restricted.
    BankAccountRestricted,
    /// The bank could not process the transfer.
    CouldNotProcess,
    /// The debit was not authorized by the account holder.
    DebitNotAuthorized,
    /// Insufficient funds on the originating account.
    InsufficientFunds,
    /// The destination account number is invalid.
    InvalidAccountNumber,
    /// The account holder name did not match.
    IncorrectAccountHolderName,
    /// The transfer was declined.
    Declined,
}

impl PayoutFailureReason {
    /// Map a processor reason code to a known failure reason.
    ///
    /// Returns `None` for codes outside the fixed vocabulary.
    #[must_use]
    pub fn from_processor_code(code: &str) -> Option<Self> {
        match code {
            "account_closed" => Some(Self::AccountClosed),
            "account_frozen" => Some(Self::AccountFrozen),
            "bank_account_restricted" => Some(Self::BankAccountRestricted),
            "could_not_process" => Some(Self::CouldNotProcess),
            "debit_not_authorized" => Some(Self::DebitNotAuthorized),
            "insufficient_funds" => Some(Self::InsufficientFunds),
            "invalid_account_number" => Some(Self::InvalidAccountNumber),
            "incorrect_account_holder_name" => Some(Self::IncorrectAccountHolderName),
            "declined" => Some(Self::Declined),
            _ => None,
        }
    }

    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::AccountClosed => "account_closed",
            Self::AccountFrozen => "account_frozen",
            Self::BankAccountRestricted => "bank_account_restricted",
            Self::CouldNotProcess => "could_not_process",
            Self::DebitNotAuthorized => "debit_not_authorized",
            Self::InsufficientFunds => "insufficient_funds",
            Self::InvalidAccountNumber => "invalid_account_number",
            Self::IncorrectAccountHolderName => "incorrect_account_holder_name",
            Self::Declined => "declined",
        }
    }
}

/// Compute the exclusive month-aligned end of the payout period containing
/// `latest`.
///
/// For any instant in December 2024 this returns `2025-01-01T00:00:00Z`.
///
/// # Panics
///
/// Never panics in practice: the first day of a month is always a valid
/// date and midnight UTC is never ambiguous. The `expect` calls guard
/// library invariants, not runtime conditions.
#[must_use]
pub fn period_end_exclusive(latest: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if latest.month() == 12 {
        (latest.year() + 1, 1)
    } else {
        (latest.year(), latest.month() + 1)
    };

    let first = NaiveDate::from_ymd_opt(year, month, 1)
        .expect("first day of a month is always a valid date")
        .and_hms_opt(0, 0, 0)
        .expect("midnight is always a valid time");

    Utc.from_utc_datetime(&first)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn period_end_mid_month() {
        let latest = Utc.with_ymd_and_hms(2024, 3, 28, 14, 30, 0).unwrap();
        let end = period_end_exclusive(latest);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 4, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn period_end_rolls_over_year() {
        let latest = Utc.with_ymd_and_hms(2024, 12, 31, 23, 59, 59).unwrap();
        let end = period_end_exclusive(latest);
        assert_eq!(end, Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn period_end_first_of_month() {
        // A record on the first of a month still pushes the bound to the
        // next month (the bound is exclusive).
        let latest = Utc.with_ymd_and_hms(2024, 6, 1, 0, 0, 0).unwrap();
        let end = period_end_exclusive(latest);
        assert_eq!(end, Utc.with_ymd_and_hms(2024, 7, 1, 0, 0, 0).unwrap());
    }

    #[test]
    fn unknown_failure_code_maps_to_none() {
        assert_eq!(PayoutFailureReason::from_processor_code("mystery"), None);
        assert_eq!(
            PayoutFailureReason::from_processor_code("insufficient_funds"),
            Some(PayoutFailureReason::InsufficientFunds)
        );
    }

    #[test]
    fn new_payout_is_pending_with_default_description() {
        let p = Payout::new(
            ProgramId::generate(),
            PartnerId::generate(),
            Utc::now(),
            period_end_exclusive(Utc::now()),
            1000,
            4,
        );
        assert_eq!(p.status, PayoutStatus::Pending);
        assert_eq!(p.description.as_deref(), Some(DEFAULT_PAYOUT_DESCRIPTION));
        assert!(!p.status.is_terminal());
    }
}

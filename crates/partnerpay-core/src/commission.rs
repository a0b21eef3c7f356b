//! Commission ledger entries.
//!
//! A commission records a partner's entitlement to a reward for a tracked
//! event (click, lead, sale). Commissions start `pending`, are claimed by the
//! payout aggregator (`processed` + `payout_id`), and become `paid` when the
//! owning payout completes. Fraud detection may mark them `duplicate` or
//! `fraud` out of band, which excludes them from aggregation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{CommissionId, PartnerId, PayoutId, ProgramId};

/// A commission ledger entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Commission {
    /// Commission identifier (time-ordered).
    pub id: CommissionId,

    /// Program this commission was earned under.
    pub program_id: ProgramId,

    /// Partner who earned the commission.
    pub partner_id: PartnerId,

    /// What kind of event earned the commission.
    pub commission_type: CommissionType,

    /// Current lifecycle status.
    pub status: CommissionStatus,

    /// Number of underlying units (e.g. clicks).
    pub quantity: i64,

    /// Earned amount in minor units (cents).
    pub amount: i64,

    /// Payout this commission has been rolled into, if any.
    ///
    /// Set together with the `Processed` status; a `Pending` commission
    /// always has `payout_id == None`.
    pub payout_id: Option<PayoutId>,

    /// When the underlying event occurred.
    pub created_at: DateTime<Utc>,
}

impl Commission {
    /// Create a new pending commission.
    #[must_use]
    pub fn new(
        program_id: ProgramId,
        partner_id: PartnerId,
        commission_type: CommissionType,
        quantity: i64,
        amount: i64,
    ) -> Self {
        Self {
            id: CommissionId::generate(),
            program_id,
            partner_id,
            commission_type,
            status: CommissionStatus::Pending,
            quantity,
            amount,
            payout_id: None,
            created_at: Utc::now(),
        }
    }

    /// Whether this commission is eligible for payout aggregation.
    #[must_use]
    pub fn is_payable(&self) -> bool {
        self.status == CommissionStatus::Pending && self.payout_id.is_none()
    }

    /// Whether this commission counts toward partner earnings totals.
    ///
    /// Duplicate and fraud flagged records are excluded everywhere totals
    /// are derived.
    #[must_use]
    pub fn counts_toward_totals(&self) -> bool {
        !matches!(
            self.status,
            CommissionStatus::Duplicate | CommissionStatus::Fraud
        )
    }
}

/// The event type that earned a commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionType {
    /// Click on a partner link.
    Click,
    /// Qualified lead attributed to a partner.
    Lead,
    /// Sale attributed to a partner.
    Sale,
    /// Manually granted reward.
    Custom,
}

/// Lifecycle status of a commission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CommissionStatus {
    /// Earned, not yet rolled into a payout.
    Pending,
    /// Claimed by a payout (has a `payout_id`).
    Processed,
    /// The owning payout completed.
    Paid,
    /// Flagged as a duplicate by fraud detection.
    Duplicate,
    /// Flagged as fraudulent by fraud detection.
    Fraud,
}

impl CommissionStatus {
    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processed => "processed",
            Self::Paid => "paid",
            Self::Duplicate => "duplicate",
            Self::Fraud => "fraud",
        }
    }
}

impl CommissionType {
    /// Database/string representation.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Click => "click",
            Self::Lead => "lead",
            Self::Sale => "sale",
            Self::Custom => "custom",
        }
    }
}

//! Partner, program, and related relational entities.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::ids::{BountyId, EnrollmentId, LinkId, PartnerId, ProgramId, SubmissionId, UserId};

/// A partner enrolled in one or more programs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Partner {
    /// Partner identifier.
    pub id: PartnerId,

    /// Login identity this partner belongs to, if linked.
    pub user_id: Option<UserId>,

    /// Contact email, unique per partner.
    pub email: String,

    /// Fingerprint of the configured payout method, used for
    /// duplicate-payout-method fraud detection.
    pub payout_method_fingerprint: Option<String>,

    /// Set when the partner has a verified payout method with the payment
    /// processor; `None` means payouts are disabled.
    pub payouts_enabled_at: Option<DateTime<Utc>>,

    /// The partner's default payout method identifier at the processor.
    pub default_payout_method: Option<String>,

    /// Payment processor recipient identifier.
    pub external_recipient_id: Option<String>,

    /// Crypto wallet address, if the partner gets paid in crypto.
    pub crypto_wallet_address: Option<String>,

    /// Denormalized running sum of commission amounts (minor units),
    /// excluding duplicate/fraud flagged records.
    pub total_commissions: i64,

    /// When the partner record was created.
    pub created_at: DateTime<Utc>,
}

impl Partner {
    /// Create a new partner with no payout configuration.
    #[must_use]
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: PartnerId::generate(),
            user_id: None,
            email: email.into(),
            payout_method_fingerprint: None,
            payouts_enabled_at: None,
            default_payout_method: None,
            external_recipient_id: None,
            crypto_wallet_address: None,
            total_commissions: 0,
            created_at: Utc::now(),
        }
    }

    /// Whether payouts are currently enabled for this partner.
    #[must_use]
    pub const fn payouts_enabled(&self) -> bool {
        self.payouts_enabled_at.is_some()
    }
}

/// A partner program: the scoping entity for partners, links, and commissions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Program {
    /// Program identifier.
    pub id: ProgramId,

    /// Display name.
    pub name: String,

    /// When the program was created.
    pub created_at: DateTime<Utc>,
}

impl Program {
    /// Create a new program.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            id: ProgramId::generate(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }
}

/// A partner's enrollment in a program.
///
/// At most one enrollment may exist per (partner, program) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgramEnrollment {
    /// Enrollment identifier.
    pub id: EnrollmentId,

    /// Enrolled program.
    pub program_id: ProgramId,

    /// Enrolled partner.
    pub partner_id: PartnerId,

    /// Partner group within the program, if grouped.
    pub group_id: Option<String>,

    /// Tenant scoping identifier, if multi-tenant.
    pub tenant_id: Option<String>,

    /// When the enrollment was created.
    pub created_at: DateTime<Utc>,
}

impl ProgramEnrollment {
    /// Create a new enrollment.
    #[must_use]
    pub fn new(program_id: ProgramId, partner_id: PartnerId) -> Self {
        Self {
            id: EnrollmentId::generate(),
            program_id,
            partner_id,
            group_id: None,
            tenant_id: None,
            created_at: Utc::now(),
        }
    }
}

/// A short link owned by a partner within a program.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Link {
    /// Link identifier.
    pub id: LinkId,
    /// Program the link belongs to.
    pub program_id: ProgramId,
    /// Partner the link is attributed to.
    pub partner_id: PartnerId,
}

/// A partner's submission for a bounty.
///
/// At most one submission may exist per (partner, bounty) pair, which is why
/// merge reassigns these individually and tolerates per-row conflicts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BountySubmission {
    /// Submission identifier.
    pub id: SubmissionId,
    /// Bounty the submission is for.
    pub bounty_id: BountyId,
    /// Program scoping the bounty.
    pub program_id: ProgramId,
    /// Submitting partner.
    pub partner_id: PartnerId,
}

/// Ancillary partner-scoped records moved wholesale during a merge.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PartnerRecord {
    /// What kind of record this is.
    pub kind: RecordKind,
    /// Program scope.
    pub program_id: ProgramId,
    /// Owning partner.
    pub partner_id: PartnerId,
}

/// Kinds of ancillary partner records.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordKind {
    /// A notification email sent to the partner.
    NotificationEmail,
    /// A message thread entry.
    Message,
    /// A comment left on the partner.
    Comment,
}

/// A flagged cluster of suspicious partner activity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FraudGroup {
    /// Partner the flag is attached to.
    pub partner_id: PartnerId,

    /// What kind of suspicious activity was detected.
    pub kind: FraudGroupKind,

    /// Whether the flag is pending review or resolved.
    pub status: FraudGroupStatus,

    /// Why the flag was resolved, if it was.
    pub resolution_reason: Option<String>,

    /// When the flag was raised.
    pub created_at: DateTime<Utc>,
}

/// Kinds of fraud groups tracked by the payout engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudGroupKind {
    /// Two or more partners share a payout method fingerprint.
    DuplicatePayoutMethod,
}

/// Status of a fraud group flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FraudGroupStatus {
    /// Awaiting review.
    Pending,
    /// Reviewed and resolved.
    Resolved,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_partner_has_payouts_disabled() {
        let p = Partner::new("dev@example.com");
        assert!(!p.payouts_enabled());
        assert_eq!(p.total_commissions, 0);
    }

    #[test]
    fn enrollment_scopes_partner_to_program() {
        let program = Program::new("Acme Affiliates");
        let partner = Partner::new("dev@example.com");
        let e = ProgramEnrollment::new(program.id, partner.id);
        assert_eq!(e.program_id, program.id);
        assert_eq!(e.partner_id, partner.id);
    }
}

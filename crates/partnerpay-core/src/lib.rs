//! Core types for the partnerpay payout engine.
//!
//! This crate provides the foundational types shared across the platform:
//!
//! - **Identifiers**: `ProgramId`, `PartnerId`, `CommissionId`, `PayoutId`, ...
//! - **Ledger entries**: `Commission`, `CommissionType`, `CommissionStatus`
//! - **Payouts**: `Payout`, `PayoutStatus`, `PayoutFailureReason`, period math
//! - **Partners**: `Partner`, `Program`, `ProgramEnrollment`, `FraudGroup`
//! - **Pagination**: `Pair`, `PairCursor`
//!
//! # Monetary unit
//!
//! All amounts are integer minor units (cents) stored as `i64` to avoid
//! floating point precision issues. A $12.34 commission is `amount: 1234`.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod commission;
pub mod cursor;
pub mod ids;
pub mod partner;
pub mod payout;

pub use commission::{Commission, CommissionStatus, CommissionType};
pub use cursor::{Pair, PairCursor};
pub use ids::{
    BountyId, CommissionId, EnrollmentId, IdError, LinkId, PartnerId, PayoutId, ProgramId,
    SubmissionId, UserId,
};
pub use partner::{
    BountySubmission, FraudGroup, FraudGroupKind, FraudGroupStatus, Link, Partner, PartnerRecord,
    Program, ProgramEnrollment, RecordKind,
};
pub use payout::{
    period_end_exclusive, Payout, PayoutFailureReason, PayoutStatus, DEFAULT_PAYOUT_DESCRIPTION,
};

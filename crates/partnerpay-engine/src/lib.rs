//! Payout engine for partnerpay.
//!
//! This crate implements the partner commission and payout reconciliation
//! core:
//!
//! - **Aggregator** — transactional rollup of a pair's pending commissions
//!   into a payout ([`aggregator::create_or_update_payout`]).
//! - **Scheduler** — cursor-paged discovery of pairs with outstanding
//!   commissions ([`scheduler::process_pending_commissions`]).
//! - **Reconciler** — applies payment processor lifecycle events to payout
//!   and partner state ([`reconciler::Reconciler`]).
//! - **Merger** — transfers all financial and relational records from a
//!   duplicate partner identity to a canonical one
//!   ([`merge::PartnerMerger`]).
//!
//! All components are stateless between invocations: coordination state
//! (cursors, payout totals, commission status) lives in the ledger store.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod aggregator;
pub mod error;
pub mod hooks;
pub mod merge;
pub mod reconciler;
pub mod scheduler;

pub use aggregator::{create_or_update_payout, PayoutRollup};
pub use error::{EngineError, Result};
pub use hooks::{
    LinkIndex, NoopLinkIndex, NoopNotifier, NoopRecipientDirectory, Notifier, RecipientConfig,
    RecipientDirectory,
};
pub use merge::{MergeOutcome, MergeReport, PartnerMerger};
pub use reconciler::{PaymentEvent, Reconciler};
pub use scheduler::{process_pending_commissions, PairOutcome, PairResult, SweepSummary, PAGE_SIZE};

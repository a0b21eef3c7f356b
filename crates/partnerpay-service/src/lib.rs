//! Partnerpay HTTP API Service.
//!
//! This crate provides the HTTP surface for the payout engine:
//!
//! - Cron-triggered payout aggregation sweeps (with self-requeue pagination)
//! - Payment processor webhooks (transfer and recipient lifecycle events)
//! - Admin partner-merge endpoint
//!
//! # Authentication
//!
//! Three independent schemes, one per caller class:
//!
//! 1. **Cron signature** - HMAC-SHA256 over the request body for scheduler
//!    invocations
//! 2. **Processor signature** - HMAC-SHA256 webhook signature verification
//! 3. **Admin API key** - `X-Admin-Key` header for privileged endpoints

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Handlers need async for routing consistency

pub mod auth;
pub mod config;
pub mod crypto;
pub mod error;
pub mod handlers;
pub mod integrations;
pub mod routes;
pub mod state;

pub use config::ServiceConfig;
pub use error::ApiError;
pub use integrations::{HttpRecipientDirectory, WebhookNotifier};
pub use routes::create_router;
pub use state::AppState;

//! API handlers.

pub mod cron;
pub mod health;
pub mod partners;
pub mod webhooks;

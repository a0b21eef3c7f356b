//! Common test utilities for partnerpay integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;

use partnerpay_service::crypto::hmac_sha256_hex;
use partnerpay_service::{create_router, AppState, ServiceConfig};
use partnerpay_store::{Ledger, MemoryLedger};

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// Shared handle to the in-memory ledger for seeding and assertions.
    pub ledger: Arc<MemoryLedger>,
    /// The cron invocation secret.
    pub cron_secret: String,
    /// The payment webhook signing secret.
    pub webhook_secret: String,
    /// The admin API key.
    pub admin_key: String,
}

impl TestHarness {
    /// Create a new test harness with a fresh in-memory ledger.
    pub fn new() -> Self {
        let ledger = Arc::new(MemoryLedger::new());

        let cron_secret = "test-cron-secret".to_string();
        let webhook_secret = "test-webhook-secret".to_string();
        let admin_key = "test-admin-key".to_string();

        let config = ServiceConfig {
            cron_secret: Some(cron_secret.clone()),
            payments_webhook_secret: Some(webhook_secret.clone()),
            admin_api_key: Some(admin_key.clone()),
            ..ServiceConfig::default()
        };

        let state = AppState::new(Arc::clone(&ledger) as Arc<dyn Ledger>, config);
        let router: Router = create_router(state);

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            ledger,
            cron_secret,
            webhook_secret,
            admin_key,
        }
    }

    /// Sign a cron invocation body.
    pub fn cron_signature(&self, body: &str) -> String {
        hmac_sha256_hex(&self.cron_secret, body)
    }

    /// Sign a webhook delivery body.
    pub fn webhook_signature(&self, body: &str) -> String {
        hmac_sha256_hex(&self.webhook_secret, body)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

//! Cron-triggered payout sweep handler.
//!
//! The scheduler invokes `POST /cron/payouts` with an HMAC-signed body.
//! Each invocation processes one page of pairs; when a page comes back
//! full, the handler re-enqueues itself by POSTing the continuation cursor
//! back to this same endpoint, signed with the same secret. Responses are
//! returned to the scheduler before the follow-up page runs, keeping each
//! invocation short.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use partnerpay_core::PairCursor;
use partnerpay_engine::process_pending_commissions;

use crate::crypto::verify_signature;
use crate::error::ApiError;
use crate::state::AppState;

/// Cron invocation body.
#[derive(Debug, Default, Deserialize)]
pub struct SweepRequest {
    /// Continuation cursor from a previous page, if any.
    #[serde(default)]
    pub cursor: Option<PairCursor>,
}

/// Sweep invocation response.
#[derive(Debug, Serialize)]
pub struct SweepResponse {
    /// Pairs attempted in this page.
    pub pairs: usize,
    /// Pairs rolled into payouts.
    pub rolled_up: usize,
    /// Pairs that failed (logged, retried by the next full sweep).
    pub failed: usize,
    /// Continuation cursor, when more work may remain.
    pub next_cursor: Option<PairCursor>,
    /// Whether a follow-up invocation was enqueued.
    pub requeued: bool,
}

/// Run one payout sweep page.
pub async fn run_payout_sweep(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<SweepResponse>, ApiError> {
    // Verify the invocation signature if a secret is configured
    if let Some(secret) = &state.config.cron_secret {
        let signature = headers
            .get("x-cron-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or(ApiError::Unauthorized)?;

        if !verify_signature(secret, &body, signature) {
            tracing::warn!("invalid cron invocation signature");
            return Err(ApiError::Unauthorized);
        }
    } else {
        // No secret configured - skip verification (development mode)
        tracing::warn!("CRON_SECRET not configured - skipping cron signature verification");
    }

    let request: SweepRequest = if body.trim().is_empty() {
        SweepRequest::default()
    } else {
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?
    };

    let summary = process_pending_commissions(state.ledger.as_ref(), request.cursor).await?;

    let response = SweepResponse {
        pairs: summary.attempted.len(),
        rolled_up: summary.rolled_up(),
        failed: summary.failed(),
        next_cursor: summary.next_cursor,
        requeued: summary.next_cursor.is_some(),
    };

    if let Some(cursor) = summary.next_cursor {
        enqueue_next_page(&state, cursor);
    }

    Ok(Json(response))
}

/// Fire-and-forget a signed follow-up invocation for the next page.
///
/// Requeue failures are logged only: the hourly unconditioned sweep starts
/// from the beginning and picks up whatever a broken chain left behind.
fn enqueue_next_page(state: &Arc<AppState>, cursor: PairCursor) {
    let state = Arc::clone(state);
    tokio::spawn(async move {
        let url = format!("{}/cron/payouts", state.config.self_url);
        let body = match serde_json::to_string(&SweepRequestBody { cursor }) {
            Ok(body) => body,
            Err(e) => {
                tracing::error!(error = %e, "failed to encode sweep continuation body");
                return;
            }
        };

        let mut request = state.http.post(&url).body(body.clone());
        if let Some(secret) = &state.config.cron_secret {
            request = request.header(
                "x-cron-signature",
                crate::crypto::hmac_sha256_hex(secret, &body),
            );
        }

        match request.send().await {
            Ok(response) if response.status().is_success() => {
                tracing::info!(url = %url, "enqueued next sweep page");
            }
            Ok(response) => {
                tracing::warn!(url = %url, status = %response.status(), "sweep continuation rejected");
            }
            Err(e) => {
                tracing::warn!(url = %url, error = %e, "sweep continuation failed");
            }
        }
    });
}

#[derive(Serialize)]
struct SweepRequestBody {
    cursor: PairCursor,
}

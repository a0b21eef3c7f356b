//! Admin partner management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde::Deserialize;

use partnerpay_core::UserId;
use partnerpay_engine::MergeOutcome;

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::state::AppState;

/// Merge request body.
#[derive(Debug, Deserialize)]
pub struct MergeRequest {
    /// User initiating the merge (for audit logging).
    pub initiator_user_id: UserId,
    /// Email of the account to absorb.
    pub source_email: String,
    /// Email of the canonical account.
    pub target_email: String,
}

/// Merge a duplicate partner account into a canonical one.
pub async fn merge_partners(
    State(state): State<Arc<AppState>>,
    admin: AdminAuth,
    Json(request): Json<MergeRequest>,
) -> Result<Json<MergeOutcome>, ApiError> {
    if request.source_email.eq_ignore_ascii_case(&request.target_email) {
        return Err(ApiError::BadRequest(
            "source and target emails must differ".into(),
        ));
    }

    tracing::info!(
        admin_id = %admin.admin_id,
        initiator = %request.initiator_user_id,
        source_email = %request.source_email,
        target_email = %request.target_email,
        "partner merge requested"
    );

    let outcome = state
        .merger
        .merge_partner_accounts(
            &request.initiator_user_id,
            &request.source_email,
            &request.target_email,
        )
        .await?;

    Ok(Json(outcome))
}

//! Payment processor webhook handler.
//!
//! Receives transfer and recipient lifecycle events. Signature verification
//! runs over the raw body before parsing; every recognized event is
//! delegated to the reconciler, whose handlers are idempotent under the
//! processor's at-least-once delivery.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use partnerpay_engine::PaymentEvent;

use crate::crypto::verify_signature;
use crate::error::ApiError;
use crate::state::AppState;

/// Processor webhook envelope.
#[derive(Debug, Deserialize)]
pub struct ProcessorWebhook {
    /// Event type.
    #[serde(rename = "type")]
    pub event_type: String,
    /// Event ID.
    pub id: String,
    /// Event payload.
    pub data: serde_json::Value,
}

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was processed.
    pub received: bool,
    /// Short processing summary.
    pub message: String,
}

/// Handle payment processor webhooks.
pub async fn payments_webhook(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    body: String,
) -> Result<Json<WebhookResponse>, ApiError> {
    // Verify signature if a webhook secret is configured
    if let Some(secret) = &state.config.payments_webhook_secret {
        let signature = headers
            .get("x-payments-signature")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| ApiError::BadRequest("Missing webhook signature".into()))?;

        if !verify_signature(secret, &body, signature) {
            tracing::warn!("invalid payment webhook signature");
            return Err(ApiError::Unauthorized);
        }
    } else {
        // No webhook secret configured - skip verification (development mode)
        tracing::warn!(
            "PAYMENTS_WEBHOOK_SECRET not configured - skipping signature verification"
        );
    }

    let webhook: ProcessorWebhook =
        serde_json::from_str(&body).map_err(|e| ApiError::BadRequest(e.to_string()))?;

    tracing::info!(
        event_type = %webhook.event_type,
        event_id = %webhook.id,
        "received payment processor webhook"
    );

    // Events outside the handled set are acknowledged so the processor
    // stops redelivering them.
    let Some(event) = decode_event(&webhook)? else {
        tracing::debug!(event_type = %webhook.event_type, "unhandled processor event");
        return Ok(Json(WebhookResponse {
            received: true,
            message: format!("Ignoring event type {}.", webhook.event_type),
        }));
    };

    let message = state.reconciler.handle(event).await?;

    Ok(Json(WebhookResponse {
        received: true,
        message,
    }))
}

/// Map a webhook envelope onto a reconciler event.
fn decode_event(webhook: &ProcessorWebhook) -> Result<Option<PaymentEvent>, ApiError> {
    let event = match webhook.event_type.as_str() {
        "transfer.posted" => PaymentEvent::TransferPosted {
            external_payout_id: required_str(&webhook.data, "id")?,
            trace_id: optional_str(&webhook.data, "trace_id"),
        },
        "transfer.returned" => PaymentEvent::TransferReturned {
            external_payout_id: required_str(&webhook.data, "id")?,
            reason_code: optional_str(&webhook.data, "failure_code"),
        },
        "transfer.failed" => PaymentEvent::TransferFailed {
            external_payout_id: required_str(&webhook.data, "id")?,
            reason_code: optional_str(&webhook.data, "failure_code"),
        },
        "recipient.updated" => PaymentEvent::RecipientUpdated {
            recipient_id: required_str(&webhook.data, "id")?,
        },
        "recipient.closed" => PaymentEvent::RecipientClosed {
            recipient_id: required_str(&webhook.data, "id")?,
        },
        _ => return Ok(None),
    };
    Ok(Some(event))
}

fn required_str(data: &serde_json::Value, field: &str) -> Result<String, ApiError> {
    data.get(field)
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
        .ok_or_else(|| ApiError::BadRequest(format!("Missing {field} in event data")))
}

fn optional_str(data: &serde_json::Value, field: &str) -> Option<String> {
    data.get(field)
        .and_then(|v| v.as_str())
        .map(ToString::to_string)
}

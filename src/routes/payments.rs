use axum::{
    extract::{Path, State},
    http::{HeaderMap, StatusCode},
    routing::{get, post},
    Json, Router,
};
use chrono::Utc;
use serde_json::Value;

use super::{created, ok};
use crate::{
    auth::{require_identity, require_role, Role},
    error::{AppError, AppResult},
    schemas::{validate_input, CreatePaymentInput, IdPath},
    services::payments::{self, verify_stripe_signature},
    state::AppState,
};

const STRIPE_SIGNATURE_HEADER: &str = "stripe-signature";

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/payments", post(create_payment))
        .route("/payments/webhook/stripe", post(stripe_webhook))
        .route("/invoices/{id}/payments", get(list_invoice_payments))
}

async fn create_payment(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(payload): Json<CreatePaymentInput>,
) -> AppResult<(StatusCode, Json<Value>)> {
    let identity = require_role(&state, &headers, &[Role::Tenant]).await?;
    validate_input(&payload)?;
    created(payments::create(&state, identity.id, payload, Utc::now()).await?)
}

async fn list_invoice_payments(
    State(state): State<AppState>,
    Path(path): Path<IdPath>,
    headers: HeaderMap,
) -> AppResult<Json<Value>> {
    let identity = require_identity(&state, &headers).await?;
    ok(payments::list_for_invoice(&state, identity.id, path.id).await?)
}

/// Stripe webhook handler. Reads the raw body so the signature is checked
/// against the exact bytes Stripe signed.
async fn stripe_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: String,
) -> AppResult<Json<Value>> {
    let now = Utc::now();
    match state.config.stripe_webhook_secret.as_deref() {
        Some(secret) => {
            let signature = headers
                .get(STRIPE_SIGNATURE_HEADER)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default();
            if !verify_stripe_signature(&body, signature, secret, now) {
                tracing::warn!("Rejected Stripe webhook with invalid signature");
                return Err(AppError::Unauthorized(
                    "Invalid webhook signature.".to_string(),
                ));
            }
        }
        None if state.config.accepts_unsigned_webhooks() => {
            tracing::warn!("STRIPE_WEBHOOK_SECRET is not set; accepting unsigned webhook");
        }
        None => {
            return Err(AppError::Unauthorized(
                "Webhook signing secret is not configured.".to_string(),
            ));
        }
    }

    let event: Value = serde_json::from_str(&body)
        .map_err(|error| AppError::Validation(format!("Invalid webhook payload: {error}")))?;
    ok(payments::handle_webhook_event(&state, &event, now).await?)
}

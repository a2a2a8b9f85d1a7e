use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use serde::Serialize;
use serde_json::Value;
use sha2::Sha256;
use uuid::Uuid;

use super::{
    audit::{snapshot, write_audit_log},
    invoices::recompute_status,
    leases::get_for_party,
};
use crate::{
    domain::{Invoice, Payment, PaymentStatus, PaymentTransition},
    error::{AppError, AppResult},
    schemas::CreatePaymentInput,
    state::AppState,
};

type HmacSha256 = Hmac<Sha256>;

#[derive(Debug, Clone, Serialize)]
pub struct PaymentReceipt {
    pub payment: Payment,
    pub invoice: Invoice,
}

pub async fn create(
    state: &AppState,
    payer_id: Uuid,
    input: CreatePaymentInput,
    now: DateTime<Utc>,
) -> AppResult<PaymentReceipt> {
    let invoice = state.store.get_invoice(input.invoice_id).await?;
    let lease = state.store.get_lease(invoice.lease_id).await?;
    lease.ensure_tenant(payer_id)?;
    invoice.ensure_payable()?;

    let payment = Payment::record(
        &invoice,
        payer_id,
        input.method,
        input.amount,
        input.provider_ref,
        now,
    )?;
    let created = state.store.insert_payment(&payment).await?;

    tracing::info!(
        payment_id = %created.id,
        invoice_id = %invoice.id,
        method = created.method.as_str(),
        status = created.status.as_str(),
        amount = %created.amount,
        "Payment recorded"
    );
    write_audit_log(
        state,
        Some(payer_id),
        "create",
        "payments",
        created.id,
        None,
        snapshot(&created),
        now,
    )
    .await;

    let invoice = if created.status == PaymentStatus::Succeeded {
        recompute_status(state, invoice.id, now).await?
    } else {
        invoice
    };
    Ok(PaymentReceipt {
        payment: created,
        invoice,
    })
}

/// Marks the payment for `provider_ref` as SUCCEEDED. Replays of an already
/// succeeded payment change nothing.
pub async fn confirm_from_webhook(
    state: &AppState,
    provider_ref: &str,
    now: DateTime<Utc>,
) -> AppResult<Payment> {
    let payment = find_by_provider_ref(state, provider_ref).await?;
    if payment.status == PaymentStatus::Succeeded {
        tracing::debug!(payment_id = %payment.id, "Payment already confirmed");
        return Ok(payment);
    }

    let Some(updated) = state
        .store
        .transition_payment(payment.id, &PaymentTransition::confirm(now))
        .await?
    else {
        let current = state.store.get_payment(payment.id).await?;
        if current.status == PaymentStatus::Succeeded {
            return Ok(current);
        }
        return Err(AppError::InvalidState(format!(
            "Payment is {} and cannot be confirmed.",
            current.status.as_str()
        )));
    };

    tracing::info!(payment_id = %updated.id, invoice_id = %updated.invoice_id, "Payment confirmed");
    write_audit_log(
        state,
        None,
        "confirm",
        "payments",
        updated.id,
        snapshot(&payment),
        snapshot(&updated),
        now,
    )
    .await;
    recompute_status(state, updated.invoice_id, now).await?;
    Ok(updated)
}

pub async fn fail_from_webhook(
    state: &AppState,
    provider_ref: &str,
    now: DateTime<Utc>,
) -> AppResult<Payment> {
    let payment = find_by_provider_ref(state, provider_ref).await?;
    match state
        .store
        .transition_payment(payment.id, &PaymentTransition::fail(now))
        .await?
    {
        Some(updated) => {
            tracing::info!(payment_id = %updated.id, "Payment failed");
            write_audit_log(
                state,
                None,
                "fail",
                "payments",
                updated.id,
                snapshot(&payment),
                snapshot(&updated),
                now,
            )
            .await;
            Ok(updated)
        }
        None => state.store.get_payment(payment.id).await,
    }
}

pub async fn refund_from_webhook(
    state: &AppState,
    provider_ref: &str,
    now: DateTime<Utc>,
) -> AppResult<Payment> {
    let payment = find_by_provider_ref(state, provider_ref).await?;
    let Some(updated) = state
        .store
        .transition_payment(payment.id, &PaymentTransition::refund(now))
        .await?
    else {
        return state.store.get_payment(payment.id).await;
    };

    tracing::info!(payment_id = %updated.id, invoice_id = %updated.invoice_id, "Payment refunded");
    write_audit_log(
        state,
        None,
        "refund",
        "payments",
        updated.id,
        snapshot(&payment),
        snapshot(&updated),
        now,
    )
    .await;
    recompute_status(state, updated.invoice_id, now).await?;
    Ok(updated)
}

async fn find_by_provider_ref(state: &AppState, provider_ref: &str) -> AppResult<Payment> {
    state
        .store
        .find_payment_by_provider_ref(provider_ref)
        .await?
        .ok_or_else(|| {
            AppError::NotFound(format!("No payment found for provider reference {provider_ref}."))
        })
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WebhookOutcome {
    Applied { event_type: String, payment: Payment },
    Ignored { event_type: String },
}

/// Dispatches a provider event. Unknown event types are acknowledged.
pub async fn handle_webhook_event(
    state: &AppState,
    event: &Value,
    now: DateTime<Utc>,
) -> AppResult<WebhookOutcome> {
    let event_type = event
        .get("type")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let object = event.pointer("/data/object");

    let intent_id = |key: &str| {
        object
            .and_then(|object| object.get(key))
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(ToOwned::to_owned)
            .ok_or_else(|| {
                AppError::Validation(format!("Webhook event is missing data.object.{key}."))
            })
    };

    let payment = match event_type.as_str() {
        "payment_intent.succeeded" => confirm_from_webhook(state, &intent_id("id")?, now).await?,
        "payment_intent.payment_failed" => fail_from_webhook(state, &intent_id("id")?, now).await?,
        "charge.refunded" => {
            refund_from_webhook(state, &intent_id("payment_intent")?, now).await?
        }
        _ => {
            tracing::debug!(event_type = %event_type, "Ignoring webhook event");
            return Ok(WebhookOutcome::Ignored { event_type });
        }
    };
    Ok(WebhookOutcome::Applied {
        event_type,
        payment,
    })
}

pub async fn list_for_invoice(
    state: &AppState,
    user_id: Uuid,
    invoice_id: Uuid,
) -> AppResult<Vec<Payment>> {
    let invoice = state.store.get_invoice(invoice_id).await?;
    get_for_party(state, user_id, invoice.lease_id).await?;
    state.store.list_payments(invoice_id).await
}

/// Verify a Stripe webhook signature using HMAC-SHA256.
///
/// Parses the `Stripe-Signature` header (format: `t=<timestamp>,v1=<signature>`),
/// signs `<timestamp>.<body>` with the webhook secret and compares in
/// constant time. Signatures more than 5 minutes away from `now` are rejected.
pub fn verify_stripe_signature(
    payload: &str,
    signature_header: &str,
    webhook_secret: &str,
    now: DateTime<Utc>,
) -> bool {
    const TOLERANCE_SECS: i64 = 300;

    let mut timestamp: Option<&str> = None;
    let mut signatures: Vec<&str> = Vec::new();
    for part in signature_header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v1) = part.strip_prefix("v1=") {
            signatures.push(v1);
        }
    }

    let Some(ts_str) = timestamp else {
        return false;
    };
    let Ok(ts) = ts_str.parse::<i64>() else {
        return false;
    };
    let delta = (now.timestamp() - ts).abs();
    if delta > TOLERANCE_SECS {
        tracing::warn!(delta, "Stripe webhook signature outside tolerance");
        return false;
    }

    let signed_payload = format!("{ts_str}.{payload}");
    signatures.into_iter().any(|candidate| {
        let Ok(expected) = hex_decode(candidate) else {
            return false;
        };
        let Ok(mut mac) = HmacSha256::new_from_slice(webhook_secret.as_bytes()) else {
            return false;
        };
        mac.update(signed_payload.as_bytes());
        mac.verify_slice(&expected).is_ok()
    })
}

fn hex_decode(hex: &str) -> Result<Vec<u8>, ()> {
    if hex.len() % 2 != 0 || !hex.is_ascii() {
        return Err(());
    }
    (0..hex.len())
        .step_by(2)
        .map(|i| u8::from_str_radix(&hex[i..i + 2], 16).map_err(|_| ()))
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use chrono::{Duration, Utc};
    use hmac::Mac;
    use rust_decimal::Decimal;
    use rust_decimal_macros::dec;
    use serde_json::json;
    use uuid::Uuid;

    use super::{
        confirm_from_webhook, create, handle_webhook_event, verify_stripe_signature,
        HmacSha256, WebhookOutcome,
    };
    use crate::{
        domain::{InvoiceStatus, PaymentMethod, PaymentStatus},
        error::AppError,
        schemas::{CreateInvoiceInput, CreatePaymentInput},
        services::{invoices, testing::active_lease},
        state::testing,
    };

    pub(crate) fn sign(payload: &str, secret: &str, timestamp: i64) -> String {
        let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).expect("hmac");
        mac.update(format!("{timestamp}.{payload}").as_bytes());
        let digest = mac.finalize().into_bytes();
        let hex: String = digest.iter().map(|byte| format!("{byte:02x}")).collect();
        format!("t={timestamp},v1={hex}")
    }

    fn payment_input(invoice_id: Uuid, method: PaymentMethod) -> CreatePaymentInput {
        CreatePaymentInput {
            invoice_id,
            method,
            amount: None,
            provider_ref: None,
        }
    }

    #[test]
    fn verifies_fresh_signatures_only() {
        let now = Utc::now();
        let body = r#"{"type":"payment_intent.succeeded"}"#;
        let header = sign(body, "whsec_test", now.timestamp());
        assert!(verify_stripe_signature(body, &header, "whsec_test", now));
        assert!(!verify_stripe_signature(body, &header, "whsec_other", now));
        assert!(!verify_stripe_signature("{}", &header, "whsec_test", now));

        let stale = sign(body, "whsec_test", (now - Duration::minutes(10)).timestamp());
        assert!(!verify_stripe_signature(body, &stale, "whsec_test", now));
        assert!(!verify_stripe_signature(body, "v1=abcd", "whsec_test", now));
    }

    #[tokio::test]
    async fn only_the_tenant_pays_and_paid_invoices_reject_payments() {
        let (state, _) = testing::state();
        let landlord = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let (_, lease) = active_lease(&state, landlord, tenant).await;
        let invoice = invoices::create(
            &state,
            landlord,
            CreateInvoiceInput {
                lease_id: lease.id,
                due_date: None,
                line_items: vec![],
            },
            Utc::now(),
        )
        .await
        .expect("invoice");

        assert!(matches!(
            create(&state, landlord, payment_input(invoice.id, PaymentMethod::ManualCash), Utc::now())
                .await,
            Err(AppError::Forbidden(_))
        ));

        let partial = create(
            &state,
            tenant,
            CreatePaymentInput {
                amount: Some(dec!(400)),
                ..payment_input(invoice.id, PaymentMethod::ManualEtransfer)
            },
            Utc::now(),
        )
        .await
        .expect("partial");
        assert_eq!(partial.invoice.status, InvoiceStatus::PartiallyPaid);
        assert_eq!(partial.invoice.balance, dec!(600));

        let rest = create(&state, tenant, payment_input(invoice.id, PaymentMethod::ManualCash), Utc::now())
            .await
            .expect("rest");
        assert_eq!(rest.payment.amount, dec!(600));
        assert_eq!(rest.invoice.status, InvoiceStatus::Paid);
        assert_eq!(rest.invoice.balance, Decimal::ZERO);

        assert!(matches!(
            create(&state, tenant, payment_input(invoice.id, PaymentMethod::ManualCash), Utc::now())
                .await,
            Err(AppError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn stripe_payments_settle_through_webhooks_once() {
        let (state, _) = testing::state();
        let landlord = Uuid::new_v4();
        let tenant = Uuid::new_v4();
        let (_, lease) = active_lease(&state, landlord, tenant).await;
        let invoice = invoices::generate_next_month(&state, landlord, lease.id, Utc::now())
            .await
            .expect("invoice");

        let receipt = create(
            &state,
            tenant,
            CreatePaymentInput {
                provider_ref: Some("pi_3Nabc".to_string()),
                ..payment_input(invoice.id, PaymentMethod::Stripe)
            },
            Utc::now(),
        )
        .await
        .expect("stripe payment");
        assert_eq!(receipt.payment.status, PaymentStatus::Pending);
        assert_eq!(receipt.invoice.status, InvoiceStatus::Issued);

        let event = json!({
            "id": "evt_1",
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_3Nabc", "object": "payment_intent"}}
        });
        let outcome = handle_webhook_event(&state, &event, Utc::now())
            .await
            .expect("webhook");
        assert!(matches!(outcome, WebhookOutcome::Applied { .. }));
        let paid = state.store.get_invoice(invoice.id).await.expect("invoice");
        assert_eq!(paid.status, InvoiceStatus::Paid);

        let replay = confirm_from_webhook(&state, "pi_3Nabc", Utc::now())
            .await
            .expect("replay");
        assert_eq!(replay.status, PaymentStatus::Succeeded);
        let after_replay = state.store.get_invoice(invoice.id).await.expect("invoice");
        assert_eq!(after_replay, paid);

        let refund = json!({
            "type": "charge.refunded",
            "data": {"object": {"id": "ch_1", "payment_intent": "pi_3Nabc"}}
        });
        handle_webhook_event(&state, &refund, Utc::now())
            .await
            .expect("refund");
        let refunded = state.store.get_invoice(invoice.id).await.expect("invoice");
        assert_eq!(refunded.amount_paid, Decimal::ZERO);
        assert_eq!(refunded.status, InvoiceStatus::Issued);
    }

    #[tokio::test]
    async fn unknown_events_and_payments() {
        let (state, _) = testing::state();
        let ignored = handle_webhook_event(&state, &json!({"type": "customer.created"}), Utc::now())
            .await
            .expect("ignored");
        assert!(matches!(ignored, WebhookOutcome::Ignored { .. }));

        let missing = json!({
            "type": "payment_intent.succeeded",
            "data": {"object": {"id": "pi_missing"}}
        });
        assert!(matches!(
            handle_webhook_event(&state, &missing, Utc::now()).await,
            Err(AppError::NotFound(_))
        ));
    }
}

//! Stripe webhook signature verification, inbox dedup, and the
//! dispute-driven `PaymentStatus` transitions layered on top of it. PayPal's
//! webhook path is skipped here since its signature check is itself a live
//! API call with no local/offline verification scheme.

mod common;

use {
    common::{insert_company, service_with_fake, setup_pool, FakeProvider},
    gateway_orchestrator::domain::{
        payment::{PaymentStatus, RedirectInfo, RedirectMethod},
        provider::{CreateOutcome, ProviderName},
    },
    gateway_orchestrator::domain::id::Token,
    gateway_orchestrator::services::{payment_service::PaymentCreateRequest, webhook_router::WebhookRouter},
    hmac::{Hmac, Mac},
    rust_decimal_macros::dec,
    secrecy::SecretString,
    sha2::Sha256,
    std::sync::Arc,
};

type HmacSha256 = Hmac<Sha256>;

fn sign(secret: &str, body: &[u8], timestamp: i64) -> String {
    let mut signed_payload = format!("{timestamp}.").into_bytes();
    signed_payload.extend_from_slice(body);
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes()).unwrap();
    mac.update(&signed_payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}

fn router(pool: sqlx::PgPool, stripe_secret: &str) -> WebhookRouter {
    // `CHECKOUT.ORDER.APPROVED` drives a real `PaymentService::commit` call;
    // none of these tests exercise that path, so an empty registry is fine.
    let payment_service = service_with_fake(pool.clone(), Arc::new(FakeProvider::new(ProviderName::Stripe)), true);
    WebhookRouter::new(
        pool,
        payment_service,
        SecretString::from(stripe_secret.to_string()),
        "https://api-m.sandbox.paypal.com".to_string(),
        String::new(),
        SecretString::from(String::new()),
        String::new(),
    )
}

fn create_request(company_id: i64, company_token: &str, buy_order: &str) -> PaymentCreateRequest {
    PaymentCreateRequest {
        buy_order: buy_order.to_string(),
        amount: dec!(29.99),
        currency: "USD".to_string(),
        payment_type: "credit".to_string(),
        commerce_id: None,
        product_id: None,
        product_name: None,
        customer_rut: None,
        environment: Some("test".to_string()),
        return_url: "http://localhost:8000/api/payments/tbk/return".to_string(),
        success_url: None,
        failure_url: None,
        cancel_url: None,
        company_id,
        company_token: company_token.to_string(),
        provider: None,
        context: serde_json::json!({}),
    }
}

async fn seed_authorized_stripe_payment(
    pool: &sqlx::PgPool,
    company_id: i64,
    buy_order: &str,
    token: &str,
    payment_intent_id: &str,
) {
    let fake = Arc::new(FakeProvider::new(ProviderName::Stripe));
    *fake.create_result.lock().unwrap() = Some(Ok(CreateOutcome {
        redirect: RedirectInfo { url: String::new(), method: RedirectMethod::Get, form_fields: Default::default() },
        token: Token::new(token),
        provider_metadata: serde_json::json!({ "payment_intent_id": payment_intent_id }),
    }));
    let service = service_with_fake(pool.clone(), fake.clone(), true);
    let created = service.create(create_request(company_id, "s3cret", buy_order), None).await.unwrap();
    fake.set_commit_ok("auth-stripe-1");
    let committed = service.commit(&created.provider_token, None).await.unwrap();
    assert_eq!(committed.status, PaymentStatus::Authorized);
}

#[tokio::test]
async fn a_replayed_stripe_event_id_is_processed_only_once() {
    let pool = setup_pool("gateway_test_webhook_dedup").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;
    seed_authorized_stripe_payment(&pool, company_id, "order-wh-1", "cs_dedup_1", "pi_dedup_1").await;

    let secret = "whsec_test";
    let router = router(pool.clone(), secret);

    let body = serde_json::json!({
        "id": "evt_dedup_1",
        "type": "charge.dispute.created",
        "data": { "object": { "id": "dp_1", "payment_intent": "pi_dedup_1", "status": "warning_needs_response" } }
    })
    .to_string();
    let signature = sign(secret, body.as_bytes(), 1_700_000_000);

    router.handle_stripe(&signature, body.as_bytes()).await.unwrap();
    router.handle_stripe(&signature, body.as_bytes()).await.unwrap();

    let inbox_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webhook_inbox WHERE event_id = $1")
        .bind("evt_dedup_1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(inbox_rows, 1);

    let dispute_rows: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM dispute WHERE provider_dispute_id = $1")
        .bind("dp_1")
        .fetch_one(&pool)
        .await
        .unwrap();
    assert_eq!(dispute_rows, 1);
}

#[tokio::test]
async fn a_bad_signature_is_rejected_before_any_inbox_write() {
    let pool = setup_pool("gateway_test_webhook_bad_sig").await;
    let router = router(pool.clone(), "whsec_real");

    let body = serde_json::json!({"id": "evt_bad", "type": "charge.dispute.created", "data": {"object": {}}}).to_string();
    let signature = sign("whsec_wrong", body.as_bytes(), 1_700_000_000);

    let result = router.handle_stripe(&signature, body.as_bytes()).await;
    assert!(result.is_err());

    let inbox_rows: i64 =
        sqlx::query_scalar("SELECT COUNT(*) FROM webhook_inbox WHERE event_id = $1").bind("evt_bad").fetch_one(&pool).await.unwrap();
    assert_eq!(inbox_rows, 0);
}

#[tokio::test]
async fn dispute_created_fails_the_payment_and_dispute_closed_won_reauthorizes_it() {
    let pool = setup_pool("gateway_test_webhook_dispute_flow").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;
    seed_authorized_stripe_payment(&pool, company_id, "order-wh-2", "cs_dispute_1", "pi_dispute_1").await;

    let secret = "whsec_flow";
    let router = router(pool.clone(), secret);

    let created_body = serde_json::json!({
        "id": "evt_dispute_created",
        "type": "charge.dispute.created",
        "data": { "object": { "id": "dp_2", "payment_intent": "pi_dispute_1", "status": "warning_needs_response" } }
    })
    .to_string();
    let sig = sign(secret, created_body.as_bytes(), 1_700_000_100);
    router.handle_stripe(&sig, created_body.as_bytes()).await.unwrap();

    let status: String = sqlx::query_scalar(
        "SELECT p.status FROM payment p WHERE p.provider = 'stripe' AND p.token = 'cs_dispute_1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "FAILED");

    let closed_body = serde_json::json!({
        "id": "evt_dispute_closed",
        "type": "charge.dispute.closed",
        "data": { "object": { "id": "dp_2", "payment_intent": "pi_dispute_1", "status": "won" } }
    })
    .to_string();
    let sig = sign(secret, closed_body.as_bytes(), 1_700_000_200);
    router.handle_stripe(&sig, closed_body.as_bytes()).await.unwrap();

    let status: String = sqlx::query_scalar(
        "SELECT p.status FROM payment p WHERE p.provider = 'stripe' AND p.token = 'cs_dispute_1'",
    )
    .fetch_one(&pool)
    .await
    .unwrap();
    assert_eq!(status, "AUTHORIZED");

    let dispute_status: String =
        sqlx::query_scalar("SELECT status FROM dispute WHERE provider_dispute_id = 'dp_2'").fetch_one(&pool).await.unwrap();
    assert_eq!(dispute_status, "RESOLVED");
}

#[tokio::test]
async fn a_routing_failure_does_not_surface_as_an_error_to_the_transport_layer() {
    // No matching payment exists for this payment_intent, so `route_stripe_event`
    // finds nothing to do — `handle_stripe` must still return `Ok(())`.
    let pool = setup_pool("gateway_test_webhook_orphan_event").await;
    let secret = "whsec_orphan";
    let router = router(pool.clone(), secret);

    let body = serde_json::json!({
        "id": "evt_orphan",
        "type": "charge.dispute.created",
        "data": { "object": { "id": "dp_orphan", "payment_intent": "pi_does_not_exist", "status": "warning_needs_response" } }
    })
    .to_string();
    let signature = sign(secret, body.as_bytes(), 1_700_000_300);

    router.handle_stripe(&signature, body.as_bytes()).await.unwrap();
}

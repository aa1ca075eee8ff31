//! `Idempotency-Key` replay behaviour: a repeated `create` call for the same
//! company and key must return the original payment without touching the
//! provider a second time.

mod common;

use {
    common::{insert_company, service_with_fake, setup_pool, FakeProvider},
    gateway_orchestrator::domain::provider::ProviderName,
    gateway_orchestrator::services::payment_service::PaymentCreateRequest,
    rust_decimal_macros::dec,
    std::sync::Arc,
};

fn create_request(company_id: i64, company_token: &str, buy_order: &str) -> PaymentCreateRequest {
    PaymentCreateRequest {
        buy_order: buy_order.to_string(),
        amount: dec!(1000),
        currency: "CLP".to_string(),
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

#[tokio::test]
async fn replaying_the_same_idempotency_key_returns_the_original_payment() {
    let pool = setup_pool("gateway_test_idempotency_replay").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    // Only one scripted `create` outcome: if the service called the
    // provider twice, the second `create` would panic on an empty slot.
    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_once"));
    let service = service_with_fake(pool.clone(), fake, true);

    let first = service
        .create(create_request(company_id, "s3cret", "order-a"), Some("idem-key-1".to_string()))
        .await
        .unwrap();
    let second = service
        .create(create_request(company_id, "s3cret", "order-a"), Some("idem-key-1".to_string()))
        .await
        .unwrap();

    assert_eq!(first.internal_id, second.internal_id);
    assert_eq!(first.provider_token, second.provider_token);
}

#[tokio::test]
async fn distinct_idempotency_keys_create_distinct_payments() {
    let pool = setup_pool("gateway_test_idempotency_distinct").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_x"));
    let service = service_with_fake(pool.clone(), fake.clone(), true);
    let first = service
        .create(create_request(company_id, "s3cret", "order-b"), Some("idem-key-x".to_string()))
        .await
        .unwrap();

    fake.create_result.lock().unwrap().replace(Ok(gateway_orchestrator::domain::provider::CreateOutcome {
        redirect: gateway_orchestrator::domain::payment::RedirectInfo {
            url: "https://fake.example/tok_y".to_string(),
            method: gateway_orchestrator::domain::payment::RedirectMethod::Get,
            form_fields: Default::default(),
        },
        token: gateway_orchestrator::domain::id::Token::new("tok_y"),
        provider_metadata: serde_json::json!({}),
    }));
    let second = service
        .create(create_request(company_id, "s3cret", "order-c"), Some("idem-key-y".to_string()))
        .await
        .unwrap();

    assert_ne!(first.internal_id, second.internal_id);
    assert_ne!(first.provider_token, second.provider_token);
}

#[tokio::test]
async fn empty_idempotency_key_never_dedups() {
    let pool = setup_pool("gateway_test_idempotency_empty").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_e1"));
    let service = service_with_fake(pool.clone(), fake.clone(), true);
    let first = service
        .create(create_request(company_id, "s3cret", "order-d"), Some(String::new()))
        .await
        .unwrap();

    fake.create_result.lock().unwrap().replace(Ok(gateway_orchestrator::domain::provider::CreateOutcome {
        redirect: gateway_orchestrator::domain::payment::RedirectInfo {
            url: "https://fake.example/tok_e2".to_string(),
            method: gateway_orchestrator::domain::payment::RedirectMethod::Get,
            form_fields: Default::default(),
        },
        token: gateway_orchestrator::domain::id::Token::new("tok_e2"),
        provider_metadata: serde_json::json!({}),
    }));
    let second = service
        .create(create_request(company_id, "s3cret", "order-e"), Some(String::new()))
        .await
        .unwrap();

    assert_ne!(first.internal_id, second.internal_id);
}

//! End-to-end create -> commit -> refund flow against a real Postgres
//! instance, with a scripted provider standing in for Webpay.

mod common;

use {
    common::{insert_company, service_with_fake, setup_pool, FakeProvider},
    gateway_orchestrator::domain::{payment::PaymentStatus, provider::ProviderName},
    gateway_orchestrator::services::payment_service::PaymentCreateRequest,
    rust_decimal_macros::dec,
    std::sync::Arc,
};

fn create_request(company_id: i64, company_token: &str, buy_order: &str) -> PaymentCreateRequest {
    PaymentCreateRequest {
        buy_order: buy_order.to_string(),
        amount: dec!(4990),
        currency: "CLP".to_string(),
        payment_type: "credit".to_string(),
        commerce_id: None,
        product_id: None,
        product_name: None,
        customer_rut: None,
        environment: Some("test".to_string()),
        return_url: "http://localhost:8000/api/payments/tbk/return".to_string(),
        success_url: Some("http://merchant.example/success".to_string()),
        failure_url: Some("http://merchant.example/failure".to_string()),
        cancel_url: Some("http://merchant.example/cancel".to_string()),
        company_id,
        company_token: company_token.to_string(),
        provider: None,
        context: serde_json::json!({}),
    }
}

#[tokio::test]
async fn create_then_commit_authorizes_the_payment() {
    let pool = setup_pool("gateway_test_lifecycle_commit").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_1"));
    let service = service_with_fake(pool.clone(), fake.clone(), true);

    let created = service.create(create_request(company_id, "s3cret", "order-1"), None).await.unwrap();
    assert_eq!(created.status, PaymentStatus::Pending);

    fake.set_commit_ok("auth-123");
    let committed = service.commit(&created.provider_token, None).await.unwrap();
    assert_eq!(committed.status, PaymentStatus::Authorized);
    assert_eq!(committed.authorization_code.as_deref(), Some("auth-123"));
    assert!(committed.first_authorized_at.is_some());
}

#[tokio::test]
async fn failed_commit_marks_the_payment_failed_not_authorized() {
    let pool = setup_pool("gateway_test_lifecycle_fail").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_2"));
    let service = service_with_fake(pool.clone(), fake.clone(), true);

    let created = service.create(create_request(company_id, "s3cret", "order-2"), None).await.unwrap();
    fake.set_commit_failed();
    let committed = service.commit(&created.provider_token, None).await.unwrap();
    assert_eq!(committed.status, PaymentStatus::Failed);
    assert!(committed.first_authorized_at.is_none());
}

#[tokio::test]
async fn refund_after_authorization_moves_payment_to_refunded() {
    let pool = setup_pool("gateway_test_lifecycle_refund").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_3"));
    let service = service_with_fake(pool.clone(), fake.clone(), true);

    let created = service.create(create_request(company_id, "s3cret", "order-3"), None).await.unwrap();
    fake.set_commit_ok("auth-456");
    service.commit(&created.provider_token, None).await.unwrap();

    fake.set_refund_ok(gateway_orchestrator::domain::money::Money::new(dec!(4990), gateway_orchestrator::domain::money::Currency::Clp).unwrap());
    let (payment, refund) = service.refund(&created.provider_token, None, company_id, "s3cret").await.unwrap();
    assert_eq!(payment.status, PaymentStatus::Refunded);
    assert_eq!(refund.status, gateway_orchestrator::domain::refund::RefundStatus::Succeeded);
    assert!(refund.confirmed_at.is_some());
}

#[tokio::test]
async fn refund_rejects_amount_exceeding_the_payment() {
    let pool = setup_pool("gateway_test_lifecycle_overrefund").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_4"));
    let service = service_with_fake(pool.clone(), fake.clone(), true);

    let created = service.create(create_request(company_id, "s3cret", "order-4"), None).await.unwrap();
    fake.set_commit_ok("auth-789");
    service.commit(&created.provider_token, None).await.unwrap();

    let result = service.refund(&created.provider_token, Some(dec!(99999)), company_id, "s3cret").await;
    assert!(result.is_err());
}

#[tokio::test]
async fn refund_requires_the_requesting_company_to_own_the_payment() {
    let pool = setup_pool("gateway_test_lifecycle_tenancy").await;
    let owner_id = insert_company(&pool, "Owner", "owner-token").await;
    let other_id = insert_company(&pool, "Intruder", "intruder-token").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay).with_default_create("tok_5"));
    let service = service_with_fake(pool.clone(), fake.clone(), true);

    let created = service.create(create_request(owner_id, "owner-token", "order-5"), None).await.unwrap();
    fake.set_commit_ok("auth-999");
    service.commit(&created.provider_token, None).await.unwrap();

    let result = service.refund(&created.provider_token, None, other_id, "intruder-token").await;
    assert!(matches!(result, Err(gateway_orchestrator::domain::error::GatewayError::Forbidden)));
}

#[tokio::test]
async fn create_rejects_a_non_clp_currency_for_webpay() {
    let pool = setup_pool("gateway_test_lifecycle_currency").await;
    let company_id = insert_company(&pool, "Acme", "s3cret").await;

    let fake = Arc::new(FakeProvider::new(ProviderName::Webpay));
    let service = service_with_fake(pool.clone(), fake, true);

    let mut req = create_request(company_id, "s3cret", "order-6");
    req.currency = "USD".to_string();
    let result = service.create(req, None).await;
    assert!(result.is_err());
}

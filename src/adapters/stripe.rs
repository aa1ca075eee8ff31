use {
    super::{ProviderEventLogger, mask_headers},
    crate::domain::{
        error::GatewayError,
        id::Token,
        money::{Currency, Money},
        payment::{NewPayment, PaymentStatus, RedirectInfo, RedirectMethod},
        provider::{CommitOutcome, CreateOutcome, ProviderName, ProviderPort, RefundOutcome},
    },
    async_trait::async_trait,
    secrecy::{ExposeSecret, SecretString},
    std::time::Instant,
};

const STRIPE_API_BASE: &str = "https://api.stripe.com/v1";

/// Stripe hosted Checkout, driven directly over its REST API (form-encoded
/// requests, bearer auth with the secret key) rather than the official SDK —
/// commit is a session poll, not a push, so no webhook-event typed client is
/// needed on this path; webhook signature verification lives in
/// `services::webhook_router`.
pub struct StripeAdapter {
    client: reqwest::Client,
    secret_key: SecretString,
    logger: ProviderEventLogger,
}

impl StripeAdapter {
    pub fn new(secret_key: SecretString, logger: ProviderEventLogger) -> Self {
        Self { client: reqwest::Client::new(), secret_key, logger }
    }

    fn auth_header(&self) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::AUTHORIZATION,
            format!("Bearer {}", self.secret_key.expose_secret()).parse().unwrap(),
        );
        headers
    }
}

#[async_trait]
impl ProviderPort for StripeAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::Stripe
    }

    async fn create(&self, payment: &NewPayment, _return_url: &str) -> Result<CreateOutcome, GatewayError> {
        let url = format!("{STRIPE_API_BASE}/checkout/sessions");
        let mut form = vec![
            ("mode".to_string(), "payment".to_string()),
            ("line_items[0][quantity]".to_string(), "1".to_string()),
            ("line_items[0][price_data][currency]".to_string(), payment.amount.currency().as_str().to_lowercase()),
            ("line_items[0][price_data][product_data][name]".to_string(), payment.buy_order.as_str().to_string()),
            ("line_items[0][price_data][unit_amount]".to_string(), payment.amount.to_minor_units().to_string()),
            ("metadata[buy_order]".to_string(), payment.buy_order.as_str().to_string()),
            ("metadata[company_id]".to_string(), payment.company_id.to_string()),
        ];
        if let Some(success) = &payment.success_url {
            form.push(("success_url".to_string(), success.clone()));
        }
        if let Some(cancel) = &payment.cancel_url {
            form.push(("cancel_url".to_string(), cancel.clone()));
        }

        let headers = self.auth_header();
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .headers(headers.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("stripe create request failed: {e}")))?;
        let status = response.status();
        let response_headers = mask_headers(response.headers());
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        let request_body = serde_json::to_value(&form).unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            let message = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(|v| v.as_str())
                .unwrap_or("stripe checkout session create failed")
                .to_string();
            self.logger
                .log(
                    None,
                    ProviderName::Stripe,
                    crate::domain::provider_event::EventOperation::Create,
                    &url,
                    mask_headers(&headers),
                    request_body,
                    Some(status.as_u16() as i32),
                    response_headers,
                    body,
                    Some(message.clone()),
                    started,
                )
                .await;
            return Err(GatewayError::provider(message));
        }

        let session_id = body.get("id").and_then(|v| v.as_str()).ok_or_else(|| {
            GatewayError::provider("stripe create response missing session id")
        })?;
        let checkout_url = body.get("url").and_then(|v| v.as_str()).ok_or_else(|| {
            GatewayError::provider("stripe create response missing url")
        })?;

        self.logger
            .log(
                None,
                ProviderName::Stripe,
                crate::domain::provider_event::EventOperation::Create,
                &url,
                mask_headers(&headers),
                request_body,
                Some(status.as_u16() as i32),
                response_headers,
                body.clone(),
                None,
                started,
            )
            .await;

        Ok(CreateOutcome {
            redirect: RedirectInfo {
                url: checkout_url.to_string(),
                method: RedirectMethod::Get,
                form_fields: std::collections::BTreeMap::new(),
            },
            token: Token::new(session_id),
            provider_metadata: serde_json::json!({
                "checkout_session_id": session_id,
                "buy_order": payment.buy_order.as_str(),
            }),
        })
    }

    async fn commit(&self, token: &Token) -> Result<CommitOutcome, GatewayError> {
        let url = format!("{STRIPE_API_BASE}/checkout/sessions/{}?expand[]=payment_intent", token.as_str());
        let headers = self.auth_header();
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("stripe session retrieve failed: {e}")))?;
        let status = response.status();
        let response_headers = mask_headers(response.headers());
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        let payment_intent = body.get("payment_intent");
        let intent_status = payment_intent.and_then(|pi| pi.get("status")).and_then(|v| v.as_str());
        let session_payment_status = body.get("payment_status").and_then(|v| v.as_str());
        let succeeded = intent_status == Some("succeeded") || session_payment_status == Some("paid");

        let payment_intent_id = payment_intent.and_then(|pi| pi.get("id")).and_then(|v| v.as_str()).map(str::to_string);
        let charge_id = payment_intent
            .and_then(|pi| pi.get("latest_charge"))
            .and_then(|v| v.as_str())
            .map(str::to_string);
        let authorization_code = charge_id.clone().or_else(|| payment_intent_id.clone());

        self.logger
            .log(
                None,
                ProviderName::Stripe,
                crate::domain::provider_event::EventOperation::Commit,
                &url,
                mask_headers(&headers),
                serde_json::Value::Null,
                Some(status.as_u16() as i32),
                response_headers,
                body.clone(),
                None,
                started,
            )
            .await;

        Ok(CommitOutcome {
            response_code: if succeeded { 0 } else { 1 },
            authorization_code,
            payment_intent_id: payment_intent_id.clone(),
            charge_id,
            status_reason: intent_status.map(str::to_string),
            provider_metadata: serde_json::json!({
                "payment_intent_id": payment_intent_id,
                "payment_intent_status": intent_status,
                "customer_email": body.get("customer_details").and_then(|c| c.get("email")),
            }),
        })
    }

    async fn status(&self, token: &Token) -> Result<Option<PaymentStatus>, GatewayError> {
        let url = format!("{STRIPE_API_BASE}/checkout/sessions/{}?expand[]=payment_intent", token.as_str());
        let headers = self.auth_header();
        let started = Instant::now();

        let response = self
            .client
            .get(&url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("stripe session retrieve failed: {e}")))?;
        let status = response.status();
        let response_headers = mask_headers(response.headers());
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        let intent_status = body.get("payment_intent").and_then(|pi| pi.get("status")).and_then(|v| v.as_str());
        let session_payment_status = body.get("payment_status").and_then(|v| v.as_str());
        let succeeded = intent_status == Some("succeeded") || session_payment_status == Some("paid");

        self.logger
            .log(
                None,
                ProviderName::Stripe,
                crate::domain::provider_event::EventOperation::Status,
                &url,
                mask_headers(&headers),
                serde_json::Value::Null,
                Some(status.as_u16() as i32),
                response_headers,
                body,
                None,
                started,
            )
            .await;

        Ok(Some(if succeeded { PaymentStatus::Authorized } else { PaymentStatus::Pending }))
    }

    async fn refund(&self, token: &Token, amount: Option<Money>) -> Result<RefundOutcome, GatewayError> {
        // token here is the checkout session id; resolve to payment_intent first.
        let commit_outcome = self.commit(token).await?;
        let payment_intent_id = commit_outcome.payment_intent_id.ok_or_else(|| {
            GatewayError::provider("stripe refund requires a captured payment_intent")
        })?;

        let url = format!("{STRIPE_API_BASE}/refunds");
        let mut form = vec![("payment_intent".to_string(), payment_intent_id)];
        if let Some(amount) = amount {
            form.push(("amount".to_string(), amount.to_minor_units().to_string()));
        }

        let headers = self.auth_header();
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .headers(headers.clone())
            .form(&form)
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("stripe refund request failed: {e}")))?;
        let status = response.status();
        let response_headers = mask_headers(response.headers());
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        let request_body = serde_json::to_value(&form).unwrap_or(serde_json::Value::Null);

        let refund_status = body.get("status").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let ok = matches!(refund_status.as_str(), "succeeded" | "pending");
        let refunded_amount = body
            .get("amount")
            .and_then(|v| v.as_i64())
            .and_then(|minor| Money::from_minor_units(minor, amount.map(|a| a.currency()).unwrap_or(Currency::Usd)).ok());

        self.logger
            .log(
                None,
                ProviderName::Stripe,
                crate::domain::provider_event::EventOperation::Refund,
                &url,
                mask_headers(&headers),
                request_body,
                Some(status.as_u16() as i32),
                response_headers,
                body.clone(),
                if ok { None } else { Some("stripe refund not accepted".to_string()) },
                started,
            )
            .await;

        Ok(RefundOutcome {
            ok,
            amount: refunded_amount.or(amount),
            provider_refund_id: body.get("id").and_then(|v| v.as_str()).map(str::to_string),
            status: refund_status,
            payload: body,
            error: if ok { None } else { Some("stripe refund not accepted".to_string()) },
        })
    }
}

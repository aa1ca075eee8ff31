use {
    super::{ProviderEventLogger, mask_headers},
    crate::domain::{
        error::GatewayError,
        id::Token,
        money::Money,
        payment::{NewPayment, PaymentStatus, RedirectInfo, RedirectMethod},
        provider::{CommitOutcome, CreateOutcome, ProviderName, ProviderPort, RefundOutcome},
    },
    async_trait::async_trait,
    secrecy::{ExposeSecret, SecretString},
    std::time::Instant,
};

/// PayPal Orders v2: `create` opens an order with intent CAPTURE, `commit`
/// captures it, `status`/`refund` both need a fresh OAuth2 client-credentials
/// token since PayPal tokens are short-lived and this adapter holds no token
/// cache across requests.
pub struct PaypalAdapter {
    client: reqwest::Client,
    base_url: String,
    client_id: String,
    client_secret: SecretString,
    logger: ProviderEventLogger,
}

impl PaypalAdapter {
    pub fn new(base_url: String, client_id: String, client_secret: SecretString, logger: ProviderEventLogger) -> Self {
        Self { client: reqwest::Client::new(), base_url, client_id, client_secret, logger }
    }

    async fn access_token(&self) -> Result<String, GatewayError> {
        let url = format!("{}/v1/oauth2/token", self.base_url);
        let response = self
            .client
            .post(&url)
            .basic_auth(&self.client_id, Some(self.client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal oauth request failed: {e}")))?;
        if !response.status().is_success() {
            return Err(GatewayError::provider("paypal oauth token request rejected"));
        }
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal oauth response malformed: {e}")))?;
        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::provider("paypal oauth response missing access_token"))
    }

    fn auth_headers(token: &str) -> reqwest::header::HeaderMap {
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(reqwest::header::AUTHORIZATION, format!("Bearer {token}").parse().unwrap());
        headers.insert(reqwest::header::CONTENT_TYPE, "application/json".parse().unwrap());
        headers
    }
}

#[async_trait]
impl ProviderPort for PaypalAdapter {
    fn name(&self) -> ProviderName {
        ProviderName::Paypal
    }

    async fn create(&self, payment: &NewPayment, return_url: &str) -> Result<CreateOutcome, GatewayError> {
        let access_token = self.access_token().await?;
        let cancel_url = payment.cancel_url.clone().unwrap_or_else(|| return_url.to_string());
        let payload = serde_json::json!({
            "intent": "CAPTURE",
            "purchase_units": [{
                "reference_id": payment.buy_order.as_str(),
                "amount": {
                    "currency_code": payment.amount.currency().as_str(),
                    "value": payment.amount.format_for_paypal(),
                },
            }],
            "application_context": {
                "return_url": return_url,
                "cancel_url": cancel_url,
                "user_action": "PAY_NOW",
            },
        });

        let url = format!("{}/v2/checkout/orders", self.base_url);
        let headers = Self::auth_headers(&access_token);
        let started = Instant::now();
        let response = self
            .client
            .post(&url)
            .headers(headers.clone())
            .json(&payload)
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal order create failed: {e}")))?;
        let status = response.status();
        let response_headers = mask_headers(response.headers());
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            self.logger
                .log(
                    None,
                    ProviderName::Paypal,
                    crate::domain::provider_event::EventOperation::Create,
                    &url,
                    mask_headers(&headers),
                    payload,
                    Some(status.as_u16() as i32),
                    response_headers,
                    body.clone(),
                    Some("paypal order create failed".to_string()),
                    started,
                )
                .await;
            return Err(GatewayError::provider(format!("paypal create error: {body}")));
        }

        let order_id = body.get("id").and_then(|v| v.as_str()).ok_or_else(|| {
            GatewayError::provider("paypal create response missing order id")
        })?.to_string();
        let approve_url = body
            .get("links")
            .and_then(|v| v.as_array())
            .and_then(|links| links.iter().find(|l| l.get("rel").and_then(|r| r.as_str()) == Some("approve")))
            .and_then(|l| l.get("href"))
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::provider("paypal approve url not found"))?
            .to_string();

        self.logger
            .log(
                None,
                ProviderName::Paypal,
                crate::domain::provider_event::EventOperation::Create,
                &url,
                mask_headers(&headers),
                payload,
                Some(status.as_u16() as i32),
                response_headers,
                body,
                None,
                started,
            )
            .await;

        Ok(CreateOutcome {
            redirect: RedirectInfo {
                url: approve_url.to_string(),
                method: RedirectMethod::Get,
                form_fields: std::collections::BTreeMap::new(),
            },
            token: Token::new(order_id.clone()),
            provider_metadata: serde_json::json!({"order_id": order_id}),
        })
    }

    async fn commit(&self, token: &Token) -> Result<CommitOutcome, GatewayError> {
        let access_token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders/{}/capture", self.base_url, token.as_str());
        let headers = Self::auth_headers(&access_token);
        let started = Instant::now();

        let response = self
            .client
            .post(&url)
            .headers(headers.clone())
            .json(&serde_json::json!({}))
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal capture request failed: {e}")))?;
        let status = response.status();
        let response_headers = mask_headers(response.headers());
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        let order_status = body.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let response_code = if order_status == "COMPLETED" { 0 } else { -1 };

        let capture = body
            .get("purchase_units")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|pu| pu.get("payments"))
            .and_then(|p| p.get("captures"))
            .and_then(|c| c.as_array())
            .and_then(|arr| arr.first());
        let charge_id = capture.and_then(|c| c.get("id")).and_then(|v| v.as_str()).map(str::to_string);

        self.logger
            .log(
                None,
                ProviderName::Paypal,
                crate::domain::provider_event::EventOperation::Commit,
                &url,
                mask_headers(&headers),
                serde_json::json!({}),
                Some(status.as_u16() as i32),
                response_headers,
                body.clone(),
                if response_code == 0 { None } else { Some("paypal capture not completed".to_string()) },
                started,
            )
            .await;

        Ok(CommitOutcome {
            response_code,
            authorization_code: charge_id.clone(),
            payment_intent_id: None,
            charge_id,
            status_reason: Some(order_status.to_string()),
            provider_metadata: serde_json::json!({"order_status": order_status}),
        })
    }

    async fn status(&self, token: &Token) -> Result<Option<PaymentStatus>, GatewayError> {
        let access_token = self.access_token().await?;
        let url = format!("{}/v2/checkout/orders/{}", self.base_url, token.as_str());
        let headers = Self::auth_headers(&access_token);
        let started = Instant::now();

        let response = match self.client.get(&url).headers(headers.clone()).send().await {
            Ok(r) => r,
            Err(e) => {
                self.logger
                    .log(
                        None,
                        ProviderName::Paypal,
                        crate::domain::provider_event::EventOperation::Status,
                        &url,
                        mask_headers(&headers),
                        serde_json::Value::Null,
                        None,
                        serde_json::json!({}),
                        serde_json::Value::Null,
                        Some(e.to_string()),
                        started,
                    )
                    .await;
                return Ok(None);
            }
        };
        let status_code = response.status();
        if !status_code.is_success() {
            return Ok(None);
        }
        let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        let order_status = body.get("status").and_then(|v| v.as_str()).unwrap_or("").to_string();

        let captures = body
            .get("purchase_units")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|pu| pu.get("payments"))
            .and_then(|p| p.get("captures"))
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();
        let capture_refunded = captures.iter().any(|c| {
            matches!(c.get("status").and_then(|v| v.as_str()), Some("REFUNDED") | Some("PARTIALLY_REFUNDED"))
        });

        self.logger
            .log(
                None,
                ProviderName::Paypal,
                crate::domain::provider_event::EventOperation::Status,
                &url,
                mask_headers(&headers),
                serde_json::Value::Null,
                Some(status_code.as_u16() as i32),
                serde_json::json!({}),
                body,
                None,
                started,
            )
            .await;

        Ok(Some(if capture_refunded {
            PaymentStatus::Refunded
        } else {
            match order_status.as_str() {
                "COMPLETED" => PaymentStatus::Authorized,
                "VOIDED" | "CANCELLED" => PaymentStatus::Canceled,
                _ => PaymentStatus::Pending,
            }
        }))
    }

    async fn refund(&self, token: &Token, amount: Option<Money>) -> Result<RefundOutcome, GatewayError> {
        let access_token = self.access_token().await?;
        let order_url = format!("{}/v2/checkout/orders/{}", self.base_url, token.as_str());
        let headers = Self::auth_headers(&access_token);
        let started = Instant::now();

        let order_response = self
            .client
            .get(&order_url)
            .headers(headers.clone())
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal refund order fetch failed: {e}")))?;
        if !order_response.status().is_success() {
            return Ok(RefundOutcome {
                ok: false,
                amount,
                provider_refund_id: None,
                status: "ORDER_FETCH_FAILED".to_string(),
                payload: serde_json::Value::Null,
                error: Some("order fetch failed".to_string()),
            });
        }
        let order: serde_json::Value = order_response.json().await.unwrap_or(serde_json::Value::Null);
        self.logger
            .log(
                None,
                ProviderName::Paypal,
                crate::domain::provider_event::EventOperation::Status,
                &order_url,
                mask_headers(&headers),
                serde_json::Value::Null,
                Some(200),
                serde_json::json!({}),
                order.clone(),
                None,
                started,
            )
            .await;

        let captures = order
            .get("purchase_units")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|pu| pu.get("payments"))
            .and_then(|p| p.get("captures"))
            .and_then(|c| c.as_array())
            .cloned()
            .unwrap_or_default();
        if captures.is_empty() {
            return Ok(RefundOutcome {
                ok: false,
                amount,
                provider_refund_id: None,
                status: "NO_CAPTURES".to_string(),
                payload: serde_json::Value::Null,
                error: Some("no captures available for refund".to_string()),
            });
        }
        // Prefer the latest COMPLETED capture; otherwise the last one seen.
        let capture = captures
            .iter()
            .rev()
            .find(|c| c.get("status").and_then(|v| v.as_str()) == Some("COMPLETED"))
            .or_else(|| captures.last())
            .unwrap();
        let Some(capture_id) = capture.get("id").and_then(|v| v.as_str()) else {
            return Ok(RefundOutcome {
                ok: false,
                amount,
                provider_refund_id: None,
                status: "CAPTURE_MISSING".to_string(),
                payload: serde_json::Value::Null,
                error: Some("capture id missing".to_string()),
            });
        };

        let refund_url = format!("{}/v2/payments/captures/{capture_id}/refund", self.base_url);
        let body = match amount {
            Some(amount) => serde_json::json!({
                "amount": {"currency_code": amount.currency().as_str(), "value": amount.format_for_paypal()},
            }),
            None => serde_json::json!({}),
        };

        let started_refund = Instant::now();
        let response = self
            .client
            .post(&refund_url)
            .headers(headers.clone())
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal refund request failed: {e}")))?;
        let status = response.status();
        let response_headers = mask_headers(response.headers());
        let response_body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);

        if !status.is_success() {
            self.logger
                .log(
                    None,
                    ProviderName::Paypal,
                    crate::domain::provider_event::EventOperation::Refund,
                    &refund_url,
                    mask_headers(&headers),
                    body,
                    Some(status.as_u16() as i32),
                    response_headers,
                    response_body.clone(),
                    Some("refund failed".to_string()),
                    started_refund,
                )
                .await;
            return Ok(RefundOutcome {
                ok: false,
                amount,
                provider_refund_id: None,
                status: "FAILED".to_string(),
                payload: response_body,
                error: Some("refund failed".to_string()),
            });
        }

        let refund_status = response_body.get("status").and_then(|v| v.as_str()).unwrap_or("").to_string();
        let ok = matches!(refund_status.as_str(), "COMPLETED" | "PENDING");

        self.logger
            .log(
                None,
                ProviderName::Paypal,
                crate::domain::provider_event::EventOperation::Refund,
                &refund_url,
                mask_headers(&headers),
                body,
                Some(status.as_u16() as i32),
                response_headers,
                response_body.clone(),
                if ok { None } else { Some("refund not accepted".to_string()) },
                started_refund,
            )
            .await;

        Ok(RefundOutcome {
            ok,
            amount,
            provider_refund_id: response_body.get("id").and_then(|v| v.as_str()).map(str::to_string),
            status: refund_status,
            payload: response_body,
            error: if ok { None } else { Some("refund not accepted".to_string()) },
        })
    }
}

use {
    crate::domain::{
        dispute::{DisputeStatus, NewDispute},
        error::GatewayError,
        id::Token,
        money::Money,
        payment::{decide_transition, PaymentStatus},
        provider::ProviderName,
        refund::{NewRefund, RefundStatus},
        webhook_inbox::{NewWebhookInboxEntry, VerificationStatus},
    },
    crate::infra::postgres::{dispute_repo, payment_repo, refund_repo, webhook_inbox_repo},
    crate::services::payment_service::PaymentService,
    hmac::{Hmac, Mac},
    secrecy::{ExposeSecret, SecretString},
    sha2::Sha256,
    sqlx::PgPool,
    subtle::ConstantTimeEq,
};

type HmacSha256 = Hmac<Sha256>;

/// Headers PayPal signs over; lifted out of axum's `HeaderMap` by the
/// transport layer so this module stays framework-agnostic.
#[derive(Debug, Clone)]
pub struct PaypalSignatureHeaders {
    pub auth_algo: String,
    pub cert_url: String,
    pub transmission_id: String,
    pub transmission_sig: String,
    pub transmission_time: String,
}

/// Verifies and dispatches inbound provider webhooks. Stripe's signature is
/// checked locally (HMAC over `{timestamp}.{body}`); PayPal has no local
/// verification scheme, so its signature check is itself an API call.
#[derive(Clone)]
pub struct WebhookRouter {
    pool: PgPool,
    payment_service: PaymentService,
    stripe_webhook_secret: SecretString,
    paypal_client: reqwest::Client,
    paypal_base_url: String,
    paypal_client_id: String,
    paypal_client_secret: SecretString,
    paypal_webhook_id: String,
}

impl WebhookRouter {
    pub fn new(
        pool: PgPool,
        payment_service: PaymentService,
        stripe_webhook_secret: SecretString,
        paypal_base_url: String,
        paypal_client_id: String,
        paypal_client_secret: SecretString,
        paypal_webhook_id: String,
    ) -> Self {
        Self {
            pool,
            payment_service,
            stripe_webhook_secret,
            paypal_client: reqwest::Client::new(),
            paypal_base_url,
            paypal_client_id,
            paypal_client_secret,
            paypal_webhook_id,
        }
    }

    fn verify_stripe_signature(&self, signature_header: &str, raw_body: &[u8]) -> Result<(), GatewayError> {
        let mut timestamp = None;
        let mut signatures = Vec::new();
        for part in signature_header.split(',') {
            let mut kv = part.splitn(2, '=');
            match (kv.next(), kv.next()) {
                (Some("t"), Some(v)) => timestamp = Some(v),
                (Some("v1"), Some(v)) => signatures.push(v),
                _ => {}
            }
        }
        let timestamp = timestamp.ok_or_else(|| GatewayError::invalid("stripe signature missing timestamp"))?;
        if signatures.is_empty() {
            return Err(GatewayError::invalid("stripe signature missing v1 entry"));
        }

        let mut signed_payload = Vec::with_capacity(timestamp.len() + 1 + raw_body.len());
        signed_payload.extend_from_slice(timestamp.as_bytes());
        signed_payload.push(b'.');
        signed_payload.extend_from_slice(raw_body);

        let mut mac = HmacSha256::new_from_slice(self.stripe_webhook_secret.expose_secret().as_bytes())
            .map_err(|_| GatewayError::Internal("stripe webhook secret is not usable as an HMAC key".to_string()))?;
        mac.update(&signed_payload);
        let expected = hex::encode(mac.finalize().into_bytes());

        let matched = signatures.iter().any(|candidate| {
            candidate.len() == expected.len() && bool::from(candidate.as_bytes().ct_eq(expected.as_bytes()))
        });
        if !matched {
            return Err(GatewayError::Unauthenticated);
        }
        Ok(())
    }

    pub async fn handle_stripe(&self, signature_header: &str, raw_body: &[u8]) -> Result<(), GatewayError> {
        self.verify_stripe_signature(signature_header, raw_body)?;
        let event: serde_json::Value =
            serde_json::from_slice(raw_body).map_err(|_| GatewayError::invalid("malformed stripe event body"))?;
        let event_id = event
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::invalid("stripe event missing id"))?;
        let event_type = event.get("type").and_then(|v| v.as_str()).unwrap_or("");

        let entry = NewWebhookInboxEntry {
            provider: ProviderName::Stripe,
            event_id: event_id.to_string(),
            verification_status: VerificationStatus::Success,
            headers: serde_json::json!({ "stripe-signature": signature_header }),
            payload: event.clone(),
            related_payment_id: None,
        };
        let first_delivery = webhook_inbox_repo::try_insert(&self.pool, &entry).await?;
        if !first_delivery {
            return Ok(());
        }

        // Routing failures are logged, not propagated: the inbox row already
        // guarantees at-most-once delivery, so the sink always answers 200.
        if let Err(err) = self.route_stripe_event(event_type, &event).await {
            tracing::error!(event_type, error = %err, "stripe webhook routing failed");
        }
        Ok(())
    }

    async fn route_stripe_event(&self, event_type: &str, event: &serde_json::Value) -> Result<(), GatewayError> {
        let object = event.get("data").and_then(|d| d.get("object")).cloned().unwrap_or(serde_json::Value::Null);
        let object = &object;

        match event_type {
            "checkout.session.completed" => {
                let Some(session_id) = object.get("id").and_then(|v| v.as_str()) else { return Ok(()) };
                let payment_intent_id = object.get("payment_intent").and_then(|v| v.as_str()).map(str::to_string);
                self.transition(
                    ProviderName::Stripe,
                    &Token::new(session_id),
                    PaymentStatus::Authorized,
                    payment_intent_id.map(|pi| serde_json::json!({ "payment_intent_id": pi })),
                )
                .await
            }
            "checkout.session.expired" => {
                let Some(session_id) = object.get("id").and_then(|v| v.as_str()) else { return Ok(()) };
                self.transition(ProviderName::Stripe, &Token::new(session_id), PaymentStatus::Canceled, None).await
            }
            "payment_intent.canceled" => {
                self.transition_by_payment_intent(object, PaymentStatus::Canceled).await
            }
            "payment_intent.payment_failed" => {
                self.transition_by_payment_intent(object, PaymentStatus::Failed).await
            }
            "charge.refunded" | "charge.refund.updated" | "charge.refund.created" => {
                self.handle_stripe_refund(event_type, object).await
            }
            "charge.dispute.created"
            | "charge.dispute.updated"
            | "charge.dispute.closed"
            | "charge.dispute.funds_withdrawn"
            | "charge.dispute.funds_reinstated" => self.handle_stripe_dispute(event_type, object).await,
            _ => {
                tracing::debug!(event_type, "stripe event type not handled");
                Ok(())
            }
        }
    }

    async fn find_by_payment_intent(&self, payment_intent_id: &str) -> Result<Option<crate::domain::payment::Payment>, GatewayError> {
        payment_repo::find_by_provider_metadata(&self.pool, ProviderName::Stripe, "payment_intent_id", payment_intent_id).await
    }

    async fn transition_by_payment_intent(
        &self,
        object: &serde_json::Value,
        new_status: PaymentStatus,
    ) -> Result<(), GatewayError> {
        let Some(pi_id) = object.get("id").and_then(|v| v.as_str()) else { return Ok(()) };
        let Some(payment) = self.find_by_payment_intent(pi_id).await? else { return Ok(()) };
        self.transition(ProviderName::Stripe, &payment.token, new_status, None).await
    }

    async fn handle_stripe_refund(&self, event_type: &str, object: &serde_json::Value) -> Result<(), GatewayError> {
        let Some(pi_id) = object.get("payment_intent").and_then(|v| v.as_str()) else { return Ok(()) };
        let Some(payment) = self.find_by_payment_intent(pi_id).await? else { return Ok(()) };

        // `charge.refunded` carries a Charge object (`amount_refunded` is the
        // cumulative amount refunded so far); `charge.refund.*` carries a
        // Refund object instead, whose `amount` is this refund's own amount.
        let refunded_minor = if event_type == "charge.refunded" {
            object.get("amount_refunded").and_then(|v| v.as_i64())
        } else {
            object.get("amount").and_then(|v| v.as_i64())
        };
        let currency = payment.amount.currency();
        let refund_amount = refunded_minor.and_then(|minor| Money::from_minor_units(minor, currency).ok());
        let fully_refunded = event_type == "charge.refunded"
            || refunded_minor.map(|minor| minor >= payment.amount.to_minor_units()).unwrap_or(false);

        let mut tx = self.pool.begin().await?;
        let new_refund = NewRefund {
            payment_id: payment.id,
            provider: ProviderName::Stripe,
            amount: refund_amount.unwrap_or(payment.amount),
            status: if fully_refunded { RefundStatus::Succeeded } else { RefundStatus::Pending },
            provider_refund_id: object.get("id").and_then(|v| v.as_str()).map(str::to_string),
            reason: None,
            payload: object.clone(),
        };
        refund_repo::insert(&mut tx, &new_refund).await?;

        if fully_refunded {
            let existing = payment_repo::find_by_token_for_update(&mut tx, ProviderName::Stripe, &payment.token)
                .await?
                .ok_or_else(|| GatewayError::not_found("payment disappeared mid-webhook"))?;
            let transition = decide_transition(existing.status, PaymentStatus::Refunded, existing.first_authorized_at.is_some());
            if transition.allowed {
                let update = payment_repo::TransitionUpdate {
                    status: PaymentStatus::Refunded,
                    response_code: None,
                    status_reason: None,
                    authorization_code: None,
                    provider_metadata: existing.provider_metadata.clone(),
                    sets_first_authorized_at: false,
                    sets_failed_at: false,
                    sets_canceled_at: false,
                    sets_refunded_at: true,
                };
                payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
                payment_repo::mark_order_completed_for_payment(&mut tx, existing.id).await?;
            }
        }
        tx.commit().await?;
        Ok(())
    }

    /// Dispute status is resolved only by `charge.dispute.closed` (any
    /// outcome) or `charge.dispute.funds_reinstated`; created/updated/
    /// funds_withdrawn leave the dispute open while it's adjudicated.
    fn stripe_dispute_transition(event_type: &str, status: &str) -> (DisputeStatus, Option<PaymentStatus>) {
        match event_type {
            "charge.dispute.created" | "charge.dispute.updated" | "charge.dispute.funds_withdrawn" => {
                (DisputeStatus::Open, Some(PaymentStatus::Failed))
            }
            "charge.dispute.funds_reinstated" => (DisputeStatus::Resolved, Some(PaymentStatus::Authorized)),
            "charge.dispute.closed" => {
                let payment_status = match status {
                    "won" | "warning_closed" => Some(PaymentStatus::Authorized),
                    "lost" | "warning_lost" => Some(PaymentStatus::Failed),
                    _ => None,
                };
                (DisputeStatus::Resolved, payment_status)
            }
            _ => (DisputeStatus::Open, None),
        }
    }

    async fn handle_stripe_dispute(&self, event_type: &str, object: &serde_json::Value) -> Result<(), GatewayError> {
        let Some(pi_id) = object.get("payment_intent").and_then(|v| v.as_str()) else { return Ok(()) };
        let Some(payment) = self.find_by_payment_intent(pi_id).await? else { return Ok(()) };
        let Some(dispute_id) = object.get("id").and_then(|v| v.as_str()) else { return Ok(()) };

        let status = object.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let (dispute_status, payment_transition) = Self::stripe_dispute_transition(event_type, status);
        let amount = object
            .get("amount")
            .and_then(|v| v.as_i64())
            .and_then(|minor| Money::from_minor_units(minor, payment.amount.currency()).ok());

        let new_dispute = NewDispute {
            payment_id: payment.id,
            provider: ProviderName::Stripe,
            provider_dispute_id: dispute_id.to_string(),
            status: dispute_status,
            amount,
            reason: object.get("reason").and_then(|v| v.as_str()).map(str::to_string),
            payload: object.clone(),
        };
        let mut tx = self.pool.begin().await?;
        dispute_repo::upsert(&mut tx, &new_dispute).await?;
        if let Some(new_status) = payment_transition {
            if let Some(existing) = payment_repo::find_by_token_for_update(&mut tx, ProviderName::Stripe, &payment.token).await? {
                let transition = decide_transition(existing.status, new_status, existing.first_authorized_at.is_some());
                if transition.allowed {
                    let status_reason = format!("stripe dispute {event_type}");
                    let update = payment_repo::TransitionUpdate {
                        status: new_status,
                        response_code: None,
                        status_reason: Some(&status_reason),
                        authorization_code: None,
                        provider_metadata: existing.provider_metadata.clone(),
                        sets_first_authorized_at: transition.sets_first_authorized_at,
                        sets_failed_at: transition.sets_failed_at,
                        sets_canceled_at: transition.sets_canceled_at,
                        sets_refunded_at: transition.sets_refunded_at,
                    };
                    payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn transition(
        &self,
        provider: ProviderName,
        token: &Token,
        new_status: PaymentStatus,
        extra_metadata: Option<serde_json::Value>,
    ) -> Result<(), GatewayError> {
        let mut tx = self.pool.begin().await?;
        let Some(existing) = payment_repo::find_by_token_for_update(&mut tx, provider, token).await? else {
            return Ok(());
        };
        let transition = decide_transition(existing.status, new_status, existing.first_authorized_at.is_some());
        if !transition.allowed {
            tx.commit().await?;
            return Ok(());
        }
        let provider_metadata = match extra_metadata {
            Some(incoming) => crate::domain::payment::Payment::merge_provider_metadata(&existing.provider_metadata, &incoming),
            None => existing.provider_metadata.clone(),
        };
        let update = payment_repo::TransitionUpdate {
            status: new_status,
            response_code: None,
            status_reason: None,
            authorization_code: None,
            provider_metadata,
            sets_first_authorized_at: transition.sets_first_authorized_at,
            sets_failed_at: transition.sets_failed_at,
            sets_canceled_at: transition.sets_canceled_at,
            sets_refunded_at: transition.sets_refunded_at,
        };
        payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
        if transition.completes_order {
            payment_repo::mark_order_completed_for_payment(&mut tx, existing.id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn paypal_access_token(&self) -> Result<String, GatewayError> {
        let url = format!("{}/v1/oauth2/token", self.paypal_base_url);
        let response = self
            .paypal_client
            .post(&url)
            .basic_auth(&self.paypal_client_id, Some(self.paypal_client_secret.expose_secret()))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal oauth request failed: {e}")))?;
        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal oauth response malformed: {e}")))?;
        body.get("access_token")
            .and_then(|v| v.as_str())
            .map(str::to_string)
            .ok_or_else(|| GatewayError::provider("paypal oauth response missing access_token"))
    }

    async fn verify_paypal_signature(
        &self,
        headers: &PaypalSignatureHeaders,
        event: &serde_json::Value,
    ) -> Result<(), GatewayError> {
        let access_token = self.paypal_access_token().await?;
        let url = format!("{}/v1/notifications/verify-webhook-signature", self.paypal_base_url);
        let body = serde_json::json!({
            "auth_algo": headers.auth_algo,
            "cert_url": headers.cert_url,
            "transmission_id": headers.transmission_id,
            "transmission_sig": headers.transmission_sig,
            "transmission_time": headers.transmission_time,
            "webhook_id": self.paypal_webhook_id,
            "webhook_event": event,
        });
        let response = self
            .paypal_client
            .post(&url)
            .bearer_auth(access_token)
            .json(&body)
            .send()
            .await
            .map_err(|e| GatewayError::provider(format!("paypal verify-webhook-signature request failed: {e}")))?;
        let result: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
        match result.get("verification_status").and_then(|v| v.as_str()) {
            Some("SUCCESS") => Ok(()),
            _ => Err(GatewayError::Unauthenticated),
        }
    }

    pub async fn handle_paypal(&self, headers: &PaypalSignatureHeaders, raw_body: &[u8]) -> Result<(), GatewayError> {
        let event: serde_json::Value =
            serde_json::from_slice(raw_body).map_err(|_| GatewayError::invalid("malformed paypal event body"))?;
        self.verify_paypal_signature(headers, &event).await?;

        let event_id = event
            .get("id")
            .and_then(|v| v.as_str())
            .ok_or_else(|| GatewayError::invalid("paypal event missing id"))?;
        let event_type = event.get("event_type").and_then(|v| v.as_str()).unwrap_or("");

        let entry = NewWebhookInboxEntry {
            provider: ProviderName::Paypal,
            event_id: event_id.to_string(),
            verification_status: VerificationStatus::Success,
            headers: serde_json::json!({ "transmission_id": headers.transmission_id }),
            payload: event.clone(),
            related_payment_id: None,
        };
        let first_delivery = webhook_inbox_repo::try_insert(&self.pool, &entry).await?;
        if !first_delivery {
            return Ok(());
        }

        if let Err(err) = self.route_paypal_event(event_type, &event).await {
            tracing::error!(event_type, error = %err, "paypal webhook routing failed");
        }
        Ok(())
    }

    /// The order id is embedded directly in capture-scoped payloads under
    /// `supplementary_data.related_ids.order_id`; only disputes omit it, so
    /// that path alone falls back to a live capture lookup.
    async fn order_id_from_capture_resource(&self, resource: &serde_json::Value) -> Option<String> {
        if let Some(order_id) = resource
            .get("supplementary_data")
            .and_then(|s| s.get("related_ids"))
            .and_then(|r| r.get("order_id"))
            .and_then(|v| v.as_str())
        {
            return Some(order_id.to_string());
        }
        let capture_id = resource.get("id").and_then(|v| v.as_str())?;
        self.order_id_from_capture_id(capture_id).await
    }

    async fn order_id_from_capture_id(&self, capture_id: &str) -> Option<String> {
        let access_token = self.paypal_access_token().await.ok()?;
        let url = format!("{}/v2/payments/captures/{capture_id}", self.paypal_base_url);
        let response = self.paypal_client.get(&url).bearer_auth(access_token).send().await.ok()?;
        let body: serde_json::Value = response.json().await.ok()?;
        body.get("supplementary_data")
            .and_then(|s| s.get("related_ids"))
            .and_then(|r| r.get("order_id"))
            .and_then(|v| v.as_str())
            .map(str::to_string)
    }

    async fn route_paypal_event(&self, event_type: &str, event: &serde_json::Value) -> Result<(), GatewayError> {
        let resource = event.get("resource").cloned().unwrap_or(serde_json::Value::Null);
        let resource = &resource;

        match event_type {
            "CHECKOUT.ORDER.APPROVED" => {
                let Some(order_id) = resource.get("id").and_then(|v| v.as_str()) else { return Ok(()) };
                // Approval only authorizes the shopper's consent; the funds
                // move on capture, so this drives the same commit path the
                // merchant API exposes rather than a standalone transition.
                self.payment_service.commit(&Token::new(order_id), Some(ProviderName::Paypal)).await.map(|_| ())
            }
            "CHECKOUT.ORDER.CANCELLED" => {
                let Some(order_id) = resource.get("id").and_then(|v| v.as_str()) else { return Ok(()) };
                self.transition(ProviderName::Paypal, &Token::new(order_id), PaymentStatus::Canceled, None).await
            }
            "PAYMENT.CAPTURE.CANCELLED" | "PAYMENT.CAPTURE.DENIED" | "PAYMENT.CAPTURE.REVERSED" => {
                let Some(order_id) = self.order_id_from_capture_resource(resource).await else { return Ok(()) };
                let status = if event_type == "PAYMENT.CAPTURE.CANCELLED" { PaymentStatus::Canceled } else { PaymentStatus::Failed };
                self.transition(ProviderName::Paypal, &Token::new(order_id), status, None).await
            }
            "PAYMENT.CAPTURE.REFUNDED" | "PAYMENT.CAPTURE.PARTIALLY_REFUNDED" => self.handle_paypal_refund(resource).await,
            "CUSTOMER.DISPUTE.CREATED" | "CUSTOMER.DISPUTE.RESOLVED" => self.handle_paypal_dispute(resource).await,
            _ => {
                tracing::debug!(event_type, "paypal event type not handled");
                Ok(())
            }
        }
    }

    async fn handle_paypal_refund(&self, resource: &serde_json::Value) -> Result<(), GatewayError> {
        let Some(order_id) = self.order_id_from_capture_resource(resource).await else { return Ok(()) };
        let token = Token::new(order_id);
        let Some(payment) = payment_repo::find_by_token(&self.pool, ProviderName::Paypal, &token).await? else {
            return Ok(());
        };

        let currency = payment.amount.currency();
        let refund_amount = resource
            .get("amount")
            .and_then(|a| a.get("value"))
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<rust_decimal::Decimal>().ok())
            .and_then(|amount| Money::new(amount, currency).ok());

        // Both REFUNDED and PARTIALLY_REFUNDED confirm a completed refund
        // operation; spec §4.3 moves the payment to REFUNDED on either one.
        let mut tx = self.pool.begin().await?;
        let new_refund = NewRefund {
            payment_id: payment.id,
            provider: ProviderName::Paypal,
            amount: refund_amount.unwrap_or(payment.amount),
            status: RefundStatus::Succeeded,
            provider_refund_id: resource.get("id").and_then(|v| v.as_str()).map(str::to_string),
            reason: None,
            payload: resource.clone(),
        };
        refund_repo::insert(&mut tx, &new_refund).await?;

        let existing = payment_repo::find_by_token_for_update(&mut tx, ProviderName::Paypal, &token)
            .await?
            .ok_or_else(|| GatewayError::not_found("payment disappeared mid-webhook"))?;
        let transition = decide_transition(existing.status, PaymentStatus::Refunded, existing.first_authorized_at.is_some());
        if transition.allowed {
            let update = payment_repo::TransitionUpdate {
                status: PaymentStatus::Refunded,
                response_code: None,
                status_reason: None,
                authorization_code: None,
                provider_metadata: existing.provider_metadata.clone(),
                sets_first_authorized_at: false,
                sets_failed_at: false,
                sets_canceled_at: false,
                sets_refunded_at: true,
            };
            payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
            payment_repo::mark_order_completed_for_payment(&mut tx, existing.id).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    /// PayPal only reports a binary outcome on resolution
    /// (`RESOLVED_SELLER_FAVOUR` vs. everything else); while open the
    /// payment is treated as failed until the case is decided.
    fn paypal_dispute_transition(status: &str, outcome_code: Option<&str>) -> (DisputeStatus, Option<PaymentStatus>) {
        match status {
            "RESOLVED" => {
                let payment_status = if outcome_code == Some("RESOLVED_SELLER_FAVOUR") {
                    PaymentStatus::Authorized
                } else {
                    PaymentStatus::Failed
                };
                (DisputeStatus::Resolved, Some(payment_status))
            }
            _ => (DisputeStatus::Open, Some(PaymentStatus::Failed)),
        }
    }

    async fn handle_paypal_dispute(&self, resource: &serde_json::Value) -> Result<(), GatewayError> {
        let Some(dispute_id) = resource.get("dispute_id").and_then(|v| v.as_str()) else { return Ok(()) };
        let Some(capture_id) = resource
            .get("disputed_transactions")
            .and_then(|v| v.as_array())
            .and_then(|arr| arr.first())
            .and_then(|t| t.get("seller_transaction_id"))
            .and_then(|v| v.as_str())
        else {
            return Ok(());
        };
        let Some(order_id) = self.order_id_from_capture_id(capture_id).await else { return Ok(()) };
        let token = Token::new(order_id);
        let Some(payment) = payment_repo::find_by_token(&self.pool, ProviderName::Paypal, &token).await? else {
            return Ok(());
        };

        let status = resource.get("status").and_then(|v| v.as_str()).unwrap_or("");
        let outcome_code = resource.get("dispute_outcome").and_then(|o| o.get("outcome_code")).and_then(|v| v.as_str());
        let (dispute_status, payment_transition) = Self::paypal_dispute_transition(status, outcome_code);
        let amount = resource
            .get("dispute_amount")
            .and_then(|a| a.get("value"))
            .and_then(|v| v.as_str())
            .and_then(|v| v.parse::<rust_decimal::Decimal>().ok())
            .and_then(|amount| Money::new(amount, payment.amount.currency()).ok());

        let new_dispute = NewDispute {
            payment_id: payment.id,
            provider: ProviderName::Paypal,
            provider_dispute_id: dispute_id.to_string(),
            status: dispute_status,
            amount,
            reason: resource.get("reason").and_then(|v| v.as_str()).map(str::to_string),
            payload: resource.clone(),
        };
        let mut tx = self.pool.begin().await?;
        dispute_repo::upsert(&mut tx, &new_dispute).await?;
        if let Some(new_status) = payment_transition {
            if let Some(existing) = payment_repo::find_by_token_for_update(&mut tx, ProviderName::Paypal, &token).await? {
                let transition = decide_transition(existing.status, new_status, existing.first_authorized_at.is_some());
                if transition.allowed {
                    let status_reason = format!("paypal dispute {status}");
                    let update = payment_repo::TransitionUpdate {
                        status: new_status,
                        response_code: None,
                        status_reason: Some(&status_reason),
                        authorization_code: None,
                        provider_metadata: existing.provider_metadata.clone(),
                        sets_first_authorized_at: transition.sets_first_authorized_at,
                        sets_failed_at: transition.sets_failed_at,
                        sets_canceled_at: transition.sets_canceled_at,
                        sets_refunded_at: transition.sets_refunded_at,
                    };
                    payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
                }
            }
        }
        tx.commit().await?;
        Ok(())
    }
}

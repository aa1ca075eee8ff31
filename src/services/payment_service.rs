use {
    crate::adapters::registry::ProviderRegistry,
    crate::domain::{
        company::Company,
        error::GatewayError,
        id::{BuyOrder, Token},
        money::{Currency, Money},
        payment::{
            decide_transition, Environment, NewPayment, NewPaymentParams, Payment, PaymentStatus, PaymentType,
            RedirectInfo, RedirectMethod,
        },
        provider::ProviderName,
        refund::{NewRefund, Refund, RefundStatus},
    },
    crate::infra::postgres::{company_repo, payment_repo, refund_repo},
    rust_decimal::Decimal,
    serde::{Deserialize, Serialize},
    sqlx::PgPool,
    subtle::ConstantTimeEq,
};

/// Request shape for `create` — mirrors the HTTP body 1:1 so the transport
/// layer has nothing to translate beyond JSON parsing.
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentCreateRequest {
    pub buy_order: String,
    pub amount: Decimal,
    pub currency: String,
    pub payment_type: String,
    pub commerce_id: Option<String>,
    pub product_id: Option<String>,
    pub product_name: Option<String>,
    pub customer_rut: Option<String>,
    pub environment: Option<String>,
    pub return_url: String,
    pub success_url: Option<String>,
    pub failure_url: Option<String>,
    pub cancel_url: Option<String>,
    pub company_id: i64,
    pub company_token: String,
    pub provider: Option<String>,
    #[serde(default)]
    pub context: serde_json::Value,
}

#[derive(Debug, Clone, Serialize)]
pub struct PaymentCreateResponse {
    pub status: PaymentStatus,
    pub redirect: RedirectInfo,
    pub internal_id: i64,
    pub provider_token: Token,
}

/// Orchestrates the four operations in spec terms: create, commit, cancel,
/// refresh/status, refund. All tenancy checks and provider dispatch live
/// here; the store and the adapters stay dumb.
#[derive(Clone)]
pub struct PaymentService {
    pool: PgPool,
    registry: ProviderRegistry,
    default_provider: ProviderName,
    db_enabled: bool,
}

impl PaymentService {
    pub fn new(pool: PgPool, registry: ProviderRegistry, default_provider: ProviderName, db_enabled: bool) -> Self {
        Self { pool, registry, default_provider, db_enabled }
    }

    /// Constant-time company/token check. In graceful-degradation mode (no
    /// DB) any non-empty token is accepted for an "offline-company" — spec §9.
    pub async fn validate_tenancy(&self, company_id: i64, company_token: &str) -> Result<(), GatewayError> {
        if !self.db_enabled {
            return if company_token.is_empty() { Err(GatewayError::Unauthenticated) } else { Ok(()) };
        }
        let company = company_repo::find_by_id(&self.pool, company_id)
            .await?
            .ok_or(GatewayError::Unauthenticated)?;
        if !company.active {
            return Err(GatewayError::Unauthenticated);
        }
        if !Self::tokens_match(&company, company_token) {
            return Err(GatewayError::Unauthenticated);
        }
        Ok(())
    }

    fn tokens_match(company: &Company, candidate: &str) -> bool {
        use secrecy::ExposeSecret;
        let expected = company.api_token.expose_secret().as_bytes();
        let given = candidate.as_bytes();
        expected.len() == given.len() && bool::from(expected.ct_eq(given))
    }

    /// Resumes a pending attempt by reconstructing the `RedirectInfo` the
    /// original `create` call would have returned.
    pub async fn redirect(&self, token: &Token) -> Result<(Payment, RedirectInfo), GatewayError> {
        let payment = payment_repo::find_by_token_any_provider(&self.pool, token)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown token: {}", token.as_str())))?;
        let mut redirect = Self::redirect_info_for(payment.provider, &payment.token);
        redirect.url = payment.redirect_url.clone().unwrap_or_default();
        Ok((payment, redirect))
    }

    pub async fn list(&self, filters: &payment_repo::ListFilters<'_>) -> Result<Vec<Payment>, GatewayError> {
        payment_repo::list(&self.pool, filters).await
    }

    pub async fn list_pending(&self) -> Result<Vec<Payment>, GatewayError> {
        payment_repo::list_pending(&self.pool).await
    }

    fn redirect_info_for(provider: ProviderName, token: &Token) -> RedirectInfo {
        match provider {
            ProviderName::Webpay => RedirectInfo {
                url: String::new(),
                method: RedirectMethod::Post,
                form_fields: std::collections::BTreeMap::from([("token_ws".to_string(), token.as_str().to_string())]),
            },
            ProviderName::Stripe | ProviderName::Paypal => {
                RedirectInfo { url: String::new(), method: RedirectMethod::Get, form_fields: Default::default() }
            }
        }
    }

    pub async fn create(
        &self,
        req: PaymentCreateRequest,
        idempotency_key: Option<String>,
    ) -> Result<PaymentCreateResponse, GatewayError> {
        let provider_name = match req.provider.as_deref() {
            Some(p) => {
                ProviderName::try_from(p).map_err(|_| GatewayError::invalid(format!("unknown provider: {p}")))?
            }
            None => self.default_provider,
        };

        let currency = Currency::try_from(req.currency.as_str())?;
        if provider_name.requires_clp() && currency != Currency::Clp {
            return Err(GatewayError::invalid("unsupported currency for Webpay"));
        }

        self.validate_tenancy(req.company_id, &req.company_token).await?;

        if let Some(key) = idempotency_key.as_deref().filter(|k| !k.is_empty()) {
            if let Some(prior) = payment_repo::find_by_idempotency_key(&self.pool, req.company_id, key).await? {
                let mut redirect = Self::redirect_info_for(prior.provider, &prior.token);
                redirect.url = prior.redirect_url.clone().unwrap_or_default();
                return Ok(PaymentCreateResponse {
                    status: prior.status,
                    redirect,
                    internal_id: prior.id,
                    provider_token: prior.token,
                });
            }
        }

        let buy_order = BuyOrder::new(req.buy_order)?;
        let amount = Money::new(req.amount, currency)?;
        let payment_type = PaymentType::try_from(req.payment_type.as_str())?;
        let environment = match req.environment.as_deref() {
            Some(e) => Environment::try_from(e)?,
            None => Environment::Test,
        };

        let mut new_payment = NewPayment::new(NewPaymentParams {
            provider: provider_name,
            company_id: req.company_id,
            buy_order: buy_order.clone(),
            amount,
            payment_type,
            commerce_id: req.commerce_id,
            product_id: req.product_id,
            product_name: req.product_name,
            customer_rut: req.customer_rut,
            environment,
            return_url: req.return_url.clone(),
            success_url: req.success_url,
            failure_url: req.failure_url,
            cancel_url: req.cancel_url,
            context: req.context,
            idempotency_key: idempotency_key.filter(|k| !k.is_empty()),
        });

        let adapter = self
            .registry
            .get(provider_name)
            .ok_or_else(|| GatewayError::Internal(format!("no adapter registered for {provider_name}")))?;

        // Provider round-trip happens before any row exists — spec §4.1 step 5.
        // A ProviderError here aborts outright; nothing is persisted.
        let outcome = adapter.create(&new_payment, &req.return_url).await?;

        new_payment.token = Some(outcome.token.clone());
        new_payment.redirect_url = Some(outcome.redirect.url.clone());
        new_payment.provider_metadata =
            Payment::merge_provider_metadata(&new_payment.provider_metadata, &outcome.provider_metadata);

        let mut tx = self.pool.begin().await?;
        let payment_order_id = payment_repo::upsert_payment_order(&mut tx, req.company_id, &buy_order, amount).await?;
        let payment = payment_repo::insert_payment(&mut tx, payment_order_id, &outcome.token, &new_payment).await?;
        tx.commit().await?;

        Ok(PaymentCreateResponse {
            status: payment.status,
            redirect: outcome.redirect,
            internal_id: payment.id,
            provider_token: payment.token,
        })
    }

    /// Resolves a bare token to its `(provider, Payment)` pair when the
    /// caller (e.g. the return-callback route) doesn't already know which
    /// provider issued it.
    async fn resolve_provider(&self, token: &Token) -> Result<ProviderName, GatewayError> {
        payment_repo::find_by_token_any_provider(&self.pool, token)
            .await?
            .map(|p| p.provider)
            .ok_or_else(|| GatewayError::not_found(format!("unknown token: {}", token.as_str())))
    }

    pub async fn commit(&self, token: &Token, provider_hint: Option<ProviderName>) -> Result<Payment, GatewayError> {
        let provider = match provider_hint {
            Some(p) => p,
            None => self.resolve_provider(token).await?,
        };
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| GatewayError::Internal(format!("no adapter registered for {provider}")))?;

        let commit_outcome = adapter.commit(token).await?;
        let new_status = if commit_outcome.response_code == 0 { PaymentStatus::Authorized } else { PaymentStatus::Failed };

        let mut tx = self.pool.begin().await?;
        let existing = payment_repo::find_by_token_for_update(&mut tx, provider, token)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown token: {}", token.as_str())))?;

        let transition = decide_transition(existing.status, new_status, existing.first_authorized_at.is_some());
        if !transition.allowed {
            tx.commit().await?;
            tracing::warn!(token = token.as_str(), from = %existing.status, to = %new_status, "commit: invalid transition, ignored");
            return Ok(existing);
        }

        let merged_metadata =
            Payment::merge_provider_metadata(&existing.provider_metadata, &commit_outcome.provider_metadata);
        let update = payment_repo::TransitionUpdate {
            status: new_status,
            response_code: Some(commit_outcome.response_code),
            status_reason: commit_outcome.status_reason.as_deref(),
            authorization_code: commit_outcome.authorization_code.as_deref(),
            provider_metadata: merged_metadata,
            sets_first_authorized_at: transition.sets_first_authorized_at,
            sets_failed_at: transition.sets_failed_at,
            sets_canceled_at: transition.sets_canceled_at,
            sets_refunded_at: transition.sets_refunded_at,
        };
        let updated = payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
        if transition.completes_order {
            payment_repo::mark_order_completed_for_payment(&mut tx, existing.id).await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// No provider call — marks CANCELED directly. Used on the return
    /// callback when the shopper aborts.
    pub async fn cancel(&self, token: &Token, provider_hint: Option<ProviderName>) -> Result<Payment, GatewayError> {
        let provider = match provider_hint {
            Some(p) => p,
            None => self.resolve_provider(token).await?,
        };

        let mut tx = self.pool.begin().await?;
        let existing = payment_repo::find_by_token_for_update(&mut tx, provider, token)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown token: {}", token.as_str())))?;

        let transition = decide_transition(existing.status, PaymentStatus::Canceled, existing.first_authorized_at.is_some());
        if !transition.allowed {
            tx.commit().await?;
            return Ok(existing);
        }

        let update = payment_repo::TransitionUpdate {
            status: PaymentStatus::Canceled,
            response_code: None,
            status_reason: None,
            authorization_code: None,
            provider_metadata: existing.provider_metadata.clone(),
            sets_first_authorized_at: false,
            sets_failed_at: false,
            sets_canceled_at: true,
            sets_refunded_at: false,
        };
        let updated = payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
        tx.commit().await?;
        Ok(updated)
    }

    /// Read-only: the provider's reported status, without mutating local state.
    pub async fn status(&self, token: &Token, provider_hint: Option<ProviderName>) -> Result<Option<PaymentStatus>, GatewayError> {
        let provider = match provider_hint {
            Some(p) => p,
            None => self.resolve_provider(token).await?,
        };
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| GatewayError::Internal(format!("no adapter registered for {provider}")))?;
        adapter.status(token).await
    }

    /// Reconciles local state from the provider. Webpay has no read-only
    /// status in some configurations, so `refresh` on Webpay performs the
    /// commit instead — spec §4.1.
    pub async fn refresh(&self, token: &Token, provider_hint: Option<ProviderName>) -> Result<Payment, GatewayError> {
        let provider = match provider_hint {
            Some(p) => p,
            None => self.resolve_provider(token).await?,
        };
        if provider == ProviderName::Webpay {
            return self.commit(token, Some(provider)).await;
        }
        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| GatewayError::Internal(format!("no adapter registered for {provider}")))?;
        let reported = adapter.status(token).await?;
        let Some(reported_status) = reported else {
            return payment_repo::find_by_token(&self.pool, provider, token)
                .await?
                .ok_or_else(|| GatewayError::not_found(format!("unknown token: {}", token.as_str())));
        };

        let mut tx = self.pool.begin().await?;
        let existing = payment_repo::find_by_token_for_update(&mut tx, provider, token)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown token: {}", token.as_str())))?;
        let transition = decide_transition(existing.status, reported_status, existing.first_authorized_at.is_some());
        if !transition.allowed {
            tx.commit().await?;
            return Ok(existing);
        }
        let update = payment_repo::TransitionUpdate {
            status: reported_status,
            response_code: None,
            status_reason: None,
            authorization_code: None,
            provider_metadata: existing.provider_metadata.clone(),
            sets_first_authorized_at: transition.sets_first_authorized_at,
            sets_failed_at: transition.sets_failed_at,
            sets_canceled_at: transition.sets_canceled_at,
            sets_refunded_at: transition.sets_refunded_at,
        };
        let updated = payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
        if transition.completes_order {
            payment_repo::mark_order_completed_for_payment(&mut tx, existing.id).await?;
        }
        tx.commit().await?;
        Ok(updated)
    }

    /// `amount` is a bare major-unit Decimal, same as the merchant-facing
    /// request body — it's quantised against the Payment's own currency here,
    /// once that currency is known, rather than asking the caller for it.
    pub async fn refund(
        &self,
        token: &Token,
        amount: Option<Decimal>,
        company_id: i64,
        company_token: &str,
    ) -> Result<(Payment, Refund), GatewayError> {
        self.validate_tenancy(company_id, company_token).await?;

        let provider = self.resolve_provider(token).await?;
        let mut tx = self.pool.begin().await?;
        let existing = payment_repo::find_by_token_for_update(&mut tx, provider, token)
            .await?
            .ok_or_else(|| GatewayError::not_found(format!("unknown token: {}", token.as_str())))?;

        if existing.company_id != company_id {
            return Err(GatewayError::Forbidden);
        }

        let already_refunded = refund_repo::total_refunded(&self.pool, existing.id).await?;
        let requested = match amount {
            Some(a) => Money::new(a, existing.amount.currency())?,
            None => existing.amount,
        };
        if requested.amount() <= Decimal::ZERO {
            return Err(GatewayError::invalid("refund amount must be strictly positive"));
        }
        if already_refunded + requested.amount() > existing.amount.amount() {
            return Err(GatewayError::invalid("refund amount exceeds remaining payment amount"));
        }

        let adapter = self
            .registry
            .get(provider)
            .ok_or_else(|| GatewayError::Internal(format!("no adapter registered for {provider}")))?;
        let outcome = adapter.refund(token, Some(requested)).await?;

        let refund_status = if outcome.ok { RefundStatus::Succeeded } else { RefundStatus::Failed };
        let new_refund = NewRefund {
            payment_id: existing.id,
            provider,
            amount: outcome.amount.unwrap_or(requested),
            status: refund_status,
            provider_refund_id: outcome.provider_refund_id.clone(),
            reason: outcome.error.clone(),
            payload: outcome.payload.clone(),
        };
        let refund_row = refund_repo::insert(&mut tx, &new_refund).await?;

        let updated = if outcome.ok {
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
                let updated = payment_repo::apply_transition(&mut tx, existing.id, &update).await?;
                payment_repo::mark_order_completed_for_payment(&mut tx, existing.id).await?;
                updated
            } else {
                tracing::warn!(token = token.as_str(), from = %existing.status, "refund succeeded but payment was not in a refundable state");
                existing
            }
        } else {
            existing
        };

        tx.commit().await?;
        Ok((updated, refund_row))
    }
}

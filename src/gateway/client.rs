use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use failsafe::futures::CircuitBreaker as FuturesCircuitBreaker;
use failsafe::{backoff, failure_policy, Config, Error as FailsafeError, StateMachine};
use reqwest::{Client, RequestBuilder};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::config::GatewayConfig;
use crate::domain::ReportedStatus;
use crate::utils::Secret;

/// Every failure talking to the processor: network, timeout, non-2xx, a
/// `status: false` envelope, an unreadable body or an open circuit.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Payment gateway unavailable: {0}")]
pub struct GatewayUnavailable(pub String);

/// Input to charge initialization. `amount` is in major units.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub amount: BigDecimal,
    pub email: String,
    pub reference: String,
    pub callback_url: String,
    pub metadata: Value,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChargeAuthorization {
    pub authorization_url: String,
    pub access_code: String,
}

/// A completed status query.
#[derive(Debug, Clone)]
pub struct ChargeStatus {
    pub reported: ReportedStatus,
    /// Amount the gateway recorded, in minor units.
    pub amount_minor: Option<i64>,
    /// The `data` object of the gateway response, unredacted.
    pub raw: Value,
}

#[async_trait]
pub trait PaymentGateway: Send + Sync {
    async fn initialize_charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeAuthorization, GatewayUnavailable>;

    async fn query_charge(&self, reference: &str) -> Result<ChargeStatus, GatewayUnavailable>;
}

/// Converts major units to the gateway's integer minor units, truncating
/// anything past two decimal places.
pub fn to_minor_units(amount: &BigDecimal) -> Option<i64> {
    (amount.clone() * BigDecimal::from(100)).with_scale(0).to_i64()
}

#[derive(Debug, Serialize)]
struct InitializeBody<'a> {
    email: &'a str,
    amount: i64,
    reference: &'a str,
    callback_url: &'a str,
    metadata: &'a Value,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
    amount: Option<i64>,
}

/// HTTP client for the Paystack transaction API.
#[derive(Clone)]
pub struct PaystackClient {
    client: Client,
    base_url: String,
    secret_key: Secret<String>,
    circuit_breaker: StateMachine<failure_policy::ConsecutiveFailures<backoff::EqualJittered>, ()>,
}

impl PaystackClient {
    pub fn new(config: &GatewayConfig) -> Result<Self, reqwest::Error> {
        let client = Client::builder().timeout(config.timeout).build()?;

        let backoff = backoff::equal_jittered(config.reset_timeout, config.reset_timeout * 2);
        let policy = failure_policy::consecutive_failures(config.failure_threshold, backoff);
        let circuit_breaker = Config::new().failure_policy(policy).build();

        Ok(PaystackClient {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            secret_key: config.secret_key.clone(),
            circuit_breaker,
        })
    }

    /// Returns the current state of the circuit breaker
    pub fn circuit_state(&self) -> String {
        if self.circuit_breaker.is_call_permitted() {
            "closed".to_string()
        } else {
            "open".to_string()
        }
    }

    /// Sends the request through the circuit breaker and returns the `data`
    /// object of a successful envelope.
    async fn execute(&self, request: RequestBuilder) -> Result<Value, GatewayUnavailable> {
        let result = self
            .circuit_breaker
            .call(async move {
                let response = request
                    .send()
                    .await
                    .map_err(|e| GatewayUnavailable(format!("request failed: {}", e)))?;

                let status = response.status();
                if !status.is_success() {
                    return Err(GatewayUnavailable(format!("gateway returned HTTP {}", status)));
                }

                let envelope: Value = response
                    .json()
                    .await
                    .map_err(|e| GatewayUnavailable(format!("malformed gateway response: {}", e)))?;

                if envelope.get("status").and_then(Value::as_bool) != Some(true) {
                    let message = envelope
                        .get("message")
                        .and_then(Value::as_str)
                        .unwrap_or("request rejected");
                    return Err(GatewayUnavailable(format!("gateway rejected request: {}", message)));
                }

                envelope
                    .get("data")
                    .cloned()
                    .ok_or_else(|| GatewayUnavailable("gateway response has no data".to_string()))
            })
            .await;

        match result {
            Ok(data) => Ok(data),
            Err(FailsafeError::Rejected) => Err(GatewayUnavailable(
                "gateway circuit breaker is open".to_string(),
            )),
            Err(FailsafeError::Inner(e)) => Err(e),
        }
    }
}

#[async_trait]
impl PaymentGateway for PaystackClient {
    async fn initialize_charge(
        &self,
        request: &ChargeRequest,
    ) -> Result<ChargeAuthorization, GatewayUnavailable> {
        let amount = to_minor_units(&request.amount)
            .filter(|minor| *minor > 0)
            .ok_or_else(|| GatewayUnavailable(format!("amount {} is not chargeable", request.amount)))?;

        let body = InitializeBody {
            email: &request.email,
            amount,
            reference: &request.reference,
            callback_url: &request.callback_url,
            metadata: &request.metadata,
        };

        let url = format!("{}/transaction/initialize", self.base_url);
        let http = self
            .client
            .post(&url)
            .bearer_auth(self.secret_key.reveal())
            .json(&body);

        let data = self.execute(http).await?;
        tracing::debug!(reference = %request.reference, amount_minor = amount, "Charge initialized");

        serde_json::from_value(data)
            .map_err(|e| GatewayUnavailable(format!("malformed initialize response: {}", e)))
    }

    async fn query_charge(&self, reference: &str) -> Result<ChargeStatus, GatewayUnavailable> {
        let url = format!("{}/transaction/verify/{}", self.base_url, reference);
        let http = self.client.get(&url).bearer_auth(self.secret_key.reveal());

        let raw = self.execute(http).await?;
        let data: VerifyData = serde_json::from_value(raw.clone())
            .map_err(|e| GatewayUnavailable(format!("malformed verify response: {}", e)))?;

        Ok(ChargeStatus {
            reported: ReportedStatus::from_gateway(&data.status),
            amount_minor: data.amount,
            raw,
        })
    }
}

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use log::*;
use rand::Rng;
use reqwest::Client;
use serde::{de::DeserializeOwned, Serialize};
use tokio::sync::Mutex;

use kpg_common::Money;

use crate::{
    config::{GatewayMode, MpesaConfig},
    data_objects::{B2cRequest, B2cResponse, StkPushRequest, StkPushResponse, StkQueryResponse, TokenResponse},
    helpers::{daraja_amount, daraja_timestamp, normalize_phone, stk_password},
    MpesaApiError,
};

/// Refresh the cached token this long before Daraja says it expires.
const TOKEN_EXPIRY_MARGIN: Duration = Duration::seconds(60);

#[derive(Debug, Clone)]
struct CachedToken {
    token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    fn is_fresh(&self) -> bool {
        self.expires_at - Utc::now() > TOKEN_EXPIRY_MARGIN
    }
}

/// The Daraja API client.
///
/// Cheap to clone; clones share the HTTP connection pool and the token cache. The token cache is guarded by an async
/// mutex that is held across the refresh call, so concurrent callers that miss the cache wait for the one in-flight
/// refresh rather than issuing their own.
#[derive(Clone)]
pub struct MpesaApi {
    config: MpesaConfig,
    client: Arc<Client>,
    token: Arc<Mutex<Option<CachedToken>>>,
}

impl MpesaApi {
    pub fn new(config: MpesaConfig) -> Result<Self, MpesaApiError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| MpesaApiError::Initialization(e.to_string()))?;
        Ok(Self { config, client: Arc::new(client), token: Arc::new(Mutex::new(None)) })
    }

    pub fn mode(&self) -> GatewayMode {
        self.config.mode()
    }

    pub fn is_simulation(&self) -> bool {
        self.mode() == GatewayMode::Simulation
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_url)
    }

    /// Returns a bearer token, refreshing it if the cached one is missing or inside the expiry margin.
    pub async fn access_token(&self) -> Result<String, MpesaApiError> {
        let mut guard = self.token.lock().await;
        if let Some(cached) = guard.as_ref() {
            if cached.is_fresh() {
                return Ok(cached.token.clone());
            }
        }
        trace!("📡️ Access token missing or stale, requesting a fresh one");
        let response = self
            .client
            .get(self.url("/oauth/v1/generate?grant_type=client_credentials"))
            .basic_auth(&self.config.consumer_key, Some(self.config.consumer_secret.reveal()))
            .send()
            .await?;
        let token: TokenResponse = Self::read_response(response).await?;
        let expires_at = Utc::now() + Duration::seconds(token.expires_in_secs());
        debug!("📡️ New access token acquired, valid until {expires_at}");
        let fresh = CachedToken { token: token.access_token.clone(), expires_at };
        *guard = Some(fresh);
        Ok(token.access_token)
    }

    async fn post_json<B: Serialize, T: DeserializeOwned>(&self, path: &str, body: &B) -> Result<T, MpesaApiError> {
        let token = self.access_token().await?;
        let response = self.client.post(self.url(path)).bearer_auth(token).json(body).send().await?;
        Self::read_response(response).await
    }

    async fn read_response<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, MpesaApiError> {
        if response.status().is_success() {
            response.json::<T>().await.map_err(|e| MpesaApiError::JsonError(e.to_string()))
        } else {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_else(|e| e.to_string());
            Err(MpesaApiError::UpstreamRejected { status, message })
        }
    }

    /// Initiates an STK push: Daraja prompts the payer's handset and delivers the result to the callback URL later.
    /// The returned `CheckoutRequestID` is the correlation id the result will carry.
    pub async fn stk_push(
        &self,
        phone: &str,
        amount: Money,
        reference: &str,
        description: &str,
    ) -> Result<StkPushResponse, MpesaApiError> {
        if self.is_simulation() {
            return Err(MpesaApiError::SimulationOnly);
        }
        let msisdn = normalize_phone(phone)?;
        let timestamp = daraja_timestamp(Utc::now());
        let request = StkPushRequest {
            business_short_code: self.config.shortcode.clone(),
            password: stk_password(&self.config.shortcode, self.config.passkey.reveal(), &timestamp),
            timestamp,
            transaction_type: "CustomerPayBillOnline".to_string(),
            amount: daraja_amount(amount),
            party_a: msisdn.clone(),
            party_b: self.config.shortcode.clone(),
            phone_number: msisdn,
            callback_url: self.config.callback_url.clone(),
            account_reference: reference.to_string(),
            transaction_desc: description.to_string(),
        };
        debug!("📡️ Initiating STK push of {amount} for {reference}");
        let response: StkPushResponse = self.post_json("/mpesa/stkpush/v1/processrequest", &request).await?;
        info!("📡️ STK push accepted, CheckoutRequestID {}", response.checkout_request_id);
        Ok(response)
    }

    /// Initiates a B2C payout to a vendor or rider.
    pub async fn b2c_payment(&self, phone: &str, amount: Money, remarks: &str) -> Result<B2cResponse, MpesaApiError> {
        if self.is_simulation() {
            return Err(MpesaApiError::SimulationOnly);
        }
        let msisdn = normalize_phone(phone)?;
        let request = B2cRequest {
            initiator_name: self.config.initiator_name.clone(),
            security_credential: self.config.initiator_password.reveal().clone(),
            command_id: "BusinessPayment".to_string(),
            amount: daraja_amount(amount),
            party_a: self.config.shortcode.clone(),
            party_b: msisdn,
            remarks: remarks.to_string(),
            queue_timeout_url: self.config.callback_url.clone(),
            result_url: self.config.callback_url.clone(),
        };
        debug!("📡️ Initiating B2C payout of {amount}");
        let response: B2cResponse = self.post_json("/mpesa/b2c/v1/paymentrequest", &request).await?;
        info!("📡️ B2C payout accepted, ConversationID {}", response.conversation_id);
        Ok(response)
    }

    /// Queries the status of a previously initiated STK push.
    pub async fn query_stk_status(&self, checkout_request_id: &str) -> Result<StkQueryResponse, MpesaApiError> {
        if self.is_simulation() {
            return Err(MpesaApiError::SimulationOnly);
        }
        let timestamp = daraja_timestamp(Utc::now());
        let body = serde_json::json!({
            "BusinessShortCode": self.config.shortcode,
            "Password": stk_password(&self.config.shortcode, self.config.passkey.reveal(), &timestamp),
            "Timestamp": timestamp,
            "CheckoutRequestID": checkout_request_id,
        });
        self.post_json("/mpesa/stkpushquery/v1/query", &body).await
    }

    /// Simulation-mode counterpart of [`stk_push`]: validates the phone number and fabricates the response Daraja
    /// would have sent, with a synthetic correlation id. The caller is expected to settle the payment synchronously
    /// through the same reconciliation path the real callback uses.
    pub fn simulate_stk_push(&self, phone: &str, reference: &str) -> Result<StkPushResponse, MpesaApiError> {
        let _msisdn = normalize_phone(phone)?;
        let nonce: u64 = rand::thread_rng().gen();
        let response = StkPushResponse {
            merchant_request_id: format!("sim-merchant-{nonce:016x}"),
            checkout_request_id: format!("ws_CO_SIM_{nonce:016x}"),
            response_code: "0".to_string(),
            response_description: "Success. Request accepted for processing".to_string(),
            customer_message: format!("Simulated push payment for {reference} accepted"),
        };
        info!("🧪️ Simulated STK push for {reference}, CheckoutRequestID {}", response.checkout_request_id);
        Ok(response)
    }

    /// Fabricates the receipt number a simulated settlement reports.
    pub fn simulate_receipt(&self) -> String {
        let nonce: u32 = rand::thread_rng().gen();
        format!("SIM{nonce:08X}")
    }

    /// Simulation-mode counterpart of [`b2c_payment`].
    pub fn simulate_b2c(&self, phone: &str) -> Result<B2cResponse, MpesaApiError> {
        let _msisdn = normalize_phone(phone)?;
        let nonce: u64 = rand::thread_rng().gen();
        let response = B2cResponse {
            conversation_id: format!("AG_SIM_{nonce:016x}"),
            originator_conversation_id: format!("sim-originator-{nonce:016x}"),
            response_code: "0".to_string(),
            response_description: "Accept the service request successfully.".to_string(),
        };
        info!("🧪️ Simulated B2C payout, ConversationID {}", response.conversation_id);
        Ok(response)
    }
}

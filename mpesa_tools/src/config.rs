use std::time::Duration;

use log::*;
use kpg_common::Secret;

use crate::MpesaApiError;

const DEFAULT_API_URL: &str = "https://sandbox.safaricom.co.ke";
const DEFAULT_TIMEOUT_SECS: u64 = 30;
const PLACEHOLDER: &str = "placeholder";

/// How the gateway client talks to Daraja.
///
/// `Simulation` is a first-class, named mode, not a silent fallback: it is selected when `KPG_MPESA_SIMULATION` is
/// set, or when the credentials are absent or still carry placeholder values. In this mode initiation calls return
/// synthetic responses and the push route settles synchronously.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GatewayMode {
    Live,
    Simulation,
}

impl std::fmt::Display for GatewayMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Live => write!(f, "live"),
            Self::Simulation => write!(f, "simulation"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MpesaConfig {
    /// Base URL of the Daraja API, e.g. "https://api.safaricom.co.ke"
    pub api_url: String,
    pub consumer_key: String,
    pub consumer_secret: Secret<String>,
    /// The paybill / till number payments are pushed to.
    pub shortcode: String,
    /// The Lipa-na-M-Pesa passkey used to derive the STK password.
    pub passkey: Secret<String>,
    /// Initiator name for B2C payouts.
    pub initiator_name: String,
    pub initiator_password: Secret<String>,
    /// Where Daraja should deliver STK results.
    pub callback_url: String,
    /// Upper bound on any single request to the gateway.
    pub timeout: Duration,
    /// Set when KPG_MPESA_SIMULATION is truthy; mode() also falls back to simulation on placeholder credentials.
    pub force_simulation: bool,
}

impl Default for MpesaConfig {
    fn default() -> Self {
        Self {
            api_url: DEFAULT_API_URL.to_string(),
            consumer_key: PLACEHOLDER.to_string(),
            consumer_secret: Secret::new(PLACEHOLDER.to_string()),
            shortcode: "174379".to_string(),
            passkey: Secret::new(PLACEHOLDER.to_string()),
            initiator_name: PLACEHOLDER.to_string(),
            initiator_password: Secret::new(PLACEHOLDER.to_string()),
            callback_url: "http://localhost:8360/payments/callback".to_string(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
            force_simulation: false,
        }
    }
}

impl MpesaConfig {
    pub fn from_env_or_default() -> Self {
        let defaults = Self::default();
        let api_url = std::env::var("KPG_MPESA_API_URL").unwrap_or_else(|_| {
            warn!("🪛️ KPG_MPESA_API_URL not set, using the sandbox URL");
            defaults.api_url.clone()
        });
        let consumer_key = std::env::var("KPG_MPESA_CONSUMER_KEY").unwrap_or_else(|_| {
            warn!("🪛️ KPG_MPESA_CONSUMER_KEY not set. The gateway will run in simulation mode.");
            PLACEHOLDER.to_string()
        });
        let consumer_secret = Secret::new(std::env::var("KPG_MPESA_CONSUMER_SECRET").unwrap_or_else(|_| {
            warn!("🪛️ KPG_MPESA_CONSUMER_SECRET not set. The gateway will run in simulation mode.");
            PLACEHOLDER.to_string()
        }));
        let shortcode = std::env::var("KPG_MPESA_SHORTCODE").unwrap_or_else(|_| defaults.shortcode.clone());
        let passkey = Secret::new(
            std::env::var("KPG_MPESA_PASSKEY").unwrap_or_else(|_| PLACEHOLDER.to_string()),
        );
        let initiator_name =
            std::env::var("KPG_MPESA_INITIATOR_NAME").unwrap_or_else(|_| PLACEHOLDER.to_string());
        let initiator_password = Secret::new(
            std::env::var("KPG_MPESA_INITIATOR_PASSWORD").unwrap_or_else(|_| PLACEHOLDER.to_string()),
        );
        let callback_url = std::env::var("KPG_MPESA_CALLBACK_URL").unwrap_or_else(|_| {
            warn!("🪛️ KPG_MPESA_CALLBACK_URL not set, using {}", defaults.callback_url);
            defaults.callback_url.clone()
        });
        let timeout = std::env::var("KPG_MPESA_TIMEOUT_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .map(Duration::from_secs)
            .unwrap_or(defaults.timeout);
        let force_simulation =
            std::env::var("KPG_MPESA_SIMULATION").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        Self {
            api_url,
            consumer_key,
            consumer_secret,
            shortcode,
            passkey,
            initiator_name,
            initiator_password,
            callback_url,
            timeout,
            force_simulation,
        }
    }

    fn has_live_credentials(&self) -> bool {
        let placeholderish = |s: &str| s.is_empty() || s.eq_ignore_ascii_case(PLACEHOLDER);
        !placeholderish(&self.consumer_key)
            && !placeholderish(self.consumer_secret.reveal())
            && !placeholderish(self.passkey.reveal())
    }

    pub fn mode(&self) -> GatewayMode {
        if self.force_simulation || !self.has_live_credentials() {
            GatewayMode::Simulation
        } else {
            GatewayMode::Live
        }
    }

    /// Eager validation for deployments that must not fall back to simulation. Returns the resolved mode.
    pub fn validate(&self, allow_simulation: bool) -> Result<GatewayMode, MpesaApiError> {
        match self.mode() {
            GatewayMode::Live => Ok(GatewayMode::Live),
            GatewayMode::Simulation if allow_simulation => Ok(GatewayMode::Simulation),
            GatewayMode::Simulation => Err(MpesaApiError::Initialization(
                "M-Pesa credentials are missing or placeholders, and simulation mode is disallowed".to_string(),
            )),
        }
    }
}

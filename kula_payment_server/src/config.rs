use std::env;

use chrono::Duration;
use log::*;
use mpesa_tools::MpesaConfig;

const DEFAULT_KPG_HOST: &str = "127.0.0.1";
const DEFAULT_KPG_PORT: u16 = 8360;
/// How long an order may sit in `pending_payment` before the reaper removes it.
const DEFAULT_PENDING_ORDER_TTL: Duration = Duration::minutes(5);
const DEFAULT_REAPER_INTERVAL_SECS: u64 = 60;

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub database_url: String,
    /// Orders still awaiting payment after this long are deleted by the reaper.
    pub pending_order_ttl: Duration,
    /// How often the reaper sweeps.
    pub reaper_interval_secs: u64,
    /// When true, the server refuses to start with placeholder M-Pesa credentials instead of falling back to
    /// simulation mode.
    pub require_live_gateway: bool,
    /// M-Pesa gateway configuration.
    pub mpesa: MpesaConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_KPG_HOST.to_string(),
            port: DEFAULT_KPG_PORT,
            database_url: String::default(),
            pending_order_ttl: DEFAULT_PENDING_ORDER_TTL,
            reaper_interval_secs: DEFAULT_REAPER_INTERVAL_SECS,
            require_live_gateway: false,
            mpesa: MpesaConfig::default(),
        }
    }
}

impl ServerConfig {
    pub fn new(host: &str, port: u16) -> Self {
        Self { host: host.to_string(), port, ..Default::default() }
    }

    pub fn from_env_or_default() -> Self {
        let host = env::var("KPG_HOST").ok().unwrap_or_else(|| DEFAULT_KPG_HOST.into());
        let port = env::var("KPG_PORT")
            .map(|s| {
                s.parse::<u16>().unwrap_or_else(|e| {
                    error!(
                        "🪛️ {s} is not a valid port for KPG_PORT. {e} Using the default, {DEFAULT_KPG_PORT}, instead."
                    );
                    DEFAULT_KPG_PORT
                })
            })
            .ok()
            .unwrap_or(DEFAULT_KPG_PORT);
        let database_url = env::var("KPG_DATABASE_URL").ok().unwrap_or_else(|| {
            error!("🪛️ KPG_DATABASE_URL is not set. Please set it to the URL for the KPG database.");
            String::default()
        });
        let pending_order_ttl = env::var("KPG_PENDING_ORDER_TTL_SECS")
            .ok()
            .and_then(|s| s.parse::<i64>().ok())
            .map(Duration::seconds)
            .unwrap_or_else(|| {
                info!(
                    "🪛️ KPG_PENDING_ORDER_TTL_SECS is not set. Unpaid orders expire after {} seconds.",
                    DEFAULT_PENDING_ORDER_TTL.num_seconds()
                );
                DEFAULT_PENDING_ORDER_TTL
            });
        let reaper_interval_secs = env::var("KPG_REAPER_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
            .unwrap_or(DEFAULT_REAPER_INTERVAL_SECS);
        let require_live_gateway =
            env::var("KPG_REQUIRE_LIVE_GATEWAY").map(|s| &s == "1" || &s == "true").unwrap_or(false);
        let mpesa = MpesaConfig::from_env_or_default();
        Self { host, port, database_url, pending_order_ttl, reaper_interval_secs, require_live_gateway, mpesa }
    }
}

use thiserror::Error;

#[derive(Debug, Error)]
pub enum MpesaApiError {
    #[error("Could not initialize client: {0}")]
    Initialization(String),
    #[error("The payment gateway is unreachable: {0}")]
    GatewayUnavailable(String),
    #[error("The gateway rejected the request. Error {status}. {message}")]
    UpstreamRejected { status: u16, message: String },
    #[error("Invalid phone number: {0}")]
    InvalidPhoneNumber(String),
    #[error("Could not deserialize JSON: {0}")]
    JsonError(String),
    #[error("Live gateway calls are not available in simulation mode")]
    SimulationOnly,
}

impl From<reqwest::Error> for MpesaApiError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() || e.is_connect() {
            MpesaApiError::GatewayUnavailable(e.to_string())
        } else if e.is_decode() {
            MpesaApiError::JsonError(e.to_string())
        } else {
            MpesaApiError::GatewayUnavailable(e.to_string())
        }
    }
}

use actix_web::{
    error::ResponseError,
    http::{header::ContentType, StatusCode},
    HttpResponse,
};
use kula_payment_engine::PaymentGatewayError;
use mpesa_tools::MpesaApiError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("Could not initialize server. {0}")]
    InitializeError(String),
    #[error("An error occurred on the backend of the server. {0}")]
    BackendError(String),
    #[error("Could not read request body: {0}")]
    InvalidRequestBody(String),
    #[error("An I/O error happened in the server. {0}")]
    IOError(#[from] std::io::Error),
    #[error("Invalid server configuration. {0}")]
    ConfigurationError(String),
    #[error("UnspecifiedError. {0}")]
    Unspecified(String),
    #[error("The data was not found. {0}")]
    NoRecordFound(String),
    #[error("The request lost a race with another writer. {0}")]
    Conflict(String),
    #[error("Not permitted. {0}")]
    Forbidden(String),
    #[error("The payment gateway refused the request. {0}")]
    GatewayError(String),
}

impl ResponseError for ServerError {
    fn status_code(&self) -> StatusCode {
        match self {
            Self::InvalidRequestBody(_) => StatusCode::BAD_REQUEST,
            Self::InitializeError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::BackendError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::IOError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::ConfigurationError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::Unspecified(_) => StatusCode::INTERNAL_SERVER_ERROR,
            Self::NoRecordFound(_) => StatusCode::NOT_FOUND,
            Self::Conflict(_) => StatusCode::CONFLICT,
            Self::Forbidden(_) => StatusCode::FORBIDDEN,
            Self::GatewayError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code())
            .insert_header(ContentType::json())
            .body(serde_json::json!({ "error": self.to_string() }).to_string())
    }
}

impl From<PaymentGatewayError> for ServerError {
    fn from(e: PaymentGatewayError) -> Self {
        match e {
            PaymentGatewayError::OrderNotFound(_) | PaymentGatewayError::TransactionNotFound(_) => {
                Self::NoRecordFound(e.to_string())
            },
            PaymentGatewayError::OrderAlreadyExists(_) |
            PaymentGatewayError::StatusConflict { .. } |
            PaymentGatewayError::RiderAssignmentConflict(_) => Self::Conflict(e.to_string()),
            PaymentGatewayError::InvalidTransition(_) | PaymentGatewayError::InvalidCommissionRate(_) => {
                Self::InvalidRequestBody(e.to_string())
            },
            PaymentGatewayError::NotAParty { .. } => Self::Forbidden(e.to_string()),
            PaymentGatewayError::DatabaseError(_) => Self::BackendError(e.to_string()),
        }
    }
}

impl From<MpesaApiError> for ServerError {
    fn from(e: MpesaApiError) -> Self {
        match e {
            MpesaApiError::InvalidPhoneNumber(_) => Self::InvalidRequestBody(e.to_string()),
            _ => Self::GatewayError(e.to_string()),
        }
    }
}

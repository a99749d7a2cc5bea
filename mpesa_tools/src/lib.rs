//! A client for the Safaricom Daraja (M-Pesa) API.
//!
//! This crate wraps the three Daraja flows the payment gateway needs: STK push-payment initiation, B2C payouts, and
//! STK status queries, plus the OAuth token dance they all share. It also defines the wire types for the asynchronous
//! STK result callback, which the server crate deserializes and hands to the reconciler.
//!
//! The client has an explicit [`GatewayMode::Simulation`] mode for running without live credentials. In simulation
//! mode, initiation calls return synthetic correlation ids and receipts so that the rest of the system can settle
//! payments synchronously through the same reconciliation path the real callback would take.
mod api;
mod config;
mod error;

mod data_objects;
pub mod helpers;

pub use api::MpesaApi;
pub use config::{GatewayMode, MpesaConfig};
pub use data_objects::{
    B2cResponse,
    CallbackItem,
    CallbackMetadata,
    StkCallback,
    StkCallbackBody,
    StkCallbackEnvelope,
    StkPushResponse,
    StkQueryResponse,
    TokenResponse,
};
pub use error::MpesaApiError;

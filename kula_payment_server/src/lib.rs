//! Kula Payment Server
//!
//! The HTTP surface of the Kula payment gateway: order lifecycle endpoints, the M-Pesa push and callback routes,
//! payouts, and the financial audit endpoints. The heavy lifting lives in `kula_payment_engine`; this crate maps
//! requests onto the engine APIs and engine errors onto HTTP responses.
pub mod config;
pub mod data_objects;
pub mod errors;
pub mod reaper;
pub mod routes;
pub mod server;

#[cfg(test)]
mod endpoint_tests;

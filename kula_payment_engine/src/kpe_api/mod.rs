//! The engine's public APIs.
//!
//! [`OrderFlowApi`] drives the fulfillment lifecycle, [`ReconcilerApi`] applies asynchronous gateway results to the
//! ledger, and [`AuditApi`] verifies the earnings caches against the ledger and repairs drift.
pub mod audit_api;
pub mod audit_objects;
pub mod order_flow_api;
pub mod reconciler_api;

pub use audit_api::AuditApi;
pub use order_flow_api::OrderFlowApi;
pub use reconciler_api::{PaymentResult, PayoutResult, ReconcileOutcome, ReconcilerApi};

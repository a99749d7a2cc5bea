//! Kula Payment Engine
//!
//! The core of the Kula payment gateway: it reconciles the fulfillment lifecycle of food-delivery orders with
//! asynchronous, at-least-once M-Pesa payment results, while keeping the vendor/rider/platform ledger consistent
//! under concurrency and partial failure.
//!
//! The library is divided into three main sections:
//! 1. Database management and control ([`mod@sqlite`]). SQLite is the supported backend. You should never need to
//!    access the database directly; use the engine APIs instead. The exception is the data types, which are defined
//!    in [`mod@db_types`] and are public.
//! 2. The backend contract ([`mod@traits`]). A backend implements [`PaymentGatewayDatabase`] to supply the atomic
//!    conditional updates the engine relies on. All status transitions are compare-and-swap operations keyed on the
//!    current state, which is what makes duplicate callback deliveries and racing rider assignments safe.
//! 3. The engine APIs ([`OrderFlowApi`], [`ReconcilerApi`], [`AuditApi`]): order lifecycle management, payment
//!    reconciliation, and the ledger-vs-cache audit and repair job.
pub mod db_types;
pub mod helpers;
mod kpe_api;
pub mod order_flow;
mod sqlite;
pub mod traits;

#[cfg(any(feature = "test_utils", test))]
pub mod test_utils;

pub use kpe_api::{
    audit_objects,
    AuditApi,
    OrderFlowApi,
    PaymentResult,
    PayoutResult,
    ReconcileOutcome,
    ReconcilerApi,
};
pub use sqlite::SqliteDatabase;
pub use traits::{PaymentGatewayDatabase, PaymentGatewayError};

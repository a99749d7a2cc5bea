//! The interface contract a database backend must implement to support the payment engine.
//!
//! The crucial property of every method here is that state changes are *atomic conditional updates*: a transition
//! succeeds only if the stored record is still in the expected prior state. The engine leans on that for its two
//! correctness guarantees — no double-finalization of a transaction under at-least-once callback delivery, and
//! exactly one winner when two riders race to accept the same order.
mod data_objects;
mod payment_gateway_database;

pub use data_objects::{LedgerTotals, ShareTotal};
pub use payment_gateway_database::{PaymentGatewayDatabase, PaymentGatewayError};

pub mod commission;

pub use commission::{split, CommissionSplit};

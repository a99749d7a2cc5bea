mod money;

pub mod op;
mod secret;

pub use money::{Money, MoneyConversionError, KES_CURRENCY_CODE, KES_CURRENCY_CODE_LOWER};
pub use secret::Secret;

mod money;

pub mod op;
mod secret;

pub use money::{Currency, CurrencyError, Money, MoneyConversionError, DEFAULT_CURRENCY};
pub use secret::Secret;

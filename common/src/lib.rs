//! Nosco Common Types
//!
//! Shared value types used by the Nosco exchange-rate crates: currency
//! codes, timestamps and the errors raised while parsing them.

pub mod currency;
pub mod error;
pub mod time;

pub use currency::*;
pub use error::*;
pub use time::*;

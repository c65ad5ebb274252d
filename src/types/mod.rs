//! Shared types: errors, amounts, addresses and ledger keys

pub mod address;
pub mod amount;
pub mod error;

pub use address::{Address, BoostKey, ClaimKey};
pub use amount::{Amount, ParseAmountError};
pub use error::{BoostError, ErrorBody, Result};

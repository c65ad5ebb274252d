//! Database schemas for Boost Guard
//!
//! Claim records per recipient and pool totals per boost.

mod boost_pool;
mod claim_record;
mod metadata;

pub use boost_pool::{BoostPoolDoc, BOOST_POOL_COLLECTION};
pub use claim_record::{ClaimRecordDoc, CLAIM_RECORD_COLLECTION};
pub use metadata::Metadata;

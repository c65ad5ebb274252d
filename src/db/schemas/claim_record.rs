//! Claim record document schema
//!
//! One document per `(boost_id, chain_id, recipient)`. Amounts are stored as
//! decimal strings since they can exceed the range of BSON integers.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::ledger::ClaimRecord;
use crate::types::{Address, Amount, BoostError, ClaimKey, Result};

/// Collection name for claim records
pub const CLAIM_RECORD_COLLECTION: &str = "claim_records";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct ClaimRecordDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub boost_id: i64,
    pub chain_id: i64,
    pub recipient: String,

    /// Cumulative authorized amount, decimal string
    pub issued: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_signature: Option<String>,
}

impl ClaimRecordDoc {
    pub fn new(key: &ClaimKey, issued: Amount, signature: String) -> Result<Self> {
        let (boost_id, chain_id) = bson_ids(key.boost_id, key.chain_id)?;
        Ok(Self {
            _id: None,
            metadata: Metadata::new(),
            boost_id,
            chain_id,
            recipient: key.recipient.to_string(),
            issued: issued.to_string(),
            last_signature: Some(signature),
        })
    }

    /// Filter selecting the record for `key`
    pub fn filter(key: &ClaimKey) -> Result<Document> {
        let (boost_id, chain_id) = bson_ids(key.boost_id, key.chain_id)?;
        Ok(doc! {
            "boost_id": boost_id,
            "chain_id": chain_id,
            "recipient": key.recipient.as_str(),
        })
    }

    pub fn into_record(self) -> Result<ClaimRecord> {
        let issued = self
            .issued
            .parse::<Amount>()
            .map_err(|e| BoostError::Database(format!("corrupt issued `{}`: {}", self.issued, e)))?;
        let created_at = self.metadata.created_at.map(|d| d.to_chrono()).unwrap_or_default();
        let updated_at = self
            .metadata
            .updated_at
            .map(|d| d.to_chrono())
            .unwrap_or(created_at);

        Ok(ClaimRecord {
            boost_id: from_bson_id(self.boost_id)?,
            chain_id: from_bson_id(self.chain_id)?,
            recipient: Address::parse(&self.recipient)?,
            issued,
            last_signature: self.last_signature,
            created_at,
            updated_at,
        })
    }
}

/// BSON has no unsigned 64-bit integer; ids above `i64::MAX` are rejected
pub(crate) fn bson_ids(boost_id: u64, chain_id: u64) -> Result<(i64, i64)> {
    let convert = |v: u64| {
        i64::try_from(v).map_err(|_| BoostError::BadRequest(format!("id {v} exceeds storable range")))
    };
    Ok((convert(boost_id)?, convert(chain_id)?))
}

pub(crate) fn from_bson_id(v: i64) -> Result<u64> {
    u64::try_from(v).map_err(|_| BoostError::Database(format!("negative id {v} in store")))
}

impl IntoIndexes for ClaimRecordDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![
            (
                doc! { "boost_id": 1, "chain_id": 1, "recipient": 1 },
                Some(
                    IndexOptions::builder()
                        .unique(true)
                        .name("claim_key_unique".to_string())
                        .build(),
                ),
            ),
        ]
    }
}

impl MutMetadata for ClaimRecordDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

//! Boost pool document schema
//!
//! Running total authorized across all recipients of a boost. `version` is
//! bumped on every change and used for compare-and-set updates.

use bson::{doc, oid::ObjectId, Document};
use mongodb::options::IndexOptions;
use serde::{Deserialize, Serialize};

use super::claim_record::bson_ids;
use crate::db::mongo::{IntoIndexes, MutMetadata};
use crate::db::schemas::Metadata;
use crate::types::{Amount, BoostError, BoostKey, Result};

/// Collection name for boost pools
pub const BOOST_POOL_COLLECTION: &str = "boost_pools";

#[derive(Serialize, Deserialize, Clone, Debug, Default)]
pub struct BoostPoolDoc {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,

    #[serde(default)]
    pub metadata: Metadata,

    pub boost_id: i64,
    pub chain_id: i64,

    /// Total authorized, decimal string
    pub issued: String,

    pub version: i64,
}

impl BoostPoolDoc {
    pub fn new(boost: &BoostKey, issued: Amount) -> Result<Self> {
        let (boost_id, chain_id) = bson_ids(boost.id, boost.chain_id)?;
        Ok(Self {
            _id: None,
            metadata: Metadata::new(),
            boost_id,
            chain_id,
            issued: issued.to_string(),
            version: 1,
        })
    }

    pub fn filter(boost: &BoostKey) -> Result<Document> {
        let (boost_id, chain_id) = bson_ids(boost.id, boost.chain_id)?;
        Ok(doc! { "boost_id": boost_id, "chain_id": chain_id })
    }

    pub fn issued(&self) -> Result<Amount> {
        self.issued
            .parse()
            .map_err(|e| BoostError::Database(format!("corrupt pool total `{}`: {}", self.issued, e)))
    }
}

impl IntoIndexes for BoostPoolDoc {
    fn into_indices() -> Vec<(Document, Option<IndexOptions>)> {
        vec![(
            doc! { "boost_id": 1, "chain_id": 1 },
            Some(
                IndexOptions::builder()
                    .unique(true)
                    .name("boost_key_unique".to_string())
                    .build(),
            ),
        )]
    }
}

impl MutMetadata for BoostPoolDoc {
    fn mut_metadata(&mut self) -> &mut Metadata {
        &mut self.metadata
    }
}

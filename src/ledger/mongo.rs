//! MongoDB claim store
//!
//! Commits in two conditional writes: the pool total is advanced with a
//! version compare-and-set, then the claim record with a compare-and-set on
//! its `issued` value (or an insert guarded by the unique claim index). If the
//! record write loses, the pool advance is compensated.

use bson::{doc, DateTime, Document};
use tracing::{error, warn};

use super::{ClaimCommit, ClaimRecord, ClaimStore};
use crate::db::schemas::{
    BoostPoolDoc, ClaimRecordDoc, BOOST_POOL_COLLECTION, CLAIM_RECORD_COLLECTION,
};
use crate::db::{MongoClient, MongoCollection};
use crate::types::{Amount, BoostError, BoostKey, ClaimKey, Result};

const COMPENSATION_ATTEMPTS: usize = 3;

pub struct MongoClaimStore {
    records: MongoCollection<ClaimRecordDoc>,
    pools: MongoCollection<BoostPoolDoc>,
}

impl MongoClaimStore {
    pub async fn new(client: &MongoClient) -> Result<Self> {
        Ok(Self {
            records: client.collection(CLAIM_RECORD_COLLECTION).await?,
            pools: client.collection(BOOST_POOL_COLLECTION).await?,
        })
    }

    /// Advance the pool by `delta`, never past `cap`
    async fn advance_pool(&self, boost: &BoostKey, delta: Amount, cap: Amount) -> Result<()> {
        let filter = BoostPoolDoc::filter(boost)?;

        let Some(pool) = self.pools.find_one(filter.clone()).await? else {
            if delta > cap {
                return Err(pool_exhausted(boost, Amount::ZERO, delta, cap));
            }
            return if self.pools.try_insert_one(BoostPoolDoc::new(boost, delta)?).await? {
                Ok(())
            } else {
                Err(BoostError::LedgerConflict(format!("{} pool created concurrently", boost)))
            };
        };

        let current = pool.issued()?;
        let after = current
            .checked_add(delta)
            .filter(|after| *after <= cap)
            .ok_or_else(|| pool_exhausted(boost, current, delta, cap))?;

        self.swap_pool(filter, pool.version, after).await?.then_some(()).ok_or_else(|| {
            BoostError::LedgerConflict(format!("{} pool changed concurrently", boost))
        })
    }

    async fn swap_pool(&self, filter: Document, version: i64, issued: Amount) -> Result<bool> {
        let result = self
            .pools
            .update_one(pool_swap_filter(filter, version), pool_swap_update(version, issued))
            .await?;
        Ok(result.matched_count == 1)
    }

    /// Undo a pool advance whose record write did not land
    async fn release_pool(&self, boost: &BoostKey, delta: Amount) {
        for _ in 0..COMPENSATION_ATTEMPTS {
            let attempt: Result<bool> = async {
                let filter = BoostPoolDoc::filter(boost)?;
                let Some(pool) = self.pools.find_one(filter.clone()).await? else {
                    return Ok(false);
                };
                self.swap_pool(filter, pool.version, released(pool.issued()?, delta))
                    .await
            }
            .await;

            match attempt {
                Ok(true) => return,
                Ok(false) => warn!("Pool release for {} raced, retrying", boost),
                Err(e) => warn!("Pool release for {} failed: {}", boost, e),
            }
        }
        error!(
            "Could not release {} from {} pool; pool total overstates issuance",
            delta, boost
        );
    }

    /// Compare-and-set the claim record from `expected` to `issued`
    async fn swap_record(&self, commit: &ClaimCommit) -> Result<()> {
        let result = self
            .records
            .update_one(record_swap_filter(commit)?, record_swap_update(commit))
            .await?;
        if result.matched_count == 1 {
            return Ok(());
        }

        if commit.expected.is_zero() {
            let doc = ClaimRecordDoc::new(&commit.key, commit.issued, commit.signature.clone())?;
            if self.records.try_insert_one(doc).await? {
                return Ok(());
            }
        }

        Err(BoostError::LedgerConflict(format!(
            "{} no longer holds {}",
            commit.key, commit.expected
        )))
    }
}

/// Matches the pool only while it is still at `version`
fn pool_swap_filter(mut filter: Document, version: i64) -> Document {
    filter.insert("version", version);
    filter
}

fn pool_swap_update(version: i64, issued: Amount) -> Document {
    doc! {
        "$set": {
            "issued": issued.to_string(),
            "version": version + 1,
            "metadata.updated_at": DateTime::now(),
        }
    }
}

/// Pool total after handing back `delta`
fn released(current: Amount, delta: Amount) -> Amount {
    current.saturating_sub(delta)
}

/// Matches the record only while it still holds `commit.expected`
fn record_swap_filter(commit: &ClaimCommit) -> Result<Document> {
    let mut filter = ClaimRecordDoc::filter(&commit.key)?;
    filter.insert("issued", commit.expected.to_string());
    Ok(filter)
}

fn record_swap_update(commit: &ClaimCommit) -> Document {
    doc! {
        "$set": {
            "issued": commit.issued.to_string(),
            "last_signature": commit.signature.as_str(),
            "metadata.updated_at": DateTime::now(),
        }
    }
}

fn pool_exhausted(boost: &BoostKey, current: Amount, delta: Amount, cap: Amount) -> BoostError {
    BoostError::LedgerConflict(format!(
        "{} pool at {} cannot grow by {} past {}",
        boost, current, delta, cap
    ))
}

#[async_trait::async_trait]
impl ClaimStore for MongoClaimStore {
    async fn get(&self, key: &ClaimKey) -> Result<Option<ClaimRecord>> {
        self.records
            .find_one(ClaimRecordDoc::filter(key)?)
            .await?
            .map(ClaimRecordDoc::into_record)
            .transpose()
    }

    async fn pool_issued(&self, boost: &BoostKey) -> Result<Amount> {
        match self.pools.find_one(BoostPoolDoc::filter(boost)?).await? {
            Some(pool) => pool.issued(),
            None => Ok(Amount::ZERO),
        }
    }

    async fn commit(&self, commit: ClaimCommit) -> Result<ClaimRecord> {
        let delta = commit.delta()?;
        let boost = commit.key.boost();

        if !delta.is_zero() {
            self.advance_pool(&boost, delta, commit.pool_cap).await?;
        }

        if let Err(e) = self.swap_record(&commit).await {
            if !delta.is_zero() {
                self.release_pool(&boost, delta).await;
            }
            return Err(e);
        }

        self.get(&commit.key).await?.ok_or_else(|| {
            BoostError::Database(format!("{} vanished after commit", commit.key))
        })
    }

    async fn records_for(&self, boost: &BoostKey) -> Result<Vec<ClaimRecord>> {
        let docs = self.records.find_many(BoostPoolDoc::filter(boost)?).await?;
        let mut records = docs
            .into_iter()
            .map(ClaimRecordDoc::into_record)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by(|a, b| a.recipient.cmp(&b.recipient));
        Ok(records)
    }
}

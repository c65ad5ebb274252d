//! In-memory claim store
//!
//! Used in dev mode and tests. Records do not survive a restart.

use std::collections::HashMap;

use chrono::Utc;
use dashmap::DashMap;

use super::{ClaimCommit, ClaimRecord, ClaimStore};
use crate::types::{Amount, BoostError, BoostKey, ClaimKey, Result};

#[derive(Default)]
pub struct MemoryClaimStore {
    pools: DashMap<BoostKey, Amount>,
    records: DashMap<BoostKey, HashMap<ClaimKey, ClaimRecord>>,
}

impl MemoryClaimStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl ClaimStore for MemoryClaimStore {
    async fn get(&self, key: &ClaimKey) -> Result<Option<ClaimRecord>> {
        Ok(self
            .records
            .get(&key.boost())
            .and_then(|records| records.get(key).cloned()))
    }

    async fn pool_issued(&self, boost: &BoostKey) -> Result<Amount> {
        Ok(self.pools.get(boost).map(|p| *p).unwrap_or(Amount::ZERO))
    }

    async fn commit(&self, commit: ClaimCommit) -> Result<ClaimRecord> {
        let delta = commit.delta()?;
        let boost = commit.key.boost();

        // Lock order: pool entry, then record shard. Both are held until the
        // end of the function so the two writes land together.
        let mut pool = self.pools.entry(boost).or_insert(Amount::ZERO);
        let mut records = self.records.entry(boost).or_default();

        let current = records
            .get(&commit.key)
            .map(|r| r.issued)
            .unwrap_or(Amount::ZERO);
        if current != commit.expected {
            return Err(BoostError::LedgerConflict(format!(
                "{} holds {}, expected {}",
                commit.key, current, commit.expected
            )));
        }

        let pool_after = pool
            .checked_add(delta)
            .filter(|after| *after <= commit.pool_cap)
            .ok_or_else(|| {
                BoostError::LedgerConflict(format!(
                    "{} pool at {} cannot grow by {} past {}",
                    boost, *pool, delta, commit.pool_cap
                ))
            })?;

        let now = Utc::now();
        let record = records
            .entry(commit.key.clone())
            .or_insert_with(|| ClaimRecord {
                boost_id: commit.key.boost_id,
                chain_id: commit.key.chain_id,
                recipient: commit.key.recipient.clone(),
                issued: Amount::ZERO,
                last_signature: None,
                created_at: now,
                updated_at: now,
            });
        record.issued = commit.issued;
        record.last_signature = Some(commit.signature);
        record.updated_at = now;
        let record = record.clone();

        *pool = pool_after;
        Ok(record)
    }

    async fn records_for(&self, boost: &BoostKey) -> Result<Vec<ClaimRecord>> {
        let mut records: Vec<_> = self
            .records
            .get(boost)
            .map(|r| r.values().cloned().collect())
            .unwrap_or_default();
        records.sort_by(|a, b| a.recipient.cmp(&b.recipient));
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Address;

    fn commit(recipient: &str, expected: u128, issued: u128, cap: u128) -> ClaimCommit {
        ClaimCommit {
            key: ClaimKey::new(7, 1, Address::parse(recipient).unwrap()),
            expected: Amount::new(expected),
            issued: Amount::new(issued),
            pool_cap: Amount::new(cap),
            signature: format!("0x{issued:x}"),
        }
    }

    #[tokio::test]
    async fn test_commit_advances_record_and_pool() {
        let store = MemoryClaimStore::new();
        let record = store.commit(commit("0xa", 0, 40, 100)).await.unwrap();
        assert_eq!(record.issued, Amount::new(40));
        store.commit(commit("0xa", 40, 60, 100)).await.unwrap();

        assert_eq!(store.pool_issued(&BoostKey::new(7, 1)).await.unwrap(), Amount::new(60));
    }

    #[tokio::test]
    async fn test_stale_expected_is_conflict() {
        let store = MemoryClaimStore::new();
        store.commit(commit("0xa", 0, 40, 100)).await.unwrap();

        let err = store.commit(commit("0xa", 0, 40, 100)).await.unwrap_err();
        assert!(matches!(err, BoostError::LedgerConflict(_)));
        assert_eq!(store.pool_issued(&BoostKey::new(7, 1)).await.unwrap(), Amount::new(40));
    }

    #[tokio::test]
    async fn test_pool_cap_is_conflict_and_writes_nothing() {
        let store = MemoryClaimStore::new();
        store.commit(commit("0xa", 0, 80, 100)).await.unwrap();

        let err = store.commit(commit("0xb", 0, 30, 100)).await.unwrap_err();
        assert!(matches!(err, BoostError::LedgerConflict(_)));
        assert!(store
            .get(&ClaimKey::new(7, 1, Address::parse("0xb").unwrap()))
            .await
            .unwrap()
            .is_none());
        assert_eq!(store.records_for(&BoostKey::new(7, 1)).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_decrease_is_rejected() {
        let store = MemoryClaimStore::new();
        store.commit(commit("0xa", 0, 50, 100)).await.unwrap();
        let err = store.commit(commit("0xa", 50, 10, 100)).await.unwrap_err();
        assert!(matches!(err, BoostError::Internal(_)));
    }
}

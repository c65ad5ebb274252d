//! Claim Ledger
//!
//! Tracks how much has already been authorized per `(boost, chain,
//! recipient)` so that repeated status queries never re-issue an
//! entitlement, and how much of each boost's pool has been authorized in
//! total so that the sum across recipients never exceeds the balance.
//!
//! ## Issuance protocol
//!
//! 1. [`ClaimLedger::reserve`] takes the per-key lock and reads the record
//! 2. The caller signs [`Reservation::issuable`] (if non-zero)
//! 3. [`Reservation::commit`] advances the record and the pool atomically
//!
//! Dropping a reservation without committing leaves the ledger untouched,
//! which makes a failed or cancelled signing step safe to retry.

pub mod locks;
pub mod memory;
pub mod mongo;

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::OwnedMutexGuard;
use tracing::debug;

use crate::types::{Address, Amount, BoostError, BoostKey, ClaimKey, Result};

pub use locks::{spawn_prune_task, KeyedLocks};
pub use memory::MemoryClaimStore;
pub use mongo::MongoClaimStore;

/// Amount authorized so far for one recipient of one boost
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClaimRecord {
    pub boost_id: u64,
    pub chain_id: u64,
    pub recipient: Address,
    /// Monotonically non-decreasing
    pub issued: Amount,
    #[serde(default)]
    pub last_signature: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl ClaimRecord {
    pub fn key(&self) -> ClaimKey {
        ClaimKey::new(self.boost_id, self.chain_id, self.recipient.clone())
    }
}

/// Atomic advance of one claim record and its boost pool
#[derive(Debug, Clone)]
pub struct ClaimCommit {
    pub key: ClaimKey,
    /// `issued` the caller observed; the record must still hold it
    pub expected: Amount,
    /// New `issued` value, `>= expected`
    pub issued: Amount,
    /// Pool total may not exceed this (the boost balance)
    pub pool_cap: Amount,
    pub signature: String,
}

impl ClaimCommit {
    pub fn delta(&self) -> Result<Amount> {
        self.issued.checked_sub(self.expected).ok_or_else(|| {
            BoostError::Internal(format!(
                "refusing to decrease {} from {} to {}",
                self.key, self.expected, self.issued
            ))
        })
    }
}

/// Persistence behind the claim ledger
#[async_trait::async_trait]
pub trait ClaimStore: Send + Sync {
    async fn get(&self, key: &ClaimKey) -> Result<Option<ClaimRecord>>;

    /// Total authorized across all recipients of a boost
    async fn pool_issued(&self, boost: &BoostKey) -> Result<Amount>;

    /// Apply `commit` all-or-nothing.
    ///
    /// Fails with `LedgerConflict` and changes nothing if the record no
    /// longer holds `expected` or the pool would exceed `pool_cap`.
    async fn commit(&self, commit: ClaimCommit) -> Result<ClaimRecord>;

    /// Every record of a boost, for audits
    async fn records_for(&self, boost: &BoostKey) -> Result<Vec<ClaimRecord>>;
}

/// Ledger front-end: per-key serialization over a [`ClaimStore`]
pub struct ClaimLedger {
    store: Arc<dyn ClaimStore>,
    locks: Arc<KeyedLocks<ClaimKey>>,
}

impl ClaimLedger {
    pub fn new(store: Arc<dyn ClaimStore>) -> Self {
        Self {
            store,
            locks: Arc::new(KeyedLocks::new()),
        }
    }

    pub fn store(&self) -> &Arc<dyn ClaimStore> {
        &self.store
    }

    pub fn locks(&self) -> &Arc<KeyedLocks<ClaimKey>> {
        &self.locks
    }

    /// Reserve the issuable amount for `key`.
    ///
    /// `Issuable = max(0, total_entitled - issued_so_far)`, further capped by
    /// the unissued remainder of the boost pool. The returned reservation
    /// holds the key's lock until committed or dropped.
    pub async fn reserve(
        &self,
        key: ClaimKey,
        total_entitled: Amount,
        balance: Amount,
    ) -> Result<Reservation> {
        let guard = self.locks.lock(&key).await;
        let (issued_so_far, issuable) = self.assess(&key, total_entitled, balance).await?;

        debug!(
            "Reserved {}: entitled {}, issued {}, issuable {}",
            key, total_entitled, issued_so_far, issuable
        );

        Ok(Reservation {
            key,
            issued_so_far,
            issuable,
            pool_cap: balance,
            store: Arc::clone(&self.store),
            _guard: guard,
        })
    }

    /// `(issued_so_far, issuable)` for `key` as of now, without taking its
    /// lock. Only [`Self::reserve`] results may be signed.
    pub async fn assess(
        &self,
        key: &ClaimKey,
        total_entitled: Amount,
        balance: Amount,
    ) -> Result<(Amount, Amount)> {
        let issued_so_far = self
            .store
            .get(key)
            .await?
            .map(|r| r.issued)
            .unwrap_or(Amount::ZERO);
        let pool_remaining = balance.saturating_sub(self.store.pool_issued(&key.boost()).await?);
        let issuable = total_entitled
            .saturating_sub(issued_so_far)
            .min(pool_remaining);
        Ok((issued_so_far, issuable))
    }

    pub async fn record(&self, key: &ClaimKey) -> Result<Option<ClaimRecord>> {
        self.store.get(key).await
    }

    pub async fn pool_issued(&self, boost: &BoostKey) -> Result<Amount> {
        self.store.pool_issued(boost).await
    }
}

/// An exclusive, uncommitted view of one claim record
pub struct Reservation {
    key: ClaimKey,
    issued_so_far: Amount,
    issuable: Amount,
    pool_cap: Amount,
    store: Arc<dyn ClaimStore>,
    _guard: OwnedMutexGuard<()>,
}

impl Reservation {
    pub fn key(&self) -> &ClaimKey {
        &self.key
    }

    pub fn issued_so_far(&self) -> Amount {
        self.issued_so_far
    }

    pub fn issuable(&self) -> Amount {
        self.issuable
    }

    /// Record the issuance of `issuable` under `signature`
    pub async fn commit(self, signature: String) -> Result<ClaimRecord> {
        let issued = self
            .issued_so_far
            .checked_add(self.issuable)
            .ok_or_else(|| BoostError::Internal(format!("issued overflow on {}", self.key)))?;

        self.store
            .commit(ClaimCommit {
                key: self.key.clone(),
                expected: self.issued_so_far,
                issued,
                pool_cap: self.pool_cap,
                signature,
            })
            .await
    }
}

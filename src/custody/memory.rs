//! In-memory guard key custody.
//!
//! Keys are loaded from their [`KeySource`]s at startup and held until they
//! expire. Expired keys are evicted and zeroized; the next request for an
//! evicted guard reloads it from the source that lists it.
//!
//! # Security
//!
//! - Key bytes are zeroized when an entry is dropped
//! - Optional TTL bounds how long a loaded key stays in memory

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use ed25519_dalek::SigningKey;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};
use zeroize::Zeroize;

use super::source::KeySource;
use super::{guard_address, GuardSigner, KeyCustody};
use crate::types::{Address, BoostError, Result};

// =============================================================================
// Configuration
// =============================================================================

#[derive(Debug, Clone)]
pub struct CustodyConfig {
    /// How long a loaded key stays usable; `None` keeps keys until shutdown
    pub key_ttl: Option<Duration>,

    /// How often to evict expired keys
    pub cleanup_interval: Duration,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            key_ttl: None,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

// =============================================================================
// Held key
// =============================================================================

struct HeldKey {
    key_bytes: [u8; 32],
    expires_at: Option<Instant>,
}

impl HeldKey {
    fn new(key: &SigningKey, ttl: Option<Duration>) -> Self {
        Self {
            key_bytes: key.to_bytes(),
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|at| Instant::now() >= at)
    }

    fn signing_key(&self) -> SigningKey {
        SigningKey::from_bytes(&self.key_bytes)
    }
}

impl Drop for HeldKey {
    fn drop(&mut self) {
        self.key_bytes.zeroize();
    }
}

// =============================================================================
// Statistics
// =============================================================================

#[derive(Debug, Default)]
pub struct CustodyStats {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub evictions: AtomicU64,
    pub reloads: AtomicU64,
}

impl CustodyStats {
    pub fn snapshot(&self) -> CustodyStatsSnapshot {
        CustodyStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            reloads: self.reloads.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, serde::Serialize)]
pub struct CustodyStatsSnapshot {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub reloads: u64,
}

// =============================================================================
// Custody
// =============================================================================

pub struct MemoryKeyCustody {
    keys: DashMap<Address, HeldKey>,
    sources: Vec<Arc<dyn KeySource>>,
    /// One reload at a time; key derivation is deliberately expensive
    reloading: Mutex<()>,
    config: CustodyConfig,
    stats: CustodyStats,
}

impl MemoryKeyCustody {
    pub fn new(config: CustodyConfig) -> Self {
        Self::with_sources(config, Vec::new())
    }

    /// Custody that can reload keys from `sources`. Nothing is loaded until
    /// [`Self::load_all`] or the first miss.
    pub fn with_sources(config: CustodyConfig, sources: Vec<Arc<dyn KeySource>>) -> Self {
        Self {
            keys: DashMap::new(),
            sources,
            reloading: Mutex::new(()),
            config,
            stats: CustodyStats::default(),
        }
    }

    /// Custody pre-loaded with `keys`
    pub fn with_keys(config: CustodyConfig, keys: impl IntoIterator<Item = SigningKey>) -> Self {
        let custody = Self::new(config);
        for key in keys {
            custody.insert(key);
        }
        custody
    }

    /// Hold `key`, replacing (and refreshing the TTL of) any previous copy
    pub fn insert(&self, key: SigningKey) -> Address {
        let guard = guard_address(&key.verifying_key());
        self.keys
            .insert(guard.clone(), HeldKey::new(&key, self.config.key_ttl));
        debug!("Holding signing key for guard {}", guard);
        guard
    }

    /// Load every source, holding all their keys. Returns the number held.
    pub async fn load_all(&self) -> Result<usize> {
        let _reloading = self.reloading.lock().await;
        let mut loaded = 0;
        for source in &self.sources {
            let keys = load_blocking(Arc::clone(source)).await?;
            info!("Loaded {} guard key(s) from {}", keys.len(), source.describe());
            loaded += keys.len();
            for key in keys {
                self.insert(key);
            }
        }
        Ok(loaded)
    }

    /// Signer for `guard` if a live key is held; evicts an expired one
    fn held_signer(&self, guard: &Address) -> Option<GuardSigner> {
        let held = self.keys.get(guard)?;
        if !held.is_expired() {
            return Some(GuardSigner::new(held.signing_key()));
        }
        drop(held);
        if self.keys.remove_if(guard, |_, held| held.is_expired()).is_some() {
            self.stats.evictions.fetch_add(1, Ordering::Relaxed);
        }
        None
    }

    /// Reload `guard` from the sources that list it
    async fn reload(&self, guard: &Address) -> Result<Option<GuardSigner>> {
        let sources: Vec<Arc<dyn KeySource>> = self
            .sources
            .iter()
            .filter(|source| match source.guards() {
                Ok(guards) => guards.contains(guard),
                Err(e) => {
                    warn!("Cannot list guards of {}: {}", source.describe(), e);
                    false
                }
            })
            .cloned()
            .collect();
        if sources.is_empty() {
            return Ok(None);
        }

        let _reloading = self.reloading.lock().await;
        // Another request may have reloaded while we waited
        if let Some(signer) = self.held_signer(guard) {
            return Ok(Some(signer));
        }

        for source in sources {
            let keys = load_blocking(Arc::clone(&source)).await.map_err(|e| {
                BoostError::SigningUnavailable(format!(
                    "cannot reload guard {guard} from {}: {e}",
                    source.describe()
                ))
            })?;
            debug!("Reloaded {} guard key(s) from {}", keys.len(), source.describe());
            for key in keys {
                self.insert(key);
            }
        }
        self.stats.reloads.fetch_add(1, Ordering::Relaxed);
        Ok(self.held_signer(guard))
    }

    pub fn remove(&self, guard: &Address) -> bool {
        self.keys.remove(guard).is_some()
    }

    /// Evict expired keys. Returns the number removed.
    pub fn cleanup(&self) -> usize {
        let mut removed = 0;
        self.keys.retain(|guard, held| {
            if held.is_expired() {
                debug!("Guard key {} expired", guard);
                removed += 1;
                self.stats.evictions.fetch_add(1, Ordering::Relaxed);
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn stats(&self) -> CustodyStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn config(&self) -> &CustodyConfig {
        &self.config
    }
}

#[async_trait::async_trait]
impl KeyCustody for MemoryKeyCustody {
    async fn get_signer(&self, guard: &Address) -> Result<GuardSigner> {
        if let Some(signer) = self.held_signer(guard) {
            self.stats.hits.fetch_add(1, Ordering::Relaxed);
            return Ok(signer);
        }

        self.stats.misses.fetch_add(1, Ordering::Relaxed);
        self.reload(guard).await?.ok_or_else(|| {
            BoostError::SigningUnavailable(format!("no signing key held for guard {guard}"))
        })
    }

    fn guards(&self) -> Vec<Address> {
        let mut guards: Vec<Address> = self
            .keys
            .iter()
            .filter(|e| !e.value().is_expired())
            .map(|e| e.key().clone())
            .collect();
        guards.sort();
        guards
    }
}

/// Run a source load off the async workers
async fn load_blocking(source: Arc<dyn KeySource>) -> Result<Vec<SigningKey>> {
    tokio::task::spawn_blocking(move || source.load())
        .await
        .map_err(|e| BoostError::Internal(format!("key load task failed: {e}")))?
}

/// Spawn background task that evicts expired guard keys
pub fn spawn_cleanup_task(custody: Arc<MemoryKeyCustody>) -> tokio::task::JoinHandle<()> {
    let interval = custody.config.cleanup_interval;
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        loop {
            ticker.tick().await;
            let removed = custody.cleanup();
            if removed > 0 {
                info!("Evicted {} expired guard keys", removed);
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::custody::crypto::{generate_keypair, tests::light_kdf};
    use crate::custody::source::KeystoreSource;
    use crate::custody::Keystore;
    use std::sync::atomic::AtomicUsize;

    /// In-memory source counting its loads
    struct CountingSource {
        key: SigningKey,
        loads: AtomicUsize,
    }

    impl KeySource for CountingSource {
        fn describe(&self) -> String {
            "counting".into()
        }

        fn guards(&self) -> Result<Vec<Address>> {
            Ok(vec![guard_address(&self.key.verifying_key())])
        }

        fn load(&self) -> Result<Vec<SigningKey>> {
            self.loads.fetch_add(1, Ordering::SeqCst);
            Ok(vec![self.key.clone()])
        }
    }

    #[tokio::test]
    async fn test_signer_for_held_guard() {
        let (key, _) = generate_keypair();
        let custody = MemoryKeyCustody::new(CustodyConfig::default());
        let guard = custody.insert(key);

        let signer = custody.get_signer(&guard).await.unwrap();
        assert_eq!(signer.guard(), &guard);
        assert_eq!(custody.guards(), vec![guard]);
        assert_eq!(custody.stats().hits, 1);
    }

    #[tokio::test]
    async fn test_unknown_guard_is_signing_unavailable() {
        let custody = MemoryKeyCustody::new(CustodyConfig::default());
        let err = custody
            .get_signer(&Address::parse("0xdead").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BoostError::SigningUnavailable(_)));
        assert!(err.is_retryable());
        assert_eq!(custody.stats().misses, 1);
    }

    #[tokio::test]
    async fn test_expired_key_is_unavailable() {
        let (key, _) = generate_keypair();
        let custody = MemoryKeyCustody::new(CustodyConfig {
            key_ttl: Some(Duration::from_millis(1)),
            ..Default::default()
        });
        let guard = custody.insert(key);
        tokio::time::sleep(Duration::from_millis(10)).await;

        assert!(custody.guards().is_empty());
        let err = custody.get_signer(&guard).await.unwrap_err();
        assert!(matches!(err, BoostError::SigningUnavailable(_)));
        assert!(custody.is_empty());
    }

    #[test]
    fn test_cleanup_and_remove() {
        let (a, _) = generate_keypair();
        let (b, _) = generate_keypair();
        let custody = MemoryKeyCustody::with_keys(
            CustodyConfig {
                key_ttl: Some(Duration::ZERO),
                ..Default::default()
            },
            [a],
        );
        assert_eq!(custody.cleanup(), 1);

        let custody = MemoryKeyCustody::with_keys(CustodyConfig::default(), [b]);
        let guard = custody.guards().remove(0);
        assert!(custody.remove(&guard));
        assert!(custody.is_empty());
    }

    #[tokio::test]
    async fn test_expired_key_is_reloaded_from_source() {
        let (key, public) = generate_keypair();
        let source = Arc::new(CountingSource { key, loads: AtomicUsize::new(0) });
        let custody = MemoryKeyCustody::with_sources(
            CustodyConfig {
                key_ttl: Some(Duration::from_millis(5)),
                ..Default::default()
            },
            vec![source.clone()],
        );
        let guard = guard_address(&public);

        assert_eq!(custody.load_all().await.unwrap(), 1);
        assert!(custody.get_signer(&guard).await.is_ok());

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_millis(20)).await;
            let signer = custody.get_signer(&guard).await.unwrap();
            assert_eq!(signer.guard(), &guard);
        }
        assert_eq!(source.loads.load(Ordering::SeqCst), 4);
        assert_eq!(custody.stats().reloads, 3);
    }

    #[tokio::test]
    async fn test_unlisted_guard_does_not_trigger_reload() {
        let (key, _) = generate_keypair();
        let source = Arc::new(CountingSource { key, loads: AtomicUsize::new(0) });
        let custody = MemoryKeyCustody::with_sources(CustodyConfig::default(), vec![source.clone()]);

        let err = custody
            .get_signer(&Address::parse("0xdead").unwrap())
            .await
            .unwrap_err();
        assert!(matches!(err, BoostError::SigningUnavailable(_)));
        assert_eq!(source.loads.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_keystore_reload_after_expiry() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");
        let (key, public) = generate_keypair();
        Keystore::seal_with(&[key], "pw", light_kdf()).unwrap().save(&path).unwrap();

        let custody = MemoryKeyCustody::with_sources(
            CustodyConfig {
                key_ttl: Some(Duration::from_millis(5)),
                ..Default::default()
            },
            vec![Arc::new(KeystoreSource::new(&path, "pw"))],
        );
        custody.load_all().await.unwrap();
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(custody.cleanup(), 1);

        let signer = custody.get_signer(&guard_address(&public)).await.unwrap();
        assert_eq!(signer.guard(), &guard_address(&public));
    }

    #[tokio::test]
    async fn test_unreadable_source_is_signing_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("guards.json");
        let (key, public) = generate_keypair();
        Keystore::seal_with(&[key], "pw", light_kdf()).unwrap().save(&path).unwrap();

        let custody = MemoryKeyCustody::with_sources(
            CustodyConfig::default(),
            vec![Arc::new(KeystoreSource::new(&path, "wrong"))],
        );
        let err = custody.get_signer(&guard_address(&public)).await.unwrap_err();
        assert!(matches!(err, BoostError::SigningUnavailable(_)));
        assert!(err.is_retryable());
    }
}

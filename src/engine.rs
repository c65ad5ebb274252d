//! Status Query Orchestrator
//!
//! `Resolve Boost -> Evaluate Entitlement -> Reconcile Ledger -> Sign -> Respond`
//!
//! The ledger is advanced only after a signature exists, and the
//! reserve/sign/commit section runs in its own task so a caller that goes
//! away mid-request cannot leave it half done.

use std::sync::Arc;

use futures::future::join_all;
use tracing::{debug, info, warn};

use crate::boost::{Boost, RewardPreview, Status};
use crate::clock::Clock;
use crate::entitlement::EntitlementEvaluator;
use crate::ledger::ClaimLedger;
use crate::registry::{BoostRegistry, TokenResolver};
use crate::signing::{ClaimAuthorization, SignatureIssuer};
use crate::types::{Address, Amount, BoostError, ClaimKey, Result};

/// Ledger conflicts are retried this many times before surfacing
const CONFLICT_RETRIES: usize = 1;

pub struct StatusEngine {
    registry: Arc<dyn BoostRegistry>,
    tokens: Arc<dyn TokenResolver>,
    evaluator: EntitlementEvaluator,
    ledger: ClaimLedger,
    issuer: SignatureIssuer,
    clock: Arc<dyn Clock>,
}

impl StatusEngine {
    pub fn new(
        registry: Arc<dyn BoostRegistry>,
        tokens: Arc<dyn TokenResolver>,
        evaluator: EntitlementEvaluator,
        ledger: ClaimLedger,
        issuer: SignatureIssuer,
        clock: Arc<dyn Clock>,
    ) -> Self {
        Self {
            registry,
            tokens,
            evaluator,
            ledger,
            issuer,
            clock,
        }
    }

    pub fn registry(&self) -> &Arc<dyn BoostRegistry> {
        &self.registry
    }

    pub fn evaluator(&self) -> &EntitlementEvaluator {
        &self.evaluator
    }

    pub fn ledger(&self) -> &ClaimLedger {
        &self.ledger
    }

    pub fn issuer(&self) -> &SignatureIssuer {
        &self.issuer
    }

    /// `Query.boost`: `None` when the registry does not know it
    pub async fn boost(&self, id: u64, chain_id: u64) -> Result<Option<Boost>> {
        match self.find_boost(id, chain_id).await? {
            Some(boost) => Ok(Some(self.with_token(boost).await)),
            None => Ok(None),
        }
    }

    async fn find_boost(&self, id: u64, chain_id: u64) -> Result<Option<Boost>> {
        match self.registry.get_boost(id, chain_id).await {
            Ok(boost) => Ok(Some(boost)),
            Err(BoostError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// `Query.boosts`
    pub async fn boosts(&self) -> Result<Vec<Boost>> {
        let boosts = self.registry.list_boosts().await?;
        Ok(join_all(boosts.into_iter().map(|b| self.with_token(b))).await)
    }

    /// Fill in token metadata; keeps the address-only token on failure
    async fn with_token(&self, mut boost: Boost) -> Boost {
        if boost.token.is_resolved() {
            return boost;
        }
        match self.tokens.resolve(&boost.token.address, boost.chain_id).await {
            Ok(token) => boost.token = token,
            Err(e) => debug!(
                "Token {} on chain {} unresolved: {}",
                boost.token.address, boost.chain_id, e
            ),
        }
        boost
    }

    /// `Query.status`: what `recipient` may claim from the boost right now.
    ///
    /// Returns `None` for an unknown boost. A fully claimed recipient gets
    /// `amount: 0, sig: null`, never an error.
    pub async fn status(
        self: &Arc<Self>,
        boost_id: u64,
        recipient: &Address,
        chain_id: u64,
    ) -> Result<Option<Status>> {
        let Some(boost) = self.find_boost(boost_id, chain_id).await? else {
            return Ok(None);
        };

        let as_of = self.clock.now();
        let entitled = self.evaluator.entitlement(&boost, recipient, as_of)?;

        let engine = Arc::clone(self);
        let recipient = recipient.clone();
        tokio::spawn(async move { engine.issue(&boost, &recipient, entitled).await })
            .await
            .map_err(|e| BoostError::Internal(format!("issuance task failed: {e}")))?
            .map(Some)
    }

    /// Preview of what `status` would issue, leaving the ledger and the
    /// guard key untouched
    pub async fn rewards(
        &self,
        boost_id: u64,
        recipient: &Address,
        chain_id: u64,
    ) -> Result<Option<RewardPreview>> {
        let Some(boost) = self.find_boost(boost_id, chain_id).await? else {
            return Ok(None);
        };

        let entitled = self.evaluator.entitlement(&boost, recipient, self.clock.now())?;
        let key = ClaimKey::new(boost.id, boost.chain_id, recipient.clone());
        let (issued, issuable) = self.ledger.assess(&key, entitled, boost.balance).await?;

        Ok(Some(RewardPreview {
            boost_id: boost.id,
            chain_id: boost.chain_id,
            recipient: key.recipient,
            entitled,
            issued,
            issuable,
        }))
    }

    async fn issue(&self, boost: &Boost, recipient: &Address, entitled: Amount) -> Result<Status> {
        let key = ClaimKey::new(boost.id, boost.chain_id, recipient.clone());
        let mut attempt = 0;
        loop {
            match self.try_issue(boost, &key, entitled).await {
                Err(BoostError::LedgerConflict(reason)) if attempt < CONFLICT_RETRIES => {
                    attempt += 1;
                    warn!("Ledger conflict on {}: {}; reconciling again", key, reason);
                }
                Err(BoostError::LedgerConflict(reason)) => {
                    warn!("Ledger conflict on {} persisted: {}", key, reason);
                    return Err(BoostError::LedgerConflict(reason));
                }
                other => return other,
            }
        }
    }

    async fn try_issue(&self, boost: &Boost, key: &ClaimKey, entitled: Amount) -> Result<Status> {
        let reservation = self.ledger.reserve(key.clone(), entitled, boost.balance).await?;
        let amount = reservation.issuable();

        let auth = ClaimAuthorization::new(key, amount, boost.guard.clone());
        let signature = match self.issuer.sign(&auth).await {
            Ok(Some(sig)) => sig.to_string(),
            Ok(None) => return Ok(Status::unsigned(boost, &key.recipient)),
            Err(e) => {
                if matches!(e, BoostError::SigningUnavailable(_)) {
                    warn!("Cannot sign for guard {} on {}: {}", boost.guard, boost.key(), e);
                }
                return Err(e);
            }
        };

        let record = reservation.commit(signature.clone()).await?;
        info!(
            boost_id = boost.id,
            chain_id = boost.chain_id,
            recipient = %key.recipient,
            amount = %amount,
            issued_total = %record.issued,
            "Issued claim"
        );
        Ok(Status::signed(boost, &key.recipient, amount, signature))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boost::{StrategySpec, Token};
    use crate::clock::FixedClock;
    use crate::custody::{crypto::generate_keypair, CustodyConfig, KeyCustody, MemoryKeyCustody};
    use crate::ledger::{ClaimCommit, ClaimRecord, ClaimStore, MemoryClaimStore};
    use crate::registry::{BoostsDocument, StaticRegistry};
    use crate::signing::{verify_claim, ClaimSignature};
    use crate::strategy::StrategyRegistry;
    use crate::types::BoostKey;
    use ed25519_dalek::SigningKey;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicBool, Ordering};

    struct Harness {
        engine: Arc<StatusEngine>,
        custody: Arc<MemoryKeyCustody>,
        clock: Arc<FixedClock>,
        guard_key: SigningKey,
    }

    fn boost(id: u64, balance: u128, guard: &Address, strategy: Option<(&str, Value)>) -> Boost {
        Boost {
            id,
            strategy_uri: "ipfs://strategy".into(),
            balance: Amount::new(balance),
            guard: guard.clone(),
            start: 0,
            end: 9_999_999_999,
            owner: Address::parse("0x2222").unwrap(),
            chain_id: 1,
            token: Token::bare(Address::parse("0x3333").unwrap()),
            strategy: strategy.map(|(name, params)| StrategySpec {
                strategy: Some(name.into()),
                params,
            }),
        }
    }

    fn harness_with(
        make_boosts: impl FnOnce(&Address) -> Vec<Boost>,
        store: Arc<dyn ClaimStore>,
        hold_key: bool,
    ) -> Harness {
        let (guard_key, public) = generate_keypair();
        let guard = crate::custody::guard_address(&public);

        let registry = Arc::new(
            StaticRegistry::from_document(BoostsDocument {
                boosts: make_boosts(&guard),
                tokens: vec![],
            })
            .unwrap(),
        );
        let custody = Arc::new(MemoryKeyCustody::new(CustodyConfig::default()));
        if hold_key {
            custody.insert(guard_key.clone());
        }
        let clock = Arc::new(FixedClock::new(1_700_000_000));

        let engine = StatusEngine::new(
            registry.clone(),
            registry,
            EntitlementEvaluator::new(Arc::new(StrategyRegistry::builtin().unwrap())),
            ClaimLedger::new(store),
            SignatureIssuer::new(custody.clone()),
            clock.clone(),
        );
        Harness {
            engine: Arc::new(engine),
            custody,
            clock,
            guard_key,
        }
    }

    fn whitelist_harness() -> Harness {
        harness_with(
            |guard| {
                vec![boost(
                    1,
                    1000,
                    guard,
                    Some(("whitelist", json!({ "recipients": { "0xabc": "300" } }))),
                )]
            },
            Arc::new(MemoryClaimStore::new()),
            true,
        )
    }

    fn addr(s: &str) -> Address {
        Address::parse(s).unwrap()
    }

    #[tokio::test]
    async fn test_issue_once_then_zero() {
        let h = whitelist_harness();

        let first = h.engine.status(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!(first.amount, Some(Amount::new(300)));
        let sig: ClaimSignature = first.sig.as_deref().unwrap().parse().unwrap();
        let auth = ClaimAuthorization::new(
            &ClaimKey::new(1, 1, addr("0xabc")),
            Amount::new(300),
            first.guard.clone(),
        );
        assert!(verify_claim(&auth, &sig).unwrap());
        assert_eq!(
            first.guard,
            crate::custody::guard_address(&h.guard_key.verifying_key())
        );

        let second = h.engine.status(1, &addr("0xABC"), 1).await.unwrap().unwrap();
        assert_eq!(second.amount, Some(Amount::ZERO));
        assert!(second.sig.is_none());

        let wire = serde_json::to_value(&second).unwrap();
        assert_eq!(wire["amount"], json!("0"));
        assert_eq!(wire["sig"], Value::Null);
    }

    #[tokio::test]
    async fn test_rewards_preview_does_not_issue() {
        let h = whitelist_harness();

        let before = h.engine.rewards(1, &addr("0xABC"), 1).await.unwrap().unwrap();
        assert_eq!(before.entitled, Amount::new(300));
        assert_eq!(before.issued, Amount::ZERO);
        assert_eq!(before.issuable, Amount::new(300));
        assert_eq!(before.recipient, addr("0xabc"));
        assert!(h.engine.ledger().record(&ClaimKey::new(1, 1, addr("0xabc"))).await.unwrap().is_none());

        let status = h.engine.status(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!(status.amount, Some(Amount::new(300)));

        let after = h.engine.rewards(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!((after.issued, after.issuable), (Amount::new(300), Amount::ZERO));
        assert!(h.engine.rewards(99, &addr("0xabc"), 1).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_rewards_preview_needs_no_guard_key() {
        let h = harness_with(
            |guard| {
                vec![boost(
                    1,
                    1000,
                    guard,
                    Some(("whitelist", json!({ "recipients": { "0xabc": "300" } }))),
                )]
            },
            Arc::new(MemoryClaimStore::new()),
            false,
        );
        let preview = h.engine.rewards(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!(preview.issuable, Amount::new(300));
        assert!(h.custody.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_boost_is_none() {
        let h = whitelist_harness();
        assert!(h.engine.status(99, &addr("0xabc"), 1).await.unwrap().is_none());
        assert!(h.engine.boost(1, 2).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_unlisted_and_closed_are_unsigned_zero() {
        let h = whitelist_harness();
        let other = h.engine.status(1, &addr("0xdef"), 1).await.unwrap().unwrap();
        assert_eq!(other.amount, Some(Amount::ZERO));
        assert!(other.sig.is_none());

        h.clock.set(10_000_000_000);
        let late = h.engine.status(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!(late.amount, Some(Amount::ZERO));
        assert!(late.sig.is_none());
    }

    #[tokio::test]
    async fn test_no_strategy_never_signs() {
        let h = harness_with(
            |guard| vec![boost(1, 1000, guard, None)],
            Arc::new(MemoryClaimStore::new()),
            true,
        );
        let status = h.engine.status(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!(status.amount, Some(Amount::ZERO));
        assert!(status.sig.is_none());
    }

    #[tokio::test]
    async fn test_signing_unavailable_leaves_ledger_untouched() {
        let h = harness_with(
            |guard| {
                vec![boost(
                    1,
                    1000,
                    guard,
                    Some(("whitelist", json!({ "recipients": { "0xabc": "300" } }))),
                )]
            },
            Arc::new(MemoryClaimStore::new()),
            false,
        );

        let err = h.engine.status(1, &addr("0xabc"), 1).await.unwrap_err();
        assert!(matches!(err, BoostError::SigningUnavailable(_)));
        let key = ClaimKey::new(1, 1, addr("0xabc"));
        assert!(h.engine.ledger().record(&key).await.unwrap().is_none());

        h.custody.insert(h.guard_key.clone());
        let retry = h.engine.status(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!(retry.amount, Some(Amount::new(300)));
        assert!(retry.sig.is_some());
    }

    #[tokio::test]
    async fn test_invalid_params_surface() {
        let h = harness_with(
            |guard| vec![boost(1, 1000, guard, Some(("whitelist", json!({ "recipients": [] }))))],
            Arc::new(MemoryClaimStore::new()),
            true,
        );
        let err = h.engine.status(1, &addr("0xabc"), 1).await.unwrap_err();
        assert!(matches!(err, BoostError::InvalidStrategyParams(_)));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn test_concurrent_status_sums_to_entitlement() {
        let h = harness_with(
            |guard| {
                vec![boost(
                    1,
                    1000,
                    guard,
                    Some(("whitelist", json!({ "recipients": { "0xabc": "100" } }))),
                )]
            },
            Arc::new(MemoryClaimStore::new()),
            true,
        );

        let calls = (0..10).map(|_| {
            let engine = Arc::clone(&h.engine);
            tokio::spawn(async move { engine.status(1, &addr("0xabc"), 1).await })
        });
        let mut total = 0u128;
        let mut signed = 0;
        for result in join_all(calls).await {
            let status = result.unwrap().unwrap().unwrap();
            total += status.amount.unwrap().get();
            signed += usize::from(status.sig.is_some());
        }
        assert_eq!(total, 100);
        assert_eq!(signed, 1);
    }

    #[tokio::test]
    async fn test_conservation_across_recipients() {
        let h = harness_with(
            |guard| {
                vec![boost(
                    1,
                    1000,
                    guard,
                    Some(("whitelist", json!({ "recipients": { "0xa": "700", "0xb": "700" } }))),
                )]
            },
            Arc::new(MemoryClaimStore::new()),
            true,
        );

        let a = h.engine.status(1, &addr("0xa"), 1).await.unwrap().unwrap();
        let b = h.engine.status(1, &addr("0xb"), 1).await.unwrap().unwrap();
        assert_eq!(a.amount, Some(Amount::new(700)));
        assert_eq!(b.amount, Some(Amount::new(300)));
        assert_eq!(
            h.engine.ledger().pool_issued(&BoostKey::new(1, 1)).await.unwrap(),
            Amount::new(1000)
        );
    }

    /// Loses the first commit to a simulated concurrent writer
    struct FlakyStore {
        inner: MemoryClaimStore,
        failed_once: AtomicBool,
    }

    #[async_trait::async_trait]
    impl ClaimStore for FlakyStore {
        async fn get(&self, key: &ClaimKey) -> Result<Option<ClaimRecord>> {
            self.inner.get(key).await
        }

        async fn pool_issued(&self, boost: &BoostKey) -> Result<Amount> {
            self.inner.pool_issued(boost).await
        }

        async fn commit(&self, commit: ClaimCommit) -> Result<ClaimRecord> {
            if !self.failed_once.swap(true, Ordering::SeqCst) {
                return Err(BoostError::LedgerConflict("lost race".into()));
            }
            self.inner.commit(commit).await
        }

        async fn records_for(&self, boost: &BoostKey) -> Result<Vec<ClaimRecord>> {
            self.inner.records_for(boost).await
        }
    }

    #[tokio::test]
    async fn test_ledger_conflict_retried_once() {
        let h = harness_with(
            |guard| {
                vec![boost(
                    1,
                    1000,
                    guard,
                    Some(("whitelist", json!({ "recipients": { "0xabc": "300" } }))),
                )]
            },
            Arc::new(FlakyStore {
                inner: MemoryClaimStore::new(),
                failed_once: AtomicBool::new(false),
            }),
            true,
        );

        let status = h.engine.status(1, &addr("0xabc"), 1).await.unwrap().unwrap();
        assert_eq!(status.amount, Some(Amount::new(300)));
        assert!(status.sig.is_some());
    }

    #[tokio::test]
    async fn test_boosts_fall_back_to_bare_token() {
        let h = whitelist_harness();
        let boosts = h.engine.boosts().await.unwrap();
        assert_eq!(boosts.len(), 1);
        assert_eq!(boosts[0].token, Token::bare(addr("0x3333")));
        assert_eq!(h.custody.guards().len(), 1);
    }
}

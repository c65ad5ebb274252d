//! Strategy registry
//!
//! Built once at startup through [`StrategyRegistryBuilder`]; the resulting
//! [`StrategyRegistry`] has no mutation API, so every replica evaluates the
//! same name to the same code for the life of the process.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::debug;

use super::{EvenSplit, LinearVesting, ProposalIncentive, Strategy, Whitelist};
use crate::types::{BoostError, Result};

/// Collects strategies before serving begins
#[derive(Default)]
pub struct StrategyRegistryBuilder {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistryBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `strategy` under `name`. Names are unique.
    pub fn register(mut self, name: &str, strategy: impl Strategy + 'static) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(BoostError::Config("strategy name is empty".into()));
        }
        if self.strategies.contains_key(name) {
            return Err(BoostError::Config(format!(
                "strategy `{name}` registered twice"
            )));
        }
        debug!("Registered strategy '{}'", name);
        self.strategies.insert(name.to_string(), Arc::new(strategy));
        Ok(self)
    }

    pub fn build(self) -> StrategyRegistry {
        StrategyRegistry {
            strategies: self.strategies,
        }
    }
}

/// Read-only name -> strategy map
pub struct StrategyRegistry {
    strategies: BTreeMap<String, Arc<dyn Strategy>>,
}

impl StrategyRegistry {
    pub fn builder() -> StrategyRegistryBuilder {
        StrategyRegistryBuilder::new()
    }

    /// Registry with every built-in strategy
    pub fn builtin() -> Result<Self> {
        Ok(Self::builder()
            .register("whitelist", Whitelist)?
            .register("even", EvenSplit)?
            .register("proposal", ProposalIncentive)?
            .register("vesting", LinearVesting)?
            .build())
    }

    pub fn resolve(&self, name: &str) -> Result<Arc<dyn Strategy>> {
        self.strategies
            .get(name)
            .cloned()
            .ok_or_else(|| BoostError::UnknownStrategy(name.to_string()))
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.strategies.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }
}

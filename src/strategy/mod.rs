//! Eligibility strategies
//!
//! A strategy turns `(boost, recipient, params, asOfTime)` into the total
//! amount the recipient is entitled to. Strategies are a closed set compiled
//! into the binary and registered once at startup; params are untrusted data
//! and are only ever parsed, never executed.
//!
//! ## Built-ins
//!
//! - **whitelist**: fixed amount per listed recipient
//! - **even**: balance split evenly across listed recipients
//! - **proposal**: vote-snapshot incentives (incentive or bribe eligibility,
//!   weighted or even distribution)
//! - **vesting**: fixed amounts released linearly across the claim window

pub mod even;
pub mod proposal;
pub mod registry;
pub mod vesting;
pub mod whitelist;

use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{self, DeserializeOwned, MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value as JsonValue;

use crate::boost::Boost;
use crate::types::{Address, Amount};

pub use even::EvenSplit;
pub use proposal::ProposalIncentive;
pub use registry::{StrategyRegistry, StrategyRegistryBuilder};
pub use vesting::LinearVesting;
pub use whitelist::Whitelist;

/// Inputs every evaluator sees
#[derive(Debug, Clone, Copy)]
pub struct EvalContext<'a> {
    pub boost: &'a Boost,
    pub recipient: &'a Address,
    pub as_of: u64,
}

/// Params rejected by a strategy schema
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParamsError(pub String);

impl fmt::Display for ParamsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::error::Error for ParamsError {}

/// Object-safe face of a strategy, as stored in the registry.
///
/// Implementations must be pure: no I/O, no clocks, no interior mutability
/// that changes results.
pub trait Strategy: Send + Sync {
    /// Check params against the strategy schema
    fn validate(&self, params: &JsonValue) -> Result<(), ParamsError>;

    /// Compute the recipient's total entitlement
    fn evaluate(&self, ctx: &EvalContext<'_>, params: &JsonValue) -> Result<Amount, ParamsError>;
}

/// Strategy with a typed params schema.
///
/// Deserializing into `Params` is the structural schema check; `check` adds
/// semantic rules serde cannot express.
pub trait TypedStrategy: Send + Sync {
    type Params: DeserializeOwned;

    fn check(&self, _params: &Self::Params) -> Result<(), ParamsError> {
        Ok(())
    }

    fn entitlement(&self, ctx: &EvalContext<'_>, params: &Self::Params) -> Amount;
}

fn parse_params<T: TypedStrategy>(strategy: &T, params: &JsonValue) -> Result<T::Params, ParamsError> {
    let parsed = T::Params::deserialize(params).map_err(|e| ParamsError(e.to_string()))?;
    strategy.check(&parsed)?;
    Ok(parsed)
}

impl<T: TypedStrategy> Strategy for T {
    fn validate(&self, params: &JsonValue) -> Result<(), ParamsError> {
        parse_params(self, params).map(|_| ())
    }

    fn evaluate(&self, ctx: &EvalContext<'_>, params: &JsonValue) -> Result<Amount, ParamsError> {
        let parsed = parse_params(self, params)?;
        Ok(self.entitlement(ctx, &parsed))
    }
}

/// Address-keyed params map. `0xABC` and `0xabc` are the same recipient, so
/// listing both is rejected instead of letting one silently win.
pub(crate) fn unique_address_map<'de, D, V>(deserializer: D) -> Result<HashMap<Address, V>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct UniqueAddressMap<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for UniqueAddressMap<V> {
        type Value = HashMap<Address, V>;

        fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
            f.write_str("a map keyed by recipient address")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = HashMap::with_capacity(map.size_hint().unwrap_or(0));
            while let Some((address, value)) = map.next_entry::<Address, V>()? {
                if entries.contains_key(&address) {
                    return Err(de::Error::custom(format!(
                        "recipient {address} is listed more than once"
                    )));
                }
                entries.insert(address, value);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(UniqueAddressMap(PhantomData))
}

//! Entitlement Evaluator
//!
//! Computes the total a recipient may claim from a boost as of a point in
//! time. Evaluation is synchronous and deterministic: the only time input is
//! `as_of`, so a signature issued over the result stays independently
//! reproducible.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::boost::Boost;
use crate::strategy::{EvalContext, StrategyRegistry};
use crate::types::{Address, Amount, BoostError, Result};

pub struct EntitlementEvaluator {
    strategies: Arc<StrategyRegistry>,
}

impl EntitlementEvaluator {
    pub fn new(strategies: Arc<StrategyRegistry>) -> Self {
        Self { strategies }
    }

    pub fn strategies(&self) -> &StrategyRegistry {
        &self.strategies
    }

    /// Total entitlement of `recipient` under `boost` at `as_of`, in
    /// `[0, boost.balance]`.
    ///
    /// Outside the claim window or without a strategy the entitlement is zero.
    /// Unknown strategies and params that fail the schema are errors; nothing
    /// is guessed.
    pub fn entitlement(&self, boost: &Boost, recipient: &Address, as_of: u64) -> Result<Amount> {
        if !boost.is_open_at(as_of) {
            debug!(
                "{} closed at {} (window {}..={})",
                boost.key(),
                as_of,
                boost.start,
                boost.end
            );
            return Ok(Amount::ZERO);
        }

        let Some(name) = boost.strategy_name() else {
            return Ok(Amount::ZERO);
        };
        let strategy = self.strategies.resolve(name)?;
        let params = boost
            .strategy
            .as_ref()
            .map(|s| &s.params)
            .unwrap_or(&serde_json::Value::Null);

        let ctx = EvalContext {
            boost,
            recipient,
            as_of,
        };
        let raw = strategy.evaluate(&ctx, params).map_err(|e| {
            BoostError::InvalidStrategyParams(format!("{} ({}): {}", boost.key(), name, e))
        })?;

        if raw > boost.balance {
            warn!(
                "Strategy '{}' returned {} for {} on {}, above balance {}; clamping",
                name,
                raw,
                recipient,
                boost.key(),
                boost.balance
            );
            return Ok(boost.balance);
        }
        Ok(raw)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boost::fixtures;
    use crate::strategy::{EvalContext, TypedStrategy};
    use serde::Deserialize;
    use serde_json::json;

    /// Always claims more than any pool holds
    struct Greedy;

    #[derive(Deserialize)]
    struct NoParams {}

    impl TypedStrategy for Greedy {
        type Params = NoParams;

        fn entitlement(&self, _ctx: &EvalContext<'_>, _params: &NoParams) -> Amount {
            Amount::MAX
        }
    }

    fn evaluator() -> EntitlementEvaluator {
        let registry = StrategyRegistry::builder()
            .register("whitelist", crate::strategy::Whitelist)
            .unwrap()
            .register("greedy", Greedy)
            .unwrap()
            .build();
        EntitlementEvaluator::new(Arc::new(registry))
    }

    fn recipient() -> Address {
        Address::parse("0xabc").unwrap()
    }

    #[test]
    fn test_no_strategy_is_zero() {
        let boost = fixtures::boost(1, 1000, None);
        for as_of in [0, 5, 9_999_999_999] {
            assert_eq!(evaluator().entitlement(&boost, &recipient(), as_of).unwrap(), Amount::ZERO);
        }
    }

    #[test]
    fn test_outside_window_is_zero() {
        let mut boost = fixtures::boost(
            1,
            1000,
            Some(("whitelist", json!({ "recipients": { "0xabc": "300" } }))),
        );
        boost.start = 100;
        boost.end = 200;
        let eval = evaluator();
        assert_eq!(eval.entitlement(&boost, &recipient(), 99).unwrap(), Amount::ZERO);
        assert_eq!(eval.entitlement(&boost, &recipient(), 201).unwrap(), Amount::ZERO);
        assert_eq!(eval.entitlement(&boost, &recipient(), 150).unwrap(), Amount::new(300));
    }

    #[test]
    fn test_outside_window_skips_param_validation() {
        let mut boost = fixtures::boost(1, 1000, Some(("whitelist", json!("garbage"))));
        boost.start = 100;
        boost.end = 200;
        assert_eq!(evaluator().entitlement(&boost, &recipient(), 300).unwrap(), Amount::ZERO);
    }

    #[test]
    fn test_invalid_params_fail_closed() {
        let boost = fixtures::boost(1, 1000, Some(("whitelist", json!({ "recipients": 3 }))));
        let err = evaluator().entitlement(&boost, &recipient(), 10).unwrap_err();
        assert!(matches!(err, BoostError::InvalidStrategyParams(_)));
    }

    #[test]
    fn test_unknown_strategy() {
        let boost = fixtures::boost(1, 1000, Some(("quadratic", json!({}))));
        let err = evaluator().entitlement(&boost, &recipient(), 10).unwrap_err();
        assert!(matches!(err, BoostError::UnknownStrategy(_)));
    }

    #[test]
    fn test_over_balance_is_clamped() {
        let boost = fixtures::boost(1, 1000, Some(("greedy", json!({}))));
        assert_eq!(
            evaluator().entitlement(&boost, &recipient(), 10).unwrap(),
            Amount::new(1000)
        );
    }
}

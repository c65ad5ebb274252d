//! Even split: the funded balance divided equally among listed recipients

use std::collections::BTreeSet;

use serde::Deserialize;

use super::{EvalContext, ParamsError, TypedStrategy};
use crate::types::{Address, Amount};

#[derive(Debug, Clone, Copy, Default)]
pub struct EvenSplit;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EvenParams {
    /// Duplicate entries collapse to one share
    pub recipients: BTreeSet<Address>,

    /// Optional per-recipient ceiling
    #[serde(default)]
    pub cap: Option<Amount>,
}

impl TypedStrategy for EvenSplit {
    type Params = EvenParams;

    fn check(&self, params: &EvenParams) -> Result<(), ParamsError> {
        if params.recipients.is_empty() {
            return Err(ParamsError("recipients must not be empty".into()));
        }
        Ok(())
    }

    fn entitlement(&self, ctx: &EvalContext<'_>, params: &EvenParams) -> Amount {
        if !params.recipients.contains(ctx.recipient) {
            return Amount::ZERO;
        }

        let share = ctx
            .boost
            .balance
            .mul_div(1, params.recipients.len() as u128)
            .unwrap_or(Amount::ZERO);

        match params.cap {
            Some(cap) => share.min(cap),
            None => share,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::boost::fixtures;
    use crate::strategy::Strategy;
    use serde_json::json;

    fn eval(balance: u128, params: serde_json::Value, who: &str) -> Amount {
        let boost = fixtures::boost(1, balance, None);
        let recipient = Address::parse(who).unwrap();
        let ctx = EvalContext { boost: &boost, recipient: &recipient, as_of: 1 };
        EvenSplit.evaluate(&ctx, &params).unwrap()
    }

    #[test]
    fn test_floor_split() {
        let params = json!({ "recipients": ["0xa", "0xb", "0xc"] });
        assert_eq!(eval(1000, params.clone(), "0xa"), Amount::new(333));
        assert_eq!(eval(1000, params, "0xd"), Amount::ZERO);
    }

    #[test]
    fn test_duplicates_collapse() {
        let params = json!({ "recipients": ["0xa", "0xA"] });
        assert_eq!(eval(1000, params, "0xa"), Amount::new(1000));
    }

    #[test]
    fn test_cap() {
        let params = json!({ "recipients": ["0xa", "0xb"], "cap": "100" });
        assert_eq!(eval(1000, params, "0xb"), Amount::new(100));
    }

    #[test]
    fn test_empty_rejected() {
        assert!(EvenSplit.validate(&json!({ "recipients": [] })).is_err());
    }
}

//! Linear vesting: listed amounts unlock linearly over the claim window

use std::collections::HashMap;

use serde::Deserialize;

use super::{EvalContext, TypedStrategy};
use crate::types::{Address, Amount};

#[derive(Debug, Clone, Copy, Default)]
pub struct LinearVesting;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VestingParams {
    /// Fully vested amount per recipient
    #[serde(deserialize_with = "super::unique_address_map")]
    pub recipients: HashMap<Address, Amount>,

    /// Nothing vests before this Unix timestamp
    #[serde(default)]
    pub cliff: Option<u64>,
}

impl TypedStrategy for LinearVesting {
    type Params = VestingParams;

    fn entitlement(&self, ctx: &EvalContext<'_>, params: &VestingParams) -> Amount {
        let Some(&total) = params.recipients.get(ctx.recipient) else {
            return Amount::ZERO;
        };
        if params.cliff.is_some_and(|cliff| ctx.as_of < cliff) {
            return Amount::ZERO;
        }

        let (start, end) = (ctx.boost.start, ctx.boost.end);
        if ctx.as_of >= end || end <= start {
            return total;
        }
        let elapsed = ctx.as_of.saturating_sub(start);
        total
            .mul_div(elapsed as u128, (end - start) as u128)
            .unwrap_or(Amount::ZERO)
    }
}

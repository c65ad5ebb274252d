//! Whitelist strategy: a fixed amount per listed recipient

use std::collections::HashMap;

use serde::Deserialize;

use super::{EvalContext, TypedStrategy};
use crate::types::{Address, Amount};

#[derive(Debug, Clone, Copy, Default)]
pub struct Whitelist;

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WhitelistParams {
    #[serde(deserialize_with = "super::unique_address_map")]
    pub recipients: HashMap<Address, Amount>,
}

impl TypedStrategy for Whitelist {
    type Params = WhitelistParams;

    fn entitlement(&self, ctx: &EvalContext<'_>, params: &WhitelistParams) -> Amount {
        params
            .recipients
            .get(ctx.recipient)
            .copied()
            .unwrap_or(Amount::ZERO)
    }
}

//! Proposal incentive strategy
//!
//! Rewards voters on a governance proposal from a vote snapshot carried in
//! the params. Eligibility is either every voter (`incentive`) or only those
//! who voted a specific choice (`bribe`). Rewards are distributed by voting
//! power (`weighted`) or equally among eligible voters (`even`), optionally
//! capped per voter by `limit`.
//!
//! Only `single-choice` and `basic` proposals can be boosted, and nothing is
//! claimable until the proposal's voting period has ended.

use std::collections::HashMap;

use serde::Deserialize;

use super::{EvalContext, ParamsError, TypedStrategy};
use crate::types::{Address, Amount};

/// Voting systems whose outcome maps onto one choice per voter
const BOOSTABLE_TYPES: [&str; 2] = ["single-choice", "basic"];

#[derive(Debug, Clone, Copy, Default)]
pub struct ProposalIncentive;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum Eligibility {
    /// Everyone who voted, regardless of choice
    Incentive {},
    /// Only voters of `choice`
    Bribe { choice: u32 },
}

impl Eligibility {
    fn admits(&self, vote: &Vote) -> bool {
        match self {
            Self::Incentive {} => true,
            Self::Bribe { choice } => vote.choice == *choice,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", deny_unknown_fields)]
pub enum Distribution {
    Weighted {
        #[serde(default)]
        limit: Option<Amount>,
    },
    Even {
        #[serde(default)]
        limit: Option<Amount>,
    },
}

impl Distribution {
    fn limit(&self) -> Option<Amount> {
        match self {
            Self::Weighted { limit } | Self::Even { limit } => *limit,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Vote {
    pub choice: u32,
    /// Voting power in base units
    pub vp: Amount,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields, rename_all = "camelCase")]
pub struct ProposalParams {
    pub proposal: String,
    /// Voting system of the proposal
    #[serde(rename = "type")]
    pub proposal_type: String,
    /// End of the voting period (Unix seconds)
    pub end: u64,
    pub eligibility: Eligibility,
    pub distribution: Distribution,
    #[serde(deserialize_with = "super::unique_address_map")]
    pub votes: HashMap<Address, Vote>,
    /// Total score of the proposal; defaults to the sum of snapshot votes
    #[serde(default)]
    pub scores_total: Option<Amount>,
}

impl ProposalParams {
    fn votes_total(&self) -> Option<Amount> {
        self.votes
            .values()
            .try_fold(Amount::ZERO, |acc, vote| acc.checked_add(vote.vp))
    }
}

impl TypedStrategy for ProposalIncentive {
    type Params = ProposalParams;

    fn check(&self, params: &ProposalParams) -> Result<(), ParamsError> {
        if params.proposal.trim().is_empty() {
            return Err(ParamsError("proposal id is empty".into()));
        }
        if !BOOSTABLE_TYPES.contains(&params.proposal_type.as_str()) {
            return Err(ParamsError(format!(
                "`{}` proposals are not eligible for boosting",
                params.proposal_type
            )));
        }
        let votes_total = params
            .votes_total()
            .ok_or_else(|| ParamsError("sum of voting power overflows".into()))?;
        if let Some(total) = params.scores_total {
            if total < votes_total {
                return Err(ParamsError(format!(
                    "scoresTotal {total} is below the snapshot total {votes_total}"
                )));
            }
        }
        Ok(())
    }

    fn entitlement(&self, ctx: &EvalContext<'_>, params: &ProposalParams) -> Amount {
        if ctx.as_of < params.end {
            return Amount::ZERO;
        }
        let Some(vote) = params.votes.get(ctx.recipient) else {
            return Amount::ZERO;
        };
        if !params.eligibility.admits(vote) {
            return Amount::ZERO;
        }

        let pool = ctx.boost.balance;
        let reward = match params.distribution {
            Distribution::Weighted { .. } => {
                let total = params
                    .scores_total
                    .or_else(|| params.votes_total())
                    .unwrap_or(Amount::ZERO);
                pool.mul_div(vote.vp.get(), total.get())
            }
            Distribution::Even { .. } => {
                let eligible = params
                    .votes
                    .values()
                    .filter(|v| params.eligibility.admits(v))
                    .count();
                pool.mul_div(1, eligible as u128)
            }
        }
        .unwrap_or(Amount::ZERO);

        match params.distribution.limit() {
            Some(limit) => reward.min(limit),
            None => reward,
        }
    }
}

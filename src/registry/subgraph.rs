//! GraphQL-backed registry
//!
//! Reads boosts and tokens from an indexer that exposes the public boost
//! schema over HTTP POST.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use super::{BoostRegistry, TokenResolver};
use crate::boost::{Boost, Token};
use crate::types::{Address, BoostError, BoostKey, Result};

const BOOST_FIELDS: &str = "id strategyURI balance guard start end owner chainId \
     token { address name symbol decimals } strategy { strategy params }";

#[derive(Debug, Deserialize)]
struct GraphQLResponse<T> {
    data: Option<T>,
    #[serde(default)]
    errors: Vec<GraphQLError>,
}

#[derive(Debug, Deserialize)]
struct GraphQLError {
    message: String,
}

#[derive(Debug, Deserialize)]
struct BoostData {
    boost: Option<Boost>,
}

#[derive(Debug, Deserialize)]
struct BoostsData {
    boosts: Vec<Option<Boost>>,
}

#[derive(Debug, Deserialize)]
struct TokenData {
    token: Option<Token>,
}

pub struct SubgraphRegistry {
    url: String,
    http_client: reqwest::Client,
}

impl SubgraphRegistry {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Result<Self> {
        let url = url.into();
        reqwest::Url::parse(&url)
            .map_err(|e| BoostError::Config(format!("Invalid SUBGRAPH_URL `{url}`: {e}")))?;

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .user_agent(concat!("boost-guard/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| BoostError::Config(format!("Cannot build subgraph HTTP client: {e}")))?;

        Ok(Self { url, http_client })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    async fn query<T: DeserializeOwned>(&self, query: &str, variables: serde_json::Value) -> Result<T> {
        debug!(url = %self.url, "Subgraph query");
        let response = self
            .http_client
            .post(&self.url)
            .json(&json!({ "query": query, "variables": variables }))
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(BoostError::Upstream(format!("subgraph returned HTTP {status}")));
        }

        let body: GraphQLResponse<T> = response
            .json()
            .await
            .map_err(|e| BoostError::Upstream(format!("undecodable subgraph response: {e}")))?;

        if let Some(err) = body.errors.first() {
            return Err(BoostError::Upstream(format!("subgraph error: {}", err.message)));
        }
        body.data
            .ok_or_else(|| BoostError::Upstream("subgraph response has no data".into()))
    }
}

fn checked(boost: Boost) -> Result<Boost> {
    boost.validate()?;
    Ok(boost)
}

#[async_trait::async_trait]
impl BoostRegistry for SubgraphRegistry {
    async fn get_boost(&self, id: u64, chain_id: u64) -> Result<Boost> {
        let query = format!(
            "query Boost($id: Int!, $chainId: Int!) {{ boost(id: $id, chainId: $chainId) {{ {BOOST_FIELDS} }} }}"
        );
        let data: BoostData = self
            .query(&query, json!({ "id": id, "chainId": chain_id }))
            .await?;

        let boost = data
            .boost
            .ok_or_else(|| BoostError::NotFound(BoostKey::new(id, chain_id).to_string()))?;
        if boost.key() != BoostKey::new(id, chain_id) {
            return Err(BoostError::Upstream(format!(
                "asked for {} but subgraph returned {}",
                BoostKey::new(id, chain_id),
                boost.key()
            )));
        }
        checked(boost)
    }

    async fn list_boosts(&self) -> Result<Vec<Boost>> {
        let query = format!("query Boosts {{ boosts {{ {BOOST_FIELDS} }} }}");
        let data: BoostsData = self.query(&query, json!({})).await?;
        data.boosts.into_iter().flatten().map(checked).collect()
    }

    async fn ping(&self) -> Result<()> {
        self.query::<serde_json::Value>("query Ping { __typename }", json!({}))
            .await
            .map(|_| ())
    }

    fn name(&self) -> &'static str {
        "subgraph"
    }
}

#[async_trait::async_trait]
impl TokenResolver for SubgraphRegistry {
    async fn resolve(&self, address: &Address, chain_id: u64) -> Result<Token> {
        let query = "query Token($address: String!, $chainId: Int!) { \
             token(address: $address, chainId: $chainId) { address name symbol decimals } }";
        let data: TokenData = self
            .query(query, json!({ "address": address, "chainId": chain_id }))
            .await?;
        data.token
            .ok_or_else(|| BoostError::NotFound(format!("token {address} on chain {chain_id}")))
    }
}

use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use common::types::{Hash32, RewardsData};
use reqwest::{Client, Response, StatusCode};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::{
    chain::{ChainClient, RewardManager, RewardsSource},
    error::{ChainError, EPOCH_NOT_ENDED},
};

/// HTTP client for the signing gateway (contract reads and signed
/// submissions) and the rewards-data service.
#[derive(Clone)]
pub struct GatewayClient {
    base_url: Url,
    rewards_url: Url,
    client: Client,
}

#[derive(Deserialize, Debug)]
struct EpochResponse {
    epoch: u64,
}

#[derive(Deserialize, Debug)]
struct HashResponse {
    hash: Hash32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct UptimeVoteReq {
    vote_hash: Hash32,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct RewardsReq {
    rewards_hash: Hash32,
    weight_based_claims: u64,
}

#[derive(Deserialize, Debug, Default)]
struct ErrorBody {
    kind: Option<String>,
    reason: Option<String>,
    message: Option<String>,
}

impl GatewayClient {
    pub fn new(base_url: Url, rewards_url: Url) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self {
            base_url,
            rewards_url,
            client,
        })
    }
}

impl ChainClient for GatewayClient {
    fn reward_manager(&self, address: &str) -> Result<Arc<dyn RewardManager>> {
        if address.trim().is_empty() {
            return Err(anyhow!("reward manager address is empty"));
        }
        Ok(Arc::new(GatewayRewardManager {
            gateway: self.clone(),
            address: address.to_string(),
        }))
    }
}

#[async_trait]
impl RewardsSource for GatewayClient {
    async fn fetch_rewards_data(&self, epoch: u64) -> Result<RewardsData, ChainError> {
        let url = endpoint(&self.rewards_url, &["epochs", epoch.to_string().as_str()])?;
        let res = self
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send rewards data request")?;

        let data = check(res)
            .await?
            .json::<RewardsData>()
            .await
            .context("Failed to parse rewards data response")?;

        Ok(data)
    }
}

/// Reward manager bound to one contract address through the gateway.
pub struct GatewayRewardManager {
    gateway: GatewayClient,
    address: String,
}

impl GatewayRewardManager {
    fn url(&self, tail: &[&str]) -> Result<Url> {
        let mut segments = vec!["reward-managers", self.address.as_str()];
        segments.extend_from_slice(tail);
        endpoint(&self.gateway.base_url, &segments)
    }

    async fn read_hash(&self, epoch: u64, which: &str) -> Result<Hash32, ChainError> {
        let url = self.url(&["epochs", epoch.to_string().as_str(), which])?;
        let res = self
            .gateway
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to send {which} request"))?;

        let body = check(res)
            .await?
            .json::<HashResponse>()
            .await
            .with_context(|| format!("Failed to parse {which} response"))?;

        Ok(body.hash)
    }

    async fn submit<T: Serialize + Sync>(
        &self,
        epoch: u64,
        action: &str,
        req: &T,
    ) -> Result<(), ChainError> {
        let url = self.url(&["epochs", epoch.to_string().as_str(), action])?;
        let res = self
            .gateway
            .client
            .post(url)
            .json(req)
            .send()
            .await
            .with_context(|| format!("Failed to send {action} request"))?;

        check(res).await?;
        Ok(())
    }
}

#[async_trait]
impl RewardManager for GatewayRewardManager {
    async fn current_reward_epoch(&self) -> Result<u64, ChainError> {
        let url = self.url(&["current-epoch"])?;
        let res = self
            .gateway
            .client
            .get(url)
            .send()
            .await
            .context("Failed to send current epoch request")?;

        let body = check(res)
            .await?
            .json::<EpochResponse>()
            .await
            .context("Failed to parse current epoch response")?;

        Ok(body.epoch)
    }

    async fn uptime_vote_hash(&self, epoch: u64) -> Result<Hash32, ChainError> {
        self.read_hash(epoch, "uptime-vote-hash").await
    }

    async fn rewards_hash(&self, epoch: u64) -> Result<Hash32, ChainError> {
        self.read_hash(epoch, "rewards-hash").await
    }

    async fn sign_uptime_vote(&self, epoch: u64, vote_hash: Hash32) -> Result<(), ChainError> {
        self.submit(epoch, "uptime-vote", &UptimeVoteReq { vote_hash })
            .await
    }

    async fn sign_rewards(
        &self,
        epoch: u64,
        rewards_hash: Hash32,
        weight_based_claims: u64,
    ) -> Result<(), ChainError> {
        let req = RewardsReq {
            rewards_hash,
            weight_based_claims,
        };
        self.submit(epoch, "rewards", &req).await
    }
}

fn endpoint(base: &Url, segments: &[&str]) -> Result<Url> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|_| anyhow!("{} cannot be used as a base URL", base))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}

async fn check(res: Response) -> Result<Response, ChainError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(error_from_body(status, &body))
}

fn error_from_body(status: StatusCode, body: &str) -> ChainError {
    match serde_json::from_str::<ErrorBody>(body) {
        Ok(err) if err.kind.as_deref() == Some("epochNotEnded") => ChainError::NotYetEnded(
            err.reason
                .or(err.message)
                .unwrap_or_else(|| EPOCH_NOT_ENDED.to_string()),
        ),
        Ok(err) if err.reason.is_some() || err.message.is_some() => {
            ChainError::from_fields(err.reason.as_deref(), err.message.as_deref())
        }
        _ => ChainError::Other(anyhow!("gateway returned {}: {}", status, body.trim())),
    }
}

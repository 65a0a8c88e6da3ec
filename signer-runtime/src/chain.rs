use std::sync::Arc;

use async_trait::async_trait;
use common::types::{Hash32, RewardsData};

use crate::error::ChainError;

/// Read and sign surface of the reward manager contract.
#[async_trait]
pub trait RewardManager: Send + Sync {
    async fn current_reward_epoch(&self) -> Result<u64, ChainError>;

    /// Returns [`Hash32::ZERO`] when no uptime vote was recorded for `epoch`.
    async fn uptime_vote_hash(&self, epoch: u64) -> Result<Hash32, ChainError>;

    /// Returns [`Hash32::ZERO`] when no rewards hash was recorded for `epoch`.
    async fn rewards_hash(&self, epoch: u64) -> Result<Hash32, ChainError>;

    async fn sign_uptime_vote(&self, epoch: u64, vote_hash: Hash32) -> Result<(), ChainError>;

    async fn sign_rewards(
        &self,
        epoch: u64,
        rewards_hash: Hash32,
        weight_based_claims: u64,
    ) -> Result<(), ChainError>;
}

/// Handle to a chain node capable of binding contracts by address.
pub trait ChainClient: Send + Sync {
    fn reward_manager(&self, address: &str) -> anyhow::Result<Arc<dyn RewardManager>>;
}

#[async_trait]
pub trait RewardsSource: Send + Sync {
    async fn fetch_rewards_data(&self, epoch: u64) -> Result<RewardsData, ChainError>;
}

pub trait VoteHasher: Send + Sync {
    fn placeholder_vote_hash(&self) -> Hash32;
}

/// Domain-separated constant used until real uptime measurement lands.
pub struct PlaceholderVoteHasher;

impl PlaceholderVoteHasher {
    const TAG: &'static [u8] = b"reward-signer/uptime-vote/v1";
}

impl VoteHasher for PlaceholderVoteHasher {
    fn placeholder_vote_hash(&self) -> Hash32 {
        Hash32::digest(Self::TAG)
    }
}

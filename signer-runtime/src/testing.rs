//! In-memory collaborators for exercising the reconcile loop.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use common::types::{Hash32, RewardsData, SigningState};

use crate::{
    chain::{ChainClient, RewardManager, RewardsSource, VoteHasher},
    error::ChainError,
    store::StateStore,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Call {
    ReadCurrent,
    ReadUptime(u64),
    ReadRewards(u64),
    FetchRewards(u64),
    SignUptime(u64),
    SignRewards(u64),
}

impl Call {
    pub fn epoch(&self) -> Option<u64> {
        match *self {
            Call::ReadCurrent => None,
            Call::ReadUptime(e)
            | Call::ReadRewards(e)
            | Call::FetchRewards(e)
            | Call::SignUptime(e)
            | Call::SignRewards(e) => Some(e),
        }
    }

    fn is_signing(&self) -> bool {
        matches!(self, Call::SignUptime(_) | Call::SignRewards(_))
    }
}

#[derive(Debug, Clone, Copy)]
pub enum Failure {
    NotEnded,
    Fields(Option<&'static str>, Option<&'static str>),
}

impl Failure {
    fn to_error(self) -> ChainError {
        match self {
            Failure::NotEnded => ChainError::NotYetEnded("closed at next block".into()),
            Failure::Fields(reason, message) => ChainError::from_fields(reason, message),
        }
    }
}

#[derive(Default)]
struct ChainState {
    current: u64,
    uptime: HashMap<u64, Hash32>,
    rewards: HashMap<u64, Hash32>,
    uptime_failures: HashMap<u64, Failure>,
    rewards_failures: HashMap<u64, Failure>,
    fetch_failures: HashSet<u64>,
    current_fails: bool,
    current_panics: bool,
    calls: Vec<Call>,
    checkpoint: Option<Arc<MemoryStore>>,
    uptime_checkpoints: Vec<(u64, Option<i64>)>,
}

/// Fake reward manager that records every call and flips hashes to signed on
/// successful submissions.
#[derive(Clone, Default)]
pub struct MockChain {
    inner: Arc<Mutex<ChainState>>,
}

impl MockChain {
    pub fn new(current: u64) -> Self {
        let chain = Self::default();
        chain.inner.lock().unwrap().current = current;
        chain
    }

    pub fn mark_signed(&self, epoch: u64) {
        self.mark_uptime_signed(epoch);
        self.mark_rewards_signed(epoch);
    }

    pub fn mark_uptime_signed(&self, epoch: u64) {
        self.inner.lock().unwrap().uptime.insert(epoch, Hash32([0xaa; 32]));
    }

    pub fn mark_rewards_signed(&self, epoch: u64) {
        self.inner.lock().unwrap().rewards.insert(epoch, Hash32([0xbb; 32]));
    }

    pub fn fail_uptime(&self, epoch: u64, failure: Failure) {
        self.inner.lock().unwrap().uptime_failures.insert(epoch, failure);
    }

    pub fn fail_rewards(&self, epoch: u64, failure: Failure) {
        self.inner.lock().unwrap().rewards_failures.insert(epoch, failure);
    }

    pub fn fail_fetch(&self, epoch: u64) {
        self.inner.lock().unwrap().fetch_failures.insert(epoch);
    }

    pub fn fail_current_epoch(&self) {
        self.inner.lock().unwrap().current_fails = true;
    }

    pub fn panic_on_current_epoch(&self) {
        self.inner.lock().unwrap().current_panics = true;
    }

    /// Snapshot `store` every time an uptime vote is submitted.
    pub fn observe_checkpoint(&self, store: Arc<MemoryStore>) {
        self.inner.lock().unwrap().checkpoint = Some(store);
    }

    pub fn checkpoints_at_uptime_sign(&self) -> Vec<(u64, Option<i64>)> {
        self.inner.lock().unwrap().uptime_checkpoints.clone()
    }

    pub fn uptime_hash(&self, epoch: u64) -> Hash32 {
        let state = self.inner.lock().unwrap();
        state.uptime.get(&epoch).copied().unwrap_or(Hash32::ZERO)
    }

    pub fn placeholder(&self) -> Hash32 {
        Hash32([0x11; 32])
    }

    pub fn signing_calls(&self) -> Vec<Call> {
        let state = self.inner.lock().unwrap();
        state.calls.iter().copied().filter(Call::is_signing).collect()
    }

    pub fn reads(&self) -> Vec<Call> {
        let state = self.inner.lock().unwrap();
        state.calls.iter().copied().filter(|c| !c.is_signing()).collect()
    }

    fn record(&self, call: Call) {
        self.inner.lock().unwrap().calls.push(call);
    }
}

impl ChainClient for MockChain {
    fn reward_manager(&self, _address: &str) -> anyhow::Result<Arc<dyn RewardManager>> {
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl RewardManager for MockChain {
    async fn current_reward_epoch(&self) -> Result<u64, ChainError> {
        self.record(Call::ReadCurrent);
        let state = self.inner.lock().unwrap();
        if state.current_panics {
            drop(state);
            panic!("reward manager exploded");
        }
        if state.current_fails {
            return Err(anyhow::anyhow!("connection refused").into());
        }
        Ok(state.current)
    }

    async fn uptime_vote_hash(&self, epoch: u64) -> Result<Hash32, ChainError> {
        self.record(Call::ReadUptime(epoch));
        Ok(self.uptime_hash(epoch))
    }

    async fn rewards_hash(&self, epoch: u64) -> Result<Hash32, ChainError> {
        self.record(Call::ReadRewards(epoch));
        let state = self.inner.lock().unwrap();
        Ok(state.rewards.get(&epoch).copied().unwrap_or(Hash32::ZERO))
    }

    async fn sign_uptime_vote(&self, epoch: u64, vote_hash: Hash32) -> Result<(), ChainError> {
        self.record(Call::SignUptime(epoch));
        let observed = self.inner.lock().unwrap().checkpoint.clone();
        if let Some(store) = observed {
            let at = store.current().map(|s| s.last_completed_epoch);
            self.inner.lock().unwrap().uptime_checkpoints.push((epoch, at));
        }
        let mut state = self.inner.lock().unwrap();
        if let Some(failure) = state.uptime_failures.get(&epoch) {
            return Err(failure.to_error());
        }
        state.uptime.insert(epoch, vote_hash);
        Ok(())
    }

    async fn sign_rewards(
        &self,
        epoch: u64,
        rewards_hash: Hash32,
        _weight_based_claims: u64,
    ) -> Result<(), ChainError> {
        self.record(Call::SignRewards(epoch));
        let mut state = self.inner.lock().unwrap();
        if let Some(failure) = state.rewards_failures.get(&epoch) {
            return Err(failure.to_error());
        }
        state.rewards.insert(epoch, rewards_hash);
        Ok(())
    }
}

#[async_trait]
impl RewardsSource for MockChain {
    async fn fetch_rewards_data(&self, epoch: u64) -> Result<RewardsData, ChainError> {
        self.record(Call::FetchRewards(epoch));
        if self.inner.lock().unwrap().fetch_failures.contains(&epoch) {
            return Err(anyhow::anyhow!("rewards calculator unavailable").into());
        }
        Ok(RewardsData {
            rewards_hash: Hash32::digest(&epoch.to_be_bytes()),
            weight_based_claims: epoch + 1,
        })
    }
}

impl VoteHasher for MockChain {
    fn placeholder_vote_hash(&self) -> Hash32 {
        self.placeholder()
    }
}

/// State store that keeps the checkpoint in memory and logs every save.
#[derive(Default)]
pub struct MemoryStore {
    state: Mutex<Option<SigningState>>,
    saves: Mutex<Vec<i64>>,
}

impl MemoryStore {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn with(last_completed_epoch: i64) -> Self {
        Self {
            state: Mutex::new(Some(SigningState::new(last_completed_epoch))),
            saves: Mutex::default(),
        }
    }

    pub fn current(&self) -> Option<SigningState> {
        *self.state.lock().unwrap()
    }

    pub fn saves(&self) -> Vec<i64> {
        self.saves.lock().unwrap().clone()
    }
}

impl StateStore for MemoryStore {
    fn load(&self) -> SigningState {
        self.current().unwrap_or_default()
    }

    fn save(&self, state: &SigningState) {
        *self.state.lock().unwrap() = Some(*state);
        self.saves.lock().unwrap().push(state.last_completed_epoch);
    }
}

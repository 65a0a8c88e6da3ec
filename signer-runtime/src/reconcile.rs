use std::sync::Arc;

use anyhow::{Context, Result};
use common::types::SigningState;

use crate::{
    chain::{ChainClient, RewardManager, RewardsSource, VoteHasher},
    store::StateStore,
};

/// How far behind the current epoch a scan is allowed to reach.
pub const DEFAULT_LOOKBACK: u64 = 4;

/// First epoch to examine: right after the checkpoint, but never more than
/// `lookback` epochs behind `current`.
pub fn scan_start(last_completed: i64, current: u64, lookback: u64) -> u64 {
    let resume = last_completed.saturating_add(1).max(0) as u64;
    resume.max(current.saturating_sub(lookback))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScanOutcome {
    /// Every epoch up to `current` was examined.
    CaughtUp,
    /// The uptime vote for this epoch was rejected because it is still open.
    EpochNotEnded(u64),
    /// Rewards for this epoch could not be signed; later epochs were skipped.
    RewardsFailed(u64),
    /// Something outside the per-epoch handling failed.
    Aborted(String),
}

#[derive(Debug, Clone)]
pub struct ScanReport {
    pub current: Option<u64>,
    pub completed: Vec<u64>,
    pub outcome: ScanOutcome,
}

enum EpochStep {
    Completed,
    Incomplete,
    NotEnded,
    RewardsFailed,
}

pub struct Reconciler {
    chain: Arc<dyn ChainClient>,
    contract_address: String,
    rewards: Arc<dyn RewardsSource>,
    hasher: Arc<dyn VoteHasher>,
    store: Arc<dyn StateStore + Send + Sync>,
    lookback: u64,
}

impl Reconciler {
    pub fn new(
        chain: Arc<dyn ChainClient>,
        contract_address: impl Into<String>,
        rewards: Arc<dyn RewardsSource>,
        hasher: Arc<dyn VoteHasher>,
        store: Arc<dyn StateStore + Send + Sync>,
    ) -> Self {
        Self {
            chain,
            contract_address: contract_address.into(),
            rewards,
            hasher,
            store,
            lookback: DEFAULT_LOOKBACK,
        }
    }

    pub fn with_lookback(mut self, lookback: u64) -> Self {
        self.lookback = lookback;
        self
    }

    /// Runs one scan on its own task. A panic inside the scan comes back as
    /// an error so the retry wrapper can pick it up.
    pub async fn run_attempt(self: &Arc<Self>) -> Result<ScanReport> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.reconcile().await })
            .await
            .context("reconcile task failed")
    }

    /// Scans the open epoch window and signs whatever is missing. Never
    /// fails: errors are logged and reported through [`ScanOutcome`].
    pub async fn reconcile(&self) -> ScanReport {
        let mut report = ScanReport {
            current: None,
            completed: vec![],
            outcome: ScanOutcome::CaughtUp,
        };
        let mut state: Option<SigningState> = None;

        match self.scan(&mut report, &mut state).await {
            Ok(outcome) => report.outcome = outcome,
            Err(e) => {
                tracing::error!("[reconcile] Error: {:#}", e);
                report.outcome = ScanOutcome::Aborted(format!("{:#}", e));
            }
        }

        if let Some(state) = state {
            self.store.save(&state);
        }

        tracing::info!(
            "[reconcile] Done: current {:?}, signed {:?}, outcome {:?}",
            report.current,
            report.completed,
            report.outcome
        );

        report
    }

    async fn scan(
        &self,
        report: &mut ScanReport,
        state: &mut Option<SigningState>,
    ) -> Result<ScanOutcome> {
        let manager = self
            .chain
            .reward_manager(&self.contract_address)
            .with_context(|| format!("binding reward manager at {}", self.contract_address))?;

        let current = manager
            .current_reward_epoch()
            .await
            .context("reading current reward epoch")?;
        report.current = Some(current);

        let tracker = state.insert(self.store.load());
        let start = scan_start(tracker.last_completed_epoch, current, self.lookback);

        tracing::info!(
            "[reconcile] Current epoch {}, last completed {}, scanning from {}",
            current,
            tracker.last_completed_epoch,
            start
        );

        for epoch in start..=current {
            match self.process_epoch(manager.as_ref(), epoch).await? {
                EpochStep::Completed => {
                    tracing::info!("[reconcile] Epoch {} fully signed", epoch);
                    tracker.last_completed_epoch = i64::try_from(epoch)
                        .with_context(|| format!("epoch {epoch} does not fit the checkpoint"))?;
                    self.store.save(tracker);
                    report.completed.push(epoch);
                }
                EpochStep::Incomplete => {
                    tracing::warn!("[reconcile] Epoch {} left incomplete", epoch);
                }
                EpochStep::NotEnded => return Ok(ScanOutcome::EpochNotEnded(epoch)),
                EpochStep::RewardsFailed => return Ok(ScanOutcome::RewardsFailed(epoch)),
            }
        }

        Ok(ScanOutcome::CaughtUp)
    }

    async fn process_epoch(&self, manager: &dyn RewardManager, epoch: u64) -> Result<EpochStep> {
        let mut complete = true;

        let uptime = manager
            .uptime_vote_hash(epoch)
            .await
            .with_context(|| format!("reading uptime vote hash for epoch {epoch}"))?;

        if uptime.is_zero() {
            tracing::warn!("[reconcile] Epoch {}: uptime vote not signed", epoch);
            let vote_hash = self.hasher.placeholder_vote_hash();

            match manager.sign_uptime_vote(epoch, vote_hash).await {
                Ok(()) => tracing::info!("[reconcile] Epoch {}: uptime vote signed", epoch),
                Err(e) if e.is_not_yet_ended() => {
                    tracing::warn!(
                        "[reconcile] Epoch {} has not ended, stopping scan: {}",
                        epoch,
                        e
                    );
                    return Ok(EpochStep::NotEnded);
                }
                Err(e) => {
                    tracing::error!(
                        "[reconcile] Epoch {}: failed to sign uptime vote: {:#}",
                        epoch,
                        e
                    );
                    complete = false;
                }
            }
        } else {
            tracing::info!("[reconcile] Epoch {}: uptime vote already signed", epoch);
        }

        let rewards = manager
            .rewards_hash(epoch)
            .await
            .with_context(|| format!("reading rewards hash for epoch {epoch}"))?;

        if rewards.is_zero() {
            tracing::warn!("[reconcile] Epoch {}: rewards not signed", epoch);

            let data = match self.rewards.fetch_rewards_data(epoch).await {
                Ok(data) => data,
                Err(e) => {
                    tracing::error!(
                        "[reconcile] Epoch {}: failed to fetch rewards data: {:#}",
                        epoch,
                        e
                    );
                    return Ok(EpochStep::RewardsFailed);
                }
            };

            if let Err(e) = manager
                .sign_rewards(epoch, data.rewards_hash, data.weight_based_claims)
                .await
            {
                tracing::error!(
                    "[reconcile] Epoch {}: failed to sign rewards: {:#}",
                    epoch,
                    e
                );
                return Ok(EpochStep::RewardsFailed);
            }

            tracing::info!(
                "[reconcile] Epoch {}: rewards signed ({} weight-based claims)",
                epoch,
                data.weight_based_claims
            );
        } else {
            tracing::info!("[reconcile] Epoch {}: rewards already signed", epoch);
        }

        Ok(if complete {
            EpochStep::Completed
        } else {
            EpochStep::Incomplete
        })
    }
}

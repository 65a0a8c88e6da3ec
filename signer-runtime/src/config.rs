use std::env;
use std::fmt;
use std::str::FromStr;

use anyhow::{anyhow, Context, Result};
use tokio::time::Duration;
use url::Url;

use crate::{reconcile::DEFAULT_LOOKBACK, retry::RetryPolicy};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StateBackend {
    File,
    Sled,
}

impl fmt::Display for StateBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StateBackend::File => write!(f, "file"),
            StateBackend::Sled => write!(f, "sled"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub gateway_url: Url,
    pub rewards_url: Url,
    pub reward_manager: String,
    pub state_backend: StateBackend,
    pub state_path: String,
    pub interval: Duration,
    pub retry: RetryPolicy,
    pub lookback: u64,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let gateway_url = parse_http_url(
            "SIGNER_GATEWAY_URL",
            &get("SIGNER_GATEWAY_URL").unwrap_or_else(|| "http://localhost:9650".into()),
        )?;

        let rewards_url = match get("REWARDS_DATA_URL") {
            Some(raw) => parse_http_url("REWARDS_DATA_URL", &raw)?,
            None => gateway_url
                .join("rewards-data")
                .context("deriving REWARDS_DATA_URL from SIGNER_GATEWAY_URL")?,
        };

        let reward_manager = get("REWARD_MANAGER_ADDRESS")
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("REWARD_MANAGER_ADDRESS must be set"))?;

        let state_backend = match get("STATE_BACKEND").as_deref() {
            None | Some("file") => StateBackend::File,
            Some("sled") => StateBackend::Sled,
            Some(other) => {
                return Err(anyhow!(
                    "Invalid STATE_BACKEND '{}': expected 'file' or 'sled'",
                    other
                ))
            }
        };

        let state_path = get("STATE_PATH").unwrap_or_else(|| match state_backend {
            StateBackend::File => "./signing-state.json".into(),
            StateBackend::Sled => "./signer-data".into(),
        });

        let interval = parse_or(&get, "RECONCILE_INTERVAL", 300u64);
        if interval == 0 {
            return Err(anyhow!("RECONCILE_INTERVAL must be at least 1 second"));
        }

        let max_attempts = parse_or(&get, "RETRY_MAX_ATTEMPTS", 3u32).max(1);
        let retry_delay = parse_or(&get, "RETRY_DELAY", 30u64);

        Ok(Self {
            gateway_url,
            rewards_url,
            reward_manager,
            state_backend,
            state_path,
            interval: Duration::from_secs(interval),
            retry: RetryPolicy {
                max_attempts,
                delay: Duration::from_secs(retry_delay),
            },
            lookback: parse_or(&get, "EPOCH_LOOKBACK", DEFAULT_LOOKBACK),
        })
    }
}

fn parse_or<T: FromStr + fmt::Display>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
    default: T,
) -> T {
    match get(key) {
        None => default,
        Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
            tracing::warn!("Ignoring invalid {}='{}', using {}", key, raw, default);
            default
        }),
    }
}

fn parse_http_url(key: &str, raw: &str) -> Result<Url> {
    if !raw.starts_with("http://") && !raw.starts_with("https://") {
        return Err(anyhow!("Invalid {}: must start with http:// or https://", key));
    }
    // trailing slash so relative joins append instead of replacing the last segment
    let normalized = if raw.ends_with('/') {
        raw.to_string()
    } else {
        format!("{raw}/")
    };
    Url::parse(&normalized).with_context(|| format!("Invalid {}: '{}'", key, raw))
}

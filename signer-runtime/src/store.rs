use std::fs;
use std::io::ErrorKind;
use std::path::PathBuf;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use common::types::SigningState;
use serde::{Deserialize, Serialize};
use sled::{Db, IVec};

/// Best-effort checkpoint persistence. Failures are logged, never returned:
/// losing the checkpoint only costs redundant signing attempts.
pub trait StateStore {
    fn load(&self) -> SigningState;
    fn save(&self, state: &SigningState);
}

/// `{ "lastCompletedEpoch": n }` in a single pretty-printed JSON file.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    fn read(&self) -> Result<Option<SigningState>> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e).with_context(|| format!("reading {}", self.path.display()))
            }
        };
        let state = SigningState::from_json(&bytes)
            .with_context(|| format!("parsing {}", self.path.display()))?;
        Ok(Some(state))
    }

    fn write(&self, state: &SigningState) -> Result<()> {
        if let Some(dir) = self.path.parent().filter(|d| !d.as_os_str().is_empty()) {
            fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
        }

        // write-then-rename so a crash never leaves a truncated checkpoint
        let tmp = self.path.with_extension("json.tmp");
        let body = state.to_pretty_json().context("serializing signing state")?;
        fs::write(&tmp, body).with_context(|| format!("writing {}", tmp.display()))?;
        if let Err(e) = fs::rename(&tmp, &self.path) {
            let _ = fs::remove_file(&tmp);
            return Err(e).with_context(|| format!("replacing {}", self.path.display()));
        }
        Ok(())
    }
}

impl StateStore for JsonFileStore {
    fn load(&self) -> SigningState {
        match self.read() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::debug!("No signing state at {}, starting fresh", self.path.display());
                SigningState::default()
            }
            Err(e) => {
                tracing::error!("Failed to load signing state: {:#}", e);
                SigningState::default()
            }
        }
    }

    fn save(&self, state: &SigningState) {
        if let Err(e) = self.write(state) {
            tracing::error!("Failed to save signing state: {:#}", e);
        }
    }
}

const STATE_KEY: &str = "signing-state";
const RECORD_VERSION: u32 = 1;

#[derive(Serialize, Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct StoredRecord {
    version: u32,
    state: SigningState,
    saved_at: DateTime<Utc>,
}

/// Keeps the checkpoint as one versioned record in a sled tree.
pub struct SledStore {
    db: Db,
}

impl SledStore {
    pub fn new(path: &str) -> Result<Self> {
        let db = sled::open(path).context("opening sled store")?;
        Ok(Self { db })
    }

    fn read(&self) -> Result<Option<SigningState>> {
        let val: Option<IVec> = self.db.get(STATE_KEY).context("reading signing state")?;
        let Some(bytes) = val else {
            return Ok(None);
        };
        let record: StoredRecord =
            serde_json::from_slice(&bytes).context("parsing stored signing state")?;
        if record.version != RECORD_VERSION {
            anyhow::bail!("unsupported signing state version {}", record.version);
        }
        Ok(Some(record.state))
    }

    fn write(&self, state: &SigningState) -> Result<()> {
        let record = StoredRecord {
            version: RECORD_VERSION,
            state: *state,
            saved_at: Utc::now(),
        };
        let bytes = serde_json::to_vec(&record).context("serializing signing state")?;
        self.db.insert(STATE_KEY, bytes).context("writing signing state")?;
        self.db.flush().context("flushing sled store")?;
        Ok(())
    }
}

impl StateStore for SledStore {
    fn load(&self) -> SigningState {
        match self.read() {
            Ok(Some(state)) => state,
            Ok(None) => {
                tracing::debug!("No signing state in sled store, starting fresh");
                SigningState::default()
            }
            Err(e) => {
                tracing::error!("Failed to load signing state: {:#}", e);
                SigningState::default()
            }
        }
    }

    fn save(&self, state: &SigningState) {
        if let Err(e) = self.write(state) {
            tracing::error!("Failed to save signing state: {:#}", e);
        }
    }
}

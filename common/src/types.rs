use std::fmt;
use std::str::FromStr;

use serde::{de, Deserialize, Deserializer, Serialize, Serializer};
use sha2::{Digest, Sha256};

/// Checkpoint persisted between runs: the last epoch whose uptime vote and
/// rewards hash were both confirmed on-chain.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SigningState {
    pub last_completed_epoch: i64,
}

impl SigningState {
    pub const NONE_COMPLETED: i64 = -1;

    pub fn new(last_completed_epoch: i64) -> Self {
        Self {
            last_completed_epoch,
        }
    }

    pub fn from_json(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }

    pub fn to_pretty_json(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec_pretty(self)
    }
}

impl Default for SigningState {
    fn default() -> Self {
        Self::new(Self::NONE_COMPLETED)
    }
}

/// A 32-byte contract hash. The all-zero value means "not signed yet".
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Hash32(pub [u8; 32]);

impl Hash32 {
    pub const ZERO: Hash32 = Hash32([0u8; 32]);

    pub fn is_zero(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn digest(data: &[u8]) -> Self {
        Hash32(Sha256::digest(data).into())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum ParseHashError {
    InvalidHex(hex::FromHexError),
    InvalidLength(usize),
}

impl fmt::Display for ParseHashError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseHashError::InvalidHex(e) => write!(f, "invalid hex: {e}"),
            ParseHashError::InvalidLength(n) => write!(f, "expected 32 bytes, got {n}"),
        }
    }
}

impl std::error::Error for ParseHashError {}

impl FromStr for Hash32 {
    type Err = ParseHashError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        let digits = s
            .strip_prefix("0x")
            .or_else(|| s.strip_prefix("0X"))
            .unwrap_or(s);
        let bytes = hex::decode(digits).map_err(ParseHashError::InvalidHex)?;
        let len = bytes.len();
        let arr: [u8; 32] = bytes
            .try_into()
            .map_err(|_| ParseHashError::InvalidLength(len))?;
        Ok(Hash32(arr))
    }
}

impl fmt::Display for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.0))
    }
}

impl fmt::Debug for Hash32 {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Hash32({self})")
    }
}

impl Serialize for Hash32 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for Hash32 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(de::Error::custom)
    }
}

/// Reward distribution summary for one epoch, as produced by the rewards
/// calculator and submitted alongside the rewards signature.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct RewardsData {
    pub rewards_hash: Hash32,
    pub weight_based_claims: u64,
}

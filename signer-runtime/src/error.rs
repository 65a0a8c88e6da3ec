use thiserror::Error;

/// Phrase the reward manager uses when a vote is attempted before the epoch closes.
pub const EPOCH_NOT_ENDED: &str = "epoch not ended";

/// Failure reported by a chain collaborator.
#[derive(Debug, Error)]
pub enum ChainError {
    /// The epoch is still open; nothing after it can have ended either.
    #[error("reward epoch has not ended yet: {0}")]
    NotYetEnded(String),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl ChainError {
    /// Compatibility shim for collaborators that only hand back loose
    /// `reason` / `message` strings instead of a structured kind. The phrase
    /// is matched by substring on either field.
    pub fn from_fields(reason: Option<&str>, message: Option<&str>) -> Self {
        let text = match (reason, message) {
            (Some(r), Some(m)) => format!("{r}: {m}"),
            (Some(r), None) => r.to_string(),
            (None, Some(m)) => m.to_string(),
            (None, None) => "unknown error".to_string(),
        };

        let not_ended = [reason, message]
            .into_iter()
            .flatten()
            .any(|field| field.contains(EPOCH_NOT_ENDED));

        if not_ended {
            ChainError::NotYetEnded(text)
        } else {
            ChainError::Other(anyhow::anyhow!(text))
        }
    }

    pub fn is_not_yet_ended(&self) -> bool {
        matches!(self, ChainError::NotYetEnded(_))
    }
}

use thiserror::Error;

use crate::session::SessionError;

pub type HarvestResult<T> = Result<T, HarvestError>;

/// Failure taxonomy of a harvest run. Only `FatalAuth` ever leaves
/// [`Harvester::run`](super::Harvester::run); the rest are recovered where
/// they happen and only show up in logs and metrics.
#[derive(Debug, Error)]
pub enum HarvestError {
    #[error("no usable session: {0}")]
    FatalAuth(String),
    #[error("network failure on {url}: {reason}")]
    TransientNetwork { url: String, reason: String },
    #[error("response from {url} matched no instruction path")]
    MalformedSchema { url: String },
    #[error("unparseable timestamp {0:?}")]
    MalformedTimestamp(String),
}

impl HarvestError {
    pub fn transient(url: impl Into<String>, reason: impl ToString) -> Self {
        HarvestError::TransientNetwork {
            url: url.into(),
            reason: reason.to_string(),
        }
    }

    pub fn is_fatal(&self) -> bool {
        matches!(self, HarvestError::FatalAuth(_))
    }
}

impl From<SessionError> for HarvestError {
    fn from(err: SessionError) -> Self {
        HarvestError::FatalAuth(err.to_string())
    }
}

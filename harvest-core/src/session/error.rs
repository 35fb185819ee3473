use std::path::PathBuf;

use thiserror::Error;

pub type SessionResult<T> = Result<T, SessionError>;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("failed to read cookie file {path}: {source}")]
    Io {
        source: std::io::Error,
        path: PathBuf,
    },
    #[error("failed to parse cookie file {path}: {source}")]
    Parse {
        source: serde_json::Error,
        path: PathBuf,
    },
    #[error("session is missing required cookies: {}", .0.join(", "))]
    MissingCookies(Vec<String>),
}

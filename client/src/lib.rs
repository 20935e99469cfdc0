pub mod backoff;
pub mod client;
pub mod config;
pub mod engine;
pub mod poller;
pub mod session;
pub mod timeline;

pub use backoff::RetryPolicy;
pub use client::Client;
pub use config::{SessionConfig, TimelineConfig};
pub use engine::{Admission, Directive, Engine, LocalRoundState, LocalState, Source};
pub use session::{Session, SessionExit, SessionHandle};
use frontback_types::MatchId;
use thiserror::Error;

/// Error type for client operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed: {0}")]
    Failed(reqwest::StatusCode),
    #[error("failed: {status}: {body}")]
    FailedWithBody {
        status: reqwest::StatusCode,
        body: String,
    },
    #[error(transparent)]
    MalformedSnapshot(#[from] frontback_types::Error),
    #[error("action rejected: {0}")]
    ActionRejected(String),
    #[error("match {match_id} is not active")]
    StaleMatch { match_id: MatchId },
    #[error("not ready: {0}")]
    NotReady(&'static str),
    #[error("session closed")]
    SessionClosed,
    #[error("URL parse error: {0}")]
    Url(#[from] url::ParseError),
    #[error("invalid URL scheme: {0} (expected http or https)")]
    InvalidScheme(String),
}

impl Error {
    /// Whether retrying the same request later may succeed.
    pub fn is_transport(&self) -> bool {
        match self {
            Error::Transport(_) => true,
            Error::Failed(status) | Error::FailedWithBody { status, .. } => {
                status.is_server_error()
            }
            _ => false,
        }
    }

    pub fn is_malformed(&self) -> bool {
        matches!(self, Error::MalformedSnapshot(_))
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, Error>;

pub mod api;
pub mod derivation;
pub mod matches;
pub mod round;

pub use derivation::{Outcome, RoundOutcome};
pub use matches::{MatchPlayer, MatchSnapshot, MatchStatus};
pub use round::{ActionRecord, ActionType, CardRecord, RoundResult, RoundSnapshot, RoundState, Side};
use thiserror::Error;

/// Identifier of a user as assigned by the game server.
pub type UserId = u64;
/// Identifier of a round. Increases monotonically within a match.
pub type RoundId = u64;
/// Identifier of a match.
pub type MatchId = u64;
/// Identifier of a lobby room.
pub type RoomId = u64;

/// Error type for snapshot parsing and validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    #[error("malformed snapshot: {0}")]
    MalformedSnapshot(String),
}

/// Result type for snapshot operations.
pub type Result<T> = std::result::Result<T, Error>;

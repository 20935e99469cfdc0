//! Request and response bodies of the game server's REST API.

use crate::{ActionType, RoundSnapshot, Side, UserId};
use serde::{Deserialize, Serialize};

/// Body of `POST /api/rounds/{round_id}/select-side`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SideSelectionRequest {
    pub player_id: UserId,
    pub side: Side,
}

/// Body of `POST /api/rounds/{round_id}/action`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRequest {
    pub player_id: UserId,
    pub action_type: ActionType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub amount: Option<u64>,
}

/// Response of `POST /api/rounds/{round_id}/action`.
///
/// Rejected actions come back with `success == false` and a human readable message
/// rather than an HTTP error.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionResponse {
    pub success: bool,
    #[serde(default)]
    pub message: String,
    #[serde(default)]
    pub round: Option<RoundSnapshot>,
}

/// Error body returned with 4xx/5xx statuses.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    #[serde(default)]
    pub detail: String,
}

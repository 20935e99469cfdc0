//! Match snapshots: chip counts and lifecycle of a two-player match.

use crate::{Error, MatchId, Result, RoomId, UserId};
use serde::{Deserialize, Serialize};

/// Number of players seated in every match.
pub const PLAYERS_PER_MATCH: usize = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchStatus {
    Init,
    Active,
    Ended,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchPlayer {
    pub user_id: UserId,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub seat: u8,
    pub chips: u64,
    #[serde(default)]
    pub is_bot: bool,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchSnapshot {
    pub id: MatchId,
    #[serde(default)]
    pub room_id: RoomId,
    pub status: MatchStatus,
    pub players: Vec<MatchPlayer>,
}

impl MatchSnapshot {
    /// Parse and validate a match from a JSON body.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self = serde_json::from_slice(bytes)
            .map_err(|err| Error::MalformedSnapshot(err.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    pub fn validate(&self) -> Result<()> {
        if self.players.len() != PLAYERS_PER_MATCH {
            return Err(Error::MalformedSnapshot(format!(
                "match {} has {} players (expected {PLAYERS_PER_MATCH})",
                self.id,
                self.players.len()
            )));
        }
        if self.players[0].user_id == self.players[1].user_id {
            return Err(Error::MalformedSnapshot(format!(
                "match {} seats the same user twice",
                self.id
            )));
        }
        Ok(())
    }

    pub fn is_active(&self) -> bool {
        self.status == MatchStatus::Active
    }

    pub fn player(&self, user: UserId) -> Option<&MatchPlayer> {
        self.players.iter().find(|p| p.user_id == user)
    }

    pub fn opponent(&self, user: UserId) -> Option<&MatchPlayer> {
        self.players.iter().find(|p| p.user_id != user)
    }

    /// The first player who has run out of chips, if any.
    pub fn busted_player(&self) -> Option<UserId> {
        self.players.iter().find(|p| p.chips == 0).map(|p| p.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MATCH: &[u8] = br#"{
        "id": 7,
        "room_id": 3,
        "status": "active",
        "deck_seed": 12345,
        "created_at": "2025-01-01T00:00:00",
        "ended_at": null,
        "players": [
            {"user_id": 10, "username": "alice", "seat": 0, "chips": 30, "is_bot": false},
            {"user_id": 20, "username": "bob", "seat": 1, "chips": 0, "is_bot": true}
        ]
    }"#;

    #[test]
    fn parses_server_match_document() {
        let snapshot = MatchSnapshot::from_json(MATCH).unwrap();
        assert!(snapshot.is_active());
        assert_eq!(snapshot.player(10).unwrap().chips, 30);
        assert_eq!(snapshot.opponent(10).unwrap().username, "bob");
        assert_eq!(snapshot.busted_player(), Some(20));
    }

    #[test]
    fn rejects_wrong_player_count() {
        let err = MatchSnapshot::from_json(
            br#"{"id": 1, "status": "active", "players": [{"user_id": 1, "chips": 30}]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedSnapshot(_)));
    }

    #[test]
    fn rejects_negative_chips() {
        let err = MatchSnapshot::from_json(
            br#"{"id": 1, "status": "active", "players": [
                {"user_id": 1, "chips": -1}, {"user_id": 2, "chips": 30}
            ]}"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::MalformedSnapshot(_)));
    }
}

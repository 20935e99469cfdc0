//! Round snapshots as delivered by the game server.
//!
//! A snapshot is a point-in-time description of one hand. Only `id`, `state` and
//! `cards` are required on the wire; everything else falls back to the server's
//! column defaults when absent.

use crate::{Error, MatchId, Result, RoundId, UserId};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Most players a single round can carry cards for.
pub const MAX_PLAYERS: usize = 2;

/// Default minimum bet when the server omits it.
pub const DEFAULT_MIN_BET: u64 = 1;

/// Server-side state of a round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundState {
    Dealing,
    SideSelection,
    Betting,
    /// Cards are being shown. Some servers report this as `revealing`.
    #[serde(alias = "revealing")]
    Reveal,
    Ended,
}

impl RoundState {
    pub fn as_str(&self) -> &'static str {
        match self {
            RoundState::Dealing => "dealing",
            RoundState::SideSelection => "side_selection",
            RoundState::Betting => "betting",
            RoundState::Reveal => "reveal",
            RoundState::Ended => "ended",
        }
    }

    /// Returns true for the states in which the outcome must be shown.
    pub fn shows_outcome(&self) -> bool {
        matches!(self, RoundState::Reveal | RoundState::Ended)
    }

    /// Position in the server's state machine. A round never moves backwards.
    pub fn progress(&self) -> u8 {
        match self {
            RoundState::Dealing => 0,
            RoundState::SideSelection => 1,
            RoundState::Betting => 2,
            RoundState::Reveal => 3,
            RoundState::Ended => 4,
        }
    }
}

/// Card face a player commits to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Front,
    Back,
    DoubleSide,
}

impl Side {
    pub fn as_str(&self) -> &'static str {
        match self {
            Side::Front => "front",
            Side::Back => "back",
            Side::DoubleSide => "double_side",
        }
    }
}

/// Kind of a recorded round action.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    Bet,
    Raise,
    Call,
    Fold,
    DoubleSide,
    SelectSide,
    Reveal,
    Timeout,
}

impl ActionType {
    /// Whether the action's amount counts towards a player's aggregate bet.
    pub fn adds_to_bet(&self) -> bool {
        matches!(self, ActionType::Bet | ActionType::Raise)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ActionType::Bet => "bet",
            ActionType::Raise => "raise",
            ActionType::Call => "call",
            ActionType::Fold => "fold",
            ActionType::DoubleSide => "double_side",
            ActionType::SelectSide => "select_side",
            ActionType::Reveal => "reveal",
            ActionType::Timeout => "timeout",
        }
    }
}

/// Resolution of an ended round.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundResult {
    Tie,
    Player1Win,
    Player2Win,
    Player1Fold,
    Player2Fold,
    /// A decided result this client does not know by name. `winner_id` still applies.
    #[serde(other)]
    Other,
}

impl RoundResult {
    pub fn is_tie(&self) -> bool {
        matches!(self, RoundResult::Tie)
    }
}

/// One player's card for a round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardRecord {
    pub player_id: UserId,
    pub front_value: u32,
    pub back_value: u32,
    #[serde(default)]
    pub chosen_side: Option<Side>,
}

impl CardRecord {
    pub fn has_chosen(&self) -> bool {
        self.chosen_side.is_some()
    }
}

/// One betting (or bookkeeping) action in a round, in server order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    pub player_id: UserId,
    pub action_type: ActionType,
    #[serde(default)]
    pub amount: Option<u64>,
}

/// Authoritative description of one round.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RoundSnapshot {
    pub id: RoundId,
    #[serde(default)]
    pub match_id: MatchId,
    #[serde(default)]
    pub round_no: u32,
    pub state: RoundState,
    pub cards: Vec<CardRecord>,
    #[serde(default)]
    pub actions: Vec<ActionRecord>,
    #[serde(default)]
    pub pot: u64,
    #[serde(default)]
    pub carry_over_pot: u64,
    #[serde(default)]
    pub current_turn_user_id: Option<UserId>,
    #[serde(default = "default_min_bet")]
    pub min_bet: u64,
    #[serde(default)]
    pub result: Option<RoundResult>,
    #[serde(default)]
    pub winner_id: Option<UserId>,
    #[serde(default)]
    pub is_double_side_bet: bool,
    #[serde(default)]
    pub double_side_bonus: i64,
}

fn default_min_bet() -> u64 {
    DEFAULT_MIN_BET
}

impl RoundSnapshot {
    /// Parse and validate a snapshot from a JSON body.
    pub fn from_json(bytes: &[u8]) -> Result<Self> {
        let snapshot: Self = serde_json::from_slice(bytes)
            .map_err(|err| Error::MalformedSnapshot(err.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Parse and validate a snapshot from an already decoded JSON value.
    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        let snapshot: Self = serde_json::from_value(value)
            .map_err(|err| Error::MalformedSnapshot(err.to_string()))?;
        snapshot.validate()?;
        Ok(snapshot)
    }

    /// Check the invariants the client relies on.
    ///
    /// Every violation is reported as [Error::MalformedSnapshot] so callers have a
    /// single discard-and-retry path.
    pub fn validate(&self) -> Result<()> {
        if self.cards.is_empty() {
            return Err(Error::MalformedSnapshot(format!(
                "round {} has no cards",
                self.id
            )));
        }
        if self.cards.len() > MAX_PLAYERS {
            return Err(Error::MalformedSnapshot(format!(
                "round {} has {} cards (max {MAX_PLAYERS})",
                self.id,
                self.cards.len()
            )));
        }
        let owners: BTreeSet<UserId> = self.cards.iter().map(|c| c.player_id).collect();
        if owners.len() != self.cards.len() {
            return Err(Error::MalformedSnapshot(format!(
                "round {} has duplicated card owners",
                self.id
            )));
        }
        if self.state == RoundState::Ended && self.result.is_none() {
            return Err(Error::MalformedSnapshot(format!(
                "round {} ended without a result",
                self.id
            )));
        }
        Ok(())
    }

    pub fn card_of(&self, player: UserId) -> Option<&CardRecord> {
        self.cards.iter().find(|card| card.player_id == player)
    }

    /// The first card that does not belong to `player`.
    pub fn opponent_card(&self, player: UserId) -> Option<&CardRecord> {
        self.cards.iter().find(|card| card.player_id != player)
    }

    pub fn chosen_side_of(&self, player: UserId) -> Option<Side> {
        self.card_of(player).and_then(|card| card.chosen_side)
    }

    pub fn opponent_chosen_side(&self, player: UserId) -> Option<Side> {
        self.opponent_card(player).and_then(|card| card.chosen_side)
    }

    /// Players holding a card in this round, in card order.
    pub fn participants(&self) -> impl Iterator<Item = UserId> + '_ {
        self.cards.iter().map(|card| card.player_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn round_json() -> serde_json::Value {
        json!({
            "id": 5,
            "match_id": 1,
            "round_no": 3,
            "state": "side_selection",
            "pot": 2,
            "carry_over_pot": 0,
            "current_turn_user_id": 10,
            "min_bet": 1,
            "result": null,
            "winner_id": null,
            "is_double_side_bet": false,
            "double_side_bonus": 0,
            "created_at": "2025-01-01T00:00:00",
            "ended_at": null,
            "cards": [
                {"player_id": 10, "front_value": 4, "back_value": 9, "chosen_side": null},
                {"player_id": 20, "front_value": 7, "back_value": 2, "chosen_side": "back"}
            ],
            "actions": [
                {"id": 1, "player_id": 10, "action_type": "bet", "amount": 1, "created_at": "2025-01-01T00:00:00"},
                {"id": 2, "player_id": 20, "action_type": "bet", "amount": 1, "created_at": "2025-01-01T00:00:00"},
                {"id": 3, "player_id": 20, "action_type": "select_side", "amount": null, "created_at": "2025-01-01T00:00:00"}
            ]
        })
    }

    #[test]
    fn parses_server_round_document() {
        let round = RoundSnapshot::from_value(round_json()).unwrap();
        assert_eq!(round.id, 5);
        assert_eq!(round.round_no, 3);
        assert_eq!(round.state, RoundState::SideSelection);
        assert_eq!(round.chosen_side_of(10), None);
        assert_eq!(round.opponent_chosen_side(10), Some(Side::Back));
        assert_eq!(round.actions.len(), 3);
        assert_eq!(round.actions[2].action_type, ActionType::SelectSide);
        assert_eq!(round.participants().collect::<Vec<_>>(), vec![10, 20]);
    }

    #[test]
    fn missing_required_fields_are_malformed() {
        for field in ["id", "state", "cards"] {
            let mut value = round_json();
            value.as_object_mut().unwrap().remove(field);
            let err = RoundSnapshot::from_value(value).unwrap_err();
            assert!(matches!(err, Error::MalformedSnapshot(_)), "{field}: {err:?}");
        }
    }

    #[test]
    fn wrong_types_are_malformed() {
        let mut value = round_json();
        value["id"] = json!("five");
        assert!(RoundSnapshot::from_value(value).is_err());

        let mut value = round_json();
        value["pot"] = json!(-1);
        assert!(RoundSnapshot::from_value(value).is_err());
    }

    #[test]
    fn optional_fields_fall_back_to_defaults() {
        let round = RoundSnapshot::from_json(
            br#"{"id": 1, "state": "dealing", "cards": [{"player_id": 1, "front_value": 3, "back_value": 5}]}"#,
        )
        .unwrap();
        assert_eq!(round.pot, 0);
        assert_eq!(round.min_bet, DEFAULT_MIN_BET);
        assert!(round.actions.is_empty());
        assert_eq!(round.current_turn_user_id, None);
        assert_eq!(round.cards[0].chosen_side, None);
    }

    #[test]
    fn invariant_violations_are_malformed() {
        let mut value = round_json();
        value["cards"] = json!([]);
        assert!(RoundSnapshot::from_value(value).is_err());

        let mut value = round_json();
        value["cards"][1]["player_id"] = json!(10);
        assert!(RoundSnapshot::from_value(value).is_err());

        let mut value = round_json();
        value["state"] = json!("ended");
        assert!(RoundSnapshot::from_value(value).is_err());
    }

    #[test]
    fn revealing_is_an_alias_of_reveal() {
        let mut value = round_json();
        value["state"] = json!("revealing");
        let round = RoundSnapshot::from_value(value).unwrap();
        assert_eq!(round.state, RoundState::Reveal);
        assert!(round.state.shows_outcome());
    }

    #[test]
    fn unknown_results_still_parse() {
        let mut value = round_json();
        value["state"] = json!("ended");
        value["result"] = json!("player2_timeout");
        value["winner_id"] = json!(20);
        let round = RoundSnapshot::from_value(value).unwrap();
        assert_eq!(round.result, Some(RoundResult::Other));
        assert!(!round.result.unwrap().is_tie());
    }
}

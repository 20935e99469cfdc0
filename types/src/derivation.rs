//! Values derived from a round snapshot and the local player's identity.
//!
//! Everything here is pure and deterministic, so the polling path and the
//! direct-response path compute identical results for the same snapshot.

use crate::{CardRecord, RoundSnapshot, RoundState, Side, UserId};
use serde::{Deserialize, Serialize};

/// Round result from the local player's point of view.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundOutcome {
    Win,
    Lose,
    Draw,
    DoubleSideWin,
    DoubleSideLose,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    pub tag: RoundOutcome,
    pub chips_gained: i64,
}

/// Whether `self_id` is expected to act next.
///
/// Side selection is simultaneous but sequenced: once one player has committed,
/// the turn belongs to the other until they commit too, whatever
/// `current_turn_user_id` says.
pub fn turn_ownership(snapshot: &RoundSnapshot, self_id: UserId) -> bool {
    let follows_server = snapshot.current_turn_user_id == Some(self_id);
    if snapshot.state != RoundState::SideSelection {
        return follows_server;
    }
    let mine = snapshot.chosen_side_of(self_id).is_some();
    let theirs = snapshot.opponent_chosen_side(self_id).is_some();
    match (mine, theirs) {
        (false, false) | (true, true) => follows_server,
        (true, false) => false,
        (false, true) => true,
    }
}

/// Sum of `bet` and `raise` amounts placed by `player`.
pub fn aggregate_bet(snapshot: &RoundSnapshot, player: UserId) -> u64 {
    snapshot
        .actions
        .iter()
        .filter(|action| action.player_id == player && action.action_type.adds_to_bet())
        .map(|action| action.amount.unwrap_or(0))
        .fold(0u64, |total, amount| total.saturating_add(amount))
}

/// Highest aggregate bet among the round's participants.
pub fn current_bet(snapshot: &RoundSnapshot) -> u64 {
    snapshot
        .participants()
        .map(|player| aggregate_bet(snapshot, player))
        .max()
        .unwrap_or(0)
}

/// Chips `self_id` must add to match the highest aggregate bet.
pub fn required_call(snapshot: &RoundSnapshot, self_id: UserId) -> u64 {
    current_bet(snapshot).saturating_sub(aggregate_bet(snapshot, self_id))
}

/// Value to display for a card once revealed.
///
/// A double-side commitment shows the front value.
pub fn resolved_value(card: &CardRecord) -> Option<u32> {
    match card.chosen_side? {
        Side::Front => Some(card.front_value),
        Side::Back => Some(card.back_value),
        Side::DoubleSide => Some(card.front_value),
    }
}

/// Whether either player committed to double-side betting.
pub fn can_double_side_bet(snapshot: &RoundSnapshot) -> bool {
    snapshot.is_double_side_bet
}

/// Whether `self_id` holds the double-side bet.
pub fn is_self_double_side(snapshot: &RoundSnapshot, self_id: UserId) -> bool {
    snapshot.is_double_side_bet && snapshot.chosen_side_of(self_id) == Some(Side::DoubleSide)
}

/// Outcome tag and signed chip delta for `self_id`, once the round has a result.
pub fn outcome_for_self(snapshot: &RoundSnapshot, self_id: UserId) -> Option<Outcome> {
    let result = snapshot.result?;
    if result.is_tie() {
        return Some(Outcome {
            tag: RoundOutcome::Draw,
            chips_gained: 0,
        });
    }

    let pot = i64::try_from(snapshot.pot).unwrap_or(i64::MAX);
    let double_side = is_self_double_side(snapshot, self_id);
    let outcome = if snapshot.winner_id == Some(self_id) {
        if double_side {
            Outcome {
                tag: RoundOutcome::DoubleSideWin,
                chips_gained: pot.saturating_add(snapshot.double_side_bonus),
            }
        } else {
            Outcome {
                tag: RoundOutcome::Win,
                chips_gained: pot,
            }
        }
    } else {
        Outcome {
            tag: if double_side {
                RoundOutcome::DoubleSideLose
            } else {
                RoundOutcome::Lose
            },
            chips_gained: -pot,
        }
    };
    Some(outcome)
}

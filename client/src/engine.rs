//! Reconciliation of server round snapshots into the local view of a table.
//!
//! Snapshots reach the engine from three places (the poll loop, direct responses to
//! the player's own requests, and next-round requests) in whatever order the network
//! delivers them. [Engine::admit] is the single entry point for all of them and
//! decides whether a snapshot resets the round, is applied in full, is applied only
//! partially because a reveal animation is on screen, is parked until that animation
//! ends, or is dropped as a duplicate or a stale view.
//!
//! The engine performs no I/O. Time only moves when the owner calls [Engine::tick],
//! which returns the requests ([Directive]) the owner should issue.

use crate::{
    timeline::{DealPhase, RevealPhase, Seat, Timeline, TimelineEvent},
    Error, Result, TimelineConfig,
};
use frontback_types::{
    derivation::{
        aggregate_bet, can_double_side_bet, current_bet, is_self_double_side, outcome_for_self,
        required_call, resolved_value, turn_ownership,
    },
    ActionType, CardRecord, MatchId, MatchSnapshot, MatchStatus, RoundId, RoundOutcome,
    RoundSnapshot, RoundState, Side, UserId,
};
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info};

/// Local round state shown to the player.
///
/// The server's `reveal` and `ended` both map to [LocalRoundState::Revealing];
/// [LocalRoundState::Ended] is only entered once the next round has been requested.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LocalRoundState {
    #[default]
    Dealing,
    SideSelection,
    Betting,
    Revealing,
    Ended,
}

impl LocalRoundState {
    fn mirror(state: RoundState) -> Self {
        match state {
            RoundState::Dealing => LocalRoundState::Dealing,
            RoundState::SideSelection => LocalRoundState::SideSelection,
            RoundState::Betting => LocalRoundState::Betting,
            RoundState::Reveal | RoundState::Ended => LocalRoundState::Revealing,
        }
    }
}

/// Where a snapshot came from.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Source {
    Poll,
    SideSelection,
    ActionResponse(ActionType),
    NextRound,
}

impl Source {
    /// The response to the player's own call is applied in full even mid-reveal.
    fn bypasses_reveal_guard(&self) -> bool {
        matches!(self, Source::ActionResponse(ActionType::Call))
    }
}

/// What [Engine::admit] did with a snapshot.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Admission {
    /// A new round id: local state was reset before applying the snapshot.
    Reset,
    Full,
    /// Only pot, carry-over pot, turn and bet totals were applied.
    Partial,
    /// A new round arrived mid-reveal and will be applied once the reveal completes.
    Deferred,
    Duplicate,
    Stale,
}

impl Admission {
    /// Whether the snapshot changed local state.
    pub fn changed(&self) -> bool {
        matches!(self, Admission::Reset | Admission::Full | Admission::Partial)
    }
}

/// Request the engine wants its owner to issue.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Directive {
    /// Ask the server for the round after `round_no` of round `round_id`.
    StartNextRound { round_id: RoundId, round_no: u32 },
    RefreshMatch,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct CardView {
    pub front_value: u32,
    pub back_value: u32,
    pub chosen_side: Option<Side>,
}

impl From<&CardRecord> for CardView {
    fn from(card: &CardRecord) -> Self {
        Self {
            front_value: card.front_value,
            back_value: card.back_value,
            chosen_side: card.chosen_side,
        }
    }
}

/// Everything the presentation layer reads, published as one value.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct LocalState {
    pub match_id: MatchId,
    pub self_id: UserId,
    pub round_id: Option<RoundId>,
    pub round_no: u32,
    pub state: LocalRoundState,
    pub own_card: Option<CardView>,
    pub opponent_card: Option<CardView>,
    pub pot: u64,
    pub carry_over_pot: u64,
    pub current_turn_user_id: Option<UserId>,
    pub is_my_turn: bool,
    pub own_bet_total: u64,
    pub current_bet: u64,
    pub required_call: u64,
    /// False when nothing is owed; a zero call is not offered.
    pub can_call: bool,
    pub min_bet: u64,
    pub can_double_side_bet: bool,
    pub is_double_side_bet: bool,
    pub revealed_own: Option<u32>,
    pub revealed_opponent: Option<u32>,
    pub round_result: Option<RoundOutcome>,
    pub chips_gained: i64,
    pub deal: DealPhase,
    pub own_card_placed: bool,
    pub opponent_card_placed: bool,
    pub reveal: RevealPhase,
    pub cards_flipped: bool,
    pub own_chips: u64,
    pub opponent_chips: u64,
    pub opponent_name: Option<String>,
    pub match_status: MatchStatus,
    pub game_over: bool,
    pub game_winner: Option<UserId>,
}

impl LocalState {
    pub fn new(match_id: MatchId, self_id: UserId) -> Self {
        Self {
            match_id,
            self_id,
            round_id: None,
            round_no: 0,
            state: LocalRoundState::Dealing,
            own_card: None,
            opponent_card: None,
            pot: 0,
            carry_over_pot: 0,
            current_turn_user_id: None,
            is_my_turn: false,
            own_bet_total: 0,
            current_bet: 0,
            required_call: 0,
            can_call: false,
            min_bet: frontback_types::round::DEFAULT_MIN_BET,
            can_double_side_bet: false,
            is_double_side_bet: false,
            revealed_own: None,
            revealed_opponent: None,
            round_result: None,
            chips_gained: 0,
            deal: DealPhase::Idle,
            own_card_placed: false,
            opponent_card_placed: false,
            reveal: RevealPhase::Idle,
            cards_flipped: false,
            own_chips: 0,
            opponent_chips: 0,
            opponent_name: None,
            match_status: MatchStatus::Init,
            game_over: false,
            game_winner: None,
        }
    }

    /// Fresh round state that keeps the match-level fields.
    fn next_round(&self) -> Self {
        Self {
            own_chips: self.own_chips,
            opponent_chips: self.opponent_chips,
            opponent_name: self.opponent_name.clone(),
            match_status: self.match_status,
            game_over: self.game_over,
            game_winner: self.game_winner,
            ..Self::new(self.match_id, self.self_id)
        }
    }
}

/// Dedup key: a snapshot equal on all of these carries nothing new.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct AdmittedKey {
    round_id: RoundId,
    state: RoundState,
    current_turn: Option<UserId>,
    own_side: Option<Side>,
    opponent_side: Option<Side>,
}

impl AdmittedKey {
    fn of(snapshot: &RoundSnapshot, self_id: UserId) -> Self {
        Self {
            round_id: snapshot.id,
            state: snapshot.state,
            current_turn: snapshot.current_turn_user_id,
            own_side: snapshot.chosen_side_of(self_id),
            opponent_side: snapshot.opponent_chosen_side(self_id),
        }
    }
}

/// Last admitted snapshot: its dedup key plus how far the round had moved.
#[derive(Clone, Copy, Debug)]
struct Admitted {
    key: AdmittedKey,
    chosen_sides: usize,
    actions: usize,
}

impl Admitted {
    fn of(snapshot: &RoundSnapshot, self_id: UserId) -> Self {
        Self {
            key: AdmittedKey::of(snapshot, self_id),
            chosen_sides: snapshot.cards.iter().filter(|c| c.has_chosen()).count(),
            actions: snapshot.actions.len(),
        }
    }

    /// Within a round, server state only moves forward and sides and actions only accumulate.
    fn is_ahead_of(&self, next: &Admitted) -> bool {
        let (last, next_progress) = (self.key.state.progress(), next.key.state.progress());
        next_progress < last
            || (next_progress == last
                && (next.chosen_sides < self.chosen_sides || next.actions < self.actions))
    }
}

#[derive(Clone, Copy, Debug)]
struct RoundEnd {
    round_id: RoundId,
    round_no: u32,
    detected_at: Instant,
}

pub struct Engine {
    self_id: UserId,
    timeline: Timeline,
    state: LocalState,
    last_admitted: Option<Admitted>,
    deferred: Option<RoundSnapshot>,
    resolved_round: Option<RoundId>,
    round_end: Option<RoundEnd>,
    advance_pending: bool,
}

impl Engine {
    pub fn new(self_id: UserId, snapshot: &MatchSnapshot, config: TimelineConfig) -> Self {
        let mut engine = Self {
            self_id,
            timeline: Timeline::new(config),
            state: LocalState::new(snapshot.id, self_id),
            last_admitted: None,
            deferred: None,
            resolved_round: None,
            round_end: None,
            advance_pending: false,
        };
        engine.apply_match_fields(snapshot);
        engine
    }

    pub fn state(&self) -> &LocalState {
        &self.state
    }

    pub fn self_id(&self) -> UserId {
        self.self_id
    }

    pub fn match_id(&self) -> MatchId {
        self.state.match_id
    }

    pub fn round_id(&self) -> Option<RoundId> {
        self.state.round_id
    }

    /// The match is over and nothing is left to animate.
    pub fn is_finished(&self) -> bool {
        self.state.game_over && !self.timeline.is_busy()
    }

    /// Reconcile one server snapshot with the local view.
    pub fn admit(&mut self, snapshot: &RoundSnapshot, source: Source, now: Instant) -> Admission {
        if snapshot.match_id != 0 && snapshot.match_id != self.state.match_id {
            debug!(
                round_id = snapshot.id,
                match_id = snapshot.match_id,
                "ignoring round of another match"
            );
            return Admission::Stale;
        }

        match self.state.round_id {
            Some(current) if snapshot.id < current => {
                debug!(round_id = snapshot.id, current, "discarding stale round");
                return Admission::Stale;
            }
            Some(current) if snapshot.id == current => {}
            _ => {
                if self.timeline.is_busy() {
                    if self.deferred.as_ref().map_or(true, |d| d.id <= snapshot.id) {
                        self.deferred = Some(snapshot.clone());
                    }
                    debug!(round_id = snapshot.id, "deferring new round until reveal completes");
                    return Admission::Deferred;
                }
                self.reset_round(snapshot, now);
                self.apply_full(snapshot, now);
                if self.process_round_end(snapshot, now) {
                    self.last_admitted = Some(Admitted::of(snapshot, self.self_id));
                }
                return Admission::Reset;
            }
        }

        let admitted = Admitted::of(snapshot, self.self_id);
        if let Some(last) = self.last_admitted {
            if last.key == admitted.key {
                return Admission::Duplicate;
            }
            if last.is_ahead_of(&admitted) {
                debug!(
                    round_id = snapshot.id,
                    state = snapshot.state.as_str(),
                    last = last.key.state.as_str(),
                    chosen_sides = admitted.chosen_sides,
                    actions = admitted.actions,
                    "discarding snapshot behind the admitted state"
                );
                return Admission::Stale;
            }
        }

        let admission =
            if self.timeline.reveal().phase() == RevealPhase::Idle || source.bypasses_reveal_guard() {
                self.apply_full(snapshot, now);
                Admission::Full
            } else {
                self.apply_partial(snapshot);
                Admission::Partial
            };
        if self.process_round_end(snapshot, now) {
            self.last_admitted = Some(admitted);
        }
        debug!(
            round_id = snapshot.id,
            state = snapshot.state.as_str(),
            ?source,
            ?admission,
            "admitted snapshot"
        );
        admission
    }

    /// Apply a match snapshot: chip counts, status and game over detection.
    pub fn apply_match(&mut self, snapshot: &MatchSnapshot) -> Result<()> {
        if snapshot.id != self.state.match_id {
            return Err(Error::StaleMatch {
                match_id: snapshot.id,
            });
        }
        self.apply_match_fields(snapshot);
        Ok(())
    }

    fn apply_match_fields(&mut self, snapshot: &MatchSnapshot) {
        if let Some(player) = snapshot.player(self.self_id) {
            self.state.own_chips = player.chips;
        }
        if let Some(opponent) = snapshot.opponent(self.self_id) {
            self.state.opponent_chips = opponent.chips;
            self.state.opponent_name = Some(opponent.username.clone());
        }
        self.state.match_status = snapshot.status;

        if self.state.game_over {
            return;
        }
        let busted = snapshot.busted_player();
        if snapshot.status != MatchStatus::Ended && busted.is_none() {
            return;
        }
        let winner = match busted {
            Some(loser) => snapshot
                .players
                .iter()
                .find(|p| p.user_id != loser)
                .map(|p| p.user_id),
            None => {
                let best = snapshot.players.iter().map(|p| p.chips).max().unwrap_or(0);
                let mut leaders = snapshot.players.iter().filter(|p| p.chips == best);
                match (leaders.next(), leaders.next()) {
                    (Some(leader), None) => Some(leader.user_id),
                    _ => None,
                }
            }
        };
        self.state.game_over = true;
        self.state.game_winner = winner;
        info!(match_id = snapshot.id, ?winner, "match over");
    }

    /// Explicit request for the next round, allowed once the current round ended.
    pub fn request_next_round(&mut self) -> Result<Directive> {
        if self.state.game_over || self.state.match_status != MatchStatus::Active {
            return Err(Error::StaleMatch {
                match_id: self.state.match_id,
            });
        }
        let Some(end) = self.round_end else {
            return Err(Error::NotReady("round has not ended"));
        };
        if self.timeline.is_busy() {
            return Err(Error::NotReady("reveal in progress"));
        }
        if self.advance_pending {
            return Err(Error::NotReady("next round already requested"));
        }
        Ok(self.begin_advance(end))
    }

    /// The next round request failed; retry after the usual delay.
    pub fn next_round_failed(&mut self, now: Instant) {
        if !self.advance_pending {
            return;
        }
        self.advance_pending = false;
        if let Some(end) = self.round_end.as_mut() {
            end.detected_at = now;
        }
    }

    /// Earliest instant at which [Engine::tick] has work to do.
    pub fn next_deadline(&self) -> Option<Instant> {
        match (self.timeline.next_deadline(), self.advance_due()) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advance animations to `now` and return the requests that became due.
    pub fn tick(&mut self, now: Instant) -> Vec<Directive> {
        let events = self.timeline.tick(now);
        for event in &events {
            debug!(round_id = ?self.state.round_id, ?event, "timeline step");
        }
        self.sync_timeline();

        let mut directives = Vec::new();
        if events.contains(&TimelineEvent::RevealComplete) {
            if let Some(next) = self.deferred.take() {
                if self.admit(&next, Source::Poll, now).changed() {
                    directives.push(Directive::RefreshMatch);
                }
            }
        }
        if let Some(due) = self.advance_due() {
            if now >= due {
                if let Some(end) = self.round_end {
                    directives.push(self.begin_advance(end));
                }
            }
        }
        directives
    }

    fn begin_advance(&mut self, end: RoundEnd) -> Directive {
        self.advance_pending = true;
        self.state.state = LocalRoundState::Ended;
        info!(
            round_id = end.round_id,
            round_no = end.round_no,
            "requesting next round"
        );
        Directive::StartNextRound {
            round_id: end.round_id,
            round_no: end.round_no,
        }
    }

    fn advance_due(&self) -> Option<Instant> {
        if self.advance_pending
            || self.state.game_over
            || self.state.match_status != MatchStatus::Active
            || self.timeline.reveal().phase() != RevealPhase::Complete
        {
            return None;
        }
        let end = self.round_end?;
        Some(end.detected_at + self.timeline.config().advance_after)
    }

    fn reset_round(&mut self, snapshot: &RoundSnapshot, now: Instant) {
        self.state = self.state.next_round();
        self.state.round_id = Some(snapshot.id);
        self.state.round_no = snapshot.round_no;
        self.timeline.reset_for_new_round(now);
        self.sync_timeline();
        self.last_admitted = None;
        self.round_end = None;
        self.advance_pending = false;
        if self.deferred.as_ref().is_some_and(|d| d.id <= snapshot.id) {
            self.deferred = None;
        }
        info!(
            round_id = snapshot.id,
            round_no = snapshot.round_no,
            state = snapshot.state.as_str(),
            "new round"
        );
    }

    fn apply_full(&mut self, snapshot: &RoundSnapshot, now: Instant) {
        let own = snapshot.card_of(self.self_id);
        let opponent = snapshot.opponent_card(self.self_id);
        self.state.own_card = own.map(CardView::from);
        self.state.opponent_card = opponent.map(CardView::from);
        self.state.can_double_side_bet = can_double_side_bet(snapshot);
        self.state.is_double_side_bet = is_self_double_side(snapshot, self.self_id);

        if snapshot.state.shows_outcome() {
            self.state.revealed_own = own.and_then(resolved_value).or(self.state.revealed_own);
            self.state.revealed_opponent =
                opponent.and_then(resolved_value).or(self.state.revealed_opponent);
            if self.timeline.start_reveal(now) {
                self.state.state = LocalRoundState::Revealing;
                self.sync_timeline();
                info!(
                    round_id = snapshot.id,
                    own = ?self.state.revealed_own,
                    opponent = ?self.state.revealed_opponent,
                    "reveal started"
                );
            }
        } else {
            self.state.state = LocalRoundState::mirror(snapshot.state);
            self.timeline.ensure_dealt(now);
            self.sync_timeline();
        }
        self.apply_partial(snapshot);
    }

    fn apply_partial(&mut self, snapshot: &RoundSnapshot) {
        self.state.pot = snapshot.pot;
        self.state.carry_over_pot = snapshot.carry_over_pot;
        self.state.current_turn_user_id = snapshot.current_turn_user_id;
        self.state.is_my_turn = turn_ownership(snapshot, self.self_id);
        self.state.own_bet_total = aggregate_bet(snapshot, self.self_id);
        self.state.current_bet = current_bet(snapshot);
        self.state.required_call = required_call(snapshot, self.self_id);
        self.state.can_call = self.state.required_call > 0;
        self.state.min_bet = snapshot.min_bet;
    }

    fn fill_revealed(&mut self, snapshot: &RoundSnapshot) {
        if let Some(value) = snapshot.card_of(self.self_id).and_then(resolved_value) {
            self.state.revealed_own.get_or_insert(value);
        }
        if let Some(value) = snapshot.opponent_card(self.self_id).and_then(resolved_value) {
            self.state.revealed_opponent.get_or_insert(value);
        }
    }

    /// Resolve an ended round once. Returns false when the round end was skipped
    /// because the match is not active, so the snapshot can be admitted again later.
    fn process_round_end(&mut self, snapshot: &RoundSnapshot, now: Instant) -> bool {
        if snapshot.state != RoundState::Ended || self.resolved_round == Some(snapshot.id) {
            return true;
        }
        let Some(outcome) = outcome_for_self(snapshot, self.self_id) else {
            return true;
        };
        if self.state.match_status != MatchStatus::Active {
            let err = Error::StaleMatch {
                match_id: self.state.match_id,
            };
            debug!(round_id = snapshot.id, %err, "skipping round end");
            return false;
        }
        self.resolved_round = Some(snapshot.id);
        self.fill_revealed(snapshot);
        self.state.round_result = Some(outcome.tag);
        self.state.chips_gained = outcome.chips_gained;
        self.round_end = Some(RoundEnd {
            round_id: snapshot.id,
            round_no: snapshot.round_no,
            detected_at: now,
        });
        info!(
            round_id = snapshot.id,
            round_no = snapshot.round_no,
            outcome = ?outcome.tag,
            chips_gained = outcome.chips_gained,
            "round resolved"
        );
        true
    }

    fn sync_timeline(&mut self) {
        let deal = self.timeline.deal();
        self.state.deal = deal.phase();
        self.state.own_card_placed = deal.placed(Seat::Own);
        self.state.opponent_card_placed = deal.placed(Seat::Opponent);
        let reveal = self.timeline.reveal();
        self.state.reveal = reveal.phase();
        self.state.cards_flipped = reveal.flipped();
    }
}

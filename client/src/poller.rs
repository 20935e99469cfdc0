//! Fixed-interval polling of the current round and periodic match refreshes.
//!
//! Requests run in their own tasks so a hung request never delays the next tick.
//! Results come back over a channel tagged with a sequence number, and a round
//! older than the newest one already applied is dropped.

use crate::{Admission, Client, Engine, Result, SessionConfig, Source};
use frontback_types::{MatchId, MatchSnapshot, RoundSnapshot};
use std::time::Instant;
use tokio::{
    sync::mpsc,
    time::{interval, Interval, MissedTickBehavior},
};
use tracing::{debug, warn};

pub enum PollEvent {
    PollDue,
    RefreshDue,
    Round {
        seq: u64,
        result: Result<Option<RoundSnapshot>>,
    },
    Match(Result<MatchSnapshot>),
}

/// Orders poll results that may complete out of order.
#[derive(Clone, Copy, Debug, Default)]
pub struct PollSequence {
    issued: u64,
    newest_applied: u64,
}

impl PollSequence {
    pub fn issue(&mut self) -> u64 {
        self.issued += 1;
        self.issued
    }

    /// Accept `seq` unless a newer poll was already applied.
    pub fn accept(&mut self, seq: u64) -> bool {
        if seq <= self.newest_applied {
            return false;
        }
        self.newest_applied = seq;
        true
    }

    /// Drop every poll issued so far. Used once a fresher direct response was applied.
    pub fn supersede(&mut self) {
        self.newest_applied = self.issued;
    }
}

pub struct Poller {
    client: Client,
    match_id: MatchId,
    poll: Interval,
    refresh: Interval,
    sequence: PollSequence,
    sender: mpsc::UnboundedSender<PollEvent>,
    receiver: mpsc::UnboundedReceiver<PollEvent>,
}

impl Poller {
    pub fn new(client: Client, match_id: MatchId, config: &SessionConfig) -> Self {
        let mut poll = interval(config.poll_interval);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut refresh = interval(config.match_refresh_interval);
        refresh.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let (sender, receiver) = mpsc::unbounded_channel();
        Self {
            client,
            match_id,
            poll,
            refresh,
            sequence: PollSequence::default(),
            sender,
            receiver,
        }
    }

    /// Wait for the next tick or fetch result.
    pub async fn next(&mut self) -> PollEvent {
        tokio::select! {
            _ = self.poll.tick() => PollEvent::PollDue,
            _ = self.refresh.tick() => PollEvent::RefreshDue,
            Some(event) = self.receiver.recv() => event,
        }
    }

    /// Fetch the current round in the background.
    pub fn poll_now(&mut self) {
        let seq = self.sequence.issue();
        let client = self.client.clone();
        let match_id = self.match_id;
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = client.current_round(match_id).await;
            let _ = sender.send(PollEvent::Round { seq, result });
        });
    }

    /// Fetch the match in the background.
    pub fn refresh_match(&self) {
        let client = self.client.clone();
        let match_id = self.match_id;
        let sender = self.sender.clone();
        tokio::spawn(async move {
            let result = client.match_by_id(match_id).await;
            let _ = sender.send(PollEvent::Match(result));
        });
    }

    /// A direct response was admitted: polls already in flight can only be older.
    pub fn supersede(&mut self) {
        self.sequence.supersede();
    }

    /// Hand a round poll result to the engine.
    ///
    /// Failures never propagate: the next tick simply tries again.
    pub fn receive_round(
        &mut self,
        engine: &mut Engine,
        seq: u64,
        result: Result<Option<RoundSnapshot>>,
        now: Instant,
    ) -> Option<Admission> {
        match result {
            Ok(Some(snapshot)) => {
                if !self.sequence.accept(seq) {
                    debug!(seq, round_id = snapshot.id, "dropping out-of-order poll");
                    return None;
                }
                Some(engine.admit(&snapshot, Source::Poll, now))
            }
            Ok(None) => {
                debug!(match_id = self.match_id, "no current round");
                None
            }
            Err(err) if err.is_malformed() => {
                warn!(match_id = self.match_id, %err, "discarding malformed round");
                None
            }
            Err(err) => {
                warn!(match_id = self.match_id, %err, "round poll failed");
                None
            }
        }
    }

    pub fn receive_match(&self, engine: &mut Engine, result: Result<MatchSnapshot>) {
        match result {
            Ok(snapshot) => {
                if let Err(err) = engine.apply_match(&snapshot) {
                    debug!(%err, "ignoring match snapshot");
                }
            }
            Err(err) => warn!(match_id = self.match_id, %err, "match refresh failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Error, TimelineConfig};
    use frontback_types::{CardRecord, MatchPlayer, MatchStatus, RoundState};
    use std::time::Duration;

    fn table() -> MatchSnapshot {
        MatchSnapshot {
            id: 1,
            room_id: 1,
            status: MatchStatus::Active,
            players: vec![
                MatchPlayer {
                    user_id: 10,
                    username: "a".to_string(),
                    seat: 0,
                    chips: 30,
                    is_bot: false,
                },
                MatchPlayer {
                    user_id: 20,
                    username: "b".to_string(),
                    seat: 1,
                    chips: 30,
                    is_bot: false,
                },
            ],
        }
    }

    fn round(id: u64) -> RoundSnapshot {
        RoundSnapshot {
            id,
            match_id: 1,
            round_no: id as u32,
            state: RoundState::SideSelection,
            cards: vec![
                CardRecord {
                    player_id: 10,
                    front_value: 1,
                    back_value: 2,
                    chosen_side: None,
                },
                CardRecord {
                    player_id: 20,
                    front_value: 3,
                    back_value: 4,
                    chosen_side: None,
                },
            ],
            actions: vec![],
            pot: 2,
            carry_over_pot: 0,
            current_turn_user_id: Some(10),
            min_bet: 1,
            result: None,
            winner_id: None,
            is_double_side_bet: false,
            double_side_bonus: 0,
        }
    }

    #[test]
    fn sequence_rejects_older_results() {
        let mut sequence = PollSequence::default();
        let first = sequence.issue();
        let second = sequence.issue();
        assert!(sequence.accept(second));
        assert!(!sequence.accept(first));
        assert!(!sequence.accept(second));
        let third = sequence.issue();
        assert!(sequence.accept(third));
    }

    #[test]
    fn superseded_polls_are_dropped() {
        let mut sequence = PollSequence::default();
        let in_flight = sequence.issue();
        sequence.supersede();
        assert!(!sequence.accept(in_flight));
        let next = sequence.issue();
        assert!(sequence.accept(next));
    }

    #[tokio::test]
    async fn failed_polls_leave_state_untouched() {
        let client = Client::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let mut poller = Poller::new(client, 1, &SessionConfig::default());
        let mut engine = Engine::new(10, &table(), TimelineConfig::default());
        let now = Instant::now();

        let malformed = Err(Error::MalformedSnapshot(
            frontback_types::Error::MalformedSnapshot("no cards".to_string()),
        ));
        assert_eq!(poller.receive_round(&mut engine, 1, malformed, now), None);
        assert_eq!(poller.receive_round(&mut engine, 2, Ok(None), now), None);
        assert_eq!(engine.round_id(), None);

        assert_eq!(
            poller.receive_round(&mut engine, 4, Ok(Some(round(2))), now),
            Some(Admission::Reset)
        );
        assert_eq!(poller.receive_round(&mut engine, 3, Ok(Some(round(3))), now), None);
        assert_eq!(engine.round_id(), Some(2));
    }

    #[tokio::test]
    async fn polls_in_flight_lose_to_a_direct_response() {
        let client = Client::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        let mut poller = Poller::new(client, 1, &SessionConfig::default());
        let mut engine = Engine::new(10, &table(), TimelineConfig::default());
        let now = Instant::now();
        let first = poller.sequence.issue();
        poller.receive_round(&mut engine, first, Ok(Some(round(2))), now);

        let in_flight = poller.sequence.issue();
        let mut chosen = round(2);
        chosen.cards[0].chosen_side = Some(frontback_types::Side::Front);
        assert_eq!(
            engine.admit(&chosen, Source::SideSelection, now),
            Admission::Full
        );
        poller.supersede();

        assert_eq!(
            poller.receive_round(&mut engine, in_flight, Ok(Some(round(2))), now),
            None
        );
        assert_eq!(
            engine.state().own_card.as_ref().and_then(|c| c.chosen_side),
            Some(frontback_types::Side::Front)
        );
    }
}

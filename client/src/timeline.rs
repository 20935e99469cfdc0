//! Deal and reveal animation timelines.
//!
//! Both timelines are plain state machines driven by explicit instants. Nothing here
//! spawns timers: the owner calls [Timeline::tick] at or after
//! [Timeline::next_deadline], and a reset simply forgets every pending deadline.

use crate::TimelineConfig;
use serde::Serialize;
use std::time::Instant;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DealPhase {
    #[default]
    Idle,
    Dealing,
    Complete,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RevealPhase {
    #[default]
    Idle,
    Revealing,
    Collecting,
    Complete,
}

impl RevealPhase {
    /// Card and side fields must not be overwritten while busy.
    pub fn is_busy(&self) -> bool {
        matches!(self, RevealPhase::Revealing | RevealPhase::Collecting)
    }
}

/// Table position of a card.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Seat {
    Own,
    Opponent,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TimelineEvent {
    DealStarted,
    CardPlaced(Seat),
    DealComplete,
    CardsFlipped,
    CollectStarted,
    RevealComplete,
}

#[derive(Clone, Debug, Default)]
pub struct DealTimeline {
    phase: DealPhase,
    armed_at: Option<Instant>,
    started_at: Option<Instant>,
    placed: [bool; 2],
}

impl DealTimeline {
    pub fn phase(&self) -> DealPhase {
        self.phase
    }

    pub fn is_armed(&self) -> bool {
        self.armed_at.is_some()
    }

    pub fn placed(&self, seat: Seat) -> bool {
        self.placed[seat_index(seat)]
    }

    /// Schedule the deal to start at `at`. Ignored once dealing has begun.
    pub fn arm(&mut self, at: Instant) {
        if self.phase == DealPhase::Idle {
            self.armed_at = Some(at);
        }
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn next_deadline(&self, config: &TimelineConfig) -> Option<Instant> {
        match self.phase {
            DealPhase::Idle => self.armed_at,
            DealPhase::Dealing => {
                let start = self.started_at?;
                let offset = if !self.placed[0] {
                    config.first_card
                } else if !self.placed[1] {
                    config.second_card
                } else {
                    config.deal_duration
                };
                Some(start + offset)
            }
            DealPhase::Complete => None,
        }
    }

    fn tick(&mut self, now: Instant, config: &TimelineConfig, events: &mut Vec<TimelineEvent>) {
        if self.phase == DealPhase::Idle {
            match self.armed_at {
                Some(at) if now >= at => {
                    self.phase = DealPhase::Dealing;
                    self.started_at = Some(at);
                    self.armed_at = None;
                    events.push(TimelineEvent::DealStarted);
                }
                _ => return,
            }
        }
        if self.phase != DealPhase::Dealing {
            return;
        }
        let Some(start) = self.started_at else {
            return;
        };
        let steps = [
            (Seat::Own, config.first_card),
            (Seat::Opponent, config.second_card),
        ];
        for (seat, offset) in steps {
            let index = seat_index(seat);
            if !self.placed[index] && now >= start + offset {
                self.placed[index] = true;
                events.push(TimelineEvent::CardPlaced(seat));
            }
        }
        if now >= start + config.deal_duration {
            for (seat, _) in steps {
                let index = seat_index(seat);
                if !self.placed[index] {
                    self.placed[index] = true;
                    events.push(TimelineEvent::CardPlaced(seat));
                }
            }
            self.phase = DealPhase::Complete;
            events.push(TimelineEvent::DealComplete);
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct RevealTimeline {
    phase: RevealPhase,
    started_at: Option<Instant>,
    flipped: bool,
}

impl RevealTimeline {
    pub fn phase(&self) -> RevealPhase {
        self.phase
    }

    pub fn flipped(&self) -> bool {
        self.flipped
    }

    /// Start revealing at `now`. Returns false if the reveal already started.
    pub fn start(&mut self, now: Instant) -> bool {
        if self.phase != RevealPhase::Idle {
            return false;
        }
        self.phase = RevealPhase::Revealing;
        self.started_at = Some(now);
        self.flipped = false;
        true
    }

    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn next_deadline(&self, config: &TimelineConfig) -> Option<Instant> {
        let start = self.started_at?;
        match self.phase {
            RevealPhase::Revealing if !self.flipped => Some(start + config.reveal_flip),
            RevealPhase::Revealing => Some(start + config.reveal_collect),
            RevealPhase::Collecting => Some(start + config.reveal_complete),
            RevealPhase::Idle | RevealPhase::Complete => None,
        }
    }

    fn tick(&mut self, now: Instant, config: &TimelineConfig, events: &mut Vec<TimelineEvent>) {
        let Some(start) = self.started_at else {
            return;
        };
        if self.phase == RevealPhase::Revealing {
            if !self.flipped && now >= start + config.reveal_flip {
                self.flipped = true;
                events.push(TimelineEvent::CardsFlipped);
            }
            if now >= start + config.reveal_collect {
                self.phase = RevealPhase::Collecting;
                events.push(TimelineEvent::CollectStarted);
            }
        }
        if self.phase == RevealPhase::Collecting && now >= start + config.reveal_complete {
            self.phase = RevealPhase::Complete;
            events.push(TimelineEvent::RevealComplete);
        }
    }
}

/// Deal and reveal timelines of the current round.
#[derive(Clone, Debug)]
pub struct Timeline {
    config: TimelineConfig,
    deal: DealTimeline,
    reveal: RevealTimeline,
}

impl Timeline {
    pub fn new(config: TimelineConfig) -> Self {
        Self {
            config,
            deal: DealTimeline::default(),
            reveal: RevealTimeline::default(),
        }
    }

    pub fn config(&self) -> &TimelineConfig {
        &self.config
    }

    pub fn deal(&self) -> &DealTimeline {
        &self.deal
    }

    pub fn reveal(&self) -> &RevealTimeline {
        &self.reveal
    }

    pub fn is_busy(&self) -> bool {
        self.reveal.phase.is_busy()
    }

    /// Forget both timelines and schedule the next deal after the configured delay.
    pub fn reset_for_new_round(&mut self, now: Instant) {
        self.deal.reset();
        self.reveal.reset();
        self.deal.arm(now + self.config.deal_delay);
    }

    /// Start the deal now if it is neither running nor scheduled.
    pub fn ensure_dealt(&mut self, now: Instant) {
        if self.deal.phase == DealPhase::Idle && !self.deal.is_armed() {
            self.deal.arm(now);
        }
    }

    pub fn start_reveal(&mut self, now: Instant) -> bool {
        self.reveal.start(now)
    }

    pub fn next_deadline(&self) -> Option<Instant> {
        match (
            self.deal.next_deadline(&self.config),
            self.reveal.next_deadline(&self.config),
        ) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        }
    }

    /// Advance both timelines to `now`, returning the steps reached in order.
    pub fn tick(&mut self, now: Instant) -> Vec<TimelineEvent> {
        let mut events = Vec::new();
        self.deal.tick(now, &self.config, &mut events);
        self.reveal.tick(now, &self.config, &mut events);
        events
    }
}

fn seat_index(seat: Seat) -> usize {
    match seat {
        Seat::Own => 0,
        Seat::Opponent => 1,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn ms(value: u64) -> Duration {
        Duration::from_millis(value)
    }

    #[test]
    fn deal_places_cards_in_order() {
        let start = Instant::now();
        let mut timeline = Timeline::new(TimelineConfig::default());
        timeline.reset_for_new_round(start);
        assert_eq!(timeline.next_deadline(), Some(start + ms(100)));

        assert!(timeline.tick(start + ms(50)).is_empty());
        assert_eq!(timeline.tick(start + ms(100)), vec![TimelineEvent::DealStarted]);
        assert_eq!(timeline.next_deadline(), Some(start + ms(400)));
        assert_eq!(
            timeline.tick(start + ms(400)),
            vec![TimelineEvent::CardPlaced(Seat::Own)]
        );
        assert_eq!(
            timeline.tick(start + ms(900)),
            vec![TimelineEvent::CardPlaced(Seat::Opponent)]
        );
        assert_eq!(timeline.next_deadline(), Some(start + ms(2_600)));
        assert_eq!(timeline.tick(start + ms(2_600)), vec![TimelineEvent::DealComplete]);
        assert_eq!(timeline.deal().phase(), DealPhase::Complete);
        assert_eq!(timeline.next_deadline(), None);
    }

    #[test]
    fn late_tick_catches_up_in_order() {
        let start = Instant::now();
        let mut timeline = Timeline::new(TimelineConfig::default());
        timeline.reset_for_new_round(start);
        assert_eq!(
            timeline.tick(start + ms(10_000)),
            vec![
                TimelineEvent::DealStarted,
                TimelineEvent::CardPlaced(Seat::Own),
                TimelineEvent::CardPlaced(Seat::Opponent),
                TimelineEvent::DealComplete,
            ]
        );
    }

    #[test]
    fn reveal_steps_and_busy_window() {
        let start = Instant::now();
        let mut timeline = Timeline::new(TimelineConfig::default());
        assert!(!timeline.is_busy());
        assert!(timeline.start_reveal(start));
        assert!(!timeline.start_reveal(start + ms(1)));
        assert!(timeline.is_busy());

        assert_eq!(timeline.tick(start + ms(600)), vec![TimelineEvent::CardsFlipped]);
        assert!(timeline.reveal().flipped());
        assert_eq!(timeline.tick(start + ms(4_200)), vec![TimelineEvent::CollectStarted]);
        assert!(timeline.is_busy());
        assert_eq!(timeline.tick(start + ms(6_200)), vec![TimelineEvent::RevealComplete]);
        assert_eq!(timeline.reveal().phase(), RevealPhase::Complete);
        assert!(!timeline.is_busy());
        assert!(!timeline.start_reveal(start + ms(7_000)));
    }

    #[test]
    fn reset_cancels_pending_steps() {
        let start = Instant::now();
        let mut timeline = Timeline::new(TimelineConfig::default());
        timeline.start_reveal(start);
        timeline.ensure_dealt(start);
        timeline.tick(start + ms(700));

        timeline.reset_for_new_round(start + ms(800));
        assert_eq!(timeline.reveal().phase(), RevealPhase::Idle);
        assert_eq!(timeline.deal().phase(), DealPhase::Idle);
        assert_eq!(timeline.next_deadline(), Some(start + ms(900)));
        let events = timeline.tick(start + ms(5_000));
        assert!(!events.contains(&TimelineEvent::CollectStarted));
    }

    #[test]
    fn ensure_dealt_keeps_existing_schedule() {
        let start = Instant::now();
        let mut timeline = Timeline::new(TimelineConfig::default());
        timeline.reset_for_new_round(start);
        timeline.ensure_dealt(start);
        assert_eq!(timeline.next_deadline(), Some(start + ms(100)));
    }
}

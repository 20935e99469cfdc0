//! Session and animation timings, overridable through the environment.

use crate::RetryPolicy;
use std::time::Duration;

/// Offsets of every animation step, relative to the step's start.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimelineConfig {
    /// Delay between observing a new round and starting its deal.
    pub deal_delay: Duration,
    pub first_card: Duration,
    pub second_card: Duration,
    pub deal_duration: Duration,
    pub reveal_flip: Duration,
    pub reveal_collect: Duration,
    pub reveal_complete: Duration,
    /// Delay between round-end detection and the automatic next round request.
    pub advance_after: Duration,
}

impl Default for TimelineConfig {
    fn default() -> Self {
        Self {
            deal_delay: Duration::from_millis(100),
            first_card: Duration::from_millis(300),
            second_card: Duration::from_millis(800),
            deal_duration: Duration::from_millis(2_500),
            reveal_flip: Duration::from_millis(600),
            reveal_collect: Duration::from_millis(4_200),
            reveal_complete: Duration::from_millis(6_200),
            advance_after: Duration::from_millis(6_500),
        }
    }
}

impl TimelineConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            deal_delay: read_ms("FRONTBACK_DEAL_DELAY_MS", defaults.deal_delay),
            first_card: read_ms("FRONTBACK_FIRST_CARD_MS", defaults.first_card),
            second_card: read_ms("FRONTBACK_SECOND_CARD_MS", defaults.second_card),
            deal_duration: read_ms("FRONTBACK_DEAL_MS", defaults.deal_duration),
            reveal_flip: read_ms("FRONTBACK_REVEAL_FLIP_MS", defaults.reveal_flip),
            reveal_collect: read_ms("FRONTBACK_REVEAL_COLLECT_MS", defaults.reveal_collect),
            reveal_complete: read_ms("FRONTBACK_REVEAL_COMPLETE_MS", defaults.reveal_complete),
            advance_after: read_ms("FRONTBACK_ADVANCE_MS", defaults.advance_after),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SessionConfig {
    pub poll_interval: Duration,
    pub match_refresh_interval: Duration,
    pub request_timeout: Duration,
    /// Extra poll after a side selection that leaves the round in side selection.
    pub side_recheck_delay: Duration,
    pub retry: RetryPolicy,
    pub timeline: TimelineConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            poll_interval: Duration::from_secs(1),
            match_refresh_interval: Duration::from_secs(5),
            request_timeout: Duration::from_secs(10),
            side_recheck_delay: Duration::from_millis(500),
            retry: RetryPolicy::default(),
            timeline: TimelineConfig::default(),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            poll_interval: read_ms("FRONTBACK_POLL_MS", defaults.poll_interval),
            match_refresh_interval: read_ms(
                "FRONTBACK_MATCH_REFRESH_MS",
                defaults.match_refresh_interval,
            ),
            request_timeout: read_ms("FRONTBACK_REQUEST_TIMEOUT_MS", defaults.request_timeout),
            side_recheck_delay: read_ms(
                "FRONTBACK_SIDE_RECHECK_MS",
                defaults.side_recheck_delay,
            ),
            retry: RetryPolicy {
                max_attempts: read_u32("FRONTBACK_RETRY_ATTEMPTS", defaults.retry.max_attempts)
                    .max(1),
                ..defaults.retry
            },
            timeline: TimelineConfig::from_env(),
        }
    }
}

fn read_ms(key: &str, fallback: Duration) -> Duration {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u64>().ok())
        .map(Duration::from_millis)
        .unwrap_or(fallback)
}

fn read_u32(key: &str, fallback: u32) -> u32 {
    std::env::var(key)
        .ok()
        .and_then(|raw| raw.parse::<u32>().ok())
        .unwrap_or(fallback)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reveal_steps_are_ordered() {
        let config = TimelineConfig::default();
        assert!(config.reveal_flip < config.reveal_collect);
        assert!(config.reveal_collect < config.reveal_complete);
        assert!(config.reveal_complete < config.advance_after);
        assert!(config.first_card < config.second_card);
        assert!(config.second_card < config.deal_duration);
    }

    #[test]
    fn env_overrides_fall_back_on_garbage() {
        std::env::set_var("FRONTBACK_TEST_MS_OK", "250");
        std::env::set_var("FRONTBACK_TEST_MS_BAD", "soon");
        assert_eq!(
            read_ms("FRONTBACK_TEST_MS_OK", Duration::ZERO),
            Duration::from_millis(250)
        );
        assert_eq!(
            read_ms("FRONTBACK_TEST_MS_BAD", Duration::from_secs(1)),
            Duration::from_secs(1)
        );
        assert_eq!(read_u32("FRONTBACK_TEST_MISSING", 3), 3);
    }
}

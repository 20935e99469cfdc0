//! Headless table client - joins a room's match and follows it from the terminal.
//!
//! Usage:
//!   cargo run --release --bin frontback-table -- --room <ROOM_ID> --user <USER_ID>
//!
//! Options:
//!   -u, --url           Game server URL (default: http://localhost:8000)
//!   -r, --room          Room whose match to join (required)
//!       --user          Seated user id (required)
//!       --autoplay      Pick sides and bet automatically
//!       --raise         Raise used by autoplay when nothing is owed (default: 1)
//!       --json          Print every published state as one JSON line
//!       --log-level     Tracing level (default: info)
//!
//! Timings come from the FRONTBACK_* environment variables.

use anyhow::{bail, Context, Result};
use clap::Parser;
use frontback_client::{
    engine::CardView, Client, LocalRoundState, LocalState, Session, SessionConfig, SessionExit,
    SessionHandle,
};
use frontback_types::{ActionType, RoundId, RoundOutcome, Side};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Parser, Debug)]
#[command(author, version, about = "Headless frontback table client")]
struct Args {
    #[arg(short, long, default_value = "http://localhost:8000")]
    url: String,

    #[arg(short, long)]
    room: u64,

    #[arg(long)]
    user: u64,

    #[arg(long)]
    autoplay: bool,

    #[arg(long, default_value = "1")]
    raise: u64,

    #[arg(long)]
    json: bool,

    #[arg(long, default_value = "info")]
    log_level: tracing::Level,

    #[arg(long, default_value = "2")]
    wait_secs: u64,

    #[arg(long, default_value = "30")]
    wait_attempts: u32,
}

/// Fields worth an info line when they change.
#[derive(Clone, Debug, PartialEq, Eq)]
struct Summary {
    round_id: Option<RoundId>,
    state: LocalRoundState,
    is_my_turn: bool,
    pot: u64,
    round_result: Option<RoundOutcome>,
    own_chips: u64,
    opponent_chips: u64,
}

impl From<&LocalState> for Summary {
    fn from(state: &LocalState) -> Self {
        Self {
            round_id: state.round_id,
            state: state.state,
            is_my_turn: state.is_my_turn,
            pot: state.pot,
            round_result: state.round_result,
            own_chips: state.own_chips,
            opponent_chips: state.opponent_chips,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_max_level(args.log_level)
        .init();

    let config = SessionConfig::from_env();
    let client = Client::new(&args.url, config.request_timeout)
        .context("invalid server url")?
        .with_retry_policy(config.retry);

    let snapshot = client
        .wait_for_match(
            args.room,
            Duration::from_secs(args.wait_secs),
            args.wait_attempts,
        )
        .await
        .with_context(|| format!("no match in room {}", args.room))?;
    if snapshot.player(args.user).is_none() {
        bail!("user {} is not seated in match {}", args.user, snapshot.id);
    }
    info!(
        match_id = snapshot.id,
        room_id = args.room,
        opponent = ?snapshot.opponent(args.user).map(|p| p.username.as_str()),
        "joined match"
    );

    let (session, handle) = Session::new(client, config, args.user, &snapshot);
    let mut task = tokio::spawn(session.run());
    let mut updates = handle.subscribe();
    let mut last_summary: Option<Summary> = None;
    let mut acted: Option<(RoundId, LocalRoundState, u64)> = None;

    loop {
        tokio::select! {
            exit = &mut task => {
                let exit = exit.context("session task failed")?;
                report(&handle.state(), exit);
                return Ok(());
            }
            changed = updates.changed() => {
                if changed.is_err() {
                    let exit = (&mut task).await.context("session task failed")?;
                    report(&handle.state(), exit);
                    return Ok(());
                }
                let state = updates.borrow_and_update().clone();
                if args.json {
                    println!("{}", serde_json::to_string(&state)?);
                }
                let summary = Summary::from(&state);
                if last_summary.as_ref() != Some(&summary) {
                    info!(?summary, "table");
                    last_summary = Some(summary);
                } else {
                    debug!(deal = ?state.deal, reveal = ?state.reveal, "animation");
                }
                if args.autoplay {
                    autoplay(&handle, &state, args.raise, &mut acted).await;
                }
            }
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted");
                handle.exit_to_lobby().await;
            }
        }
    }
}

async fn autoplay(
    handle: &SessionHandle,
    state: &LocalState,
    raise: u64,
    acted: &mut Option<(RoundId, LocalRoundState, u64)>,
) {
    let Some(round_id) = state.round_id else {
        return;
    };
    if !state.is_my_turn {
        return;
    }
    let turn = (round_id, state.state, state.current_bet);
    if *acted == Some(turn) {
        return;
    }

    let result = match (state.state, state.own_card.as_ref()) {
        (LocalRoundState::SideSelection, Some(card)) if card.chosen_side.is_none() => {
            handle.select_side(preferred_side(card)).await
        }
        (LocalRoundState::Betting, _) if state.can_call => {
            handle
                .send_betting_action(ActionType::Call, Some(state.required_call))
                .await
        }
        (LocalRoundState::Betting, _) if state.own_chips > raise => {
            handle
                .send_betting_action(ActionType::Raise, Some(raise))
                .await
        }
        (LocalRoundState::Betting, _) => handle.send_betting_action(ActionType::Call, None).await,
        _ => return,
    };
    *acted = Some(turn);
    if let Err(err) = result {
        warn!(round_id, %err, "autoplay action failed");
    }
}

fn preferred_side(card: &CardView) -> Side {
    if card.back_value > card.front_value {
        Side::Back
    } else {
        Side::Front
    }
}

fn report(state: &LocalState, exit: SessionExit) {
    match exit {
        SessionExit::GameOver => {
            let verdict = match state.game_winner {
                Some(winner) if winner == state.self_id => "won",
                Some(_) => "lost",
                None => "drew",
            };
            info!(
                match_id = state.match_id,
                own_chips = state.own_chips,
                opponent_chips = state.opponent_chips,
                "match {verdict}"
            );
        }
        SessionExit::Lobby => info!(match_id = state.match_id, "left to lobby"),
    }
}

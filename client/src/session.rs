//! A seated player's session at one table.
//!
//! [Session::run] is a single task that owns the [Engine]. Polls, player commands,
//! request responses and animation deadlines are all handled in that task, one at a
//! time, and the resulting [LocalState] is published as a whole after each step.
//! [SessionHandle] is the cloneable front end used by the presentation layer.

use crate::{
    poller::{PollEvent, Poller},
    Admission, Client, Directive, Engine, Error, LocalState, Result, SessionConfig, Source,
};
use frontback_types::{
    api::ActionRequest, ActionType, MatchSnapshot, RoundSnapshot, RoundState, Side, UserId,
};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};

const COMMAND_BUFFER: usize = 16;

type Reply = oneshot::Sender<Result<()>>;

enum Command {
    SelectSide {
        side: Side,
        reply: Reply,
    },
    BettingAction {
        action: ActionType,
        amount: Option<u64>,
        reply: Reply,
    },
    NextRound {
        reply: Reply,
    },
    Exit,
}

enum Response {
    SideSelected {
        result: Result<RoundSnapshot>,
        reply: Reply,
    },
    ActionDone {
        action: ActionType,
        result: Result<Option<RoundSnapshot>>,
        reply: Reply,
    },
    NextRound {
        result: Result<RoundSnapshot>,
        reply: Option<Reply>,
    },
}

/// Why a session stopped.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SessionExit {
    GameOver,
    Lobby,
}

#[derive(Clone)]
pub struct SessionHandle {
    commands: mpsc::Sender<Command>,
    state: watch::Receiver<LocalState>,
}

impl SessionHandle {
    /// Latest published state.
    pub fn state(&self) -> LocalState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<LocalState> {
        self.state.clone()
    }

    pub async fn select_side(&self, side: Side) -> Result<()> {
        self.request(|reply| Command::SelectSide { side, reply })
            .await
    }

    pub async fn send_betting_action(&self, action: ActionType, amount: Option<u64>) -> Result<()> {
        self.request(|reply| Command::BettingAction {
            action,
            amount,
            reply,
        })
        .await
    }

    pub async fn request_next_round(&self) -> Result<()> {
        self.request(|reply| Command::NextRound { reply }).await
    }

    /// Stop the session. Pending requests are abandoned.
    pub async fn exit_to_lobby(&self) {
        let _ = self.commands.send(Command::Exit).await;
    }

    async fn request(&self, command: impl FnOnce(Reply) -> Command) -> Result<()> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(command(reply))
            .await
            .map_err(|_| Error::SessionClosed)?;
        response.await.map_err(|_| Error::SessionClosed)?
    }
}

pub struct Session {
    client: Client,
    config: SessionConfig,
    engine: Engine,
    poller: Poller,
    state: watch::Sender<LocalState>,
    commands: mpsc::Receiver<Command>,
    responses_tx: mpsc::UnboundedSender<Response>,
    responses: mpsc::UnboundedReceiver<Response>,
    recheck_at: Option<Instant>,
}

impl Session {
    /// Seat `self_id` at the table of `snapshot`. Must be called within a tokio runtime.
    pub fn new(
        client: Client,
        config: SessionConfig,
        self_id: UserId,
        snapshot: &MatchSnapshot,
    ) -> (Self, SessionHandle) {
        let engine = Engine::new(self_id, snapshot, config.timeline.clone());
        let (state, state_rx) = watch::channel(engine.state().clone());
        let (commands_tx, commands) = mpsc::channel(COMMAND_BUFFER);
        let (responses_tx, responses) = mpsc::unbounded_channel();
        let poller = Poller::new(client.clone(), snapshot.id, &config);
        let session = Self {
            client,
            config,
            engine,
            poller,
            state,
            commands,
            responses_tx,
            responses,
            recheck_at: None,
        };
        let handle = SessionHandle {
            commands: commands_tx,
            state: state_rx,
        };
        (session, handle)
    }

    pub async fn run(mut self) -> SessionExit {
        info!(
            match_id = self.engine.match_id(),
            self_id = self.engine.self_id(),
            "session started"
        );
        loop {
            if self.engine.is_finished() {
                info!(
                    match_id = self.engine.match_id(),
                    winner = ?self.engine.state().game_winner,
                    "game over, leaving table"
                );
                return SessionExit::GameOver;
            }

            let deadline = earliest(self.engine.next_deadline(), self.recheck_at);
            let wake = async move {
                match deadline {
                    Some(at) => tokio::time::sleep_until(tokio::time::Instant::from_std(at)).await,
                    None => futures::future::pending::<()>().await,
                }
            };

            tokio::select! {
                event = self.poller.next() => self.on_poll_event(event),
                command = self.commands.recv() => match command {
                    Some(Command::Exit) | None => {
                        info!(match_id = self.engine.match_id(), "leaving to lobby");
                        return SessionExit::Lobby;
                    }
                    Some(command) => self.dispatch(command),
                },
                Some(response) = self.responses.recv() => self.on_response(response),
                _ = wake => self.on_deadline(),
            }
            self.publish();
        }
    }

    fn publish(&self) {
        let next = self.engine.state();
        self.state.send_if_modified(|current| {
            if *current == *next {
                return false;
            }
            *current = next.clone();
            true
        });
    }

    fn on_poll_event(&mut self, event: PollEvent) {
        match event {
            PollEvent::PollDue => {
                if !self.engine.state().game_over {
                    self.poller.poll_now();
                }
            }
            PollEvent::RefreshDue => self.poller.refresh_match(),
            PollEvent::Round { seq, result } => {
                let admission =
                    self.poller
                        .receive_round(&mut self.engine, seq, result, Instant::now());
                if admission.is_some_and(|a| a.changed()) {
                    self.poller.refresh_match();
                }
            }
            PollEvent::Match(result) => self.poller.receive_match(&mut self.engine, result),
        }
    }

    fn on_deadline(&mut self) {
        let now = Instant::now();
        if self.recheck_at.is_some_and(|at| now >= at) {
            self.recheck_at = None;
            debug!(match_id = self.engine.match_id(), "rechecking side selection");
            self.poller.poll_now();
        }
        for directive in self.engine.tick(now) {
            self.issue(directive, None);
        }
    }

    fn issue(&mut self, directive: Directive, reply: Option<Reply>) {
        match directive {
            Directive::RefreshMatch => {
                self.poller.refresh_match();
                if let Some(reply) = reply {
                    let _ = reply.send(Ok(()));
                }
            }
            Directive::StartNextRound { round_no, .. } => {
                let client = self.client.clone();
                let match_id = self.engine.match_id();
                let responses = self.responses_tx.clone();
                tokio::spawn(async move {
                    let result = client.next_round(match_id, round_no).await;
                    let _ = responses.send(Response::NextRound { result, reply });
                });
            }
        }
    }

    fn dispatch(&mut self, command: Command) {
        let self_id = self.engine.self_id();
        match command {
            Command::SelectSide { side, reply } => {
                let Some(round_id) = self.engine.round_id() else {
                    let _ = reply.send(Err(Error::NotReady("no round yet")));
                    return;
                };
                info!(round_id, side = side.as_str(), "selecting side");
                let client = self.client.clone();
                let responses = self.responses_tx.clone();
                tokio::spawn(async move {
                    let result = client.select_side(round_id, self_id, side).await;
                    let _ = responses.send(Response::SideSelected { result, reply });
                });
            }
            Command::BettingAction {
                action,
                amount,
                reply,
            } => {
                let Some(round_id) = self.engine.round_id() else {
                    let _ = reply.send(Err(Error::NotReady("no round yet")));
                    return;
                };
                info!(round_id, action = action.as_str(), ?amount, "sending action");
                let request = ActionRequest {
                    player_id: self_id,
                    action_type: action,
                    amount,
                };
                let client = self.client.clone();
                let responses = self.responses_tx.clone();
                tokio::spawn(async move {
                    let result = client.send_action(round_id, &request).await;
                    let _ = responses.send(Response::ActionDone {
                        action,
                        result,
                        reply,
                    });
                });
            }
            Command::NextRound { reply } => match self.engine.request_next_round() {
                Ok(directive) => self.issue(directive, Some(reply)),
                Err(err) => {
                    let _ = reply.send(Err(err));
                }
            },
            Command::Exit => {}
        }
    }

    fn on_response(&mut self, response: Response) {
        let now = Instant::now();
        match response {
            Response::SideSelected { result, reply } => match result {
                Ok(round) => {
                    let admission = self.engine.admit(&round, Source::SideSelection, now);
                    self.admitted_directly(admission);
                    if round.state == RoundState::SideSelection {
                        self.recheck_at = Some(now + self.config.side_recheck_delay);
                    }
                    if admission.changed() {
                        self.poller.refresh_match();
                    }
                    let _ = reply.send(Ok(()));
                }
                Err(err) => {
                    warn!(%err, "side selection failed");
                    let _ = reply.send(Err(err));
                }
            },
            Response::ActionDone {
                action,
                result,
                reply,
            } => match result {
                Ok(Some(round)) => {
                    let admission = self.engine.admit(&round, Source::ActionResponse(action), now);
                    self.admitted_directly(admission);
                    if admission.changed() {
                        self.poller.refresh_match();
                    }
                    let _ = reply.send(Ok(()));
                }
                Ok(None) => {
                    self.poller.poll_now();
                    let _ = reply.send(Ok(()));
                }
                Err(err) => {
                    warn!(action = action.as_str(), %err, "action failed");
                    let _ = reply.send(Err(err));
                }
            },
            Response::NextRound { result, reply } => {
                let result = match result {
                    Ok(round) => {
                        let admission = self.engine.admit(&round, Source::NextRound, now);
                        self.admitted_directly(admission);
                        self.poller.refresh_match();
                        Ok(())
                    }
                    Err(err) => {
                        warn!(%err, "next round request failed");
                        self.engine.next_round_failed(now);
                        Err(err)
                    }
                };
                if let Some(reply) = reply {
                    let _ = reply.send(result);
                }
            }
        }
    }

    /// Polls issued before a direct response was admitted carry older server state.
    fn admitted_directly(&mut self, admission: Admission) {
        if admission != Admission::Stale {
            self.poller.supersede();
        }
    }
}

fn earliest(a: Option<Instant>, b: Option<Instant>) -> Option<Instant> {
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

use crate::{backoff::jittered_backoff, Error, Result, RetryPolicy};
use frontback_types::{
    api::{ActionRequest, ActionResponse, ErrorBody, SideSelectionRequest},
    MatchId, MatchSnapshot, RoomId, RoundId, RoundSnapshot, Side, UserId,
};
use reqwest::StatusCode;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// HTTP client for the game server's round and match endpoints.
#[derive(Clone, Debug)]
pub struct Client {
    pub base_url: Url,
    pub http_client: reqwest::Client,
    retry_policy: RetryPolicy,
}

fn current_round_path(base: &Url, match_id: MatchId) -> Result<Url> {
    Ok(base.join(&format!("api/rounds/match/{match_id}/current"))?)
}

fn round_path(base: &Url, round_id: RoundId) -> Result<Url> {
    Ok(base.join(&format!("api/rounds/{round_id}"))?)
}

fn select_side_path(base: &Url, round_id: RoundId) -> Result<Url> {
    Ok(base.join(&format!("api/rounds/{round_id}/select-side"))?)
}

fn action_path(base: &Url, round_id: RoundId) -> Result<Url> {
    Ok(base.join(&format!("api/rounds/{round_id}/action"))?)
}

fn start_round_path(base: &Url, match_id: MatchId) -> Result<Url> {
    Ok(base.join(&format!("api/rounds/{match_id}/start"))?)
}

fn match_path(base: &Url, match_id: MatchId) -> Result<Url> {
    Ok(base.join(&format!("api/matches/{match_id}"))?)
}

fn match_by_room_path(base: &Url, room_id: RoomId) -> Result<Url> {
    Ok(base.join(&format!("api/matches/room/{room_id}"))?)
}

async fn failed_with_body(response: reqwest::Response) -> Error {
    let status = response.status();
    match response.text().await {
        Ok(body) if !body.is_empty() => Error::FailedWithBody { status, body },
        _ => Error::Failed(status),
    }
}

impl Client {
    pub fn new(base_url: &str, request_timeout: Duration) -> Result<Self> {
        let mut base_url = Url::parse(base_url)?;
        match base_url.scheme() {
            "http" | "https" => {}
            scheme => return Err(Error::InvalidScheme(scheme.to_string())),
        }
        // Relative joins replace the last segment unless the base ends with '/'.
        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }

        let http_client = reqwest::Client::builder()
            .timeout(request_timeout)
            .build()?;
        Ok(Self {
            base_url,
            http_client,
            retry_policy: RetryPolicy::default(),
        })
    }

    pub fn with_retry_policy(mut self, retry_policy: RetryPolicy) -> Self {
        self.retry_policy = retry_policy;
        self
    }

    /// Current round of a match, or `None` if the match has none yet.
    ///
    /// Used by the poll loop, so a single attempt is made.
    pub async fn current_round(&self, match_id: MatchId) -> Result<Option<RoundSnapshot>> {
        let response = self
            .http_client
            .get(current_round_path(&self.base_url, match_id)?)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                Ok(Some(RoundSnapshot::from_json(&bytes)?))
            }
            _ => Err(failed_with_body(response).await),
        }
    }

    /// [Client::current_round] with the retry policy applied.
    pub async fn current_round_with_retry(
        &self,
        match_id: MatchId,
    ) -> Result<Option<RoundSnapshot>> {
        let mut retry = 0;
        loop {
            match self.current_round(match_id).await {
                Err(err) if err.is_transport() && retry + 1 < self.retry_policy.max_attempts => {
                    let delay =
                        jittered_backoff(&mut rand::thread_rng(), self.retry_policy.backoff(retry));
                    warn!(match_id, retry, ?delay, %err, "retrying current round");
                    tokio::time::sleep(delay).await;
                    retry += 1;
                }
                result => return result,
            }
        }
    }

    pub async fn round(&self, round_id: RoundId) -> Result<RoundSnapshot> {
        let response = self
            .http_client
            .get(round_path(&self.base_url, round_id)?)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                Ok(RoundSnapshot::from_json(&bytes)?)
            }
            _ => Err(failed_with_body(response).await),
        }
    }

    /// Commit `player_id` to `side`. A 400 carries the server's reason.
    pub async fn select_side(
        &self,
        round_id: RoundId,
        player_id: UserId,
        side: Side,
    ) -> Result<RoundSnapshot> {
        let response = self
            .http_client
            .post(select_side_path(&self.base_url, round_id)?)
            .json(&SideSelectionRequest { player_id, side })
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                Ok(RoundSnapshot::from_json(&bytes)?)
            }
            StatusCode::BAD_REQUEST => {
                let detail = response
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.detail)
                    .unwrap_or_default();
                Err(Error::ActionRejected(detail))
            }
            _ => Err(failed_with_body(response).await),
        }
    }

    /// Submit a betting action.
    ///
    /// Returns the updated round when the server includes one. A response with
    /// `success == false` becomes [Error::ActionRejected].
    pub async fn send_action(
        &self,
        round_id: RoundId,
        request: &ActionRequest,
    ) -> Result<Option<RoundSnapshot>> {
        let response = self
            .http_client
            .post(action_path(&self.base_url, round_id)?)
            .json(request)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                let body: ActionResponse = serde_json::from_slice(&bytes).map_err(|err| {
                    frontback_types::Error::MalformedSnapshot(err.to_string())
                })?;
                if !body.success {
                    return Err(Error::ActionRejected(body.message));
                }
                if let Some(round) = &body.round {
                    round.validate()?;
                }
                Ok(body.round)
            }
            StatusCode::BAD_REQUEST => {
                let detail = response
                    .json::<ErrorBody>()
                    .await
                    .map(|body| body.detail)
                    .unwrap_or_default();
                Err(Error::ActionRejected(detail))
            }
            _ => Err(failed_with_body(response).await),
        }
    }

    pub async fn start_round(&self, match_id: MatchId) -> Result<RoundSnapshot> {
        let response = self
            .http_client
            .post(start_round_path(&self.base_url, match_id)?)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK | StatusCode::CREATED => {
                let bytes = response.bytes().await?;
                Ok(RoundSnapshot::from_json(&bytes)?)
            }
            _ => Err(failed_with_body(response).await),
        }
    }

    /// Obtain the round that follows round number `after_round_no`.
    ///
    /// Both players request the next round, so this may race the opponent: a
    /// current round with a higher number is reused, and a rejected start is
    /// treated as "already exists" and answered with the current round.
    pub async fn next_round(&self, match_id: MatchId, after_round_no: u32) -> Result<RoundSnapshot> {
        if let Some(current) = self.current_round_with_retry(match_id).await? {
            if current.round_no > after_round_no {
                debug!(match_id, round_id = current.id, "next round already started");
                return Ok(current);
            }
        }
        match self.start_round(match_id).await {
            Ok(round) => Ok(round),
            Err(err) if !err.is_transport() => {
                debug!(match_id, %err, "start rejected, fetching current round");
                match self.current_round_with_retry(match_id).await? {
                    Some(current) if current.round_no > after_round_no => Ok(current),
                    _ => Err(err),
                }
            }
            Err(err) => Err(err),
        }
    }

    pub async fn match_by_id(&self, match_id: MatchId) -> Result<MatchSnapshot> {
        let response = self
            .http_client
            .get(match_path(&self.base_url, match_id)?)
            .send()
            .await?;
        match response.status() {
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                Ok(MatchSnapshot::from_json(&bytes)?)
            }
            _ => Err(failed_with_body(response).await),
        }
    }

    /// Match currently hosted in a room, or `None` if the room has not started one.
    pub async fn match_by_room(&self, room_id: RoomId) -> Result<Option<MatchSnapshot>> {
        let response = self
            .http_client
            .get(match_by_room_path(&self.base_url, room_id)?)
            .send()
            .await?;
        match response.status() {
            StatusCode::NOT_FOUND => Ok(None),
            StatusCode::OK => {
                let bytes = response.bytes().await?;
                Ok(Some(MatchSnapshot::from_json(&bytes)?))
            }
            _ => Err(failed_with_body(response).await),
        }
    }

    /// Poll a room every `interval` until it hosts a match, giving up after `attempts`.
    pub async fn wait_for_match(
        &self,
        room_id: RoomId,
        interval: Duration,
        attempts: u32,
    ) -> Result<MatchSnapshot> {
        for attempt in 0..attempts {
            match self.match_by_room(room_id).await {
                Ok(Some(snapshot)) => return Ok(snapshot),
                Ok(None) => debug!(room_id, attempt, "room has no match yet"),
                Err(err) if err.is_transport() => {
                    warn!(room_id, attempt, %err, "match lookup failed")
                }
                Err(err) => return Err(err),
            }
            tokio::time::sleep(interval).await;
        }
        Err(Error::NotReady("room has no match"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paths_join_under_base_prefix() {
        let client = Client::new("http://localhost:8000/game", Duration::from_secs(1)).unwrap();
        assert_eq!(
            current_round_path(&client.base_url, 4).unwrap().as_str(),
            "http://localhost:8000/game/api/rounds/match/4/current"
        );
        assert_eq!(
            select_side_path(&client.base_url, 9).unwrap().as_str(),
            "http://localhost:8000/game/api/rounds/9/select-side"
        );
        assert_eq!(
            match_by_room_path(&client.base_url, 2).unwrap().as_str(),
            "http://localhost:8000/game/api/matches/room/2"
        );
    }

    #[test]
    fn rejects_non_http_schemes() {
        assert!(matches!(
            Client::new("ws://localhost:8000", Duration::from_secs(1)),
            Err(Error::InvalidScheme(scheme)) if scheme == "ws"
        ));
        assert!(matches!(
            Client::new("not a url", Duration::from_secs(1)),
            Err(Error::Url(_))
        ));
    }
}

// League-draw service client.
//
// `DrawApi` is the seam the sequencer and pollers are written against;
// `HttpDrawApi` implements it over reqwest with an explicitly passed bearer
// credential.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::DATE;
use reqwest::{Method, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use tokio::time::Instant;
use tracing::{debug, warn};

use livedraw_core::clock::ServerClock;
use livedraw_core::config::Credentials;
use livedraw_core::model::{
    Assignment, CreatorId, DrawResults, LeagueId, LiveDrawData, LiveReaction, PerformDraw,
    StartOutcome,
};

use crate::error::ApiError;

// ---------------------------------------------------------------------------
// DrawApi
// ---------------------------------------------------------------------------

/// A live-draw-data response together with the clock reading taken when it
/// arrived.
#[derive(Debug, Clone)]
pub struct LiveDrawSnapshot {
    pub data: LiveDrawData,
    pub clock: ServerClock,
}

/// Operations of the league-draw service used by the live draw.
#[async_trait]
pub trait DrawApi: Send + Sync {
    async fn live_draw_data(&self, league: LeagueId) -> Result<LiveDrawSnapshot, ApiError>;

    /// Start the draw. Idempotent on the server: a second call reports
    /// [`StartOutcome::AlreadyInProgress`].
    async fn start_draw(&self, league: LeagueId) -> Result<StartOutcome, ApiError>;

    /// Assign the next creator, or report that none are left.
    async fn perform_draw(&self, league: LeagueId) -> Result<PerformDraw, ApiError>;

    async fn draw_results(&self, league: LeagueId) -> Result<DrawResults, ApiError>;

    /// Manual override: place one creator directly.
    async fn assign_division(
        &self,
        league: LeagueId,
        creator: CreatorId,
    ) -> Result<Assignment, ApiError>;

    async fn live_reactions(&self, league: LeagueId) -> Result<Vec<LiveReaction>, ApiError>;

    async fn add_live_reaction(&self, league: LeagueId, message: &str) -> Result<(), ApiError>;

    async fn clear_live_reactions(&self, league: LeagueId) -> Result<(), ApiError>;
}

// ---------------------------------------------------------------------------
// HttpDrawApi
// ---------------------------------------------------------------------------

pub struct HttpDrawApi {
    http: reqwest::Client,
    base_url: String,
    credentials: Credentials,
}

/// Body and `Date` header of a successful response.
struct Reply {
    date: Option<String>,
    body: Vec<u8>,
}

#[derive(Deserialize)]
struct StartDrawBody {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

impl HttpDrawApi {
    pub fn new(base_url: impl Into<String>, credentials: Credentials) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            http: reqwest::Client::new(),
            base_url,
            credentials,
        }
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}{}", self.base_url, path);
        let req = self.http.request(method, url);
        match self.credentials.token() {
            Some(token) => req.bearer_auth(token),
            None => req,
        }
    }

    async fn send(&self, endpoint: &str, req: RequestBuilder) -> Result<Reply, ApiError> {
        let res = req.send().await.map_err(|e| ApiError::Transport {
            endpoint: endpoint.to_string(),
            source: e,
        })?;
        let status = res.status();
        let date = res
            .headers()
            .get(DATE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = res
            .bytes()
            .await
            .map_err(|e| ApiError::Transport {
                endpoint: endpoint.to_string(),
                source: e,
            })?
            .to_vec();

        debug!(endpoint, status = status.as_u16(), bytes = body.len(), "draw api response");

        if status == StatusCode::UNAUTHORIZED {
            return Err(ApiError::Unauthorized {
                endpoint: endpoint.to_string(),
            });
        }
        if !status.is_success() {
            let message = extract_error_message(&body);
            warn!(endpoint, status = status.as_u16(), ?message, "draw api call failed");
            return Err(ApiError::Status {
                endpoint: endpoint.to_string(),
                status: status.as_u16(),
                message,
            });
        }
        Ok(Reply { date, body })
    }

    async fn get<T: DeserializeOwned>(&self, endpoint: &str, path: &str) -> Result<T, ApiError> {
        let reply = self.send(endpoint, self.request(Method::GET, path)).await?;
        decode(endpoint, &reply.body)
    }

    async fn post<T: DeserializeOwned>(
        &self,
        endpoint: &str,
        path: &str,
        body: &Value,
    ) -> Result<T, ApiError> {
        let reply = self
            .send(endpoint, self.request(Method::POST, path).json(body))
            .await?;
        decode(endpoint, &reply.body)
    }
}

#[async_trait]
impl DrawApi for HttpDrawApi {
    async fn live_draw_data(&self, league: LeagueId) -> Result<LiveDrawSnapshot, ApiError> {
        let endpoint = "live-draw-data";
        let reply = self
            .send(
                endpoint,
                self.request(Method::GET, &format!("/live-draw-data/{league}/")),
            )
            .await?;
        let clock = ServerClock::from_date_header(reply.date.as_deref(), Utc::now(), Instant::now());
        let data = decode(endpoint, &reply.body)?;
        Ok(LiveDrawSnapshot { data, clock })
    }

    async fn start_draw(&self, league: LeagueId) -> Result<StartOutcome, ApiError> {
        let endpoint = "start-draw";
        let body: StartDrawBody = self
            .post(
                endpoint,
                &format!("/leagues/{league}/start-draw/"),
                &serde_json::json!({}),
            )
            .await?;
        if let Some(outcome) = body.message.as_deref().and_then(StartOutcome::from_message) {
            return Ok(outcome);
        }
        let message = body
            .error
            .or(body.message)
            .unwrap_or_else(|| "An unexpected error occurred.".to_string());
        Err(ApiError::Rejected {
            endpoint: endpoint.to_string(),
            message,
        })
    }

    async fn perform_draw(&self, league: LeagueId) -> Result<PerformDraw, ApiError> {
        self.post(
            "perform-draw",
            &format!("/leagues/{league}/perform-draw/"),
            &serde_json::json!({}),
        )
        .await
    }

    async fn draw_results(&self, league: LeagueId) -> Result<DrawResults, ApiError> {
        self.get("draw-results", &format!("/leagues/{league}/draw-results/"))
            .await
    }

    async fn assign_division(
        &self,
        league: LeagueId,
        creator: CreatorId,
    ) -> Result<Assignment, ApiError> {
        self.post(
            "assign-division",
            &format!("/leagues/{league}/assign-division/"),
            &serde_json::json!({ "creator_id": creator }),
        )
        .await
    }

    async fn live_reactions(&self, league: LeagueId) -> Result<Vec<LiveReaction>, ApiError> {
        self.get("live-reactions", &format!("/leagues/{league}/live-reactions/"))
            .await
    }

    async fn add_live_reaction(&self, league: LeagueId, message: &str) -> Result<(), ApiError> {
        let _: Value = self
            .post(
                "live-reactions/add",
                &format!("/leagues/{league}/live-reactions/add/"),
                &serde_json::json!({ "message": message }),
            )
            .await?;
        Ok(())
    }

    async fn clear_live_reactions(&self, league: LeagueId) -> Result<(), ApiError> {
        let _: Value = self
            .post(
                "live-reactions/clear",
                &format!("/leagues/{league}/live-reactions/clear/"),
                &serde_json::json!({}),
            )
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// JSON helpers
// ---------------------------------------------------------------------------

fn decode<T: DeserializeOwned>(endpoint: &str, body: &[u8]) -> Result<T, ApiError> {
    // Some endpoints answer 200/204 with an empty body.
    let body: &[u8] = if body.iter().all(u8::is_ascii_whitespace) {
        b"null"
    } else {
        body
    };
    serde_json::from_slice(body).map_err(|e| ApiError::Decode {
        endpoint: endpoint.to_string(),
        source: e,
    })
}

/// Pull the server's explanation out of an error body.
///
/// Looks at `error`, then `message`, then `detail` (the framework default).
pub(crate) fn extract_error_message(body: &[u8]) -> Option<String> {
    let v: Value = serde_json::from_slice(body).ok()?;
    ["error", "message", "detail"]
        .iter()
        .find_map(|key| v.get(key)?.as_str().map(str::to_string))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

// Background pollers: draw-results reconciliation and the live-reactions
// feed. Both only report events; the session loop decides what to keep.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, info, warn};

use livedraw_api::DrawApi;
use livedraw_core::model::LeagueId;
use livedraw_core::protocol::SessionEvent;
use livedraw_core::session::DrawStatus;

// ---------------------------------------------------------------------------
// DrawResultsPoller
// ---------------------------------------------------------------------------

/// Periodically fetches authoritative draw results so that observers (and
/// a driver whose own loop died) converge on the server's state.
///
/// Fetches only while the session status is in progress or completed, and
/// stops for good once the server reports the draw complete or refuses the
/// credential.
pub struct DrawResultsPoller<A> {
    api: Arc<A>,
    league: LeagueId,
    interval: Duration,
    status: watch::Receiver<DrawStatus>,
    events: mpsc::Sender<SessionEvent>,
}

impl<A: DrawApi> DrawResultsPoller<A> {
    pub fn new(
        api: Arc<A>,
        league: LeagueId,
        interval: Duration,
        status: watch::Receiver<DrawStatus>,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        DrawResultsPoller {
            api,
            league,
            interval,
            status,
            events,
        }
    }

    pub async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick completes immediately; polls start one interval in.
        ticker.tick().await;

        loop {
            ticker.tick().await;
            let status = *self.status.borrow();
            if !status.is_pollable() {
                continue;
            }
            match self.api.draw_results(self.league).await {
                Ok(results) => {
                    let complete = results.draw_complete;
                    debug!(count = results.results.len(), complete, "polled draw results");
                    if self.events.send(SessionEvent::Polled(results)).await.is_err() {
                        debug!("session closed, results poller stopping");
                        return;
                    }
                    if complete {
                        info!(league = self.league, "draw complete, results poller stopping");
                        return;
                    }
                }
                Err(e) if e.is_unauthorized() => {
                    warn!(league = self.league, "draw results poll rejected the credential");
                    let _ = self.events.send(SessionEvent::Unauthorized).await;
                    return;
                }
                Err(e) => warn!(league = self.league, "draw results poll failed: {e}"),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// ReactionFeed
// ---------------------------------------------------------------------------

/// Fetches the live-reactions feed right away and then on every interval
/// until the session goes away or the credential is refused.
pub struct ReactionFeed<A> {
    api: Arc<A>,
    league: LeagueId,
    interval: Duration,
    events: mpsc::Sender<SessionEvent>,
}

impl<A: DrawApi> ReactionFeed<A> {
    pub fn new(
        api: Arc<A>,
        league: LeagueId,
        interval: Duration,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        ReactionFeed {
            api,
            league,
            interval,
            events,
        }
    }

    pub async fn run(self) {
        let mut ticker = time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            ticker.tick().await;
            match self.api.live_reactions(self.league).await {
                Ok(reactions) => {
                    if self.events.send(SessionEvent::Reactions(reactions)).await.is_err() {
                        debug!("session closed, reaction feed stopping");
                        return;
                    }
                }
                Err(e) if e.is_unauthorized() => {
                    warn!(league = self.league, "reaction fetch rejected the credential");
                    let _ = self.events.send(SessionEvent::Unauthorized).await;
                    return;
                }
                Err(e) => warn!(league = self.league, "reaction fetch failed: {e}"),
            }
        }
    }
}

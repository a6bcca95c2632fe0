// Scripted in-memory `DrawApi` for tests.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use tokio::time::Instant;

use livedraw_core::clock::ServerClock;
use livedraw_core::model::{
    Assignment, CreatorId, DrawResults, LeagueId, LiveDrawData, LiveReaction, PerformDraw,
    StartOutcome,
};

use crate::client::{DrawApi, LiveDrawSnapshot};
use crate::error::ApiError;

/// Responses are popped from per-endpoint queues. Empty queues fall back to
/// a fixed answer: perform-draw reports completion, start-draw reports
/// `Started`, draw-results returns the default results.
pub struct ScriptedDrawApi {
    live_data: Mutex<LiveDrawData>,
    starts: Mutex<VecDeque<Result<StartOutcome, ApiError>>>,
    draws: Mutex<VecDeque<Result<PerformDraw, ApiError>>>,
    results: Mutex<VecDeque<Result<DrawResults, ApiError>>>,
    default_results: Mutex<DrawResults>,
    reactions: Mutex<Vec<LiveReaction>>,
    calls: Calls,
}

#[derive(Default)]
struct Calls {
    start_draw: AtomicUsize,
    perform_draw: AtomicUsize,
    draw_results: AtomicUsize,
    live_reactions: AtomicUsize,
    add_live_reaction: AtomicUsize,
    clear_live_reactions: AtomicUsize,
    perform_in_flight: AtomicUsize,
    perform_max_in_flight: AtomicUsize,
}

impl Calls {
    fn bump(counter: &AtomicUsize) {
        counter.fetch_add(1, Ordering::SeqCst);
    }

    fn get(counter: &AtomicUsize) -> usize {
        counter.load(Ordering::SeqCst)
    }
}

impl ScriptedDrawApi {
    pub fn new(live_data: LiveDrawData) -> Self {
        ScriptedDrawApi {
            live_data: Mutex::new(live_data),
            starts: Mutex::new(VecDeque::new()),
            draws: Mutex::new(VecDeque::new()),
            results: Mutex::new(VecDeque::new()),
            default_results: Mutex::new(DrawResults::default()),
            reactions: Mutex::new(Vec::new()),
            calls: Calls::default(),
        }
    }

    pub fn push_start(&self, outcome: Result<StartOutcome, ApiError>) {
        self.starts.lock().unwrap().push_back(outcome);
    }

    pub fn push_draw(&self, step: Result<PerformDraw, ApiError>) {
        self.draws.lock().unwrap().push_back(step);
    }

    pub fn push_results(&self, results: Result<DrawResults, ApiError>) {
        self.results.lock().unwrap().push_back(results);
    }

    /// Answer for draw-results once its queue is empty.
    pub fn set_default_results(&self, results: DrawResults) {
        *self.default_results.lock().unwrap() = results;
    }

    pub fn set_reactions(&self, reactions: Vec<LiveReaction>) {
        *self.reactions.lock().unwrap() = reactions;
    }

    pub fn start_calls(&self) -> usize {
        Calls::get(&self.calls.start_draw)
    }

    pub fn perform_calls(&self) -> usize {
        Calls::get(&self.calls.perform_draw)
    }

    pub fn results_calls(&self) -> usize {
        Calls::get(&self.calls.draw_results)
    }

    pub fn reaction_fetches(&self) -> usize {
        Calls::get(&self.calls.live_reactions)
    }

    pub fn reaction_posts(&self) -> usize {
        Calls::get(&self.calls.add_live_reaction)
    }

    pub fn reaction_clears(&self) -> usize {
        Calls::get(&self.calls.clear_live_reactions)
    }

    /// Highest number of perform-draw calls ever in flight at once.
    pub fn max_concurrent_draws(&self) -> usize {
        self.calls.perform_max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DrawApi for ScriptedDrawApi {
    async fn live_draw_data(&self, _league: LeagueId) -> Result<LiveDrawSnapshot, ApiError> {
        let data = self.live_data.lock().unwrap().clone();
        Ok(LiveDrawSnapshot {
            data,
            clock: ServerClock::local(Instant::now()),
        })
    }

    async fn start_draw(&self, _league: LeagueId) -> Result<StartOutcome, ApiError> {
        Calls::bump(&self.calls.start_draw);
        tokio::task::yield_now().await;
        self.starts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Ok(StartOutcome::Started))
    }

    async fn perform_draw(&self, _league: LeagueId) -> Result<PerformDraw, ApiError> {
        Calls::bump(&self.calls.perform_draw);
        let now = self.calls.perform_in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.calls
            .perform_max_in_flight
            .fetch_max(now, Ordering::SeqCst);
        // Give any competing caller a chance to overlap.
        tokio::task::yield_now().await;
        self.calls.perform_in_flight.fetch_sub(1, Ordering::SeqCst);
        self.draws
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok(PerformDraw::complete()))
    }

    async fn draw_results(&self, _league: LeagueId) -> Result<DrawResults, ApiError> {
        Calls::bump(&self.calls.draw_results);
        let scripted = self.results.lock().unwrap().pop_front();
        scripted.unwrap_or_else(|| Ok(self.default_results.lock().unwrap().clone()))
    }

    async fn assign_division(
        &self,
        _league: LeagueId,
        creator: CreatorId,
    ) -> Result<Assignment, ApiError> {
        let data = self.live_data.lock().unwrap().clone();
        let creator = data
            .users
            .into_iter()
            .find(|c| c.id == creator)
            .ok_or(ApiError::Status {
                endpoint: "assign-division".into(),
                status: 404,
                message: Some("Creator not found.".into()),
            })?;
        let division = data.divisions.into_iter().next().ok_or(ApiError::MissingField {
            endpoint: "assign-division".into(),
            field: "division",
        })?;
        Ok(Assignment {
            id: None,
            creator,
            division,
        })
    }

    async fn live_reactions(&self, _league: LeagueId) -> Result<Vec<LiveReaction>, ApiError> {
        Calls::bump(&self.calls.live_reactions);
        Ok(self.reactions.lock().unwrap().clone())
    }

    async fn add_live_reaction(&self, _league: LeagueId, message: &str) -> Result<(), ApiError> {
        Calls::bump(&self.calls.add_live_reaction);
        let mut reactions = self.reactions.lock().unwrap();
        let id = reactions.len() as u64 + 1;
        reactions.push(LiveReaction {
            id,
            user: "me".into(),
            message: message.to_string(),
            profile_picture: None,
        });
        Ok(())
    }

    async fn clear_live_reactions(&self, _league: LeagueId) -> Result<(), ApiError> {
        Calls::bump(&self.calls.clear_live_reactions);
        self.reactions.lock().unwrap().clear();
        Ok(())
    }
}

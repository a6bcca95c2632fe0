// Draw sequencer: drives the draw one creator at a time.
//
// Each step asks the server for the next assignment, then holds the
// `assigning` and `complete` phases for fixed display delays before moving
// on. Progress is reported as `SessionEvent`s; the sequencer itself keeps
// no session state beyond its single-flight guard.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use livedraw_api::{ApiError, DrawApi};
use livedraw_core::config::TimingConfig;
use livedraw_core::model::{DrawResult, LeagueId, PerformDraw};
use livedraw_core::protocol::{DrawPhase, SequencerEvent, SessionEvent};

// ---------------------------------------------------------------------------
// Supporting types
// ---------------------------------------------------------------------------

/// Display delays between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SequencerTiming {
    /// How long the `assigning` phase is held.
    pub assign_delay: Duration,
    /// How long the `complete` phase is held.
    pub complete_delay: Duration,
}

impl Default for SequencerTiming {
    fn default() -> Self {
        SequencerTiming {
            assign_delay: Duration::from_millis(2000),
            complete_delay: Duration::from_millis(1000),
        }
    }
}

impl From<&TimingConfig> for SequencerTiming {
    fn from(t: &TimingConfig) -> Self {
        SequencerTiming {
            assign_delay: t.assign_delay(),
            complete_delay: t.complete_delay(),
        }
    }
}

#[derive(Debug, Error)]
pub enum DrawError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The session stopped listening; the sequence was abandoned.
    #[error("draw session closed")]
    SessionClosed,
}

/// How a call to [`DrawSequencer::start`] or [`DrawSequencer::resume`] ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequenceOutcome {
    /// The server reported the draw complete.
    Finished,
    /// Another sequence was already running; nothing was done.
    AlreadyRunning,
    /// The session went away mid-sequence.
    Detached,
}

/// Releases the single-flight flag when the sequence ends or its task is
/// aborted.
struct RunGuard<'a>(&'a AtomicBool);

impl<'a> RunGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(flag))
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// DrawSequencer
// ---------------------------------------------------------------------------

pub struct DrawSequencer<A> {
    api: Arc<A>,
    league: LeagueId,
    timing: SequencerTiming,
    events: mpsc::Sender<SessionEvent>,
    running: AtomicBool,
}

impl<A: DrawApi> DrawSequencer<A> {
    pub fn new(
        api: Arc<A>,
        league: LeagueId,
        timing: SequencerTiming,
        events: mpsc::Sender<SessionEvent>,
    ) -> Self {
        DrawSequencer {
            api,
            league,
            timing,
            events,
            running: AtomicBool::new(false),
        }
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    /// Run the start-draw handshake, then draw until the server reports
    /// completion.
    ///
    /// Calls made while a sequence is already running return
    /// [`SequenceOutcome::AlreadyRunning`] without touching the server.
    pub async fn start(&self) -> Result<SequenceOutcome, DrawError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            debug!(league = self.league, "draw sequence already running, ignoring start");
            return Ok(SequenceOutcome::AlreadyRunning);
        };
        info!(league = self.league, "starting draw");
        let result = self.start_inner().await;
        self.conclude(result).await
    }

    /// Re-enter a draw already in progress (e.g. after a reload or an
    /// error): resync results first, then continue stepping only if the
    /// server says creators remain.
    pub async fn resume(&self) -> Result<SequenceOutcome, DrawError> {
        let Some(_guard) = RunGuard::acquire(&self.running) else {
            debug!(league = self.league, "draw sequence already running, ignoring resume");
            return Ok(SequenceOutcome::AlreadyRunning);
        };
        info!(league = self.league, "resuming draw");
        let result = self.resume_inner().await;
        self.conclude(result).await
    }

    async fn start_inner(&self) -> Result<SequenceOutcome, DrawError> {
        self.emit(SequencerEvent::Phase(DrawPhase::Starting)).await?;
        let outcome = self.api.start_draw(self.league).await?;
        self.emit(SequencerEvent::Started(outcome)).await?;
        self.run_steps().await
    }

    async fn resume_inner(&self) -> Result<SequenceOutcome, DrawError> {
        let results = self.api.draw_results(self.league).await?;
        let complete = results.draw_complete;
        debug!(count = results.results.len(), complete, "resynced draw results");
        self.emit(SequencerEvent::Resynced(results)).await?;
        if complete {
            self.emit(SequencerEvent::Phase(DrawPhase::Finished)).await?;
            return Ok(SequenceOutcome::Finished);
        }
        self.run_steps().await
    }

    async fn run_steps(&self) -> Result<SequenceOutcome, DrawError> {
        let mut steps = 0usize;
        while self.step().await? {
            steps += 1;
        }
        info!(league = self.league, steps, "draw finished");
        Ok(SequenceOutcome::Finished)
    }

    /// One draw step. Returns `false` once the server reports completion.
    async fn step(&self) -> Result<bool, DrawError> {
        self.emit(SequencerEvent::Phase(DrawPhase::Drawing)).await?;
        let step = self.api.perform_draw(self.league).await?;

        if step.draw_complete {
            self.emit(SequencerEvent::Phase(DrawPhase::Complete)).await?;
            let snapshot = self.api.live_draw_data(self.league).await?;
            self.emit(SequencerEvent::Finished(snapshot.data)).await?;
            self.emit(SequencerEvent::Phase(DrawPhase::Finished)).await?;
            return Ok(false);
        }

        let result = assignment(step)?;
        debug!(
            creator = %result.creator.username,
            division = %result.division.name,
            "creator drawn"
        );
        self.emit(SequencerEvent::Drawn {
            creator: result.creator.clone(),
            division: result.division.clone(),
            result,
        })
        .await?;

        self.emit(SequencerEvent::Phase(DrawPhase::Assigning)).await?;
        tokio::time::sleep(self.timing.assign_delay).await;
        self.emit(SequencerEvent::Phase(DrawPhase::Complete)).await?;
        tokio::time::sleep(self.timing.complete_delay).await;
        self.emit(SequencerEvent::Phase(DrawPhase::Idle)).await?;
        Ok(true)
    }

    /// Report a failed sequence to the session and pass the error on.
    async fn conclude(
        &self,
        result: Result<SequenceOutcome, DrawError>,
    ) -> Result<SequenceOutcome, DrawError> {
        match result {
            Ok(outcome) => Ok(outcome),
            Err(DrawError::SessionClosed) => {
                debug!(league = self.league, "draw session closed, sequence abandoned");
                Ok(SequenceOutcome::Detached)
            }
            Err(DrawError::Api(e)) => {
                warn!(league = self.league, "draw halted: {e}");
                let failed = SequencerEvent::Failed {
                    message: e.user_message(),
                    unauthorized: e.is_unauthorized(),
                };
                let _ = self.events.send(failed.into()).await;
                let _ = self
                    .events
                    .send(SequencerEvent::Phase(DrawPhase::Error).into())
                    .await;
                Err(DrawError::Api(e))
            }
        }
    }

    async fn emit(&self, event: SequencerEvent) -> Result<(), DrawError> {
        self.events
            .send(event.into())
            .await
            .map_err(|_| DrawError::SessionClosed)
    }
}

/// Extract the assignment from a non-final perform-draw response.
fn assignment(step: PerformDraw) -> Result<DrawResult, ApiError> {
    let missing = |field| ApiError::MissingField {
        endpoint: "perform-draw".into(),
        field,
    };
    let creator = step
        .creator
        .or_else(|| step.draw.as_ref().map(|d| d.creator.clone()))
        .ok_or_else(|| missing("creator"))?;
    let division = step
        .division
        .or_else(|| step.draw.as_ref().map(|d| d.division.clone()))
        .ok_or_else(|| missing("division"))?;
    let sequence_index = step.draw.map(|d| d.sequence_index).unwrap_or_default();
    Ok(DrawResult {
        creator,
        division,
        sequence_index,
    })
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

// Messages flowing between the session's producers (clock, sequencer,
// pollers), its reducer, and the front end.

use crate::model::{Creator, Division, DrawResult, DrawResults, LiveDrawData, LiveReaction, StartOutcome};
use crate::present::SessionView;

/// Animation phase of the draw sequencer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawPhase {
    Idle,
    Starting,
    Drawing,
    Assigning,
    Complete,
    Finished,
    Error,
}

/// Emitted by the countdown clock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClockEvent {
    /// Seconds left until the scheduled draw.
    Tick(u64),
    /// The countdown reached zero. Sent at most once per clock.
    Expired,
}

/// Emitted by the draw sequencer while it runs.
#[derive(Debug, Clone, PartialEq)]
pub enum SequencerEvent {
    Phase(DrawPhase),
    /// The start-draw handshake succeeded.
    Started(StartOutcome),
    /// One creator was assigned to a division.
    Drawn {
        creator: Creator,
        division: Division,
        result: DrawResult,
    },
    /// Authoritative results fetched while resuming.
    Resynced(DrawResults),
    /// The server reported the draw complete. Carries the refreshed
    /// live-draw snapshot.
    Finished(LiveDrawData),
    /// A step failed and the loop halted.
    Failed { message: String, unauthorized: bool },
}

/// Anything that changes the draw session.
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    Clock(ClockEvent),
    Sequencer(SequencerEvent),
    /// Reconciliation poll delivered authoritative results.
    Polled(DrawResults),
    /// Latest live-reactions feed.
    Reactions(Vec<LiveReaction>),
    /// A background fetch was refused with 401.
    Unauthorized,
}

impl From<ClockEvent> for SessionEvent {
    fn from(e: ClockEvent) -> Self {
        SessionEvent::Clock(e)
    }
}

impl From<SequencerEvent> for SessionEvent {
    fn from(e: SequencerEvent) -> Self {
        SessionEvent::Sequencer(e)
    }
}

/// Commands from the front end to the session loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserCommand {
    /// Re-enter the draw after an error.
    Retry,
    /// Post a message to the live-reactions feed.
    React(String),
    /// Empty the live-reactions feed.
    ClearReactions,
    Quit,
}

/// Updates pushed from the session loop to the front end.
#[derive(Debug, Clone, PartialEq)]
pub enum ViewUpdate {
    View(Box<SessionView>),
    /// The credential was rejected; the user must log in again.
    LoginRequired,
}

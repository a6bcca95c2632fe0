// Client-local draw session: the single owned state object that every
// producer's events are folded into.

use tracing::{debug, info, warn};

use crate::model::{Creator, Division, DrawResult, League, LeagueStatus, LiveDrawData, LiveReaction};
use crate::protocol::{ClockEvent, DrawPhase, SequencerEvent, SessionEvent};
use crate::store::DrawResultStore;

/// Newest reactions kept for display.
pub const MAX_REACTIONS: usize = 50;

/// The client's mirror of the draw status.
///
/// Only moves forward (`Pending` -> `InProgress` -> `Completed`). `Error` is
/// a client-local marker set when the sequencer halts; it can step back to
/// `InProgress` when the draw is re-entered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DrawStatus {
    Pending,
    InProgress,
    Completed,
    Error,
}

impl DrawStatus {
    pub fn from_league(status: LeagueStatus) -> Self {
        match status {
            LeagueStatus::Pending => DrawStatus::Pending,
            LeagueStatus::DrawInProgress => DrawStatus::InProgress,
            LeagueStatus::Active | LeagueStatus::Completed => DrawStatus::Completed,
        }
    }

    fn rank(self) -> u8 {
        match self {
            DrawStatus::Pending => 0,
            DrawStatus::InProgress | DrawStatus::Error => 1,
            DrawStatus::Completed => 2,
        }
    }

    /// Whether the reconciliation poller should be fetching results.
    pub fn is_pollable(self) -> bool {
        matches!(self, DrawStatus::InProgress | DrawStatus::Completed)
    }
}

/// The creator and division currently on the draw card.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CurrentDraw {
    pub creator: Creator,
    pub division: Division,
}

/// Ephemeral state of one live-draw view.
#[derive(Debug, Clone)]
pub struct DrawSession {
    pub league: League,
    pub divisions: Vec<Division>,
    pub status: DrawStatus,
    pub phase: DrawPhase,
    pub current_draw: Option<CurrentDraw>,
    /// Creators not yet drawn. Only ever shrinks.
    pub remaining: Vec<Creator>,
    pub results: DrawResultStore,
    pub draw_complete: bool,
    /// Seconds left on the countdown, once the clock has ticked.
    pub countdown: Option<u64>,
    /// Set once the countdown has fired.
    pub countdown_expired: bool,
    /// Whether this client ran the start-draw handshake at least once.
    pub started: bool,
    /// Whether the animated draw card is on screen.
    pub show_card: bool,
    pub error: Option<String>,
    pub login_required: bool,
    pub reactions: Vec<LiveReaction>,
}

impl DrawSession {
    pub fn new(data: LiveDrawData) -> Self {
        let status = DrawStatus::from_league(data.league.status);
        let countdown = (status == DrawStatus::Pending).then(|| data.seconds_until_draw());
        DrawSession {
            league: data.league,
            divisions: data.divisions,
            status,
            phase: DrawPhase::Idle,
            current_draw: None,
            remaining: data.users,
            results: DrawResultStore::new(),
            draw_complete: status == DrawStatus::Completed,
            countdown,
            countdown_expired: false,
            started: false,
            show_card: false,
            error: None,
            login_required: false,
            reactions: Vec::new(),
        }
    }

    /// Move the status forward. Backward transitions are ignored, except
    /// that `Error` may return to `InProgress`.
    pub fn advance_status(&mut self, next: DrawStatus) -> bool {
        let allowed = match (self.status, next) {
            (a, b) if a == b => false,
            (_, DrawStatus::Error) => self.status != DrawStatus::Completed,
            (DrawStatus::Error, DrawStatus::InProgress) => true,
            (a, b) => b.rank() > a.rank(),
        };
        if allowed {
            debug!(from = ?self.status, to = ?next, "draw status change");
            self.status = next;
        }
        allowed
    }

    /// Fold one event into the session.
    pub fn apply(&mut self, event: SessionEvent) {
        match event {
            SessionEvent::Clock(ClockEvent::Tick(remaining)) => {
                self.countdown = Some(remaining);
            }
            SessionEvent::Clock(ClockEvent::Expired) => {
                self.countdown = Some(0);
                self.countdown_expired = true;
            }
            SessionEvent::Sequencer(event) => self.apply_sequencer(event),
            SessionEvent::Polled(results) => {
                if !results.results.is_empty() {
                    self.advance_status(DrawStatus::InProgress);
                }
                let added = self.merge_results(results.results);
                if added > 0 {
                    debug!(added, "reconciliation poll added results");
                }
                if self.status != DrawStatus::Error {
                    self.error = None;
                }
                if results.draw_complete {
                    self.mark_complete();
                }
            }
            SessionEvent::Unauthorized => {
                warn!("background fetch rejected the credential");
                self.login_required = true;
            }
            SessionEvent::Reactions(mut reactions) => {
                if reactions.len() > MAX_REACTIONS {
                    reactions.drain(..reactions.len() - MAX_REACTIONS);
                }
                self.reactions = reactions;
            }
        }
    }

    fn apply_sequencer(&mut self, event: SequencerEvent) {
        match event {
            SequencerEvent::Phase(phase) => {
                self.phase = phase;
                if phase == DrawPhase::Idle {
                    self.current_draw = None;
                }
            }
            SequencerEvent::Started(outcome) => {
                info!(?outcome, "draw start acknowledged");
                self.started = true;
                self.show_card = true;
                self.error = None;
                self.advance_status(DrawStatus::InProgress);
            }
            SequencerEvent::Drawn {
                creator,
                division,
                result,
            } => {
                self.error = None;
                self.advance_status(DrawStatus::InProgress);
                self.remaining.retain(|c| c.id != creator.id);
                self.results.append(result);
                self.current_draw = Some(CurrentDraw { creator, division });
            }
            SequencerEvent::Resynced(results) => {
                self.error = None;
                self.advance_status(DrawStatus::InProgress);
                self.merge_results(results.results);
                if results.draw_complete {
                    self.mark_complete();
                }
            }
            SequencerEvent::Finished(data) => {
                self.refresh(data);
                self.show_card = false;
                self.current_draw = None;
                self.mark_complete();
            }
            SequencerEvent::Failed {
                message,
                unauthorized,
            } => {
                warn!("draw halted: {message}");
                self.advance_status(DrawStatus::Error);
                self.current_draw = None;
                self.login_required |= unauthorized;
                self.error = Some(message);
            }
        }
    }

    fn merge_results(&mut self, results: Vec<DrawResult>) -> usize {
        for r in &results {
            self.remaining.retain(|c| c.id != r.creator.id);
        }
        self.results.replace_all(results)
    }

    /// Take league metadata from a fresh snapshot. Creators the server no
    /// longer lists are dropped from `remaining`; none are added back.
    fn refresh(&mut self, data: LiveDrawData) {
        self.remaining
            .retain(|c| data.users.iter().any(|u| u.id == c.id));
        self.league = data.league;
        if !data.divisions.is_empty() {
            self.divisions = data.divisions;
        }
    }

    fn mark_complete(&mut self) {
        self.draw_complete = true;
        self.error = None;
        self.advance_status(DrawStatus::Completed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{DrawResults, StartOutcome};

    fn creator(id: u64, name: &str) -> Creator {
        Creator {
            id,
            username: name.into(),
            profile_picture: None,
        }
    }

    fn division(id: u64, name: &str) -> Division {
        Division {
            id,
            name: name.into(),
            capacity: 2,
        }
    }

    fn result(c: &Creator, d: &Division, seq: u32) -> DrawResult {
        DrawResult {
            creator: c.clone(),
            division: d.clone(),
            sequence_index: seq,
        }
    }

    fn pending_session() -> DrawSession {
        DrawSession::new(LiveDrawData {
            league: League {
                id: 1,
                name: "Spring League".into(),
                status: LeagueStatus::Pending,
                draw_start_time: None,
                capacity: Some(4),
            },
            users: vec![creator(1, "alice"), creator(2, "bob"), creator(3, "cara")],
            divisions: vec![division(10, "Div A"), division(20, "Div B")],
            time_to_draw: 30,
        })
    }

    #[test]
    fn new_session_mirrors_league_status() {
        let session = pending_session();
        assert_eq!(session.status, DrawStatus::Pending);
        assert_eq!(session.countdown, Some(30));
        assert_eq!(session.remaining.len(), 3);
        assert!(!session.draw_complete);
    }

    #[test]
    fn status_never_moves_backwards() {
        let mut session = pending_session();
        assert!(session.advance_status(DrawStatus::InProgress));
        assert!(!session.advance_status(DrawStatus::Pending));
        assert!(session.advance_status(DrawStatus::Error));
        assert!(session.advance_status(DrawStatus::InProgress));
        assert!(session.advance_status(DrawStatus::Completed));
        assert!(!session.advance_status(DrawStatus::Error));
        assert!(!session.advance_status(DrawStatus::InProgress));
        assert_eq!(session.status, DrawStatus::Completed);
    }

    #[test]
    fn drawn_event_records_result_and_shrinks_remaining() {
        let mut session = pending_session();
        let alice = creator(1, "alice");
        let div_a = division(10, "Div A");
        session.apply(SequencerEvent::Started(StartOutcome::Started).into());
        session.apply(
            SequencerEvent::Drawn {
                creator: alice.clone(),
                division: div_a.clone(),
                result: result(&alice, &div_a, 1),
            }
            .into(),
        );
        session.apply(SequencerEvent::Phase(DrawPhase::Assigning).into());

        assert_eq!(session.status, DrawStatus::InProgress);
        assert!(session.show_card);
        assert_eq!(session.results.len(), 1);
        assert_eq!(session.remaining.len(), 2);
        assert_eq!(
            session.current_draw.as_ref().map(|d| d.creator.username.as_str()),
            Some("alice")
        );

        session.apply(SequencerEvent::Phase(DrawPhase::Idle).into());
        assert!(session.current_draw.is_none());
    }

    #[test]
    fn poll_and_sequencer_merge_without_duplicates() {
        let mut session = pending_session();
        let alice = creator(1, "alice");
        let bob = creator(2, "bob");
        let div_a = division(10, "Div A");
        session.advance_status(DrawStatus::InProgress);

        session.apply(SessionEvent::Polled(DrawResults {
            results: vec![result(&alice, &div_a, 1)],
            draw_complete: false,
        }));
        session.apply(
            SequencerEvent::Drawn {
                creator: alice.clone(),
                division: div_a.clone(),
                result: result(&alice, &div_a, 1),
            }
            .into(),
        );
        session.apply(SessionEvent::Polled(DrawResults {
            results: vec![result(&alice, &div_a, 1), result(&bob, &div_a, 2)],
            draw_complete: false,
        }));

        let ids: Vec<u64> = session.results.iter().map(|r| r.creator.id).collect();
        assert_eq!(ids, vec![1, 2]);
        assert_eq!(session.remaining.len(), 1);
    }

    #[test]
    fn successful_poll_clears_a_stale_load_error() {
        let mut session = pending_session();
        session.advance_status(DrawStatus::InProgress);
        session.error = Some("Failed to complete the draw. Please try again.".into());

        session.apply(SessionEvent::Polled(DrawResults::default()));
        assert!(session.error.is_none());
        assert_eq!(session.status, DrawStatus::InProgress);
    }

    #[test]
    fn poll_keeps_the_sequencer_error_banner() {
        let mut session = pending_session();
        session.apply(
            SequencerEvent::Failed {
                message: "Draw not started.".into(),
                unauthorized: false,
            }
            .into(),
        );

        session.apply(SessionEvent::Polled(DrawResults::default()));
        assert_eq!(session.error.as_deref(), Some("Draw not started."));
        assert_eq!(session.status, DrawStatus::Error);
    }

    #[test]
    fn unauthorized_fetch_requires_login() {
        let mut session = pending_session();
        session.apply(SessionEvent::Unauthorized);
        assert!(session.login_required);
    }

    #[test]
    fn polled_results_mark_a_pending_draw_in_progress() {
        let mut session = pending_session();
        session.apply(SessionEvent::Polled(DrawResults::default()));
        assert_eq!(session.status, DrawStatus::Pending);

        let alice = creator(1, "alice");
        session.apply(SessionEvent::Polled(DrawResults {
            results: vec![result(&alice, &division(10, "Div A"), 1)],
            draw_complete: false,
        }));
        assert_eq!(session.status, DrawStatus::InProgress);
    }

    #[test]
    fn failure_sets_error_and_retry_recovers() {
        let mut session = pending_session();
        session.advance_status(DrawStatus::InProgress);
        session.apply(
            SequencerEvent::Failed {
                message: "Failed to complete the draw. Please try again.".into(),
                unauthorized: false,
            }
            .into(),
        );
        assert_eq!(session.status, DrawStatus::Error);
        assert!(session.error.is_some());
        assert!(!session.login_required);

        session.apply(SequencerEvent::Resynced(DrawResults::default()).into());
        assert_eq!(session.status, DrawStatus::InProgress);
        assert!(session.error.is_none());
    }

    #[test]
    fn finished_refresh_never_adds_creators_back() {
        let mut session = pending_session();
        session.advance_status(DrawStatus::InProgress);
        session.remaining.retain(|c| c.id != 1);

        let mut data = LiveDrawData {
            league: session.league.clone(),
            users: vec![creator(1, "alice"), creator(3, "cara")],
            divisions: Vec::new(),
            time_to_draw: 0,
        };
        data.league.status = LeagueStatus::Completed;
        session.apply(SequencerEvent::Finished(data).into());

        let ids: Vec<u64> = session.remaining.iter().map(|c| c.id).collect();
        assert_eq!(ids, vec![3]);
        assert_eq!(session.divisions.len(), 2);
        assert_eq!(session.status, DrawStatus::Completed);
        assert!(session.draw_complete);
        assert!(!session.show_card);
    }

    #[test]
    fn clock_events_update_countdown() {
        let mut session = pending_session();
        session.apply(ClockEvent::Tick(12).into());
        assert_eq!(session.countdown, Some(12));
        session.apply(ClockEvent::Expired.into());
        assert_eq!(session.countdown, Some(0));
        assert!(session.countdown_expired);
    }

    #[test]
    fn reactions_are_capped() {
        let mut session = pending_session();
        let reactions: Vec<LiveReaction> = (0..(MAX_REACTIONS as u64 + 5))
            .map(|i| LiveReaction {
                id: i,
                user: "fan".into(),
                message: format!("msg {i}"),
                profile_picture: None,
            })
            .collect();
        session.apply(SessionEvent::Reactions(reactions));
        assert_eq!(session.reactions.len(), MAX_REACTIONS);
        assert_eq!(session.reactions[0].id, 5);
    }
}

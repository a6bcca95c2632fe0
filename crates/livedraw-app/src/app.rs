// Live draw session orchestration.
//
// One task owns the `DrawSession`. The clock, the sequencer and the two
// pollers run as separate tasks and report through a single event channel;
// the loop here folds each event into the session and pushes a fresh view
// to the front end.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use livedraw_api::DrawApi;
use livedraw_core::clock::{DrawClock, ServerClock};
use livedraw_core::config::{Config, DrawRole, TimingConfig};
use livedraw_core::model::{LeagueId, LiveDrawData};
use livedraw_core::present::SessionView;
use livedraw_core::protocol::{ClockEvent, SessionEvent, UserCommand, ViewUpdate};
use livedraw_core::session::{DrawSession, DrawStatus};

use crate::poller::{DrawResultsPoller, ReactionFeed};
use crate::sequencer::{DrawSequencer, SequencerTiming};

/// Capacity of the internal producer -> session channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

// ---------------------------------------------------------------------------
// Settings
// ---------------------------------------------------------------------------

/// The parts of [`Config`] a session needs.
#[derive(Debug, Clone)]
pub struct SessionSettings {
    pub league: LeagueId,
    pub role: DrawRole,
    /// Run the live-reactions feed.
    pub reactions: bool,
    pub timing: TimingConfig,
}

impl SessionSettings {
    pub fn from_config(config: &Config) -> Self {
        SessionSettings {
            league: config.draw.league_id,
            role: config.draw.role,
            reactions: config.draw.reactions,
            timing: config.timing.clone(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SequencerMode {
    Start,
    Resume,
}

#[derive(Default)]
struct Tasks {
    clock: Option<JoinHandle<()>>,
    results_poller: Option<JoinHandle<()>>,
    reaction_feed: Option<JoinHandle<()>>,
    sequencer: Option<JoinHandle<()>>,
}

impl Tasks {
    fn sequencer_active(&self) -> bool {
        self.sequencer.as_ref().is_some_and(|h| !h.is_finished())
    }

    fn abort_all(&mut self) {
        let handles = [
            self.clock.take(),
            self.results_poller.take(),
            self.reaction_feed.take(),
            self.sequencer.take(),
        ];
        for handle in handles.into_iter().flatten() {
            handle.abort();
        }
    }
}

// ---------------------------------------------------------------------------
// AppState
// ---------------------------------------------------------------------------

/// Everything the session loop owns.
pub struct AppState<A> {
    pub session: DrawSession,
    api: Arc<A>,
    settings: SessionSettings,
    sequencer: Arc<DrawSequencer<A>>,
    events_tx: mpsc::Sender<SessionEvent>,
    /// Tells the results poller whether it should be fetching.
    poll_gate: watch::Sender<DrawStatus>,
    /// The draw was already running when the session mounted.
    resumed: bool,
    /// The countdown has already triggered a start.
    start_requested: bool,
    tasks: Tasks,
}

impl<A: DrawApi + 'static> AppState<A> {
    pub fn new(
        api: Arc<A>,
        settings: SessionSettings,
        data: LiveDrawData,
        events_tx: mpsc::Sender<SessionEvent>,
    ) -> Self {
        let session = DrawSession::new(data);
        let sequencer = Arc::new(DrawSequencer::new(
            Arc::clone(&api),
            settings.league,
            SequencerTiming::from(&settings.timing),
            events_tx.clone(),
        ));
        let (poll_gate, _) = watch::channel(session.status);
        AppState {
            session,
            api,
            settings,
            sequencer,
            events_tx,
            poll_gate,
            resumed: false,
            start_requested: false,
            tasks: Tasks::default(),
        }
    }

    /// Bring the session up according to the league's status at load
    /// time, then start the background pollers.
    pub async fn mount(&mut self, clock: &ServerClock) {
        info!(
            league = self.settings.league,
            status = ?self.session.status,
            role = ?self.settings.role,
            "mounting live draw session"
        );
        match self.session.status {
            DrawStatus::Pending => {
                let seconds = self.session.countdown.unwrap_or(0);
                let draw_clock =
                    DrawClock::new(seconds, clock).with_tick(self.settings.timing.clock_tick());
                self.tasks.clock = Some(tokio::spawn(draw_clock.run(self.events_tx.clone())));
            }
            DrawStatus::InProgress if self.settings.role == DrawRole::Driver => {
                self.resumed = true;
                self.spawn_sequencer(SequencerMode::Resume);
            }
            DrawStatus::InProgress | DrawStatus::Completed => self.load_results().await,
            DrawStatus::Error => {}
        }
        self.publish_poll_gate();
        self.spawn_pollers();
    }

    async fn load_results(&mut self) {
        match self.api.draw_results(self.settings.league).await {
            Ok(results) => self.session.apply(SessionEvent::Polled(results)),
            Err(e) => {
                warn!("failed to load draw results: {e}");
                self.session.login_required |= e.is_unauthorized();
                self.session.error = Some(e.user_message());
            }
        }
    }

    fn spawn_pollers(&mut self) {
        let poller = DrawResultsPoller::new(
            Arc::clone(&self.api),
            self.settings.league,
            self.settings.timing.poll_interval(),
            self.poll_gate.subscribe(),
            self.events_tx.clone(),
        );
        self.tasks.results_poller = Some(tokio::spawn(poller.run()));

        if self.settings.reactions {
            let feed = ReactionFeed::new(
                Arc::clone(&self.api),
                self.settings.league,
                self.settings.timing.reactions_interval(),
                self.events_tx.clone(),
            );
            self.tasks.reaction_feed = Some(tokio::spawn(feed.run()));
        }
    }

    /// Fold one producer event into the session.
    pub fn handle_event(&mut self, event: SessionEvent) {
        let expired = matches!(event, SessionEvent::Clock(ClockEvent::Expired));
        self.session.apply(event);
        self.publish_poll_gate();
        if expired {
            self.on_countdown_expired();
        }
    }

    fn on_countdown_expired(&mut self) {
        if self.settings.role == DrawRole::Observer {
            info!("countdown expired, waiting for the draw to begin");
            return;
        }
        if self.start_requested || self.session.status != DrawStatus::Pending {
            debug!(status = ?self.session.status, "countdown expiry ignored");
            return;
        }
        self.start_requested = true;
        self.spawn_sequencer(SequencerMode::Start);
    }

    /// Once the countdown has run out, a pending session polls as if the
    /// draw were running so observers notice it start.
    fn publish_poll_gate(&self) {
        let gate = match self.session.status {
            DrawStatus::Pending if self.session.countdown_expired => DrawStatus::InProgress,
            status => status,
        };
        self.poll_gate.send_replace(gate);
    }

    fn spawn_sequencer(&mut self, mode: SequencerMode) {
        if self.tasks.sequencer_active() {
            debug!(?mode, "draw sequence already active");
            return;
        }
        let sequencer = Arc::clone(&self.sequencer);
        self.tasks.sequencer = Some(tokio::spawn(async move {
            let result = match mode {
                SequencerMode::Start => sequencer.start().await,
                SequencerMode::Resume => sequencer.resume().await,
            };
            match result {
                Ok(outcome) => debug!(?outcome, "draw sequence ended"),
                Err(e) => debug!("draw sequence ended with error: {e}"),
            }
        }));
    }

    pub async fn handle_command(&mut self, cmd: UserCommand) {
        match cmd {
            UserCommand::Retry => self.retry(),
            UserCommand::React(message) => self.react(message.trim()).await,
            UserCommand::ClearReactions => self.clear_reactions().await,
            UserCommand::Quit => {
                // Handled in the main loop
            }
        }
    }

    fn retry(&mut self) {
        if self.settings.role == DrawRole::Observer {
            info!("retry ignored: observers never drive the draw");
            return;
        }
        if self.session.status != DrawStatus::Error {
            debug!(status = ?self.session.status, "nothing to retry");
            return;
        }
        let mode = if self.session.started || self.resumed {
            SequencerMode::Resume
        } else {
            SequencerMode::Start
        };
        info!(?mode, "retrying draw");
        self.spawn_sequencer(mode);
    }

    async fn react(&mut self, message: &str) {
        if message.is_empty() {
            return;
        }
        let league = self.settings.league;
        if let Err(e) = self.api.add_live_reaction(league, message).await {
            warn!("failed to post reaction: {e}");
            self.session.login_required |= e.is_unauthorized();
            return;
        }
        match self.api.live_reactions(league).await {
            Ok(reactions) => self.session.apply(SessionEvent::Reactions(reactions)),
            Err(e) => warn!("failed to refresh reactions: {e}"),
        }
    }

    async fn clear_reactions(&mut self) {
        match self.api.clear_live_reactions(self.settings.league).await {
            Ok(()) => {
                info!("live reactions cleared");
                self.session.apply(SessionEvent::Reactions(Vec::new()));
            }
            Err(e) => {
                warn!("failed to clear reactions: {e}");
                self.session.login_required |= e.is_unauthorized();
            }
        }
    }

    /// Abort every task the session spawned.
    pub fn shutdown(&mut self) {
        self.tasks.abort_all();
    }
}

impl<A> Drop for AppState<A> {
    fn drop(&mut self) {
        self.tasks.abort_all();
    }
}

// ---------------------------------------------------------------------------
// Main event loop
// ---------------------------------------------------------------------------

/// Run one live draw session until the user quits, the front end goes away,
/// or the credential is rejected.
///
/// Loads the live-draw snapshot, mounts the session, then listens on the
/// producer channel and `cmd_rx` with `tokio::select!`, pushing a
/// [`ViewUpdate`] through `ui_tx` after every change.
pub async fn run<A: DrawApi + 'static>(
    api: Arc<A>,
    settings: SessionSettings,
    mut cmd_rx: mpsc::Receiver<UserCommand>,
    ui_tx: mpsc::Sender<ViewUpdate>,
) -> anyhow::Result<()> {
    info!(league = settings.league, "live draw session starting");

    let snapshot = match api.live_draw_data(settings.league).await {
        Ok(snapshot) => snapshot,
        Err(e) if e.is_unauthorized() => {
            warn!("live draw data rejected the credential");
            let _ = ui_tx.send(ViewUpdate::LoginRequired).await;
            return Ok(());
        }
        Err(e) => {
            return Err(e).context(format!(
                "failed to load live draw data for league {}",
                settings.league
            ))
        }
    };

    let (events_tx, mut events_rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
    let mut state = AppState::new(api, settings, snapshot.data, events_tx);
    state.mount(&snapshot.clock).await;

    if publish(&state, &ui_tx).await {
        loop {
            tokio::select! {
                Some(event) = events_rx.recv() => {
                    state.handle_event(event);
                    if !publish(&state, &ui_tx).await {
                        break;
                    }
                }

                cmd = cmd_rx.recv() => {
                    match cmd {
                        Some(UserCommand::Quit) => {
                            info!("Quit command received, shutting down");
                            break;
                        }
                        Some(cmd) => {
                            state.handle_command(cmd).await;
                            if !publish(&state, &ui_tx).await {
                                break;
                            }
                        }
                        None => {
                            info!("Command channel closed, shutting down");
                            break;
                        }
                    }
                }
            }
        }
    }

    state.shutdown();
    info!("live draw session exiting");
    Ok(())
}

/// Push the current view. Returns `false` when the loop should stop.
async fn publish<A>(state: &AppState<A>, ui_tx: &mpsc::Sender<ViewUpdate>) -> bool {
    if state.session.login_required {
        warn!("credential rejected, ending session");
        let _ = ui_tx.send(ViewUpdate::LoginRequired).await;
        return false;
    }
    let view = SessionView::from_session(&state.session);
    if ui_tx.send(ViewUpdate::View(Box::new(view))).await.is_err() {
        info!("front end closed, shutting down");
        return false;
    }
    true
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use livedraw_api::mock::ScriptedDrawApi;
    use livedraw_core::model::{Creator, Division, DrawResult, DrawResults, League, LeagueStatus};
    use std::time::Duration;
    use tokio::time::Instant;

    fn data(status: LeagueStatus, time_to_draw: i64) -> LiveDrawData {
        LiveDrawData {
            league: League {
                id: 5,
                name: "Winter League".into(),
                status,
                draw_start_time: None,
                capacity: Some(2),
            },
            users: vec![
                Creator {
                    id: 1,
                    username: "alice".into(),
                    profile_picture: None,
                },
                Creator {
                    id: 2,
                    username: "bob".into(),
                    profile_picture: None,
                },
            ],
            divisions: vec![Division {
                id: 10,
                name: "Div A".into(),
                capacity: 2,
            }],
            time_to_draw,
        }
    }

    fn settings(role: DrawRole) -> SessionSettings {
        SessionSettings {
            league: 5,
            role,
            reactions: false,
            timing: TimingConfig::default(),
        }
    }

    fn state(
        status: LeagueStatus,
        role: DrawRole,
    ) -> (
        Arc<ScriptedDrawApi>,
        AppState<ScriptedDrawApi>,
        mpsc::Receiver<SessionEvent>,
    ) {
        let live = data(status, 0);
        let api = Arc::new(ScriptedDrawApi::new(live.clone()));
        let (tx, rx) = mpsc::channel(64);
        let state = AppState::new(api.clone(), settings(role), live, tx);
        (api, state, rx)
    }

    #[tokio::test]
    async fn expiry_starts_the_draw_once() {
        tokio::time::pause();
        let (api, mut state, mut rx) = state(LeagueStatus::Pending, DrawRole::Driver);

        state.handle_event(ClockEvent::Expired.into());
        state.handle_event(ClockEvent::Expired.into());

        // Drive the spawned sequence to completion.
        while let Some(event) = rx.recv().await {
            state.handle_event(event);
            if state.session.status == DrawStatus::Completed {
                break;
            }
        }
        assert_eq!(api.start_calls(), 1);
        assert!(state.session.started);
    }

    #[tokio::test]
    async fn observer_never_starts_the_draw() {
        tokio::time::pause();
        let (api, mut state, _rx) = state(LeagueStatus::Pending, DrawRole::Observer);

        state.handle_event(ClockEvent::Expired.into());
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(api.start_calls(), 0);
        assert_eq!(*state.poll_gate.borrow(), DrawStatus::InProgress);
        assert_eq!(state.session.status, DrawStatus::Pending);
    }

    #[tokio::test]
    async fn retry_outside_error_is_ignored() {
        tokio::time::pause();
        let (api, mut state, _rx) = state(LeagueStatus::DrawInProgress, DrawRole::Driver);

        state.handle_command(UserCommand::Retry).await;
        tokio::time::sleep(Duration::from_secs(1)).await;

        assert_eq!(api.results_calls(), 0);
        assert_eq!(api.start_calls(), 0);
    }

    #[tokio::test]
    async fn completed_league_loads_results_on_mount() {
        tokio::time::pause();
        let (api, mut state, _rx) = state(LeagueStatus::Completed, DrawRole::Observer);
        api.set_default_results(DrawResults {
            results: vec![DrawResult {
                creator: Creator {
                    id: 1,
                    username: "alice".into(),
                    profile_picture: None,
                },
                division: Division {
                    id: 10,
                    name: "Div A".into(),
                    capacity: 2,
                },
                sequence_index: 1,
            }],
            draw_complete: true,
        });

        state.mount(&ServerClock::local(Instant::now())).await;

        assert_eq!(state.session.results.len(), 1);
        assert_eq!(state.session.remaining.len(), 1);
        assert_eq!(state.session.status, DrawStatus::Completed);
        state.shutdown();
    }

    #[tokio::test]
    async fn reaction_is_posted_and_feed_refreshed() {
        tokio::time::pause();
        let (api, mut state, _rx) = state(LeagueStatus::Pending, DrawRole::Observer);

        state.handle_command(UserCommand::React("  let's go  ".into())).await;
        state.handle_command(UserCommand::React("   ".into())).await;

        assert_eq!(api.reaction_posts(), 1);
        assert_eq!(state.session.reactions.len(), 1);
        assert_eq!(state.session.reactions[0].message, "let's go");
    }

    #[tokio::test]
    async fn clearing_reactions_empties_the_feed() {
        tokio::time::pause();
        let (api, mut state, _rx) = state(LeagueStatus::Pending, DrawRole::Observer);
        state.handle_command(UserCommand::React("first".into())).await;
        assert_eq!(state.session.reactions.len(), 1);

        state.handle_command(UserCommand::ClearReactions).await;

        assert_eq!(api.reaction_clears(), 1);
        assert!(state.session.reactions.is_empty());
    }
}

// Live draw console client.
//
// Startup sequence:
// 1. Load config (copying shipped defaults on first run)
// 2. Initialize tracing (log to file; stdout carries the view)
// 3. Build the HTTP client with the configured credential
// 4. Spawn the session loop
// 5. Print views, forward stdin commands until quit
// 6. Cleanup on exit

use std::io::BufRead;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use tokio::sync::mpsc;
use tracing::{error, info};

use livedraw_api::HttpDrawApi;
use livedraw_app::app::{self, SessionSettings};
use livedraw_core::config::{self, LoggingConfig};
use livedraw_core::model::LeagueId;
use livedraw_core::present::{CardContent, SessionView};
use livedraw_core::protocol::{UserCommand, ViewUpdate};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config
    let mut config = config::load_config().context("failed to load configuration")?;
    if let Some(arg) = std::env::args().nth(1) {
        config.draw.league_id = arg
            .parse()
            .with_context(|| format!("invalid league id argument: {arg}"))?;
    }

    // 2. Initialize tracing
    let log_path = init_tracing(&config.logging, config.draw.league_id)?;
    eprintln!("logging to {}", log_path.display());
    info!(
        "Config loaded: league={}, role={:?}, server={}",
        config.draw.league_id, config.draw.role, config.server.base_url
    );

    // 3. Build the HTTP client
    if config.credentials.token().is_none() {
        info!("No bearer token configured; requests are sent unauthenticated");
    }
    let api = Arc::new(HttpDrawApi::new(
        config.server.base_url.clone(),
        config.credentials.clone(),
    ));

    // 4. Spawn the session loop
    let (cmd_tx, cmd_rx) = mpsc::channel(64);
    let (ui_tx, mut ui_rx) = mpsc::channel(256);
    let settings = SessionSettings::from_config(&config);
    let app_handle = tokio::spawn(async move {
        if let Err(e) = app::run(api, settings, cmd_rx, ui_tx).await {
            error!("Session loop error: {:#}", e);
            eprintln!("error: {e:#}");
        }
    });

    // 5. Stdin commands on a plain thread: a blocking read parked on the
    // runtime's blocking pool would hold shutdown until the next newline.
    spawn_input_thread(cmd_tx.clone());

    while let Some(update) = ui_rx.recv().await {
        match update {
            ViewUpdate::View(view) => print_view(&view),
            ViewUpdate::LoginRequired => {
                println!("Your session has expired. Please log in again.");
                break;
            }
        }
    }

    // 6. Cleanup: wait for the session task to finish (with timeout)
    drop(cmd_tx);
    let _ = tokio::time::timeout(Duration::from_secs(5), async {
        let _ = app_handle.await;
    })
    .await;

    info!("Live draw client shut down cleanly");
    Ok(())
}

/// Read stdin on its own thread; the thread is never joined and dies with
/// the process.
fn spawn_input_thread(cmd_tx: mpsc::Sender<UserCommand>) {
    std::thread::spawn(move || forward_commands(std::io::stdin().lock(), &cmd_tx));
}

/// Forward input lines as commands until EOF, `q`, or the session goes away:
/// `r` retries, `/clear` empties the reaction feed, anything else is posted
/// as a reaction.
fn forward_commands(input: impl BufRead, cmd_tx: &mpsc::Sender<UserCommand>) {
    for line in input.lines() {
        let Ok(line) = line else { break };
        let cmd = match line.trim() {
            "" => continue,
            "r" => UserCommand::Retry,
            "q" => UserCommand::Quit,
            "/clear" => UserCommand::ClearReactions,
            text => UserCommand::React(text.to_string()),
        };
        let quit = cmd == UserCommand::Quit;
        if cmd_tx.blocking_send(cmd).is_err() || quit {
            break;
        }
    }
}

fn print_view(view: &SessionView) {
    println!("== {} ==", view.title);
    if let Some(status) = view.status_line {
        match &view.countdown {
            Some(countdown) => println!("{status} {countdown}"),
            None => println!("{status}"),
        }
    }
    if let Some(card) = &view.card {
        if let Some(headline) = card.headline {
            println!("  {headline}");
        }
        match &card.content {
            CardContent::Assignment { creator, division } => {
                println!("  {creator} -> {division}");
            }
            CardContent::Confirmation | CardContent::Empty => {}
        }
    }
    for division in &view.divisions {
        println!(
            "  {} ({}/{}): {}",
            division.name,
            division.assigned,
            division.capacity,
            division.creators.join(", ")
        );
    }
    if !view.remaining.is_empty() {
        println!(
            "  Remaining ({}): {}",
            view.remaining.len(),
            view.remaining.join(", ")
        );
    }
    if let Some(error) = &view.error {
        println!("  ! {error} (type `r` to retry)");
    }
    if let Some(reaction) = view.reactions.last() {
        println!("  [{}] {}", reaction.user, reaction.message);
    }
}

/// Route tracing into `<logging.dir>/league-<id>.log`, appending so that
/// reconnecting to the same draw keeps one history. Stdout carries the view.
fn init_tracing(logging: &LoggingConfig, league: LeagueId) -> anyhow::Result<PathBuf> {
    use tracing_subscriber::fmt;
    use tracing_subscriber::EnvFilter;

    let log_dir = std::env::current_dir()?.join(&logging.dir);
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("failed to create log directory {}", log_dir.display()))?;
    let log_path = log_dir.join(format!("league-{league}.log"));
    let log_file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("failed to open {}", log_path.display()))?;

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&logging.filter))
        .with_context(|| format!("invalid log filter {:?}", logging.filter))?;

    fmt()
        .with_env_filter(filter)
        .with_writer(std::sync::Mutex::new(log_file))
        .with_ansi(false)
        .with_target(true)
        .with_line_number(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to set tracing subscriber: {e}"))?;

    Ok(log_path)
}

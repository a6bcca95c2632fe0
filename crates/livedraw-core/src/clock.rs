// Countdown to the scheduled draw, anchored to the moment the server's
// `time_to_draw` reading arrived.

use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;
use tokio::time::{self, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::protocol::{ClockEvent, SessionEvent};

pub const DEFAULT_TICK: Duration = Duration::from_secs(1);

// ---------------------------------------------------------------------------
// ServerClock
// ---------------------------------------------------------------------------

/// Timestamps captured alongside a live-draw-data response.
#[derive(Debug, Clone)]
pub struct ServerClock {
    /// Parsed HTTP `Date` header, if present and valid.
    pub server_time: Option<DateTime<Utc>>,
    /// Local wall-clock time when the response arrived.
    pub client_time: DateTime<Utc>,
    /// Monotonic instant when the response arrived. Countdown anchor.
    pub received_at: Instant,
}

impl ServerClock {
    /// Build from a raw `Date` header value (RFC 2822 / IMF-fixdate).
    pub fn from_date_header(
        header: Option<&str>,
        client_time: DateTime<Utc>,
        received_at: Instant,
    ) -> Self {
        let server_time = match header {
            Some(raw) => match DateTime::parse_from_rfc2822(raw) {
                Ok(t) => Some(t.with_timezone(&Utc)),
                Err(e) => {
                    warn!("unparseable server Date header {raw:?}: {e}");
                    None
                }
            },
            None => None,
        };
        ServerClock {
            server_time,
            client_time,
            received_at,
        }
    }

    /// A reading with no server time at all.
    pub fn local(received_at: Instant) -> Self {
        ServerClock {
            server_time: None,
            client_time: Utc::now(),
            received_at,
        }
    }

    /// Server time minus client time at the moment of the reading.
    pub fn skew(&self) -> Option<chrono::Duration> {
        self.server_time.map(|server| server - self.client_time)
    }
}

// ---------------------------------------------------------------------------
// DrawClock
// ---------------------------------------------------------------------------

/// Countdown that fires [`ClockEvent::Expired`] exactly once.
///
/// The remaining time is recomputed from the fixed anchor on every tick
/// rather than decremented, so late or skipped ticks never accumulate drift.
#[derive(Debug, Clone)]
pub struct DrawClock {
    seconds_until_draw: u64,
    anchor: Instant,
    tick: Duration,
    fired: bool,
    degraded: bool,
}

impl DrawClock {
    pub fn new(seconds_until_draw: u64, reading: &ServerClock) -> Self {
        let degraded = match reading.skew() {
            Some(skew) => {
                debug!(
                    skew_ms = skew.num_milliseconds(),
                    "server/client clock skew at countdown anchor"
                );
                false
            }
            None => {
                warn!("server time unavailable, countdown runs on local time only");
                true
            }
        };
        DrawClock {
            seconds_until_draw,
            anchor: reading.received_at,
            tick: DEFAULT_TICK,
            fired: false,
            degraded,
        }
    }

    pub fn with_tick(mut self, tick: Duration) -> Self {
        self.tick = tick;
        self
    }

    /// Whole seconds left at `now`, never below zero.
    pub fn remaining_at(&self, now: Instant) -> u64 {
        let elapsed = now.saturating_duration_since(self.anchor).as_secs();
        self.seconds_until_draw.saturating_sub(elapsed)
    }

    /// Advance the clock to `now`. Returns `None` once expiry has fired.
    pub fn poll(&mut self, now: Instant) -> Option<ClockEvent> {
        if self.fired {
            return None;
        }
        match self.remaining_at(now) {
            0 => {
                self.fired = true;
                Some(ClockEvent::Expired)
            }
            remaining => Some(ClockEvent::Tick(remaining)),
        }
    }

    /// Drive the countdown, sending each tick and the final expiry to `tx`.
    ///
    /// Returns after expiry, or as soon as the receiver is dropped.
    pub async fn run(mut self, tx: mpsc::Sender<SessionEvent>) {
        info!(
            seconds = self.seconds_until_draw,
            degraded = self.degraded,
            "draw countdown started"
        );
        let mut interval = time::interval(self.tick);
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            interval.tick().await;
            let Some(event) = self.poll(Instant::now()) else {
                break;
            };
            let expired = event == ClockEvent::Expired;
            if tx.send(event.into()).await.is_err() {
                debug!("countdown receiver dropped");
                break;
            }
            if expired {
                info!("draw countdown expired");
                break;
            }
        }
    }
}

/// Render seconds as `HH:MM:SS`; `--:--:--` when unknown.
pub fn format_countdown(seconds: Option<u64>) -> String {
    match seconds {
        Some(s) => format!("{:02}:{:02}:{:02}", s / 3600, (s % 3600) / 60, s % 60),
        None => "--:--:--".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reading_at(anchor: Instant) -> ServerClock {
        let now = Utc::now();
        ServerClock {
            server_time: Some(now),
            client_time: now,
            received_at: anchor,
        }
    }

    #[test]
    fn remaining_recomputed_from_anchor() {
        let anchor = Instant::now();
        let clock = DrawClock::new(10, &reading_at(anchor));

        assert_eq!(clock.remaining_at(anchor), 10);
        assert_eq!(clock.remaining_at(anchor + Duration::from_millis(999)), 10);
        assert_eq!(clock.remaining_at(anchor + Duration::from_millis(1000)), 9);
        assert_eq!(clock.remaining_at(anchor + Duration::from_secs(7)), 3);
        assert_eq!(clock.remaining_at(anchor + Duration::from_secs(60)), 0);
    }

    #[test]
    fn poll_fires_expiry_once() {
        let anchor = Instant::now();
        let mut clock = DrawClock::new(2, &reading_at(anchor));

        assert_eq!(clock.poll(anchor), Some(ClockEvent::Tick(2)));
        assert_eq!(
            clock.poll(anchor + Duration::from_secs(2)),
            Some(ClockEvent::Expired)
        );
        assert!(clock.fired);
        assert_eq!(clock.poll(anchor + Duration::from_secs(3)), None);
        assert_eq!(clock.poll(anchor + Duration::from_secs(30)), None);
    }

    #[test]
    fn zero_countdown_expires_immediately() {
        let anchor = Instant::now();
        let mut clock = DrawClock::new(0, &reading_at(anchor));
        assert_eq!(clock.poll(anchor), Some(ClockEvent::Expired));
    }

    #[test]
    fn bad_date_header_degrades_to_local_countdown() {
        let anchor = Instant::now();
        let reading = ServerClock::from_date_header(Some("yesterday-ish"), Utc::now(), anchor);
        assert!(reading.server_time.is_none());

        let clock = DrawClock::new(5, &reading);
        assert!(clock.degraded);
        assert_eq!(clock.remaining_at(anchor + Duration::from_secs(2)), 3);
    }

    #[test]
    fn http_date_header_parses_and_reports_skew() {
        let client = DateTime::parse_from_rfc3339("2026-10-16T08:00:00Z")
            .unwrap()
            .with_timezone(&Utc);
        let reading = ServerClock::from_date_header(
            Some("Fri, 16 Oct 2026 08:00:03 GMT"),
            client,
            Instant::now(),
        );
        assert_eq!(reading.skew(), Some(chrono::Duration::seconds(3)));
    }

    #[test]
    fn format_countdown_renders_hours_minutes_seconds() {
        assert_eq!(format_countdown(Some(0)), "00:00:00");
        assert_eq!(format_countdown(Some(3725)), "01:02:05");
        assert_eq!(format_countdown(None), "--:--:--");
    }

    #[tokio::test]
    async fn run_emits_exactly_one_expiry_after_ten_seconds() {
        tokio::time::pause();
        let start = Instant::now();
        let clock = DrawClock::new(10, &reading_at(start));
        let (tx, mut rx) = mpsc::channel(64);

        let handle = tokio::spawn(clock.run(tx));

        let mut ticks = Vec::new();
        let mut expiries = 0;
        while let Some(event) = rx.recv().await {
            match event {
                SessionEvent::Clock(ClockEvent::Tick(n)) => ticks.push(n),
                SessionEvent::Clock(ClockEvent::Expired) => expiries += 1,
                other => panic!("unexpected event {other:?}"),
            }
        }
        handle.await.unwrap();

        assert_eq!(expiries, 1);
        assert_eq!(ticks, (1..=10).rev().collect::<Vec<u64>>());
        assert_eq!(start.elapsed().as_secs(), 10);
    }

    #[tokio::test]
    async fn run_stops_when_receiver_dropped() {
        tokio::time::pause();
        let clock = DrawClock::new(3600, &ServerClock::local(Instant::now()));
        let (tx, rx) = mpsc::channel(1);
        drop(rx);

        // Would otherwise tick for an hour of virtual time.
        clock.run(tx).await;
    }
}

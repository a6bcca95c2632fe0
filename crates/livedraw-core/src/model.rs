// League, division, creator, and draw records as exchanged with the
// league-draw service.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type LeagueId = u64;
pub type DivisionId = u64;
pub type CreatorId = u64;

// ---------------------------------------------------------------------------
// League
// ---------------------------------------------------------------------------

/// Server-side lifecycle of a league.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum LeagueStatus {
    Pending,
    DrawInProgress,
    Active,
    Completed,
}

impl fmt::Display for LeagueStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LeagueStatus::Pending => "PENDING",
            LeagueStatus::DrawInProgress => "DRAW_IN_PROGRESS",
            LeagueStatus::Active => "ACTIVE",
            LeagueStatus::Completed => "COMPLETED",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct League {
    pub id: LeagueId,
    pub name: String,
    pub status: LeagueStatus,
    /// Scheduled draw time, when the backend publishes one.
    #[serde(default)]
    pub draw_start_time: Option<DateTime<Utc>>,
    /// Maximum number of creators in the league.
    #[serde(default, alias = "max_creators")]
    pub capacity: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Division {
    pub id: DivisionId,
    pub name: String,
    #[serde(default)]
    pub capacity: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Creator {
    pub id: CreatorId,
    pub username: String,
    #[serde(default, alias = "profile_picture_url")]
    pub profile_picture: Option<String>,
}

/// One creator's division assignment. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DrawResult {
    pub creator: Creator,
    pub division: Division,
    /// Position of this assignment in the league's draw order.
    #[serde(default, alias = "draw_order", alias = "order")]
    pub sequence_index: u32,
}

// ---------------------------------------------------------------------------
// Endpoint payloads
// ---------------------------------------------------------------------------

/// Snapshot returned by the live-draw-data endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveDrawData {
    pub league: League,
    /// Creators not yet drawn.
    #[serde(default)]
    pub users: Vec<Creator>,
    #[serde(default)]
    pub divisions: Vec<Division>,
    /// Seconds until the scheduled draw; zero or negative once it is due.
    #[serde(default)]
    pub time_to_draw: i64,
}

impl LiveDrawData {
    /// Countdown seconds clamped at zero.
    pub fn seconds_until_draw(&self) -> u64 {
        self.time_to_draw.max(0) as u64
    }
}

/// Result of the start-draw handshake. Both variants mean the draw is running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    Started,
    AlreadyInProgress,
}

impl StartOutcome {
    pub const STARTED_MESSAGE: &'static str = "Draw started successfully.";
    pub const IN_PROGRESS_MESSAGE: &'static str = "Draw is already in progress.";

    /// Map the backend's confirmation message onto an outcome.
    pub fn from_message(message: &str) -> Option<Self> {
        match message {
            Self::STARTED_MESSAGE => Some(StartOutcome::Started),
            Self::IN_PROGRESS_MESSAGE => Some(StartOutcome::AlreadyInProgress),
            _ => None,
        }
    }
}

/// Response of one perform-draw step.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct PerformDraw {
    #[serde(default)]
    pub draw_complete: bool,
    #[serde(default)]
    pub creator: Option<Creator>,
    #[serde(default)]
    pub division: Option<Division>,
    #[serde(default)]
    pub draw: Option<DrawResult>,
}

impl PerformDraw {
    /// A terminal response: no creators left to draw.
    pub fn complete() -> Self {
        PerformDraw {
            draw_complete: true,
            ..Default::default()
        }
    }

    /// A single assignment step.
    pub fn assigned(result: DrawResult) -> Self {
        PerformDraw {
            draw_complete: false,
            creator: Some(result.creator.clone()),
            division: Some(result.division.clone()),
            draw: Some(result),
        }
    }
}

/// Authoritative results for a league's draw.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct DrawResults {
    #[serde(default)]
    pub results: Vec<DrawResult>,
    #[serde(default)]
    pub draw_complete: bool,
}

/// Record returned by the manual assign-division endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    #[serde(default)]
    pub id: Option<u64>,
    pub creator: Creator,
    pub division: Division,
}

/// A message in the league's live-reactions feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveReaction {
    pub id: u64,
    /// Display name of the author.
    pub user: String,
    pub message: String,
    #[serde(default)]
    pub profile_picture: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn live_draw_data_parses_backend_shape() {
        let json = r#"{
            "league": {"id": 7, "name": "Spring League", "status": "PENDING",
                       "draw_start_time": "2026-03-01T18:00:00Z", "max_creators": 16},
            "users": [{"id": 1, "username": "alice", "profile_picture": null}],
            "divisions": [{"id": 10, "name": "Div A", "capacity": 8}],
            "time_to_draw": 125
        }"#;
        let data: LiveDrawData = serde_json::from_str(json).unwrap();
        assert_eq!(data.league.status, LeagueStatus::Pending);
        assert_eq!(data.league.capacity, Some(16));
        assert!(data.league.draw_start_time.is_some());
        assert_eq!(data.users[0].username, "alice");
        assert_eq!(data.divisions[0].capacity, 8);
        assert_eq!(data.seconds_until_draw(), 125);
    }

    #[test]
    fn negative_time_to_draw_clamps_to_zero() {
        let json = r#"{"league": {"id": 1, "name": "L", "status": "DRAW_IN_PROGRESS"},
                       "time_to_draw": -40}"#;
        let data: LiveDrawData = serde_json::from_str(json).unwrap();
        assert_eq!(data.seconds_until_draw(), 0);
        assert!(data.users.is_empty());
    }

    #[test]
    fn perform_draw_complete_has_no_fields() {
        let step: PerformDraw = serde_json::from_str(r#"{"draw_complete": true}"#).unwrap();
        assert_eq!(step, PerformDraw::complete());
    }

    #[test]
    fn start_outcome_recognises_both_messages() {
        assert_eq!(
            StartOutcome::from_message("Draw started successfully."),
            Some(StartOutcome::Started)
        );
        assert_eq!(
            StartOutcome::from_message("Draw is already in progress."),
            Some(StartOutcome::AlreadyInProgress)
        );
        assert_eq!(StartOutcome::from_message("League is full."), None);
    }

    #[test]
    fn league_status_display_matches_wire_names() {
        assert_eq!(LeagueStatus::DrawInProgress.to_string(), "DRAW_IN_PROGRESS");
    }
}

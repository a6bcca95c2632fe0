// Pure mapping from session state to what the draw view shows.

use crate::clock::format_countdown;
use crate::protocol::DrawPhase;
use crate::session::{CurrentDraw, DrawSession, DrawStatus};

/// What the animated draw card shows for one phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawCard {
    pub headline: Option<&'static str>,
    pub spinner: bool,
    pub card_visible: bool,
    pub content: CardContent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CardContent {
    Empty,
    /// Creator username and target division name.
    Assignment { creator: String, division: String },
    Confirmation,
}

/// Map a sequencer phase and the current draw onto the draw card.
pub fn draw_card(phase: DrawPhase, current: Option<&CurrentDraw>) -> DrawCard {
    match phase {
        DrawPhase::Drawing => DrawCard {
            headline: Some("Drawing Creator..."),
            spinner: true,
            card_visible: false,
            content: CardContent::Empty,
        },
        DrawPhase::Assigning => DrawCard {
            headline: Some("Assigning to..."),
            spinner: false,
            card_visible: true,
            content: match current {
                Some(draw) => CardContent::Assignment {
                    creator: draw.creator.username.clone(),
                    division: draw.division.name.clone(),
                },
                None => CardContent::Empty,
            },
        },
        DrawPhase::Complete => DrawCard {
            headline: Some("Assignment Complete!"),
            spinner: false,
            card_visible: true,
            content: CardContent::Confirmation,
        },
        DrawPhase::Idle | DrawPhase::Starting | DrawPhase::Finished | DrawPhase::Error => DrawCard {
            headline: None,
            spinner: false,
            card_visible: false,
            content: CardContent::Empty,
        },
    }
}

/// Fill level of one division.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DivisionOccupancy {
    pub name: String,
    pub assigned: usize,
    pub capacity: u32,
    /// Usernames in draw order.
    pub creators: Vec<String>,
}

/// One line of the live-reactions feed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReactionLine {
    pub user: String,
    pub message: String,
}

/// Everything the draw view renders, derived from a [`DrawSession`].
#[derive(Debug, Clone, PartialEq)]
pub struct SessionView {
    pub title: String,
    pub status_line: Option<&'static str>,
    pub countdown: Option<String>,
    /// Present only while the draw card is shown.
    pub card: Option<DrawCard>,
    pub remaining: Vec<String>,
    pub divisions: Vec<DivisionOccupancy>,
    pub results_count: usize,
    pub error: Option<String>,
    pub login_required: bool,
    pub reactions: Vec<ReactionLine>,
}

impl SessionView {
    pub fn from_session(session: &DrawSession) -> Self {
        let status_line = match session.status {
            DrawStatus::Pending if session.countdown.is_some_and(|s| s > 0) => {
                Some("Draw starts in:")
            }
            DrawStatus::Pending | DrawStatus::Error => None,
            DrawStatus::InProgress => Some("Draw in progress..."),
            DrawStatus::Completed => Some("Draw completed!"),
        };
        let countdown = match session.status {
            DrawStatus::Pending if session.countdown.is_some_and(|s| s > 0) => {
                Some(format_countdown(session.countdown))
            }
            _ => None,
        };

        let divisions = session
            .results
            .group_by_division(&session.divisions)
            .map(|g| DivisionOccupancy {
                name: g.division.name.clone(),
                assigned: g.assigned(),
                capacity: g.division.capacity,
                creators: g
                    .results
                    .iter()
                    .map(|r| r.creator.username.clone())
                    .collect(),
            })
            .collect();

        SessionView {
            title: format!("{} - LIVE DRAW", session.league.name),
            status_line,
            countdown,
            card: session
                .show_card
                .then(|| draw_card(session.phase, session.current_draw.as_ref())),
            remaining: session
                .remaining
                .iter()
                .map(|c| c.username.clone())
                .collect(),
            divisions,
            results_count: session.results.len(),
            error: session.error.clone(),
            login_required: session.login_required,
            reactions: session
                .reactions
                .iter()
                .map(|r| ReactionLine {
                    user: r.user.clone(),
                    message: r.message.clone(),
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Creator, Division, DrawResult, League, LeagueStatus, LiveDrawData};
    use crate::protocol::SequencerEvent;

    fn current(creator: &str, division: &str) -> CurrentDraw {
        CurrentDraw {
            creator: Creator {
                id: 1,
                username: creator.into(),
                profile_picture: None,
            },
            division: Division {
                id: 1,
                name: division.into(),
                capacity: 4,
            },
        }
    }

    #[test]
    fn phase_table() {
        let alice = current("Alice", "Div A");
        let cases = [
            (DrawPhase::Idle, None, false, false),
            (DrawPhase::Drawing, Some("Drawing Creator..."), true, false),
            (DrawPhase::Assigning, Some("Assigning to..."), false, true),
            (DrawPhase::Complete, Some("Assignment Complete!"), false, true),
        ];
        for (phase, headline, spinner, card_visible) in cases {
            let card = draw_card(phase, Some(&alice));
            assert_eq!(card.headline, headline, "{phase:?}");
            assert_eq!(card.spinner, spinner, "{phase:?}");
            assert_eq!(card.card_visible, card_visible, "{phase:?}");
        }
    }

    #[test]
    fn assigning_shows_creator_and_division() {
        let card = draw_card(DrawPhase::Assigning, Some(&current("Alice", "Div A")));
        assert_eq!(
            card,
            DrawCard {
                headline: Some("Assigning to..."),
                spinner: false,
                card_visible: true,
                content: CardContent::Assignment {
                    creator: "Alice".into(),
                    division: "Div A".into(),
                },
            }
        );
    }

    #[test]
    fn terminal_phases_render_like_idle() {
        for phase in [DrawPhase::Starting, DrawPhase::Finished, DrawPhase::Error] {
            assert_eq!(draw_card(phase, None), draw_card(DrawPhase::Idle, None));
        }
    }

    #[test]
    fn session_view_reports_countdown_and_occupancy() {
        let div_a = Division {
            id: 10,
            name: "Div A".into(),
            capacity: 2,
        };
        let div_b = Division {
            id: 20,
            name: "Div B".into(),
            capacity: 2,
        };
        let alice = Creator {
            id: 1,
            username: "alice".into(),
            profile_picture: None,
        };
        let mut session = DrawSession::new(LiveDrawData {
            league: League {
                id: 3,
                name: "Autumn League".into(),
                status: LeagueStatus::Pending,
                draw_start_time: None,
                capacity: None,
            },
            users: vec![alice.clone()],
            divisions: vec![div_a.clone(), div_b],
            time_to_draw: 3725,
        });

        let view = SessionView::from_session(&session);
        assert_eq!(view.title, "Autumn League - LIVE DRAW");
        assert_eq!(view.status_line, Some("Draw starts in:"));
        assert_eq!(view.countdown.as_deref(), Some("01:02:05"));
        assert!(view.card.is_none());
        assert_eq!(view.remaining, vec!["alice".to_string()]);

        session.apply(
            SequencerEvent::Drawn {
                creator: alice.clone(),
                division: div_a.clone(),
                result: DrawResult {
                    creator: alice,
                    division: div_a,
                    sequence_index: 1,
                },
            }
            .into(),
        );
        let view = SessionView::from_session(&session);
        assert_eq!(view.status_line, Some("Draw in progress..."));
        assert!(view.countdown.is_none());
        assert!(view.remaining.is_empty());
        assert_eq!(view.divisions[0].assigned, 1);
        assert_eq!(view.divisions[0].creators, vec!["alice".to_string()]);
        assert_eq!(view.divisions[1].assigned, 0);
        assert_eq!(view.results_count, 1);
    }
}

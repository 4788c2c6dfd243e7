//! Tile-sort game: everyone races to make a random grid one colour.
//!
//! ```text
//! NONE ──start──→ ROUND 1 ──close──→ ROUND 2 ──close──→ … ──close──→ final message ──→ NONE
//! ```
//!
//! A round closes when every online participant has submitted, or when
//! its deadline passes. Results are reported by the clients and recorded
//! as given.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::ops::RangeInclusive;

use rand::Rng;
use serde::{Deserialize, Serialize};
use shoutbox_protocol::{CustomRounds, ResultReport, TileSortSetup, UserId};

use crate::game::{GameEvent, GameId};
use crate::model::{Message, Millis, Participant};
use crate::RoomError;

/// Colours tiles are drawn from; a game uses the first `color_count`.
pub const PALETTE: [&str; 6] = [
    "#FF6B6B", "#4ECDC4", "#FFD93D", "#6C5CE7", "#A8E6CF", "#FF8B94",
];

/// Accepted custom grid sizes.
pub const GRID_SIZES: RangeInclusive<u8> = 3..=5;
/// Accepted custom time limits, in seconds.
pub const TIME_LIMITS: [u32; 3] = [60, 120, 180];
/// Accepted custom colour counts.
pub const COLOR_COUNTS: RangeInclusive<u8> = 2..=6;
/// Accepted custom round counts.
pub const ROUND_COUNTS: RangeInclusive<u8> = 1..=5;

/// The tournament preset: growing grids, growing time limits, two colours.
pub const TOURNAMENT: [RoundConfig; 3] = [
    RoundConfig { grid_size: 2, time_limit: 10, color_count: 2 },
    RoundConfig { grid_size: 4, time_limit: 20, color_count: 2 },
    RoundConfig { grid_size: 8, time_limit: 30, color_count: 2 },
];

/// Slack after a round's time limit before the server closes it, so a
/// client's own timeout report arrives in time.
pub const ROUND_GRACE_MS: Millis = 2_000;

/// Settings for one round.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundConfig {
    pub grid_size: u8,
    /// Seconds.
    pub time_limit: u32,
    pub color_count: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TileSortMode {
    Custom,
    Tournament,
}

/// A running tile-sort game. Fields describe the current round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSortGame {
    pub id: GameId,
    pub mode: TileSortMode,
    pub grid_size: u8,
    pub time_limit: u32,
    pub color_palette: Vec<String>,
    /// `initial_grid[y][x]` is a colour from `color_palette`.
    pub initial_grid: Vec<Vec<String>>,
    pub start_time: Millis,
    /// 1-based.
    pub current_round: u8,
    pub total_rounds: u8,
    pub schedule: Vec<RoundConfig>,
    pub submissions: BTreeMap<UserId, Submission>,
    pub round_results: Vec<RoundResult>,
    pub totals: BTreeMap<UserId, u32>,
}

/// One participant's recorded outcome for a round.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    /// Seconds; `None` when the participant timed out.
    pub completion_time: Option<f64>,
    pub clicks: u32,
    pub score: u32,
    pub completed: bool,
}

/// A closed round's leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundResult {
    pub round: u8,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
    pub completion_time: Option<f64>,
    pub clicks: u32,
    pub completed: bool,
}

/// Data of the `start` game event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSortStart {
    pub mode: TileSortMode,
    pub total_rounds: u8,
    pub rounds: Vec<RoundConfig>,
}

/// Data of the `final` game event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TileSortFinal {
    pub rounds: Vec<RoundResult>,
    pub totals: Vec<TotalEntry>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TotalEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub score: u32,
}

/// What closing a round led to.
#[derive(Debug)]
pub enum RoundClose {
    /// Another round started; carries the `round_end` announcement.
    Next(Message),
    /// The game is over; carries the `final` announcement.
    Finished(Message),
}

/// Score for solving in `completion_time` seconds with `clicks` clicks:
/// `max(0, (time_limit - completion_time) * 100 - clicks * 5)`, rounded.
/// A negative time counts as 0, so the result never exceeds
/// [`max_score`].
pub fn score(time_limit: u32, completion_time: f64, clicks: u32) -> u32 {
    let raw = (f64::from(time_limit) - completion_time.max(0.0)) * 100.0 - f64::from(clicks) * 5.0;
    raw.max(0.0).round() as u32
}

/// The best score a round with `time_limit` seconds can award.
pub fn max_score(time_limit: u32) -> u32 {
    time_limit.saturating_mul(100)
}

/// A `size`×`size` grid of colours drawn uniformly from `palette`.
pub fn generate_grid(size: u8, palette: &[String]) -> Vec<Vec<String>> {
    let mut rng = rand::rng();
    (0..size)
        .map(|_| {
            (0..size)
                .map(|_| palette[rng.random_range(0..palette.len())].clone())
                .collect()
        })
        .collect()
}

fn palette(color_count: u8) -> Vec<String> {
    PALETTE
        .iter()
        .take(usize::from(color_count))
        .map(|c| c.to_string())
        .collect()
}

fn custom_schedule(custom: &CustomRounds) -> Result<Vec<RoundConfig>, RoomError> {
    if !GRID_SIZES.contains(&custom.grid_size) {
        return Err(invalid("grid size must be 3-5"));
    }
    if !TIME_LIMITS.contains(&custom.time_limit) {
        return Err(invalid("time limit must be 60, 120 or 180 seconds"));
    }
    if !COLOR_COUNTS.contains(&custom.color_count) {
        return Err(invalid("color count must be 2-6"));
    }
    if !ROUND_COUNTS.contains(&custom.rounds) {
        return Err(invalid("rounds must be 1-5"));
    }
    let round = RoundConfig {
        grid_size: custom.grid_size,
        time_limit: custom.time_limit,
        color_count: custom.color_count,
    };
    Ok(vec![round; usize::from(custom.rounds)])
}

impl TileSortGame {
    /// Validates `setup` and starts round 1 at `now`.
    ///
    /// Returns the game and its `start` announcement.
    ///
    /// # Errors
    /// [`RoomError::InvalidGameData`] when a custom setting is out of range.
    pub fn start(setup: &TileSortSetup, now: Millis) -> Result<(Self, Message), RoomError> {
        let (mode, schedule) = match setup {
            TileSortSetup::Custom(custom) => (TileSortMode::Custom, custom_schedule(custom)?),
            TileSortSetup::Tournament => (TileSortMode::Tournament, TOURNAMENT.to_vec()),
        };
        let total_rounds = schedule.len() as u8;

        let announcement = Message::game_event(
            GameEvent::Start(TileSortStart {
                mode,
                total_rounds,
                rounds: schedule.clone(),
            })
            .into(),
            now,
        );

        let first = schedule[0];
        let color_palette = palette(first.color_count);
        let game = Self {
            id: GameId::generate(),
            mode,
            grid_size: first.grid_size,
            time_limit: first.time_limit,
            initial_grid: generate_grid(first.grid_size, &color_palette),
            color_palette,
            start_time: now,
            current_round: 1,
            total_rounds,
            schedule,
            submissions: BTreeMap::new(),
            round_results: Vec::new(),
            totals: BTreeMap::new(),
        };
        Ok((game, announcement))
    }

    /// When the server closes the current round if it is still open.
    pub fn round_deadline(&self) -> Millis {
        self.start_time + u64::from(self.time_limit) * 1000 + ROUND_GRACE_MS
    }

    /// Records `user`'s outcome for the current round.
    ///
    /// A completed report without a score is scored with [`score`]. A
    /// reported score is capped at [`max_score`] and a negative time is
    /// recorded as 0. A report that did not complete scores 0.
    ///
    /// # Errors
    /// [`RoomError::AlreadySubmitted`] on a second report in the same round.
    pub fn submit(&mut self, user: &UserId, report: &ResultReport) -> Result<(), RoomError> {
        if self.submissions.contains_key(user) {
            return Err(RoomError::AlreadySubmitted);
        }
        let submission = if report.completed {
            let completion_time = report.completion_time.map(|t| t.max(0.0));
            let computed = completion_time
                .map(|t| score(self.time_limit, t, report.clicks))
                .unwrap_or(0);
            Submission {
                completion_time,
                clicks: report.clicks,
                score: report
                    .score
                    .map_or(computed, |s| s.min(max_score(self.time_limit))),
                completed: true,
            }
        } else {
            Submission {
                completion_time: None,
                clicks: report.clicks,
                score: 0,
                completed: false,
            }
        };
        self.submissions.insert(user.clone(), submission);
        Ok(())
    }

    /// Returns `true` once at least one result is in and every participant
    /// in `online` has submitted.
    pub fn all_submitted(&self, online: &[UserId]) -> bool {
        !self.submissions.is_empty() && online.iter().all(|u| self.submissions.contains_key(u))
    }

    /// Closes the current round at `now`.
    ///
    /// The leaderboard lists every submitter plus every online participant
    /// who did not submit (scoring 0). If rounds remain the next one starts
    /// with a fresh grid.
    pub fn close_round(&mut self, participants: &[Participant], now: Millis) -> RoundClose {
        let name_of = |user: &UserId| {
            participants
                .iter()
                .find(|p| p.user_id == *user)
                .map(|p| p.display_name.clone())
                .unwrap_or_else(|| user.to_string())
        };

        let mut leaderboard: Vec<LeaderboardEntry> = self
            .submissions
            .iter()
            .map(|(user, s)| LeaderboardEntry {
                user_id: user.clone(),
                display_name: name_of(user),
                score: s.score,
                completion_time: s.completion_time,
                clicks: s.clicks,
                completed: s.completed,
            })
            .collect();
        for p in participants {
            if p.is_online && !self.submissions.contains_key(&p.user_id) {
                leaderboard.push(LeaderboardEntry {
                    user_id: p.user_id.clone(),
                    display_name: p.display_name.clone(),
                    score: 0,
                    completion_time: None,
                    clicks: 0,
                    completed: false,
                });
            }
        }
        leaderboard.sort_by(rank);

        for entry in &leaderboard {
            let total = self.totals.entry(entry.user_id.clone()).or_default();
            *total = total.saturating_add(entry.score);
        }
        let result = RoundResult {
            round: self.current_round,
            leaderboard,
        };
        self.round_results.push(result.clone());

        if self.current_round < self.total_rounds {
            let next = self.schedule[usize::from(self.current_round)];
            self.current_round += 1;
            self.grid_size = next.grid_size;
            self.time_limit = next.time_limit;
            self.color_palette = palette(next.color_count);
            self.initial_grid = generate_grid(next.grid_size, &self.color_palette);
            self.start_time = now;
            self.submissions.clear();
            return RoundClose::Next(Message::game_event(GameEvent::RoundEnd(result).into(), now));
        }

        let mut totals: Vec<TotalEntry> = self
            .totals
            .iter()
            .map(|(user, score)| TotalEntry {
                user_id: user.clone(),
                display_name: name_of(user),
                score: *score,
            })
            .collect();
        totals.sort_by(|a, b| b.score.cmp(&a.score).then_with(|| a.display_name.cmp(&b.display_name)));

        RoundClose::Finished(Message::game_event(
            GameEvent::Final(TileSortFinal {
                rounds: self.round_results.clone(),
                totals,
            })
            .into(),
            now,
        ))
    }
}

/// Leaderboard order: score descending, then faster finish, then name.
fn rank(a: &LeaderboardEntry, b: &LeaderboardEntry) -> Ordering {
    let time = |e: &LeaderboardEntry| e.completion_time.unwrap_or(f64::INFINITY);
    b.score
        .cmp(&a.score)
        .then_with(|| time(a).total_cmp(&time(b)))
        .then_with(|| a.display_name.cmp(&b.display_name))
}

fn invalid(reason: &str) -> RoomError {
    RoomError::InvalidGameData(reason.to_string())
}

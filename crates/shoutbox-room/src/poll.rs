//! Poll game: single- or multiple-choice voting, optionally timed.
//!
//! ```text
//! NONE ──start──→ ACTIVE ──end (owner or deadline)──→ result message ──→ NONE
//!                   │
//!                   └──cancel (owner)──→ question message removed ──→ NONE
//! ```
//!
//! The functions here are pure state transitions; the room actor decides
//! when to call them and what to broadcast.

use serde::{Deserialize, Serialize};
use shoutbox_protocol::{PollSetup, UserId};

use crate::game::{GameEvent, GameId};
use crate::model::{Message, Millis};
use crate::RoomError;

/// Most options a poll may offer.
pub const MAX_OPTIONS: usize = 10;
/// Fewest options a poll may offer.
pub const MIN_OPTIONS: usize = 2;
/// Longest accepted question, in characters.
pub const MAX_QUESTION_LEN: usize = 200;
/// Accepted range for a timed poll's duration, in seconds.
pub const DURATION_RANGE: std::ops::RangeInclusive<u32> = 1..=3600;

/// A running poll.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollGame {
    pub id: GameId,
    pub question: String,
    pub options: Vec<PollOption>,
    pub started_at: Millis,
    /// When the poll closes by itself; `None` for an untimed poll.
    pub end_at: Option<Millis>,
    pub show_realtime: bool,
    pub multiple_choice: bool,
    /// The `question` message, removed from history if the poll is cancelled.
    pub question_message_id: String,
}

/// One answer and the participants who chose it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PollOption {
    pub text: String,
    /// Voters in the order they voted. Never contains duplicates.
    pub votes: Vec<UserId>,
}

/// Data of the `question` game event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollQuestion {
    pub question: String,
    pub options: Vec<String>,
    pub multiple_choice: bool,
    pub show_realtime: bool,
    pub end_at: Option<Millis>,
}

/// Data of the `result` game event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PollResult {
    pub question: String,
    pub results: Vec<PollOption>,
    /// Rounded share of all votes per option, in option order.
    pub percentages: Vec<u32>,
    pub total_votes: usize,
}

impl PollGame {
    /// Validates `setup` and opens a poll at `now`.
    ///
    /// Returns the poll and its `question` announcement.
    ///
    /// # Errors
    /// [`RoomError::InvalidGameData`] when the question is missing or too
    /// long, fewer than two non-blank options remain, there are too many
    /// options, or the duration is out of range.
    pub fn start(setup: &PollSetup, now: Millis) -> Result<(Self, Message), RoomError> {
        let question = setup.question.trim();
        if question.is_empty() {
            return Err(invalid("poll needs a question"));
        }
        if question.chars().count() > MAX_QUESTION_LEN {
            return Err(invalid("question is too long"));
        }

        let options: Vec<String> = setup
            .options
            .iter()
            .map(|o| o.trim())
            .filter(|o| !o.is_empty())
            .map(str::to_string)
            .collect();
        if options.len() < MIN_OPTIONS {
            return Err(invalid("poll needs at least 2 options"));
        }
        if options.len() > MAX_OPTIONS {
            return Err(invalid("poll allows at most 10 options"));
        }

        let end_at = match setup.duration {
            None => None,
            Some(secs) if DURATION_RANGE.contains(&secs) => Some(now + u64::from(secs) * 1000),
            Some(_) => return Err(invalid("duration must be 1-3600 seconds")),
        };

        let announcement = Message::game_event(
            GameEvent::Question(PollQuestion {
                question: question.to_string(),
                options: options.clone(),
                multiple_choice: setup.multiple_choice,
                show_realtime: setup.show_realtime,
                end_at,
            })
            .into(),
            now,
        );

        let poll = Self {
            id: GameId::generate(),
            question: question.to_string(),
            options: options
                .into_iter()
                .map(|text| PollOption { text, votes: Vec::new() })
                .collect(),
            started_at: now,
            end_at,
            show_realtime: setup.show_realtime,
            multiple_choice: setup.multiple_choice,
            question_message_id: announcement.id.clone(),
        };
        Ok((poll, announcement))
    }

    /// Records a vote by `voter` for option `index`.
    ///
    /// Single-choice polls move the voter's one vote to `index`.
    /// Multiple-choice polls toggle the voter's vote on `index`.
    ///
    /// # Errors
    /// [`RoomError::InvalidOption`] when `index` is out of range.
    pub fn vote(&mut self, voter: &UserId, index: i64) -> Result<(), RoomError> {
        let idx = usize::try_from(index)
            .ok()
            .filter(|&i| i < self.options.len())
            .ok_or(RoomError::InvalidOption(index))?;

        if self.multiple_choice {
            let votes = &mut self.options[idx].votes;
            if let Some(pos) = votes.iter().position(|v| v == voter) {
                votes.remove(pos);
            } else {
                votes.push(voter.clone());
            }
        } else {
            for option in &mut self.options {
                option.votes.retain(|v| v != voter);
            }
            self.options[idx].votes.push(voter.clone());
        }
        Ok(())
    }

    /// Total votes cast across all options.
    pub fn total_votes(&self) -> usize {
        self.options.iter().map(|o| o.votes.len()).sum()
    }

    /// Each option's share of all votes, rounded half up; all zero when
    /// nobody voted.
    pub fn percentages(&self) -> Vec<u32> {
        let total = self.total_votes();
        self.options
            .iter()
            .map(|o| {
                if total == 0 {
                    0
                } else {
                    ((o.votes.len() * 200 + total) / (2 * total)) as u32
                }
            })
            .collect()
    }

    /// The `result` announcement with final tallies.
    pub fn result_message(&self, now: Millis) -> Message {
        Message::game_event(
            GameEvent::Result(PollResult {
                question: self.question.clone(),
                results: self.options.clone(),
                percentages: self.percentages(),
                total_votes: self.total_votes(),
            })
            .into(),
            now,
        )
    }
}

fn invalid(reason: &str) -> RoomError {
    RoomError::InvalidGameData(reason.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::game::GameEventPayload;
    use crate::model::MessageBody;

    fn setup(options: &[&str]) -> PollSetup {
        PollSetup {
            question: "Color?".into(),
            options: options.iter().map(|s| s.to_string()).collect(),
            duration: None,
            show_realtime: true,
            multiple_choice: false,
        }
    }

    fn uid(s: &str) -> UserId {
        UserId::from(s)
    }

    fn voters(poll: &PollGame, idx: usize) -> Vec<&str> {
        poll.options[idx].votes.iter().map(UserId::as_str).collect()
    }

    #[test]
    fn test_start_builds_question_announcement() {
        let (poll, msg) = PollGame::start(&setup(&["Red", "Blue"]), 1_000).unwrap();

        assert_eq!(poll.question_message_id, msg.id);
        assert!(poll.options.iter().all(|o| o.votes.is_empty()));
        assert_eq!(poll.end_at, None);
        let MessageBody::GameEvent(GameEventPayload { event: GameEvent::Question(q), .. }) = msg.body
        else {
            panic!("expected question event");
        };
        assert_eq!(q.options, vec!["Red", "Blue"]);
    }

    #[test]
    fn test_start_with_duration_sets_end() {
        let mut s = setup(&["Red", "Blue"]);
        s.duration = Some(10);
        let (poll, _) = PollGame::start(&s, 1_000).unwrap();
        assert_eq!(poll.end_at, Some(11_000));
    }

    #[test]
    fn test_start_rejects_bad_setups() {
        let mut missing_question = setup(&["Red", "Blue"]);
        missing_question.question = "   ".into();
        let mut long_question = setup(&["Red", "Blue"]);
        long_question.question = "q".repeat(201);
        let mut zero_duration = setup(&["Red", "Blue"]);
        zero_duration.duration = Some(0);
        let mut long_duration = setup(&["Red", "Blue"]);
        long_duration.duration = Some(3601);
        let eleven: Vec<String> = (0..11).map(|i| format!("opt{i}")).collect();
        let eleven: Vec<&str> = eleven.iter().map(String::as_str).collect();

        for bad in [
            missing_question,
            long_question,
            zero_duration,
            long_duration,
            setup(&["Red"]),
            setup(&["Red", "  "]),
            setup(&eleven),
        ] {
            assert!(
                matches!(PollGame::start(&bad, 0), Err(RoomError::InvalidGameData(_))),
                "{bad:?} should be rejected"
            );
        }
    }

    #[test]
    fn test_single_choice_vote_moves_between_options() {
        let (mut poll, _) = PollGame::start(&setup(&["Red", "Blue", "Green"]), 0).unwrap();

        poll.vote(&uid("b"), 0).unwrap();
        poll.vote(&uid("b"), 2).unwrap();
        poll.vote(&uid("b"), 2).unwrap();

        assert!(voters(&poll, 0).is_empty());
        assert_eq!(voters(&poll, 2), vec!["b"]);
        assert_eq!(poll.total_votes(), 1);
    }

    #[test]
    fn test_multiple_choice_vote_toggles() {
        let mut s = setup(&["Red", "Blue"]);
        s.multiple_choice = true;
        let (mut poll, _) = PollGame::start(&s, 0).unwrap();

        poll.vote(&uid("b"), 0).unwrap();
        poll.vote(&uid("b"), 1).unwrap();
        assert_eq!(voters(&poll, 0), vec!["b"]);
        assert_eq!(voters(&poll, 1), vec!["b"]);

        poll.vote(&uid("b"), 0).unwrap();
        assert!(voters(&poll, 0).is_empty());
        poll.vote(&uid("b"), 0).unwrap();
        assert_eq!(voters(&poll, 0), vec!["b"]);
    }

    #[test]
    fn test_vote_out_of_range_rejected() {
        let (mut poll, _) = PollGame::start(&setup(&["Red", "Blue"]), 0).unwrap();
        assert!(matches!(poll.vote(&uid("b"), 2), Err(RoomError::InvalidOption(2))));
        assert!(matches!(poll.vote(&uid("b"), -1), Err(RoomError::InvalidOption(-1))));
        assert_eq!(poll.total_votes(), 0);
    }

    #[test]
    fn test_percentages_round_and_handle_zero() {
        let (mut poll, _) = PollGame::start(&setup(&["A", "B", "C"]), 0).unwrap();
        assert_eq!(poll.percentages(), vec![0, 0, 0]);

        poll.vote(&uid("1"), 0).unwrap();
        poll.vote(&uid("2"), 1).unwrap();
        poll.vote(&uid("3"), 1).unwrap();
        // 1/3 = 33.3 -> 33, 2/3 = 66.7 -> 67
        assert_eq!(poll.percentages(), vec![33, 67, 0]);
    }

    #[test]
    fn test_result_message_carries_tallies() {
        let (mut poll, _) = PollGame::start(&setup(&["Red", "Blue"]), 0).unwrap();
        poll.vote(&uid("b"), 0).unwrap();

        let msg = poll.result_message(5);
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "game-event");
        assert_eq!(json["payload"]["gameType"], "poll");
        assert_eq!(json["payload"]["action"], "result");
        assert_eq!(json["payload"]["data"]["results"][0]["votes"], serde_json::json!(["b"]));
        assert_eq!(json["payload"]["data"]["percentages"], serde_json::json!([100, 0]));
    }
}

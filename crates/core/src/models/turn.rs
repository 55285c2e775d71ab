//! Turn model - one time-boxed speaking interval

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{Error, Result};

/// Kind of a highlighted span inside a transcription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HighlightKind {
    Claim,
    Evidence,
    CounterArgument,
    Concession,
    Question,
}

/// A highlighted `[start_index, end_index)` character span of a transcription
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SemanticHighlight {
    pub id: Uuid,
    pub text: String,
    pub kind: HighlightKind,
    pub start_index: usize,
    pub end_index: usize,
}

/// Why a turn stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TurnEndReason {
    /// Countdown reached zero
    Expired,
    /// Speaker gave up the floor
    Yielded,
    /// Moderator ended the turn early
    EndedByModerator,
    /// Moderator handed the floor to someone else
    Preempted,
    /// The whole session ended
    SessionEnded,
}

impl TurnEndReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TurnEndReason::Expired => "expired",
            TurnEndReason::Yielded => "yielded",
            TurnEndReason::EndedByModerator => "ended-by-moderator",
            TurnEndReason::Preempted => "preempted",
            TurnEndReason::SessionEnded => "session-ended",
        }
    }
}

/// A speaking interval. Immutable once `ended_at` is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Turn {
    pub id: Uuid,
    pub room_id: Uuid,
    pub speaker_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    /// Seconds between start and end, zero while the turn is open
    pub duration: u32,
    pub transcription: Option<String>,
    pub highlights: Vec<SemanticHighlight>,
}

impl Turn {
    pub fn start(room_id: Uuid, speaker_id: Uuid, started_at: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            speaker_id,
            started_at,
            ended_at: None,
            duration: 0,
            transcription: None,
            highlights: Vec::new(),
        }
    }

    pub fn is_ended(&self) -> bool {
        self.ended_at.is_some()
    }

    /// Close the turn. An end time earlier than the start is clamped to the start.
    pub fn close(&mut self, ended_at: DateTime<Utc>) -> Result<()> {
        if self.is_ended() {
            return Err(Error::Turn("Turn already ended".into()));
        }
        let ended_at = ended_at.max(self.started_at);
        self.duration = (ended_at - self.started_at).num_seconds().max(0) as u32;
        self.ended_at = Some(ended_at);
        Ok(())
    }

    /// Attach a transcription. Only allowed once the turn has ended.
    pub fn set_transcription(&mut self, text: String) -> Result<()> {
        if !self.is_ended() {
            return Err(Error::Turn("Turn is still in progress".into()));
        }
        if self.transcription.is_some() {
            return Err(Error::Turn("Turn already has a transcription".into()));
        }
        self.transcription = Some(text);
        Ok(())
    }

    /// Highlight a character span of the transcription
    pub fn add_highlight(&mut self, kind: HighlightKind, start_index: usize, end_index: usize) -> Result<&SemanticHighlight> {
        let transcription = self
            .transcription
            .as_ref()
            .ok_or_else(|| Error::Turn("Turn has no transcription".into()))?;

        let char_len = transcription.chars().count();
        if start_index >= end_index || end_index > char_len {
            return Err(Error::Turn(format!(
                "Highlight {}..{} outside transcription of {} characters",
                start_index, end_index, char_len
            )));
        }

        let text: String = transcription
            .chars()
            .skip(start_index)
            .take(end_index - start_index)
            .collect();

        self.highlights.push(SemanticHighlight {
            id: Uuid::new_v4(),
            text,
            kind,
            start_index,
            end_index,
        });
        Ok(&self.highlights[self.highlights.len() - 1])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn make_turn() -> Turn {
        Turn::start(Uuid::new_v4(), Uuid::new_v4(), Utc::now())
    }

    #[test]
    fn test_close_sets_duration() {
        let mut turn = make_turn();
        let end = turn.started_at + Duration::seconds(180);
        turn.close(end).unwrap();

        assert_eq!(turn.ended_at, Some(end));
        assert_eq!(turn.duration, 180);
        assert!(turn.ended_at.unwrap() >= turn.started_at);
    }

    #[test]
    fn test_close_is_final() {
        let mut turn = make_turn();
        let end = turn.started_at + Duration::seconds(10);
        turn.close(end).unwrap();
        assert!(turn.close(end + Duration::seconds(5)).is_err());
        assert_eq!(turn.duration, 10);
    }

    #[test]
    fn test_close_before_start_clamps() {
        let mut turn = make_turn();
        turn.close(turn.started_at - Duration::seconds(3)).unwrap();
        assert_eq!(turn.ended_at, Some(turn.started_at));
        assert_eq!(turn.duration, 0);
    }

    #[test]
    fn test_highlight_bounds() {
        let mut turn = make_turn();
        turn.close(turn.started_at + Duration::seconds(60)).unwrap();
        turn.set_transcription("Correlation is not identity.".into())
            .unwrap();

        let h = turn.add_highlight(HighlightKind::Claim, 0, 11).unwrap();
        assert_eq!(h.text, "Correlation");

        assert!(turn.add_highlight(HighlightKind::Evidence, 5, 5).is_err());
        assert!(turn.add_highlight(HighlightKind::Evidence, 20, 200).is_err());
    }

    #[test]
    fn test_transcription_requires_ended_turn() {
        let mut turn = make_turn();
        assert!(turn.set_transcription("too early".into()).is_err());
    }
}

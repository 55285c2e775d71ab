//! Audience reactions, questions and votes for a single room

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    AudienceQuestion, AudienceReaction, AudienceVote, ReactionKind, VoteSummary,
};
use crate::validation::FieldErrors;
use crate::{Error, Result};

/// Maximum question length in characters
pub const MAX_QUESTION_LEN: usize = 500;

/// Collects audience input and computes the aggregates shown to the room
#[derive(Debug, Clone)]
pub struct AudienceAggregator {
    allow_questions: bool,
    muted: bool,
    /// Each member holds at most one current reaction
    reactions: HashMap<Uuid, ReactionKind>,
    questions: Vec<AudienceQuestion>,
    /// (debater, voter) -> latest vote
    votes: HashMap<(Uuid, Uuid), AudienceVote>,
}

impl AudienceAggregator {
    pub fn new(allow_questions: bool) -> Self {
        Self {
            allow_questions,
            muted: false,
            reactions: HashMap::new(),
            questions: Vec::new(),
            votes: HashMap::new(),
        }
    }

    pub fn is_muted(&self) -> bool {
        self.muted
    }

    /// Returns false when the flag was already in the requested state
    pub fn set_muted(&mut self, muted: bool) -> bool {
        let changed = self.muted != muted;
        self.muted = muted;
        changed
    }

    /// Set or move a member's reaction. Returns false when unchanged.
    pub fn react(&mut self, user_id: Uuid, kind: ReactionKind) -> bool {
        self.reactions.insert(user_id, kind) != Some(kind)
    }

    pub fn clear_reaction(&mut self, user_id: Uuid) -> bool {
        self.reactions.remove(&user_id).is_some()
    }

    pub fn reaction_of(&self, user_id: Uuid) -> Option<ReactionKind> {
        self.reactions.get(&user_id).copied()
    }

    /// Reaction counts with largest-remainder percentages
    pub fn reactions(&self) -> Vec<AudienceReaction> {
        let counts: Vec<u32> = ReactionKind::ALL
            .iter()
            .map(|kind| self.reactions.values().filter(|k| *k == kind).count() as u32)
            .collect();
        let shares = apportion(&counts);

        ReactionKind::ALL
            .iter()
            .zip(counts.iter().zip(shares))
            .map(|(kind, (count, percentage))| AudienceReaction {
                kind: *kind,
                count: *count,
                percentage,
            })
            .collect()
    }

    pub fn total_reactions(&self) -> usize {
        self.reactions.len()
    }

    /// Queue a question for moderator review
    pub fn submit_question(
        &mut self,
        user_id: Uuid,
        username: &str,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<&AudienceQuestion> {
        if !self.allow_questions {
            return Err(Error::InvalidOperation(
                "Audience questions are disabled in this room".to_string(),
            ));
        }
        if self.muted {
            return Err(Error::InvalidOperation("The audience is muted".to_string()));
        }

        let text = text.trim();
        let mut errors = FieldErrors::new();
        if text.is_empty() {
            errors.add("question", "Question cannot be empty");
        } else if text.chars().count() > MAX_QUESTION_LEN {
            errors.add(
                "question",
                format!("Question must be at most {} characters", MAX_QUESTION_LEN),
            );
        }
        errors.into_result()?;

        self.questions.push(AudienceQuestion::new(
            user_id,
            username.to_string(),
            text.to_string(),
            now,
        ));
        Ok(&self.questions[self.questions.len() - 1])
    }

    fn question_mut(&mut self, question_id: Uuid) -> Result<&mut AudienceQuestion> {
        self.questions
            .iter_mut()
            .find(|q| q.id == question_id)
            .ok_or_else(|| Error::NotFound(format!("Question {}", question_id)))
    }

    pub fn approve_question(&mut self, question_id: Uuid) -> Result<()> {
        let question = self.question_mut(question_id)?;
        if question.is_answered {
            return Err(Error::InvalidOperation(
                "Question was already answered".to_string(),
            ));
        }
        question.is_approved = true;
        Ok(())
    }

    /// Rejected questions are dropped
    pub fn reject_question(&mut self, question_id: Uuid) -> Result<AudienceQuestion> {
        let index = self
            .questions
            .iter()
            .position(|q| q.id == question_id)
            .ok_or_else(|| Error::NotFound(format!("Question {}", question_id)))?;
        Ok(self.questions.remove(index))
    }

    pub fn mark_answered(&mut self, question_id: Uuid) -> Result<()> {
        let question = self.question_mut(question_id)?;
        if !question.is_approved {
            return Err(Error::InvalidOperation(
                "Only approved questions can be answered".to_string(),
            ));
        }
        question.is_answered = true;
        Ok(())
    }

    /// Everything, for the moderator
    pub fn questions(&self) -> &[AudienceQuestion] {
        &self.questions
    }

    /// Approved questions, the only ones the audience sees
    pub fn visible_questions(&self) -> Vec<AudienceQuestion> {
        self.questions
            .iter()
            .filter(|q| q.is_approved)
            .cloned()
            .collect()
    }

    pub fn pending_questions(&self) -> Vec<&AudienceQuestion> {
        self.questions.iter().filter(|q| q.is_pending()).collect()
    }

    /// Record a vote, replacing the voter's previous vote for that debater
    pub fn cast_vote(&mut self, voter_id: Uuid, debater_id: Uuid, vote: AudienceVote) -> Result<()> {
        if !vote.is_valid() {
            let mut errors = FieldErrors::new();
            errors.add(
                "vote",
                format!(
                    "Each rating must be between {} and {}",
                    AudienceVote::MIN,
                    AudienceVote::MAX
                ),
            );
            return errors.into_result();
        }
        self.votes.insert((debater_id, voter_id), vote);
        Ok(())
    }

    pub fn vote_summary(&self, debater_id: Uuid) -> Option<VoteSummary> {
        let votes: Vec<&AudienceVote> = self
            .votes
            .iter()
            .filter(|((debater, _), _)| *debater == debater_id)
            .map(|(_, vote)| vote)
            .collect();
        if votes.is_empty() {
            return None;
        }

        let n = votes.len() as f64;
        let mean = |f: fn(&AudienceVote) -> u8| {
            votes.iter().map(|v| f(v) as f64).sum::<f64>() / n
        };
        Some(VoteSummary {
            debater_id,
            voters: votes.len() as u32,
            clarity: mean(|v| v.clarity),
            consistency: mean(|v| v.consistency),
            impact: mean(|v| v.impact),
        })
    }

    /// Drop a departing member's reaction
    pub fn forget(&mut self, user_id: Uuid) {
        self.reactions.remove(&user_id);
    }
}

/// Largest-remainder apportionment of 100 percentage points.
/// Sums to exactly 100 when any count is non-zero, otherwise all zeros.
pub fn apportion(counts: &[u32]) -> Vec<u8> {
    let total: u64 = counts.iter().map(|c| *c as u64).sum();
    if total == 0 {
        return vec![0; counts.len()];
    }

    let mut shares: Vec<u64> = counts.iter().map(|c| *c as u64 * 100 / total).collect();
    let assigned: u64 = shares.iter().sum();

    let mut order: Vec<usize> = (0..counts.len()).collect();
    // Ties go to the earlier kind
    order.sort_by_key(|&i| std::cmp::Reverse(counts[i] as u64 * 100 % total));

    for &i in order.iter().take((100 - assigned) as usize) {
        shares[i] += 1;
    }
    shares.into_iter().map(|s| s as u8).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apportion() {
        assert_eq!(apportion(&[23, 12, 12]), vec![49, 26, 25]);
        assert_eq!(apportion(&[1, 1, 1]), vec![34, 33, 33]);
        assert_eq!(apportion(&[0, 0, 0]), vec![0, 0, 0]);
        assert_eq!(apportion(&[0, 5, 0]), vec![0, 100, 0]);
    }

    #[test]
    fn test_one_reaction_per_member() {
        let mut audience = AudienceAggregator::new(true);
        let member = Uuid::new_v4();

        assert!(audience.react(member, ReactionKind::Agreement));
        assert!(!audience.react(member, ReactionKind::Agreement));
        assert!(audience.react(member, ReactionKind::Doubt));

        let reactions = audience.reactions();
        assert_eq!(reactions[0].count, 0);
        assert_eq!(reactions[1].count, 1);
        assert_eq!(reactions[1].percentage, 100);
        assert_eq!(audience.total_reactions(), 1);
    }

    #[test]
    fn test_percentages_sum_to_100() {
        let mut audience = AudienceAggregator::new(true);
        for i in 0..7 {
            let kind = ReactionKind::ALL[i % 3];
            audience.react(Uuid::new_v4(), kind);
        }
        let sum: u32 = audience.reactions().iter().map(|r| r.percentage as u32).sum();
        assert_eq!(sum, 100);
    }

    #[test]
    fn test_question_validation() {
        let mut audience = AudienceAggregator::new(true);
        let user = Uuid::new_v4();
        let now = Utc::now();

        assert!(matches!(
            audience.submit_question(user, "ana", "   ", now),
            Err(Error::Validation(_))
        ));
        let long = "x".repeat(MAX_QUESTION_LEN + 1);
        assert!(audience.submit_question(user, "ana", &long, now).is_err());

        let exact = "x".repeat(MAX_QUESTION_LEN);
        assert!(audience.submit_question(user, "ana", &exact, now).is_ok());

        let question = audience
            .submit_question(user, "ana", "  Why?  ", now)
            .unwrap();
        assert_eq!(question.question, "Why?");
    }

    #[test]
    fn test_questions_disabled_or_muted() {
        let mut closed = AudienceAggregator::new(false);
        assert!(closed
            .submit_question(Uuid::new_v4(), "ana", "Why?", Utc::now())
            .is_err());

        let mut open = AudienceAggregator::new(true);
        open.set_muted(true);
        assert!(open
            .submit_question(Uuid::new_v4(), "ana", "Why?", Utc::now())
            .is_err());
    }

    #[test]
    fn test_only_approved_questions_are_visible() {
        let mut audience = AudienceAggregator::new(true);
        let now = Utc::now();
        let first = audience
            .submit_question(Uuid::new_v4(), "ana", "First?", now)
            .unwrap()
            .id;
        let second = audience
            .submit_question(Uuid::new_v4(), "ben", "Second?", now)
            .unwrap()
            .id;

        assert!(audience.visible_questions().is_empty());
        assert_eq!(audience.pending_questions().len(), 2);

        audience.approve_question(first).unwrap();
        audience.reject_question(second).unwrap();

        let visible = audience.visible_questions();
        assert_eq!(visible.len(), 1);
        assert_eq!(visible[0].id, first);
        assert!(audience.pending_questions().is_empty());

        audience.mark_answered(first).unwrap();
        assert!(audience.questions()[0].is_answered);
    }

    #[test]
    fn test_answer_requires_approval() {
        let mut audience = AudienceAggregator::new(true);
        let id = audience
            .submit_question(Uuid::new_v4(), "ana", "Why?", Utc::now())
            .unwrap()
            .id;
        assert!(audience.mark_answered(id).is_err());
        assert!(audience.approve_question(Uuid::new_v4()).is_err());
    }

    #[test]
    fn test_revote_replaces() {
        let mut audience = AudienceAggregator::new(true);
        let voter = Uuid::new_v4();
        let other = Uuid::new_v4();
        let debater = Uuid::new_v4();

        audience
            .cast_vote(voter, debater, AudienceVote { clarity: 1, consistency: 1, impact: 1 })
            .unwrap();
        audience
            .cast_vote(voter, debater, AudienceVote { clarity: 5, consistency: 3, impact: 4 })
            .unwrap();
        audience
            .cast_vote(other, debater, AudienceVote { clarity: 3, consistency: 3, impact: 2 })
            .unwrap();

        let summary = audience.vote_summary(debater).unwrap();
        assert_eq!(summary.voters, 2);
        assert_eq!(summary.clarity, 4.0);
        assert_eq!(summary.consistency, 3.0);
        assert_eq!(summary.impact, 3.0);

        assert!(audience
            .cast_vote(voter, debater, AudienceVote { clarity: 6, consistency: 3, impact: 4 })
            .is_err());
        assert!(audience.vote_summary(Uuid::new_v4()).is_none());
    }
}

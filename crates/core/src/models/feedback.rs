//! Evaluation and feedback models

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::TitleLevel;

/// The four scored criteria
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Criterion {
    Clarity,
    Coherence,
    Precision,
    Depth,
}

impl Criterion {
    pub const ALL: [Criterion; 4] = [
        Criterion::Clarity,
        Criterion::Coherence,
        Criterion::Precision,
        Criterion::Depth,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Criterion::Clarity => "Clarity",
            Criterion::Coherence => "Coherence",
            Criterion::Precision => "Precision",
            Criterion::Depth => "Depth",
        }
    }
}

/// Raw per-criterion scores on the 1-10 scale
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CriterionScores {
    pub clarity: f64,
    pub coherence: f64,
    pub precision: f64,
    pub depth: f64,
}

impl CriterionScores {
    pub fn get(&self, criterion: Criterion) -> f64 {
        match criterion {
            Criterion::Clarity => self.clarity,
            Criterion::Coherence => self.coherence,
            Criterion::Precision => self.precision,
            Criterion::Depth => self.depth,
        }
    }

    pub fn from_fn(mut f: impl FnMut(Criterion) -> f64) -> Self {
        Self {
            clarity: f(Criterion::Clarity),
            coherence: f(Criterion::Coherence),
            precision: f(Criterion::Precision),
            depth: f(Criterion::Depth),
        }
    }
}

/// A scored criterion with its change against the previous evaluation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CriterionScore {
    pub score: f64,
    pub previous_score: f64,
    pub change: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationCriteria {
    pub clarity: CriterionScore,
    pub coherence: CriterionScore,
    pub precision: CriterionScore,
    pub depth: CriterionScore,
    pub overall: f64,
}

impl EvaluationCriteria {
    pub fn get(&self, criterion: Criterion) -> &CriterionScore {
        match criterion {
            Criterion::Clarity => &self.clarity,
            Criterion::Coherence => &self.coherence,
            Criterion::Precision => &self.precision,
            Criterion::Depth => &self.depth,
        }
    }

    pub fn scores(&self) -> CriterionScores {
        CriterionScores::from_fn(|c| self.get(c).score)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExcerptKind {
    Strength,
    Weakness,
    Notable,
}

/// A transcript excerpt marked by an evaluator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarkedExcerpt {
    pub id: Uuid,
    pub turn_id: Uuid,
    pub text: String,
    /// Offset in seconds from the start of the turn
    pub start_time: u32,
    pub end_time: u32,
    pub kind: ExcerptKind,
    pub comment: String,
}

/// One evaluator's scoring of one debater
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JuryEvaluation {
    pub id: Uuid,
    pub room_id: Uuid,
    pub evaluator_id: Uuid,
    pub debater_id: Uuid,
    pub scores: CriterionScores,
    pub notes: String,
    pub excerpts: Vec<MarkedExcerpt>,
    pub created_at: DateTime<Utc>,
}

impl JuryEvaluation {
    pub fn new(room_id: Uuid, evaluator_id: Uuid, debater_id: Uuid, scores: CriterionScores) -> Self {
        Self {
            id: Uuid::new_v4(),
            room_id,
            evaluator_id,
            debater_id,
            scores,
            notes: String::new(),
            excerpts: Vec::new(),
            created_at: Utc::now(),
        }
    }

    pub fn with_notes(mut self, notes: String) -> Self {
        self.notes = notes;
        self
    }
}

/// Progress towards the next title in a domain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TitleProgress {
    pub domain: String,
    pub current_title: TitleLevel,
    pub next_title: Option<TitleLevel>,
    pub progress_percentage: u8,
    pub points_earned: u32,
    pub points_to_next: u32,
}

/// Feedback delivered to a debater after a room ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DebateFeedback {
    pub id: Uuid,
    pub room_id: Uuid,
    pub user_id: Uuid,
    pub summary: String,
    pub evaluation: EvaluationCriteria,
    /// Points this debate contributed to the domain title
    pub points_awarded: u32,
    pub title_progress: Option<TitleProgress>,
    pub created_at: DateTime<Utc>,
}

/// One ended debate in a user's history
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub room_id: Uuid,
    pub theme: String,
    pub position: String,
    pub tags: Vec<String>,
    pub ended_at: Option<DateTime<Utc>>,
    pub turns_count: u32,
    /// Overall score from the debate's feedback, once composed
    pub overall: Option<f64>,
    pub points_awarded: Option<u32>,
}

//! Jury evaluations and the feedback they produce
//!
//! Evaluations are accepted only once a room has ended. Feedback for a
//! debater averages every jury evaluation for that room, compares the
//! result with the debater's previous averages and converts the overall
//! score into title points for the room's domain.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::models::{
    Criterion, CriterionScore, CriterionScores, DebateFeedback, EvaluationCriteria,
    JuryEvaluation, Room, TitleLevel, TitleProgress,
};
use crate::validation::FieldErrors;
use crate::{Error, Result};

pub const MIN_SCORE: f64 = 1.0;
pub const MAX_SCORE: f64 = 10.0;
pub const MAX_NOTES_LEN: usize = 500;

/// Points needed to climb one title level
pub const POINTS_PER_LEVEL: u32 = 100;

/// Title points multiplier applied to a debate's overall score
const POINTS_PER_OVERALL: f64 = 3.0;

/// Domain used when a room carries no tags
pub const DEFAULT_DOMAIN: &str = "General";

/// Round to one decimal place
pub fn round1(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}

/// Scores live on the 1-10 scale in steps of 0.5
pub fn is_valid_score(value: f64) -> bool {
    (MIN_SCORE..=MAX_SCORE).contains(&value) && (value * 2.0).fract() == 0.0
}

/// Mean of the four criteria, rounded to one decimal
pub fn overall(scores: &CriterionScores) -> f64 {
    let sum: f64 = Criterion::ALL.iter().map(|c| scores.get(*c)).sum();
    round1(sum / Criterion::ALL.len() as f64)
}

/// Check a submitted evaluation against the room it targets
pub fn validate_evaluation(room: &Room, evaluation: &JuryEvaluation) -> Result<()> {
    if !room.is_ended() {
        return Err(Error::InvalidOperation(
            "Evaluations open once the debate has ended".to_string(),
        ));
    }
    if !room.is_debater(evaluation.debater_id) {
        return Err(Error::NotFound(format!(
            "Debater {} in room {}",
            evaluation.debater_id, room.id
        )));
    }
    if evaluation.evaluator_id == evaluation.debater_id {
        return Err(Error::PermissionDenied(
            "Debaters cannot evaluate themselves".to_string(),
        ));
    }

    let mut errors = FieldErrors::new();
    for criterion in Criterion::ALL {
        if !is_valid_score(evaluation.scores.get(criterion)) {
            errors.add(
                &criterion.label().to_lowercase(),
                "Score must be between 1 and 10 in steps of 0.5",
            );
        }
    }
    if evaluation.notes.chars().count() > MAX_NOTES_LEN {
        errors.add(
            "notes",
            format!("Notes must be at most {} characters", MAX_NOTES_LEN),
        );
    }
    errors.into_result()
}

/// Per-criterion mean across jury evaluations, `None` when there are none
pub fn aggregate(evaluations: &[JuryEvaluation]) -> Option<CriterionScores> {
    if evaluations.is_empty() {
        return None;
    }
    let n = evaluations.len() as f64;
    Some(CriterionScores::from_fn(|criterion| {
        round1(evaluations.iter().map(|e| e.scores.get(criterion)).sum::<f64>() / n)
    }))
}

fn criterion_feedback(criterion: Criterion, score: f64) -> String {
    let label = criterion.label();
    if score >= 8.0 {
        format!("{} was a clear strength in this debate.", label)
    } else if score >= 6.0 {
        format!("{} was solid, with room to sharpen.", label)
    } else {
        format!("{} needs focused work before the next debate.", label)
    }
}

/// Combine current scores with the previous averages into deltas.
/// Without history the previous score equals the current one.
pub fn build_criteria(
    current: &CriterionScores,
    previous: Option<&CriterionScores>,
) -> EvaluationCriteria {
    let score_for = |criterion: Criterion| {
        let score = current.get(criterion);
        let previous_score = previous.map(|p| p.get(criterion)).unwrap_or(score);
        CriterionScore {
            score,
            previous_score,
            change: round1(score - previous_score),
            feedback: criterion_feedback(criterion, score),
        }
    };

    EvaluationCriteria {
        clarity: score_for(Criterion::Clarity),
        coherence: score_for(Criterion::Coherence),
        precision: score_for(Criterion::Precision),
        depth: score_for(Criterion::Depth),
        overall: overall(current),
    }
}

/// Title points earned for one evaluated debate
pub fn points_for(overall: f64) -> u32 {
    (overall * POINTS_PER_OVERALL).round().max(0.0) as u32
}

/// Title standing for an accumulated point total
pub fn title_progress(domain: &str, total_points: u32) -> TitleProgress {
    let current_title = TitleLevel::from_index(total_points / POINTS_PER_LEVEL);
    let next_title = current_title.next();

    let (progress_percentage, points_earned, points_to_next) = match next_title {
        Some(_) => {
            let earned = total_points % POINTS_PER_LEVEL;
            let pct = earned * 100 / POINTS_PER_LEVEL;
            (pct as u8, earned, POINTS_PER_LEVEL - earned)
        }
        None => (100, total_points, 0),
    };

    TitleProgress {
        domain: domain.to_string(),
        current_title,
        next_title,
        progress_percentage,
        points_earned,
        points_to_next,
    }
}

/// Domain a room's points count towards
pub fn domain_of(room: &Room) -> &str {
    room.tags.first().map(String::as_str).unwrap_or(DEFAULT_DOMAIN)
}

fn summarize(criteria: &EvaluationCriteria, jurors: usize) -> String {
    let best = Criterion::ALL
        .iter()
        .copied()
        .max_by(|a, b| {
            criteria
                .get(*a)
                .score
                .total_cmp(&criteria.get(*b).score)
        })
        .unwrap_or(Criterion::Clarity);
    let weakest = Criterion::ALL
        .iter()
        .copied()
        .min_by(|a, b| {
            criteria
                .get(*a)
                .score
                .total_cmp(&criteria.get(*b).score)
        })
        .unwrap_or(Criterion::Depth);

    format!(
        "Overall {:.1} from {} evaluation{}. Strongest: {}. Focus next on {}.",
        criteria.overall,
        jurors,
        if jurors == 1 { "" } else { "s" },
        best.label().to_lowercase(),
        weakest.label().to_lowercase(),
    )
}

/// Build a debater's feedback for an ended room.
///
/// `previous` holds the debater's averages before this room and
/// `prior_points` the title points already earned in the room's domain.
pub fn compose_feedback(
    room: &Room,
    debater_id: Uuid,
    evaluations: &[JuryEvaluation],
    previous: Option<&CriterionScores>,
    prior_points: u32,
    now: DateTime<Utc>,
) -> Result<DebateFeedback> {
    if !room.is_ended() {
        return Err(Error::InvalidOperation(
            "Feedback is available once the debate has ended".to_string(),
        ));
    }

    let own: Vec<JuryEvaluation> = evaluations
        .iter()
        .filter(|e| e.room_id == room.id && e.debater_id == debater_id)
        .cloned()
        .collect();
    let current = aggregate(&own).ok_or_else(|| {
        Error::NotFound(format!("Evaluations for debater {} in room {}", debater_id, room.id))
    })?;

    let evaluation = build_criteria(&current, previous);
    let points_awarded = points_for(evaluation.overall);
    let progress = title_progress(domain_of(room), prior_points + points_awarded);

    Ok(DebateFeedback {
        id: Uuid::new_v4(),
        room_id: room.id,
        user_id: debater_id,
        summary: summarize(&evaluation, own.len()),
        evaluation,
        points_awarded,
        title_progress: Some(progress),
        created_at: now,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RoomStatus;

    fn scores(clarity: f64, coherence: f64, precision: f64, depth: f64) -> CriterionScores {
        CriterionScores {
            clarity,
            coherence,
            precision,
            depth,
        }
    }

    fn ended_room(debater: Uuid) -> Room {
        let mut room = Room::new("Is consciousness computable?".into(), Uuid::new_v4());
        room.tags = vec!["Philosophy".into()];
        room.add_debater(debater, "ana".into(), "For".into(), Utc::now())
            .unwrap();
        room.transition(RoomStatus::Live, Utc::now()).unwrap();
        room.transition(RoomStatus::Ended, Utc::now()).unwrap();
        room
    }

    #[test]
    fn test_overall_is_rounded_mean() {
        assert_eq!(overall(&scores(8.2, 7.8, 8.5, 7.5)), 8.0);
        assert_eq!(overall(&scores(10.0, 10.0, 10.0, 9.5)), 9.9);
    }

    #[test]
    fn test_score_steps() {
        assert!(is_valid_score(1.0));
        assert!(is_valid_score(7.5));
        assert!(is_valid_score(10.0));
        assert!(!is_valid_score(0.5));
        assert!(!is_valid_score(10.5));
        assert!(!is_valid_score(7.3));
    }

    #[test]
    fn test_deltas_against_previous() {
        let current = scores(8.2, 7.8, 8.5, 7.5);
        let previous = scores(7.5, 8.0, 7.8, 7.2);
        let criteria = build_criteria(&current, Some(&previous));

        assert_eq!(criteria.clarity.change, 0.7);
        assert_eq!(criteria.coherence.change, -0.2);
        assert_eq!(criteria.depth.change, 0.3);
        assert_eq!(criteria.overall, 8.0);
    }

    #[test]
    fn test_first_feedback_has_no_delta() {
        let current = scores(6.0, 6.5, 7.0, 5.0);
        let criteria = build_criteria(&current, None);
        for criterion in Criterion::ALL {
            assert_eq!(criteria.get(criterion).change, 0.0);
            assert_eq!(criteria.get(criterion).previous_score, current.get(criterion));
        }
    }

    #[test]
    fn test_title_progress() {
        let start = title_progress("Philosophy", 72);
        assert_eq!(start.current_title, TitleLevel::Novice);
        assert_eq!(start.next_title, Some(TitleLevel::Apprentice));
        assert_eq!(start.progress_percentage, 72);
        assert_eq!(start.points_to_next, 28);

        let top = title_progress("Philosophy", 450);
        assert_eq!(top.current_title, TitleLevel::Master);
        assert_eq!(top.next_title, None);
        assert_eq!(top.points_to_next, 0);
        assert_eq!(top.progress_percentage, 100);
    }

    #[test]
    fn test_points_for() {
        assert_eq!(points_for(8.0), 24);
        assert_eq!(points_for(7.5), 23);
    }

    #[test]
    fn test_validate_evaluation() {
        let debater = Uuid::new_v4();
        let room = ended_room(debater);
        let juror = Uuid::new_v4();

        let ok = JuryEvaluation::new(room.id, juror, debater, scores(8.0, 7.5, 9.0, 6.5));
        assert!(validate_evaluation(&room, &ok).is_ok());

        let bad_step = JuryEvaluation::new(room.id, juror, debater, scores(8.2, 7.5, 9.0, 6.5));
        assert!(matches!(
            validate_evaluation(&room, &bad_step),
            Err(Error::Validation(_))
        ));

        let own = JuryEvaluation::new(room.id, debater, debater, scores(8.0, 8.0, 8.0, 8.0));
        assert!(matches!(
            validate_evaluation(&room, &own),
            Err(Error::PermissionDenied(_))
        ));

        let long_notes = JuryEvaluation::new(room.id, juror, debater, scores(8.0, 8.0, 8.0, 8.0))
            .with_notes("n".repeat(MAX_NOTES_LEN + 1));
        assert!(validate_evaluation(&room, &long_notes).is_err());
    }

    #[test]
    fn test_live_room_rejects_evaluation() {
        let debater = Uuid::new_v4();
        let mut room = Room::new("Is consciousness computable?".into(), Uuid::new_v4());
        room.add_debater(debater, "ana".into(), "For".into(), Utc::now())
            .unwrap();
        room.transition(RoomStatus::Live, Utc::now()).unwrap();

        let eval = JuryEvaluation::new(room.id, Uuid::new_v4(), debater, scores(8.0, 8.0, 8.0, 8.0));
        assert!(matches!(
            validate_evaluation(&room, &eval),
            Err(Error::InvalidOperation(_))
        ));
    }

    #[test]
    fn test_compose_feedback() {
        let debater = Uuid::new_v4();
        let room = ended_room(debater);
        let evaluations = vec![
            JuryEvaluation::new(room.id, Uuid::new_v4(), debater, scores(8.0, 8.0, 9.0, 7.0)),
            JuryEvaluation::new(room.id, Uuid::new_v4(), debater, scores(8.5, 7.5, 8.0, 8.0)),
        ];

        let feedback =
            compose_feedback(&room, debater, &evaluations, None, 90, Utc::now()).unwrap();

        assert_eq!(feedback.evaluation.clarity.score, 8.3);
        assert_eq!(feedback.evaluation.depth.score, 7.5);
        assert_eq!(feedback.points_awarded, points_for(feedback.evaluation.overall));

        let progress = feedback.title_progress.unwrap();
        assert_eq!(progress.domain, "Philosophy");
        assert_eq!(progress.current_title, TitleLevel::Apprentice);
        assert!(feedback.summary.contains("2 evaluations"));
    }

    #[test]
    fn test_compose_feedback_without_evaluations() {
        let debater = Uuid::new_v4();
        let room = ended_room(debater);
        assert!(matches!(
            compose_feedback(&room, debater, &[], None, 0, Utc::now()),
            Err(Error::NotFound(_))
        ));
    }
}

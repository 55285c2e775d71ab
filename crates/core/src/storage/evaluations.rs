//! Jury evaluation and feedback storage

use rusqlite::{params, Connection, Row};
use tracing::instrument;
use uuid::Uuid;

use super::parse::{parse_datetime, parse_json, parse_uuid, OptionalExt};
use crate::error::Result;
use crate::evaluation::round1;
use crate::models::{CriterionScores, DebateFeedback, JuryEvaluation};

fn evaluation_from_row(row: &Row<'_>) -> rusqlite::Result<JuryEvaluation> {
    Ok(JuryEvaluation {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        room_id: parse_uuid(&row.get::<_, String>(1)?)?,
        evaluator_id: parse_uuid(&row.get::<_, String>(2)?)?,
        debater_id: parse_uuid(&row.get::<_, String>(3)?)?,
        scores: CriterionScores {
            clarity: row.get(4)?,
            coherence: row.get(5)?,
            precision: row.get(6)?,
            depth: row.get(7)?,
        },
        notes: row.get(8)?,
        excerpts: parse_json(&row.get::<_, String>(9)?)?,
        created_at: parse_datetime(&row.get::<_, String>(10)?)?,
    })
}

fn feedback_from_row(row: &Row<'_>) -> rusqlite::Result<DebateFeedback> {
    Ok(DebateFeedback {
        id: parse_uuid(&row.get::<_, String>(0)?)?,
        room_id: parse_uuid(&row.get::<_, String>(1)?)?,
        user_id: parse_uuid(&row.get::<_, String>(2)?)?,
        summary: row.get(3)?,
        evaluation: parse_json(&row.get::<_, String>(4)?)?,
        points_awarded: row.get(5)?,
        title_progress: row
            .get::<_, Option<String>>(6)?
            .map(|s| parse_json(&s))
            .transpose()?,
        created_at: parse_datetime(&row.get::<_, String>(7)?)?,
    })
}

pub struct EvaluationStore<'a> {
    conn: &'a Connection,
}

impl<'a> EvaluationStore<'a> {
    pub fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    /// Store an evaluation, replacing the evaluator's earlier one for the same debater
    #[instrument(skip(self, evaluation), fields(room_id = %evaluation.room_id, debater_id = %evaluation.debater_id))]
    pub fn upsert(&self, evaluation: &JuryEvaluation) -> Result<()> {
        self.conn.execute(
            "INSERT INTO jury_evaluations (id, room_id, evaluator_id, debater_id, clarity, coherence,
                                           precision, depth, notes, excerpts, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
             ON CONFLICT(room_id, evaluator_id, debater_id) DO UPDATE SET
                clarity = excluded.clarity,
                coherence = excluded.coherence,
                precision = excluded.precision,
                depth = excluded.depth,
                notes = excluded.notes,
                excerpts = excluded.excerpts,
                created_at = excluded.created_at",
            params![
                evaluation.id.to_string(),
                evaluation.room_id.to_string(),
                evaluation.evaluator_id.to_string(),
                evaluation.debater_id.to_string(),
                evaluation.scores.clarity,
                evaluation.scores.coherence,
                evaluation.scores.precision,
                evaluation.scores.depth,
                evaluation.notes,
                serde_json::to_string(&evaluation.excerpts)?,
                evaluation.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Evaluations of one debater in one room
    #[instrument(skip(self))]
    pub fn list_for_debater(&self, room_id: Uuid, debater_id: Uuid) -> Result<Vec<JuryEvaluation>> {
        let mut stmt = self.conn.prepare(
            "SELECT id, room_id, evaluator_id, debater_id, clarity, coherence, precision, depth,
                    notes, excerpts, created_at
             FROM jury_evaluations WHERE room_id = ?1 AND debater_id = ?2
             ORDER BY created_at ASC",
        )?;
        let evaluations = stmt
            .query_map(
                params![room_id.to_string(), debater_id.to_string()],
                evaluation_from_row,
            )?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(evaluations)
    }

    /// Mean criterion scores across every evaluation of a debater,
    /// optionally leaving one room out. Rounded to one decimal.
    #[instrument(skip(self))]
    pub fn averages(&self, debater_id: Uuid, excluding_room: Option<Uuid>) -> Result<Option<CriterionScores>> {
        let excluded = excluding_room.map(|id| id.to_string()).unwrap_or_default();
        let row = self.conn.query_row(
            "SELECT COUNT(*), AVG(clarity), AVG(coherence), AVG(precision), AVG(depth)
             FROM jury_evaluations WHERE debater_id = ?1 AND room_id <> ?2",
            params![debater_id.to_string(), excluded],
            |row| {
                let count: i64 = row.get(0)?;
                if count == 0 {
                    return Ok(None);
                }
                Ok(Some(CriterionScores {
                    clarity: round1(row.get(1)?),
                    coherence: round1(row.get(2)?),
                    precision: round1(row.get(3)?),
                    depth: round1(row.get(4)?),
                }))
            },
        )?;
        Ok(row)
    }

    /// Store a debater's feedback, replacing any earlier version
    #[instrument(skip(self, feedback), fields(room_id = %feedback.room_id, user_id = %feedback.user_id))]
    pub fn save_feedback(&self, feedback: &DebateFeedback) -> Result<()> {
        let title_progress = feedback
            .title_progress
            .as_ref()
            .map(serde_json::to_string)
            .transpose()?;

        self.conn.execute(
            "INSERT INTO feedback (id, room_id, user_id, summary, evaluation, overall, points_awarded,
                                   title_progress, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
             ON CONFLICT(room_id, user_id) DO UPDATE SET
                summary = excluded.summary,
                evaluation = excluded.evaluation,
                overall = excluded.overall,
                points_awarded = excluded.points_awarded,
                title_progress = excluded.title_progress,
                created_at = excluded.created_at",
            params![
                feedback.id.to_string(),
                feedback.room_id.to_string(),
                feedback.user_id.to_string(),
                feedback.summary,
                serde_json::to_string(&feedback.evaluation)?,
                feedback.evaluation.overall,
                feedback.points_awarded,
                title_progress,
                feedback.created_at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn find_feedback(&self, room_id: Uuid, user_id: Uuid) -> Result<Option<DebateFeedback>> {
        let feedback = self
            .conn
            .query_row(
                "SELECT id, room_id, user_id, summary, evaluation, points_awarded, title_progress, created_at
                 FROM feedback WHERE room_id = ?1 AND user_id = ?2",
                params![room_id.to_string(), user_id.to_string()],
                feedback_from_row,
            )
            .optional()?;
        Ok(feedback)
    }

    /// Distinct rooms in which a debater has been evaluated
    pub fn evaluated_rooms(&self, debater_id: Uuid) -> Result<u32> {
        let count: u32 = self.conn.query_row(
            "SELECT COUNT(DISTINCT room_id) FROM jury_evaluations WHERE debater_id = ?1",
            params![debater_id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::evaluation;
    use crate::models::{Room, RoomStatus, User};
    use crate::storage::Database;
    use chrono::Utc;

    fn scores(v: f64) -> CriterionScores {
        CriterionScores {
            clarity: v,
            coherence: v,
            precision: v,
            depth: v,
        }
    }

    fn ended_room(db: &Database, debater: Uuid) -> Room {
        let host = User::new(
            format!("host{}", &Uuid::new_v4().simple().to_string()[..6]),
            format!("{}@example.com", Uuid::new_v4().simple()),
            "hash".into(),
        );
        db.users().create(&host).unwrap();
        let mut room = Room::new("Should cities ban private cars?".into(), host.id);
        room.add_debater(debater, "ana".into(), "For".into(), Utc::now())
            .unwrap();
        room.transition(RoomStatus::Live, Utc::now()).unwrap();
        room.transition(RoomStatus::Ended, Utc::now()).unwrap();
        db.rooms().save(&room).unwrap();
        room
    }

    #[test]
    fn test_revised_evaluation_replaces() {
        let db = Database::open_in_memory().unwrap();
        let debater = Uuid::new_v4();
        let room = ended_room(&db, debater);
        let juror = Uuid::new_v4();

        db.evaluations()
            .upsert(&JuryEvaluation::new(room.id, juror, debater, scores(6.0)))
            .unwrap();
        db.evaluations()
            .upsert(&JuryEvaluation::new(room.id, juror, debater, scores(8.0)))
            .unwrap();

        let stored = db.evaluations().list_for_debater(room.id, debater).unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(stored[0].scores.clarity, 8.0);
    }

    #[test]
    fn test_averages_exclude_room() {
        let db = Database::open_in_memory().unwrap();
        let debater = Uuid::new_v4();
        let earlier = ended_room(&db, debater);
        let latest = ended_room(&db, debater);

        db.evaluations()
            .upsert(&JuryEvaluation::new(earlier.id, Uuid::new_v4(), debater, scores(6.0)))
            .unwrap();
        db.evaluations()
            .upsert(&JuryEvaluation::new(latest.id, Uuid::new_v4(), debater, scores(9.0)))
            .unwrap();

        let previous = db
            .evaluations()
            .averages(debater, Some(latest.id))
            .unwrap()
            .unwrap();
        assert_eq!(previous.clarity, 6.0);
        assert_eq!(db.evaluations().averages(debater, None).unwrap().unwrap().depth, 7.5);
        assert!(db.evaluations().averages(Uuid::new_v4(), None).unwrap().is_none());
        assert_eq!(db.evaluations().evaluated_rooms(debater).unwrap(), 2);
    }

    #[test]
    fn test_feedback_roundtrip() {
        let db = Database::open_in_memory().unwrap();
        let debater = Uuid::new_v4();
        let room = ended_room(&db, debater);
        let evaluations = vec![JuryEvaluation::new(room.id, Uuid::new_v4(), debater, scores(7.5))];

        let feedback =
            evaluation::compose_feedback(&room, debater, &evaluations, None, 0, Utc::now()).unwrap();
        db.evaluations().save_feedback(&feedback).unwrap();

        let stored = db.evaluations().find_feedback(room.id, debater).unwrap().unwrap();
        assert_eq!(stored.evaluation, feedback.evaluation);
        assert_eq!(stored.title_progress, feedback.title_progress);
        assert_eq!(stored.points_awarded, 23);
    }
}

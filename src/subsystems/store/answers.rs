use rusqlite::{OptionalExtension, params};
use tracing::{debug, info};

use super::quizzes::load_question;
use super::schema::now_iso8601;
use super::{AnswerOutcome, QuizStore, RoomStatus, StoreError, Submission, is_unique_violation, new_id, uuid_at};
use crate::subsystems::scoring;

impl QuizStore {
    /// Check, score and persist one answer, crediting the player's total.
    pub fn record_answer(&self, submission: &Submission) -> Result<AnswerOutcome, StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let rp_id = submission.room_player_id.to_string();
        let question_id = submission.question_id;

        let (nickname, status, room_quiz_id, pin_code) = tx
            .query_row(
                "SELECT rp.nickname, r.status, r.quiz_id, r.pin_code
                 FROM room_player rp JOIN room r ON r.room_id = rp.room_id
                 WHERE rp.room_player_id = ?1",
                params![rp_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, RoomStatus>(1)?,
                        uuid_at(row, 2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("room player", submission.room_player_id))?;

        if status != RoomStatus::Started {
            return Err(StoreError::GameNotRunning(status));
        }

        let question_quiz_id = tx
            .query_row(
                "SELECT quiz_id FROM question WHERE question_id = ?1",
                params![question_id.to_string()],
                |row| uuid_at(row, 0),
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("question", question_id))?;
        if question_quiz_id != room_quiz_id {
            return Err(StoreError::Invalid(format!(
                "question {question_id} does not belong to this room's quiz"
            )));
        }
        let question = load_question(&tx, question_id)?.ok_or_else(|| StoreError::not_found("question", question_id))?;

        let correct = scoring::is_correct(
            &question,
            submission.selected_option_id,
            submission.answer_text.as_deref(),
        );
        let points = scoring::points_for(correct, question.points_base);

        tx.execute(
            "INSERT INTO answer (answer_id, room_player_id, question_id, selected_option_id,
                                 answer_text, points_awarded, is_correct, answered_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
            params![
                new_id().to_string(),
                rp_id,
                question_id.to_string(),
                submission.selected_option_id.map(|o| o.to_string()),
                submission.answer_text,
                points,
                correct,
                now_iso8601(),
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("{nickname} already answered question {question_id}"))
            } else {
                e.into()
            }
        })?;

        let total_points: i64 = tx.query_row(
            "UPDATE room_player
             SET current_question_index = current_question_index + 1,
                 total_points = total_points + ?2
             WHERE room_player_id = ?1
             RETURNING total_points",
            params![rp_id, points],
            |row| row.get(0),
        )?;
        tx.commit()?;

        debug!(%question_id, correct, points, "answer scored");
        info!(pin = %pin_code, %nickname, total_points, "answer recorded");
        Ok(AnswerOutcome { correct, points_earned: points, total_points, nickname, pin_code })
    }
}

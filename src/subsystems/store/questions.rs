use rusqlite::params;
use tracing::info;
use uuid::Uuid;

use super::quizzes::{insert_question, load_question, quiz_exists};
use super::schema::now_iso8601;
use super::{NewQuestion, Question, QuestionSummary, QuestionUpdate, QuizStore, StoreError, uuid_at};

impl QuizStore {
    /// Append a question (with its options) to an existing quiz.
    pub fn add_question(&self, quiz_id: Uuid, question: &NewQuestion) -> Result<Question, StoreError> {
        question.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        if !quiz_exists(&tx, quiz_id)? {
            return Err(StoreError::not_found("quiz", quiz_id));
        }
        let created = insert_question(&tx, quiz_id, question, &now_iso8601())?;
        tx.commit()?;

        info!(%quiz_id, question_id = %created.question_id, "question added");
        Ok(created)
    }

    /// Questions of a quiz in play order, without options.
    pub fn list_questions(&self, quiz_id: Uuid) -> Result<Vec<QuestionSummary>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT question_id, text, type, order_index, points_base
             FROM question WHERE quiz_id = ?1
             ORDER BY order_index, rowid",
        )?;
        let rows = stmt
            .query_map(params![quiz_id.to_string()], |row| {
                Ok(QuestionSummary {
                    question_id: uuid_at(row, 0)?,
                    text: row.get(1)?,
                    kind: row.get(2)?,
                    order_index: row.get(3)?,
                    points_base: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_question(&self, question_id: Uuid) -> Result<Question, StoreError> {
        let conn = self.lock()?;
        load_question(&conn, question_id)?.ok_or_else(|| StoreError::not_found("question", question_id))
    }

    /// Overwrite text, type, order and base points. Options are left alone.
    pub fn update_question(&self, question_id: Uuid, update: &QuestionUpdate) -> Result<(), StoreError> {
        update.validate()?;

        let conn = self.lock()?;
        let changed = conn.execute(
            "UPDATE question SET text = ?2, type = ?3, order_index = ?4, points_base = ?5
             WHERE question_id = ?1",
            params![
                question_id.to_string(),
                update.text.trim(),
                update.kind,
                update.order_index,
                update.points_base,
            ],
        )?;
        if changed == 0 {
            return Err(StoreError::not_found("question", question_id));
        }
        info!(%question_id, "question updated");
        Ok(())
    }

    /// Delete a question with its options and any answers given to it.
    /// Players who answered it lose the points and the progress it earned.
    pub fn delete_question(&self, question_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id = question_id.to_string();

        let players = tx.execute(
            "UPDATE room_player
             SET total_points = total_points - (
                     SELECT a.points_awarded FROM answer a
                     WHERE a.room_player_id = room_player.room_player_id AND a.question_id = ?1),
                 current_question_index = MAX(current_question_index - 1, 0)
             WHERE room_player_id IN (SELECT room_player_id FROM answer WHERE question_id = ?1)",
            params![id],
        )?;
        let answers = tx.execute("DELETE FROM answer WHERE question_id = ?1", params![id])?;
        tx.execute("DELETE FROM question_option WHERE question_id = ?1", params![id])?;
        let removed = tx.execute("DELETE FROM question WHERE question_id = ?1", params![id])?;
        if removed == 0 {
            // Dropping `tx` rolls back.
            return Err(StoreError::not_found("question", question_id));
        }
        tx.commit()?;

        info!(%question_id, answers, players, "question deleted");
        Ok(())
    }
}

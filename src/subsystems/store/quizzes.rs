use rusqlite::{Connection, OptionalExtension, Transaction, params};
use tracing::{debug, info};
use uuid::Uuid;

use super::schema::now_iso8601;
use super::{
    NewQuestion, NewQuiz, Question, QuestionKind, QuestionOption, Quiz, QuizStore, QuizSummary,
    StoreError, new_id, uuid_at,
};

impl QuizStore {
    /// Insert a quiz with all of its questions and options in one transaction.
    pub fn create_quiz(&self, quiz: &NewQuiz) -> Result<Quiz, StoreError> {
        quiz.validate()?;

        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let quiz_id = new_id();
        let now = now_iso8601();

        tx.execute(
            "INSERT INTO quiz (quiz_id, title, description, time_per_question, allow_powerups,
                               is_published, version, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, 1, 1, ?6)",
            params![
                quiz_id.to_string(),
                quiz.title.trim(),
                quiz.description,
                quiz.time_per_question,
                quiz.allow_powerups,
                now,
            ],
        )?;

        let mut questions = Vec::with_capacity(quiz.questions.len());
        for q in &quiz.questions {
            questions.push(insert_question(&tx, quiz_id, q, &now)?);
        }
        tx.commit()?;
        questions.sort_by_key(|q| q.order_index);

        info!(%quiz_id, questions = questions.len(), "quiz created");
        Ok(Quiz {
            quiz_id,
            title: quiz.title.trim().to_string(),
            description: quiz.description.clone(),
            time_per_question: quiz.time_per_question,
            questions,
        })
    }

    /// Published quizzes, newest first.
    pub fn list_quizzes(&self) -> Result<Vec<QuizSummary>, StoreError> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(
            "SELECT quiz_id, title, description, time_per_question
             FROM quiz WHERE is_published = 1
             ORDER BY created_at DESC, rowid DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(QuizSummary {
                    quiz_id: uuid_at(row, 0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    time_per_question: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn get_quiz(&self, quiz_id: Uuid) -> Result<Quiz, StoreError> {
        let conn = self.lock()?;
        let head = conn
            .query_row(
                "SELECT title, description, time_per_question FROM quiz WHERE quiz_id = ?1",
                params![quiz_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, Option<String>>(1)?,
                        row.get::<_, u32>(2)?,
                    ))
                },
            )
            .optional()?
            .ok_or_else(|| StoreError::not_found("quiz", quiz_id))?;

        let mut stmt = conn.prepare(
            "SELECT question_id FROM question WHERE quiz_id = ?1 ORDER BY order_index, rowid",
        )?;
        let ids = stmt
            .query_map(params![quiz_id.to_string()], |row| uuid_at(row, 0))?
            .collect::<Result<Vec<_>, _>>()?;

        let mut questions = Vec::with_capacity(ids.len());
        for id in ids {
            questions.push(load_question(&conn, id)?.ok_or_else(|| StoreError::not_found("question", id))?);
        }

        Ok(Quiz {
            quiz_id,
            title: head.0,
            description: head.1,
            time_per_question: head.2,
            questions,
        })
    }

    /// Remove a quiz and everything hanging off it. Nothing is deleted when
    /// the quiz does not exist.
    pub fn delete_quiz(&self, quiz_id: Uuid) -> Result<(), StoreError> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let id = quiz_id.to_string();

        let exists = tx
            .query_row("SELECT 1 FROM quiz WHERE quiz_id = ?1", params![id], |_| Ok(()))
            .optional()?
            .is_some();
        if !exists {
            return Err(StoreError::not_found("quiz", quiz_id));
        }

        let answers = tx.execute(
            "DELETE FROM answer
             WHERE room_player_id IN (
                   SELECT rp.room_player_id FROM room_player rp
                   JOIN room r ON r.room_id = rp.room_id WHERE r.quiz_id = ?1)
                OR question_id IN (SELECT question_id FROM question WHERE quiz_id = ?1)",
            params![id],
        )?;
        tx.execute(
            "DELETE FROM leaderboard_entry
             WHERE room_id IN (SELECT room_id FROM room WHERE quiz_id = ?1)",
            params![id],
        )?;
        let players = tx.execute(
            "DELETE FROM room_player
             WHERE room_id IN (SELECT room_id FROM room WHERE quiz_id = ?1)",
            params![id],
        )?;
        let rooms = tx.execute("DELETE FROM room WHERE quiz_id = ?1", params![id])?;
        tx.execute(
            "DELETE FROM question_option
             WHERE question_id IN (SELECT question_id FROM question WHERE quiz_id = ?1)",
            params![id],
        )?;
        let questions = tx.execute("DELETE FROM question WHERE quiz_id = ?1", params![id])?;
        tx.execute("DELETE FROM quiz WHERE quiz_id = ?1", params![id])?;
        tx.commit()?;

        info!(%quiz_id, questions, rooms, players, answers, "quiz deleted");
        Ok(())
    }
}

// ── Shared helpers (also used by questions.rs) ────────────────────────────────

pub(super) fn insert_question(
    tx: &Transaction<'_>,
    quiz_id: Uuid,
    q: &NewQuestion,
    now: &str,
) -> Result<Question, StoreError> {
    let question_id = new_id();
    tx.execute(
        "INSERT INTO question (question_id, quiz_id, text, type, order_index, points_base, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            question_id.to_string(),
            quiz_id.to_string(),
            q.text.trim(),
            q.kind,
            q.order_index,
            q.points_base,
            now,
        ],
    )?;

    let mut options = Vec::with_capacity(q.options.len());
    for o in &q.options {
        let option_id = new_id();
        tx.execute(
            "INSERT INTO question_option (option_id, question_id, text, is_correct, option_index)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![option_id.to_string(), question_id.to_string(), o.text, o.is_correct, o.option_index],
        )?;
        options.push(QuestionOption {
            option_id,
            text: o.text.clone(),
            option_index: o.option_index.clone(),
            is_correct: o.is_correct,
        });
    }
    options.sort_by(|a, b| a.option_index.cmp(&b.option_index));

    debug!(%question_id, %quiz_id, options = options.len(), "question inserted");
    Ok(Question {
        question_id,
        text: q.text.trim().to_string(),
        kind: q.kind,
        order_index: q.order_index,
        points_base: q.points_base,
        options,
    })
}

pub(super) fn load_question(conn: &Connection, question_id: Uuid) -> Result<Option<Question>, StoreError> {
    let head = conn
        .query_row(
            "SELECT text, type, order_index, points_base FROM question WHERE question_id = ?1",
            params![question_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, QuestionKind>(1)?,
                    row.get::<_, i64>(2)?,
                    row.get::<_, i64>(3)?,
                ))
            },
        )
        .optional()?;
    let Some((text, kind, order_index, points_base)) = head else {
        return Ok(None);
    };

    let mut stmt = conn.prepare(
        "SELECT option_id, text, option_index, is_correct
         FROM question_option WHERE question_id = ?1
         ORDER BY option_index, rowid",
    )?;
    let options = stmt
        .query_map(params![question_id.to_string()], |row| {
            Ok(QuestionOption {
                option_id: uuid_at(row, 0)?,
                text: row.get(1)?,
                option_index: row.get(2)?,
                is_correct: row.get(3)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(Some(Question { question_id, text, kind, order_index, points_base, options }))
}

pub(super) fn quiz_exists(conn: &Connection, quiz_id: Uuid) -> Result<bool, StoreError> {
    Ok(conn
        .query_row("SELECT 1 FROM quiz WHERE quiz_id = ?1", params![quiz_id.to_string()], |_| Ok(()))
        .optional()?
        .is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::subsystems::store::NewOption;

    fn sample_quiz() -> NewQuiz {
        NewQuiz {
            title: "Capitais".into(),
            description: Some("Europa".into()),
            time_per_question: 20,
            allow_powerups: false,
            questions: vec![
                NewQuestion {
                    text: "Capital de Espanha?".into(),
                    kind: QuestionKind::Written,
                    order_index: 2,
                    points_base: 150,
                    options: vec![NewOption { text: "Madrid".into(), is_correct: true, option_index: "1".into() }],
                },
                NewQuestion {
                    text: "Capital de Portugal?".into(),
                    kind: QuestionKind::MultipleChoice,
                    order_index: 1,
                    points_base: 100,
                    options: vec![
                        NewOption { text: "Porto".into(), is_correct: false, option_index: "B".into() },
                        NewOption { text: "Lisboa".into(), is_correct: true, option_index: "A".into() },
                    ],
                },
            ],
        }
    }

    #[test]
    fn create_then_get_orders_questions_and_options() {
        let store = QuizStore::in_memory().unwrap();
        let created = store.create_quiz(&sample_quiz()).unwrap();
        let loaded = store.get_quiz(created.quiz_id).unwrap();

        assert_eq!(loaded.title, "Capitais");
        assert_eq!(loaded.questions.len(), 2);
        assert_eq!(loaded.questions[0].text, "Capital de Portugal?");
        assert_eq!(loaded.questions[0].options[0].text, "Lisboa");
        assert_eq!(loaded.questions[0].options[0].option_index, "A");
        assert_eq!(loaded.questions[1].kind, QuestionKind::Written);
    }

    #[test]
    fn invalid_quiz_writes_nothing() {
        let store = QuizStore::in_memory().unwrap();
        let mut quiz = sample_quiz();
        quiz.questions[1].options.iter_mut().for_each(|o| o.is_correct = false);
        assert!(matches!(store.create_quiz(&quiz), Err(StoreError::Invalid(_))));
        assert!(store.list_quizzes().unwrap().is_empty());
    }

    #[test]
    fn list_is_newest_first() {
        let store = QuizStore::in_memory().unwrap();
        let mut a = sample_quiz();
        a.title = "first".into();
        let mut b = sample_quiz();
        b.title = "second".into();
        store.create_quiz(&a).unwrap();
        store.create_quiz(&b).unwrap();

        let titles: Vec<_> = store.list_quizzes().unwrap().into_iter().map(|q| q.title).collect();
        assert_eq!(titles, vec!["second", "first"]);
    }

    #[test]
    fn missing_quiz_is_not_found() {
        let store = QuizStore::in_memory().unwrap();
        assert!(matches!(store.get_quiz(Uuid::new_v4()), Err(StoreError::NotFound { entity: "quiz", .. })));
        assert!(matches!(store.delete_quiz(Uuid::new_v4()), Err(StoreError::NotFound { .. })));
    }

    #[test]
    fn delete_removes_questions() {
        let store = QuizStore::in_memory().unwrap();
        let quiz = store.create_quiz(&sample_quiz()).unwrap();
        let qid = quiz.questions[0].question_id;
        store.delete_quiz(quiz.quiz_id).unwrap();
        assert!(store.get_quiz(quiz.quiz_id).is_err());
        assert!(matches!(store.get_question(qid), Err(StoreError::NotFound { .. })));
    }

    fn count(store: &QuizStore, table: &str) -> i64 {
        let conn = store.lock().unwrap();
        conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |r| r.get(0)).unwrap()
    }

    #[test]
    fn delete_clears_finished_games() {
        use crate::subsystems::store::{RoomStatus, Submission};

        let store = QuizStore::in_memory().unwrap();
        let quiz = store.create_quiz(&sample_quiz()).unwrap();
        // Another quiz's rows must survive.
        let other = store.create_quiz(&sample_quiz()).unwrap();
        store.create_room(other.quiz_id, 5, "999999").unwrap();

        store.create_room(quiz.quiz_id, 5, "123456").unwrap();
        let ana = store.join_room("123456", "ana", None).unwrap();
        store.join_room("123456", "rui", None).unwrap();
        store.set_room_status("123456", RoomStatus::Started).unwrap();
        let lisboa = quiz.questions[0].options[0].option_id;
        store
            .record_answer(&Submission {
                room_player_id: ana.room_player_id,
                question_id: quiz.questions[0].question_id,
                selected_option_id: Some(lisboa),
                answer_text: None,
            })
            .unwrap();
        store.set_room_status("123456", RoomStatus::Finished).unwrap();
        assert_eq!(count(&store, "answer"), 1);
        assert_eq!(count(&store, "leaderboard_entry"), 2);

        store.delete_quiz(quiz.quiz_id).unwrap();

        for table in ["answer", "leaderboard_entry", "room_player"] {
            assert_eq!(count(&store, table), 0, "{table}");
        }
        assert_eq!(count(&store, "room"), 1);
        assert_eq!(count(&store, "quiz"), 1);
        assert_eq!(count(&store, "question"), 2);
        assert_eq!(count(&store, "question_option"), 3);
        assert!(store.room_by_pin("999999").is_ok());
    }
}

//! Domain records and request shapes shared by the store, the HTTP layer and
//! the quiz generator. JSON field names are camelCase throughout.

use std::fmt;

use rusqlite::types::{FromSql, FromSqlError, FromSqlResult, ToSql, ToSqlOutput, ValueRef};
use serde::{Deserialize, Deserializer, Serialize};
use uuid::Uuid;

use super::StoreError;

// ── Enums ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum QuestionKind {
    #[serde(rename = "MULTIPLE_CHOICE")]
    MultipleChoice,
    #[serde(rename = "WRITTEN")]
    Written,
}

impl QuestionKind {
    pub fn as_str(self) -> &'static str {
        match self {
            QuestionKind::MultipleChoice => "MULTIPLE_CHOICE",
            QuestionKind::Written => "WRITTEN",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "MULTIPLE_CHOICE" => Some(QuestionKind::MultipleChoice),
            "WRITTEN" => Some(QuestionKind::Written),
            _ => None,
        }
    }
}

/// Room lifecycle. Only `Waiting → Started → Finished` is allowed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RoomStatus {
    Waiting,
    Started,
    Finished,
}

impl RoomStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RoomStatus::Waiting => "WAITING",
            RoomStatus::Started => "STARTED",
            RoomStatus::Finished => "FINISHED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "WAITING" => Some(RoomStatus::Waiting),
            "STARTED" => Some(RoomStatus::Started),
            "FINISHED" => Some(RoomStatus::Finished),
            _ => None,
        }
    }

    pub fn can_become(self, next: RoomStatus) -> bool {
        matches!(
            (self, next),
            (RoomStatus::Waiting, RoomStatus::Started) | (RoomStatus::Started, RoomStatus::Finished)
        )
    }
}

impl fmt::Display for RoomStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown enum value '{0}'")]
struct UnknownVariant(String);

impl ToSql for QuestionKind {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for QuestionKind {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        QuestionKind::parse(s).ok_or_else(|| FromSqlError::Other(Box::new(UnknownVariant(s.to_string()))))
    }
}

impl ToSql for RoomStatus {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(ToSqlOutput::from(self.as_str()))
    }
}

impl FromSql for RoomStatus {
    fn column_result(value: ValueRef<'_>) -> FromSqlResult<Self> {
        let s = value.as_str()?;
        RoomStatus::parse(s).ok_or_else(|| FromSqlError::Other(Box::new(UnknownVariant(s.to_string()))))
    }
}

// ── Inbound shapes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewOption {
    pub text: String,
    #[serde(default)]
    pub is_correct: bool,
    /// Display label such as `"A"` or `"1"`. Numbers are accepted and stringified.
    #[serde(deserialize_with = "string_or_number")]
    pub option_index: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuestion {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub points_base: i64,
    #[serde(default)]
    pub options: Vec<NewOption>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewQuiz {
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub time_per_question: u32,
    #[serde(default)]
    pub allow_powerups: bool,
    #[serde(default)]
    pub questions: Vec<NewQuestion>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionUpdate {
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    #[serde(default)]
    pub order_index: i64,
    #[serde(default)]
    pub points_base: i64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission {
    pub room_player_id: Uuid,
    pub question_id: Uuid,
    #[serde(default)]
    pub selected_option_id: Option<Uuid>,
    #[serde(default)]
    pub answer_text: Option<String>,
}

fn string_or_number<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Label {
        Text(String),
        Int(i64),
        Float(f64),
    }

    Ok(match Label::deserialize(deserializer)? {
        Label::Text(s) => s,
        Label::Int(n) => n.to_string(),
        Label::Float(n) => n.to_string(),
    })
}

// ── Validation ────────────────────────────────────────────────────────────────

impl NewQuiz {
    pub fn validate(&self) -> Result<(), StoreError> {
        if self.title.trim().is_empty() {
            return Err(StoreError::Invalid("quiz title must not be empty".into()));
        }
        if self.time_per_question == 0 {
            return Err(StoreError::Invalid("timePerQuestion must be positive".into()));
        }
        for (i, q) in self.questions.iter().enumerate() {
            q.validate()
                .map_err(|e| StoreError::Invalid(format!("question {}: {e}", i + 1)))?;
        }
        Ok(())
    }
}

impl NewQuestion {
    pub fn validate(&self) -> Result<(), StoreError> {
        check_question_fields(&self.text, self.points_base)?;
        if self.options.iter().any(|o| o.text.trim().is_empty()) {
            return Err(StoreError::Invalid("option text must not be empty".into()));
        }
        if !self.options.iter().any(|o| o.is_correct) {
            return Err(StoreError::Invalid("at least one option must be marked correct".into()));
        }
        if self.kind == QuestionKind::MultipleChoice && self.options.len() < 2 {
            return Err(StoreError::Invalid("multiple choice questions need at least two options".into()));
        }
        Ok(())
    }
}

impl QuestionUpdate {
    pub fn validate(&self) -> Result<(), StoreError> {
        check_question_fields(&self.text, self.points_base)
    }
}

fn check_question_fields(text: &str, points_base: i64) -> Result<(), StoreError> {
    if text.trim().is_empty() {
        return Err(StoreError::Invalid("question text must not be empty".into()));
    }
    if points_base < 0 {
        return Err(StoreError::Invalid("pointsBase must not be negative".into()));
    }
    Ok(())
}

// ── Records ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionOption {
    pub option_id: Uuid,
    pub text: String,
    pub option_index: String,
    pub is_correct: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub question_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub order_index: i64,
    pub points_base: i64,
    pub options: Vec<QuestionOption>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuestionSummary {
    pub question_id: Uuid,
    pub text: String,
    #[serde(rename = "type")]
    pub kind: QuestionKind,
    pub order_index: i64,
    pub points_base: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Quiz {
    pub quiz_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub time_per_question: u32,
    pub questions: Vec<Question>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QuizSummary {
    pub quiz_id: Uuid,
    pub title: String,
    pub description: Option<String>,
    pub time_per_question: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlayerProfile {
    pub player_id: Uuid,
    pub external_ref: String,
    pub preferred_name: String,
    pub country: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Room {
    pub room_id: Uuid,
    pub quiz_id: Uuid,
    pub pin_code: String,
    pub status: RoomStatus,
    pub max_players: u32,
    pub player_count: u32,
    pub created_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoomPlayer {
    pub room_player_id: Uuid,
    pub room_id: Uuid,
    pub player_id: Option<Uuid>,
    pub nickname: String,
    pub current_question_index: i64,
    pub total_points: i64,
    pub joined_at: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LeaderboardRow {
    pub rank: u32,
    pub room_player_id: Uuid,
    pub nickname: String,
    pub total_points: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AnswerOutcome {
    pub correct: bool,
    pub points_earned: i64,
    pub total_points: i64,
    /// Who answered: used for the room broadcast, not part of the reply.
    #[serde(skip)]
    pub nickname: String,
    #[serde(skip)]
    pub pin_code: String,
}

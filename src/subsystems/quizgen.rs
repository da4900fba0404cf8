//! Quiz drafting: asks the configured LLM for a quiz on a theme and turns
//! the reply into a [`NewQuiz`] ready for the store.

use std::sync::Arc;

use rand::Rng;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::config::QuizgenConfig;
use crate::llm::{LlmProvider, Prompt, ProviderError};
use crate::subsystems::store::NewQuiz;

const SYSTEM_PROMPT: &str = "You write quizzes for a live multiplayer game. Reply with one JSON object and nothing else.";

#[derive(Debug, thiserror::Error)]
pub enum GenerateError {
    #[error("theme must not be empty")]
    EmptyTheme,
    #[error(transparent)]
    Provider(#[from] ProviderError),
    #[error("model reply is not a quiz: {0}")]
    Malformed(String),
    #[error("generated quiz is unusable: {0}")]
    Unusable(String),
}

pub struct QuizGenerator {
    provider: Arc<LlmProvider>,
    config: QuizgenConfig,
}

impl QuizGenerator {
    pub fn new(provider: Arc<LlmProvider>, config: QuizgenConfig) -> Self {
        Self { provider, config }
    }

    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Draft a quiz about `theme`. Nothing is persisted here.
    pub async fn generate(&self, theme: &str) -> Result<NewQuiz, GenerateError> {
        let theme = theme.trim();
        if theme.is_empty() {
            return Err(GenerateError::EmptyTheme);
        }

        let count = rand::rng().random_range(self.config.min_questions..=self.config.max_questions);
        let prompt_text = build_prompt(theme, count, &self.config.language);
        info!(theme, count, provider = self.provider.name(), "drafting quiz");

        let reply = self
            .provider
            .complete(Prompt::user(&prompt_text).with_system(SYSTEM_PROMPT).json())
            .await?;
        if let Some(usage) = reply.usage {
            debug!(input_tokens = usage.input_tokens, output_tokens = usage.output_tokens, "quiz draft usage");
        }

        let mut quiz = parse_quiz(&reply.text)?;
        normalise(&mut quiz, self.config.default_time_per_question);

        if quiz.questions.is_empty() {
            warn!(title = %quiz.title, "model drafted a quiz without questions");
        }
        quiz.validate().map_err(|e| {
            warn!(error = %e, "drafted quiz failed validation");
            GenerateError::Unusable(e.to_string())
        })?;

        info!(title = %quiz.title, questions = quiz.questions.len(), "quiz drafted");
        Ok(quiz)
    }
}

fn build_prompt(theme: &str, count: u32, language: &str) -> String {
    format!(
        r#"Write a quiz about "{theme}" in {language} with exactly {count} questions.

Content rules:
1. Mix "MULTIPLE_CHOICE" and "WRITTEN" questions.
2. For "WRITTEN" the correct answer must be very short (1 to 3 words).
3. "WRITTEN" questions have exactly one option, the correct answer, with "optionIndex": "1".

Format rules:
1. Reply with valid JSON only.
2. "optionIndex" is always a quoted string ("A", "B", "1").

Required shape:
{{
  "title": "Title",
  "description": "Description",
  "timePerQuestion": 30,
  "questions": [
    {{
      "text": "Question?",
      "type": "MULTIPLE_CHOICE",
      "orderIndex": 1,
      "pointsBase": 100,
      "options": [
        {{ "text": "Option", "isCorrect": true, "optionIndex": "A" }}
      ]
    }}
  ]
}}"#
    )
}

/// Parse a model reply into a quiz. Tolerates Markdown fences and
/// PascalCase keys.
pub fn parse_quiz(reply: &str) -> Result<NewQuiz, GenerateError> {
    let body = strip_code_fences(reply);
    let value: Value = serde_json::from_str(body).map_err(|e| GenerateError::Malformed(e.to_string()))?;
    let mut value = camel_keys(value);
    if let Value::Object(map) = &mut value {
        if matches!(map.get("questions"), None | Some(Value::Null)) {
            map.insert("questions".into(), Value::Array(Vec::new()));
        }
    }
    serde_json::from_value(value).map_err(|e| GenerateError::Malformed(e.to_string()))
}

pub fn strip_code_fences(reply: &str) -> &str {
    let mut s = reply.trim();
    if let Some(rest) = s.strip_prefix("```") {
        // Drop the info string (`json`, `JSON`, ...) up to the first newline.
        s = rest.split_once('\n').map_or(rest, |(_, body)| body);
    }
    if let Some(rest) = s.trim_end().strip_suffix("```") {
        s = rest;
    }
    s.trim()
}

fn camel_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(k, v)| (lower_first(&k), camel_keys(v)))
                .collect::<Map<_, _>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(camel_keys).collect()),
        other => other,
    }
}

fn lower_first(key: &str) -> String {
    let mut chars = key.chars();
    match chars.next() {
        Some(first) => first.to_lowercase().chain(chars).collect(),
        None => String::new(),
    }
}

fn normalise(quiz: &mut NewQuiz, default_time: u32) {
    if quiz.time_per_question == 0 {
        quiz.time_per_question = default_time;
    }
    if quiz.questions.iter().all(|q| q.order_index == 0) {
        for (i, q) in quiz.questions.iter_mut().enumerate() {
            q.order_index = i as i64 + 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::llm::providers;
    use crate::subsystems::store::QuestionKind;

    fn generator() -> QuizGenerator {
        let cfg = Config::test_default();
        let provider = providers::build(&cfg.llm, None).unwrap();
        QuizGenerator::new(Arc::new(provider), cfg.quizgen)
    }

    #[test]
    fn fences_are_stripped() {
        assert_eq!(strip_code_fences("```json\n{\"a\":1}\n```"), "{\"a\":1}");
        assert_eq!(strip_code_fences("```\n{}\n```  "), "{}");
        assert_eq!(strip_code_fences("  {\"b\":2} "), "{\"b\":2}");
    }

    #[test]
    fn pascal_case_keys_are_accepted() {
        let quiz = parse_quiz(
            r#"{"Title":"T","TimePerQuestion":10,"Questions":[
                {"Text":"Q?","Type":"WRITTEN","OrderIndex":1,"PointsBase":100,
                 "Options":[{"Text":"Sim","IsCorrect":true,"OptionIndex":"1"}]}]}"#,
        )
        .unwrap();
        assert_eq!(quiz.title, "T");
        assert_eq!(quiz.questions[0].kind, QuestionKind::Written);
        assert!(quiz.questions[0].options[0].is_correct);
    }

    #[test]
    fn missing_questions_become_empty() {
        let quiz = parse_quiz(r#"{"title":"Only a title","questions":null}"#).unwrap();
        assert!(quiz.questions.is_empty());
    }

    #[test]
    fn garbage_is_malformed() {
        assert!(matches!(parse_quiz("Sorry, I can't do that."), Err(GenerateError::Malformed(_))));
    }

    #[test]
    fn normalise_fills_time_and_order() {
        let mut quiz = parse_quiz(
            r#"{"title":"T","questions":[
                {"text":"a","type":"WRITTEN","options":[{"text":"x","isCorrect":true,"optionIndex":1}]},
                {"text":"b","type":"WRITTEN","options":[{"text":"y","isCorrect":true,"optionIndex":1}]}]}"#,
        )
        .unwrap();
        normalise(&mut quiz, 25);
        assert_eq!(quiz.time_per_question, 25);
        assert_eq!(quiz.questions.iter().map(|q| q.order_index).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn prompt_mentions_count_and_language() {
        let p = build_prompt("Rios", 7, "PT-PT");
        assert!(p.contains("\"Rios\""));
        assert!(p.contains("7 questions"));
        assert!(p.contains("PT-PT"));
    }

    #[tokio::test]
    async fn dummy_provider_drafts_a_valid_quiz() {
        let quiz = generator().generate("capitais").await.unwrap();
        assert_eq!(quiz.title, "Capitais da Europa");
        assert_eq!(quiz.questions.len(), 2);
        assert_eq!(quiz.time_per_question, 20);
        assert!(quiz.validate().is_ok());
    }

    #[tokio::test]
    async fn blank_theme_is_rejected() {
        assert!(matches!(generator().generate("   ").await, Err(GenerateError::EmptyTheme)));
    }
}

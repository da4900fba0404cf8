//! Dummy LLM provider: no network.
//!
//! Plain prompts are echoed back prefixed with `[echo]`. JSON prompts get a
//! fixed two-question quiz wrapped in a Markdown fence, the way chat models
//! often answer, so the drafting pipeline can be exercised offline.

use crate::llm::{LlmResponse, Prompt, ProviderError};

/// Canned quiz returned for JSON-mode prompts.
pub const CANNED_QUIZ: &str = r#"{
  "title": "Capitais da Europa",
  "description": "Um quiz rápido sobre capitais",
  "timePerQuestion": 20,
  "questions": [
    {
      "text": "Qual é a capital de Portugal?",
      "type": "MULTIPLE_CHOICE",
      "orderIndex": 1,
      "pointsBase": 100,
      "options": [
        { "text": "Lisboa", "isCorrect": true, "optionIndex": "A" },
        { "text": "Porto", "isCorrect": false, "optionIndex": "B" },
        { "text": "Braga", "isCorrect": false, "optionIndex": "C" }
      ]
    },
    {
      "text": "Capital de França?",
      "type": "WRITTEN",
      "orderIndex": 2,
      "pointsBase": 150,
      "options": [
        { "text": "Paris", "isCorrect": true, "optionIndex": "1" }
      ]
    }
  ]
}"#;

#[derive(Debug, Clone)]
pub struct DummyProvider;

impl DummyProvider {
    pub async fn complete(&self, prompt: Prompt<'_>) -> Result<LlmResponse, ProviderError> {
        let text = if prompt.json {
            format!("```json\n{CANNED_QUIZ}\n```")
        } else {
            format!("[echo] {}", prompt.content)
        };
        Ok(LlmResponse { text, usage: None })
    }
}

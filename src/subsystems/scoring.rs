//! Answer checking and ranking.

use uuid::Uuid;

use crate::subsystems::store::{Question, QuestionKind};

/// Whether a submission answers `question` correctly.
///
/// Written answers compare against the text of the question's correct
/// option, ignoring surrounding whitespace and case. Multiple choice needs a
/// selected option that belongs to the question and is flagged correct.
pub fn is_correct(question: &Question, selected_option: Option<Uuid>, answer_text: Option<&str>) -> bool {
    match question.kind {
        QuestionKind::Written => {
            let Some(given) = answer_text else { return false };
            question
                .options
                .iter()
                .find(|o| o.is_correct)
                .is_some_and(|expected| written_matches(&expected.text, given))
        }
        QuestionKind::MultipleChoice => {
            let Some(selected) = selected_option else { return false };
            question.options.iter().any(|o| o.option_id == selected && o.is_correct)
        }
    }
}

pub fn written_matches(expected: &str, given: &str) -> bool {
    let given = given.trim();
    !given.is_empty() && expected.trim().to_lowercase() == given.to_lowercase()
}

pub fn points_for(correct: bool, points_base: i64) -> i64 {
    if correct { points_base } else { 0 }
}

/// Dense 1-based ranks for scores already sorted in descending order.
/// Equal scores share a rank; the next distinct score takes the next rank.
pub fn dense_ranks(sorted_points: &[i64]) -> Vec<u32> {
    let mut ranks = Vec::with_capacity(sorted_points.len());
    let mut rank = 0u32;
    let mut prev = None;
    for &p in sorted_points {
        if prev != Some(p) {
            rank += 1;
            prev = Some(p);
        }
        ranks.push(rank);
    }
    ranks
}

// Answer grading and accuracy analytics over submitted attempts


pub mod analytics;

pub use analytics::{AccuracyStat, AnalyticsReport, DifficultyAccuracy, TagAccuracy, aggregate};

use std::collections::{BTreeSet, HashMap};

use anyhow::{Context, Result};
use serde_json::Value;
use tracing::warn;

use crate::database::sqlite::models::Question;
use crate::questions::QuestionType;

/// Answer tokens of a MULTI question: comma-separated, trimmed, blanks ignored
fn answer_tokens(answer: &str) -> BTreeSet<&str> {
    answer
        .split(',')
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .collect()
}

/// Whether `submitted` answers a question of `question_type` whose canonical
/// answer is `canonical`
#[inline]
pub fn is_correct(question_type: QuestionType, canonical: &str, submitted: &str) -> bool {
    match question_type {
        QuestionType::Single | QuestionType::TrueFalse => {
            submitted.to_lowercase() == canonical.to_lowercase()
        }
        QuestionType::Multi => answer_tokens(submitted) == answer_tokens(canonical),
        QuestionType::ShortAnswer => !submitted.trim().is_empty(),
    }
}

/// Submission for one question; an unanswered question counts as blank
#[inline]
pub fn submitted_answer<'a>(answers: &'a HashMap<String, String>, question_id: i64) -> &'a str {
    answers
        .get(&question_id.to_string())
        .map_or("", String::as_str)
}

/// Fraction of `questions` answered correctly, 0 for an empty quiz
#[inline]
pub fn grade(questions: &[Question], answers: &HashMap<String, String>) -> f64 {
    if questions.is_empty() {
        return 0.0;
    }

    let correct = questions
        .iter()
        .filter(|question| {
            is_correct(
                question.question_type,
                &question.answer,
                submitted_answer(answers, question.id),
            )
        })
        .count();

    correct as f64 / questions.len() as f64
}

#[inline]
pub fn encode_answers(answers: &HashMap<String, String>) -> Result<String> {
    serde_json::to_string(answers).context("Failed to serialize answers")
}

/// Decode a stored answer mapping. Non-string values are stringified and
/// unreadable input decodes to an empty mapping.
#[inline]
pub fn decode_answers(json: &str) -> HashMap<String, String> {
    match serde_json::from_str::<Value>(json) {
        Ok(Value::Object(map)) => map
            .into_iter()
            .filter_map(|(key, value)| match value {
                Value::String(answer) => Some((key, answer)),
                Value::Null => None,
                other => Some((key, other.to_string())),
            })
            .collect(),
        Ok(_) => {
            warn!("Stored answers are not a JSON object");
            HashMap::new()
        }
        Err(e) => {
            warn!("Failed to parse stored answers: {}", e);
            HashMap::new()
        }
    }
}

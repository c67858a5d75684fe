use std::collections::HashSet;

use tracing::warn;

use super::heuristics::{FALSE_LABEL, TRUE_LABEL};
use super::validation::letter_index;
use super::{GeneratedQuestionDraft, QuestionType};

const NEUTRAL_SCORE: u8 = 50;

/// Additive 0-100 confidence heuristic. Never fails: a computation that
/// cannot complete yields the neutral score.
#[inline]
pub fn score_question(question: &GeneratedQuestionDraft) -> u8 {
    compute(question).map_or_else(
        || {
            warn!("Quality score could not be computed, using neutral score");
            NEUTRAL_SCORE
        },
        |score| u8::try_from(score.clamp(0, 100)).unwrap_or(NEUTRAL_SCORE),
    )
}

fn compute(question: &GeneratedQuestionDraft) -> Option<i64> {
    let mut score: i64 = 0;

    let stem_chars = question.stem.chars().count();
    if (12..=180).contains(&stem_chars) {
        score = score.checked_add(20)?;
    } else if stem_chars >= 8 {
        score = score.checked_add(10)?;
    }

    let distinct_options = question.options.iter().collect::<HashSet<_>>().len();
    if distinct_options >= 4 {
        score = score.checked_add(30)?;
    } else if distinct_options >= 3 {
        score = score.checked_add(15)?;
    }

    let type_points = match question.question_type {
        QuestionType::TrueFalse => {
            let mut points = 0;
            let has = |label: &str| question.options.iter().any(|o| o == label);
            if has(TRUE_LABEL) && has(FALSE_LABEL) {
                points += 20;
            }
            if question.answer == TRUE_LABEL || question.answer == FALSE_LABEL {
                points += 20;
            }
            points
        }
        QuestionType::Multi => {
            let valid_refs = question
                .answer
                .split([',', '，', ';', ' '])
                .map(str::trim)
                .filter_map(letter_index)
                .filter(|index| *index < question.options.len())
                .count();
            let valid_refs = i64::try_from(valid_refs).ok()?;
            let mut points = valid_refs.checked_mul(15)?.min(30);
            if valid_refs >= 2 {
                points += 10;
            }
            points
        }
        QuestionType::Single | QuestionType::ShortAnswer => {
            if question.options.contains(&question.answer) {
                30
            } else if !question.answer.trim().is_empty() {
                10
            } else {
                0
            }
        }
    };

    score.checked_add(type_points)
}

use std::collections::{BTreeMap, HashMap};

use serde::Serialize;
use tracing::debug;

use super::{is_correct, submitted_answer};
use crate::database::sqlite::models::{Attempt, Question};
use crate::questions::Difficulty;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct AccuracyStat {
    pub correct: u64,
    pub total: u64,
}

impl AccuracyStat {
    #[inline]
    pub fn accuracy(self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.correct as f64 / self.total as f64
        }
    }

    fn record(&mut self, correct: bool) {
        self.total += 1;
        if correct {
            self.correct += 1;
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagAccuracy {
    pub tag: String,
    pub correct: u64,
    pub total: u64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DifficultyAccuracy {
    pub difficulty: Difficulty,
    pub correct: u64,
    pub total: u64,
    pub accuracy: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyticsReport {
    /// Highest accuracy first, ties by tag name
    pub tags: Vec<TagAccuracy>,
    /// Always EASY, MEDIUM, HARD in that order
    pub difficulty: Vec<DifficultyAccuracy>,
}

/// Accumulate per-tag and per-difficulty accuracy across `attempts`.
///
/// Only objective questions with at least one knowledge tag are counted.
/// Attempts whose quiz has no entry in `questions_by_quiz` contribute nothing.
#[inline]
pub fn aggregate(
    attempts: &[Attempt],
    questions_by_quiz: &HashMap<i64, Vec<Question>>,
) -> AnalyticsReport {
    let mut by_tag: BTreeMap<String, AccuracyStat> = BTreeMap::new();
    let mut by_difficulty: HashMap<Difficulty, AccuracyStat> = HashMap::new();

    for attempt in attempts {
        let Some(questions) = questions_by_quiz.get(&attempt.quiz_id) else {
            debug!("No questions loaded for quiz {}", attempt.quiz_id);
            continue;
        };
        let answers = attempt.answers();

        for question in questions {
            let tags = question.tags();
            if tags.is_empty() || !question.question_type.is_objective() {
                continue;
            }

            let correct = is_correct(
                question.question_type,
                &question.answer,
                submitted_answer(&answers, question.id),
            );

            for tag in tags {
                by_tag.entry(tag.to_string()).or_default().record(correct);
            }
            by_difficulty
                .entry(question.difficulty)
                .or_default()
                .record(correct);
        }
    }

    let mut tags: Vec<TagAccuracy> = by_tag
        .into_iter()
        .map(|(tag, stat)| TagAccuracy {
            tag,
            correct: stat.correct,
            total: stat.total,
            accuracy: stat.accuracy(),
        })
        .collect();
    tags.sort_by(|a, b| b.accuracy.total_cmp(&a.accuracy));

    let difficulty = Difficulty::ALL
        .iter()
        .map(|&difficulty| {
            let stat = by_difficulty.get(&difficulty).copied().unwrap_or_default();
            DifficultyAccuracy {
                difficulty,
                correct: stat.correct,
                total: stat.total,
                accuracy: stat.accuracy(),
            }
        })
        .collect();

    AnalyticsReport { tags, difficulty }
}

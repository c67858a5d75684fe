// Question drafting: model-backed or heuristic generation, validation,
// type adaptation and quality scoring


pub mod generator;
pub mod heuristics;
pub mod quality;
pub mod validation;

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::database::sqlite::models::Fragment;

pub use generator::{DraftOverrides, GenerationModel, QuestionGenerator, ScoredDraft};
pub use quality::score_question;
pub use validation::{RawQuestion, adapt_type, validate};

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestionType {
    #[default]
    Single,
    Multi,
    TrueFalse,
    ShortAnswer,
}

impl QuestionType {
    /// Interpret a caller-supplied type hint. Unrecognized hints mean SINGLE.
    #[inline]
    pub fn from_hint(hint: &str) -> Self {
        hint.parse().unwrap_or_default()
    }

    /// Types graded against a canonical answer
    #[inline]
    pub fn is_objective(self) -> bool {
        matches!(self, Self::Single | Self::Multi | Self::TrueFalse)
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Single => "SINGLE",
            Self::Multi => "MULTI",
            Self::TrueFalse => "TRUE_FALSE",
            Self::ShortAnswer => "SHORT_ANSWER",
        }
    }
}

impl fmt::Display for QuestionType {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for QuestionType {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().replace('-', "_").as_str() {
            "SINGLE" => Ok(Self::Single),
            "MULTI" => Ok(Self::Multi),
            "TRUE_FALSE" => Ok(Self::TrueFalse),
            "SHORT_ANSWER" => Ok(Self::ShortAnswer),
            other => Err(format!("unknown question type: {}", other)),
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, sqlx::Type,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[sqlx(type_name = "TEXT", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Difficulty {
    Easy,
    #[default]
    Medium,
    Hard,
}

impl Difficulty {
    pub const ALL: [Self; 3] = [Self::Easy, Self::Medium, Self::Hard];

    /// Uppercased exact match, MEDIUM for anything else
    #[inline]
    pub fn normalize(raw: &str) -> Self {
        match raw.trim().to_uppercase().as_str() {
            "EASY" => Self::Easy,
            "HARD" => Self::Hard,
            _ => Self::Medium,
        }
    }

    /// How many options a MULTI question marks as correct
    #[inline]
    pub fn multi_correct_count(self) -> usize {
        match self {
            Self::Easy => 1,
            Self::Medium => 2,
            Self::Hard => 3,
        }
    }

    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Easy => "EASY",
            Self::Medium => "MEDIUM",
            Self::Hard => "HARD",
        }
    }
}

impl fmt::Display for Difficulty {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Difficulty {
    type Err = String;

    #[inline]
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "EASY" => Ok(Self::Easy),
            "MEDIUM" => Ok(Self::Medium),
            "HARD" => Ok(Self::Hard),
            other => Err(format!("unknown difficulty: {}", other)),
        }
    }
}

/// An unpersisted question on its way through validation and adaptation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GeneratedQuestionDraft {
    pub question_type: QuestionType,
    pub stem: String,
    pub options: Vec<String>,
    pub answer: String,
    pub difficulty: Difficulty,
    pub tags: Vec<String>,
    pub source_fragment_id: Option<i64>,
}

/// The fragment text a question is drafted from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceFragment<'a> {
    pub id: Option<i64>,
    pub text: &'a str,
}

impl<'a> SourceFragment<'a> {
    #[inline]
    pub fn new(id: Option<i64>, text: &'a str) -> Self {
        Self { id, text }
    }

    /// Source without a stored fragment behind it
    #[inline]
    pub fn text(text: &'a str) -> Self {
        Self { id: None, text }
    }
}

impl<'a> From<&'a Fragment> for SourceFragment<'a> {
    #[inline]
    fn from(fragment: &'a Fragment) -> Self {
        Self {
            id: Some(fragment.id),
            text: &fragment.text,
        }
    }
}

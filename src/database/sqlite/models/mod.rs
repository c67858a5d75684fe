#[cfg(test)]
mod tests;

use std::collections::HashMap;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use sqlx::{FromRow, Type};
use tracing::warn;

use crate::embeddings::decode_embedding;
use crate::questions::{Difficulty, QuestionType};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Document {
    pub id: i64,
    pub title: String,
    pub source_path: Option<String>,
    pub page_count: i64,
    pub status: DocumentStatus,
    pub error_message: Option<String>,
    pub created_date: NaiveDateTime,
    pub updated_date: NaiveDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(type_name = "TEXT", rename_all = "lowercase")]
pub enum DocumentStatus {
    Uploaded,
    Parsing,
    Embedding,
    Done,
    Failed,
}

impl DocumentStatus {
    #[inline]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Uploaded => "uploaded",
            Self::Parsing => "parsing",
            Self::Embedding => "embedding",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }
}

impl std::fmt::Display for DocumentStatus {
    #[inline]
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match *self {
            DocumentStatus::Uploaded => write!(f, "Uploaded"),
            DocumentStatus::Parsing => write!(f, "Parsing"),
            DocumentStatus::Embedding => write!(f, "Embedding"),
            DocumentStatus::Done => write!(f, "Done"),
            DocumentStatus::Failed => write!(f, "Failed"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewDocument {
    pub title: String,
    pub source_path: Option<String>,
    pub page_count: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Fragment {
    pub id: i64,
    pub document_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub section_path: Option<String>,
    pub page_range: Option<String>,
    pub keywords: Option<String>,
    pub embedding_json: Option<String>,
    pub created_date: NaiveDateTime,
}

impl Fragment {
    /// Stored embedding, empty when the fragment has not been embedded
    #[inline]
    pub fn embedding(&self) -> Vec<f32> {
        self.embedding_json
            .as_deref()
            .map(decode_embedding)
            .unwrap_or_default()
    }

    #[inline]
    pub fn is_embedded(&self) -> bool {
        self.embedding_json.is_some()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewFragment {
    pub document_id: i64,
    pub chunk_index: i64,
    pub text: String,
    pub section_path: Option<String>,
    pub page_range: Option<String>,
    pub keywords: Option<String>,
}

/// Outcome of swapping a document's fragments
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplacedFragments {
    /// Previous fragments deleted
    pub removed: u64,
    /// New fragments in input order
    pub fragments: Vec<Fragment>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Quiz {
    pub id: i64,
    pub title: String,
    pub created_date: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, FromRow)]
pub struct Question {
    pub id: i64,
    pub quiz_id: i64,
    pub question_type: QuestionType,
    pub stem: String,
    pub options_json: String,
    pub answer: String,
    pub difficulty: Difficulty,
    pub knowledge_tags: String,
    pub fragment_id: Option<i64>,
    pub quality_score: i64,
    pub created_date: NaiveDateTime,
}

impl Question {
    #[inline]
    pub fn options(&self) -> Vec<String> {
        serde_json::from_str(&self.options_json).unwrap_or_else(|e| {
            warn!("Question {} has unreadable options: {}", self.id, e);
            Vec::new()
        })
    }

    /// Comma-separated tags, trimmed, blanks dropped
    #[inline]
    pub fn tags(&self) -> Vec<&str> {
        self.knowledge_tags
            .split(',')
            .map(str::trim)
            .filter(|tag| !tag.is_empty())
            .collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewQuestion {
    pub quiz_id: i64,
    pub question_type: QuestionType,
    pub stem: String,
    pub options: Vec<String>,
    pub answer: String,
    pub difficulty: Difficulty,
    pub knowledge_tags: Vec<String>,
    pub fragment_id: Option<i64>,
    pub quality_score: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, FromRow)]
pub struct Attempt {
    pub id: i64,
    pub quiz_id: i64,
    pub user_id: String,
    pub answers_json: Option<String>,
    pub score: Option<f64>,
    pub created_date: NaiveDateTime,
    pub submitted_date: Option<NaiveDateTime>,
}

impl Attempt {
    /// Submitted answers keyed by question id, empty when unsubmitted or unreadable
    #[inline]
    pub fn answers(&self) -> HashMap<String, String> {
        self.answers_json
            .as_deref()
            .map(crate::grading::decode_answers)
            .unwrap_or_default()
    }

    #[inline]
    pub fn is_submitted(&self) -> bool {
        self.submitted_date.is_some()
    }
}

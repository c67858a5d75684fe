use itertools::Itertools;
use serde_json::Value;
use tracing::debug;

use super::heuristics::{
    FALSE_LABEL, OPTION_ELLIPSIS, PLACEHOLDER_OPTIONS, SINGLE_STEM_PREFIX, TRUE_FALSE_STEM_PREFIX,
    TRUE_LABEL, build_fallback_options, derive_statement, fallback_tags, preview,
};
use super::{Difficulty, GeneratedQuestionDraft, QuestionType, SourceFragment};

const OPTION_COUNT: usize = 4;

/// Generator output before validation. Every field may be missing or malformed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawQuestion {
    pub question_type: String,
    pub stem: String,
    pub options: Vec<String>,
    pub answer: String,
    pub difficulty: String,
    pub tags: Vec<String>,
}

impl RawQuestion {
    /// Read the fields the generation prompt asks for from any JSON object,
    /// tolerating absent fields and non-string scalars
    #[inline]
    pub fn from_json(value: &Value) -> Self {
        Self {
            question_type: scalar_text(value.get("type")),
            stem: scalar_text(value.get("stem")),
            options: text_list(value.get("options")),
            answer: scalar_text(value.get("answer")),
            difficulty: scalar_text(value.get("difficulty")),
            tags: text_list(value.get("knowledgeTags")),
        }
    }
}

fn scalar_text(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}

fn text_list(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::Array(items)) => items.iter().map(|item| scalar_text(Some(item))).collect(),
        _ => Vec::new(),
    }
}

/// Repair a generator's output into a well-formed single-choice draft.
///
/// The result always has exactly four distinct options, its answer is one
/// of them, and stem, difficulty and tags are populated.
#[inline]
pub fn validate(raw: RawQuestion, source: SourceFragment<'_>) -> GeneratedQuestionDraft {
    let mut options: Vec<String> = raw
        .options
        .into_iter()
        .filter(|option| !option.trim().is_empty())
        .unique()
        .collect();

    if options.len() < OPTION_COUNT {
        debug!(
            "Draft has {} usable options, rebuilding from fragment",
            options.len()
        );
        options = build_fallback_options(source.text);
    }
    if options.is_empty() {
        options = PLACEHOLDER_OPTIONS.iter().map(ToString::to_string).collect();
    }
    options.truncate(OPTION_COUNT);

    let answer = if !raw.answer.trim().is_empty() && options.contains(&raw.answer) {
        raw.answer
    } else {
        options[0].clone()
    };

    let stem = if raw.stem.trim().is_empty() {
        format!("{}{}", SINGLE_STEM_PREFIX, preview(source.text))
    } else {
        raw.stem
    };

    let tags: Vec<String> = raw
        .tags
        .iter()
        .map(|tag| tag.trim())
        .filter(|tag| !tag.is_empty())
        .unique()
        .map(str::to_string)
        .collect();
    let tags = if tags.is_empty() {
        fallback_tags(source.text)
    } else {
        tags
    };

    GeneratedQuestionDraft {
        question_type: QuestionType::Single,
        stem,
        options,
        answer,
        difficulty: Difficulty::normalize(&raw.difficulty),
        tags,
        source_fragment_id: source.id,
    }
}

fn without_ellipsis(text: &str) -> String {
    text.replace(OPTION_ELLIPSIS, "")
}

/// Whether `text`, minus any truncation marker, appears verbatim in the source
fn grounded_in(text: &str, source_text: &str) -> bool {
    let reference = without_ellipsis(text);
    !reference.trim().is_empty() && source_text.contains(&reference)
}

/// Reshape a validated single-choice draft into the requested type
#[inline]
pub fn adapt_type(
    mut draft: GeneratedQuestionDraft,
    hint: Option<QuestionType>,
    source_text: &str,
) -> GeneratedQuestionDraft {
    match hint {
        Some(QuestionType::TrueFalse) => {
            let holds = grounded_in(&draft.answer, source_text);
            draft.question_type = QuestionType::TrueFalse;
            draft.options = vec![TRUE_LABEL.to_string(), FALSE_LABEL.to_string()];
            draft.answer = if holds { TRUE_LABEL } else { FALSE_LABEL }.to_string();
            if draft.stem.trim().is_empty() {
                draft.stem = format!(
                    "{}{}",
                    TRUE_FALSE_STEM_PREFIX,
                    derive_statement(source_text)
                );
            }
        }
        Some(QuestionType::Multi) => {
            if draft.options.len() < OPTION_COUNT {
                let rebuilt = build_fallback_options(source_text);
                if !rebuilt.is_empty() {
                    draft.options = rebuilt;
                }
            }

            let desired = draft
                .difficulty
                .multi_correct_count()
                .min(draft.options.len());

            let grounded = draft
                .options
                .iter()
                .positions(|option| grounded_in(option, source_text));
            let chosen: Vec<usize> = grounded
                .chain(0..draft.options.len())
                .unique()
                .take(desired)
                .collect();

            draft.question_type = QuestionType::Multi;
            draft.answer = chosen.into_iter().map(option_letter).join(",");
        }
        Some(QuestionType::Single | QuestionType::ShortAnswer) | None => {
            draft.question_type = QuestionType::Single;
        }
    }

    draft
}

/// `A` for index 0, `B` for 1, and so on
#[inline]
pub fn option_letter(index: usize) -> char {
    u8::try_from(index)
        .ok()
        .and_then(|i| b'A'.checked_add(i))
        .map_or('?', char::from)
}

/// Option index referenced by a single uppercase letter
#[inline]
pub fn letter_index(token: &str) -> Option<usize> {
    let mut chars = token.chars();
    match (chars.next(), chars.next()) {
        (Some(letter @ 'A'..='Z'), None) => Some(letter as usize - 'A' as usize),
        _ => None,
    }
}

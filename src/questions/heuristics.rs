//! Deterministic text heuristics behind the model-free question path.

use std::sync::LazyLock;

use fancy_regex::{Captures, Regex};
use itertools::Itertools;

use super::validation::RawQuestion;
use super::{Difficulty, QuestionType, SourceFragment};

pub const TRUE_LABEL: &str = "正确";
pub const FALSE_LABEL: &str = "错误";
pub const PLACEHOLDER_OPTIONS: [&str; 4] = ["选项A", "选项B", "选项C", "选项D"];

pub const SINGLE_STEM_PREFIX: &str = "阅读以下片段，选择最符合片段主要内容的选项:\n";
pub const HEURISTIC_STEM_PREFIX: &str = "根据片段内容选择最符合的陈述:\n";
pub const TRUE_FALSE_STEM_PREFIX: &str = "判断以下陈述是否正确:\n";

/// Marker appended to shortened options
pub const OPTION_ELLIPSIS: &str = "…";
const PREVIEW_ELLIPSIS: &str = "...";

const OPTION_MAX_CHARS: usize = 30;
const PREVIEW_MAX_CHARS: usize = 180;
const SUBSTANTIAL_SENTENCE_CHARS: usize = 8;
const TAG_MIN_CHARS: usize = 4;
const TAG_MAX_CHARS: usize = 8;
const MAX_FALLBACK_TAGS: usize = 3;

const SENTENCE_TERMINATORS: &[char] = &['。', '！', '？', '.', '!', '?'];
const CLAUSE_DELIMITERS: &[char] = &['，', '。', '；', ',', ';'];

const ANTONYM_PAIRS: &[(&str, &str)] = &[
    ("必须", "可以"),
    ("应当", "不应"),
    ("禁止", "允许"),
    ("加强", "削弱"),
    ("提高", "降低"),
    ("促进", "限制"),
    ("must", "may"),
    ("prohibit", "permit"),
    ("increase", "decrease"),
    ("strengthen", "weaken"),
    ("always", "never"),
];

static ANTONYM_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    let alternatives = ANTONYM_PAIRS
        .iter()
        .flat_map(|(a, b)| [*a, *b])
        .map(|word| {
            if word.is_ascii() {
                format!(r"\b{}\b", word)
            } else {
                word.to_string()
            }
        })
        .join("|");
    Regex::new(&format!("(?i)(?:{})", alternatives)).expect("valid regex")
});

/// Collapse every whitespace run to a single space
#[inline]
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().join(" ")
}

/// Sentences split on CJK and ASCII terminators, trimmed, blanks dropped
#[inline]
pub fn split_sentences(text: &str) -> Vec<String> {
    collapse_whitespace(text)
        .split(SENTENCE_TERMINATORS)
        .map(str::trim)
        .filter(|sentence| !sentence.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncate to the option length budget, marking the cut with `…`
#[inline]
pub fn shorten(text: &str) -> String {
    truncate_chars(text, OPTION_MAX_CHARS, OPTION_ELLIPSIS)
}

/// Whitespace-collapsed fragment text, truncated for quoting in a stem or prompt
#[inline]
pub fn preview(text: &str) -> String {
    truncate_chars(&collapse_whitespace(text), PREVIEW_MAX_CHARS, PREVIEW_ELLIPSIS)
}

fn truncate_chars(text: &str, max_chars: usize, marker: &str) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}{}", &text[..cut], marker),
        None => text.to_string(),
    }
}

/// Swap every known antonym for its partner, in both directions
#[inline]
pub fn flip_polarity(text: &str) -> String {
    ANTONYM_PATTERN
        .replace_all(text, |caps: &Captures<'_>| {
            let matched = caps.get(0).map_or("", |m| m.as_str());
            let replacement = antonym_of(matched).unwrap_or(matched);
            match_case(matched, replacement)
        })
        .into_owned()
}

fn antonym_of(word: &str) -> Option<&'static str> {
    let lowered = word.to_lowercase();
    ANTONYM_PAIRS.iter().find_map(|(a, b)| {
        if *a == lowered {
            Some(*b)
        } else if *b == lowered {
            Some(*a)
        } else {
            None
        }
    })
}

fn match_case(original: &str, replacement: &str) -> String {
    if original.chars().next().is_some_and(char::is_uppercase) {
        let mut chars = replacement.chars();
        chars
            .next()
            .map(|first| first.to_uppercase().chain(chars).collect())
            .unwrap_or_default()
    } else {
        replacement.to_string()
    }
}

/// The first sentence long enough to carry a statement, else the preview
#[inline]
pub fn main_statement(text: &str) -> String {
    split_sentences(text)
        .into_iter()
        .find(|sentence| sentence.chars().count() >= SUBSTANTIAL_SENTENCE_CHARS)
        .unwrap_or_else(|| preview(text))
}

/// Statement judged by a TRUE_FALSE question
#[inline]
pub fn derive_statement(text: &str) -> String {
    shorten(&main_statement(text))
}

/// Four distinct options led by the fragment's main statement, or none for blank text
#[inline]
pub fn build_fallback_options(text: &str) -> Vec<String> {
    let main = main_statement(text);
    if main.trim().is_empty() {
        return Vec::new();
    }

    let sentences = split_sentences(text);
    let third = sentences.get(1).map_or_else(
        || shorten(&flip_polarity(&format!("{}内容", main))),
        |s| shorten(s),
    );
    let fourth = sentences.get(2).map_or_else(
        || shorten(&flip_polarity(&format!("{}目标", main))),
        |s| shorten(s),
    );

    let mut options: Vec<String> = [shorten(&main), shorten(&flip_polarity(&main)), third, fourth]
        .into_iter()
        .filter(|option| !option.trim().is_empty())
        .unique()
        .collect();

    for placeholder in PLACEHOLDER_OPTIONS {
        if options.len() >= PLACEHOLDER_OPTIONS.len() {
            break;
        }
        if !options.iter().any(|option| option == placeholder) {
            options.push(placeholder.to_string());
        }
    }

    options
}

/// Up to three distinct leading clauses of the text, each cut to eight characters
#[inline]
pub fn fallback_tags(text: &str) -> Vec<String> {
    collapse_whitespace(text)
        .split(CLAUSE_DELIMITERS)
        .map(str::trim)
        .filter(|clause| clause.chars().count() >= TAG_MIN_CHARS)
        .map(|clause| clause.chars().take(TAG_MAX_CHARS).collect::<String>())
        .unique()
        .take(MAX_FALLBACK_TAGS)
        .collect()
}

/// Single-choice draft built without any model
#[inline]
pub fn heuristic_question(source: SourceFragment<'_>) -> RawQuestion {
    let options = build_fallback_options(source.text);
    RawQuestion {
        question_type: QuestionType::Single.to_string(),
        stem: format!("{}{}", HEURISTIC_STEM_PREFIX, preview(source.text)),
        answer: options.first().cloned().unwrap_or_default(),
        options,
        difficulty: Difficulty::Medium.to_string(),
        tags: fallback_tags(source.text),
    }
}

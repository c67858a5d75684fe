use anyhow::{Context, Result};
use serde_json::Value;
use tracing::{debug, info, warn};

use super::heuristics::{heuristic_question, preview};
use super::quality::score_question;
use super::validation::{RawQuestion, adapt_type, validate};
use super::{Difficulty, GeneratedQuestionDraft, QuestionType, SourceFragment};
use crate::config::Config;
use crate::embeddings::OllamaClient;

/// Text completion capability backing model-generated questions
pub trait GenerationModel: Send + Sync {
    fn complete(&self, prompt: &str) -> Result<String>;
}

impl GenerationModel for OllamaClient {
    #[inline]
    fn complete(&self, prompt: &str) -> Result<String> {
        self.generate(prompt)
    }
}

/// Caller overrides applied after validation and before type adaptation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DraftOverrides {
    pub question_type: Option<QuestionType>,
    pub difficulty: Option<Difficulty>,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoredDraft {
    pub draft: GeneratedQuestionDraft,
    pub quality_score: u8,
}

pub struct QuestionGenerator {
    model: Option<Box<dyn GenerationModel>>,
}

impl QuestionGenerator {
    #[inline]
    pub fn new(model: Option<Box<dyn GenerationModel>>) -> Self {
        Self { model }
    }

    /// Generator that never calls a model
    #[inline]
    pub fn heuristic() -> Self {
        Self::new(None)
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        if !config.ollama.generation_configured() {
            info!("No generation model configured, questions will be drafted heuristically");
            return Ok(Self::heuristic());
        }

        let client = OllamaClient::new(&config.ollama)?;
        Ok(Self::new(Some(Box::new(client))))
    }

    #[inline]
    pub fn has_model(&self) -> bool {
        self.model.is_some()
    }

    /// Validated single-choice draft for `source`. Any model failure resolves
    /// to the heuristic draft.
    #[inline]
    pub fn draft(&self, source: SourceFragment<'_>) -> GeneratedQuestionDraft {
        let raw = match &self.model {
            Some(model) => match Self::ask_model(model.as_ref(), source.text) {
                Ok(raw) => raw,
                Err(e) => {
                    warn!("Question generation failed, using heuristic draft: {:#}", e);
                    heuristic_question(source)
                }
            },
            None => heuristic_question(source),
        };

        validate(raw, source)
    }

    /// Draft a question and adapt it to `type_hint`
    #[inline]
    pub fn generate(
        &self,
        source: SourceFragment<'_>,
        type_hint: Option<QuestionType>,
    ) -> GeneratedQuestionDraft {
        adapt_type(self.draft(source), type_hint, source.text)
    }

    /// Draft, apply caller overrides, adapt and score
    #[inline]
    pub fn generate_with(
        &self,
        source: SourceFragment<'_>,
        overrides: &DraftOverrides,
    ) -> ScoredDraft {
        let mut draft = self.draft(source);

        if let Some(difficulty) = overrides.difficulty {
            draft.difficulty = difficulty;
        }
        let tags: Vec<String> = overrides
            .tags
            .iter()
            .map(|tag| tag.trim().to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        if !tags.is_empty() {
            draft.tags = tags;
        }

        let draft = adapt_type(draft, overrides.question_type, source.text);
        let quality_score = score_question(&draft);

        debug!(
            "Generated {} question (difficulty {}, quality {})",
            draft.question_type, draft.difficulty, quality_score
        );

        ScoredDraft {
            draft,
            quality_score,
        }
    }

    fn ask_model(model: &dyn GenerationModel, text: &str) -> Result<RawQuestion> {
        let output = model
            .complete(&build_prompt(text))
            .context("Generation model call failed")?;
        parse_model_output(&output)
    }
}

/// Instruction asking for one single-choice question about the fragment as JSON
#[inline]
pub fn build_prompt(text: &str) -> String {
    format!(
        "你是考试命题专家。根据以下学习片段生成一道中文单选题，严格返回JSON且不包含任何额外文本：\n\
         片段：\n{}\n\
         JSON字段：{{type:'SINGLE',stem:string,options:string[],answer:string,difficulty:'EASY|MEDIUM|HARD',knowledgeTags:string[]}}\n\
         规则：\n\
         1. 生成4个不同且具体的中文选项，只有1个为正确项，其余为贴近但错误的干扰项。\n\
         2. 不允许使用泛化选项，例如‘与片段无关’或‘无法判断’。\n\
         3. 每个选项不超过30字，answer必须等于options中的完整字符串。\n\
         4. stem简洁明确，knowledgeTags基于片段主题词。\n",
        preview(text)
    )
}

/// Parse a model reply, bare or wrapped in a Markdown code fence
#[inline]
pub fn parse_model_output(output: &str) -> Result<RawQuestion> {
    let body = strip_code_fence(output.trim());
    let value: Value =
        serde_json::from_str(body).context("Generation output is not valid JSON")?;

    anyhow::ensure!(
        value.is_object(),
        "Generation output is not a JSON object"
    );

    Ok(RawQuestion::from_json(&value))
}

fn strip_code_fence(text: &str) -> &str {
    let Some(rest) = text.strip_prefix("```") else {
        return text;
    };

    // Drop the info string (e.g. `json`) on the opening line
    let rest = rest.split_once('\n').map_or("", |(_, body)| body);
    rest.trim_end()
        .strip_suffix("```")
        .unwrap_or(rest)
        .trim()
}

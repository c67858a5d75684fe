// Command handlers behind the quizsmith CLI


use std::collections::HashMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result, bail};
use console::style;
use tracing::info;

use crate::config::Config;
use crate::grading::decode_answers;
use crate::pipeline::{GenerationRequest, QuizPipeline};
use crate::questions::validation::option_letter;

async fn open_pipeline() -> Result<QuizPipeline> {
    let config = Config::load_default()?;
    QuizPipeline::from_config(&config)
        .await
        .context("Failed to open the quiz stores")
}

/// Split a comma-separated `--tags` value, dropping blanks
#[inline]
pub fn parse_tags(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|tag| !tag.is_empty())
        .map(str::to_string)
        .collect()
}

/// Title for an ingested file: its stem, or the whole path when it has none
#[inline]
pub fn document_title(path: &Path) -> String {
    path.file_stem()
        .map_or_else(|| path.display().to_string(), |stem| stem.to_string_lossy().into_owned())
}

/// Read a submission file holding a JSON object of question id to answer
#[inline]
pub fn load_answers(path: &Path) -> Result<HashMap<String, String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read answers file: {}", path.display()))?;

    let value: serde_json::Value = serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse answers file: {}", path.display()))?;
    if !value.is_object() {
        bail!("Answers file must contain a JSON object of question id to answer");
    }

    Ok(decode_answers(&content))
}

/// Register a text file as a document, then chunk and embed it
#[inline]
pub async fn ingest_file(path: &Path, pages: u32) -> Result<()> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("Failed to read document: {}", path.display()))?;
    let title = document_title(path);
    info!("Ingesting {} ({} pages)", path.display(), pages);

    let pipeline = open_pipeline().await?;
    let document = pipeline
        .ingest(&title, Some(path.display().to_string()), &text, pages)
        .await?;
    let report = pipeline.document_status(document.id).await?;

    println!(
        "{} {} (ID: {})",
        style("✓ Ingested").green(),
        document.title,
        document.id
    );
    println!("   Status: {}", report.document.status);
    println!(
        "   Fragments: {} ({} embedded)",
        report.fragments, report.embedded
    );
    Ok(())
}

#[inline]
pub async fn show_status(document_id: i64) -> Result<()> {
    let pipeline = open_pipeline().await?;
    let report = pipeline.document_status(document_id).await?;
    let document = &report.document;

    println!("📄 {} (ID: {})", document.title, document.id);
    if let Some(source) = &document.source_path {
        println!("   Source: {}", source);
    }
    println!("   Status: {}", document.status);
    println!("   Pages: {}", document.page_count);
    println!(
        "   Fragments: {} ({} embedded)",
        report.fragments, report.embedded
    );
    if let Some(error) = &document.error_message {
        println!("   ⚠️  Error: {}", error);
    }
    println!(
        "   Updated: {}",
        document.updated_date.format("%Y-%m-%d %H:%M:%S")
    );
    Ok(())
}

#[inline]
pub async fn list_documents() -> Result<()> {
    let pipeline = open_pipeline().await?;
    let documents = pipeline.list_documents().await?;

    if documents.is_empty() {
        println!("No documents have been ingested yet.");
        println!("Use 'quizsmith ingest <file>' to add one.");
        return Ok(());
    }

    println!("Documents ({} total):", documents.len());
    for document in &documents {
        println!(
            "   {:>4}  {:<10} {}",
            document.id,
            document.status.as_str(),
            document.title
        );
    }
    Ok(())
}

#[inline]
pub async fn search(
    query: &str,
    document_id: Option<i64>,
    top_k: usize,
    keyword: Option<&str>,
) -> Result<()> {
    let pipeline = open_pipeline().await?;
    let results = pipeline.search(query, top_k, document_id, keyword).await?;

    if results.is_empty() {
        println!("No matching fragments.");
        return Ok(());
    }

    for (rank, result) in results.iter().enumerate() {
        let fragment = &result.fragment;
        println!(
            "{} {} (document {}, fragment {})",
            style(format!("#{}", rank + 1)).bold(),
            style(format!("{:.4}", result.score)).cyan(),
            fragment.document_id,
            fragment.id
        );
        println!("   {}", fragment.text);
    }
    Ok(())
}

#[inline]
pub async fn create_quiz(title: &str) -> Result<()> {
    let pipeline = open_pipeline().await?;
    let quiz = pipeline.create_quiz(title).await?;
    println!("Created quiz: {} (ID: {})", quiz.title, quiz.id);
    Ok(())
}

#[inline]
pub async fn list_quizzes() -> Result<()> {
    let pipeline = open_pipeline().await?;
    let quizzes = pipeline.list_quizzes().await?;

    if quizzes.is_empty() {
        println!("No quizzes have been created yet.");
        println!("Use 'quizsmith create-quiz <title>' to create one.");
        return Ok(());
    }

    println!("Quizzes ({} total):", quizzes.len());
    for quiz in &quizzes {
        let questions = pipeline.list_questions(quiz.id).await?;
        println!(
            "   {:>4}  {} ({} questions, created {})",
            quiz.id,
            quiz.title,
            questions.len(),
            quiz.created_date.format("%Y-%m-%d %H:%M:%S")
        );
    }
    Ok(())
}

#[inline]
pub async fn generate(quiz_id: i64, document_id: i64, request: &GenerationRequest) -> Result<()> {
    let pipeline = open_pipeline().await?;
    let questions = pipeline
        .generate_questions(quiz_id, document_id, request)
        .await?;

    if questions.is_empty() {
        println!("No fragments matched; nothing was generated.");
        return Ok(());
    }

    println!(
        "Generated {} questions for quiz {}:",
        questions.len(),
        quiz_id
    );
    for question in &questions {
        println!();
        println!(
            "{} [{} / {}] quality {}",
            style(format!("Q{}", question.id)).bold(),
            question.question_type,
            question.difficulty,
            question.quality_score
        );
        println!("   {}", question.stem);
        for (index, option) in question.options().iter().enumerate() {
            println!("   {}. {}", option_letter(index), option);
        }
        println!("   Answer: {}", style(&question.answer).green());
        if !question.knowledge_tags.is_empty() {
            println!("   Tags: {}", question.knowledge_tags);
        }
    }
    Ok(())
}

#[inline]
pub async fn start_attempt(quiz_id: i64, user_id: &str) -> Result<()> {
    let pipeline = open_pipeline().await?;
    let attempt = pipeline.start_attempt(quiz_id, user_id).await?;
    println!(
        "Started attempt {} on quiz {} for {}",
        attempt.id, attempt.quiz_id, attempt.user_id
    );
    Ok(())
}

#[inline]
pub async fn submit_attempt(attempt_id: i64, answers_path: &Path) -> Result<()> {
    let answers = load_answers(answers_path)?;
    let pipeline = open_pipeline().await?;
    let score = pipeline.submit_attempt(attempt_id, &answers).await?;
    println!(
        "Attempt {} scored {}",
        attempt_id,
        style(format!("{:.1}%", score * 100.0)).bold().green()
    );
    Ok(())
}

#[inline]
pub async fn show_report(attempt_id: i64) -> Result<()> {
    let pipeline = open_pipeline().await?;
    let report = pipeline.attempt_report(attempt_id).await?;
    let attempt = &report.attempt;

    println!(
        "📝 Attempt {} (quiz {}, user {})",
        attempt.id, attempt.quiz_id, attempt.user_id
    );
    match report.score {
        Some(score) => println!("   Score: {:.1}%", score * 100.0),
        None => println!("   Score: not submitted"),
    }
    if let Some(submitted) = attempt.submitted_date {
        println!("   Submitted: {}", submitted.format("%Y-%m-%d %H:%M:%S"));
    }

    let mut answers: Vec<(&String, &String)> = report.answers.iter().collect();
    answers.sort();
    for (question_id, answer) in answers {
        println!("   Q{}: {}", question_id, answer);
    }
    Ok(())
}

#[inline]
pub async fn show_analytics(quiz_id: Option<i64>) -> Result<()> {
    let pipeline = open_pipeline().await?;
    let report = pipeline.analytics(quiz_id).await?;

    println!("{}", style("📊 Accuracy by knowledge tag").bold().cyan());
    if report.tags.is_empty() {
        println!("   No graded tagged questions yet.");
    }
    for tag in &report.tags {
        println!(
            "   {:<16} {:>5.1}%  ({}/{})",
            tag.tag,
            tag.accuracy * 100.0,
            tag.correct,
            tag.total
        );
    }

    println!();
    println!("{}", style("📊 Accuracy by difficulty").bold().cyan());
    for difficulty in &report.difficulty {
        println!(
            "   {:<16} {:>5.1}%  ({}/{})",
            difficulty.difficulty.as_str(),
            difficulty.accuracy * 100.0,
            difficulty.correct,
            difficulty.total
        );
    }
    Ok(())
}

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use quizsmith::Result;
use quizsmith::commands::{
    create_quiz, generate, ingest_file, list_documents, list_quizzes, parse_tags, search,
    show_analytics, show_report, show_status, start_attempt, submit_attempt,
};
use quizsmith::config::{run_interactive_config, show_config};
use quizsmith::pipeline::GenerationRequest;
use quizsmith::questions::{Difficulty, QuestionType};

#[derive(Parser)]
#[command(name = "quizsmith")]
#[command(about = "Turn document text into searchable fragments and graded quizzes")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Configure the Ollama connection and models
    Config {
        /// Show current configuration
        #[arg(long)]
        show: bool,
    },
    /// Chunk and embed an extracted text file
    Ingest {
        /// Plain text file holding the document's extracted text
        file: PathBuf,
        /// Number of pages the text was extracted from
        #[arg(long, default_value_t = 1)]
        pages: u32,
    },
    /// List ingested documents
    List,
    /// Show a document's processing status
    Status {
        /// Document ID
        document: i64,
    },
    /// Rank fragments against a free-text query
    Search {
        query: String,
        /// Only search this document
        #[arg(long)]
        document: Option<i64>,
        #[arg(long, default_value_t = 5)]
        top_k: usize,
        /// Only consider fragments whose keywords contain this text
        #[arg(long)]
        keyword: Option<String>,
    },
    /// Create an empty quiz
    CreateQuiz { title: String },
    /// List quizzes with their question counts
    Quizzes,
    /// Generate questions for a quiz from a document
    Generate {
        #[arg(long)]
        quiz: i64,
        #[arg(long)]
        document: i64,
        #[arg(long, default_value_t = 5)]
        count: usize,
        /// Pick the fragments most similar to this text
        #[arg(long)]
        query: Option<String>,
        #[arg(long)]
        keyword: Option<String>,
        /// SINGLE, MULTI, TRUE_FALSE or SHORT_ANSWER
        #[arg(long = "type")]
        question_type: Option<QuestionType>,
        /// EASY, MEDIUM or HARD
        #[arg(long)]
        difficulty: Option<Difficulty>,
        /// Comma-separated knowledge tags
        #[arg(long)]
        tags: Option<String>,
    },
    /// Start an attempt on a quiz
    Start {
        #[arg(long)]
        quiz: i64,
        #[arg(long)]
        user: String,
    },
    /// Grade and store answers for an attempt
    Submit {
        attempt: i64,
        /// JSON object mapping question IDs to answers
        answers: PathBuf,
    },
    /// Show an attempt's score and answers
    Report { attempt: i64 },
    /// Accuracy by knowledge tag and difficulty
    Analytics {
        /// Only count attempts on this quiz
        #[arg(long)]
        quiz: Option<i64>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Config { show } => {
            if show {
                show_config()?;
            } else {
                run_interactive_config()?;
            }
        }
        Commands::Ingest { file, pages } => {
            ingest_file(&file, pages).await?;
        }
        Commands::List => {
            list_documents().await?;
        }
        Commands::Status { document } => {
            show_status(document).await?;
        }
        Commands::Search {
            query,
            document,
            top_k,
            keyword,
        } => {
            search(&query, document, top_k, keyword.as_deref()).await?;
        }
        Commands::CreateQuiz { title } => {
            create_quiz(&title).await?;
        }
        Commands::Quizzes => {
            list_quizzes().await?;
        }
        Commands::Generate {
            quiz,
            document,
            count,
            query,
            keyword,
            question_type,
            difficulty,
            tags,
        } => {
            let request = GenerationRequest {
                count,
                query,
                keyword,
                question_type,
                difficulty,
                tags: tags.as_deref().map(parse_tags).unwrap_or_default(),
            };
            generate(quiz, document, &request).await?;
        }
        Commands::Start { quiz, user } => {
            start_attempt(quiz, &user).await?;
        }
        Commands::Submit { attempt, answers } => {
            submit_attempt(attempt, &answers).await?;
        }
        Commands::Report { attempt } => {
            show_report(attempt).await?;
        }
        Commands::Analytics { quiz } => {
            show_analytics(quiz).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::error::ErrorKind;

    #[test]
    fn ingest_defaults_to_one_page() {
        let cli = Cli::try_parse_from(["quizsmith", "ingest", "notes.txt"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Ingest { file, pages } = parsed.command {
                assert_eq!(file, PathBuf::from("notes.txt"));
                assert_eq!(pages, 1);
            }
        }
    }

    #[test]
    fn search_with_filters() {
        let cli = Cli::try_parse_from([
            "quizsmith",
            "search",
            "photosynthesis",
            "--document",
            "3",
            "--top-k",
            "2",
            "--keyword",
            "光合",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Search {
                query,
                document,
                top_k,
                keyword,
            } = parsed.command
            {
                assert_eq!(query, "photosynthesis");
                assert_eq!(document, Some(3));
                assert_eq!(top_k, 2);
                assert_eq!(keyword.as_deref(), Some("光合"));
            }
        }
    }

    #[test]
    fn generate_parses_type_and_difficulty() {
        let cli = Cli::try_parse_from([
            "quizsmith",
            "generate",
            "--quiz",
            "1",
            "--document",
            "2",
            "--type",
            "true_false",
            "--difficulty",
            "hard",
            "--tags",
            "cells,energy",
        ]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Generate {
                quiz,
                document,
                count,
                question_type,
                difficulty,
                tags,
                ..
            } = parsed.command
            {
                assert_eq!((quiz, document, count), (1, 2, 5));
                assert_eq!(question_type, Some(QuestionType::TrueFalse));
                assert_eq!(difficulty, Some(Difficulty::Hard));
                assert_eq!(tags.as_deref(), Some("cells,energy"));
            }
        }
    }

    #[test]
    fn generate_rejects_unknown_type() {
        let cli = Cli::try_parse_from([
            "quizsmith",
            "generate",
            "--quiz",
            "1",
            "--document",
            "2",
            "--type",
            "essay",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn generate_requires_quiz_and_document() {
        let cli = Cli::try_parse_from(["quizsmith", "generate", "--quiz", "1"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::MissingRequiredArgument);
        }
    }

    #[test]
    fn create_quiz_is_kebab_case() {
        let cli = Cli::try_parse_from(["quizsmith", "create-quiz", "Biology"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::CreateQuiz { title } = parsed.command {
                assert_eq!(title, "Biology");
            }
        }
    }

    #[test]
    fn quizzes_command() {
        let cli = Cli::try_parse_from(["quizsmith", "quizzes"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            assert!(matches!(parsed.command, Commands::Quizzes));
        }
    }

    #[test]
    fn config_show_flag() {
        let cli = Cli::try_parse_from(["quizsmith", "config", "--show"]);
        assert!(cli.is_ok());

        if let Ok(parsed) = cli {
            if let Commands::Config { show } = parsed.command {
                assert!(show);
            }
        }
    }

    #[test]
    fn invalid_command() {
        let cli = Cli::try_parse_from(["quizsmith", "invalid"]);
        assert!(cli.is_err());

        if let Err(err) = cli {
            assert_eq!(err.kind(), ErrorKind::InvalidSubcommand);
        }
    }
}

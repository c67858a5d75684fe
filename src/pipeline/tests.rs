use super::*;
use crate::embeddings::{EmbeddingConfig, FallbackMode};
use anyhow::bail;
use async_trait::async_trait;
use tempfile::TempDir;

const SUN_TEXT: &str = "太阳从东边升起，这是常识。植物需要光合作用才能生长。";

const TWO_PARAGRAPHS: &str = "太阳从东边升起，这是常识。\n\n植物需要光合作用才能生长。";

const BIOLOGY_TEXT: &str = "Cells are the basic unit of life. Every organism is made of cells.\n\n\
     Mitochondria produce most of the chemical energy a cell needs.\n\n\
     Photosynthesis converts light into chemical energy inside chloroplasts.";

async fn create_test_pipeline() -> (TempDir, QuizPipeline) {
    let temp_dir = TempDir::new().expect("should create temp dir");
    let database = Database::initialize_from_config_dir(temp_dir.path())
        .await
        .expect("should create database");
    (temp_dir, QuizPipeline::new(database))
}

fn small_chunks() -> ChunkingConfig {
    ChunkingConfig { max_chars: 80 }
}

/// Delegates to SQLite but refuses to persist embeddings
struct UnwritableStore(Database);

#[async_trait]
impl FragmentStore for UnwritableStore {
    async fn find_by_document(&self, document_id: i64) -> anyhow::Result<Vec<Fragment>> {
        self.0.find_by_document(document_id).await
    }

    async fn replace_by_document(
        &self,
        document_id: i64,
        fragments: &[NewFragment],
    ) -> anyhow::Result<ReplacedFragments> {
        self.0.replace_by_document(document_id, fragments).await
    }

    async fn save_all(&self, _fragments: &[Fragment]) -> anyhow::Result<()> {
        bail!("fragment store unavailable")
    }
}

#[tokio::test]
async fn ingest_runs_the_document_lifecycle() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let pipeline = pipeline.with_chunking(small_chunks());

    let document = pipeline
        .ingest("Biology", Some("biology.txt".to_string()), BIOLOGY_TEXT, 3)
        .await
        .expect("ingest should succeed");

    assert_eq!(document.status, DocumentStatus::Done);
    assert_eq!(document.page_count, 3);
    assert!(document.error_message.is_none());

    let report = pipeline
        .document_status(document.id)
        .await
        .expect("status");
    assert_eq!(report.fragments, 3);
    assert_eq!(report.embedded, 3);

    let fragments = pipeline
        .database()
        .find_by_document(document.id)
        .await
        .expect("fragments");
    assert!(fragments.iter().all(|f| f.page_range.as_deref() == Some("1-3")));
    assert!(fragments.iter().all(|f| f.embedding().len() == 64));
    assert_eq!(
        fragments.iter().map(|f| f.chunk_index).collect::<Vec<_>>(),
        vec![0, 1, 2]
    );
}

#[tokio::test]
async fn parse_document_stores_keywords_and_waits_for_embedding() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let document = pipeline
        .database()
        .create_document(NewDocument {
            title: "Sun".to_string(),
            source_path: None,
            page_count: 0,
        })
        .await
        .expect("document");

    let fragments = pipeline
        .parse_document(document.id, SUN_TEXT, 0)
        .await
        .expect("parse");

    assert_eq!(fragments.len(), 1);
    assert!(fragments[0].page_range.is_none());
    assert_eq!(
        fragments[0].keywords.as_deref(),
        Some("太阳从东边升起,这是常识,植物需要光合作用")
    );
    assert!(!fragments[0].is_embedded());

    let status = pipeline.document_status(document.id).await.expect("status");
    assert_eq!(status.document.status, DocumentStatus::Embedding);
}

#[tokio::test]
async fn reparsing_replaces_fragments() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let pipeline = pipeline.with_chunking(small_chunks());

    let document = pipeline
        .ingest("Biology", None, BIOLOGY_TEXT, 1)
        .await
        .expect("ingest");
    pipeline
        .parse_document(document.id, SUN_TEXT, 2)
        .await
        .expect("reparse");

    let report = pipeline.document_status(document.id).await.expect("status");
    assert_eq!(report.fragments, 1);
    assert_eq!(report.embedded, 0);
    assert_eq!(report.document.page_count, 2);
}

#[tokio::test]
async fn missing_entities_are_not_found() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;

    let parse = pipeline.parse_document(404, SUN_TEXT, 1).await;
    assert!(matches!(
        parse,
        Err(QuizError::NotFound {
            entity: "document",
            id: 404
        })
    ));

    assert!(
        pipeline
            .embed_document(404)
            .await
            .expect_err("missing document")
            .is_not_found()
    );
    assert!(
        pipeline
            .generate_questions(1, 1, &GenerationRequest::default())
            .await
            .expect_err("missing quiz")
            .is_not_found()
    );
    assert!(
        pipeline
            .start_attempt(9, "student")
            .await
            .expect_err("missing quiz")
            .is_not_found()
    );
    assert!(
        pipeline
            .submit_attempt(9, &HashMap::new())
            .await
            .expect_err("missing attempt")
            .is_not_found()
    );
    assert!(
        pipeline
            .analytics(Some(9))
            .await
            .expect_err("missing quiz")
            .is_not_found()
    );
}

#[tokio::test]
async fn persistence_failure_marks_document_failed() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let store = Arc::new(UnwritableStore(pipeline.database().clone()));
    let pipeline = pipeline.with_fragment_store(store);

    let result = pipeline.ingest("Sun", None, SUN_TEXT, 1).await;
    let error = result.expect_err("embedding should fail");
    assert!(matches!(error, QuizError::Database(_)));

    let documents = pipeline.list_documents().await.expect("documents");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].status, DocumentStatus::Failed);
    assert!(
        documents[0]
            .error_message
            .as_deref()
            .is_some_and(|message| message.contains("fragment store unavailable"))
    );
}

#[tokio::test]
async fn generate_true_false_question_grades_as_correct() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let document = pipeline
        .ingest("Sun", None, SUN_TEXT, 1)
        .await
        .expect("ingest");
    let quiz = pipeline.create_quiz("Nature").await.expect("quiz");

    let questions = pipeline
        .generate_questions(
            quiz.id,
            document.id,
            &GenerationRequest {
                count: 1,
                question_type: Some(QuestionType::TrueFalse),
                ..GenerationRequest::default()
            },
        )
        .await
        .expect("generate");

    assert_eq!(questions.len(), 1);
    let question = &questions[0];
    assert_eq!(question.question_type, QuestionType::TrueFalse);
    assert_eq!(question.options(), vec!["正确", "错误"]);
    assert_eq!(question.answer, "正确");
    assert!(question.fragment_id.is_some());
    assert!((0..=100).contains(&question.quality_score));

    let attempt = pipeline
        .start_attempt(quiz.id, "student-1")
        .await
        .expect("attempt");
    let answers = HashMap::from([(question.id.to_string(), "正确".to_string())]);
    let score = pipeline
        .submit_attempt(attempt.id, &answers)
        .await
        .expect("submit");
    assert!((score - 1.0).abs() < f64::EPSILON);
}

#[tokio::test]
async fn generation_honors_count_keyword_and_overrides() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let pipeline = pipeline.with_chunking(small_chunks());
    let document = pipeline
        .ingest("Biology", None, BIOLOGY_TEXT, 1)
        .await
        .expect("ingest");
    let quiz = pipeline.create_quiz("Biology").await.expect("quiz");

    let two = pipeline
        .generate_questions(
            quiz.id,
            document.id,
            &GenerationRequest {
                count: 2,
                question_type: Some(QuestionType::Multi),
                difficulty: Some(Difficulty::Hard),
                tags: vec![" cells ".to_string(), String::new()],
                ..GenerationRequest::default()
            },
        )
        .await
        .expect("generate");
    assert_eq!(two.len(), 2);
    for question in &two {
        assert_eq!(question.question_type, QuestionType::Multi);
        assert_eq!(question.difficulty, Difficulty::Hard);
        assert_eq!(question.knowledge_tags, "cells");
        assert_eq!(question.answer.split(',').count(), 3);
    }

    let queried = pipeline
        .generate_questions(
            quiz.id,
            document.id,
            &GenerationRequest {
                count: 1,
                query: Some("chemical energy".to_string()),
                ..GenerationRequest::default()
            },
        )
        .await
        .expect("generate");
    assert_eq!(queried.len(), 1);
    assert_eq!(queried[0].question_type, QuestionType::Single);

    let stored = pipeline.list_questions(quiz.id).await.expect("questions");
    assert_eq!(stored.len(), 3);
}

#[tokio::test]
async fn search_filters_by_document_and_keyword() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let pipeline = pipeline
        .with_chunking(small_chunks())
        .with_embeddings(EmbeddingService::fallback_only(&EmbeddingConfig {
            fallback: FallbackMode::ContentHash,
            ..EmbeddingConfig::default()
        }));

    let biology = pipeline
        .ingest("Biology", None, BIOLOGY_TEXT, 1)
        .await
        .expect("ingest");
    let sun = pipeline.ingest("Sun", None, SUN_TEXT, 1).await.expect("ingest");

    let everywhere = pipeline
        .search("mitochondria produce most", 10, None, None)
        .await
        .expect("search");
    assert_eq!(everywhere.len(), 4);
    assert!(everywhere[0].fragment.text.starts_with("Mitochondria"));

    let only_sun = pipeline
        .search("mitochondria", 10, Some(sun.id), None)
        .await
        .expect("search");
    assert_eq!(only_sun.len(), 1);
    assert_eq!(only_sun[0].fragment.document_id, sun.id);

    let biology_only = pipeline
        .search("energy", 10, Some(biology.id), None)
        .await
        .expect("search");
    assert_eq!(biology_only.len(), 3);

    assert!(
        pipeline
            .search("energy", 3, Some(999), None)
            .await
            .expect_err("missing document")
            .is_not_found()
    );
}

#[tokio::test]
async fn vector_index_follows_embedded_fragments() {
    let (temp_dir, pipeline) = create_test_pipeline().await;
    let store = Arc::new(
        VectorStore::open(&temp_dir.path().join("vectors"))
            .await
            .expect("vector store"),
    );
    let pipeline = pipeline
        .with_chunking(small_chunks())
        .with_embeddings(EmbeddingService::fallback_only(&EmbeddingConfig {
            fallback: FallbackMode::ContentHash,
            ..EmbeddingConfig::default()
        }))
        .with_vector_store(store.clone());

    let document = pipeline
        .ingest("Biology", None, BIOLOGY_TEXT, 1)
        .await
        .expect("ingest");
    assert_eq!(store.count_embeddings().await.expect("count"), 3);

    let indexed = pipeline
        .search("photosynthesis light chloroplasts", 1, Some(document.id), None)
        .await
        .expect("search");
    assert_eq!(indexed.len(), 1);
    assert!(indexed[0].fragment.text.starts_with("Photosynthesis"));

    pipeline
        .parse_document(document.id, SUN_TEXT, 1)
        .await
        .expect("reparse");
    assert_eq!(store.count_embeddings().await.expect("count"), 0);
}

#[tokio::test]
async fn resubmission_overwrites_and_reports() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let document = pipeline
        .ingest("Sun", None, SUN_TEXT, 1)
        .await
        .expect("ingest");
    let quiz = pipeline.create_quiz("Nature").await.expect("quiz");
    let questions = pipeline
        .generate_questions(quiz.id, document.id, &GenerationRequest::default())
        .await
        .expect("generate");
    let question = &questions[0];

    let attempt = pipeline
        .start_attempt(quiz.id, "student-1")
        .await
        .expect("attempt");

    let wrong = HashMap::from([(question.id.to_string(), "nonsense".to_string())]);
    let first = pipeline
        .submit_attempt(attempt.id, &wrong)
        .await
        .expect("submit");
    assert_eq!(first, 0.0);

    let right = HashMap::from([(question.id.to_string(), question.answer.to_lowercase())]);
    let second = pipeline
        .submit_attempt(attempt.id, &right)
        .await
        .expect("submit");
    assert!((second - 1.0).abs() < f64::EPSILON);

    let report = pipeline.attempt_report(attempt.id).await.expect("report");
    assert_eq!(report.score, Some(second));
    assert_eq!(report.answers, right);
    assert!(report.attempt.is_submitted());
}

#[tokio::test]
async fn analytics_cover_submitted_attempts() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let document = pipeline
        .ingest("Sun", None, SUN_TEXT, 1)
        .await
        .expect("ingest");
    let quiz = pipeline.create_quiz("Nature").await.expect("quiz");
    let questions = pipeline
        .generate_questions(
            quiz.id,
            document.id,
            &GenerationRequest {
                difficulty: Some(Difficulty::Easy),
                tags: vec!["astronomy".to_string()],
                ..GenerationRequest::default()
            },
        )
        .await
        .expect("generate");
    let question = &questions[0];

    for (user, answer) in [("a", question.answer.clone()), ("b", "wrong".to_string())] {
        let attempt = pipeline.start_attempt(quiz.id, user).await.expect("attempt");
        pipeline
            .submit_attempt(
                attempt.id,
                &HashMap::from([(question.id.to_string(), answer)]),
            )
            .await
            .expect("submit");
    }

    let report = pipeline.analytics(Some(quiz.id)).await.expect("analytics");
    assert_eq!(report.tags.len(), 1);
    assert_eq!(report.tags[0].tag, "astronomy");
    assert_eq!((report.tags[0].correct, report.tags[0].total), (1, 2));
    assert_eq!(report.difficulty[0].difficulty, Difficulty::Easy);
    assert_eq!((report.difficulty[0].correct, report.difficulty[0].total), (1, 2));

    let all = pipeline.analytics(None).await.expect("analytics");
    assert_eq!(all, report);
}

#[tokio::test]
async fn blank_quiz_title_is_rejected() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    assert!(matches!(
        pipeline.create_quiz("   ").await,
        Err(QuizError::InvalidInput(_))
    ));
}

#[tokio::test]
async fn quizzes_are_listed_in_creation_order() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    assert!(pipeline.list_quizzes().await.expect("quizzes").is_empty());

    let first = pipeline.create_quiz(" Botany ").await.expect("quiz");
    let second = pipeline.create_quiz("Astronomy").await.expect("quiz");

    let quizzes = pipeline.list_quizzes().await.expect("quizzes");
    let listed: Vec<(i64, &str)> = quizzes.iter().map(|q| (q.id, q.title.as_str())).collect();
    assert_eq!(listed, vec![(first.id, "Botany"), (second.id, "Astronomy")]);
}

fn config_with_unparsable_host(temp_dir: &TempDir, embedding: bool) -> Config {
    let model = Some("some-model".to_string());
    Config {
        ollama: crate::config::OllamaConfig {
            host: "not a host".to_string(),
            embedding_model: if embedding { model.clone() } else { None },
            generation_model: model,
            ..Default::default()
        },
        chunking: ChunkingConfig::default(),
        embedding: EmbeddingConfig::default(),
        base_dir: temp_dir.path().to_path_buf(),
    }
}

#[tokio::test]
async fn unusable_model_settings_name_the_failing_client() {
    let temp_dir = TempDir::new().expect("should create temp dir");

    match QuizPipeline::from_config(&config_with_unparsable_host(&temp_dir, true)).await {
        Err(QuizError::Embedding(message)) => assert!(message.contains("Ollama URL")),
        Err(other) => panic!("expected an embedding error, got {other}"),
        Ok(_) => panic!("an unparsable host should not build an embedding client"),
    }

    match QuizPipeline::from_config(&config_with_unparsable_host(&temp_dir, false)).await {
        Err(QuizError::Generation(message)) => assert!(message.contains("Ollama URL")),
        Err(other) => panic!("expected a generation error, got {other}"),
        Ok(_) => panic!("an unparsable host should not build a generation client"),
    }
}

#[tokio::test]
async fn keyword_filter_narrows_generation_and_search() {
    let (_temp_dir, pipeline) = create_test_pipeline().await;
    let pipeline = pipeline.with_chunking(ChunkingConfig { max_chars: 10 });
    let document = pipeline
        .ingest("Nature", None, TWO_PARAGRAPHS, 1)
        .await
        .expect("ingest");
    let quiz = pipeline.create_quiz("Nature").await.expect("quiz");

    let matching = pipeline
        .search("植物", 10, Some(document.id), Some("光合"))
        .await
        .expect("search");
    assert_eq!(matching.len(), 1);
    assert!(matching[0].fragment.text.starts_with("植物"));

    let questions = pipeline
        .generate_questions(
            quiz.id,
            document.id,
            &GenerationRequest {
                query: Some("太阳".to_string()),
                keyword: Some("光合".to_string()),
                ..GenerationRequest::default()
            },
        )
        .await
        .expect("generate");
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].fragment_id, Some(matching[0].fragment.id));

    let unmatched = pipeline
        .generate_questions(
            quiz.id,
            document.id,
            &GenerationRequest {
                keyword: Some("geology".to_string()),
                ..GenerationRequest::default()
            },
        )
        .await
        .expect("generate");
    assert!(unmatched.is_empty());
}

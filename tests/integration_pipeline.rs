#![expect(
    clippy::tests_outside_test_module,
    reason = "integration tests are only compiled in test mode"
)]

// End-to-end runs of the pipeline against on-disk stores, without a model server

use std::collections::HashMap;

use tempfile::TempDir;

use quizsmith::config::Config;
use quizsmith::database::sqlite::models::DocumentStatus;
use quizsmith::embeddings::{ChunkingConfig, chunk_text};
use quizsmith::pipeline::{GenerationRequest, QuizPipeline};
use quizsmith::questions::QuestionType;

const SUN_TEXT: &str = "太阳从东边升起，这是常识。";

async fn create_test_pipeline() -> (QuizPipeline, TempDir) {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let pipeline = QuizPipeline::from_config(&config)
        .await
        .expect("can open pipeline");
    (pipeline, temp_dir)
}

#[test]
fn paragraphs_pack_under_budget() {
    let text = "A\n\nB\n\nC";

    let packed = chunk_text(text, &ChunkingConfig { max_chars: 1200 });
    assert_eq!(packed, vec!["A\n\nB\n\nC"]);

    let split = chunk_text(text, &ChunkingConfig { max_chars: 3 });
    assert_eq!(split, vec!["A", "B", "C"]);
}

#[tokio::test]
async fn true_false_quiz_round_trip() {
    let (pipeline, _temp_dir) = create_test_pipeline().await;

    let document = pipeline
        .ingest("Astronomy", None, SUN_TEXT, 1)
        .await
        .expect("can ingest document");
    assert_eq!(document.status, DocumentStatus::Done);

    let report = pipeline
        .document_status(document.id)
        .await
        .expect("can read status");
    assert_eq!((report.fragments, report.embedded), (1, 1));

    let quiz = pipeline
        .create_quiz("Sun facts")
        .await
        .expect("can create quiz");
    let request = GenerationRequest {
        count: 1,
        question_type: Some(QuestionType::TrueFalse),
        ..GenerationRequest::default()
    };
    let questions = pipeline
        .generate_questions(quiz.id, document.id, &request)
        .await
        .expect("can generate questions");
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].question_type, QuestionType::TrueFalse);
    assert_eq!(questions[0].options(), vec!["正确", "错误"]);
    assert_eq!(questions[0].answer, "正确");

    let attempt = pipeline
        .start_attempt(quiz.id, "student-1")
        .await
        .expect("can start attempt");
    let answers = HashMap::from([(questions[0].id.to_string(), "正确".to_string())]);
    let score = pipeline
        .submit_attempt(attempt.id, &answers)
        .await
        .expect("can submit attempt");
    assert!((score - 1.0).abs() < f64::EPSILON);

    let report = pipeline
        .attempt_report(attempt.id)
        .await
        .expect("can read attempt");
    assert_eq!(report.score, Some(1.0));
    assert_eq!(report.answers, answers);
}

#[tokio::test]
async fn search_spans_documents_and_keeps_tie_order() {
    let (pipeline, _temp_dir) = create_test_pipeline().await;

    let pipeline = pipeline.with_chunking(ChunkingConfig { max_chars: 10 });
    let first = pipeline
        .ingest("Sun", None, "太阳从东边升起。\n\n太阳从西边落下。", 1)
        .await
        .expect("can ingest first document");
    let second = pipeline
        .ingest("Plants", None, "植物需要光合作用才能生长。", 1)
        .await
        .expect("can ingest second document");

    let everywhere = pipeline
        .search("太阳", 10, None, None)
        .await
        .expect("can search all documents");
    assert_eq!(everywhere.len(), 3);

    // Fixed-seed fallback vectors are identical, so every score ties and
    // the first fragments in document order win
    let top_two = pipeline
        .search("太阳", 2, None, None)
        .await
        .expect("can search all documents");
    let chosen: Vec<(i64, i64)> = top_two
        .iter()
        .map(|r| (r.fragment.document_id, r.fragment.chunk_index))
        .collect();
    assert_eq!(chosen, vec![(first.id, 0), (first.id, 1)]);
    assert!((top_two[0].score - top_two[1].score).abs() < f32::EPSILON);

    let only_plants = pipeline
        .search("太阳", 10, Some(second.id), None)
        .await
        .expect("can search one document");
    assert_eq!(only_plants.len(), 1);
    assert_eq!(only_plants[0].fragment.document_id, second.id);

    let keyword = pipeline
        .search("太阳", 10, Some(first.id), Some("西边"))
        .await
        .expect("can search with keyword");
    assert_eq!(keyword.len(), 1);
    assert!(keyword[0].fragment.text.contains("西边"));
}

#[tokio::test]
async fn stores_survive_reopening() {
    let temp_dir = TempDir::new().expect("can create temp dir");
    let config = Config {
        base_dir: temp_dir.path().to_path_buf(),
        ..Config::default()
    };

    let document_id = {
        let pipeline = QuizPipeline::from_config(&config)
            .await
            .expect("can open pipeline");
        pipeline
            .ingest("Astronomy", None, SUN_TEXT, 1)
            .await
            .expect("can ingest document")
            .id
    };

    let reopened = QuizPipeline::from_config(&config)
        .await
        .expect("can reopen pipeline");
    let documents = reopened.list_documents().await.expect("can list documents");
    assert_eq!(documents.len(), 1);
    assert_eq!(documents[0].id, document_id);

    let results = reopened
        .search("太阳", 5, Some(document_id), None)
        .await
        .expect("can search after reopening");
    assert_eq!(results.len(), 1);
}

use chrono::Utc;

use super::*;

fn question(options_json: &str, knowledge_tags: &str) -> Question {
    Question {
        id: 1,
        quiz_id: 1,
        question_type: QuestionType::Single,
        stem: "Stem".to_string(),
        options_json: options_json.to_string(),
        answer: "a".to_string(),
        difficulty: Difficulty::Medium,
        knowledge_tags: knowledge_tags.to_string(),
        fragment_id: None,
        quality_score: 80,
        created_date: Utc::now().naive_utc(),
    }
}

#[test]
fn document_status_display() {
    assert_eq!(DocumentStatus::Uploaded.to_string(), "Uploaded");
    assert_eq!(DocumentStatus::Embedding.to_string(), "Embedding");
    assert_eq!(DocumentStatus::Failed.to_string(), "Failed");
    assert_eq!(DocumentStatus::Done.as_str(), "done");
}

#[test]
fn fragment_embedding_decoding() {
    let mut fragment = Fragment {
        id: 1,
        document_id: 1,
        chunk_index: 0,
        text: "text".to_string(),
        section_path: None,
        page_range: Some("1-3".to_string()),
        keywords: None,
        embedding_json: None,
        created_date: Utc::now().naive_utc(),
    };
    assert!(fragment.embedding().is_empty());
    assert!(!fragment.is_embedded());

    fragment.embedding_json = Some("[0.5, 1.5]".to_string());
    assert_eq!(fragment.embedding(), vec![0.5, 1.5]);

    fragment.embedding_json = Some("garbage".to_string());
    assert!(fragment.embedding().is_empty());
}

#[test]
fn question_options_and_tags() {
    let q = question(r#"["a","b","c","d"]"#, " photosynthesis, ,plants ");
    assert_eq!(q.options(), vec!["a", "b", "c", "d"]);
    assert_eq!(q.tags(), vec!["photosynthesis", "plants"]);

    let broken = question("not json", "");
    assert!(broken.options().is_empty());
    assert!(broken.tags().is_empty());
}

#[test]
fn attempt_answers_decoding() {
    let mut attempt = Attempt {
        id: 1,
        quiz_id: 1,
        user_id: "student".to_string(),
        answers_json: None,
        score: None,
        created_date: Utc::now().naive_utc(),
        submitted_date: None,
    };
    assert!(attempt.answers().is_empty());
    assert!(!attempt.is_submitted());

    attempt.answers_json = Some(r#"{"3":"A,B","4":"正确"}"#.to_string());
    let answers = attempt.answers();
    assert_eq!(answers.get("3").map(String::as_str), Some("A,B"));
    assert_eq!(answers.get("4").map(String::as_str), Some("正确"));
}

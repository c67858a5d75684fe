use super::*;
use crate::questions::{Difficulty, QuestionType};
use anyhow::Result;
use std::collections::HashSet;
use tempfile::TempDir;

async fn create_test_database() -> Result<(TempDir, Database)> {
    let temp_dir = TempDir::new()?;
    let database = Database::initialize_from_config_dir(temp_dir.path()).await?;
    Ok((temp_dir, database))
}

fn new_fragment(document_id: i64, chunk_index: i64, text: &str) -> NewFragment {
    NewFragment {
        document_id,
        chunk_index,
        text: text.to_string(),
        section_path: None,
        page_range: Some("1-2".to_string()),
        keywords: Some("photosynthesis".to_string()),
    }
}

#[tokio::test]
async fn integration_schema_migration() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let tables: Vec<String> = sqlx::query_scalar(
        "SELECT name FROM sqlite_master WHERE type='table' AND name NOT LIKE 'sqlite_%' AND name NOT LIKE '_sqlx%'",
    )
    .fetch_all(database.pool())
    .await?;

    let expected_tables: HashSet<&'static str> =
        ["documents", "fragments", "quizzes", "questions", "attempts"]
            .into_iter()
            .collect();

    let actual_tables: HashSet<&str> = tables.iter().map(|t| t.as_str()).collect();
    assert_eq!(actual_tables, expected_tables);

    Ok(())
}

#[tokio::test]
async fn fragments_cascade_with_document_but_questions_survive() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = database
        .create_document(NewDocument {
            title: "Biology".to_string(),
            source_path: None,
            page_count: 2,
        })
        .await?;
    let fragments = database
        .replace_by_document(
            document.id,
            &[new_fragment(document.id, 0, "Plants need light.")],
        )
        .await?
        .fragments;

    let quiz = database.create_quiz("Biology quiz").await?;
    let question = database
        .create_question(&NewQuestion {
            quiz_id: quiz.id,
            question_type: QuestionType::Single,
            stem: "What do plants need?".to_string(),
            options: vec!["Light".to_string(), "Salt".to_string()],
            answer: "Light".to_string(),
            difficulty: Difficulty::Easy,
            knowledge_tags: vec!["plants".to_string()],
            fragment_id: Some(fragments[0].id),
            quality_score: 70,
        })
        .await?;

    assert!(queries::DocumentQueries::delete(database.pool(), document.id).await?);

    assert!(database.find_by_document(document.id).await?.is_empty());
    assert!(database.get_fragment(fragments[0].id).await?.is_none());

    let questions = database.list_questions(quiz.id).await?;
    assert_eq!(questions.len(), 1);
    assert_eq!(questions[0].id, question.id);
    assert_eq!(questions[0].fragment_id, Some(fragments[0].id));

    Ok(())
}

#[tokio::test]
async fn fragment_store_round_trip() -> Result<()> {
    let (_temp_dir, database) = create_test_database().await?;

    let document = database
        .create_document(NewDocument {
            title: "Doc".to_string(),
            source_path: Some("/tmp/doc.txt".to_string()),
            page_count: 0,
        })
        .await?;

    let inserted = database
        .replace_by_document(
            document.id,
            &[
                new_fragment(document.id, 0, "first"),
                new_fragment(document.id, 1, "second"),
            ],
        )
        .await?
        .fragments;
    assert_eq!(inserted.len(), 2);
    assert!(inserted.iter().all(|f| !f.is_embedded()));

    let mut updated = database.find_by_document(document.id).await?;
    assert_eq!(
        updated.iter().map(|f| f.text.as_str()).collect::<Vec<_>>(),
        vec!["first", "second"]
    );
    for fragment in &mut updated {
        fragment.embedding_json = Some("[1.0,0.0]".to_string());
    }
    database.save_all(&updated).await?;

    let stored = database.find_by_document(document.id).await?;
    assert!(stored.iter().all(|f| f.embedding() == vec![1.0, 0.0]));
    assert_eq!(database.fragment_counts(document.id).await?, (2, 2));

    assert_eq!(database.replace_by_document(document.id, &[]).await?.removed, 2);
    assert_eq!(database.fragment_counts(document.id).await?, (0, 0));

    Ok(())
}

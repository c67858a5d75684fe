
use super::models::*;
use anyhow::{Context, Result};
use chrono::Utc;
use itertools::Itertools;
use sqlx::SqlitePool;
use tracing::{debug, warn};

const DOCUMENT_COLUMNS: &str =
    "id, title, source_path, page_count, status, error_message, created_date, updated_date";
const FRAGMENT_COLUMNS: &str = "id, document_id, chunk_index, text, section_path, page_range, keywords, embedding_json, created_date";
const QUIZ_COLUMNS: &str = "id, title, created_date";
const QUESTION_COLUMNS: &str = "id, quiz_id, question_type, stem, options_json, answer, difficulty, knowledge_tags, fragment_id, quality_score, created_date";
const ATTEMPT_COLUMNS: &str =
    "id, quiz_id, user_id, answers_json, score, created_date, submitted_date";

pub struct DocumentQueries;

impl DocumentQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_document: NewDocument) -> Result<Document> {
        let now = Utc::now().naive_utc();
        let id = sqlx::query(
            "INSERT INTO documents (title, source_path, page_count, status, created_date, updated_date) VALUES (?, ?, ?, 'uploaded', ?, ?)",
        )
        .bind(&new_document.title)
        .bind(&new_document.source_path)
        .bind(new_document.page_count)
        .bind(now)
        .bind(now)
        .execute(pool)
        .await
        .context("Failed to create document")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created document"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Document>> {
        let query = format!("SELECT {} FROM documents WHERE id = ?", DOCUMENT_COLUMNS);
        sqlx::query_as::<_, Document>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get document by id")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Document>> {
        let query = format!(
            "SELECT {} FROM documents ORDER BY created_date DESC, id DESC",
            DOCUMENT_COLUMNS
        );
        sqlx::query_as::<_, Document>(&query)
            .fetch_all(pool)
            .await
            .context("Failed to list documents")
    }

    /// Record a status transition. `error_message` replaces the stored
    /// message, so passing `None` clears a previous failure.
    #[inline]
    pub async fn update_status(
        pool: &SqlitePool,
        id: i64,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<Option<Document>> {
        debug!("Document {} -> {}", id, status.as_str());

        sqlx::query(
            "UPDATE documents SET status = ?, error_message = ?, updated_date = ? WHERE id = ?",
        )
        .bind(status)
        .bind(error_message)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to update document status")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn set_page_count(pool: &SqlitePool, id: i64, page_count: i64) -> Result<()> {
        sqlx::query("UPDATE documents SET page_count = ?, updated_date = ? WHERE id = ?")
            .bind(page_count)
            .bind(Utc::now().naive_utc())
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to update document page count")?;
        Ok(())
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM documents WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete document")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct FragmentQueries;

impl FragmentQueries {
    /// Swap a document's fragments for `fragments` in one transaction.
    ///
    /// Rows are inserted as given. Any failure rolls back the delete, so the
    /// previous fragments survive.
    #[inline]
    pub async fn replace_for_document(
        pool: &SqlitePool,
        document_id: i64,
        fragments: &[NewFragment],
    ) -> Result<ReplacedFragments> {
        let now = Utc::now().naive_utc();
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        let removed = sqlx::query("DELETE FROM fragments WHERE document_id = ?")
            .bind(document_id)
            .execute(&mut *tx)
            .await
            .context("Failed to delete fragments for document")?
            .rows_affected();

        let mut ids = Vec::with_capacity(fragments.len());
        for fragment in fragments {
            let id = sqlx::query(
                "INSERT INTO fragments (document_id, chunk_index, text, section_path, page_range, keywords, created_date) VALUES (?, ?, ?, ?, ?, ?, ?)",
            )
            .bind(fragment.document_id)
            .bind(fragment.chunk_index)
            .bind(&fragment.text)
            .bind(&fragment.section_path)
            .bind(&fragment.page_range)
            .bind(&fragment.keywords)
            .bind(now)
            .execute(&mut *tx)
            .await
            .context("Failed to insert fragment")?
            .last_insert_rowid();
            ids.push(id);
        }

        tx.commit()
            .await
            .context("Failed to commit fragment replacement")?;
        debug!(
            "Replaced {} fragments of document {} with {}",
            removed,
            document_id,
            ids.len()
        );

        if ids.is_empty() {
            return Ok(ReplacedFragments {
                removed,
                fragments: Vec::new(),
            });
        }

        let query = format!(
            "SELECT {} FROM fragments WHERE id IN ({}) ORDER BY id",
            FRAGMENT_COLUMNS,
            ids.iter().map(|_| "?").join(", ")
        );
        let mut select = sqlx::query_as::<_, Fragment>(&query);
        for id in &ids {
            select = select.bind(id);
        }
        let fragments = select
            .fetch_all(pool)
            .await
            .context("Failed to read inserted fragments")?;

        Ok(ReplacedFragments { removed, fragments })
    }

    /// Overwrite text, keywords and embedding of every fragment in one transaction
    #[inline]
    pub async fn save_all(pool: &SqlitePool, fragments: &[Fragment]) -> Result<()> {
        let mut tx = pool.begin().await.context("Failed to begin transaction")?;

        for fragment in fragments {
            let result = sqlx::query(
                "UPDATE fragments SET text = ?, section_path = ?, page_range = ?, keywords = ?, embedding_json = ? WHERE id = ?",
            )
            .bind(&fragment.text)
            .bind(&fragment.section_path)
            .bind(&fragment.page_range)
            .bind(&fragment.keywords)
            .bind(&fragment.embedding_json)
            .bind(fragment.id)
            .execute(&mut *tx)
            .await
            .context("Failed to save fragment")?;

            if result.rows_affected() == 0 {
                warn!("Fragment {} no longer exists, skipping save", fragment.id);
            }
        }

        tx.commit().await.context("Failed to commit fragment save")?;
        Ok(())
    }

    #[inline]
    pub async fn list_by_document(pool: &SqlitePool, document_id: i64) -> Result<Vec<Fragment>> {
        let query = format!(
            "SELECT {} FROM fragments WHERE document_id = ? ORDER BY chunk_index, id",
            FRAGMENT_COLUMNS
        );
        sqlx::query_as::<_, Fragment>(&query)
            .bind(document_id)
            .fetch_all(pool)
            .await
            .context("Failed to list fragments for document")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Fragment>> {
        let query = format!(
            "SELECT {} FROM fragments ORDER BY document_id, chunk_index, id",
            FRAGMENT_COLUMNS
        );
        sqlx::query_as::<_, Fragment>(&query)
            .fetch_all(pool)
            .await
            .context("Failed to list fragments")
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Fragment>> {
        let query = format!("SELECT {} FROM fragments WHERE id = ?", FRAGMENT_COLUMNS);
        sqlx::query_as::<_, Fragment>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get fragment by id")
    }

    #[inline]
    pub async fn count_by_document(pool: &SqlitePool, document_id: i64) -> Result<(i64, i64)> {
        let (total, embedded): (i64, i64) = sqlx::query_as(
            "SELECT COUNT(*), COUNT(embedding_json) FROM fragments WHERE document_id = ?",
        )
        .bind(document_id)
        .fetch_one(pool)
        .await
        .context("Failed to count fragments")?;

        Ok((total, embedded))
    }
}

pub struct QuizQueries;

impl QuizQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, title: &str) -> Result<Quiz> {
        let id = sqlx::query("INSERT INTO quizzes (title, created_date) VALUES (?, ?)")
            .bind(title)
            .bind(Utc::now().naive_utc())
            .execute(pool)
            .await
            .context("Failed to create quiz")?
            .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created quiz"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Quiz>> {
        let query = format!("SELECT {} FROM quizzes WHERE id = ?", QUIZ_COLUMNS);
        sqlx::query_as::<_, Quiz>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get quiz by id")
    }

    #[inline]
    pub async fn list_all(pool: &SqlitePool) -> Result<Vec<Quiz>> {
        let query = format!("SELECT {} FROM quizzes ORDER BY id", QUIZ_COLUMNS);
        sqlx::query_as::<_, Quiz>(&query)
            .fetch_all(pool)
            .await
            .context("Failed to list quizzes")
    }
}

pub struct QuestionQueries;

impl QuestionQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, new_question: &NewQuestion) -> Result<Question> {
        let options_json = serde_json::to_string(&new_question.options)
            .context("Failed to serialize question options")?;
        let knowledge_tags = new_question.knowledge_tags.join(",");

        let id = sqlx::query(
            "INSERT INTO questions (quiz_id, question_type, stem, options_json, answer, difficulty, knowledge_tags, fragment_id, quality_score, created_date) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(new_question.quiz_id)
        .bind(new_question.question_type)
        .bind(&new_question.stem)
        .bind(options_json)
        .bind(&new_question.answer)
        .bind(new_question.difficulty)
        .bind(knowledge_tags)
        .bind(new_question.fragment_id)
        .bind(new_question.quality_score)
        .bind(Utc::now().naive_utc())
        .execute(pool)
        .await
        .context("Failed to create question")?
        .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created question"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Question>> {
        let query = format!("SELECT {} FROM questions WHERE id = ?", QUESTION_COLUMNS);
        sqlx::query_as::<_, Question>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get question by id")
    }

    #[inline]
    pub async fn list_by_quiz(pool: &SqlitePool, quiz_id: i64) -> Result<Vec<Question>> {
        let query = format!(
            "SELECT {} FROM questions WHERE quiz_id = ? ORDER BY id",
            QUESTION_COLUMNS
        );
        sqlx::query_as::<_, Question>(&query)
            .bind(quiz_id)
            .fetch_all(pool)
            .await
            .context("Failed to list questions for quiz")
    }

    #[inline]
    pub async fn delete(pool: &SqlitePool, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM questions WHERE id = ?")
            .bind(id)
            .execute(pool)
            .await
            .context("Failed to delete question")?;

        Ok(result.rows_affected() > 0)
    }
}

pub struct AttemptQueries;

impl AttemptQueries {
    #[inline]
    pub async fn create(pool: &SqlitePool, quiz_id: i64, user_id: &str) -> Result<Attempt> {
        let id = sqlx::query("INSERT INTO attempts (quiz_id, user_id, created_date) VALUES (?, ?, ?)")
            .bind(quiz_id)
            .bind(user_id)
            .bind(Utc::now().naive_utc())
            .execute(pool)
            .await
            .context("Failed to create attempt")?
            .last_insert_rowid();

        Self::get_by_id(pool, id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("Failed to retrieve created attempt"))
    }

    #[inline]
    pub async fn get_by_id(pool: &SqlitePool, id: i64) -> Result<Option<Attempt>> {
        let query = format!("SELECT {} FROM attempts WHERE id = ?", ATTEMPT_COLUMNS);
        sqlx::query_as::<_, Attempt>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
            .context("Failed to get attempt by id")
    }

    /// Overwrite answers and score; a later submission replaces an earlier one
    #[inline]
    pub async fn record_submission(
        pool: &SqlitePool,
        id: i64,
        answers_json: &str,
        score: f64,
    ) -> Result<Option<Attempt>> {
        sqlx::query(
            "UPDATE attempts SET answers_json = ?, score = ?, submitted_date = ? WHERE id = ?",
        )
        .bind(answers_json)
        .bind(score)
        .bind(Utc::now().naive_utc())
        .bind(id)
        .execute(pool)
        .await
        .context("Failed to record attempt submission")?;

        Self::get_by_id(pool, id).await
    }

    #[inline]
    pub async fn list(pool: &SqlitePool, quiz_id: Option<i64>) -> Result<Vec<Attempt>> {
        let attempts = match quiz_id {
            Some(quiz_id) => {
                let query = format!(
                    "SELECT {} FROM attempts WHERE quiz_id = ? ORDER BY id",
                    ATTEMPT_COLUMNS
                );
                sqlx::query_as::<_, Attempt>(&query)
                    .bind(quiz_id)
                    .fetch_all(pool)
                    .await
            }
            None => {
                let query = format!("SELECT {} FROM attempts ORDER BY id", ATTEMPT_COLUMNS);
                sqlx::query_as::<_, Attempt>(&query).fetch_all(pool).await
            }
        };

        attempts.context("Failed to list attempts")
    }
}

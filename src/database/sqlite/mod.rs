use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::{Pool, Sqlite};
use std::path::Path;
use tracing::{debug, info};

use crate::database::FragmentStore;
use crate::database::sqlite::models::{
    Attempt, Document, DocumentStatus, Fragment, NewDocument, NewFragment, NewQuestion, Question,
    Quiz, ReplacedFragments,
};
use crate::database::sqlite::queries::{
    AttemptQueries, DocumentQueries, FragmentQueries, QuestionQueries, QuizQueries,
};

#[cfg(test)]
mod tests;

pub mod models;
pub mod queries;

pub type DbPool = Pool<Sqlite>;

#[derive(Debug, Clone)]
pub struct Database {
    pool: DbPool,
}

impl Database {
    #[inline]
    pub async fn new<P: AsRef<Path>>(database_url: P) -> Result<Self> {
        let options = SqliteConnectOptions::new()
            .filename(database_url)
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(10)
            .connect_with(options)
            .await
            .context("Failed to create database connection pool")?;

        let database = Self { pool };
        database.run_migrations().await?;

        Ok(database)
    }

    #[inline]
    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    #[inline]
    pub async fn run_migrations(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::migrate!("src/database/sqlite/migrations")
            .run(&self.pool)
            .await
            .context("Failed to run schema migration")?;

        debug!("Database migrations completed successfully");
        Ok(())
    }

    #[inline]
    pub async fn initialize_from_config_dir(config_dir: &Path) -> Result<Self> {
        let db_path = config_dir.join("metadata.db");

        std::fs::create_dir_all(config_dir).with_context(|| {
            format!(
                "Failed to create config directory: {}",
                config_dir.display()
            )
        })?;

        Self::new(db_path).await
    }

    // Document operations
    #[inline]
    pub async fn create_document(&self, document: NewDocument) -> Result<Document> {
        DocumentQueries::create(&self.pool, document).await
    }

    #[inline]
    pub async fn get_document(&self, id: i64) -> Result<Option<Document>> {
        DocumentQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        DocumentQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn update_document_status(
        &self,
        id: i64,
        status: DocumentStatus,
        error_message: Option<&str>,
    ) -> Result<Option<Document>> {
        DocumentQueries::update_status(&self.pool, id, status, error_message).await
    }

    #[inline]
    pub async fn set_document_page_count(&self, id: i64, page_count: i64) -> Result<()> {
        DocumentQueries::set_page_count(&self.pool, id, page_count).await
    }

    // Fragment operations
    #[inline]
    pub async fn list_fragments(&self) -> Result<Vec<Fragment>> {
        FragmentQueries::list_all(&self.pool).await
    }

    #[inline]
    pub async fn get_fragment(&self, id: i64) -> Result<Option<Fragment>> {
        FragmentQueries::get_by_id(&self.pool, id).await
    }

    /// Total and embedded fragment counts for a document
    #[inline]
    pub async fn fragment_counts(&self, document_id: i64) -> Result<(i64, i64)> {
        FragmentQueries::count_by_document(&self.pool, document_id).await
    }

    // Quiz operations
    #[inline]
    pub async fn create_quiz(&self, title: &str) -> Result<Quiz> {
        QuizQueries::create(&self.pool, title).await
    }

    #[inline]
    pub async fn get_quiz(&self, id: i64) -> Result<Option<Quiz>> {
        QuizQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn list_quizzes(&self) -> Result<Vec<Quiz>> {
        QuizQueries::list_all(&self.pool).await
    }

    // Question operations
    #[inline]
    pub async fn create_question(&self, question: &NewQuestion) -> Result<Question> {
        QuestionQueries::create(&self.pool, question).await
    }

    #[inline]
    pub async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>> {
        QuestionQueries::list_by_quiz(&self.pool, quiz_id).await
    }

    // Attempt operations
    #[inline]
    pub async fn create_attempt(&self, quiz_id: i64, user_id: &str) -> Result<Attempt> {
        AttemptQueries::create(&self.pool, quiz_id, user_id).await
    }

    #[inline]
    pub async fn get_attempt(&self, id: i64) -> Result<Option<Attempt>> {
        AttemptQueries::get_by_id(&self.pool, id).await
    }

    #[inline]
    pub async fn record_submission(
        &self,
        id: i64,
        answers_json: &str,
        score: f64,
    ) -> Result<Option<Attempt>> {
        AttemptQueries::record_submission(&self.pool, id, answers_json, score).await
    }

    #[inline]
    pub async fn list_attempts(&self, quiz_id: Option<i64>) -> Result<Vec<Attempt>> {
        AttemptQueries::list(&self.pool, quiz_id).await
    }
}

#[async_trait]
impl FragmentStore for Database {
    #[inline]
    async fn find_by_document(&self, document_id: i64) -> Result<Vec<Fragment>> {
        FragmentQueries::list_by_document(&self.pool, document_id).await
    }

    #[inline]
    async fn replace_by_document(
        &self,
        document_id: i64,
        fragments: &[NewFragment],
    ) -> Result<ReplacedFragments> {
        FragmentQueries::replace_for_document(&self.pool, document_id, fragments).await
    }

    #[inline]
    async fn save_all(&self, fragments: &[Fragment]) -> Result<()> {
        FragmentQueries::save_all(&self.pool, fragments).await
    }
}

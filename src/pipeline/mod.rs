// Document lifecycle, question generation and attempt grading on top of
// the stores, the retriever and the question generator

#[cfg(test)]
mod tests;

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::database::FragmentStore;
use crate::database::lancedb::{FragmentVector, VectorStore};
use crate::database::sqlite::Database;
use crate::database::sqlite::models::{
    Attempt, Document, DocumentStatus, Fragment, NewDocument, NewFragment, NewQuestion, Question,
    Quiz, ReplacedFragments,
};
use crate::embeddings::{
    ChunkingConfig, EmbeddingService, EmbeddingSource, chunk_document, encode_embedding,
};
use crate::grading::{AnalyticsReport, aggregate, encode_answers, grade};
use crate::questions::heuristics::fallback_tags;
use crate::questions::{
    Difficulty, DraftOverrides, QuestionGenerator, QuestionType, SourceFragment,
};
use crate::retrieval::{NearestNeighborIndex, RankedFragment, Retriever, filter_by_keyword};
use crate::{QuizError, Result};

/// What to generate for one quiz
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationRequest {
    pub count: usize,
    /// Rank fragments against this text instead of taking them in document order
    pub query: Option<String>,
    pub keyword: Option<String>,
    pub question_type: Option<QuestionType>,
    pub difficulty: Option<Difficulty>,
    pub tags: Vec<String>,
}

impl Default for GenerationRequest {
    #[inline]
    fn default() -> Self {
        Self {
            count: 5,
            query: None,
            keyword: None,
            question_type: None,
            difficulty: None,
            tags: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EmbeddingSummary {
    pub fragments: usize,
    pub external: usize,
    pub fallback: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub document: Document,
    pub fragments: i64,
    pub embedded: i64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AttemptReport {
    pub attempt: Attempt,
    pub score: Option<f64>,
    pub answers: HashMap<String, String>,
}

fn persistence(e: anyhow::Error) -> QuizError {
    QuizError::Database(format!("{:#}", e))
}

pub struct QuizPipeline {
    database: Database,
    fragments: Arc<dyn FragmentStore>,
    vector_store: Option<Arc<VectorStore>>,
    retriever: Retriever,
    embeddings: EmbeddingService,
    generator: QuestionGenerator,
    chunking: ChunkingConfig,
}

impl QuizPipeline {
    /// Pipeline over `database` with exact retrieval, the default local
    /// embedding fallback and heuristic question drafting
    #[inline]
    pub fn new(database: Database) -> Self {
        Self {
            fragments: Arc::new(database.clone()),
            database,
            vector_store: None,
            retriever: Retriever::exact(),
            embeddings: EmbeddingService::fallback_only(&Default::default()),
            generator: QuestionGenerator::heuristic(),
            chunking: ChunkingConfig::default(),
        }
    }

    /// Open the stores under the configured base directory and wire the
    /// configured models. An unavailable vector index is not an error.
    #[inline]
    pub async fn from_config(config: &Config) -> Result<Self> {
        let database = Database::initialize_from_config_dir(config.get_base_dir())
            .await
            .map_err(persistence)?;

        let embeddings = EmbeddingService::from_config(config)
            .map_err(|e| QuizError::Embedding(format!("{:#}", e)))?;
        let generator = QuestionGenerator::from_config(config)
            .map_err(|e| QuizError::Generation(format!("{:#}", e)))?;

        let pipeline = Self::new(database)
            .with_embeddings(embeddings)
            .with_generator(generator)
            .with_chunking(config.chunking.clone());

        match VectorStore::new(config).await {
            Ok(store) => Ok(pipeline.with_vector_store(Arc::new(store))),
            Err(e) => {
                warn!("Vector index unavailable, using exact retrieval only: {}", e);
                Ok(pipeline)
            }
        }
    }

    #[inline]
    #[must_use]
    pub fn with_fragment_store(mut self, fragments: Arc<dyn FragmentStore>) -> Self {
        self.fragments = fragments;
        self
    }

    /// Keep `store` in sync with embedded fragments and use it for indexed retrieval
    #[inline]
    #[must_use]
    pub fn with_vector_store(mut self, store: Arc<VectorStore>) -> Self {
        let index: Arc<dyn NearestNeighborIndex> = store.clone();
        self.retriever = Retriever::new(Some(index));
        self.vector_store = Some(store);
        self
    }

    #[inline]
    #[must_use]
    pub fn with_embeddings(mut self, embeddings: EmbeddingService) -> Self {
        self.embeddings = embeddings;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_generator(mut self, generator: QuestionGenerator) -> Self {
        self.generator = generator;
        self
    }

    #[inline]
    #[must_use]
    pub fn with_chunking(mut self, chunking: ChunkingConfig) -> Self {
        self.chunking = chunking;
        self
    }

    #[inline]
    pub fn database(&self) -> &Database {
        &self.database
    }

    async fn require_document(&self, document_id: i64) -> Result<Document> {
        self.database
            .get_document(document_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| QuizError::not_found("document", document_id))
    }

    async fn require_quiz(&self, quiz_id: i64) -> Result<Quiz> {
        self.database
            .get_quiz(quiz_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| QuizError::not_found("quiz", quiz_id))
    }

    async fn require_attempt(&self, attempt_id: i64) -> Result<Attempt> {
        self.database
            .get_attempt(attempt_id)
            .await
            .map_err(persistence)?
            .ok_or_else(|| QuizError::not_found("attempt", attempt_id))
    }

    async fn set_status(&self, document_id: i64, status: DocumentStatus) -> Result<()> {
        info!("Document {} is now {}", document_id, status);
        self.database
            .update_document_status(document_id, status, None)
            .await
            .map_err(persistence)?;
        Ok(())
    }

    async fn mark_failed(&self, document_id: i64, cause: &QuizError) {
        let message = cause.to_string();
        error!("Processing document {} failed: {}", document_id, message);
        if let Err(e) = self
            .database
            .update_document_status(document_id, DocumentStatus::Failed, Some(message.as_str()))
            .await
        {
            error!("Could not record failure of document {}: {:#}", document_id, e);
        }
    }

    /// Register a document, then parse and embed it
    #[inline]
    pub async fn ingest(
        &self,
        title: &str,
        source_path: Option<String>,
        text: &str,
        page_count: u32,
    ) -> Result<Document> {
        let document = self
            .database
            .create_document(NewDocument {
                title: title.to_string(),
                source_path,
                page_count: i64::from(page_count),
            })
            .await
            .map_err(persistence)?;
        info!("Registered document {} ({})", document.id, document.title);

        self.parse_document(document.id, text, page_count).await?;
        self.embed_document(document.id).await?;

        self.require_document(document.id).await
    }

    /// Replace the document's fragments with fresh chunks of `text`.
    ///
    /// Leaves the document in `embedding` status; any failure marks it
    /// `failed` and is returned.
    #[inline]
    pub async fn parse_document(
        &self,
        document_id: i64,
        text: &str,
        page_count: u32,
    ) -> Result<Vec<Fragment>> {
        self.require_document(document_id).await?;
        self.set_status(document_id, DocumentStatus::Parsing).await?;

        match self.store_chunks(document_id, text, page_count).await {
            Ok(fragments) => {
                self.set_status(document_id, DocumentStatus::Embedding)
                    .await?;
                Ok(fragments)
            }
            Err(e) => {
                self.mark_failed(document_id, &e).await;
                Err(e)
            }
        }
    }

    async fn store_chunks(
        &self,
        document_id: i64,
        text: &str,
        page_count: u32,
    ) -> Result<Vec<Fragment>> {
        let chunked = chunk_document(text, page_count, &self.chunking);

        let new_fragments: Vec<NewFragment> = chunked
            .chunks
            .iter()
            .enumerate()
            .map(|(index, chunk)| {
                let keywords = fallback_tags(chunk);
                NewFragment {
                    document_id,
                    chunk_index: index as i64,
                    text: chunk.clone(),
                    section_path: None,
                    page_range: chunked.page_range.clone(),
                    keywords: (!keywords.is_empty()).then(|| keywords.join(",")),
                }
            })
            .collect();

        let ReplacedFragments { removed, fragments } = self
            .fragments
            .replace_by_document(document_id, &new_fragments)
            .await
            .map_err(persistence)?;
        if removed > 0 {
            debug!("Removed {} previous fragments of document {}", removed, document_id);
            if let Some(store) = &self.vector_store {
                if let Err(e) = store.delete_document_embeddings(document_id).await {
                    warn!("Could not clear indexed vectors of document {}: {}", document_id, e);
                }
            }
        }
        self.database
            .set_document_page_count(document_id, i64::from(page_count))
            .await
            .map_err(persistence)?;

        info!(
            "Stored {} fragments for document {}",
            fragments.len(),
            document_id
        );
        Ok(fragments)
    }

    /// Embed every fragment of the document and persist the vectors.
    ///
    /// The SQLite write is authoritative; refreshing the vector index is
    /// best-effort. A persistence failure marks the document `failed`.
    #[inline]
    pub async fn embed_document(&self, document_id: i64) -> Result<EmbeddingSummary> {
        self.require_document(document_id).await?;
        self.set_status(document_id, DocumentStatus::Embedding)
            .await?;

        match self.embed_fragments(document_id).await {
            Ok(summary) => {
                self.set_status(document_id, DocumentStatus::Done).await?;
                Ok(summary)
            }
            Err(e) => {
                self.mark_failed(document_id, &e).await;
                Err(e)
            }
        }
    }

    async fn embed_fragments(&self, document_id: i64) -> Result<EmbeddingSummary> {
        let mut fragments = self
            .fragments
            .find_by_document(document_id)
            .await
            .map_err(persistence)?;

        let bar = if console::user_attended_stderr() {
            ProgressBar::new(fragments.len() as u64).with_style(
                ProgressStyle::with_template("{spinner} [{pos}/{len}] Embedding {msg}")
                    .expect("style template is valid"),
            )
        } else {
            ProgressBar::hidden()
        };

        let mut summary = EmbeddingSummary {
            fragments: fragments.len(),
            ..EmbeddingSummary::default()
        };
        for fragment in &mut fragments {
            bar.set_message(format!("fragment {}", fragment.id));
            let (embedding, source) = self.embeddings.embed_with_source(&fragment.text);
            match source {
                EmbeddingSource::External => summary.external += 1,
                EmbeddingSource::Fallback => summary.fallback += 1,
            }
            fragment.embedding_json = Some(encode_embedding(&embedding));
            bar.inc(1);
        }
        bar.finish_and_clear();

        self.fragments
            .save_all(&fragments)
            .await
            .map_err(persistence)?;

        if let Some(store) = &self.vector_store {
            let records: Vec<FragmentVector> = fragments
                .iter()
                .filter_map(FragmentVector::from_fragment)
                .collect();
            if let Err(e) = store.replace_document_embeddings(document_id, &records).await {
                warn!("Vector index not updated for document {}: {}", document_id, e);
            }
        }

        info!(
            "Embedded {} fragments of document {} ({} external, {} fallback)",
            summary.fragments, document_id, summary.external, summary.fallback
        );
        Ok(summary)
    }

    /// Document with its fragment counts
    #[inline]
    pub async fn document_status(&self, document_id: i64) -> Result<DocumentReport> {
        let document = self.require_document(document_id).await?;
        let (fragments, embedded) = self
            .database
            .fragment_counts(document_id)
            .await
            .map_err(persistence)?;

        Ok(DocumentReport {
            document,
            fragments,
            embedded,
        })
    }

    #[inline]
    pub async fn list_documents(&self) -> Result<Vec<Document>> {
        self.database.list_documents().await.map_err(persistence)
    }

    /// Top `top_k` fragments for a free-text query, across all documents
    /// unless `document_id` narrows the search
    #[inline]
    pub async fn search(
        &self,
        query: &str,
        top_k: usize,
        document_id: Option<i64>,
        keyword: Option<&str>,
    ) -> Result<Vec<RankedFragment>> {
        let candidates = match document_id {
            Some(document_id) => {
                self.require_document(document_id).await?;
                self.fragments
                    .find_by_document(document_id)
                    .await
                    .map_err(persistence)?
            }
            None => self.database.list_fragments().await.map_err(persistence)?,
        };

        let query_vector = self.embeddings.embed_with_source(query).0;
        Ok(self
            .retriever
            .retrieve(&query_vector, candidates, top_k, keyword, document_id)
            .await)
    }

    #[inline]
    pub async fn create_quiz(&self, title: &str) -> Result<Quiz> {
        let title = title.trim();
        if title.is_empty() {
            return Err(QuizError::InvalidInput(
                "Quiz title cannot be blank".to_string(),
            ));
        }
        self.database.create_quiz(title).await.map_err(persistence)
    }

    #[inline]
    pub async fn list_quizzes(&self) -> Result<Vec<Quiz>> {
        self.database.list_quizzes().await.map_err(persistence)
    }

    #[inline]
    pub async fn list_questions(&self, quiz_id: i64) -> Result<Vec<Question>> {
        self.require_quiz(quiz_id).await?;
        self.database
            .list_questions(quiz_id)
            .await
            .map_err(persistence)
    }

    /// Draft, adapt, score and persist up to `request.count` questions from
    /// the document's fragments
    #[inline]
    pub async fn generate_questions(
        &self,
        quiz_id: i64,
        document_id: i64,
        request: &GenerationRequest,
    ) -> Result<Vec<Question>> {
        self.require_quiz(quiz_id).await?;
        self.require_document(document_id).await?;

        let candidates = self
            .fragments
            .find_by_document(document_id)
            .await
            .map_err(persistence)?;
        let keyword = request.keyword.as_deref();

        let sources: Vec<Fragment> = match request.query.as_deref().map(str::trim) {
            Some(query) if !query.is_empty() => {
                let query_vector = self.embeddings.embed_with_source(query).0;
                self.retriever
                    .retrieve(
                        &query_vector,
                        candidates,
                        request.count,
                        keyword,
                        Some(document_id),
                    )
                    .await
                    .into_iter()
                    .map(|ranked| ranked.fragment)
                    .collect()
            }
            _ => filter_by_keyword(candidates, keyword)
                .into_iter()
                .take(request.count)
                .collect(),
        };

        if sources.is_empty() {
            info!("No fragments of document {} match the request", document_id);
            return Ok(Vec::new());
        }

        let overrides = DraftOverrides {
            question_type: request.question_type,
            difficulty: request.difficulty,
            tags: request.tags.clone(),
        };

        let mut questions = Vec::with_capacity(sources.len());
        for fragment in &sources {
            let scored = self
                .generator
                .generate_with(SourceFragment::from(fragment), &overrides);
            let draft = scored.draft;

            let question = self
                .database
                .create_question(&NewQuestion {
                    quiz_id,
                    question_type: draft.question_type,
                    stem: draft.stem,
                    options: draft.options,
                    answer: draft.answer,
                    difficulty: draft.difficulty,
                    knowledge_tags: draft.tags,
                    fragment_id: draft.source_fragment_id,
                    quality_score: i64::from(scored.quality_score),
                })
                .await
                .map_err(persistence)?;
            questions.push(question);
        }

        info!(
            "Generated {} questions for quiz {} from document {}",
            questions.len(),
            quiz_id,
            document_id
        );
        Ok(questions)
    }

    #[inline]
    pub async fn start_attempt(&self, quiz_id: i64, user_id: &str) -> Result<Attempt> {
        self.require_quiz(quiz_id).await?;
        self.database
            .create_attempt(quiz_id, user_id)
            .await
            .map_err(persistence)
    }

    /// Grade `answers` against the quiz's questions and store them, replacing
    /// any earlier submission. Returns the score.
    #[inline]
    pub async fn submit_attempt(
        &self,
        attempt_id: i64,
        answers: &HashMap<String, String>,
    ) -> Result<f64> {
        let attempt = self.require_attempt(attempt_id).await?;
        let questions = self
            .database
            .list_questions(attempt.quiz_id)
            .await
            .map_err(persistence)?;

        let score = grade(&questions, answers);
        let answers_json = encode_answers(answers)?;

        self.database
            .record_submission(attempt_id, &answers_json, score)
            .await
            .map_err(persistence)?
            .ok_or_else(|| QuizError::not_found("attempt", attempt_id))?;

        info!(
            "Attempt {} scored {:.2} over {} questions",
            attempt_id,
            score,
            questions.len()
        );
        Ok(score)
    }

    #[inline]
    pub async fn attempt_report(&self, attempt_id: i64) -> Result<AttemptReport> {
        let attempt = self.require_attempt(attempt_id).await?;
        Ok(AttemptReport {
            score: attempt.score,
            answers: attempt.answers(),
            attempt,
        })
    }

    /// Per-tag and per-difficulty accuracy over all attempts, or one quiz's
    #[inline]
    pub async fn analytics(&self, quiz_id: Option<i64>) -> Result<AnalyticsReport> {
        if let Some(quiz_id) = quiz_id {
            self.require_quiz(quiz_id).await?;
        }

        let attempts = self
            .database
            .list_attempts(quiz_id)
            .await
            .map_err(persistence)?;

        let quiz_ids: HashSet<i64> = attempts.iter().map(|attempt| attempt.quiz_id).collect();
        let mut questions_by_quiz = HashMap::with_capacity(quiz_ids.len());
        for quiz_id in quiz_ids {
            let questions = self
                .database
                .list_questions(quiz_id)
                .await
                .map_err(persistence)?;
            questions_by_quiz.insert(quiz_id, questions);
        }

        Ok(aggregate(&attempts, &questions_by_quiz))
    }
}


use super::FragmentVector;
use crate::retrieval::{IndexHit, NearestNeighborIndex};
use crate::{QuizError, config::Config};
use arrow::array::{
    Array, FixedSizeListArray, Float32Array, Int64Array, RecordBatchIterator, StringArray,
};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::record_batch::RecordBatch;
use async_trait::async_trait;
use futures::TryStreamExt;
use lancedb::{
    Connection, DistanceType,
    query::{ExecutableQuery, QueryBase},
};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

const TABLE_NAME: &str = "fragment_embeddings";

/// Fragment vector index backed by LanceDB
pub struct VectorStore {
    connection: Connection,
    table_name: String,
    vector_dimension: Mutex<Option<usize>>,
}

/// Hit from a cosine similarity search
#[derive(Debug, Clone, PartialEq)]
pub struct VectorSearchResult {
    pub fragment_id: i64,
    pub document_id: i64,
    pub similarity_score: f32,
    pub distance: f32,
}

fn database_error(context: &str, e: impl std::fmt::Display) -> QuizError {
    QuizError::Database(format!("{}: {}", context, e))
}

fn int_column<'a>(batch: &'a RecordBatch, name: &str) -> Result<&'a Int64Array, QuizError> {
    batch
        .column_by_name(name)
        .ok_or_else(|| QuizError::Database(format!("Missing {} column", name)))?
        .as_any()
        .downcast_ref::<Int64Array>()
        .ok_or_else(|| QuizError::Database(format!("Invalid {} column type", name)))
}

impl VectorStore {
    /// Open (or create) the vector database under the configured base directory
    #[inline]
    pub async fn new(config: &Config) -> Result<Self, QuizError> {
        Self::open(&config.vector_database_path()).await
    }

    #[inline]
    pub async fn open(db_path: &Path) -> Result<Self, QuizError> {
        debug!("Initializing LanceDB at path: {:?}", db_path);

        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| database_error("Failed to create vector database directory", e))?;
        }

        let uri = format!("file://{}", db_path.display());

        let connection = match lancedb::connect(&uri).execute().await {
            Ok(conn) => conn,
            Err(e) => {
                error!("Failed to connect to LanceDB: {}", e);

                let error_msg = e.to_string().to_lowercase();
                if !(error_msg.contains("corrupt")
                    || error_msg.contains("invalid")
                    || error_msg.contains("malformed"))
                {
                    return Err(database_error("Failed to connect to LanceDB", e));
                }

                warn!("Vector database corruption detected, discarding index");
                Self::discard_corrupted(db_path)?;
                lancedb::connect(&uri)
                    .execute()
                    .await
                    .map_err(|e| database_error("Failed to connect to LanceDB after recovery", e))?
            }
        };

        let store = Self {
            connection,
            table_name: TABLE_NAME.to_string(),
            vector_dimension: Mutex::new(None),
        };

        let dimension = store.detect_existing_vector_dimension().await;
        if let Some(dim) = dimension {
            info!("Detected existing vector dimension: {}", dim);
        }
        *store.vector_dimension.lock().await = dimension;

        Ok(store)
    }

    // The index is derived data; SQLite can always rebuild it
    fn discard_corrupted(db_path: &Path) -> Result<(), QuizError> {
        if db_path.exists() {
            let backup_path = db_path.with_extension("corrupted_backup");
            if let Err(e) = std::fs::rename(db_path, &backup_path) {
                error!("Failed to back up corrupted vector database: {}", e);
                std::fs::remove_dir_all(db_path)
                    .map_err(|e| database_error("Failed to remove corrupted vector database", e))?;
            } else {
                info!("Corrupted vector database moved to {:?}", backup_path);
            }
        }
        Ok(())
    }

    async fn table_exists(&self) -> Result<bool, QuizError> {
        let table_names = self
            .connection
            .table_names()
            .execute()
            .await
            .map_err(|e| database_error("Failed to list tables", e))?;
        Ok(table_names.contains(&self.table_name))
    }

    async fn detect_existing_vector_dimension(&self) -> Option<usize> {
        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .ok()?;
        let schema = table.schema().await.ok()?;

        schema.fields().iter().find_map(|field| {
            match (field.name().as_str(), field.data_type()) {
                ("vector", DataType::FixedSizeList(_, size)) => usize::try_from(*size).ok(),
                _ => None,
            }
        })
    }

    fn create_schema(vector_dim: usize) -> Arc<Schema> {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Utf8, false),
            Field::new(
                "vector",
                DataType::FixedSizeList(
                    Arc::new(Field::new("item", DataType::Float32, false)),
                    vector_dim as i32,
                ),
                false,
            ),
            Field::new("fragment_id", DataType::Int64, false),
            Field::new("document_id", DataType::Int64, false),
            Field::new("keywords", DataType::Utf8, true),
            Field::new("created_at", DataType::Utf8, false),
        ]))
    }

    /// Vector dimension of the current table, `None` before the first insert
    #[inline]
    pub async fn dimension(&self) -> Option<usize> {
        *self.vector_dimension.lock().await
    }

    /// Replace every vector of `document_id` with `records`.
    ///
    /// A dimension change drops the whole table first; the other documents'
    /// vectors disappear from the index until they are embedded again.
    #[inline]
    pub async fn replace_document_embeddings(
        &self,
        document_id: i64,
        records: &[FragmentVector],
    ) -> Result<(), QuizError> {
        let mut dimension = self.vector_dimension.lock().await;

        if dimension.is_some() {
            self.delete_document_rows(document_id).await?;
        }

        let Some(first) = records.first() else {
            debug!("No vectors to store for document {}", document_id);
            return Ok(());
        };

        let vector_dim = first.vector.len();
        if records.iter().any(|record| record.vector.len() != vector_dim) {
            return Err(QuizError::InvalidInput(format!(
                "Mixed vector dimensions for document {}",
                document_id
            )));
        }

        if *dimension != Some(vector_dim) {
            info!(
                "Vector dimension changed from {:?} to {}, recreating table",
                *dimension, vector_dim
            );
            self.recreate_table_with_dimension(vector_dim).await?;
            *dimension = Some(vector_dim);
        }

        let record_batch = Self::create_record_batch(records, vector_dim)?;

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| database_error("Failed to open table", e))?;

        let schema = record_batch.schema();
        let reader = RecordBatchIterator::new(std::iter::once(Ok(record_batch)), schema);
        table
            .add(reader)
            .execute()
            .await
            .map_err(|e| database_error("Failed to insert vectors", e))?;

        info!(
            "Indexed {} vectors for document {}",
            records.len(),
            document_id
        );
        Ok(())
    }

    async fn delete_document_rows(&self, document_id: i64) -> Result<(), QuizError> {
        if !self.table_exists().await? {
            return Ok(());
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| database_error("Failed to open table", e))?;

        table
            .delete(&format!("document_id = {}", document_id))
            .await
            .map_err(|e| database_error("Failed to delete document vectors", e))?;

        debug!("Deleted vectors for document {}", document_id);
        Ok(())
    }

    /// Remove every vector of a document
    #[inline]
    pub async fn delete_document_embeddings(&self, document_id: i64) -> Result<(), QuizError> {
        let _guard = self.vector_dimension.lock().await;
        self.delete_document_rows(document_id).await
    }

    async fn recreate_table_with_dimension(&self, vector_dim: usize) -> Result<(), QuizError> {
        if self.table_exists().await? {
            info!("Dropping existing vector table");
            self.connection
                .drop_table(&self.table_name)
                .await
                .map_err(|e| database_error("Failed to drop table", e))?;
        }

        self.connection
            .create_empty_table(&self.table_name, Self::create_schema(vector_dim))
            .execute()
            .await
            .map_err(|e| database_error("Failed to create vector table", e))?;

        info!("Vector table created with {} dimensions", vector_dim);
        Ok(())
    }

    fn create_record_batch(
        records: &[FragmentVector],
        vector_dim: usize,
    ) -> Result<RecordBatch, QuizError> {
        let len = records.len();

        let mut ids = Vec::with_capacity(len);
        let mut flat_values = Vec::with_capacity(len * vector_dim);
        let mut fragment_ids = Vec::with_capacity(len);
        let mut document_ids = Vec::with_capacity(len);
        let mut keywords = Vec::with_capacity(len);
        let mut created_ats = Vec::with_capacity(len);

        for record in records {
            ids.push(record.id.as_str());
            flat_values.extend_from_slice(&record.vector);
            fragment_ids.push(record.fragment_id);
            document_ids.push(record.document_id);
            keywords.push(record.keywords.as_deref());
            created_ats.push(record.created_at.as_str());
        }

        let field = Arc::new(Field::new("item", DataType::Float32, false));
        let vector_array = FixedSizeListArray::try_new(
            field,
            vector_dim as i32,
            Arc::new(Float32Array::from(flat_values)),
            None,
        )
        .map_err(|e| database_error("Failed to create vector array", e))?;

        let arrays: Vec<Arc<dyn Array>> = vec![
            Arc::new(StringArray::from(ids)),
            Arc::new(vector_array),
            Arc::new(Int64Array::from(fragment_ids)),
            Arc::new(Int64Array::from(document_ids)),
            Arc::new(StringArray::from(keywords)),
            Arc::new(StringArray::from(created_ats)),
        ];

        RecordBatch::try_new(Self::create_schema(vector_dim), arrays)
            .map_err(|e| database_error("Failed to create record batch", e))
    }

    /// Cosine search, nearest first, optionally restricted to one document
    #[inline]
    pub async fn search(
        &self,
        query_vector: &[f32],
        limit: usize,
        document_filter: Option<i64>,
    ) -> Result<Vec<VectorSearchResult>, QuizError> {
        debug!("Searching for similar vectors with limit: {}", limit);

        if limit == 0 {
            return Ok(Vec::new());
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| database_error("Failed to open table", e))?;

        let mut query = table
            .vector_search(query_vector)
            .map_err(|e| database_error("Failed to create vector search", e))?
            .column("vector")
            .distance_type(DistanceType::Cosine)
            .limit(limit);

        if let Some(document_id) = document_filter {
            query = query.only_if(format!("document_id = {}", document_id));
        }

        let mut results = query
            .execute()
            .await
            .map_err(|e| database_error("Failed to execute search", e))?;

        let mut hits = Vec::new();
        while let Some(batch) = results
            .try_next()
            .await
            .map_err(|e| database_error("Failed to read result stream", e))?
        {
            hits.extend(Self::parse_search_batch(&batch)?);
        }

        debug!("Vector search returned {} hits", hits.len());
        Ok(hits)
    }

    fn parse_search_batch(batch: &RecordBatch) -> Result<Vec<VectorSearchResult>, QuizError> {
        let fragment_ids = int_column(batch, "fragment_id")?;
        let document_ids = int_column(batch, "document_id")?;
        let distances = batch
            .column_by_name("_distance")
            .and_then(|col| col.as_any().downcast_ref::<Float32Array>());

        Ok((0..batch.num_rows())
            .map(|row| {
                let distance = distances
                    .map_or(0.0, |d| if d.is_null(row) { 0.0 } else { d.value(row) });
                VectorSearchResult {
                    fragment_id: fragment_ids.value(row),
                    document_id: document_ids.value(row),
                    similarity_score: 1.0 - distance,
                    distance,
                }
            })
            .collect())
    }

    /// Number of stored vectors, zero before the first insert
    #[inline]
    pub async fn count_embeddings(&self) -> Result<u64, QuizError> {
        if !self.table_exists().await? {
            return Ok(0);
        }

        let table = self
            .connection
            .open_table(&self.table_name)
            .execute()
            .await
            .map_err(|e| database_error("Failed to open table", e))?;

        let count = table
            .count_rows(None)
            .await
            .map_err(|e| database_error("Failed to count rows", e))?;

        Ok(count as u64)
    }
}

#[async_trait]
impl NearestNeighborIndex for VectorStore {
    #[inline]
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        document_id: Option<i64>,
    ) -> anyhow::Result<Vec<IndexHit>> {
        if self.dimension().await != Some(query.len()) {
            anyhow::bail!("Query dimension {} does not match the index", query.len());
        }

        Ok(self
            .search(query, k, document_id)
            .await?
            .into_iter()
            .map(|result| IndexHit {
                fragment_id: result.fragment_id,
                similarity: result.similarity_score,
            })
            .collect())
    }
}

// Dual store: SQLite for documents, fragments, quizzes and attempts,
// LanceDB for the fragment vector index

pub mod lancedb;
pub mod sqlite;

use anyhow::Result;
use async_trait::async_trait;

pub use sqlite::*;

use sqlite::models::{Fragment, NewFragment, ReplacedFragments};

/// Persistence of a document's fragments and their embeddings
#[async_trait]
pub trait FragmentStore: Send + Sync {
    /// Fragments of one document in chunk order
    async fn find_by_document(&self, document_id: i64) -> Result<Vec<Fragment>>;

    /// Swap the document's fragments for `fragments` atomically. A failure
    /// leaves the previous fragments in place.
    async fn replace_by_document(
        &self,
        document_id: i64,
        fragments: &[NewFragment],
    ) -> Result<ReplacedFragments>;

    /// Overwrite stored fragments atomically
    async fn save_all(&self, fragments: &[Fragment]) -> Result<()>;
}

// LanceDB vector index over fragment embeddings
// SQLite stays the source of truth; this table only accelerates nearest-neighbor lookup


pub mod vector_store;

pub use vector_store::{VectorSearchResult, VectorStore};

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::database::sqlite::models::Fragment;

/// One fragment vector stored in LanceDB
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragmentVector {
    /// Row identifier, derived from the fragment id
    pub id: String,
    pub vector: Vec<f32>,
    /// ID of the fragment in SQLite
    pub fragment_id: i64,
    pub document_id: i64,
    pub keywords: Option<String>,
    pub created_at: String,
}

impl FragmentVector {
    #[inline]
    pub fn new(fragment: &Fragment, vector: Vec<f32>) -> Self {
        Self {
            id: format!("fragment-{}", fragment.id),
            vector,
            fragment_id: fragment.id,
            document_id: fragment.document_id,
            keywords: fragment.keywords.clone(),
            created_at: Utc::now().to_rfc3339(),
        }
    }

    /// Vector record for an embedded fragment, `None` when it has no usable embedding
    #[inline]
    pub fn from_fragment(fragment: &Fragment) -> Option<Self> {
        let vector = fragment.embedding();
        (!vector.is_empty()).then(|| Self::new(fragment, vector))
    }
}

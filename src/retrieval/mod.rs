
use std::collections::HashSet;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use crate::database::sqlite::models::Fragment;

/// Accelerated nearest-neighbor lookup over stored fragment vectors
#[async_trait]
pub trait NearestNeighborIndex: Send + Sync {
    /// Up to `k` fragment hits ordered by ascending distance, optionally
    /// restricted to one document
    async fn nearest(
        &self,
        query: &[f32],
        k: usize,
        document_id: Option<i64>,
    ) -> Result<Vec<IndexHit>>;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct IndexHit {
    pub fragment_id: i64,
    pub similarity: f32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RankedFragment {
    pub fragment: Fragment,
    pub score: f32,
}

/// Cosine similarity over the overlapping prefix of two vectors.
///
/// Returns 0 when either side is empty or has zero magnitude.
#[inline]
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (dot, norm_a, norm_b) = a
        .iter()
        .zip(b.iter())
        .fold((0.0f64, 0.0f64, 0.0f64), |(d, na, nb), (x, y)| {
            let (x, y) = (f64::from(*x), f64::from(*y));
            (x.mul_add(y, d), x.mul_add(x, na), y.mul_add(y, nb))
        });

    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }

    (dot / (norm_a.sqrt() * norm_b.sqrt())).clamp(-1.0, 1.0) as f32
}

/// Exact scan: score every candidate, stable sort descending, keep the top `k`
#[inline]
pub fn rank(query: &[f32], candidates: &[Fragment], k: usize) -> Vec<RankedFragment> {
    if k == 0 {
        return Vec::new();
    }

    let mut scored: Vec<RankedFragment> = candidates
        .iter()
        .map(|fragment| RankedFragment {
            score: cosine_similarity(query, &fragment.embedding()),
            fragment: fragment.clone(),
        })
        .collect();

    scored.sort_by(|a, b| b.score.total_cmp(&a.score));
    scored.truncate(k);
    scored
}

/// Keep candidates whose keyword field contains `keyword`, ignoring case.
/// A missing or blank keyword keeps everything.
#[inline]
pub fn filter_by_keyword(candidates: Vec<Fragment>, keyword: Option<&str>) -> Vec<Fragment> {
    let Some(needle) = keyword
        .map(str::trim)
        .filter(|k| !k.is_empty())
        .map(str::to_lowercase)
    else {
        return candidates;
    };

    candidates
        .into_iter()
        .filter(|fragment| {
            fragment
                .keywords
                .as_deref()
                .is_some_and(|keywords| keywords.to_lowercase().contains(&needle))
        })
        .collect()
}

#[derive(Clone, Default)]
pub struct Retriever {
    index: Option<Arc<dyn NearestNeighborIndex>>,
}

impl Retriever {
    #[inline]
    pub fn new(index: Option<Arc<dyn NearestNeighborIndex>>) -> Self {
        Self { index }
    }

    #[inline]
    pub fn exact() -> Self {
        Self::default()
    }

    #[inline]
    pub fn has_index(&self) -> bool {
        self.index.is_some()
    }

    /// Rank `candidates` against `query`, keyword-filtering before the top-k cut.
    ///
    /// The result is always the exact ranking, ties kept in input order. When
    /// no keyword filter applies, the index answer is compared against it and
    /// any disagreement is logged.
    #[inline]
    pub async fn retrieve(
        &self,
        query: &[f32],
        candidates: Vec<Fragment>,
        k: usize,
        keyword: Option<&str>,
        document_id: Option<i64>,
    ) -> Vec<RankedFragment> {
        let keyword_active = keyword.is_some_and(|k| !k.trim().is_empty());
        let candidates = filter_by_keyword(candidates, keyword);

        if k == 0 || candidates.is_empty() {
            return Vec::new();
        }

        let ranked = rank(query, &candidates, k);

        if !keyword_active {
            if let Some(index) = &self.index {
                Self::index_agrees(index.as_ref(), query, &ranked, document_id).await;
            }
        }

        ranked
    }

    /// Whether the index names the same fragments as the exact top-k.
    /// Hit order is ignored since tied scores may come back in any order.
    async fn index_agrees(
        index: &dyn NearestNeighborIndex,
        query: &[f32],
        ranked: &[RankedFragment],
        document_id: Option<i64>,
    ) -> bool {
        let hits = match index.nearest(query, ranked.len(), document_id).await {
            Ok(hits) => hits,
            Err(e) => {
                warn!("Indexed search failed: {:#}", e);
                return false;
            }
        };

        let exact: HashSet<i64> = ranked.iter().map(|r| r.fragment.id).collect();
        let indexed: HashSet<i64> = hits.iter().map(|hit| hit.fragment_id).collect();

        let agrees = hits.len() == ranked.len() && indexed == exact;
        if !agrees {
            debug!(
                "Index returned {:?}, exact scan chose {:?}",
                hits.iter().map(|hit| hit.fragment_id).collect::<Vec<_>>(),
                ranked.iter().map(|r| r.fragment.id).collect::<Vec<_>>()
            );
        }
        agrees
    }
}

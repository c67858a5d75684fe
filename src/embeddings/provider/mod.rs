
use std::fmt;

use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::ollama::OllamaClient;
use crate::config::Config;

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0100_0000_01b3;

/// How the local fallback turns text into a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum FallbackMode {
    /// Same pseudo-random vector for every input, drawn from a fixed seed
    #[default]
    FixedSeed,
    /// Hashed token counts, so similar texts land near each other
    ContentHash,
}

impl fmt::Display for FallbackMode {
    #[inline]
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::FixedSeed => f.write_str("fixed-seed"),
            Self::ContentHash => f.write_str("content-hash"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub fallback: FallbackMode,
    pub dimension: usize,
    pub seed: u64,
}

impl Default for EmbeddingConfig {
    #[inline]
    fn default() -> Self {
        Self {
            fallback: FallbackMode::FixedSeed,
            dimension: 64,
            seed: 42,
        }
    }
}

/// Text to vector capability. Implementations never fail: an empty vector
/// means "no embedding available".
pub trait EmbeddingProvider: Send + Sync {
    fn embed(&self, text: &str) -> Vec<f32>;
}

impl EmbeddingProvider for Box<dyn EmbeddingProvider> {
    #[inline]
    fn embed(&self, text: &str) -> Vec<f32> {
        (**self).embed(text)
    }
}

/// External embedding model served by Ollama
#[derive(Debug, Clone)]
pub struct OllamaEmbeddingProvider {
    client: OllamaClient,
}

impl OllamaEmbeddingProvider {
    #[inline]
    pub fn new(client: OllamaClient) -> Self {
        Self { client }
    }
}

impl EmbeddingProvider for OllamaEmbeddingProvider {
    #[inline]
    fn embed(&self, text: &str) -> Vec<f32> {
        if text.trim().is_empty() || self.client.embedding_model().is_none() {
            return Vec::new();
        }

        match self.client.embed(text) {
            Ok(embedding) => embedding,
            Err(e) => {
                warn!("External embedding failed: {:#}", e);
                Vec::new()
            }
        }
    }
}

/// Deterministic local embedding used whenever the external model yields nothing
#[derive(Debug, Clone, PartialEq)]
pub struct FallbackEmbeddingProvider {
    mode: FallbackMode,
    dimension: usize,
    seed: u64,
}

impl FallbackEmbeddingProvider {
    #[inline]
    pub fn new(config: &EmbeddingConfig) -> Self {
        Self {
            mode: config.fallback,
            dimension: config.dimension.max(1),
            seed: config.seed,
        }
    }

    #[inline]
    pub fn dimension(&self) -> usize {
        self.dimension
    }

    fn fixed_seed_vector(&self) -> Vec<f32> {
        let mut rng = StdRng::seed_from_u64(self.seed);
        (0..self.dimension).map(|_| rng.gen_range(0.0f32..1.0)).collect()
    }

    fn content_hash_vector(&self, text: &str) -> Vec<f32> {
        let mut vector = vec![0.0f32; self.dimension];

        for feature in hash_features(text) {
            let index = (fnv1a(feature.as_bytes()) % self.dimension as u64) as usize;
            vector[index] += 1.0;
        }

        let norm = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut vector {
                *x /= norm;
            }
        }
        vector
    }
}

impl Default for FallbackEmbeddingProvider {
    #[inline]
    fn default() -> Self {
        Self::new(&EmbeddingConfig::default())
    }
}

impl EmbeddingProvider for FallbackEmbeddingProvider {
    #[inline]
    fn embed(&self, text: &str) -> Vec<f32> {
        match self.mode {
            FallbackMode::FixedSeed => self.fixed_seed_vector(),
            FallbackMode::ContentHash => self.content_hash_vector(text),
        }
    }
}

/// Lowercased alphanumeric words; words outside ASCII (CJK runs have no
/// spaces) contribute their single characters and adjacent pairs instead.
fn hash_features(text: &str) -> Vec<String> {
    let mut features = Vec::new();

    for token in text
        .to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        if token.is_ascii() {
            features.push(token.to_string());
            continue;
        }

        let chars: Vec<char> = token.chars().collect();
        features.extend(chars.iter().map(char::to_string));
        features.extend(chars.windows(2).map(|pair| pair.iter().collect()));
    }

    features
}

fn fnv1a(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, byte| {
        (hash ^ u64::from(*byte)).wrapping_mul(FNV_PRIME)
    })
}

/// Which provider produced a vector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingSource {
    External,
    Fallback,
}

/// Picks the external embedding when it is non-empty, the local fallback otherwise
pub struct EmbeddingService {
    external: Option<Box<dyn EmbeddingProvider>>,
    fallback: FallbackEmbeddingProvider,
}

impl EmbeddingService {
    #[inline]
    pub fn new(
        external: Option<Box<dyn EmbeddingProvider>>,
        fallback: FallbackEmbeddingProvider,
    ) -> Self {
        Self { external, fallback }
    }

    /// Service with no external model at all
    #[inline]
    pub fn fallback_only(config: &EmbeddingConfig) -> Self {
        Self::new(None, FallbackEmbeddingProvider::new(config))
    }

    #[inline]
    pub fn from_config(config: &Config) -> Result<Self> {
        let external: Option<Box<dyn EmbeddingProvider>> = if config.ollama.embedding_configured() {
            let client = OllamaClient::new(&config.ollama)?;
            Some(Box::new(OllamaEmbeddingProvider::new(client)))
        } else {
            None
        };

        Ok(Self::new(
            external,
            FallbackEmbeddingProvider::new(&config.embedding),
        ))
    }

    #[inline]
    pub fn embed_with_source(&self, text: &str) -> (Vec<f32>, EmbeddingSource) {
        if let Some(external) = &self.external {
            let embedding = external.embed(text);
            if !embedding.is_empty() {
                return (embedding, EmbeddingSource::External);
            }
            debug!("External embedding unavailable, using local fallback");
        }

        (self.fallback.embed(text), EmbeddingSource::Fallback)
    }
}

impl EmbeddingProvider for EmbeddingService {
    #[inline]
    fn embed(&self, text: &str) -> Vec<f32> {
        self.embed_with_source(text).0
    }
}

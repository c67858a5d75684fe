// Chunking, embedding providers and the Ollama client backing them

pub mod chunking;
pub mod codec;
pub mod ollama;
pub mod provider;

pub use chunking::{ChunkedDocument, ChunkingConfig, chunk_document, chunk_text};
pub use codec::{decode_embedding, encode_embedding};
pub use ollama::OllamaClient;
pub use provider::{
    EmbeddingConfig, EmbeddingProvider, EmbeddingService, EmbeddingSource,
    FallbackEmbeddingProvider, FallbackMode, OllamaEmbeddingProvider,
};

//! # Relay Retrieval
//!
//! Context retrieval for the LLM gateway.
//!
//! Given a prompt, the retriever embeds it (with a week-long embedding
//! cache) and queries the vector index for the closest document chunks. When
//! the top match clears the relevance threshold, the chunks are prepended to
//! the prompt in a fixed template.
//!
//! The embedding API and vector index are external collaborators, consumed
//! through the [`Embedder`] and [`VectorIndex`] traits.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod embeddings;
pub mod retriever;
pub mod vector_store;

pub use embeddings::{CachedEmbedder, Embedder, OpenAiEmbeddings};
pub use retriever::{ContextRetriever, Retrieval};
pub use vector_store::{PineconeIndex, VectorIndex, VectorMatch};

//! Prompt augmentation over the embedding and vector-index collaborators.

use crate::embeddings::Embedder;
use crate::vector_store::VectorIndex;
use relay_core::RelayResult;
use std::sync::Arc;
use tracing::debug;

/// Outcome of a retrieval pass.
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieval {
    /// The prompt to send to the model: augmented when the context was
    /// relevant enough, otherwise the original.
    pub prompt: String,
    /// Whether context was prepended.
    pub used: bool,
    /// Score of the top match; 0.0 when nothing matched.
    pub score: f64,
}

/// Retrieves context for prompts and decides whether it is relevant enough to
/// use.
pub struct ContextRetriever {
    embedder: Arc<dyn Embedder>,
    index: Arc<dyn VectorIndex>,
    relevance_threshold: f64,
}

impl ContextRetriever {
    /// Create a retriever. `relevance_threshold` is the minimum top-match
    /// score at which context is considered usable.
    #[must_use]
    pub fn new(
        embedder: Arc<dyn Embedder>,
        index: Arc<dyn VectorIndex>,
        relevance_threshold: f64,
    ) -> Self {
        Self {
            embedder,
            index,
            relevance_threshold,
        }
    }

    /// Embed `prompt`, query the index for `top_k` matches, and return the
    /// augmented prompt when the top score clears the threshold.
    ///
    /// Zero matches yield the original prompt with `used = false` and score
    /// 0.0. An embedding failure is fatal for the operation.
    ///
    /// # Errors
    /// Returns a retrieval error when the embedding or index collaborator
    /// fails.
    pub async fn retrieve_augmented(&self, prompt: &str, top_k: usize) -> RelayResult<Retrieval> {
        let embedding = self.embedder.embed(prompt).await?;
        let matches = self.index.query(&embedding, top_k).await?;

        let Some(top) = matches.first() else {
            return Ok(Retrieval {
                prompt: prompt.to_string(),
                used: false,
                score: 0.0,
            });
        };
        let score = top.score;

        if score < self.relevance_threshold {
            debug!(
                score,
                threshold = self.relevance_threshold,
                "context below relevance threshold, keeping original prompt"
            );
            return Ok(Retrieval {
                prompt: prompt.to_string(),
                used: false,
                score,
            });
        }

        let mut context = String::new();
        for m in &matches {
            context.push_str(&m.text);
            context.push_str("\n\n");
        }
        let context = context.trim();

        debug!(score, "augmenting prompt with retrieved context");
        Ok(Retrieval {
            prompt: format!(
                "Using the following context, answer the question.\n\nContext:\n{context}\n\nQuestion: {prompt}"
            ),
            used: true,
            score,
        })
    }
}

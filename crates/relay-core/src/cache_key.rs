//! Versioned, content-addressed cache keys.
//!
//! Cache keys embed the versions of the logical components that influence a
//! response (tools, retrieval corpus, prompt construction). Bumping a version
//! before deploying a change to that component invalidates every dependent
//! cache entry without an explicit purge.

use sha2::{Digest, Sha256};

/// Version strings for the logical components whose changes must invalidate
/// cached responses.
#[derive(Debug, Clone, Copy)]
pub struct ComponentVersions {
    /// Bump when any tool's behavior changes.
    pub tools: &'static str,
    /// Bump when the retrieval corpus is re-ingested or edited.
    pub rag_data: &'static str,
    /// Bump when prompt templates or prompt-construction logic change.
    pub prompt_logic: &'static str,
}

/// The current component versions. Increment manually before deploying a
/// change to the corresponding component.
pub const COMPONENT_VERSIONS: ComponentVersions = ComponentVersions {
    tools: "1.0",
    rag_data: "1.0",
    prompt_logic: "1.0",
};

/// Hex-encoded SHA-256 of a string's UTF-8 bytes. No normalization is applied:
/// two prompts hash equal iff their bytes are equal.
#[must_use]
pub fn sha256_hex(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    hex::encode(hasher.finalize())
}

/// Build a versioned cache key for `prompt` under `prefix`.
///
/// Format: `<prefix>:<sha256(prompt)>:tv<tools>_rv<rag>_pv<prompt_logic>`,
/// e.g. `llmcache:a1b2c3...:tv1.0_rv1.0_pv1.0`.
#[must_use]
pub fn versioned_cache_key(prefix: &str, prompt: &str) -> String {
    let versions = format!(
        "tv{}_rv{}_pv{}",
        COMPONENT_VERSIONS.tools, COMPONENT_VERSIONS.rag_data, COMPONENT_VERSIONS.prompt_logic
    );
    format!("{}:{}:{}", prefix, sha256_hex(prompt), versions)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn identical_prompts_produce_identical_keys() {
        assert_eq!(
            versioned_cache_key("llmcache", "How does Go handle concurrency?"),
            versioned_cache_key("llmcache", "How does Go handle concurrency?"),
        );
    }

    #[test]
    fn different_bytes_produce_different_keys() {
        assert_ne!(
            versioned_cache_key("llmcache", "hello"),
            versioned_cache_key("llmcache", "hello "),
        );
        // No normalization: case matters.
        assert_ne!(
            versioned_cache_key("llmcache", "Hello"),
            versioned_cache_key("llmcache", "hello"),
        );
    }

    #[test]
    fn key_embeds_prefix_and_versions() {
        let key = versioned_cache_key("llmcache", "prompt");
        assert!(key.starts_with("llmcache:"));
        assert!(key.ends_with(":tv1.0_rv1.0_pv1.0"));
    }

    #[test]
    fn sha256_hex_is_stable() {
        // Known digest of the empty string.
        assert_eq!(
            sha256_hex(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}

//! Prompt complexity analysis.
//!
//! When a client supplies no routing preference, the analyzer derives one
//! from the prompt text. Coding prompts short-circuit to a coding-tuned
//! strategy; everything else is scored first and only classified as simple if
//! it both looks simple and scores low, which keeps nuanced questions like
//! "What are X? Explain in detail" out of the cheap tier.

use once_cell::sync::Lazy;
use regex::Regex;

/// Preference produced for cheap factual-recall prompts.
pub const PREF_COST: &str = "cost";
/// Preference produced for mid-complexity prompts.
pub const PREF_BALANCED: &str = "balanced";
/// Preference produced for complex prompts.
pub const PREF_DEFAULT: &str = "default";
/// Preference produced for ultra-complex prompts.
pub const PREF_MAX_QUALITY: &str = "max_quality";
/// Preference produced for coding prompts.
pub const PREF_CODING: &str = "best-for-coding";

static CODING_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(write|create|generate|implement|fix|debug|refactor|optimize|show me the)\b.*\b(code|script|function|class|method|api|endpoint|query|dockerfile|unit test|algorithm)\b|\b(python|java|go|javascript|typescript|rust|c\+\+|swift|kotlin|php|html|css|sql)\b|\b(react|vue|angular|django|flask|fastapi|pandas|numpy|tensorflow|terraform|kubernetes)\b",
    )
    .expect("coding regex")
});

static SIMPLE_QUERY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^(what|who|which|where|when)\s(is|was|are|were)\s|(?i)^(list|define)\s")
        .expect("simple query regex")
});

static MEDIUM_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(explain|summarize|describe|how (do|does|to))\b|\bwhat is the (process|method|significance) of|give me an overview of|elaborate on",
    )
    .expect("medium complexity regex")
});

static HIGH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(compare (and contrast)?|analyze the (impact|effect)|evaluate the|what are the (pros and cons|advantages and disadvantages)|discuss the implications of|critically evaluate)\b",
    )
    .expect("high complexity regex")
});

static ULTRA_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\b(design a|create a (comprehensive|detailed) plan for|develop a (business plan|framework|strategy)|invent a|write a detailed report on|compose a|draft a|propose a solution for)\b|\b(poem|short story|song lyrics|screenplay|marketing copy|thesis statement|legal clause)\b|\b(act as a|you are a|imagine you are)\b|\b(solve the equation|calculate the|prove the theorem)\b|\b(analyze this dataset|given this data|create a visualization for)\b",
    )
    .expect("ultra complexity regex")
});

static CODE_BLOCK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s)```.*```").expect("code block regex"));

/// Maps raw prompt text to a routing preference.
#[derive(Debug, Clone, Copy, Default)]
pub struct PromptAnalyzer;

impl PromptAnalyzer {
    /// Create an analyzer.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Derive a routing preference for `prompt`.
    #[must_use]
    pub fn analyze(&self, prompt: &str) -> &'static str {
        let normalized = prompt.trim().to_lowercase();
        if normalized.is_empty() {
            return PREF_COST;
        }

        // Coding tasks are a category of their own; no scoring needed.
        if CODE_BLOCK_RE.is_match(&normalized) || CODING_RE.is_match(&normalized) {
            return PREF_CODING;
        }

        let mut score = normalized.len() / 200;
        score += normalized.matches('\n').count() * 2;
        if MEDIUM_RE.is_match(&normalized) {
            score += 5;
        }
        if HIGH_RE.is_match(&normalized) {
            score += 15;
        }
        if ULTRA_RE.is_match(&normalized) {
            score += 30;
        }

        if SIMPLE_QUERY_RE.is_match(&normalized) && score < 5 {
            return PREF_COST;
        }

        match score {
            s if s > 25 => PREF_MAX_QUALITY,
            s if s > 10 => PREF_DEFAULT,
            _ => PREF_BALANCED,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analyze(prompt: &str) -> &'static str {
        PromptAnalyzer::new().analyze(prompt)
    }

    #[test]
    fn empty_prompt_is_cheap() {
        assert_eq!(analyze(""), PREF_COST);
        assert_eq!(analyze("   "), PREF_COST);
    }

    #[test]
    fn coding_prompts_short_circuit() {
        assert_eq!(analyze("write a function to reverse a linked list"), PREF_CODING);
        assert_eq!(analyze("debug this python script"), PREF_CODING);
        assert_eq!(analyze("here is my code ```fn main() {}``` fix it"), PREF_CODING);
    }

    #[test]
    fn simple_factual_questions_are_cheap() {
        assert_eq!(analyze("What is the capital of France?"), PREF_COST);
        assert_eq!(analyze("who was Marie Curie"), PREF_COST);
        assert_eq!(analyze("list three primary colors"), PREF_COST);
    }

    #[test]
    fn simple_opener_with_complex_tail_is_not_cheap() {
        // Matches the simple archetype but the medium archetype pushes the
        // score past the simplicity filter.
        let pref = analyze("What are monads? Explain in detail how do they compose.");
        assert_ne!(pref, PREF_COST);
    }

    #[test]
    fn medium_archetypes_score_balanced() {
        assert_eq!(analyze("explain photosynthesis"), PREF_BALANCED);
        assert_eq!(analyze("summarize this article for me"), PREF_BALANCED);
    }

    #[test]
    fn high_archetypes_reach_default() {
        assert_eq!(
            analyze("compare and contrast TCP and UDP"),
            PREF_DEFAULT
        );
    }

    #[test]
    fn ultra_archetypes_reach_max_quality() {
        assert_eq!(
            analyze("design a business plan for a drone delivery startup"),
            PREF_MAX_QUALITY
        );
        assert_eq!(analyze("act as a career coach and review my goals"), PREF_MAX_QUALITY);
        assert_eq!(analyze("solve the equation x^2 - 5x + 6 = 0"), PREF_MAX_QUALITY);
    }

    #[test]
    fn length_and_structure_contribute_to_score() {
        // Many short lines: each newline adds 2 to the score.
        let structured = "point\n".repeat(8);
        assert_eq!(analyze(&structured), PREF_DEFAULT);
    }
}

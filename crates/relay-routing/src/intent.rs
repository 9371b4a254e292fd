//! Cheap keyword/regex intent classifier.
//!
//! Runs before routing to decide whether a prompt should enter the tool loop
//! (weather, calculator, news) or the retrieval-and-generate path. Rules are
//! evaluated in order; the first match wins.

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

static CALCULATOR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d+\s*[+\-*/]\s*\d+").expect("calculator regex"));

const WEATHER_KEYWORDS: &[&str] = &[
    "weather",
    "forecast",
    "temperature",
    "how hot is it",
    "is it raining",
];

const NEWS_KEYWORDS: &[&str] = &["news", "headlines", "latest on", "what's happening in"];

/// What a prompt is asking for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    /// Current weather for a place.
    Weather,
    /// An arithmetic expression.
    Calculator,
    /// News headlines.
    News,
    /// Anything else: a knowledge query answered via retrieval.
    Rag,
}

impl Intent {
    /// Classify a prompt.
    #[must_use]
    pub fn classify(prompt: &str) -> Self {
        let lower = prompt.to_lowercase();

        for keyword in WEATHER_KEYWORDS {
            if lower.contains(keyword) {
                debug!(keyword, "intent detected: weather");
                return Self::Weather;
            }
        }
        for keyword in NEWS_KEYWORDS {
            if lower.contains(keyword) {
                debug!(keyword, "intent detected: news");
                return Self::News;
            }
        }
        if CALCULATOR_RE.is_match(&lower) {
            debug!("intent detected: calculator");
            return Self::Calculator;
        }

        Self::Rag
    }

    /// Whether this intent is served by the tool loop.
    #[must_use]
    pub fn uses_tools(&self) -> bool {
        !matches!(self, Self::Rag)
    }
}

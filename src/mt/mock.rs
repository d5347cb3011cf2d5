//! Mock Machine Translator for testing
//!
//! This module provides a deterministic, API-free translator for testing
//! the revision pipeline without requiring API keys or network access. It
//! counts calls and records every request so tests can assert on exactly
//! what the pipeline sent.
//!
//! # Example
//!
//! ```ignore
//! use delta_i18n::mt::{MachineTranslator, MockTranslator, MockMode};
//!
//! #[tokio::test]
//! async fn test_translation() {
//!     let mock = MockTranslator::new(MockMode::Suffix);
//!     let result = mock.translate(&request).await.unwrap();
//!     assert_eq!(result, "hello_fr");
//!     assert_eq!(mock.call_count(), 1);
//! }
//! ```

use crate::context::TranslationRequest;
use crate::mt::error::{MtError, MtResult};
use crate::mt::spans::extract_inline_spans;
use crate::mt::translator::MachineTranslator;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Mock translation modes for testing different scenarios
#[derive(Debug, Clone)]
pub enum MockMode {
    /// Append locale suffix: "hello" → "hello_fr"
    /// Inline spans survive untouched
    Suffix,

    /// Use predefined mappings for realistic translations
    /// (content, target_locale) → translation, falling back to `Suffix`
    Mappings(HashMap<(String, String), String>),

    /// No-op: return input unchanged
    NoOp,

    /// Permanent provider error on every call
    Error(String),

    /// Transient transport failure on every call
    Transient(String),

    /// Transient failure for the first `n` calls, then `Suffix`
    FailTimes(usize),

    /// Strip every protected inline span, then `Suffix`
    DropSpans,

    /// Like `DropSpans`, but strict requests are answered faithfully
    DropSpansUnlessStrict,
}

/// Mock translator that simulates various translation scenarios
#[derive(Debug)]
pub struct MockTranslator {
    mode: MockMode,
    /// Optional simulated network delay (in milliseconds)
    delay_ms: u64,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    requests: Mutex<Vec<TranslationRequest>>,
}

impl MockTranslator {
    /// Create a new MockTranslator with the given mode
    pub fn new(mode: MockMode) -> Self {
        Self::with_delay(mode, 0)
    }

    /// Create a MockTranslator with simulated network delay
    ///
    /// # Example
    ///
    /// ```ignore
    /// let mock = MockTranslator::with_delay(MockMode::Suffix, 50);
    /// // Each translation will have ~50ms delay
    /// ```
    pub fn with_delay(mode: MockMode, delay_ms: u64) -> Self {
        Self {
            mode,
            delay_ms,
            calls: AtomicUsize::new(0),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Number of `translate` calls received so far
    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of calls that were in progress at the same time
    pub fn max_concurrency(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    /// Every request received, in arrival order
    pub fn requests(&self) -> Vec<TranslationRequest> {
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn suffix(request: &TranslationRequest) -> String {
        format!("{}_{}", request.content, request.target_locale)
    }

    fn without_spans(content: &str) -> String {
        let mut stripped = content.to_string();
        for span in extract_inline_spans(content).into_iter().rev() {
            stripped.replace_range(span.range, "");
        }
        stripped
    }

    /// Apply translation logic based on the mode
    fn apply_translation(&self, request: &TranslationRequest, call_index: usize) -> MtResult<String> {
        match &self.mode {
            MockMode::Suffix => Ok(Self::suffix(request)),
            MockMode::Mappings(map) => {
                let key = (request.content.clone(), request.target_locale.clone());
                Ok(map
                    .get(&key)
                    .cloned()
                    .unwrap_or_else(|| Self::suffix(request)))
            }
            MockMode::NoOp => Ok(request.content.clone()),
            MockMode::Error(msg) => Err(MtError::Translation(msg.clone())),
            MockMode::Transient(msg) => Err(MtError::Network(msg.clone())),
            MockMode::FailTimes(n) if call_index < *n => Err(MtError::Unavailable(format!(
                "simulated outage ({} of {})",
                call_index + 1,
                n
            ))),
            MockMode::FailTimes(_) => Ok(Self::suffix(request)),
            MockMode::DropSpansUnlessStrict if request.strict => Ok(Self::suffix(request)),
            MockMode::DropSpans | MockMode::DropSpansUnlessStrict => Ok(format!(
                "{}_{}",
                Self::without_spans(&request.content),
                request.target_locale
            )),
        }
    }
}

#[async_trait]
impl MachineTranslator for MockTranslator {
    async fn translate(&self, request: &TranslationRequest) -> MtResult<String> {
        let call_index = self.calls.fetch_add(1, Ordering::SeqCst);
        self.requests
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(request.clone());

        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        if self.delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.delay_ms)).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        self.apply_translation(request, call_index)
    }

    fn provider_name(&self) -> &str {
        "Mock Translator"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunk::{ChunkKind, ChunkPath};

    fn request(content: &str, target: &str) -> TranslationRequest {
        TranslationRequest {
            path: ChunkPath::root(0),
            kind: ChunkKind::Paragraph,
            source_locale: "en".to_string(),
            target_locale: target.to_string(),
            content: content.to_string(),
            previous: None,
            context_before: Vec::new(),
            context_after: Vec::new(),
            preserve_spans: Vec::new(),
            strict: false,
        }
    }

    // ========== Suffix Mode Tests ==========

    #[tokio::test]
    async fn test_suffix_single_translation() {
        let mock = MockTranslator::new(MockMode::Suffix);
        let result = mock.translate(&request("hello", "fr")).await.unwrap();
        assert_eq!(result, "hello_fr");
    }

    #[tokio::test]
    async fn test_suffix_preserves_inline_spans() {
        let mock = MockTranslator::new(MockMode::Suffix);
        let result = mock
            .translate(&request("Use `grid{:typst}` here", "de"))
            .await
            .unwrap();
        assert_eq!(result, "Use `grid{:typst}` here_de");
    }

    // ========== Mapping Mode Tests ==========

    #[tokio::test]
    async fn test_mapping_single_translation() {
        let mut map = HashMap::new();
        map.insert(("hello".to_string(), "fr".to_string()), "bonjour".to_string());

        let mock = MockTranslator::new(MockMode::Mappings(map));
        assert_eq!(mock.translate(&request("hello", "fr")).await.unwrap(), "bonjour");
        // Unknown mapping falls back to suffix mode
        assert_eq!(mock.translate(&request("unknown", "fr")).await.unwrap(), "unknown_fr");
    }

    // ========== Error Mode Tests ==========

    #[tokio::test]
    async fn test_error_mode_is_permanent() {
        let mock = MockTranslator::new(MockMode::Error("quota exceeded".to_string()));
        match mock.translate(&request("hello", "fr")).await {
            Err(MtError::Translation(msg)) => assert_eq!(msg, "quota exceeded"),
            other => panic!("Expected Translation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transient_mode() {
        let mock = MockTranslator::new(MockMode::Transient("connection reset".to_string()));
        let err = mock.translate(&request("hello", "fr")).await.unwrap_err();
        assert!(err.is_transient());
    }

    #[tokio::test]
    async fn test_fail_times_then_succeeds() {
        let mock = MockTranslator::new(MockMode::FailTimes(2));
        assert!(mock.translate(&request("a", "fr")).await.is_err());
        assert!(mock.translate(&request("a", "fr")).await.is_err());
        assert_eq!(mock.translate(&request("a", "fr")).await.unwrap(), "a_fr");
        assert_eq!(mock.call_count(), 3);
    }

    // ========== Span Dropping Tests ==========

    #[tokio::test]
    async fn test_drop_spans() {
        let mock = MockTranslator::new(MockMode::DropSpans);
        let result = mock.translate(&request("Call `f` now", "fr")).await.unwrap();
        assert_eq!(result, "Call  now_fr");
    }

    #[tokio::test]
    async fn test_drop_spans_unless_strict() {
        let mock = MockTranslator::new(MockMode::DropSpansUnlessStrict);
        let mut strict = request("Call `f` now", "fr");
        strict.strict = true;
        assert_eq!(mock.translate(&strict).await.unwrap(), "Call `f` now_fr");
    }

    // ========== NoOp Mode Tests ==========

    #[tokio::test]
    async fn test_noop_returns_unchanged() {
        let mock = MockTranslator::new(MockMode::NoOp);
        let result = mock.translate(&request("Hello world", "fr")).await.unwrap();
        assert_eq!(result, "Hello world");
    }

    // ========== Recording Tests ==========

    #[tokio::test]
    async fn test_records_requests() {
        let mock = MockTranslator::new(MockMode::Suffix);
        mock.translate(&request("one", "fr")).await.unwrap();
        mock.translate(&request("two", "de")).await.unwrap();

        let contents: Vec<String> = mock.requests().into_iter().map(|r| r.content).collect();
        assert_eq!(contents, vec!["one", "two"]);
        assert_eq!(mock.call_count(), 2);
        assert_eq!(mock.max_concurrency(), 1);
    }

    // ========== Delay Tests ==========

    #[tokio::test]
    async fn test_delay_adds_latency() {
        let mock = MockTranslator::with_delay(MockMode::Suffix, 50);
        let start = std::time::Instant::now();
        let _ = mock.translate(&request("hello", "fr")).await.unwrap();

        // Should have at least 50ms delay
        assert!(start.elapsed().as_millis() >= 50);
    }

    // ========== Provider Name Test ==========

    #[test]
    fn test_provider_name() {
        let mock = MockTranslator::new(MockMode::Suffix);
        assert_eq!(mock.provider_name(), "Mock Translator");
    }
}

//! Machine Translation trait and locale utilities
//!
//! This module defines the `MachineTranslator` trait for provider abstraction,
//! so the revision pipeline works with any backend (chat completions, mock,
//! etc.) without coupling to a specific implementation.
//!
//! # Example
//!
//! ```ignore
//! use delta_i18n::mt::{MachineTranslator, MockMode, MockTranslator};
//!
//! let provider = MockTranslator::new(MockMode::Suffix);
//! let translated = provider.translate(&request).await?;
//! ```

use crate::context::TranslationRequest;
use crate::mt::error::{MtError, MtResult};
use async_trait::async_trait;
use icu_locale::Locale;

/// Generic trait for machine translation providers
///
/// A provider receives one assembled request per chunk and returns the
/// translated content. It is a pure request/response contract: retries,
/// backpressure and span validation live in the
/// [`TranslationInvoker`](crate::mt::TranslationInvoker).
#[async_trait]
pub trait MachineTranslator: Send + Sync {
    /// Translate `request.content` into `request.target_locale`
    ///
    /// When `request.previous` is set the provider should revise the previous
    /// translation rather than translate from scratch. Context pairs are for
    /// terminology only and must not appear in the output.
    ///
    /// # Returns
    ///
    /// * `Ok(String)` - The translated content
    /// * `Err(MtError)` - If translation fails
    async fn translate(&self, request: &TranslationRequest) -> MtResult<String>;

    /// Get the name of this translation provider
    ///
    /// Used for logging to identify which provider handled a translation.
    fn provider_name(&self) -> &str;
}

/// Validate a locale code and return its canonical BCP 47 form
///
/// - `zh-hans` → `zh-Hans`
/// - `EN_us` → `en-US`
///
/// # Returns
///
/// * `Ok(String)` - Canonical locale tag
/// * `Err(MtError::InvalidLocale)` - If the code is empty or not a valid locale
pub fn canonical_locale(locale: &str) -> MtResult<String> {
    let trimmed = locale.trim();
    if trimmed.is_empty() {
        return Err(MtError::InvalidLocale("Locale code is empty".to_string()));
    }

    let parsed: Locale = trimmed
        .replace('_', "-")
        .parse()
        .map_err(|e| MtError::InvalidLocale(format!("'{}': {:?}", locale, e)))?;
    Ok(parsed.to_string())
}

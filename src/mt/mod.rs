//! Machine Translation Module
//!
//! The seam between the revision pipeline and external translation services.
//!
//! # Overview
//!
//! 1. **MT Trait & Providers** - `MachineTranslator` with a chat completions
//!    provider and a deterministic mock
//! 2. **Inline Spans** - locating the markup a translation must reproduce
//! 3. **Invoker** - concurrency gate, retry policy and span validation around a provider
//!
//! # Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use delta_i18n::mt::{ChatTranslationProvider, TranslationInvoker};
//! use delta_i18n::EngineConfig;
//!
//! let config = EngineConfig::load()?;
//! let provider = Arc::new(ChatTranslationProvider::from_env()?);
//! let invoker = TranslationInvoker::new(provider, config.concurrency_limit, config.retry_policy());
//! let invocation = invoker.translate(&request).await;
//! ```

pub mod chat_provider;
pub mod error;
pub mod invoker;
pub mod mock;
pub mod spans;
pub mod translator;

pub use chat_provider::ChatTranslationProvider;
pub use error::{MtError, MtResult};
pub use invoker::{Invocation, TranslationInvoker};
pub use mock::{MockMode, MockTranslator};
pub use spans::{InlineSpan, extract_inline_spans, verify_integrity};
pub use translator::{MachineTranslator, canonical_locale};

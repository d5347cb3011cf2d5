//! Translation invoker
//!
//! Wraps a [`MachineTranslator`] with the policies the pipeline relies on:
//!
//! - a semaphore caps in-flight provider calls; excess requests wait for a permit
//! - transient failures are retried with capped exponential backoff
//! - the result must reproduce every protected inline span of the source; on a
//!   mismatch the request is sent once more in strict mode before giving up
//!
//! Failures come back as chunk-local [`DeltaError`]s and never abort a document.

use std::sync::Arc;

use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::config::RetryPolicy;
use crate::context::TranslationRequest;
use crate::error::{DeltaError, DeltaResult};
use crate::mt::spans::verify_integrity;
use crate::mt::translator::MachineTranslator;

/// Result of invoking the provider for one chunk
#[derive(Debug)]
pub struct Invocation {
    pub result: DeltaResult<String>,
    /// Provider calls made, including retries.
    pub calls: u32,
}

pub struct TranslationInvoker {
    provider: Arc<dyn MachineTranslator>,
    gate: Arc<Semaphore>,
    retry: RetryPolicy,
}

impl TranslationInvoker {
    pub fn new(provider: Arc<dyn MachineTranslator>, concurrency_limit: usize, retry: RetryPolicy) -> Self {
        Self {
            provider,
            gate: Arc::new(Semaphore::new(concurrency_limit.max(1))),
            retry,
        }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Translate one chunk, validating the protected spans of the result.
    pub async fn translate(&self, request: &TranslationRequest) -> Invocation {
        let mut calls = 0;
        let result = self.translate_validated(request, &mut calls).await;
        Invocation { result, calls }
    }

    async fn translate_validated(&self, request: &TranslationRequest, calls: &mut u32) -> DeltaResult<String> {
        let text = self.call_with_retry(request, calls).await?;
        let missing = match check_translation(request, &text) {
            Ok(()) => return Ok(text),
            Err(missing) => missing,
        };

        warn!(
            path = %request.path,
            missing = ?missing,
            "Translation lost protected spans, retrying in strict mode"
        );
        let strict = TranslationRequest {
            strict: true,
            ..request.clone()
        };
        let text = self.call_with_retry(&strict, calls).await?;
        check_translation(request, &text)
            .map(|()| text)
            .map_err(|missing| DeltaError::TranslationIntegrity {
                path: request.path.clone(),
                missing,
            })
    }

    async fn call_with_retry(&self, request: &TranslationRequest, calls: &mut u32) -> DeltaResult<String> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = {
                let _permit = self.gate.acquire().await.map_err(|_| DeltaError::TranslationUnavailable {
                    path: request.path.clone(),
                    attempts: attempt - 1,
                    reason: "concurrency gate closed".to_string(),
                })?;
                *calls += 1;
                self.provider.translate(request).await
            };

            match result {
                Ok(text) => {
                    debug!(path = %request.path, attempt, provider = self.provider_name(), "Chunk translated");
                    return Ok(text);
                }
                Err(e) if e.is_transient() && attempt < self.retry.max_attempts => {
                    let delay = self.retry.backoff(attempt);
                    warn!(
                        path = %request.path,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "Transient translation failure, backing off"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(e) => {
                    return Err(DeltaError::TranslationUnavailable {
                        path: request.path.clone(),
                        attempts: attempt,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

/// An empty answer for non-empty content would drop a structural element.
fn check_translation(request: &TranslationRequest, text: &str) -> Result<(), Vec<String>> {
    if text.trim().is_empty() && !request.content.trim().is_empty() {
        return Err(vec!["translated text (empty response)".to_string()]);
    }
    verify_integrity(request.kind, &request.content, text)
}

//! Multi-Model Fallback
//!
//! Tries candidate models in preference order until one produces a result.

use std::future::Future;

use tracing::{info, warn};

use super::providers::{FailureKind, ProviderFailure, ProviderResult};

/// Runs `attempt` against each model in order and returns the first success.
///
/// Quota exhaustion and ordinary failures move on to the next model. A
/// content rejection ends the search immediately. When every model fails,
/// a quota error is returned if quota was the last condition seen.
pub async fn first_successful_model<'m, T, F, Fut>(
    provider: &str,
    models: &'m [&'m str],
    mut attempt: F,
) -> ProviderResult<T>
where
    F: FnMut(&'m str) -> Fut,
    Fut: Future<Output = ProviderResult<T>>,
{
    let mut last_failure: Option<ProviderFailure> = None;

    for &model in models {
        match attempt(model).await {
            Ok(value) => {
                info!("{} generated with model {}", provider, model);
                return Ok(value);
            }
            Err(failure) if failure.kind == FailureKind::ContentRejected => {
                warn!("{} model {} rejected the content: {}", provider, model, failure.message);
                return Err(failure);
            }
            Err(failure) => {
                warn!(
                    "{} model {} failed ({:?}), trying next: {}",
                    provider, model, failure.kind, failure.message
                );
                last_failure = Some(failure);
            }
        }
    }

    match last_failure {
        Some(failure) if failure.kind == FailureKind::QuotaExhausted => {
            Err(ProviderFailure::quota(format!(
                "{} quota exhausted on all {} models",
                provider,
                models.len()
            )))
        }
        Some(failure) => Err(ProviderFailure::failed(format!(
            "{}: all {} models failed; last error: {}",
            provider,
            models.len(),
            failure.message
        ))),
        None => Err(ProviderFailure::failed(format!(
            "{}: no candidate models configured",
            provider
        ))),
    }
}

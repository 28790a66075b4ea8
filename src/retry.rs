use metrics::counter;
use std::future::Future;

use crate::config::RetryConfig;
use crate::error::InferenceError;

/// Retries an inference call while the service reports rate limiting.
///
/// `operation` is invoked at most `max_attempts` times with a fixed delay in
/// between. Any other failure, or the last rate-limit failure once the budget
/// is spent, is returned unchanged.
pub async fn with_retry<T, F, Fut>(config: RetryConfig, mut operation: F) -> Result<T, InferenceError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, InferenceError>>,
{
    let max_attempts = config.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                tracing::warn!(attempt, error = %err, "Inference call failed");

                if !err.is_rate_limited() || attempt >= max_attempts {
                    return Err(err);
                }

                tracing::info!(delay_ms = config.delay.as_millis(), "Retrying after rate limit");
                counter!("inference_retries_total").increment(1);
                tokio::time::sleep(config.delay).await;
                attempt += 1;
            }
        }
    }
}

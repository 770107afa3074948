//! Async retry utilities with exponential backoff

use std::future::Future;
use std::time::Duration;

/// Default maximum attempts for store writes hit by transient errors
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay in milliseconds for exponential backoff
pub const DEFAULT_BASE_DELAY_MS: u64 = 100;

/// Retry an async operation while `is_transient` accepts its error.
///
/// Non-transient errors are returned immediately. Returns
/// `Ok((value, attempts))` on success, or `Err((error, attempts))` on failure.
pub async fn retry_transient_async<F, Fut, T, E, P>(
    max_attempts: u32,
    base_delay_ms: u64,
    is_transient: P,
    mut operation: F,
) -> Result<(T, u32), (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
    P: Fn(&E) -> bool,
{
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match operation().await {
            Ok(value) => return Ok((value, attempts)),
            Err(e) => {
                if attempts >= max_attempts || !is_transient(&e) {
                    return Err((e, attempts));
                }
                let delay = Duration::from_millis(base_delay_ms * 2_u64.pow(attempts - 1));
                tracing::warn!(
                    error = %e,
                    attempt = attempts,
                    delay_ms = delay.as_millis(),
                    "Retrying after transient error"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

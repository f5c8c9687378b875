use futures::Future;
use rand::Rng;
use std::time::Duration;

use crate::{config::RetrySettings, error::Error};

/// Runs `op` until it succeeds, fails permanently or runs out of attempts.
///
/// The delay before attempt `n + 1` is `base * 2^(n - 1)` plus up to half of
/// `base` of random jitter.
pub async fn with_retry<T, F, Fut>(
    settings: &RetrySettings,
    name: &str,
    mut op: F,
) -> Result<T, Error>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, Error>>,
{
    let attempts = settings.max_attempts.max(1);
    let mut attempt = 1;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_transient() && attempt < attempts => {
                let delay = backoff(settings.base_delay_ms, attempt);
                tracing::warn!(
                    "{} failed on attempt {}/{}: {}, retrying in {}ms",
                    name,
                    attempt,
                    attempts,
                    err,
                    delay.as_millis()
                );
                tokio::time::sleep(delay).await;
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}

fn backoff(base_delay_ms: u64, attempt: u32) -> Duration {
    let exponential = base_delay_ms.saturating_mul(1u64 << (attempt - 1).min(16));
    let jitter = match base_delay_ms / 2 {
        0 => 0,
        half => rand::thread_rng().gen_range(0..=half),
    };

    Duration::from_millis(exponential.saturating_add(jitter))
}

#[cfg(test)]
fn instant(max_attempts: u32) -> RetrySettings {
    RetrySettings {
        max_attempts,
        base_delay_ms: 0,
    }
}

#[test]
fn retries_transient_errors_until_success() {
    use crate::error::upstream_error;
    use std::cell::Cell;
    use tokio_test::block_on;

    let calls = Cell::new(0);
    let result = block_on(with_retry(&instant(3), "flaky", || {
        calls.set(calls.get() + 1);
        let n = calls.get();
        async move {
            if n < 3 {
                Err(upstream_error())
            } else {
                Ok(n)
            }
        }
    }));

    assert_eq!(result.unwrap(), 3);
    assert_eq!(calls.get(), 3);
}

#[test]
fn gives_up_after_max_attempts() {
    use crate::error::upstream_error;
    use std::cell::Cell;
    use tokio_test::block_on;

    let calls = Cell::new(0);
    let result: Result<(), Error> = block_on(with_retry(&instant(2), "down", || {
        calls.set(calls.get() + 1);
        async { Err(upstream_error()) }
    }));

    assert_eq!(result.unwrap_err().code, 4);
    assert_eq!(calls.get(), 2);
}

#[test]
fn permanent_errors_are_not_retried() {
    use crate::error::invalid_input_error;
    use std::cell::Cell;
    use tokio_test::block_on;

    let calls = Cell::new(0);
    let result: Result<(), Error> = block_on(with_retry(&instant(5), "rejected", || {
        calls.set(calls.get() + 1);
        async { Err(invalid_input_error()) }
    }));

    assert!(result.is_err());
    assert_eq!(calls.get(), 1);
}

#[test]
fn backoff_grows_exponentially() {
    assert_eq!(backoff(0, 1), Duration::ZERO);

    let first = backoff(100, 1).as_millis();
    let third = backoff(100, 3).as_millis();

    assert!((100..=150).contains(&first));
    assert!((400..=450).contains(&third));
}

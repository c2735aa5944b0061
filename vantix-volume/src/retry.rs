//! Bounded polling with quadratic backoff.

use std::time::Duration;

use tracing::debug;

/// Poll `probe` for up to `max_tries` attempts.
///
/// Each attempt probes, runs `on_miss` (typically a device rescan) when the
/// probe fails, and probes again; between attempts the task sleeps
/// `attempt²` seconds. No sleep follows the final attempt.
///
/// Returns `Ok(Some(n))` with the number of `on_miss` runs once the probe
/// succeeds, `Ok(None)` when the budget is exhausted, or the first error
/// `on_miss` produced.
pub async fn poll_with_backoff<E, P, M>(
    max_tries: u32,
    mut probe: P,
    mut on_miss: M,
) -> Result<Option<u32>, E>
where
    P: FnMut() -> bool,
    M: FnMut() -> Result<(), E>,
{
    let mut misses = 0;

    for attempt in 1..=max_tries {
        if probe() {
            return Ok(Some(misses));
        }

        on_miss()?;
        misses += 1;

        if probe() {
            return Ok(Some(misses));
        }

        if attempt < max_tries {
            let delay = u64::from(attempt) * u64::from(attempt);
            debug!(attempt, delay_secs = delay, "Still missing, backing off");
            tokio::time::sleep(Duration::from_secs(delay)).await;
        }
    }

    Ok(None)
}

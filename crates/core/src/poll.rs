//! Bounded poll-until primitive.
//!
//! Remote providers acknowledge work (create a volume, boot a server)
//! long before the resource is usable. [`poll_until`] turns that into
//! sequential-looking workflow code: probe, check, sleep a fixed
//! interval, repeat, give up after a total wall-clock budget. The sleep
//! is a [`tokio::time::sleep`], so other in-flight workflows keep
//! running while one waits.

use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;

/// Why a [`poll_until`] wait ended without the condition being met.
#[derive(Debug, thiserror::Error)]
pub enum PollError<E> {
    /// The total wall-clock budget ran out before the predicate held.
    #[error("condition not met within {waited:?}")]
    Timeout {
        /// How long the wait actually ran.
        waited: Duration,
    },

    /// The probe or the predicate itself failed.
    #[error("{0}")]
    Probe(E),
}

/// Repeatedly probe until `ready` holds or `timeout` elapses.
///
/// * `probe`   — fallible async lookup of the current value.
/// * `ready`   — predicate over the probed value. Returning `Err`
///   aborts the wait immediately (used when an observed state makes
///   success impossible, e.g. a resource entering an error status).
/// * `interval` — fixed sleep between probes. No backoff: the total
///   budget is the only safety net.
/// * `timeout` — total wall-clock patience.
///
/// The deadline is checked after each failed predicate, so the wait
/// never gives up before `timeout` has elapsed and never runs longer
/// than `timeout` plus one interval and one probe.
pub async fn poll_until<T, E, P, Fut, C>(
    mut probe: P,
    mut ready: C,
    interval: Duration,
    timeout: Duration,
) -> Result<T, PollError<E>>
where
    P: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: FnMut(&T) -> Result<bool, E>,
{
    let started = Instant::now();
    loop {
        let value = probe().await.map_err(PollError::Probe)?;
        if ready(&value).map_err(PollError::Probe)? {
            return Ok(value);
        }

        let waited = started.elapsed();
        if waited >= timeout {
            return Err(PollError::Timeout { waited });
        }
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn counting_probe(calls: Arc<AtomicUsize>) -> impl FnMut() -> std::future::Ready<Result<usize, String>> {
        move || std::future::ready(Ok(calls.fetch_add(1, Ordering::SeqCst) + 1))
    }

    #[tokio::test]
    async fn returns_value_once_ready() {
        let calls = Arc::new(AtomicUsize::new(0));
        let value = poll_until(
            counting_probe(Arc::clone(&calls)),
            |n| Ok(*n >= 3),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .expect("predicate becomes true on the third probe");

        assert_eq!(value, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn immediate_success_probes_once() {
        let calls = Arc::new(AtomicUsize::new(0));
        let value = poll_until(
            counting_probe(Arc::clone(&calls)),
            |_| Ok(true),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await
        .expect("first probe satisfies the predicate");

        assert_eq!(value, 1);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn probe_error_is_distinguishable_from_timeout() {
        let result: Result<usize, _> = poll_until(
            || std::future::ready(Err("volume lookup failed".to_string())),
            |_| Ok(true),
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await;

        match result {
            Err(PollError::Probe(message)) => assert_eq!(message, "volume lookup failed"),
            other => panic!("expected a probe error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn predicate_error_aborts_the_wait() {
        let calls = Arc::new(AtomicUsize::new(0));
        let result = poll_until(
            counting_probe(Arc::clone(&calls)),
            |n| {
                if *n >= 2 {
                    Err("resource went to error".to_string())
                } else {
                    Ok(false)
                }
            },
            Duration::from_millis(1),
            Duration::from_secs(5),
        )
        .await;

        match result {
            Err(PollError::Probe(message)) => assert_eq!(message, "resource went to error"),
            other => panic!("expected a predicate failure, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn times_out_when_never_ready() {
        let calls = Arc::new(AtomicUsize::new(0));
        let timeout = Duration::from_millis(25);
        let result = poll_until(
            counting_probe(Arc::clone(&calls)),
            |_| Ok(false),
            Duration::from_millis(5),
            timeout,
        )
        .await;

        match result {
            Err(PollError::Timeout { waited }) => {
                assert!(waited >= timeout, "gave up after only {waited:?}");
            }
            other => panic!("expected a timeout, got {other:?}"),
        }
        assert!(calls.load(Ordering::SeqCst) >= 2, "should have kept probing until the deadline");
    }
}

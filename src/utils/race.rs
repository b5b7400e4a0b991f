//! Race-the-first-to-complete combinators.
//!
//! Every network-touching probe is bounded by racing its result against a
//! timer that yields an "empty" value. Whichever side finishes first decides;
//! the loser is dropped, so a late result can never be observed twice.
use std::{future::Future, pin::pin, time::Duration};

use futures_util::future::{Either, select};

/// Resolve to the output of whichever future completes first.
///
/// Ties are broken in favour of `first`.
pub async fn race<A, B, T>(first: A, second: B) -> T
where
    A: Future<Output = T>,
    B: Future<Output = T>,
{
    let first = pin!(first);
    let second = pin!(second);
    match select(first, second).await {
        Either::Left((value, _)) => value,
        Either::Right((value, _)) => value,
    }
}

/// Race `fut` against a timer that produces `fallback` after `timeout`.
pub async fn or_after<F, T>(fut: F, timeout: Duration, fallback: T) -> T
where
    F: Future<Output = T>,
{
    race(fut, async move {
        tokio::time::sleep(timeout).await;
        fallback
    })
    .await
}

#[cfg(test)]
mod tests {
    use std::sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    };

    use tokio::time::sleep;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_fast_result_wins() {
        let value = or_after(
            async {
                sleep(Duration::from_millis(10)).await;
                vec!["192.168.1.30"]
            },
            Duration::from_millis(3_000),
            Vec::new(),
        )
        .await;
        assert_eq!(value, vec!["192.168.1.30"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_wins_and_late_result_is_dropped() {
        let finished = Arc::new(AtomicBool::new(false));
        let flag = finished.clone();

        let value = or_after(
            async move {
                sleep(Duration::from_millis(5_000)).await;
                flag.store(true, Ordering::SeqCst);
                vec!["late"]
            },
            Duration::from_millis(3_000),
            Vec::new(),
        )
        .await;

        assert!(value.is_empty());
        sleep(Duration::from_millis(10_000)).await;
        assert!(!finished.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn test_race_prefers_first_when_both_ready() {
        let value = race(async { 1 }, async { 2 }).await;
        assert_eq!(value, 1);
    }
}

//! Cooperative cancellation for pipeline runs.
//!
//! Every run carries a [`CancellationToken`]; suspension points race their
//! work against it. A cancelled run aborts after the currently running task
//! finishes its outermost await; in-flight provider calls are abandoned,
//! not killed mid-token.

use crate::error::{Error, Result};
use std::future::Future;

pub use tokio_util::sync::CancellationToken;

/// Race `fut` against the token.
///
/// Returns `Err(Error::Cancelled)` if the token trips before the future
/// completes; the future is dropped at that point (network connections are
/// closed by the drop).
pub async fn or_cancelled<F>(fut: F, token: &CancellationToken) -> Result<F::Output>
where
    F: Future,
{
    tokio::select! {
        () = token.cancelled() => Err(Error::Cancelled),
        out = fut => Ok(out),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::sleep;

    #[tokio::test]
    async fn completes_when_token_untripped() {
        let token = CancellationToken::new();
        let out = or_cancelled(async { 11 }, &token).await;
        assert_eq!(out.unwrap(), 11);
    }

    #[tokio::test(start_paused = true)]
    async fn cancels_slow_work() {
        let token = CancellationToken::new();
        let trip = token.clone();
        tokio::spawn(async move {
            sleep(Duration::from_millis(5)).await;
            trip.cancel();
        });

        let out = or_cancelled(
            async {
                sleep(Duration::from_secs(60)).await;
                0
            },
            &token,
        )
        .await;
        assert!(matches!(out, Err(Error::Cancelled)));
    }

    #[tokio::test]
    async fn already_cancelled_token_short_circuits() {
        let token = CancellationToken::new();
        token.cancel();
        let out = or_cancelled(async { 1 }, &token).await;
        assert!(matches!(out, Err(Error::Cancelled)));
    }
}

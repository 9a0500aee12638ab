use eyre::eyre;
use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Default delay between two status checks
pub const POLL_INTERVAL: Duration = Duration::from_secs(10);

/// Upper bound for Batch resource state transitions
///
/// The provider reports compute environments and job queues as VALID
/// within a couple of minutes normally, so a quarter of an hour means
/// something is genuinely stuck.
pub const BATCH_MAX_WAIT: Duration = Duration::from_secs(15 * 60);

/// Upper bound for a Lambda function to become Active
pub const LAMBDA_MAX_WAIT: Duration = Duration::from_secs(300);

/// Poll the check until it reports ready or the max wait elapses
///
/// All waiting in the tool goes through here so that every loop is
/// bounded. The check re-queries the provider and returns true once the
/// resource reached its target state.
pub async fn wait_until<F, Fut>(
    what: &str,
    interval: Duration,
    max_wait: Duration,
    mut check: F,
) -> eyre::Result<()>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = eyre::Result<bool>>,
{
    let started = Instant::now();

    loop {
        if check().await? {
            return Ok(());
        }

        if started.elapsed() >= max_wait {
            return Err(eyre!(
                "Timed out waiting for {what} after {}s",
                max_wait.as_secs()
            ));
        }

        log::info!("Waiting for {what}...");
        tokio::time::sleep(interval).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test(start_paused = true)]
    async fn ready_after_a_few_polls() {
        let polls = AtomicU32::new(0);

        let result = wait_until(
            "test resource",
            Duration::from_secs(10),
            Duration::from_secs(60),
            || {
                let n = polls.fetch_add(1, Ordering::SeqCst);
                async move { Ok(n >= 2) }
            },
        )
        .await;

        assert!(result.is_ok());
        assert_eq!(polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn times_out_when_never_ready() {
        let result = wait_until(
            "stuck resource",
            Duration::from_secs(10),
            Duration::from_secs(30),
            || async { Ok(false) },
        )
        .await;

        let err = result.unwrap_err().to_string();
        assert!(err.contains("stuck resource"));
        assert!(err.contains("30s"));
    }

    #[tokio::test(start_paused = true)]
    async fn check_errors_are_propagated() {
        let result = wait_until(
            "broken resource",
            Duration::from_secs(1),
            Duration::from_secs(10),
            || async { Err(eyre!("describe call failed")) },
        )
        .await;

        assert!(result.unwrap_err().to_string().contains("describe call failed"));
    }
}

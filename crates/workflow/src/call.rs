use std::future::Future;
use std::time::Duration;

use qcrbox_core::error::RemoteError;

/// Run one remote call with a deadline. An elapsed deadline becomes
/// [`RemoteError::Timeout`].
pub(crate) async fn bounded<T>(
    timeout: Duration,
    call: impl Future<Output = Result<T, RemoteError>>,
) -> Result<T, RemoteError> {
    match tokio::time::timeout(timeout, call).await {
        Ok(result) => result,
        Err(_) => Err(RemoteError::Timeout(timeout.as_secs())),
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test(start_paused = true)]
    async fn elapsed_deadline_is_a_timeout() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(120)).await;
            Ok::<_, RemoteError>(())
        };
        assert_matches!(
            bounded(Duration::from_secs(30), slow).await,
            Err(RemoteError::Timeout(30))
        );
    }

    #[tokio::test]
    async fn result_passes_through() {
        let fast = async { Err::<(), _>(RemoteError::NotFound("job".into())) };
        assert_matches!(
            bounded(Duration::from_secs(1), fast).await,
            Err(RemoteError::NotFound(_))
        );
    }
}

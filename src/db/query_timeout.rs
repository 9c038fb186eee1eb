// Database query timeout protection
use std::future::Future;
use std::io::{Error as IoError, ErrorKind};
use std::time::Duration;
use tokio::time::timeout;

pub struct QueryTimeout;

impl QueryTimeout {
    /// Execute a query with a timeout so a stalled connection surfaces as an
    /// error instead of leaving the caller waiting forever.
    pub async fn execute_with_timeout<F, T>(
        query_fn: F,
        timeout_duration: Duration,
    ) -> Result<T, sqlx::Error>
    where
        F: Future<Output = Result<T, sqlx::Error>>,
    {
        match timeout(timeout_duration, query_fn).await {
            Ok(result) => result,
            Err(_) => Err(sqlx::Error::Io(IoError::new(
                ErrorKind::TimedOut,
                format!("Query timed out after {:?}", timeout_duration),
            ))),
        }
    }

    pub fn is_timeout(err: &sqlx::Error) -> bool {
        matches!(err, sqlx::Error::Io(io) if io.kind() == ErrorKind::TimedOut)
            || matches!(err, sqlx::Error::PoolTimedOut)
    }

    /// Default timeout for most queries (5 seconds)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_slow_query_times_out() {
        let slow = async {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok::<_, sqlx::Error>(1)
        };

        let err = QueryTimeout::execute_with_timeout(slow, QueryTimeout::DEFAULT_TIMEOUT)
            .await
            .unwrap_err();
        assert!(QueryTimeout::is_timeout(&err));
    }

    #[tokio::test]
    async fn test_fast_query_passes_through() {
        let fast = async { Ok::<_, sqlx::Error>(7) };
        let value = QueryTimeout::execute_with_timeout(fast, QueryTimeout::DEFAULT_TIMEOUT)
            .await
            .unwrap();
        assert_eq!(value, 7);
    }
}

//! Timeout enforcement.

use std::future::Future;
use std::io;
use std::time::Duration;

/// Run `fut` with a deadline, mapping expiry to `io::ErrorKind::TimedOut`.
pub async fn with_timeout<T, F>(limit: Duration, what: &str, fut: F) -> io::Result<T>
where
    F: Future<Output = io::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res,
        Err(_) => Err(io::Error::new(
            io::ErrorKind::TimedOut,
            format!("{what} timed out after {limit:?}"),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn expiry_maps_to_timed_out() {
        let res: io::Result<()> = with_timeout(Duration::from_secs(1), "probe", async {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(())
        })
        .await;
        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::TimedOut);
    }

    #[tokio::test]
    async fn inner_result_passes_through() {
        let res = with_timeout(Duration::from_secs(1), "dial", async { Ok(7) }).await;
        assert_eq!(res.unwrap(), 7);
    }
}

//! Timeout enforcement.
//!
//! # Responsibilities
//! - Race a guarded operation against its deadline
//! - Drop the operation future on expiry so its resources are released
//!
//! # Design Decisions
//! - Uses Tokio's timeout facilities
//! - A zero deadline means "no deadline"
//! - Expiry is reported separately from the operation's own result

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// The deadline passed before the operation finished.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeadlineExceeded {
    pub elapsed: Duration,
}

/// Run `fut` with a deadline. Returns the output and the time it took.
pub async fn with_deadline<F>(
    deadline: Duration,
    fut: F,
) -> (Result<F::Output, DeadlineExceeded>, Duration)
where
    F: Future,
{
    let started = Instant::now();
    let result = if deadline.is_zero() {
        Ok(fut.await)
    } else {
        tokio::time::timeout(deadline, fut)
            .await
            .map_err(|_| DeadlineExceeded {
                elapsed: started.elapsed(),
            })
    };
    (result, started.elapsed())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_completes_within_deadline() {
        let (res, took) = with_deadline(Duration::from_millis(500), async { 7 }).await;
        assert_eq!(res, Ok(7));
        assert!(took < Duration::from_millis(500));
    }

    #[tokio::test]
    async fn test_expires() {
        let (res, _) = with_deadline(Duration::from_millis(20), async {
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        let err = res.unwrap_err();
        assert!(err.elapsed >= Duration::from_millis(20));
    }

    #[tokio::test]
    async fn test_zero_deadline_waits() {
        let (res, _) = with_deadline(Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            "done"
        })
        .await;
        assert_eq!(res, Ok("done"));
    }

    struct ReleaseOnDrop(Arc<AtomicBool>);

    impl Drop for ReleaseOnDrop {
        fn drop(&mut self) {
            self.0.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn test_expiry_releases_held_resource() {
        let released = Arc::new(AtomicBool::new(false));
        let guard = ReleaseOnDrop(released.clone());
        let (res, _) = with_deadline(Duration::from_millis(10), async move {
            let _held = guard;
            tokio::time::sleep(Duration::from_secs(5)).await;
        })
        .await;
        assert!(res.is_err());
        assert!(released.load(Ordering::SeqCst));
    }
}

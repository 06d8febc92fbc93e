//! Poll Loop
//!
//! Bounded fixed-interval polling shared by every asynchronous provider.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, warn};

use super::providers::{ProviderFailure, ProviderResult};
use super::video::VideoJobStatus;

/// Poll cadence and wall-clock ceiling for an asynchronous job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub ceiling: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, ceiling: Duration) -> Self {
        Self { interval, ceiling }
    }

    /// Number of polls that fit under the ceiling (at least one)
    pub fn max_attempts(&self) -> u32 {
        if self.interval.is_zero() {
            return 1;
        }
        let attempts = self.ceiling.as_millis().div_ceil(self.interval.as_millis());
        attempts.clamp(1, u32::MAX as u128) as u32
    }
}

/// Classification of a single poll
#[derive(Debug, Clone, PartialEq)]
pub enum PollObservation<T> {
    InProgress,
    Completed(T),
    Rejected(String),
    Failed(String),
    /// Poll itself failed; logged and retried on the next tick
    TransientError(String),
}

impl PollObservation<String> {
    /// Classifies one video poll result; poll errors never end the loop
    pub fn from_video_poll(result: ProviderResult<VideoJobStatus>) -> Self {
        match result {
            Ok(VideoJobStatus::Completed { video_url }) => Self::Completed(video_url),
            Ok(VideoJobStatus::Failed { error }) => Self::Failed(error),
            Ok(VideoJobStatus::Rejected { reason }) => Self::Rejected(reason),
            Ok(VideoJobStatus::Queued) | Ok(VideoJobStatus::Processing { .. }) => Self::InProgress,
            Err(failure) => Self::TransientError(failure.to_string()),
        }
    }
}

/// Polls until a terminal observation or until the ceiling is reached.
///
/// `poll` receives the 1-based attempt number. The loop sleeps `interval`
/// between attempts and never polls again after a terminal observation.
pub async fn poll_until_terminal<T, F, Fut>(
    policy: PollPolicy,
    label: &str,
    mut poll: F,
) -> ProviderResult<T>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = PollObservation<T>>,
{
    let max_attempts = policy.max_attempts();

    for attempt in 1..=max_attempts {
        match poll(attempt).await {
            PollObservation::Completed(value) => {
                debug!("{} completed on attempt {}", label, attempt);
                return Ok(value);
            }
            PollObservation::Rejected(reason) => {
                return Err(ProviderFailure::rejected(reason));
            }
            PollObservation::Failed(error) => {
                return Err(ProviderFailure::failed(error));
            }
            PollObservation::InProgress => {
                debug!("{} in progress (attempt {}/{})", label, attempt, max_attempts);
            }
            PollObservation::TransientError(error) => {
                warn!(
                    "{} poll attempt {}/{} failed, will retry: {}",
                    label, attempt, max_attempts, error
                );
            }
        }

        if attempt < max_attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }

    Err(ProviderFailure::timeout(format!(
        "{} did not complete within {}s",
        label,
        policy.ceiling.as_secs()
    )))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::generative::FailureKind;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    fn policy(interval: u64, ceiling: u64) -> PollPolicy {
        PollPolicy::new(Duration::from_secs(interval), Duration::from_secs(ceiling))
    }

    #[test]
    fn test_max_attempts() {
        assert_eq!(policy(3, 180).max_attempts(), 60);
        assert_eq!(policy(15, 600).max_attempts(), 40);
        assert_eq!(policy(10, 365).max_attempts(), 37);
        assert_eq!(policy(10, 0).max_attempts(), 1);
        assert_eq!(policy(0, 100).max_attempts(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_in_progress_until_ceiling_times_out() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();
        let started = tokio::time::Instant::now();

        let result: ProviderResult<String> = poll_until_terminal(policy(3, 180), "job", |_| {
            counter.fetch_add(1, Ordering::SeqCst);
            async { PollObservation::InProgress }
        })
        .await;

        let failure = result.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Timeout);
        assert_eq!(calls.load(Ordering::SeqCst), 60);
        // 59 sleeps of 3s between 60 polls
        assert_eq!(started.elapsed(), Duration::from_secs(177));
    }

    #[tokio::test(start_paused = true)]
    async fn test_terminal_stops_polling() {
        let calls = Arc::new(AtomicU32::new(0));
        let counter = calls.clone();

        let result = poll_until_terminal(policy(10, 360), "veo", |attempt| {
            counter.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt == 4 {
                    PollObservation::Completed(format!("video-{attempt}"))
                } else {
                    PollObservation::InProgress
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "video-4");
        assert_eq!(calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_rejection_is_distinct_from_failure() {
        let rejected: ProviderResult<()> = poll_until_terminal(policy(1, 10), "a", |_| async {
            PollObservation::Rejected("nsfw".to_string())
        })
        .await;
        assert_eq!(rejected.unwrap_err().kind, FailureKind::ContentRejected);

        let failed: ProviderResult<()> = poll_until_terminal(policy(1, 10), "b", |_| async {
            PollObservation::Failed("render error".to_string())
        })
        .await;
        let failure = failed.unwrap_err();
        assert_eq!(failure.kind, FailureKind::Failed);
        assert_eq!(failure.message, "render error");
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_errors_keep_polling() {
        let result = poll_until_terminal(policy(2, 20), "kling", |attempt| async move {
            match attempt {
                1 | 2 => PollObservation::TransientError("502".to_string()),
                _ => PollObservation::Completed(attempt),
            }
        })
        .await;
        assert_eq!(result.unwrap(), 3);
    }

    #[test]
    fn test_video_poll_classification() {
        assert_eq!(
            PollObservation::from_video_poll(Ok(VideoJobStatus::Queued)),
            PollObservation::InProgress
        );
        assert_eq!(
            PollObservation::from_video_poll(Ok(VideoJobStatus::Completed {
                video_url: "u".into()
            })),
            PollObservation::Completed("u".to_string())
        );
        assert!(matches!(
            PollObservation::from_video_poll(Err(ProviderFailure::failed("404"))),
            PollObservation::TransientError(_)
        ));
    }
}

//! Job polling state machine.
//!
//! A [`JobPoller`] owns one job id and drives it from `Polling` to a terminal
//! state. Time and transport are injected so the loop can be exercised
//! without real delays.

use crate::backend::OcrBackend;
use crate::config::AppConfig;
use crate::error::{FrontError, Result};
use crate::model::JobStatus;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Time source used by the poller.
#[async_trait::async_trait]
pub trait Clock: Send + Sync {
    fn now(&self) -> Instant;
    async fn sleep(&self, duration: Duration);
}

/// Wall clock backed by tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioClock;

#[async_trait::async_trait]
impl Clock for TokioClock {
    fn now(&self) -> Instant {
        tokio::time::Instant::now().into_std()
    }

    async fn sleep(&self, duration: Duration) {
        tokio::time::sleep(duration).await;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollState {
    Polling,
    Done,
    TimedOut,
    Errored,
}

pub struct JobPoller<'a> {
    job_id: String,
    backend: &'a dyn OcrBackend,
    clock: &'a dyn Clock,
    interval: Duration,
    timeout: Duration,
    state: PollState,
    started: Option<Instant>,
    attempts: u32,
}

impl<'a> JobPoller<'a> {
    pub fn new(
        job_id: impl Into<String>,
        backend: &'a dyn OcrBackend,
        clock: &'a dyn Clock,
        interval: Duration,
        timeout: Duration,
    ) -> Self {
        Self {
            job_id: job_id.into(),
            backend,
            clock,
            interval,
            timeout,
            state: PollState::Polling,
            started: None,
            attempts: 0,
        }
    }

    pub fn from_config(
        job_id: impl Into<String>,
        backend: &'a dyn OcrBackend,
        clock: &'a dyn Clock,
        config: &AppConfig,
    ) -> Self {
        Self::new(job_id, backend, clock, config.poll_interval, config.poll_timeout)
    }

    pub fn state(&self) -> PollState {
        self.state
    }

    /// Status requests issued so far.
    pub fn attempts(&self) -> u32 {
        self.attempts
    }

    /// One poll step.
    ///
    /// Returns `Ok(Some(status))` once the job is done, `Ok(None)` while it is
    /// still running (or after a transient failure), and an error on timeout or
    /// a permanent failure. A poller in a terminal state issues no requests.
    /// The status request is cut off when it outlives the remaining budget.
    pub async fn tick(&mut self) -> Result<Option<JobStatus>> {
        if self.state != PollState::Polling {
            return Ok(None);
        }

        let Some(remaining) = self.remaining() else {
            return Err(self.time_out());
        };

        self.attempts += 1;
        let reply = tokio::time::timeout(remaining, self.backend.job_status(&self.job_id)).await;
        let Ok(reply) = reply else {
            return Err(self.time_out());
        };

        match reply {
            Ok(status) if status.is_done() => {
                self.state = PollState::Done;
                info!("Job {} done after {} attempts", self.job_id, self.attempts);
                Ok(Some(status))
            }
            Ok(status) => {
                debug!("Job {} status={:?}", self.job_id, status.status);
                Ok(None)
            }
            Err(e) if e.is_transient() => {
                warn!("Polling job {} failed, retrying: {}", self.job_id, e);
                Ok(None)
            }
            Err(e) => {
                self.state = PollState::Errored;
                Err(FrontError::JobFailed {
                    job_id: self.job_id.clone(),
                    message: e.to_string(),
                })
            }
        }
    }

    /// Poll until a terminal state, sleeping one interval between requests.
    pub async fn run(mut self) -> Result<JobStatus> {
        info!("Polling job {} every {:?}", self.job_id, self.interval);
        loop {
            if let Some(status) = self.tick().await? {
                return Ok(status);
            }
            let interval = self.interval;
            let pause = self
                .remaining()
                .map_or(Duration::ZERO, |left| left.min(interval));
            self.clock.sleep(pause).await;
        }
    }

    /// Budget left before the ceiling; `None` once it is spent.
    fn remaining(&mut self) -> Option<Duration> {
        let now = self.clock.now();
        let started = *self.started.get_or_insert(now);
        self.timeout
            .checked_sub(now.saturating_duration_since(started))
            .filter(|left| !left.is_zero())
    }

    fn time_out(&mut self) -> FrontError {
        let waited = self
            .started
            .map(|started| self.clock.now().saturating_duration_since(started))
            .unwrap_or_default();
        self.state = PollState::TimedOut;
        warn!(
            "Job {} still not done after {} attempts ({:?})",
            self.job_id, self.attempts, waited
        );
        FrontError::Timeout {
            job_id: self.job_id.clone(),
            waited,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{JobReply, ManualClock, MockBackend};
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn poller<'a>(backend: &'a MockBackend, clock: &'a ManualClock) -> JobPoller<'a> {
        JobPoller::new(
            "job-1",
            backend,
            clock,
            Duration::from_secs(1),
            Duration::from_secs(10),
        )
    }

    #[tokio::test]
    async fn test_pending_stays_polling() {
        let backend = MockBackend::default().with_jobs(vec![JobReply::status("pending")]);
        let clock = ManualClock::new();
        let mut p = poller(&backend, &clock);

        assert!(p.tick().await.unwrap().is_none());
        assert_eq!(p.state(), PollState::Polling);
        assert_eq!(p.attempts(), 1);
    }

    #[tokio::test]
    async fn test_done_returns_results() {
        let backend = MockBackend::default().with_jobs(vec![
            JobReply::status("pending"),
            JobReply::status("running"),
            JobReply::done(json!([{"product_no": 1}])),
        ]);
        let clock = ManualClock::new();

        let status = poller(&backend, &clock).run().await.unwrap();
        assert!(status.is_done());
        assert_eq!(status.results, Some(json!([{"product_no": 1}])));
        assert_eq!(backend.job_calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_transient_failures_are_retried() {
        let backend = MockBackend::default().with_jobs(vec![
            JobReply::Unavailable,
            JobReply::Unavailable,
            JobReply::done(json!([])),
        ]);
        let clock = ManualClock::new();

        let status = poller(&backend, &clock).run().await.unwrap();
        assert!(status.is_done());
        assert_eq!(backend.job_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_timeout_stops_requests() {
        let backend = MockBackend::default();
        let clock = ManualClock::new();

        let err = poller(&backend, &clock).run().await.unwrap_err();
        assert!(matches!(err, FrontError::Timeout { ref job_id, .. } if job_id == "job-1"));
        // one request per second for ten seconds, none after the ceiling
        assert_eq!(backend.job_calls.load(Ordering::SeqCst), 10);
    }

    #[tokio::test]
    async fn test_terminal_state_issues_no_requests() {
        let backend = MockBackend::default();
        let clock = ManualClock::new();
        let mut p = poller(&backend, &clock);

        clock.advance(Duration::from_secs(30));
        p.tick().await.unwrap();
        clock.advance(Duration::from_secs(30));
        assert!(p.tick().await.is_err());
        assert_eq!(p.state(), PollState::TimedOut);

        assert!(p.tick().await.unwrap().is_none());
        assert_eq!(backend.job_calls.load(Ordering::SeqCst), 1);
    }

    /// Backend whose status endpoint takes `delay` to answer `pending`.
    struct SlowBackend {
        delay: Duration,
        calls: std::sync::atomic::AtomicUsize,
    }

    #[async_trait::async_trait]
    impl OcrBackend for SlowBackend {
        async fn submit_bulk(
            &self,
            _files: Vec<crate::backend::UploadFile>,
        ) -> Result<crate::normalize::BulkReply> {
            unreachable!("poller never submits")
        }

        async fn job_status(&self, _job_id: &str) -> Result<JobStatus> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(self.delay).await;
            Ok(JobStatus {
                status: "pending".into(),
                results: None,
            })
        }

        async fn patch_field(
            &self,
            _row_id: &str,
            _field: crate::model::EditableField,
            _value: &str,
        ) -> Result<()> {
            unreachable!("poller never patches")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_status_request_is_cut_at_ceiling() {
        let backend = SlowBackend {
            delay: Duration::from_secs(100),
            calls: Default::default(),
        };
        let clock = TokioClock;
        let poller = JobPoller::new(
            "j",
            &backend,
            &clock,
            Duration::from_millis(1200),
            Duration::from_secs(120),
        );

        let started = tokio::time::Instant::now();
        let err = poller.run().await.unwrap_err();
        let waited = started.elapsed();

        assert!(matches!(err, FrontError::Timeout { .. }));
        assert_eq!(backend.calls.load(Ordering::SeqCst), 2);
        assert!(waited >= Duration::from_secs(120), "{:?}", waited);
        assert!(waited < Duration::from_secs(121), "{:?}", waited);
    }

    #[tokio::test]
    async fn test_last_sleep_is_clamped_to_ceiling() {
        let backend = MockBackend::default();
        let clock = ManualClock::new();
        let poller = JobPoller::new(
            "job-1",
            &backend,
            &clock,
            Duration::from_secs(4),
            Duration::from_secs(10),
        );

        let err = poller.run().await.unwrap_err();
        // requests at 0s, 4s and 8s, then a 2s sleep up to the ceiling
        assert_eq!(backend.job_calls.load(Ordering::SeqCst), 3);
        assert_eq!(clock.elapsed(), Duration::from_secs(10));
        assert!(
            matches!(err, FrontError::Timeout { waited, .. } if waited == Duration::from_secs(10))
        );
    }

    #[tokio::test]
    async fn test_unknown_job_is_errored() {
        let backend = MockBackend::default().with_jobs(vec![JobReply::Missing]);
        let clock = ManualClock::new();
        let mut p = poller(&backend, &clock);

        let err = p.tick().await.unwrap_err();
        assert!(matches!(err, FrontError::JobFailed { .. }));
        assert_eq!(p.state(), PollState::Errored);
    }
}

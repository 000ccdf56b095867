use crate::engine::controller::RunState;
use crate::engine::user::{wait_for_stop, RunContext, VirtualUser};
use futures::stream::{FuturesUnordered, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{debug, warn};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RampOutcome {
    pub launched: u32,
    pub requests: u64,
    pub panicked: u32,
}

/// Launches the population of a run spread evenly across the ramp-up window.
#[derive(Debug, Clone)]
pub struct RampUpScheduler {
    users: u32,
    ramp_up: Duration,
}

impl RampUpScheduler {
    pub fn new(users: u32, ramp_up: Duration) -> Self {
        Self { users, ramp_up }
    }

    /// Gap between two consecutive launches.
    pub fn spacing(&self) -> Duration {
        if self.users == 0 {
            Duration::ZERO
        } else {
            self.ramp_up / self.users
        }
    }

    /// Launch every user, then wait for all of them to exit.
    pub async fn run(
        self,
        ctx: Arc<RunContext>,
        mut signal: watch::Receiver<RunState>,
    ) -> RampOutcome {
        let spacing = self.spacing();
        let mut outcome = RampOutcome::default();
        let mut users = FuturesUnordered::new();

        for user_id in 0..self.users {
            if *signal.borrow() == RunState::Stopped {
                debug!(run = %ctx.token, launched = outcome.launched, "stop during ramp-up");
                break;
            }

            let user = VirtualUser::new(user_id, Arc::clone(&ctx), signal.clone());
            users.push(tokio::spawn(user.run()));
            outcome.launched += 1;

            let last = user_id + 1 == self.users;
            if !last && spacing > Duration::ZERO {
                tokio::select! {
                    _ = sleep(spacing) => {}
                    _ = wait_for_stop(&mut signal) => {
                        debug!(run = %ctx.token, launched = outcome.launched, "stop during ramp-up");
                        break;
                    }
                }
            }
        }

        while let Some(result) = users.next().await {
            match result {
                Ok(issued) => outcome.requests += issued,
                Err(e) => {
                    outcome.panicked += 1;
                    warn!(run = %ctx.token, error = %e, "virtual user task failed");
                }
            }
        }

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineSettings;
    use crate::engine::cadence::Cadence;
    use crate::engine::controller::RunToken;
    use crate::engine::executor::RequestExecutor;
    use crate::engine::stats::StatsAggregator;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;

    #[test]
    fn test_spacing() {
        assert_eq!(
            RampUpScheduler::new(5, Duration::from_secs(10)).spacing(),
            Duration::from_secs(2)
        );
        assert_eq!(
            RampUpScheduler::new(4, Duration::ZERO).spacing(),
            Duration::ZERO
        );
        assert_eq!(
            RampUpScheduler::new(0, Duration::from_secs(5)).spacing(),
            Duration::ZERO
        );
        assert_eq!(
            RampUpScheduler::new(3, Duration::from_secs(1)).spacing(),
            Duration::from_nanos(333_333_333)
        );
    }

    fn context(duration: Duration) -> Arc<RunContext> {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let port = listener.local_addr().unwrap().port();
        drop(listener);

        Arc::new(RunContext {
            token: RunToken(7),
            url: format!("http://127.0.0.1:{}/", port),
            duration,
            executor: RequestExecutor::new(&EngineSettings::default()).unwrap(),
            stats: StatsAggregator::new(100),
            cadence: Cadence::Staggered {
                base: Duration::from_millis(100),
                step: Duration::ZERO,
                buckets: 0,
            },
            pause_poll: Duration::from_millis(20),
            active_users: Arc::new(AtomicU32::new(0)),
        })
    }

    #[tokio::test]
    async fn test_zero_ramp_launches_everyone_at_once() {
        let ctx = context(Duration::from_millis(300));
        let (_tx, rx) = watch::channel(RunState::Running);

        let started = Instant::now();
        let outcome = RampUpScheduler::new(6, Duration::ZERO)
            .run(Arc::clone(&ctx), rx)
            .await;

        assert_eq!(outcome.launched, 6);
        assert_eq!(outcome.panicked, 0);
        assert!(outcome.requests >= 6);
        assert_eq!(ctx.stats.snapshot().await.total_requests, outcome.requests);
        // everyone ran concurrently, not one after another
        assert!(started.elapsed() < Duration::from_secs(2));
        assert_eq!(ctx.active_users.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_stop_during_ramp_launches_no_more_users() {
        let ctx = context(Duration::from_secs(30));
        let (tx, rx) = watch::channel(RunState::Running);

        let handle = tokio::spawn(
            RampUpScheduler::new(10, Duration::from_secs(10)).run(Arc::clone(&ctx), rx),
        );
        tokio::time::sleep(Duration::from_millis(1500)).await;
        tx.send_replace(RunState::Stopped);

        let outcome = tokio::time::timeout(Duration::from_secs(3), handle)
            .await
            .expect("scheduler should wind down after stop")
            .unwrap();
        assert!(outcome.launched >= 1 && outcome.launched <= 3, "{:?}", outcome);
    }
}

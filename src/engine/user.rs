use crate::engine::cadence::Cadence;
use crate::engine::controller::{RunState, RunToken};
use crate::engine::executor::RequestExecutor;
use crate::engine::stats::StatsAggregator;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::debug;

/// Everything the loops of one run share.
pub struct RunContext {
    pub token: RunToken,
    pub url: String,
    pub duration: Duration,
    pub executor: RequestExecutor,
    pub stats: StatsAggregator,
    pub cadence: Cadence,
    pub pause_poll: Duration,
    pub active_users: Arc<AtomicU32>,
}

pub struct VirtualUser {
    id: u32,
    ctx: Arc<RunContext>,
    signal: watch::Receiver<RunState>,
}

impl VirtualUser {
    pub fn new(id: u32, ctx: Arc<RunContext>, signal: watch::Receiver<RunState>) -> Self {
        Self { id, ctx, signal }
    }

    /// Run until the duration elapses or the run is stopped. Returns the number of requests sent.
    pub async fn run(mut self) -> u64 {
        let _active = ActiveGuard::enter(&self.ctx.active_users);
        let started = Instant::now();
        let cadence = self.ctx.cadence.interval_for(self.id);
        let mut issued = 0u64;

        debug!(run = %self.ctx.token, user = self.id, "virtual user started");

        loop {
            let elapsed = started.elapsed();
            if elapsed >= self.ctx.duration {
                break;
            }

            let state = *self.signal.borrow_and_update();
            match state {
                RunState::Stopped | RunState::Idle => break,
                RunState::Paused => {
                    tokio::select! {
                        _ = sleep(self.ctx.pause_poll) => {}
                        changed = self.signal.changed() => {
                            if changed.is_err() {
                                break;
                            }
                        }
                    }
                }
                RunState::Running => {
                    self.ctx
                        .executor
                        .dispatch(self.id, &self.ctx.url, &self.ctx.stats)
                        .await;
                    issued += 1;

                    let remaining = self.ctx.duration.saturating_sub(started.elapsed());
                    let wait = cadence.min(remaining);
                    tokio::select! {
                        _ = sleep(wait) => {}
                        _ = wait_for_stop(&mut self.signal) => break,
                    }
                }
            }
        }

        debug!(run = %self.ctx.token, user = self.id, issued, "virtual user finished");
        issued
    }
}

/// Resolve once the run is stopped or its controller went away.
pub(crate) async fn wait_for_stop(signal: &mut watch::Receiver<RunState>) {
    loop {
        if *signal.borrow_and_update() == RunState::Stopped {
            return;
        }
        if signal.changed().await.is_err() {
            return;
        }
    }
}

struct ActiveGuard<'a> {
    counter: &'a AtomicU32,
}

impl<'a> ActiveGuard<'a> {
    fn enter(counter: &'a AtomicU32) -> Self {
        counter.fetch_add(1, Ordering::SeqCst);
        Self { counter }
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::SeqCst);
    }
}

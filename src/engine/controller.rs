//! Run lifecycle: the only surface outside collaborators talk to.
//!
//! ```text
//! Idle --start--> Running --pause--> Paused --resume--> Running
//! {Running, Paused} --stop / duration elapsed--> Stopped --start--> Running
//! ```
//!
//! Every run gets its own `watch` channel carrying its [`RunState`]. Loops only
//! ever look at the channel of the run that spawned them, so a `stop` followed
//! by a `start` can never wake a stale loop back up.

use crate::config::{EngineSettings, RunConfig};
use crate::engine::cadence::Cadence;
use crate::engine::error::EngineError;
use crate::engine::executor::RequestExecutor;
use crate::engine::ramp::RampUpScheduler;
use crate::engine::stats::{RunStats, StatsAggregator, StatsSummary};
use crate::engine::user::RunContext;
use crate::utils::duration_millis;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{watch, Mutex};
use tracing::info;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Idle,
    Running,
    Paused,
    Stopped,
}

impl RunState {
    pub fn is_active(&self) -> bool {
        matches!(self, RunState::Running | RunState::Paused)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            RunState::Idle => "idle",
            RunState::Running => "running",
            RunState::Paused => "paused",
            RunState::Stopped => "stopped",
        };
        f.write_str(label)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StopReason {
    /// Every loop ran out its duration
    Completed,
    /// `stop()` was called
    Stopped,
    /// A new `start()` replaced the run
    Superseded,
}

/// Identifies one run of a controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunToken(pub u64);

impl fmt::Display for RunToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Read-only copy of a controller's state, for polling and reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSnapshot {
    pub token: Option<RunToken>,
    pub run_id: Option<Uuid>,
    pub state: RunState,
    pub stop_reason: Option<StopReason>,
    pub config: Option<RunConfig>,
    pub stats: RunStats,
    pub started_at: Option<DateTime<Utc>>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    pub active_users: u32,
}

impl RunSnapshot {
    pub fn summary(&self) -> StatsSummary {
        self.stats.summarize(self.elapsed)
    }
}

struct ActiveRun {
    token: RunToken,
    id: Uuid,
    config: RunConfig,
    signal: Arc<watch::Sender<RunState>>,
    finished: watch::Receiver<bool>,
    started_at: DateTime<Utc>,
    started: Instant,
    ended: Option<Instant>,
    stop_reason: Option<StopReason>,
    active_users: Arc<AtomicU32>,
}

impl ActiveRun {
    fn state(&self) -> RunState {
        *self.signal.borrow()
    }

    fn mark_stopped(&mut self, reason: StopReason) -> bool {
        if self.state() == RunState::Stopped {
            return false;
        }
        self.signal.send_replace(RunState::Stopped);
        self.stop_reason = Some(reason);
        self.ended.get_or_insert_with(Instant::now);
        true
    }

    fn elapsed(&self) -> Duration {
        self.ended
            .unwrap_or_else(Instant::now)
            .saturating_duration_since(self.started)
    }
}

#[derive(Default)]
struct ControllerInner {
    run: Option<ActiveRun>,
}

pub struct RunController {
    settings: EngineSettings,
    executor: RequestExecutor,
    stats: StatsAggregator,
    inner: Arc<Mutex<ControllerInner>>,
    lifecycle: Mutex<()>,
    next_token: AtomicU64,
}

impl RunController {
    pub fn new(settings: EngineSettings) -> Result<Self, EngineError> {
        settings.validate()?;
        let executor = RequestExecutor::new(&settings)?;
        let stats = StatsAggregator::new(settings.max_errors);

        Ok(Self {
            settings,
            executor,
            stats,
            inner: Arc::new(Mutex::new(ControllerInner::default())),
            lifecycle: Mutex::new(()),
            next_token: AtomicU64::new(0),
        })
    }

    pub fn settings(&self) -> &EngineSettings {
        &self.settings
    }

    /// Validate `config` and launch a run in the background.
    ///
    /// A previous run is stopped and every one of its loops has exited before
    /// the statistics are reset. Dropping the returned future part way leaves
    /// the previous run stopped, and the next `start` waits for it again.
    pub async fn start(&self, config: RunConfig) -> Result<RunToken, EngineError> {
        config.validate()?;
        let _lifecycle = self.lifecycle.lock().await;

        let previous = {
            let mut inner = self.inner.lock().await;
            inner.run.as_mut().map(|run| {
                if run.mark_stopped(StopReason::Superseded) {
                    info!(run = %run.token, "stopping previous run before start");
                }
                run.finished.clone()
            })
        };
        if let Some(finished) = previous {
            wait_finished(finished).await;
        }

        let token = RunToken(self.next_token.fetch_add(1, Ordering::SeqCst) + 1);
        let (signal_tx, signal_rx) = watch::channel(RunState::Running);
        let (finished_tx, finished_rx) = watch::channel(false);
        let active_users = Arc::new(AtomicU32::new(0));

        let ctx = Arc::new(RunContext {
            token,
            url: config.url.trim().to_string(),
            duration: config.duration(),
            executor: self.executor.clone(),
            stats: self.stats.clone(),
            cadence: Cadence::from_settings(&self.settings, config.users),
            pause_poll: self.settings.pause_poll,
            active_users: Arc::clone(&active_users),
        });
        let scheduler = RampUpScheduler::new(config.users, config.ramp_up());

        // Reset and install under one lock so a snapshot never mixes two runs.
        let mut inner = self.inner.lock().await;
        self.stats.reset().await;

        info!(
            run = %token,
            url = %config.url,
            users = config.users,
            duration_secs = config.duration_secs,
            ramp_up_secs = config.ramp_up_secs,
            "run started"
        );

        inner.run = Some(ActiveRun {
            token,
            id: Uuid::new_v4(),
            config,
            signal: Arc::new(signal_tx),
            finished: finished_rx,
            started_at: Utc::now(),
            started: Instant::now(),
            ended: None,
            stop_reason: None,
            active_users,
        });

        // The supervisor's completion is observed through `finished`.
        tokio::spawn(supervise(
            Arc::clone(&self.inner),
            token,
            scheduler,
            ctx,
            signal_rx,
            finished_tx,
        ));

        Ok(token)
    }

    pub async fn pause(&self) -> Result<RunState, EngineError> {
        let inner = self.inner.lock().await;
        let run = inner.run.as_ref().ok_or(EngineError::NoActiveRun)?;
        match run.state() {
            RunState::Running => {
                run.signal.send_replace(RunState::Paused);
                info!(run = %run.token, "run paused");
                Ok(RunState::Paused)
            }
            RunState::Paused => Ok(RunState::Paused),
            RunState::Idle | RunState::Stopped => Err(EngineError::NoActiveRun),
        }
    }

    pub async fn resume(&self) -> Result<RunState, EngineError> {
        let inner = self.inner.lock().await;
        let run = inner.run.as_ref().ok_or(EngineError::NoActiveRun)?;
        match run.state() {
            RunState::Paused => {
                run.signal.send_replace(RunState::Running);
                info!(run = %run.token, "run resumed");
                Ok(RunState::Running)
            }
            RunState::Running => Ok(RunState::Running),
            RunState::Idle | RunState::Stopped => Err(EngineError::NoActiveRun),
        }
    }

    /// Flip between running and paused, returning the new state.
    pub async fn toggle_pause(&self) -> Result<RunState, EngineError> {
        match self.state().await {
            RunState::Paused => self.resume().await,
            _ => self.pause().await,
        }
    }

    /// Ask every loop of the current run to exit at its next suspension point.
    pub async fn stop(&self) -> Result<(), EngineError> {
        let mut inner = self.inner.lock().await;
        let run = inner.run.as_mut().ok_or(EngineError::NoActiveRun)?;
        if run.mark_stopped(StopReason::Stopped) {
            info!(run = %run.token, "run stopped");
        }
        Ok(())
    }

    /// Resolve once every loop of the current run has exited.
    pub async fn wait(&self) {
        let finished = {
            let inner = self.inner.lock().await;
            inner.run.as_ref().map(|run| run.finished.clone())
        };

        if let Some(finished) = finished {
            wait_finished(finished).await;
        }
    }

    pub async fn state(&self) -> RunState {
        let inner = self.inner.lock().await;
        inner
            .run
            .as_ref()
            .map(ActiveRun::state)
            .unwrap_or(RunState::Idle)
    }

    pub async fn snapshot(&self) -> RunSnapshot {
        // Stats are read with `inner` held so they always belong to the run described.
        let inner = self.inner.lock().await;
        let mut snapshot = match inner.run.as_ref() {
            Some(run) => RunSnapshot {
                token: Some(run.token),
                run_id: Some(run.id),
                state: run.state(),
                stop_reason: run.stop_reason,
                config: Some(run.config.clone()),
                stats: RunStats::default(),
                started_at: Some(run.started_at),
                elapsed: run.elapsed(),
                active_users: run.active_users.load(Ordering::SeqCst),
            },
            None => RunSnapshot {
                token: None,
                run_id: None,
                state: RunState::Idle,
                stop_reason: None,
                config: None,
                stats: RunStats::default(),
                started_at: None,
                elapsed: Duration::ZERO,
                active_users: 0,
            },
        };

        snapshot.stats = self.stats.snapshot().await;
        drop(inner);
        snapshot
    }
}

impl Drop for RunController {
    fn drop(&mut self) {
        if let Ok(mut inner) = self.inner.try_lock() {
            if let Some(run) = inner.run.as_mut() {
                run.mark_stopped(StopReason::Stopped);
            }
        }
    }
}

async fn wait_finished(mut finished: watch::Receiver<bool>) {
    while !*finished.borrow_and_update() {
        if finished.changed().await.is_err() {
            break;
        }
    }
}

async fn supervise(
    inner: Arc<Mutex<ControllerInner>>,
    token: RunToken,
    scheduler: RampUpScheduler,
    ctx: Arc<RunContext>,
    signal: watch::Receiver<RunState>,
    finished: watch::Sender<bool>,
) {
    let outcome = scheduler.run(ctx, signal).await;

    {
        let mut inner = inner.lock().await;
        if let Some(run) = inner.run.as_mut().filter(|run| run.token == token) {
            if run.mark_stopped(StopReason::Completed) {
                info!(run = %token, "run completed");
            }
            run.ended.get_or_insert_with(Instant::now);
        }
    }

    info!(
        run = %token,
        launched = outcome.launched,
        requests = outcome.requests,
        panicked = outcome.panicked,
        "all virtual users exited"
    );
    finished.send_replace(true);
}

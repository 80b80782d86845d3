//! Cycle scheduler
//!
//! Owns the timer and the single worker task that runs update cycles.
//!
//! ## Behavior
//!
//! - One cycle runs immediately on start, then one per interval tick
//! - Manual requests arrive as [`Command`]s over an mpsc channel
//! - At most one cycle runs at a time: ticks and manual requests that arrive
//!   while a cycle is running are dropped and reported as
//!   [`EngineEvent::TriggerSkipped`]
//! - Stop cancels an in-flight cycle at its next await point, flushes the
//!   settings store and ends the worker
//! - A settings store failure inside a cycle is fatal: the worker stops and the
//!   error is returned from [`SchedulerHandle::stop()`] / [`SchedulerHandle::join()`]
//!
//! Dropping every [`SchedulerHandle`] stops the worker as well.

use std::pin::pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{Instant, Interval, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::engine::{CycleReport, EngineEvent, Trigger, UpdateEngine};
use crate::error::{Error, Result};

/// Pending command slots; a full queue means a cycle is already pending
const COMMAND_CHANNEL_CAPACITY: usize = 16;

/// Longest period the ticker is armed with (30 years)
///
/// Stored intervals are only required to be non-zero; anything longer than
/// this never elapses in practice and would overflow `Instant` arithmetic.
const MAX_TICK_PERIOD: Duration = Duration::from_secs(30 * 365 * 24 * 60 * 60);

/// Messages accepted by the scheduler worker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Command {
    Run(Trigger),
    Stop,
}

/// How the worker ended a cycle
enum Executed {
    Finished(Result<CycleReport>),
    Cancelled,
}

/// Entry point for starting the worker
pub struct Scheduler;

impl Scheduler {
    /// Spawn the worker task
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` for a zero interval.
    pub fn start(engine: Arc<UpdateEngine>, interval: Duration) -> Result<SchedulerHandle> {
        if interval.is_zero() {
            return Err(Error::config("Update interval must be greater than 0"));
        }

        let (tx, rx) = mpsc::channel(COMMAND_CHANNEL_CAPACITY);
        let task = tokio::spawn(run(engine, interval, rx));

        Ok(SchedulerHandle { commands: tx, task })
    }
}

/// Handle to a running scheduler
#[derive(Debug)]
pub struct SchedulerHandle {
    commands: mpsc::Sender<Command>,
    task: JoinHandle<Result<()>>,
}

impl SchedulerHandle {
    /// Request an immediate cycle ("update now")
    ///
    /// Returns `false` if the request could not be queued (worker stopped or
    /// too many requests pending).
    pub fn trigger_now(&self) -> bool {
        self.send(Command::Run(Trigger::Manual))
    }

    /// Request an immediate cycle that calls the provider even when the
    /// address is unchanged
    pub fn force_update(&self) -> bool {
        self.send(Command::Run(Trigger::Forced))
    }

    /// Whether the worker is still running
    pub fn is_running(&self) -> bool {
        !self.task.is_finished()
    }

    /// Wait until the worker has ended on its own (fatal error)
    ///
    /// Does not consume the handle, so it can be raced against other events
    /// before calling [`SchedulerHandle::stop()`] or [`SchedulerHandle::join()`].
    pub async fn closed(&self) {
        self.commands.closed().await
    }

    /// Stop the worker and wait for it
    ///
    /// An in-flight cycle is cancelled; the settings store is flushed before
    /// the worker ends.
    pub async fn stop(self) -> Result<()> {
        if self.commands.send(Command::Stop).await.is_err() {
            debug!("Scheduler already stopped");
        }
        self.join().await
    }

    /// Wait for the worker to end
    pub async fn join(self) -> Result<()> {
        let SchedulerHandle { commands, task } = self;
        let result = task.await;
        drop(commands);

        match result {
            Ok(result) => result,
            Err(e) => Err(Error::other(format!("Scheduler task failed: {}", e))),
        }
    }

    fn send(&self, command: Command) -> bool {
        match self.commands.try_send(command) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(command)) => {
                warn!("Scheduler busy, dropping {:?}", command);
                false
            }
            Err(mpsc::error::TrySendError::Closed(command)) => {
                warn!("Scheduler stopped, dropping {:?}", command);
                false
            }
        }
    }
}

/// Worker loop
async fn run(
    engine: Arc<UpdateEngine>,
    mut interval: Duration,
    mut commands: mpsc::Receiver<Command>,
) -> Result<()> {
    info!("Scheduler started (interval: {:?})", interval);
    engine.emit_event(EngineEvent::Started { interval });

    // First tick completes immediately
    let mut ticker = ticker_at(Instant::now(), interval);

    let result = loop {
        let trigger = tokio::select! {
            _ = ticker.tick() => Trigger::Scheduled,
            command = commands.recv() => match command {
                Some(Command::Run(trigger)) => trigger,
                Some(Command::Stop) | None => break Ok("stop requested"),
            },
        };

        match execute(&engine, trigger, &mut commands).await {
            Executed::Finished(Ok(report)) => {
                debug!("Cycle finished: {:?}", report.outcome);

                if let Some(configured) = report.interval {
                    if configured != interval && !configured.is_zero() {
                        info!("Update interval changed: {:?} -> {:?}", interval, configured);
                        interval = configured;
                        ticker = ticker_at(deadline_after(interval), interval);
                        continue;
                    }
                }

                // A tick that fell due while the cycle was running
                if tokio::time::timeout(Duration::ZERO, ticker.tick()).await.is_ok() {
                    skip_trigger(&engine, Trigger::Scheduled);
                }
            }
            Executed::Finished(Err(e)) => {
                error!("Settings store failure, stopping scheduler: {}", e);
                break Err(e);
            }
            Executed::Cancelled => break Ok("stop requested during cycle"),
        }
    };

    if let Err(e) = engine.settings().flush().await {
        error!("Failed to flush settings store: {}", e);
    }

    let reason = match &result {
        Ok(reason) => reason.to_string(),
        Err(e) => e.to_string(),
    };
    info!("Scheduler stopped: {}", reason);
    engine.emit_event(EngineEvent::Stopped { reason });

    result.map(|_| ())
}

/// Run one cycle while draining commands
async fn execute(
    engine: &UpdateEngine,
    trigger: Trigger,
    commands: &mut mpsc::Receiver<Command>,
) -> Executed {
    let mut cycle = pin!(engine.run_cycle(trigger));

    loop {
        tokio::select! {
            result = &mut cycle => return Executed::Finished(result),
            command = commands.recv() => match command {
                Some(Command::Run(skipped)) => skip_trigger(engine, skipped),
                Some(Command::Stop) | None => {
                    warn!("Cancelling in-flight {:?} cycle", trigger);
                    return Executed::Cancelled;
                }
            },
        }
    }
}

fn skip_trigger(engine: &UpdateEngine, trigger: Trigger) {
    info!("Cycle already running, skipping {:?} trigger", trigger);
    engine.emit_event(EngineEvent::TriggerSkipped { trigger });
}

fn deadline_after(period: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(period.min(MAX_TICK_PERIOD)).unwrap_or(now)
}

fn ticker_at(start: Instant, period: Duration) -> Interval {
    let mut ticker = tokio::time::interval_at(start, period.min(MAX_TICK_PERIOD));
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    ticker
}

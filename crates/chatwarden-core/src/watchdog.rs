//! Liveness watchdog
//!
//! The host calls [`Watchdog::heartbeat`] on a short period. A background task
//! checks every `check_interval` and calls `on_timeout(count)` when no
//! heartbeat arrived within `timeout`. The count keeps rising on each stale
//! check until a fresh heartbeat arrives.

use chatwarden_config::WatchdogSettings;
use chatwarden_store::{AuditEvent, AuditEventType, AuditLog};
use chatwarden_util::{ChatwardenError, Result};
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use crate::{OperationGuard, OperationHistory, OperationMonitor, OperationRecord, RecordSink};

/// How long [`Watchdog::stop`] waits for the monitor task
pub const STOP_JOIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Called with the consecutive timeout count, on the watchdog's task
pub type TimeoutCallback = Arc<dyn Fn(u32) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WatchdogConfig {
    pub timeout: Duration,
    pub check_interval: Duration,
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            check_interval: Duration::from_secs(5),
        }
    }
}

impl From<&WatchdogSettings> for WatchdogConfig {
    fn from(settings: &WatchdogSettings) -> Self {
        Self {
            timeout: settings.timeout,
            check_interval: settings.check_interval,
        }
    }
}

#[derive(Debug)]
struct WatchdogState {
    last_heartbeat: Instant,
    enabled: bool,
    consecutive_timeouts: u32,
    /// A timeout fired and no heartbeat has arrived since
    stalled: bool,
    /// Bumped by every suspension; only the newest one may re-enable
    suspension: u64,
}

impl WatchdogState {
    fn new() -> Self {
        Self {
            last_heartbeat: Instant::now(),
            enabled: true,
            consecutive_timeouts: 0,
            stalled: false,
            suspension: 0,
        }
    }
}

#[derive(Debug, PartialEq, Eq)]
enum CheckOutcome {
    Disabled,
    Healthy,
    Recovered { after: u32 },
    TimedOut { count: u32, silent_for: Duration },
}

fn check(state: &Mutex<WatchdogState>, timeout: Duration, now: Instant) -> CheckOutcome {
    let mut state = state.lock().unwrap();
    if !state.enabled {
        return CheckOutcome::Disabled;
    }

    let silent_for = now.saturating_duration_since(state.last_heartbeat);
    if silent_for > timeout {
        state.consecutive_timeouts += 1;
        state.last_heartbeat = now;
        state.stalled = true;
        CheckOutcome::TimedOut {
            count: state.consecutive_timeouts,
            silent_for,
        }
    } else if !state.stalled && state.consecutive_timeouts > 0 {
        let after = state.consecutive_timeouts;
        state.consecutive_timeouts = 0;
        CheckOutcome::Recovered { after }
    } else {
        CheckOutcome::Healthy
    }
}

struct MonitorTask {
    shutdown: watch::Sender<bool>,
    handle: JoinHandle<()>,
}

/// Heartbeat monitor owned by the host
pub struct Watchdog {
    config: WatchdogConfig,
    state: Arc<Mutex<WatchdogState>>,
    task: Mutex<Option<MonitorTask>>,
    history: Arc<OperationHistory>,
    audit: Option<Arc<dyn AuditLog>>,
}

impl Watchdog {
    pub fn new(config: WatchdogConfig) -> Self {
        Self {
            config,
            state: Arc::new(Mutex::new(WatchdogState::new())),
            task: Mutex::new(None),
            history: Arc::new(OperationHistory::default()),
            audit: None,
        }
    }

    /// Audit slow operations started through [`operation`](Self::operation)
    pub fn with_audit(mut self, audit: Arc<dyn AuditLog>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn config(&self) -> WatchdogConfig {
        self.config
    }

    /// Start the monitor task. Returns `Ok(false)` if it is already running.
    ///
    /// Must be called from within a tokio runtime, with a non-zero check interval.
    pub fn start<F>(&self, on_timeout: F) -> Result<bool>
    where
        F: Fn(u32) + Send + Sync + 'static,
    {
        if self.config.check_interval.is_zero() {
            return Err(ChatwardenError::watchdog("check interval must be non-zero"));
        }

        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatwardenError::watchdog(format!("no tokio runtime: {}", e)))?;

        let mut task = self.task.lock().unwrap();
        if let Some(existing) = task.as_ref()
            && !existing.handle.is_finished()
        {
            debug!("Watchdog already running");
            return Ok(false);
        }

        {
            let mut state = self.state.lock().unwrap();
            state.last_heartbeat = Instant::now();
            state.consecutive_timeouts = 0;
            state.stalled = false;
        }

        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = runtime.spawn(monitor_loop(
            self.config,
            self.state.clone(),
            Arc::new(on_timeout),
            shutdown_rx,
        ));

        *task = Some(MonitorTask { shutdown, handle });

        info!(
            timeout_secs = self.config.timeout.as_secs_f64(),
            check_interval_secs = self.config.check_interval.as_secs_f64(),
            "Watchdog started"
        );
        Ok(true)
    }

    /// Stop the monitor task and wait for it, at most [`STOP_JOIN_TIMEOUT`].
    /// Safe to call when not running.
    pub async fn stop(&self) {
        let task = self.task.lock().unwrap().take();
        let Some(MonitorTask {
            shutdown,
            mut handle,
        }) = task
        else {
            debug!("Watchdog not running");
            return;
        };

        let _ = shutdown.send(true);

        match tokio::time::timeout(STOP_JOIN_TIMEOUT, &mut handle).await {
            Ok(Ok(())) => info!("Watchdog stopped"),
            Ok(Err(e)) => warn!(error = %e, "Watchdog task ended abnormally"),
            Err(_) => {
                warn!("Watchdog task did not exit in time, aborting");
                handle.abort();
            }
        }
    }

    pub fn is_running(&self) -> bool {
        self.task
            .lock()
            .unwrap()
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    /// Record that the host is alive. Ignored while suspended.
    pub fn heartbeat(&self) {
        let mut state = self.state.lock().unwrap();
        if state.enabled {
            state.last_heartbeat = Instant::now();
            state.stalled = false;
        }
    }

    /// Suspend checks for `duration`, e.g. around a long network call.
    ///
    /// A later suspension replaces an earlier one that has not ended yet.
    pub fn disable_temporarily(&self, duration: Duration) -> Result<()> {
        let runtime = tokio::runtime::Handle::try_current()
            .map_err(|e| ChatwardenError::watchdog(format!("no tokio runtime: {}", e)))?;

        let suspension = {
            let mut state = self.state.lock().unwrap();
            state.enabled = false;
            state.suspension += 1;
            state.suspension
        };

        info!(duration_secs = duration.as_secs_f64(), "Watchdog disabled");

        let state = self.state.clone();
        runtime.spawn(async move {
            tokio::time::sleep(duration).await;

            let mut state = state.lock().unwrap();
            if state.suspension == suspension {
                state.enabled = true;
                state.last_heartbeat = Instant::now();
                info!("Watchdog re-enabled");
            }
        });

        Ok(())
    }

    /// End any suspension now
    pub fn resume(&self) {
        let mut state = self.state.lock().unwrap();
        state.suspension += 1;
        if !state.enabled {
            state.enabled = true;
            state.last_heartbeat = Instant::now();
            info!("Watchdog resumed");
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.state.lock().unwrap().enabled
    }

    pub fn consecutive_timeouts(&self) -> u32 {
        self.state.lock().unwrap().consecutive_timeouts
    }

    /// Time since the last heartbeat (or timeout, or resumption)
    pub fn since_last_heartbeat(&self) -> Duration {
        self.state.lock().unwrap().last_heartbeat.elapsed()
    }

    /// Time a named operation; the record lands in [`recent_operations`](Self::recent_operations)
    pub fn operation(&self, name: impl Into<String>, threshold: Duration) -> OperationGuard {
        let history = self.history.clone();
        let audit = self.audit.clone();

        let sink: RecordSink = Arc::new(move |record: &OperationRecord| {
            history.push(record.clone());

            if record.exceeded
                && let Some(audit) = &audit
                && let Err(e) = audit.append_audit(AuditEvent::new(AuditEventType::OperationSlow {
                    name: record.name.clone(),
                    duration: record.duration,
                    threshold: record.threshold,
                }))
            {
                warn!(error = %e, "Failed to audit slow operation");
            }
        });

        OperationMonitor::begin_with_sink(name, threshold, sink)
    }

    /// Finished operations, oldest first
    pub fn recent_operations(&self) -> Vec<OperationRecord> {
        self.history.recent()
    }
}

impl Default for Watchdog {
    fn default() -> Self {
        Self::new(WatchdogConfig::default())
    }
}

impl Drop for Watchdog {
    fn drop(&mut self) {
        if let Ok(mut guard) = self.task.lock()
            && let Some(task) = guard.take()
        {
            let _ = task.shutdown.send(true);
        }
    }
}

async fn monitor_loop(
    config: WatchdogConfig,
    state: Arc<Mutex<WatchdogState>>,
    on_timeout: TimeoutCallback,
    mut shutdown_rx: watch::Receiver<bool>,
) {
    let mut ticker =
        tokio::time::interval_at(Instant::now() + config.check_interval, config.check_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match check(&state, config.timeout, Instant::now()) {
                    CheckOutcome::TimedOut { count, silent_for } => {
                        warn!(
                            count,
                            silent_secs = silent_for.as_secs_f64(),
                            "Watchdog timeout: no heartbeat"
                        );
                        if catch_unwind(AssertUnwindSafe(|| on_timeout(count))).is_err() {
                            error!(count, "Watchdog timeout callback panicked");
                        }
                    }
                    CheckOutcome::Recovered { after } => {
                        info!(after, "App recovered, resetting timeout counter");
                    }
                    CheckOutcome::Healthy | CheckOutcome::Disabled => {}
                }
            }
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    debug!("Watchdog monitor loop exiting");
                    break;
                }
            }
        }
    }
}

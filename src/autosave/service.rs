//! Autosave scheduler: registrations, timers, per-project save queues.
//!
//! [`AutosaveService`] is a cheap handle around one [`SchedulerState`]. The
//! state owns every project's config, queue, `processing` flag, failure
//! counter and timer. Events pass the gate in [`AutosaveService::trigger_save`],
//! are appended to the project's FIFO queue, and are drained one at a time
//! by whichever caller claimed the `processing` flag.
//!
//! The state map sits behind a `std::sync::Mutex` that is never held across
//! an `.await`. Timer and sweep tasks keep only a `Weak` reference and stop
//! once the service is dropped. Drains always run in tasks of their own, so
//! stopping a timer or the sweep never cancels a save already in progress.

use crate::autosave::config::{AutosaveConfig, SaveEvent, TriggerKind, MAX_INTERVAL_MINUTES};
use crate::autosave::executor::{execute_save, CheckpointSink, RetryPolicy, SaveOutcome};
use crate::error::{Error, Result};
use serde::Serialize;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tracing::{debug, error, info, warn};

/// Consecutive exhausted saves after which autosave is switched off.
pub const FAILURE_THRESHOLD: u32 = 5;

/// Period of the background sweep that drains leftover queues.
pub const SWEEP_INTERVAL: Duration = Duration::from_secs(5);

/// Config changes requested by the save path and applied by the state owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchedulerCommand {
    DisableAutosave { project_path: String },
}

/// Point-in-time view of one registration.
#[derive(Debug, Clone, Serialize)]
pub struct AutosaveStatus {
    pub project_path: String,
    pub config: AutosaveConfig,
    pub queue_length: usize,
    pub processing: bool,
    pub consecutive_failures: u32,
    pub timer_armed: bool,
}

struct ProjectAutosaveState {
    config: AutosaveConfig,
    queue: VecDeque<SaveEvent>,
    processing: bool,
    consecutive_failures: u32,
    timer: Option<JoinHandle<()>>,
}

impl ProjectAutosaveState {
    fn new(config: AutosaveConfig) -> Self {
        Self {
            config,
            queue: VecDeque::new(),
            processing: false,
            consecutive_failures: 0,
            timer: None,
        }
    }

    fn disarm(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
    }

    fn status(&self, project_path: &str) -> AutosaveStatus {
        AutosaveStatus {
            project_path: project_path.to_string(),
            config: self.config.clone(),
            queue_length: self.queue.len(),
            processing: self.processing,
            consecutive_failures: self.consecutive_failures,
            timer_armed: self.timer.as_ref().is_some_and(|t| !t.is_finished()),
        }
    }
}

/// Everything the scheduler owns.
pub struct SchedulerState {
    projects: Mutex<HashMap<String, ProjectAutosaveState>>,
    sink: Arc<dyn CheckpointSink>,
    sweep: Mutex<Option<JoinHandle<()>>>,
    sweep_stop: Arc<Notify>,
    drain_finished: Notify,
}

impl Drop for SchedulerState {
    fn drop(&mut self) {
        let projects = self.projects.get_mut().unwrap_or_else(PoisonError::into_inner);
        for state in projects.values_mut() {
            state.disarm();
        }
        if let Some(sweep) = self
            .sweep
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            sweep.abort();
        }
    }
}

/// Handle to the autosave scheduler.
#[derive(Clone)]
pub struct AutosaveService {
    state: Arc<SchedulerState>,
}

impl AutosaveService {
    pub fn new(sink: Arc<dyn CheckpointSink>) -> Self {
        Self {
            state: Arc::new(SchedulerState {
                projects: Mutex::new(HashMap::new()),
                sink,
                sweep: Mutex::new(None),
                sweep_stop: Arc::new(Notify::new()),
                drain_finished: Notify::new(),
            }),
        }
    }

    fn projects(&self) -> MutexGuard<'_, HashMap<String, ProjectAutosaveState>> {
        self.state
            .projects
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    // ==================
    // Lifecycle
    // ==================

    /// Arm the background sweep. Calling it twice is a no-op.
    ///
    /// # Errors
    ///
    /// Returns an error when called outside a Tokio runtime.
    pub fn start(&self) -> Result<()> {
        let runtime = runtime_handle()?;
        let mut sweep = self.state.sweep.lock().unwrap_or_else(PoisonError::into_inner);
        if sweep.as_ref().is_some_and(|h| !h.is_finished()) {
            return Ok(());
        }

        let weak = Arc::downgrade(&self.state);
        let stop = Arc::clone(&self.state.sweep_stop);
        *sweep = Some(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + SWEEP_INTERVAL, SWEEP_INTERVAL);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;
                    () = stop.notified() => break,
                    _ = ticker.tick() => {}
                }
                let Some(service) = upgrade(&weak) else { break };
                service.drain_pending().await;
            }
            debug!("Auto-save sweep stopped");
        }));

        info!("Autosave service started");
        Ok(())
    }

    /// Stop the sweep, disarm every timer and drain every queue.
    ///
    /// The sweep finishes its current pass before it stops. Registrations
    /// are kept; only their timers are gone.
    pub async fn shutdown(&self) {
        info!("Stopping autosave service");

        let sweep = self
            .state
            .sweep
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(sweep) = sweep {
            self.state.sweep_stop.notify_one();
            if let Err(e) = sweep.await {
                error!(error = %e, "Auto-save sweep crashed");
            }
        }

        let paths: Vec<String> = {
            let mut projects = self.projects();
            for (path, state) in projects.iter_mut() {
                state.disarm();
                debug!(project = %path, "Disarmed autosave timer");
            }
            projects.keys().cloned().collect()
        };

        let mut drains = JoinSet::new();
        for path in paths {
            let service = self.clone();
            drains.spawn(async move { service.drain_until_idle(&path).await });
        }
        join_all(&mut drains).await;

        info!("Autosave service stopped");
    }

    // ==================
    // Registration
    // ==================

    /// Register or replace a project's autosave config.
    ///
    /// Any previous timer is cancelled before a new one is armed. Queued
    /// events survive re-registration; the failure counter does not.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for an invalid config, or an error when a
    /// timer is needed outside a Tokio runtime.
    pub fn register(&self, project_path: &str, config: AutosaveConfig) -> Result<()> {
        config.validate()?;
        info!(project = %project_path, ?config, "Registering project for auto-save");

        let timer = if config.wants_timer() {
            Some(self.arm_timer(project_path, config.interval_minutes)?)
        } else {
            None
        };

        let mut projects = self.projects();
        let state = projects
            .entry(project_path.to_string())
            .or_insert_with(|| ProjectAutosaveState::new(config.clone()));
        state.disarm();
        state.config = config;
        state.consecutive_failures = 0;
        state.timer = timer;
        Ok(())
    }

    /// Remove a registration after draining whatever is still queued.
    ///
    /// New events are refused while the queue drains. Unknown projects are
    /// ignored.
    pub async fn unregister(&self, project_path: &str) {
        {
            let mut projects = self.projects();
            let Some(state) = projects.get_mut(project_path) else {
                debug!(project = %project_path, "Not registered; nothing to unregister");
                return;
            };
            info!(project = %project_path, queued = state.queue.len(), "Unregistering project from auto-save");
            state.disarm();
            state.config.enabled = false;
        }

        self.drain_until_idle(project_path).await;
        // A register racing the drain may have armed a fresh timer.
        if let Some(mut state) = self.projects().remove(project_path) {
            state.disarm();
        }
    }

    /// Change the timer period of every registered project.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `minutes` is out of range.
    pub fn set_global_interval(&self, minutes: u64) -> Result<()> {
        if minutes > MAX_INTERVAL_MINUTES {
            return Err(Error::Config(format!(
                "interval must be at most {MAX_INTERVAL_MINUTES} minutes, got {minutes}"
            )));
        }

        let mut projects = self.projects();
        for (path, state) in projects.iter_mut() {
            state.disarm();
            state.config.interval_minutes = minutes;
            if state.config.wants_timer() {
                state.timer = Some(self.arm_timer(path, minutes)?);
            }
        }

        info!(minutes, projects = projects.len(), "Updated auto-save interval");
        Ok(())
    }

    fn arm_timer(&self, project_path: &str, minutes: u64) -> Result<JoinHandle<()>> {
        let runtime = runtime_handle()?;
        let period = Duration::from_secs(minutes * 60);
        let weak = Arc::downgrade(&self.state);
        let path = project_path.to_string();

        debug!(project = %project_path, minutes, "Arming auto-save timer");
        Ok(runtime.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(service) = upgrade(&weak) else { break };
                let event = SaveEvent::new(TriggerKind::Interval, path.as_str())
                    .with_metadata("automatic", true);
                // The save runs in its own task so that disarming this timer
                // never interrupts a drain.
                tokio::spawn(async move {
                    service.trigger_save(event).await;
                });
            }
        }))
    }

    // ==================
    // Triggers
    // ==================

    /// Offer an event to its project's queue.
    ///
    /// Returns whether the event was accepted. When accepted and no drain is
    /// running for the project, the queue is drained before returning.
    pub async fn trigger_save(&self, event: SaveEvent) -> bool {
        let project_path = event.project_path.clone();
        {
            let mut projects = self.projects();
            let Some(state) = projects.get_mut(&project_path) else {
                debug!(project = %project_path, kind = %event.kind, "Auto-save not registered; dropping event");
                return false;
            };
            if !state.config.enabled {
                debug!(project = %project_path, kind = %event.kind, "Auto-save disabled; dropping event");
                return false;
            }
            if !state.config.accepts(&event.kind) {
                debug!(project = %project_path, kind = %event.kind, "Trigger not enabled; dropping event");
                return false;
            }

            info!(
                project = %project_path,
                kind = %event.kind,
                queue_length = state.queue.len() + 1,
                "Queued auto-save"
            );
            state.queue.push_back(event);
            if state.processing {
                return true;
            }
        }

        self.drain(&project_path).await;
        true
    }

    /// Queue a manual save for every registered project, concurrently.
    ///
    /// Returns how many projects accepted the event.
    pub async fn save_all(&self) -> usize {
        let paths: Vec<String> = self.projects().keys().cloned().collect();

        let mut saves = JoinSet::new();
        for path in paths {
            let service = self.clone();
            saves.spawn(async move {
                let event = SaveEvent::new(TriggerKind::Manual, path)
                    .with_metadata("reason", "manual_save_all");
                service.trigger_save(event).await
            });
        }

        let mut accepted = 0;
        while let Some(result) = saves.join_next().await {
            match result {
                Ok(true) => accepted += 1,
                Ok(false) => {}
                Err(e) => error!(error = %e, "Save-all task crashed"),
            }
        }
        accepted
    }

    // ==================
    // Status
    // ==================

    #[must_use]
    pub fn status(&self, project_path: &str) -> Option<AutosaveStatus> {
        self.projects()
            .get(project_path)
            .map(|state| state.status(project_path))
    }

    /// Status of every registration, sorted by path.
    #[must_use]
    pub fn status_all(&self) -> Vec<AutosaveStatus> {
        let mut all: Vec<AutosaveStatus> = self
            .projects()
            .iter()
            .map(|(path, state)| state.status(path))
            .collect();
        all.sort_by(|a, b| a.project_path.cmp(&b.project_path));
        all
    }

    // ==================
    // Draining
    // ==================

    /// Drain one project's queue if nobody else is.
    async fn drain(&self, project_path: &str) {
        {
            let mut projects = self.projects();
            let Some(state) = projects.get_mut(project_path) else {
                return;
            };
            if state.processing || state.queue.is_empty() {
                return;
            }
            state.processing = true;
        }

        let mut guard = DrainGuard {
            service: self,
            project_path,
            released: false,
        };

        loop {
            let next = {
                let mut projects = self.projects();
                let Some(state) = projects.get_mut(project_path) else {
                    break;
                };
                match state.queue.pop_front() {
                    Some(event) => Some((event, RetryPolicy::from_config(&state.config))),
                    None => {
                        state.processing = false;
                        None
                    }
                }
            };

            let Some((event, policy)) = next else {
                guard.released = true;
                self.state.drain_finished.notify_waiters();
                break;
            };

            let outcome = execute_save(Arc::clone(&self.state.sink), &event, policy).await;
            if let Some(command) = self.record_outcome(project_path, &outcome) {
                self.apply_command(command);
            }
        }
    }

    /// Wait for any running drain, then drain until the queue is empty.
    async fn drain_until_idle(&self, project_path: &str) {
        loop {
            let finished = self.state.drain_finished.notified();
            tokio::pin!(finished);
            finished.as_mut().enable();

            let (processing, queued) = match self.projects().get(project_path) {
                Some(state) => (state.processing, !state.queue.is_empty()),
                None => return,
            };

            if processing {
                finished.await;
            } else if queued {
                self.drain(project_path).await;
            } else {
                return;
            }
        }
    }

    /// Sweep: drain every queue left non-empty with no active drain.
    async fn drain_pending(&self) {
        let stalled: Vec<String> = self
            .projects()
            .iter()
            .filter(|(_, state)| !state.processing && !state.queue.is_empty())
            .map(|(path, _)| path.clone())
            .collect();
        if stalled.is_empty() {
            return;
        }

        debug!(projects = stalled.len(), "Sweeping stalled auto-save queues");
        // Detached: aborting the sweep must not abort a drain holding a
        // popped event.
        let drains: Vec<JoinHandle<()>> = stalled
            .into_iter()
            .map(|path| {
                let service = self.clone();
                tokio::spawn(async move { service.drain(&path).await })
            })
            .collect();
        for drain in drains {
            if let Err(e) = drain.await {
                error!(error = %e, "Auto-save drain task crashed");
            }
        }
    }

    fn record_outcome(&self, project_path: &str, outcome: &SaveOutcome) -> Option<SchedulerCommand> {
        let mut projects = self.projects();
        let state = projects.get_mut(project_path)?;

        if outcome.is_success() {
            state.consecutive_failures = 0;
            return None;
        }

        state.consecutive_failures += 1;
        error!(
            project = %project_path,
            consecutive_failures = state.consecutive_failures,
            "Auto-save exhausted all attempts"
        );

        (state.consecutive_failures >= FAILURE_THRESHOLD && state.config.enabled).then(|| {
            SchedulerCommand::DisableAutosave {
                project_path: project_path.to_string(),
            }
        })
    }

    /// Apply a config change. This is the only writer of `enabled` outside
    /// registration.
    pub fn apply_command(&self, command: SchedulerCommand) {
        match command {
            SchedulerCommand::DisableAutosave { project_path } => {
                if let Some(state) = self.projects().get_mut(&project_path) {
                    warn!(
                        project = %project_path,
                        failures = state.consecutive_failures,
                        "Disabling auto-save due to repeated failures"
                    );
                    state.config.enabled = false;
                    state.disarm();
                }
            }
        }
    }
}

/// Clears `processing` if a drain ends without reaching its empty-queue exit.
struct DrainGuard<'a> {
    service: &'a AutosaveService,
    project_path: &'a str,
    released: bool,
}

impl Drop for DrainGuard<'_> {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Some(state) = self.service.projects().get_mut(self.project_path) {
            state.processing = false;
        }
        self.service.state.drain_finished.notify_waiters();
    }
}

fn upgrade(weak: &Weak<SchedulerState>) -> Option<AutosaveService> {
    weak.upgrade().map(|state| AutosaveService { state })
}

fn runtime_handle() -> Result<Handle> {
    Handle::try_current().map_err(|_| Error::Other("autosave requires a Tokio runtime".to_string()))
}

async fn join_all(set: &mut JoinSet<()>) {
    while let Some(result) = set.join_next().await {
        if let Err(e) = result {
            error!(error = %e, "Auto-save drain task crashed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Checkpoint;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::time::sleep;

    const P: &str = "/work/app";

    /// Records every call; fails the first `fail_first` calls, or all of
    /// them when `always_fail` is set.
    #[derive(Default)]
    struct SpySink {
        calls: Mutex<Vec<(String, String)>>,
        fail_first: AtomicUsize,
        always_fail: bool,
    }

    impl SpySink {
        fn failing_first(n: usize) -> Arc<Self> {
            let sink = Self::default();
            sink.fail_first.store(n, Ordering::SeqCst);
            Arc::new(sink)
        }

        fn always_failing() -> Arc<Self> {
            Arc::new(Self {
                always_fail: true,
                ..Self::default()
            })
        }

        fn names(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(_, n)| n.clone()).collect()
        }

        fn paths(&self) -> Vec<String> {
            self.calls.lock().unwrap().iter().map(|(p, _)| p.clone()).collect()
        }
    }

    impl CheckpointSink for SpySink {
        fn save_checkpoint(&self, project_path: &str, name: &str) -> Result<Checkpoint> {
            let mut calls = self.calls.lock().unwrap();
            calls.push((project_path.to_string(), name.to_string()));

            let scripted = self
                .fail_first
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok();
            if self.always_fail || scripted {
                return Err(Error::TransientStore("database is locked".into()));
            }

            Ok(Checkpoint {
                id: i64::try_from(calls.len()).unwrap(),
                project_id: "proj_test".into(),
                name: name.to_string(),
                branch: None,
                last_command: None,
                next_action: None,
                snapshot_data: String::new(),
                checksum: String::new(),
                created_at: 0,
            })
        }
    }

    fn config(interval_minutes: u64, triggers: &[TriggerKind]) -> AutosaveConfig {
        AutosaveConfig {
            enabled: true,
            interval_minutes,
            triggers: triggers.iter().cloned().collect(),
            max_retries: 3,
            retry_delay_ms: 1000,
        }
    }

    fn event(kind: TriggerKind) -> SaveEvent {
        SaveEvent::new(kind, P)
    }

    #[tokio::test(start_paused = true)]
    async fn test_interval_timer_fires_once_per_period() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(5, &[])).unwrap();

        sleep(Duration::from_secs(5 * 60 - 1)).await;
        assert!(sink.names().is_empty());

        sleep(Duration::from_secs(2)).await;
        let names = sink.names();
        assert_eq!(names.len(), 1);
        assert!(names[0].contains("interval"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_gate_drops_unlisted_kinds_and_accepts_manual() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(0, &[TriggerKind::TestPass])).unwrap();

        assert!(!service.trigger_save(event(TriggerKind::TaskComplete)).await);
        assert!(!service.trigger_save(event(TriggerKind::Custom("deploy".into()))).await);
        assert!(sink.names().is_empty());

        assert!(service.trigger_save(event(TriggerKind::Manual)).await);
        assert!(service.trigger_save(event(TriggerKind::Manual)).await);
        assert!(service.trigger_save(event(TriggerKind::TestPass)).await);
        assert_eq!(sink.names().len(), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregistered_and_disabled_projects_drop_events() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());

        assert!(!service.trigger_save(event(TriggerKind::Manual)).await);

        let mut disabled = config(5, &[]);
        disabled.enabled = false;
        service.register(P, disabled).unwrap();
        assert!(!service.status(P).unwrap().timer_armed);
        assert!(!service.trigger_save(event(TriggerKind::Manual)).await);
        assert!(sink.names().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_is_fifo_and_drained_by_one_task() {
        let sink = SpySink::failing_first(1);
        let service = AutosaveService::new(sink.clone());
        service
            .register(P, config(0, &[TriggerKind::TaskComplete, TriggerKind::TestPass]))
            .unwrap();

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.trigger_save(event(TriggerKind::TaskComplete)).await }
        });
        tokio::task::yield_now().await;

        // The first save is in flight and will fail once.
        let status = service.status(P).unwrap();
        assert!(status.processing);

        // Queued behind the running drain; returns without draining.
        assert!(service.trigger_save(event(TriggerKind::TestPass)).await);
        assert_eq!(service.status(P).unwrap().queue_length, 1);

        assert!(first.await.unwrap());
        let names = sink.names();
        assert_eq!(names.len(), 3);
        assert!(names[0].contains("task_complete"));
        assert!(names[1].contains("task_complete"));
        assert!(names[2].contains("test_pass"));

        let status = service.status(P).unwrap();
        assert!(!status.processing);
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.consecutive_failures, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_circuit_breaker_disables_after_five_failures() {
        let sink = SpySink::always_failing();
        let service = AutosaveService::new(sink.clone());
        let mut cfg = config(5, &[]);
        cfg.max_retries = 1;
        service.register(P, cfg).unwrap();

        for _ in 0..4 {
            assert!(service.trigger_save(event(TriggerKind::Manual)).await);
        }
        let status = service.status(P).unwrap();
        assert!(status.config.enabled);
        assert_eq!(status.consecutive_failures, 4);

        assert!(service.trigger_save(event(TriggerKind::Manual)).await);
        let status = service.status(P).unwrap();
        assert!(!status.config.enabled);
        assert!(!status.timer_armed);
        assert_eq!(status.consecutive_failures, 5);

        assert!(!service.trigger_save(event(TriggerKind::Manual)).await);
        assert_eq!(sink.names().len(), 5);

        // Re-registering is the operator reset.
        service.register(P, config(0, &[])).unwrap();
        assert_eq!(service.status(P).unwrap().consecutive_failures, 0);
        assert!(service.status(P).unwrap().config.enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn test_re_register_replaces_timer() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(5, &[])).unwrap();
        service.register(P, config(10, &[])).unwrap();

        sleep(Duration::from_secs(5 * 60 + 1)).await;
        assert!(sink.names().is_empty());

        sleep(Duration::from_secs(5 * 60)).await;
        assert_eq!(sink.names().len(), 1);
        assert_eq!(service.status(P).unwrap().config.interval_minutes, 10);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_drains_queue_first() {
        let sink = SpySink::failing_first(1);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(5, &[])).unwrap();

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.trigger_save(event(TriggerKind::Manual)).await }
        });
        tokio::task::yield_now().await;
        assert!(service.trigger_save(event(TriggerKind::Manual)).await);

        service.unregister(P).await;

        assert!(service.status(P).is_none());
        assert_eq!(sink.names().len(), 3);
        assert!(first.await.unwrap());

        // Unknown projects are ignored.
        service.unregister("/elsewhere").await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_set_global_interval_rearms_every_project() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());
        service.register("/a", config(30, &[])).unwrap();
        service.register("/b", config(60, &[])).unwrap();

        service.set_global_interval(1).unwrap();
        sleep(Duration::from_secs(61)).await;

        let mut paths = sink.paths();
        paths.sort();
        assert_eq!(paths, vec!["/a", "/b"]);
        assert!(service.status_all().iter().all(|s| s.config.interval_minutes == 1));

        assert!(matches!(
            service.set_global_interval(MAX_INTERVAL_MINUTES + 1),
            Err(Error::Config(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_save_all_triggers_every_project() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());
        service.register("/a", config(0, &[])).unwrap();
        service.register("/b", config(0, &[])).unwrap();

        assert_eq!(service.save_all().await, 2);

        let mut paths = sink.paths();
        paths.sort();
        assert_eq!(paths, vec!["/a", "/b"]);
        assert!(sink.names().iter().all(|n| n.contains("manual")));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_drains_stalled_queue() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(0, &[])).unwrap();
        service.start().unwrap();

        // Simulate a queue left behind with no drain running.
        service
            .projects()
            .get_mut(P)
            .unwrap()
            .queue
            .push_back(event(TriggerKind::Manual));

        sleep(SWEEP_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(sink.names().len(), 1);
        assert_eq!(service.status(P).unwrap().queue_length, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_disarms_timers_and_drains() {
        let sink = SpySink::failing_first(0);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(5, &[])).unwrap();
        service.start().unwrap();
        service
            .projects()
            .get_mut(P)
            .unwrap()
            .queue
            .push_back(event(TriggerKind::Manual));

        service.shutdown().await;

        let status = service.status(P).unwrap();
        assert!(!status.timer_armed);
        assert_eq!(status.queue_length, 0);
        assert_eq!(sink.names().len(), 1);

        sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(sink.names().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_lets_sweep_drain_finish_its_retry() {
        let sink = SpySink::failing_first(1);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(0, &[])).unwrap();
        service.start().unwrap();
        service
            .projects()
            .get_mut(P)
            .unwrap()
            .queue
            .push_back(event(TriggerKind::Manual));

        // The sweep's drain has failed once and is backing off.
        sleep(SWEEP_INTERVAL + Duration::from_millis(10)).await;
        assert_eq!(sink.names().len(), 1);
        assert!(service.status(P).unwrap().processing);

        service.shutdown().await;
        sleep(Duration::from_secs(10)).await;

        let status = service.status(P).unwrap();
        assert_eq!(sink.names().len(), 2);
        assert_eq!(status.queue_length, 0);
        assert_eq!(status.consecutive_failures, 0);
        assert!(!status.processing);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unregister_disarms_timer_armed_while_draining() {
        let sink = SpySink::failing_first(1);
        let service = AutosaveService::new(sink.clone());
        service.register(P, config(0, &[])).unwrap();

        let first = tokio::spawn({
            let service = service.clone();
            async move { service.trigger_save(event(TriggerKind::Manual)).await }
        });
        tokio::task::yield_now().await;
        assert!(service.status(P).unwrap().processing);

        let unregister = tokio::spawn({
            let service = service.clone();
            async move { service.unregister(P).await }
        });
        tokio::task::yield_now().await;

        // Lands while unregister waits on the drain, arming a 5 minute timer.
        service.register(P, config(5, &[])).unwrap();
        unregister.await.unwrap();
        assert!(first.await.unwrap());
        assert!(service.status(P).is_none());
        let saves = sink.names().len();

        // Interval events are always accepted, so a surviving timer would save.
        service.register(P, config(0, &[])).unwrap();
        sleep(Duration::from_secs(10 * 60)).await;
        assert_eq!(sink.names().len(), saves);
    }

    #[tokio::test]
    async fn test_register_rejects_invalid_config() {
        let service = AutosaveService::new(SpySink::failing_first(0));
        let bad = AutosaveConfig {
            max_retries: 99,
            ..AutosaveConfig::default()
        };
        assert!(matches!(service.register(P, bad), Err(Error::Config(_))));
        assert!(service.status(P).is_none());
    }
}

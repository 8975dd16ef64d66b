use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use super::error::StepError;
use super::interpreter::{Interpreter, RunReport};
use super::state::{MatchResult, RuntimeState, StopFlag};
use crate::script::{Script, Value};

/// Owns the runtime state and drives runs on a background worker.
///
/// Guarantees at most one active run: starting while a run is executing is a
/// no-op. Stop is cooperative — the interpreter observes the flag at the next
/// action boundary, so an in-flight action always completes first. The
/// controlling thread inspects state through short read-only snapshots and a
/// `watch` subscription for status text.
pub struct Runner {
    state: Arc<Mutex<RuntimeState>>,
    stop: StopFlag,
    status_tx: watch::Sender<String>,
    handle: Option<JoinHandle<RunReport>>,
}

impl Runner {
    pub fn new(state: RuntimeState) -> Self {
        let (status_tx, _) = watch::channel("Ready".to_string());
        Self {
            state: Arc::new(Mutex::new(state)),
            stop: StopFlag::new(),
            status_tx,
            handle: None,
        }
    }

    /// Runner wired to the real screen, matcher and injector.
    pub fn with_default_providers(dry_run: bool, display: usize) -> Self {
        Self::new(RuntimeState::with_default_providers(dry_run, display))
    }

    fn lock_state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Subscribe to status text ("Ready", "Running", "[i] KIND ...", "Stopped", "Done").
    pub fn status(&self) -> watch::Receiver<String> {
        self.status_tx.subscribe()
    }

    /// Is a background run currently executing?
    pub fn is_running(&self) -> bool {
        self.handle.as_ref().is_some_and(|h| !h.is_finished())
    }

    /// Launch a run on the blocking worker pool. Returns false (and does
    /// nothing) when a run is already active.
    pub fn start(&mut self, script: Script) -> bool {
        if self.is_running() {
            debug!(target: "pixelbot::engine", "Run already active; start ignored");
            return false;
        }
        self.stop.clear_stop();
        let interpreter =
            Interpreter::new(self.state.clone(), self.stop.clone(), self.status_tx.clone());
        info!(target: "pixelbot::engine", len = script.len(), "Starting run");
        self.handle = Some(tokio::task::spawn_blocking(move || {
            interpreter.run(&script)
        }));
        true
    }

    /// Request a cooperative stop of the active run.
    pub fn stop(&self) {
        self.stop.request_stop();
    }

    /// Await the active run, if any, and return its report.
    ///
    /// Cancellation-safe: if the returned future is dropped (e.g. losing a
    /// `select!`), the run keeps its handle and a later `wait` resumes it.
    pub async fn wait(&mut self) -> Option<RunReport> {
        let handle = self.handle.as_mut()?;
        let result = handle.await;
        self.handle = None;
        match result {
            Ok(report) => Some(report),
            Err(err) => {
                error!(target: "pixelbot::engine", error = %err, "Run task failed");
                None
            }
        }
    }

    /// Execute exactly one action synchronously through the run dispatch,
    /// without touching the program counter or the stop flag. Refused while
    /// a run is active — manual execution and runs must not interleave.
    pub fn test_action(&self, script: &Script, index: usize) -> Result<(), StepError> {
        if self.is_running() {
            return Err(StepError::Busy);
        }
        let interpreter =
            Interpreter::new(self.state.clone(), self.stop.clone(), self.status_tx.clone());
        interpreter.test_action(script, index)
    }

    /// Read-only copy of the variable store for display.
    pub fn vars_snapshot(&self) -> BTreeMap<String, Value> {
        self.lock_state().vars_snapshot()
    }

    /// Read-only copy of the last match result for display.
    pub fn last_match(&self) -> Option<MatchResult> {
        self.lock_state().last_match().cloned()
    }

    /// Manual capture from the controlling thread (only valid while no run
    /// is active; see the shared-resource policy).
    pub fn capture_screen(&self) -> anyhow::Result<()> {
        self.lock_state().capture_screen().map(|_| ())
    }

    /// Load a template from the controlling thread.
    pub fn load_template(&self, name: &str, path: &str) -> bool {
        self.lock_state().load_template(name, path)
    }

    /// Remove a registered template. Returns whether it existed.
    pub fn remove_template(&self, name: &str) -> bool {
        self.lock_state().remove_template(name)
    }

    /// Names of the registered templates, for display.
    pub fn template_names(&self) -> Vec<String> {
        self.lock_state().template_names()
    }

    /// New-script reset: clears variables and the last match.
    pub fn reset(&self) {
        self.lock_state().reset();
        self.status_tx.send_replace("Ready".to_string());
    }
}

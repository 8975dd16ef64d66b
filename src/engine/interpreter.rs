use rand::random_range;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::error::StepError;
use super::expr::{ExprEnv, eval_condition};
use super::op::Op;
use super::state::{RuntimeState, StopFlag};
use crate::script::{Script, Value};

/// Variables written by FIND_TEMPLATE alongside the match result.
pub const VAR_LAST_MATCH_SCORE: &str = "last_match_score";
pub const VAR_LAST_MATCH_NAME: &str = "last_match_name";
pub const VAR_LAST_MATCH_XY: &str = "last_match_xy";

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOutcome {
    /// The program counter advanced past the end of the script.
    Done,
    /// The stop flag was observed at a step boundary.
    Stopped,
}

/// Result of a completed run.
#[derive(Debug, Clone, Copy)]
pub struct RunReport {
    pub outcome: RunOutcome,
    /// Final program counter. Equals the script length after a normal run.
    pub final_pc: usize,
    /// Number of actions dispatched (failed actions included).
    pub steps: u64,
}

/// The fetch-decode-execute-jump loop.
///
/// One interpreter drives one script over shared runtime state. Per-action
/// failures are reported and skipped — only the stop flag or the end of the
/// script ends a run.
pub struct Interpreter {
    state: Arc<Mutex<RuntimeState>>,
    stop: StopFlag,
    status: watch::Sender<String>,
}

impl Interpreter {
    pub fn new(
        state: Arc<Mutex<RuntimeState>>,
        stop: StopFlag,
        status: watch::Sender<String>,
    ) -> Self {
        Self {
            state,
            stop,
            status,
        }
    }

    fn state(&self) -> MutexGuard<'_, RuntimeState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn set_status(&self, text: impl Into<String>) {
        self.status.send_replace(text.into());
    }

    /// Run the script to completion or until stopped.
    pub fn run(&self, script: &Script) -> RunReport {
        let mut pc = 0usize;
        let mut steps = 0u64;
        self.set_status("Running");
        info!(target: "pixelbot::engine", len = script.len(), "Run started");

        while pc < script.len() {
            // Cooperative stop, observed between actions only.
            if self.stop.should_stop() {
                self.set_status("Stopped");
                info!(target: "pixelbot::engine", pc, steps, "Run stopped");
                return RunReport {
                    outcome: RunOutcome::Stopped,
                    final_pc: pc,
                    steps,
                };
            }

            steps += 1;
            match self.execute_at(script, pc) {
                Ok(Some(target)) => {
                    pc = clamp_target(target, script.len());
                }
                Ok(None) => pc += 1,
                Err(err) => {
                    // Per-action failures never end the run.
                    let kind = script.get(pc).map(|a| a.kind.as_str()).unwrap_or("?");
                    warn!(
                        target: "pixelbot::engine",
                        index = pc, kind, error = %err,
                        "Action failed; continuing"
                    );
                    self.set_status(format!("[{pc}] {kind} error: {err}"));
                    pc += 1;
                }
            }
        }

        self.set_status("Done");
        info!(target: "pixelbot::engine", steps, "Run finished");
        RunReport {
            outcome: RunOutcome::Done,
            final_pc: pc,
            steps,
        }
    }

    /// Execute exactly one action, synchronously, through the same dispatch
    /// as a full run. Does not consult the stop flag and has no program
    /// counter; the jump signal of IF_GOTO is discarded.
    pub fn test_action(&self, script: &Script, index: usize) -> Result<(), StepError> {
        self.execute_at(script, index).map(|_| ())
    }

    /// Dispatch the action at `index`. Returns the raw jump target if the
    /// handler signalled one.
    fn execute_at(&self, script: &Script, index: usize) -> Result<Option<i64>, StepError> {
        let action = script.get(index).ok_or(StepError::OutOfBounds(index))?;
        let op = Op::decode(action)?;
        self.set_status(format!("[{index}] {}", op.status_line()));

        match op {
            Op::Wait { seconds, jitter } => {
                let extra = if jitter > 0.0 {
                    random_range(0.0..=jitter)
                } else {
                    0.0
                };
                thread::sleep(Duration::from_secs_f64(seconds + extra));
            }

            Op::Screenshot => {
                self.state().capture_screen()?;
            }

            Op::LoadTemplate { name, path } => {
                if !self.state().load_template(&name, &path) {
                    self.set_status(format!("[{index}] LOAD_TEMPLATE {name} failed"));
                }
            }

            Op::FindTemplate {
                name,
                threshold,
                method,
            } => {
                let mut state = self.state();
                match state.find_template(&name, threshold, method)? {
                    Some(m) => {
                        state.set_var(VAR_LAST_MATCH_SCORE, Value::Float(m.score));
                        state.set_var(VAR_LAST_MATCH_NAME, Value::Str(m.name.clone()));
                        state.set_var(VAR_LAST_MATCH_XY, Value::Str(format!("{},{}", m.x, m.y)));
                    }
                    None => {
                        state.remove_var(VAR_LAST_MATCH_SCORE);
                        state.remove_var(VAR_LAST_MATCH_NAME);
                        state.remove_var(VAR_LAST_MATCH_XY);
                    }
                }
            }

            Op::ClickMatch {
                button,
                clicks,
                interval,
                center,
                offset_x,
                offset_y,
            } => {
                let clicked = self.state().click_match(
                    button,
                    clicks,
                    interval,
                    center,
                    (offset_x, offset_y),
                )?;
                if !clicked {
                    warn!(target: "pixelbot::engine", index, "No last match to click");
                    self.set_status(format!("[{index}] CLICK_MATCH no match"));
                }
            }

            Op::ClickAt {
                x,
                y,
                button,
                clicks,
                interval,
            } => {
                self.state().click_at(x, y, button, clicks, interval)?;
            }

            Op::MoveMouse { x, y, duration } => {
                self.state().move_mouse(x, y, duration)?;
            }

            Op::CheckPixel {
                x,
                y,
                r,
                g,
                b,
                tolerance,
                set_var,
            } => {
                let mut state = self.state();
                let ok = state.check_pixel(x, y, r, g, b, tolerance)?;
                state.set_var(set_var, Value::Bool(ok));
            }

            Op::SetVar { name, value } => {
                self.state().set_var(name, value);
            }

            Op::IfGoto { expr, index: target } => {
                let jump = {
                    let state = self.state();
                    let env = ExprEnv {
                        vars: state.vars(),
                        last_match: state.last_match(),
                    };
                    match eval_condition(&expr, &env) {
                        Ok(cond) => cond,
                        Err(err) => {
                            // Malformed or failing conditions are false, never fatal.
                            debug!(
                                target: "pixelbot::engine",
                                index, error = %err,
                                "Condition error treated as false"
                            );
                            false
                        }
                    }
                };
                if jump {
                    return Ok(Some(target));
                }
            }

            Op::PressKey { key } => {
                self.state().press_key(&key)?;
            }

            Op::TypeText { text, interval } => {
                self.state().type_text(&text, interval)?;
            }
        }

        Ok(None)
    }
}

/// Jump targets land inside the script no matter what the author wrote.
pub(crate) fn clamp_target(target: i64, len: usize) -> usize {
    let last = len.saturating_sub(1) as i64;
    target.clamp(0, last) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::TemplateMatcher;
    use crate::providers::testing::{
        FailingScreen, InjectedEvent, RecordingInjector, StaticScreen, frame_with_patch,
        solid_frame,
    };
    use crate::script::{Action, ActionKind, Script};
    use image::{Rgb, RgbImage};
    use std::collections::BTreeMap;
    use std::sync::Arc;

    struct Harness {
        interp: Interpreter,
        state: Arc<Mutex<RuntimeState>>,
        stop: StopFlag,
        status_rx: watch::Receiver<String>,
        events: Arc<Mutex<Vec<InjectedEvent>>>,
    }

    fn harness_with_frame(frame: RgbImage) -> Harness {
        let (screen, _) = StaticScreen::new(frame);
        let (injector, events) = RecordingInjector::new();
        let state = Arc::new(Mutex::new(RuntimeState::new(
            Box::new(screen),
            Box::new(TemplateMatcher::new()),
            Box::new(injector),
        )));
        let stop = StopFlag::new();
        let (status_tx, status_rx) = watch::channel("Ready".to_string());
        let interp = Interpreter::new(state.clone(), stop.clone(), status_tx);
        Harness {
            interp,
            state,
            stop,
            status_rx,
            events,
        }
    }

    fn harness() -> Harness {
        harness_with_frame(solid_frame(20, 20, [50, 60, 70]))
    }

    fn set_var(name: &str, value: Value) -> Action {
        Action::new(ActionKind::SetVar)
            .with("name", Value::Str(name.into()))
            .with("value", value)
    }

    fn vars_of(h: &Harness) -> BTreeMap<String, Value> {
        h.state.lock().unwrap().vars_snapshot()
    }

    #[test]
    fn clamp_target_bounds() {
        assert_eq!(clamp_target(-5, 4), 0);
        assert_eq!(clamp_target(0, 4), 0);
        assert_eq!(clamp_target(2, 4), 2);
        assert_eq!(clamp_target(99, 4), 3);
        assert_eq!(clamp_target(0, 0), 0);
    }

    #[test]
    fn full_run_ends_with_pc_at_script_len() {
        let h = harness();
        let script: Script = vec![
            set_var("a", Value::Int(1)),
            set_var("b", Value::Int(2)),
            set_var("c", Value::Int(3)),
        ]
        .into_iter()
        .collect();

        let report = h.interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.final_pc, script.len());
        assert_eq!(report.steps, 3);
        assert_eq!(vars_of(&h).len(), 3);
        assert_eq!(*h.status_rx.borrow(), "Done");
    }

    #[test]
    fn empty_script_is_immediately_done() {
        let h = harness();
        let report = h.interp.run(&Script::new());
        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.final_pc, 0);
        assert_eq!(report.steps, 0);
    }

    #[test]
    fn forward_jump_is_clamped_to_last_index() {
        let h = harness();
        let script: Script = vec![
            Action::new(ActionKind::IfGoto)
                .with("expr", Value::Str("true".into()))
                .with("index", Value::Int(99)),
            set_var("skipped", Value::Int(1)),
            set_var("end", Value::Int(1)),
        ]
        .into_iter()
        .collect();

        let report = h.interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);
        let vars = vars_of(&h);
        assert!(!vars.contains_key("skipped"));
        assert_eq!(vars.get("end"), Some(&Value::Int(1)));
    }

    #[test]
    fn false_condition_falls_through_after_one_evaluation() {
        // The jump body never increments 'i', so the condition must read the
        // value SET_VAR left behind and refuse the jump.
        let h = harness();
        let script: Script = vec![
            set_var("i", Value::Int(0)),
            set_var("i", Value::Int(1)),
            Action::new(ActionKind::IfGoto)
                .with("expr", Value::Str("vars['i'] < 1".into()))
                .with("index", Value::Int(1)),
        ]
        .into_iter()
        .collect();

        let report = h.interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.final_pc, 3);
        assert_eq!(report.steps, 3);
    }

    #[test]
    fn malformed_condition_is_false_not_fatal() {
        let h = harness();
        let script: Script = vec![
            Action::new(ActionKind::IfGoto)
                .with("expr", Value::Str("import os; vars[".into()))
                .with("index", Value::Int(0)),
            set_var("after", Value::Bool(true)),
        ]
        .into_iter()
        .collect();

        let report = h.interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(vars_of(&h).get("after"), Some(&Value::Bool(true)));
    }

    #[test]
    fn unknown_kind_is_reported_and_the_run_continues() {
        let h = harness();
        let script: Script = vec![
            Action {
                kind: "TELEPORT".into(),
                params: Default::default(),
            },
            set_var("after", Value::Int(1)),
        ]
        .into_iter()
        .collect();

        let report = h.interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(report.steps, 2);
        assert_eq!(vars_of(&h).get("after"), Some(&Value::Int(1)));
    }

    #[test]
    fn provider_failure_is_reported_and_the_run_continues() {
        let (injector, _) = RecordingInjector::new();
        let state = Arc::new(Mutex::new(RuntimeState::new(
            Box::new(FailingScreen),
            Box::new(TemplateMatcher::new()),
            Box::new(injector),
        )));
        let (status_tx, status_rx) = watch::channel("Ready".to_string());
        let interp = Interpreter::new(state.clone(), StopFlag::new(), status_tx);

        let script: Script = vec![
            Action::new(ActionKind::Screenshot),
            set_var("after", Value::Int(1)),
        ]
        .into_iter()
        .collect();

        let report = interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);
        assert_eq!(
            state.lock().unwrap().get_var("after"),
            Some(&Value::Int(1))
        );
        drop(status_rx);
    }

    #[test]
    fn find_template_success_records_match_variables() {
        let h = harness_with_frame(frame_with_patch(
            40,
            30,
            [90, 90, 90],
            12,
            9,
            6,
            4,
            [200, 30, 30],
        ));
        let template = {
            let mut t = RgbImage::from_pixel(8, 6, Rgb([90, 90, 90]));
            for y in 1..5 {
                for x in 1..7 {
                    t.put_pixel(x, y, Rgb([200, 30, 30]));
                }
            }
            t
        };
        h.state.lock().unwrap().insert_template("patch", template);

        let script: Script = vec![
            Action::new(ActionKind::FindTemplate)
                .with("name", Value::Str("patch".into()))
                .with("threshold", Value::Float(0.8)),
            Action::new(ActionKind::ClickMatch),
        ]
        .into_iter()
        .collect();

        let report = h.interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);

        let vars = vars_of(&h);
        assert_eq!(vars.get(VAR_LAST_MATCH_NAME), Some(&Value::Str("patch".into())));
        assert_eq!(vars.get(VAR_LAST_MATCH_XY), Some(&Value::Str("11,8".into())));
        assert!(matches!(vars.get(VAR_LAST_MATCH_SCORE), Some(Value::Float(s)) if *s > 0.99));

        // CLICK_MATCH used the match: one click at the patch center.
        let events = h.events.lock().unwrap();
        assert_eq!(events.len(), 1);
        assert!(matches!(events[0], InjectedEvent::Click { x: 15, y: 11, .. }));
    }

    #[test]
    fn find_template_missing_leaves_match_variables_absent() {
        let h = harness();
        let script: Script = vec![
            Action::new(ActionKind::FindTemplate)
                .with("name", Value::Str("missing".into())),
            Action::new(ActionKind::ClickMatch),
        ]
        .into_iter()
        .collect();

        let report = h.interp.run(&script);
        assert_eq!(report.outcome, RunOutcome::Done);
        let vars = vars_of(&h);
        assert!(!vars.contains_key(VAR_LAST_MATCH_NAME));
        assert!(!vars.contains_key(VAR_LAST_MATCH_SCORE));
        assert!(!vars.contains_key(VAR_LAST_MATCH_XY));
        // No match, no injection.
        assert!(h.events.lock().unwrap().is_empty());
    }

    #[test]
    fn check_pixel_records_the_named_variable() {
        let h = harness(); // frame is solid [50, 60, 70]
        let script: Script = vec![
            Action::new(ActionKind::CheckPixel)
                .with("x", Value::Int(3))
                .with("y", Value::Int(3))
                .with("r", Value::Int(50))
                .with("g", Value::Int(60))
                .with("b", Value::Int(75))
                .with("tolerance", Value::Int(5))
                .with("set_var", Value::Str("seen".into())),
        ]
        .into_iter()
        .collect();

        h.interp.run(&script);
        assert_eq!(vars_of(&h).get("seen"), Some(&Value::Bool(true)));
    }

    #[test]
    fn input_actions_reach_the_injector_in_script_order() {
        let h = harness();
        let script: Script = vec![
            Action::new(ActionKind::ClickAt)
                .with("x", Value::Int(5))
                .with("y", Value::Int(6)),
            Action::new(ActionKind::MoveMouse)
                .with("x", Value::Int(7))
                .with("y", Value::Int(8))
                .with("duration", Value::Float(0.0)),
            Action::new(ActionKind::PressKey).with("key", Value::Str("enter".into())),
            Action::new(ActionKind::TypeText).with("text", Value::Str("hi".into())),
        ]
        .into_iter()
        .collect();

        h.interp.run(&script);
        let events = h.events.lock().unwrap();
        assert_eq!(events.len(), 4);
        assert!(matches!(events[0], InjectedEvent::Click { x: 5, y: 6, .. }));
        assert_eq!(events[1], InjectedEvent::Move { x: 7, y: 8 });
        assert_eq!(events[2], InjectedEvent::Key("enter".into()));
        assert_eq!(events[3], InjectedEvent::Text("hi".into()));
    }

    #[test]
    fn stop_requested_mid_run_halts_at_the_next_boundary() {
        let h = harness();
        let script: Script = vec![
            Action::new(ActionKind::Wait).with("seconds", Value::Float(0.005)),
            Action::new(ActionKind::IfGoto)
                .with("expr", Value::Str("true".into()))
                .with("index", Value::Int(0)),
        ]
        .into_iter()
        .collect();

        let stop = h.stop.clone();
        let status_rx = h.status_rx.clone();
        let interp = h.interp;
        let handle = std::thread::spawn(move || interp.run(&script));

        std::thread::sleep(Duration::from_millis(25));
        stop.request_stop();
        let report = handle.join().expect("runner thread panicked");
        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert_eq!(*status_rx.borrow(), "Stopped");
    }

    #[test]
    fn negative_jump_target_loops_safely_at_index_zero() {
        let h = harness();
        let script: Script = vec![
            set_var("tick", Value::Int(1)),
            Action::new(ActionKind::IfGoto)
                .with("expr", Value::Str("true".into()))
                .with("index", Value::Int(-7)),
        ]
        .into_iter()
        .collect();

        let stop = h.stop.clone();
        let interp = h.interp;
        let handle = std::thread::spawn(move || interp.run(&script));
        std::thread::sleep(Duration::from_millis(15));
        stop.request_stop();
        let report = handle.join().expect("runner thread panicked");
        // The clamped target kept execution inside the script until stop.
        assert_eq!(report.outcome, RunOutcome::Stopped);
        assert!(report.steps >= 2);
    }

    #[test]
    fn test_action_runs_one_action_and_ignores_stop_and_jumps() {
        let h = harness();
        let script: Script = vec![
            set_var("probe", Value::Int(9)),
            Action::new(ActionKind::IfGoto)
                .with("expr", Value::Str("true".into()))
                .with("index", Value::Int(0)),
        ]
        .into_iter()
        .collect();

        // A pending stop request does not gate single-action testing.
        h.stop.request_stop();
        h.interp.test_action(&script, 0).unwrap();
        assert_eq!(vars_of(&h).get("probe"), Some(&Value::Int(9)));
        assert!(h.stop.should_stop());

        // The jump signal is discarded.
        h.interp.test_action(&script, 1).unwrap();

        // Out-of-script indices are an error on this path.
        assert!(matches!(
            h.interp.test_action(&script, 5),
            Err(StepError::OutOfBounds(5))
        ));
    }

    #[test]
    fn status_lines_carry_index_and_kind() {
        let h = harness();
        let script: Script = vec![set_var("x", Value::Int(1))].into_iter().collect();
        h.interp.test_action(&script, 0).unwrap();
        assert_eq!(*h.status_rx.borrow(), "[0] SET_VAR x=1");
    }
}

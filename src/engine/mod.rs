#![allow(clippy::missing_errors_doc, clippy::missing_panics_doc)]

/*!
Execution engine.

This module wires together:
- `state`: the runtime working memory (variables, templates, capture cache,
  last match) and the cooperative stop flag
- `op`: dispatch-time decode of wire actions into a closed, typed sum
- `expr`: the sandboxed IF_GOTO condition language
- `interpreter`: the fetch-decode-execute-jump loop
- `runner`: background run control with at-most-one active run

Typical usage:
- Construct a `Runner` (with the default providers or injected ones).
- Call `Runner::start` with a loaded `Script`; observe progress through
  `Runner::status`; call `Runner::stop` to end the run cooperatively.

Example:
```no_run
use pixelbot::engine::Runner;
use pixelbot::script::Script;

let mut runner = Runner::with_default_providers(true, 0); // dry-run mode
let script = Script::new();
runner.start(script);
runner.stop();
```

Public re-exports:
- `Runner`: starts/stops runs, single-action testing, state snapshots.
- `Interpreter`, `RunOutcome`, `RunReport`: the loop itself.
- `RuntimeState`, `StopFlag`, `MatchResult`: the working memory.
- `Op`, `StepError`, `ExprError`: dispatch and failure taxonomy.
*/

pub mod error;
pub mod expr;
pub mod interpreter;
pub mod op;
pub mod runner;
pub mod state;

// Re-exports for convenient access from `pixelbot::engine::*`
pub use error::StepError;
pub use expr::{ExprEnv, ExprError, eval_condition};
pub use interpreter::{
    Interpreter, RunOutcome, RunReport, VAR_LAST_MATCH_NAME, VAR_LAST_MATCH_SCORE,
    VAR_LAST_MATCH_XY,
};
pub use op::Op;
pub use runner::Runner;
pub use state::{MatchResult, RuntimeState, StopFlag};

//! Script module: the action data model and the script container I/O.
//!
//! A script is an ordered, index-addressed list of actions; each action is a
//! kind tag plus a bag of named primitive parameters. Import from here for a
//! stable API.
//!
//! Example:
//! use pixelbot::script::{load_from_path, Script};
//!
//! let script = load_from_path("scripts/demo.json")?;

pub mod loader;
pub mod model;

// Re-export core data models
pub use model::{Action, ActionKind, Params, Script, Value};

// Re-export loader utilities
pub use loader::{
    LintWarning, generate_schema, lint_script, load_from_path, load_from_path_async,
    load_from_reader, load_from_str, save_to_path, save_to_writer, write_schema_to_writer,
};

use anyhow::{Context, Result};
use schemars::{Schema, schema_for};
use std::fmt;
use std::fs::File;
use std::io::{Read, Write};
use std::path::Path;
use tracing::debug;

use super::model::{ActionKind, Script};

/// Load a script from a string slice.
pub fn load_from_str(s: &str) -> Result<Script> {
    serde_json::from_str(s).context("Failed to parse JSON script")
}

/// Load a script from any reader (e.g., a file).
pub fn load_from_reader<R: Read>(reader: R) -> Result<Script> {
    serde_json::from_reader(reader).context("Failed to parse JSON script from reader")
}

/// Load a script from a file path synchronously.
pub fn load_from_path<P: AsRef<Path>>(path: P) -> Result<Script> {
    let path_ref = path.as_ref();
    let file = File::open(path_ref)
        .with_context(|| format!("Failed to open script file {}", path_ref.display()))?;
    let script = load_from_reader(file)?;
    debug!("Loaded script from {}", path_ref.display());
    Ok(script)
}

/// Load a script from a file path asynchronously (Tokio).
pub async fn load_from_path_async<P: AsRef<Path>>(path: P) -> Result<Script> {
    use tokio::fs;
    let path_ref = path.as_ref();
    let bytes = fs::read(path_ref)
        .await
        .with_context(|| format!("Failed to read script file {}", path_ref.display()))?;
    let script: Script = serde_json::from_slice(&bytes)
        .with_context(|| format!("Failed to parse JSON script from {}", path_ref.display()))?;
    debug!("Loaded script from {}", path_ref.display());
    Ok(script)
}

/// Serialize a script to any writer (pretty-printed JSON).
pub fn save_to_writer<W: Write>(script: &Script, writer: W) -> Result<()> {
    serde_json::to_writer_pretty(writer, script).context("Failed to serialize script")
}

/// Serialize a script to a file path (pretty-printed JSON).
pub fn save_to_path<P: AsRef<Path>>(script: &Script, path: P) -> Result<()> {
    let path_ref = path.as_ref();
    let file = File::create(path_ref)
        .with_context(|| format!("Failed to create script file {}", path_ref.display()))?;
    save_to_writer(script, file)?;
    debug!("Saved script to {}", path_ref.display());
    Ok(())
}

/// Generate the JSON Schema for the script format (for external tooling).
pub fn generate_schema() -> Schema {
    schema_for!(Script)
}

/// Write the JSON Schema for the script format to any writer (pretty-printed).
pub fn write_schema_to_writer<W: Write>(mut writer: W) -> Result<()> {
    let schema = generate_schema();
    let json = serde_json::to_string_pretty(&schema).context("Failed to serialize schema")?;
    writer
        .write_all(json.as_bytes())
        .context("Failed to write schema to writer")?;
    Ok(())
}

/// An authoring-time warning produced by [`lint_script`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LintWarning {
    /// Index of the offending action within the script.
    pub index: usize,
    pub message: String,
}

impl fmt::Display for LintWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "action #{}: {}", self.index, self.message)
    }
}

/// Check a script for likely authoring mistakes.
///
/// Lint never fails a load: unknown kinds stay an execution-time error and
/// out-of-range jump targets are clamped by the interpreter. The warnings
/// exist so an authoring surface can flag them before a run.
pub fn lint_script(script: &Script) -> Vec<LintWarning> {
    let mut warnings = Vec::new();

    for (idx, action) in script.actions().iter().enumerate() {
        let Some(kind) = ActionKind::from_tag(&action.kind) else {
            warnings.push(LintWarning {
                index: idx,
                message: format!("unknown action kind '{}'", action.kind),
            });
            continue;
        };

        match kind {
            ActionKind::IfGoto => {
                let target = action.params.get_i64("index", 0);
                if target < 0 || target as usize >= script.len().max(1) {
                    warnings.push(LintWarning {
                        index: idx,
                        message: format!(
                            "IF_GOTO target {} is outside 0..{} and will be clamped",
                            target,
                            script.len().saturating_sub(1)
                        ),
                    });
                }
            }
            ActionKind::FindTemplate => {
                let method = action.params.get_string("method", "ccoeff");
                if !matches!(method.to_ascii_lowercase().as_str(), "ccoeff" | "sqdiff") {
                    warnings.push(LintWarning {
                        index: idx,
                        message: format!("unrecognized match method '{method}'"),
                    });
                }
            }
            ActionKind::LoadTemplate => {
                if action.params.get_string("path", "").is_empty() {
                    warnings.push(LintWarning {
                        index: idx,
                        message: "LOAD_TEMPLATE has an empty path".into(),
                    });
                }
            }
            _ => {}
        }
    }

    warnings
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::model::{Action, ActionKind, Value};

    fn sample_script() -> Script {
        vec![
            Action::new(ActionKind::LoadTemplate)
                .with("name", Value::Str("ok_button".into()))
                .with("path", Value::Str("assets/ok.png".into())),
            Action::new(ActionKind::FindTemplate)
                .with("name", Value::Str("ok_button".into()))
                .with("threshold", Value::Float(0.9)),
            Action::new(ActionKind::ClickMatch),
        ]
        .into_iter()
        .collect()
    }

    #[test]
    fn in_memory_save_load_round_trip() {
        let script = sample_script();
        let mut buf = Vec::new();
        save_to_writer(&script, &mut buf).unwrap();
        let back = load_from_reader(buf.as_slice()).unwrap();
        assert_eq!(back, script);
    }

    #[test]
    fn load_accepts_legacy_wire_shape() {
        let text = r#"[
            {"type": "WAIT", "params": {"seconds": 0.5}},
            {"type": "SCREENSHOT"},
            {"type": "IF_GOTO", "params": {"expr": "vars['i'] < 3", "index": 0}}
        ]"#;
        let script = load_from_str(text).unwrap();
        assert_eq!(script.len(), 3);
        assert_eq!(script.get(1).unwrap().kind, "SCREENSHOT");
    }

    #[test]
    fn lint_flags_unknown_kind_and_bad_jump() {
        let script: Script = vec![
            Action::new(ActionKind::Wait),
            Action {
                kind: "TELEPORT".into(),
                params: Default::default(),
            },
            Action::new(ActionKind::IfGoto)
                .with("expr", Value::Str("true".into()))
                .with("index", Value::Int(99)),
        ]
        .into_iter()
        .collect();

        let warnings = lint_script(&script);
        assert_eq!(warnings.len(), 2);
        assert_eq!(warnings[0].index, 1);
        assert!(warnings[0].message.contains("TELEPORT"));
        assert_eq!(warnings[1].index, 2);
        assert!(warnings[1].message.contains("clamped"));
    }

    #[test]
    fn lint_flags_unknown_match_method_and_empty_template_path() {
        let script: Script = vec![
            Action::new(ActionKind::FindTemplate).with("method", Value::Str("hough".into())),
            Action::new(ActionKind::LoadTemplate).with("name", Value::Str("a".into())),
        ]
        .into_iter()
        .collect();

        let warnings = lint_script(&script);
        assert_eq!(warnings.len(), 2);
        assert!(warnings[0].message.contains("hough"));
        assert!(warnings[1].message.contains("empty path"));
    }

    #[test]
    fn lint_is_quiet_on_a_clean_script() {
        assert!(lint_script(&sample_script()).is_empty());
    }

    #[test]
    fn schema_generation_mentions_the_wire_fields() {
        let schema = serde_json::to_string(&generate_schema()).unwrap();
        assert!(schema.contains("params"));
    }
}

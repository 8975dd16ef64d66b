//! Typed operation decode.
//!
//! The wire-level [`Action`] stays a kind tag plus a parameter bag so that
//! scripts round-trip byte-for-byte and unknown kinds survive loading. At
//! dispatch time each action is decoded into this closed sum type, applying
//! the per-kind parameter defaults; execution then matches exhaustively over
//! [`Op`], so adding a kind without a handler is a compile error rather than
//! a runtime fallback.

use std::time::Duration;
use tracing::warn;

use super::error::StepError;
use crate::providers::{MatchMethod, MouseButton};
use crate::script::{Action, ActionKind, Params, Value};

/// A fully-resolved operation, ready to execute.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Wait {
        seconds: f64,
        jitter: f64,
    },
    Screenshot,
    LoadTemplate {
        name: String,
        path: String,
    },
    FindTemplate {
        name: String,
        threshold: f64,
        method: MatchMethod,
    },
    ClickMatch {
        button: MouseButton,
        clicks: u32,
        interval: Duration,
        center: bool,
        offset_x: i32,
        offset_y: i32,
    },
    ClickAt {
        x: i32,
        y: i32,
        button: MouseButton,
        clicks: u32,
        interval: Duration,
    },
    MoveMouse {
        x: i32,
        y: i32,
        duration: Duration,
    },
    CheckPixel {
        x: i32,
        y: i32,
        r: u8,
        g: u8,
        b: u8,
        tolerance: u8,
        set_var: String,
    },
    SetVar {
        name: String,
        value: Value,
    },
    IfGoto {
        expr: String,
        index: i64,
    },
    PressKey {
        key: String,
    },
    TypeText {
        text: String,
        interval: Duration,
    },
}

impl Op {
    /// Decode an action, resolving missing or uncoercible parameters to the
    /// per-kind defaults. Fails only on an unknown kind tag.
    pub fn decode(action: &Action) -> Result<Op, StepError> {
        let kind = ActionKind::from_tag(&action.kind)
            .ok_or_else(|| StepError::UnknownKind(action.kind.clone()))?;
        let p = &action.params;

        let op = match kind {
            ActionKind::Wait => Op::Wait {
                seconds: p.get_f64("seconds", 0.5).max(0.0),
                jitter: p.get_f64("jitter", 0.0).max(0.0),
            },
            ActionKind::Screenshot => Op::Screenshot,
            ActionKind::LoadTemplate => Op::LoadTemplate {
                name: p.get_string("name", "template"),
                path: p.get_string("path", ""),
            },
            ActionKind::FindTemplate => Op::FindTemplate {
                name: p.get_string("name", "template"),
                threshold: p.get_f64("threshold", 0.85),
                method: decode_method(p),
            },
            ActionKind::ClickMatch => Op::ClickMatch {
                button: decode_button(p),
                clicks: p.get_i64("clicks", 1).max(1) as u32,
                interval: non_negative_secs(p.get_f64("interval", 0.05)),
                center: p.get_bool("center", true),
                offset_x: p.get_i64("offset_x", 0) as i32,
                offset_y: p.get_i64("offset_y", 0) as i32,
            },
            ActionKind::ClickAt => Op::ClickAt {
                x: p.get_i64("x", 0) as i32,
                y: p.get_i64("y", 0) as i32,
                button: decode_button(p),
                clicks: p.get_i64("clicks", 1).max(1) as u32,
                interval: non_negative_secs(p.get_f64("interval", 0.05)),
            },
            ActionKind::MoveMouse => Op::MoveMouse {
                x: p.get_i64("x", 0) as i32,
                y: p.get_i64("y", 0) as i32,
                duration: non_negative_secs(p.get_f64("duration", 0.2)),
            },
            ActionKind::CheckPixel => Op::CheckPixel {
                x: p.get_i64("x", 0) as i32,
                y: p.get_i64("y", 0) as i32,
                r: channel(p, "r"),
                g: channel(p, "g"),
                b: channel(p, "b"),
                tolerance: p.get_i64("tolerance", 10).clamp(0, 255) as u8,
                set_var: p.get_string("set_var", "pixel_ok"),
            },
            ActionKind::SetVar => Op::SetVar {
                name: p.get_string("name", "flag"),
                value: match p.get("value") {
                    // String literals follow the uniform coercion policy, so a
                    // hand-authored "true" or "0.5" lands as the right type.
                    Some(Value::Str(s)) => Value::coerce_str(s),
                    Some(v) => v.clone(),
                    None => Value::Str(String::new()),
                },
            },
            ActionKind::IfGoto => Op::IfGoto {
                expr: p.get_string("expr", "false"),
                index: p.get_i64("index", 0),
            },
            ActionKind::PressKey => Op::PressKey {
                key: p.get_string("key", "enter"),
            },
            ActionKind::TypeText => Op::TypeText {
                text: p.get_string("text", ""),
                interval: non_negative_secs(p.get_f64("interval", 0.02)),
            },
        };
        Ok(op)
    }

    /// The kind this operation decodes from.
    pub fn kind(&self) -> ActionKind {
        match self {
            Op::Wait { .. } => ActionKind::Wait,
            Op::Screenshot => ActionKind::Screenshot,
            Op::LoadTemplate { .. } => ActionKind::LoadTemplate,
            Op::FindTemplate { .. } => ActionKind::FindTemplate,
            Op::ClickMatch { .. } => ActionKind::ClickMatch,
            Op::ClickAt { .. } => ActionKind::ClickAt,
            Op::MoveMouse { .. } => ActionKind::MoveMouse,
            Op::CheckPixel { .. } => ActionKind::CheckPixel,
            Op::SetVar { .. } => ActionKind::SetVar,
            Op::IfGoto { .. } => ActionKind::IfGoto,
            Op::PressKey { .. } => ActionKind::PressKey,
            Op::TypeText { .. } => ActionKind::TypeText,
        }
    }

    /// One-line status summary, e.g. `FIND_TEMPLATE ok_button thr=0.9`.
    pub fn status_line(&self) -> String {
        match self {
            Op::Wait { seconds, jitter } if *jitter > 0.0 => {
                format!("WAIT {seconds}s (+{jitter}s jitter)")
            }
            Op::Wait { seconds, .. } => format!("WAIT {seconds}s"),
            Op::Screenshot => "SCREENSHOT".into(),
            Op::LoadTemplate { name, .. } => format!("LOAD_TEMPLATE {name}"),
            Op::FindTemplate {
                name, threshold, ..
            } => format!("FIND_TEMPLATE {name} thr={threshold}"),
            Op::ClickMatch { button, clicks, .. } => {
                format!("CLICK_MATCH {button:?} x{clicks}")
            }
            Op::ClickAt { x, y, .. } => format!("CLICK_AT {x},{y}"),
            Op::MoveMouse { x, y, .. } => format!("MOVE_MOUSE {x},{y}"),
            Op::CheckPixel { x, y, .. } => format!("CHECK_PIXEL {x},{y}"),
            Op::SetVar { name, value } => format!("SET_VAR {name}={value}"),
            Op::IfGoto { index, .. } => format!("IF_GOTO -> {index}"),
            Op::PressKey { key } => format!("PRESS_KEY {key}"),
            Op::TypeText { text, .. } => format!("TYPE_TEXT '{text}'"),
        }
    }
}

fn non_negative_secs(secs: f64) -> Duration {
    Duration::from_secs_f64(secs.max(0.0))
}

fn channel(p: &Params, key: &str) -> u8 {
    p.get_i64(key, 255).clamp(0, 255) as u8
}

fn decode_button(p: &Params) -> MouseButton {
    let name = p.get_string("button", "left");
    MouseButton::from_name(&name).unwrap_or_else(|| {
        warn!(target: "pixelbot::engine", %name, "Unrecognized mouse button; using left");
        MouseButton::Left
    })
}

fn decode_method(p: &Params) -> MatchMethod {
    let name = p.get_string("method", "ccoeff");
    MatchMethod::from_name(&name).unwrap_or_else(|| {
        warn!(target: "pixelbot::engine", %name, "Unrecognized match method; using ccoeff");
        MatchMethod::CcoeffNormed
    })
}

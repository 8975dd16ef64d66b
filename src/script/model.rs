use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

/// A primitive parameter or variable value.
///
/// Untagged on the wire: JSON booleans, integers, floats and strings map
/// directly onto the variants, so saved scripts remain plain JSON with no
/// type annotations.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
}

impl Value {
    /// Coerce a raw string the way hand-authored parameters are interpreted:
    /// - "true"/"false" (case-insensitive) become booleans
    /// - numerics containing a '.' become floats
    /// - other parseable numerics become integers
    /// - everything else stays a string
    pub fn coerce_str(s: &str) -> Value {
        let t = s.trim();
        match t.to_ascii_lowercase().as_str() {
            "true" => return Value::Bool(true),
            "false" => return Value::Bool(false),
            _ => {}
        }
        if t.contains('.') {
            if let Ok(f) = t.parse::<f64>() {
                return Value::Float(f);
            }
        } else if let Ok(i) = t.parse::<i64>() {
            return Value::Int(i);
        }
        Value::Str(s.to_string())
    }

    /// Read the value as a boolean, accepting "true"/"false" strings and
    /// nonzero numerics.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            Value::Int(i) => Some(*i != 0),
            Value::Float(f) => Some(*f != 0.0),
            Value::Str(s) => match s.trim().to_ascii_lowercase().as_str() {
                "true" => Some(true),
                "false" => Some(false),
                _ => None,
            },
        }
    }

    /// Read the value as an integer (floats truncate, numeric strings parse).
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) => Some(*f as i64),
            Value::Str(s) => {
                let t = s.trim();
                t.parse::<i64>()
                    .ok()
                    .or_else(|| t.parse::<f64>().ok().map(|f| f as i64))
            }
            Value::Bool(_) => None,
        }
    }

    /// Read the value as a float (integers widen, numeric strings parse).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            Value::Str(s) => s.trim().parse::<f64>().ok(),
            Value::Bool(_) => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{b}"),
            Value::Int(i) => write!(f, "{i}"),
            Value::Float(x) => write!(f, "{x}"),
            Value::Str(s) => f.write_str(s),
        }
    }
}

/// Named parameters of an action. Key order is not significant.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Params(BTreeMap<String, Value>);

impl Params {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.0.insert(key.into(), value);
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Float parameter with a default for missing or uncoercible values.
    pub fn get_f64(&self, key: &str, default: f64) -> f64 {
        self.get(key).and_then(Value::as_f64).unwrap_or(default)
    }

    /// Integer parameter with a default for missing or uncoercible values.
    pub fn get_i64(&self, key: &str, default: i64) -> i64 {
        self.get(key).and_then(Value::as_i64).unwrap_or(default)
    }

    /// Boolean parameter with a default for missing or uncoercible values.
    pub fn get_bool(&self, key: &str, default: bool) -> bool {
        self.get(key).and_then(Value::as_bool).unwrap_or(default)
    }

    /// String parameter; non-string values are rendered with `Display`.
    pub fn get_string(&self, key: &str, default: &str) -> String {
        match self.get(key) {
            Some(v) => v.to_string(),
            None => default.to_string(),
        }
    }
}

impl FromIterator<(String, Value)> for Params {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// One typed, parameterized step of a script.
///
/// Serialized as `{"type": "...", "params": {...}}` to stay bit-compatible
/// with previously saved scripts. The kind tag is stored as a raw string:
/// a script may be loaded before every handler is known, so unrecognized
/// kinds are a dispatch-time error, not a load-time one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Action {
    /// Kind tag, normally one of [`ActionKind`]'s tags.
    #[serde(rename = "type")]
    pub kind: String,

    /// Named parameters. Missing fields get per-kind defaults at dispatch.
    #[serde(default)]
    pub params: Params,
}

impl Action {
    /// Create an action of a known kind with empty parameters.
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind: kind.to_string(),
            params: Params::new(),
        }
    }

    /// Builder-style parameter insertion, convenient for tests and authoring.
    #[must_use]
    pub fn with(mut self, key: impl Into<String>, value: Value) -> Self {
        self.params.insert(key, value);
        self
    }
}

/// Closed enumeration of the action kinds the engine can execute.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    Wait,
    Screenshot,
    LoadTemplate,
    FindTemplate,
    ClickMatch,
    ClickAt,
    MoveMouse,
    CheckPixel,
    SetVar,
    IfGoto,
    PressKey,
    TypeText,
}

impl ActionKind {
    /// Every supported kind, in the order an action palette would list them.
    pub const ALL: [ActionKind; 12] = [
        ActionKind::Wait,
        ActionKind::Screenshot,
        ActionKind::LoadTemplate,
        ActionKind::FindTemplate,
        ActionKind::ClickMatch,
        ActionKind::ClickAt,
        ActionKind::MoveMouse,
        ActionKind::CheckPixel,
        ActionKind::SetVar,
        ActionKind::IfGoto,
        ActionKind::PressKey,
        ActionKind::TypeText,
    ];

    /// Parse a kind tag (e.g. "FIND_TEMPLATE"). Returns `None` for unknown tags.
    pub fn from_tag(tag: &str) -> Option<Self> {
        Some(match tag {
            "WAIT" => ActionKind::Wait,
            "SCREENSHOT" => ActionKind::Screenshot,
            "LOAD_TEMPLATE" => ActionKind::LoadTemplate,
            "FIND_TEMPLATE" => ActionKind::FindTemplate,
            "CLICK_MATCH" => ActionKind::ClickMatch,
            "CLICK_AT" => ActionKind::ClickAt,
            "MOVE_MOUSE" => ActionKind::MoveMouse,
            "CHECK_PIXEL" => ActionKind::CheckPixel,
            "SET_VAR" => ActionKind::SetVar,
            "IF_GOTO" => ActionKind::IfGoto,
            "PRESS_KEY" => ActionKind::PressKey,
            "TYPE_TEXT" => ActionKind::TypeText,
            _ => return None,
        })
    }

    /// The wire tag for this kind.
    pub const fn tag(self) -> &'static str {
        match self {
            ActionKind::Wait => "WAIT",
            ActionKind::Screenshot => "SCREENSHOT",
            ActionKind::LoadTemplate => "LOAD_TEMPLATE",
            ActionKind::FindTemplate => "FIND_TEMPLATE",
            ActionKind::ClickMatch => "CLICK_MATCH",
            ActionKind::ClickAt => "CLICK_AT",
            ActionKind::MoveMouse => "MOVE_MOUSE",
            ActionKind::CheckPixel => "CHECK_PIXEL",
            ActionKind::SetVar => "SET_VAR",
            ActionKind::IfGoto => "IF_GOTO",
            ActionKind::PressKey => "PRESS_KEY",
            ActionKind::TypeText => "TYPE_TEXT",
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag())
    }
}

/// An ordered, 0-indexed sequence of actions.
///
/// The engine never mutates a script; reordering and editing belong to the
/// (external) authoring surface. Serialized as a bare JSON array.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct Script(Vec<Action>);

impl Script {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_actions(actions: Vec<Action>) -> Self {
        Self(actions)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Action> {
        self.0.get(index)
    }

    pub fn actions(&self) -> &[Action] {
        &self.0
    }

    pub fn push(&mut self, action: Action) {
        self.0.push(action);
    }
}

impl FromIterator<Action> for Script {
    fn from_iter<T: IntoIterator<Item = Action>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

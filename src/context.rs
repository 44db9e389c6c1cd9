//! Per-run execution state
//!
//! The context is the interpreter's only mutable state: the variable store,
//! the last-check register written by CHECK_ELEMENT and read by conditions,
//! the block stack for IF/WHILE/TRY frames, and the instruction pointer.

use crate::action::Action;
use regex::Regex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::debug;

/// Variable values are strings or numbers; everything stringifies for
/// substitution and comparison.
#[derive(Debug, Clone, PartialEq)]
pub enum VarValue {
    Text(String),
    Number(f64),
}

impl VarValue {
    pub fn as_string(&self) -> String {
        match self {
            VarValue::Text(s) => s.clone(),
            VarValue::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 1e15 {
                    format!("{}", *n as i64)
                } else {
                    format!("{n}")
                }
            }
        }
    }

    pub fn as_number(&self) -> Option<f64> {
        match self {
            VarValue::Number(n) => Some(*n),
            VarValue::Text(s) => s.parse().ok(),
        }
    }

    pub fn from_json(value: &serde_json::Value) -> VarValue {
        match value {
            serde_json::Value::Number(n) => VarValue::Number(n.as_f64().unwrap_or(0.0)),
            serde_json::Value::String(s) => VarValue::Text(s.clone()),
            other => VarValue::Text(other.to_string()),
        }
    }
}

/// Register updated by every CHECK_ELEMENT probe; consumed by IF/WHILE
/// conditions without re-probing the DOM.
#[derive(Debug, Clone, Default)]
pub struct LastCheck {
    pub success: bool,
    pub value: Option<String>,
    pub attribute_read: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    If,
    While,
    Try,
}

/// One open IF/WHILE/TRY scope on the interpreter's stack.
#[derive(Debug, Clone)]
pub struct BlockFrame {
    pub kind: BlockKind,
    pub begin_ip: usize,
    pub end_ip: usize,
    /// IP of the alternative that was taken, for IF chains.
    pub taken_branch: Option<usize>,
    pub catch_ip: Option<usize>,
    pub iteration_count: usize,
}

#[derive(Debug, Clone)]
pub struct RecordedError {
    pub kind: &'static str,
    pub message: String,
    pub action_index: usize,
}

#[derive(Debug)]
pub struct ExecutionContext {
    pub variables: HashMap<String, VarValue>,
    pub last_check: LastCheck,
    pub block_stack: Vec<BlockFrame>,
    pub instruction_pointer: usize,
    /// Handlers clear this when they set the IP themselves.
    pub should_increment: bool,
    pub errors: Vec<RecordedError>,
    pub last_error: Option<String>,
    cancelled: Arc<AtomicBool>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            variables: HashMap::new(),
            last_check: LastCheck::default(),
            block_stack: Vec::new(),
            instruction_pointer: 0,
            should_increment: true,
            errors: Vec::new(),
            last_error: None,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Shared handle for signal handlers and UI stop buttons.
    pub fn cancellation_handle(&self) -> Arc<AtomicBool> {
        self.cancelled.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::Relaxed)
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::Relaxed);
    }

    pub fn set_variable(&mut self, name: impl Into<String>, value: VarValue) {
        self.variables.insert(name.into(), value);
    }

    /// String form of a variable; missing names read as empty.
    pub fn variable_string(&self, name: &str) -> String {
        match self.variables.get(name) {
            Some(value) => value.as_string(),
            None => {
                debug!(variable = name, "variable not set, substituting empty string");
                String::new()
            }
        }
    }

    pub fn record_error(&mut self, kind: &'static str, message: String, action_index: usize) {
        self.last_error = Some(message.clone());
        self.errors.push(RecordedError {
            kind,
            message,
            action_index,
        });
    }

    /// Replace every `${identifier}` occurrence with the variable's string
    /// form. Single pass: replacement text is never re-scanned, so
    /// substitution is idempotent.
    pub fn substitute(&self, input: &str) -> String {
        static PATTERN: OnceLock<Regex> = OnceLock::new();
        let pattern = PATTERN
            .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern"));

        pattern
            .replace_all(input, |captures: &regex::Captures<'_>| {
                self.variable_string(&captures[1])
            })
            .into_owned()
    }

    fn substitute_json(&self, value: &serde_json::Value) -> serde_json::Value {
        match value {
            serde_json::Value::String(s) => serde_json::Value::String(self.substitute(s)),
            serde_json::Value::Array(items) => {
                serde_json::Value::Array(items.iter().map(|v| self.substitute_json(v)).collect())
            }
            serde_json::Value::Object(map) => serde_json::Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.substitute_json(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Substituted copy of an action, applied to every string field before
    /// dispatch.
    pub fn substitute_action(&self, action: &Action) -> Action {
        let mut resolved = action.clone();
        if let Some(selector) = &action.selector {
            resolved.selector = Some(self.substitute(selector));
        }
        if let Some(value) = &action.value {
            resolved.value = Some(self.substitute_json(value));
        }
        resolved
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionKind};
    use serde_json::json;

    #[test]
    fn test_substitute_known_and_missing() {
        let mut context = ExecutionContext::new();
        context.set_variable("name", VarValue::Text("gallery".into()));
        context.set_variable("n", VarValue::Number(4.0));

        assert_eq!(context.substitute("run ${name} #${n}"), "run gallery #4");
        assert_eq!(context.substitute("missing: '${ghost}'"), "missing: ''");
        assert_eq!(context.substitute("no placeholders"), "no placeholders");
    }

    #[test]
    fn test_substitution_is_idempotent() {
        let mut context = ExecutionContext::new();
        // A variable whose value looks like a placeholder must not expand twice.
        context.set_variable("outer", VarValue::Text("${inner}".into()));
        context.set_variable("inner", VarValue::Text("secret".into()));

        let once = context.substitute("${outer}");
        assert_eq!(once, "${inner}");
        assert_eq!(context.substitute(&once), "secret");
        // Idempotence over already-substituted plain text:
        let plain = context.substitute("value secret");
        assert_eq!(context.substitute(&plain), plain);
    }

    #[test]
    fn test_substitute_action_covers_nested_value() {
        let mut context = ExecutionContext::new();
        context.set_variable("dir", VarValue::Text("/tmp/out".into()));
        context.set_variable("id", VarValue::Number(7.0));

        let action = Action::new(ActionKind::DownloadFile)
            .with_selector("div[data-id='${id}'] span.download")
            .with_value(json!({"download_dir": "${dir}", "filename": "item_${id}.mp4"}));

        let resolved = context.substitute_action(&action);
        assert_eq!(
            resolved.selector.as_deref(),
            Some("div[data-id='7'] span.download")
        );
        assert_eq!(resolved.value_str("download_dir"), Some("/tmp/out"));
        assert_eq!(resolved.value_str("filename"), Some("item_7.mp4"));
    }

    #[test]
    fn test_number_formatting() {
        assert_eq!(VarValue::Number(3.0).as_string(), "3");
        assert_eq!(VarValue::Number(3.5).as_string(), "3.5");
        assert_eq!(VarValue::Text("x".into()).as_string(), "x");
    }

    #[test]
    fn test_cancellation_handle_is_shared() {
        let context = ExecutionContext::new();
        let handle = context.cancellation_handle();
        assert!(!context.is_cancelled());
        handle.store(true, Ordering::Relaxed);
        assert!(context.is_cancelled());
    }
}

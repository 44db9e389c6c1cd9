//! Action records and the action vocabulary
//!
//! An automation program is a flat list of `Action` records. Each record
//! carries a `kind` plus the optional fields that kind consumes; the loader
//! validates required fields per kind and rejects unknown kinds before the
//! control-flow resolver runs.

use crate::error::AutomationError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const DEFAULT_ACTION_TIMEOUT_MS: u64 = 10_000;

/// Every action kind the interpreter understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ActionKind {
    // Navigation / page
    NavigateTo,
    RefreshPage,
    SwitchPanel,
    ExpandDialog,

    // Interaction
    ClickButton,
    InputText,
    ToggleSetting,
    UploadImage,
    DownloadFile,

    // Synchronization
    Wait,
    WaitForElement,

    // Probes
    CheckElement,

    // Variables & logging
    SetVariable,
    IncrementVariable,
    LogMessage,

    // Control flow
    IfBegin,
    Elif,
    Else,
    IfEnd,
    WhileBegin,
    WhileEnd,
    Break,
    Continue,
    ConditionalWait,
    SkipIf,
    TryBegin,
    CatchBegin,
    CatchEnd,
    StopAutomation,

    // Domain
    StartGenerationDownloads,
}

impl ActionKind {
    pub fn name(&self) -> &'static str {
        self.spec().name
    }

    pub fn spec(&self) -> &'static ActionSpec {
        ACTION_REGISTRY
            .iter()
            .find(|spec| spec.kind == *self)
            .expect("every kind is registered")
    }
}

/// One declarative step. Created by the loader, never mutated afterwards.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Action {
    pub kind: ActionKind,

    /// CSS-like selector, for kinds that target an element.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<String>,

    /// Scalar or nested mapping; shape depends on `kind`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// Per-action timeout; defaults to 10s when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout_ms: Option<u64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub continue_on_error: bool,
}

impl Action {
    pub fn new(kind: ActionKind) -> Self {
        Self {
            kind,
            selector: None,
            value: None,
            timeout_ms: None,
            description: None,
            continue_on_error: false,
        }
    }

    pub fn with_selector(mut self, selector: impl Into<String>) -> Self {
        self.selector = Some(selector.into());
        self
    }

    pub fn with_value(mut self, value: serde_json::Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn effective_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.unwrap_or(DEFAULT_ACTION_TIMEOUT_MS))
    }

    /// Validate required fields for this action's kind.
    pub fn validate(&self, index: usize) -> Result<(), AutomationError> {
        let spec = self.kind.spec();

        if spec.requires_selector && self.selector.as_deref().map_or(true, str::is_empty) {
            return Err(AutomationError::Malformed(format!(
                "action #{index} ({}) requires a selector",
                spec.name
            )));
        }

        if spec.requires_value && self.value.is_none() {
            return Err(AutomationError::Malformed(format!(
                "action #{index} ({}) requires a value ({})",
                spec.name, spec.value_shape
            )));
        }

        // Kind-specific shape checks beyond mere presence.
        match self.kind {
            ActionKind::SetVariable => {
                self.require_object_keys(index, &["name", "value"])?;
            }
            ActionKind::IncrementVariable => {
                self.require_object_keys(index, &["name", "increment"])?;
            }
            ActionKind::LogMessage => {
                self.require_object_keys(index, &["text"])?;
            }
            ActionKind::StopAutomation => {
                self.require_object_keys(index, &["reason"])?;
            }
            ActionKind::DownloadFile => {
                self.require_object_keys(index, &["download_dir", "filename"])?;
            }
            ActionKind::CheckElement => {
                self.require_object_keys(index, &["check", "value"])?;
            }
            _ => {}
        }

        Ok(())
    }

    fn require_object_keys(&self, index: usize, keys: &[&str]) -> Result<(), AutomationError> {
        let spec = self.kind.spec();
        let obj = self
            .value
            .as_ref()
            .and_then(|v| v.as_object())
            .ok_or_else(|| {
                AutomationError::Malformed(format!(
                    "action #{index} ({}) value must be a mapping ({})",
                    spec.name, spec.value_shape
                ))
            })?;

        for key in keys {
            if !obj.contains_key(*key) {
                return Err(AutomationError::Malformed(format!(
                    "action #{index} ({}) value is missing required key '{key}'",
                    spec.name
                )));
            }
        }
        Ok(())
    }

    /// String value lookup inside the nested mapping.
    pub fn value_str(&self, key: &str) -> Option<&str> {
        self.value.as_ref()?.get(key)?.as_str()
    }

    pub fn value_u64(&self, key: &str) -> Option<u64> {
        self.value.as_ref()?.get(key)?.as_u64()
    }

    pub fn value_f64(&self, key: &str) -> Option<f64> {
        self.value.as_ref()?.get(key)?.as_f64()
    }

    pub fn value_bool(&self, key: &str) -> Option<bool> {
        self.value.as_ref()?.get(key)?.as_bool()
    }
}

/// Registry entry describing one action kind's accepted fields.
///
/// Drives both load-time validation and the `list-actions` output, so the
/// printed vocabulary can never drift from what the loader accepts.
#[derive(Debug)]
pub struct ActionSpec {
    pub kind: ActionKind,
    pub name: &'static str,
    pub requires_selector: bool,
    pub requires_value: bool,
    pub value_shape: &'static str,
    pub summary: &'static str,
}

pub static ACTION_REGISTRY: &[ActionSpec] = &[
    ActionSpec {
        kind: ActionKind::NavigateTo,
        name: "NAVIGATE_TO",
        requires_selector: false,
        requires_value: true,
        value_shape: "url string",
        summary: "Navigate the page to a URL",
    },
    ActionSpec {
        kind: ActionKind::RefreshPage,
        name: "REFRESH_PAGE",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Reload the current page",
    },
    ActionSpec {
        kind: ActionKind::SwitchPanel,
        name: "SWITCH_PANEL",
        requires_selector: true,
        requires_value: false,
        value_shape: "-",
        summary: "Click a panel/tab selector to switch views",
    },
    ActionSpec {
        kind: ActionKind::ExpandDialog,
        name: "EXPAND_DIALOG",
        requires_selector: true,
        requires_value: false,
        value_shape: "-",
        summary: "Expand a collapsed dialog or section",
    },
    ActionSpec {
        kind: ActionKind::ClickButton,
        name: "CLICK_BUTTON",
        requires_selector: true,
        requires_value: false,
        value_shape: "-",
        summary: "Click the first element matching the selector",
    },
    ActionSpec {
        kind: ActionKind::InputText,
        name: "INPUT_TEXT",
        requires_selector: true,
        requires_value: true,
        value_shape: "text string",
        summary: "Clear and type text into an input",
    },
    ActionSpec {
        kind: ActionKind::ToggleSetting,
        name: "TOGGLE_SETTING",
        requires_selector: true,
        requires_value: true,
        value_shape: "bool",
        summary: "Set a checkbox/switch to the given state",
    },
    ActionSpec {
        kind: ActionKind::UploadImage,
        name: "UPLOAD_IMAGE",
        requires_selector: true,
        requires_value: true,
        value_shape: "absolute file path string",
        summary: "Attach a file to a file input",
    },
    ActionSpec {
        kind: ActionKind::DownloadFile,
        name: "DOWNLOAD_FILE",
        requires_selector: true,
        requires_value: true,
        value_shape: "{download_dir, filename}",
        summary: "Click a download trigger and capture the file",
    },
    ActionSpec {
        kind: ActionKind::Wait,
        name: "WAIT",
        requires_selector: false,
        requires_value: true,
        value_shape: "milliseconds number",
        summary: "Sleep for a fixed duration",
    },
    ActionSpec {
        kind: ActionKind::WaitForElement,
        name: "WAIT_FOR_ELEMENT",
        requires_selector: true,
        requires_value: false,
        value_shape: "-",
        summary: "Wait until the selector matches a visible element",
    },
    ActionSpec {
        kind: ActionKind::CheckElement,
        name: "CHECK_ELEMENT",
        requires_selector: true,
        requires_value: true,
        value_shape: "{check: equals|not_equals|greater|less|contains|not_zero, value, attribute: text|value|<attr>}",
        summary: "Probe an element and record the result for IF/WHILE",
    },
    ActionSpec {
        kind: ActionKind::SetVariable,
        name: "SET_VARIABLE",
        requires_selector: false,
        requires_value: true,
        value_shape: "{name, value}",
        summary: "Assign a variable",
    },
    ActionSpec {
        kind: ActionKind::IncrementVariable,
        name: "INCREMENT_VARIABLE",
        requires_selector: false,
        requires_value: true,
        value_shape: "{name, increment}",
        summary: "Add a numeric increment to a variable",
    },
    ActionSpec {
        kind: ActionKind::LogMessage,
        name: "LOG_MESSAGE",
        requires_selector: false,
        requires_value: true,
        value_shape: "{text, log_file?, level?}",
        summary: "Emit a log line, optionally appended to a file",
    },
    ActionSpec {
        kind: ActionKind::IfBegin,
        name: "IF_BEGIN",
        requires_selector: false,
        requires_value: true,
        value_shape: "condition",
        summary: "Open a conditional block",
    },
    ActionSpec {
        kind: ActionKind::Elif,
        name: "ELIF",
        requires_selector: false,
        requires_value: true,
        value_shape: "condition",
        summary: "Alternative branch of the enclosing IF",
    },
    ActionSpec {
        kind: ActionKind::Else,
        name: "ELSE",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Fallback branch of the enclosing IF",
    },
    ActionSpec {
        kind: ActionKind::IfEnd,
        name: "IF_END",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Close the enclosing IF block",
    },
    ActionSpec {
        kind: ActionKind::WhileBegin,
        name: "WHILE_BEGIN",
        requires_selector: false,
        requires_value: true,
        value_shape: "condition",
        summary: "Open a loop; condition re-checked each iteration",
    },
    ActionSpec {
        kind: ActionKind::WhileEnd,
        name: "WHILE_END",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Close the enclosing WHILE block",
    },
    ActionSpec {
        kind: ActionKind::Break,
        name: "BREAK",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Exit the innermost WHILE loop",
    },
    ActionSpec {
        kind: ActionKind::Continue,
        name: "CONTINUE",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Jump back to the innermost WHILE condition",
    },
    ActionSpec {
        kind: ActionKind::ConditionalWait,
        name: "CONDITIONAL_WAIT",
        requires_selector: false,
        requires_value: true,
        value_shape: "{condition, max_retries, delay_ms, backoff?: fixed|exponential}",
        summary: "Retry a condition with backoff until it passes",
    },
    ActionSpec {
        kind: ActionKind::SkipIf,
        name: "SKIP_IF",
        requires_selector: false,
        requires_value: true,
        value_shape: "condition",
        summary: "Skip the next action when the condition passes",
    },
    ActionSpec {
        kind: ActionKind::TryBegin,
        name: "TRY_BEGIN",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Open an error-recovery block",
    },
    ActionSpec {
        kind: ActionKind::CatchBegin,
        name: "CATCH_BEGIN",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Handler branch of the enclosing TRY",
    },
    ActionSpec {
        kind: ActionKind::CatchEnd,
        name: "CATCH_END",
        requires_selector: false,
        requires_value: false,
        value_shape: "-",
        summary: "Close the enclosing TRY block",
    },
    ActionSpec {
        kind: ActionKind::StopAutomation,
        name: "STOP_AUTOMATION",
        requires_selector: false,
        requires_value: true,
        value_shape: "{reason, log_file?}",
        summary: "Terminate the run as failed with a reason",
    },
    ActionSpec {
        kind: ActionKind::StartGenerationDownloads,
        name: "START_GENERATION_DOWNLOADS",
        requires_selector: false,
        requires_value: true,
        value_shape: "generation-download manager configuration mapping",
        summary: "Hand control to the generation-download manager",
    },
];

/// Validate a whole program's per-action shapes (control-flow pairing is the
/// resolver's job).
pub fn validate_actions(actions: &[Action]) -> Result<(), AutomationError> {
    for (index, action) in actions.iter().enumerate() {
        action.validate(index)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_registry_covers_every_kind() {
        // A kind missing from the registry would panic in spec(); walk them all.
        for spec in ACTION_REGISTRY {
            assert_eq!(spec.kind.spec().name, spec.name);
        }
        assert_eq!(ACTION_REGISTRY.len(), 30);
    }

    #[test]
    fn test_kind_serde_names() {
        let kind: ActionKind = serde_json::from_value(json!("NAVIGATE_TO")).unwrap();
        assert_eq!(kind, ActionKind::NavigateTo);
        let kind: ActionKind = serde_json::from_value(json!("START_GENERATION_DOWNLOADS")).unwrap();
        assert_eq!(kind, ActionKind::StartGenerationDownloads);
        assert!(serde_json::from_value::<ActionKind>(json!("NOT_AN_ACTION")).is_err());
    }

    #[test]
    fn test_validation_requires_selector() {
        let action = Action::new(ActionKind::ClickButton);
        let err = action.validate(3).unwrap_err();
        assert!(err.to_string().contains("CLICK_BUTTON"));
        assert!(err.to_string().contains("#3"));

        let ok = Action::new(ActionKind::ClickButton).with_selector("#go");
        assert!(ok.validate(3).is_ok());
    }

    #[test]
    fn test_validation_requires_value_keys() {
        let action = Action::new(ActionKind::SetVariable).with_value(json!({"name": "n"}));
        let err = action.validate(0).unwrap_err();
        assert!(err.to_string().contains("'value'"));

        let ok = Action::new(ActionKind::SetVariable)
            .with_value(json!({"name": "n", "value": "0"}));
        assert!(ok.validate(0).is_ok());
    }

    #[test]
    fn test_effective_timeout_default() {
        let action = Action::new(ActionKind::Wait).with_value(json!(100));
        assert_eq!(action.effective_timeout(), Duration::from_millis(10_000));

        let mut action = action;
        action.timeout_ms = Some(2_500);
        assert_eq!(action.effective_timeout(), Duration::from_millis(2_500));
    }

    #[test]
    fn test_download_file_value_shape() {
        let action = Action::new(ActionKind::DownloadFile)
            .with_selector("span.download")
            .with_value(json!({"download_dir": "/tmp", "filename": "out.mp4"}));
        assert!(action.validate(0).is_ok());

        let bad = Action::new(ActionKind::DownloadFile)
            .with_selector("span.download")
            .with_value(json!({"download_dir": "/tmp"}));
        assert!(bad.validate(0).is_err());
    }
}

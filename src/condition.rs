//! Condition vocabulary for IF/WHILE/SKIP_IF/CONDITIONAL_WAIT
//!
//! Conditions never probe the DOM. `check_passed`/`check_failed` read the
//! context's last-check register (written by CHECK_ELEMENT); the comparison
//! forms read the variable store. The expression form is restricted to a
//! single `var op literal` comparison.

use crate::context::ExecutionContext;
use crate::error::AutomationError;
use serde_json::Value;

#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    CheckPassed,
    CheckFailed,
    Equals { name: String, literal: String },
    NotEquals { name: String, literal: String },
    Less { name: String, literal: String },
    Greater { name: String, literal: String },
}

impl Condition {
    /// Parse a condition from an action's `value` field (or a sub-field of
    /// it). Accepts the bare register forms, the mapping form, and the
    /// restricted expression form.
    pub fn parse(value: &Value) -> Result<Self, AutomationError> {
        match value {
            Value::String(s) => Self::parse_str(s),
            Value::Object(obj) => {
                let kind = obj
                    .get("type")
                    .and_then(Value::as_str)
                    .ok_or_else(|| invalid(value, "missing 'type'"))?;

                match kind {
                    "check_passed" => Ok(Condition::CheckPassed),
                    "check_failed" => Ok(Condition::CheckFailed),
                    "equals" | "not_equals" | "less" | "greater" => {
                        let name = obj
                            .get("name")
                            .and_then(Value::as_str)
                            .ok_or_else(|| invalid(value, "missing 'name'"))?
                            .to_string();
                        let literal = obj
                            .get("value")
                            .map(literal_to_string)
                            .ok_or_else(|| invalid(value, "missing 'value'"))?;
                        Ok(match kind {
                            "equals" => Condition::Equals { name, literal },
                            "not_equals" => Condition::NotEquals { name, literal },
                            "less" => Condition::Less { name, literal },
                            _ => Condition::Greater { name, literal },
                        })
                    }
                    other => Err(invalid(value, &format!("unknown type '{other}'"))),
                }
            }
            _ => Err(invalid(value, "expected string or mapping")),
        }
    }

    fn parse_str(s: &str) -> Result<Self, AutomationError> {
        let trimmed = s.trim();
        match trimmed {
            "check_passed" => return Ok(Condition::CheckPassed),
            "check_failed" => return Ok(Condition::CheckFailed),
            _ => {}
        }

        // Single-comparison expression: `var op literal`. Longest operators
        // first so `!=` is not read as `=`.
        for op in ["!=", "==", "<", ">"] {
            if let Some(pos) = trimmed.find(op) {
                let name = trimmed[..pos].trim().to_string();
                let literal = trimmed[pos + op.len()..]
                    .trim()
                    .trim_matches('"')
                    .to_string();
                if name.is_empty() || literal.is_empty() {
                    return Err(AutomationError::InvalidCondition(format!(
                        "expression '{trimmed}' must have the form 'var {op} literal'"
                    )));
                }
                return Ok(match op {
                    "!=" => Condition::NotEquals { name, literal },
                    "==" => Condition::Equals { name, literal },
                    "<" => Condition::Less { name, literal },
                    _ => Condition::Greater { name, literal },
                });
            }
        }

        Err(AutomationError::InvalidCondition(format!(
            "unrecognized condition '{trimmed}'"
        )))
    }

    /// Evaluate against the execution context. Never touches the browser.
    pub fn evaluate(&self, context: &ExecutionContext) -> bool {
        match self {
            Condition::CheckPassed => context.last_check.success,
            Condition::CheckFailed => !context.last_check.success,
            Condition::Equals { name, literal } => compare(context, name, literal) == Some(std::cmp::Ordering::Equal),
            Condition::NotEquals { name, literal } => compare(context, name, literal) != Some(std::cmp::Ordering::Equal),
            Condition::Less { name, literal } => compare(context, name, literal) == Some(std::cmp::Ordering::Less),
            Condition::Greater { name, literal } => compare(context, name, literal) == Some(std::cmp::Ordering::Greater),
        }
    }
}

fn invalid(value: &Value, why: &str) -> AutomationError {
    AutomationError::InvalidCondition(format!("{why} in condition {value}"))
}

fn literal_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Numeric comparison when both sides parse as numbers, lexical otherwise.
fn compare(context: &ExecutionContext, name: &str, literal: &str) -> Option<std::cmp::Ordering> {
    let actual = context.variable_string(name);
    match (actual.parse::<f64>(), literal.parse::<f64>()) {
        (Ok(a), Ok(b)) => a.partial_cmp(&b),
        _ => Some(actual.as_str().cmp(literal)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::{ExecutionContext, VarValue};
    use serde_json::json;

    fn context_with(name: &str, value: VarValue) -> ExecutionContext {
        let mut context = ExecutionContext::new();
        context.set_variable(name, value);
        context
    }

    #[test]
    fn test_parse_register_forms() {
        assert_eq!(Condition::parse(&json!("check_passed")).unwrap(), Condition::CheckPassed);
        assert_eq!(Condition::parse(&json!("check_failed")).unwrap(), Condition::CheckFailed);
    }

    #[test]
    fn test_parse_mapping_form() {
        let condition = Condition::parse(&json!({"type": "equals", "name": "done", "value": "false"})).unwrap();
        assert_eq!(
            condition,
            Condition::Equals { name: "done".into(), literal: "false".into() }
        );
        assert!(Condition::parse(&json!({"type": "between", "name": "n", "value": 1})).is_err());
        assert!(Condition::parse(&json!(42)).is_err());
    }

    #[test]
    fn test_parse_expression_form() {
        let condition = Condition::parse(&json!("retries < 5")).unwrap();
        assert_eq!(
            condition,
            Condition::Less { name: "retries".into(), literal: "5".into() }
        );
        let condition = Condition::parse(&json!("state != \"idle\"")).unwrap();
        assert_eq!(
            condition,
            Condition::NotEquals { name: "state".into(), literal: "idle".into() }
        );
        assert!(Condition::parse(&json!("just words")).is_err());
    }

    #[test]
    fn test_evaluate_against_register() {
        let mut context = ExecutionContext::new();
        context.last_check.success = true;
        assert!(Condition::CheckPassed.evaluate(&context));
        assert!(!Condition::CheckFailed.evaluate(&context));
    }

    #[test]
    fn test_numeric_comparison() {
        let context = context_with("n", VarValue::Number(3.0));
        assert!(Condition::parse(&json!("n < 10")).unwrap().evaluate(&context));
        assert!(Condition::parse(&json!("n > 2")).unwrap().evaluate(&context));
        // "10" would lexically sort before "3"; numeric coercion must win.
        assert!(!Condition::parse(&json!("n > 10")).unwrap().evaluate(&context));
    }

    #[test]
    fn test_lexical_comparison_for_non_numeric() {
        let context = context_with("done", VarValue::Text("false".into()));
        assert!(Condition::parse(&json!({"type": "equals", "name": "done", "value": "false"}))
            .unwrap()
            .evaluate(&context));
        assert!(!Condition::parse(&json!({"type": "equals", "name": "done", "value": "true"}))
            .unwrap()
            .evaluate(&context));
    }

    #[test]
    fn test_missing_variable_compares_as_empty() {
        let context = ExecutionContext::new();
        assert!(Condition::parse(&json!({"type": "equals", "name": "ghost", "value": ""}))
            .unwrap()
            .evaluate(&context));
    }
}

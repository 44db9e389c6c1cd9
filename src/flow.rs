//! Load-time control-flow resolution
//!
//! A single forward scan pairs IF_BEGIN/ELIF/ELSE/IF_END chains,
//! WHILE_BEGIN/WHILE_END loops and TRY_BEGIN/CATCH_BEGIN/CATCH_END blocks,
//! and stores the jump targets in a table parallel to the action list. The
//! interpreter never re-scans the program at runtime.

use crate::action::{validate_actions, Action, ActionKind};
use crate::error::AutomationError;

/// Jump targets for one action. Only the fields relevant to the action's
/// kind are populated.
#[derive(Debug, Clone, Default)]
pub struct JumpInfo {
    /// IF_BEGIN/ELIF: next alternative (ELIF/ELSE) or the IF_END when the
    /// condition is false.
    pub next_alternative: Option<usize>,
    /// IF_BEGIN/ELIF/ELSE: the matching IF_END.
    pub if_end: Option<usize>,
    /// WHILE_END/CONTINUE: the matching WHILE_BEGIN.
    pub while_begin: Option<usize>,
    /// WHILE_BEGIN/BREAK: the matching WHILE_END.
    pub while_end: Option<usize>,
    /// TRY_BEGIN: the CATCH_BEGIN to unwind to.
    pub catch_ip: Option<usize>,
    /// TRY_BEGIN/CATCH_BEGIN: the matching CATCH_END.
    pub catch_end: Option<usize>,
}

/// An action list with resolved jump targets; the interpreter's program.
#[derive(Debug, Clone)]
pub struct ResolvedProgram {
    pub actions: Vec<Action>,
    pub jumps: Vec<JumpInfo>,
}

#[derive(Debug)]
enum OpenBlock {
    If {
        alternatives: Vec<usize>,
        has_else: bool,
    },
    While {
        begin: usize,
        pending_breaks: Vec<usize>,
    },
    Try {
        begin: usize,
        catch: Option<usize>,
    },
}

impl ResolvedProgram {
    pub fn resolve(actions: Vec<Action>) -> Result<Self, AutomationError> {
        validate_actions(&actions)?;

        let mut jumps = vec![JumpInfo::default(); actions.len()];
        let mut stack: Vec<OpenBlock> = Vec::new();

        for (ip, action) in actions.iter().enumerate() {
            match action.kind {
                ActionKind::IfBegin => stack.push(OpenBlock::If {
                    alternatives: vec![ip],
                    has_else: false,
                }),

                ActionKind::Elif => match stack.last_mut() {
                    Some(OpenBlock::If {
                        alternatives,
                        has_else: false,
                    }) => {
                        let previous = *alternatives.last().expect("IF_BEGIN is always present");
                        jumps[previous].next_alternative = Some(ip);
                        alternatives.push(ip);
                    }
                    Some(OpenBlock::If { has_else: true, .. }) => {
                        return Err(malformed(ip, "ELIF after ELSE"));
                    }
                    _ => return Err(malformed(ip, "ELIF outside an IF block")),
                },

                ActionKind::Else => match stack.last_mut() {
                    Some(OpenBlock::If {
                        alternatives,
                        has_else,
                    }) => {
                        if *has_else {
                            return Err(malformed(ip, "duplicate ELSE"));
                        }
                        let previous = *alternatives.last().expect("IF_BEGIN is always present");
                        jumps[previous].next_alternative = Some(ip);
                        alternatives.push(ip);
                        *has_else = true;
                    }
                    _ => return Err(malformed(ip, "ELSE outside an IF block")),
                },

                ActionKind::IfEnd => match stack.pop() {
                    Some(OpenBlock::If { alternatives, .. }) => {
                        let last = *alternatives.last().expect("IF_BEGIN is always present");
                        jumps[last].next_alternative = Some(ip);
                        for alternative in alternatives {
                            jumps[alternative].if_end = Some(ip);
                        }
                    }
                    _ => return Err(malformed(ip, "IF_END without a matching IF_BEGIN")),
                },

                ActionKind::WhileBegin => stack.push(OpenBlock::While {
                    begin: ip,
                    pending_breaks: Vec::new(),
                }),

                ActionKind::WhileEnd => match stack.pop() {
                    Some(OpenBlock::While {
                        begin,
                        pending_breaks,
                    }) => {
                        jumps[begin].while_end = Some(ip);
                        jumps[ip].while_begin = Some(begin);
                        for break_ip in pending_breaks {
                            jumps[break_ip].while_end = Some(ip);
                        }
                    }
                    _ => return Err(malformed(ip, "WHILE_END without a matching WHILE_BEGIN")),
                },

                ActionKind::Break => match innermost_while(&mut stack) {
                    Some(OpenBlock::While { pending_breaks, .. }) => pending_breaks.push(ip),
                    _ => return Err(malformed(ip, "BREAK outside a WHILE loop")),
                },

                ActionKind::Continue => match innermost_while(&mut stack) {
                    Some(OpenBlock::While { begin, .. }) => {
                        jumps[ip].while_begin = Some(*begin);
                    }
                    _ => return Err(malformed(ip, "CONTINUE outside a WHILE loop")),
                },

                ActionKind::TryBegin => stack.push(OpenBlock::Try {
                    begin: ip,
                    catch: None,
                }),

                ActionKind::CatchBegin => match stack.last_mut() {
                    Some(OpenBlock::Try { begin, catch }) => {
                        if catch.is_some() {
                            return Err(malformed(ip, "duplicate CATCH_BEGIN"));
                        }
                        jumps[*begin].catch_ip = Some(ip);
                        *catch = Some(ip);
                    }
                    _ => return Err(malformed(ip, "CATCH_BEGIN outside a TRY block")),
                },

                ActionKind::CatchEnd => match stack.pop() {
                    Some(OpenBlock::Try {
                        begin,
                        catch: Some(catch),
                    }) => {
                        jumps[begin].catch_end = Some(ip);
                        jumps[catch].catch_end = Some(ip);
                    }
                    Some(OpenBlock::Try { catch: None, .. }) => {
                        return Err(malformed(ip, "CATCH_END without a CATCH_BEGIN"));
                    }
                    _ => return Err(malformed(ip, "CATCH_END without a matching TRY_BEGIN")),
                },

                _ => {}
            }
        }

        if let Some(open) = stack.last() {
            let (what, at) = match open {
                OpenBlock::If { alternatives, .. } => ("IF_BEGIN", alternatives[0]),
                OpenBlock::While { begin, .. } => ("WHILE_BEGIN", *begin),
                OpenBlock::Try { begin, .. } => ("TRY_BEGIN", *begin),
            };
            return Err(AutomationError::Malformed(format!(
                "unterminated {what} at action #{at}"
            )));
        }

        Ok(Self { actions, jumps })
    }

    pub fn len(&self) -> usize {
        self.actions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

fn innermost_while(stack: &mut [OpenBlock]) -> Option<&mut OpenBlock> {
    stack
        .iter_mut()
        .rev()
        .find(|block| matches!(block, OpenBlock::While { .. }))
}

fn malformed(ip: usize, why: &str) -> AutomationError {
    AutomationError::Malformed(format!("{why} (action #{ip})"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{Action, ActionKind};
    use serde_json::json;

    fn act(kind: ActionKind) -> Action {
        let mut action = Action::new(kind);
        // Conditions are irrelevant to pairing; give the kinds that demand
        // a value a minimal one.
        if kind.spec().requires_value {
            action.value = Some(json!("check_passed"));
        }
        action
    }

    #[test]
    fn test_if_elif_else_chain() {
        let program = ResolvedProgram::resolve(vec![
            act(ActionKind::IfBegin),    // 0
            act(ActionKind::Wait),       // 1
            act(ActionKind::Elif),       // 2
            act(ActionKind::Wait),       // 3
            act(ActionKind::Else),       // 4
            act(ActionKind::Wait),       // 5
            act(ActionKind::IfEnd),      // 6
        ])
        .unwrap();

        assert_eq!(program.jumps[0].next_alternative, Some(2));
        assert_eq!(program.jumps[2].next_alternative, Some(4));
        assert_eq!(program.jumps[4].next_alternative, Some(6));
        assert_eq!(program.jumps[0].if_end, Some(6));
        assert_eq!(program.jumps[2].if_end, Some(6));
        assert_eq!(program.jumps[4].if_end, Some(6));
    }

    #[test]
    fn test_while_with_break_and_continue() {
        let program = ResolvedProgram::resolve(vec![
            act(ActionKind::WhileBegin), // 0
            act(ActionKind::IfBegin),    // 1
            act(ActionKind::Break),      // 2
            act(ActionKind::Else),       // 3
            act(ActionKind::Continue),   // 4
            act(ActionKind::IfEnd),      // 5
            act(ActionKind::WhileEnd),   // 6
        ])
        .unwrap();

        assert_eq!(program.jumps[0].while_end, Some(6));
        assert_eq!(program.jumps[6].while_begin, Some(0));
        // BREAK/CONTINUE bind to the innermost WHILE even through an IF.
        assert_eq!(program.jumps[2].while_end, Some(6));
        assert_eq!(program.jumps[4].while_begin, Some(0));
    }

    #[test]
    fn test_nested_whiles_bind_innermost() {
        let program = ResolvedProgram::resolve(vec![
            act(ActionKind::WhileBegin), // 0
            act(ActionKind::WhileBegin), // 1
            act(ActionKind::Break),      // 2
            act(ActionKind::WhileEnd),   // 3
            act(ActionKind::WhileEnd),   // 4
        ])
        .unwrap();

        assert_eq!(program.jumps[2].while_end, Some(3));
        assert_eq!(program.jumps[1].while_end, Some(3));
        assert_eq!(program.jumps[0].while_end, Some(4));
    }

    #[test]
    fn test_try_catch_pairing() {
        let program = ResolvedProgram::resolve(vec![
            act(ActionKind::TryBegin),   // 0
            act(ActionKind::Wait),       // 1
            act(ActionKind::CatchBegin), // 2
            act(ActionKind::Wait),       // 3
            act(ActionKind::CatchEnd),   // 4
        ])
        .unwrap();

        assert_eq!(program.jumps[0].catch_ip, Some(2));
        assert_eq!(program.jumps[0].catch_end, Some(4));
        assert_eq!(program.jumps[2].catch_end, Some(4));
    }

    #[test]
    fn test_unbalanced_programs_rejected() {
        assert!(ResolvedProgram::resolve(vec![act(ActionKind::IfBegin)]).is_err());
        assert!(ResolvedProgram::resolve(vec![act(ActionKind::IfEnd)]).is_err());
        assert!(ResolvedProgram::resolve(vec![act(ActionKind::WhileEnd)]).is_err());
        assert!(ResolvedProgram::resolve(vec![
            act(ActionKind::TryBegin),
            act(ActionKind::CatchEnd),
        ])
        .is_err());
    }

    #[test]
    fn test_orphan_break_and_continue_rejected() {
        let err = ResolvedProgram::resolve(vec![act(ActionKind::Break)]).unwrap_err();
        assert!(err.to_string().contains("BREAK"));
        let err = ResolvedProgram::resolve(vec![
            act(ActionKind::IfBegin),
            act(ActionKind::Continue),
            act(ActionKind::IfEnd),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("CONTINUE"));
    }

    #[test]
    fn test_elif_after_else_rejected() {
        let err = ResolvedProgram::resolve(vec![
            act(ActionKind::IfBegin),
            act(ActionKind::Else),
            act(ActionKind::Elif),
            act(ActionKind::IfEnd),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("ELIF after ELSE"));
    }

    #[test]
    fn test_mismatched_terminator_rejected() {
        let err = ResolvedProgram::resolve(vec![
            act(ActionKind::WhileBegin),
            act(ActionKind::IfEnd),
        ])
        .unwrap_err();
        assert!(matches!(err, AutomationError::Malformed(_)));
    }
}

use tracing::trace;
use weave::expr::Statement;
use weave::parser::parse_script;

use crate::builtins::Builtins;
use crate::error::{ExecutionError, ScriptError};
use crate::evaluator::evaluate;
use crate::session::SessionState;

/// An artifact declared by a block, before it has been named.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactPayload {
    pub extension: String,
    pub bytes: Vec<u8>,
}

/// Everything one block produced. On failure `output` and `artifacts` hold
/// what was captured before the error.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Execution {
    pub output: String,
    pub artifacts: Vec<ArtifactPayload>,
    pub error: Option<ExecutionError>,
}

/// The capability the engine runs code through.
pub trait Executor {
    /// Fence language this executor runs; every other block is `no-exec`.
    fn language(&self) -> &str;

    fn execute(&mut self, code: &str, session: &mut SessionState) -> Execution;
}

/// Runs `calc` blocks.
#[derive(Debug, Default)]
pub struct CalcExecutor;

impl CalcExecutor {
    pub const LANGUAGE: &'static str = "calc";

    pub fn new() -> Self {
        CalcExecutor
    }
}

impl Executor for CalcExecutor {
    fn language(&self) -> &str {
        Self::LANGUAGE
    }

    fn execute(&mut self, code: &str, session: &mut SessionState) -> Execution {
        let mut execution = Execution::default();

        let script = match parse_script(code) {
            Ok(script) => script,
            Err(e) => {
                execution.error = Some(ExecutionError {
                    line: Some(e.line),
                    error: ScriptError::Syntax(e.message),
                });
                return execution;
            }
        };

        for statement in &script.statements {
            trace!(line = statement.line(), "statement");
            let mut calls = Builtins {
                output: &mut execution.output,
                artifacts: &mut execution.artifacts,
            };
            let result = match statement {
                Statement::Assignment {
                    variable, value, ..
                } => evaluate(value, session, &mut calls).map(|v| session.bind(variable, v)),
                Statement::Expression { value, .. } => {
                    evaluate(value, session, &mut calls).map(|_| ())
                }
            };
            if let Err(error) = result {
                execution.error = Some(ExecutionError {
                    line: Some(statement.line()),
                    error,
                });
                break;
            }
        }

        execution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn bindings_persist_across_calls() {
        let mut executor = CalcExecutor::new();
        let mut session = SessionState::new();
        let first = executor.execute("x = 3\n", &mut session);
        assert!(first.error.is_none());
        let second = executor.execute("y = x * 2\nprint(y)\n", &mut session);
        assert_eq!(second.output, "6\n");
        assert_eq!(session.get("y"), Some(&Value::Number(6.0)));
    }

    #[test]
    fn failure_keeps_partial_output_and_line() {
        let mut executor = CalcExecutor::new();
        let mut session = SessionState::new();
        let result = executor.execute("print(\"a\")\n# note\nz = 1 / 0\nprint(\"b\")\n", &mut session);
        assert_eq!(result.output, "a\n");
        let error = result.error.expect("failure");
        assert_eq!(error.line, Some(3));
        assert_eq!(error.error, ScriptError::DivisionByZero);
        assert!(session.get("z").is_none());
    }

    #[test]
    fn syntax_errors_are_executions_errors() {
        let mut executor = CalcExecutor::new();
        let mut session = SessionState::new();
        let result = executor.execute("x = 1\ny = (2 +\n", &mut session);
        let error = result.error.expect("failure");
        assert_eq!(error.line, Some(2));
        assert!(matches!(error.error, ScriptError::Syntax(_)));
        assert!(session.is_empty());
    }
}

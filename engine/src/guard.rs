use weave::{Conditional, Span};

use crate::error::{Error, ScriptError};
use crate::evaluator::{NoCalls, evaluate};
use crate::session::SessionState;

/// Decide whether a conditional span is emitted.
///
/// Takes the session by shared reference: a guard can read bindings but
/// never create or change one. Unknown names are an error rather than
/// false, so a typo cannot silently drop content.
pub fn evaluate_guard(conditional: &Conditional, session: &SessionState) -> Result<bool, Error> {
    let expr = conditional.guard.expr();
    match evaluate(expr, session, &mut NoCalls) {
        Ok(value) => Ok(value.is_truthy()),
        Err(ScriptError::UndefinedVariable(name)) => {
            let span = match expr.variable_range(&name) {
                Some(range) => Span {
                    file_id: conditional.span.file_id,
                    range: range.clone(),
                    line: conditional.span.line,
                },
                None => conditional.span.clone(),
            };
            Err(Error::UndefinedReference {
                name,
                guard: conditional.source.clone(),
                span,
            })
        }
        Err(error) => Err(Error::GuardType {
            guard: conditional.source.clone(),
            error,
            span: conditional.span.clone(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;
    use weave::parser::Parser;
    use weave::{Node, Document};

    fn conditional(source: &str) -> Conditional {
        let Document { nodes, .. } = Parser::new(source, 0).parse().expect("parse failed");
        match nodes.into_iter().next() {
            Some(Node::Conditional(c)) => c,
            other => panic!("expected conditional, got {other:?}"),
        }
    }

    #[test]
    fn reads_bindings() {
        let mut session = SessionState::new();
        session.bind("x", Value::Number(3.0));
        assert!(evaluate_guard(&conditional("!if x == 3\nA\n!endif\n"), &session).unwrap());
        assert!(!evaluate_guard(&conditional("!if x > 3\nA\n!endif\n"), &session).unwrap());
    }

    #[test]
    fn undefined_reference_points_at_the_name() {
        let source = "!if ready && x\nA\n!endif\n";
        let err = evaluate_guard(&conditional(source), &SessionState::new()).unwrap_err();
        let Error::UndefinedReference { name, span, .. } = err else {
            panic!("expected UndefinedReference, got {err:?}");
        };
        assert_eq!(name, "ready");
        assert_eq!(&source[span.range.clone()], "ready");
    }

    #[test]
    fn short_circuit_skips_unbound_names() {
        let mut session = SessionState::new();
        session.bind("enabled", Value::Boolean(false));
        let guard = conditional("!if enabled && later > 1\nA\n!endif\n");
        assert!(!evaluate_guard(&guard, &session).unwrap());
    }

    #[test]
    fn type_errors_are_guard_errors() {
        let mut session = SessionState::new();
        session.bind("name", Value::from("x"));
        let err = evaluate_guard(&conditional("!if -name\nA\n!endif\n"), &session).unwrap_err();
        assert!(matches!(err, Error::GuardType { .. }));
    }
}

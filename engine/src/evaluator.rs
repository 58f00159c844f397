use std::cmp::Ordering;

use weave::expr::{BinaryOperator, Expr, UnaryOperator};

use crate::error::ScriptError;
use crate::session::SessionState;
use crate::value::Value;

const MAX_DEPTH: usize = 256;

/// Receives the builtin calls made while evaluating an expression.
pub trait CallHandler {
    fn call(&mut self, function: &str, arguments: Vec<Value>) -> Result<Value, ScriptError>;
}

/// Handler for contexts where calls cannot occur.
pub(crate) struct NoCalls;

impl CallHandler for NoCalls {
    fn call(&mut self, function: &str, _arguments: Vec<Value>) -> Result<Value, ScriptError> {
        Err(ScriptError::UnknownFunction(function.to_string()))
    }
}

/// Evaluate an expression against the session.
///
/// The session is only read; assignment is the caller's business.
pub fn evaluate(
    expr: &Expr,
    session: &SessionState,
    calls: &mut dyn CallHandler,
) -> Result<Value, ScriptError> {
    eval(expr, session, calls, 0)
}

fn eval(
    expr: &Expr,
    session: &SessionState,
    calls: &mut dyn CallHandler,
    depth: usize,
) -> Result<Value, ScriptError> {
    if depth > MAX_DEPTH {
        return Err(ScriptError::TooDeep);
    }

    match expr {
        // --- Literals ---
        Expr::NumberLiteral(n) => Ok(Value::Number(*n)),
        Expr::StringLiteral(s) => Ok(Value::String(s.clone())),
        Expr::BooleanLiteral(b) => Ok(Value::Boolean(*b)),
        Expr::UnitLiteral => Ok(Value::Unit),

        Expr::Variable(name, _) => session
            .get(name)
            .cloned()
            .ok_or_else(|| ScriptError::UndefinedVariable(name.clone())),

        Expr::Call {
            function,
            arguments,
            ..
        } => {
            let values = arguments
                .iter()
                .map(|a| eval(a, session, calls, depth + 1))
                .collect::<Result<Vec<_>, _>>()?;
            calls.call(function, values)
        }

        // --- Operations ---
        Expr::UnaryOperation { operator, operand } => {
            let val = eval(operand, session, calls, depth + 1)?;
            match operator {
                UnaryOperator::Negation => Ok(Value::Number(-coerce_number(&val)?)),
                UnaryOperator::LogicalNot => Ok(Value::Boolean(val.is_falsy())),
            }
        }

        Expr::BinaryOperation { .. } => eval_chain(expr, session, calls, depth),
    }
}

/// Evaluate a left-associative chain such as `a + b + c` without recursing
/// down its left spine, so only real nesting counts towards the depth limit.
fn eval_chain(
    expr: &Expr,
    session: &SessionState,
    calls: &mut dyn CallHandler,
    depth: usize,
) -> Result<Value, ScriptError> {
    let mut spine = Vec::new();
    let mut leftmost = expr;
    while let Expr::BinaryOperation {
        operator,
        left,
        right,
    } = leftmost
    {
        spine.push((*operator, right.as_ref()));
        leftmost = left.as_ref();
    }

    let mut l = eval(leftmost, session, calls, depth + 1)?;
    for (operator, right) in spine.into_iter().rev() {
        // `&&` and `||` do not evaluate their right side when the left
        // side decides the result.
        l = match operator {
            BinaryOperator::LogicalAnd if l.is_falsy() => Value::Boolean(false),
            BinaryOperator::LogicalOr if l.is_truthy() => Value::Boolean(true),
            _ => {
                let r = eval(right, session, calls, depth + 1)?;
                eval_binary_op(operator, &l, &r)?
            }
        };
    }
    Ok(l)
}

pub(crate) fn coerce_number(val: &Value) -> Result<f64, ScriptError> {
    match val {
        Value::Number(n) => Ok(*n),
        other => Err(ScriptError::TypeError {
            expected: "Number".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

pub(crate) fn coerce_string(val: &Value) -> Result<&str, ScriptError> {
    match val {
        Value::String(s) => Ok(s),
        other => Err(ScriptError::TypeError {
            expected: "String".to_string(),
            got: other.type_name().to_string(),
        }),
    }
}

fn eval_binary_op(op: BinaryOperator, left: &Value, right: &Value) -> Result<Value, ScriptError> {
    match op {
        BinaryOperator::Addition => match (left, right) {
            (Value::Number(a), Value::Number(b)) => Ok(Value::Number(a + b)),
            (Value::String(a), Value::String(b)) => Ok(Value::String(format!("{}{}", a, b))),
            _ => Err(ScriptError::TypeError {
                expected: "matching numeric or string types".to_string(),
                got: format!("{} + {}", left.type_name(), right.type_name()),
            }),
        },
        BinaryOperator::Subtraction => numeric_binop(left, right, |a, b| a - b),
        BinaryOperator::Multiplication => numeric_binop(left, right, |a, b| a * b),
        BinaryOperator::Division => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(ScriptError::DivisionByZero);
            }
            Ok(Value::Number(a / b))
        }
        BinaryOperator::Modulo => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            if b == 0.0 {
                return Err(ScriptError::DivisionByZero);
            }
            Ok(Value::Number(a % b))
        }
        BinaryOperator::Equality => Ok(Value::Boolean(left == right)),
        BinaryOperator::Inequality => Ok(Value::Boolean(left != right)),
        BinaryOperator::GreaterThan => compare(left, right, Ordering::is_gt),
        BinaryOperator::LessThan => compare(left, right, Ordering::is_lt),
        BinaryOperator::GreaterThanOrEqual => compare(left, right, Ordering::is_ge),
        BinaryOperator::LessThanOrEqual => compare(left, right, Ordering::is_le),
        BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr => {
            Ok(Value::Boolean(right.is_truthy()))
        }
    }
}

fn numeric_binop(
    left: &Value,
    right: &Value,
    f: impl Fn(f64, f64) -> f64,
) -> Result<Value, ScriptError> {
    let a = coerce_number(left)?;
    let b = coerce_number(right)?;
    Ok(Value::Number(f(a, b)))
}

/// Numbers compare numerically, strings lexicographically. NaN compares
/// false against everything.
fn compare(left: &Value, right: &Value, f: impl Fn(Ordering) -> bool) -> Result<Value, ScriptError> {
    let ordering = match (left, right) {
        (Value::String(a), Value::String(b)) => a.cmp(b),
        _ => {
            let a = coerce_number(left)?;
            let b = coerce_number(right)?;
            match a.partial_cmp(&b) {
                Some(ordering) => ordering,
                None => return Ok(Value::Boolean(false)),
            }
        }
    };
    Ok(Value::Boolean(f(ordering)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use weave::parser::parse_expression;

    fn eval_str(text: &str, session: &SessionState) -> Result<Value, ScriptError> {
        let expr = parse_expression(text, 0).expect("parse failed");
        evaluate(&expr, session, &mut NoCalls)
    }

    #[test]
    fn arithmetic_and_precedence() {
        let session = SessionState::new();
        assert_eq!(eval_str("2 + 3 * 4", &session), Ok(Value::Number(14.0)));
        assert_eq!(eval_str("(2 + 3) * 4", &session), Ok(Value::Number(20.0)));
        assert_eq!(eval_str("10 % 3", &session), Ok(Value::Number(1.0)));
        assert_eq!(eval_str("-5 + 10", &session), Ok(Value::Number(5.0)));
        assert_eq!(eval_str("\"a\" + \"b\"", &session), Ok(Value::from("ab")));
    }

    #[test]
    fn comparisons() {
        let session = SessionState::new();
        assert_eq!(eval_str("3 < 5", &session), Ok(Value::Boolean(true)));
        assert_eq!(eval_str("\"b\" >= \"a\"", &session), Ok(Value::Boolean(true)));
        assert_eq!(eval_str("1 == \"1\"", &session), Ok(Value::Boolean(false)));
        assert!(matches!(
            eval_str("1 < \"a\"", &session),
            Err(ScriptError::TypeError { .. })
        ));
    }

    #[test]
    fn logic_short_circuits() {
        let session = SessionState::new();
        assert_eq!(eval_str("false && missing", &session), Ok(Value::Boolean(false)));
        assert_eq!(eval_str("true || missing", &session), Ok(Value::Boolean(true)));
        assert_eq!(
            eval_str("true && missing", &session),
            Err(ScriptError::UndefinedVariable("missing".to_string()))
        );
        assert_eq!(eval_str("1 && \"\"", &session), Ok(Value::Boolean(false)));
    }

    #[test]
    fn long_flat_chains_are_not_nesting() {
        let session = SessionState::new();
        let sum = vec!["1"; 300].join(" + ");
        assert_eq!(eval_str(&sum, &session), Ok(Value::Number(300.0)));
        let any = format!("{} || true", vec!["false"; 300].join(" || "));
        assert_eq!(eval_str(&any, &session), Ok(Value::Boolean(true)));
        assert_eq!(eval_str("10 - 3 - 2", &session), Ok(Value::Number(5.0)));
    }

    #[test]
    fn division_by_zero() {
        let session = SessionState::new();
        assert_eq!(eval_str("1 / 0", &session), Err(ScriptError::DivisionByZero));
        assert_eq!(eval_str("1 % 0", &session), Err(ScriptError::DivisionByZero));
    }

    #[test]
    fn reads_session() {
        let mut session = SessionState::new();
        session.bind("x", Value::Number(3.0));
        assert_eq!(eval_str("x == 3", &session), Ok(Value::Boolean(true)));
    }
}

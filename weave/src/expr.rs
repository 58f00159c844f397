use std::ops::Range;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UnaryOperator {
    /// Arithmetic negation: -x
    Negation,
    /// Logical not: !x
    LogicalNot,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BinaryOperator {
    Addition,
    Subtraction,
    Multiplication,
    Division,
    Modulo,
    LogicalAnd,
    LogicalOr,
    Equality,
    Inequality,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
}

/// An expression AST node of the `calc` language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    // Literals
    StringLiteral(String),
    NumberLiteral(f64),
    BooleanLiteral(bool),
    UnitLiteral,

    /// Variable read; the range locates the name in its source text.
    Variable(String, Range<usize>),

    /// Builtin call: `name(args...)`
    Call {
        function: String,
        arguments: Vec<Expr>,
        span: Range<usize>,
    },

    UnaryOperation {
        operator: UnaryOperator,
        operand: Box<Expr>,
    },
    BinaryOperation {
        operator: BinaryOperator,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

impl Expr {
    /// First call found in the expression, depth-first.
    pub fn find_call(&self) -> Option<(&str, &Range<usize>)> {
        match self {
            Expr::Call { function, span, .. } => Some((function, span)),
            Expr::UnaryOperation { operand, .. } => operand.find_call(),
            Expr::BinaryOperation { left, right, .. } => {
                left.find_call().or_else(|| right.find_call())
            }
            _ => None,
        }
    }

    /// Range of the first read of `name`, depth-first.
    pub fn variable_range(&self, name: &str) -> Option<&Range<usize>> {
        match self {
            Expr::Variable(var, range) if var == name => Some(range),
            Expr::Call { arguments, .. } => {
                arguments.iter().find_map(|a| a.variable_range(name))
            }
            Expr::UnaryOperation { operand, .. } => operand.variable_range(name),
            Expr::BinaryOperation { left, right, .. } => left
                .variable_range(name)
                .or_else(|| right.variable_range(name)),
            _ => None,
        }
    }
}

/// A guard expression: the side-effect-free subset of [`Expr`].
///
/// Only constructible through [`Guard::new`], which rejects calls, so
/// evaluating a guard can never reach a builtin.
#[derive(Debug, Clone, PartialEq)]
pub struct Guard {
    expr: Expr,
}

impl Guard {
    pub fn new(expr: Expr) -> Result<Self, (String, Range<usize>)> {
        if let Some((function, span)) = expr.find_call() {
            return Err((
                format!("calls are not allowed in guards (found `{}`)", function),
                span.clone(),
            ));
        }
        Ok(Guard { expr })
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

/// One statement of a `calc` block.
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    /// `name = expr`
    Assignment {
        variable: String,
        value: Expr,
        line: usize,
    },
    /// Expression evaluated for its effects; the result is discarded.
    Expression { value: Expr, line: usize },
}

impl Statement {
    /// 1-based line within the code block.
    pub fn line(&self) -> usize {
        match self {
            Statement::Assignment { line, .. } => *line,
            Statement::Expression { line, .. } => *line,
        }
    }
}

/// A parsed `calc` code block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Script {
    pub statements: Vec<Statement>,
}

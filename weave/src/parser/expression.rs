//! Lexer and precedence-climbing parser for the expression language shared
//! by `!if` guards and `calc` blocks.

use std::fmt;
use std::iter::Peekable;
use std::ops::Range;
use std::str::CharIndices;

use crate::expr::{BinaryOperator, Expr, Guard, Script, Statement, UnaryOperator};

/// A syntax error in a guard or a `calc` block.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntaxError {
    pub message: String,
    /// Byte range in the parsed text, shifted by the caller's base offset.
    pub range: Range<usize>,
    /// 1-based line within a script; 1 for single-line guards.
    pub line: usize,
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for SyntaxError {}

const MAX_NESTING: usize = 128;

/// Parse a single expression. `base_offset` is added to every recorded range
/// so spans point into the enclosing file.
pub fn parse_expression(text: &str, base_offset: usize) -> Result<Expr, SyntaxError> {
    let tokens = Lexer::new(text, base_offset, 1).tokenize()?;
    let mut parser = ExprParser::new(tokens, base_offset..base_offset + text.len(), 1);
    let expr = parser.top_level()?;
    parser.finish("unexpected tokens after expression")?;
    Ok(expr)
}

/// Parse the text following an `!if` marker.
pub fn parse_guard(text: &str, base_offset: usize) -> Result<Guard, SyntaxError> {
    let expr = parse_expression(text, base_offset)?;
    Guard::new(expr).map_err(|(message, range)| SyntaxError {
        message,
        range,
        line: 1,
    })
}

/// Parse the body of a `calc` code block: one statement per line, `#` comments.
pub fn parse_script(code: &str) -> Result<Script, SyntaxError> {
    let mut statements = Vec::new();
    let mut offset = 0;

    for (idx, raw) in code.split_inclusive('\n').enumerate() {
        let line = idx + 1;
        let text = raw.trim_end_matches(['\n', '\r']);
        let tokens = Lexer::new(text, offset, line).tokenize()?;
        let span = offset..offset + text.len();
        offset += raw.len();
        if tokens.is_empty() {
            continue;
        }

        let mut parser = ExprParser::new(tokens, span, line);
        let statement = match parser.assignment_target() {
            Some(variable) => {
                let value = parser.top_level()?;
                parser.finish("unexpected tokens after assignment")?;
                Statement::Assignment {
                    variable,
                    value,
                    line,
                }
            }
            None => {
                let value = parser.top_level()?;
                parser.finish("unexpected tokens after expression")?;
                Statement::Expression { value, line }
            }
        };
        statements.push(statement);
    }

    Ok(Script { statements })
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Str(String),
    Bool(bool),
    Ident(String),
    /// Operators and punctuation.
    Op(&'static str),
}

#[derive(Debug, Clone)]
struct Spanned {
    token: Token,
    range: Range<usize>,
}

struct Lexer<'a> {
    text: &'a str,
    chars: Peekable<CharIndices<'a>>,
    base: usize,
    line: usize,
}

impl<'a> Lexer<'a> {
    fn new(text: &'a str, base: usize, line: usize) -> Self {
        Lexer {
            text,
            chars: text.char_indices().peekable(),
            base,
            line,
        }
    }

    fn tokenize(mut self) -> Result<Vec<Spanned>, SyntaxError> {
        let mut tokens = Vec::new();
        while let Some(&(start, c)) = self.chars.peek() {
            if c.is_whitespace() {
                self.chars.next();
                continue;
            }
            if c == '#' {
                break;
            }
            let token = match c {
                '"' => self.string(start)?,
                '0'..='9' => self.number(start)?,
                c if c.is_alphabetic() || c == '_' => self.word(start),
                _ => self.operator(start, c)?,
            };
            let end = self.offset();
            tokens.push(Spanned {
                token,
                range: self.base + start..self.base + end,
            });
        }
        Ok(tokens)
    }

    fn offset(&mut self) -> usize {
        self.chars.peek().map_or(self.text.len(), |&(i, _)| i)
    }

    fn error(&self, message: impl Into<String>, range: Range<usize>) -> SyntaxError {
        SyntaxError {
            message: message.into(),
            range: self.base + range.start..self.base + range.end,
            line: self.line,
        }
    }

    fn eat(&mut self, expected: char) -> bool {
        self.chars.next_if(|&(_, c)| c == expected).is_some()
    }

    fn take_while(&mut self, start: usize, keep: impl Fn(char) -> bool) -> &'a str {
        while self.chars.next_if(|&(_, c)| keep(c)).is_some() {}
        let end = self.offset();
        let text = self.text;
        &text[start..end]
    }

    fn string(&mut self, start: usize) -> Result<Token, SyntaxError> {
        self.chars.next();
        let mut value = String::new();
        while let Some((_, c)) = self.chars.next() {
            match c {
                '"' => return Ok(Token::Str(value)),
                '\\' => match self.chars.next() {
                    Some((_, 'n')) => value.push('\n'),
                    Some((_, 't')) => value.push('\t'),
                    Some((_, other)) => value.push(other),
                    None => break,
                },
                other => value.push(other),
            }
        }
        Err(self.error("unterminated string literal", start..self.text.len()))
    }

    fn number(&mut self, start: usize) -> Result<Token, SyntaxError> {
        let literal = self.take_while(start, |c| c.is_ascii_digit() || c == '.');
        literal.parse::<f64>().map(Token::Number).map_err(|_| {
            self.error(
                format!("invalid number literal `{literal}`"),
                start..start + literal.len(),
            )
        })
    }

    fn word(&mut self, start: usize) -> Token {
        match self.take_while(start, |c| c.is_alphanumeric() || c == '_') {
            "true" => Token::Bool(true),
            "false" => Token::Bool(false),
            name => Token::Ident(name.to_string()),
        }
    }

    fn operator(&mut self, start: usize, c: char) -> Result<Token, SyntaxError> {
        self.chars.next();
        let op = match c {
            '=' if self.eat('=') => "==",
            '=' => "=",
            '!' if self.eat('=') => "!=",
            '!' => "!",
            '>' if self.eat('=') => ">=",
            '>' => ">",
            '<' if self.eat('=') => "<=",
            '<' => "<",
            '&' if self.eat('&') => "&&",
            '|' if self.eat('|') => "||",
            '&' | '|' => {
                return Err(self.error(
                    format!("unexpected `{c}` (did you mean `{c}{c}`?)"),
                    start..start + 1,
                ));
            }
            '+' => "+",
            '-' => "-",
            '*' => "*",
            '/' => "/",
            '%' => "%",
            ',' => ",",
            '(' => "(",
            ')' => ")",
            other => {
                return Err(self.error(
                    format!("unexpected character `{other}`"),
                    start..start + other.len_utf8(),
                ));
            }
        };
        Ok(Token::Op(op))
    }
}

/// Binary operator and its precedence; higher binds tighter. All binary
/// operators are left-associative.
fn binary_operator(token: &Token) -> Option<(BinaryOperator, u8)> {
    let Token::Op(op) = token else {
        return None;
    };
    let entry = match *op {
        "||" => (BinaryOperator::LogicalOr, 1),
        "&&" => (BinaryOperator::LogicalAnd, 2),
        "==" => (BinaryOperator::Equality, 3),
        "!=" => (BinaryOperator::Inequality, 3),
        "<" => (BinaryOperator::LessThan, 4),
        ">" => (BinaryOperator::GreaterThan, 4),
        "<=" => (BinaryOperator::LessThanOrEqual, 4),
        ">=" => (BinaryOperator::GreaterThanOrEqual, 4),
        "+" => (BinaryOperator::Addition, 5),
        "-" => (BinaryOperator::Subtraction, 5),
        "*" => (BinaryOperator::Multiplication, 6),
        "/" => (BinaryOperator::Division, 6),
        "%" => (BinaryOperator::Modulo, 6),
        _ => return None,
    };
    Some(entry)
}

struct ExprParser {
    tokens: Vec<Spanned>,
    pos: usize,
    /// Whole parsed text; errors at end of input point here.
    span: Range<usize>,
    line: usize,
    depth: usize,
}

impl ExprParser {
    fn new(tokens: Vec<Spanned>, span: Range<usize>, line: usize) -> Self {
        ExprParser {
            tokens,
            pos: 0,
            span,
            line,
            depth: 0,
        }
    }

    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos).map(|t| &t.token)
    }

    fn next(&mut self) -> Option<Spanned> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, op: &str) -> bool {
        let found = matches!(self.peek(), Some(Token::Op(o)) if *o == op);
        if found {
            self.pos += 1;
        }
        found
    }

    /// Error at the current token, or over the whole text at end of input.
    fn error(&self, message: impl Into<String>) -> SyntaxError {
        let range = self
            .tokens
            .get(self.pos)
            .map_or_else(|| self.span.clone(), |t| t.range.clone());
        SyntaxError {
            message: message.into(),
            range,
            line: self.line,
        }
    }

    fn finish(&self, message: &str) -> Result<(), SyntaxError> {
        if self.pos < self.tokens.len() {
            return Err(self.error(message));
        }
        Ok(())
    }

    /// Consume `name =` if the statement is an assignment (a single `=`).
    fn assignment_target(&mut self) -> Option<String> {
        let name = match (self.tokens.first(), self.tokens.get(1)) {
            (Some(Spanned { token: Token::Ident(name), .. }), Some(second))
                if second.token == Token::Op("=") =>
            {
                name.clone()
            }
            _ => return None,
        };
        self.pos = 2;
        Some(name)
    }

    fn nested<T>(
        &mut self,
        parse: impl FnOnce(&mut Self) -> Result<T, SyntaxError>,
    ) -> Result<T, SyntaxError> {
        if self.depth >= MAX_NESTING {
            return Err(self.error("expression nesting too deep"));
        }
        self.depth += 1;
        let result = parse(self);
        self.depth -= 1;
        result
    }

    fn top_level(&mut self) -> Result<Expr, SyntaxError> {
        self.nested(|p| p.binary(0))
    }

    fn binary(&mut self, min_precedence: u8) -> Result<Expr, SyntaxError> {
        let mut left = self.unary()?;

        while let Some((operator, precedence)) = self.peek().and_then(binary_operator) {
            if precedence < min_precedence {
                break;
            }
            self.pos += 1;
            let right = self.nested(|p| p.binary(precedence + 1))?;
            left = Expr::BinaryOperation {
                operator,
                left: Box::new(left),
                right: Box::new(right),
            };
        }

        if self.peek() == Some(&Token::Op("=")) {
            return Err(
                self.error("`=` is only valid at the start of a statement (use `==` to compare)")
            );
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, SyntaxError> {
        let operator = match self.peek() {
            Some(Token::Op("!")) => UnaryOperator::LogicalNot,
            Some(Token::Op("-")) => UnaryOperator::Negation,
            _ => return self.primary(),
        };
        self.pos += 1;
        let operand = self.nested(|p| p.unary())?;
        Ok(Expr::UnaryOperation {
            operator,
            operand: Box::new(operand),
        })
    }

    fn primary(&mut self) -> Result<Expr, SyntaxError> {
        let Some(Spanned { token, range }) = self.next() else {
            return Err(self.error("unexpected end of expression"));
        };

        match token {
            Token::Number(n) => Ok(Expr::NumberLiteral(n)),
            Token::Str(s) => Ok(Expr::StringLiteral(s)),
            Token::Bool(b) => Ok(Expr::BooleanLiteral(b)),
            Token::Ident(name) if self.eat("(") => Ok(Expr::Call {
                function: name,
                arguments: self.arguments()?,
                span: range,
            }),
            Token::Ident(name) => Ok(Expr::Variable(name, range)),
            Token::Op("(") if self.eat(")") => Ok(Expr::UnitLiteral),
            Token::Op("(") => {
                let expr = self.nested(|p| p.binary(0))?;
                if !self.eat(")") {
                    return Err(self.error("expected `)`"));
                }
                Ok(expr)
            }
            Token::Op(op) => Err(SyntaxError {
                message: format!("unexpected `{op}`"),
                range,
                line: self.line,
            }),
        }
    }

    /// Call arguments; the opening paren is already consumed.
    fn arguments(&mut self) -> Result<Vec<Expr>, SyntaxError> {
        let mut arguments = Vec::new();
        if self.eat(")") {
            return Ok(arguments);
        }
        loop {
            arguments.push(self.nested(|p| p.binary(0))?);
            if self.eat(",") {
                continue;
            }
            if self.eat(")") {
                return Ok(arguments);
            }
            return Err(self.error("expected `,` or `)` in argument list"));
        }
    }
}

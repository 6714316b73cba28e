use std::collections::HashMap;

use lazy_static::lazy_static;

use crate::{ClientError, Result};

lazy_static! {
    /// Curated set of unary math functions callable from formulas.
    static ref MATH_FUNCTIONS: HashMap<&'static str, fn(f64) -> f64> = {
        let mut m: HashMap<&'static str, fn(f64) -> f64> = HashMap::new();
        m.insert("abs", f64::abs);
        m.insert("acos", f64::acos);
        m.insert("asin", f64::asin);
        m.insert("atan", f64::atan);
        m.insert("cbrt", f64::cbrt);
        m.insert("ceil", f64::ceil);
        m.insert("cos", f64::cos);
        m.insert("cosh", f64::cosh);
        m.insert("exp", f64::exp);
        m.insert("floor", f64::floor);
        m.insert("ln", f64::ln);
        m.insert("log", f64::ln);
        m.insert("log10", f64::log10);
        m.insert("log2", f64::log2);
        m.insert("round", f64::round);
        m.insert("sin", f64::sin);
        m.insert("sinh", f64::sinh);
        m.insert("sqrt", f64::sqrt);
        m.insert("tan", f64::tan);
        m.insert("tanh", f64::tanh);
        m
    };
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LeftParen,
    RightParen,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Number(f64),
    Variable(String),
    Call(String, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Negate(Box<Expr>),
}

/// A parsed arithmetic formula over named variables.
///
/// Supports infix `+ - * /`, parentheses, unary minus, numeric literals and
/// single-argument math function calls (`sin`, `cos`, `sqrt`, ...). A call's
/// argument is parsed as one full expression, so `cos(x + y)` and
/// `cos((x + y))` are equivalent.
#[derive(Debug, Clone)]
pub struct Formula {
    text: String,
    root: Expr,
}

impl Formula {
    /// Parse a formula string. Fails on invalid syntax or unknown functions.
    pub fn parse(text: &str) -> Result<Self> {
        let tokens = tokenize(text)?;
        let mut parser = Parser { tokens, pos: 0 };
        let root = parser.expression()?;
        if parser.pos != parser.tokens.len() {
            return Err(syntax_error(text, "trailing input after expression"));
        }
        Ok(Formula {
            text: text.to_string(),
            root,
        })
    }

    /// Evaluate the formula against a set of named variables.
    ///
    /// Fails when the formula references a variable missing from
    /// `variables`, or when evaluation hits an undefined numeric result
    /// (division by zero, `sqrt` of a negative, ...).
    pub fn evaluate(&self, variables: &HashMap<String, f64>) -> Result<f64> {
        eval(&self.root, variables)
    }

    pub fn text(&self) -> &str {
        &self.text
    }
}

/// One-shot convenience: parse and evaluate in a single call.
pub fn evaluate(formula: &str, variables: &HashMap<String, f64>) -> Result<f64> {
    Formula::parse(formula)?.evaluate(variables)
}

fn syntax_error(text: &str, detail: &str) -> ClientError {
    ClientError::Evaluation(format!("invalid formula '{}': {}", text, detail))
}

fn tokenize(text: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = text.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Plus);
            }
            '-' => {
                chars.next();
                tokens.push(Token::Minus);
            }
            '*' => {
                chars.next();
                tokens.push(Token::Star);
            }
            '/' => {
                chars.next();
                tokens.push(Token::Slash);
            }
            '(' => {
                chars.next();
                tokens.push(Token::LeftParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RightParen);
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| syntax_error(text, &format!("bad number literal '{}'", literal)))?;
                tokens.push(Token::Number(value));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_alphanumeric() || d == '_' {
                        ident.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(syntax_error(text, &format!("unexpected character '{}'", other)));
            }
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn expect(&mut self, expected: Token, detail: &str) -> Result<()> {
        match self.next() {
            Some(ref token) if *token == expected => Ok(()),
            _ => Err(ClientError::Evaluation(format!("invalid formula: {}", detail))),
        }
    }

    fn expression(&mut self) -> Result<Expr> {
        let mut lhs = self.term()?;
        while let Some(op) = match self.peek() {
            Some(Token::Plus) => Some(BinaryOp::Add),
            Some(Token::Minus) => Some(BinaryOp::Subtract),
            _ => None,
        } {
            self.next();
            let rhs = self.term()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Expr> {
        let mut lhs = self.unary()?;
        while let Some(op) = match self.peek() {
            Some(Token::Star) => Some(BinaryOp::Multiply),
            Some(Token::Slash) => Some(BinaryOp::Divide),
            _ => None,
        } {
            self.next();
            let rhs = self.unary()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr> {
        if let Some(Token::Minus) = self.peek() {
            self.next();
            let inner = self.unary()?;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr> {
        match self.next() {
            Some(Token::Number(value)) => Ok(Expr::Number(value)),
            Some(Token::Ident(name)) => {
                if let Some(Token::LeftParen) = self.peek() {
                    if !MATH_FUNCTIONS.contains_key(name.as_str()) {
                        return Err(ClientError::Evaluation(format!(
                            "unknown function '{}'",
                            name
                        )));
                    }
                    self.next();
                    let argument = self.expression()?;
                    self.expect(
                        Token::RightParen,
                        &format!("unclosed argument list for '{}'", name),
                    )?;
                    Ok(Expr::Call(name, Box::new(argument)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some(Token::LeftParen) => {
                let inner = self.expression()?;
                self.expect(Token::RightParen, "unclosed parenthesis")?;
                Ok(inner)
            }
            Some(token) => Err(ClientError::Evaluation(format!(
                "invalid formula: unexpected token {:?}",
                token
            ))),
            None => Err(ClientError::Evaluation(
                "invalid formula: unexpected end of input".to_string(),
            )),
        }
    }
}

fn eval(expr: &Expr, variables: &HashMap<String, f64>) -> Result<f64> {
    match expr {
        Expr::Number(value) => Ok(*value),
        Expr::Variable(name) => variables
            .get(name)
            .copied()
            .ok_or_else(|| ClientError::Evaluation(format!("unknown variable '{}'", name))),
        Expr::Negate(inner) => Ok(-eval(inner, variables)?),
        Expr::Call(name, argument) => {
            let function = MATH_FUNCTIONS
                .get(name.as_str())
                .ok_or_else(|| ClientError::Evaluation(format!("unknown function '{}'", name)))?;
            let argument = eval(argument, variables)?;
            let value = function(argument);
            if !value.is_finite() {
                return Err(ClientError::Evaluation(format!(
                    "{}({}) is undefined",
                    name, argument
                )));
            }
            Ok(value)
        }
        Expr::Binary(op, lhs, rhs) => {
            let lhs = eval(lhs, variables)?;
            let rhs = eval(rhs, variables)?;
            let value = match op {
                BinaryOp::Add => lhs + rhs,
                BinaryOp::Subtract => lhs - rhs,
                BinaryOp::Multiply => lhs * rhs,
                BinaryOp::Divide => {
                    if rhs == 0.0 {
                        return Err(ClientError::Evaluation(format!(
                            "division by zero ({} / {})",
                            lhs, rhs
                        )));
                    }
                    lhs / rhs
                }
            };
            if !value.is_finite() {
                return Err(ClientError::Evaluation(
                    "expression produced a non-finite result".to_string(),
                ));
            }
            Ok(value)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), *value))
            .collect()
    }

    #[test]
    fn test_addition() {
        assert_eq!(evaluate("x + y", &vars(&[("x", 1.0), ("y", 1.0)])).unwrap(), 2.0);
        assert_eq!(evaluate("x + y", &vars(&[("x", 2.0), ("y", 2.0)])).unwrap(), 4.0);
    }

    #[test]
    fn test_operator_precedence() {
        let v = vars(&[("x", 2.0), ("y", 3.0)]);
        assert_eq!(evaluate("1 + x * y", &v).unwrap(), 7.0);
        assert_eq!(evaluate("(1 + x) * y", &v).unwrap(), 9.0);
        assert_eq!(evaluate("10 - 4 - 3", &v).unwrap(), 3.0);
        assert_eq!(evaluate("12 / x / y", &v).unwrap(), 2.0);
    }

    #[test]
    fn test_unary_minus() {
        let v = vars(&[("x", 5.0)]);
        assert_eq!(evaluate("-x", &v).unwrap(), -5.0);
        assert_eq!(evaluate("3 + -x", &v).unwrap(), -2.0);
        assert_eq!(evaluate("-(x - 8)", &v).unwrap(), 3.0);
    }

    #[test]
    fn test_math_functions() {
        let v = vars(&[("x", 1.0), ("y", 1.0)]);
        let result = evaluate("cos((x + y))", &v).unwrap();
        assert!((result - (-0.4161468365471424)).abs() < 1e-12);

        let v = vars(&[("x", 2.0), ("y", 2.0)]);
        let result = evaluate("cos((x + y))", &v).unwrap();
        assert!((result - (-0.6536436208636119)).abs() < 1e-12);

        assert_eq!(evaluate("sqrt(x)", &vars(&[("x", 16.0)])).unwrap(), 4.0);
        assert_eq!(evaluate("floor(x)", &vars(&[("x", 2.9)])).unwrap(), 2.0);
    }

    #[test]
    fn test_call_argument_is_a_single_expression() {
        // Single and double parentheses agree; the argument is one expression.
        let v = vars(&[("x", 1.0), ("y", 1.0)]);
        let single = evaluate("cos(x + y)", &v).unwrap();
        let double = evaluate("cos((x + y))", &v).unwrap();
        assert_eq!(single, double);
    }

    #[test]
    fn test_formula_reuse() {
        let formula = Formula::parse("x * 2 + y").unwrap();
        assert_eq!(formula.evaluate(&vars(&[("x", 1.0), ("y", 0.0)])).unwrap(), 2.0);
        assert_eq!(formula.evaluate(&vars(&[("x", 3.0), ("y", 1.0)])).unwrap(), 7.0);
        assert_eq!(formula.text(), "x * 2 + y");
    }

    #[test]
    fn test_unknown_variable() {
        let err = evaluate("x + z", &vars(&[("x", 1.0)])).unwrap_err();
        assert!(matches!(err, ClientError::Evaluation(_)));
        assert!(err.to_string().contains("unknown variable 'z'"));
    }

    #[test]
    fn test_unknown_function() {
        let err = evaluate("frob(x)", &vars(&[("x", 1.0)])).unwrap_err();
        assert!(err.to_string().contains("unknown function 'frob'"));
    }

    #[test]
    fn test_division_by_zero() {
        let err = evaluate("x / y", &vars(&[("x", 10.0), ("y", 0.0)])).unwrap_err();
        assert!(matches!(err, ClientError::Evaluation(_)));
        assert!(err.to_string().contains("division by zero"));
    }

    #[test]
    fn test_undefined_function_result() {
        let err = evaluate("sqrt(-x)", &vars(&[("x", 1.0)])).unwrap_err();
        assert!(matches!(err, ClientError::Evaluation(_)));

        let err = evaluate("ln(x)", &vars(&[("x", 0.0)])).unwrap_err();
        assert!(matches!(err, ClientError::Evaluation(_)));
    }

    #[test]
    fn test_syntax_errors() {
        assert!(Formula::parse("").is_err());
        assert!(Formula::parse("x +").is_err());
        assert!(Formula::parse("(x + y").is_err());
        assert!(Formula::parse("x y").is_err());
        assert!(Formula::parse("1.2.3").is_err());
        assert!(Formula::parse("x ? y").is_err());
    }
}

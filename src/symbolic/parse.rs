//! Text to `Expr` parser
//!
//! Grammar (usual precedence, `^` and `**` right associative):
//! ```text
//! sum     := product (('+' | '-') product)*
//! product := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | power
//! power   := primary ('^' unary)?
//! primary := number | ident | ident '(' sum ')' | '(' sum ')'
//! ```

use thiserror::Error;

use super::expr::{Expr, Func};

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    #[error("unexpected character '{ch}' at offset {pos}")]
    UnexpectedChar { ch: char, pos: usize },

    #[error("invalid number literal '{0}'")]
    InvalidNumber(String),

    #[error("unexpected token '{0}'")]
    UnexpectedToken(String),

    #[error("unexpected end of expression")]
    UnexpectedEnd,

    #[error("unknown function '{0}'")]
    UnknownFunction(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("exponent must be a constant")]
    NonConstantExponent,

    #[error("unsupported exponent {0} (integers and halves only)")]
    UnsupportedExponent(f64),
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl Token {
    fn describe(&self) -> String {
        match self {
            Token::Num(v) => v.to_string(),
            Token::Ident(s) => s.clone(),
            Token::Plus => "+".into(),
            Token::Minus => "-".into(),
            Token::Star => "*".into(),
            Token::Slash => "/".into(),
            Token::Caret => "^".into(),
            Token::LParen => "(".into(),
            Token::RParen => ")".into(),
        }
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, ParseError> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < chars.len() {
        let ch = chars[i];
        match ch {
            c if c.is_whitespace() => i += 1,
            '+' => {
                tokens.push(Token::Plus);
                i += 1;
            }
            '-' => {
                tokens.push(Token::Minus);
                i += 1;
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Caret);
                i += 2;
            }
            '*' => {
                tokens.push(Token::Star);
                i += 1;
            }
            '/' => {
                tokens.push(Token::Slash);
                i += 1;
            }
            '^' => {
                tokens.push(Token::Caret);
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            c if c.is_ascii_digit() || c == '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                // optional exponent part, only when digits follow
                if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                    let mut j = i + 1;
                    if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                        j += 1;
                    }
                    if j < chars.len() && chars[j].is_ascii_digit() {
                        while j < chars.len() && chars[j].is_ascii_digit() {
                            j += 1;
                        }
                        i = j;
                    }
                }
                let literal: String = chars[start..i].iter().collect();
                let value = literal
                    .parse::<f64>()
                    .map_err(|_| ParseError::InvalidNumber(literal.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            ch => return Err(ParseError::UnexpectedChar { ch, pos: i }),
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
        let tok = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        tok
    }

    fn expect(&mut self, expected: Token) -> Result<(), ParseError> {
        match self.next() {
            Some(tok) if tok == expected => Ok(()),
            Some(tok) => Err(ParseError::UnexpectedToken(tok.describe())),
            None => Err(ParseError::UnexpectedEnd),
        }
    }

    fn sum(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.product()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.pos += 1;
                    lhs = lhs + self.product()?;
                }
                Some(Token::Minus) => {
                    self.pos += 1;
                    lhs = lhs - self.product()?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn product(&mut self) -> Result<Expr, ParseError> {
        let mut lhs = self.unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.pos += 1;
                    lhs = lhs * self.unary()?;
                }
                Some(Token::Slash) => {
                    self.pos += 1;
                    let rhs = self.unary()?;
                    lhs = lhs.checked_div(&rhs).ok_or(ParseError::DivisionByZero)?;
                }
                _ => return Ok(lhs),
            }
        }
    }

    fn unary(&mut self) -> Result<Expr, ParseError> {
        match self.peek() {
            Some(Token::Minus) => {
                self.pos += 1;
                Ok(-self.unary()?)
            }
            Some(Token::Plus) => {
                self.pos += 1;
                self.unary()
            }
            _ => self.power(),
        }
    }

    fn power(&mut self) -> Result<Expr, ParseError> {
        let base = self.primary()?;
        if self.peek() == Some(&Token::Caret) {
            self.pos += 1;
            let exponent = self.unary()?;
            return apply_power(base, &exponent);
        }
        Ok(base)
    }

    fn primary(&mut self) -> Result<Expr, ParseError> {
        match self.next() {
            Some(Token::Num(v)) => Ok(Expr::num(v)),
            Some(Token::Ident(name)) => {
                if self.peek() == Some(&Token::LParen) {
                    self.pos += 1;
                    let func =
                        Func::from_name(&name).ok_or(ParseError::UnknownFunction(name.clone()))?;
                    let arg = self.sum()?;
                    self.expect(Token::RParen)?;
                    Ok(Expr::apply(func, arg))
                } else {
                    Ok(Expr::sym(&name))
                }
            }
            Some(Token::LParen) => {
                let inner = self.sum()?;
                self.expect(Token::RParen)?;
                Ok(inner)
            }
            Some(tok) => Err(ParseError::UnexpectedToken(tok.describe())),
            None => Err(ParseError::UnexpectedEnd),
        }
    }
}

fn apply_power(base: Expr, exponent: &Expr) -> Result<Expr, ParseError> {
    let k = exponent
        .as_constant()
        .ok_or(ParseError::NonConstantExponent)?;
    if let Some(b) = base.as_constant() {
        if b == 0.0 && k < 0.0 {
            return Err(ParseError::DivisionByZero);
        }
        return Ok(Expr::num(b.powf(k)));
    }
    if k.fract() == 0.0 {
        return Ok(base.powi(k as i32));
    }
    let doubled = 2.0 * k;
    if doubled.fract() == 0.0 {
        return Ok(base.sqrt().powi(doubled as i32));
    }
    Err(ParseError::UnsupportedExponent(k))
}

/// Parse a textual expression
pub fn parse_expr(text: &str) -> Result<Expr, ParseError> {
    let tokens = tokenize(text)?;
    if tokens.is_empty() {
        return Err(ParseError::UnexpectedEnd);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.sum()?;
    match parser.next() {
        None => Ok(expr),
        Some(tok) => Err(ParseError::UnexpectedToken(tok.describe())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symbolic::Symbol;

    #[test]
    fn test_precedence() {
        let e = parse_expr("1 + 2*x^2").unwrap();
        let x = Expr::sym("x");
        assert_eq!(e, Expr::one() + x.powi(2).scale(2.0));

        // unary minus binds looser than power
        let e = parse_expr("-x^2").unwrap();
        assert_eq!(e, -x.powi(2));
    }

    #[test]
    fn test_double_star_power_and_functions() {
        let a = parse_expr("cos(theta)**2 + sin(theta)").unwrap();
        let theta = Expr::sym("theta");
        assert_eq!(a, theta.cos().powi(2) + theta.sin());
    }

    #[test]
    fn test_division_builds_rational() {
        let e = parse_expr("k/(m + x)").unwrap();
        let back = e * parse_expr("m + x").unwrap();
        assert_eq!(back, Expr::sym("k"));
    }

    #[test]
    fn test_half_exponent_is_sqrt() {
        let e = parse_expr("(x^2 + y^2)^0.5").unwrap();
        let expected = parse_expr("sqrt(x^2 + y^2)").unwrap();
        assert_eq!(e, expected);
        assert_eq!(parse_expr("4^0.5").unwrap(), Expr::num(2.0));
    }

    #[test]
    fn test_scientific_literals() {
        let e = parse_expr("1.5e-3*x").unwrap();
        let mut values = std::collections::BTreeMap::new();
        values.insert(Symbol::new("x"), 2.0);
        approx::assert_relative_eq!(e.eval(&values).unwrap(), 3.0e-3);
    }

    #[test]
    fn test_errors() {
        assert_eq!(parse_expr("x +"), Err(ParseError::UnexpectedEnd));
        assert_eq!(parse_expr("1/0"), Err(ParseError::DivisionByZero));
        assert_eq!(
            parse_expr("foo(x)"),
            Err(ParseError::UnknownFunction("foo".into()))
        );
        assert_eq!(parse_expr("x^y"), Err(ParseError::NonConstantExponent));
        assert!(matches!(
            parse_expr("x $ y"),
            Err(ParseError::UnexpectedChar { ch: '$', .. })
        ));
        assert_eq!(parse_expr("(x"), Err(ParseError::UnexpectedEnd));
        assert_eq!(parse_expr("x y"), Err(ParseError::UnexpectedToken("y".into())));
    }
}

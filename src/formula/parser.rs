//! Recursive-descent parser producing a typed formula AST
//!
//! Grammar:
//!
//! ```text
//! expr    := term (('+' | '-') term)*
//! term    := unary (('*' | '/') unary)*
//! unary   := ('-' | '+') unary | primary
//! primary := NUMBER | PLACEHOLDER | IDENT | IDENT '(' args ')' | '(' expr ')'
//! args    := expr (',' expr)*
//! ```

use super::lexer::{Spanned, Token};
use super::FormulaError;

/// Maximum nesting of parentheses, unary operators and calls
pub const MAX_DEPTH: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// Whitelisted helper functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    Ceil,
    Floor,
    Round,
    Abs,
    Max,
    Min,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        match name {
            "ceil" => Some(Function::Ceil),
            "floor" => Some(Function::Floor),
            "round" => Some(Function::Round),
            "abs" => Some(Function::Abs),
            "max" => Some(Function::Max),
            "min" => Some(Function::Min),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Ceil => "ceil",
            Function::Floor => "floor",
            Function::Round => "round",
            Function::Abs => "abs",
            Function::Max => "max",
            Function::Min => "min",
        }
    }

    pub(crate) fn check_arity(&self, found: usize) -> Result<(), FormulaError> {
        let ok = match self {
            Function::Ceil | Function::Floor | Function::Round | Function::Abs => found == 1,
            Function::Max | Function::Min => found >= 1,
        };
        if ok {
            Ok(())
        } else {
            Err(FormulaError::Arity {
                function: self.name().to_string(),
                found,
            })
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// `{{ measure.name }}`; resolves to 0 when the name is absent
    Placeholder(String),
    /// Bare identifier; must be present in the context
    Variable(String),
    Negate(Box<Expr>),
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    Call {
        function: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    /// Names referenced by placeholders or bare identifiers
    pub fn collect_names(&self, out: &mut Vec<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Placeholder(name) | Expr::Variable(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Negate(inner) => inner.collect_names(out),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.collect_names(out);
                rhs.collect_names(out);
            }
            Expr::Call { args, .. } => args.iter().for_each(|arg| arg.collect_names(out)),
        }
    }
}

pub fn parse_tokens(tokens: &[Spanned]) -> Result<Expr, FormulaError> {
    if tokens.is_empty() {
        return Err(FormulaError::Empty);
    }

    let mut parser = Parser {
        tokens,
        pos: 0,
        depth: 0,
    };
    let expr = parser.expr()?;

    match parser.peek() {
        None => Ok(expr),
        Some(spanned) => Err(FormulaError::UnexpectedToken {
            found: spanned.token.describe(),
            position: spanned.position,
        }),
    }
}

struct Parser<'a> {
    tokens: &'a [Spanned],
    pos: usize,
    depth: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&'a Spanned> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&'a Spanned> {
        let token = self.tokens.get(self.pos);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn eat(&mut self, expected: &Token) -> bool {
        match self.peek() {
            Some(spanned) if &spanned.token == expected => {
                self.pos += 1;
                true
            }
            _ => false,
        }
    }

    fn expect(&mut self, expected: Token) -> Result<(), FormulaError> {
        match self.next() {
            Some(spanned) if spanned.token == expected => Ok(()),
            Some(spanned) => Err(FormulaError::UnexpectedToken {
                found: spanned.token.describe(),
                position: spanned.position,
            }),
            None => Err(FormulaError::UnexpectedEnd),
        }
    }

    fn descend(&mut self) -> Result<(), FormulaError> {
        self.depth += 1;
        if self.depth > MAX_DEPTH {
            return Err(FormulaError::TooDeep(MAX_DEPTH));
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.term()?;
        loop {
            let op = if self.eat(&Token::Plus) {
                BinaryOp::Add
            } else if self.eat(&Token::Minus) {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.term()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Expr, FormulaError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat(&Token::Star) {
                BinaryOp::Mul
            } else if self.eat(&Token::Slash) {
                BinaryOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, FormulaError> {
        if self.eat(&Token::Minus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(Expr::Negate(Box::new(inner)));
        }
        if self.eat(&Token::Plus) {
            self.descend()?;
            let inner = self.unary()?;
            self.depth -= 1;
            return Ok(inner);
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, FormulaError> {
        let spanned = self.next().ok_or(FormulaError::UnexpectedEnd)?;

        match &spanned.token {
            Token::Number(value) => Ok(Expr::Number(*value)),
            Token::Placeholder(name) => Ok(Expr::Placeholder(name.clone())),
            Token::Ident(name) => {
                if !self.eat(&Token::LParen) {
                    return Ok(Expr::Variable(name.clone()));
                }

                let function = Function::lookup(name)
                    .ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;

                self.descend()?;
                let mut args = Vec::new();
                if !self.eat(&Token::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Token::Comma) {
                            continue;
                        }
                        self.expect(Token::RParen)?;
                        break;
                    }
                }
                self.depth -= 1;

                function.check_arity(args.len())?;
                Ok(Expr::Call { function, args })
            }
            Token::LParen => {
                self.descend()?;
                let inner = self.expr()?;
                self.expect(Token::RParen)?;
                self.depth -= 1;
                Ok(inner)
            }
            other => Err(FormulaError::UnexpectedToken {
                found: other.describe(),
                position: spanned.position,
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::lexer::tokenize;

    fn parse(source: &str) -> Result<Expr, FormulaError> {
        parse_tokens(&tokenize(source)?)
    }

    #[test]
    fn test_precedence() {
        let expr = parse("1 + 2 * 3").unwrap();
        assert_eq!(
            expr,
            Expr::Binary {
                op: BinaryOp::Add,
                lhs: Box::new(Expr::Number(1.0)),
                rhs: Box::new(Expr::Binary {
                    op: BinaryOp::Mul,
                    lhs: Box::new(Expr::Number(2.0)),
                    rhs: Box::new(Expr::Number(3.0)),
                }),
            }
        );
    }

    #[test]
    fn test_function_call() {
        let expr = parse("max(ridge_lf, 1)").unwrap();
        assert_eq!(
            expr,
            Expr::Call {
                function: Function::Max,
                args: vec![Expr::Variable("ridge_lf".to_string()), Expr::Number(1.0)],
            }
        );
    }

    #[test]
    fn test_syntax_errors() {
        assert_eq!(parse(""), Err(FormulaError::Empty));
        assert_eq!(parse("1 +"), Err(FormulaError::UnexpectedEnd));
        assert_eq!(parse("(1 + 2"), Err(FormulaError::UnexpectedEnd));
        assert!(matches!(
            parse("1 2"),
            Err(FormulaError::UnexpectedToken { position: 2, .. })
        ));
        assert_eq!(
            parse("eval(1)"),
            Err(FormulaError::UnknownFunction("eval".to_string()))
        );
        assert_eq!(
            parse("ceil(1, 2)"),
            Err(FormulaError::Arity {
                function: "ceil".to_string(),
                found: 2,
            })
        );
    }

    #[test]
    fn test_depth_limit() {
        let deep = format!("{}1{}", "(".repeat(MAX_DEPTH + 1), ")".repeat(MAX_DEPTH + 1));
        assert_eq!(parse(&deep), Err(FormulaError::TooDeep(MAX_DEPTH)));

        let ok = format!("{}1{}", "(".repeat(8), ")".repeat(8));
        assert_eq!(parse(&ok), Ok(Expr::Number(1.0)));
    }

    #[test]
    fn test_collect_names() {
        let expr = parse("{{ measure.ridge_lf }} + hip_lf + {{ measure.ridge_lf }}").unwrap();
        let mut names = Vec::new();
        expr.collect_names(&mut names);
        assert_eq!(names, vec!["ridge_lf".to_string(), "hip_lf".to_string()]);
    }
}

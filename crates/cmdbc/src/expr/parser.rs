//! Expression parser (§4.5 "Parse" phase).
//!
//! Builds a tagged-union AST directly via precedence climbing, rather than
//! the source implementation's parallel `OpNode` index array — both are
//! "acceptable" per the arena-vs-enum design note (§9); a plain recursive
//! enum is the idiomatic Rust shape for an operator tree ("tagged unions"
//! guidance, §9) and this crate has no need for the C implementation's
//! growable-array-of-indices trick once ownership is just `Box`.

use super::lexer::{Lexeme, Lexer};
use crate::error::{CompileError, CompileResult};

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(String),
    Variable { name: String, subscript: Option<Box<Expr>> },
    CommandSubst(String),
    QuotedString(String),
    FuncCall { name: String, args: Vec<Expr> },
    Unary(UnOp, Box<Expr>),
    Binary(BinOp, Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Ternary(Box<Expr>, Box<Expr>, Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnOp {
    Neg,
    Plus,
    Not,
    BitNot,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    StrEq,
    StrNe,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    In,
    NotIn,
}

/// Binding power (precedence) of each binary operator; higher binds
/// tighter. `**` is the one right-associative operator (§4.5).
fn precedence(op: &str) -> Option<(u8, bool)> {
    Some(match op {
        "||" => (1, false),
        "&&" => (2, false),
        "|" => (3, false),
        "^" => (4, false),
        "&" => (5, false),
        "==" | "!=" | "eq" | "ne" => (6, false),
        "<" | ">" | "<=" | ">=" | "in" | "notin" => (7, false),
        "<<" | ">>" => (8, false),
        "+" | "-" => (9, false),
        "*" | "/" | "%" => (10, false),
        "**" => (12, true),
        _ => return None,
    })
}

fn binop_for(op: &str) -> BinOp {
    match op {
        "+" => BinOp::Add,
        "-" => BinOp::Sub,
        "*" => BinOp::Mul,
        "/" => BinOp::Div,
        "%" => BinOp::Mod,
        "**" => BinOp::Pow,
        "==" => BinOp::Eq,
        "!=" => BinOp::Ne,
        "<" => BinOp::Lt,
        "<=" => BinOp::Le,
        ">" => BinOp::Gt,
        ">=" => BinOp::Ge,
        "eq" => BinOp::StrEq,
        "ne" => BinOp::StrNe,
        "&" => BinOp::BitAnd,
        "|" => BinOp::BitOr,
        "^" => BinOp::BitXor,
        "<<" => BinOp::Shl,
        ">>" => BinOp::Shr,
        "in" => BinOp::In,
        "notin" => BinOp::NotIn,
        other => unreachable!("precedence() admitted unknown operator {other}"),
    }
}

pub struct Parser<'a> {
    lex: Lexer<'a>,
    current: Lexeme,
}

impl<'a> Parser<'a> {
    pub fn new(src: &'a str) -> CompileResult<Self> {
        let mut lex = Lexer::new(src);
        let current = lex.next()?;
        Ok(Self { lex, current })
    }

    fn bump(&mut self) -> CompileResult<Lexeme> {
        let next = self.lex.next()?;
        Ok(std::mem::replace(&mut self.current, next))
    }

    pub fn parse(&mut self) -> CompileResult<Expr> {
        if self.current == Lexeme::End {
            return Err(CompileError::syntax("empty subexpression"));
        }
        let e = self.parse_ternary(0)?;
        if self.current != Lexeme::End {
            return Err(CompileError::syntax("trailing tokens after expression"));
        }
        Ok(e)
    }

    fn parse_ternary(&mut self, min_bp: u8) -> CompileResult<Expr> {
        let mut lhs = self.parse_unary()?;
        loop {
            match &self.current {
                Lexeme::Operator(op) => {
                    let Some((bp, right_assoc)) = precedence(op) else { break };
                    if bp < min_bp {
                        break;
                    }
                    let op = op.clone();
                    self.bump()?;
                    let next_min = if right_assoc { bp } else { bp + 1 };
                    let rhs = self.parse_ternary(next_min)?;
                    lhs = match op.as_str() {
                        "&&" => Expr::And(Box::new(lhs), Box::new(rhs)),
                        "||" => Expr::Or(Box::new(lhs), Box::new(rhs)),
                        _ => Expr::Binary(binop_for(&op), Box::new(lhs), Box::new(rhs)),
                    };
                }
                Lexeme::Question if min_bp <= 1 => {
                    self.bump()?;
                    let then_branch = self.parse_ternary(0)?;
                    if self.current != Lexeme::Colon {
                        return Err(CompileError::syntax("expected ':' in ?: expression"));
                    }
                    self.bump()?;
                    let else_branch = self.parse_ternary(0)?;
                    lhs = Expr::Ternary(Box::new(lhs), Box::new(then_branch), Box::new(else_branch));
                }
                _ => break,
            }
        }
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> CompileResult<Expr> {
        if let Lexeme::Operator(op) = &self.current {
            let unop = match op.as_str() {
                "-" => Some(UnOp::Neg),
                "+" => Some(UnOp::Plus),
                "!" => Some(UnOp::Not),
                "~" => Some(UnOp::BitNot),
                _ => None,
            };
            if let Some(unop) = unop {
                self.bump()?;
                let operand = self.parse_unary()?;
                return Ok(Expr::Unary(unop, Box::new(operand)));
            }
        }
        self.parse_postfix()
    }

    fn parse_postfix(&mut self) -> CompileResult<Expr> {
        let primary = self.parse_primary()?;
        Ok(primary)
    }

    fn parse_primary(&mut self) -> CompileResult<Expr> {
        match self.bump()? {
            Lexeme::Number(n) => Ok(Expr::Literal(n)),
            Lexeme::QuotedString(s) => Ok(Expr::QuotedString(s)),
            Lexeme::CommandSubst(s) => Ok(Expr::CommandSubst(s)),
            Lexeme::Variable { name, subscript } => {
                let subscript = subscript.map(|s| Parser::new(&s).and_then(|mut p| p.parse())).transpose()?;
                Ok(Expr::Variable { name, subscript: subscript.map(Box::new) })
            }
            Lexeme::LParen => {
                let inner = self.parse_ternary(0)?;
                if self.current != Lexeme::RParen {
                    return Err(CompileError::syntax("unbalanced ( in expression"));
                }
                self.bump()?;
                Ok(inner)
            }
            Lexeme::Bareword(name) => {
                if self.current == Lexeme::LParen {
                    self.bump()?;
                    let mut args = Vec::new();
                    if self.current != Lexeme::RParen {
                        loop {
                            args.push(self.parse_ternary(0)?);
                            if self.current == Lexeme::Comma {
                                self.bump()?;
                                continue;
                            }
                            break;
                        }
                    }
                    if self.current != Lexeme::RParen {
                        return Err(CompileError::syntax("expected ')' closing function call"));
                    }
                    self.bump()?;
                    Ok(Expr::FuncCall { name, args })
                } else {
                    Ok(Expr::Literal(name))
                }
            }
            other => Err(CompileError::syntax(format!("unexpected token in expression: {other:?}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(src: &str) -> Expr {
        Parser::new(src).unwrap().parse().unwrap()
    }

    #[test]
    fn parses_comparison() {
        let e = parse("$i < 10");
        assert_eq!(
            e,
            Expr::Binary(
                BinOp::Lt,
                Box::new(Expr::Variable { name: "i".into(), subscript: None }),
                Box::new(Expr::Literal("10".into())),
            )
        );
    }

    #[test]
    fn and_binds_looser_than_comparison() {
        let e = parse("$a < 1 && $b > 2");
        match e {
            Expr::And(lhs, rhs) => {
                assert!(matches!(*lhs, Expr::Binary(BinOp::Lt, _, _)));
                assert!(matches!(*rhs, Expr::Binary(BinOp::Gt, _, _)));
            }
            other => panic!("expected And, got {other:?}"),
        }
    }

    #[test]
    fn pow_is_right_associative() {
        let e = parse("2 ** 3 ** 2");
        match e {
            Expr::Binary(BinOp::Pow, lhs, rhs) => {
                assert_eq!(*lhs, Expr::Literal("2".into()));
                assert!(matches!(*rhs, Expr::Binary(BinOp::Pow, _, _)));
            }
            other => panic!("expected Pow, got {other:?}"),
        }
    }

    #[test]
    fn ternary_parses() {
        let e = parse("$a ? 1 : 2");
        assert!(matches!(e, Expr::Ternary(..)));
    }

    #[test]
    fn function_call_parses_args() {
        let e = parse("max(1, 2)");
        match e {
            Expr::FuncCall { name, args } => {
                assert_eq!(name, "max");
                assert_eq!(args.len(), 2);
            }
            other => panic!("expected FuncCall, got {other:?}"),
        }
    }
}

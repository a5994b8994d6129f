//! Binding-power parser for path expressions.
//!
//! Precedence, loosest to tightest: `,` multi, `||`, `&&`, comparisons,
//! additive, multiplicative, path chaining. Chains are left-associative;
//! `*` and `/` act as arithmetic only in scalar-expression context (inside
//! predicate brackets), where path atoms cannot absorb them.

use super::lexer::{Lexed, PathToken};
use super::{ArithOp, CmpOp, NodeFilter, PathExpr};
use crate::YpathError;

/// Returns (left_bp, right_bp) for infix operators. Left < right means
/// left-associative.
fn infix_binding_power(token: &PathToken, expr_mode: bool) -> Option<(u8, u8)> {
    match token {
        PathToken::Comma => Some((1, 2)),
        PathToken::OrOr => Some((3, 4)),
        PathToken::AndAnd => Some((5, 6)),
        PathToken::EqEq
        | PathToken::Neq
        | PathToken::Lt
        | PathToken::Gt
        | PathToken::Le
        | PathToken::Ge => Some((7, 8)),
        PathToken::Plus | PathToken::Minus if expr_mode => Some((9, 10)),
        PathToken::Star | PathToken::Slash if expr_mode => Some((11, 12)),
        _ => None,
    }
}

struct ExprParser<'t> {
    tokens: &'t [Lexed],
    pos: usize,
    end_offset: usize,
}

pub(crate) fn parse(tokens: &[Lexed], end_offset: usize) -> Result<PathExpr, YpathError> {
    let mut parser = ExprParser {
        tokens,
        pos: 0,
        end_offset,
    };
    let expr = parser.expr_bp(0, false)?;
    if parser.pos != tokens.len() {
        return parser.syntax("trailing input after expression");
    }
    Ok(expr)
}

impl<'t> ExprParser<'t> {
    fn peek(&self) -> Option<&'t PathToken> {
        self.tokens.get(self.pos).map(|l| &l.token)
    }

    fn peek_at(&self, ahead: usize) -> Option<&'t PathToken> {
        self.tokens.get(self.pos + ahead).map(|l| &l.token)
    }

    fn bump(&mut self) -> Option<&'t PathToken> {
        let token = self.tokens.get(self.pos).map(|l| &l.token);
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.pos)
            .map_or(self.end_offset, |l| l.offset)
    }

    fn syntax<T>(&self, problem: &'static str) -> Result<T, YpathError> {
        Err(YpathError::Syntax {
            problem,
            offset: self.offset(),
        })
    }

    fn expect(&mut self, token: &PathToken, problem: &'static str) -> Result<(), YpathError> {
        if self.peek() == Some(token) {
            self.pos += 1;
            Ok(())
        } else {
            self.syntax(problem)
        }
    }

    /// The core binding-power loop.
    fn expr_bp(&mut self, min_bp: u8, expr_mode: bool) -> Result<PathExpr, YpathError> {
        let mut lhs = self.primary(expr_mode)?;

        loop {
            let Some(op) = self.peek() else {
                break;
            };
            let Some((left_bp, right_bp)) = infix_binding_power(op, expr_mode) else {
                break;
            };
            if left_bp < min_bp {
                break;
            }
            let op = self.bump().expect("operator token").clone();
            // Comparison and arithmetic operands read as scalar
            // expressions, so a bare integer is a literal rather than a
            // sequence index.
            let rhs_mode = match op {
                PathToken::Comma | PathToken::OrOr | PathToken::AndAnd => expr_mode,
                _ => true,
            };
            let rhs = self.expr_bp(right_bp, rhs_mode)?;
            lhs = match op {
                PathToken::Comma => match lhs {
                    PathExpr::Multi(mut items) => {
                        items.push(rhs);
                        PathExpr::Multi(items)
                    }
                    other => PathExpr::Multi(vec![other, rhs]),
                },
                PathToken::OrOr => PathExpr::Or(Box::new(lhs), Box::new(rhs)),
                PathToken::AndAnd => PathExpr::And(Box::new(lhs), Box::new(rhs)),
                PathToken::EqEq => PathExpr::Cmp(CmpOp::Eq, Box::new(lhs), Box::new(rhs)),
                PathToken::Neq => PathExpr::Cmp(CmpOp::Neq, Box::new(lhs), Box::new(rhs)),
                PathToken::Lt => PathExpr::Cmp(CmpOp::Lt, Box::new(lhs), Box::new(rhs)),
                PathToken::Gt => PathExpr::Cmp(CmpOp::Gt, Box::new(lhs), Box::new(rhs)),
                PathToken::Le => PathExpr::Cmp(CmpOp::Lte, Box::new(lhs), Box::new(rhs)),
                PathToken::Ge => PathExpr::Cmp(CmpOp::Gte, Box::new(lhs), Box::new(rhs)),
                PathToken::Plus => PathExpr::Arith(ArithOp::Add, Box::new(lhs), Box::new(rhs)),
                PathToken::Minus => PathExpr::Arith(ArithOp::Sub, Box::new(lhs), Box::new(rhs)),
                PathToken::Star => PathExpr::Arith(ArithOp::Mul, Box::new(lhs), Box::new(rhs)),
                PathToken::Slash => PathExpr::Arith(ArithOp::Div, Box::new(lhs), Box::new(rhs)),
                _ => unreachable!("not an operator"),
            };
        }

        Ok(lhs)
    }

    fn primary(&mut self, expr_mode: bool) -> Result<PathExpr, YpathError> {
        match self.peek() {
            None => self.syntax("empty path expression"),
            Some(PathToken::LParen) => {
                self.pos += 1;
                let inner = self.expr_bp(0, expr_mode)?;
                self.expect(&PathToken::RParen, "expected ')'")?;
                Ok(inner)
            }
            Some(PathToken::Number(value)) => {
                let value = *value;
                self.pos += 1;
                Ok(PathExpr::Number(value))
            }
            Some(PathToken::Str(text)) => {
                let text = text.clone();
                self.pos += 1;
                Ok(PathExpr::Str(text))
            }
            Some(PathToken::Int(_)) if expr_mode => {
                let Some(PathToken::Int(value)) = self.bump() else {
                    unreachable!()
                };
                Ok(PathExpr::Number(*value as f64))
            }
            Some(PathToken::Minus) if expr_mode => {
                self.pos += 1;
                let inner = self.primary(expr_mode)?;
                Ok(PathExpr::Arith(
                    ArithOp::Sub,
                    Box::new(PathExpr::Number(0.0)),
                    Box::new(inner),
                ))
            }
            Some(_) => self.chain(expr_mode),
        }
    }

    /// Parse a chain of path steps.
    fn chain(&mut self, expr_mode: bool) -> Result<PathExpr, YpathError> {
        let mut steps: Vec<PathExpr> = Vec::new();

        if self.peek() == Some(&PathToken::Slash) {
            self.pos += 1;
            steps.push(PathExpr::Root);
        }

        loop {
            match self.peek() {
                Some(PathToken::Slash) => {
                    // A separator between steps; in expression mode a slash
                    // after a complete chain is division instead.
                    if expr_mode && !matches!(self.peek_at(1), Some(step) if is_step_start(step)) {
                        break;
                    }
                    self.pos += 1;
                }
                Some(PathToken::Dot) => {
                    self.pos += 1;
                    steps.push(PathExpr::This);
                }
                Some(PathToken::DotDot) => {
                    self.pos += 1;
                    steps.push(PathExpr::Parent);
                }
                Some(PathToken::Star) => {
                    if expr_mode && !steps.is_empty() {
                        break;
                    }
                    self.pos += 1;
                    steps.push(PathExpr::EveryChild);
                }
                Some(PathToken::DoubleStar) => {
                    self.pos += 1;
                    steps.push(PathExpr::EveryChildRecursive);
                }
                Some(PathToken::Alias(name)) => {
                    let name = name.clone();
                    self.pos += 1;
                    steps.push(PathExpr::Alias(name));
                }
                Some(PathToken::Key(key)) => {
                    let key = key.clone();
                    self.pos += 1;
                    steps.push(PathExpr::MapKey(key));
                }
                Some(PathToken::Int(index)) => {
                    let index = *index;
                    self.pos += 1;
                    steps.push(PathExpr::SeqIndex(index));
                }
                Some(PathToken::LBracket) => {
                    self.pos += 1;
                    steps.push(self.bracket()?);
                }
                _ => break,
            }
        }

        if steps.is_empty() {
            return self.syntax("expected a path step");
        }
        if steps.len() == 1 {
            Ok(steps.pop().expect("one step"))
        } else {
            Ok(PathExpr::Chain(steps))
        }
    }

    /// The inside of `[` `]`: a filter keyword, an index, a slice, or a
    /// scalar expression acting as a gate.
    fn bracket(&mut self) -> Result<PathExpr, YpathError> {
        // Filter keywords.
        if let Some(PathToken::Key(word)) = self.peek() {
            if self.peek_at(1) == Some(&PathToken::RBracket) {
                let filter = match word.as_str() {
                    "scalar" => Some(NodeFilter::Scalar),
                    "collection" => Some(NodeFilter::Collection),
                    "seq" | "sequence" => Some(NodeFilter::Sequence),
                    "map" | "mapping" => Some(NodeFilter::Mapping),
                    "unique" => Some(NodeFilter::Unique),
                    _ => None,
                };
                if let Some(filter) = filter {
                    self.pos += 2;
                    return Ok(PathExpr::Filter(filter));
                }
            }
        }
        // Indices and slices.
        if let Some(PathToken::Int(index)) = self.peek() {
            let index = *index;
            if self.peek_at(1) == Some(&PathToken::RBracket) {
                self.pos += 2;
                return Ok(PathExpr::SeqIndex(index));
            }
            if self.peek_at(1) == Some(&PathToken::Colon) {
                if let Some(PathToken::Int(end)) = self.peek_at(2) {
                    let end = *end;
                    if self.peek_at(3) == Some(&PathToken::RBracket) {
                        self.pos += 4;
                        return Ok(PathExpr::SeqSlice(index, end));
                    }
                }
                return self.syntax("expected an integer slice bound");
            }
        }
        // Anything else is a scalar expression gating the current nodes.
        let inner = self.expr_bp(0, true)?;
        self.expect(&PathToken::RBracket, "expected ']'")?;
        Ok(inner)
    }
}

fn is_step_start(token: &PathToken) -> bool {
    matches!(
        token,
        PathToken::Key(_)
            | PathToken::Int(_)
            | PathToken::Star
            | PathToken::DoubleStar
            | PathToken::Dot
            | PathToken::DotDot
            | PathToken::Alias(_)
    )
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::super::lexer::lex;
    use super::*;

    fn parse_text(text: &str) -> PathExpr {
        parse(&lex(text).unwrap(), text.len()).unwrap()
    }

    #[test]
    fn simple_chain() {
        assert_eq!(
            parse_text("/users/0/name"),
            PathExpr::Chain(vec![
                PathExpr::Root,
                PathExpr::MapKey("users".into()),
                PathExpr::SeqIndex(0),
                PathExpr::MapKey("name".into()),
            ])
        );
    }

    #[test]
    fn star_chain() {
        assert_eq!(
            parse_text("/users/*/name"),
            PathExpr::Chain(vec![
                PathExpr::Root,
                PathExpr::MapKey("users".into()),
                PathExpr::EveryChild,
                PathExpr::MapKey("name".into()),
            ])
        );
    }

    #[test]
    fn lone_alias() {
        assert_eq!(parse_text("*a"), PathExpr::Alias("a".into()));
    }

    #[test]
    fn filters_and_slices() {
        assert_eq!(
            parse_text("/items/[seq]/[1:3]"),
            PathExpr::Chain(vec![
                PathExpr::Root,
                PathExpr::MapKey("items".into()),
                PathExpr::Filter(NodeFilter::Sequence),
                PathExpr::SeqSlice(1, 3),
            ])
        );
        assert_eq!(
            parse_text("**/[scalar]/[unique]"),
            PathExpr::Chain(vec![
                PathExpr::EveryChildRecursive,
                PathExpr::Filter(NodeFilter::Scalar),
                PathExpr::Filter(NodeFilter::Unique),
            ])
        );
    }

    #[test]
    fn multi_unions_in_order() {
        assert_eq!(
            parse_text("/a, /b, /c"),
            PathExpr::Multi(vec![
                PathExpr::Chain(vec![PathExpr::Root, PathExpr::MapKey("a".into())]),
                PathExpr::Chain(vec![PathExpr::Root, PathExpr::MapKey("b".into())]),
                PathExpr::Chain(vec![PathExpr::Root, PathExpr::MapKey("c".into())]),
            ])
        );
    }

    #[test]
    fn logical_precedence() {
        // `,` binds loosest, then `||`, then `&&`.
        let expr = parse_text("/a && /b || /c");
        assert_eq!(
            expr,
            PathExpr::Or(
                Box::new(PathExpr::And(
                    Box::new(PathExpr::Chain(vec![
                        PathExpr::Root,
                        PathExpr::MapKey("a".into())
                    ])),
                    Box::new(PathExpr::Chain(vec![
                        PathExpr::Root,
                        PathExpr::MapKey("b".into())
                    ])),
                )),
                Box::new(PathExpr::Chain(vec![
                    PathExpr::Root,
                    PathExpr::MapKey("c".into())
                ])),
            )
        );
    }

    #[test]
    fn arithmetic_binds_tighter_than_comparison() {
        let expr = parse_text("[. > 1 + 2 * 3]");
        let PathExpr::Cmp(CmpOp::Gt, lhs, rhs) = expr else {
            panic!("expected comparison at the top");
        };
        assert_eq!(*lhs, PathExpr::This);
        assert_eq!(
            *rhs,
            PathExpr::Arith(
                ArithOp::Add,
                Box::new(PathExpr::Number(1.0)),
                Box::new(PathExpr::Arith(
                    ArithOp::Mul,
                    Box::new(PathExpr::Number(2.0)),
                    Box::new(PathExpr::Number(3.0)),
                )),
            )
        );
    }

    #[test]
    fn trailing_garbage_is_rejected() {
        assert!(matches!(
            parse(&lex("/a )").unwrap(), 4),
            Err(YpathError::Syntax { .. })
        ));
    }
}

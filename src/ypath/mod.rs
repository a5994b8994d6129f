//! ypath: a small path/query language over YAML documents.
//!
//! Expressions navigate from a node (`/users/0/name`), fan out over
//! children (`/users/*/name`, `**`), prune by kind (`[scalar]`, `[map]`,
//! `[unique]`), slice sequences (`[1:3]`), follow anchors (`*base`), union
//! results (`,`) and gate on comparisons (`[. > 3]`). Scalar arithmetic is
//! available inside predicate brackets.

mod exec;
mod lexer;
mod parser;

pub use exec::WalkResult;

use crate::{Document, NodeId, YpathError};

/// The node-kind filters.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum NodeFilter {
    Scalar,
    Collection,
    Sequence,
    Mapping,
    /// Deduplicate by node identity.
    Unique,
}

/// Comparison operators.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum CmpOp {
    Eq,
    Neq,
    Lt,
    Gt,
    Lte,
    Gte,
}

/// Arithmetic operators (scalar-expression mode).
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

/// A compiled path expression tree.
#[derive(Clone, Debug, PartialEq)]
pub enum PathExpr {
    /// `/` at the start of a chain: the document root.
    Root,
    /// `.`
    This,
    /// `..`
    Parent,
    /// A mapping key step.
    MapKey(String),
    /// A sequence index step; negative counts from the end.
    SeqIndex(i64),
    /// A sequence slice step, half-open.
    SeqSlice(i64, i64),
    /// `*name`: the node bound to an anchor.
    Alias(String),
    /// `*`: every child.
    EveryChild,
    /// `**`: the node itself and every descendant.
    EveryChildRecursive,
    /// A kind filter.
    Filter(NodeFilter),
    /// Steps applied left to right.
    Chain(Vec<PathExpr>),
    /// `,`: results unioned in declaration order.
    Multi(Vec<PathExpr>),
    /// `||`: the first non-empty operand.
    Or(Box<PathExpr>, Box<PathExpr>),
    /// `&&`: the last operand when all are non-empty.
    And(Box<PathExpr>, Box<PathExpr>),
    /// A comparison gate: the left operand's result when it holds.
    Cmp(CmpOp, Box<PathExpr>, Box<PathExpr>),
    /// Scalar arithmetic.
    Arith(ArithOp, Box<PathExpr>, Box<PathExpr>),
    /// A number literal.
    Number(f64),
    /// A string literal.
    Str(String),
}

/// A compiled ypath query.
///
/// Compile once, execute any number of times; execution never mutates the
/// document, so repeated runs over an unchanged tree give identical
/// results.
#[derive(Clone, Debug)]
pub struct Ypath {
    text: String,
    expr: PathExpr,
}

impl Ypath {
    /// Compile a path expression.
    pub fn compile(text: &str) -> Result<Ypath, YpathError> {
        let tokens = lexer::lex(text)?;
        let expr = parser::parse(&tokens, text.len())?;
        Ok(Ypath {
            text: String::from(text),
            expr,
        })
    }

    /// The compiled expression tree.
    pub fn expr(&self) -> &PathExpr {
        &self.expr
    }

    /// Execute from the document root, producing a raw walk result.
    pub fn execute(&self, doc: &Document) -> Result<WalkResult, YpathError> {
        let start: Vec<NodeId> = doc.root_id().into_iter().collect();
        exec::eval(doc, &self.expr, &WalkResult::Nodes(start))
    }

    /// Execute from an arbitrary starting node.
    pub fn execute_from(&self, doc: &Document, start: NodeId) -> Result<WalkResult, YpathError> {
        exec::eval(doc, &self.expr, &WalkResult::Nodes(vec![start]))
    }

    /// Execute from the root and return matching node ids.
    ///
    /// Fails if the expression yields a scalar rather than nodes.
    pub fn query(&self, doc: &Document) -> Result<Vec<NodeId>, YpathError> {
        match self.execute(doc)? {
            WalkResult::Nodes(ids) => Ok(ids),
            WalkResult::Number(_) | WalkResult::Str(_) => Err(YpathError::Type {
                problem: "expression yields a scalar, not nodes",
            }),
        }
    }
}

impl std::fmt::Display for Ypath {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.text)
    }
}

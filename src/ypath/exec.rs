//! Post-order evaluation of compiled path expressions.

use std::collections::HashSet;

use super::{ArithOp, CmpOp, NodeFilter, PathExpr};
use crate::{schema, Document, NodeData, NodeId, YpathError};

/// The value of a (sub)expression: a node set or a computed scalar.
#[derive(Clone, Debug, PartialEq)]
pub enum WalkResult {
    /// Selected nodes, in document order.
    Nodes(Vec<NodeId>),
    /// A computed number.
    Number(f64),
    /// A computed string.
    Str(String),
}

impl WalkResult {
    /// The empty node set is the only "false" walk result.
    pub fn is_empty(&self) -> bool {
        matches!(self, WalkResult::Nodes(ids) if ids.is_empty())
    }
}

fn input_nodes<'a>(input: &'a WalkResult) -> Result<&'a [NodeId], YpathError> {
    match input {
        WalkResult::Nodes(ids) => Ok(ids),
        _ => Err(YpathError::Type {
            problem: "navigation requires a node set",
        }),
    }
}

fn children_of(doc: &Document, id: NodeId) -> Vec<NodeId> {
    match doc.get_node(id).map(|node| &node.data) {
        Some(NodeData::Sequence { items, .. }) => items.clone(),
        Some(NodeData::Mapping { pairs, .. }) => pairs.iter().map(|pair| pair.value).collect(),
        _ => Vec::new(),
    }
}

/// The node itself and all of its descendants, document order, without
/// recursion.
fn descendants_of(doc: &Document, id: NodeId) -> Vec<NodeId> {
    let mut out = Vec::new();
    let mut stack = vec![id];
    let mut seen = HashSet::new();
    while let Some(id) = stack.pop() {
        if !seen.insert(id) {
            continue;
        }
        out.push(id);
        let mut children = children_of(doc, id);
        children.reverse();
        stack.extend(children);
    }
    out
}

pub(crate) fn eval(
    doc: &Document,
    expr: &PathExpr,
    input: &WalkResult,
) -> Result<WalkResult, YpathError> {
    match expr {
        PathExpr::Root => Ok(WalkResult::Nodes(doc.root_id().into_iter().collect())),
        PathExpr::This => Ok(input.clone()),
        PathExpr::Parent => {
            let mut out = Vec::new();
            let mut seen = HashSet::new();
            for &id in input_nodes(input)? {
                if let Some(parent) = doc.get_node(id).and_then(|node| node.parent) {
                    if seen.insert(parent) {
                        out.push(parent);
                    }
                }
            }
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::MapKey(key) => {
            let mut out = Vec::new();
            for &id in input_nodes(input)? {
                if let Some(NodeData::Mapping { pairs, .. }) =
                    doc.get_node(id).map(|node| &node.data)
                {
                    for pair in pairs {
                        if doc.scalar_value(pair.key) == Some(key.as_str()) {
                            out.push(pair.value);
                        }
                    }
                }
            }
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::SeqIndex(index) => {
            let mut out = Vec::new();
            for &id in input_nodes(input)? {
                if let Some(NodeData::Sequence { items, .. }) =
                    doc.get_node(id).map(|node| &node.data)
                {
                    let len = items.len() as i64;
                    let at = if *index < 0 { len + index } else { *index };
                    if at >= 0 && at < len {
                        out.push(items[at as usize]);
                    }
                }
            }
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::SeqSlice(from, to) => {
            let mut out = Vec::new();
            for &id in input_nodes(input)? {
                if let Some(NodeData::Sequence { items, .. }) =
                    doc.get_node(id).map(|node| &node.data)
                {
                    let len = items.len() as i64;
                    let resolve = |bound: i64| -> i64 {
                        let bound = if bound < 0 { len + bound } else { bound };
                        bound.clamp(0, len)
                    };
                    let (from, to) = (resolve(*from), resolve(*to));
                    if from < to {
                        out.extend_from_slice(&items[from as usize..to as usize]);
                    }
                }
            }
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::Alias(anchor) => match doc.resolve_anchor(anchor) {
            Some(id) => Ok(WalkResult::Nodes(vec![id])),
            None => Err(YpathError::UnresolvedAlias {
                anchor: anchor.clone(),
            }),
        },
        PathExpr::EveryChild => {
            let mut out = Vec::new();
            for &id in input_nodes(input)? {
                out.extend(children_of(doc, id));
            }
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::EveryChildRecursive => {
            let mut out = Vec::new();
            for &id in input_nodes(input)? {
                out.extend(descendants_of(doc, id));
            }
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::Filter(filter) => {
            let ids = input_nodes(input)?;
            let out = match filter {
                NodeFilter::Unique => {
                    let mut seen = HashSet::new();
                    ids.iter()
                        .copied()
                        .filter(|id| seen.insert(*id))
                        .collect()
                }
                _ => ids
                    .iter()
                    .copied()
                    .filter(|&id| {
                        let Some(node) = doc.get_node(id) else {
                            return false;
                        };
                        match filter {
                            NodeFilter::Scalar => {
                                matches!(node.data, NodeData::Scalar { .. })
                            }
                            NodeFilter::Sequence => {
                                matches!(node.data, NodeData::Sequence { .. })
                            }
                            NodeFilter::Mapping => {
                                matches!(node.data, NodeData::Mapping { .. })
                            }
                            NodeFilter::Collection => {
                                !matches!(node.data, NodeData::Scalar { .. })
                            }
                            NodeFilter::Unique => unreachable!(),
                        }
                    })
                    .collect(),
            };
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::Chain(steps) => {
            let mut current = input.clone();
            for step in steps {
                current = eval(doc, step, &current)?;
            }
            Ok(current)
        }
        PathExpr::Multi(items) => {
            let mut out = Vec::new();
            for item in items {
                match eval(doc, item, input)? {
                    WalkResult::Nodes(ids) => out.extend(ids),
                    scalar => {
                        if items.len() == 1 {
                            return Ok(scalar);
                        }
                        return Err(YpathError::Type {
                            problem: "cannot union scalar results",
                        });
                    }
                }
            }
            Ok(WalkResult::Nodes(out))
        }
        PathExpr::Or(lhs, rhs) => {
            let left = eval(doc, lhs, input)?;
            if !left.is_empty() {
                return Ok(left);
            }
            eval(doc, rhs, input)
        }
        PathExpr::And(lhs, rhs) => {
            let left = eval(doc, lhs, input)?;
            if left.is_empty() {
                return Ok(left);
            }
            eval(doc, rhs, input)
        }
        PathExpr::Cmp(op, lhs, rhs) => {
            let left = eval(doc, lhs, input)?;
            let right = eval(doc, rhs, input)?;
            let holds = match (coerce_scalar(doc, &left), coerce_scalar(doc, &right)) {
                (Some(a), Some(b)) => compare(op, &a, &b),
                _ => false,
            };
            if holds {
                Ok(left)
            } else {
                Ok(WalkResult::Nodes(Vec::new()))
            }
        }
        PathExpr::Arith(op, lhs, rhs) => {
            let left = eval(doc, lhs, input)?;
            let right = eval(doc, rhs, input)?;
            arith(doc, *op, &left, &right)
        }
        PathExpr::Number(value) => Ok(WalkResult::Number(*value)),
        PathExpr::Str(text) => Ok(WalkResult::Str(text.clone())),
    }
}

/// A scalar view of a walk result for comparisons and arithmetic.
enum CoercedScalar {
    Num(f64),
    Text(String),
}

fn coerce_scalar(doc: &Document, result: &WalkResult) -> Option<CoercedScalar> {
    match result {
        WalkResult::Number(value) => Some(CoercedScalar::Num(*value)),
        WalkResult::Str(text) => Some(match schema::parse_number(text) {
            Some(value) => CoercedScalar::Num(value),
            None => CoercedScalar::Text(text.clone()),
        }),
        WalkResult::Nodes(ids) => {
            let value = doc.scalar_value(*ids.first()?)?;
            Some(match schema::parse_number(value) {
                Some(number) => CoercedScalar::Num(number),
                None => CoercedScalar::Text(String::from(value)),
            })
        }
    }
}

fn compare(op: &CmpOp, a: &CoercedScalar, b: &CoercedScalar) -> bool {
    match (a, b) {
        (CoercedScalar::Num(a), CoercedScalar::Num(b)) => match op {
            CmpOp::Eq => a == b,
            CmpOp::Neq => a != b,
            CmpOp::Lt => a < b,
            CmpOp::Gt => a > b,
            CmpOp::Lte => a <= b,
            CmpOp::Gte => a >= b,
        },
        (a, b) => {
            let a = text_of(a);
            let b = text_of(b);
            match op {
                CmpOp::Eq => a == b,
                CmpOp::Neq => a != b,
                CmpOp::Lt => a < b,
                CmpOp::Gt => a > b,
                CmpOp::Lte => a <= b,
                CmpOp::Gte => a >= b,
            }
        }
    }
}

fn text_of(value: &CoercedScalar) -> String {
    match value {
        CoercedScalar::Num(number) => format!("{number}"),
        CoercedScalar::Text(text) => text.clone(),
    }
}

fn arith(
    doc: &Document,
    op: ArithOp,
    left: &WalkResult,
    right: &WalkResult,
) -> Result<WalkResult, YpathError> {
    let (Some(a), Some(b)) = (coerce_scalar(doc, left), coerce_scalar(doc, right)) else {
        return Err(YpathError::Type {
            problem: "arithmetic requires scalar operands",
        });
    };
    match (a, b) {
        (CoercedScalar::Num(a), CoercedScalar::Num(b)) => {
            let value = match op {
                ArithOp::Add => a + b,
                ArithOp::Sub => a - b,
                ArithOp::Mul => a * b,
                ArithOp::Div => a / b,
            };
            Ok(WalkResult::Number(value))
        }
        (a, b) => {
            if op == ArithOp::Add {
                // String promotion: `+` concatenates when either side is
                // non-numeric.
                Ok(WalkResult::Str(format!("{}{}", text_of(&a), text_of(&b))))
            } else {
                Err(YpathError::Type {
                    problem: "non-numeric operands in arithmetic",
                })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Document, Parser, Ypath};

    use super::WalkResult;

    fn load(input: &str) -> Document {
        let mut parser = Parser::new();
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        Document::load(&mut parser).unwrap()
    }

    fn values(doc: &Document, expr: &str) -> Vec<String> {
        Ypath::compile(expr)
            .unwrap()
            .query(doc)
            .unwrap()
            .into_iter()
            .map(|id| {
                doc.scalar_value(id)
                    .map_or_else(|| String::from("<collection>"), String::from)
            })
            .collect()
    }

    #[test]
    fn index_and_star_navigation() {
        let doc = load("users:\n  - name: x\n  - name: y\n");
        assert_eq!(values(&doc, "/users/0/name"), ["x"]);
        assert_eq!(values(&doc, "/users/*/name"), ["x", "y"]);
        assert_eq!(values(&doc, "/users/1/name"), ["y"]);
        assert_eq!(values(&doc, "/users/-1/name"), ["y"]);
        assert_eq!(values(&doc, "/users/9/name"), Vec::<String>::new());
    }

    #[test]
    fn recursive_descent_and_filters() {
        let doc = load("a:\n  b: 1\n  c: [2, 3]\n");
        assert_eq!(values(&doc, "**/[scalar]"), ["1", "2", "3"]);
        assert_eq!(values(&doc, "**/[seq]").len(), 1);
        assert_eq!(values(&doc, "**/[map]").len(), 2);
        assert_eq!(values(&doc, "**/[collection]").len(), 3);
    }

    #[test]
    fn unique_deduplicates_shared_nodes() {
        let doc = load("x: &s shared\ny: *s\n");
        assert_eq!(values(&doc, "/*").len(), 2);
        assert_eq!(values(&doc, "/*/[unique]").len(), 1);
    }

    #[test]
    fn slices() {
        let doc = load("[0, 1, 2, 3, 4]\n");
        assert_eq!(values(&doc, "/[1:3]"), ["1", "2"]);
        assert_eq!(values(&doc, "/[-2:5]"), ["3", "4"]);
    }

    #[test]
    fn multi_unions_in_declaration_order() {
        let doc = load("a: 1\nb: 2\nc: 3\n");
        assert_eq!(values(&doc, "/c, /a"), ["3", "1"]);
    }

    #[test]
    fn parent_and_this() {
        let doc = load("a:\n  b: 1\n");
        assert_eq!(values(&doc, "/a/b/.."), ["<collection>"]);
        let doc2 = load("x\n");
        assert_eq!(values(&doc2, "."), ["x"]);
    }

    #[test]
    fn logical_operators() {
        let doc = load("a: 1\nb: 2\n");
        assert_eq!(values(&doc, "/missing || /b"), ["2"]);
        assert_eq!(values(&doc, "/a && /b"), ["2"]);
        assert_eq!(values(&doc, "/a && /missing"), Vec::<String>::new());
    }

    #[test]
    fn comparison_gates() {
        let doc = load("a: 5\nb: 3\n");
        assert_eq!(values(&doc, "/a/[. > 4]"), ["5"]);
        assert_eq!(values(&doc, "/b/[. > 4]"), Vec::<String>::new());
        assert_eq!(values(&doc, "/a == 5"), ["5"]);
        assert_eq!(values(&doc, "/a == /b"), Vec::<String>::new());
    }

    #[test]
    fn arithmetic_in_predicates() {
        let doc = load("n: 6\n");
        assert_eq!(values(&doc, "/n/[. == 2 * 3]"), ["6"]);
        let result = Ypath::compile("[2 + 3]")
            .unwrap()
            .execute(&load("x\n"))
            .unwrap();
        assert_eq!(result, WalkResult::Number(5.0));
    }

    #[test]
    fn purity_over_an_immutable_tree() {
        let doc = load("users:\n  - name: x\n  - name: y\n");
        let path = Ypath::compile("/users/*/name").unwrap();
        assert_eq!(path.query(&doc).unwrap(), path.query(&doc).unwrap());
    }
}

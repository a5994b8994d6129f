use std::collections::HashMap;

use crate::{
    ComposerError, MappingStyle, Mark, Parser, ScalarStyle, SequenceStyle, TagDirective,
    VersionDirective, DEFAULT_MAPPING_TAG, DEFAULT_SCALAR_TAG, DEFAULT_SEQUENCE_TAG,
};

/// A node id: a 1-based index into [`Document::nodes`].
pub type NodeId = i32;

/// The document structure.
///
/// Nodes live in an arena and refer to each other by [`NodeId`]; aliases are
/// resolved at build time, so a node reached through several anchors appears
/// once and is shared by id.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Document {
    /// The document nodes.
    pub nodes: Vec<Node>,
    /// The version directive.
    pub version_directive: Option<VersionDirective>,
    /// The list of tag directives.
    pub tag_directives: Vec<TagDirective>,
    /// Anchor name to node id, for O(1) alias resolution. A redefined
    /// anchor shadows the previous binding.
    pub anchors: HashMap<String, NodeId>,
    /// Is the document start indicator implicit?
    pub start_implicit: bool,
    /// Is the document end indicator implicit?
    pub end_implicit: bool,
    /// The beginning of the document.
    pub start_mark: Mark,
    /// The end of the document.
    pub end_mark: Mark,
}

/// The node structure.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct Node {
    /// The node type.
    pub data: NodeData,
    /// The node tag.
    pub tag: Option<String>,
    /// Whether the tag was resolved implicitly rather than written in the
    /// source.
    pub tag_implicit: bool,
    /// The anchor attached to the node, if any.
    pub anchor: Option<String>,
    /// The node this one was first attached under. `None` for the root.
    pub parent: Option<NodeId>,
    /// The beginning of the node.
    pub start_mark: Mark,
    /// The end of the node.
    pub end_mark: Mark,
}

/// Node types.
#[derive(Clone, Debug)]
pub enum NodeData {
    /// A scalar node.
    Scalar {
        /// The scalar value.
        value: String,
        /// The scalar style.
        style: ScalarStyle,
    },
    /// A sequence node.
    Sequence {
        /// The sequence items.
        items: Vec<NodeId>,
        /// The sequence style.
        style: SequenceStyle,
    },
    /// A mapping node. Pairs keep their insertion order.
    Mapping {
        /// The mapping pairs (key, value).
        pairs: Vec<NodePair>,
        /// The mapping style.
        style: MappingStyle,
    },
}

/// An element of a mapping node.
#[derive(Copy, Clone, Debug)]
#[non_exhaustive]
pub struct NodePair {
    /// The key of the element.
    pub key: NodeId,
    /// The value of the element.
    pub value: NodeId,
}

impl Document {
    /// Create a YAML document.
    pub fn new(
        version_directive: Option<VersionDirective>,
        tag_directives_in: &[TagDirective],
        start_implicit: bool,
        end_implicit: bool,
    ) -> Document {
        Document {
            nodes: Vec::with_capacity(16),
            version_directive,
            tag_directives: tag_directives_in.to_vec(),
            anchors: HashMap::new(),
            start_implicit,
            end_implicit,
            start_mark: Mark::default(),
            end_mark: Mark::default(),
        }
    }

    /// Parse the input stream and produce the next YAML document.
    ///
    /// Call this function subsequently to produce a sequence of documents
    /// constituting the input stream.
    ///
    /// If the produced document has no root node, it means that the document
    /// end has been reached.
    ///
    /// Duplicate mapping keys are rejected; use
    /// [`DocumentBuilder`](crate::DocumentBuilder) directly for other
    /// policies.
    ///
    /// An application must not alternate the calls of [`Document::load()`]
    /// with the calls of [`Parser::parse()`] or
    /// [`Scanner::scan()`](crate::Scanner::scan). Doing this will break the
    /// parser.
    pub fn load(parser: &mut Parser) -> Result<Document, ComposerError> {
        crate::builder::load(parser, crate::DuplicateKeyPolicy::Error)
    }

    /// [`Document::load`] with an explicit duplicate-key policy.
    pub fn load_with(
        parser: &mut Parser,
        policy: crate::DuplicateKeyPolicy,
    ) -> Result<Document, ComposerError> {
        crate::builder::load(parser, policy)
    }

    /// Get a node of a YAML document.
    ///
    /// Returns the node object or `None` if `index` is out of range.
    pub fn get_node(&self, index: NodeId) -> Option<&Node> {
        if index < 1 {
            return None;
        }
        self.nodes.get(index as usize - 1)
    }

    /// Get a node of a YAML document.
    ///
    /// Returns the node object or `None` if `index` is out of range.
    pub fn get_node_mut(&mut self, index: NodeId) -> Option<&mut Node> {
        if index < 1 {
            return None;
        }
        self.nodes.get_mut(index as usize - 1)
    }

    /// The id of the root node, or `None` if the document is empty.
    ///
    /// The root is the first node added to the document. An empty document
    /// produced by the parser signifies the end of a YAML stream.
    pub fn root_id(&self) -> Option<NodeId> {
        if self.nodes.is_empty() {
            None
        } else {
            Some(1)
        }
    }

    /// Get the root of a YAML document node.
    pub fn get_root_node(&mut self) -> Option<&mut Node> {
        self.nodes.get_mut(0)
    }

    /// The scalar text of a node, if it is a scalar.
    pub fn scalar_value(&self, index: NodeId) -> Option<&str> {
        match &self.get_node(index)?.data {
            NodeData::Scalar { value, .. } => Some(value),
            _ => None,
        }
    }

    /// Resolve an anchor name to the node currently bound to it.
    pub fn resolve_anchor(&self, name: &str) -> Option<NodeId> {
        self.anchors.get(name).copied()
    }

    /// Bind an anchor name to a node, shadowing any previous binding.
    pub fn set_anchor(&mut self, name: &str, index: NodeId) {
        self.anchors.insert(String::from(name), index);
        if let Some(node) = self.get_node_mut(index) {
            node.anchor = Some(String::from(name));
        }
    }

    /// Create a SCALAR node and attach it to the document.
    ///
    /// Returns the node id, which is a nonzero integer.
    #[must_use]
    pub fn add_scalar(&mut self, tag: Option<&str>, value: &str, style: ScalarStyle) -> NodeId {
        let tag_implicit = tag.is_none();
        let tag = tag.unwrap_or(DEFAULT_SCALAR_TAG);
        let node = Node {
            data: NodeData::Scalar {
                value: String::from(value),
                style,
            },
            tag: Some(String::from(tag)),
            tag_implicit,
            anchor: None,
            parent: None,
            start_mark: Mark::default(),
            end_mark: Mark::default(),
        };
        self.nodes.push(node);
        self.nodes.len() as NodeId
    }

    /// Create a SEQUENCE node and attach it to the document.
    ///
    /// Returns the node id, which is a nonzero integer.
    #[must_use]
    pub fn add_sequence(&mut self, tag: Option<&str>, style: SequenceStyle) -> NodeId {
        let tag_implicit = tag.is_none();
        let tag = tag.unwrap_or(DEFAULT_SEQUENCE_TAG);
        let node = Node {
            data: NodeData::Sequence {
                items: Vec::with_capacity(16),
                style,
            },
            tag: Some(String::from(tag)),
            tag_implicit,
            anchor: None,
            parent: None,
            start_mark: Mark::default(),
            end_mark: Mark::default(),
        };
        self.nodes.push(node);
        self.nodes.len() as NodeId
    }

    /// Create a MAPPING node and attach it to the document.
    ///
    /// Returns the node id, which is a nonzero integer.
    #[must_use]
    pub fn add_mapping(&mut self, tag: Option<&str>, style: MappingStyle) -> NodeId {
        let tag_implicit = tag.is_none();
        let tag = tag.unwrap_or(DEFAULT_MAPPING_TAG);
        let node = Node {
            data: NodeData::Mapping {
                pairs: Vec::with_capacity(16),
                style,
            },
            tag: Some(String::from(tag)),
            tag_implicit,
            anchor: None,
            parent: None,
            start_mark: Mark::default(),
            end_mark: Mark::default(),
        };
        self.nodes.push(node);
        self.nodes.len() as NodeId
    }

    /// Add an item to a SEQUENCE node.
    pub fn append_sequence_item(&mut self, sequence: NodeId, item: NodeId) {
        assert!(sequence > 0 && sequence as usize - 1 < self.nodes.len());
        assert!(item > 0 && item as usize - 1 < self.nodes.len());
        if self.nodes[item as usize - 1].parent.is_none() && item != sequence {
            self.nodes[item as usize - 1].parent = Some(sequence);
        }
        let NodeData::Sequence { ref mut items, .. } = self.nodes[sequence as usize - 1].data
        else {
            panic!("not a sequence node");
        };
        items.push(item);
    }

    /// Add a pair of a key and a value to a MAPPING node.
    pub fn append_mapping_pair(&mut self, mapping: NodeId, key: NodeId, value: NodeId) {
        assert!(mapping > 0 && mapping as usize - 1 < self.nodes.len());
        assert!(key > 0 && key as usize - 1 < self.nodes.len());
        assert!(value > 0 && value as usize - 1 < self.nodes.len());
        for index in [key, value] {
            if self.nodes[index as usize - 1].parent.is_none() && index != mapping {
                self.nodes[index as usize - 1].parent = Some(mapping);
            }
        }
        let NodeData::Mapping { ref mut pairs, .. } = self.nodes[mapping as usize - 1].data
        else {
            panic!("not a mapping node");
        };
        pairs.push(NodePair { key, value });
    }

    /// Structural equality of two nodes under YAML equality: same kind, same
    /// tag, and equal scalar values / items / pairs. Anchors, styles and
    /// marks do not participate.
    ///
    /// Works without recursion; shared ids compare equal immediately.
    pub fn nodes_equal(&self, a: NodeId, b: NodeId) -> bool {
        let mut stack = vec![(a, b)];
        while let Some((a, b)) = stack.pop() {
            if a == b {
                continue;
            }
            let (Some(na), Some(nb)) = (self.get_node(a), self.get_node(b)) else {
                return false;
            };
            if na.tag != nb.tag {
                return false;
            }
            match (&na.data, &nb.data) {
                (
                    NodeData::Scalar { value: va, .. },
                    NodeData::Scalar { value: vb, .. },
                ) => {
                    if va != vb {
                        return false;
                    }
                }
                (
                    NodeData::Sequence { items: ia, .. },
                    NodeData::Sequence { items: ib, .. },
                ) => {
                    if ia.len() != ib.len() {
                        return false;
                    }
                    stack.extend(ia.iter().copied().zip(ib.iter().copied()));
                }
                (
                    NodeData::Mapping { pairs: pa, .. },
                    NodeData::Mapping { pairs: pb, .. },
                ) => {
                    if pa.len() != pb.len() {
                        return false;
                    }
                    for (x, y) in pa.iter().zip(pb.iter()) {
                        stack.push((x.key, y.key));
                        stack.push((x.value, y.value));
                    }
                }
                _ => return false,
            }
        }
        true
    }

    /// Deep-copy the subtree rooted at `index` into a new fragment document.
    pub fn extract(&self, index: NodeId) -> Option<Document> {
        self.get_node(index)?;
        let mut fragment = Document::new(None, &[], true, true);
        let mut mapped: HashMap<NodeId, NodeId> = HashMap::new();
        // First pass: clone nodes depth-first so the subtree root lands at
        // id 1; second pass re-points children through the id map.
        let mut order = Vec::new();
        let mut stack = vec![index];
        while let Some(id) = stack.pop() {
            if mapped.contains_key(&id) {
                continue;
            }
            let node = self.get_node(id)?;
            fragment.nodes.push(node.clone());
            mapped.insert(id, fragment.nodes.len() as NodeId);
            order.push(id);
            match &node.data {
                NodeData::Sequence { items, .. } => {
                    for item in items.iter().rev() {
                        stack.push(*item);
                    }
                }
                NodeData::Mapping { pairs, .. } => {
                    for pair in pairs.iter().rev() {
                        stack.push(pair.value);
                        stack.push(pair.key);
                    }
                }
                NodeData::Scalar { .. } => {}
            }
        }
        for id in order {
            let new_id = mapped[&id];
            let node = &mut fragment.nodes[new_id as usize - 1];
            node.parent = node.parent.and_then(|p| mapped.get(&p).copied());
            match &mut node.data {
                NodeData::Sequence { items, .. } => {
                    for item in items {
                        *item = mapped[item];
                    }
                }
                NodeData::Mapping { pairs, .. } => {
                    for pair in pairs {
                        pair.key = mapped[&pair.key];
                        pair.value = mapped[&pair.value];
                    }
                }
                NodeData::Scalar { .. } => {}
            }
            if let Some(anchor) = fragment.nodes[new_id as usize - 1].anchor.clone() {
                fragment.anchors.insert(anchor, new_id);
            }
        }
        Some(fragment)
    }
}

#[cfg(test)]
mod tests {
    use crate::{MappingStyle, ScalarStyle};

    use super::*;

    fn sample() -> (Document, NodeId, NodeId) {
        let mut doc = Document::new(None, &[], true, true);
        let map = doc.add_mapping(None, MappingStyle::Block);
        let k1 = doc.add_scalar(None, "name", ScalarStyle::Plain);
        let v1 = doc.add_scalar(None, "x", ScalarStyle::Plain);
        doc.append_mapping_pair(map, k1, v1);
        let k2 = doc.add_scalar(None, "name", ScalarStyle::Plain);
        let v2 = doc.add_scalar(None, "x", ScalarStyle::Plain);
        (doc, map, k2.max(v2))
    }

    #[test]
    fn structural_equality() {
        let (doc, _map, _) = sample();
        // "name" keys at ids 2 and 5, "x" values at ids 3 and 6.
        assert!(doc.nodes_equal(2, 5));
        assert!(doc.nodes_equal(3, 6));
        assert!(!doc.nodes_equal(1, 2));
    }

    #[test]
    fn parents_are_recorded_on_attach() {
        let (doc, map, _) = sample();
        assert_eq!(doc.get_node(2).unwrap().parent, Some(map));
        assert_eq!(doc.get_node(map).unwrap().parent, None);
    }

    #[test]
    fn extract_builds_an_independent_fragment() {
        let (doc, map, _) = sample();
        let fragment = doc.extract(map).unwrap();
        assert_eq!(fragment.root_id(), Some(1));
        assert_eq!(fragment.nodes.len(), 3);
        let NodeData::Mapping { pairs, .. } = &fragment.get_node(1).unwrap().data else {
            panic!("expected mapping root");
        };
        assert_eq!(fragment.scalar_value(pairs[0].key), Some("name"));
        assert_eq!(fragment.scalar_value(pairs[0].value), Some("x"));
    }
}

use std::collections::HashSet;

use crate::{Document, Encoding, Event, Node, NodeData, NodeId, ScalarStyle};

/// How much stream framing [`DocumentIterator::next_event`] synthesises
/// around the document body.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub enum IterScope {
    /// Body events only.
    Body,
    /// Document start/end around the body.
    Document,
    /// Stream start/end, document start/end, then the body.
    #[default]
    Stream,
}

#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Stage {
    StreamStart,
    DocumentStart,
    Body,
    DocumentEnd,
    StreamEnd,
    Done,
}

/// One step of the replay: which child of `node` comes next.
struct Frame {
    node: NodeId,
    /// Index into the flattened child list (key, value, key, value for
    /// mappings).
    child: usize,
}

/// Replays a [`Document`] as the event stream that would have produced it,
/// without touching the call stack.
///
/// Shared nodes (aliases resolved at build time) are emitted in full on
/// their first visit and as alias events afterwards. The iterator borrows
/// the document; the document must not change while iterating.
#[non_exhaustive]
pub struct DocumentIterator<'d> {
    doc: &'d Document,
    scope: IterScope,
    stage: Stage,
    frames: Vec<Frame>,
    /// Nodes already emitted once, for alias re-emission.
    visited: HashSet<NodeId>,
    /// Depth-first walk state for [`DocumentIterator::next_node`].
    node_frames: Vec<Frame>,
    node_walk_started: bool,
}

impl<'d> DocumentIterator<'d> {
    pub fn new(doc: &'d Document, scope: IterScope) -> Self {
        DocumentIterator {
            doc,
            scope,
            stage: match scope {
                IterScope::Stream => Stage::StreamStart,
                IterScope::Document => Stage::DocumentStart,
                IterScope::Body => Stage::Body,
            },
            frames: Vec::with_capacity(16),
            visited: HashSet::new(),
            node_frames: Vec::with_capacity(16),
            node_walk_started: false,
        }
    }

    /// Visit node ids depth-first in document order.
    ///
    /// Shared nodes are visited once per appearance. Do not interleave with
    /// [`DocumentIterator::next_event`]; the two walks are independent.
    pub fn next_node(&mut self) -> Option<NodeId> {
        if !self.node_walk_started {
            self.node_walk_started = true;
            let root = self.doc.root_id()?;
            self.node_frames.push(Frame {
                node: root,
                child: 0,
            });
            return Some(root);
        }
        loop {
            let frame = self.node_frames.last_mut()?;
            let node = self.doc.get_node(frame.node)?;
            let next = child_at(node, frame.child);
            match next {
                Some(child) => {
                    frame.child += 1;
                    self.node_frames.push(Frame {
                        node: child,
                        child: 0,
                    });
                    return Some(child);
                }
                None => {
                    self.node_frames.pop();
                }
            }
        }
    }

    /// Synthesise the next event of the replay, or `None` when done.
    pub fn next_event(&mut self) -> Option<Event> {
        loop {
            match self.stage {
                Stage::StreamStart => {
                    self.stage = Stage::DocumentStart;
                    return Some(Event::stream_start(Encoding::Utf8));
                }
                Stage::DocumentStart => {
                    self.stage = Stage::Body;
                    return Some(Event::document_start(
                        self.doc.version_directive,
                        &self.doc.tag_directives,
                        self.doc.start_implicit,
                    ));
                }
                Stage::Body => {
                    if let Some(event) = self.body_event() {
                        return Some(event);
                    }
                    self.stage = match self.scope {
                        IterScope::Body => Stage::Done,
                        _ => Stage::DocumentEnd,
                    };
                }
                Stage::DocumentEnd => {
                    self.stage = match self.scope {
                        IterScope::Stream => Stage::StreamEnd,
                        _ => Stage::Done,
                    };
                    return Some(Event::document_end(self.doc.end_implicit));
                }
                Stage::StreamEnd => {
                    self.stage = Stage::Done;
                    return Some(Event::stream_end());
                }
                Stage::Done => return None,
            }
        }
    }

    fn body_event(&mut self) -> Option<Event> {
        if self.frames.is_empty() {
            if self.visited.is_empty() {
                let root = self.doc.root_id()?;
                return Some(self.enter(root));
            }
            return None;
        }
        loop {
            let frame = self.frames.last_mut()?;
            let node = self.doc.get_node(frame.node)?;
            match child_at(node, frame.child) {
                Some(child) => {
                    frame.child += 1;
                    return Some(self.enter(child));
                }
                None => {
                    let closing = matches!(node.data, NodeData::Mapping { .. });
                    self.frames.pop();
                    return Some(if closing {
                        Event::mapping_end()
                    } else {
                        Event::sequence_end()
                    });
                }
            }
        }
    }

    /// Produce the event introducing `id`, pushing a frame for collections.
    fn enter(&mut self, id: NodeId) -> Event {
        let node = self.doc.get_node(id).expect("node id in range");
        if !self.visited.insert(id) {
            // Already serialised: re-reference it by anchor.
            let anchor = node.anchor.as_deref().unwrap_or_default();
            return Event::alias(anchor);
        }
        let anchor = node.anchor.as_deref();
        match &node.data {
            NodeData::Scalar { value, style } => {
                let (plain_implicit, quoted_implicit) = scalar_implicit_flags(node, *style);
                Event::scalar(
                    anchor,
                    node.tag.as_deref(),
                    value,
                    plain_implicit,
                    quoted_implicit,
                    *style,
                )
            }
            NodeData::Sequence { style, .. } => {
                // Implicitly tagged collections replay without their
                // default tag, matching what the parser emitted.
                let tag = if node.tag_implicit {
                    None
                } else {
                    node.tag.as_deref()
                };
                self.frames.push(Frame { node: id, child: 0 });
                Event::sequence_start(anchor, tag, node.tag_implicit, *style)
            }
            NodeData::Mapping { style, .. } => {
                let tag = if node.tag_implicit {
                    None
                } else {
                    node.tag.as_deref()
                };
                self.frames.push(Frame { node: id, child: 0 });
                Event::mapping_start(anchor, tag, node.tag_implicit, *style)
            }
        }
    }
}

impl Iterator for DocumentIterator<'_> {
    type Item = Event;

    fn next(&mut self) -> Option<Event> {
        self.next_event()
    }
}

fn child_at(node: &Node, index: usize) -> Option<NodeId> {
    match &node.data {
        NodeData::Scalar { .. } => None,
        NodeData::Sequence { items, .. } => items.get(index).copied(),
        NodeData::Mapping { pairs, .. } => {
            let pair = pairs.get(index / 2)?;
            Some(if index % 2 == 0 { pair.key } else { pair.value })
        }
    }
}

fn scalar_implicit_flags(node: &Node, style: ScalarStyle) -> (bool, bool) {
    if !node.tag_implicit {
        return (false, false);
    }
    if style == ScalarStyle::Plain {
        (true, false)
    } else {
        (false, true)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Document, EventData, Parser};

    use super::*;

    fn load(input: &str) -> Document {
        let mut parser = Parser::new();
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        Document::load(&mut parser).unwrap()
    }

    fn parse_events(input: &str) -> Vec<EventData> {
        let mut parser = Parser::new();
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        let mut events = Vec::new();
        loop {
            let event = parser.parse().unwrap();
            let done = matches!(event.data, EventData::StreamEnd);
            events.push(event.data);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn replay_matches_the_original_event_stream() {
        let input = "users:\n  - name: x\n  - [1, 2]\n";
        let doc = load(input);
        let replayed: Vec<EventData> = DocumentIterator::new(&doc, IterScope::Stream)
            .map(|event| event.data)
            .collect();
        assert_eq!(replayed, parse_events(input));
    }

    #[test]
    fn scope_masks_the_framing() {
        let doc = load("a: 1\n");
        let body: Vec<EventData> = DocumentIterator::new(&doc, IterScope::Body)
            .map(|e| e.data)
            .collect();
        assert!(matches!(body.first(), Some(EventData::MappingStart { .. })));
        assert!(matches!(body.last(), Some(EventData::MappingEnd)));

        let document: Vec<EventData> = DocumentIterator::new(&doc, IterScope::Document)
            .map(|e| e.data)
            .collect();
        assert!(matches!(
            document.first(),
            Some(EventData::DocumentStart { .. })
        ));
        assert!(matches!(document.last(), Some(EventData::DocumentEnd { .. })));
    }

    #[test]
    fn shared_nodes_replay_as_aliases() {
        let doc = load("base: &b {x: 1}\ncopy: *b\n");
        let events: Vec<EventData> = DocumentIterator::new(&doc, IterScope::Body)
            .map(|e| e.data)
            .collect();
        let aliases: Vec<&EventData> = events
            .iter()
            .filter(|e| matches!(e, EventData::Alias { .. }))
            .collect();
        assert_eq!(aliases.len(), 1);
        assert!(matches!(
            aliases[0],
            EventData::Alias { anchor } if anchor == "b"
        ));
    }

    #[test]
    fn node_walk_is_depth_first_document_order() {
        let doc = load("a:\n  - 1\n  - 2\nb: 3\n");
        let mut iter = DocumentIterator::new(&doc, IterScope::Body);
        let mut scalars = Vec::new();
        while let Some(id) = iter.next_node() {
            if let Some(value) = doc.scalar_value(id) {
                scalars.push(value.to_string());
            }
        }
        assert_eq!(scalars, ["a", "1", "2", "b", "3"]);
    }

    #[test]
    fn empty_document_replays_no_body() {
        let doc = Document::new(None, &[], true, true);
        let events: Vec<EventData> = DocumentIterator::new(&doc, IterScope::Stream)
            .map(|e| e.data)
            .collect();
        assert_eq!(events.len(), 4);
    }
}

use crate::{
    ComposerError, Document, Event, EventData, Mark, NodeData, NodeId, Parser, DEFAULT_MAPPING_TAG,
    DEFAULT_SCALAR_TAG, DEFAULT_SEQUENCE_TAG,
};

/// What to do when a mapping acquires two structurally equal keys.
#[derive(Copy, Clone, Default, PartialEq, Eq, Debug)]
pub enum DuplicateKeyPolicy {
    /// Fail the document.
    #[default]
    Error,
    /// Keep both pairs and report the duplicate through `tracing`.
    Warn,
}

/// What the builder is waiting for in the current context.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum BuildState {
    /// Expect the root node.
    Node,
    /// Expect a mapping key.
    MapKey,
    /// Expect a mapping value.
    MapValue,
    /// Expect a sequence item.
    Seq,
}

struct Frame {
    state: BuildState,
    node: NodeId,
    /// The completed key waiting for its value (mapping frames only).
    pending_key: Option<NodeId>,
}

/// Builds a [`Document`] from events.
///
/// In push mode the caller feeds [`Event`]s to [`DocumentBuilder::process`]
/// and takes the document when [`DocumentBuilder::is_complete`] reports
/// true. Pull mode is [`Document::load`], which drives an owned parser
/// through the same machine.
#[non_exhaustive]
pub struct DocumentBuilder {
    policy: DuplicateKeyPolicy,
    doc: Option<Document>,
    state: BuildState,
    stack: Vec<Frame>,
    in_stream: bool,
    complete: bool,
}

impl Default for DocumentBuilder {
    fn default() -> Self {
        Self::new(DuplicateKeyPolicy::default())
    }
}

impl DocumentBuilder {
    pub fn new(policy: DuplicateKeyPolicy) -> Self {
        DocumentBuilder {
            policy,
            doc: None,
            state: BuildState::Node,
            stack: Vec::with_capacity(16),
            in_stream: false,
            complete: false,
        }
    }

    /// A builder for a document fragment: ready to accept node events
    /// without stream or document framing.
    pub(crate) fn fragment(policy: DuplicateKeyPolicy) -> Self {
        let mut builder = Self::new(policy);
        builder.in_stream = true;
        builder.doc = Some(Document::new(None, &[], true, true));
        builder
    }

    /// Has a stream-start event been seen (and no stream-end yet)?
    pub fn in_stream(&self) -> bool {
        self.in_stream
    }

    /// Is a document currently under construction?
    pub fn in_document(&self) -> bool {
        self.doc.is_some() && !self.complete
    }

    /// Is a completed document waiting to be taken?
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// Take ownership of a completed document.
    pub fn take_document(&mut self) -> Option<Document> {
        if !self.complete {
            return None;
        }
        self.complete = false;
        self.state = BuildState::Node;
        self.stack.clear();
        self.doc.take()
    }

    fn error<T>(problem: &'static str, mark: Mark) -> Result<T, ComposerError> {
        Err(ComposerError::Problem { problem, mark })
    }

    /// Feed one event to the builder.
    pub fn process(&mut self, event: &Event) -> Result<(), ComposerError> {
        match &event.data {
            EventData::StreamStart { .. } => {
                self.in_stream = true;
                Ok(())
            }
            EventData::StreamEnd => {
                self.in_stream = false;
                Ok(())
            }
            EventData::DocumentStart {
                version_directive,
                tag_directives,
                implicit,
            } => {
                if self.in_document() {
                    return Self::error("unexpected document start", event.start_mark);
                }
                if self.complete {
                    return Self::error(
                        "previous document has not been taken",
                        event.start_mark,
                    );
                }
                let mut doc =
                    Document::new(*version_directive, tag_directives, *implicit, true);
                doc.start_mark = event.start_mark;
                self.doc = Some(doc);
                self.state = BuildState::Node;
                Ok(())
            }
            EventData::DocumentEnd { implicit } => {
                let Some(doc) = self.doc.as_mut() else {
                    return Self::error("unexpected document end", event.start_mark);
                };
                doc.end_implicit = *implicit;
                doc.end_mark = event.end_mark;
                self.complete = true;
                Ok(())
            }
            EventData::Alias { anchor } => {
                let Some(doc) = self.doc.as_ref() else {
                    return Self::error("alias outside of a document", event.start_mark);
                };
                let Some(index) = doc.resolve_anchor(anchor) else {
                    return Self::error("found undefined alias", event.start_mark);
                };
                self.attach(index, event.start_mark)
            }
            EventData::Scalar {
                anchor,
                tag,
                value,
                plain_implicit,
                quoted_implicit,
                style,
            } => {
                let implicit = *plain_implicit || *quoted_implicit;
                let doc = self.doc_mut(event.start_mark)?;
                let tag = effective_tag(tag, DEFAULT_SCALAR_TAG);
                let index = doc.add_scalar(Some(&tag), value, *style);
                let node = doc.get_node_mut(index).unwrap();
                node.tag_implicit = implicit;
                node.start_mark = event.start_mark;
                node.end_mark = event.end_mark;
                if let Some(anchor) = anchor {
                    doc.set_anchor(anchor, index);
                }
                self.attach(index, event.start_mark)
            }
            EventData::SequenceStart {
                anchor,
                tag,
                implicit,
                style,
            } => {
                let doc = self.doc_mut(event.start_mark)?;
                let tag = effective_tag(tag, DEFAULT_SEQUENCE_TAG);
                let index = doc.add_sequence(Some(&tag), *style);
                let node = doc.get_node_mut(index).unwrap();
                node.tag_implicit = *implicit;
                node.start_mark = event.start_mark;
                node.end_mark = event.end_mark;
                if let Some(anchor) = anchor {
                    doc.set_anchor(anchor, index);
                }
                self.attach(index, event.start_mark)?;
                self.stack.push(Frame {
                    state: self.state,
                    node: index,
                    pending_key: None,
                });
                self.state = BuildState::Seq;
                Ok(())
            }
            EventData::SequenceEnd => self.close_collection(event.end_mark, false),
            EventData::MappingStart {
                anchor,
                tag,
                implicit,
                style,
            } => {
                let doc = self.doc_mut(event.start_mark)?;
                let tag = effective_tag(tag, DEFAULT_MAPPING_TAG);
                let index = doc.add_mapping(Some(&tag), *style);
                let node = doc.get_node_mut(index).unwrap();
                node.tag_implicit = *implicit;
                node.start_mark = event.start_mark;
                node.end_mark = event.end_mark;
                if let Some(anchor) = anchor {
                    doc.set_anchor(anchor, index);
                }
                self.attach(index, event.start_mark)?;
                self.stack.push(Frame {
                    state: self.state,
                    node: index,
                    pending_key: None,
                });
                self.state = BuildState::MapKey;
                Ok(())
            }
            EventData::MappingEnd => self.close_collection(event.end_mark, true),
        }
    }

    fn doc_mut(&mut self, mark: Mark) -> Result<&mut Document, ComposerError> {
        match self.doc.as_mut() {
            Some(doc) => Ok(doc),
            None => Err(ComposerError::Problem {
                problem: "node outside of a document",
                mark,
            }),
        }
    }

    /// Hang a finished node off the enclosing context.
    ///
    /// A key only joins the mapping when its value arrives, so complex keys
    /// are complete (and comparable) at duplicate-check time.
    fn attach(&mut self, index: NodeId, mark: Mark) -> Result<(), ComposerError> {
        let Some(frame) = self.stack.last_mut() else {
            // The root node; it is already in the arena.
            return Ok(());
        };
        match self.state {
            BuildState::Seq => {
                let node = frame.node;
                self.doc
                    .as_mut()
                    .unwrap()
                    .append_sequence_item(node, index);
            }
            BuildState::MapKey => {
                frame.pending_key = Some(index);
                self.state = BuildState::MapValue;
            }
            BuildState::MapValue => {
                let mapping = frame.node;
                let key = frame.pending_key.take().expect("no pending key");
                self.state = BuildState::MapKey;
                let doc = self.doc.as_mut().unwrap();
                let duplicate = {
                    let NodeData::Mapping { pairs, .. } =
                        &doc.get_node(mapping).unwrap().data
                    else {
                        unreachable!()
                    };
                    let pairs: Vec<NodeId> = pairs.iter().map(|p| p.key).collect();
                    pairs.iter().any(|&existing| doc.nodes_equal(existing, key))
                };
                if duplicate {
                    match self.policy {
                        DuplicateKeyPolicy::Error => {
                            return Self::error("found duplicate mapping key", mark);
                        }
                        DuplicateKeyPolicy::Warn => {
                            tracing::warn!(
                                line = mark.line,
                                column = mark.column,
                                "duplicate mapping key"
                            );
                        }
                    }
                }
                doc.append_mapping_pair(mapping, key, index);
            }
            BuildState::Node => {}
        }
        Ok(())
    }

    fn close_collection(&mut self, end_mark: Mark, mapping: bool) -> Result<(), ComposerError> {
        let Some(frame) = self.stack.pop() else {
            return Self::error("unexpected collection end", end_mark);
        };
        let doc = self.doc.as_mut().unwrap();
        let node = doc.get_node_mut(frame.node).unwrap();
        debug_assert_eq!(
            mapping,
            matches!(node.data, NodeData::Mapping { .. }),
            "collection end does not match its start"
        );
        node.end_mark = end_mark;
        self.state = frame.state;
        Ok(())
    }

    /// The id of the collection currently under construction, if any.
    pub fn current_collection(&self) -> Option<NodeId> {
        self.stack.last().map(|frame| frame.node)
    }

    /// The collection nesting depth of the build position.
    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    /// Whether `name` is already anchored in the document under
    /// construction.
    pub(crate) fn has_anchor(&self, name: &str) -> bool {
        self.doc
            .as_ref()
            .is_some_and(|doc| doc.resolve_anchor(name).is_some())
    }

    /// Take the fragment document regardless of completion framing.
    pub(crate) fn take_fragment(&mut self) -> Option<Document> {
        self.complete = false;
        self.state = BuildState::Node;
        self.stack.clear();
        self.doc.take()
    }
}

fn effective_tag(tag: &Option<String>, default: &str) -> String {
    match tag.as_deref() {
        None | Some("") | Some("!") => String::from(default),
        Some(tag) => String::from(tag),
    }
}

/// Pull-mode loading: drive `parser` until one document is complete.
pub(crate) fn load(
    parser: &mut Parser,
    policy: DuplicateKeyPolicy,
) -> Result<Document, ComposerError> {
    let mut builder = DocumentBuilder::new(policy);

    if !parser.stream_start_produced() {
        match parser.parse() {
            Ok(event @ Event {
                data: EventData::StreamStart { .. },
                ..
            }) => builder.process(&event)?,
            Ok(_) => panic!("expected stream start"),
            Err(err) => return Err(err.into()),
        }
    }
    if parser.stream_end_produced() {
        return Ok(Document::new(None, &[], true, true));
    }
    loop {
        let event = parser.parse()?;
        if let EventData::StreamEnd = &event.data {
            // An empty document signifies the end of the stream.
            return Ok(builder
                .take_document()
                .unwrap_or_else(|| Document::new(None, &[], true, true)));
        }
        builder.process(&event)?;
        if builder.is_complete() {
            return Ok(builder.take_document().expect("complete document"));
        }
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Document, DuplicateKeyPolicy, Parser};

    use super::DocumentBuilder;

    fn events_of(input: &str) -> Vec<crate::Event> {
        let mut parser = Parser::new();
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        let mut events = Vec::new();
        loop {
            let event = parser.parse().unwrap();
            let done = matches!(event.data, crate::EventData::StreamEnd);
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn push_mode_predicates() {
        let events = events_of("a: 1\n");
        let mut builder = DocumentBuilder::default();
        assert!(!builder.in_stream());
        builder.process(&events[0]).unwrap();
        assert!(builder.in_stream());
        assert!(!builder.in_document());
        builder.process(&events[1]).unwrap();
        assert!(builder.in_document());
        for event in &events[2..events.len() - 1] {
            builder.process(event).unwrap();
        }
        assert!(builder.is_complete());
        let doc = builder.take_document().unwrap();
        assert_eq!(doc.nodes.len(), 3);
        assert!(!builder.is_complete());
    }

    #[test]
    fn duplicate_keys_are_rejected_by_default() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"a: 1\na: 2\n";
        parser.set_input_string(&mut bytes);
        let err = Document::load(&mut parser).unwrap_err();
        assert!(err.to_string().contains("duplicate mapping key"));
    }

    #[test]
    fn duplicate_keys_can_be_kept_with_a_warning() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"a: 1\na: 2\n";
        parser.set_input_string(&mut bytes);
        let doc = Document::load_with(&mut parser, DuplicateKeyPolicy::Warn).unwrap();
        let root = doc.root_id().unwrap();
        let crate::NodeData::Mapping { pairs, .. } = &doc.get_node(root).unwrap().data else {
            panic!("expected mapping");
        };
        assert_eq!(pairs.len(), 2);
    }

    #[test]
    fn complex_keys_are_compared_structurally() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"? [1, 2]\n: x\n? [1, 2]\n: y\n";
        parser.set_input_string(&mut bytes);
        let err = Document::load(&mut parser).unwrap_err();
        assert!(err.to_string().contains("duplicate mapping key"));
    }

    #[test]
    fn anchor_redefinition_shadows_for_later_aliases() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"- &a one\n- *a\n- &a two\n- *a\n";
        parser.set_input_string(&mut bytes);
        let doc = Document::load(&mut parser).unwrap();
        let root = doc.root_id().unwrap();
        let crate::NodeData::Sequence { items, .. } = &doc.get_node(root).unwrap().data else {
            panic!("expected sequence");
        };
        assert_eq!(items.len(), 4);
        // The first alias kept the first binding; the second alias sees the
        // shadowing one.
        assert_eq!(doc.scalar_value(items[1]), Some("one"));
        assert_eq!(items[0], items[1]);
        assert_eq!(doc.scalar_value(items[3]), Some("two"));
        assert_eq!(items[2], items[3]);
    }

    #[test]
    fn undefined_alias_is_an_error() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"- *nowhere\n";
        parser.set_input_string(&mut bytes);
        let err = Document::load(&mut parser).unwrap_err();
        assert!(err.to_string().contains("undefined alias"));
    }

    #[test]
    fn aliased_nodes_are_shared_by_id() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"base: &b {x: 1}\ncopy: *b\n";
        parser.set_input_string(&mut bytes);
        let doc = Document::load(&mut parser).unwrap();
        let root = doc.root_id().unwrap();
        let crate::NodeData::Mapping { pairs, .. } = &doc.get_node(root).unwrap().data else {
            panic!("expected mapping");
        };
        assert_eq!(pairs[0].value, pairs[1].value);
    }
}

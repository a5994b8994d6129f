use crate::builder::DocumentBuilder;
use crate::path::{Path, PathComponent, PathKey};
use crate::{
    ComposerError, Document, DuplicateKeyPolicy, Event, EventData, Parser, ScalarStyle,
};

/// What the callback wants the composer to do next.
///
/// Modelled as an explicit enum rather than booleans: skipping and stopping
/// compose differently.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum Compose {
    /// Keep streaming.
    Continue,
    /// Stop composing immediately.
    Stop,
    /// Ignore events until the matching end of the current subtree.
    /// Meaningful on a collection-start event; a no-op on scalars.
    SkipSubtree,
    /// Ignore the rest of the enclosing subtree, then stop.
    StopSkip,
    /// Build the current subtree into a [`Document`] fragment and deliver
    /// it as [`DocEvent::Document`]. Honoured by [`DocumentComposer`];
    /// plain [`Composer`] treats it as [`Compose::Continue`].
    Collect,
}

/// What a [`DocumentComposer`] callback receives.
pub enum DocEvent<'a> {
    /// A streamed event at the given path.
    Event(&'a Event),
    /// A subtree the callback asked to have built.
    Document(Document),
}

/// The role an arriving node plays in its enclosing collection.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum ItemRole {
    Root,
    SeqItem,
    Key,
    Value,
}

/// A document-fragment builder receiving the events of one complex key.
struct KeyCollect {
    builder: DocumentBuilder,
}

/// A fragment builder for a [`Compose::Collect`] subtree.
struct Collecting {
    builder: DocumentBuilder,
    /// Collection nesting level at which the subtree is complete again.
    until_level: usize,
}

/// Streams events to a callback while maintaining the live document
/// [`Path`].
///
/// The callback steers composition through the returned [`Compose`] value
/// and may abort it by returning an error
/// ([`ComposerError::Callback`] is meant for exactly that).
#[derive(Default)]
#[non_exhaustive]
pub struct Composer {
    path: Path,
    /// Net collection starts minus ends.
    level: usize,
    roles: Vec<ItemRole>,
    key_collects: Vec<KeyCollect>,
}

impl Composer {
    pub fn new() -> Self {
        Composer {
            path: Path::new(),
            level: 0,
            roles: Vec::with_capacity(16),
            key_collects: Vec::new(),
        }
    }

    /// The composer's current position.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Drive `parser` to the end of its stream, handing every event and the
    /// live path to `callback`.
    pub fn compose<F>(&mut self, parser: &mut Parser, mut callback: F) -> Result<(), ComposerError>
    where
        F: FnMut(&Event, &mut Path) -> Result<Compose, ComposerError>,
    {
        self.run(
            parser,
            false,
            DuplicateKeyPolicy::Warn,
            &mut |doc_event, path| match doc_event {
                DocEvent::Event(event) => callback(event, path),
                DocEvent::Document(_) => Ok(Compose::Continue),
            },
        )
    }

    /// Feed an event to every active fragment builder. Aliases that do not
    /// resolve inside the fragment are kept as `*name` scalars.
    fn feed_fragment(
        builder: &mut DocumentBuilder,
        event: &Event,
    ) -> Result<(), ComposerError> {
        if let EventData::Alias { anchor } = &event.data {
            if !builder.has_anchor(anchor) {
                let synthetic = Event::scalar(
                    None,
                    None,
                    &format!("*{anchor}"),
                    true,
                    false,
                    ScalarStyle::Plain,
                );
                return builder.process(&synthetic);
            }
        }
        builder.process(event)
    }

    /// Update the top path component for an arriving node and report the
    /// node's role.
    fn begin_item(&mut self) -> ItemRole {
        let Some(top) = self.path.last_mut() else {
            return ItemRole::Root;
        };
        match top {
            PathComponent::Sequence { index, root, .. } => {
                *root = false;
                *index += 1;
                ItemRole::SeqItem
            }
            PathComponent::Mapping {
                key, in_key, root, ..
            } => {
                if !*in_key && key.is_none() {
                    *root = false;
                    *in_key = true;
                    ItemRole::Key
                } else {
                    *in_key = false;
                    ItemRole::Value
                }
            }
        }
    }

    /// A completed value releases its key (and the key's user data).
    fn end_item(&mut self, role: ItemRole) {
        if role == ItemRole::Value {
            if let Some(PathComponent::Mapping { key, key_data, .. }) = self.path.last_mut() {
                *key = None;
                *key_data = None;
            }
        }
    }

    pub(crate) fn run(
        &mut self,
        parser: &mut Parser,
        collect_enabled: bool,
        policy: DuplicateKeyPolicy,
        callback: &mut dyn FnMut(DocEvent<'_>, &mut Path) -> Result<Compose, ComposerError>,
    ) -> Result<(), ComposerError> {
        let mut skip_until: Option<usize> = None;
        let mut stop_after_skip = false;
        let mut collecting: Option<Collecting> = None;

        loop {
            let event = parser.parse()?;

            let role = match &event.data {
                EventData::Scalar { .. } | EventData::Alias { .. } => {
                    let role = self.begin_item();
                    if role == ItemRole::Key {
                        let text = match &event.data {
                            EventData::Scalar { value, .. } => value.clone(),
                            EventData::Alias { anchor } => format!("*{anchor}"),
                            _ => unreachable!(),
                        };
                        if let Some(PathComponent::Mapping { key, .. }) = self.path.last_mut() {
                            *key = Some(PathKey::Scalar(text));
                        }
                    }
                    Some(role)
                }
                EventData::SequenceStart { .. } | EventData::MappingStart { .. } => {
                    let role = self.begin_item();
                    if role == ItemRole::Key {
                        // The key is itself a collection: its own path gets
                        // built with the current one as parent.
                        let child = Path::new();
                        let outer = core::mem::replace(&mut self.path, child);
                        self.path.set_parent(Box::new(outer));
                        self.key_collects.push(KeyCollect {
                            builder: DocumentBuilder::fragment(policy),
                        });
                    }
                    let component = if matches!(event.data, EventData::SequenceStart { .. }) {
                        PathComponent::sequence()
                    } else {
                        PathComponent::mapping()
                    };
                    self.path.push(component);
                    self.roles.push(role);
                    self.level += 1;
                    Some(role)
                }
                _ => None,
            };

            let is_node_event = role.is_some()
                || matches!(
                    event.data,
                    EventData::SequenceEnd | EventData::MappingEnd
                );

            if is_node_event {
                for collect in &mut self.key_collects {
                    Self::feed_fragment(&mut collect.builder, &event)?;
                }
                if let Some(collecting) = collecting.as_mut() {
                    Self::feed_fragment(&mut collecting.builder, &event)?;
                }
            }

            let suppressed = skip_until.is_some() || collecting.is_some();
            let mut result = Compose::Continue;
            if !suppressed {
                result = callback(DocEvent::Event(&event), &mut self.path)?;
            }

            // Post-processing: close collections, settle keys and values.
            match &event.data {
                EventData::Scalar { .. } | EventData::Alias { .. } => {
                    self.end_item(role.expect("scalar role"));
                }
                EventData::SequenceEnd | EventData::MappingEnd => {
                    self.path.pop();
                    let closed_role = self.roles.pop();
                    self.level = self.level.saturating_sub(1);
                    if self.path.depth() == 0 && self.path.parent().is_some() {
                        // A complex key just finished: restore the outer
                        // path and record the key fragment on it.
                        let outer = self.path.take_parent().expect("parent path");
                        self.path = *outer;
                        let mut collect =
                            self.key_collects.pop().expect("active key collect");
                        let fragment = collect
                            .builder
                            .take_fragment()
                            .expect("complex key fragment");
                        if let Some(PathComponent::Mapping { key, .. }) = self.path.last_mut()
                        {
                            *key = Some(PathKey::Complex(fragment));
                        }
                    } else if closed_role == Some(ItemRole::Value) {
                        // A value collection releases its mapping's key.
                        self.end_item(ItemRole::Value);
                    }
                }
                _ => {}
            }

            // Skip and collect bookkeeping keyed off the post-event level.
            if let Some(limit) = skip_until {
                if self.level <= limit {
                    skip_until = None;
                    if stop_after_skip {
                        return Ok(());
                    }
                }
            }
            if let Some(active) = collecting.as_mut() {
                let finished = match &event.data {
                    EventData::SequenceEnd | EventData::MappingEnd => {
                        self.level <= active.until_level
                    }
                    _ => false,
                };
                if finished {
                    let fragment = active
                        .builder
                        .take_fragment()
                        .expect("collected fragment");
                    collecting = None;
                    if let Compose::Stop = callback(DocEvent::Document(fragment), &mut self.path)? {
                        return Ok(());
                    }
                }
            }

            match result {
                Compose::Continue => {}
                Compose::Stop => return Ok(()),
                Compose::SkipSubtree => {
                    if matches!(
                        event.data,
                        EventData::SequenceStart { .. } | EventData::MappingStart { .. }
                    ) {
                        skip_until = Some(self.level - 1);
                    }
                }
                Compose::StopSkip => {
                    if self.level == 0 {
                        return Ok(());
                    }
                    skip_until = Some(self.level - 1);
                    stop_after_skip = true;
                }
                Compose::Collect => {
                    if collect_enabled {
                        match &event.data {
                            EventData::SequenceStart { .. } | EventData::MappingStart { .. } => {
                                let mut builder = DocumentBuilder::fragment(policy);
                                Self::feed_fragment(&mut builder, &event)?;
                                collecting = Some(Collecting {
                                    builder,
                                    until_level: self.level - 1,
                                });
                            }
                            EventData::Scalar { .. } | EventData::Alias { .. } => {
                                let mut builder = DocumentBuilder::fragment(policy);
                                Self::feed_fragment(&mut builder, &event)?;
                                let fragment = builder
                                    .take_fragment()
                                    .expect("scalar fragment");
                                if let Compose::Stop =
                                    callback(DocEvent::Document(fragment), &mut self.path)?
                                {
                                    return Ok(());
                                }
                            }
                            _ => {}
                        }
                    }
                }
            }

            if let EventData::StreamEnd = event.data {
                return Ok(());
            }
        }
    }
}

/// A composer with a document-builder delegate: callbacks can request the
/// DOM of a specific subtree with [`Compose::Collect`] while the rest of the
/// stream stays event-driven.
#[non_exhaustive]
pub struct DocumentComposer {
    composer: Composer,
    policy: DuplicateKeyPolicy,
}

impl Default for DocumentComposer {
    fn default() -> Self {
        Self::new(DuplicateKeyPolicy::default())
    }
}

impl DocumentComposer {
    pub fn new(policy: DuplicateKeyPolicy) -> Self {
        DocumentComposer {
            composer: Composer::new(),
            policy,
        }
    }

    pub fn compose<F>(&mut self, parser: &mut Parser, mut callback: F) -> Result<(), ComposerError>
    where
        F: FnMut(DocEvent<'_>, &mut Path) -> Result<Compose, ComposerError>,
    {
        let policy = self.policy;
        self.composer.run(parser, true, policy, &mut callback)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn with_parser<T>(input: &str, f: impl FnOnce(&mut Parser) -> T) -> T {
        let mut parser = Parser::new();
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        f(&mut parser)
    }

    #[test]
    fn scalar_values_arrive_with_full_paths() {
        let recorded = with_parser("users:\n  - name: x\n  - name: y\n", |parser| {
            let mut recorded = Vec::new();
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, path| {
                    if let EventData::Scalar { value, .. } = &event.data {
                        if !path.last().is_some_and(PathComponent::in_key) {
                            recorded.push(format!("{path}: {value}"));
                        }
                    }
                    Ok(Compose::Continue)
                })
                .unwrap();
            recorded
        });
        assert_eq!(recorded, ["/users/0/name: x", "/users/1/name: y"]);
    }

    #[test]
    fn depth_tracks_net_start_end_count() {
        with_parser("a:\n  - [1, {b: 2}]\n", |parser| {
            let mut net: i64 = 0;
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, path| {
                    match &event.data {
                        EventData::SequenceStart { .. } | EventData::MappingStart { .. } => {
                            net += 1;
                            assert_eq!(path.depth() as i64, net);
                        }
                        EventData::SequenceEnd | EventData::MappingEnd => {
                            // The end event is delivered with its component
                            // still on the path.
                            assert_eq!(path.depth() as i64, net);
                            net -= 1;
                        }
                        _ => assert_eq!(path.depth() as i64, net),
                    }
                    Ok(Compose::Continue)
                })
                .unwrap();
            assert_eq!(net, 0);
        });
    }

    #[test]
    fn complex_keys_get_a_parent_path() {
        with_parser("? [1,2]\n: 3\n", |parser| {
            let mut saw_parent = false;
            let mut value_path = String::new();
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, path| {
                    if path.parent().is_some() {
                        saw_parent = true;
                    }
                    if let EventData::Scalar { value, .. } = &event.data {
                        if value == "3" {
                            value_path = path.to_string();
                        }
                    }
                    Ok(Compose::Continue)
                })
                .unwrap();
            assert!(saw_parent, "complex key events never saw a parent path");
            assert_eq!(value_path, "/[1, 2]");
        });
    }

    #[test]
    fn start_skip_suppresses_the_subtree() {
        let recorded = with_parser("a: [1, 2]\nb: 3\n", |parser| {
            let mut recorded = Vec::new();
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, path| match &event.data {
                    EventData::SequenceStart { .. } => Ok(Compose::SkipSubtree),
                    EventData::Scalar { value, .. } => {
                        recorded.push(format!("{path}:{value}"));
                        Ok(Compose::Continue)
                    }
                    _ => Ok(Compose::Continue),
                })
                .unwrap();
            recorded
        });
        // The sequence items 1 and 2 were skipped; keys and the b value
        // still stream.
        assert_eq!(recorded, ["/a:a", "/b:b", "/b:3"]);
    }

    #[test]
    fn user_data_survives_until_the_component_pops() {
        with_parser("a: [1, 2]\nb: 3\n", |parser| {
            let mut seen_inside = 0usize;
            let mut seen_outside = 0usize;
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, path| {
                    match &event.data {
                        EventData::SequenceStart { .. } => {
                            path.last_mut().unwrap().set_user_data(Box::new(41u32));
                        }
                        EventData::Scalar { .. } => {
                            let tagged = path
                                .last()
                                .and_then(PathComponent::user_data)
                                .and_then(|d| d.downcast_ref::<u32>())
                                .is_some();
                            if tagged {
                                seen_inside += 1;
                            } else {
                                seen_outside += 1;
                            }
                        }
                        _ => {}
                    }
                    Ok(Compose::Continue)
                })
                .unwrap();
            // The two sequence items see the data; the mapping keys and the
            // "3" value do not, because the component popped.
            assert_eq!(seen_inside, 2);
            assert_eq!(seen_outside, 3);
        });
    }

    #[test]
    fn stop_skip_consumes_the_rest_of_the_subtree() {
        let recorded = with_parser("a: [1, 2, 3]\nb: 4\n", |parser| {
            let mut recorded = Vec::new();
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, _path| {
                    if let EventData::Scalar { value, .. } = &event.data {
                        recorded.push(value.clone());
                        if value == "1" {
                            return Ok(Compose::StopSkip);
                        }
                    }
                    Ok(Compose::Continue)
                })
                .unwrap();
            recorded
        });
        // Composition stops once the sequence containing "1" closes; "2",
        // "3" and the b pair never stream.
        assert_eq!(recorded, ["a", "1"]);
    }

    #[test]
    fn stop_ends_composition_early() {
        let count = with_parser("a: 1\nb: 2\n", |parser| {
            let mut count = 0usize;
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, _path| {
                    if let EventData::Scalar { .. } = &event.data {
                        count += 1;
                        if count == 1 {
                            return Ok(Compose::Stop);
                        }
                    }
                    Ok(Compose::Continue)
                })
                .unwrap();
            count
        });
        assert_eq!(count, 1);
    }

    #[test]
    fn callback_errors_abort_composition() {
        let err = with_parser("a: 1\n", |parser| {
            let mut composer = Composer::new();
            composer
                .compose(parser, |event, _path| match &event.data {
                    EventData::Scalar { .. } => Err(ComposerError::Callback {
                        reason: String::from("enough"),
                    }),
                    _ => Ok(Compose::Continue),
                })
                .unwrap_err()
        });
        assert!(matches!(err, ComposerError::Callback { .. }));
    }

    #[test]
    fn collect_builds_the_requested_subtree() {
        let input = "users:\n  - name: x\n  - name: y\n";
        let collected = with_parser(input, |parser| {
            let mut collected = None;
            let mut composer = DocumentComposer::default();
            composer
                .compose(parser, |doc_event, path| match doc_event {
                    DocEvent::Event(event) => {
                        if matches!(event.data, EventData::SequenceStart { .. })
                            && path.to_string() == "/users"
                        {
                            Ok(Compose::Collect)
                        } else {
                            Ok(Compose::Continue)
                        }
                    }
                    DocEvent::Document(doc) => {
                        collected = Some(doc);
                        Ok(Compose::Continue)
                    }
                })
                .unwrap();
            collected.unwrap()
        });
        let root = collected.root_id().unwrap();
        let crate::NodeData::Sequence { items, .. } =
            &collected.get_node(root).unwrap().data
        else {
            panic!("expected the users sequence");
        };
        assert_eq!(items.len(), 2);
    }

    #[test]
    fn identity_composition_matches_load() {
        let input = "a:\n  - 1\n  - b: 2\n";
        let via_collect = with_parser(input, |parser| {
            let mut collected = None;
            let mut composer = DocumentComposer::default();
            composer
                .compose(parser, |doc_event, _path| match doc_event {
                    DocEvent::Event(event) => {
                        if matches!(event.data, EventData::MappingStart { .. })
                            && collected.is_none()
                        {
                            Ok(Compose::Collect)
                        } else {
                            Ok(Compose::Continue)
                        }
                    }
                    DocEvent::Document(doc) => {
                        collected = Some(doc);
                        Ok(Compose::Continue)
                    }
                })
                .unwrap();
            collected.unwrap()
        });
        let via_load = with_parser(input, |parser| Document::load(parser).unwrap());
        assert_eq!(
            via_collect.to_flow_string().unwrap(),
            via_load.to_flow_string().unwrap()
        );
    }
}


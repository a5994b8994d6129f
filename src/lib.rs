#![doc = include_str!("../README.md")]
#![allow(non_snake_case)]
#![warn(clippy::pedantic)]
#![allow(
    clippy::cast_lossless,
    clippy::cast_possible_truncation,
    clippy::cast_possible_wrap,
    clippy::cast_sign_loss,
    clippy::fn_params_excessive_bools,
    clippy::manual_range_contains,
    clippy::missing_panics_doc,
    clippy::missing_errors_doc,
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::needless_pass_by_value,
    clippy::struct_excessive_bools,
    clippy::too_many_arguments,
    clippy::too_many_lines
)]
#![deny(unsafe_code)]

#[macro_use]
mod macros;

mod builder;
mod composer;
mod document;
mod dumper;
mod emitter;
mod error;
mod event;
mod iterator;
mod parser;
mod path;
mod reader;
mod scanner;
mod schema;
mod token;
mod writer;
mod ypath;

pub use crate::builder::{DocumentBuilder, DuplicateKeyPolicy};
pub use crate::composer::{Compose, Composer, DocEvent, DocumentComposer};
pub use crate::document::*;
pub use crate::emitter::{Emitter, FlowMode};
pub use crate::error::*;
pub use crate::event::*;
pub use crate::iterator::{DocumentIterator, IterScope};
pub use crate::parser::*;
pub use crate::path::{Path, PathComponent, PathKey, UserData};
pub use crate::scanner::Scanner;
pub use crate::schema::resolve_plain_scalar;
pub use crate::token::*;
pub use crate::ypath::{ArithOp, CmpOp, NodeFilter, PathExpr, WalkResult, Ypath};

pub(crate) const INPUT_RAW_BUFFER_SIZE: usize = 16384;
pub(crate) const OUTPUT_BUFFER_SIZE: usize = 16384;

/// The tag `!!null` with the only possible value: `null`.
pub const NULL_TAG: &str = "tag:yaml.org,2002:null";
/// The tag `!!bool` with the values: `true` and `false`.
pub const BOOL_TAG: &str = "tag:yaml.org,2002:bool";
/// The tag `!!str` for string values.
pub const STR_TAG: &str = "tag:yaml.org,2002:str";
/// The tag `!!int` for integer values.
pub const INT_TAG: &str = "tag:yaml.org,2002:int";
/// The tag `!!float` for float values.
pub const FLOAT_TAG: &str = "tag:yaml.org,2002:float";

/// The tag `!!seq` is used to denote sequences.
pub const SEQ_TAG: &str = "tag:yaml.org,2002:seq";
/// The tag `!!map` is used to denote mapping.
pub const MAP_TAG: &str = "tag:yaml.org,2002:map";

/// The default scalar tag is `!!str`.
pub const DEFAULT_SCALAR_TAG: &str = STR_TAG;
/// The default sequence tag is `!!seq`.
pub const DEFAULT_SEQUENCE_TAG: &str = SEQ_TAG;
/// The default mapping tag is `!!map`.
pub const DEFAULT_MAPPING_TAG: &str = MAP_TAG;

/// The version directive data.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[non_exhaustive]
pub struct VersionDirective {
    /// The major version number.
    pub major: i32,
    /// The minor version number.
    pub minor: i32,
}

/// The tag directive data.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct TagDirective {
    /// The tag handle.
    pub handle: String,
    /// The tag prefix.
    pub prefix: String,
}

/// The stream encoding.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum Encoding {
    /// Let the parser choose the encoding.
    #[default]
    Any = 0,
    /// The default UTF-8 encoding.
    Utf8 = 1,
    /// The UTF-16-LE encoding with BOM.
    Utf16Le = 2,
    /// The UTF-16-BE encoding with BOM.
    Utf16Be = 3,
    /// The UTF-32-LE encoding with BOM.
    Utf32Le = 4,
    /// The UTF-32-BE encoding with BOM.
    Utf32Be = 5,
}

/// Line break type.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum Break {
    /// Let the parser choose the break type.
    #[default]
    Any = 0,
    /// Use CR for line breaks (Mac style).
    Cr = 1,
    /// Use LN for line breaks (Unix style).
    Ln = 2,
    /// Use CR LN for line breaks (DOS style).
    CrLn = 3,
}

/// The language convention the scanner and the tag resolver follow.
///
/// The convention selects the plain-scalar resolution ladder and, for
/// [`ParseMode::Json`], restricts the scanner to JSON's strict subset.
/// A `%YAML` directive inside the stream overrides the version part of the
/// convention for its document.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum ParseMode {
    /// The YAML 1.1 conventions (`yes`/`no` booleans, `0b` integers, `_`
    /// digit separators).
    Yaml11,
    /// The YAML 1.2 core schema conventions.
    #[default]
    Yaml12,
    /// YAML 1.3. Resolution follows the 1.2 core schema.
    Yaml13,
    /// Strict JSON: flow-only syntax, JSON escapes, JSON resolution.
    Json,
}

/// Scalar styles.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum ScalarStyle {
    /// Let the emitter choose the style.
    #[default]
    Any = 0,
    /// The plain scalar style.
    Plain = 1,
    /// The single-quoted scalar style.
    SingleQuoted = 2,
    /// The double-quoted scalar style.
    DoubleQuoted = 3,
    /// The literal scalar style.
    Literal = 4,
    /// The folded scalar style.
    Folded = 5,
}

/// Sequence styles.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum SequenceStyle {
    /// Let the emitter choose the style.
    Any = 0,
    /// The block sequence style.
    Block = 1,
    /// The flow sequence style.
    Flow = 2,
}

/// Mapping styles.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum MappingStyle {
    /// Let the emitter choose the style.
    Any = 0,
    /// The block mapping style.
    Block = 1,
    /// The flow mapping style.
    Flow = 2,
}

/// The three chomping modes of block scalars.
#[derive(Copy, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Debug)]
#[non_exhaustive]
pub enum Chomping {
    /// Drop the trailing line break (`-`).
    Strip,
    /// Keep a single trailing line break.
    #[default]
    Clip,
    /// Keep all trailing line breaks (`+`).
    Keep,
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    #[test]
    fn sanity() {
        const SANITY_INPUT: &str = r#"
unicode: "Sosa did fine.☺"
control: "\b1998\t1999\t2000\n"
hex esc: "\x0d\x0a is \r\n"

single: '"Howdy!" he cried.'
quoted: ' # Not a ''comment''.'
tie-fighter: '|\-*-/|'
"#;
        let mut parser = Parser::new();
        let mut read_in = SANITY_INPUT.as_bytes();
        parser.set_input_string(&mut read_in);
        let doc = Document::load(&mut parser).unwrap();
        let root = doc.root_id().unwrap();
        let Some(Node {
            data: NodeData::Mapping { pairs, .. },
            ..
        }) = doc.get_node(root)
        else {
            panic!("expected a mapping root");
        };
        assert_eq!(pairs.len(), 6);
    }

    fn parse_all(input: &str, mode: ParseMode) -> Vec<Event> {
        let mut parser = Parser::new();
        parser.set_mode(mode);
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        let mut events = Vec::new();
        loop {
            let event = parser.parse().unwrap();
            let done = matches!(event.data, EventData::StreamEnd);
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    fn emit_all(events: Vec<Event>) -> String {
        let mut out = Vec::new();
        let mut emitter = Emitter::new();
        emitter.set_output(&mut out);
        for event in events {
            emitter.emit(event).unwrap();
        }
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn block_mapping_event_stream() {
        let events = parse_all("a: 1\nb: 2\n", ParseMode::Yaml12);
        let kinds: Vec<&str> = events
            .iter()
            .map(|e| match &e.data {
                EventData::StreamStart { .. } => "SS",
                EventData::StreamEnd => "SE",
                EventData::DocumentStart { implicit: true, .. } => "DS(implicit)",
                EventData::DocumentStart { .. } => "DS",
                EventData::DocumentEnd { implicit: true } => "DE(implicit)",
                EventData::DocumentEnd { .. } => "DE",
                EventData::MappingStart { .. } => "MapS",
                EventData::MappingEnd => "MapE",
                EventData::SequenceStart { .. } => "SeqS",
                EventData::SequenceEnd => "SeqE",
                EventData::Scalar { .. } => "Scalar",
                EventData::Alias { .. } => "Alias",
            })
            .collect();
        assert_eq!(
            kinds,
            [
                "SS",
                "DS(implicit)",
                "MapS",
                "Scalar",
                "Scalar",
                "Scalar",
                "Scalar",
                "MapE",
                "DE(implicit)",
                "SE"
            ]
        );
        for event in &events {
            if let EventData::Scalar {
                plain_implicit,
                quoted_implicit,
                style,
                ..
            } = &event.data
            {
                assert_eq!(*style, ScalarStyle::Plain);
                assert!(*plain_implicit && !*quoted_implicit);
            }
        }
    }

    #[test]
    fn block_mapping_roundtrip() {
        let input = "a: 1\nb: 2\n";
        assert_eq!(emit_all(parse_all(input, ParseMode::Yaml12)), input);
    }

    #[test]
    fn flow_sequence_events_and_ypath() {
        let events = parse_all("[1, 2, 3]", ParseMode::Yaml12);
        let scalars: Vec<&str> = events
            .iter()
            .filter_map(|e| match &e.data {
                EventData::Scalar { value, .. } => Some(value.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(scalars, ["1", "2", "3"]);
        assert!(events.iter().any(|e| matches!(
            e.data,
            EventData::SequenceStart {
                style: SequenceStyle::Flow,
                ..
            }
        )));

        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"[1, 2, 3]";
        parser.set_input_string(&mut bytes);
        let doc = Document::load(&mut parser).unwrap();
        let hits = Ypath::compile("/*").unwrap().query(&doc).unwrap();
        let values: Vec<&str> = hits.iter().map(|&id| doc.scalar_value(id).unwrap()).collect();
        assert_eq!(values, ["1", "2", "3"]);
    }

    #[test]
    fn empty_stream_is_start_end_only() {
        let events = parse_all("", ParseMode::Yaml12);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0].data, EventData::StreamStart { .. }));
        assert!(matches!(events[1].data, EventData::StreamEnd));
    }

    #[test]
    fn bare_document_start_is_null_scalar() {
        let events = parse_all("---\n", ParseMode::Yaml12);
        assert!(matches!(
            events[1].data,
            EventData::DocumentStart {
                implicit: false,
                ..
            }
        ));
        let EventData::Scalar {
            value,
            plain_implicit,
            tag,
            ..
        } = &events[2].data
        else {
            panic!("expected a scalar event, got {:?}", events[2].data);
        };
        assert_eq!(value, "");
        assert!(*plain_implicit);
        assert_eq!(tag.as_deref(), Some(NULL_TAG));
    }

    #[test]
    fn document_indicator_prefix_is_quoted_on_emit() {
        let mut out = Vec::new();
        let mut emitter = Emitter::new();
        emitter.set_output(&mut out);
        emitter.emit(Event::stream_start(Encoding::Utf8)).unwrap();
        emitter.emit(Event::document_start(None, &[], true)).unwrap();
        emitter
            .emit(Event::scalar(
                None,
                None,
                "---foo",
                true,
                true,
                ScalarStyle::Plain,
            ))
            .unwrap();
        emitter.emit(Event::document_end(true)).unwrap();
        emitter.emit(Event::stream_end()).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text, "'---foo'\n");
    }

    #[test]
    fn version_directive_and_complex_key() {
        let events = parse_all("%YAML 1.1\n---\n? [1,2]\n: 3\n", ParseMode::Yaml11);
        let EventData::DocumentStart {
            version_directive,
            implicit,
            ..
        } = &events[1].data
        else {
            panic!("expected document start");
        };
        assert_eq!(
            *version_directive,
            Some(VersionDirective { major: 1, minor: 1 })
        );
        assert!(!*implicit);

        let mut parser = Parser::new();
        parser.set_mode(ParseMode::Yaml11);
        let mut bytes: &[u8] = b"%YAML 1.1\n---\n? [1,2]\n: 3\n";
        parser.set_input_string(&mut bytes);
        let doc = Document::load(&mut parser).unwrap();
        let root = doc.root_id().unwrap();
        let NodeData::Mapping { pairs, .. } = &doc.get_node(root).unwrap().data else {
            panic!("expected mapping root");
        };
        assert_eq!(pairs.len(), 1);
        let NodeData::Sequence { items, .. } = &doc.get_node(pairs[0].key).unwrap().data else {
            panic!("expected sequence key");
        };
        assert_eq!(items.len(), 2);
        assert_eq!(doc.scalar_value(pairs[0].value), Some("3"));
    }

    #[test]
    fn literal_block_scalar_roundtrip() {
        let input = "key: |\n  line1\n  line2\n";
        let events = parse_all(input, ParseMode::Yaml12);
        let EventData::Scalar { value, style, .. } = &events[4].data else {
            panic!("expected the value scalar");
        };
        assert_eq!(value, "line1\nline2\n");
        assert_eq!(*style, ScalarStyle::Literal);
        assert_eq!(emit_all(events), input);
    }

    #[test]
    fn users_name_paths() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"users:\n  - name: x\n  - name: y\n";
        parser.set_input_string(&mut bytes);
        let doc = Document::load(&mut parser).unwrap();

        let one = Ypath::compile("/users/0/name").unwrap().query(&doc).unwrap();
        assert_eq!(one.len(), 1);
        assert_eq!(doc.scalar_value(one[0]), Some("x"));

        let all = Ypath::compile("/users/*/name").unwrap().query(&doc).unwrap();
        let values: Vec<&str> = all.iter().map(|&id| doc.scalar_value(id).unwrap()).collect();
        assert_eq!(values, ["x", "y"]);
    }

    #[test]
    fn two_document_anchor_scopes() {
        let mut parser = Parser::new();
        let mut bytes: &[u8] = b"&a foo\n---\nbar\n";
        parser.set_input_string(&mut bytes);
        let first = Document::load(&mut parser).unwrap();
        let second = Document::load(&mut parser).unwrap();
        assert!(first.resolve_anchor("a").is_some());
        assert!(second.resolve_anchor("a").is_none());

        let err = Ypath::compile("*a").unwrap().query(&second).unwrap_err();
        assert!(matches!(err, YpathError::UnresolvedAlias { .. }));
    }

    #[test]
    fn marks_are_ordered() {
        let events = parse_all("a: [1, 2]\nb: |\n  text\n", ParseMode::Yaml12);
        for event in &events {
            let s = event.start_mark;
            let e = event.end_mark;
            assert!(
                (s.index, s.line, s.column) <= (e.index, e.line, e.column),
                "unordered marks on {:?}",
                event.data
            );
        }
    }
}

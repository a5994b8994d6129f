use crate::iterator::{DocumentIterator, IterScope};
use crate::{Document, Emitter, EmitterError, Encoding, Event, FlowMode};

impl Emitter<'_> {
    /// Start a YAML stream.
    ///
    /// Called implicitly by the first [`Document::dump`] on this emitter.
    pub fn open(&mut self) -> Result<(), EmitterError> {
        assert!(!self.opened, "emitter already opened");
        self.emit(Event::stream_start(Encoding::Any))?;
        self.opened = true;
        Ok(())
    }

    /// Finish a YAML stream.
    pub fn close(&mut self) -> Result<(), EmitterError> {
        assert!(self.opened, "emitter was never opened");
        if self.closed {
            return Ok(());
        }
        self.emit(Event::stream_end())?;
        self.closed = true;
        Ok(())
    }
}

impl Document {
    /// Serialise the document through `emitter`.
    ///
    /// The stream is opened on first use; call [`Emitter::close`] after the
    /// last document. The document is replayed by a
    /// [`DocumentIterator`], so deeply nested trees do not recurse.
    pub fn dump(&self, emitter: &mut Emitter) -> Result<(), EmitterError> {
        if !emitter.opened {
            emitter.open()?;
        }
        if self.root_id().is_none() {
            return emitter.close();
        }
        let mut iter = DocumentIterator::new(self, IterScope::Document);
        while let Some(event) = iter.next_event() {
            emitter.emit(event)?;
        }
        Ok(())
    }

    /// Serialise the document to a UTF-8 string with default settings.
    pub fn to_yaml_string(&self) -> Result<String, EmitterError> {
        let mut out = Vec::new();
        let mut emitter = Emitter::new();
        emitter.set_output(&mut out);
        self.dump(&mut emitter)?;
        emitter.close()?;
        drop(emitter);
        Ok(String::from_utf8(out).expect("emitter produced invalid UTF-8"))
    }

    /// Serialise the document on a single flow line, as used for complex
    /// keys in path displays.
    pub fn to_flow_string(&self) -> Result<String, EmitterError> {
        let mut out = Vec::new();
        let mut emitter = Emitter::new();
        emitter.set_output(&mut out);
        emitter.set_flow(FlowMode::FlowOneline);
        self.dump(&mut emitter)?;
        emitter.close()?;
        drop(emitter);
        Ok(String::from_utf8(out).expect("emitter produced invalid UTF-8"))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use crate::{Document, Parser};

    fn load(input: &str) -> Document {
        let mut parser = Parser::new();
        let mut bytes = input.as_bytes();
        parser.set_input_string(&mut bytes);
        Document::load(&mut parser).unwrap()
    }

    #[test]
    fn dump_roundtrips_block_documents() {
        let input = "users:\n- name: x\n- name: y\n";
        assert_eq!(load(input).to_yaml_string().unwrap(), input);
    }

    #[test]
    fn flow_string_is_one_line() {
        let doc = load("a:\n  - 1\n  - 2\n");
        assert_eq!(doc.to_flow_string().unwrap(), "{a: [1, 2]}\n");
    }

    #[test]
    fn anchors_and_aliases_are_preserved() {
        let input = "base: &b\n  x: 1\ncopy: *b\n";
        let out = load(input).to_yaml_string().unwrap();
        assert!(out.contains("&b"), "anchor missing in {out:?}");
        assert!(out.contains("*b"), "alias missing in {out:?}");
    }

    #[test]
    fn dumping_multiple_documents_adds_markers() {
        let first = load("one\n");
        let second = load("two\n");
        let mut out = Vec::new();
        let mut emitter = crate::Emitter::new();
        emitter.set_output(&mut out);
        first.dump(&mut emitter).unwrap();
        second.dump(&mut emitter).unwrap();
        emitter.close().unwrap();
        drop(emitter);
        assert_eq!(String::from_utf8(out).unwrap(), "one\n--- two\n");
    }
}

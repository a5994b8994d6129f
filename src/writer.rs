use crate::{Emitter, Encoding, WriterError};

impl Emitter<'_> {
    /// Flush the accumulated characters to the output, encoding them as the
    /// configured stream encoding.
    pub fn flush(&mut self) -> Result<(), WriterError> {
        assert!(self.write_handler.is_some());
        assert_ne!(self.encoding, Encoding::Any);

        if self.buffer.is_empty() {
            return Ok(());
        }

        if self.encoding == Encoding::Utf8 {
            let to_emit = self.buffer.as_bytes();
            self.write_handler
                .as_mut()
                .expect("non-null writer")
                .write_all(to_emit)?;
            self.buffer.clear();
            return Ok(());
        }

        match self.encoding {
            Encoding::Utf16Le | Encoding::Utf16Be => {
                let big_endian = self.encoding == Encoding::Utf16Be;
                for unit in self.buffer.encode_utf16() {
                    let bytes = if big_endian {
                        unit.to_be_bytes()
                    } else {
                        unit.to_le_bytes()
                    };
                    self.raw_buffer.extend(bytes);
                }
            }
            Encoding::Utf32Le | Encoding::Utf32Be => {
                let big_endian = self.encoding == Encoding::Utf32Be;
                for ch in self.buffer.chars() {
                    let bytes = if big_endian {
                        (ch as u32).to_be_bytes()
                    } else {
                        (ch as u32).to_le_bytes()
                    };
                    self.raw_buffer.extend(bytes);
                }
            }
            Encoding::Any | Encoding::Utf8 => unreachable!("unhandled encoding"),
        }

        let to_emit = self.raw_buffer.as_slice();
        self.write_handler
            .as_mut()
            .expect("non-null writer")
            .write_all(to_emit)?;
        self.buffer.clear();
        self.raw_buffer.clear();
        Ok(())
    }
}

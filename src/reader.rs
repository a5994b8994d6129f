use std::collections::VecDeque;

use crate::macros::vecdeque_starts_with;
use crate::scanner::Scanner;
use crate::{Encoding, ReaderError, INPUT_RAW_BUFFER_SIZE};

const BOM_UTF8: &[u8] = b"\xEF\xBB\xBF";
const BOM_UTF16LE: &[u8] = b"\xFF\xFE";
const BOM_UTF16BE: &[u8] = b"\xFE\xFF";
const BOM_UTF32LE: &[u8] = b"\xFF\xFE\x00\x00";
const BOM_UTF32BE: &[u8] = b"\x00\x00\xFE\xFF";

fn utf8_char_width_and_initial_value(initial: u8) -> (usize, u32) {
    let initial = initial as u32;
    if initial & 0x80 == 0 {
        (1, initial & 0x7f)
    } else if initial & 0xE0 == 0xC0 {
        (2, initial & 0x1f)
    } else if initial & 0xF0 == 0xE0 {
        (3, initial & 0x0f)
    } else if initial & 0xF8 == 0xF0 {
        (4, initial & 0x07)
    } else {
        (0, 0)
    }
}

enum Utf8Error {
    /// The sequence continues past the bytes read so far. Not fatal unless
    /// the stream has ended: a refill may complete it.
    Incomplete,
    InvalidLeadingOctet,
    InvalidTrailingOctet(usize),
    InvalidLength,
    InvalidUnicode(u32),
}

fn read_char_utf8(raw: &mut VecDeque<u8>) -> Option<Result<char, Utf8Error>> {
    let first = raw.front().copied()?;
    let (width, mut value) = utf8_char_width_and_initial_value(first);
    if width == 0 {
        return Some(Err(Utf8Error::InvalidLeadingOctet));
    }
    if raw.len() < width {
        return Some(Err(Utf8Error::Incomplete));
    }
    for (i, trailing) in raw.iter().enumerate().take(width).skip(1) {
        if trailing & 0xc0 != 0x80 {
            return Some(Err(Utf8Error::InvalidTrailingOctet(i)));
        }
        value <<= 6;
        value += *trailing as u32 & 0x3f;
    }
    if !(width == 1
        || width == 2 && value >= 0x80
        || width == 3 && value >= 0x800
        || width == 4 && value >= 0x10000)
    {
        return Some(Err(Utf8Error::InvalidLength));
    }
    if let Some(ch) = char::from_u32(value) {
        raw.drain(..width);
        Some(Ok(ch))
    } else {
        Some(Err(Utf8Error::InvalidUnicode(value)))
    }
}

enum Utf16Error {
    Incomplete,
    UnexpectedLowSurrogateArea(u32),
    ExpectedLowSurrogateArea(u32),
    InvalidUnicode(u32),
}

fn read_char_utf16<const BIG_ENDIAN: bool>(
    raw: &mut VecDeque<u8>,
) -> Option<Result<char, Utf16Error>> {
    if raw.is_empty() {
        return None;
    }
    if raw.len() < 2 {
        return Some(Err(Utf16Error::Incomplete));
    }
    let bytes = [raw[0], raw[1]];
    let mut value = if BIG_ENDIAN {
        u16::from_be_bytes(bytes) as u32
    } else {
        u16::from_le_bytes(bytes) as u32
    };
    if value & 0xfc00 == 0xdc00 {
        return Some(Err(Utf16Error::UnexpectedLowSurrogateArea(value)));
    }
    let width;
    if value & 0xfc00 == 0xd800 {
        width = 4;
        if raw.len() < width {
            return Some(Err(Utf16Error::Incomplete));
        }
        let bytes2 = [raw[2], raw[3]];
        let value2 = if BIG_ENDIAN {
            u16::from_be_bytes(bytes2) as u32
        } else {
            u16::from_le_bytes(bytes2) as u32
        };
        if value2 & 0xfc00 != 0xdc00 {
            return Some(Err(Utf16Error::ExpectedLowSurrogateArea(value2)));
        }
        value = 0x10000 + ((value & 0x3ff) << 10) + (value2 & 0x3ff);
    } else {
        width = 2;
    }

    if let Some(ch) = char::from_u32(value) {
        raw.drain(..width);
        Some(Ok(ch))
    } else {
        Some(Err(Utf16Error::InvalidUnicode(value)))
    }
}

enum Utf32Error {
    Incomplete,
    InvalidUnicode(u32),
}

fn read_char_utf32<const BIG_ENDIAN: bool>(
    raw: &mut VecDeque<u8>,
) -> Option<Result<char, Utf32Error>> {
    if raw.is_empty() {
        return None;
    }
    if raw.len() < 4 {
        return Some(Err(Utf32Error::Incomplete));
    }
    let bytes = [raw[0], raw[1], raw[2], raw[3]];
    let value = if BIG_ENDIAN {
        u32::from_be_bytes(bytes)
    } else {
        u32::from_le_bytes(bytes)
    };
    if let Some(ch) = char::from_u32(value) {
        raw.drain(..4);
        Some(Ok(ch))
    } else {
        Some(Err(Utf32Error::InvalidUnicode(value)))
    }
}

impl<'r> Scanner<'r> {
    fn set_reader_error<T>(
        &mut self,
        problem: &'static str,
        offset: usize,
        value: i32,
    ) -> Result<T, ReaderError> {
        Err(ReaderError::Problem {
            problem,
            offset,
            value,
        })
    }

    /// Inspect the first bytes of the stream for a byte order marker.
    ///
    /// UTF-32 markers are checked before UTF-16 because the UTF-32-LE BOM
    /// starts with the UTF-16-LE one.
    fn determine_encoding(&mut self) -> Result<(), ReaderError> {
        while !self.eof && self.raw_buffer.len() < 4 {
            self.update_raw_buffer()?;
        }
        if vecdeque_starts_with(&self.raw_buffer, BOM_UTF32LE) {
            self.encoding = Encoding::Utf32Le;
            self.raw_buffer.drain(0..4);
            self.offset += 4;
        } else if vecdeque_starts_with(&self.raw_buffer, BOM_UTF32BE) {
            self.encoding = Encoding::Utf32Be;
            self.raw_buffer.drain(0..4);
            self.offset += 4;
        } else if vecdeque_starts_with(&self.raw_buffer, BOM_UTF16LE) {
            self.encoding = Encoding::Utf16Le;
            self.raw_buffer.drain(0..2);
            self.offset += 2;
        } else if vecdeque_starts_with(&self.raw_buffer, BOM_UTF16BE) {
            self.encoding = Encoding::Utf16Be;
            self.raw_buffer.drain(0..2);
            self.offset += 2;
        } else if vecdeque_starts_with(&self.raw_buffer, BOM_UTF8) {
            self.encoding = Encoding::Utf8;
            self.raw_buffer.drain(0..3);
            self.offset += 3;
        } else {
            self.encoding = Encoding::Utf8;
        }
        Ok(())
    }

    fn update_raw_buffer(&mut self) -> Result<(), ReaderError> {
        if self.raw_buffer.len() >= INPUT_RAW_BUFFER_SIZE || self.eof {
            return Ok(());
        }

        let len_before = self.raw_buffer.len();
        debug_assert!(len_before < INPUT_RAW_BUFFER_SIZE);
        self.raw_buffer.resize(INPUT_RAW_BUFFER_SIZE, 0);
        let contiguous = self.raw_buffer.make_contiguous();
        let write_to = &mut contiguous[len_before..];

        let size_read = self
            .read_handler
            .as_mut()
            .expect("non-null read handler")
            .read(write_to)?;

        let valid_size = len_before + size_read;
        self.raw_buffer.truncate(valid_size);
        if size_read == 0 {
            self.eof = true;
        }
        Ok(())
    }

    fn push_char(&mut self, ch: char) -> Result<(), ReaderError> {
        if !(ch == '\x09'
            || ch == '\x0A'
            || ch == '\x0D'
            || ch >= '\x20' && ch <= '\x7E'
            || ch == '\u{0085}'
            || ch >= '\u{00A0}' && ch <= '\u{D7FF}'
            || ch >= '\u{E000}' && ch <= '\u{FFFD}'
            || ch >= '\u{10000}' && ch <= '\u{10FFFF}')
        {
            let offset = self.offset;
            return self.set_reader_error("control characters are not allowed", offset, ch as _);
        }
        self.buffer.push_back(ch);
        self.offset += ch.len_utf8();
        self.unread += 1;
        Ok(())
    }

    /// Decode raw input until at least `length` characters are available in
    /// the look-ahead buffer, or the stream ends.
    pub(crate) fn update_buffer(&mut self, length: usize) -> Result<(), ReaderError> {
        let mut first = true;
        assert!(self.read_handler.is_some());
        if self.eof && self.raw_buffer.is_empty() {
            return Ok(());
        }
        if self.unread >= length {
            return Ok(());
        }
        if self.encoding == Encoding::Any {
            self.determine_encoding()?;
        }

        while self.unread < length {
            if self.eof && self.raw_buffer.is_empty() {
                return Ok(());
            }
            if !first || self.raw_buffer.is_empty() {
                self.update_raw_buffer()?;
            }
            first = false;
            match self.encoding {
                Encoding::Utf8 => match read_char_utf8(&mut self.raw_buffer) {
                    Some(Ok(ch)) => {
                        self.push_char(ch)?;
                    }
                    Some(Err(Utf8Error::Incomplete)) => {
                        if self.eof {
                            let offset = self.offset;
                            return self.set_reader_error(
                                "incomplete UTF-8 octet sequence",
                                offset,
                                -1,
                            );
                        }
                    }
                    Some(Err(Utf8Error::InvalidLeadingOctet)) => {
                        return Err(ReaderError::InvalidUtf8 {
                            offset: self.offset,
                            value: self.raw_buffer[0],
                        });
                    }
                    Some(Err(Utf8Error::InvalidTrailingOctet(at))) => {
                        return Err(ReaderError::InvalidUtf8 {
                            offset: self.offset + at,
                            value: self.raw_buffer[at],
                        });
                    }
                    Some(Err(Utf8Error::InvalidLength)) => {
                        let offset = self.offset;
                        return self.set_reader_error(
                            "invalid length of a UTF-8 sequence",
                            offset,
                            -1,
                        );
                    }
                    Some(Err(Utf8Error::InvalidUnicode(value))) => {
                        let offset = self.offset;
                        return self.set_reader_error(
                            "invalid Unicode character",
                            offset,
                            value as _,
                        );
                    }
                    None => (),
                },
                Encoding::Utf16Le | Encoding::Utf16Be => {
                    let res = if self.encoding == Encoding::Utf16Be {
                        read_char_utf16::<true>(&mut self.raw_buffer)
                    } else {
                        read_char_utf16::<false>(&mut self.raw_buffer)
                    };
                    match res {
                        Some(Ok(ch)) => {
                            self.push_char(ch)?;
                        }
                        Some(Err(Utf16Error::Incomplete)) => {
                            if self.eof {
                                let offset = self.offset;
                                return self.set_reader_error(
                                    "incomplete UTF-16 character",
                                    offset,
                                    -1,
                                );
                            }
                        }
                        Some(Err(Utf16Error::UnexpectedLowSurrogateArea(value)))
                        | Some(Err(Utf16Error::ExpectedLowSurrogateArea(value))) => {
                            return Err(ReaderError::InvalidUtf16 {
                                value: value as u16,
                            });
                        }
                        Some(Err(Utf16Error::InvalidUnicode(value))) => {
                            let offset = self.offset;
                            return self.set_reader_error(
                                "invalid Unicode character",
                                offset,
                                value as _,
                            );
                        }
                        None => (),
                    }
                }
                Encoding::Utf32Le | Encoding::Utf32Be => {
                    let res = if self.encoding == Encoding::Utf32Be {
                        read_char_utf32::<true>(&mut self.raw_buffer)
                    } else {
                        read_char_utf32::<false>(&mut self.raw_buffer)
                    };
                    match res {
                        Some(Ok(ch)) => {
                            self.push_char(ch)?;
                        }
                        Some(Err(Utf32Error::Incomplete)) => {
                            if self.eof {
                                let offset = self.offset;
                                return self.set_reader_error(
                                    "incomplete UTF-32 character",
                                    offset,
                                    -1,
                                );
                            }
                        }
                        Some(Err(Utf32Error::InvalidUnicode(value))) => {
                            return Err(ReaderError::InvalidUtf32 { value });
                        }
                        None => (),
                    }
                }
                Encoding::Any => unreachable!("encoding was determined above"),
            }
        }

        if self.offset >= (!0_usize).wrapping_div(2_usize) {
            let offset = self.offset;
            return self.set_reader_error("input is too long", offset, -1);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use crate::{Encoding, Parser};

    /// A reader that hands out at most three bytes per call, so multi-byte
    /// sequences get split across refills.
    struct Trickle<'a> {
        data: &'a [u8],
    }

    impl std::io::Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> std::io::Result<usize> {
            let n = self.data.len().min(3).min(buf.len());
            buf[..n].copy_from_slice(&self.data[..n]);
            self.data = &self.data[n..];
            Ok(n)
        }
    }

    impl std::io::BufRead for Trickle<'_> {
        fn fill_buf(&mut self) -> std::io::Result<&[u8]> {
            Ok(&self.data[..self.data.len().min(3)])
        }
        fn consume(&mut self, amt: usize) {
            self.data = &self.data[amt..];
        }
    }

    fn scalar_of(doc: &crate::Document) -> String {
        let root = doc.root_id().unwrap();
        doc.scalar_value(root).unwrap().to_string()
    }

    #[test]
    fn four_byte_utf8_split_across_refills() {
        let text = "k: \"ab\u{1F600}cd\"\n";
        let mut reader = Trickle {
            data: text.as_bytes(),
        };
        let mut parser = crate::Parser::new();
        parser.set_input(&mut reader);
        let doc = crate::Document::load(&mut parser).unwrap();
        let root = doc.root_id().unwrap();
        let crate::NodeData::Mapping { pairs, .. } = &doc.get_node(root).unwrap().data else {
            panic!("expected mapping");
        };
        assert_eq!(doc.scalar_value(pairs[0].value), Some("ab\u{1F600}cd"));
    }

    #[test]
    fn utf16le_bom_is_detected() {
        let mut bytes: Vec<u8> = vec![0xFF, 0xFE];
        for unit in "hi\n".encode_utf16() {
            bytes.extend(unit.to_le_bytes());
        }
        let mut input = bytes.as_slice();
        let mut parser = Parser::new();
        parser.set_input_string(&mut input);
        let doc = crate::Document::load(&mut parser).unwrap();
        assert_eq!(scalar_of(&doc), "hi");
        assert_eq!(parser.encoding(), Encoding::Utf16Le);
    }

    #[test]
    fn utf32be_bom_is_detected() {
        let mut bytes: Vec<u8> = vec![0x00, 0x00, 0xFE, 0xFF];
        for ch in "hi\n".chars() {
            bytes.extend((ch as u32).to_be_bytes());
        }
        let mut input = bytes.as_slice();
        let mut parser = Parser::new();
        parser.set_input_string(&mut input);
        let doc = crate::Document::load(&mut parser).unwrap();
        assert_eq!(scalar_of(&doc), "hi");
        assert_eq!(parser.encoding(), Encoding::Utf32Be);
    }
}

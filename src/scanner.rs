use std::collections::VecDeque;

use crate::macros::{is_blankz, is_break, vecdeque_starts_with};
use crate::{
    Break, Chomping, Encoding, Mark, ParseMode, ReaderError, ScalarStyle, ScannerError, Token,
    TokenData,
};

/// This structure holds information about a potential simple key.
#[derive(Copy, Clone)]
pub(crate) struct SimpleKey {
    /// Is a simple key possible?
    pub possible: bool,
    /// Is a simple key required?
    pub required: bool,
    /// The number of the token.
    pub token_number: usize,
    /// The position mark.
    pub mark: Mark,
    /// The non-tab column at the candidate's start.
    pub column: i64,
}

impl SimpleKey {
    fn empty() -> Self {
        SimpleKey {
            possible: false,
            required: false,
            token_number: 0,
            mark: Mark::default(),
            column: 0,
        }
    }
}

/// One level of the block indentation stack.
///
/// `mapping` records whether the scanner synthesised a block-mapping start
/// at this level (as opposed to a block-sequence start).
#[derive(Copy, Clone)]
struct IndentLevel {
    column: i64,
    mapping: bool,
}

/// The scanner turns a byte source into a lazy token queue.
#[non_exhaustive]
pub struct Scanner<'r> {
    /// Read handler.
    pub(crate) read_handler: Option<&'r mut dyn std::io::BufRead>,
    /// EOF flag.
    pub(crate) eof: bool,
    /// The working buffer. Always contains valid UTF-8.
    pub(crate) buffer: VecDeque<char>,
    /// The number of unread characters in the buffer.
    pub(crate) unread: usize,
    /// The raw undecoded input (possibly UTF-16 or UTF-32).
    pub(crate) raw_buffer: VecDeque<u8>,
    /// The input encoding.
    pub(crate) encoding: Encoding,
    /// The offset of the current position (in bytes).
    pub(crate) offset: usize,
    /// The mark of the current position. The column is tab-expanded.
    pub(crate) mark: Mark,
    /// The non-tab column on the current line, used for indentation
    /// decisions.
    indent_column: i64,
    tab_width: u32,
    lenient_tabs: bool,
    capture_comments: bool,
    /// Whole-line comments waiting for the next token.
    pending_comment: Option<String>,
    /// The line on which the most recently queued token ended.
    last_token_line: u64,
    /// The first line-break convention observed in the input.
    detected_break: Break,
    mode: ParseMode,
    /// Have we started to scan the input stream?
    pub(crate) stream_start_produced: bool,
    /// Have we reached the end of the input stream?
    pub(crate) stream_end_produced: bool,
    /// The number of unclosed '[' and '{' indicators.
    flow_level: i32,
    /// The tokens queue.
    pub(crate) tokens: VecDeque<Token>,
    /// The number of tokens fetched from the queue.
    pub(crate) tokens_parsed: usize,
    /// Does the tokens queue contain a token ready for dequeueing?
    pub(crate) token_available: bool,
    /// The indentation levels stack.
    indents: Vec<IndentLevel>,
    /// The current indentation level.
    indent: i64,
    /// May a simple key occur at the current position?
    simple_key_allowed: bool,
    /// The stack of simple keys.
    simple_keys: Vec<SimpleKey>,
}

impl Default for Scanner<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'r> Scanner<'r> {
    pub fn new() -> Scanner<'r> {
        Scanner {
            read_handler: None,
            eof: false,
            buffer: VecDeque::with_capacity(crate::INPUT_RAW_BUFFER_SIZE),
            unread: 0,
            raw_buffer: VecDeque::with_capacity(crate::INPUT_RAW_BUFFER_SIZE),
            encoding: Encoding::Any,
            offset: 0,
            mark: Mark::default(),
            indent_column: 0,
            tab_width: 8,
            lenient_tabs: false,
            capture_comments: false,
            pending_comment: None,
            last_token_line: u64::MAX,
            detected_break: Break::Any,
            mode: ParseMode::default(),
            stream_start_produced: false,
            stream_end_produced: false,
            flow_level: 0,
            tokens: VecDeque::with_capacity(16),
            tokens_parsed: 0,
            token_available: false,
            indents: Vec::with_capacity(16),
            indent: -1,
            simple_key_allowed: false,
            simple_keys: Vec::with_capacity(16),
        }
    }

    /// Set a string input.
    pub fn set_input_string(&mut self, input: &'r mut &[u8]) {
        assert!(self.read_handler.is_none(), "input already set");
        self.read_handler = Some(input);
    }

    /// Set a generic input handler.
    pub fn set_input(&mut self, input: &'r mut dyn std::io::BufRead) {
        assert!(self.read_handler.is_none(), "input already set");
        self.read_handler = Some(input);
    }

    /// Set the source encoding, bypassing BOM detection.
    pub fn set_encoding(&mut self, encoding: Encoding) {
        self.encoding = encoding;
    }

    /// Select the language convention (YAML 1.1/1.2/1.3 or JSON).
    pub fn set_mode(&mut self, mode: ParseMode) {
        self.mode = mode;
    }

    /// Set the tab width used to expand columns in marks.
    pub fn set_tab_width(&mut self, width: u32) {
        self.tab_width = width.max(1);
    }

    /// Accept tabs inside indentation with a warning instead of an error.
    pub fn set_lenient_tabs(&mut self, lenient: bool) {
        self.lenient_tabs = lenient;
    }

    /// Record comments on the tokens they precede or follow.
    pub fn set_capture_comments(&mut self, capture: bool) {
        self.capture_comments = capture;
    }

    pub fn mode(&self) -> ParseMode {
        self.mode
    }

    pub fn encoding(&self) -> Encoding {
        self.encoding
    }

    /// The first line-break convention seen in the input, if any.
    pub fn detected_break(&self) -> Break {
        self.detected_break
    }

    fn cache(&mut self, length: usize) -> Result<(), ReaderError> {
        if self.unread >= length {
            Ok(())
        } else {
            self.update_buffer(length)
        }
    }

    fn skip(&mut self) {
        let popped = self.buffer.pop_front().expect("unexpected end of input");
        self.mark.index += popped.len_utf8() as u64;
        if popped == '\t' {
            let w = u64::from(self.tab_width);
            self.mark.column = (self.mark.column / w + 1) * w;
        } else {
            self.mark.column += 1;
        }
        self.indent_column += 1;
        self.unread -= 1;
    }

    fn record_break(&mut self, kind: Break) {
        if self.detected_break == Break::Any {
            self.detected_break = kind;
        }
    }

    fn skip_line(&mut self) {
        if vecdeque_starts_with(&self.buffer, &['\r', '\n']) {
            self.mark.index += 2;
            self.mark.column = 0;
            self.mark.line += 1;
            self.indent_column = 0;
            self.unread -= 2;
            self.buffer.drain(0..2);
            self.record_break(Break::CrLn);
        } else if let Some(front) = self.buffer.front().copied() {
            if is_break(front) {
                self.mark.index += front.len_utf8() as u64;
                self.mark.column = 0;
                self.mark.line += 1;
                self.indent_column = 0;
                self.unread -= 1;
                self.buffer.pop_front();
                match front {
                    '\r' => self.record_break(Break::Cr),
                    '\n' => self.record_break(Break::Ln),
                    _ => {}
                }
            }
        }
    }

    fn read_string(&mut self, string: &mut String) {
        let Some(popped) = self.buffer.pop_front() else {
            panic!("unexpected end of input");
        };
        string.push(popped);
        self.mark.index += popped.len_utf8() as u64;
        self.mark.column += 1;
        self.indent_column += 1;
        self.unread -= 1;
    }

    fn read_line_string(&mut self, string: &mut String) {
        if vecdeque_starts_with(&self.buffer, &['\r', '\n']) {
            string.push('\n');
            self.buffer.drain(0..2);
            self.mark.index += 2;
            self.mark.column = 0;
            self.mark.line += 1;
            self.indent_column = 0;
            self.unread -= 2;
            self.record_break(Break::CrLn);
        } else {
            let Some(front) = self.buffer.front().copied() else {
                panic!("unexpected end of input");
            };
            if is_break(front) {
                self.buffer.pop_front();
                let char_len = front.len_utf8();
                if char_len == 3 {
                    // LS and PS are preserved verbatim; NEL, CR and LF
                    // normalise to '\n'.
                    string.push(front);
                } else {
                    string.push('\n');
                }
                self.mark.index += char_len as u64;
                self.mark.column = 0;
                self.mark.line += 1;
                self.indent_column = 0;
                self.unread -= 1;
                match front {
                    '\r' => self.record_break(Break::Cr),
                    '\n' => self.record_break(Break::Ln),
                    _ => {}
                }
            }
        }
    }

    fn set_scanner_error<T>(
        &self,
        context: &'static str,
        context_mark: Mark,
        problem: &'static str,
    ) -> Result<T, ScannerError> {
        Err(ScannerError::Problem {
            context,
            context_mark,
            problem,
            problem_mark: self.mark,
        })
    }

    /// Queue a content token, attaching any pending top comment.
    fn push_token(&mut self, mut token: Token) {
        if let Some(text) = self.pending_comment.take() {
            token
                .comments
                .get_or_insert_with(Box::default)
                .top
                .get_or_insert(text);
        }
        self.last_token_line = token.end_mark.line;
        self.tokens.push_back(token);
    }

    /// Scan the input stream and produce the next token.
    ///
    /// Call the function subsequently to produce a sequence of tokens
    /// corresponding to the input stream. The initial token is
    /// [`TokenData::StreamStart`] and the final one is
    /// [`TokenData::StreamEnd`].
    ///
    /// An application must not alternate calls of [`Scanner::scan`] with
    /// calls of [`Parser::parse`](crate::Parser::parse) or
    /// [`Document::load`](crate::Document::load) on the owning parser.
    pub fn scan(&mut self) -> Result<Token, ScannerError> {
        if self.stream_end_produced {
            return Ok(Token::new(
                TokenData::StreamEnd,
                self.mark,
                self.mark,
            ));
        }
        if !self.token_available {
            self.fetch_more_tokens()?;
        }
        if let Some(token) = self.tokens.pop_front() {
            self.token_available = false;
            self.tokens_parsed += 1;
            if let TokenData::StreamEnd = &token.data {
                self.stream_end_produced = true;
            }
            Ok(token)
        } else {
            unreachable!("no more tokens, but stream-end was not produced")
        }
    }

    pub(crate) fn fetch_more_tokens(&mut self) -> Result<(), ScannerError> {
        let mut need_more_tokens;
        loop {
            need_more_tokens = false;
            if self.tokens.is_empty() {
                need_more_tokens = true;
            } else {
                self.stale_simple_keys()?;
                for simple_key in &self.simple_keys {
                    if simple_key.possible && simple_key.token_number == self.tokens_parsed {
                        need_more_tokens = true;
                        break;
                    }
                }
            }
            if !need_more_tokens {
                break;
            }
            self.fetch_next_token()?;
        }
        self.token_available = true;
        Ok(())
    }

    fn fetch_next_token(&mut self) -> Result<(), ScannerError> {
        self.cache(1)?;
        if !self.stream_start_produced {
            self.fetch_stream_start();
            return Ok(());
        }
        self.scan_to_next_token()?;
        self.stale_simple_keys()?;
        self.unroll_indent(self.indent_column);
        self.cache(4)?;
        if IS_Z!(self.buffer) {
            return self.fetch_stream_end();
        }

        if self.mode == ParseMode::Json {
            if CHECK!(self.buffer, '&')
                || CHECK!(self.buffer, '*')
                || CHECK!(self.buffer, '!')
                || CHECK!(self.buffer, '|')
                || CHECK!(self.buffer, '>')
                || CHECK!(self.buffer, '\'')
                || CHECK!(self.buffer, '%')
            {
                return self.set_scanner_error(
                    "while scanning for the next token",
                    self.mark,
                    "indicator is not allowed in JSON mode",
                );
            }
            if (CHECK!(self.buffer, '-') || CHECK!(self.buffer, '?'))
                && IS_BLANKZ_AT!(self.buffer, 1)
            {
                return self.set_scanner_error(
                    "while scanning for the next token",
                    self.mark,
                    "block collections are not allowed in JSON mode",
                );
            }
            if self.indent_column == 0
                && (CHECK_AT!(self.buffer, '-', 0)
                    && CHECK_AT!(self.buffer, '-', 1)
                    && CHECK_AT!(self.buffer, '-', 2)
                    || CHECK_AT!(self.buffer, '.', 0)
                        && CHECK_AT!(self.buffer, '.', 1)
                        && CHECK_AT!(self.buffer, '.', 2))
                && is_blankz(self.buffer.get(3).copied())
            {
                return self.set_scanner_error(
                    "while scanning for the next token",
                    self.mark,
                    "document markers are not allowed in JSON mode",
                );
            }
        }

        if self.indent_column == 0 && CHECK!(self.buffer, '%') {
            return self.fetch_directive();
        }
        if self.indent_column == 0
            && CHECK_AT!(self.buffer, '-', 0)
            && CHECK_AT!(self.buffer, '-', 1)
            && CHECK_AT!(self.buffer, '-', 2)
            && is_blankz(self.buffer.get(3).copied())
        {
            return self.fetch_document_indicator(TokenData::DocumentStart);
        }
        if self.indent_column == 0
            && CHECK_AT!(self.buffer, '.', 0)
            && CHECK_AT!(self.buffer, '.', 1)
            && CHECK_AT!(self.buffer, '.', 2)
            && is_blankz(self.buffer.get(3).copied())
        {
            return self.fetch_document_indicator(TokenData::DocumentEnd);
        }
        if CHECK!(self.buffer, '[') {
            return self.fetch_flow_collection_start(TokenData::FlowSequenceStart);
        }
        if CHECK!(self.buffer, '{') {
            return self.fetch_flow_collection_start(TokenData::FlowMappingStart);
        }
        if CHECK!(self.buffer, ']') {
            return self.fetch_flow_collection_end(TokenData::FlowSequenceEnd);
        }
        if CHECK!(self.buffer, '}') {
            return self.fetch_flow_collection_end(TokenData::FlowMappingEnd);
        }
        if CHECK!(self.buffer, ',') {
            return self.fetch_flow_entry();
        }
        if CHECK!(self.buffer, '-') && IS_BLANKZ_AT!(self.buffer, 1) {
            return self.fetch_block_entry();
        }
        if CHECK!(self.buffer, '?') && (self.flow_level != 0 || IS_BLANKZ_AT!(self.buffer, 1)) {
            return self.fetch_key();
        }
        if CHECK!(self.buffer, ':') && (self.flow_level != 0 || IS_BLANKZ_AT!(self.buffer, 1)) {
            return self.fetch_value();
        }
        if CHECK!(self.buffer, '*') {
            return self.fetch_anchor(true);
        }
        if CHECK!(self.buffer, '&') {
            return self.fetch_anchor(false);
        }
        if CHECK!(self.buffer, '!') {
            return self.fetch_tag();
        }
        if CHECK!(self.buffer, '|') && self.flow_level == 0 {
            return self.fetch_block_scalar(true);
        }
        if CHECK!(self.buffer, '>') && self.flow_level == 0 {
            return self.fetch_block_scalar(false);
        }
        if CHECK!(self.buffer, '\'') {
            return self.fetch_flow_scalar(true);
        }
        if CHECK!(self.buffer, '"') {
            return self.fetch_flow_scalar(false);
        }
        if !(IS_BLANKZ!(self.buffer)
            || CHECK!(self.buffer, '-')
            || CHECK!(self.buffer, '?')
            || CHECK!(self.buffer, ':')
            || CHECK!(self.buffer, ',')
            || CHECK!(self.buffer, '[')
            || CHECK!(self.buffer, ']')
            || CHECK!(self.buffer, '{')
            || CHECK!(self.buffer, '}')
            || CHECK!(self.buffer, '#')
            || CHECK!(self.buffer, '&')
            || CHECK!(self.buffer, '*')
            || CHECK!(self.buffer, '!')
            || CHECK!(self.buffer, '|')
            || CHECK!(self.buffer, '>')
            || CHECK!(self.buffer, '\'')
            || CHECK!(self.buffer, '"')
            || CHECK!(self.buffer, '%')
            || CHECK!(self.buffer, '@')
            || CHECK!(self.buffer, '`'))
            || CHECK!(self.buffer, '-') && !IS_BLANK_AT!(self.buffer, 1)
            || self.flow_level == 0
                && (CHECK!(self.buffer, '?') || CHECK!(self.buffer, ':'))
                && !IS_BLANKZ_AT!(self.buffer, 1)
        {
            return self.fetch_plain_scalar();
        }
        self.set_scanner_error(
            "while scanning for the next token",
            self.mark,
            "found character that cannot start any token",
        )
    }

    fn stale_simple_keys(&mut self) -> Result<(), ScannerError> {
        let current = self.mark;
        for simple_key in &mut self.simple_keys {
            let mark = simple_key.mark;
            if simple_key.possible && (mark.line < current.line || mark.index + 1024 < current.index)
            {
                if simple_key.required {
                    return Err(ScannerError::Problem {
                        context: "while scanning a simple key",
                        context_mark: mark,
                        problem: "could not find expected ':'",
                        problem_mark: current,
                    });
                }
                simple_key.possible = false;
            }
        }
        Ok(())
    }

    fn save_simple_key(&mut self) -> Result<(), ScannerError> {
        let required = self.flow_level == 0 && self.indent == self.indent_column;
        if self.simple_key_allowed {
            let simple_key = SimpleKey {
                possible: true,
                required,
                token_number: self.tokens_parsed + self.tokens.len(),
                mark: self.mark,
                column: self.indent_column,
            };
            self.remove_simple_key()?;
            *self.simple_keys.last_mut().unwrap() = simple_key;
        }
        Ok(())
    }

    fn remove_simple_key(&mut self) -> Result<(), ScannerError> {
        let simple_key = self.simple_keys.last_mut().unwrap();
        if simple_key.possible && simple_key.required {
            let mark = simple_key.mark;
            return Err(ScannerError::Problem {
                context: "while scanning a simple key",
                context_mark: mark,
                problem: "could not find expected ':'",
                problem_mark: self.mark,
            });
        }
        simple_key.possible = false;
        Ok(())
    }

    fn increase_flow_level(&mut self) -> Result<(), ScannerError> {
        self.simple_keys.push(SimpleKey::empty());
        assert!(
            self.flow_level != i32::MAX,
            "flow_level integer overflow"
        );
        self.flow_level += 1;
        Ok(())
    }

    fn decrease_flow_level(&mut self) {
        if self.flow_level != 0 {
            self.flow_level -= 1;
            let _ = self.simple_keys.pop();
        }
    }

    /// Push an indentation level and synthesise the block-collection start
    /// token, either at the back of the queue or at the recorded position of
    /// a promoted simple key.
    fn roll_indent(
        &mut self,
        column: i64,
        number: Option<usize>,
        data: TokenData,
        mark: Mark,
    ) -> Result<(), ScannerError> {
        if self.flow_level != 0 {
            return Ok(());
        }
        if self.indent < column {
            let mapping = matches!(data, TokenData::BlockMappingStart);
            self.indents.push(IndentLevel {
                column: self.indent,
                mapping,
            });
            self.indent = column;
            let token = Token::new(data, mark, mark);
            if let Some(number) = number {
                self.tokens.insert(number - self.tokens_parsed, token);
            } else {
                self.tokens.push_back(token);
            }
        }
        Ok(())
    }

    fn unroll_indent(&mut self, column: i64) {
        if self.flow_level != 0 {
            return;
        }
        while self.indent > column {
            let token = Token::new(TokenData::BlockEnd, self.mark, self.mark);
            self.tokens.push_back(token);
            let level = self.indents.pop().unwrap();
            tracing::trace!(
                indent = self.indent,
                mapping = level.mapping,
                "closing block level"
            );
            self.indent = level.column;
        }
    }

    fn fetch_stream_start(&mut self) {
        self.indent = -1;
        self.simple_keys.push(SimpleKey::empty());
        self.simple_key_allowed = true;
        self.stream_start_produced = true;
        let token = Token::new(
            TokenData::StreamStart {
                encoding: self.encoding,
            },
            self.mark,
            self.mark,
        );
        self.tokens.push_back(token);
    }

    fn fetch_stream_end(&mut self) -> Result<(), ScannerError> {
        if self.mark.column != 0 {
            self.mark.column = 0;
            self.mark.line += 1;
            self.indent_column = 0;
        }
        self.unroll_indent(-1);
        self.remove_simple_key()?;
        self.simple_key_allowed = false;
        let mut token = Token::new(TokenData::StreamEnd, self.mark, self.mark);
        if let Some(text) = self.pending_comment.take() {
            token
                .comments
                .get_or_insert_with(Box::default)
                .bottom
                .get_or_insert(text);
        }
        self.tokens.push_back(token);
        Ok(())
    }

    fn fetch_directive(&mut self) -> Result<(), ScannerError> {
        self.unroll_indent(-1);
        self.remove_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_directive()?;
        self.push_token(token);
        Ok(())
    }

    fn fetch_document_indicator(&mut self, data: TokenData) -> Result<(), ScannerError> {
        self.unroll_indent(-1);
        self.remove_simple_key()?;
        self.simple_key_allowed = false;
        let start_mark = self.mark;
        self.skip();
        self.skip();
        self.skip();
        let end_mark = self.mark;
        self.push_token(Token::new(data, start_mark, end_mark));
        Ok(())
    }

    fn fetch_flow_collection_start(&mut self, data: TokenData) -> Result<(), ScannerError> {
        self.save_simple_key()?;
        self.increase_flow_level()?;
        self.simple_key_allowed = true;
        let start_mark = self.mark;
        self.skip();
        let end_mark = self.mark;
        self.push_token(Token::new(data, start_mark, end_mark));
        Ok(())
    }

    fn fetch_flow_collection_end(&mut self, data: TokenData) -> Result<(), ScannerError> {
        self.remove_simple_key()?;
        self.decrease_flow_level();
        self.simple_key_allowed = false;
        let start_mark = self.mark;
        self.skip();
        let end_mark = self.mark;
        self.push_token(Token::new(data, start_mark, end_mark));
        Ok(())
    }

    fn fetch_flow_entry(&mut self) -> Result<(), ScannerError> {
        self.remove_simple_key()?;
        self.simple_key_allowed = true;
        let start_mark = self.mark;
        self.skip();
        let end_mark = self.mark;
        self.push_token(Token::new(TokenData::FlowEntry, start_mark, end_mark));
        Ok(())
    }

    fn fetch_block_entry(&mut self) -> Result<(), ScannerError> {
        if self.flow_level == 0 {
            if !self.simple_key_allowed {
                return self.set_scanner_error(
                    "",
                    self.mark,
                    "block sequence entries are not allowed in this context",
                );
            }
            self.roll_indent(
                self.indent_column,
                None,
                TokenData::BlockSequenceStart,
                self.mark,
            )?;
        }
        self.remove_simple_key()?;
        self.simple_key_allowed = true;
        let start_mark = self.mark;
        self.skip();
        let end_mark = self.mark;
        self.push_token(Token::new(TokenData::BlockEntry, start_mark, end_mark));
        Ok(())
    }

    fn fetch_key(&mut self) -> Result<(), ScannerError> {
        if self.flow_level == 0 {
            if !self.simple_key_allowed {
                return self.set_scanner_error(
                    "",
                    self.mark,
                    "mapping keys are not allowed in this context",
                );
            }
            self.roll_indent(
                self.indent_column,
                None,
                TokenData::BlockMappingStart,
                self.mark,
            )?;
        }
        self.remove_simple_key()?;
        self.simple_key_allowed = self.flow_level == 0;
        let start_mark = self.mark;
        self.skip();
        let end_mark = self.mark;
        self.push_token(Token::new(TokenData::Key, start_mark, end_mark));
        Ok(())
    }

    fn fetch_value(&mut self) -> Result<(), ScannerError> {
        let simple_key = *self.simple_keys.last().unwrap();
        if simple_key.possible {
            // Promote the candidate: a KEY token is spliced in before it.
            let token = Token::new(TokenData::Key, simple_key.mark, simple_key.mark);
            self.tokens
                .insert(simple_key.token_number - self.tokens_parsed, token);
            self.simple_keys.last_mut().unwrap().possible = false;
            self.roll_indent(
                simple_key.column,
                Some(simple_key.token_number),
                TokenData::BlockMappingStart,
                simple_key.mark,
            )?;
            self.simple_key_allowed = false;
        } else {
            if self.flow_level == 0 {
                if !self.simple_key_allowed {
                    return self.set_scanner_error(
                        "",
                        self.mark,
                        "mapping values are not allowed in this context",
                    );
                }
                self.roll_indent(
                    self.indent_column,
                    None,
                    TokenData::BlockMappingStart,
                    self.mark,
                )?;
            }
            self.simple_key_allowed = self.flow_level == 0;
        }
        let start_mark = self.mark;
        self.skip();
        let end_mark = self.mark;
        self.push_token(Token::new(TokenData::Value, start_mark, end_mark));
        Ok(())
    }

    fn fetch_anchor(&mut self, alias: bool) -> Result<(), ScannerError> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_anchor(alias)?;
        self.push_token(token);
        Ok(())
    }

    fn fetch_tag(&mut self) -> Result<(), ScannerError> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_tag()?;
        self.push_token(token);
        Ok(())
    }

    fn fetch_block_scalar(&mut self, literal: bool) -> Result<(), ScannerError> {
        self.remove_simple_key()?;
        self.simple_key_allowed = true;
        let token = self.scan_block_scalar(literal)?;
        self.push_token(token);
        Ok(())
    }

    fn fetch_flow_scalar(&mut self, single: bool) -> Result<(), ScannerError> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_flow_scalar(single)?;
        self.push_token(token);
        self.try_capture_right_comment()
    }

    fn fetch_plain_scalar(&mut self) -> Result<(), ScannerError> {
        self.save_simple_key()?;
        self.simple_key_allowed = false;
        let token = self.scan_plain_scalar()?;
        self.push_token(token);
        self.try_capture_right_comment()
    }

    /// Look past trailing blanks for a comment on the same line as the
    /// token just queued, before the queue can drain.
    fn try_capture_right_comment(&mut self) -> Result<(), ScannerError> {
        if !self.capture_comments {
            return Ok(());
        }
        self.cache(1)?;
        while IS_BLANK!(self.buffer) {
            self.skip();
            self.cache(1)?;
        }
        if CHECK!(self.buffer, '#') {
            self.scan_comment()?;
        }
        Ok(())
    }

    fn scan_to_next_token(&mut self) -> Result<(), ScannerError> {
        loop {
            self.cache(1)?;
            if self.mark.column == 0 && IS_BOM!(self.buffer) {
                self.skip();
            }
            self.cache(1)?;
            while CHECK!(self.buffer, ' ')
                || (self.flow_level != 0 || !self.simple_key_allowed || self.lenient_tabs)
                    && CHECK!(self.buffer, '\t')
            {
                if CHECK!(self.buffer, '\t') && self.flow_level == 0 && self.simple_key_allowed {
                    // Only reachable under lenient_tabs; a tab where block
                    // indentation is expected is otherwise not consumed here
                    // and fails token dispatch.
                    tracing::warn!(
                        line = self.mark.line,
                        column = self.mark.column,
                        "tab character inside indentation"
                    );
                }
                self.skip();
                self.cache(1)?;
            }
            if CHECK!(self.buffer, '#') {
                if self.mode == ParseMode::Json {
                    return self.set_scanner_error(
                        "while scanning for the next token",
                        self.mark,
                        "comments are not allowed in JSON mode",
                    );
                }
                if self.capture_comments {
                    self.scan_comment()?;
                } else {
                    while !IS_BREAKZ!(self.buffer) {
                        self.skip();
                        self.cache(1)?;
                    }
                }
            }
            if !IS_BREAK!(self.buffer) {
                break;
            }
            self.cache(2)?;
            self.skip_line();
            if self.flow_level == 0 {
                self.simple_key_allowed = true;
            }
        }
        Ok(())
    }

    /// Consume a `#` comment and record it for the neighbouring token.
    fn scan_comment(&mut self) -> Result<(), ScannerError> {
        let line = self.mark.line;
        self.skip();
        self.cache(1)?;
        if IS_BLANK!(self.buffer) {
            self.skip();
            self.cache(1)?;
        }
        let mut text = String::new();
        while !IS_BREAKZ!(self.buffer) {
            self.read_string(&mut text);
            self.cache(1)?;
        }
        if line == self.last_token_line && !self.tokens.is_empty() {
            let token = self.tokens.back_mut().unwrap();
            let comments = token.comments.get_or_insert_with(Box::default);
            match &mut comments.right {
                Some(existing) => {
                    existing.push('\n');
                    existing.push_str(&text);
                }
                None => comments.right = Some(text),
            }
        } else {
            match &mut self.pending_comment {
                Some(pending) => {
                    pending.push('\n');
                    pending.push_str(&text);
                }
                None => self.pending_comment = Some(text),
            }
        }
        Ok(())
    }

    fn scan_directive(&mut self) -> Result<Token, ScannerError> {
        let start_mark = self.mark;
        self.skip();
        let name = self.scan_directive_name(start_mark)?;
        let token = if name == "YAML" {
            let (major, minor) = self.scan_version_directive_value(start_mark)?;
            Token::new(
                TokenData::VersionDirective { major, minor },
                start_mark,
                self.mark,
            )
        } else if name == "TAG" {
            let (handle, prefix) = self.scan_tag_directive_value(start_mark)?;
            Token::new(
                TokenData::TagDirective { handle, prefix },
                start_mark,
                self.mark,
            )
        } else {
            return self.set_scanner_error(
                "while scanning a directive",
                start_mark,
                "found unknown directive name",
            );
        };
        self.cache(1)?;
        while IS_BLANK!(self.buffer) {
            self.skip();
            self.cache(1)?;
        }

        if CHECK!(self.buffer, '#') {
            while !IS_BREAKZ!(self.buffer) {
                self.skip();
                self.cache(1)?;
            }
        }

        if !IS_BREAKZ!(self.buffer) {
            self.set_scanner_error(
                "while scanning a directive",
                start_mark,
                "did not find expected comment or line break",
            )
        } else {
            if IS_BREAK!(self.buffer) {
                self.cache(2)?;
                self.skip_line();
            }
            Ok(token)
        }
    }

    fn scan_directive_name(&mut self, start_mark: Mark) -> Result<String, ScannerError> {
        let mut string = String::new();
        self.cache(1)?;

        while IS_ALPHA!(self.buffer) {
            self.read_string(&mut string);
            self.cache(1)?;
        }

        if string.is_empty() {
            self.set_scanner_error(
                "while scanning a directive",
                start_mark,
                "could not find expected directive name",
            )
        } else if !IS_BLANKZ!(self.buffer) {
            self.set_scanner_error(
                "while scanning a directive",
                start_mark,
                "found unexpected non-alphabetical character",
            )
        } else {
            Ok(string)
        }
    }

    fn scan_version_directive_value(
        &mut self,
        start_mark: Mark,
    ) -> Result<(i32, i32), ScannerError> {
        self.cache(1)?;
        while IS_BLANK!(self.buffer) {
            self.skip();
            self.cache(1)?;
        }
        let major = self.scan_version_directive_number(start_mark)?;
        if !CHECK!(self.buffer, '.') {
            return self.set_scanner_error(
                "while scanning a %YAML directive",
                start_mark,
                "did not find expected digit or '.' character",
            );
        }
        self.skip();
        let minor = self.scan_version_directive_number(start_mark)?;
        Ok((major, minor))
    }

    fn scan_version_directive_number(&mut self, start_mark: Mark) -> Result<i32, ScannerError> {
        const MAX_NUMBER_LENGTH: usize = 9;
        let mut value: i32 = 0;
        let mut length = 0;
        self.cache(1)?;
        while IS_DIGIT!(self.buffer) {
            length += 1;
            if length > MAX_NUMBER_LENGTH {
                return self.set_scanner_error(
                    "while scanning a %YAML directive",
                    start_mark,
                    "found extremely long version number",
                );
            }
            value = value * 10 + AS_DIGIT!(self.buffer) as i32;
            self.skip();
            self.cache(1)?;
        }
        if length == 0 {
            return self.set_scanner_error(
                "while scanning a %YAML directive",
                start_mark,
                "did not find expected version number",
            );
        }
        Ok(value)
    }

    fn scan_tag_directive_value(
        &mut self,
        start_mark: Mark,
    ) -> Result<(String, String), ScannerError> {
        self.cache(1)?;

        loop {
            if IS_BLANK!(self.buffer) {
                self.skip();
                self.cache(1)?;
            } else {
                let handle_value = self.scan_tag_handle(true, start_mark)?;

                self.cache(1)?;

                if !IS_BLANK!(self.buffer) {
                    return self.set_scanner_error(
                        "while scanning a %TAG directive",
                        start_mark,
                        "did not find expected whitespace",
                    );
                }
                while IS_BLANK!(self.buffer) {
                    self.skip();
                    self.cache(1)?;
                }

                let prefix_value = self.scan_tag_uri(true, true, None, start_mark)?;
                self.cache(1)?;

                if !IS_BLANKZ!(self.buffer) {
                    return self.set_scanner_error(
                        "while scanning a %TAG directive",
                        start_mark,
                        "did not find expected whitespace or line break",
                    );
                }
                return Ok((handle_value, prefix_value));
            }
        }
    }

    fn scan_anchor(&mut self, alias: bool) -> Result<Token, ScannerError> {
        let mut length = 0;
        let mut string = String::new();
        let start_mark = self.mark;
        self.skip();
        self.cache(1)?;

        while IS_ALPHA!(self.buffer) {
            self.read_string(&mut string);
            self.cache(1)?;
            length += 1;
        }
        let end_mark = self.mark;
        if length == 0
            || !(IS_BLANKZ!(self.buffer)
                || CHECK!(self.buffer, '?')
                || CHECK!(self.buffer, ':')
                || CHECK!(self.buffer, ',')
                || CHECK!(self.buffer, ']')
                || CHECK!(self.buffer, '}')
                || CHECK!(self.buffer, '%')
                || CHECK!(self.buffer, '@')
                || CHECK!(self.buffer, '`'))
        {
            self.set_scanner_error(
                if alias {
                    "while scanning an alias"
                } else {
                    "while scanning an anchor"
                },
                start_mark,
                "did not find expected alphabetic or numeric character",
            )
        } else {
            Ok(Token::new(
                if alias {
                    TokenData::Alias { value: string }
                } else {
                    TokenData::Anchor { value: string }
                },
                start_mark,
                end_mark,
            ))
        }
    }

    fn scan_tag(&mut self) -> Result<Token, ScannerError> {
        let mut handle;
        let mut suffix;

        let start_mark = self.mark;

        self.cache(2)?;

        if CHECK_AT!(self.buffer, '<', 1) {
            handle = String::new();
            self.skip();
            self.skip();
            suffix = self.scan_tag_uri(true, false, None, start_mark)?;

            if !CHECK!(self.buffer, '>') {
                return self.set_scanner_error(
                    "while scanning a tag",
                    start_mark,
                    "did not find the expected '>'",
                );
            }
            self.skip();
        } else {
            handle = self.scan_tag_handle(false, start_mark)?;
            if handle.starts_with('!') && handle.len() > 1 && handle.ends_with('!') {
                suffix = self.scan_tag_uri(false, false, None, start_mark)?;
            } else {
                suffix = self.scan_tag_uri(false, false, Some(&handle), start_mark)?;
                handle = String::from("!");
                if suffix.is_empty() {
                    core::mem::swap(&mut handle, &mut suffix);
                }
            }
        }

        self.cache(1)?;
        if !IS_BLANKZ!(self.buffer)
            && !(self.flow_level != 0
                && (CHECK!(self.buffer, ',')
                    || CHECK!(self.buffer, ']')
                    || CHECK!(self.buffer, '}')))
        {
            return self.set_scanner_error(
                "while scanning a tag",
                start_mark,
                "did not find expected whitespace or line break",
            );
        }

        let end_mark = self.mark;
        Ok(Token::new(
            TokenData::Tag { handle, suffix },
            start_mark,
            end_mark,
        ))
    }

    fn scan_tag_handle(&mut self, directive: bool, start_mark: Mark) -> Result<String, ScannerError> {
        let mut string = String::new();
        self.cache(1)?;

        if !CHECK!(self.buffer, '!') {
            return self.set_scanner_error(
                if directive {
                    "while scanning a tag directive"
                } else {
                    "while scanning a tag"
                },
                start_mark,
                "did not find expected '!'",
            );
        }

        self.read_string(&mut string);
        self.cache(1)?;
        while IS_ALPHA!(self.buffer) {
            self.read_string(&mut string);
            self.cache(1)?;
        }
        if CHECK!(self.buffer, '!') {
            self.read_string(&mut string);
        } else if directive && string != "!" {
            return self.set_scanner_error(
                "while parsing a tag directive",
                start_mark,
                "did not find expected '!'",
            );
        }
        Ok(string)
    }

    fn scan_tag_uri(
        &mut self,
        uri_char: bool,
        directive: bool,
        head: Option<&str>,
        start_mark: Mark,
    ) -> Result<String, ScannerError> {
        let head = head.unwrap_or("");
        let mut length = head.len();
        let mut string = String::new();

        if length > 1 {
            string = String::from(&head[1..]);
        }
        self.cache(1)?;

        while IS_ALPHA!(self.buffer)
            || CHECK!(self.buffer, ';')
            || CHECK!(self.buffer, '/')
            || CHECK!(self.buffer, '?')
            || CHECK!(self.buffer, ':')
            || CHECK!(self.buffer, '@')
            || CHECK!(self.buffer, '&')
            || CHECK!(self.buffer, '=')
            || CHECK!(self.buffer, '+')
            || CHECK!(self.buffer, '$')
            || CHECK!(self.buffer, '.')
            || CHECK!(self.buffer, '%')
            || CHECK!(self.buffer, '!')
            || CHECK!(self.buffer, '~')
            || CHECK!(self.buffer, '*')
            || CHECK!(self.buffer, '\'')
            || CHECK!(self.buffer, '(')
            || CHECK!(self.buffer, ')')
            || uri_char
                && (CHECK!(self.buffer, ',')
                    || CHECK!(self.buffer, '[')
                    || CHECK!(self.buffer, ']'))
        {
            if CHECK!(self.buffer, '%') {
                self.scan_uri_escapes(directive, start_mark, &mut string)?;
            } else {
                self.read_string(&mut string);
            }
            length += 1;
            self.cache(1)?;
        }
        if length == 0 {
            self.set_scanner_error(
                if directive {
                    "while parsing a %TAG directive"
                } else {
                    "while parsing a tag"
                },
                start_mark,
                "did not find expected tag URI",
            )
        } else {
            Ok(string)
        }
    }

    /// Decode one %-escaped UTF-8 sequence from a tag URI.
    fn scan_uri_escapes(
        &mut self,
        directive: bool,
        start_mark: Mark,
        string: &mut String,
    ) -> Result<(), ScannerError> {
        let mut width = 0usize;
        let mut value = 0u32;
        loop {
            self.cache(3)?;
            if !(CHECK!(self.buffer, '%')
                && IS_HEX_AT!(self.buffer, 1)
                && IS_HEX_AT!(self.buffer, 2))
            {
                return self.set_scanner_error(
                    if directive {
                        "while parsing a %TAG directive"
                    } else {
                        "while parsing a tag"
                    },
                    start_mark,
                    "did not find URI escaped octet",
                );
            }
            let octet = ((AS_HEX_AT!(self.buffer, 1) << 4) + AS_HEX_AT!(self.buffer, 2)) as u8;
            if width == 0 {
                width = if octet & 0x80 == 0 {
                    1
                } else if octet & 0xE0 == 0xC0 {
                    2
                } else if octet & 0xF0 == 0xE0 {
                    3
                } else if octet & 0xF8 == 0xF0 {
                    4
                } else {
                    0
                };
                if width == 0 {
                    return self.set_scanner_error(
                        if directive {
                            "while parsing a %TAG directive"
                        } else {
                            "while parsing a tag"
                        },
                        start_mark,
                        "found an incorrect leading UTF-8 octet",
                    );
                }
                value = match width {
                    1 => u32::from(octet & 0x7F),
                    2 => u32::from(octet & 0x1F),
                    3 => u32::from(octet & 0x0F),
                    _ => u32::from(octet & 0x07),
                };
            } else {
                if octet & 0xC0 != 0x80 {
                    return self.set_scanner_error(
                        if directive {
                            "while parsing a %TAG directive"
                        } else {
                            "while parsing a tag"
                        },
                        start_mark,
                        "found an incorrect trailing UTF-8 octet",
                    );
                }
                value = (value << 6) + u32::from(octet & 0x3F);
            }
            self.skip();
            self.skip();
            self.skip();
            width -= 1;
            if width == 0 {
                break;
            }
        }
        let Some(ch) = char::from_u32(value) else {
            return self.set_scanner_error(
                if directive {
                    "while parsing a %TAG directive"
                } else {
                    "while parsing a tag"
                },
                start_mark,
                "found an invalid Unicode escape in tag URI",
            );
        };
        string.push(ch);
        Ok(())
    }

    fn scan_block_scalar(&mut self, literal: bool) -> Result<Token, ScannerError> {
        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut chomping = Chomping::Clip;
        let mut increment: i64 = 0;
        let mut indent: i64 = 0;
        let mut leading_blank = false;
        let mut trailing_blank;
        let start_mark = self.mark;
        self.skip();
        self.cache(1)?;

        if CHECK!(self.buffer, '+') || CHECK!(self.buffer, '-') {
            chomping = if CHECK!(self.buffer, '+') {
                Chomping::Keep
            } else {
                Chomping::Strip
            };
            self.skip();
            self.cache(1)?;
            if IS_DIGIT!(self.buffer) {
                if CHECK!(self.buffer, '0') {
                    return self.set_scanner_error(
                        "while scanning a block scalar",
                        start_mark,
                        "found an indentation indicator equal to 0",
                    );
                }
                increment = AS_DIGIT!(self.buffer) as i64;
                self.skip();
            }
        } else if IS_DIGIT!(self.buffer) {
            if CHECK!(self.buffer, '0') {
                return self.set_scanner_error(
                    "while scanning a block scalar",
                    start_mark,
                    "found an indentation indicator equal to 0",
                );
            }
            increment = AS_DIGIT!(self.buffer) as i64;
            self.skip();
            self.cache(1)?;
            if CHECK!(self.buffer, '+') || CHECK!(self.buffer, '-') {
                chomping = if CHECK!(self.buffer, '+') {
                    Chomping::Keep
                } else {
                    Chomping::Strip
                };
                self.skip();
            }
        }

        self.cache(1)?;
        while IS_BLANK!(self.buffer) {
            self.skip();
            self.cache(1)?;
        }

        if CHECK!(self.buffer, '#') {
            if self.capture_comments {
                self.scan_comment()?;
            } else {
                while !IS_BREAKZ!(self.buffer) {
                    self.skip();
                    self.cache(1)?;
                }
            }
        }

        if !IS_BREAKZ!(self.buffer) {
            return self.set_scanner_error(
                "while scanning a block scalar",
                start_mark,
                "did not find expected comment or line break",
            );
        }

        if IS_BREAK!(self.buffer) {
            self.cache(2)?;
            self.skip_line();
        }

        let mut end_mark = self.mark;
        if increment != 0 {
            indent = if self.indent >= 0 {
                self.indent + increment
            } else {
                increment
            };
        }
        self.scan_block_scalar_breaks(&mut indent, &mut trailing_breaks, start_mark, &mut end_mark)?;

        self.cache(1)?;

        while self.indent_column == indent && !IS_Z!(self.buffer) {
            trailing_blank = IS_BLANK!(self.buffer);
            if !literal && leading_break.starts_with('\n') && !leading_blank && !trailing_blank {
                if trailing_breaks.is_empty() {
                    string.push(' ');
                }
                leading_break.clear();
            } else {
                string.push_str(&leading_break);
                leading_break.clear();
            }
            string.push_str(&trailing_breaks);
            trailing_breaks.clear();
            leading_blank = IS_BLANK!(self.buffer);
            while !IS_BREAKZ!(self.buffer) {
                self.read_string(&mut string);
                self.cache(1)?;
            }
            self.cache(2)?;
            self.read_line_string(&mut leading_break);
            self.scan_block_scalar_breaks(
                &mut indent,
                &mut trailing_breaks,
                start_mark,
                &mut end_mark,
            )?;
        }

        if chomping != Chomping::Strip {
            string.push_str(&leading_break);
        }
        if chomping == Chomping::Keep {
            string.push_str(&trailing_breaks);
        }

        Ok(Token::new(
            TokenData::Scalar {
                value: string,
                style: if literal {
                    ScalarStyle::Literal
                } else {
                    ScalarStyle::Folded
                },
            },
            start_mark,
            end_mark,
        ))
    }

    fn scan_block_scalar_breaks(
        &mut self,
        indent: &mut i64,
        breaks: &mut String,
        start_mark: Mark,
        end_mark: &mut Mark,
    ) -> Result<(), ScannerError> {
        let mut max_indent: i64 = 0;
        *end_mark = self.mark;
        loop {
            self.cache(1)?;
            while (*indent == 0 || self.indent_column < *indent) && IS_SPACE!(self.buffer) {
                self.skip();
                self.cache(1)?;
            }
            if self.indent_column > max_indent {
                max_indent = self.indent_column;
            }
            if (*indent == 0 || self.indent_column < *indent) && IS_TAB!(self.buffer) {
                if !self.lenient_tabs {
                    return self.set_scanner_error(
                        "while scanning a block scalar",
                        start_mark,
                        "found a tab character where an indentation space is expected",
                    );
                }
                tracing::warn!(
                    line = self.mark.line,
                    column = self.mark.column,
                    "tab character in block scalar indentation"
                );
                self.skip();
                self.cache(1)?;
                continue;
            }
            if !IS_BREAK!(self.buffer) {
                break;
            }
            self.cache(2)?;
            self.read_line_string(breaks);
            *end_mark = self.mark;
        }
        if *indent == 0 {
            *indent = max_indent;
            if *indent < self.indent + 1 {
                *indent = self.indent + 1;
            }
            if *indent < 1 {
                *indent = 1;
            }
        }
        Ok(())
    }

    fn scan_flow_scalar(&mut self, single: bool) -> Result<Token, ScannerError> {
        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut whitespaces = String::new();
        let mut leading_blanks;

        let start_mark = self.mark;
        self.skip();
        loop {
            self.cache(4)?;

            if self.mark.column == 0
                && (CHECK_AT!(self.buffer, '-', 0)
                    && CHECK_AT!(self.buffer, '-', 1)
                    && CHECK_AT!(self.buffer, '-', 2)
                    || CHECK_AT!(self.buffer, '.', 0)
                        && CHECK_AT!(self.buffer, '.', 1)
                        && CHECK_AT!(self.buffer, '.', 2))
                && IS_BLANKZ_AT!(self.buffer, 3)
            {
                return self.set_scanner_error(
                    "while scanning a quoted scalar",
                    start_mark,
                    "found unexpected document indicator",
                );
            }
            if IS_Z!(self.buffer) {
                return self.set_scanner_error(
                    "while scanning a quoted scalar",
                    start_mark,
                    "found unexpected end of stream",
                );
            }
            self.cache(2)?;
            leading_blanks = false;
            while !IS_BLANKZ!(self.buffer) {
                if single && CHECK_AT!(self.buffer, '\'', 0) && CHECK_AT!(self.buffer, '\'', 1) {
                    string.push('\'');
                    self.skip();
                    self.skip();
                } else {
                    if CHECK!(self.buffer, if single { '\'' } else { '"' }) {
                        break;
                    }
                    if !single && CHECK!(self.buffer, '\\') && IS_BREAK_AT!(self.buffer, 1) {
                        self.cache(3)?;
                        self.skip();
                        self.skip_line();
                        leading_blanks = true;
                        break;
                    } else if !single && CHECK!(self.buffer, '\\') {
                        let mut code_length = 0usize;
                        match self.buffer.get(1).copied().unwrap() {
                            '0' => string.push('\0'),
                            'a' => string.push('\x07'),
                            'b' => string.push('\x08'),
                            't' | '\t' => string.push('\t'),
                            'n' => string.push('\n'),
                            'v' => string.push('\x0B'),
                            'f' => string.push('\x0C'),
                            'r' => string.push('\r'),
                            'e' => string.push('\x1B'),
                            ' ' => string.push(' '),
                            '"' => string.push('"'),
                            '/' => string.push('/'),
                            '\\' => string.push('\\'),
                            // NEL (#x85)
                            'N' => string.push('\u{0085}'),
                            // #xA0
                            '_' => string.push('\u{00a0}'),
                            // LS (#x2028)
                            'L' => string.push('\u{2028}'),
                            // PS (#x2029)
                            'P' => string.push('\u{2029}'),
                            'x' => code_length = 2,
                            'u' => code_length = 4,
                            'U' => code_length = 8,
                            _ => {
                                return self.set_scanner_error(
                                    "while parsing a quoted scalar",
                                    start_mark,
                                    "found unknown escape character",
                                );
                            }
                        }
                        self.skip();
                        self.skip();
                        if code_length != 0 {
                            let mut value: u32 = 0;
                            self.cache(code_length)?;
                            for k in 0..code_length {
                                if !IS_HEX_AT!(self.buffer, k) {
                                    return self.set_scanner_error(
                                        "while parsing a quoted scalar",
                                        start_mark,
                                        "did not find expected hexdecimal number",
                                    );
                                }
                                value = (value << 4) + AS_HEX_AT!(self.buffer, k);
                            }
                            if let Some(ch) = char::from_u32(value) {
                                string.push(ch);
                            } else {
                                return self.set_scanner_error(
                                    "while parsing a quoted scalar",
                                    start_mark,
                                    "found invalid Unicode character escape code",
                                );
                            }
                            for _ in 0..code_length {
                                self.skip();
                            }
                        }
                    } else {
                        self.read_string(&mut string);
                    }
                }
                self.cache(2)?;
            }
            self.cache(1)?;
            if CHECK!(self.buffer, if single { '\'' } else { '"' }) {
                break;
            }
            self.cache(1)?;
            while IS_BLANK!(self.buffer) || IS_BREAK!(self.buffer) {
                if IS_BLANK!(self.buffer) {
                    if leading_blanks {
                        self.skip();
                    } else {
                        self.read_string(&mut whitespaces);
                    }
                } else {
                    self.cache(2)?;
                    if leading_blanks {
                        self.read_line_string(&mut trailing_breaks);
                    } else {
                        whitespaces.clear();
                        self.read_line_string(&mut leading_break);
                        leading_blanks = true;
                    }
                }
                self.cache(1)?;
            }
            if leading_blanks {
                if leading_break.starts_with('\n') {
                    if trailing_breaks.is_empty() {
                        string.push(' ');
                    } else {
                        string.push_str(&trailing_breaks);
                        trailing_breaks.clear();
                    }
                    leading_break.clear();
                } else {
                    string.push_str(&leading_break);
                    string.push_str(&trailing_breaks);
                    leading_break.clear();
                    trailing_breaks.clear();
                }
            } else {
                string.push_str(&whitespaces);
                whitespaces.clear();
            }
        }

        self.skip();
        let end_mark = self.mark;
        Ok(Token::new(
            TokenData::Scalar {
                value: string,
                style: if single {
                    ScalarStyle::SingleQuoted
                } else {
                    ScalarStyle::DoubleQuoted
                },
            },
            start_mark,
            end_mark,
        ))
    }

    fn scan_plain_scalar(&mut self) -> Result<Token, ScannerError> {
        let mut string = String::new();
        let mut leading_break = String::new();
        let mut trailing_breaks = String::new();
        let mut whitespaces = String::new();
        let mut leading_blanks = false;
        let indent = self.indent + 1;
        let mut end_mark = self.mark;
        let start_mark = end_mark;
        loop {
            self.cache(4)?;
            if self.mark.column == 0
                && (CHECK_AT!(self.buffer, '-', 0)
                    && CHECK_AT!(self.buffer, '-', 1)
                    && CHECK_AT!(self.buffer, '-', 2)
                    || CHECK_AT!(self.buffer, '.', 0)
                        && CHECK_AT!(self.buffer, '.', 1)
                        && CHECK_AT!(self.buffer, '.', 2))
                && IS_BLANKZ_AT!(self.buffer, 3)
            {
                break;
            }
            if CHECK!(self.buffer, '#') {
                break;
            }
            while !IS_BLANKZ!(self.buffer) {
                if self.flow_level != 0
                    && CHECK!(self.buffer, ':')
                    && (CHECK_AT!(self.buffer, ',', 1)
                        || CHECK_AT!(self.buffer, '?', 1)
                        || CHECK_AT!(self.buffer, '[', 1)
                        || CHECK_AT!(self.buffer, ']', 1)
                        || CHECK_AT!(self.buffer, '{', 1)
                        || CHECK_AT!(self.buffer, '}', 1))
                {
                    return self.set_scanner_error(
                        "while scanning a plain scalar",
                        start_mark,
                        "found unexpected ':'",
                    );
                }
                if CHECK!(self.buffer, ':') && IS_BLANKZ_AT!(self.buffer, 1)
                    || self.flow_level != 0
                        && (CHECK!(self.buffer, ',')
                            || CHECK!(self.buffer, '[')
                            || CHECK!(self.buffer, ']')
                            || CHECK!(self.buffer, '{')
                            || CHECK!(self.buffer, '}'))
                {
                    break;
                }
                if leading_blanks || !whitespaces.is_empty() {
                    if leading_blanks {
                        if leading_break.starts_with('\n') {
                            if trailing_breaks.is_empty() {
                                string.push(' ');
                            } else {
                                string.push_str(&trailing_breaks);
                                trailing_breaks.clear();
                            }
                            leading_break.clear();
                        } else {
                            string.push_str(&leading_break);
                            string.push_str(&trailing_breaks);
                            leading_break.clear();
                            trailing_breaks.clear();
                        }
                        leading_blanks = false;
                    } else {
                        string.push_str(&whitespaces);
                        whitespaces.clear();
                    }
                }
                self.read_string(&mut string);
                end_mark = self.mark;
                self.cache(2)?;
            }
            if !(IS_BLANK!(self.buffer) || IS_BREAK!(self.buffer)) {
                break;
            }
            self.cache(1)?;

            while IS_BLANK!(self.buffer) || IS_BREAK!(self.buffer) {
                if IS_BLANK!(self.buffer) {
                    if leading_blanks && self.indent_column < indent && IS_TAB!(self.buffer) {
                        if !self.lenient_tabs {
                            return self.set_scanner_error(
                                "while scanning a plain scalar",
                                start_mark,
                                "found a tab character that violates indentation",
                            );
                        }
                        tracing::warn!(
                            line = self.mark.line,
                            column = self.mark.column,
                            "tab character that violates indentation"
                        );
                        self.skip();
                    } else if leading_blanks {
                        self.skip();
                    } else {
                        self.read_string(&mut whitespaces);
                    }
                } else {
                    self.cache(2)?;

                    if leading_blanks {
                        self.read_line_string(&mut trailing_breaks);
                    } else {
                        whitespaces.clear();
                        self.read_line_string(&mut leading_break);
                        leading_blanks = true;
                    }
                }
                self.cache(1)?;
            }
            if self.flow_level == 0 && self.indent_column < indent {
                break;
            }
        }

        if leading_blanks {
            self.simple_key_allowed = true;
        }

        Ok(Token::new(
            TokenData::Scalar {
                value: string,
                style: ScalarStyle::Plain,
            },
            start_mark,
            end_mark,
        ))
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn scan_all(input: &str) -> Vec<TokenData> {
        let mut scanner = Scanner::new();
        let mut bytes = input.as_bytes();
        scanner.set_input_string(&mut bytes);
        let mut out = Vec::new();
        loop {
            let token = scanner.scan().unwrap();
            let done = matches!(token.data, TokenData::StreamEnd);
            out.push(token.data);
            if done {
                break;
            }
        }
        out
    }

    #[test]
    fn simple_key_is_promoted_before_the_candidate() {
        let tokens = scan_all("a: 1\n");
        assert_eq!(
            tokens,
            vec![
                TokenData::StreamStart {
                    encoding: Encoding::Utf8
                },
                TokenData::BlockMappingStart,
                TokenData::Key,
                TokenData::Scalar {
                    value: "a".into(),
                    style: ScalarStyle::Plain
                },
                TokenData::Value,
                TokenData::Scalar {
                    value: "1".into(),
                    style: ScalarStyle::Plain
                },
                TokenData::BlockEnd,
                TokenData::StreamEnd,
            ]
        );
    }

    #[test]
    fn comments_attach_to_their_tokens() {
        let mut scanner = Scanner::new();
        scanner.set_capture_comments(true);
        let mut bytes: &[u8] = b"# leading\na: 1  # trailing\n";
        scanner.set_input_string(&mut bytes);
        let mut tokens = Vec::new();
        loop {
            let token = scanner.scan().unwrap();
            let done = matches!(token.data, TokenData::StreamEnd);
            tokens.push(token);
            if done {
                break;
            }
        }
        // The leading comment rides on the first content token.
        let first_scalar = tokens
            .iter()
            .find(|t| matches!(t.data, TokenData::Scalar { .. }))
            .unwrap();
        assert_eq!(
            first_scalar.comments.as_ref().and_then(|c| c.top.as_deref()),
            Some("leading")
        );
        let last_scalar = tokens
            .iter()
            .rev()
            .find(|t| matches!(t.data, TokenData::Scalar { .. }))
            .unwrap();
        assert_eq!(
            last_scalar
                .comments
                .as_ref()
                .and_then(|c| c.right.as_deref()),
            Some("trailing")
        );
    }

    #[test]
    fn json_mode_rejects_anchors() {
        let mut scanner = Scanner::new();
        scanner.set_mode(ParseMode::Json);
        let mut bytes: &[u8] = b"[&a 1]";
        scanner.set_input_string(&mut bytes);
        let err = loop {
            match scanner.scan() {
                Ok(token) => {
                    assert!(!matches!(token.data, TokenData::StreamEnd), "no error raised");
                }
                Err(err) => break err,
            }
        };
        assert!(err.to_string().contains("JSON mode"));
    }

    #[test]
    fn tab_in_indentation_is_an_error_by_default() {
        let mut scanner = Scanner::new();
        let mut bytes: &[u8] = b"a:\n\tb: 1\n";
        scanner.set_input_string(&mut bytes);
        let mut result = Ok(());
        loop {
            match scanner.scan() {
                Ok(token) => {
                    if matches!(token.data, TokenData::StreamEnd) {
                        break;
                    }
                }
                Err(err) => {
                    result = Err(err);
                    break;
                }
            }
        }
        assert!(result.is_err());
    }

    #[test]
    fn crlf_break_convention_is_recorded() {
        let mut scanner = Scanner::new();
        let mut bytes: &[u8] = b"a: 1\r\nb: 2\r\n";
        scanner.set_input_string(&mut bytes);
        loop {
            if matches!(scanner.scan().unwrap().data, TokenData::StreamEnd) {
                break;
            }
        }
        assert_eq!(scanner.detected_break(), crate::Break::CrLn);
    }
}

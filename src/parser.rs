//! Incremental code parser.
//!
//! A line holds one or more codes followed by an optional comment:
//! ```text
//! line      ::= indent ( 'N' number )? code* ( ';' comment )? '\n'
//! code      ::= ( 'G53' )? [GMT] ( number ( '.' number )? | '{' expression '}' )? chunk*
//!             | keyword argument?
//! chunk     ::= letter value? | '"' string '"' | '{' expression '}' | '(' comment ')'
//! value     ::= numeric ( ':' numeric )* | '"' string '"' | '\'' char '\'' | '{' expression '}' ( ':' ... )*
//! ```
//! A new code starts on the same line when a G, M or T letter follows a complete code
//! (`G91 G1 X5`). Codes read from the same source share a [`CodeParserBuffer`].
//!
//! Bytes are fed one at a time to a state machine that never looks ahead: escaped quotes
//! (`""` and `''`) are resolved when the byte after the quote arrives, and the byte that
//! starts the next code of a line is handed back to the buffer.


use core::mem;
use std::io::{self, Read};

use futures::io::{AsyncRead, AsyncReadExt};

use crate::{
    utils::{
        is_hex_prefixed, is_numeric_char, is_whitespace, trim_ascii, AXIS_LETTERS,
        UNPRECEDENTED_MCODES,
    },
    Code, CodeFlags, CodeParameter, CodeParserBuffer, CodeType, Error, KeywordType, ParseError,
};

/// What to do with a parameter letter that occurs twice in a code.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub enum DuplicateParameters {
    #[default]
    Reject,
    /// Keep the first occurrence and drop the others.
    Ignore,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy, Default)]
pub struct ParseOptions {
    pub duplicates: DuplicateParameters,
}

impl ParseOptions {
    /// Whole-buffer parsing: duplicate parameters are errors.
    pub const fn strict() -> Self {
        Self {
            duplicates: DuplicateParameters::Reject,
        }
    }

    /// Streaming: duplicate parameters are dropped.
    pub const fn lenient() -> Self {
        Self {
            duplicates: DuplicateParameters::Ignore,
        }
    }
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Quote {
    Single,
    Double,
}

#[derive(Debug, PartialEq, Eq, Clone, Copy)]
enum Feed {
    Continue,
    /// The byte starts the next code of the line and must be read again.
    Boundary,
    EndOfLine,
}

/// Per-code parsing state.
#[derive(Debug, Default)]
struct LineParser {
    options: ParseOptions,
    letter: Option<u8>,
    value: Vec<u8>,
    raw: Vec<u8>,
    comment: Option<Vec<u8>>,
    argument: Option<Vec<u8>>,
    quote: Option<Quote>,
    /// A closing quote that may turn out to be the first half of an escaped one.
    pending_quote: Option<u8>,
    at_line_end: bool,
    content_read: bool,
    reading_at_start: bool,
    is_line_number: bool,
    had_line_number: bool,
    unprecedented: bool,
    in_final_comment: bool,
    in_encapsulated_comment: bool,
    in_condition: bool,
    in_chunk: bool,
    in_expression: bool,
    ending_chunk: bool,
    is_numeric: bool,
    next_char_lower_case: bool,
    was_quoted: bool,
    was_expression: bool,
    curly_braces: i32,
    round_braces: i32,
}

impl LineParser {
    fn begin(options: ParseOptions, code: &mut Code, buffer: &mut CodeParserBuffer) -> Self {
        let channel = code.channel;
        code.reset();
        code.channel = channel;
        if buffer.enforcing_absolute_position {
            code.flags = CodeFlags::ENFORCE_ABSOLUTE_POSITION;
        }
        code.indent = buffer.indent;
        code.length = Some(0);
        code.file_position = buffer.is_file().then(|| buffer.position());
        code.line_number = buffer.line_number;

        let reading_at_start = mem::replace(&mut buffer.seen_new_line, false);
        Self {
            options,
            reading_at_start,
            ..Self::default()
        }
    }

    fn error(&self, code: &Code, message: impl Into<String>) -> ParseError {
        ParseError::new(message, code.line_number)
    }

    fn raw_text(&self) -> String {
        let raw = match self.raw.as_slice() {
            [rest @ .., b'\r', b'\n'] | [rest @ .., b'\n'] => rest,
            raw => raw,
        };
        String::from_utf8_lossy(raw).into_owned()
    }

    fn advance(c: u8) -> Feed {
        if c == b'\n' {
            Feed::EndOfLine
        } else {
            Feed::Continue
        }
    }

    /// Processes one byte. `None` marks the end of the source and terminates the line.
    fn feed(
        &mut self,
        input: Option<u8>,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
    ) -> Result<Feed, ParseError> {
        let c = match input {
            Some(c) => {
                self.raw.push(c);
                code.length = Some(code.length.unwrap_or(0) + 1);
                if c == b'\n' && !self.had_line_number {
                    if let Some(line) = buffer.line_number.as_mut() {
                        *line += 1;
                    }
                }
                c
            }
            None => b'\n',
        };
        self.at_line_end = c == b'\n';
        if c == b'\r' {
            return Ok(Feed::Continue);
        }

        if let Some(quote) = self.pending_quote.take() {
            if self.resolve_quote(quote, c) {
                return Ok(Self::advance(c));
            }
        }

        if self.in_final_comment {
            let comment = self.comment.get_or_insert_with(Vec::new);
            if c != b'\n' {
                comment.push(c);
            }
            return Ok(Self::advance(c));
        }

        if self.in_encapsulated_comment {
            let comment = self.comment.get_or_insert_with(Vec::new);
            if c == b')' {
                self.in_encapsulated_comment = false;
            } else {
                comment.push(c);
            }
            return Ok(Self::advance(c));
        }

        if self.in_condition {
            self.read_condition(c, code)?;
            return Ok(Self::advance(c));
        }

        if self.in_chunk {
            self.read_chunk(c, code)?;
            if self.ending_chunk && c == b'\n' {
                self.in_chunk = false;
                self.ending_chunk = false;
            }
        }

        if self.reading_at_start {
            self.read_indentation(c, code, buffer)?;
        }

        if !self.in_condition && !self.in_chunk && !self.reading_at_start {
            if self.letter.is_some() || !self.value.is_empty() || self.was_quoted {
                self.complete_chunk(code, buffer)?;
            }

            match c {
                b';' => {
                    self.content_read = true;
                    self.in_final_comment = true;
                }
                b'(' => {
                    self.content_read = true;
                    self.in_encapsulated_comment = true;
                }
                b'\'' => {
                    self.content_read = true;
                    self.next_char_lower_case = true;
                }
                c if is_whitespace(c) => {}
                c => {
                    if !self.in_condition && self.is_code_boundary(c, code) {
                        self.raw.pop();
                        code.length = code.length.map(|len| len - 1);
                        return Ok(Feed::Boundary);
                    }
                    self.start_chunk(c);
                }
            }
        }

        Ok(Self::advance(c))
    }

    /// Handles the byte after a closing quote. Returns `true` if it was consumed as the
    /// second half of an escaped quote.
    fn resolve_quote(&mut self, quote: u8, c: u8) -> bool {
        if c == quote {
            if self.in_condition {
                self.argument.get_or_insert_with(Vec::new).push(c);
            } else {
                self.value.push(c);
            }
            return true;
        }

        self.quote = None;
        if !self.in_condition {
            self.next_char_lower_case = false;
            self.was_quoted = true;
            self.ending_chunk = true;
        }
        false
    }

    fn read_condition(&mut self, c: u8, code: &Code) -> Result<(), ParseError> {
        if let Some(quote) = self.quote {
            self.argument.get_or_insert_with(Vec::new).push(c);
            let closing = match quote {
                Quote::Single => b'\'',
                Quote::Double => b'"',
            };
            if c == closing {
                self.pending_quote = Some(c);
            }
            return Ok(());
        }

        match c {
            b'\n' => return Ok(()),
            b';' => {
                self.in_condition = false;
                self.in_final_comment = true;
                return Ok(());
            }
            b'\'' => self.quote = Some(Quote::Single),
            b'"' => self.quote = Some(Quote::Double),
            b'{' => self.curly_braces += 1,
            b'}' => self.curly_braces -= 1,
            b'(' => self.round_braces += 1,
            b')' if self.round_braces == 0 => {
                return Err(self.error(code, "Unexpected closing round brace"))
            }
            b')' => self.round_braces -= 1,
            c if is_whitespace(c) && self.argument.as_ref().map_or(true, Vec::is_empty) => {
                return Ok(())
            }
            _ => {}
        }
        self.argument.get_or_insert_with(Vec::new).push(c);
        Ok(())
    }

    fn read_chunk(&mut self, c: u8, code: &Code) -> Result<(), ParseError> {
        match self.quote {
            Some(Quote::Single) => {
                if c == b'\'' {
                    self.pending_quote = Some(c);
                } else {
                    self.value.push(c);
                }
            }
            Some(Quote::Double) => match c {
                b'\'' if self.next_char_lower_case => {
                    self.value.push(b'\'');
                    self.next_char_lower_case = false;
                }
                b'\'' => self.next_char_lower_case = true,
                b'"' => self.pending_quote = Some(c),
                c if self.next_char_lower_case => {
                    self.value.push(c.to_ascii_lowercase());
                    self.next_char_lower_case = false;
                }
                c => self.value.push(c),
            },
            None if self.in_expression => {
                match c {
                    b'{' => self.curly_braces += 1,
                    b'}' => {
                        self.curly_braces -= 1;
                        if self.curly_braces == 0 {
                            if self.round_braces > 0 {
                                return Err(self.error(code, "Unterminated round brace"));
                            }
                            if self.round_braces < 0 {
                                return Err(self.error(code, "Too many closing round braces"));
                            }
                            self.in_expression = false;
                            self.was_expression = true;
                            self.ending_chunk = true;
                        }
                    }
                    b'(' => self.round_braces += 1,
                    b')' => self.round_braces -= 1,
                    _ => {}
                }
                self.value.push(c);
            }
            None => match c {
                b';' => {
                    self.in_final_comment = true;
                    self.in_chunk = false;
                    self.ending_chunk = false;
                }
                b'(' => {
                    self.in_encapsulated_comment = true;
                    self.in_chunk = false;
                    self.ending_chunk = false;
                }
                c if !self.ending_chunk && self.value.is_empty() => self.start_value(c),
                c if self.ending_chunk
                    || (self.unprecedented && c == b'\n')
                    || (!self.unprecedented && is_whitespace(c))
                    || (self.is_numeric && c != b':' && !is_numeric_char(c)) =>
                {
                    if (c == b'{' && trim_ascii(&self.value).ends_with(b":"))
                        || (c == b':' && self.was_expression)
                    {
                        // array expression such as `1:{2}` or `{1}:{2}`
                        self.value.push(c);
                        self.in_expression = true;
                        self.is_numeric = false;
                        if c == b'{' {
                            self.curly_braces += 1;
                        }
                    } else if self.continues_hex_number(c) {
                        self.value.push(c);
                    } else {
                        self.in_chunk = false;
                        self.ending_chunk = false;
                    }
                }
                c => self.value.push(c),
            },
        }
        Ok(())
    }

    /// First byte after the letter of a chunk.
    fn start_value(&mut self, c: u8) {
        match c {
            c if is_whitespace(c) => self.ending_chunk = true,
            b'\'' => {
                self.quote = Some(Quote::Single);
                self.is_numeric = false;
            }
            b'"' => {
                self.quote = Some(Quote::Double);
                self.is_numeric = false;
            }
            b'{' => {
                self.value.push(c);
                self.in_expression = true;
                self.is_numeric = false;
                self.curly_braces += 1;
            }
            c => {
                self.is_numeric =
                    !self.unprecedented && (c == b':' || (c != b'e' && is_numeric_char(c)));
                self.value.push(c);
            }
        }
    }

    fn continues_hex_number(&self, c: u8) -> bool {
        if !self.is_numeric || self.ending_chunk {
            return false;
        }
        if c == b'x' {
            matches!(self.value.as_slice(), b"0" | b"+0" | b"-0")
        } else {
            is_hex_prefixed(&self.value) && c.is_ascii_hexdigit()
        }
    }

    fn read_indentation(
        &mut self,
        c: u8,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
    ) -> Result<(), ParseError> {
        self.is_line_number = c.to_ascii_uppercase() == b'N';
        if !is_whitespace(c) || c == b'\n' {
            self.reading_at_start = false;
            return Ok(());
        }

        let indent = if c == b'\t' {
            (u16::from(code.indent) + 4) & !3
        } else {
            u16::from(code.indent) + 1
        };
        let indent = u8::try_from(indent)
            .ok()
            .filter(|indent| c != b'\t' || *indent < u8::MAX)
            .ok_or_else(|| self.error(code, "Indentation too big"))?;
        code.indent = indent;
        buffer.indent = indent;
        Ok(())
    }

    fn start_chunk(&mut self, c: u8) {
        self.content_read = true;
        self.in_chunk = true;
        match c {
            b'{' => {
                self.value.push(b'{');
                self.in_expression = true;
                self.quote = None;
                self.curly_braces += 1;
            }
            b'"' => self.quote = Some(Quote::Double),
            c if self.next_char_lower_case => {
                self.letter = Some(c.to_ascii_lowercase());
                self.next_char_lower_case = false;
            }
            c if !self.unprecedented => self.letter = Some(c.to_ascii_uppercase()),
            c => self.letter = Some(c),
        }
    }

    /// `true` if `c` starts another code on the same line.
    fn is_code_boundary(&self, c: u8, code: &Code) -> bool {
        let next = c.to_ascii_uppercase();
        if !self.content_read
            || self.unprecedented
            || self.next_char_lower_case
            || !matches!(next, b'G' | b'M' | b'T')
        {
            return false;
        }
        match code.major_number {
            None => false,
            Some(53) if code.code_type == CodeType::GCode => false,
            // M-codes may carry a single G or T parameter
            Some(_) => {
                next == b'M'
                    || code.code_type != CodeType::MCode
                    || code.has_parameter(char::from(next))
            }
        }
    }

    fn complete_chunk(
        &mut self,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
    ) -> Result<(), ParseError> {
        let letter = self.letter.take();
        let value = mem::take(&mut self.value);
        let was_quoted = mem::replace(&mut self.was_quoted, false);
        let was_expression = mem::replace(&mut self.was_expression, false);

        if self.is_line_number {
            self.is_line_number = false;
            self.had_line_number = true;
            if let Some(line) = core::str::from_utf8(&value)
                .ok()
                .and_then(|v| v.parse::<i64>().ok())
            {
                code.line_number = Some(line);
                buffer.line_number = Some(line);
            }
            return Ok(());
        }

        let command = letter
            .filter(|&l| l != b'G' || value != b"lobal")
            .and_then(CodeType::from_command_letter);
        if let Some(kind) = command {
            let after_g53 =
                code.code_type == CodeType::GCode && code.major_number == Some(53);
            if code.major_number.is_none() || after_g53 {
                return self.read_command(kind, value, was_expression, code, buffer);
            }
        }

        if code.code_type == CodeType::None
            && code.major_number.is_none()
            && !was_quoted
            && !was_expression
        {
            let letter = letter.unwrap_or(b'@');
            let keyword = core::str::from_utf8(&value).ok().and_then(|rest| {
                let word = format!("{}{rest}", char::from(letter.to_ascii_lowercase()));
                KeywordType::from_word(&word)
            });
            if let Some(keyword) = keyword {
                code.code_type = CodeType::Keyword;
                code.keyword = keyword;
                if keyword.initialises_argument() {
                    self.argument = Some(Vec::new());
                }
                self.in_condition = keyword.reads_argument();
                return Ok(());
            }
            let single = buffer.may_repeat_code || self.unprecedented || self.is_numeric;
            return self.add_parameter(letter, value, false, single, code);
        }

        let (letter, mut value) = match letter {
            None => (b'@', value),
            Some(l) if self.unprecedented => {
                let mut text = Vec::with_capacity(value.len() + 1);
                text.push(l);
                text.extend_from_slice(&value);
                (b'@', text)
            }
            Some(l) => (l, value),
        };
        if was_expression && !(value.starts_with(b"{") && value.ends_with(b"}")) {
            let trimmed = trim_ascii(&value);
            let mut wrapped = Vec::with_capacity(trimmed.len() + 2);
            wrapped.push(b'{');
            wrapped.extend_from_slice(trimmed);
            wrapped.push(b'}');
            value = wrapped;
        }
        let single = self.unprecedented || self.is_numeric || was_expression;
        self.add_parameter(letter, value, was_quoted, single, code)
    }

    fn read_command(
        &mut self,
        kind: CodeType,
        value: Vec<u8>,
        was_expression: bool,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
    ) -> Result<(), ParseError> {
        if code.code_type == CodeType::GCode && code.major_number == Some(53) {
            code.major_number = None;
            code.flags |= CodeFlags::ENFORCE_ABSOLUTE_POSITION;
            buffer.enforcing_absolute_position = true;
        }
        code.code_type = kind;

        if was_expression {
            if kind == CodeType::TCode {
                return self.add_parameter(b'T', value, false, true, code);
            }
            return Err(self.error(
                code,
                "Dynamic command numbers are only supported for T-codes",
            ));
        }

        let letter = kind.letter().unwrap_or('?');
        let text = self.utf8(value, code)?;
        if let Some((major, minor)) = text.split_once('.') {
            let major = major.parse::<i32>().map_err(|_| {
                self.error(code, format!("Failed to parse major {letter}-code number ({major})"))
            })?;
            let minor = minor.parse::<i8>().ok().filter(|m| *m >= 0).ok_or_else(|| {
                self.error(code, format!("Failed to parse minor {letter}-code number ({minor})"))
            })?;
            code.major_number = Some(major);
            code.minor_number = Some(minor);
        } else if let Ok(major) = text.parse::<i32>() {
            code.major_number = Some(major);
            self.unprecedented =
                kind == CodeType::MCode && UNPRECEDENTED_MCODES.contains(&major);
        } else if !text.trim().is_empty() || kind != CodeType::TCode {
            return Err(self.error(
                code,
                format!("Failed to parse major {letter}-code number ({text})"),
            ));
        }
        Ok(())
    }

    fn utf8(&self, value: Vec<u8>, code: &Code) -> Result<String, ParseError> {
        String::from_utf8(value).map_err(|_| self.error(code, "Invalid UTF-8 string"))
    }

    fn add_parameter(
        &self,
        letter: u8,
        value: Vec<u8>,
        is_quoted: bool,
        is_single: bool,
        code: &mut Code,
    ) -> Result<(), ParseError> {
        let letter = char::from(letter);
        if letter != '@' && code.has_parameter(letter) {
            match self.options.duplicates {
                DuplicateParameters::Reject => {
                    return Err(self.error(code, format!("Duplicate {letter} parameter")));
                }
                DuplicateParameters::Ignore => {
                    tracing::warn!(%letter, code = %code.to_short_string(), "ignoring duplicate parameter");
                    return Ok(());
                }
            }
        }

        let value = self.utf8(value, code)?;
        if is_quoted || is_single {
            code.parameters.push(CodeParameter::new(letter, value, is_quoted));
        } else {
            // `M84 XYE`: every character is a flag of its own
            code.parameters.push(CodeParameter::new(letter, "", false));
            code.parameters
                .extend(value.chars().map(|flag| CodeParameter::new(flag, "", false)));
        }
        Ok(())
    }

    /// Validates and stores what was read once the code has ended.
    fn finish(
        &mut self,
        ended_line: bool,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
    ) -> Result<bool, ParseError> {
        if ended_line {
            code.flags |= CodeFlags::IS_LAST_CODE;
            buffer.invalidate_data();
        }

        if buffer.may_repeat_code {
            match (code.code_type, code.major_number) {
                (CodeType::GCode, Some(major)) => buffer.last_gcode = Some(major),
                (CodeType::None, _)
                    if matches!(buffer.last_gcode, Some(0..=3))
                        && code
                            .parameters
                            .iter()
                            .any(|p| AXIS_LETTERS.contains(&p.letter())) =>
                {
                    code.code_type = CodeType::GCode;
                    code.major_number = buffer.last_gcode;
                }
                _ => buffer.last_gcode = None,
            }
        }

        code.comment = self
            .comment
            .take()
            .map(|comment| String::from_utf8_lossy(&comment).into_owned());
        if code.code_type == CodeType::None && code.parameters.is_empty() && code.comment.is_some()
        {
            code.code_type = CodeType::Comment;
        }

        if self.in_encapsulated_comment {
            return Err(self.error(code, "Unterminated encapsulated comment"));
        }
        match self.quote {
            Some(Quote::Single) => return Err(self.error(code, "Unterminated character literal")),
            Some(Quote::Double) => return Err(self.error(code, "Unterminated string")),
            None => {}
        }
        if self.curly_braces > 0 {
            return Err(self.error(code, "Unterminated expression"));
        }
        if self.curly_braces < 0 {
            return Err(self.error(code, "Too many closing curly braces"));
        }
        if self.round_braces > 0 {
            return Err(self.error(code, "Unterminated round brace"));
        }
        if let Some(argument) = self.argument.take() {
            let argument = self.utf8(trim_ascii(&argument).to_vec(), code)?;
            if argument.chars().count() > 255 {
                return Err(self.error(code, "Keyword argument too long (> 255)"));
            }
            code.keyword_argument = Some(argument);
        }
        if code.parameters.len() > 255 {
            return Err(self.error(code, "Too many parameters (> 255)"));
        }

        code.convert_driver_ids()?;
        Ok(self.content_read)
    }
}

enum Phase {
    Encoding,
    Recovery,
    Code(LineParser),
}

/// Drives a [`LineParser`] over the bytes of a [`CodeParserBuffer`], refilled by the caller.
///
/// A session dropped before the code is complete (a cancelled future or an I/O error)
/// invalidates the buffer, since it is unknown how much of the line was consumed.
struct Session<'a> {
    code: &'a mut Code,
    buffer: &'a mut CodeParserBuffer,
    options: ParseOptions,
    phase: Phase,
    finished: bool,
}

impl<'a> Session<'a> {
    fn new(code: &'a mut Code, buffer: &'a mut CodeParserBuffer, options: ParseOptions) -> Self {
        let phase = if buffer.bom_pending() {
            Phase::Encoding
        } else if buffer.recovering {
            Phase::Recovery
        } else {
            Phase::Code(LineParser::begin(options, code, buffer))
        };
        Self {
            code,
            buffer,
            options,
            phase,
            finished: false,
        }
    }

    fn wants_data(&self) -> bool {
        match self.phase {
            Phase::Encoding => self.buffer.needs_bom_data(),
            _ => self.buffer.needs_data(),
        }
    }

    fn spare(&mut self) -> &mut [u8] {
        self.buffer.spare()
    }

    fn filled(&mut self, read: usize) {
        self.buffer.filled(read);
    }

    fn next_phase(&mut self) -> Phase {
        if self.buffer.recovering {
            Phase::Recovery
        } else {
            Phase::Code(LineParser::begin(self.options, self.code, self.buffer))
        }
    }

    /// Consumes one byte. Yields whether content was read once the code is complete.
    fn step(&mut self) -> Result<Option<bool>, Error> {
        match self.phase {
            Phase::Encoding => {
                if let Err(e) = self.buffer.check_bom() {
                    self.finished = true;
                    return Err(e);
                }
                self.phase = self.next_phase();
                return Ok(None);
            }
            Phase::Recovery => {
                match self.buffer.take() {
                    Some(b'\n') => {
                        if let Some(line) = self.buffer.line_number.as_mut() {
                            *line += 1;
                        }
                    }
                    None => {}
                    Some(_) => return Ok(None),
                }
                self.buffer.recovering = false;
                self.buffer.invalidate_data();
                self.phase = self.next_phase();
                return Ok(None);
            }
            Phase::Code(_) => {}
        }
        let Phase::Code(parser) = &mut self.phase else {
            return Ok(None);
        };

        let input = self.buffer.take();
        let outcome = match parser.feed(input, self.code, self.buffer) {
            Ok(Feed::Continue) => return Ok(None),
            Ok(Feed::Boundary) => {
                self.buffer.untake();
                parser.finish(false, self.code, self.buffer)
            }
            Ok(Feed::EndOfLine) => parser.finish(true, self.code, self.buffer),
            Err(e) => Err(e),
        };
        self.finished = true;

        match outcome {
            Ok(read) => {
                if read {
                    tracing::debug!(code = %self.code, "parsed code");
                }
                Ok(Some(read))
            }
            Err(mut e) => {
                e.raw = parser.raw_text();
                if !parser.at_line_end {
                    self.buffer.recovering = true;
                }
                self.buffer.invalidate_data();
                Err(e.into())
            }
        }
    }
}

impl Drop for Session<'_> {
    fn drop(&mut self) {
        if !self.finished {
            tracing::warn!("code parsing was interrupted, invalidating the parser buffer");
            self.buffer.invalidate();
        }
    }
}

fn read_retrying<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    loop {
        match reader.read(buf) {
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            other => return other,
        }
    }
}

impl Code {
    /// Reads the next code from `reader` with [`ParseOptions::strict`].
    ///
    /// Returns `false` if the line held nothing but whitespace or the source is exhausted.
    /// After a parse error the rest of the failed line is skipped by the next call.
    pub fn parse<R: Read + ?Sized>(
        reader: &mut R,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
    ) -> Result<bool, Error> {
        Self::parse_with(reader, code, buffer, ParseOptions::strict())
    }

    pub fn parse_with<R: Read + ?Sized>(
        reader: &mut R,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
        options: ParseOptions,
    ) -> Result<bool, Error> {
        let mut session = Session::new(code, buffer, options);
        loop {
            if session.wants_data() {
                let read = read_retrying(reader, session.spare())?;
                session.filled(read);
            }
            if let Some(read) = session.step()? {
                return Ok(read);
            }
        }
    }

    /// Asynchronous counterpart of [`Code::parse`], using [`ParseOptions::lenient`].
    ///
    /// Dropping the future before it completes invalidates `buffer`.
    pub async fn parse_async<R: AsyncRead + Unpin + ?Sized>(
        reader: &mut R,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
    ) -> Result<bool, Error> {
        Self::parse_async_with(reader, code, buffer, ParseOptions::lenient()).await
    }

    pub async fn parse_async_with<R: AsyncRead + Unpin + ?Sized>(
        reader: &mut R,
        code: &mut Code,
        buffer: &mut CodeParserBuffer,
        options: ParseOptions,
    ) -> Result<bool, Error> {
        let mut session = Session::new(code, buffer, options);
        loop {
            if session.wants_data() {
                let read = loop {
                    match reader.read(session.spare()).await {
                        Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                        other => break other,
                    }
                }?;
                session.filled(read);
            }
            if let Some(read) = session.step()? {
                return Ok(read);
            }
        }
    }
}

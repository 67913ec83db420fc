/// State shared by consecutive codes read from one source.
///
/// Holds the bytes read ahead of the current code as well as the line context that
/// carries from one code to the next: whether a new line has started, its
/// indentation, a pending `G53` and (for files) the line counter.
#[derive(Debug, Clone)]
pub struct CodeParserBuffer {
    content: Box<[u8]>,
    pointer: usize,
    size: usize,
    /// Total bytes pulled from the source.
    consumed: u64,
    end_of_input: bool,
    is_file: bool,
    bom_checked: bool,
    pub(crate) seen_new_line: bool,
    pub(crate) indent: u8,
    pub(crate) enforcing_absolute_position: bool,
    /// The last code failed before its line ended, skip the rest of that line.
    pub(crate) recovering: bool,
    /// Line counter, only maintained for file sources unless a code sets it with `N`.
    pub line_number: Option<i64>,
    /// Major number of the last G-code, for repeating G0..G3 on bare axis lines.
    pub last_gcode: Option<i32>,
    /// Fanuc/LaserWeb dialect: a line of axis words repeats the last G0..G3.
    pub may_repeat_code: bool,
}

/// Longest byte order mark recognised at the start of a file.
const BOM_LEN: usize = 4;

impl CodeParserBuffer {
    /// File buffers hold at least [`BOM_LEN`] bytes so the byte order mark can be checked
    /// at once.
    pub fn new(buffer_size: usize, is_file: bool) -> Self {
        let capacity = if is_file { buffer_size.max(BOM_LEN) } else { buffer_size.max(1) };
        Self {
            content: vec![0; capacity].into_boxed_slice(),
            pointer: 0,
            size: 0,
            consumed: 0,
            end_of_input: false,
            is_file,
            bom_checked: !is_file,
            seen_new_line: true,
            indent: 0,
            enforcing_absolute_position: false,
            recovering: false,
            line_number: is_file.then_some(1),
            last_gcode: None,
            may_repeat_code: false,
        }
    }

    pub fn is_file(&self) -> bool {
        self.is_file
    }

    /// Offset in the source of the next byte to be parsed.
    pub fn position(&self) -> u64 {
        self.consumed - (self.size - self.pointer) as u64
    }

    /// `true` once the source has reported its end and every buffered byte was parsed.
    pub fn is_at_end(&self) -> bool {
        self.end_of_input && self.pointer >= self.size
    }

    /// Forgets the line context, as if a new line had just started.
    pub fn invalidate_data(&mut self) {
        self.seen_new_line = true;
        self.indent = 0;
        self.enforcing_absolute_position = false;
    }

    /// Drops the bytes read ahead and every piece of line context.
    pub fn invalidate(&mut self) {
        self.invalidate_data();
        self.pointer = 0;
        self.size = 0;
        self.recovering = false;
        self.line_number = None;
        self.last_gcode = None;
    }

    pub(crate) fn needs_data(&self) -> bool {
        self.pointer >= self.size
    }

    /// More bytes are needed before the byte order mark can be checked.
    pub(crate) fn needs_bom_data(&self) -> bool {
        !self.bom_checked && !self.end_of_input && self.size - self.pointer < BOM_LEN
    }

    /// Free space after the unparsed bytes, which are moved to the front first.
    pub(crate) fn spare(&mut self) -> &mut [u8] {
        self.content.copy_within(self.pointer..self.size, 0);
        self.size -= self.pointer;
        self.pointer = 0;
        &mut self.content[self.size..]
    }

    /// Records how many bytes a read placed in [`spare`](Self::spare).
    pub(crate) fn filled(&mut self, read: usize) {
        self.size += read;
        self.consumed += read as u64;
        self.end_of_input = read == 0;
        tracing::trace!(read, "code buffer refilled");
    }

    /// Next buffered byte, `None` if the source is exhausted.
    pub(crate) fn take(&mut self) -> Option<u8> {
        let b = self.content[..self.size].get(self.pointer).copied()?;
        self.pointer += 1;
        Some(b)
    }

    /// Puts back the byte returned by the last [`take`](Self::take).
    pub(crate) fn untake(&mut self) {
        self.pointer = self.pointer.saturating_sub(1);
    }

    pub(crate) fn bom_pending(&self) -> bool {
        !self.bom_checked
    }

    /// Skips a UTF-8 byte order mark at the very start of a file and rejects the
    /// encodings that cannot be parsed.
    pub(crate) fn check_bom(&mut self) -> Result<(), crate::Error> {
        self.bom_checked = true;
        let head = &self.content[self.pointer..self.size];
        let encoding = if head.starts_with(&[0xEF, 0xBB, 0xBF]) {
            self.pointer += 3;
            return Ok(());
        } else if head.starts_with(&[0x00, 0x00, 0xFE, 0xFF])
            || head.starts_with(&[0xFF, 0xFE, 0x00, 0x00])
        {
            "UTF-32"
        } else if head.starts_with(&[0xFE, 0xFF]) || head.starts_with(&[0xFF, 0xFE]) {
            "UTF-16"
        } else if head.starts_with(&[0x2B, 0x2F, 0x76]) {
            "UTF-7"
        } else {
            return Ok(());
        };
        Err(crate::Error::UnsupportedEncoding(encoding))
    }
}

impl Default for CodeParserBuffer {
    fn default() -> Self {
        Self::new(256, false)
    }
}

#[cfg(test)]
mod test {
    use super::CodeParserBuffer;
    use crate::Error;

    fn load(buffer: &mut CodeParserBuffer, data: &[u8]) {
        buffer.spare()[..data.len()].copy_from_slice(data);
        buffer.filled(data.len());
    }

    #[test]
    fn file_buffers_count_lines_from_one() {
        assert_eq!(CodeParserBuffer::new(16, true).line_number, Some(1));
        assert_eq!(CodeParserBuffer::new(16, false).line_number, None);
    }

    #[test]
    fn position_tracks_consumed_bytes() {
        let mut buffer = CodeParserBuffer::new(8, false);
        load(&mut buffer, b"G1 X");
        assert_eq!(buffer.take(), Some(b'G'));
        assert_eq!(buffer.take(), Some(b'1'));
        buffer.untake();
        assert_eq!(buffer.position(), 1);
        assert_eq!(buffer.take(), Some(b'1'));
        assert_eq!(buffer.take(), Some(b' '));
        assert_eq!(buffer.take(), Some(b'X'));
        assert_eq!(buffer.position(), 4);
        load(&mut buffer, b"");
        assert_eq!(buffer.take(), None);
        assert!(buffer.is_at_end());
    }

    #[test]
    fn invalidation_levels() {
        let mut buffer = CodeParserBuffer::new(8, true);
        buffer.seen_new_line = false;
        buffer.indent = 4;
        buffer.enforcing_absolute_position = true;
        buffer.last_gcode = Some(1);

        buffer.invalidate_data();
        assert!(buffer.seen_new_line);
        assert_eq!(buffer.indent, 0);
        assert!(!buffer.enforcing_absolute_position);
        assert_eq!(buffer.line_number, Some(1));
        assert_eq!(buffer.last_gcode, Some(1));

        load(&mut buffer, b"abc");
        buffer.invalidate();
        assert!(buffer.needs_data());
        assert_eq!(buffer.line_number, None);
        assert_eq!(buffer.last_gcode, None);
    }

    #[test]
    fn byte_order_marks() {
        let mut buffer = CodeParserBuffer::new(8, true);
        load(&mut buffer, b"\xEF\xBB\xBFG1");
        assert!(buffer.check_bom().is_ok());
        assert_eq!(buffer.take(), Some(b'G'));

        let mut buffer = CodeParserBuffer::new(8, true);
        load(&mut buffer, b"\xFF\xFEG\x00");
        assert!(matches!(
            buffer.check_bom(),
            Err(Error::UnsupportedEncoding("UTF-16"))
        ));
    }

    #[test]
    fn short_reads_are_kept_until_the_mark_is_complete() {
        let mut buffer = CodeParserBuffer::new(2, true);
        assert_eq!(buffer.spare().len(), 4);
        assert!(buffer.needs_bom_data());
        load(&mut buffer, b"\xEF");
        assert!(buffer.needs_bom_data());
        load(&mut buffer, b"\xBB\xBFG");
        assert!(!buffer.needs_bom_data());
        assert_eq!(buffer.position(), 0);

        assert!(buffer.check_bom().is_ok());
        assert_eq!(buffer.position(), 3);
        assert_eq!(buffer.take(), Some(b'G'));
        assert!(buffer.needs_data());
        load(&mut buffer, b"1");
        assert_eq!(buffer.take(), Some(b'1'));
        assert_eq!(buffer.position(), 5);
    }

    #[test]
    fn sources_shorter_than_a_mark() {
        let mut buffer = CodeParserBuffer::new(8, true);
        load(&mut buffer, b"G");
        assert!(buffer.needs_bom_data());
        load(&mut buffer, b"");
        assert!(!buffer.needs_bom_data());
        assert!(buffer.check_bom().is_ok());
        assert_eq!(buffer.take(), Some(b'G'));
        assert_eq!(buffer.take(), None);
        assert!(buffer.is_at_end());
    }
}

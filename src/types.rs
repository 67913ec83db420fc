use core::fmt;
use core::ops;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Category of a parsed code.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CodeType {
    #[default]
    None,
    Comment,
    Keyword,
    GCode,
    MCode,
    TCode,
}

impl CodeType {
    /// Letter used when the code is sent to the firmware.
    pub fn letter(self) -> Option<char> {
        match self {
            CodeType::None => None,
            CodeType::Comment => Some('Q'),
            CodeType::Keyword => Some('K'),
            CodeType::GCode => Some('G'),
            CodeType::MCode => Some('M'),
            CodeType::TCode => Some('T'),
        }
    }

    pub(crate) fn from_command_letter(letter: u8) -> Option<Self> {
        match letter {
            b'G' => Some(CodeType::GCode),
            b'M' => Some(CodeType::MCode),
            b'T' => Some(CodeType::TCode),
            _ => None,
        }
    }
}

/// Conditional G-code keywords.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum KeywordType {
    #[default]
    None,
    If,
    ElseIf,
    Else,
    While,
    Break,
    Continue,
    Abort,
    Var,
    Global,
    Set,
    Echo,
}

impl KeywordType {
    /// Looks up a keyword by its exact lower-case spelling.
    pub fn from_word(word: &str) -> Option<Self> {
        Some(match word {
            "if" => KeywordType::If,
            "elif" => KeywordType::ElseIf,
            "else" => KeywordType::Else,
            "while" => KeywordType::While,
            "break" => KeywordType::Break,
            "continue" => KeywordType::Continue,
            "abort" => KeywordType::Abort,
            "var" => KeywordType::Var,
            "global" => KeywordType::Global,
            "set" => KeywordType::Set,
            "echo" => KeywordType::Echo,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            KeywordType::None => "",
            KeywordType::If => "if",
            KeywordType::ElseIf => "elif",
            KeywordType::Else => "else",
            KeywordType::While => "while",
            KeywordType::Break => "break",
            KeywordType::Continue => "continue",
            KeywordType::Abort => "abort",
            KeywordType::Var => "var",
            KeywordType::Global => "global",
            KeywordType::Set => "set",
            KeywordType::Echo => "echo",
        }
    }

    /// Keywords whose argument is initialised as soon as the keyword is seen.
    pub(crate) fn initialises_argument(self) -> bool {
        !matches!(
            self,
            KeywordType::None
                | KeywordType::Else
                | KeywordType::Break
                | KeywordType::Continue
                | KeywordType::Abort
        )
    }

    /// Keywords after which the rest of the line is read as an argument.
    pub(crate) fn reads_argument(self) -> bool {
        !matches!(self, KeywordType::None | KeywordType::Else)
    }
}

impl fmt::Display for KeywordType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bit set describing how a code was obtained and how it must be processed.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(transparent))]
pub struct CodeFlags(u32);

impl CodeFlags {
    pub const NONE: CodeFlags = CodeFlags(0);
    pub const ASYNCHRONOUS: CodeFlags = CodeFlags(1);
    pub const IS_PRE_PROCESSED: CodeFlags = CodeFlags(2);
    pub const IS_POST_PROCESSED: CodeFlags = CodeFlags(4);
    pub const IS_FROM_MACRO: CodeFlags = CodeFlags(8);
    pub const IS_NESTED_MACRO: CodeFlags = CodeFlags(16);
    pub const IS_FROM_CONFIG: CodeFlags = CodeFlags(32);
    pub const IS_FROM_CONFIG_OVERRIDE: CodeFlags = CodeFlags(64);
    /// Set by a `G53` prefix, carried to all codes that follow on the same line.
    pub const ENFORCE_ABSOLUTE_POSITION: CodeFlags = CodeFlags(128);
    pub const IS_PRIORITIZED: CodeFlags = CodeFlags(256);
    pub const UNBUFFERED: CodeFlags = CodeFlags(512);
    pub const IS_FROM_FIRMWARE: CodeFlags = CodeFlags(1024);
    /// The code was terminated by the end of its line.
    pub const IS_LAST_CODE: CodeFlags = CodeFlags(2048);

    pub const fn from_bits(bits: u32) -> Self {
        CodeFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: CodeFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: CodeFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: CodeFlags) {
        self.0 &= !other.0;
    }
}

impl ops::BitOr for CodeFlags {
    type Output = CodeFlags;
    fn bitor(self, rhs: CodeFlags) -> CodeFlags {
        CodeFlags(self.0 | rhs.0)
    }
}

impl ops::BitOrAssign for CodeFlags {
    fn bitor_assign(&mut self, rhs: CodeFlags) {
        self.0 |= rhs.0;
    }
}

/// Source a code was received from.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum CodeChannel {
    HTTP,
    Telnet,
    File,
    USB,
    Aux,
    Trigger,
    Queue,
    LCD,
    #[default]
    SBC,
    Daemon,
    Aux2,
    AutoPause,
    File2,
    Queue2,
    Unknown,
}

/// Severity of a [`Message`].
#[derive(Debug, PartialEq, Eq, PartialOrd, Ord, Clone, Copy, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MessageType {
    #[default]
    Success,
    Warning,
    Error,
}

/// Result text of an executed code.
#[derive(Debug, PartialEq, Eq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Message {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub kind: MessageType,
    pub content: String,
}

impl Message {
    pub fn new(kind: MessageType, content: impl Into<String>) -> Self {
        Self {
            kind,
            content: content.into(),
        }
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self::new(MessageType::Success, content)
    }

    pub fn warning(content: impl Into<String>) -> Self {
        Self::new(MessageType::Warning, content)
    }

    pub fn error(content: impl Into<String>) -> Self {
        Self::new(MessageType::Error, content)
    }

    /// Appends a line of text, separated from existing content by a newline. Blank lines are dropped.
    pub fn append_line(&mut self, line: &str) {
        if line.trim().is_empty() {
            return;
        }
        if !self.content.is_empty() && !self.content.ends_with('\n') {
            self.content.push('\n');
        }
        self.content.push_str(line);
    }

    /// Merges another message into this one, keeping the higher severity.
    pub fn append(&mut self, other: &Message) {
        self.kind = self.kind.max(other.kind);
        self.append_line(&other.content);
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind {
            MessageType::Success => f.write_str(&self.content),
            MessageType::Warning => write!(f, "Warning: {}", self.content),
            MessageType::Error => write!(f, "Error: {}", self.content),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{CodeFlags, KeywordType, Message, MessageType};

    #[test]
    fn every_keyword_spelling_round_trips() {
        for word in [
            "if", "elif", "else", "while", "break", "continue", "abort", "var", "global", "set",
            "echo",
        ] {
            let keyword = KeywordType::from_word(word).unwrap();
            assert_eq!(keyword.as_str(), word);
        }
        assert_eq!(KeywordType::from_word("If"), None);
        assert_eq!(KeywordType::None.as_str(), "");
    }

    #[test]
    fn flags_combine() {
        let mut flags = CodeFlags::IS_FROM_MACRO | CodeFlags::ENFORCE_ABSOLUTE_POSITION;
        assert!(flags.contains(CodeFlags::ENFORCE_ABSOLUTE_POSITION));
        assert!(!flags.contains(CodeFlags::IS_LAST_CODE));
        flags |= CodeFlags::IS_LAST_CODE;
        flags.remove(CodeFlags::IS_FROM_MACRO);
        assert_eq!(flags.bits(), 128 | 2048);
    }

    #[test]
    fn messages_escalate_and_render_with_a_prefix() {
        let mut message = Message::success("ok");
        message.append(&Message::warning("careful"));
        message.append(&Message::success("  "));
        assert_eq!(message.kind, MessageType::Warning);
        assert_eq!(message.to_string(), "Warning: ok\ncareful");

        message.append(&Message::error("boom"));
        assert_eq!(message.to_string(), "Error: ok\ncareful\nboom");
    }
}

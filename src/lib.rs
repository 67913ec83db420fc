//! This crate implements an incremental G/M/T-code parser in the dialect understood by
//! RepRapFirmware, including its conditional G-code keywords (`if`, `while`, `echo`, ...),
//! `{...}` expressions, quoted strings and the unprecedented M-codes that take a raw
//! file name or message.
//!
//! Input is consumed one code at a time from a byte source, either synchronously with
//! [`Code::parse`] or asynchronously with [`Code::parse_async`]. A [`CodeParserBuffer`]
//! carries the state shared by consecutive codes of a source (read-ahead bytes, line
//! number, indentation, `G53` carry-over). [`CodeStream`] wraps both into a stream of codes.
//!
//! ```
//! use duet_gcode::{Code, CodeType};
//!
//! let code: Code = "G1 X10 Y2.5 F3000 ; move".parse().unwrap();
//! assert_eq!(code.code_type, CodeType::GCode);
//! assert_eq!(code.major_number, Some(1));
//! assert_eq!(code.get_float('Y').unwrap(), 2.5);
//! assert_eq!(code.comment.as_deref(), Some(" move"));
//! ```

mod buffer;
mod code;
mod driver_id;
mod parameter;
mod parser;
mod simple_code;
mod stream;
mod types;
mod utils;

use core::fmt;

pub use buffer::CodeParserBuffer;
pub use code::Code;
pub use driver_id::{DriverId, DriverIdError};
pub use parameter::{CodeParameter, ParsedValue};
pub use parser::{DuplicateParameters, ParseOptions};
pub use simple_code::{Cancelled, CodeExecutor, SimpleCode};
pub use stream::CodeStream;
pub use types::{CodeChannel, CodeFlags, CodeType, KeywordType, Message, MessageType};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Parse(#[from] ParseError),
    #[error("Missing {0} parameter")]
    MissingParameter(char),
    #[error("Cannot convert {letter} parameter value '{value}' to {target}")]
    InvalidParameterType {
        letter: char,
        value: String,
        target: &'static str,
    },
    #[error("{source} from {letter} parameter")]
    DriverId {
        letter: char,
        #[source]
        source: DriverIdError,
    },
    #[error("I/O error while reading codes")]
    Io(#[from] std::io::Error),
    #[error("{0} encoding is not supported")]
    UnsupportedEncoding(&'static str),
}

/// Malformed input. Fatal for the code being parsed, the source stays usable.
#[derive(Debug, PartialEq, Eq, Clone, thiserror::Error)]
#[error("{message}{}", LineSuffix(.line_number))]
pub struct ParseError {
    pub message: String,
    pub line_number: Option<i64>,
    /// Text consumed for the failed code.
    pub raw: String,
}

impl ParseError {
    pub(crate) fn new(message: impl Into<String>, line_number: Option<i64>) -> Self {
        Self {
            message: message.into(),
            line_number,
            raw: String::new(),
        }
    }
}

struct LineSuffix<'a>(&'a Option<i64>);

impl fmt::Display for LineSuffix<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0 {
            Some(line) => write!(f, " in line {line}"),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod test {
    use super::{DriverIdError, Error, ParseError};

    #[test]
    fn parse_errors_mention_the_line() {
        assert_eq!(
            ParseError::new("Unterminated string", Some(12)).to_string(),
            "Unterminated string in line 12"
        );
        assert_eq!(
            Error::from(ParseError::new("Unterminated string", None)).to_string(),
            "Unterminated string"
        );
    }

    #[test]
    fn driver_errors_name_the_parameter() {
        let err = Error::DriverId {
            letter: 'P',
            source: DriverIdError::BadBoard,
        };
        assert_eq!(err.to_string(), "Failed to parse board number from P parameter");
    }
}

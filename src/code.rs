use core::fmt;
use core::str::FromStr;
use std::net::IpAddr;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    utils::AXIS_LETTERS, CodeChannel, CodeFlags, CodeParameter, CodeParserBuffer, CodeType,
    DriverId, Error, KeywordType, Message, ParseError, ParsedValue,
};

/// A parsed G/M/T-code, keyword line or comment.
#[derive(Debug, PartialEq, Clone, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize), serde(rename_all = "camelCase"))]
pub struct Code {
    #[cfg_attr(feature = "serde", serde(rename = "type"))]
    pub code_type: CodeType,
    pub channel: CodeChannel,
    pub line_number: Option<i64>,
    /// Columns of leading whitespace, tabs counting up to the next multiple of four.
    pub indent: u8,
    pub keyword: KeywordType,
    pub keyword_argument: Option<String>,
    pub major_number: Option<i32>,
    pub minor_number: Option<i8>,
    pub flags: CodeFlags,
    pub comment: Option<String>,
    /// Offset of the first byte of this code in a file source.
    pub file_position: Option<u64>,
    /// Bytes consumed for this code, line terminator included.
    pub length: Option<usize>,
    pub parameters: Vec<CodeParameter>,
    pub result: Option<Message>,
}

macro_rules! typed_getters {
    ($($ty:ty => $get:ident, $get_or:ident, $try_get:ident, $conv:ident;)*) => {
        $(
            /// Fails if the parameter is missing or cannot be viewed as the requested type.
            pub fn $get(&self, letter: char) -> Result<$ty, Error> {
                self.require(letter)?.$conv()
            }

            /// Falls back to `default` when the parameter is missing or has an incompatible type.
            pub fn $get_or(&self, letter: char, default: $ty) -> $ty {
                self.parameter(letter)
                    .and_then(|p| p.$conv().ok())
                    .unwrap_or(default)
            }

            /// Like the getter but skips expressions and never fails.
            pub fn $try_get(&self, letter: char) -> Option<$ty> {
                self.evaluated_parameter(letter).and_then(|p| p.$conv().ok())
            }
        )*
    };
}

impl Code {
    pub fn new(channel: CodeChannel) -> Self {
        Self {
            channel,
            ..Self::default()
        }
    }

    /// Resets every field, keeping the capacity of the parameter list.
    pub fn reset(&mut self) {
        let mut parameters = core::mem::take(&mut self.parameters);
        parameters.clear();
        *self = Self {
            parameters,
            ..Self::default()
        };
    }

    pub fn parameter(&self, letter: char) -> Option<&CodeParameter> {
        self.parameters.iter().find(|p| p.letter() == letter)
    }

    pub fn has_parameter(&self, letter: char) -> bool {
        self.parameter(letter).is_some()
    }

    /// The parameter for `letter`, or a new one holding `default`.
    pub fn parameter_or(&self, letter: char, default: ParsedValue) -> CodeParameter {
        self.parameter(letter)
            .cloned()
            .unwrap_or_else(|| CodeParameter::from_value(letter, default))
    }

    fn require(&self, letter: char) -> Result<&CodeParameter, Error> {
        self.parameter(letter)
            .ok_or(Error::MissingParameter(letter))
    }

    fn evaluated_parameter(&self, letter: char) -> Option<&CodeParameter> {
        self.parameters
            .iter()
            .find(|p| p.letter() == letter && !p.is_expression())
    }

    typed_getters! {
        f32 => get_float, get_float_or, try_get_float, to_float;
        i32 => get_int, get_int_or, try_get_int, to_int;
        u32 => get_uint, get_uint_or, try_get_uint, to_uint;
        i64 => get_long, get_long_or, try_get_long, to_long;
        bool => get_bool, get_bool_or, try_get_bool, to_bool;
        DriverId => get_driver_id, get_driver_id_or, try_get_driver_id, to_driver_id;
        IpAddr => get_ip_address, get_ip_address_or, try_get_ip_address, to_ip_addr;
        Vec<f32> => get_float_array, get_float_array_or, try_get_float_array, to_float_array;
        Vec<i32> => get_int_array, get_int_array_or, try_get_int_array, to_int_array;
        Vec<u32> => get_uint_array, get_uint_array_or, try_get_uint_array, to_uint_array;
        Vec<i64> => get_long_array, get_long_array_or, try_get_long_array, to_long_array;
        Vec<DriverId> => get_driver_id_array, get_driver_id_array_or, try_get_driver_id_array, to_driver_id_array;
    }

    /// Fails only if the parameter is missing.
    pub fn get_string(&self, letter: char) -> Result<&str, Error> {
        self.require(letter).map(CodeParameter::as_str)
    }

    pub fn get_string_or<'a>(&'a self, letter: char, default: &'a str) -> &'a str {
        self.parameter(letter).map_or(default, CodeParameter::as_str)
    }

    pub fn try_get_string(&self, letter: char) -> Option<&str> {
        self.evaluated_parameter(letter).map(CodeParameter::as_str)
    }

    /// Replaces the parameters that M569, M584, M915, M955 and M956 address drivers with by
    /// driver ID values.
    pub(crate) fn convert_driver_ids(&mut self) -> Result<(), ParseError> {
        if self.code_type != CodeType::MCode {
            return Ok(());
        }
        let addresses_driver: fn(char) -> bool = match self.major_number {
            Some(569 | 915 | 955 | 956) => |letter| letter.to_ascii_uppercase() == 'P',
            Some(584) => |letter| letter == 'E' || AXIS_LETTERS.contains(&letter),
            _ => return Ok(()),
        };

        for index in 0..self.parameters.len() {
            let parameter = &self.parameters[index];
            if parameter.is_expression() || !addresses_driver(parameter.letter()) {
                continue;
            }
            let converted = parameter.with_driver_ids().map_err(|e| {
                ParseError::new(
                    format!("{e} from {} parameter", parameter.letter()),
                    self.line_number,
                )
            })?;
            self.parameters[index] = converted;
        }
        Ok(())
    }

    /// Argument of an unprecedented M-code (`M32 "file.g"`), or the parameters joined
    /// back together when it was written with letters.
    pub fn get_unprecedented_string(&self, quote_strings: bool) -> String {
        if let Some(p) = self.parameter('@') {
            return if quote_strings {
                format!("\"{}\"", p.raw_value().replace('"', "\"\""))
            } else {
                p.raw_value().to_string()
            };
        }

        let mut joined = String::new();
        for p in &self.parameters {
            if !joined.is_empty() {
                joined.push(' ');
            }
            joined.push(p.letter());
            if quote_strings && p.is_string() {
                joined.push('"');
                joined.push_str(&p.raw_value().replace('"', "\"\""));
                joined.push('"');
            } else {
                joined.push_str(p.raw_value());
            }
        }
        joined
    }

    /// Command part only, e.g. `G53 G1` or `M98`.
    pub fn to_short_string(&self) -> String {
        if self.keyword != KeywordType::None {
            return self.keyword.as_str().to_string();
        }
        let letter = match self.code_type {
            CodeType::None => return String::new(),
            CodeType::Comment => return "(comment)".to_string(),
            CodeType::Keyword => return self.keyword.as_str().to_string(),
            CodeType::GCode => 'G',
            CodeType::MCode => 'M',
            CodeType::TCode => 'T',
        };

        let mut short = String::new();
        if self.flags.contains(CodeFlags::ENFORCE_ABSOLUTE_POSITION) {
            short.push_str("G53 ");
        }
        short.push(letter);
        if let Some(major) = self.major_number {
            short.push_str(&major.to_string());
            if let Some(minor) = self.minor_number {
                short.push('.');
                short.push_str(&minor.to_string());
            }
        }
        short
    }

    fn write_result(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.result {
            Some(result) if !result.content.is_empty() => {
                write!(f, " => {}", result.to_string().trim_end())
            }
            _ => Ok(()),
        }
    }
}

fn write_quoted(f: &mut fmt::Formatter<'_>, text: &str) -> fmt::Result {
    f.write_str("\"")?;
    for c in text.chars() {
        match c {
            '"' => f.write_str("\"\"")?,
            '\'' => f.write_str("''")?,
            c => write!(f, "{c}")?,
        }
    }
    f.write_str("\"")
}

/// Rebuilds the code as text that parses back into an equal code.
impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.keyword != KeywordType::None {
            f.write_str(self.keyword.as_str())?;
            if let Some(argument) = &self.keyword_argument {
                write!(f, " {argument}")?;
            }
            return self.write_result(f);
        }
        if self.code_type == CodeType::Comment {
            return write!(f, ";{}", self.comment.as_deref().unwrap_or_default());
        }

        let short = self.to_short_string();
        f.write_str(&short)?;
        let mut empty = short.is_empty();
        for p in &self.parameters {
            if !empty {
                f.write_str(" ")?;
            }
            empty = false;

            match p.letter() {
                '@' => {}
                letter if letter.is_lowercase() => write!(f, "'{letter}")?,
                letter => write!(f, "{letter}")?,
            }
            match p.value() {
                ParsedValue::Null => {}
                ParsedValue::String(s) => write_quoted(f, s)?,
                _ => f.write_str(p.raw_value())?,
            }
        }

        if let Some(comment) = self.comment.as_deref().filter(|c| !c.is_empty()) {
            if !empty {
                f.write_str(" ")?;
            }
            write!(f, ";{comment}")?;
        }
        self.write_result(f)
    }
}

impl FromStr for Code {
    type Err = Error;

    /// Parses the first code of `s` with the whole-buffer defaults.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut code = Code::default();
        let mut buffer = CodeParserBuffer::new(s.len().max(1), false);
        Code::parse(&mut s.as_bytes(), &mut code, &mut buffer)?;
        Ok(code)
    }
}

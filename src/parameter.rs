mod values;

use core::fmt;
use core::hash::{Hash, Hasher};
use std::net::IpAddr;

use crate::{DriverId, DriverIdError, Error};

pub(crate) use values::parse_value;
use values::{float_to_i32, float_to_i64, float_to_u32, render};

/// Typed interpretation of a parameter's text.
#[derive(Debug, PartialEq, Clone)]
pub enum ParsedValue {
    /// The letter was given without a value (`G28 X`).
    Null,
    Int(i32),
    UInt(u32),
    Float(f32),
    String(String),
    IntArray(Vec<i32>),
    UIntArray(Vec<u32>),
    FloatArray(Vec<f32>),
    /// `{...}` text to be evaluated by the firmware, kept verbatim.
    Expression(String),
    DriverId(DriverId),
    DriverIdArray(Vec<DriverId>),
}

impl ParsedValue {
    fn kind_name(&self) -> &'static str {
        match self {
            ParsedValue::Null => "null",
            ParsedValue::Int(_) => "int",
            ParsedValue::UInt(_) => "uint",
            ParsedValue::Float(_) => "float",
            ParsedValue::String(_) => "string",
            ParsedValue::IntArray(_) => "int[]",
            ParsedValue::UIntArray(_) => "uint[]",
            ParsedValue::FloatArray(_) => "float[]",
            ParsedValue::Expression(_) => "expression",
            ParsedValue::DriverId(_) => "driver ID",
            ParsedValue::DriverIdArray(_) => "driver ID[]",
        }
    }
}

/// Bits of a float with both zeros folded together, since `0.0 == -0.0`.
fn float_bits(v: f32) -> u32 {
    if v == 0.0 {
        0
    } else {
        v.to_bits()
    }
}

impl Hash for ParsedValue {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind_name().hash(state);
        match self {
            ParsedValue::Null => {}
            ParsedValue::Int(v) => v.hash(state),
            ParsedValue::UInt(v) => v.hash(state),
            ParsedValue::Float(v) => float_bits(*v).hash(state),
            ParsedValue::String(s) | ParsedValue::Expression(s) => s.hash(state),
            ParsedValue::IntArray(v) => v.hash(state),
            ParsedValue::UIntArray(v) => v.hash(state),
            ParsedValue::FloatArray(v) => v.iter().for_each(|f| float_bits(*f).hash(state)),
            ParsedValue::DriverId(id) => id.hash(state),
            ParsedValue::DriverIdArray(ids) => ids.hash(state),
        }
    }
}

/// A single letter/value pair of a code.
///
/// The text is typed once on construction (see [`ParsedValue`]); the `to_*` views convert
/// between compatible kinds and fail with [`Error::InvalidParameterType`] otherwise.
/// Equality compares the letter and the typed value, not the source text.
#[derive(Debug, Clone)]
pub struct CodeParameter {
    letter: char,
    raw: String,
    value: ParsedValue,
}

impl CodeParameter {
    /// Creates a parameter from its source text. A quoted string is never typed further.
    pub fn new(letter: char, value: impl Into<String>, is_string: bool) -> Self {
        let raw = value.into();
        let value = if is_string {
            ParsedValue::String(raw.clone())
        } else {
            parse_value(&raw)
        };
        Self { letter, raw, value }
    }

    pub fn from_value(letter: char, value: ParsedValue) -> Self {
        Self {
            letter,
            raw: render(&value),
            value,
        }
    }

    /// Parses `b.p` or `b.p:b.p:...` into a driver ID (array).
    pub fn driver_id(letter: char, value: impl Into<String>) -> Result<Self, Error> {
        let raw = value.into();
        let value = parse_driver_ids(&raw).map_err(|source| Error::DriverId { letter, source })?;
        Ok(Self { letter, raw, value })
    }

    /// Reinterprets this parameter's text as driver ID(s), keeping the letter.
    pub(crate) fn with_driver_ids(&self) -> Result<Self, DriverIdError> {
        Ok(Self {
            letter: self.letter,
            raw: self.raw.clone(),
            value: parse_driver_ids(&self.raw)?,
        })
    }

    pub fn letter(&self) -> char {
        self.letter
    }

    /// Text as it was read, quotes removed.
    pub fn raw_value(&self) -> &str {
        &self.raw
    }

    pub fn value(&self) -> &ParsedValue {
        &self.value
    }

    pub fn is_null(&self) -> bool {
        self.value == ParsedValue::Null
    }

    pub fn is_expression(&self) -> bool {
        matches!(self.value, ParsedValue::Expression(_))
    }

    pub fn is_string(&self) -> bool {
        matches!(self.value, ParsedValue::String(_))
    }

    pub fn is_driver_id(&self) -> bool {
        matches!(
            self.value,
            ParsedValue::DriverId(_) | ParsedValue::DriverIdArray(_)
        )
    }

    fn invalid(&self, target: &'static str) -> Error {
        Error::InvalidParameterType {
            letter: self.letter,
            value: self.raw.clone(),
            target,
        }
    }

    pub fn to_float(&self) -> Result<f32, Error> {
        match self.value {
            ParsedValue::Float(v) => Ok(v),
            ParsedValue::Int(v) => Ok(v as f32),
            ParsedValue::UInt(v) => Ok(v as f32),
            _ => Err(self.invalid("float")),
        }
    }

    pub fn to_int(&self) -> Result<i32, Error> {
        match self.value {
            ParsedValue::Int(v) => Ok(v),
            ParsedValue::Float(v) => float_to_i32(v).ok_or_else(|| self.invalid("int")),
            _ => Err(self.invalid("int")),
        }
    }

    pub fn to_uint(&self) -> Result<u32, Error> {
        match self.value {
            ParsedValue::UInt(v) => Ok(v),
            ParsedValue::DriverId(id) => Ok(id.as_u32()),
            ParsedValue::Int(v) => u32::try_from(v).map_err(|_| self.invalid("uint")),
            ParsedValue::Float(v) => float_to_u32(v).ok_or_else(|| self.invalid("uint")),
            _ => Err(self.invalid("uint")),
        }
    }

    pub fn to_long(&self) -> Result<i64, Error> {
        match self.value {
            ParsedValue::Int(v) => Ok(v.into()),
            ParsedValue::UInt(v) => Ok(v.into()),
            ParsedValue::Float(v) => float_to_i64(v).ok_or_else(|| self.invalid("long")),
            _ => Err(self.invalid("long")),
        }
    }

    /// Any numeric value greater than zero is `true`.
    pub fn to_bool(&self) -> Result<bool, Error> {
        self.to_float()
            .map(|v| v > 0.0)
            .map_err(|_| self.invalid("bool"))
    }

    /// String view; available for every kind.
    pub fn as_str(&self) -> &str {
        match &self.value {
            ParsedValue::String(s) | ParsedValue::Expression(s) => s,
            _ => &self.raw,
        }
    }

    pub fn to_driver_id(&self) -> Result<DriverId, Error> {
        match self.value {
            ParsedValue::DriverId(id) => Ok(id),
            ParsedValue::UInt(_) | ParsedValue::Int(_) => self
                .to_uint()
                .map(DriverId::from)
                .map_err(|_| self.invalid("driver ID")),
            _ => Err(self.invalid("driver ID")),
        }
    }

    pub fn to_ip_addr(&self) -> Result<IpAddr, Error> {
        match &self.value {
            ParsedValue::String(s) => s.parse().map_err(|_| self.invalid("IP address")),
            _ => Err(self.invalid("IP address")),
        }
    }

    pub fn to_float_array(&self) -> Result<Vec<f32>, Error> {
        match &self.value {
            ParsedValue::FloatArray(v) => Ok(v.clone()),
            ParsedValue::IntArray(v) => Ok(v.iter().map(|&i| i as f32).collect()),
            ParsedValue::UIntArray(v) => Ok(v.iter().map(|&u| u as f32).collect()),
            ParsedValue::Float(_) | ParsedValue::Int(_) | ParsedValue::UInt(_) => {
                self.to_float().map(|v| vec![v])
            }
            _ => Err(self.invalid("float[]")),
        }
    }

    pub fn to_int_array(&self) -> Result<Vec<i32>, Error> {
        match &self.value {
            ParsedValue::IntArray(v) => Ok(v.clone()),
            ParsedValue::FloatArray(v) => v
                .iter()
                .map(|&f| float_to_i32(f))
                .collect::<Option<_>>()
                .ok_or_else(|| self.invalid("int[]")),
            ParsedValue::Int(_) | ParsedValue::Float(_) => {
                self.to_int().map(|v| vec![v]).map_err(|_| self.invalid("int[]"))
            }
            _ => Err(self.invalid("int[]")),
        }
    }

    pub fn to_uint_array(&self) -> Result<Vec<u32>, Error> {
        match &self.value {
            ParsedValue::UIntArray(v) => Ok(v.clone()),
            ParsedValue::DriverIdArray(ids) => Ok(ids.iter().map(|id| id.as_u32()).collect()),
            ParsedValue::FloatArray(v) => v
                .iter()
                .map(|&f| float_to_u32(f))
                .collect::<Option<_>>()
                .ok_or_else(|| self.invalid("uint[]")),
            ParsedValue::UInt(_)
            | ParsedValue::DriverId(_)
            | ParsedValue::Int(_)
            | ParsedValue::Float(_) => self
                .to_uint()
                .map(|v| vec![v])
                .map_err(|_| self.invalid("uint[]")),
            _ => Err(self.invalid("uint[]")),
        }
    }

    pub fn to_long_array(&self) -> Result<Vec<i64>, Error> {
        match &self.value {
            ParsedValue::IntArray(v) => Ok(v.iter().map(|&i| i.into()).collect()),
            ParsedValue::UIntArray(v) => Ok(v.iter().map(|&u| u.into()).collect()),
            ParsedValue::FloatArray(v) => v
                .iter()
                .map(|&f| float_to_i64(f))
                .collect::<Option<_>>()
                .ok_or_else(|| self.invalid("long[]")),
            ParsedValue::Int(_) | ParsedValue::UInt(_) | ParsedValue::Float(_) => self
                .to_long()
                .map(|v| vec![v])
                .map_err(|_| self.invalid("long[]")),
            _ => Err(self.invalid("long[]")),
        }
    }

    pub fn to_driver_id_array(&self) -> Result<Vec<DriverId>, Error> {
        match &self.value {
            ParsedValue::DriverIdArray(ids) => Ok(ids.clone()),
            ParsedValue::DriverId(id) => Ok(vec![*id]),
            ParsedValue::UIntArray(v) => Ok(v.iter().map(|&u| DriverId::from(u)).collect()),
            ParsedValue::IntArray(v) => v
                .iter()
                .map(|&i| u32::try_from(i).ok().map(DriverId::from))
                .collect::<Option<_>>()
                .ok_or_else(|| self.invalid("driver ID[]")),
            ParsedValue::UInt(_) | ParsedValue::Int(_) => self
                .to_driver_id()
                .map(|id| vec![id])
                .map_err(|_| self.invalid("driver ID[]")),
            _ => Err(self.invalid("driver ID[]")),
        }
    }
}

fn parse_driver_ids(text: &str) -> Result<ParsedValue, DriverIdError> {
    if text.contains(':') {
        text.split(':')
            .map(str::parse)
            .collect::<Result<Vec<DriverId>, _>>()
            .map(ParsedValue::DriverIdArray)
    } else {
        text.parse().map(ParsedValue::DriverId)
    }
}

impl PartialEq for CodeParameter {
    fn eq(&self, other: &Self) -> bool {
        self.letter == other.letter && self.value == other.value
    }
}

impl Hash for CodeParameter {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.letter.hash(state);
        self.value.hash(state);
    }
}

impl fmt::Display for CodeParameter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.letter, self.raw)
    }
}

#[cfg(feature = "serde")]
mod serde_impl {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    use super::CodeParameter;

    #[derive(Serialize, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Repr {
        letter: char,
        value: String,
        #[serde(default)]
        is_string: bool,
        #[serde(default)]
        is_driver_id: bool,
    }

    impl Serialize for CodeParameter {
        fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
            Repr {
                letter: self.letter,
                value: self.raw.clone(),
                is_string: self.is_string(),
                is_driver_id: self.is_driver_id(),
            }
            .serialize(serializer)
        }
    }

    impl<'de> Deserialize<'de> for CodeParameter {
        fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
            let repr = Repr::deserialize(deserializer)?;
            if repr.is_driver_id {
                CodeParameter::driver_id(repr.letter, repr.value).map_err(D::Error::custom)
            } else {
                Ok(CodeParameter::new(repr.letter, repr.value, repr.is_string))
            }
        }
    }
}

#[cfg(test)]
mod test {
    use std::collections::hash_map::DefaultHasher;
    use std::hash::{Hash, Hasher};

    use super::{CodeParameter, ParsedValue};
    use crate::{DriverId, Error};

    fn param(value: &str) -> CodeParameter {
        CodeParameter::new('P', value, false)
    }

    #[test]
    fn numeric_views_convert_between_kinds() {
        assert_eq!(param("12").to_float().unwrap(), 12.0);
        assert_eq!(param("2.5").to_int().unwrap(), 2);
        assert_eq!(param("3.5").to_uint().unwrap(), 4);
        assert_eq!(param("4000000000").to_long().unwrap(), 4_000_000_000);
        assert!(param("-1").to_uint().is_err());
        assert!(param("4000000000").to_int().is_err());
    }

    #[test]
    fn bool_view_is_positive_numbers() {
        assert!(param("1").to_bool().unwrap());
        assert!(param("0.1").to_bool().unwrap());
        assert!(!param("0").to_bool().unwrap());
        assert!(!param("-3").to_bool().unwrap());
        assert!(param("yes").to_bool().is_err());
    }

    #[test]
    fn string_view_is_always_available() {
        assert_eq!(param("12").as_str(), "12");
        assert_eq!(param(" text ").as_str(), "text");
        assert_eq!(CodeParameter::new('S', " text ", true).as_str(), " text ");
        assert_eq!(param("{move.axes}").as_str(), "{move.axes}");
    }

    #[test]
    fn quoted_numbers_stay_strings() {
        let p = CodeParameter::new('S', "12", true);
        assert!(p.is_string());
        assert!(matches!(p.to_int(), Err(Error::InvalidParameterType { letter: 'S', .. })));
        assert_ne!(p, param("12"));
    }

    #[test]
    fn array_views() {
        assert_eq!(param("1:2:3").to_float_array().unwrap(), vec![1.0, 2.0, 3.0]);
        assert_eq!(param("1.4:2.6").to_int_array().unwrap(), vec![1, 3]);
        assert_eq!(param("1.4:2.6").to_uint_array().unwrap(), vec![1, 3]);
        assert_eq!(param("5").to_long_array().unwrap(), vec![5]);
        assert!(param("1:-2").to_uint_array().is_err());
        assert!(param("1:4294967295").to_int_array().is_err());
        assert!(param("-1.5:2").to_uint_array().is_err());
    }

    #[test]
    fn driver_ids() {
        let p = CodeParameter::driver_id('P', "1.2:3").unwrap();
        assert!(p.is_driver_id());
        assert_eq!(
            p.to_driver_id_array().unwrap(),
            vec![DriverId::new(1, 2), DriverId::new(0, 3)]
        );
        assert_eq!(p.to_uint_array().unwrap(), vec![0x0001_0002, 3]);
        assert_eq!(param("65538").to_driver_id().unwrap(), DriverId::new(1, 2));
        assert_eq!(
            CodeParameter::driver_id('E', "x.1").unwrap_err().to_string(),
            "Failed to parse board number from E parameter"
        );
    }

    #[test]
    fn ip_addresses_come_from_strings() {
        let p = CodeParameter::new('P', "192.168.1.20", true);
        assert_eq!(p.to_ip_addr().unwrap().to_string(), "192.168.1.20");
        assert!(param("12").to_ip_addr().is_err());
    }

    #[test]
    fn from_value_renders_the_text() {
        let p = CodeParameter::from_value('E', ParsedValue::FloatArray(vec![0.5, 2.0]));
        assert_eq!(p.raw_value(), "0.5:2");
        assert_eq!(p.to_string(), "E0.5:2");
        assert_eq!(p, CodeParameter::new('E', "0.5:2.0", false));
    }

    #[test]
    fn signed_zeros_hash_alike() {
        fn hash_of(p: &CodeParameter) -> u64 {
            let mut hasher = DefaultHasher::new();
            p.hash(&mut hasher);
            hasher.finish()
        }

        let (zero, negative) = (param("0.0"), param("-0.0"));
        assert_eq!(zero, negative);
        assert_eq!(hash_of(&zero), hash_of(&negative));

        let (zeros, negatives) = (param("0.0:1.5"), param("-0.0:1.5"));
        assert_eq!(zeros, negatives);
        assert_eq!(hash_of(&zeros), hash_of(&negatives));
    }

    #[cfg(feature = "serde")]
    #[test]
    fn serde_uses_letter_value_and_flags() {
        let p = CodeParameter::driver_id('P', "0.1").unwrap();
        let json = serde_json::to_string(&p).unwrap();
        assert_eq!(
            json,
            r#"{"letter":"P","value":"0.1","isString":false,"isDriverId":true}"#
        );
        let back: CodeParameter = serde_json::from_str(&json).unwrap();
        assert_eq!(back, p);
    }
}

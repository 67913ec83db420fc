/// Characters that may appear in an unquoted numeric parameter token.
pub(crate) const NUMERIC_PARAMETER_CHARS: &[u8] = b"0123456789+-.e";

/// Parameter letters that name an axis (or an extruder) in a motion command.
pub(crate) const AXIS_LETTERS: &[char] = &[
    'X', 'Y', 'Z', 'U', 'V', 'W', 'A', 'B', 'C', 'D', 'a', 'b', 'c', 'd', 'e', 'f', 'g', 'h', 'i',
    'j', 'k', 'l', 'm', 'n', 'o', 'p', 'q', 'r', 's', 't', 'u', 'v', 'w', 'x', 'y', 'z',
];

/// M-codes whose remaining line is taken verbatim as a single string argument.
pub(crate) const UNPRECEDENTED_MCODES: &[i32] = &[23, 28, 30, 32, 36, 117];

pub(crate) fn is_whitespace(b: u8) -> bool {
    matches!(b, b' ' | b'\t' | b'\n' | b'\r' | b'\x0B' | b'\x0C')
}

pub(crate) fn is_numeric_char(b: u8) -> bool {
    NUMERIC_PARAMETER_CHARS.contains(&b)
}

/// `true` if the token accumulated so far is a `0x` prefixed hexadecimal number.
pub(crate) fn is_hex_prefixed(value: &[u8]) -> bool {
    let digits = match value.first() {
        Some(b'+' | b'-') => &value[1..],
        _ => value,
    };
    digits.len() >= 2 && digits[0] == b'0' && digits[1] == b'x'
}

pub(crate) fn trim_ascii(value: &[u8]) -> &[u8] {
    let start = value.iter().position(|b| !is_whitespace(*b)).unwrap_or(value.len());
    let end = value.iter().rposition(|b| !is_whitespace(*b)).map_or(start, |i| i + 1);
    &value[start..end]
}

//! Shared validation helpers.

use regex::Regex;
use std::sync::LazyLock;

/// Store keys: no separators and none of the reserved `. # $ [ ]` characters.
static KEY_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Push an error if `value` is outside `[min, max]`.
pub(crate) fn validate_range(errors: &mut Vec<String>, name: &str, value: u32, min: u32, max: u32) {
    if value < min || value > max {
        errors.push(format!("{name} = {value} is out of range [{min}, {max}]"));
    }
}

/// Push an error if `value` is not a usable single-segment store key.
pub(crate) fn validate_key(errors: &mut Vec<String>, name: &str, value: &str) {
    if !KEY_RE.is_match(value) {
        errors.push(format!("{name} = \"{value}\" is not a valid store key"));
    }
}

//! Parse the small vocabulary of boolean tokens accepted in config sources.

use std::fmt;

pub const TRUTHY: [&str; 4] = ["true", "yes", "1", "on"];
pub const FALSY: [&str; 4] = ["false", "no", "0", "off"];

/// A token outside [`TRUTHY`] and [`FALSY`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidBool(pub String);

impl fmt::Display for InvalidBool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?} is not a boolean; valid values: {}", self.0, valid_values().join(", "))
    }
}

impl std::error::Error for InvalidBool {}

/// Every token accepted as a boolean, truthy first.
pub fn valid_values() -> Vec<&'static str> {
    TRUTHY.iter().chain(FALSY.iter()).copied().collect()
}

/// Parse `value` case-insensitively after trimming. `None` yields `default`.
pub fn parse_bool(value: Option<&str>, default: bool) -> Result<bool, InvalidBool> {
    let Some(value) = value else {
        return Ok(default);
    };
    let token = value.trim().to_ascii_lowercase();
    if TRUTHY.contains(&token.as_str()) {
        Ok(true)
    } else if FALSY.contains(&token.as_str()) {
        Ok(false)
    } else {
        Err(InvalidBool(value.to_string()))
    }
}

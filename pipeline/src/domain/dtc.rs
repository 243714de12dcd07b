//! Diagnostic trouble code lexical validation

use std::fmt;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

/// Canonical form: uppercase system letter plus four hex digits.
fn dtc_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new("^[PBCU][0-9A-Fa-f]{4}$").expect("static regex"))
}

/// A validated DTC in canonical uppercase form, e.g. `P0301`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DtcCode(String);

impl DtcCode {
    /// Parse a candidate code. Matching is case-insensitive; the stored
    /// form is uppercase. Returns `None` for anything outside the lexical
    /// contract so callers can drop invalid elements without failing.
    pub fn parse(raw: &str) -> Option<Self> {
        let candidate = raw.trim();
        let upper = candidate.to_ascii_uppercase();
        if dtc_pattern().is_match(&upper) {
            Some(Self(upper))
        } else {
            None
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The vehicle system the leading letter denotes.
    pub fn system(&self) -> &'static str {
        match self.0.as_bytes()[0] {
            b'P' => "powertrain",
            b'B' => "body",
            b'C' => "chassis",
            _ => "network",
        }
    }
}

impl fmt::Display for DtcCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl TryFrom<String> for DtcCode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid DTC code: {}", value))
    }
}

impl From<DtcCode> for String {
    fn from(code: DtcCode) -> Self {
        code.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_codes_parse() {
        assert_eq!(DtcCode::parse("P0301").unwrap().as_str(), "P0301");
        assert_eq!(DtcCode::parse("U0100").unwrap().as_str(), "U0100");
        assert_eq!(DtcCode::parse("B1A2F").unwrap().as_str(), "B1A2F");
    }

    #[test]
    fn test_lowercase_canonicalizes_to_uppercase() {
        assert_eq!(DtcCode::parse("p0420").unwrap().as_str(), "P0420");
        assert_eq!(DtcCode::parse("c1b3d").unwrap().as_str(), "C1B3D");
    }

    #[test]
    fn test_invalid_codes_rejected() {
        for bad in ["X0301", "P030", "P03011", "P030G", "0301P", "", "P 0301"] {
            assert!(DtcCode::parse(bad).is_none(), "{:?} should be invalid", bad);
        }
    }

    #[test]
    fn test_whitespace_trimmed() {
        assert_eq!(DtcCode::parse(" P0171 ").unwrap().as_str(), "P0171");
    }

    #[test]
    fn test_system_letter() {
        assert_eq!(DtcCode::parse("P0301").unwrap().system(), "powertrain");
        assert_eq!(DtcCode::parse("B0001").unwrap().system(), "body");
        assert_eq!(DtcCode::parse("C0035").unwrap().system(), "chassis");
        assert_eq!(DtcCode::parse("U0100").unwrap().system(), "network");
    }
}

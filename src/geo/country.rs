//! Two-letter country codes

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;

/// ISO 3166-1 alpha-2 style code, always two upper-case ASCII characters.
///
/// `"00"` is the unknown code. Feeds sometimes mark unassigned space with
/// `"ZZ"`; both count as unknown.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CountryCode([u8; 2]);

impl CountryCode {
    pub const UNKNOWN: CountryCode = CountryCode(*b"00");

    /// Accepts exactly two ASCII letters, upper-casing them.
    pub fn parse(raw: &str) -> Option<Self> {
        let bytes = raw.trim().as_bytes();
        match bytes {
            [a, b] if a.is_ascii_alphabetic() && b.is_ascii_alphabetic() => {
                Some(CountryCode([a.to_ascii_uppercase(), b.to_ascii_uppercase()]))
            }
            _ => None,
        }
    }

    /// Best-effort conversion of untrusted values: truncate to two characters
    /// and fall back to unknown when the result is not two letters.
    pub fn coerce(raw: &str) -> Self {
        let head: String = raw.trim().chars().take(2).collect();
        Self::parse(&head).unwrap_or(Self::UNKNOWN)
    }

    pub fn as_str(&self) -> &str {
        // Only ASCII letters or the unknown digits are ever stored
        std::str::from_utf8(&self.0).unwrap_or("00")
    }

    pub fn is_unknown(&self) -> bool {
        self.0 == *b"00" || self.0 == *b"ZZ"
    }

    /// Unknown variants collapse to `"00"`.
    pub fn canonical(self) -> Self {
        if self.is_unknown() {
            Self::UNKNOWN
        } else {
            self
        }
    }
}

impl Default for CountryCode {
    fn default() -> Self {
        Self::UNKNOWN
    }
}

impl fmt::Display for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl fmt::Debug for CountryCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CountryCode({})", self.as_str())
    }
}

impl Serialize for CountryCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for CountryCode {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Ok(CountryCode::coerce(&raw))
    }
}

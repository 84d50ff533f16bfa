//! Normalized pin identifiers.
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

const CANONICAL_BASE: &str = "https://www.pinterest.com/pin/";

static PIN_PATH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"/pin/([A-Za-z0-9_-]+)").expect("valid pin path regex"));
static BARE_ID: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").expect("valid pin id regex"));

/// Path segments under `/pin/` that are site features, not pins.
const RESERVED: &[&str] = &["create", "find", "edit", "new"];

fn is_reserved(id: &str) -> bool {
    RESERVED.iter().any(|r| id.eq_ignore_ascii_case(r))
}

#[derive(Debug, Error, PartialEq, Eq)]
#[error("not a pin link: {0}")]
pub struct InvalidPinRef(pub String);

/// One pin, identified by the opaque ID embedded in its URL.
///
/// Locale subdomains (`tr.pinterest.com`), country TLDs, query strings and
/// trailing path segments all collapse to the same value.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PinRef(String);

impl PinRef {
    /// Parse a raw link (or a bare ID) into a `PinRef`.
    pub fn parse(raw: &str) -> Result<Self, InvalidPinRef> {
        let trimmed = raw.trim();
        if let Some(caps) = PIN_PATH.captures(trimmed) {
            let id = &caps[1];
            if is_reserved(id) {
                return Err(InvalidPinRef(raw.to_string()));
            }
            return Ok(Self(id.to_string()));
        }
        if BARE_ID.is_match(trimmed) && !is_reserved(trimmed) {
            return Ok(Self(trimmed.to_string()));
        }
        Err(InvalidPinRef(raw.to_string()))
    }

    pub fn id(&self) -> &str {
        &self.0
    }

    pub fn url(&self) -> String {
        format!("{}{}/", CANONICAL_BASE, self.0)
    }
}

impl fmt::Display for PinRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url())
    }
}

impl FromStr for PinRef {
    type Err = InvalidPinRef;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl Serialize for PinRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.url())
    }
}

impl<'de> Deserialize<'de> for PinRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        PinRef::parse(&raw).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_variants_collapse() {
        let variants = [
            "https://tr.pinterest.com/pin/123456789/",
            "https://www.pinterest.com/pin/123456789",
            "https://www.pinterest.co.uk/pin/123456789/?mt=login",
            "http://pinterest.de/pin/123456789/sent/#top",
            "/pin/123456789/",
            "123456789",
        ];
        let first = PinRef::parse(variants[0]).unwrap();
        for v in variants {
            assert_eq!(PinRef::parse(v).unwrap(), first, "variant {v}");
        }
        assert_eq!(first.url(), "https://www.pinterest.com/pin/123456789/");
        assert_eq!(first.id(), "123456789");
    }

    #[test]
    fn rejects_non_pin_links() {
        assert!(PinRef::parse("https://www.pinterest.com/someone/board/").is_err());
        assert!(PinRef::parse("").is_err());
    }

    #[test]
    fn share_links_are_not_pins() {
        assert!(PinRef::parse("https://www.pinterest.com/pin/create/button/?url=https%3A%2F%2Fx.com").is_err());
        assert!(PinRef::parse("/pin/Create/bookmarklet/").is_err());
        assert!(PinRef::parse("create").is_err());
    }

    #[test]
    fn serde_uses_canonical_url() {
        let pin = PinRef::parse("https://tr.pinterest.com/pin/42/").unwrap();
        let json = serde_json::to_string(&pin).unwrap();
        assert_eq!(json, "\"https://www.pinterest.com/pin/42/\"");
        let back: PinRef = serde_json::from_str("\"https://fr.pinterest.com/pin/42/\"").unwrap();
        assert_eq!(back, pin);
    }
}

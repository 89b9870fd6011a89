//! Wallet address.
//!
//! Addresses are normalized to lowercase `0x`-prefixed hex so that the same
//! account always maps to the same cache partition and session key,
//! regardless of the checksum casing the wallet reports.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};

/// Normalized 20-byte account address.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Address(String);

impl Address {
    /// Number of hex digits after the `0x` prefix.
    pub const HEX_LEN: usize = 40;

    /// Parse and normalize an address.
    ///
    /// Accepts `0x`/`0X` prefixes and any hex casing; surrounding whitespace
    /// is ignored.
    pub fn parse(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        let digits = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .ok_or_else(|| CoreError::InvalidAddress(format!("missing 0x prefix: {trimmed}")))?;

        if digits.len() != Self::HEX_LEN {
            return Err(CoreError::InvalidAddress(format!(
                "expected {} hex digits, got {}: {trimmed}",
                Self::HEX_LEN,
                digits.len()
            )));
        }

        hex::decode(digits).map_err(|e| CoreError::InvalidAddress(format!("{trimmed}: {e}")))?;

        Ok(Self(format!("0x{}", digits.to_ascii_lowercase())))
    }

    /// Normalized string form.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Abbreviated form for log lines (`0x1234…abcd`).
    pub fn short(&self) -> String {
        format!("{}…{}", &self.0[..6], &self.0[self.0.len() - 4..])
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Address {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Address {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self> {
        Self::parse(&value)
    }
}

impl From<Address> for String {
    fn from(address: Address) -> Self {
        address.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_normalizes_case() {
        let a = Address::parse("0xAbCdEf0000000000000000000000000000001234").unwrap();
        let b = Address::parse("  0XABCDEF0000000000000000000000000000001234 ").unwrap();
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "0xabcdef0000000000000000000000000000001234");
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert!(Address::parse("abcdef0000000000000000000000000000001234").is_err());
        assert!(Address::parse("0x1234").is_err());
        assert!(Address::parse("0xzzcdef0000000000000000000000000000001234").is_err());
        assert!(Address::parse("").is_err());
    }

    #[test]
    fn test_short_form() {
        let a = Address::parse("0x742d35cc6634c0532925a3b844bc454e4438f44e").unwrap();
        assert_eq!(a.short(), "0x742d…f44e");
    }

    #[test]
    fn test_serde_uses_normalized_string() {
        let a: Address =
            serde_json::from_str("\"0x742D35CC6634C0532925A3B844BC454E4438F44E\"").unwrap();
        assert_eq!(
            serde_json::to_string(&a).unwrap(),
            "\"0x742d35cc6634c0532925a3b844bc454e4438f44e\""
        );
        assert!(serde_json::from_str::<Address>("\"0x12\"").is_err());
    }
}

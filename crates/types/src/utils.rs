//! Utility functions and helpers

use alloy::primitives::U256;
use chrono::{DateTime, Utc};

/// Parse an integer amount from a decimal or `0x`-prefixed hex string
pub fn parse_u256(s: &str) -> Result<U256, String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        return Err("empty amount".to_string());
    }
    let parsed = match trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
        Some(hex) => U256::from_str_radix(hex, 16),
        None => U256::from_str_radix(trimmed, 10),
    };
    parsed.map_err(|e| format!("Failed to parse U256 from {:?}: {}", s, e))
}

/// Render an integer amount with two fixed decimal places, e.g. `101150.00`
pub fn format_fixed_2(value: U256) -> String {
    format!("{}.00", value)
}

/// Parse an RFC3339 timestamp reported by an external service
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}

/// Sanitize string for logging (remove sensitive data)
pub fn sanitize_for_logging(s: &str) -> String {
    if s.len() <= 10 {
        return s.to_string();
    }

    // Show first 6 and last 4 characters for hashes/addresses
    if s.starts_with("0x") && s.len() > 20 {
        format!("{}...{}", &s[..6], &s[s.len() - 4..])
    } else {
        format!("{}...", &s[..10])
    }
}

/// Serde adapter: `U256` as a base-10 string; accepts strings (decimal or hex) and integers
pub mod u256_dec {
    use alloy::primitives::U256;
    use serde::{de, Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Raw {
        Text(String),
        Number(u64),
    }

    pub fn serialize<S: Serializer>(value: &U256, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&value.to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<U256, D::Error> {
        match Raw::deserialize(deserializer)? {
            Raw::Text(s) => super::parse_u256(&s).map_err(de::Error::custom),
            Raw::Number(n) => Ok(U256::from(n)),
        }
    }
}

/// Serde adapter for `Option<U256>`, see [`u256_dec`]
pub mod u256_dec_opt {
    use alloy::primitives::U256;
    use serde::{Deserialize, Deserializer, Serializer};

    #[derive(Deserialize)]
    struct Wrapped(#[serde(with = "super::u256_dec")] U256);

    pub fn serialize<S: Serializer>(value: &Option<U256>, serializer: S) -> Result<S::Ok, S::Error> {
        match value {
            Some(v) => serializer.serialize_some(&v.to_string()),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<Option<U256>, D::Error> {
        Ok(Option::<Wrapped>::deserialize(deserializer)?.map(|Wrapped(v)| v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_u256() {
        assert_eq!(parse_u256("100000").unwrap(), U256::from(100_000u64));
        assert_eq!(parse_u256("0x10").unwrap(), U256::from(16u64));
        assert!(parse_u256("").is_err());
        assert!(parse_u256("12.5").is_err());
        // 78-digit values fit
        let max = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        assert_eq!(parse_u256(max).unwrap(), U256::MAX);
    }

    #[test]
    fn test_format_fixed_2() {
        assert_eq!(format_fixed_2(U256::from(101_150u64)), "101150.00");
        assert_eq!(format_fixed_2(U256::ZERO), "0.00");
    }

    #[test]
    fn test_parse_timestamp() {
        let ts = parse_timestamp("2025-01-10T10:00:00.123Z").unwrap();
        assert_eq!(ts.timestamp(), 1_736_503_200);
        assert!(parse_timestamp("yesterday").is_none());
    }

    #[test]
    fn test_sanitize_for_logging() {
        assert_eq!(
            sanitize_for_logging("0x1234567890123456789012345678901234567890"),
            "0x1234...7890"
        );
        assert_eq!(sanitize_for_logging("short"), "short");
        assert_eq!(sanitize_for_logging("verylongstring"), "verylongst...");
    }
}

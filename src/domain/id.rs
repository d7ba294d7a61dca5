use serde::{Deserialize, Deserializer};

use crate::domain::Error;

/// 128-bit opaque identifier for ledger accounts and transfers, written in hex.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Id(pub u128);

impl Id {
    /// Time-ordered id, so transfers created later sort later.
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().as_u128())
    }

    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();
        let digits = s.strip_prefix("0x").unwrap_or(s);
        if digits.is_empty() {
            return Err(Error::Validation("id is empty".to_string()));
        }
        u128::from_str_radix(digits, 16)
            .map(Self)
            .map_err(|e| Error::Validation(format!("invalid id {}: {}", s, e)))
    }
}

impl core::fmt::Display for Id {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:x}", self.0)
    }
}

impl<'de> Deserialize<'de> for Id {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Id::parse(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

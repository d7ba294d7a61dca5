use serde::{Deserialize, Deserializer};

use crate::domain::Error;

/// Ledger amount in a fixed minor unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct Amount(pub u64);

impl Amount {
    pub fn as_minor(&self) -> u64 {
        self.0
    }

    /// Strict parse: decimal digits only. Signs, fractions and values past
    /// `u64::MAX` are rejected rather than coerced.
    pub fn parse(s: &str) -> Result<Self, Error> {
        let s = s.trim();

        if s.is_empty() {
            return Err(Error::Validation("amount is empty".to_string()));
        }
        if !s.bytes().all(|b| b.is_ascii_digit()) {
            return Err(Error::Validation(format!(
                "amount must be a non-negative integer: {}",
                s
            )));
        }
        s.parse::<u64>()
            .map(Self)
            .map_err(|_| Error::Validation(format!("amount out of range: {}", s)))
    }
}

impl From<u64> for Amount {
    fn from(value: u64) -> Self {
        Self(value)
    }
}

impl core::fmt::Display for Amount {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl<'de> Deserialize<'de> for Amount {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Amount::parse(&s).map_err(|e| serde::de::Error::custom(e.to_string()))
    }
}

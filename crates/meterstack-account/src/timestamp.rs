//! Logical timestamps.
//!
//! A [`Timestamp`] counts units of 10 microseconds since the Unix epoch. Its
//! stored form is fixed-width decimal seconds with five fractional digits
//! (`1700000000.12345`, ten integral digits), so byte order of two
//! stored values matches their chronological order. The zero timestamp
//! means "never" and is stored as the sentinel `"0"`.

use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::AccountError;

/// Ticks per second.
const TICKS_PER_SEC: u64 = 100_000;

/// Stored form of [`Timestamp::ZERO`].
pub const NEVER: &str = "0";

/// A logical timestamp with 10 µs resolution.
///
/// # Examples
///
/// ```
/// use meterstack_account::Timestamp;
///
/// let ts: Timestamp = "12456.0000076".parse().unwrap();
/// assert_eq!(ts.normal(), "0000012456.00001");
/// assert_eq!("0".parse::<Timestamp>().unwrap(), Timestamp::ZERO);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp(u64);

impl Timestamp {
    /// The "never" timestamp.
    pub const ZERO: Self = Self(0);

    /// Build from raw ticks.
    #[must_use]
    pub const fn from_ticks(ticks: u64) -> Self {
        Self(ticks)
    }

    /// Raw ticks.
    #[must_use]
    pub const fn ticks(self) -> u64 {
        self.0
    }

    /// Current wall-clock time.
    #[must_use]
    pub fn now() -> Self {
        let micros = u64::try_from(Utc::now().timestamp_micros()).unwrap_or(0);
        Self(micros / 10)
    }

    /// Convert from floating-point seconds, rounding to the nearest tick.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub fn from_secs_f64(secs: f64) -> Result<Self, AccountError> {
        if !secs.is_finite() || secs < 0.0 {
            return Err(AccountError::BadRequest(format!(
                "invalid timestamp: {secs}"
            )));
        }
        let ticks = (secs * 100_000.0).round();
        if ticks >= 1.8e19 {
            return Err(AccountError::BadRequest(format!(
                "timestamp out of range: {secs}"
            )));
        }
        Ok(Self(ticks as u64))
    }

    /// Whether this is the "never" timestamp.
    #[must_use]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    /// Fixed-width stored form, `"0"` for [`Timestamp::ZERO`].
    #[must_use]
    pub fn normal(self) -> String {
        if self.is_zero() {
            return NEVER.to_owned();
        }
        format!(
            "{:010}.{:05}",
            self.0 / TICKS_PER_SEC,
            self.0 % TICKS_PER_SEC
        )
    }

    /// Decode a stored value, treating unreadable bytes as "never".
    #[must_use]
    pub fn decode(raw: &[u8]) -> Self {
        std::str::from_utf8(raw)
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or_default()
    }

    /// Seconds as a float, for display.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn as_secs_f64(self) -> f64 {
        self.0 as f64 / 100_000.0
    }
}

impl FromStr for Timestamp {
    type Err = AccountError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Self::ZERO);
        }
        let secs: f64 = trimmed
            .parse()
            .map_err(|_| AccountError::BadRequest(format!("invalid timestamp: {s}")))?;
        Self::from_secs_f64(secs)
    }
}

impl fmt::Display for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.normal())
    }
}

impl Serialize for Timestamp {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.normal())
    }
}

impl<'de> Deserialize<'de> for Timestamp {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        match Raw::deserialize(deserializer)? {
            Raw::Number(secs) => Self::from_secs_f64(secs).map_err(serde::de::Error::custom),
            Raw::Text(s) => s.parse().map_err(serde::de::Error::custom),
        }
    }
}

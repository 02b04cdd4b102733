//! Physical quantities used by instrument and telescope configuration.
//!
//! All quantities are integral so that configuration equality, which drives
//! sequence matching, is exact.

use std::ops::{Add, AddAssign};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Wavelength in picometers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Wavelength(pub u32);

impl Wavelength {
    pub const fn from_picometers(pm: u32) -> Self {
        Self(pm)
    }

    pub const fn from_nanometers(nm: u32) -> Self {
        Self(nm * 1_000)
    }

    pub fn picometers(&self) -> u32 {
        self.0
    }

    pub fn nanometers(&self) -> f64 {
        f64::from(self.0) / 1_000.0
    }
}

impl std::fmt::Display for Wavelength {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3} nm", self.nanometers())
    }
}

/// Non-negative span of time with microsecond resolution.
///
/// Serialized as microseconds; negative input is rejected on the way in.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(try_from = "i64", into = "i64")]
pub struct TimeSpan(i64);

impl TimeSpan {
    pub const ZERO: TimeSpan = TimeSpan(0);

    /// Build from microseconds; negative input clamps to zero.
    pub const fn from_micros(us: i64) -> Self {
        if us < 0 {
            Self(0)
        } else {
            Self(us)
        }
    }

    pub const fn from_millis(ms: i64) -> Self {
        Self::from_micros(ms.saturating_mul(1_000))
    }

    pub const fn from_secs(s: i64) -> Self {
        Self::from_micros(s.saturating_mul(1_000_000))
    }

    /// Time elapsed between two instants, zero if `end` precedes `start`.
    pub fn between(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        let us = (end - start).num_microseconds().unwrap_or(i64::MAX);
        Self::from_micros(us)
    }

    pub fn micros(&self) -> i64 {
        self.0
    }

    pub fn as_secs_f64(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0
    }
}

impl TryFrom<i64> for TimeSpan {
    type Error = EngineError;

    fn try_from(us: i64) -> Result<Self, Self::Error> {
        if us < 0 {
            Err(EngineError::Validation(format!(
                "time span must not be negative, got {}us",
                us
            )))
        } else {
            Ok(TimeSpan(us))
        }
    }
}

impl From<TimeSpan> for i64 {
    fn from(span: TimeSpan) -> Self {
        span.0
    }
}

impl Add for TimeSpan {
    type Output = TimeSpan;

    fn add(self, rhs: TimeSpan) -> TimeSpan {
        TimeSpan(self.0.saturating_add(rhs.0))
    }
}

impl AddAssign for TimeSpan {
    fn add_assign(&mut self, rhs: TimeSpan) {
        *self = *self + rhs;
    }
}

impl std::iter::Sum for TimeSpan {
    fn sum<I: Iterator<Item = TimeSpan>>(iter: I) -> Self {
        iter.fold(TimeSpan::ZERO, Add::add)
    }
}

impl std::fmt::Display for TimeSpan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:.3}s", self.as_secs_f64())
    }
}

/// Angle in microarcseconds.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct Angle(pub i64);

impl Angle {
    pub const ZERO: Angle = Angle(0);

    pub const fn arcsec(arcsec: i64) -> Self {
        Self(arcsec * 1_000_000)
    }

    pub fn as_arcsec(&self) -> f64 {
        self.0 as f64 / 1_000_000.0
    }
}

impl std::fmt::Display for Angle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\"", self.as_arcsec())
    }
}

/// Telescope offset in the p/q frame.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct Offset {
    pub p: Angle,
    pub q: Angle,
}

impl Offset {
    pub const ZERO: Offset = Offset {
        p: Angle::ZERO,
        q: Angle::ZERO,
    };

    pub const fn arcsec(p: i64, q: i64) -> Self {
        Self {
            p: Angle::arcsec(p),
            q: Angle::arcsec(q),
        }
    }
}

impl std::fmt::Display for Offset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "({}, {})", self.p, self.q)
    }
}

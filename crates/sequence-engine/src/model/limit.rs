//! Bounded lookahead for sequence generation.

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// Number of atoms materialized after `nextAtom`, within `[0, 100]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "i64", into = "i64")]
pub struct FutureLimit(u8);

impl FutureLimit {
    pub const MAX: u8 = 100;

    pub fn get(&self) -> usize {
        usize::from(self.0)
    }
}

impl Default for FutureLimit {
    fn default() -> Self {
        FutureLimit(25)
    }
}

impl TryFrom<i64> for FutureLimit {
    type Error = EngineError;

    fn try_from(value: i64) -> Result<Self, Self::Error> {
        if (0..=i64::from(Self::MAX)).contains(&value) {
            Ok(FutureLimit(value as u8))
        } else {
            Err(EngineError::Validation(format!(
                "futureLimit must be between 0 and {}, got {}",
                Self::MAX,
                value
            )))
        }
    }
}

impl From<FutureLimit> for i64 {
    fn from(limit: FutureLimit) -> Self {
        i64::from(limit.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bounds() {
        assert_eq!(FutureLimit::try_from(0).unwrap().get(), 0);
        assert_eq!(FutureLimit::try_from(100).unwrap().get(), 100);
        assert!(matches!(
            FutureLimit::try_from(101),
            Err(EngineError::Validation(_))
        ));
        assert!(matches!(
            FutureLimit::try_from(-1),
            Err(EngineError::Validation(_))
        ));
    }

    #[test]
    fn test_deserialize_validates() {
        assert!(serde_json::from_str::<FutureLimit>("42").is_ok());
        assert!(serde_json::from_str::<FutureLimit>("420").is_err());
    }
}

//! Conversion between store-native scores and a leaderboard's declared
//! numeric type.
//!
//! The store keeps every score as an IEEE-754 double, so integer scores
//! above 2^53 lose precision on the way in regardless of the declared type.

use crate::error::{Error, Result};

/// The numeric type a leaderboard declares for its scores.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScoreType {
    Int32,
    Int64,
    Float64,
}

/// A score value of one of the supported numeric types.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Score {
    Int32(i32),
    Int64(i64),
    Float64(f64),
}

impl Score {
    /// Widen to the store's native double representation.
    pub fn as_f64(self) -> f64 {
        match self {
            Score::Int32(v) => f64::from(v),
            Score::Int64(v) => v as f64,
            Score::Float64(v) => v,
        }
    }
}

impl From<i32> for Score {
    fn from(v: i32) -> Score {
        Score::Int32(v)
    }
}

impl From<i64> for Score {
    fn from(v: i64) -> Score {
        Score::Int64(v)
    }
}

impl From<f64> for Score {
    fn from(v: f64) -> Score {
        Score::Float64(v)
    }
}

/// Decode a raw double from the store into the declared type.
///
/// Integer targets round half-to-even. An `Int32` target additionally
/// range-checks the rounded value and fails with [`Error::Overflow`] when it
/// does not fit.
pub fn decode(kind: ScoreType, raw: f64) -> Result<Score> {
    match kind {
        ScoreType::Float64 => Ok(Score::Float64(raw)),
        ScoreType::Int64 => Ok(Score::Int64(raw.round_ties_even() as i64)),
        ScoreType::Int32 => {
            let rounded = raw.round_ties_even();
            if rounded < f64::from(i32::MIN) || rounded > f64::from(i32::MAX) {
                return Err(Error::Overflow(raw));
            }
            Ok(Score::Int32(rounded as i32))
        }
    }
}

/// Encode a score for submission to the store.
pub fn encode(score: Score) -> f64 {
    score.as_f64()
}

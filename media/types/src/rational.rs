/*!
    Rational number type for time bases and frame rates.
*/

use std::fmt;

use serde::{Deserialize, Serialize};

/**
    A rational number represented as a numerator and denominator.

    Used for stream time bases (e.g., 1/90000 for MPEG-TS, 1/48000 for
    audio) and frame rates (e.g., 30000/1001 for 29.97 fps).
*/
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rational {
    pub num: i32,
    pub den: i32,
}

impl Rational {
    /**
        Create a new rational number.

        # Panics

        Panics if `den` is zero.
    */
    #[inline]
    pub const fn new(num: i32, den: i32) -> Self {
        assert!(den != 0, "denominator cannot be zero");
        Self { num, den }
    }

    /**
        Convert to f64.
    */
    #[inline]
    pub fn to_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }

    /**
        Returns true if the numerator is zero or the value is negative.

        Containers report unknown frame rates as 0/1, so callers use this
        to decide whether to fall back to an estimate.
    */
    #[inline]
    pub const fn is_unset(self) -> bool {
        self.num == 0 || (self.num < 0) != (self.den < 0)
    }

    /**
        Invert the rational (swap numerator and denominator).

        A frame rate inverts into the duration of a single frame.

        # Panics

        Panics if numerator is zero.
    */
    #[inline]
    pub const fn invert(self) -> Self {
        assert!(self.num != 0, "cannot invert zero");
        Self {
            num: self.den,
            den: self.num,
        }
    }

    /**
        Rescale `value` expressed in `from` units into `to` units,
        rounding to the nearest tick (halfway away from zero).
    */
    pub fn rescale(value: i64, from: Self, to: Self) -> i64 {
        // value * from.num / from.den * to.den / to.num, in 128-bit to avoid overflow
        let numer = value as i128 * from.num as i128 * to.den as i128;
        let denom = from.den as i128 * to.num as i128;
        if denom == 0 {
            return 0;
        }
        let (numer, denom) = if denom < 0 { (-numer, -denom) } else { (numer, denom) };
        let half = denom / 2;
        let rounded = if numer >= 0 {
            (numer + half) / denom
        } else {
            (numer - half) / denom
        };
        rounded.clamp(i64::MIN as i128, i64::MAX as i128) as i64
    }
}

impl fmt::Debug for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl fmt::Display for Rational {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

impl From<(i32, i32)> for Rational {
    fn from((num, den): (i32, i32)) -> Self {
        Self::new(num, den)
    }
}

impl From<i32> for Rational {
    fn from(num: i32) -> Self {
        Self::new(num, 1)
    }
}

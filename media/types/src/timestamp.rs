/*!
    Timestamp types for media timing.
*/

use std::ops::{Add, Sub};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Rational;

/**
    Presentation timestamp in time_base units.

    This is the raw timestamp value from the media stream. To convert to
    a meaningful duration, you need the stream's time base.
*/
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pts(pub i64);

impl Pts {
    pub const ZERO: Self = Self(0);

    /**
        Convert this PTS to a Duration using the given time base.

        Negative PTS values are clamped to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        ticks_to_duration(self.0, time_base)
    }

    /**
        Create a PTS from a Duration using the given time base.
    */
    #[inline]
    pub fn from_duration(duration: Duration, time_base: Rational) -> Self {
        Self(duration_to_ticks(duration, time_base))
    }

    /**
        Express this timestamp in another time base.
    */
    #[inline]
    pub fn rescale(self, from: Rational, to: Rational) -> Self {
        Self(Rational::rescale(self.0, from, to))
    }
}

impl Add<MediaDuration> for Pts {
    type Output = Pts;

    fn add(self, rhs: MediaDuration) -> Pts {
        Pts(self.0.saturating_add(rhs.0))
    }
}

impl Sub for Pts {
    type Output = MediaDuration;

    fn sub(self, rhs: Pts) -> MediaDuration {
        MediaDuration(self.0.saturating_sub(rhs.0))
    }
}

impl From<i64> for Pts {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

/**
    Duration in time_base units.

    Similar to Pts but semantically represents a duration rather than a point in time.
*/
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct MediaDuration(pub i64);

impl MediaDuration {
    pub const ZERO: Self = Self(0);

    /**
        Convert this duration to a std Duration using the given time base.

        Negative values are clamped to zero.
    */
    #[inline]
    pub fn to_duration(self, time_base: Rational) -> Duration {
        ticks_to_duration(self.0, time_base)
    }

    /**
        Create a MediaDuration from a std Duration using the given time base.
    */
    #[inline]
    pub fn from_duration(duration: Duration, time_base: Rational) -> Self {
        Self(duration_to_ticks(duration, time_base))
    }

    /**
        Express this duration in another time base.
    */
    #[inline]
    pub fn rescale(self, from: Rational, to: Rational) -> Self {
        Self(Rational::rescale(self.0, from, to))
    }
}

impl Add for MediaDuration {
    type Output = MediaDuration;

    fn add(self, rhs: MediaDuration) -> MediaDuration {
        MediaDuration(self.0.saturating_add(rhs.0))
    }
}

impl From<i64> for MediaDuration {
    fn from(value: i64) -> Self {
        Self(value)
    }
}

fn ticks_to_duration(ticks: i64, time_base: Rational) -> Duration {
    if ticks <= 0 {
        return Duration::ZERO;
    }
    let nanos = Rational::rescale(ticks, time_base, Rational::new(1, 1_000_000_000));
    Duration::from_nanos(nanos.max(0) as u64)
}

fn duration_to_ticks(duration: Duration, time_base: Rational) -> i64 {
    let nanos = duration.as_nanos().min(i64::MAX as u128) as i64;
    Rational::rescale(nanos, Rational::new(1, 1_000_000_000), time_base)
}

//! Simulation time.
//!
//! Simulation time is a plain scalar measured in arbitrary units. The
//! [`Time`] type wraps an `f64` and equips it with a total order so that it
//! can be used as a priority key; a distinguished [`Time::INFINITY`] value
//! marks reactions that will never fire.

use std::cmp::Ordering;
use std::fmt;
use std::ops::{Add, Sub};

/// An absolute simulation time stamp.
///
/// `Time` is totally ordered (see [`f64::total_cmp`]) and never NaN.
#[derive(Copy, Clone, Debug, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Time(f64);

impl Time {
    /// The origin of simulation time.
    pub const ZERO: Self = Self(0.0);

    /// A time stamp that is never reached.
    pub const INFINITY: Self = Self(f64::INFINITY);

    /// Creates a time stamp, or returns `None` if `t` is NaN.
    pub fn new(t: f64) -> Option<Self> {
        if t.is_nan() {
            None
        } else {
            Some(Self(t))
        }
    }

    /// Creates a time stamp from a raw value.
    ///
    /// # Panics
    ///
    /// This function panics if `t` is NaN.
    pub fn from_secs(t: f64) -> Self {
        Self::new(t).expect("simulation time cannot be NaN")
    }

    /// Returns the raw value of the time stamp.
    pub const fn as_secs(self) -> f64 {
        self.0
    }

    /// Returns `true` unless the time stamp is infinite.
    pub fn is_finite(self) -> bool {
        self.0.is_finite()
    }
}

impl PartialEq for Time {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Time {}

impl PartialOrd for Time {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Time {
    fn cmp(&self, other: &Self) -> Ordering {
        self.0.total_cmp(&other.0)
    }
}

impl Add<f64> for Time {
    type Output = Self;

    /// Adds a duration.
    ///
    /// # Panics
    ///
    /// This operation panics if the result is NaN, which can only happen
    /// when adding an infinite duration of opposite sign.
    fn add(self, delta: f64) -> Self {
        Self::from_secs(self.0 + delta)
    }
}

impl Sub for Time {
    type Output = f64;

    fn sub(self, other: Self) -> f64 {
        self.0 - other.0
    }
}

impl From<u32> for Time {
    fn from(t: u32) -> Self {
        Self(f64::from(t))
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_infinite() && self.0 > 0.0 {
            f.write_str("∞")
        } else {
            write!(f, "{}", self.0)
        }
    }
}

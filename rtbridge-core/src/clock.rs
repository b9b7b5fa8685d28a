//! Translation between logical simulation time and monotonic real time.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Logical simulation timestamp, a signed count of nanoseconds.
///
/// Independent of wall-clock time; the scheduler maps it onto the monotonic
/// clock through a [`ClockBridge`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct SimTime(i64);

impl SimTime {
    pub const ZERO: SimTime = SimTime(0);

    pub const fn from_nanos(nanos: i64) -> Self {
        Self(nanos)
    }

    pub const fn from_micros(micros: i64) -> Self {
        Self(micros.saturating_mul(1_000))
    }

    pub const fn from_millis(millis: i64) -> Self {
        Self(millis.saturating_mul(1_000_000))
    }

    pub const fn from_secs(secs: i64) -> Self {
        Self(secs.saturating_mul(1_000_000_000))
    }

    pub const fn as_nanos(self) -> i64 {
        self.0
    }

    /// Returns this time shifted forward by `delta`, saturating at the maximum.
    pub fn saturating_add(self, delta: Duration) -> Self {
        let nanos = i64::try_from(delta.as_nanos()).unwrap_or(i64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Display for SimTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.9}s", self.0 as f64 / 1e9)
    }
}

/// Tick resolution shared by the logical and the real-time clock.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ClockResolution {
    Millisecond,
    Microsecond,
    /// Native tick of `std::time::Instant` on supported platforms
    #[default]
    Nanosecond,
}

impl ClockResolution {
    /// Nanoseconds per resolution unit.
    pub const fn unit_nanos(self) -> u64 {
        match self {
            ClockResolution::Millisecond => 1_000_000,
            ClockResolution::Microsecond => 1_000,
            ClockResolution::Nanosecond => 1,
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            ClockResolution::Millisecond => "1ms",
            ClockResolution::Microsecond => "1us",
            ClockResolution::Nanosecond => "1ns",
        }
    }
}

impl fmt::Display for ClockResolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClockResolution {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ms" | "millisecond" | "1ms" => Ok(ClockResolution::Millisecond),
            "us" | "microsecond" | "1us" => Ok(ClockResolution::Microsecond),
            "ns" | "nanosecond" | "1ns" => Ok(ClockResolution::Nanosecond),
            _ => Err(format!("Invalid clock resolution: {s}")),
        }
    }
}

/// Stateless mapping between [`SimTime`] and monotonic durations.
///
/// Both directions truncate toward zero to the configured resolution, so a
/// translated arrival time never lands after the real instant it came from.
/// Round trips are exact only at multiples of the resolution. Release
/// deadlines use [`deadline_of`](Self::deadline_of), which rounds up.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClockBridge {
    resolution: ClockResolution,
}

impl ClockBridge {
    pub fn new(resolution: ClockResolution) -> Self {
        Self { resolution }
    }

    pub fn resolution(&self) -> ClockResolution {
        self.resolution
    }

    /// Converts a logical time into an offset from the run's reference point.
    ///
    /// Negative logical times precede every run and map to zero.
    pub fn duration_of(&self, time: SimTime) -> Duration {
        let unit = self.resolution.unit_nanos();
        let nanos = u64::try_from(time.as_nanos()).unwrap_or(0);
        Duration::from_nanos(nanos / unit * unit)
    }

    /// Earliest offset at which `time` has fully elapsed at this resolution.
    ///
    /// Rounds up, so a datagram stamped at or after the deadline never maps
    /// to a logical time before `time`.
    pub fn deadline_of(&self, time: SimTime) -> Duration {
        let unit = self.resolution.unit_nanos();
        let nanos = u64::try_from(time.as_nanos()).unwrap_or(0);
        Duration::from_nanos(nanos.div_ceil(unit).saturating_mul(unit))
    }

    /// Converts an offset from the reference point into a logical time.
    pub fn sim_time_of(&self, offset: Duration) -> SimTime {
        let unit = u128::from(self.resolution.unit_nanos());
        let truncated = offset.as_nanos() / unit * unit;
        SimTime::from_nanos(i64::try_from(truncated).unwrap_or(i64::MAX))
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    #[test]
    fn test_truncates_below_resolution() {
        let bridge = ClockBridge::new(ClockResolution::Millisecond);

        assert_eq!(
            bridge.duration_of(SimTime::from_micros(2_999)),
            Duration::from_millis(2)
        );
        assert_eq!(
            bridge.sim_time_of(Duration::from_micros(1_999)),
            SimTime::from_millis(1)
        );
    }

    #[test]
    fn test_deadline_rounds_up_to_resolution() {
        let bridge = ClockBridge::new(ClockResolution::Millisecond);

        assert_eq!(
            bridge.deadline_of(SimTime::from_micros(999)),
            Duration::from_millis(1)
        );
        assert_eq!(
            bridge.deadline_of(SimTime::from_millis(3)),
            Duration::from_millis(3)
        );
        assert_eq!(bridge.deadline_of(SimTime::from_millis(-2)), Duration::ZERO);
    }

    #[test]
    fn test_negative_time_maps_to_zero() {
        let bridge = ClockBridge::default();
        assert_eq!(bridge.duration_of(SimTime::from_millis(-5)), Duration::ZERO);
    }

    #[test]
    fn test_resolution_parsing() {
        assert_eq!("us".parse::<ClockResolution>().unwrap(), ClockResolution::Microsecond);
        assert_eq!("1MS".parse::<ClockResolution>().unwrap(), ClockResolution::Millisecond);
        assert!("seconds".parse::<ClockResolution>().is_err());
        assert_eq!(ClockResolution::default().to_string(), "1ns");
    }

    #[test]
    fn test_display() {
        assert_eq!(SimTime::from_millis(1500).to_string(), "1.500000000s");
    }

    fn resolutions() -> impl Strategy<Value = ClockResolution> {
        prop_oneof![
            Just(ClockResolution::Millisecond),
            Just(ClockResolution::Microsecond),
            Just(ClockResolution::Nanosecond),
        ]
    }

    proptest! {
        #[test]
        fn prop_round_trip_at_resolution_multiples(
            resolution in resolutions(),
            units in 0i64..1_000_000_000,
        ) {
            let bridge = ClockBridge::new(resolution);
            let time = SimTime::from_nanos(units * resolution.unit_nanos() as i64);

            prop_assert_eq!(bridge.sim_time_of(bridge.duration_of(time)), time);
        }

        #[test]
        fn prop_strictly_monotonic_at_resolution_multiples(
            resolution in resolutions(),
            a in 0i64..1_000_000_000,
            b in 0i64..1_000_000_000,
        ) {
            prop_assume!(a != b);
            let bridge = ClockBridge::new(resolution);
            let unit = resolution.unit_nanos() as i64;
            let (lo, hi) = (a.min(b), a.max(b));

            prop_assert!(
                bridge.duration_of(SimTime::from_nanos(lo * unit))
                    < bridge.duration_of(SimTime::from_nanos(hi * unit))
            );
        }

        #[test]
        fn prop_deadline_maps_back_to_at_least_arrival(
            resolution in resolutions(),
            nanos in 0i64..i64::from(u32::MAX),
        ) {
            let bridge = ClockBridge::new(resolution);
            let time = SimTime::from_nanos(nanos);

            prop_assert!(bridge.sim_time_of(bridge.deadline_of(time)) >= time);
            prop_assert!(bridge.deadline_of(time) >= bridge.duration_of(time));
        }

        #[test]
        fn prop_never_rounds_up(resolution in resolutions(), nanos in 0u64..u64::from(u32::MAX)) {
            let bridge = ClockBridge::new(resolution);
            let offset = Duration::from_nanos(nanos);

            prop_assert!(bridge.duration_of(bridge.sim_time_of(offset)) <= offset);
            prop_assert!(
                bridge.duration_of(SimTime::from_nanos(nanos as i64)) <= Duration::from_nanos(nanos)
            );
        }
    }
}

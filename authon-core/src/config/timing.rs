//! Pulse timing profile

use authon_protocol::PulseWidths;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Widths above these are accepted but unusually slow
pub const TAU_LOW_WARN_US: u32 = 153;
pub const TAU_HIGH_WARN_US: u32 = 459;
pub const TAU_STOP_WARN_US: u32 = 765;

/// Pulse widths of one interface
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TimingProfile {
    /// Width of a `0` bit
    pub tau_low_us: u32,
    /// Width of a `1` bit
    pub tau_high_us: u32,
    /// Width of the stop pulse
    pub tau_stop_us: u32,
}

impl Default for TimingProfile {
    fn default() -> Self {
        Self::from_tau(10)
    }
}

/// Hard timing profile errors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingProfileError {
    /// A width is zero
    Zero,
    /// Widths are not strictly increasing low < high < stop
    NotIncreasing,
}

/// Soft findings that do not prevent operation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct TimingWarnings {
    pub slow_low: bool,
    pub slow_high: bool,
    pub slow_stop: bool,
}

impl TimingWarnings {
    pub fn any(&self) -> bool {
        self.slow_low || self.slow_high || self.slow_stop
    }
}

impl TimingProfile {
    /// Profile with the nominal 1/3/5 tau ratios
    pub const fn from_tau(tau_us: u32) -> Self {
        Self {
            tau_low_us: tau_us,
            tau_high_us: tau_us * 3,
            tau_stop_us: tau_us * 5,
        }
    }

    /// Reject unusable profiles, report slow ones
    pub fn validate(&self) -> Result<TimingWarnings, TimingProfileError> {
        if self.tau_low_us == 0 || self.tau_high_us == 0 || self.tau_stop_us == 0 {
            return Err(TimingProfileError::Zero);
        }
        if self.tau_low_us >= self.tau_high_us || self.tau_high_us >= self.tau_stop_us {
            return Err(TimingProfileError::NotIncreasing);
        }

        Ok(TimingWarnings {
            slow_low: self.tau_low_us > TAU_LOW_WARN_US,
            slow_high: self.tau_high_us > TAU_HIGH_WARN_US,
            slow_stop: self.tau_stop_us > TAU_STOP_WARN_US,
        })
    }

    /// Widths the physical layer transmits with
    pub fn pulse_widths(&self) -> PulseWidths {
        PulseWidths {
            zero_us: self.tau_low_us,
            one_us: self.tau_high_us,
            stop_us: self.tau_stop_us,
        }
    }
}

//! GPIO line abstraction
//!
//! The SWI bus is a single open-drain line with a pull-up. The host drives
//! it while transmitting and releases it (input) while the secure element
//! answers or signals an interrupt.

/// Logic level of the line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Level {
    Low,
    High,
}

impl Level {
    /// Create a level from a boolean (true = high)
    pub fn from_bool(high: bool) -> Self {
        if high {
            Level::High
        } else {
            Level::Low
        }
    }

    /// Check if this is the high level
    pub fn is_high(self) -> bool {
        self == Level::High
    }

    /// The opposite level
    pub fn toggled(self) -> Self {
        match self {
            Level::Low => Level::High,
            Level::High => Level::Low,
        }
    }
}

/// Pin direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Direction {
    /// Line released; the pull-up (or the device) sets the level
    Input,
    /// Host drives the line, starting at the given level
    Output(Level),
}

/// The single data line of the bus
///
/// Implementations handle the actual register manipulation for the chip.
/// All methods must be fast: they are called from inside the bit loops.
pub trait SwiPin {
    /// Sample the current line level
    fn read_level(&mut self) -> Level;

    /// Drive the line to a level (only meaningful in output mode)
    fn write_level(&mut self, level: Level);

    /// Switch between driving and releasing the line
    fn set_direction(&mut self, direction: Direction);

    /// Drive the line high
    fn set_high(&mut self) {
        self.write_level(Level::High);
    }

    /// Drive the line low
    fn set_low(&mut self) {
        self.write_level(Level::Low);
    }
}

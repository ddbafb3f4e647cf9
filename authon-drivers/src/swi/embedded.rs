//! embedded-hal 1.0 adapters
//!
//! Lets any board with an embedded-hal open-drain capable pin and a
//! [`DelayNs`] provider drive the bus without a dedicated HAL crate.

use core::convert::Infallible;

use authon_hal::{Clock, Direction, Level, SwiPin};
use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{InputPin, OutputPin};

/// Open-drain line built from an embedded-hal pin
///
/// Releasing the line writes high so the external pull-up takes over;
/// the pin must be configured open-drain for this to be safe.
pub struct OpenDrainPin<T> {
    pin: T,
    driving: bool,
}

impl<T> OpenDrainPin<T>
where
    T: InputPin<Error = Infallible> + OutputPin<Error = Infallible>,
{
    pub fn new(pin: T) -> Self {
        let mut line = Self {
            pin,
            driving: false,
        };
        line.drive(Level::High);
        line
    }

    pub fn into_inner(self) -> T {
        self.pin
    }

    fn drive(&mut self, level: Level) {
        let result = match level {
            Level::High => self.pin.set_high(),
            Level::Low => self.pin.set_low(),
        };
        match result {
            Ok(()) => {}
            Err(never) => match never {},
        }
    }
}

impl<T> SwiPin for OpenDrainPin<T>
where
    T: InputPin<Error = Infallible> + OutputPin<Error = Infallible>,
{
    fn read_level(&mut self) -> Level {
        match self.pin.is_high() {
            Ok(high) => Level::from_bool(high),
            Err(never) => match never {},
        }
    }

    fn write_level(&mut self, level: Level) {
        if self.driving {
            self.drive(level);
        }
    }

    fn set_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Input => {
                self.driving = false;
                self.drive(Level::High);
            }
            Direction::Output(level) => {
                self.driving = true;
                self.drive(level);
            }
        }
    }
}

/// [`Clock`] from a [`DelayNs`] provider and a free-running timer
pub struct DelayClock<D> {
    delay: D,
    now_ns: fn() -> u64,
}

impl<D: DelayNs> DelayClock<D> {
    pub fn new(delay: D, now_ns: fn() -> u64) -> Self {
        Self { delay, now_ns }
    }
}

impl<D: DelayNs> Clock for DelayClock<D> {
    fn now_ns(&mut self) -> u64 {
        (self.now_ns)()
    }

    fn delay_us(&mut self, us: u32) {
        self.delay.delay_us(us);
    }
}

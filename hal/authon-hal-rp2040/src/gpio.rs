//! SWI line on an RP2040 GPIO

use authon_hal::{Direction, Level, SwiPin};
use embassy_rp::gpio::{self, Flex, Pull};

fn to_rp(level: Level) -> gpio::Level {
    match level {
        Level::Low => gpio::Level::Low,
        Level::High => gpio::Level::High,
    }
}

/// Open-drain style line: released as a pulled-up input, driven as output
pub struct FlexSwiPin<'d> {
    pin: Flex<'d>,
}

impl<'d> FlexSwiPin<'d> {
    /// Take a flex pin and release the line
    pub fn new(mut pin: Flex<'d>) -> Self {
        pin.set_pull(Pull::Up);
        pin.set_as_input();
        Self { pin }
    }
}

impl SwiPin for FlexSwiPin<'_> {
    fn read_level(&mut self) -> Level {
        Level::from_bool(self.pin.is_high())
    }

    fn write_level(&mut self, level: Level) {
        self.pin.set_level(to_rp(level));
    }

    fn set_direction(&mut self, direction: Direction) {
        match direction {
            Direction::Input => self.pin.set_as_input(),
            Direction::Output(level) => {
                // Load the level first so the line never glitches
                self.pin.set_level(to_rp(level));
                self.pin.set_as_output();
            }
        }
    }
}

//! Time source backed by embassy-time

use authon_hal::Clock;
use embassy_time::{block_for, Duration, Instant, TICK_HZ};

/// Blocking clock on the embassy time driver
///
/// Resolution is one tick of the time driver (1 us on the RP2040 timer),
/// which limits tau to a few microseconds at best.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmbassyClock;

impl Clock for EmbassyClock {
    fn now_ns(&mut self) -> u64 {
        let ticks = Instant::now().as_ticks() as u128;
        (ticks * 1_000_000_000 / TICK_HZ as u128) as u64
    }

    fn delay_us(&mut self, us: u32) {
        block_for(Duration::from_micros(us as u64));
    }

    fn now_us(&mut self) -> u64 {
        Instant::now().as_micros()
    }
}

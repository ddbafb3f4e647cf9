//! Time source abstraction

/// Monotonic clock with blocking delays
///
/// The timestamp decoder classifies pulse widths from [`Clock::now_ns`], so
/// its resolution bounds the smallest usable tau. Delays must block without
/// yielding; they run with interrupts disabled.
pub trait Clock {
    /// Monotonic timestamp in nanoseconds
    fn now_ns(&mut self) -> u64;

    /// Block for at least `us` microseconds
    fn delay_us(&mut self, us: u32);

    /// Monotonic timestamp in microseconds
    fn now_us(&mut self) -> u64 {
        self.now_ns() / 1_000
    }

    /// Block for at least `ms` milliseconds
    fn delay_ms(&mut self, ms: u32) {
        for _ in 0..ms {
            self.delay_us(1_000);
        }
    }
}

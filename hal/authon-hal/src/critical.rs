//! Interrupt masking abstraction

/// Runs a closure with host interrupts (and preemption) disabled
///
/// Every SWI exchange, from the first edge of the command word to the last
/// CRC word, runs inside [`CriticalSection::with`]. A host that cannot
/// guarantee this cannot decode responses reliably.
pub trait CriticalSection {
    fn with<R>(&mut self, f: impl FnOnce() -> R) -> R;
}

/// Critical section that does nothing
///
/// For host-side tests and for platforms where the exchange already runs on
/// a dedicated real-time context.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoCriticalSection;

impl CriticalSection for NoCriticalSection {
    fn with<R>(&mut self, f: impl FnOnce() -> R) -> R {
        f()
    }
}

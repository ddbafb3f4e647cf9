//! Interrupt masking on the Cortex-M0+

use authon_hal::CriticalSection;

/// Runs closures with interrupts disabled on the current core
///
/// The other core keeps running; do not drive the same line from it.
#[derive(Debug, Clone, Copy, Default)]
pub struct InterruptFree;

impl CriticalSection for InterruptFree {
    fn with<R>(&mut self, f: impl FnOnce() -> R) -> R {
        cortex_m::interrupt::free(|_| f())
    }
}

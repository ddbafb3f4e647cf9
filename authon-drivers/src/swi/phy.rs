//! Bit-banged SWI physical layer
//!
//! # Transmit
//!
//! The host drives the line for every pulse of every word, ending each word
//! with the 5 tau stop pulse, then releases it.
//!
//! # Receive
//!
//! With the line released the device answers with the same pulse format.
//! Each interval between edges is measured twice: as a count of sampling
//! loop iterations and as a clock timestamp difference. Both decoders run
//! and the timestamp result is kept; disagreements are counted in
//! [`PhyStats`].
//!
//! # Interrupts
//!
//! A device signals completion (or a matching search probe) with a single
//! low pulse. The wait for it samples the line in short critical sections
//! so interrupts stay serviceable for the rest of the window. The host ends
//! a device's interrupt wait early with a 10 tau abort pulse.

use authon_core::config::InterfaceConfig;
use authon_core::traits::phy::{Interrupt, Phy, PhyError, WaitMode};
use authon_hal::{Clock, CriticalSection, Direction, Level, SwiPin};
use authon_protocol::timing::{pulses, reconcile, PulseWidths};
use authon_protocol::{RawWord, WireWord, WORD_BITS};

/// Abort pulse length in units of the stop pulse (10 tau)
const ABORT_STOP_PULSES: u32 = 2;

/// Longest time one level may be held inside a word, in stop pulses
const EDGE_TIMEOUT_STOP_PULSES: u64 = 2;

/// Receive counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PhyStats {
    /// Words decoded successfully
    pub words_received: u32,
    /// Bits where the cycle decoder disagreed with the timestamps
    pub disagreements: u32,
    /// Exchanges that failed
    pub receive_errors: u32,
}

/// Pin and clock, borrowed together inside a critical section
struct Line<P, C> {
    pin: P,
    clock: C,
}

impl<P: SwiPin, C: Clock> Line<P, C> {
    fn transmit(&mut self, word: RawWord, widths: PulseWidths) {
        for pulse in pulses(word, widths) {
            self.pin.write_level(Level::from_bool(pulse.high));
            self.clock.delay_us(pulse.width_us);
        }
    }

    /// Spin until the line leaves `level`
    ///
    /// Returns the iteration count and the timestamp of the edge, or `None`
    /// past `deadline_ns`.
    fn wait_edge(&mut self, level: Level, deadline_ns: u64) -> Option<(u32, u64)> {
        let mut count = 0u32;
        loop {
            if self.pin.read_level() != level {
                return Some((count, self.clock.now_ns()));
            }
            count = count.saturating_add(1);
            if self.clock.now_ns() > deadline_ns {
                return None;
            }
        }
    }

    /// Receive one word whose falling edge must come within `timeout_us`
    fn receive(
        &mut self,
        timeout_us: u32,
        widths: PulseWidths,
        stats: &mut PhyStats,
    ) -> Result<RawWord, PhyError> {
        let start = self.clock.now_ns();
        let (_, mut edge) = self
            .wait_edge(Level::High, start + timeout_us as u64 * 1_000)
            .ok_or(PhyError::Timeout)?;

        let edge_timeout_ns = widths.stop_us as u64 * 1_000 * EDGE_TIMEOUT_STOP_PULSES;
        let mut counts = [0u32; WORD_BITS];
        let mut intervals = [0u32; WORD_BITS];
        let mut level = Level::Low;

        for i in 0..WORD_BITS {
            let (count, next) = self
                .wait_edge(level, edge + edge_timeout_ns)
                .ok_or(PhyError::Timeout)?;
            counts[i] = count;
            intervals[i] = (next - edge).min(u32::MAX as u64) as u32;
            edge = next;
            level = level.toggled();
        }

        let reconciled = reconcile(&counts, &intervals)?;
        if reconciled.disagreements > 0 {
            stats.disagreements += reconciled.disagreements as u32;
        }
        Ok(reconciled.word)
    }

    /// Sample the line once; if a device holds it low, wait out the pulse
    fn catch_pulse(&mut self, release_ns: u64) -> bool {
        if self.pin.read_level() == Level::High {
            return false;
        }
        let fall = self.clock.now_ns();
        // A line stuck low still counts; the next exchange will time out
        let _ = self.wait_edge(Level::Low, fall + release_ns);
        true
    }
}

/// Bit-banged physical layer over one GPIO line
pub struct SwiPhy<P, C, G> {
    line: Line<P, C>,
    cs: G,
    widths: PulseWidths,
    response_timeout_us: u32,
    stats: PhyStats,
}

impl<P: SwiPin, C: Clock, G: CriticalSection> SwiPhy<P, C, G> {
    /// Create a physical layer for one configured interface
    ///
    /// The line is released so the pull-up holds it idle high.
    pub fn new(mut pin: P, clock: C, cs: G, interface: &InterfaceConfig) -> Self {
        pin.set_direction(Direction::Input);
        Self {
            line: Line { pin, clock },
            cs,
            widths: interface.timing.pulse_widths(),
            response_timeout_us: interface.response_timeout_us,
            stats: PhyStats::default(),
        }
    }

    pub fn widths(&self) -> PulseWidths {
        self.widths
    }

    pub fn stats(&self) -> PhyStats {
        self.stats
    }

    /// Give back the pin and clock
    pub fn release(self) -> (P, C) {
        (self.line.pin, self.line.clock)
    }

    fn abort_us(&self) -> u32 {
        self.widths.stop_us * ABORT_STOP_PULSES
    }
}

impl<P: SwiPin, C: Clock, G: CriticalSection> Phy for SwiPhy<P, C, G> {
    fn exchange(&mut self, tx: &[WireWord], rx: &mut [u8]) -> Result<(), PhyError> {
        let widths = self.widths;
        let response_timeout_us = self.response_timeout_us;
        let line = &mut self.line;
        let stats = &mut self.stats;

        let result = self.cs.with(|| -> Result<(), PhyError> {
            line.pin.set_direction(Direction::Output(Level::High));
            for word in tx {
                line.transmit(word.encode(), widths);
            }
            line.pin.set_direction(Direction::Input);

            // Later words follow the previous stop pulse directly
            let mut timeout_us = response_timeout_us;
            for byte in rx.iter_mut() {
                let word = line.receive(timeout_us, widths, stats)?.decode()?;
                *byte = word.into_response()?;
                stats.words_received += 1;
                timeout_us = widths.stop_us * EDGE_TIMEOUT_STOP_PULSES as u32;
            }
            Ok(())
        });

        if let Err(e) = result {
            self.stats.receive_errors += 1;
            debug!("exchange of {=usize} word(s) failed: {}", tx.len(), e);
        }
        result
    }

    fn wait_interrupt(&mut self, mode: WaitMode) -> Interrupt {
        let window_us = match mode {
            WaitMode::Poll { timeout_us } => timeout_us,
            WaitMode::Immediate => self.widths.stop_us,
        };
        let release_ns = self.abort_us() as u64 * 1_000;
        let line = &mut self.line;
        line.pin.set_direction(Direction::Input);

        // One sample per masked window; the wait itself runs unmasked
        let deadline_ns = line.clock.now_ns() + window_us as u64 * 1_000;
        loop {
            if self.cs.with(|| line.catch_pulse(release_ns)) {
                return Interrupt::Received;
            }
            if line.clock.now_ns() > deadline_ns {
                return Interrupt::None;
            }
        }
    }

    fn abort_interrupt(&mut self) {
        let abort_us = self.abort_us();
        let line = &mut self.line;
        self.cs.with(|| {
            line.pin.set_direction(Direction::Output(Level::Low));
            line.clock.delay_us(abort_us);
            line.pin.set_direction(Direction::Input);
        });
    }

    fn power_down(&mut self, hold_us: u32) {
        self.line.pin.set_direction(Direction::Output(Level::Low));
        self.line.clock.delay_us(hold_us);
    }

    fn power_up(&mut self, hold_us: u32) {
        self.line.pin.set_direction(Direction::Input);
        self.line.clock.delay_us(hold_us);
    }

    fn delay_us(&mut self, us: u32) {
        self.line.clock.delay_us(us);
    }

    fn now_us(&mut self) -> u64 {
        self.line.clock.now_us()
    }
}

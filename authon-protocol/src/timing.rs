//! Pulse-width bit timing
//!
//! Each bit is the time the line holds one level:
//!
//! | Symbol | Width |
//! |--------|-------|
//! | `0`    | 1 tau |
//! | `1`    | 3 tau |
//! | stop   | 5 tau (high) |
//!
//! A word starts with a falling edge and the level alternates on every bit,
//! so 17 bits are 17 intervals between 18 edges. After the last (low)
//! interval the line is released high for the stop pulse.
//!
//! Received intervals are classified by two independent decoders:
//!
//! - [`CycleDecoder`] works on busy-loop iteration counts and splits them at
//!   the midpoint between the shortest and longest interval.
//! - [`TimestampDecoder`] works on clock timestamps. Tau is derived from the
//!   two training intervals and every interval must land in a bucket around
//!   1 tau or 3 tau.
//!
//! [`reconcile`] runs both. The timestamp result wins on disagreement.

use crate::word::{RawWord, WORD_BITS};

/// Width of a `0` bit in tau
pub const ZERO_TAU: u32 = 1;

/// Width of a `1` bit in tau
pub const ONE_TAU: u32 = 3;

/// Width of the stop pulse in tau
pub const STOP_TAU: u32 = 5;

/// Timing errors while decoding a word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum TimingError {
    /// Training intervals did not decode as `0`,`1`
    Training,
    /// Interval at this bit index fell outside both buckets
    OutOfBucket(u8),
    /// Intervals are all the same length, no threshold can be derived
    Degenerate,
}

/// Concrete pulse widths in microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct PulseWidths {
    /// Width of a `0` bit
    pub zero_us: u32,
    /// Width of a `1` bit
    pub one_us: u32,
    /// Width of the stop pulse
    pub stop_us: u32,
}

impl PulseWidths {
    /// Ideal widths derived from a single tau
    pub const fn from_tau(tau_us: u32) -> Self {
        Self {
            zero_us: tau_us * ZERO_TAU,
            one_us: tau_us * ONE_TAU,
            stop_us: tau_us * STOP_TAU,
        }
    }

    /// Width of a data bit
    pub fn bit_us(&self, bit: bool) -> u32 {
        if bit {
            self.one_us
        } else {
            self.zero_us
        }
    }
}

/// One level held on the line for a number of microseconds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Pulse {
    pub high: bool,
    pub width_us: u32,
}

/// Pulses that transmit `word`, stop pulse included
///
/// Yields `WORD_BITS + 1` pulses. The first is low.
pub fn pulses(word: RawWord, widths: PulseWidths) -> impl Iterator<Item = Pulse> {
    word.bits_msb_first()
        .enumerate()
        .map(move |(i, bit)| Pulse {
            high: i % 2 == 1,
            width_us: widths.bit_us(bit),
        })
        .chain(core::iter::once(Pulse {
            high: true,
            width_us: widths.stop_us,
        }))
}

/// Classify busy-loop iteration counts
pub struct CycleDecoder;

impl CycleDecoder {
    /// Decode 17 iteration counts into a raw word
    ///
    /// Counts above the midpoint of the observed range are `1`.
    pub fn decode(counts: &[u32; WORD_BITS]) -> Result<RawWord, TimingError> {
        let min = counts.iter().copied().min().unwrap_or(0);
        let max = counts.iter().copied().max().unwrap_or(0);
        if min == max {
            return Err(TimingError::Degenerate);
        }

        let midpoint = min + (max - min) / 2;
        let mut bits = [false; WORD_BITS];
        for (bit, &count) in bits.iter_mut().zip(counts.iter()) {
            *bit = count > midpoint;
        }
        Ok(RawWord::from_bits_msb_first(&bits))
    }
}

/// Classify intervals measured with the monotonic clock
pub struct TimestampDecoder;

impl TimestampDecoder {
    /// Tau in nanoseconds from the two training intervals (`1 + 3` tau)
    pub fn tau_ns(intervals: &[u32; WORD_BITS]) -> u32 {
        ((intervals[0] as u64 + intervals[1] as u64) / 4) as u32
    }

    /// Classify one interval against tau
    ///
    /// Bucket 0 is 0.5..=1.5 tau, bucket 1 is 2.5..=3.5 tau.
    pub fn classify(interval_ns: u32, tau_ns: u32) -> Option<bool> {
        let twice = interval_ns as u64 * 2;
        let tau = tau_ns as u64;
        if twice >= tau && twice <= 3 * tau {
            Some(false)
        } else if twice >= 5 * tau && twice <= 7 * tau {
            Some(true)
        } else {
            None
        }
    }

    /// Decode 17 intervals into a raw word
    pub fn decode(intervals: &[u32; WORD_BITS]) -> Result<RawWord, TimingError> {
        let tau = Self::tau_ns(intervals);
        if tau == 0 {
            return Err(TimingError::Training);
        }

        if Self::classify(intervals[0], tau) != Some(false)
            || Self::classify(intervals[1], tau) != Some(true)
        {
            return Err(TimingError::Training);
        }

        let mut bits = [false; WORD_BITS];
        for (i, (bit, &interval)) in bits.iter_mut().zip(intervals.iter()).enumerate() {
            *bit = Self::classify(interval, tau).ok_or(TimingError::OutOfBucket(i as u8))?;
        }
        Ok(RawWord::from_bits_msb_first(&bits))
    }
}

/// Result of running both decoders over one word
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Reconciled {
    /// Word as decoded from timestamps
    pub word: RawWord,
    /// Number of bits where the cycle decoder disagreed
    pub disagreements: u8,
}

/// Decode a word with both decoders, timestamps taking precedence
///
/// A degenerate cycle measurement is counted as full disagreement rather
/// than an error, since the timestamp decoder alone is authoritative.
pub fn reconcile(
    counts: &[u32; WORD_BITS],
    intervals_ns: &[u32; WORD_BITS],
) -> Result<Reconciled, TimingError> {
    let word = TimestampDecoder::decode(intervals_ns)?;
    let disagreements = match CycleDecoder::decode(counts) {
        Ok(cycles) => (cycles.0 ^ word.0).count_ones() as u8,
        Err(_) => WORD_BITS as u8,
    };
    Ok(Reconciled {
        word,
        disagreements,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::word::WireWord;
    use proptest::prelude::*;

    const TAU_NS: u32 = 10_000;

    fn ideal_intervals(word: RawWord, tau_ns: u32) -> [u32; WORD_BITS] {
        let mut out = [0u32; WORD_BITS];
        for (slot, bit) in out.iter_mut().zip(word.bits_msb_first()) {
            *slot = if bit { ONE_TAU * tau_ns } else { ZERO_TAU * tau_ns };
        }
        out
    }

    #[test]
    fn test_pulse_train_shape() {
        let word = WireWord::data(0xA5).encode();
        let widths = PulseWidths::from_tau(10);
        let mut count = 0;
        for (i, pulse) in pulses(word, widths).enumerate() {
            if i < WORD_BITS {
                assert_eq!(pulse.high, i % 2 == 1);
                assert_eq!(pulse.width_us, widths.bit_us(word.bit(WORD_BITS - 1 - i)));
            } else {
                assert!(pulse.high);
                assert_eq!(pulse.width_us, 50);
            }
            count += 1;
        }
        assert_eq!(count, WORD_BITS + 1);
    }

    #[test]
    fn test_tau_from_training() {
        let word = WireWord::bus(0x08).encode();
        let intervals = ideal_intervals(word, TAU_NS);
        assert_eq!(TimestampDecoder::tau_ns(&intervals), TAU_NS);
    }

    #[test]
    fn test_bucket_edges() {
        assert_eq!(TimestampDecoder::classify(5_000, TAU_NS), Some(false));
        assert_eq!(TimestampDecoder::classify(15_000, TAU_NS), Some(false));
        assert_eq!(TimestampDecoder::classify(20_000, TAU_NS), None);
        assert_eq!(TimestampDecoder::classify(25_000, TAU_NS), Some(true));
        assert_eq!(TimestampDecoder::classify(35_000, TAU_NS), Some(true));
        assert_eq!(TimestampDecoder::classify(40_000, TAU_NS), None);
        assert_eq!(TimestampDecoder::classify(4_000, TAU_NS), None);
    }

    #[test]
    fn test_swapped_training_rejected() {
        let word = WireWord::data(0x00).encode();
        let mut intervals = ideal_intervals(word, TAU_NS);
        intervals.swap(0, 1);
        assert_eq!(
            TimestampDecoder::decode(&intervals),
            Err(TimingError::Training)
        );
    }

    #[test]
    fn test_out_of_bucket_interval() {
        let word = WireWord::data(0x00).encode();
        let mut intervals = ideal_intervals(word, TAU_NS);
        intervals[9] = 2 * TAU_NS;
        assert_eq!(
            TimestampDecoder::decode(&intervals),
            Err(TimingError::OutOfBucket(9))
        );
    }

    #[test]
    fn test_cycle_decoder_midpoint() {
        let word = WireWord::address(0x3C).encode();
        let mut counts = [0u32; WORD_BITS];
        for (slot, bit) in counts.iter_mut().zip(word.bits_msb_first()) {
            *slot = if bit { 310 } else { 95 };
        }
        assert_eq!(CycleDecoder::decode(&counts), Ok(word));
        assert_eq!(
            CycleDecoder::decode(&[100; WORD_BITS]),
            Err(TimingError::Degenerate)
        );
    }

    #[test]
    fn test_timestamp_wins_on_disagreement() {
        let word = WireWord::data(0x81).encode();
        let intervals = ideal_intervals(word, TAU_NS);
        let mut counts = [0u32; WORD_BITS];
        for (slot, bit) in counts.iter_mut().zip(word.bits_msb_first()) {
            *slot = if bit { 300 } else { 100 };
        }
        // A cycle count disturbed by a stretched loop iteration
        counts[16] = if word.bit(0) { 100 } else { 300 };

        let result = reconcile(&counts, &intervals).unwrap();
        assert_eq!(result.word, word);
        assert_eq!(result.disagreements, 1);
    }

    proptest! {
        #[test]
        fn prop_jittered_intervals_decode(
            payload in any::<u8>(),
            tau_ns in 2_000u32..200_000,
            jitter in proptest::collection::vec(-20i32..=20, WORD_BITS),
        ) {
            let word = WireWord::data(payload).encode();
            let mut intervals = ideal_intervals(word, tau_ns);
            // Up to +/-20% of tau, keeping the training pair exact
            for (slot, j) in intervals.iter_mut().zip(jitter.iter()).skip(2) {
                let delta = (tau_ns as i64 * *j as i64) / 100;
                *slot = (*slot as i64 + delta) as u32;
            }
            prop_assert_eq!(TimestampDecoder::decode(&intervals), Ok(word));
        }
    }
}

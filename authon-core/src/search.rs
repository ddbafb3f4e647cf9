//! Device enumeration and selection
//!
//! Every device on the wire holds a 96-bit UID. A search walks the UID
//! bits from MSB to LSB; at each position the host probes for devices
//! with a `0` and a `1` there, then enters one branch so devices on the
//! other branch drop out until the next search.
//!
//! When both probes answer, the position is a branch point: it is pushed
//! on a stack and the `0` branch is taken first, so UIDs come out in
//! ascending order. After a full UID is recorded, the most recent branch
//! point is popped, its `1` branch is forced, and every position below it
//! is re-derived from scratch.

use heapless::Vec;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::bus::Bus;
use crate::status::{Error, SearchError};
use crate::traits::phy::Phy;

/// Bits in a device UID
pub const UID_BITS: usize = 96;

/// Bytes in a device UID
pub const UID_LEN: usize = 12;

/// Upper bound on devices per wire
pub const MAX_DEVICES: usize = 8;

/// 96-bit device identifier
///
/// Byte 0 holds bits 95..88, so comparing UIDs compares their numeric
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Uid(pub [u8; UID_LEN]);

impl Uid {
    pub const fn new(bytes: [u8; UID_LEN]) -> Self {
        Self(bytes)
    }

    /// Bit at `position` (95 is the MSB)
    pub fn bit(&self, position: usize) -> bool {
        let byte = UID_LEN - 1 - position / 8;
        (self.0[byte] >> (position % 8)) & 1 != 0
    }

    /// Set the bit at `position`
    pub fn set_bit(&mut self, position: usize, value: bool) {
        let byte = UID_LEN - 1 - position / 8;
        let mask = 1 << (position % 8);
        if value {
            self.0[byte] |= mask;
        } else {
            self.0[byte] &= !mask;
        }
    }

    pub fn as_bytes(&self) -> &[u8; UID_LEN] {
        &self.0
    }
}

/// Search strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum SearchMode {
    /// One device on the wire; take the first probe that answers
    Single,
    /// Several devices; full trie search
    #[default]
    Multi,
}

/// Trie traversal context
struct SearchState {
    /// Bit `n` set when position `n` of `candidate` is already known
    resolved: u128,
    candidate: Uid,
    branches: Vec<u8, MAX_DEVICES>,
}

impl SearchState {
    fn new() -> Self {
        Self {
            resolved: 0,
            candidate: Uid::default(),
            branches: Vec::new(),
        }
    }

    fn is_resolved(&self, position: usize) -> bool {
        self.resolved & (1 << position) != 0
    }

    fn resolve(&mut self, position: usize, bit: bool) {
        self.candidate.set_bit(position, bit);
        self.resolved |= 1 << position;
    }

    /// Take the owed `1` branch of the latest branch point
    ///
    /// Returns false when no branch point is left.
    fn next_branch(&mut self) -> bool {
        match self.branches.pop() {
            Some(position) => {
                let position = position as usize;
                self.candidate.set_bit(position, true);
                self.resolved &= !((1u128 << position) - 1);
                true
            }
            None => false,
        }
    }
}

/// Probe the current position of the candidates still entered
fn probe_both<P: Phy>(bus: &mut Bus<P>) -> Result<(bool, bool), Error> {
    let zero = bus.probe(false)?;
    let one = bus.probe(true)?;
    Ok((zero, one))
}

/// Enumerate with the single-device fast path
pub fn search_single<P: Phy>(bus: &mut Bus<P>) -> Result<Uid, Error> {
    let mut uid = Uid::default();
    bus.start_search()?;

    for position in (0..UID_BITS).rev() {
        let bit = if bus.probe(false)? {
            false
        } else if bus.probe(true)? {
            true
        } else {
            warn!("no device answered at bit {=usize}", position);
            return Err(SearchError::NoDevice.into());
        };
        uid.set_bit(position, bit);
        bus.enter(bit)?;
    }

    Ok(uid)
}

/// Enumerate every device on the wire, in ascending UID order
///
/// Fails with [`SearchError::Overflow`] if more than `capacity` devices
/// answer.
pub fn search_all<P: Phy>(
    bus: &mut Bus<P>,
    capacity: usize,
) -> Result<Vec<Uid, MAX_DEVICES>, Error> {
    let capacity = capacity.min(MAX_DEVICES);
    let mut found: Vec<Uid, MAX_DEVICES> = Vec::new();
    let mut state = SearchState::new();

    loop {
        bus.start_search()?;

        for position in (0..UID_BITS).rev() {
            if state.is_resolved(position) {
                bus.enter(state.candidate.bit(position))?;
                continue;
            }

            let bit = match probe_both(bus)? {
                (true, true) => {
                    if state.branches.len() >= capacity {
                        return Err(SearchError::Overflow.into());
                    }
                    state
                        .branches
                        .push(position as u8)
                        .map_err(|_| SearchError::Overflow)?;
                    false
                }
                (true, false) => false,
                (false, true) => true,
                (false, false) => {
                    warn!("no device answered at bit {=usize}", position);
                    return Err(SearchError::NoDevice.into());
                }
            };
            state.resolve(position, bit);
            bus.enter(bit)?;
        }

        if found.len() >= capacity {
            return Err(SearchError::Overflow.into());
        }
        debug!("found device {}", state.candidate);
        found
            .push(state.candidate)
            .map_err(|_| SearchError::Overflow)?;

        if !state.next_branch() {
            break;
        }
    }

    info!("enumerated {=usize} device(s)", found.len());
    Ok(found)
}

/// Enumerate according to `mode`
pub fn enumerate<P: Phy>(
    bus: &mut Bus<P>,
    mode: SearchMode,
    capacity: usize,
) -> Result<Vec<Uid, MAX_DEVICES>, Error> {
    match mode {
        SearchMode::Single => {
            let uid = search_single(bus)?;
            let mut found = Vec::new();
            found.push(uid).map_err(|_| SearchError::Overflow)?;
            Ok(found)
        }
        SearchMode::Multi => search_all(bus, capacity),
    }
}

/// Leave only the device with `uid` addressed
pub fn select<P: Phy>(bus: &mut Bus<P>, uid: &Uid) -> Result<(), Error> {
    bus.start_search()?;
    for position in (0..UID_BITS).rev() {
        bus.enter(uid.bit(position))?;
    }
    Ok(())
}

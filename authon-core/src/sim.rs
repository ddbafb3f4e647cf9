//! Simulated single-wire bus
//!
//! A [`Phy`] with secure elements behind it: UIDs for the search, an NVM
//! image with lock bits, busy counters, the MAC and ECC engines, and
//! fault injection per opcode. Time only advances through delays and
//! interrupt timeouts.

use std::vec;
use std::vec::Vec;

use authon_protocol::command::{ECC_CHALLENGE_LEN, ECC_RESPONSE_LEN, HOST_AUTH_LEN, MAC_LEN};
use authon_protocol::{crc16, Opcode, WireWord, WordClass, CRC_LEN};

use crate::bus::MacOperation;
use crate::ecc::Certificate;
use crate::nvm::{page_address, SYSTEM_PAGE_END};
use crate::register::*;
use crate::search::{Uid, UID_BITS, UID_LEN};
use crate::traits::crypto::{AuthBlock, HostCrypto};
use crate::traits::phy::{Interrupt, Phy, PhyError, WaitMode};

/// Bytes of NVM image, system pages included
pub const SIM_NVM_BYTES: usize = SYSTEM_PAGE_END as usize * 4;

/// Tag both sides derive from the handshake values
pub fn sim_tag(domain: u8, uid: &Uid, nonce_a: &AuthBlock, nonce_b: &AuthBlock) -> AuthBlock {
    let mut tag = [0u8; HOST_AUTH_LEN];
    for (i, t) in tag.iter_mut().enumerate() {
        *t = domain ^ uid.0[i] ^ nonce_a[i] ^ nonce_b[i].rotate_left(1);
    }
    tag
}

/// ECC response the simulated device computes
pub fn sim_ecc_response(challenge: &[u8; ECC_CHALLENGE_LEN], slot: u8) -> [u8; ECC_RESPONSE_LEN] {
    let mut response = [0u8; ECC_RESPONSE_LEN];
    for (i, r) in response.iter_mut().enumerate() {
        *r = challenge[i % ECC_CHALLENGE_LEN] ^ slot.wrapping_add(i as u8);
    }
    response
}

/// One simulated secure element
#[derive(Clone)]
pub struct SimDevice {
    pub uid: Uid,
    pub address: u16,
    pub nvm: Vec<u8>,
    pub locks: [u8; USER_NVM_LOCK_REGS],
    pub nvm_pages: u8,
    pub ecc_key_count: u8,
    pub device_cfg: u8,
    pub lsc_feature: u8,
    pub kill_status: u8,
    /// Busy reads reported after each NVM program or lock
    pub busy_polls: u32,
    pub mac_busy_polls: u32,
    pub ecc_busy_polls: u32,
    pub lsc_busy_polls: u32,
    pub unlock_mac: [u8; MAC_LEN],
    pub kill_mac: [u8; MAC_LEN],
    /// When false an accepted unlock leaves the last lock register set
    pub unlock_clears: bool,
    pub nonce_a: AuthBlock,
    /// Sizes of every NVM program block received
    pub blocks: Vec<usize>,

    active: bool,
    search_pos: Option<usize>,
    pointer: u16,
    burst: usize,
    nvm_busy: u32,
    mac_busy: u32,
    ecc_busy: u32,
    lsc_busy: u32,
    lsc_ctrl: u8,
    int_en: u8,
    int_sts: u8,
    key_slot: u8,
    mac_result: u8,
    nonce_b: AuthBlock,
    tag_b: AuthBlock,
    ecc_response: [u8; ECC_RESPONSE_LEN],
}

impl SimDevice {
    pub fn new(uid: Uid) -> Self {
        Self {
            uid,
            address: DEFAULT_DEVICE_ADDRESS,
            nvm: vec![0u8; SIM_NVM_BYTES],
            locks: [0; USER_NVM_LOCK_REGS],
            nvm_pages: 64,
            ecc_key_count: 2,
            device_cfg: device_cfg::HOST_AUTH | device_cfg::KILL | device_cfg::NVM_UNLOCK,
            lsc_feature: 0,
            kill_status: 0,
            busy_polls: 0,
            mac_busy_polls: 0,
            ecc_busy_polls: 0,
            lsc_busy_polls: 0,
            unlock_mac: [0x5A; MAC_LEN],
            kill_mac: [0xC3; MAC_LEN],
            unlock_clears: true,
            nonce_a: [0x11; HOST_AUTH_LEN],
            blocks: Vec::new(),
            active: true,
            search_pos: None,
            pointer: 0,
            burst: 1,
            nvm_busy: 0,
            mac_busy: 0,
            ecc_busy: 0,
            lsc_busy: 0,
            lsc_ctrl: 0,
            int_en: 0,
            int_sts: 0,
            key_slot: 0,
            mac_result: 0,
            nonce_b: [0; HOST_AUTH_LEN],
            tag_b: [0; HOST_AUTH_LEN],
            ecc_response: [0; ECC_RESPONSE_LEN],
        }
    }

    /// Store bytes at an NVM page
    pub fn with_page(mut self, page: u8, bytes: &[u8]) -> Self {
        let start = page_address(page) as usize;
        self.nvm[start..start + bytes.len()].copy_from_slice(bytes);
        self
    }

    pub fn page(&self, page: u8) -> [u8; 4] {
        let start = page_address(page) as usize;
        let mut out = [0u8; 4];
        out.copy_from_slice(&self.nvm[start..start + 4]);
        out
    }

    pub fn is_locked(&self, page: u8) -> bool {
        self.locks[page as usize / 8] & (1 << (page % 8)) != 0
    }

    pub fn lock(&mut self, page: u8) {
        self.locks[page as usize / 8] |= 1 << (page % 8);
    }

    /// Last NonceB the host sent
    pub fn nonce_b(&self) -> AuthBlock {
        self.nonce_b
    }

    pub fn int_status(&self) -> u8 {
        self.int_sts
    }

    fn power_on_reset(&mut self) {
        self.active = true;
        self.address = DEFAULT_DEVICE_ADDRESS;
        self.search_pos = None;
        self.nvm_busy = 0;
        self.mac_busy = 0;
        self.ecc_busy = 0;
        self.lsc_busy = 0;
        self.lsc_ctrl = 0;
        self.int_en = 0;
        self.int_sts = 0;
    }

    fn counter_page(bit: u8) -> u8 {
        if bit & 0b01 != 0 {
            0xA4
        } else {
            0xA5
        }
    }

    fn read_sfr(&mut self, address: u16) -> u8 {
        match address {
            BUSY_STS => {
                let mut value = 0;
                for (counter, bit) in [
                    (&mut self.nvm_busy, busy::NVM),
                    (&mut self.mac_busy, busy::AUTH_MAC),
                    (&mut self.ecc_busy, busy::ECC),
                ] {
                    if *counter > 0 {
                        *counter -= 1;
                        value |= bit;
                    }
                }
                value
            }
            INT_STS => core::mem::take(&mut self.int_sts),
            INT_EN => self.int_en,
            KEY_SLOT => self.key_slot,
            LSC_FEAT_STS => self.lsc_feature,
            LSC_KILL_ACT_STS => self.kill_status,
            LSC_CTRL => {
                if self.lsc_busy > 0 {
                    self.lsc_busy -= 1;
                    self.lsc_ctrl
                } else {
                    self.lsc_ctrl = 0;
                    0
                }
            }
            DEVICE_CFG => self.device_cfg,
            NVM_SIZE => self.nvm_pages,
            ECC_KEY_COUNT => self.ecc_key_count,
            DEVICE_ADDRESS_HI => (self.address >> 8) as u8,
            DEVICE_ADDRESS_LO => self.address as u8,
            a if (USER_NVM_LOCK_STS..USER_NVM_LOCK_STS + USER_NVM_LOCK_REGS as u16)
                .contains(&a) =>
            {
                self.locks[(a - USER_NVM_LOCK_STS) as usize]
            }
            a if (UID_REG..UID_REG + UID_LEN as u16).contains(&a) => {
                self.uid.0[(a - UID_REG) as usize]
            }
            _ => 0,
        }
    }

    fn write_sfr(&mut self, address: u16, value: u8) {
        match address {
            INT_EN => self.int_en = value,
            KEY_SLOT => self.key_slot = value,
            NVM_LOCK_SET => {
                if value < self.nvm_pages {
                    self.lock(value);
                    self.nvm_busy = self.busy_polls;
                }
            }
            LSC_CTRL => {
                for bit in [0b01u8, 0b10] {
                    if value & bit != 0 {
                        let start = page_address(Self::counter_page(bit)) as usize;
                        let mut raw = [0u8; 4];
                        raw.copy_from_slice(&self.nvm[start..start + 4]);
                        let count = u32::from_be_bytes(raw).saturating_sub(1);
                        self.nvm[start..start + 4].copy_from_slice(&count.to_be_bytes());
                    }
                }
                self.lsc_ctrl = value;
                self.lsc_busy = self.lsc_busy_polls;
            }
            DEVICE_ADDRESS_HI => self.address = (self.address & 0x00FF) | ((value as u16) << 8),
            DEVICE_ADDRESS_LO => self.address = (self.address & 0xFF00) | value as u16,
            _ => {}
        }
    }

    fn program(&mut self, data: &[u8]) {
        self.blocks.push(data.len());
        let start = self.pointer as usize;
        let first_page = (start / 4) as u8;
        let last_page = ((start + data.len() - 1) / 4) as u8;
        let locked = (first_page..=last_page)
            .any(|p| p < self.nvm_pages && self.is_locked(p));
        if !locked && start + data.len() <= self.nvm.len() {
            self.nvm[start..start + data.len()].copy_from_slice(data);
        }
        self.nvm_busy = self.busy_polls;
    }

    fn read(&mut self, len: usize) -> Vec<u8> {
        if self.pointer >= REGISTER_SPACE_START {
            assert_eq!(len, 1, "register space reads are single bytes");
            return vec![self.read_sfr(self.pointer)];
        }
        assert_eq!(len, self.burst, "read length must match burst length");
        let start = self.pointer as usize;
        (start..start + len)
            .map(|i| self.nvm.get(i).copied().unwrap_or(0xFF))
            .collect()
    }

    fn write(&mut self, data: &[u8]) {
        if self.pointer >= REGISTER_SPACE_START {
            for (i, &byte) in data.iter().enumerate() {
                self.write_sfr(self.pointer + i as u16, byte);
            }
        } else {
            self.program(data);
        }
    }

    fn maintenance(&mut self, op: u8, mac: &[u8]) {
        self.mac_busy = self.mac_busy_polls;
        let accepted = if op == MacOperation::NvmUnlock as u8 {
            let ok = self.device_cfg & device_cfg::NVM_UNLOCK != 0 && mac == self.unlock_mac;
            if ok {
                self.locks = [0; USER_NVM_LOCK_REGS];
                if !self.unlock_clears {
                    self.locks[USER_NVM_LOCK_REGS - 1] = 0x01;
                }
            }
            ok
        } else if op == MacOperation::Kill as u8 {
            let ok = self.device_cfg & device_cfg::KILL != 0 && mac == self.kill_mac;
            if ok {
                self.kill_status = 0x01;
            }
            ok
        } else {
            false
        };
        self.mac_result = if accepted { 0x00 } else { 0x01 };
    }
}

/// Bus of simulated devices
pub struct SimBus {
    pub devices: Vec<SimDevice>,
    pub time_us: u64,
    /// Time every exchange takes on the wire
    pub exchange_us: u32,
    /// Extra time every delay takes beyond what was asked
    pub oversleep_us: u32,
    pub aborts: u32,
    /// Fail every exchange that starts with this opcode
    pub fault: Option<(Opcode, PhyError)>,
    /// Corrupt the CRC trailer of responses to this opcode
    pub corrupt_crc: Option<Opcode>,
    /// Devices never pulse on completion
    pub suppress_interrupts: bool,
    /// Every opcode exchanged, in order
    pub opcodes: Vec<Opcode>,
    pending_interrupt: bool,
    powered: bool,
}

impl SimBus {
    pub fn new() -> Self {
        Self {
            devices: Vec::new(),
            time_us: 0,
            exchange_us: 0,
            oversleep_us: 0,
            aborts: 0,
            fault: None,
            corrupt_crc: None,
            suppress_interrupts: false,
            opcodes: Vec::new(),
            pending_interrupt: false,
            powered: true,
        }
    }

    pub fn with_device(mut self, device: SimDevice) -> Self {
        self.devices.push(device);
        self
    }

    pub fn add_device(&mut self, device: SimDevice) {
        self.devices.push(device);
    }

    /// UIDs of the devices currently addressed
    pub fn active_uids(&self) -> Vec<Uid> {
        self.devices
            .iter()
            .filter(|d| d.active)
            .map(|d| d.uid)
            .collect()
    }

    pub fn device(&self, uid: &Uid) -> &SimDevice {
        self.devices.iter().find(|d| d.uid == *uid).unwrap()
    }

    pub fn device_mut(&mut self, uid: &Uid) -> &mut SimDevice {
        self.devices.iter_mut().find(|d| d.uid == *uid).unwrap()
    }

    pub fn count(&self, opcode: Opcode) -> usize {
        self.opcodes.iter().filter(|&&op| op == opcode).count()
    }

    fn first_active(&mut self) -> Option<&mut SimDevice> {
        self.devices.iter_mut().find(|d| d.active)
    }

    fn respond(&mut self, op: Opcode, len: usize) -> Vec<u8> {
        let Some(device) = self.first_active() else {
            return vec![0xFF; len];
        };
        match op {
            Opcode::Rd => device.read(len),
            Opcode::Macr => vec![device.mac_result],
            Opcode::Eccr => device.ecc_response.to_vec(),
            Opcode::Hana => device.nonce_a.to_vec(),
            Opcode::Hatb => device.tag_b.to_vec(),
            _ => vec![0; len],
        }
    }

    fn execute(&mut self, op: Opcode, args: &[u8]) {
        match op {
            Opcode::Bres => {
                for d in self.devices.iter_mut() {
                    d.active = true;
                    d.search_pos = None;
                }
            }
            Opcode::Pdwn => {}
            Opcode::Diss => {
                for d in self.devices.iter_mut() {
                    d.active = true;
                    d.search_pos = Some(UID_BITS - 1);
                }
            }
            Opcode::Dip0 | Opcode::Dip1 => {
                let bit = op == Opcode::Dip1;
                self.pending_interrupt = self.devices.iter().any(|d| {
                    d.active && d.search_pos.map(|p| d.uid.bit(p) == bit).unwrap_or(false)
                });
            }
            Opcode::Die0 | Opcode::Die1 => {
                let bit = op == Opcode::Die1;
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    if let Some(p) = d.search_pos {
                        if d.uid.bit(p) != bit {
                            d.active = false;
                        }
                        d.search_pos = p.checked_sub(1);
                    }
                }
            }
            Opcode::Eda | Opcode::Sda => {
                let address = args.iter().fold(0u16, |acc, &b| (acc << 8) | b as u16);
                for d in self.devices.iter_mut() {
                    d.active = d.address == address;
                }
            }
            Opcode::Era | Opcode::Sra => {
                let address = args.iter().fold(0u16, |acc, &b| (acc << 8) | b as u16);
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    d.pointer = address;
                }
            }
            Opcode::Rbl => {
                let burst = if args[0] == 0 { 256 } else { args[0] as usize };
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    d.burst = burst;
                }
            }
            Opcode::Wd => {
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    d.write(args);
                }
            }
            Opcode::Macs => {
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    d.maintenance(args[0], &args[1..]);
                }
            }
            Opcode::Eccs => {
                let mut challenge = [0u8; ECC_CHALLENGE_LEN];
                challenge.copy_from_slice(args);
                let mut pulse = false;
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    d.ecc_response = sim_ecc_response(&challenge, d.key_slot);
                    d.ecc_busy = d.ecc_busy_polls;
                    d.int_sts |= int::ECC_DONE;
                    pulse |= d.int_en & int::ECC_DONE != 0;
                }
                self.pending_interrupt = pulse && !self.suppress_interrupts;
            }
            Opcode::Hanb => {
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    d.nonce_b.copy_from_slice(args);
                }
            }
            Opcode::Hata => {
                for d in self.devices.iter_mut().filter(|d| d.active) {
                    d.mac_busy = d.mac_busy_polls;
                    let expected = sim_tag(0xA, &d.uid, &d.nonce_a, &d.nonce_b);
                    d.tag_b = if args == expected {
                        sim_tag(0xB, &d.uid, &d.nonce_a, &d.nonce_b)
                    } else {
                        [0; HOST_AUTH_LEN]
                    };
                }
            }
            Opcode::Rd | Opcode::Macr | Opcode::Eccr | Opcode::Hana | Opcode::Hatb => {}
        }
    }
}

impl Phy for SimBus {
    fn exchange(&mut self, tx: &[WireWord], rx: &mut [u8]) -> Result<(), PhyError> {
        assert!(!tx.is_empty());
        assert_eq!(tx[0].class, WordClass::Bus);
        let op = Opcode::from_u8(tx[0].payload).unwrap();
        self.opcodes.push(op);
        self.time_us += self.exchange_us as u64;

        if let Some((fault_op, error)) = self.fault {
            if fault_op == op {
                return Err(error);
            }
        }
        if !self.powered || self.devices.is_empty() {
            return if rx.is_empty() {
                Ok(())
            } else {
                Err(PhyError::Timeout)
            };
        }

        let payload: Vec<u8> = tx.iter().map(|w| w.payload).collect();
        let args = if tx.len() > 1 && rx.is_empty() {
            let (body, trailer) = payload.split_at(payload.len() - CRC_LEN);
            assert_eq!(crc16(body).to_le_bytes(), trailer, "bad trailer on {:?}", op);
            &body[1..]
        } else {
            &payload[1..]
        };
        self.execute(op, args);

        if !rx.is_empty() {
            let len = rx.len() - CRC_LEN;
            let data = self.respond(op, len);
            rx[..len].copy_from_slice(&data);

            let mut covered = payload.clone();
            covered.extend_from_slice(&data);
            let crc = crc16(&covered).to_le_bytes();
            rx[len..].copy_from_slice(&crc);
            if self.corrupt_crc == Some(op) {
                rx[len] ^= 0xFF;
            }
        }
        Ok(())
    }

    fn wait_interrupt(&mut self, mode: WaitMode) -> Interrupt {
        if core::mem::take(&mut self.pending_interrupt) {
            return Interrupt::Received;
        }
        if let WaitMode::Poll { timeout_us } = mode {
            self.time_us += timeout_us as u64;
        }
        Interrupt::None
    }

    fn abort_interrupt(&mut self) {
        self.aborts += 1;
    }

    fn power_down(&mut self, hold_us: u32) {
        self.powered = false;
        self.time_us += hold_us as u64;
    }

    fn power_up(&mut self, hold_us: u32) {
        self.powered = true;
        self.time_us += hold_us as u64;
        for d in self.devices.iter_mut() {
            d.power_on_reset();
        }
    }

    fn delay_us(&mut self, us: u32) {
        self.time_us += us as u64 + self.oversleep_us as u64;
    }

    fn now_us(&mut self) -> u64 {
        self.time_us
    }
}

/// Host crypto matching the simulated devices
pub struct SimCrypto {
    pub counter: u8,
    /// Key slot `verify_ecc` checks against
    pub slot: u8,
}

impl SimCrypto {
    pub fn new() -> Self {
        Self { counter: 0, slot: 0 }
    }
}

impl HostCrypto for SimCrypto {
    fn random(&mut self, buf: &mut [u8]) {
        for b in buf.iter_mut() {
            self.counter = self.counter.wrapping_add(37);
            *b = self.counter;
        }
    }

    fn host_tag(&mut self, uid: &Uid, nonce_a: &AuthBlock, nonce_b: &AuthBlock) -> AuthBlock {
        sim_tag(0xA, uid, nonce_a, nonce_b)
    }

    fn expected_device_tag(
        &mut self,
        uid: &Uid,
        nonce_a: &AuthBlock,
        nonce_b: &AuthBlock,
    ) -> AuthBlock {
        sim_tag(0xB, uid, nonce_a, nonce_b)
    }

    fn verify_ecc(
        &mut self,
        _certificate: &Certificate,
        challenge: &[u8; ECC_CHALLENGE_LEN],
        response: &[u8; ECC_RESPONSE_LEN],
    ) -> bool {
        *response == sim_ecc_response(challenge, self.slot)
    }
}

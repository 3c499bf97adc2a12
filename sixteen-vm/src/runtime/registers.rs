//! The register file: thirteen 16-bit registers stored back to back, big-endian,
//! register `n` at byte offset `2 * n`.

use std::sync::Arc;
use std::sync::atomic::{AtomicU16, Ordering};

use sixteen_asm::isa::Register;

/// Shared view of the `memory_bank` register for banked devices.
pub type BankSelect = Arc<AtomicU16>;

#[derive(Debug, Clone)]
pub struct Registers {
    bytes: [u8; Register::COUNT * 2],
    bank: BankSelect,
}

impl Registers {
    pub fn new(bank: BankSelect) -> Self {
        let mut registers = Self {
            bytes: [0; Register::COUNT * 2],
            bank,
        };
        registers.set(Register::Mb, 0);
        registers
    }

    pub fn get(&self, reg: Register) -> u16 {
        let offset = reg.index() as usize * 2;
        u16::from_be_bytes([self.bytes[offset], self.bytes[offset + 1]])
    }

    /// Writes to `memory_bank` also switch the bank seen by banked devices.
    pub fn set(&mut self, reg: Register, value: u16) {
        let offset = reg.index() as usize * 2;
        self.bytes[offset..offset + 2].copy_from_slice(&value.to_be_bytes());
        if reg == Register::Mb {
            self.bank.store(value, Ordering::Relaxed);
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn dump(&self) -> String {
        Register::ALL
            .iter()
            .map(|reg| format!("{:>3}: {:04X}", reg.alias(), self.get(*reg)))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

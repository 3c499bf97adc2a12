//! Devices that can be mapped into the address space besides plain [`Memory`].

use std::io::Write;
use std::sync::atomic::Ordering;

use crate::runtime::errors::MemoryError;
use crate::runtime::memory::{Device, Memory};
use crate::runtime::registers::BankSelect;

/// Several equally sized memories behind one region. The CPU's `memory_bank`
/// register picks which one accesses go to.
pub struct BankedMemory {
    banks: Vec<Memory>,
    select: BankSelect,
}

impl BankedMemory {
    pub fn new(bank_count: usize, bank_size: usize, select: BankSelect) -> Self {
        Self {
            banks: (0..bank_count.max(1)).map(|_| Memory::new(bank_size)).collect(),
            select,
        }
    }

    pub fn bank_count(&self) -> usize {
        self.banks.len()
    }

    /// Index of the active bank. Out-of-range selections wrap around.
    pub fn current(&self) -> usize {
        self.select.load(Ordering::Relaxed) as usize % self.banks.len()
    }
}

impl Device for BankedMemory {
    fn get8(&self, address: u16) -> Result<u8, MemoryError> {
        self.banks[self.current()].get8(address)
    }

    fn set8(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        let bank = self.current();
        self.banks[bank].set8(address, value)
    }

    fn get16(&self, address: u16) -> Result<u16, MemoryError> {
        self.banks[self.current()].get16(address)
    }

    fn set16(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        let bank = self.current();
        self.banks[bank].set16(address, value)
    }
}

// Commands carried in the high byte of a word written to the screen
const CMD_CLEAR: u8 = 0xFF;
const CMD_BOLD: u8 = 0x01;
const CMD_REGULAR: u8 = 0x02;

const COLUMNS: u16 = 16;

/// A 16-column character screen drawn with ANSI escape sequences.
///
/// Writing a word prints its low byte as a character at the cell given by the
/// address. A non-zero high byte is a command applied first. Reads always give 0.
pub struct ScreenDevice<W: Write + Send> {
    out: W,
}

impl<W: Write + Send> ScreenDevice<W> {
    pub fn new(out: W) -> Self {
        Self { out }
    }

    pub fn into_inner(self) -> W {
        self.out
    }

    fn draw(&mut self, address: u16, command: u8, ch: u8) -> std::io::Result<()> {
        match command {
            CMD_CLEAR => write!(self.out, "\x1b[2J")?,
            CMD_BOLD => write!(self.out, "\x1b[1m")?,
            CMD_REGULAR => write!(self.out, "\x1b[0m")?,
            _ => {}
        }

        let x = (address % COLUMNS) + 1;
        let y = (address / COLUMNS) + 1;
        write!(self.out, "\x1b[{};{}H", y, x * 2)?;
        self.out.write_all(&[ch])?;
        self.out.flush()
    }
}

impl<W: Write + Send> Device for ScreenDevice<W> {
    fn get8(&self, _address: u16) -> Result<u8, MemoryError> {
        Ok(0)
    }

    fn get16(&self, _address: u16) -> Result<u16, MemoryError> {
        Ok(0)
    }

    fn set8(&mut self, address: u16, value: u8) -> Result<(), MemoryError> {
        Ok(self.draw(address, 0, value)?)
    }

    fn set16(&mut self, address: u16, value: u16) -> Result<(), MemoryError> {
        let [command, ch] = value.to_be_bytes();
        Ok(self.draw(address, command, ch)?)
    }
}

//! Memory layout and run limits of a machine.

use std::io::Write;
use std::sync::Arc;
use std::sync::atomic::AtomicU16;

use crate::runtime::devices::{BankedMemory, ScreenDevice};
use crate::runtime::errors::MemoryError;
use crate::runtime::machine::Machine;
use crate::runtime::memory::{Memory, MemoryMapper};
use crate::runtime::registers::BankSelect;

/// An inclusive address range.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Range {
    pub start: u16,
    pub end: u16,
}

impl Range {
    pub const fn new(start: u16, end: u16) -> Self {
        Self { start, end }
    }

    pub fn len(&self) -> usize {
        (self.end as usize + 1).saturating_sub(self.start as usize)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachineConfig {
    pub ram: Vec<Range>,
    pub screen: Option<Range>,
    pub banked: Option<Range>,
    pub bank_count: usize,

    /// Where programs are loaded and started
    pub load_address: u16,
    /// Instruction budget for a run, `None` to run until `hlt`
    pub max_steps: Option<u64>,
}

impl Default for MachineConfig {
    /// ```text
    /// 0000-2FFF  RAM (program)
    /// 3000-30FF  screen
    /// 3100-3FFF  RAM
    /// 4000-7FFF  banked RAM, 8 banks
    /// 8000-FFFF  RAM (stack at the top)
    /// ```
    fn default() -> Self {
        Self {
            ram: vec![
                Range::new(0x0000, 0x2FFF),
                Range::new(0x3100, 0x3FFF),
                Range::new(0x8000, 0xFFFF),
            ],
            screen: Some(Range::new(0x3000, 0x30FF)),
            banked: Some(Range::new(0x4000, 0x7FFF)),
            bank_count: 8,
            load_address: 0x0000,
            max_steps: None,
        }
    }
}

impl MachineConfig {
    /// Maps every configured region. Banked memory follows `bank`, the screen
    /// draws to `screen_out`.
    pub fn build_mapper<W>(&self, bank: &BankSelect, screen_out: W) -> Result<MemoryMapper, MemoryError>
    where
        W: Write + Send + 'static,
    {
        let mut mapper = MemoryMapper::new();

        if let Some(range) = self.screen {
            mapper.map(ScreenDevice::new(screen_out), range.start, range.end, true)?;
        }
        if let Some(range) = self.banked {
            let banked = BankedMemory::new(self.bank_count, range.len(), bank.clone());
            mapper.map(banked, range.start, range.end, true)?;
        }
        for range in &self.ram {
            mapper.map(Memory::new(range.len()), range.start, range.end, true)?;
        }

        Ok(mapper)
    }

    pub fn build<W>(&self, screen_out: W) -> Result<Machine, MemoryError>
    where
        W: Write + Send + 'static,
    {
        let bank: BankSelect = Arc::new(AtomicU16::new(0));
        let mapper = self.build_mapper(&bank, screen_out)?;
        Ok(Machine::new(mapper, bank))
    }
}

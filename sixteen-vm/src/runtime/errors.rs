use thiserror::Error;

/// Failed access to the address space.
#[derive(Debug, Error)]
pub enum MemoryError {
    #[error("no device mapped at {0:#06X}")]
    Unmapped(u16),

    #[error("region {start:#06X}-{end:#06X} overlaps an existing mapping")]
    Overlap { start: u16, end: u16 },

    #[error("region end {end:#06X} is below its start {start:#06X}")]
    InvalidRange { start: u16, end: u16 },

    #[error("address {address:#06X} is outside a {size}-byte region")]
    OutOfBounds { address: u16, size: usize },

    #[error("{len} bytes at {address:#06X} run past the end of the address space")]
    LoadOverflow { address: u16, len: usize },

    #[error("device i/o failed: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum VmError {
    #[error("memory error: {0}")]
    Memory(#[from] MemoryError),

    #[error("invalid instruction 0x{opcode:02X} at {address:#06X}")]
    InvalidInstruction { opcode: u8, address: u16 },

    #[error("pop with an empty stack (sp = {sp:#06X})")]
    StackUnderflow { sp: u16 },

    #[error("unknown register index {0}")]
    UnknownRegister(u8),
}

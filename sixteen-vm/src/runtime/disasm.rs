use sixteen_asm::assembler::ADDRESS_SPACE;
use sixteen_asm::isa::{self, Arg, Decoded, Register, Shape};

use crate::runtime::memory::MemoryMapper;

fn render_arg(shape: Shape, arg: Arg) -> String {
    let reg = |index: u8| {
        Register::from_index(index % Register::COUNT as u8)
            .map(|r| r.alias().to_string())
            .unwrap_or_else(|| format!("r?{}", index))
    };

    match (shape, arg) {
        (Shape::RegisterPointer, Arg::Reg(index)) => format!("&{}", reg(index)),
        (_, Arg::Reg(index)) => reg(index),
        (Shape::Memory, Arg::Word(word)) => format!("&{:04X}", word),
        (_, Arg::Word(word)) => format!("${:04X}", word),
        (_, Arg::Byte(byte)) => format!("${:02X}", byte),
    }
}

/// Assembly text for a decoded instruction, e.g. `mov $000A, &0050`.
pub fn render(decoded: &Decoded) -> String {
    let shapes = decoded.instr.format().shapes();
    let args = shapes
        .iter()
        .zip(&decoded.args)
        .map(|(shape, arg)| render_arg(*shape, *arg))
        .collect::<Vec<_>>();

    if args.is_empty() {
        decoded.instr.mnemonic().to_string()
    } else {
        format!("{} {}", decoded.instr.mnemonic(), args.join(", "))
    }
}

/// Disassembles the instruction at `addr`, returning its text and size.
pub fn disasm_instruction(memory: &MemoryMapper, addr: u16) -> (String, usize) {
    let bytes = memory.read(addr, 5);
    match isa::decode(&bytes) {
        Ok(decoded) => (render(&decoded), decoded.size()),
        Err(_) => match bytes.first() {
            Some(byte) => (format!("db ${:02X}", byte), 1),
            None => ("??".to_string(), 1),
        },
    }
}

/// Hex dump with disassembly of `start..end`, one instruction per line.
pub fn dump_memory(memory: &MemoryMapper, start: u16, end: usize) -> String {
    let mut out = String::new();
    let mut addr = start as usize;
    while addr < end.min(ADDRESS_SPACE) {
        let (text, size) = disasm_instruction(memory, addr as u16);
        let bytes = memory
            .read(addr as u16, size)
            .iter()
            .map(|b| format!("{:02X}", b))
            .collect::<Vec<_>>()
            .join(" ");
        out.push_str(&format!("{:04X}: {:<15} {}\n", addr, bytes, text));
        addr += size;
    }
    out
}

/// The `n` bytes at `address` as one line, e.g. `0x0050: 0x00 0x0A ...`.
pub fn view_memory_at(memory: &MemoryMapper, address: u16, n: usize) -> String {
    let bytes = memory
        .read(address, n)
        .iter()
        .map(|b| format!("0x{:02X}", b))
        .collect::<Vec<_>>()
        .join(" ");
    format!("0x{:04X}: {}", address, bytes)
}

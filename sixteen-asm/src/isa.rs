//! Instruction set of the sixteen machine.
//!
//! The [`for_each_instruction!`](crate::for_each_instruction) macro holds the one
//! canonical instruction list and feeds it to a callback macro. This module uses it
//! to generate [`Instr`] together with its opcode decoding and its descriptor
//! accessors; both the assembler and the CPU go through these, never through bare
//! opcode numbers.
//!
//! Opcodes are enum discriminants, so a duplicated opcode is a compile error.
//!
//! # Encoding
//!
//! - Opcode: 1 byte
//! - Register operand: 1 byte (register index)
//! - Word operand (literal or address): 2 bytes, big-endian
//! - Byte operand (`RegLit8` only): 1 byte

use crate::errors::{DecodeError, EncodeError};

/// Invokes a callback macro with the complete instruction list.
///
/// Each entry reads `VARIANT = opcode, "mnemonic" => Format`.
#[macro_export]
macro_rules! for_each_instruction {
    ($callback:ident) => {
        $callback! {
            // Data movement
            /// mov $lit, reg
            MOV_LIT_REG = 0x10, "mov" => LitReg,
            /// mov reg, reg
            MOV_REG_REG = 0x11, "mov" => RegReg,
            /// mov reg, &addr
            MOV_REG_MEM = 0x12, "mov" => RegMem,
            /// mov &addr, reg
            MOV_MEM_REG = 0x13, "mov" => MemReg,
            /// mov $lit, &addr
            MOV_LIT_MEM = 0x1B, "mov" => LitMem,
            /// mov &reg, reg ; reg2 = mem[reg1]
            MOV_REG_PTR_REG = 0x1C, "mov" => RegPtrReg,
            /// mov $base, &reg, reg ; reg2 = mem[base + reg1]
            MOV_LIT_OFF_REG = 0x1D, "mov" => LitOffsetRegReg,

            // Arithmetic, result in the accumulator
            /// add reg, reg
            ADD_REG_REG = 0x14, "add" => RegReg,
            /// add $lit, reg
            ADD_LIT_REG = 0x3F, "add" => LitReg,
            /// sub $lit, reg ; acc = reg - lit
            SUB_LIT_REG = 0x16, "sub" => LitReg,
            /// sub reg, $lit ; acc = lit - reg
            SUB_REG_LIT = 0x1E, "sub" => RegLit16,
            /// sub reg, reg ; acc = reg1 - reg2
            SUB_REG_REG = 0x1F, "sub" => RegReg,
            /// mul $lit, reg
            MUL_LIT_REG = 0x20, "mul" => LitReg,
            /// mul reg, reg
            MUL_REG_REG = 0x21, "mul" => RegReg,
            /// inc reg ; in place
            INC_REG = 0x35, "inc" => SingleReg,
            /// dec reg ; in place
            DEC_REG = 0x36, "dec" => SingleReg,

            // Bitwise. Shifts are in place, the rest write the accumulator
            /// lsf reg, $lit8
            LSF_REG_LIT = 0x26, "lsf" => RegLit8,
            /// lsf reg, reg
            LSF_REG_REG = 0x27, "lsf" => RegReg,
            /// rsf reg, $lit8
            RSF_REG_LIT = 0x2A, "rsf" => RegLit8,
            /// rsf reg, reg
            RSF_REG_REG = 0x2B, "rsf" => RegReg,
            /// and reg, $lit
            AND_REG_LIT = 0x2E, "and" => RegLit16,
            /// and reg, reg
            AND_REG_REG = 0x2F, "and" => RegReg,
            /// or reg, $lit
            OR_REG_LIT = 0x30, "or" => RegLit16,
            /// or reg, reg
            OR_REG_REG = 0x31, "or" => RegReg,
            /// xor reg, $lit
            XOR_REG_LIT = 0x32, "xor" => RegLit16,
            /// xor reg, reg
            XOR_REG_REG = 0x33, "xor" => RegReg,
            /// not reg
            NOT = 0x34, "not" => SingleReg,

            // Conditional jumps, comparing against the accumulator
            /// jne $lit, &addr
            JMP_NOT_EQ = 0x15, "jne" => LitMem,
            /// jne reg, &addr
            JNE_REG = 0x40, "jne" => RegMem,
            /// jeq reg, &addr
            JEQ_REG = 0x3E, "jeq" => RegMem,
            /// jeq $lit, &addr
            JEQ_LIT = 0x41, "jeq" => LitMem,
            /// jlt reg, &addr ; jump if reg < acc
            JLT_REG = 0x42, "jlt" => RegMem,
            /// jlt $lit, &addr ; jump if lit < acc
            JLT_LIT = 0x43, "jlt" => LitMem,
            /// jgt reg, &addr
            JGT_REG = 0x44, "jgt" => RegMem,
            /// jgt $lit, &addr
            JGT_LIT = 0x45, "jgt" => LitMem,
            /// jle reg, &addr
            JLE_REG = 0x46, "jle" => RegMem,
            /// jle $lit, &addr
            JLE_LIT = 0x47, "jle" => LitMem,
            /// jge reg, &addr
            JGE_REG = 0x48, "jge" => RegMem,
            /// jge $lit, &addr
            JGE_LIT = 0x49, "jge" => LitMem,

            // Stack and subroutines
            /// psh $lit
            PSH_LIT = 0x17, "psh" => SingleLit,
            /// psh reg
            PSH_REG = 0x18, "psh" => SingleReg,
            /// pop reg
            POP = 0x1A, "pop" => SingleReg,
            /// cal $addr
            CAL_LIT = 0x5E, "cal" => SingleLit,
            /// cal reg
            CAL_REG = 0x5F, "cal" => SingleReg,
            /// ret
            RET = 0x60, "ret" => NoArgs,
            /// hlt
            HLT = 0xFF, "hlt" => NoArgs,
        }
    };
}

macro_rules! define_instructions {
    (
        $(
            $(#[$doc:meta])*
            $name:ident = $opcode:literal, $mnemonic:literal => $format:ident
        ),* $(,)?
    ) => {
        #[repr(u8)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        #[allow(non_camel_case_types)]
        pub enum Instr {
            $(
                $(#[$doc])*
                $name = $opcode,
            )*
        }

        impl Instr {
            /// Every instruction, in table order.
            pub const ALL: &'static [Instr] = &[ $( Instr::$name, )* ];

            /// Assembly mnemonic, shared by all forms of the same operation.
            pub const fn mnemonic(self) -> &'static str {
                match self {
                    $( Instr::$name => $mnemonic, )*
                }
            }

            /// Table name of this form, e.g. `MOV_LIT_REG`.
            pub const fn name(self) -> &'static str {
                match self {
                    $( Instr::$name => stringify!($name), )*
                }
            }

            pub const fn format(self) -> Format {
                match self {
                    $( Instr::$name => Format::$format, )*
                }
            }
        }

        impl TryFrom<u8> for Instr {
            type Error = DecodeError;

            fn try_from(byte: u8) -> Result<Self, Self::Error> {
                match byte {
                    $( $opcode => Ok(Instr::$name), )*
                    _ => Err(DecodeError::InvalidOpcode(byte)),
                }
            }
        }
    };
}

for_each_instruction!(define_instructions);

/// Operand layout following an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Format {
    NoArgs,
    LitReg,
    RegLit16,
    RegLit8,
    RegReg,
    RegMem,
    MemReg,
    LitMem,
    RegPtrReg,
    LitOffsetRegReg,
    SingleReg,
    SingleLit,
}

/// Source-level kind of an operand, used to pick between forms of a mnemonic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Shape {
    /// `$hex`, `[expr]`, `!name` or `<S> sym.member`
    Literal,
    /// A register name
    Register,
    /// `&hex` or `&[expr]`
    Memory,
    /// `&reg`
    RegisterPointer,
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Shape::Literal => "literal",
            Shape::Register => "register",
            Shape::Memory => "address",
            Shape::RegisterPointer => "register pointer",
        };
        f.write_str(s)
    }
}

/// Machine-level kind of an encoded operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArgKind {
    Reg,
    Word,
    Byte,
}

impl ArgKind {
    pub const fn width(self) -> usize {
        match self {
            ArgKind::Reg | ArgKind::Byte => 1,
            ArgKind::Word => 2,
        }
    }

    const fn describe(self) -> &'static str {
        match self {
            ArgKind::Reg => "register",
            ArgKind::Word => "word",
            ArgKind::Byte => "byte",
        }
    }
}

impl Format {
    pub const fn shapes(self) -> &'static [Shape] {
        use Shape as S;
        match self {
            Format::NoArgs => &[],
            Format::LitReg => &[S::Literal, S::Register],
            Format::RegLit16 | Format::RegLit8 => &[S::Register, S::Literal],
            Format::RegReg => &[S::Register, S::Register],
            Format::RegMem => &[S::Register, S::Memory],
            Format::MemReg => &[S::Memory, S::Register],
            Format::LitMem => &[S::Literal, S::Memory],
            Format::RegPtrReg => &[S::RegisterPointer, S::Register],
            Format::LitOffsetRegReg => &[S::Literal, S::RegisterPointer, S::Register],
            Format::SingleReg => &[S::Register],
            Format::SingleLit => &[S::Literal],
        }
    }

    pub const fn args(self) -> &'static [ArgKind] {
        use ArgKind::*;
        match self {
            Format::NoArgs => &[],
            Format::LitReg | Format::MemReg => &[Word, Reg],
            Format::RegLit16 | Format::RegMem => &[Reg, Word],
            Format::RegLit8 => &[Reg, Byte],
            Format::RegReg | Format::RegPtrReg => &[Reg, Reg],
            Format::LitMem => &[Word, Word],
            Format::LitOffsetRegReg => &[Word, Reg, Reg],
            Format::SingleReg => &[Reg],
            Format::SingleLit => &[Word],
        }
    }

    /// Encoded size in bytes, opcode included.
    pub const fn size(self) -> usize {
        let args = self.args();
        let mut size = 1;
        let mut i = 0;
        while i < args.len() {
            size += args[i].width();
            i += 1;
        }
        size
    }
}

/// Static description of one instruction form.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor {
    pub name: &'static str,
    pub mnemonic: &'static str,
    pub opcode: u8,
    pub format: Format,
    pub size: usize,
}

impl Instr {
    pub const fn opcode(self) -> u8 {
        self as u8
    }

    pub const fn size(self) -> usize {
        self.format().size()
    }

    pub const fn descriptor(self) -> Descriptor {
        Descriptor {
            name: self.name(),
            mnemonic: self.mnemonic(),
            opcode: self.opcode(),
            format: self.format(),
            size: self.size(),
        }
    }

    /// Finds a form by its table name (`MOV_LIT_REG`), ignoring case.
    pub fn lookup(name: &str) -> Option<Instr> {
        Instr::ALL
            .iter()
            .copied()
            .find(|instr| instr.name().eq_ignore_ascii_case(name))
    }

    /// All forms sharing `mnemonic`, ignoring case.
    pub fn variants(mnemonic: &str) -> impl Iterator<Item = Instr> + '_ {
        Instr::ALL
            .iter()
            .copied()
            .filter(move |instr| instr.mnemonic().eq_ignore_ascii_case(mnemonic))
    }

    pub fn is_mnemonic(word: &str) -> bool {
        Instr::variants(word).next().is_some()
    }

    /// Picks the form of `mnemonic` whose operand shapes match exactly.
    pub fn select(mnemonic: &str, shapes: &[Shape]) -> Option<Instr> {
        Instr::variants(mnemonic).find(|instr| instr.format().shapes() == shapes)
    }
}

impl std::fmt::Display for Instr {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// --------------------------------------------
// Registers

/// The register file, in storage order. Each register sits at byte offset `2 * index`.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Register {
    Ip = 0,
    Acc,
    R1,
    R2,
    R3,
    R4,
    R5,
    R6,
    R7,
    R8,
    Sp,
    Fp,
    /// Bank select for banked memory regions
    Mb,
}

impl Register {
    pub const COUNT: usize = 13;

    pub const ALL: [Register; Register::COUNT] = [
        Register::Ip,
        Register::Acc,
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
        Register::Sp,
        Register::Fp,
        Register::Mb,
    ];

    /// The general-purpose registers saved by a subroutine call.
    pub const GENERAL: [Register; 8] = [
        Register::R1,
        Register::R2,
        Register::R3,
        Register::R4,
        Register::R5,
        Register::R6,
        Register::R7,
        Register::R8,
    ];

    pub const fn index(self) -> u8 {
        self as u8
    }

    pub const fn name(self) -> &'static str {
        match self {
            Register::Ip => "instruction_pointer",
            Register::Acc => "accumulator",
            Register::R1 => "r1",
            Register::R2 => "r2",
            Register::R3 => "r3",
            Register::R4 => "r4",
            Register::R5 => "r5",
            Register::R6 => "r6",
            Register::R7 => "r7",
            Register::R8 => "r8",
            Register::Sp => "stack_pointer",
            Register::Fp => "frame_pointer",
            Register::Mb => "memory_bank",
        }
    }

    pub const fn alias(self) -> &'static str {
        match self {
            Register::Ip => "ip",
            Register::Acc => "acc",
            Register::Sp => "sp",
            Register::Fp => "fp",
            Register::Mb => "mb",
            other => other.name(),
        }
    }

    pub fn from_name(name: &str) -> Option<Register> {
        Register::ALL.iter().copied().find(|reg| {
            reg.name().eq_ignore_ascii_case(name) || reg.alias().eq_ignore_ascii_case(name)
        })
    }

    pub fn from_index(index: u8) -> Option<Register> {
        Register::ALL.get(index as usize).copied()
    }
}

impl std::fmt::Display for Register {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

// --------------------------------------------
// Encoding

/// A fully resolved operand, ready to be written as bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Arg {
    Reg(u8),
    Word(u16),
    Byte(u8),
}

impl Arg {
    pub const fn kind(self) -> ArgKind {
        match self {
            Arg::Reg(_) => ArgKind::Reg,
            Arg::Word(_) => ArgKind::Word,
            Arg::Byte(_) => ArgKind::Byte,
        }
    }
}

/// An instruction as it appears in machine code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Decoded {
    pub instr: Instr,
    pub args: Vec<Arg>,
}

impl Decoded {
    pub fn size(&self) -> usize {
        self.instr.size()
    }
}

/// Appends the opcode and operands of `instr` to `out`, words big-endian.
pub fn encode(instr: Instr, args: &[Arg], out: &mut Vec<u8>) -> Result<(), EncodeError> {
    let kinds = instr.format().args();
    if kinds.len() != args.len() {
        return Err(EncodeError::Arity {
            instr: instr.name(),
            expected: kinds.len(),
            found: args.len(),
        });
    }

    if let Some(index) = kinds.iter().zip(args).position(|(k, a)| a.kind() != *k) {
        return Err(EncodeError::OperandKind {
            instr: instr.name(),
            index,
            expected: kinds[index].describe(),
        });
    }

    out.push(instr.opcode());
    for arg in args {
        match *arg {
            Arg::Reg(index) | Arg::Byte(index) => out.push(index),
            Arg::Word(word) => out.extend_from_slice(&word.to_be_bytes()),
        }
    }

    Ok(())
}

/// Decodes the instruction starting at `bytes[0]`.
///
/// Register bytes are returned as written; range reduction is the CPU's concern.
pub fn decode(bytes: &[u8]) -> Result<Decoded, DecodeError> {
    let opcode = *bytes.first().ok_or(DecodeError::Truncated {
        instr: "opcode",
        needed: 1,
        available: 0,
    })?;
    let instr = Instr::try_from(opcode)?;

    if bytes.len() < instr.size() {
        return Err(DecodeError::Truncated {
            instr: instr.name(),
            needed: instr.size(),
            available: bytes.len(),
        });
    }

    let mut pos = 1;
    let mut args = Vec::with_capacity(instr.format().args().len());
    for kind in instr.format().args() {
        let arg = match kind {
            ArgKind::Reg => Arg::Reg(bytes[pos]),
            ArgKind::Byte => Arg::Byte(bytes[pos]),
            ArgKind::Word => Arg::Word(u16::from_be_bytes([bytes[pos], bytes[pos + 1]])),
        };
        pos += kind.width();
        args.push(arg);
    }

    Ok(Decoded { instr, args })
}

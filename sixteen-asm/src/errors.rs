//! Error types for the assembler and the instruction codec.

use thiserror::Error;

/// A malformed source program. Every variant carries a 1-based line and column.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParseError {
    #[error("{line}:{column}: expected {expected}, found {found}")]
    UnexpectedToken {
        expected: String,
        found: String,
        line: usize,
        column: usize,
    },

    #[error("unexpected end of input, expected {expected}")]
    UnexpectedEof { expected: String },

    #[error("{line}:{column}: unexpected character '{ch}'")]
    UnexpectedCharacter { ch: char, line: usize, column: usize },

    #[error("{line}:{column}: invalid hex literal '{text}'")]
    InvalidLiteral {
        text: String,
        line: usize,
        column: usize,
    },

    #[error("{line}:{column}: unknown instruction '{name}'")]
    UnknownInstruction {
        name: String,
        line: usize,
        column: usize,
    },

    #[error("{line}:{column}: no form of '{mnemonic}' takes operands ({shape})")]
    InvalidOperands {
        mnemonic: String,
        shape: String,
        line: usize,
        column: usize,
    },

    #[error("{line}:{column}: unterminated expression")]
    UnterminatedExpression { line: usize, column: usize },
}

pub type ParseResult<T> = Result<T, ParseError>;

/// Operands that do not fit an instruction's format.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EncodeError {
    #[error("{instr} takes {expected} operands, got {found}")]
    Arity {
        instr: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("{instr}: operand {index} should be a {expected}")]
    OperandKind {
        instr: &'static str,
        index: usize,
        expected: &'static str,
    },
}

/// Bytes that cannot be decoded into an instruction.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecodeError {
    #[error("invalid opcode 0x{0:02X}")]
    InvalidOpcode(u8),

    #[error("{instr} needs {needed} bytes, only {available} available")]
    Truncated {
        instr: &'static str,
        needed: usize,
        available: usize,
    },
}

/// Fatal errors of an assembly run. No machine code is produced when one occurs.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AsmError {
    #[error("parse error: {0}")]
    Parse(#[from] ParseError),

    #[error("'{name}' is already defined")]
    DuplicateBinding { name: String },

    #[error("unresolved symbol '{name}'")]
    UnresolvedSymbol { name: String },

    #[error("unresolved structure '{name}'")]
    UnresolvedStructure { name: String },

    #[error("structure '{structure}' has no member '{member}'")]
    UnresolvedMember { structure: String, member: String },

    #[error("program does not fit in the address space ({size} bytes)")]
    ProgramTooLarge { size: usize },

    #[error("encoding error: {0}")]
    Encode(#[from] EncodeError),
}

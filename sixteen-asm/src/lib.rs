pub mod assembler;
pub mod demos;
pub mod errors;
pub mod expr;
pub mod isa;
pub mod lexer;
pub mod log;
pub mod output;
pub mod parser;

pub use assembler::Assembler;
pub use errors::AsmError;
pub use isa::{Instr, Register};

/// Lexes, parses and assembles `src` into machine code.
pub fn assemble(src: &str) -> Result<Vec<u8>, AsmError> {
    let ast = parser::parse_source(src)?;
    Assembler::new().assemble(&ast)
}

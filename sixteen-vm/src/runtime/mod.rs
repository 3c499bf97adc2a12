pub mod devices;
pub mod disasm;
pub mod errors;
pub mod machine;
pub mod memory;
pub mod registers;

#[cfg(test)]
mod tests;

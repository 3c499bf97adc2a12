//! Printable forms of assembled machine code.

use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum OutputFormat {
    /// `16 0 10 0 80`
    #[default]
    Decimal,
    /// `0x10 0x00 0x0a 0x00 0x50`
    Hex,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Decimal => write!(f, "decimal"),
            OutputFormat::Hex => write!(f, "hex"),
        }
    }
}

/// Space-separated bytes, either plain decimal or `0x`-prefixed two-digit hex.
pub fn format_machine_code(bytes: &[u8], format: OutputFormat) -> String {
    bytes
        .iter()
        .map(|b| match format {
            OutputFormat::Decimal => b.to_string(),
            OutputFormat::Hex => format!("0x{:02x}", b),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

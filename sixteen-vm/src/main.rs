use clap::Parser as CParser;
use sixteen_asm::log::{self, Level};
use sixteen_asm::{demos, info, warn};
use sixteen_vm::config::MachineConfig;
use sixteen_vm::runtime::disasm;
use sixteen_vm::RunState;
use std::fs;
use std::path::PathBuf;

#[derive(CParser)]
#[command(name = "svm")]
#[command(about = "Runs programs on the sixteen machine")]
struct Args {
    /// Assembly source file, or raw machine code with --binary
    #[arg(required_unless_present = "demo")]
    input: Option<PathBuf>,

    /// Run a bundled demo program instead of a file
    #[arg(short, long, conflicts_with = "input")]
    demo: Option<String>,

    /// Treat the input as assembled machine code
    #[arg(short, long)]
    binary: bool,

    /// Address to load the program at
    #[arg(long, value_parser = parse_hex, default_value = "0000")]
    load_address: u16,

    /// Stop after this many instructions
    #[arg(long)]
    max_steps: Option<u64>,

    /// Number of memory banks behind the banked region
    #[arg(long, default_value_t = 8)]
    banks: usize,

    /// Disassemble the loaded program before running it
    #[arg(long)]
    disasm: bool,

    /// Show 8 bytes at this address after the run (repeatable)
    #[arg(long, value_parser = parse_hex)]
    view: Vec<u16>,

    /// Increase log verbosity (-v, -vv traces every instruction)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn parse_hex(s: &str) -> Result<u16, String> {
    u16::from_str_radix(s.trim_start_matches("0x").trim_start_matches('$'), 16)
        .map_err(|e| format!("invalid address '{}': {}", s, e))
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    log::set_level(Level::from_verbosity(args.verbose));

    let code = match (&args.demo, &args.input) {
        (Some(name), _) => {
            let src = demos::find(name).ok_or_else(|| format!("no demo named '{}'", name))?;
            sixteen_asm::assemble(src)?
        }
        (None, Some(path)) if args.binary => fs::read(path)?,
        (None, Some(path)) => sixteen_asm::assemble(&fs::read_to_string(path)?)?,
        (None, None) => return Err("no input given".into()),
    };

    let config = MachineConfig {
        bank_count: args.banks,
        load_address: args.load_address,
        max_steps: args.max_steps,
        ..MachineConfig::default()
    };

    let mut machine = config.build(std::io::stdout())?;
    machine.load_program(config.load_address, &code)?;
    info!("loaded {} bytes at {:04X}", code.len(), config.load_address);

    if args.disasm {
        let end = config.load_address as usize + code.len();
        print!("{}", disasm::dump_memory(&machine.memory, config.load_address, end));
    }

    let state = match config.max_steps {
        Some(max) => machine.run_for(max)?,
        None => {
            machine.run()?;
            RunState::Halted
        }
    };

    if state == RunState::Paused {
        warn!("stopped after {} steps without halting", machine.steps());
    }

    println!();
    println!("{}", machine.dump_ctx());
    for address in &args.view {
        println!("{}", disasm::view_memory_at(&machine.memory, *address, 8));
    }

    Ok(())
}

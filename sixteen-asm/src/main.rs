use clap::Parser as CParser;
use sixteen_asm::assembler::Assembler;
use sixteen_asm::log::{self, Level};
use sixteen_asm::output::{OutputFormat, format_machine_code};
use sixteen_asm::parser::parse_source;
use sixteen_asm::{demos, info};
use std::fs;
use std::path::PathBuf;

#[derive(CParser)]
#[command(name = "sas")]
#[command(about = "Assembler for the sixteen machine")]
struct Args {
    /// Assembly source file
    #[arg(required_unless_present_any = ["demo", "list"])]
    input: Option<PathBuf>,

    /// Assemble a bundled demo program instead of a file
    #[arg(short, long, conflicts_with = "input")]
    demo: Option<String>,

    /// List the bundled demo programs
    #[arg(long)]
    list: bool,

    /// Write the raw machine code to this file
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// How to print the machine code
    #[arg(short, long, value_enum, default_value_t = OutputFormat::Hex)]
    format: OutputFormat,

    /// Print the symbol and structure tables
    #[arg(short, long)]
    symbols: bool,

    /// Increase log verbosity (-v, -vv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    log::set_level(Level::from_verbosity(args.verbose));

    if args.list {
        for name in demos::names() {
            println!("{}", name);
        }
        return Ok(());
    }

    let source = match (&args.demo, &args.input) {
        (Some(name), _) => demos::find(name)
            .ok_or_else(|| format!("no demo named '{}'", name))?
            .to_string(),
        (None, Some(path)) => fs::read_to_string(path)?,
        (None, None) => return Err("no input given".into()),
    };

    let ast = parse_source(&source)?;
    let mut assembler = Assembler::new();
    let code = assembler.assemble(&ast)?;
    info!("assembled {} bytes", code.len());

    if args.symbols {
        print!("{}", assembler.listing());
    }

    match &args.output {
        Some(path) => {
            fs::write(path, &code)?;
            println!("Machine code written to {}", path.display());
        }
        None => println!("{}", format_machine_code(&code, args.format)),
    }

    Ok(())
}

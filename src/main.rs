use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};
use colored::Colorize;
use miette::{bail, IntoDiagnostic, Result};

use weft::runtime::Status;
use weft::{env, CpuState};

/// Weft is an assembler & emulator toolchain for the w86 educational machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Assemble a `.asm` file and run it, printing program output
    Run {
        /// .asm file to run
        name: PathBuf,
    },
    /// Assemble a `.asm` file into a raw 64 KiB memory image
    Compile {
        /// `.asm` file to assemble
        name: PathBuf,
        /// Destination of the .img file
        dest: Option<PathBuf>,
    },
    /// Assemble a `.asm` file and report diagnostics without running
    Check {
        /// File to check
        name: PathBuf,
    },
}

fn main() -> Result<()> {
    env::init();
    let args = Args::parse();

    let Some(command) = args.command else {
        println!("\n~ weft v{VERSION} ~");
        println!("{}", LOGO.truecolor(140, 180, 250).bold());
        println!("{SHORT_INFO}");
        return Ok(());
    };

    match command {
        Command::Run { name } => {
            let assembly = assemble(&name)?;
            let mut state = CpuState::new();
            state.lenient_decode = env::compat_decode();
            state.load(&assembly.image, assembly.entry);

            println!("{:>12} image", "Running".green().bold());
            state.status = Status::Running;
            loop {
                match state.step() {
                    Ok(step) => {
                        if let Some(out) = step.output {
                            print!("{out}");
                            io::stdout().flush().into_diagnostic()?;
                            state.log.push(out);
                        }
                        if step.halted {
                            state.status = Status::Idle;
                            break;
                        }
                    }
                    Err(fault) => {
                        state.record_fault(&fault);
                        bail!("runtime fault at IP {:#06X}: {fault}", state.reg.ip);
                    }
                }
            }
            println!("\n{:>12}", "Halted".cyan().bold());
            Ok(())
        }
        Command::Compile { name, dest } => {
            let assembly = assemble(&name)?;
            let out_file_name = dest.unwrap_or(
                format!("{}.img", name.file_stem().unwrap().to_str().unwrap()).into(),
            );
            let mut file = File::create(&out_file_name).into_diagnostic()?;
            file.write_all(&assembly.image[..]).into_diagnostic()?;
            println!(
                "{:>12} {}",
                "Saved to".green().bold(),
                out_file_name.display()
            );
            Ok(())
        }
        Command::Check { name } => {
            let contents = fs::read_to_string(&name).into_diagnostic()?;
            println!(
                "{:>12} target {}",
                "Checking".green().bold(),
                name.display()
            );
            let assembly = weft::compile(&contents);
            if assembly.errors.is_empty() {
                println!("{:>12} with 0 errors", "Finished".green().bold());
                Ok(())
            } else {
                for error in &assembly.errors {
                    eprintln!("{} {error}", "error:".red().bold());
                }
                bail!("assembly failed with {} error(s)", assembly.errors.len());
            }
        }
    }
}

fn assemble(name: &Path) -> Result<weft::Assembly> {
    let contents = fs::read_to_string(name).into_diagnostic()?;
    println!(
        "{:>12} target {}",
        "Assembling".green().bold(),
        name.display()
    );
    let assembly = weft::compile(&contents);
    if assembly.errors.is_empty() {
        Ok(assembly)
    } else {
        for error in &assembly.errors {
            eprintln!("{} {error}", "error:".red().bold());
        }
        bail!("assembly failed with {} error(s)", assembly.errors.len());
    }
}

const LOGO: &str = r#"
                   __ _
     __      _____ / _| |_
     \ \ /\ / / _ \ |_| __|
      \ V  V /  __/  _| |_
       \_/\_/ \___|_|  \__|"#;

const SHORT_INFO: &str = r"
Welcome to weft, an assembler & emulator toolchain for the w86
educational machine. Please use `-h` or `--help` to access the usage
instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");

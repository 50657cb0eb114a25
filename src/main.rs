use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::thread::sleep;
use std::time::Duration;

use clap::{Parser, Subcommand};
use colored::Colorize;
use hotwatch::notify::Event;
use hotwatch::{
    blocking::{Flow, Hotwatch},
    EventKind,
};
use miette::{bail, IntoDiagnostic, Result};

use polyasm::output::Output;
use polyasm::symbol::Radix;
use polyasm::{assemble, encode, AsmParser, Flavor, MachineState, Outcome};
use polyasm::{END_OF_CODE, EXITING};

/// polyasm assembles and runs Intel, AT&T, MIPS and RISC-V assembly on a small virtual machine.
#[derive(Parser)]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Quickly provide a source file to run
    path: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Command {
    /// Run a source file to completion and print the machine state
    Run {
        /// Source file to run
        name: PathBuf,
        /// Assembly flavor, guessed from the file extension when omitted
        #[arg(short, long)]
        flavor: Option<Flavor>,
        /// Display base for register and memory values
        #[arg(short, long, default_value = "dec")]
        base: Radix,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Execute one instruction per key press. Press `q` to quit
    Step {
        /// Source file to step through
        name: PathBuf,
        #[arg(short, long)]
        flavor: Option<Flavor>,
        #[arg(short, long, default_value = "dec")]
        base: Radix,
        /// Produce minimal output, suited for blackbox tests
        #[arg(short, long)]
        minimal: bool,
    },
    /// Write the MIPS binary encoding of a source file
    Encode {
        /// MIPS source file to encode
        name: PathBuf,
        /// Destination of the bit text
        dest: Option<PathBuf>,
        #[arg(short, long)]
        flavor: Option<Flavor>,
    },
    /// Check a source file without running it
    Check {
        /// File to check
        name: PathBuf,
        #[arg(short, long)]
        flavor: Option<Flavor>,
    },
    /// Place a watch on a source file to receive constant assembler updates
    Watch {
        /// File to watch
        name: PathBuf,
        #[arg(short, long)]
        flavor: Option<Flavor>,
    },
}

fn main() -> miette::Result<()> {
    use MsgColor::*;
    let args = Args::parse();
    polyasm::env::init();

    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new() //
                .context_lines(polyasm::DIAGNOSTIC_CONTEXT_LINES)
                .build(),
        )
    }))?;

    let Some(command) = args.command else {
        if let Some(path) = args.path {
            return run(&path, None, Radix::Dec, false);
        }
        println!("\n~ polyasm v{VERSION} ~");
        println!("{}", LOGO.truecolor(120, 200, 255).bold());
        println!("{SHORT_INFO}");
        std::process::exit(0);
    };

    match command {
        Command::Run {
            name,
            flavor,
            base,
            minimal,
        } => run(&name, flavor, base, minimal),
        Command::Step {
            name,
            flavor,
            base,
            minimal,
        } => step(&name, flavor, base, minimal),
        Command::Encode { name, dest, flavor } => {
            let flavor = flavor_for(&name, flavor);
            if !flavor.is_mips() {
                bail!("Flavor {} has no binary encoding, use mips_asm or mips_mml", flavor);
            }
            file_message(Green, "Encoding", &name);
            let src = fs::read_to_string(&name).into_diagnostic()?;
            let mut state = MachineState::new(flavor);
            let air = AsmParser::new(&src, flavor)?.parse(&mut state)?;
            let bits = encode::encode_program(&air, &state).into_diagnostic()?;

            let out_file_name = dest.unwrap_or_else(|| name.with_extension("bits"));
            fs::write(&out_file_name, bits).into_diagnostic()?;

            message(Green, "Finished", "emit binary");
            file_message(Green, "Saved", &out_file_name);
            Ok(())
        }
        Command::Check { name, flavor } => {
            file_message(Green, "Checking", &name);
            check(&name, flavor_for(&name, flavor))?;
            message(Green, "Success", "no errors found!");
            Ok(())
        }
        Command::Watch { name, flavor } => {
            if !name.exists() {
                bail!("File does not exist. Exiting...")
            }
            let flavor = flavor_for(&name, flavor);
            // Vim breaks if watching a single file
            let folder_path = match name.parent() {
                Some(pth) if pth.is_dir() => pth.to_path_buf(),
                _ => Path::new(".").to_path_buf(),
            };

            // Clear screen and move cursor to top left
            print!("\x1B[2J\x1B[2;1H");
            file_message(Green, "Watching", &name);
            message(Cyan, "Help", "press CTRL+C to exit");

            let mut watcher =
                Hotwatch::new_with_custom_delay(Duration::from_millis(500)).into_diagnostic()?;

            watcher
                .watch(folder_path, move |event: Event| match event.kind {
                    // Watch remove for vim changes
                    EventKind::Modify(_) | EventKind::Remove(_) => {
                        print!("\x1B[2J\x1B[2;1H");
                        file_message(Green, "Watching", &name);
                        message(Green, "Re-checking", "file change detected");
                        message(Cyan, "Help", "press CTRL+C to exit");

                        sleep(Duration::from_millis(50));

                        match check(&name, flavor) {
                            Ok(()) => message(Green, "Success", "no errors found!"),
                            Err(e) => println!("\n{:?}", e),
                        }
                        Flow::Continue
                    }
                    _ => Flow::Continue,
                })
                .into_diagnostic()?;
            watcher.run();
            Ok(())
        }
    }
}

#[allow(unused)]
enum MsgColor {
    Green,
    Cyan,
    Red,
}

fn file_message(color: MsgColor, left: &str, right: &Path) {
    let right = format!("target {}", right.display());
    message(color, left, &right);
}

fn message<S>(color: MsgColor, left: S, right: S)
where
    S: Colorize + std::fmt::Display,
{
    let left = match color {
        MsgColor::Green => left.green(),
        MsgColor::Cyan => left.cyan(),
        MsgColor::Red => left.red(),
    };
    println!("{left:>12} {right}");
}

/// Flavor named on the command line, else guessed from the file extension.
fn flavor_for(name: &Path, flavor: Option<Flavor>) -> Flavor {
    if let Some(flavor) = flavor {
        return flavor;
    }
    match name.extension().and_then(|ext| ext.to_str()) {
        Some("s" | "mips") => Flavor::MipsAsm,
        Some("mml") => Flavor::MipsMml,
        Some("rv") => Flavor::Riscv,
        Some("att") => Flavor::Att,
        _ => Flavor::Intel,
    }
}

/// Lex and parse only, surfacing the full diagnostic.
fn check(name: &Path, flavor: Flavor) -> Result<()> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    let mut state = MachineState::new(flavor);
    AsmParser::new(&src, flavor)?.parse(&mut state)?;
    Ok(())
}

/// Read the source and report parse errors as diagnostics before handing it to the machine.
fn load(name: &Path, flavor: Flavor) -> Result<String> {
    let src = fs::read_to_string(name).into_diagnostic()?;
    if !src.trim().is_empty() {
        let mut state = MachineState::new(flavor);
        AsmParser::new(&src, flavor)?.parse(&mut state)?;
    }
    Ok(src)
}

fn run(name: &Path, flavor: Option<Flavor>, base: Radix, minimal: bool) -> Result<()> {
    Output::set_minimal(minimal);
    let flavor = flavor_for(name, flavor);
    file_message(MsgColor::Green, "Assembling", name);
    let src = load(name, flavor)?;

    let mut state = MachineState::new(flavor);
    state.base = base;
    message(MsgColor::Green, "Running", flavor.name());
    let outcome = assemble(Some(&src), flavor, &mut state, false);
    report(&outcome, &state)?;

    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn step(name: &Path, flavor: Option<Flavor>, base: Radix, minimal: bool) -> Result<()> {
    Output::set_minimal(minimal);
    let flavor = flavor_for(name, flavor);
    file_message(MsgColor::Green, "Assembling", name);
    let src = load(name, flavor)?;

    let mut state = MachineState::new(flavor);
    state.base = base;
    message(MsgColor::Cyan, "Help", "press any key to step, `q` to quit");

    let term = console::Term::stdout();
    loop {
        let key = if term.is_term() {
            term.read_char().into_diagnostic()?
        } else {
            let mut buf = [0; 1];
            match std::io::stdin().read(&mut buf).into_diagnostic()? {
                0 => break,
                _ => buf[0] as char,
            }
        };
        if key == 'q' {
            break;
        }
        let outcome = assemble(Some(&src), flavor, &mut state, true);
        report(&outcome, &state)?;
        if outcome.last_instr == END_OF_CODE || outcome.last_instr == EXITING {
            break;
        }
    }

    file_message(MsgColor::Green, "Completed", name);
    Ok(())
}

fn report(outcome: &Outcome, state: &MachineState) -> Result<()> {
    if !outcome.last_instr.is_empty() {
        message(MsgColor::Cyan, "Executed", &outcome.last_instr);
    }
    Output::Normal.print_state(state);
    if !outcome.error.is_empty() {
        bail!("{}", outcome.error);
    }
    Ok(())
}

const LOGO: &str = r#"
   ┌─────────────────────────────┐
   │  p o l y a s m              │
   │  intel · att · mips · riscv │
   └─────────────────────────────┘"#;

const SHORT_INFO: &str = r"
Welcome to polyasm, an assembler and virtual machine for x86 (Intel and AT&T),
MIPS and RISC-V assembly.
Please use `-h` or `--help` to access the usage instructions and documentation.
";

const VERSION: &str = env!("CARGO_PKG_VERSION");

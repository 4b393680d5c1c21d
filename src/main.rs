use std::fs::read_to_string;
use std::io;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::exit;

use clap::Parser;

use lox::Error;
use lox::Vm;

const EX_DATAERR: i32 = 65;
const EX_SOFTWARE: i32 = 70;
const EX_IOERR: i32 = 74;

#[derive(Parser)]
#[command(version, about)]
struct Cli {
    /// Script to run. Starts a REPL when omitted.
    script: Option<PathBuf>,

    /// Print the bytecode listing to stderr before running.
    #[arg(long)]
    disassemble: bool,
}

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let mut vm = Vm::new();
    match &cli.script {
        None => run_prompt(&mut vm, &cli),
        Some(path) => run_file(&mut vm, &cli, path),
    }
}

fn run_file(vm: &mut Vm, cli: &Cli, path: &Path) {
    let source = match read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            eprintln!("Could not read file \"{}\": {}", path.display(), e);
            exit(EX_IOERR);
        }
    };

    if let Err(e) = run(vm, cli, &source) {
        eprintln!("{}", e);
        let code = match e {
            Error::Compile(_) => EX_DATAERR,
            Error::Runtime(_) => EX_SOFTWARE,
            Error::Io(_) => EX_IOERR,
        };
        exit(code);
    }
}

fn run_prompt(vm: &mut Vm, cli: &Cli) {
    let stdin = io::stdin();
    let mut stdout = io::stdout();
    let mut buffer = String::new();
    loop {
        print!("> ");
        let _ = stdout.flush();

        buffer.clear();
        match stdin.read_line(&mut buffer) {
            Ok(0) => {
                println!();
                return;
            }
            Ok(_) => (),
            Err(e) => {
                eprintln!("stdin: {}", e);
                return;
            }
        }

        if let Err(e) = run(vm, cli, &buffer) {
            eprintln!("{}", e);
        }
    }
}

fn run(vm: &mut Vm, cli: &Cli, source: &str) -> lox::Result<()> {
    let chunk = lox::compile(source)?;
    if cli.disassemble {
        eprint!("{}", chunk.disassemble("script"));
    }
    vm.run_chunk(&chunk)
}

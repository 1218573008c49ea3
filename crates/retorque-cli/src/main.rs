use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use dso::FileData;
use retorque_core::{ast, cfg, disasm, structure, ErrorKind};

#[derive(Parser)]
#[command(name = "retorque", about = "TorqueScript DSO decompiler")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Decompile a compiled script back to TorqueScript source.
    Decompile {
        /// Path to the compiled .dso file.
        input: PathBuf,
        /// Expected DSO version word; a mismatch aborts.
        #[arg(long)]
        version: Option<u32>,
        /// Write recovered source here instead of stdout.
        #[arg(long)]
        output: Option<PathBuf>,
        /// Dump the typed instruction list as JSON to stderr before
        /// analysis.
        #[arg(long)]
        dump_disasm: bool,
    },
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e:#}");
            ExitCode::from(exit_code(&e))
        }
    }
}

/// 1 file error, 2 disassembly error, 3 structural error.
fn exit_code(err: &anyhow::Error) -> u8 {
    if err.downcast_ref::<dso::Error>().is_some() {
        return 1;
    }
    match err.downcast_ref::<retorque_core::Error>().map(|e| e.kind()) {
        Some(ErrorKind::Format) => 2,
        Some(ErrorKind::Structure) | Some(ErrorKind::Internal) => 3,
        None => 1,
    }
}

fn run(cli: &Cli) -> Result<()> {
    match &cli.command {
        Command::Decompile {
            input,
            version,
            output,
            dump_disasm,
        } => cmd_decompile(input, *version, output.as_deref(), *dump_disasm),
    }
}

fn cmd_decompile(
    input: &Path,
    version: Option<u32>,
    output: Option<&Path>,
    dump_disasm: bool,
) -> Result<()> {
    let data =
        fs::read(input).with_context(|| format!("failed to read {}", input.display()))?;
    let file = FileData::parse(&data, version)
        .with_context(|| format!("failed to parse {}", input.display()))?;
    eprintln!(
        "[decompile] {} (version {}, {} code words)",
        input.display(),
        file.version(),
        file.code_size()
    );

    let disassembly = disasm::disassemble(&file)?;
    eprintln!("[decompile] {} instruction(s)", disassembly.len());
    if dump_disasm {
        let instructions: Vec<_> = disassembly.iter().collect();
        eprintln!("{}", serde_json::to_string_pretty(&instructions)?);
    }

    let source = if disassembly.is_empty() {
        String::new()
    } else {
        let cfgs = cfg::build_cfgs(&disassembly)?;
        eprintln!("[decompile] {} code region(s)", cfgs.len());
        let mut stmts = Vec::new();
        for graph in &cfgs {
            let region = structure::analyze(graph)?;
            stmts.extend(ast::lift(&region, &file)?);
        }
        ast::printer::print_program(&stmts)
    };

    match output {
        Some(path) => {
            fs::write(path, &source)
                .with_context(|| format!("failed to write {}", path.display()))?;
            eprintln!("[decompile] wrote {}", path.display());
        }
        None => print!("{source}"),
    }
    Ok(())
}

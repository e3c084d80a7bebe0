use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};

use stackc::optimizer::OptimizationReport;
use stackc::{Config, Unit, pipeline, tree_text};

#[derive(Parser)]
#[command(version, about = "Compiles the stack language to stack-machine assembly", long_about = None)]
struct Args {
    /// YAML file overriding the default limits and backend registers
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Print stage summaries and the tree to stderr
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Source text to tree text
    Frontend {
        /// Source file, stdin when omitted
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Tree text to optimized tree text
    Middleend {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Tree text to assembly
    Backend {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Source text to assembly in one process
    Build {
        input: Option<PathBuf>,
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Skip constant folding and identity elimination
        #[arg(long)]
        no_opt: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config = match &args.config {
        Some(path) => Config::load(path).with_context(|| format!("Loading {}", path.display()))?,
        None => Config::default(),
    };
    let verbose = args.verbose;

    match args.command {
        Command::Frontend { input, output } => {
            let source = read_input(input.as_deref())?;
            let unit = pipeline::compile_unit(&source, &config).context("Frontend failed")?;
            if verbose {
                summarize("frontend", &unit);
            }
            let text = tree_text::write(&unit.ast, &unit.names)?;
            write_output(output.as_deref(), &text)
        }
        Command::Middleend { input, output } => {
            let text = read_input(input.as_deref())?;
            let mut unit = tree_text::read(&text, &config).context("Reading tree text")?;
            let report = pipeline::optimize(&mut unit).context("Middleend failed")?;
            if verbose {
                report_optimization(&report);
                summarize("middleend", &unit);
            }
            let text = tree_text::write(&unit.ast, &unit.names)?;
            write_output(output.as_deref(), &text)
        }
        Command::Backend { input, output } => {
            let text = read_input(input.as_deref())?;
            let unit = tree_text::read(&text, &config).context("Reading tree text")?;
            if verbose {
                summarize("backend", &unit);
            }
            let asm = pipeline::generate(&unit, &config).context("Backend failed")?;
            write_output(output.as_deref(), &asm)
        }
        Command::Build {
            input,
            output,
            no_opt,
        } => {
            let source = read_input(input.as_deref())?;
            let mut unit = pipeline::compile_unit(&source, &config).context("Frontend failed")?;
            if !no_opt {
                let report = pipeline::optimize(&mut unit).context("Middleend failed")?;
                if verbose {
                    report_optimization(&report);
                }
            }
            if verbose {
                summarize("build", &unit);
            }
            let asm = pipeline::generate(&unit, &config).context("Backend failed")?;
            write_output(output.as_deref(), &asm)
        }
    }
}

fn read_input(path: Option<&Path>) -> Result<String> {
    match path {
        Some(path) => {
            fs::read_to_string(path).with_context(|| format!("Reading {}", path.display()))
        }
        None => {
            let mut buffer = String::new();
            io::stdin()
                .read_to_string(&mut buffer)
                .context("Reading stdin")?;
            Ok(buffer)
        }
    }
}

fn write_output(path: Option<&Path>, text: &str) -> Result<()> {
    match path {
        Some(path) => fs::write(path, text).with_context(|| format!("Writing {}", path.display())),
        None => {
            print!("{text}");
            Ok(())
        }
    }
}

fn summarize(stage: &str, unit: &Unit) {
    eprintln!(
        "{stage}: {} live nodes, {} names, {} functions",
        unit.ast.live_count(),
        unit.names.len(),
        unit.functions.len()
    );
    for function in unit.functions.iter() {
        eprintln!(
            "function {} (name #{}): {} params, {} locals",
            function.name,
            function.name_index,
            function.params.len(),
            function.locals.len()
        );
    }
    eprintln!("tree: {}", unit.ast.to_sexpr(unit.ast.root(), &unit.names));
}

fn report_optimization(report: &OptimizationReport) {
    eprintln!(
        "optimizer: {} passes, {} folded, {} simplified",
        report.passes, report.folded, report.simplified
    );
}

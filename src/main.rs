//! loopgen Command Line Interface
//!
//! Usage:
//!   loopgen [OPTIONS] <input-file>
//!   loopgen --help
//!
//! Examples:
//!   loopgen vadd.json                        # Regenerate, print the report
//!   loopgen --parallelize-all --emit=cfg stencil.json
//!   loopgen --word-bits=32 --emit=all fused.json
//!   loopgen --emit=deps matmul.json          # Just list the dependences

use clap::{Parser, ValueEnum};
use loopgen::analysis::DependenceGraph;
use loopgen::codegen::{generate, TranslationConfig};
use loopgen::ir::pprint::dump;
use loopgen::scop::builder::KernelDesc;
use loopgen::utils::pretty::PrettyPrint;
use std::path::PathBuf;
use std::fs;
use anyhow::{Result, Context};
use log::{info, debug, warn};

/// loopgen - regenerate control flow from polyhedral loop nests
#[derive(Parser, Debug)]
#[command(name = "loopgen")]
#[command(version)]
#[command(about = "Regenerates control-flow graphs from polyhedral loop-nest ASTs", long_about = None)]
struct Cli {
    /// Kernel description (.json)
    #[arg(value_name = "FILE")]
    input: PathBuf,

    /// Output file (defaults to stdout)
    #[arg(short, long, value_name = "FILE")]
    output: Option<PathBuf>,

    /// Mark loops that carry no dependence as parallel
    #[arg(long)]
    parallelize_all: bool,

    /// Skip CFG verification after each translated statement
    #[arg(long)]
    no_verify: bool,

    /// Machine word size in bits
    #[arg(long, default_value = "64", value_parser = clap::value_parser!(u32).range(8..=64))]
    word_bits: u32,

    /// What to emit
    #[arg(long, default_value = "report")]
    emit: EmitKind,

    /// Verbose output (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Quiet mode (suppress warnings)
    #[arg(short, long)]
    quiet: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum EmitKind {
    /// Regenerated control-flow graph
    Cfg,
    /// Loop-nest AST being translated
    Ast,
    /// Dependences between statements
    Deps,
    /// Summary of the translation
    Report,
    /// All of the above
    All,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.quiet {
        log::LevelFilter::Error
    } else {
        match cli.verbose {
            0 => log::LevelFilter::Warn,
            1 => log::LevelFilter::Info,
            2 => log::LevelFilter::Debug,
            _ => log::LevelFilter::Trace,
        }
    };

    env_logger::Builder::from_default_env()
        .filter_level(log_level)
        .format_timestamp(None)
        .init();

    info!("loopgen v{}", loopgen::VERSION);
    debug!("Input file: {:?}", cli.input);

    let text = fs::read_to_string(&cli.input)
        .with_context(|| format!("Failed to read input file: {:?}", cli.input))?;
    let desc = KernelDesc::from_json(&text)
        .with_context(|| format!("Failed to parse kernel description: {:?}", cli.input))?;

    let config = build_config(&cli);
    debug!("Translation config: {:?}", config);

    info!("Building kernel {}...", desc.name);
    let mut kernel = desc.build(config.word_bits)
        .with_context(|| format!("Invalid kernel {}", desc.name))?;
    let deps = DependenceGraph::analyze(&kernel.scop);
    let ast_text = kernel.ast.pretty();

    info!("Generating code...");
    let report = generate(&mut kernel.cfg, &mut kernel.scop, &kernel.ast, &config, &deps)
        .with_context(|| format!("Code generation failed for {}", desc.name))?;
    if !report.success {
        warn!("{}: generated code discarded, original code kept", desc.name);
    }
    let removed = kernel.cfg.cleanup();
    debug!("cleanup removed {} blocks", removed);

    let mut sections = Vec::new();
    let all = cli.emit == EmitKind::All;
    if all || cli.emit == EmitKind::Ast {
        sections.push(ast_text);
    }
    if all || cli.emit == EmitKind::Deps {
        sections.push(deps.to_string());
    }
    if all || cli.emit == EmitKind::Cfg {
        sections.push(dump(&kernel.cfg));
    }
    if all || cli.emit == EmitKind::Report {
        sections.push(report.to_string());
    }
    write_output(&cli.output, &sections.join("\n\n"))
}

fn build_config(cli: &Cli) -> TranslationConfig {
    let mut config = TranslationConfig {
        parallelize_all: cli.parallelize_all,
        word_bits: cli.word_bits,
        ..Default::default()
    };
    if cli.no_verify {
        config.verify = false;
    }
    config
}

fn write_output(path: &Option<PathBuf>, content: &str) -> Result<()> {
    match path {
        Some(p) => {
            fs::write(p, content)
                .with_context(|| format!("Failed to write output file: {:?}", p))?;
        }
        None => {
            println!("{}", content);
        }
    }
    Ok(())
}

use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};

use lunacov::analyzer::{self, AnalyzeOptions, CodeMap};
use lunacov::diagnostics::{render_error, CoverageError};
use lunacov::instrument::{self, InstrumentOptions};
use lunacov::path::PathNormalizer;
use lunacov::CoverageConfig;

#[derive(Parser)]
#[command(name = "lunacov", version, about = "Coverage analysis and instrumentation for Lua sources")]
struct Cli {
    /// TOML configuration file (a bare table or a [coverage] section)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log engine internals to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the static code map of a Lua file
    Analyze {
        /// Source file path
        file: PathBuf,
        /// Emit the full code map as JSON
        #[arg(long)]
        json: bool,
    },
    /// Rewrite a Lua file with tracking calls
    Instrument {
        /// Source file path
        file: PathBuf,
        /// Directory to write the rewritten file under. If omitted, prints to stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Instrument files and verify the rewritten source still parses
    Check {
        /// Source file paths
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },
}

fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_max_level(if cli.verbose { tracing::Level::DEBUG } else { tracing::Level::WARN })
        .init();

    let config = match &cli.config {
        Some(path) => match CoverageConfig::load(path) {
            Ok(config) => config,
            Err(err) => {
                eprintln!("error [{}]: {err}", path.display());
                std::process::exit(1);
            }
        },
        None => CoverageConfig::default(),
    };
    let normalizer = PathNormalizer::new();

    match cli.command {
        Commands::Analyze { file, json } => {
            let options = AnalyzeOptions::from(&config);
            match analyzer::analyze_file(&file, &options) {
                Ok(map) => {
                    if json {
                        match serde_json::to_string_pretty(&map) {
                            Ok(text) => println!("{text}"),
                            Err(e) => {
                                eprintln!("error: could not serialize code map: {e}");
                                std::process::exit(1);
                            }
                        }
                    } else {
                        print_code_map(&map, config.control_flow_keywords_executable);
                    }
                }
                Err(err) => fail(&file, &err),
            }
        }
        Commands::Instrument { file, output } => {
            let options = InstrumentOptions::from(&config);
            let key = normalizer.normalize_path(&file);
            let instrumented = match instrument::instrument_file(&file, &key, &options) {
                Ok(instrumented) => instrumented,
                Err(err) => fail(&file, &err),
            };
            match output {
                Some(dir) => match instrument::write_instrumented(&dir, &key, &instrumented.source) {
                    Ok(path) => eprintln!("  instrumented {} \u{2192} {}", file.display(), path.display()),
                    Err(err) => fail(&file, &err),
                },
                None => print!("{}", instrumented.source),
            }
        }
        Commands::Check { files } => {
            let options = InstrumentOptions::from(&config);
            let mut failures = 0usize;
            for file in &files {
                match lunacov::check_file(file, &options) {
                    Ok(instrumented) => {
                        let map = &instrumented.code_map;
                        println!(
                            "ok    {} ({} functions, {} blocks, {} conditions)",
                            file.display(),
                            map.functions.len(),
                            map.blocks.len(),
                            map.conditions.len(),
                        );
                    }
                    Err(err) => {
                        failures += 1;
                        println!("FAIL  {}", file.display());
                        report(file, &err);
                    }
                }
            }
            if failures > 0 {
                eprintln!("{failures} of {} file(s) failed", files.len());
                std::process::exit(1);
            }
        }
    }
}

fn report(file: &Path, err: &CoverageError) {
    let source = std::fs::read_to_string(file).unwrap_or_default();
    render_error(&source, &file.display().to_string(), err);
}

fn fail(file: &Path, err: &CoverageError) -> ! {
    report(file, err);
    std::process::exit(1);
}

fn print_code_map(map: &CodeMap, control_flow_keywords_executable: bool) {
    println!("{}", map.path);
    if !map.parsed {
        println!(
            "  heuristic analysis: {}",
            map.parse_error.as_deref().unwrap_or("source did not parse")
        );
    }
    println!(
        "  lines: {} total, {} executable",
        map.line_count(),
        map.executable_line_count_with(control_flow_keywords_executable)
    );
    println!("  functions: {}", map.functions.len());
    for f in &map.functions {
        println!("    #{:<3} {:<9} {:<24} {}-{}", f.id, f.kind.as_str(), f.name, f.start_line, f.end_line);
    }
    println!("  blocks: {}", map.blocks.len());
    for b in &map.blocks {
        let parent = b.parent_id.map(|p| format!(" in #{p}")).unwrap_or_default();
        println!("    #{:<3} {:<9} {}-{}{}", b.id, b.kind.as_str(), b.start_line, b.end_line, parent);
    }
    println!("  conditions: {}", map.conditions.len());
    for c in &map.conditions {
        let kind = format!("{:?}", c.kind);
        let op = c.operator.as_deref().unwrap_or("");
        println!("    #{:<3} {:<12} {:<3} line {}", c.id, kind, op, c.start_line);
    }
}

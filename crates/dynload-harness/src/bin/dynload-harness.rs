//! CLI entrypoint for the dynload inspection harness.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;

use clap::{Args, Parser, Subcommand};
use dynload::SymbolParams;
use dynload_harness::error::HarnessError;
use dynload_harness::inspect::{self, LibrarySpec};
use dynload_harness::structured_log::{
    LogEmitter, LogEntry, LogLevel, Outcome, validate_log_file,
};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

/// Inspect dynamic libraries through dynload.
#[derive(Debug, Parser)]
#[command(name = "dynload-harness")]
#[command(about = "Load a dynamic library and report on its symbols")]
struct Cli {
    /// Append a structured JSONL record of the operation to this file.
    #[arg(long, global = true)]
    log: Option<PathBuf>,
    /// Pretty-print JSON output.
    #[arg(long, global = true)]
    pretty: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Args)]
struct Target {
    /// Directory holding the library; empty defers to the loader search path.
    #[arg(long, default_value = "")]
    dir: String,
    /// Library base name, e.g. `m` for libm.
    #[arg(long)]
    name: String,
    /// Use the name verbatim instead of adding the platform prefix and suffix.
    #[arg(long)]
    raw_name: bool,
}

impl Target {
    fn spec(&self) -> LibrarySpec {
        LibrarySpec::new(&self.dir, &self.name, !self.raw_name)
    }
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List exported symbols.
    Symbols {
        #[command(flatten)]
        target: Target,
        /// Report demangled names, dropping names that do not demangle.
        #[arg(long)]
        demangle: bool,
        /// Report only names the loader can resolve.
        #[arg(long)]
        loadable: bool,
    },
    /// Resolve a symbol by raw or demangled name.
    Resolve {
        #[command(flatten)]
        target: Target,
        /// Raw name, demangled name, or demangled prefix such as `ns::func`.
        #[arg(long)]
        symbol: String,
    },
    /// Compute the address at an offset from the load base.
    Offset {
        #[command(flatten)]
        target: Target,
        /// Byte offset (decimal or 0x-prefixed hex).
        #[arg(long, value_parser = parse_offset)]
        offset: u64,
        /// Require a loadable symbol at the computed address.
        #[arg(long)]
        checked: bool,
    },
    /// Validate a structured JSONL log file.
    ValidateLog {
        /// Log file to check.
        #[arg(long)]
        file: PathBuf,
    },
}

fn parse_offset(s: &str) -> Result<u64, String> {
    let s = s.trim().replace('_', "");
    let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
        Some(hex) => u64::from_str_radix(hex, 16),
        None => s.parse::<u64>(),
    };
    parsed.map_err(|e| format!("invalid offset '{s}': {e}"))
}

fn run_id() -> String {
    let nanos = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    format!("{}-{nanos:09}", std::process::id())
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<(), HarnessError> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

/// Run one library operation, print its report and build its log record.
fn run_operation<T: Serialize>(
    event: &str,
    spec: &LibrarySpec,
    pretty: bool,
    op: impl FnOnce() -> Result<T, HarnessError>,
) -> (LogEntry, Result<(), HarnessError>) {
    let started = Instant::now();
    let result = op();
    let latency_ns = u64::try_from(started.elapsed().as_nanos()).unwrap_or(u64::MAX);

    let entry = LogEntry::new(String::new(), LogLevel::Info, event)
        .with_library(spec.path())
        .with_latency_ns(latency_ns);
    match result {
        Ok(report) => (
            entry.with_outcome(Outcome::Pass),
            print_json(&report, pretty),
        ),
        Err(err) => {
            let mut entry = entry
                .with_outcome(Outcome::Fail)
                .with_error_kind(err.kind())
                .with_details(serde_json::json!({ "message": err.to_string() }));
            entry.level = LogLevel::Error;
            (entry, Err(err))
        }
    }
}

fn run(cli: Cli) -> Result<(), HarnessError> {
    let (entry, result) = match &cli.command {
        Command::Symbols {
            target,
            demangle,
            loadable,
        } => {
            let spec = target.spec();
            let params = SymbolParams::new().demangle(*demangle).loadable(*loadable);
            run_operation("symbols", &spec, cli.pretty, || {
                inspect::list_symbols(&spec, params)
            })
        }
        Command::Resolve { target, symbol } => {
            let spec = target.spec();
            let (entry, result) = run_operation("resolve", &spec, cli.pretty, || {
                inspect::resolve_symbol(&spec, symbol)
            });
            (entry.with_symbol(symbol.as_str()), result)
        }
        Command::Offset {
            target,
            offset,
            checked,
        } => {
            let spec = target.spec();
            let (entry, result) = run_operation("offset", &spec, cli.pretty, || {
                inspect::resolve_offset(&spec, *offset, *checked)
            });
            (entry.with_offset(*offset), result)
        }
        Command::ValidateLog { file } => return validate(file),
    };

    if let Some(path) = &cli.log {
        let mut emitter = LogEmitter::to_file(path, &run_id()).map_err(|source| {
            HarnessError::Io {
                path: path.clone(),
                source,
            }
        })?;
        emitter
            .emit_entry(entry)
            .and_then(|()| emitter.flush())
            .map_err(|source| HarnessError::Io {
                path: path.clone(),
                source,
            })?;
    }
    result
}

fn validate(file: &Path) -> Result<(), HarnessError> {
    let (lines, errors) = validate_log_file(file).map_err(|source| HarnessError::Io {
        path: file.to_path_buf(),
        source,
    })?;
    for err in &errors {
        eprintln!("{err}");
    }
    if errors.is_empty() {
        println!("{lines} line(s) valid");
        Ok(())
    } else {
        Err(HarnessError::InvalidLog {
            lines,
            errors: errors.len(),
        })
    }
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err}");
            ExitCode::from(err.exit_code())
        }
    }
}

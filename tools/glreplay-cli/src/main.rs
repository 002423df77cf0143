//! Trace replay tool for the glreplay engine.
//!
//! Provides commands for:
//! - Replaying a recorded trace on the headless context
//! - Checking that a trace and config parse
//!
//! ## Usage
//!
//! ```bash
//! # Replay a trace and print the resulting info records
//! glreplay replay session.json
//!
//! # Replay with a viewer config, GL error checks and a JSON report
//! glreplay replay session.json --config viewer.json --check-gl-errors --output report.json
//!
//! # Parse only
//! glreplay check session.json
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::{Parser, Subcommand};
use glreplay_common::{init_logging, LogConfig, LogFormat};
use glreplay_engine::ViewerConfig;
use tracing::Level;

mod trace;

use trace::{replay, ReplayOptions, Trace};

#[derive(Parser)]
#[command(name = "glreplay")]
#[command(about = "Replay recorded WebGL2 command traces")]
struct Cli {
    /// Log level (error, warn, info, debug, trace)
    #[arg(long, global = true, default_value = "warn")]
    log_level: Level,

    /// Log format (pretty, compact, json)
    #[arg(long, global = true, default_value = "compact")]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a trace and report what happened
    Replay {
        /// Trace file
        trace: PathBuf,
        /// Viewer config file, overriding the trace's own
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Fail commands that leave a GL error behind
        #[arg(long)]
        check_gl_errors: bool,
        /// Output JSON report path (stdout when absent)
        #[arg(short, long)]
        output: Option<PathBuf>,
        /// Exit non-zero when any command was skipped
        #[arg(long)]
        strict: bool,
    },

    /// Parse a trace (and optional config) without replaying
    Check {
        /// Trace file
        trace: PathBuf,
        /// Viewer config file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let log_config = LogConfig {
        level: cli.log_level,
        format: cli.log_format,
        ..LogConfig::default()
    };
    init_logging(log_config)?;

    match cli.command {
        Commands::Replay {
            trace,
            config,
            check_gl_errors,
            output,
            strict,
        } => {
            let recorded = Trace::load(&trace)
                .with_context(|| format!("failed to load trace {}", trace.display()))?;
            let config = config
                .map(|path| {
                    ViewerConfig::load(&path)
                        .with_context(|| format!("failed to load config {}", path.display()))
                })
                .transpose()?;
            let options = ReplayOptions {
                config,
                check_gl_errors,
            };

            let summary = replay(&recorded, &options)?;
            let json = serde_json::to_string_pretty(&summary)?;
            match output {
                Some(path) => {
                    std::fs::write(&path, json)?;
                    println!("Report written to: {}", path.display());
                }
                None => println!("{json}"),
            }

            eprintln!(
                "{} commands executed, {} skipped, {} draw calls",
                summary.executed,
                summary.failures.len(),
                summary.draw_calls
            );
            if strict && !summary.failures.is_empty() {
                std::process::exit(1);
            }
        }

        Commands::Check { trace, config } => {
            let recorded = Trace::load(&trace)
                .with_context(|| format!("failed to load trace {}", trace.display()))?;
            recorded.decode_batches()?;
            if let Some(path) = config {
                ViewerConfig::load(&path)
                    .with_context(|| format!("failed to load config {}", path.display()))?;
            }
            let commands: usize = recorded.batches.iter().map(|b| b.commands.len()).sum();
            println!(
                "{}: {} resources, {} batches, {} commands",
                trace.display(),
                recorded.resources,
                recorded.batches.len(),
                commands
            );
        }
    }

    Ok(())
}

mod commands;
mod core;
mod engine;
mod pipeline;
mod quality;
mod ui;
mod utils;

use clap::{Parser, Subcommand};
use core::error::{GateError, print_error};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// Fix-first code quality gate for pre-commit hooks and CI
#[derive(Parser)]
#[command(name = "fixgate")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
#[command(styles = get_styles())]
struct Cli {
  #[command(subcommand)]
  command: Commands,
}

#[derive(Subcommand)]
enum Commands {
  /// Fix, check and re-stage files
  Run {
    /// Files to process (default: files staged for commit)
    files: Vec<PathBuf>,
    /// Process the files staged for commit
    #[arg(long)]
    staged: bool,
    /// Output the report in JSON format
    #[arg(long)]
    json: bool,
    /// Run timeout in milliseconds (0 disables; default from fixgate.toml)
    #[arg(long)]
    timeout_ms: Option<u64>,
    /// Do not re-stage files modified by fixers
    #[arg(long)]
    no_stage: bool,
    /// Mark this run as warm in the metrics block
    #[arg(long)]
    warm: bool,
  },

  /// List configured engines and check their tools
  Engines {
    /// Output in JSON format
    #[arg(long)]
    json: bool,
  },
}

fn get_styles() -> clap::builder::Styles {
  clap::builder::Styles::styled()
    .usage(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .header(
      anstyle::Style::new()
        .bold()
        .underline()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow))),
    )
    .literal(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green))))
    .invalid(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .error(
      anstyle::Style::new()
        .bold()
        .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red))),
    )
    .placeholder(anstyle::Style::new().fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::White))))
}

/// Diagnostics go to stderr so `--json` output on stdout stays machine readable
fn init_tracing() {
  let filter = EnvFilter::try_from_env("FIXGATE_LOG").unwrap_or_else(|_| EnvFilter::new("warn"));
  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(std::io::stderr)
    .with_target(false)
    .init();
}

fn main() {
  let cli = Cli::parse();
  init_tracing();

  let current_dir = match std::env::current_dir() {
    Ok(dir) => dir,
    Err(e) => {
      eprintln!("Error: Failed to get current directory: {}", e);
      std::process::exit(1);
    }
  };

  let ctx = match core::context::GateContext::build(&current_dir) {
    Ok(ctx) => ctx,
    Err(e) => handle_error(e),
  };

  let result = match cli.command {
    Commands::Run {
      files,
      staged,
      json,
      timeout_ms,
      no_stage,
      warm,
    } => commands::run_gate(
      &ctx,
      commands::RunOptions {
        files,
        staged,
        json,
        timeout_ms,
        no_stage,
        warm,
      },
    ),
    Commands::Engines { json } => commands::run_engines(&ctx, json),
  };

  if let Err(err) = result {
    handle_error(err);
  }
}

fn handle_error(err: GateError) -> ! {
  print_error(&err);
  std::process::exit(err.exit_code().as_i32());
}

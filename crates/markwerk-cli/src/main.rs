// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// markwerk: grade answer-sheet images from the command line.
//
// Reports are JSON on stdout; logs go to stderr (filter with RUST_LOG).

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use markwerk_core::human_errors::diagnose;
use markwerk_core::{GradingConfig, Layout, MarkwerkError, Result};
use markwerk_omr::{AnswerKey, DirectorySink, NullSink, SheetGrader, SheetRenderer, SourceImage};
use serde::Serialize;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

/// Log level when `RUST_LOG` is unset. Stdout carries only JSON.
const DEFAULT_LOG_FILTER: &str = "warn";

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Grade one sheet image and print the report
    Grade {
        /// Sheet layout: p1, p2 or p3
        #[arg(short, long)]
        layout: Layout,
        /// Path to the sheet image
        #[arg(short, long)]
        image: PathBuf,
        /// JSON settings file (defaults are used for anything missing)
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// Write intermediate images to this directory
        #[arg(long)]
        debug_dir: Option<PathBuf>,
        /// Pretty-print the report
        #[arg(long)]
        pretty: bool,
    },
    /// Print the default settings as JSON
    Config {
        #[arg(long)]
        pretty: bool,
    },
    /// Render a reference sheet with a known answer key
    Render {
        /// Sheet layout: p1, p2 or p3
        #[arg(short, long)]
        layout: Layout,
        /// Output image path (format from the extension)
        #[arg(short, long)]
        output: PathBuf,
        /// JSON settings file
        #[arg(short, long)]
        config: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)))
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Commands::Grade {
            layout,
            image,
            config,
            debug_dir,
            pretty,
        } => grade(layout, &image, config.as_deref(), debug_dir.as_deref(), pretty),
        Commands::Config { pretty } => print_json(&GradingConfig::default(), pretty),
        Commands::Render { layout, output, config } => render(layout, &output, config.as_deref()),
    };

    match outcome {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            let human = diagnose(&err);
            error!(stage = %err.stage(), %err, "Command failed");
            eprintln!("error: {}", human.message);
            eprintln!("hint: {}", human.suggestion);
            if err.is_input_problem() {
                ExitCode::from(2)
            } else {
                ExitCode::FAILURE
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> Result<GradingConfig> {
    match path {
        Some(path) => {
            info!(path = %path.display(), "Loading settings");
            GradingConfig::load(path)
        }
        None => Ok(GradingConfig::default()),
    }
}

fn grade(layout: Layout, image: &Path, config: Option<&Path>, debug_dir: Option<&Path>, pretty: bool) -> Result<()> {
    let grader = SheetGrader::new(load_config(config)?)?;
    let source = SourceImage::open(image)?;
    let report = match debug_dir {
        Some(dir) => grader.grade_with_sink(&source, layout, &DirectorySink::new(dir)?)?,
        None => grader.grade_with_sink(&source, layout, &NullSink)?,
    };
    print_json(&report, pretty)
}

fn render(layout: Layout, output: &Path, config: Option<&Path>) -> Result<()> {
    let config = load_config(config)?;
    let key = AnswerKey::sample(layout);
    let sheet = SheetRenderer::new(&config, layout).render(&key)?;
    sheet.save(output).map_err(|err| match err {
        image::ImageError::IoError(io) => MarkwerkError::Io(io),
        other => MarkwerkError::ImageDecode(format!("failed to write {}: {}", output.display(), other)),
    })?;
    info!(path = %output.display(), "Reference sheet written");
    print_json(&key, true)
}

fn print_json<T: Serialize>(value: &T, pretty: bool) -> Result<()> {
    let text = if pretty {
        serde_json::to_string_pretty(value)?
    } else {
        serde_json::to_string(value)?
    };
    println!("{text}");
    Ok(())
}

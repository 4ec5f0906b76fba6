mod book;
mod chapter;
mod cli;
mod logging;
mod ocr;
mod timestamp;

use anyhow::{Context, Result};
use clap::Parser;
use ocr::TesseractEngine;
use std::fs;
use std::path::Path;

fn main() -> Result<()> {
    let cli = cli::Cli::parse();
    let _log_guard = logging::init(Path::new(logging::ERROR_LOG_FILE))?;

    fs::create_dir_all(&cli.output).with_context(|| {
        format!("Failed to create output directory: {}", cli.output.display())
    })?;

    let engine = TesseractEngine::new();
    let summary = if cli.book {
        book::process_book(&engine, &cli.input, &cli.output, cli.incremental)?
    } else {
        book::process_library(&engine, &cli.input, &cli.output, cli.incremental)?
    };

    eprintln!(
        "Processed {} chapters{} into {}",
        summary.processed,
        if summary.skipped > 0 {
            format!(" ({} skipped)", summary.skipped)
        } else {
            String::new()
        },
        cli.output.display()
    );

    Ok(())
}

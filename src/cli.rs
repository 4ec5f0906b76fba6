use clap::Parser;
use std::path::PathBuf;

/// OCR scanned page images into one text file per chapter
#[derive(Parser, Debug)]
#[command(name = "pagescan", version, about)]
pub struct Cli {
    /// Input directory laid out as `{book}/{chapter}/*.png`
    pub input: PathBuf,

    /// Output directory for `{book}-{chapter}.txt` files (created if missing)
    pub output: PathBuf,

    /// Disable incremental processing (process all chapters regardless of existing output)
    #[arg(long = "no-incremental", action = clap::ArgAction::SetFalse)]
    pub incremental: bool,

    /// Treat the input directory itself as one book (`{chapter}/*.png`)
    #[arg(long, default_value_t = false)]
    pub book: bool,
}

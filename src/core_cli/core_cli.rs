use clap::Parser;

/// Command-line arguments
#[derive(Parser, Debug)]
#[command(
    name = "ftpmirror",
    about = "Incremental FTP directory mirroring, written in Rust."
)]
pub struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "ftpmirror.toml")]
    pub config: String,

    /// Compare against the download history without transferring anything
    #[arg(long)]
    pub dry_run: bool,

    /// Enable verbose mode
    #[arg(short, long)]
    pub verbose: bool,
}

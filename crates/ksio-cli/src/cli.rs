use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "ksio",
    about = "Serialized keyed file I/O: ordered reads and writes per path",
    version,
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory keys are resolved against (overrides the config file)
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,
}

#[derive(Clone, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Print the text stored under a key
    Cat(CatArgs),
    /// Replace the text stored under a key
    Put(PutArgs),
    /// Issue many overlapping writes and reads to one key and verify ordering
    Stress(StressArgs),
    /// Print the effective configuration
    Config,
}

#[derive(Args)]
pub struct CatArgs {
    pub key: String,
    /// Text encoding (utf-8, utf-16le, utf-16be, ascii)
    #[arg(short, long)]
    pub encoding: Option<String>,
}

#[derive(Args)]
pub struct PutArgs {
    pub key: String,
    pub text: String,
    /// Text encoding (utf-8, utf-16le, utf-16be, ascii)
    #[arg(short, long)]
    pub encoding: Option<String>,
}

#[derive(Args)]
pub struct StressArgs {
    pub key: String,
    /// Number of writes to issue
    #[arg(short = 'n', long, default_value_t = 100)]
    pub writes: usize,
    /// Route every read through the chain instead of serving it from the last write
    #[arg(long)]
    pub strict: bool,
}

use std::str::FromStr;

use anyhow::Context;
use colored::Colorize;
use ksio_sdk::{Config, InlineDispatcher, SerialFiles};
use ksio_serializer::{ReadConsistency, SerializerStats};
use ksio_store::{FsBackend, StorageBackend};
use ksio_types::Encoding;
use serde_json::json;

use crate::cli::*;

type Files = SerialFiles<FsBackend, InlineDispatcher>;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let config = load_config(&cli)?;
    let runtime = tokio::runtime::Runtime::new().context("failed to start runtime")?;
    runtime.block_on(async move {
        match cli.command {
            Command::Cat(args) => cmd_cat(&config, args, &cli.format).await,
            Command::Put(args) => cmd_put(&config, args, &cli.format).await,
            Command::Stress(args) => cmd_stress(config, args, &cli.format).await,
            Command::Config => cmd_config(&config),
        }
    })
}

fn load_config(cli: &Cli) -> anyhow::Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("failed to load config {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(root) = &cli.root {
        config.storage.root = Some(root.clone());
    }
    Ok(config)
}

fn encoding(config: &Config, name: Option<&str>) -> anyhow::Result<Encoding> {
    match name {
        Some(name) => Ok(Encoding::from_str(name)?),
        None => Ok(config.text.default_encoding),
    }
}

fn open(config: &Config) -> anyhow::Result<Files> {
    Ok(SerialFiles::open(config, InlineDispatcher)?)
}

async fn cmd_cat(config: &Config, args: CatArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let encoding = encoding(config, args.encoding.as_deref())?;
    let files = open(config)?;
    let text = files
        .read_text(&args.key, encoding)?
        .await
        .with_context(|| format!("cannot read {}", args.key))?;
    match format {
        OutputFormat::Text => print!("{text}"),
        OutputFormat::Json => println!(
            "{}",
            json!({ "key": args.key, "encoding": encoding.name(), "text": text })
        ),
    }
    Ok(())
}

async fn cmd_put(config: &Config, args: PutArgs, format: &OutputFormat) -> anyhow::Result<()> {
    let encoding = encoding(config, args.encoding.as_deref())?;
    let files = open(config)?;
    let result = files.write_text(&args.key, &args.text, encoding)?.await;
    if let Some(err) = result.error {
        return Err(err).with_context(|| format!("cannot write {}", args.key));
    }
    match format {
        OutputFormat::Text => println!(
            "{} Wrote {} ({})",
            "✓".green().bold(),
            args.key.bold(),
            encoding.name().cyan()
        ),
        OutputFormat::Json => println!(
            "{}",
            json!({ "key": args.key, "encoding": encoding.name(), "success": true })
        ),
    }
    Ok(())
}

/// Outcome of one stress run.
#[derive(Debug)]
struct StressReport {
    failed_writes: usize,
    stale_reads: usize,
    stats: SerializerStats,
}

impl StressReport {
    fn passed(&self) -> bool {
        self.failed_writes == 0 && self.stale_reads == 0 && self.stats.live_chains == 0
    }
}

/// Submit `writes` write+read pairs to `key` before awaiting anything, then
/// count failed writes and reads that did not observe the write issued just
/// before them.
async fn run_stress<B: StorageBackend>(
    files: &SerialFiles<B, InlineDispatcher>,
    key: &str,
    writes: usize,
) -> anyhow::Result<StressReport> {
    let mut pending_writes = Vec::with_capacity(writes);
    let mut pending_reads = Vec::with_capacity(writes);
    for i in 0..writes {
        let payload = format!("write {i}");
        pending_writes.push(files.write_string(key, &payload)?);
        pending_reads.push((payload, files.read_string(key)?));
    }

    let mut failed_writes = 0usize;
    for write in pending_writes {
        if !write.await.success {
            failed_writes += 1;
        }
    }
    let mut stale_reads = 0usize;
    for (expected, read) in pending_reads {
        match read.await {
            Ok(text) if text == expected => {}
            _ => stale_reads += 1,
        }
    }
    files.serializer().quiesce().await;
    Ok(StressReport {
        failed_writes,
        stale_reads,
        stats: files.serializer().stats(),
    })
}

async fn cmd_stress(mut config: Config, args: StressArgs, format: &OutputFormat) -> anyhow::Result<()> {
    if args.strict {
        config.serializer.read_consistency = ReadConsistency::StrictChain;
    }
    let files = open(&config)?;
    let report = run_stress(&files, &args.key, args.writes).await?;
    let stats = report.stats;

    match format {
        OutputFormat::Text => {
            let mark = |n: usize| if n == 0 { n.to_string().green() } else { n.to_string().red() };
            println!("Stress on {} ({} writes)", args.key.bold(), args.writes);
            println!("  Failed writes: {}", mark(report.failed_writes));
            println!("  Stale reads:   {}", mark(report.stale_reads));
            println!("  Shadow hits:   {}", stats.shadow_hits.to_string().cyan());
            println!("  Submitted:     {}", stats.submitted);
            println!("  Completed:     {}", stats.completed);
            println!("  Live chains:   {}", mark(stats.live_chains));
        }
        OutputFormat::Json => println!(
            "{}",
            json!({
                "key": args.key,
                "writes": args.writes,
                "failed_writes": report.failed_writes,
                "stale_reads": report.stale_reads,
                "stats": stats,
            })
        ),
    }

    if !report.passed() {
        anyhow::bail!("ordering check failed for {}", args.key);
    }
    Ok(())
}

fn cmd_config(config: &Config) -> anyhow::Result<()> {
    print!("{}", config.to_toml_string()?);
    Ok(())
}

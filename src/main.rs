//! Command-line front end for the remote ZIP engine.

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::AsyncWriteExt;

use remotezip::cli::{Cli, Command};
use remotezip::{EngineConfig, LocalDirStore, Materializer, Payload, RemoteZip, RemoteZipError};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .or_else(|_| tracing_subscriber::EnvFilter::try_new(&cli.log_level))
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = cli.engine.to_config();
    if let Command::Materialize {
        time_budget: Some(secs),
        ..
    } = &cli.command
    {
        config.time_budget = Some(Duration::from_secs(*secs));
    }

    match run(&cli, config).await {
        Ok(()) => Ok(()),
        Err(e) => {
            if let Some(err) = e.downcast_ref::<RemoteZipError>() {
                let envelope = serde_json::json!({
                    "error": err.reason_code(),
                    "message": err.to_string(),
                    "similarPaths": err.similar_paths(),
                });
                eprintln!("{}", envelope);
            }
            Err(e)
        }
    }
}

async fn run(cli: &Cli, config: EngineConfig) -> Result<()> {
    let engine = Arc::new(RemoteZip::new(config).context("failed to set up HTTP client")?);

    match &cli.command {
        Command::Index { url, entries } => {
            if *entries {
                let index = engine.index(url).await?;
                print_json(&serde_json::json!({
                    "summary": index.summary(),
                    "entries": index.entries(),
                }))
            } else {
                print_json(&engine.build_index(url).await?)
            }
        }
        Command::List { url, verbose } => list_entries(&engine, url, *verbose).await,
        Command::Fetch {
            url,
            path,
            response_type,
            output,
        } => {
            let fetched = engine.fetch_entry(url, path, *response_type).await?;
            if let Payload::Binary { bytes, .. } = &fetched.payload {
                match output {
                    Some(file) => tokio::fs::write(file, bytes)
                        .await
                        .with_context(|| format!("failed to write {}", file.display()))?,
                    None => {
                        let mut stdout = tokio::io::stdout();
                        stdout.write_all(bytes).await?;
                        stdout.flush().await?;
                    }
                }
                eprintln!("{}", serde_json::to_string(&fetched)?);
                return Ok(());
            }
            print_json(&fetched)
        }
        Command::Batch {
            url,
            paths,
            response_type,
        } => print_json(&engine.fetch_entries_batch(url, paths, *response_type).await?),
        Command::Materialize {
            url,
            archive_id,
            out,
            base_url,
            ..
        } => {
            let mut store = LocalDirStore::new(out);
            if let Some(base_url) = base_url {
                store = store.with_base_url(base_url.clone());
            }
            let filter = cli.command.entry_filter().unwrap_or_default();
            let materializer = Materializer::new(Arc::clone(&engine), Arc::new(store));
            let outcome = materializer.materialize(archive_id, url, &filter).await?;
            print_json(&outcome)
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print entry names, or a table with sizes, compression ratio and
/// timestamps when `verbose` is set.
async fn list_entries(engine: &RemoteZip, url: &str, verbose: bool) -> Result<()> {
    let index = engine.index(url).await?;

    if !verbose {
        for entry in index.entries() {
            println!("{}", entry.path);
        }
        return Ok(());
    }

    println!(
        "{:>10}  {:>10}  {:>5}  {:>10}  {:>5}  Name",
        "Length", "Size", "Cmpr", "Date", "Time"
    );
    println!("{}", "-".repeat(70));

    let mut total_uncompressed = 0u64;
    let mut total_compressed = 0u64;
    let mut file_count = 0usize;

    for entry in index.entries() {
        let (year, month, day) = entry.mod_date();
        let (hour, minute, _second) = entry.mod_time();
        println!(
            "{:>10}  {:>10}  {}  {:04}-{:02}-{:02}  {:02}:{:02}  {}",
            entry.uncompressed_size,
            entry.compressed_size,
            ratio(entry.compressed_size, entry.uncompressed_size),
            year,
            month,
            day,
            hour,
            minute,
            entry.path
        );

        if !entry.is_directory {
            total_uncompressed += entry.uncompressed_size;
            total_compressed += entry.compressed_size;
            file_count += 1;
        }
    }

    println!("{}", "-".repeat(70));
    println!(
        "{:>10}  {:>10}  {}  {:>21}  {} files",
        total_uncompressed,
        total_compressed,
        ratio(total_compressed, total_uncompressed),
        "",
        file_count
    );

    let location = index.location();
    eprintln!(
        "\nArchive size: {}, central directory: {}{}",
        format_size(index.handle().size),
        format_size(location.cd_size),
        if location.zip64 { " (ZIP64)" } else { "" }
    );
    Ok(())
}

/// Space saved by compression, as a right-aligned percentage.
fn ratio(compressed: u64, uncompressed: u64) -> String {
    if uncompressed > 0 && compressed <= uncompressed {
        format!("{:>4}%", 100 - (compressed * 100 / uncompressed))
    } else {
        "  0%".to_string()
    }
}

/// Format a byte size with the largest fitting unit.
fn format_size(size: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;
    const GB: u64 = MB * 1024;

    if size >= GB {
        format!("{:.2} GB", size as f64 / GB as f64)
    } else if size >= MB {
        format!("{:.2} MB", size as f64 / MB as f64)
    } else if size >= KB {
        format!("{:.2} KB", size as f64 / KB as f64)
    } else {
        format!("{} bytes", size)
    }
}

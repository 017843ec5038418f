use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

use crate::config::{self, EngineConfig};
use crate::materialize::EntryFilter;
use crate::payload::ResponseType;

#[derive(Parser, Debug)]
#[command(name = "remotezip")]
#[command(version)]
#[command(about = "Random access to entries of remote ZIP archives over HTTP Range requests", long_about = None)]
#[command(after_help = "Examples:\n  \
  remotezip index https://example.com/takeout.zip\n  \
  remotezip list -v https://example.com/takeout.zip\n  \
  remotezip fetch https://example.com/takeout.zip a/b.html\n  \
  remotezip materialize https://example.com/takeout.zip --archive-id ig-1 --out ./blobs")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    #[command(flatten)]
    pub engine: EngineArgs,

    /// Log filter (error, warn, info, debug, trace or a full directive)
    #[arg(long, global = true, env = "REMOTEZIP_LOG", default_value = "warn")]
    pub log_level: String,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Build the entry index and print its summary
    Index {
        /// ZIP file path or HTTP URL
        url: String,

        /// Include every entry descriptor in the output
        #[arg(long)]
        entries: bool,
    },

    /// List entries
    List {
        url: String,

        /// Table with sizes, compression ratio and timestamps
        #[arg(short, long)]
        verbose: bool,
    },

    /// Fetch and decode a single entry
    Fetch {
        url: String,

        /// Entry path inside the archive
        path: String,

        #[arg(long = "type", value_enum, default_value = "text")]
        response_type: ResponseType,

        /// Write binary payloads to this file instead of stdout
        #[arg(short, long, value_name = "FILE")]
        output: Option<PathBuf>,
    },

    /// Fetch several entries with one index lookup
    Batch {
        url: String,

        #[arg(required = true, value_name = "PATHS")]
        paths: Vec<String>,

        #[arg(long = "type", value_enum, default_value = "text")]
        response_type: ResponseType,
    },

    /// Extract a filtered set of entries into a directory and write a manifest
    Materialize {
        url: String,

        /// Identifier used in storage keys
        #[arg(long)]
        archive_id: String,

        /// Storage root directory
        #[arg(long, value_name = "DIR")]
        out: PathBuf,

        /// Public URL prefix reported for stored objects
        #[arg(long)]
        base_url: Option<String>,

        /// Extensions to include (default: text-like files)
        #[arg(long = "ext", value_delimiter = ',', conflicts_with = "all")]
        extensions: Vec<String>,

        /// Include every file regardless of extension
        #[arg(long)]
        all: bool,

        /// Only entries under this path prefix
        #[arg(long)]
        prefix: Option<String>,

        /// Stop starting new work after this many seconds
        #[arg(long, value_name = "SECS", env = "REMOTEZIP_TIME_BUDGET")]
        time_budget: Option<u64>,
    },
}

/// Engine tuning shared by every subcommand.
#[derive(Args, Debug)]
pub struct EngineArgs {
    /// Bytes read from the end of the archive to find the central directory
    #[arg(long, global = true, env = "REMOTEZIP_TAIL_SIZE")]
    pub tail_size: Option<u64>,

    /// Largest uncompressed entry that will be extracted, in bytes
    #[arg(long, global = true, env = "REMOTEZIP_MAX_ENTRY_SIZE")]
    pub max_entry_size: Option<u64>,

    /// Concurrent extractions per materialization group
    #[arg(long, global = true, env = "REMOTEZIP_CONCURRENCY")]
    pub concurrency: Option<usize>,

    /// Most paths accepted by one batch call
    #[arg(long, global = true, env = "REMOTEZIP_BATCH_LIMIT")]
    pub batch_limit: Option<usize>,

    /// HTTP request timeout in seconds
    #[arg(long, global = true, env = "REMOTEZIP_TIMEOUT")]
    pub timeout: Option<u64>,

    /// Retries for connect and timeout failures
    #[arg(long, global = true, env = "REMOTEZIP_MAX_RETRY")]
    pub max_retry: Option<u32>,

    /// Wider tail scan for damaged archives
    #[arg(long, global = true)]
    pub diagnostic: bool,
}

impl EngineArgs {
    pub fn to_config(&self) -> EngineConfig {
        let mut config = if self.diagnostic {
            EngineConfig::diagnostic()
        } else {
            EngineConfig::default()
        };
        if let Some(tail_size) = self.tail_size {
            config.tail_size = tail_size.max(config::MIN_TAIL_SIZE);
        }
        if let Some(limit) = self.max_entry_size {
            config.max_entry_size = limit;
        }
        if let Some(n) = self.concurrency {
            config.materialize_concurrency = n.max(1);
        }
        if let Some(n) = self.batch_limit {
            config.batch_limit = n;
        }
        if let Some(secs) = self.timeout {
            config.http_timeout = Duration::from_secs(secs);
        }
        if let Some(n) = self.max_retry {
            config.max_retry = n;
        }
        config
    }
}

impl Command {
    /// Entry filter for `materialize`; `None` for other commands.
    pub fn entry_filter(&self) -> Option<EntryFilter> {
        let Command::Materialize {
            extensions,
            all,
            prefix,
            ..
        } = self
        else {
            return None;
        };
        let filter = if *all {
            EntryFilter::all()
        } else if extensions.is_empty() {
            EntryFilter::text()
        } else {
            EntryFilter::extensions(extensions)
        };
        Some(match prefix {
            Some(prefix) => filter.with_prefix(prefix.clone()),
            None => filter,
        })
    }
}

//! # remotezip
//!
//! Random access to entries of very large ZIP archives served over HTTP,
//! without downloading the archive.
//!
//! The archive tail is fetched with a Range request to locate the central
//! directory (ZIP64 included), the central directory is parsed into an
//! in-memory index, and each requested entry is then fetched as a single
//! byte range and decompressed on demand. A materialization run extracts a
//! filtered set of entries into a blob store and writes a manifest.
//!
//! ## Example
//!
//! ```no_run
//! use remotezip::{EngineConfig, RemoteZip, ResponseType};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = RemoteZip::new(EngineConfig::default())?;
//!
//!     let summary = engine.build_index("https://example.com/takeout.zip").await?;
//!     println!("{} entries", summary.entry_count);
//!
//!     let entry = engine
//!         .fetch_entry("https://example.com/takeout.zip", "a/b.html", ResponseType::Text)
//!         .await?;
//!     println!("{} bytes fetched", entry.stats.bytes_fetched);
//!
//!     Ok(())
//! }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod index;
pub mod io;
pub mod materialize;
pub mod payload;
pub mod service;
pub mod zip;

pub use cli::Cli;
pub use config::EngineConfig;
pub use error::{RemoteZipError, Result};
pub use index::{ArchiveIndex, IndexCache, IndexSummary, NoopIndexCache, TtlIndexCache};
pub use io::{ArchiveHandle, ArchiveOpener, DefaultOpener, HttpRangeReader, LocalFileReader, ReadAt};
pub use materialize::{
    BlobStore, EntryFilter, LocalDirStore, MaterializationManifest, MaterializeOutcome, Materializer,
    MemoryStore,
};
pub use payload::{Payload, ResponseType};
pub use service::{BatchResult, FetchedEntry, RemoteZip};
pub use zip::{EntryDescriptor, ZipExtractor, ZipParser};

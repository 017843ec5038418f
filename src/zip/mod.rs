//! ZIP archive parsing and extraction over random-access readers.
//!
//! ## Architecture
//!
//! - [`locator`]: finds the End of Central Directory record (and its ZIP64
//!   counterpart) in the archive tail
//! - [`central_directory`]: turns central directory bytes into entry descriptors
//! - [`ZipParser`]: builds the archive index and resolves local headers
//! - [`ZipExtractor`]: fetches and decompresses single entries
//!
//! Only the tail, the central directory and the byte ranges of requested
//! entries are ever read, which keeps remote access to a handful of range
//! requests.
//!
//! ## Limitations
//!
//! - STORED and DEFLATE only
//! - No encryption, no multi-disk archives

pub mod central_directory;
mod cursor;
mod extractor;
pub mod locator;
mod parser;
mod structures;

pub use central_directory::{CentralDirectoryScan, ScanStop, parse_central_directory};
pub use cursor::ByteCursor;
pub use extractor::{ExtractedBytes, ZipExtractor};
pub use locator::{CentralDirectoryLocation, find_eocd, locate_central_directory};
pub use parser::ZipParser;
pub use structures::*;

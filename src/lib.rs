//! # imgfs — single-file JPEG image store
//!
//! Format guarantees (frozen in v1):
//! - All numeric fields are little-endian, serialized field by field;
//!   the file is portable across hosts
//! - Fixed layout: 64-byte header at offset 0, then `max_files` 208-byte
//!   metadata entries, then the append-only blob region
//! - Blob bytes are written once and never moved, rewritten, or freed
//! - Originals are deduplicated by SHA-256; one blob serves every entry
//!   with the same content
//! - THUMB and SMALL variants are materialized lazily on first read and
//!   shared between same-content entries
//! - `version` increases strictly on every insert/delete and never
//!   otherwise; variant materialization is invisible to it
//! - Every mutation is written through; file and memory agree at every
//!   operation boundary

pub mod error;
pub mod header;
pub mod metadata;
pub mod codec;
pub mod store;
pub mod http;
pub mod server;

// Flat re-exports for the most common types.
pub use error::ImgFsError;
pub use header::{StoreHeader, HEADER_SIZE};
pub use metadata::{ImgMetadata, Resolution, ENTRY_SIZE, MAX_IMG_ID};
pub use codec::{ImageCodec, JpegCodec};
pub use store::{CreateOptions, ImgFs, ListMode};
pub use server::{Server, DEFAULT_PORT};

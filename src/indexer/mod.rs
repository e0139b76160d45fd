//! Text chunking for file content and diff text
//!
//! Splits text into bounded, overlapping character windows tagged with their
//! position so each window can be embedded and stored as its own point.

mod chunker;

pub use chunker::{TextChunk, TextChunker};

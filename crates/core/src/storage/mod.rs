//! Storage layer: the exact record store and binary index files.
//!
//! Records live in-memory in an [`ExactStore`]. Durability is a single
//! CRC32-footed bincode file per index, written with atomic temp-file + rename.

/// Authoritative id → vector map with brute-force top-k ranking.
pub mod exact;
/// Index file encode/decode with checksum verification.
pub mod persistence;

pub use exact::{ExactStore, Neighbor};
pub use persistence::{decode_index, encode_index, read_index, write_atomic, DecodedIndex};

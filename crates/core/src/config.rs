//! Configuration for lshdb.
//!
//! Tuning defaults, input validation limits, and on-disk format markers are
//! compile-time constants. Per-index parameters live in [`IndexConfig`], which
//! is fixed when an index is constructed and carried through save/load.

use crate::error::{IndexError, IndexResult};
use serde::{Deserialize, Serialize};

/// Default embedding dimension (ResNet-style image features).
pub const DEFAULT_DIMENSION: usize = 512;

/// Default number of independent hash tables.
///
/// More tables raise recall at the cost of memory and query time.
pub const DEFAULT_NUM_TABLES: usize = 8;

/// Default number of hyperplanes (signature bits) per table.
///
/// More bits produce smaller, more selective buckets. Typical range: 8–24.
pub const DEFAULT_NUM_BITS: usize = 16;

/// Seed used for hyperplane generation when none is given.
pub const DEFAULT_SEED: u64 = 0x5eed_1ca1_b0c5_u64;

/// Largest dimension an index file can describe. The header stores it as `u32`.
pub const MAX_DIMENSION: usize = u32::MAX as usize;

/// Maximum number of hash tables per index.
pub const MAX_NUM_TABLES: usize = 64;

/// Maximum signature width. Bucket keys are `u32`.
pub const MAX_NUM_BITS: usize = 32;

/// Magic bytes at the start of every index file.
pub const FILE_MAGIC: &[u8; 4] = b"LSHV";

/// Current index file format version.
pub const FORMAT_VERSION: u32 = 1;

/// Magic bytes preceding the CRC32 footer of an index file.
pub const FOOTER_MAGIC: &[u8; 4] = b"LCR1";

/// Parameters fixed for the lifetime of a vector index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexConfig {
    /// Length of every stored and queried vector.
    pub dimension: usize,
    /// Number of independent hash tables.
    pub num_tables: usize,
    /// Hyperplanes per table; each contributes one bit to the bucket key.
    pub num_bits: usize,
    /// Seed for hyperplane generation.
    #[serde(default = "default_seed")]
    pub seed: u64,
}

fn default_seed() -> u64 {
    DEFAULT_SEED
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            dimension: DEFAULT_DIMENSION,
            num_tables: DEFAULT_NUM_TABLES,
            num_bits: DEFAULT_NUM_BITS,
            seed: DEFAULT_SEED,
        }
    }
}

impl IndexConfig {
    /// Creates a config with the default seed.
    pub fn new(dimension: usize, num_tables: usize, num_bits: usize) -> Self {
        Self {
            dimension,
            num_tables,
            num_bits,
            seed: DEFAULT_SEED,
        }
    }

    /// Returns a copy with a different hyperplane seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Checks every parameter against its allowed range.
    pub fn validate(&self) -> IndexResult<()> {
        if self.dimension == 0 || self.dimension > MAX_DIMENSION {
            return Err(IndexError::InvalidArgument(format!(
                "dimension must be in 1..={}, got {}",
                MAX_DIMENSION, self.dimension
            )));
        }
        if self.num_tables == 0 || self.num_tables > MAX_NUM_TABLES {
            return Err(IndexError::InvalidArgument(format!(
                "num_tables must be in 1..={}, got {}",
                MAX_NUM_TABLES, self.num_tables
            )));
        }
        if self.num_bits == 0 || self.num_bits > MAX_NUM_BITS {
            return Err(IndexError::InvalidArgument(format!(
                "num_bits must be in 1..={}, got {}",
                MAX_NUM_BITS, self.num_bits
            )));
        }
        let arena = self
            .dimension
            .checked_mul(self.num_tables)
            .and_then(|n| n.checked_mul(self.num_bits));
        if arena.is_none() {
            return Err(IndexError::InvalidArgument(format!(
                "hyperplane arena of {} x {} x {} overflows usize",
                self.num_tables, self.num_bits, self.dimension
            )));
        }
        Ok(())
    }
}

//! Random-hyperplane hash family.
//!
//! [`Hasher`] owns `num_tables × num_bits` hyperplanes of length `dim`, stored
//! contiguously in a `[table][bit][dim]` arena. A vector's signature in a table
//! packs one sign bit per hyperplane: bit `j` is set when the dot product with
//! hyperplane `j` is non-negative.

use crate::distance::dot;
use crate::error::{IndexError, IndexResult};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rand_distr::{Distribution, StandardNormal};

/// Immutable set of projection planes for every table of an index.
#[derive(Debug, Clone, PartialEq)]
pub struct Hasher {
    dim: usize,
    num_tables: usize,
    num_bits: usize,
    planes: Vec<f32>,
}

impl Hasher {
    /// Generates standard-normal hyperplanes from `seed`.
    pub fn generate(dim: usize, num_tables: usize, num_bits: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let len = num_tables * num_bits * dim;
        let planes: Vec<f32> = (0..len)
            .map(|_| -> f32 { StandardNormal.sample(&mut rng) })
            .collect();
        Self {
            dim,
            num_tables,
            num_bits,
            planes,
        }
    }

    /// Rebuilds a hasher from explicit hyperplane values.
    pub fn from_planes(
        dim: usize,
        num_tables: usize,
        num_bits: usize,
        planes: Vec<f32>,
    ) -> IndexResult<Self> {
        let expected = num_tables * num_bits * dim;
        if planes.len() != expected {
            return Err(IndexError::format(format!(
                "hyperplane arena length {} != num_tables({}) * num_bits({}) * dim({})",
                planes.len(),
                num_tables,
                num_bits,
                dim
            )));
        }
        if planes.iter().any(|p| !p.is_finite()) {
            return Err(IndexError::format("hyperplane contains a non-finite value"));
        }
        Ok(Self {
            dim,
            num_tables,
            num_bits,
            planes,
        })
    }

    pub fn dim(&self) -> usize {
        self.dim
    }

    pub fn num_tables(&self) -> usize {
        self.num_tables
    }

    pub fn num_bits(&self) -> usize {
        self.num_bits
    }

    /// The raw hyperplane arena, `[table][bit][dim]`.
    pub fn planes(&self) -> &[f32] {
        &self.planes
    }

    /// Hyperplane `bit` of table `table`. O(1) slice into the arena.
    #[inline]
    fn plane(&self, table: usize, bit: usize) -> &[f32] {
        let start = (table * self.num_bits + bit) * self.dim;
        &self.planes[start..start + self.dim]
    }

    /// Bucket key of `vector` in one table.
    pub fn signature(&self, vector: &[f32], table: usize) -> IndexResult<u32> {
        IndexError::check_dimension(self.dim, vector.len())?;
        if table >= self.num_tables {
            return Err(IndexError::InvalidArgument(format!(
                "table index {} out of range (num_tables={})",
                table, self.num_tables
            )));
        }
        Ok(self.signature_unchecked(vector, table))
    }

    /// Bucket keys of `vector` in every table, in table order.
    pub fn signatures(&self, vector: &[f32]) -> IndexResult<Vec<u32>> {
        IndexError::check_dimension(self.dim, vector.len())?;
        Ok((0..self.num_tables)
            .map(|table| self.signature_unchecked(vector, table))
            .collect())
    }

    #[inline]
    fn signature_unchecked(&self, vector: &[f32], table: usize) -> u32 {
        let mut key = 0u32;
        for bit in 0..self.num_bits {
            if dot(self.plane(table, bit), vector) >= 0.0 {
                key |= 1 << bit;
            }
        }
        key
    }
}

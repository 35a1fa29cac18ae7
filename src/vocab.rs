//! Token dictionary view and the embedding table it indexes.
//!
//! The dictionary itself is built by an external pipeline; this module only
//! wraps it read-only and pairs it with an immutable [`VectorTable`]. The
//! table carries exactly one extra trailing row for unknown tokens, appended
//! once at build time and never mutated afterwards.

use std::collections::HashMap;

use candle_core::{Device, Tensor};
use rand::rngs::StdRng;
use rand_distr::{Distribution, StandardNormal};

use crate::error::MatchError;

/// Read-only token → id mapping. Ids are dense and 0-based.
#[derive(Debug, Clone, Default)]
pub struct Vocabulary {
    index: HashMap<String, usize>,
}

impl Vocabulary {
    /// Wraps an externally built mapping.
    pub fn new(index: HashMap<String, usize>) -> Self {
        Self { index }
    }

    /// Builds a mapping by assigning dense ids in iteration order.
    ///
    /// Duplicate tokens keep their first id.
    pub fn from_tokens<I, S>(tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut index = HashMap::new();
        for token in tokens {
            let next = index.len();
            index.entry(token.into()).or_insert(next);
        }
        Self { index }
    }

    /// Id of `token`, or `None` when absent from the dictionary.
    pub fn id(&self, token: &str) -> Option<usize> {
        self.index.get(token).copied()
    }

    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Embedding rows index-aligned with [`Vocabulary`] ids, plus one reserved
/// trailing row for unknown tokens.
///
/// Invariant: `rows() == vocabulary len + 1`, every row `dim()` wide. The
/// table never carries gradients; the encoder treats it as a constant.
#[derive(Debug, Clone)]
pub struct VectorTable {
    data: Vec<f32>,
    dim: usize,
    rows: usize,
}

impl VectorTable {
    /// Builds the table from dictionary-aligned vectors, appending the
    /// reserved unknown row as a standard-normal draw from `rng`.
    pub fn build(
        vocab: &Vocabulary,
        vectors: Vec<Vec<f32>>,
        rng: &mut StdRng,
    ) -> Result<Self, MatchError> {
        if vectors.is_empty() {
            return Err(MatchError::ShapeMismatch {
                reason: "vector table must contain at least one row".to_string(),
            });
        }
        if vectors.len() != vocab.len() {
            return Err(MatchError::ShapeMismatch {
                reason: format!(
                    "vector table has {} rows but the vocabulary has {} entries",
                    vectors.len(),
                    vocab.len()
                ),
            });
        }
        if let Some(&bad) = vocab.index.values().find(|&&id| id >= vectors.len()) {
            return Err(MatchError::ShapeMismatch {
                reason: format!(
                    "vocabulary id {bad} exceeds the vector table ({} rows)",
                    vectors.len()
                ),
            });
        }

        let dim = vectors[0].len();
        if dim == 0 {
            return Err(MatchError::ShapeMismatch {
                reason: "vector dimension must be greater than zero".to_string(),
            });
        }

        let rows = vectors.len() + 1;
        let mut data = Vec::with_capacity(rows * dim);
        for (i, row) in vectors.iter().enumerate() {
            if row.len() != dim {
                return Err(MatchError::ShapeMismatch {
                    reason: format!(
                        "vector row {i} has dimension {} (expected {dim})",
                        row.len()
                    ),
                });
            }
            data.extend_from_slice(row);
        }

        let normal = StandardNormal;
        for _ in 0..dim {
            let v: f32 = normal.sample(rng);
            data.push(v);
        }

        Ok(Self { data, dim, rows })
    }

    /// Number of rows, the reserved unknown row included.
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// Width of every row.
    pub fn dim(&self) -> usize {
        self.dim
    }

    /// Id of the reserved unknown row (always the last).
    pub fn unknown_id(&self) -> usize {
        self.rows - 1
    }

    /// Padding id; padded positions reuse the unknown row.
    pub fn pad_id(&self) -> usize {
        self.unknown_id()
    }

    /// Resolves a token to its table row, falling back to the unknown row
    /// for out-of-vocabulary tokens.
    pub fn resolve(&self, vocab: &Vocabulary, token: &str) -> usize {
        vocab.id(token).unwrap_or_else(|| self.unknown_id())
    }

    /// One row's values (for inspection and tests).
    pub fn row(&self, id: usize) -> Option<&[f32]> {
        if id >= self.rows {
            return None;
        }
        Some(&self.data[id * self.dim..(id + 1) * self.dim])
    }

    /// Uploads the table as a plain `[rows, dim]` f32 tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor, MatchError> {
        Ok(Tensor::from_vec(
            self.data.clone(),
            (self.rows, self.dim),
            device,
        )?)
    }
}

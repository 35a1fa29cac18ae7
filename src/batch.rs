//! Padded token-id batches with true-length bookkeeping.
//!
//! A batch is validated entirely at construction: every row shares one max
//! length, true lengths are positive and within bounds, and padded positions
//! hold the pad id. Downstream code (encoder, matchers) can rely on those
//! invariants without re-checking.

use candle_core::{Device, Tensor};

use crate::error::MatchError;
use crate::vocab::{VectorTable, Vocabulary};

/// One side (query or candidate) of a minibatch: `N` padded id rows plus the
/// true length of each row.
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    ids: Vec<u32>,
    lengths: Vec<usize>,
    max_len: usize,
    pad_id: u32,
}

impl SequenceBatch {
    /// Maps raw token sequences through the dictionary and pads them to the
    /// set's max length. Unknown tokens resolve to the table's reserved slot;
    /// padding reuses the same slot.
    pub fn build<S: AsRef<str>>(
        sequences: &[Vec<S>],
        vocab: &Vocabulary,
        table: &VectorTable,
    ) -> Result<Self, MatchError> {
        if sequences.is_empty() {
            return Err(MatchError::ShapeMismatch {
                reason: "batch must contain at least one sequence".to_string(),
            });
        }
        if let Some(row) = sequences.iter().position(|s| s.is_empty()) {
            return Err(MatchError::EmptySequence { row });
        }

        let max_len = sequences.iter().map(|s| s.len()).max().unwrap_or(0);
        let pad_id = table.pad_id() as u32;

        let mut ids = Vec::with_capacity(sequences.len() * max_len);
        let mut lengths = Vec::with_capacity(sequences.len());
        for seq in sequences {
            lengths.push(seq.len());
            for token in seq {
                ids.push(table.resolve(vocab, token.as_ref()) as u32);
            }
            ids.resize(ids.len() + (max_len - seq.len()), pad_id);
        }

        Ok(Self {
            ids,
            lengths,
            max_len,
            pad_id,
        })
    }

    /// Wraps pre-padded id rows, validating the batch invariants.
    pub fn from_ids(
        rows: Vec<Vec<u32>>,
        lengths: Vec<usize>,
        pad_id: u32,
    ) -> Result<Self, MatchError> {
        if rows.is_empty() {
            return Err(MatchError::ShapeMismatch {
                reason: "batch must contain at least one sequence".to_string(),
            });
        }
        if lengths.len() != rows.len() {
            return Err(MatchError::ShapeMismatch {
                reason: format!(
                    "{} rows but {} lengths",
                    rows.len(),
                    lengths.len()
                ),
            });
        }

        let max_len = rows[0].len();
        if max_len == 0 {
            return Err(MatchError::EmptySequence { row: 0 });
        }

        for (row, ids) in rows.iter().enumerate() {
            if ids.len() != max_len {
                return Err(MatchError::ShapeMismatch {
                    reason: format!(
                        "row {row} has {} columns (expected {max_len})",
                        ids.len()
                    ),
                });
            }
            let length = lengths[row];
            if length == 0 {
                return Err(MatchError::EmptySequence { row });
            }
            if length > max_len {
                return Err(MatchError::ShapeMismatch {
                    reason: format!("row {row} claims length {length} > max length {max_len}"),
                });
            }
            if ids[length..].iter().any(|&id| id != pad_id) {
                return Err(MatchError::ShapeMismatch {
                    reason: format!("row {row} has non-pad entries beyond its true length"),
                });
            }
        }

        Ok(Self {
            ids: rows.into_iter().flatten().collect(),
            lengths,
            max_len,
            pad_id,
        })
    }

    /// Number of sequences in the batch.
    pub fn len(&self) -> usize {
        self.lengths.len()
    }

    /// Always false; an empty batch cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.lengths.is_empty()
    }

    /// Shared padded length of every row.
    pub fn max_len(&self) -> usize {
        self.max_len
    }

    /// True (pre-padding) length of each row.
    pub fn lengths(&self) -> &[usize] {
        &self.lengths
    }

    pub fn pad_id(&self) -> u32 {
        self.pad_id
    }

    /// One padded row of ids.
    pub fn row(&self, i: usize) -> &[u32] {
        &self.ids[i * self.max_len..(i + 1) * self.max_len]
    }

    /// A contiguous window of `count` rows starting at `start`, for
    /// minibatch iteration. The window keeps the parent's max length.
    pub fn slice(&self, start: usize, count: usize) -> Result<SequenceBatch, MatchError> {
        let end = start
            .checked_add(count)
            .filter(|&end| end <= self.len() && count > 0)
            .ok_or_else(|| MatchError::ShapeMismatch {
                reason: format!(
                    "window [{start}, {start}+{count}) out of bounds for batch of {}",
                    self.len()
                ),
            })?;

        Ok(Self {
            ids: self.ids[start * self.max_len..end * self.max_len].to_vec(),
            lengths: self.lengths[start..end].to_vec(),
            max_len: self.max_len,
            pad_id: self.pad_id,
        })
    }

    /// Uploads the padded ids as a `[N, max_len]` u32 tensor.
    pub fn to_tensor(&self, device: &Device) -> Result<Tensor, MatchError> {
        Ok(Tensor::from_vec(
            self.ids.clone(),
            (self.len(), self.max_len),
            device,
        )?)
    }
}

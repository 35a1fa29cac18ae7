//! In-batch negative sampling and the contrastive training objective.

use candle_core::{D, Tensor};
use candle_nn::ops::log_softmax;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use super::{Matcher, clamped_norms};
use crate::error::MatchError;

/// Training-mode matcher. Each call augments the candidate batch with K
/// cyclically rotated copies so every query sees its true pairing plus K
/// in-batch negatives, then scores the aligned rows with smoothed cosine.
#[derive(Debug)]
pub struct TrainingMatcher {
    negative_samples: usize,
    gamma: f64,
    rng: StdRng,
}

impl TrainingMatcher {
    pub fn new(negative_samples: usize, gamma: f64, seed: u64) -> Self {
        Self {
            negative_samples,
            gamma,
            rng: StdRng::seed_from_u64(seed),
        }
    }

    pub fn negative_samples(&self) -> usize {
        self.negative_samples
    }

    /// Rotation offset for one negative block. The draw spans `[0, batch]`
    /// and wraps at `batch`, where rotation degenerates to identity.
    fn rotation_offset(&mut self, block: usize, batch: usize) -> usize {
        let unit: f64 = self.rng.gen_range(0.0..1.0);
        let raw = ((unit + block as f64) * batch as f64 / self.negative_samples as f64) as usize;
        raw % batch
    }

    /// Stacks the candidates with K rotated copies into `[(K+1)·B, H]`.
    /// Row `i` of block `j >= 1` holds candidate `(offset_j + i) mod B`, so
    /// each block is a permutation of the originals.
    pub(crate) fn augment(&mut self, candidates: &Tensor) -> Result<Tensor, MatchError> {
        let (batch, _) = candidates.dims2()?;

        let mut blocks = Vec::with_capacity(self.negative_samples + 1);
        blocks.push(candidates.clone());
        for block in 0..self.negative_samples {
            let offset = self.rotation_offset(block, batch);
            if offset == 0 {
                blocks.push(candidates.clone());
            } else {
                let tail = candidates.narrow(0, offset, batch - offset)?;
                let head = candidates.narrow(0, 0, offset)?;
                blocks.push(Tensor::cat(&[tail, head], 0)?);
            }
        }

        Ok(Tensor::cat(&blocks, 0)?)
    }
}

impl Matcher for TrainingMatcher {
    /// Returns `[B, K+1]` smoothed cosine where column 0 scores each query
    /// against its true pairing and columns `1..=K` against rotated
    /// negatives.
    fn similarities(
        &mut self,
        queries: &Tensor,
        candidates: &Tensor,
    ) -> Result<Tensor, MatchError> {
        let query_dims = queries.dims2()?;
        let candidate_dims = candidates.dims2()?;
        if query_dims != candidate_dims {
            return Err(MatchError::ShapeMismatch {
                reason: format!(
                    "query states {query_dims:?} and candidate states {candidate_dims:?} must align row for row in training mode"
                ),
            });
        }

        let (batch, _) = query_dims;
        let block_count = self.negative_samples + 1;

        let augmented = self.augment(candidates)?;
        let tiled = Tensor::cat(&vec![queries.clone(); block_count], 0)?;

        let products = tiled.mul(&augmented)?.sum_keepdim(1)?;
        let query_norms = Tensor::cat(&vec![clamped_norms(queries)?; block_count], 0)?;
        let norms = (query_norms * clamped_norms(&augmented)?)?;
        let cosine = products.div(&norms)?;

        Ok(cosine
            .reshape((block_count, batch))?
            .t()?
            .affine(self.gamma, 0.0)?)
    }
}

/// Softmax contrastive loss: the mean negative log-probability of column 0,
/// the true pairing, across the batch.
pub fn contrastive_loss(similarities: &Tensor) -> Result<Tensor, MatchError> {
    let log_probs = log_softmax(similarities, D::Minus1)?;
    Ok(log_probs.narrow(1, 0, 1)?.mean_all()?.neg()?)
}

/// Fraction of rows whose highest-scoring column is the true pairing.
pub fn accuracy(similarities: &Tensor) -> Result<f32, MatchError> {
    let (rows, _) = similarities.dims2()?;
    let winners = similarities.argmax(D::Minus1)?.to_vec1::<u32>()?;
    let hits = winners.iter().filter(|&&winner| winner == 0).count();
    Ok(hits as f32 / rows as f32)
}

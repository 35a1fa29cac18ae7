//! Similarity scoring over encoded states.
//!
//! Two matcher variants sit behind one capability trait: the training
//! variant samples in-batch negatives and scores each query against its
//! aligned candidate block, the inference variant scores every query against
//! every candidate. A pipeline picks its variant at construction and never
//! branches on mode per call.

pub mod inference;
pub mod training;

pub use inference::InferenceMatcher;
pub use training::{TrainingMatcher, accuracy, contrastive_loss};

use std::cmp::Ordering;

use candle_core::{D, Tensor};
use candle_nn::ops::softmax;

use crate::constants::{COSINE_NORM_CEILING, COSINE_NORM_FLOOR};
use crate::error::MatchError;

/// Scores a batch of query states against a batch of candidate states.
///
/// The returned matrix orientation depends on the variant: `[B, K+1]` with
/// the true pairing in column 0 for training, `[Bq, Bt]` for inference.
pub trait Matcher {
    fn similarities(
        &mut self,
        queries: &Tensor,
        candidates: &Tensor,
    ) -> Result<Tensor, MatchError>;
}

/// Row L2 norms `[N, 1]`, clamped away from zero so cosine stays finite
/// even for degenerate all-zero states.
pub(crate) fn clamped_norms(states: &Tensor) -> candle_core::Result<Tensor> {
    states
        .sqr()?
        .sum_keepdim(1)?
        .sqrt()?
        .clamp(COSINE_NORM_FLOOR, COSINE_NORM_CEILING)
}

/// Applies softmax over the similarity axis and returns each row's top-k
/// column indices in descending-probability order.
pub fn rank_top_k(similarities: &Tensor, k: usize) -> Result<Vec<Vec<usize>>, MatchError> {
    let (_, width) = similarities.dims2()?;
    if k == 0 || k > width {
        return Err(MatchError::ShapeMismatch {
            reason: format!("top_k {k} out of range for {width} candidates"),
        });
    }

    let probs = softmax(similarities, D::Minus1)?;
    let rows = probs.to_vec2::<f32>()?;

    Ok(rows
        .into_iter()
        .map(|row| {
            let mut indexed: Vec<(usize, f32)> = row.into_iter().enumerate().collect();
            indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
            indexed.truncate(k);
            indexed.into_iter().map(|(index, _)| index).collect()
        })
        .collect())
}

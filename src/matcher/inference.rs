//! Full pairwise scoring for serving.

use candle_core::Tensor;

use super::{Matcher, clamped_norms};
use crate::error::MatchError;

/// Inference-mode matcher. Scores every query against every candidate with
/// smoothed cosine; no sampling and no alignment requirement between the
/// two batch sizes.
#[derive(Debug)]
pub struct InferenceMatcher {
    gamma: f64,
}

impl InferenceMatcher {
    pub fn new(gamma: f64) -> Self {
        Self { gamma }
    }
}

impl Matcher for InferenceMatcher {
    /// Returns `[Bq, Bt]` smoothed cosine between each query row and each
    /// candidate row.
    fn similarities(
        &mut self,
        queries: &Tensor,
        candidates: &Tensor,
    ) -> Result<Tensor, MatchError> {
        let (_, query_width) = queries.dims2()?;
        let (_, candidate_width) = candidates.dims2()?;
        if query_width != candidate_width {
            return Err(MatchError::ShapeMismatch {
                reason: format!(
                    "query width {query_width} and candidate width {candidate_width} disagree"
                ),
            });
        }

        let query_units = queries.broadcast_div(&clamped_norms(queries)?)?;
        let candidate_units = candidates.broadcast_div(&clamped_norms(candidates)?)?;

        Ok(query_units
            .matmul(&candidate_units.t()?)?
            .affine(self.gamma, 0.0)?)
    }
}

//! Variable-length sequence encoder.
//!
//! Embeds padded token ids through the frozen [`VectorTable`] and runs two
//! stacked GRU layers, blending each row's state only while the timestep is
//! inside that row's true length. The returned `[B, hidden]` tensor is the
//! top layer's state after each row's last real token; padding never leaks
//! into it. One encoder instance serves both the query and candidate sides,
//! so the weight set is shared by construction.

pub mod gru;


pub use gru::GruCell;

use candle_core::{DType, Device, Tensor};
use candle_nn::{Dropout, Embedding, Module, VarBuilder};

use crate::batch::SequenceBatch;
use crate::constants::INTERLAYER_DROPOUT;
use crate::error::MatchError;
use crate::vocab::VectorTable;

/// Two-layer recurrent encoder over a frozen embedding table.
#[derive(Debug, Clone)]
pub struct SequenceEncoder {
    embedding: Embedding,
    layer1: GruCell,
    layer2: GruCell,
    dropout: Dropout,
    hidden: usize,
    device: Device,
}

impl SequenceEncoder {
    /// Builds the encoder's weight bundle under `vb`. Calling this twice
    /// with the same builder paths re-attaches the same variables.
    pub fn new(
        table: &VectorTable,
        hidden: usize,
        vb: VarBuilder,
        device: &Device,
    ) -> Result<Self, MatchError> {
        let embedding = Embedding::new(table.to_tensor(device)?, table.dim());
        let layer1 = GruCell::new(table.dim(), hidden, vb.pp("layer1"))?;
        let layer2 = GruCell::new(hidden, hidden, vb.pp("layer2"))?;

        Ok(Self {
            embedding,
            layer1,
            layer2,
            dropout: Dropout::new(INTERLAYER_DROPOUT),
            hidden,
            device: device.clone(),
        })
    }

    /// Width of the encoded state.
    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// Encodes a batch into one `[B, hidden]` state per row.
    ///
    /// `train` enables dropout on the layer-1 → layer-2 connection; inference
    /// passes `false` and is fully deterministic.
    pub fn encode(&self, batch: &SequenceBatch, train: bool) -> Result<Tensor, MatchError> {
        let rows = batch.len();
        let ids = batch.to_tensor(&self.device)?;
        let embedded = self.embedding.forward(&ids)?;

        let min_len = batch.lengths().iter().copied().min().unwrap_or(0);

        let mut h1 = Tensor::zeros((rows, self.hidden), DType::F32, &self.device)?;
        let mut h2 = h1.clone();

        for t in 0..batch.max_len() {
            let x = embedded.narrow(1, t, 1)?.squeeze(1)?;
            let next1 = self.layer1.step(&x, &h1)?;

            if t < min_len {
                // Every row is still inside its true length.
                h1 = next1;
                let inter = self.dropout.forward(&h1, train)?;
                h2 = self.layer2.step(&inter, &h2)?;
            } else {
                let mask = self.step_mask(batch.lengths(), t)?;
                h1 = blend(&mask, &next1, &h1)?;
                let inter = self.dropout.forward(&h1, train)?;
                let next2 = self.layer2.step(&inter, &h2)?;
                h2 = blend(&mask, &next2, &h2)?;
            }
        }

        Ok(h2)
    }

    /// `[B, 1]` mask: 1.0 while `t` is inside the row's true length.
    fn step_mask(&self, lengths: &[usize], t: usize) -> Result<Tensor, MatchError> {
        let mask: Vec<f32> = lengths
            .iter()
            .map(|&len| if t < len { 1.0 } else { 0.0 })
            .collect();
        Ok(Tensor::from_vec(mask, (lengths.len(), 1), &self.device)?)
    }
}

/// `mask * fresh + (1 - mask) * held`, keeping the blend differentiable.
fn blend(mask: &Tensor, fresh: &Tensor, held: &Tensor) -> Result<Tensor, MatchError> {
    let keep = mask.affine(-1.0, 1.0)?;
    Ok((fresh.broadcast_mul(mask)? + held.broadcast_mul(&keep)?)?)
}

//! Gated recurrent unit cell.
//!
//! `candle_nn` ships a GRU, but its per-step state type cannot be rebuilt
//! from an externally masked tensor, which the length-aware encoder needs.
//! The cell here exposes the raw step so the encoder controls state blending.

use candle_core::{Result, Tensor};
use candle_nn::VarBuilder;
use candle_nn::init::{Init, ZERO};
use candle_nn::ops::sigmoid;

/// One recurrent layer's weights: input projections `W*`, recurrent
/// projections `U*`, and biases, for the update (`z`), reset (`r`) and
/// candidate (`h`) gates.
#[derive(Debug, Clone)]
pub struct GruCell {
    wz: Tensor,
    uz: Tensor,
    bz: Tensor,
    wr: Tensor,
    ur: Tensor,
    br: Tensor,
    wh: Tensor,
    uh: Tensor,
    bh: Tensor,
    hidden: usize,
}

impl GruCell {
    /// Creates (or re-attaches, under a shared `VarBuilder`) the cell's
    /// parameters. Weights use the uniform `±1/√hidden` init, biases zero.
    pub fn new(input_dim: usize, hidden: usize, vb: VarBuilder) -> Result<Self> {
        let bound = 1.0 / (hidden as f64).sqrt();
        let uniform = Init::Uniform {
            lo: -bound,
            up: bound,
        };

        Ok(Self {
            wz: vb.get_with_hints((input_dim, hidden), "wz", uniform)?,
            uz: vb.get_with_hints((hidden, hidden), "uz", uniform)?,
            bz: vb.get_with_hints(hidden, "bz", ZERO)?,
            wr: vb.get_with_hints((input_dim, hidden), "wr", uniform)?,
            ur: vb.get_with_hints((hidden, hidden), "ur", uniform)?,
            br: vb.get_with_hints(hidden, "br", ZERO)?,
            wh: vb.get_with_hints((input_dim, hidden), "wh", uniform)?,
            uh: vb.get_with_hints((hidden, hidden), "uh", uniform)?,
            bh: vb.get_with_hints(hidden, "bh", ZERO)?,
            hidden,
        })
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    /// One timestep: consumes the input `x` (`[B, input_dim]`) and previous
    /// state `h_prev` (`[B, hidden]`), returns the new state.
    ///
    /// ```text
    /// z  = σ(x·Wz + h·Uz + bz)
    /// r  = σ(x·Wr + h·Ur + br)
    /// h~ = tanh(x·Wh + (r∘h)·Uh + bh)
    /// h' = (1−z)∘h + z∘h~
    /// ```
    pub fn step(&self, x: &Tensor, h_prev: &Tensor) -> Result<Tensor> {
        let z = sigmoid(
            &(x.matmul(&self.wz)? + h_prev.matmul(&self.uz)?)?.broadcast_add(&self.bz)?,
        )?;
        let r = sigmoid(
            &(x.matmul(&self.wr)? + h_prev.matmul(&self.ur)?)?.broadcast_add(&self.br)?,
        )?;

        let gated = (&r * h_prev)?;
        let candidate = (x.matmul(&self.wh)? + gated.matmul(&self.uh)?)?
            .broadcast_add(&self.bh)?
            .tanh()?;

        let keep = z.affine(-1.0, 1.0)?;
        (keep * h_prev)? + (z * candidate)?
    }
}

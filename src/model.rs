use std::collections::BTreeMap;

use ndarray::{Array4, ArrayBase, Data, Dimension};

use crate::{schedule::NoiseSchedule, Result, SamplerErr};

/// What the network is trained to predict.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Parameterization {
    /// The noise component of the input.
    #[default]
    Eps,
    /// The clean sample.
    X0,
}

/// Conditioning passed through to the network, only inspected for its batch size.
pub trait Conditioning {
    fn batch_size(&self) -> usize;
}

impl<S, D> Conditioning for ArrayBase<S, D>
where
    S: Data,
    D: Dimension,
{
    fn batch_size(&self) -> usize {
        self.shape().first().copied().unwrap_or(0)
    }
}

/// Keyed conditioning (e.g. cross attention context plus concatenated channels); the batch size
/// is the one of its first entry.
impl<C: Conditioning> Conditioning for BTreeMap<String, C> {
    fn batch_size(&self) -> usize {
        self.values().next().map(C::batch_size).unwrap_or(0)
    }
}

impl<C: Conditioning> Conditioning for Vec<C> {
    fn batch_size(&self) -> usize {
        self.first().map(C::batch_size).unwrap_or(0)
    }
}

/// The denoising network and the diffusion schedule it was trained with.
pub trait DenoisingModel {
    type Cond: Conditioning;

    fn noise_schedule(&self) -> &NoiseSchedule;

    fn parameterization(&self) -> Parameterization {
        Parameterization::Eps
    }

    /// Predicts the direction estimate at `x` for timestep `t`, shaped like `x`.
    fn apply_model(
        &self,
        x: &Array4<f32>,
        t: usize,
        cond: Option<&Self::Cond>,
    ) -> Result<Array4<f32>>;
}

/// Adjusts the network's direction estimate, e.g. with a classifier gradient.
pub trait ScoreCorrector<M: DenoisingModel> {
    fn modify_score(
        &self,
        model: &M,
        e_t: Array4<f32>,
        x: &Array4<f32>,
        t: usize,
        cond: Option<&M::Cond>,
    ) -> Result<Array4<f32>>;
}

/// Calls the network and checks the shape of its answer.
pub(crate) fn apply_checked<M: DenoisingModel>(
    model: &M,
    x: &Array4<f32>,
    t: usize,
    cond: Option<&M::Cond>,
) -> Result<Array4<f32>> {
    let e = model.apply_model(x, t, cond)?;
    if e.dim() != x.dim() {
        return Err(SamplerErr::ShapeMismatch {
            what: "model output",
            got: e.len(),
            expected: x.len(),
        });
    }
    Ok(e)
}

/// Classifier free guidance: `uncond + scale * (cond - uncond)`.
pub fn guide(e_uncond: &Array4<f32>, e_cond: &Array4<f32>, scale: f64) -> Array4<f32> {
    e_uncond + &((e_cond - e_uncond) * scale as f32)
}

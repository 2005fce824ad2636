use ndarray::Array4;

use crate::model::{DenoisingModel, ScoreCorrector};

/// Known content to keep while sampling: where `mask` is 1 the state is replaced by `x0`
/// diffused to the current timestep.
#[derive(Debug, Clone)]
pub struct Inpaint {
    pub mask: Array4<f32>,
    pub x0: Array4<f32>,
}

/// The per-run inputs of a sampling call.
pub struct SampleRequest<'r, M: DenoisingModel> {
    pub conditioning: Option<&'r M::Cond>,
    /// Conditioning of the unguided branch for classifier free guidance.
    pub unconditional: Option<&'r M::Cond>,
    /// The initial state, drawn from `N(0, 1)` when absent.
    pub x_t: Option<Array4<f32>>,
    pub inpaint: Option<Inpaint>,
    pub score_corrector: Option<&'r dyn ScoreCorrector<M>>,
}

impl<M: DenoisingModel> Default for SampleRequest<'_, M> {
    fn default() -> Self {
        Self {
            conditioning: None,
            unconditional: None,
            x_t: None,
            inpaint: None,
            score_corrector: None,
        }
    }
}

impl<'r, M: DenoisingModel> SampleRequest<'r, M> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conditioning(mut self, cond: &'r M::Cond) -> Self {
        self.conditioning = Some(cond);
        self
    }

    pub fn with_unconditional(mut self, uncond: &'r M::Cond) -> Self {
        self.unconditional = Some(uncond);
        self
    }

    pub fn with_x_t(mut self, x_t: Array4<f32>) -> Self {
        self.x_t = Some(x_t);
        self
    }

    pub fn with_inpaint(mut self, mask: Array4<f32>, x0: Array4<f32>) -> Self {
        self.inpaint = Some(Inpaint { mask, x0 });
        self
    }

    pub fn with_score_corrector(mut self, corrector: &'r dyn ScoreCorrector<M>) -> Self {
        self.score_corrector = Some(corrector);
        self
    }
}

/// The result of a sampling run.
#[derive(Debug, Clone)]
pub struct SampleOutput {
    /// The final state.
    pub samples: Array4<f32>,
    /// The initial state followed by every logged intermediate state.
    pub intermediates: Vec<Array4<f32>>,
    /// Tolerated anomalies, also reported through the log.
    pub warnings: Vec<String>,
}

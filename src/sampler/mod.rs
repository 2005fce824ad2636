mod config;
mod request;
mod session;
mod strategy;

pub use config::{SamplerConfig, StrategyConfig};
pub use request::{Inpaint, SampleOutput, SampleRequest};
pub use strategy::{DenseStrategy, SparseStrategy, SplitStrategy, Strategy};

use log::{info, warn};

use crate::{
    model::{Conditioning, DenoisingModel, Parameterization},
    Result, SamplerErr,
};
use session::SamplingSession;

/// Pseudo linear multistep sampler whose per-step update runs partly under encryption.
pub struct PlmsSampler<'m, M: DenoisingModel> {
    model: &'m M,
    config: SamplerConfig,
}

impl<'m, M: DenoisingModel> PlmsSampler<'m, M> {
    /// Creates a new `PlmsSampler`.
    ///
    /// # Arguments
    /// * `model` - The denoising network to sample from.
    /// * `config` - The configuration of every run of this sampler.
    ///
    /// # Returns
    /// The sampler or a configuration error.
    pub fn new(model: &'m M, config: SamplerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { model, config })
    }

    pub fn config(&self) -> &SamplerConfig {
        &self.config
    }

    /// Runs a full reverse pass.
    ///
    /// Every check on the request happens before the first step; a failure inside a step aborts
    /// the run with nothing to resume from.
    ///
    /// # Arguments
    /// * `request` - Conditioning, initial state and optional collaborators.
    /// * `callback` - Invoked with the iteration number after every step.
    ///
    /// # Returns
    /// The final state with its intermediates and warnings, or the error that stopped the run.
    pub fn sample(
        &self,
        request: SampleRequest<'_, M>,
        callback: Option<&mut dyn FnMut(usize)>,
    ) -> Result<SampleOutput> {
        let shape = self.config.state_shape();
        let mut warnings = Vec::new();

        if let Some(cond) = request.conditioning {
            let got = cond.batch_size();
            if got != self.config.batch_size {
                let msg = format!(
                    "Got {got} conditionings but batch-size is {}",
                    self.config.batch_size
                );
                warn!("{msg}");
                warnings.push(msg);
            }
        }

        if let Some(x_t) = &request.x_t {
            if x_t.dim() != shape {
                return Err(SamplerErr::ShapeMismatch {
                    what: "initial state",
                    got: x_t.len(),
                    expected: shape.0 * shape.1 * shape.2 * shape.3,
                });
            }
        }

        if let Some(inpaint) = &request.inpaint {
            for (what, tensor) in [("inpaint mask", &inpaint.mask), ("inpaint x0", &inpaint.x0)] {
                if tensor.dim() != shape {
                    return Err(SamplerErr::ShapeMismatch {
                        what,
                        got: tensor.len(),
                        expected: shape.0 * shape.1 * shape.2 * shape.3,
                    });
                }
            }
        }

        if request.score_corrector.is_some()
            && self.model.parameterization() != Parameterization::Eps
        {
            return Err(SamplerErr::Configuration(
                "a score corrector needs an eps-parameterized model".into(),
            ));
        }

        info!("Data shape for PLMS sampling is {shape:?}");

        let session = SamplingSession::new(self.model, &self.config)?;
        let mut output = session.run(&request, callback)?;
        warnings.append(&mut output.warnings);
        output.warnings = warnings;
        Ok(output)
    }
}

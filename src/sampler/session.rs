use std::time::Instant;

use log::{debug, info};
use ndarray::Array4;
use rand::{rngs::StdRng, SeedableRng};

use super::{
    config::SamplerConfig,
    request::{Inpaint, SampleOutput, SampleRequest},
    strategy::{SplitStrategy, Strategy},
};
use crate::{
    he::{CkksContext, EncryptedComponent, EncryptedTensor},
    model::{apply_checked, guide, DenoisingModel},
    noise::{noise_like, step_noise},
    plms::{bootstrap, DirectionHistory},
    schedule::{ReverseStep, ScheduleParams},
    update::{step_update, Coefficients},
    Result, SamplerErr,
};

/// Everything a single sampling run owns: the schedule, the encryption context, the direction
/// history and the random source. Created at the start of a run and dropped at its end, whether
/// it completes or fails.
pub(crate) struct SamplingSession<'a, M: DenoisingModel> {
    model: &'a M,
    config: &'a SamplerConfig,
    schedule: ScheduleParams,
    context: CkksContext,
    strategy: Strategy,
    history: DirectionHistory,
    rng: StdRng,
}

impl<'a, M: DenoisingModel> SamplingSession<'a, M> {
    /// Precomputes the schedule and creates the encryption context of a run.
    ///
    /// # Arguments
    /// * `model` - The denoising network.
    /// * `config` - The validated run configuration.
    ///
    /// # Returns
    /// A new session or a configuration error.
    pub fn new(model: &'a M, config: &'a SamplerConfig) -> Result<Self> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        let noise = model.noise_schedule();
        let schedule = match &config.timesteps {
            Some(timesteps) => {
                ScheduleParams::from_timesteps(noise.alphas_cumprod(), timesteps, config.eta)?
            }
            None => ScheduleParams::new(
                noise,
                config.num_steps,
                config.discretization,
                config.eta,
            )?,
        };

        let context = CkksContext::new(config.ckks.clone(), &mut rng)?;

        Ok(Self {
            model,
            config,
            schedule,
            context,
            strategy: Strategy::from_config(&config.strategy),
            history: DirectionHistory::new(),
            rng,
        })
    }

    /// Walks the whole schedule from the highest timestep down.
    ///
    /// # Arguments
    /// * `request` - The conditioning, initial state and optional collaborators of the run.
    /// * `callback` - Invoked with the iteration number after every step.
    ///
    /// # Returns
    /// The final and intermediate states, or the first error of any step.
    pub fn run(
        mut self,
        request: &SampleRequest<'_, M>,
        mut callback: Option<&mut dyn FnMut(usize)>,
    ) -> Result<SampleOutput> {
        let shape = self.config.state_shape();
        let mut img = match &request.x_t {
            Some(x_t) => x_t.clone(),
            None => noise_like(shape, false, &mut self.rng),
        };

        let total = self.schedule.len();
        info!(
            "Running PLMS sampling with {total} timesteps, {} strategy",
            self.strategy.kind()
        );

        let mut intermediates = vec![img.clone()];
        let steps: Vec<ReverseStep> = self.schedule.reverse_iter().collect();

        for step in steps {
            if let Some(inpaint) = &request.inpaint {
                img = self.blend_known(inpaint, &img, step.t)?;
            }

            img = self.step(&img, step, request)?;

            if step.index % self.config.log_every_t == 0 || step.index == total - 1 {
                intermediates.push(img.clone());
            }

            if let Some(callback) = callback.as_mut() {
                callback(step.iteration);
            }
        }

        info!("PLMS sampling finished after {total} steps");
        Ok(SampleOutput {
            samples: img,
            intermediates,
            warnings: Vec::new(),
        })
    }

    /// Advances the state by one step of the schedule.
    fn step(
        &mut self,
        state: &Array4<f32>,
        step: ReverseStep,
        request: &SampleRequest<'_, M>,
    ) -> Result<Array4<f32>> {
        let coeffs = Coefficients::from(&self.schedule.steps()[step.index]);
        let shape = state.dim();
        let noise_options = self.config.noise_options();

        let decomposition = self.strategy.split(state.view());
        decomposition.verify(state.view())?;
        let outlier = &decomposition.outlier;
        debug!(
            "step {} (t = {}): {} of {} elements are encrypted",
            step.iteration,
            step.t,
            outlier.nnz(),
            outlier.size()
        );

        let start = Instant::now();
        let encrypted = EncryptedTensor::encrypt(&self.context, outlier.values(), &mut self.rng)?;
        debug!("encryption took {:?}", start.elapsed());

        let start = Instant::now();
        let e_t = self.direction(state, step.t, request)?;
        let e_prime = match self.history.extrapolate(&e_t) {
            Some(e_prime) => e_prime,
            None => {
                let noise = step_noise(shape, coeffs.sigma, &noise_options, &mut self.rng)?;
                let provisional = step_update(state, &coeffs, &flatten(&e_t), &flatten(&noise))?;
                let e_next = self.direction(&provisional, step.t_next, request)?;
                bootstrap(&e_t, &e_next)
            }
        };
        debug!(
            "model forward with order {} took {:?}",
            self.history.order().as_usize(),
            start.elapsed()
        );

        let noise = step_noise(shape, coeffs.sigma, &noise_options, &mut self.rng)?;
        let hidden_eps = outlier.gather(e_prime.view())?;
        let hidden_noise = outlier.gather(noise.view())?;

        let plain_mask = outlier.mask().mapv(|m| 1.0 - m);
        let plain_eps = flatten(&(&e_prime * &plain_mask));
        let plain_noise = flatten(&(&noise * &plain_mask));

        let start = Instant::now();
        let ctx = &self.context;
        let remainder = &decomposition.remainder;
        let plain = || step_update(remainder, &coeffs, &plain_eps, &plain_noise);
        let hidden = || {
            let component = EncryptedComponent::new(ctx, encrypted);
            step_update(&component, &coeffs, &hidden_eps, &hidden_noise).map(|c| c.decrypt())
        };

        let (plain, hidden) = if self.config.parallel {
            rayon::join(plain, hidden)
        } else {
            (plain(), hidden())
        };
        let merged = decomposition.merge(&hidden?, plain?.view())?;
        debug!("update and merge took {:?}", start.elapsed());

        self.history.push(e_t);
        Ok(merged)
    }

    /// The direction estimate at `x`, guided and corrected when the request asks for it.
    fn direction(
        &self,
        x: &Array4<f32>,
        t: usize,
        request: &SampleRequest<'_, M>,
    ) -> Result<Array4<f32>> {
        let unconditional = request
            .unconditional
            .filter(|_| self.config.guidance_scale != 1.0);

        let e_t = match unconditional {
            None => apply_checked(self.model, x, t, request.conditioning)?,
            Some(uncond) => {
                let e_uncond = apply_checked(self.model, x, t, Some(uncond))?;
                let e_cond = apply_checked(self.model, x, t, request.conditioning)?;
                guide(&e_uncond, &e_cond, self.config.guidance_scale)
            }
        };

        let Some(corrector) = request.score_corrector else {
            return Ok(e_t);
        };

        let corrected = corrector.modify_score(self.model, e_t, x, t, request.conditioning)?;
        if corrected.dim() != x.dim() {
            return Err(SamplerErr::ShapeMismatch {
                what: "corrected score",
                got: corrected.len(),
                expected: x.len(),
            });
        }
        Ok(corrected)
    }

    /// Replaces the known region of the state by the known content diffused to timestep `t`.
    fn blend_known(
        &mut self,
        inpaint: &Inpaint,
        img: &Array4<f32>,
        t: usize,
    ) -> Result<Array4<f32>> {
        let noise = noise_like(img.dim(), false, &mut self.rng);
        let known = self.model.noise_schedule().q_sample(&inpaint.x0, t, &noise)?;
        let unknown = inpaint.mask.mapv(|m| 1.0 - m);

        Ok(&known * &inpaint.mask + &(img * &unknown))
    }
}

/// The elements of `a` in row-major order.
fn flatten(a: &Array4<f32>) -> Vec<f32> {
    a.iter().copied().collect()
}

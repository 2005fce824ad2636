use serde::{Deserialize, Serialize};

use super::{betas::linspace, NoiseSchedule};
use crate::{Result, SamplerErr};

/// How the sampling timesteps are picked out of the model's diffusion timesteps.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Discretization {
    /// A constant stride of `T / S` timesteps.
    #[default]
    Uniform,
    /// Quadratically growing strides, denser near `t = 0`.
    Quad,
}

/// The scalar coefficients of a single sampling step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepParams {
    /// The diffusion timestep this step denoises.
    pub t: usize,
    pub alpha: f64,
    pub alpha_prev: f64,
    pub sqrt_one_minus_alpha: f64,
    pub sigma: f64,
}

/// One entry of the reverse walk over a schedule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReverseStep {
    /// The amount of steps already taken.
    pub iteration: usize,
    /// The index of the step within the schedule, `S - iteration - 1`.
    pub index: usize,
    pub t: usize,
    /// The timestep of the following iteration (the last step repeats its own).
    pub t_next: usize,
}

/// The precomputed per-step coefficients for a sampling run of `S` steps, ordered by ascending
/// timestep. Immutable once built.
#[derive(Debug, Clone)]
pub struct ScheduleParams {
    steps: Vec<StepParams>,
}

impl ScheduleParams {
    /// Picks `num_steps` timesteps out of `noise` and derives their coefficients.
    ///
    /// # Arguments
    /// * `noise` - The model's noise schedule.
    /// * `num_steps` - The amount of sampling steps `S`.
    /// * `discretization` - How the timesteps are spaced.
    /// * `eta` - The variance knob; must be 0 for multistep sampling.
    ///
    /// # Returns
    /// The schedule or a configuration error.
    pub fn new(
        noise: &NoiseSchedule,
        num_steps: usize,
        discretization: Discretization,
        eta: f64,
    ) -> Result<Self> {
        check_eta(eta)?;
        let timesteps = make_timesteps(discretization, num_steps, noise.num_timesteps())?;
        Self::from_timesteps(noise.alphas_cumprod(), &timesteps, eta)
    }

    /// Derives the coefficients for an explicit, strictly increasing list of timesteps.
    ///
    /// # Arguments
    /// * `alphas_cumprod` - ᾱ for every diffusion timestep.
    /// * `timesteps` - The timesteps to sample at.
    /// * `eta` - The variance knob; must be 0 for multistep sampling.
    ///
    /// # Returns
    /// The schedule or a configuration error if a timestep is out of range, the list is not
    /// strictly increasing or the resulting alphas do not strictly decrease.
    pub fn from_timesteps(alphas_cumprod: &[f64], timesteps: &[usize], eta: f64) -> Result<Self> {
        check_eta(eta)?;

        if timesteps.is_empty() {
            return Err(SamplerErr::Configuration(
                "a schedule needs at least one sampling step".into(),
            ));
        }

        if let Some(&t) = timesteps.iter().find(|&&t| t >= alphas_cumprod.len()) {
            return Err(SamplerErr::Configuration(format!(
                "timestep {t} is out of range for a model with {} timesteps",
                alphas_cumprod.len()
            )));
        }

        if timesteps.windows(2).any(|w| w[1] <= w[0]) {
            return Err(SamplerErr::Configuration(
                "sampling timesteps must be strictly increasing".into(),
            ));
        }

        let alphas: Vec<f64> = timesteps.iter().map(|&t| alphas_cumprod[t]).collect();
        if alphas.windows(2).any(|w| w[1] >= w[0]) {
            return Err(SamplerErr::Configuration(
                "alphas must strictly decrease along the sampling timesteps".into(),
            ));
        }

        let alphas_prev = std::iter::once(alphas_cumprod[0]).chain(alphas.iter().copied());
        let steps = timesteps
            .iter()
            .zip(&alphas)
            .zip(alphas_prev)
            .map(|((&t, &alpha), alpha_prev)| {
                let sigma = if eta == 0.0 {
                    0.0
                } else {
                    eta * ((1.0 - alpha_prev) / (1.0 - alpha) * (1.0 - alpha / alpha_prev)).sqrt()
                };

                StepParams {
                    t,
                    alpha,
                    alpha_prev,
                    sqrt_one_minus_alpha: (1.0 - alpha).sqrt(),
                    sigma,
                }
            })
            .collect();

        Ok(Self { steps })
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&StepParams> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[StepParams] {
        &self.steps
    }

    /// Walks the schedule from the highest timestep down to the lowest.
    pub fn reverse_iter(&self) -> impl Iterator<Item = ReverseStep> + '_ {
        let total = self.steps.len();

        (0..total).map(move |iteration| {
            let index = total - iteration - 1;
            ReverseStep {
                iteration,
                index,
                t: self.steps[index].t,
                t_next: self.steps[index.saturating_sub(1)].t,
            }
        })
    }
}

/// Picks `num_steps` sampling timesteps out of `total` diffusion timesteps.
///
/// Every picked timestep is shifted by one so that the final alphas line up with the ones used
/// when going from the first noise level to data.
///
/// # Returns
/// The ascending timesteps or a configuration error if `num_steps` is 0 or exceeds `total`.
pub fn make_timesteps(
    discretization: Discretization,
    num_steps: usize,
    total: usize,
) -> Result<Vec<usize>> {
    if num_steps == 0 || num_steps > total {
        return Err(SamplerErr::Configuration(format!(
            "cannot pick {num_steps} sampling steps out of {total} timesteps"
        )));
    }

    let timesteps = match discretization {
        Discretization::Uniform => {
            let stride = total / num_steps;
            (0..total).step_by(stride).take(num_steps).map(|t| t + 1).collect()
        }
        Discretization::Quad => linspace(0.0, (total as f64 * 0.8).sqrt(), num_steps)
            .into_iter()
            .map(|t| (t * t) as usize + 1)
            .collect(),
    };

    Ok(timesteps)
}

fn check_eta(eta: f64) -> Result<()> {
    if eta != 0.0 {
        return Err(SamplerErr::Configuration(format!(
            "eta must be 0 for multistep sampling, got {eta}"
        )));
    }

    Ok(())
}

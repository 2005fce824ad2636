use std::f64::consts::FRAC_PI_2;

use ndarray::Array4;
use serde::{Deserialize, Serialize};

use crate::{Result, SamplerErr};

/// The variance schedule a diffusion model was trained with.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BetaSchedule {
    /// Betas are the squares of a linear ramp between `sqrt(start)` and `sqrt(end)`.
    Linear { start: f64, end: f64 },
    Cosine { s: f64 },
    SqrtLinear { start: f64, end: f64 },
    Sqrt { start: f64, end: f64 },
}

impl Default for BetaSchedule {
    fn default() -> Self {
        Self::Linear {
            start: 0.00085,
            end: 0.012,
        }
    }
}

/// The per-timestep noise levels of a diffusion model: `betas` and their cumulative products
/// `alphas_cumprod` (ᾱ).
#[derive(Debug, Clone)]
pub struct NoiseSchedule {
    betas: Vec<f64>,
    alphas_cumprod: Vec<f64>,
}

impl NoiseSchedule {
    /// Builds the schedule for `num_timesteps` diffusion steps.
    ///
    /// # Arguments
    /// * `kind` - The beta schedule.
    /// * `num_timesteps` - The amount of diffusion steps the model was trained with.
    ///
    /// # Returns
    /// The schedule or a configuration error if the betas are not within (0, 1).
    pub fn new(kind: BetaSchedule, num_timesteps: usize) -> Result<Self> {
        if num_timesteps == 0 {
            return Err(SamplerErr::Configuration(
                "the noise schedule needs at least one timestep".into(),
            ));
        }

        let betas = match kind {
            BetaSchedule::Linear { start, end } => linspace(start.sqrt(), end.sqrt(), num_timesteps)
                .into_iter()
                .map(|b| b * b)
                .collect(),
            BetaSchedule::SqrtLinear { start, end } => linspace(start, end, num_timesteps),
            BetaSchedule::Sqrt { start, end } => linspace(start, end, num_timesteps)
                .into_iter()
                .map(f64::sqrt)
                .collect(),
            BetaSchedule::Cosine { s } => cosine_betas(s, num_timesteps),
        };

        Self::from_betas(betas)
    }

    /// Builds the schedule from raw betas.
    pub fn from_betas(betas: Vec<f64>) -> Result<Self> {
        if let Some(b) = betas.iter().find(|b| !(**b > 0.0 && **b < 1.0)) {
            return Err(SamplerErr::Configuration(format!(
                "every beta must lie in (0, 1), got {b}"
            )));
        }

        let alphas_cumprod = betas
            .iter()
            .scan(1.0, |acc, b| {
                *acc *= 1.0 - b;
                Some(*acc)
            })
            .collect();

        Ok(Self {
            betas,
            alphas_cumprod,
        })
    }

    /// Builds the schedule from ᾱ values given by a model.
    ///
    /// # Returns
    /// The schedule or a configuration error if ᾱ is empty, leaves (0, 1] or increases.
    pub fn from_alphas_cumprod(alphas_cumprod: Vec<f64>) -> Result<Self> {
        if alphas_cumprod.is_empty() {
            return Err(SamplerErr::Configuration("alphas_cumprod is empty".into()));
        }

        if let Some(a) = alphas_cumprod.iter().find(|a| !(**a > 0.0 && **a <= 1.0)) {
            return Err(SamplerErr::Configuration(format!(
                "every alpha_cumprod must lie in (0, 1], got {a}"
            )));
        }

        if alphas_cumprod.windows(2).any(|w| w[1] > w[0]) {
            return Err(SamplerErr::Configuration(
                "alphas_cumprod must not increase with the timestep".into(),
            ));
        }

        let betas = std::iter::once(1.0)
            .chain(alphas_cumprod.iter().copied())
            .zip(&alphas_cumprod)
            .map(|(prev, a)| 1.0 - a / prev)
            .collect();

        Ok(Self {
            betas,
            alphas_cumprod,
        })
    }

    pub fn num_timesteps(&self) -> usize {
        self.alphas_cumprod.len()
    }

    pub fn betas(&self) -> &[f64] {
        &self.betas
    }

    pub fn alphas_cumprod(&self) -> &[f64] {
        &self.alphas_cumprod
    }

    /// Diffuses a clean sample forward to timestep `t`:
    /// `sqrt(ᾱ_t) * x0 + sqrt(1 - ᾱ_t) * noise`.
    ///
    /// # Arguments
    /// * `x0` - The clean sample.
    /// * `t` - The timestep.
    /// * `noise` - Standard normal noise shaped like `x0`.
    ///
    /// # Returns
    /// The noised sample or an error if `t` is out of range or the shapes differ.
    pub fn q_sample(&self, x0: &Array4<f32>, t: usize, noise: &Array4<f32>) -> Result<Array4<f32>> {
        let alpha = *self.alphas_cumprod.get(t).ok_or_else(|| {
            SamplerErr::Configuration(format!(
                "timestep {t} is outside a schedule of {} timesteps",
                self.num_timesteps()
            ))
        })?;

        if x0.shape() != noise.shape() {
            return Err(SamplerErr::ShapeMismatch {
                what: "q_sample noise",
                got: noise.len(),
                expected: x0.len(),
            });
        }

        let signal = alpha.sqrt() as f32;
        let spread = (1.0 - alpha).sqrt() as f32;
        Ok(x0 * signal + noise * spread)
    }
}

/// `n` evenly spaced values over `[start, end]`.
pub(crate) fn linspace(start: f64, end: f64, n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![start];
    }

    let step = (end - start) / (n - 1) as f64;
    (0..n).map(|i| start + step * i as f64).collect()
}

fn cosine_betas(s: f64, n: usize) -> Vec<f64> {
    let alphas: Vec<f64> = (0..=n)
        .map(|i| {
            let t = i as f64 / n as f64 + s;
            (t / (1.0 + s) * FRAC_PI_2).cos().powi(2)
        })
        .collect();

    alphas
        .windows(2)
        .map(|w| (1.0 - w[1] / w[0]).clamp(0.0, 0.999))
        .collect()
}

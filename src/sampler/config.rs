use std::{fs, path::Path};

use serde::{Deserialize, Serialize};

use crate::{he::CkksParams, noise::NoiseOptions, schedule::Discretization, Result, SamplerErr};

/// How the sample state is split between the encrypted and the plaintext path.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyConfig {
    /// Encrypt the whole state.
    #[default]
    Dense,
    /// Encrypt only the elements whose magnitude exceeds `threshold`.
    Sparse { threshold: f32 },
}

/// Everything a sampling run is parameterized by.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct SamplerConfig {
    pub num_steps: usize,
    pub discretization: Discretization,
    /// Explicit ascending sampling timesteps, used instead of the discretization when set.
    pub timesteps: Option<Vec<usize>>,
    pub eta: f64,
    pub batch_size: usize,
    /// `[channels, height, width]` of a single sample.
    pub shape: [usize; 3],
    pub temperature: f64,
    pub noise_dropout: f64,
    pub repeat_noise: bool,
    pub log_every_t: usize,
    /// Classifier free guidance weight, only used along with unconditional conditioning.
    pub guidance_scale: f64,
    pub strategy: StrategyConfig,
    pub ckks: CkksParams,
    pub seed: Option<u64>,
    /// Run the encrypted and plaintext updates of a step on separate threads.
    pub parallel: bool,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            num_steps: 50,
            discretization: Discretization::Uniform,
            timesteps: None,
            eta: 0.0,
            batch_size: 1,
            shape: [4, 64, 64],
            temperature: 1.0,
            noise_dropout: 0.0,
            repeat_noise: false,
            log_every_t: 100,
            guidance_scale: 1.0,
            strategy: StrategyConfig::Dense,
            ckks: CkksParams::default(),
            seed: None,
            parallel: true,
        }
    }
}

impl SamplerConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        Self::from_json_str(&content)
    }

    /// The full `(batch, channels, height, width)` shape of the sample state.
    pub fn state_shape(&self) -> (usize, usize, usize, usize) {
        let [c, h, w] = self.shape;
        (self.batch_size, c, h, w)
    }

    pub fn noise_options(&self) -> NoiseOptions {
        NoiseOptions {
            temperature: self.temperature,
            dropout: self.noise_dropout,
            repeat: self.repeat_noise,
        }
    }

    /// Checks the configuration before anything is sampled.
    ///
    /// # Returns
    /// A configuration error describing the first invalid field.
    pub fn validate(&self) -> Result<()> {
        let invalid = |msg: String| Err(SamplerErr::Configuration(msg));

        if self.num_steps == 0 {
            return invalid("at least one sampling step is needed".into());
        }

        if let Some(timesteps) = &self.timesteps {
            if timesteps.len() != self.num_steps {
                return invalid(format!(
                    "{} explicit timesteps given for {} steps",
                    timesteps.len(),
                    self.num_steps
                ));
            }
        }

        if self.batch_size == 0 || self.shape.contains(&0) {
            return invalid(format!(
                "the state shape {:?} has no elements",
                self.state_shape()
            ));
        }

        if self.eta != 0.0 {
            return invalid(format!("eta must be 0 for PLMS sampling, got {}", self.eta));
        }

        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return invalid(format!(
                "the temperature must be a non negative number, got {}",
                self.temperature
            ));
        }

        if !(0.0..1.0).contains(&self.noise_dropout) {
            return invalid(format!(
                "the noise dropout must lie within [0, 1), got {}",
                self.noise_dropout
            ));
        }

        if self.log_every_t == 0 {
            return invalid("log_every_t must be at least 1".into());
        }

        if !self.guidance_scale.is_finite() {
            return invalid(format!(
                "the guidance scale must be finite, got {}",
                self.guidance_scale
            ));
        }

        if let StrategyConfig::Sparse { threshold } = self.strategy {
            if threshold.is_nan() {
                return invalid("the sparsity threshold must be a number".into());
            }
        }

        self.ckks.validate()
    }
}

//! PLMS sampling for latent diffusion models where the large-magnitude part of the sample state
//! is advanced under approximate homomorphic encryption.

pub mod error;
pub mod he;
pub mod model;
pub mod noise;
pub mod plms;
pub mod sampler;
pub mod schedule;
pub mod sparse;
pub mod update;

pub use error::{Result, SamplerErr};
pub use model::{Conditioning, DenoisingModel, Parameterization, ScoreCorrector};
pub use sampler::{PlmsSampler, SampleOutput, SampleRequest, SamplerConfig, StrategyConfig};

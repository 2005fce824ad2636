use std::env;

use anyhow::{Context, Result};
use encrypted_diffusion_sampler::{
    he::CkksParams,
    schedule::{BetaSchedule, NoiseSchedule},
    DenoisingModel, PlmsSampler, SampleRequest, SamplerConfig, StrategyConfig,
};
use log::info;
use ndarray::{Array2, Array4};

const NUM_TIMESTEPS: usize = 1000;

/// Stand-in network predicting a fixed fraction of its input as noise.
struct ShrinkModel {
    schedule: NoiseSchedule,
    rate: f32,
}

impl DenoisingModel for ShrinkModel {
    type Cond = Array2<f32>;

    fn noise_schedule(&self) -> &NoiseSchedule {
        &self.schedule
    }

    fn apply_model(
        &self,
        x: &Array4<f32>,
        _t: usize,
        _cond: Option<&Self::Cond>,
    ) -> encrypted_diffusion_sampler::Result<Array4<f32>> {
        Ok(x * self.rate)
    }
}

fn demo_config() -> SamplerConfig {
    SamplerConfig {
        num_steps: 10,
        shape: [1, 16, 16],
        log_every_t: 5,
        strategy: StrategyConfig::Sparse { threshold: 1.0 },
        ckks: CkksParams {
            ring_degree: 1024,
            ..Default::default()
        },
        seed: Some(0),
        ..Default::default()
    }
}

fn main() -> Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => SamplerConfig::from_json_file(&path)
            .with_context(|| format!("cannot load sampler config '{path}'"))?,
        None => demo_config(),
    };

    let model = ShrinkModel {
        schedule: NoiseSchedule::new(BetaSchedule::default(), NUM_TIMESTEPS)?,
        rate: 0.5,
    };

    let sampler = PlmsSampler::new(&model, config)?;
    let mut progress = |i: usize| info!("step {} of {} done", i + 1, sampler.config().num_steps);
    let output = sampler.sample(
        SampleRequest::new(),
        Some(&mut progress as &mut dyn FnMut(usize)),
    )?;

    let samples = &output.samples;
    info!(
        "sampled {:?}: mean {:.5}, std {:.5}, {} intermediates",
        samples.dim(),
        samples.mean().unwrap_or(0.0),
        samples.std(0.0),
        output.intermediates.len()
    );

    Ok(())
}

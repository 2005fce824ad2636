use ndarray::{Array4, Axis};
use ndarray_rand::{rand_distr::StandardNormal, RandomExt};
use rand::{distr::Bernoulli, Rng};

use crate::Result;

/// How the stochastic term of a step is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseOptions {
    pub temperature: f64,
    /// The probability of zeroing an element; survivors are scaled by `1 / (1 - p)`.
    pub dropout: f64,
    /// Draw a single sample and share it along the batch.
    pub repeat: bool,
}

impl Default for NoiseOptions {
    fn default() -> Self {
        Self {
            temperature: 1.0,
            dropout: 0.0,
            repeat: false,
        }
    }
}

/// Standard normal noise of the given shape.
pub fn noise_like<R: Rng>(
    shape: (usize, usize, usize, usize),
    repeat: bool,
    rng: &mut R,
) -> Array4<f32> {
    if !repeat {
        return Array4::random_using(shape, StandardNormal, rng);
    }

    let (b, c, h, w) = shape;
    let single = Array4::<f32>::random_using((1, c, h, w), StandardNormal, rng);
    let mut repeated = Array4::zeros(shape);
    for mut sample in repeated.axis_iter_mut(Axis(0)).take(b) {
        sample.assign(&single.index_axis(Axis(0), 0));
    }
    repeated
}

/// The stochastic term `sigma * temperature * N(0, 1)` of a step, after dropout.
///
/// A zero `sigma` yields exact zeros without drawing anything.
///
/// # Returns
/// The noise or a configuration error for an invalid dropout probability.
pub fn step_noise<R: Rng>(
    shape: (usize, usize, usize, usize),
    sigma: f64,
    options: &NoiseOptions,
    rng: &mut R,
) -> Result<Array4<f32>> {
    if sigma == 0.0 {
        return Ok(Array4::zeros(shape));
    }

    let mut noise = noise_like(shape, options.repeat, rng) * (sigma * options.temperature) as f32;

    if options.dropout > 0.0 {
        let keep = Bernoulli::new(1.0 - options.dropout)?;
        let keep_scale = (1.0 / (1.0 - options.dropout)) as f32;
        noise.mapv_inplace(|v| if rng.sample(keep) { v * keep_scale } else { 0.0 });
    }

    Ok(noise)
}

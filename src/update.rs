//! The per-step update `next = factor * x - factor * sqrt(1 - a) * e' + dir`, written once over
//! the handful of operations both the plaintext and the encrypted components support.

use ndarray::Array4;

use crate::{schedule::StepParams, Result, SamplerErr};

/// The linear operations a state component must support to be advanced by one step.
///
/// Every operand other than the component itself is a plain flat vector in row-major order, so
/// an implementation never multiplies two hidden values together.
pub trait LinearOps: Sized {
    fn scalar_multiply(&self, scalar: f64) -> Result<Self>;

    fn add_plain(&self, values: &[f32]) -> Result<Self>;

    fn sub_plain(&self, values: &[f32]) -> Result<Self> {
        let negated: Vec<f32> = values.iter().map(|v| -v).collect();
        self.add_plain(&negated)
    }
}

impl LinearOps for Array4<f32> {
    fn scalar_multiply(&self, scalar: f64) -> Result<Self> {
        Ok(self * scalar as f32)
    }

    fn add_plain(&self, values: &[f32]) -> Result<Self> {
        if values.len() != self.len() {
            return Err(SamplerErr::ShapeMismatch {
                what: "plain addend",
                got: values.len(),
                expected: self.len(),
            });
        }

        let mut sum = self.as_standard_layout().into_owned();
        sum.iter_mut().zip(values).for_each(|(x, v)| *x += v);
        Ok(sum)
    }
}

/// The scalars of one step, shared verbatim by every component it advances.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Coefficients {
    pub alpha: f64,
    pub alpha_prev: f64,
    pub sigma: f64,
    pub sqrt_one_minus_alpha: f64,
}

impl From<&StepParams> for Coefficients {
    fn from(step: &StepParams) -> Self {
        Self {
            alpha: step.alpha,
            alpha_prev: step.alpha_prev,
            sigma: step.sigma,
            sqrt_one_minus_alpha: step.sqrt_one_minus_alpha,
        }
    }
}

impl Coefficients {
    /// `sqrt(a_prev / a)`, the factor the component itself is multiplied by.
    pub fn factor(&self) -> f64 {
        (self.alpha_prev / self.alpha).sqrt()
    }

    /// `sqrt(1 - a_prev - sigma^2)`, the weight of the direction pointing to `x_t`.
    pub fn direction_scale(&self) -> f64 {
        (1.0 - self.alpha_prev - self.sigma * self.sigma).max(0.0).sqrt()
    }

    /// `dir = sqrt(1 - a_prev - sigma^2) * e' + noise`, elementwise.
    pub fn direction(&self, eps: &[f32], noise: &[f32]) -> Result<Vec<f32>> {
        check_len("step noise", noise.len(), eps.len())?;
        let scale = self.direction_scale();

        Ok(eps
            .iter()
            .zip(noise)
            .map(|(&e, &n)| (scale * e as f64 + n as f64) as f32)
            .collect())
    }

    /// `factor * sqrt(1 - a) * e'`, elementwise.
    pub fn correction(&self, eps: &[f32]) -> Vec<f32> {
        let scale = self.factor() * self.sqrt_one_minus_alpha;
        eps.iter().map(|&e| (scale * e as f64) as f32).collect()
    }
}

/// Advances one component of the sample state by a step.
///
/// Uses a single scalar multiplication, so an encrypted component spends exactly one level.
///
/// # Arguments
/// * `component` - The component to advance.
/// * `coeffs` - The step's scalars.
/// * `eps` - The direction estimate at the component's elements, flat.
/// * `noise` - The stochastic term at the component's elements, flat.
///
/// # Returns
/// The advanced component or the error of the first failing operation.
pub fn step_update<C: LinearOps>(
    component: &C,
    coeffs: &Coefficients,
    eps: &[f32],
    noise: &[f32],
) -> Result<C> {
    let dir = coeffs.direction(eps, noise)?;
    let correction = coeffs.correction(eps);

    component
        .scalar_multiply(coeffs.factor())?
        .sub_plain(&correction)?
        .add_plain(&dir)
}

fn check_len(what: &'static str, got: usize, expected: usize) -> Result<()> {
    if got != expected {
        return Err(SamplerErr::ShapeMismatch {
            what,
            got,
            expected,
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::he::{CkksContext, CkksParams, EncryptedComponent, EncryptedTensor};
    use ndarray::Array;
    use rand::{rngs::StdRng, SeedableRng};

    fn coeffs() -> Coefficients {
        Coefficients {
            alpha: 0.8,
            alpha_prev: 0.9,
            sigma: 0.0,
            sqrt_one_minus_alpha: 0.2f64.sqrt(),
        }
    }

    #[test]
    fn plaintext_update_matches_the_closed_form() {
        let c = coeffs();
        let x: Array4<f32> =
            Array::from_shape_vec((1, 1, 2, 2), vec![0.5, -1.0, 0.0, 2.0]).unwrap();
        let eps = [1.0, 0.5, -0.25, 0.0];
        let noise = [0.0, 0.1, 0.0, -0.1];

        let next = step_update(&x, &c, &eps, &noise).unwrap();

        let factor = (0.9f64 / 0.8).sqrt();
        let dir_scale = 0.1f64.sqrt();
        for (i, got) in next.iter().enumerate() {
            let e = eps[i] as f64;
            let x = x.as_slice().unwrap()[i] as f64;
            let expected = factor * x - factor * 0.2f64.sqrt() * e + dir_scale * e + noise[i] as f64;
            assert!((*got as f64 - expected).abs() < 1e-6);
        }
    }

    #[test]
    fn step_is_the_ddim_update() {
        // next = sqrt(a_prev) * pred_x0 + sqrt(1 - a_prev) * e
        let c = coeffs();
        let x: Array4<f32> = Array::from_elem((1, 1, 1, 3), 0.7);
        let eps = [0.3; 3];

        let next = step_update(&x, &c, &eps, &[0.0; 3]).unwrap();

        let pred_x0 = (0.7 - 0.2f64.sqrt() * 0.3) / 0.8f64.sqrt();
        let expected = 0.9f64.sqrt() * pred_x0 + 0.1f64.sqrt() * 0.3;
        assert!(next.iter().all(|v| (*v as f64 - expected).abs() < 1e-6));
    }

    #[test]
    fn encrypted_update_tracks_the_plaintext_one() {
        let mut rng = StdRng::seed_from_u64(21);
        let params = CkksParams {
            ring_degree: 64,
            coeff_mod_bit_sizes: vec![50, 30],
            scale_bits: 30,
        };
        let ctx = CkksContext::new(params, &mut rng).unwrap();

        let values: Vec<f32> = (0..100).map(|i| ((i * 37) % 23) as f32 * 0.13 - 1.4).collect();
        let eps: Vec<f32> = (0..100).map(|i| ((i * 11) % 7) as f32 * 0.3 - 1.0).collect();
        let noise = vec![0.0; 100];
        let c = coeffs();

        let plain: Array4<f32> = Array::from_shape_vec((1, 1, 10, 10), values.clone()).unwrap();
        let expected = step_update(&plain, &c, &eps, &noise).unwrap();

        let tensor = EncryptedTensor::encrypt(&ctx, &values, &mut rng).unwrap();
        let encrypted = EncryptedComponent::new(&ctx, tensor);
        let got = step_update(&encrypted, &c, &eps, &noise).unwrap().decrypt();

        for (g, e) in got.iter().zip(expected.iter()) {
            let tol = 1e-3 * e.abs().max(1e-2);
            assert!((g - e).abs() < tol, "{g} vs {e}");
        }
    }

    #[test]
    fn encrypted_update_refuses_to_wrap_around() {
        let mut rng = StdRng::seed_from_u64(5);
        let params = CkksParams {
            ring_degree: 64,
            coeff_mod_bit_sizes: vec![50, 30],
            scale_bits: 30,
        };
        let ctx = CkksContext::new(params, &mut rng).unwrap();
        let c = Coefficients {
            alpha: 0.5,
            alpha_prev: 0.99,
            sigma: 0.0,
            sqrt_one_minus_alpha: 0.5f64.sqrt(),
        };
        let eps = [-223_500.0];

        // Every operand is encodable, the result is past the base prime.
        let plain: Array4<f32> = Array::from_elem((1, 1, 1, 1), 250_000.0);
        let expected = step_update(&plain, &c, &eps, &[0.0]).unwrap();
        assert!((expected[[0, 0, 0, 0]] - 551_811.0).abs() < 2.0);
        assert!(expected[[0, 0, 0, 0]] as f64 > ctx.decryption_limit(ctx.params().scale()));

        let tensor = EncryptedTensor::encrypt(&ctx, &[250_000.0], &mut rng).unwrap();
        let encrypted = EncryptedComponent::new(&ctx, tensor);
        assert!(matches!(
            step_update(&encrypted, &c, &eps, &[0.0]),
            Err(SamplerErr::ValueOutOfRange { .. })
        ));
    }

    #[test]
    fn mismatched_noise_is_rejected() {
        let x: Array4<f32> = Array::zeros((1, 1, 1, 2));
        assert!(step_update(&x, &coeffs(), &[0.0, 0.0], &[0.0]).is_err());
        assert!(step_update(&x, &coeffs(), &[0.0], &[0.0]).is_err());
    }
}

use log::debug;
use rand::Rng;
use rand_distr::{Distribution, Normal};

use super::{
    arith::{add_mod, center, mul_mod, ntt_prime},
    cipher::Ciphertext,
    ntt::NttTable,
    params::CkksParams,
    poly::RnsPoly,
};
use crate::{Result, SamplerErr};

const ERROR_STD_DEV: f64 = 3.2;
const ERROR_TAIL_CUT: f64 = 6.0 * ERROR_STD_DEV;

/// The encryption context of one sampling run: the modulus chain, its transform tables and the
/// secret key. Created once and only read afterwards, so it can be shared between threads.
#[derive(Debug)]
pub struct CkksContext {
    params: CkksParams,
    moduli: Vec<u64>,
    tables: Vec<NttTable>,
    /// The ternary secret key in evaluation form, one limb per modulus.
    secret: Vec<Vec<u64>>,
    error_dist: Normal<f64>,
}

impl CkksContext {
    /// Creates a new context, finding the modulus chain and drawing a fresh secret key.
    ///
    /// # Arguments
    /// * `params` - The scheme parameters.
    /// * `rng` - The source of randomness for key generation.
    ///
    /// # Returns
    /// The context or a configuration error if the parameters are not usable.
    pub fn new<R: Rng + ?Sized>(params: CkksParams, rng: &mut R) -> Result<Self> {
        params.validate()?;
        let n = params.ring_degree;

        let mut moduli = Vec::with_capacity(params.coeff_mod_bit_sizes.len());
        for &bits in &params.coeff_mod_bit_sizes {
            let q = ntt_prime(bits, n, &moduli)?;
            moduli.push(q);
        }

        let tables = moduli
            .iter()
            .map(|&q| NttTable::new(n, q))
            .collect::<Result<Vec<_>>>()?;

        let s: Vec<i64> = (0..n).map(|_| rng.random_range(-1..=1)).collect();
        let s = RnsPoly::from_signed(&s, &moduli);
        let secret = tables
            .iter()
            .enumerate()
            .map(|(j, table)| {
                let mut limb = s.limb(j).to_vec();
                table.forward(&mut limb);
                limb
            })
            .collect();
        debug!(
            "created encryption context with ring degree {n}, moduli {moduli:?} and scale 2^{}",
            params.scale_bits
        );

        Ok(Self {
            params,
            moduli,
            tables,
            secret,
            error_dist: Normal::new(0.0, ERROR_STD_DEV)?,
        })
    }

    pub fn params(&self) -> &CkksParams {
        &self.params
    }

    pub fn moduli(&self) -> &[u64] {
        &self.moduli
    }

    /// The amount of values a single ciphertext holds.
    pub fn slots(&self) -> usize {
        self.params.ring_degree
    }

    /// The largest magnitude that can be encoded at `scale`.
    pub fn max_magnitude(&self, scale: f64) -> f64 {
        self.moduli[0] as f64 / (4.0 * scale)
    }

    /// The magnitude at which a result at `scale` no longer fits in the base prime and would
    /// wrap around on decryption.
    pub fn decryption_limit(&self, scale: f64) -> f64 {
        self.moduli[0] as f64 / (2.0 * scale)
    }

    /// Encodes values as scaled, rounded polynomial coefficients over the first `num_limbs` moduli.
    ///
    /// # Returns
    /// The plaintext or a value out of range error for non finite or too large values.
    pub(super) fn encode(&self, values: &[f64], scale: f64, num_limbs: usize) -> Result<RnsPoly> {
        let n = self.slots();
        if values.len() > n {
            return Err(SamplerErr::ShapeMismatch {
                what: "encoded values",
                got: values.len(),
                expected: n,
            });
        }

        let bound = self.max_magnitude(scale);
        let mut coeffs = vec![0i64; n];
        for (c, &v) in coeffs.iter_mut().zip(values) {
            if !v.is_finite() || v.abs() >= bound {
                return Err(SamplerErr::ValueOutOfRange { value: v, bound });
            }
            *c = (v * scale).round() as i64;
        }

        Ok(RnsPoly::from_signed(&coeffs, &self.moduli[..num_limbs]))
    }

    /// Encrypts up to `slots` values under the secret key at the default scale and top level.
    ///
    /// # Returns
    /// A fresh ciphertext or an error if a value cannot be encoded.
    pub fn encrypt<R: Rng + ?Sized>(&self, values: &[f64], rng: &mut R) -> Result<Ciphertext> {
        let n = self.slots();
        let scale = self.params.scale();
        let message = self.encode(values, scale, self.moduli.len())?;

        let a = RnsPoly::from_limbs(
            self.moduli
                .iter()
                .map(|&q| (0..n).map(|_| rng.random_range(0..q)).collect())
                .collect(),
        );
        let e = RnsPoly::from_signed(&self.sample_error(rng), &self.moduli);

        // c0 = m + e - a * s, c1 = a
        let mut c0 = message;
        c0.add_assign(&e, &self.moduli);
        c0.sub_assign(&a.mul_evaluated(&self.secret, &self.tables), &self.moduli);

        let magnitude = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        Ok(Ciphertext::new(c0, a, scale, values.len(), magnitude))
    }

    /// Decrypts a ciphertext under the base prime.
    pub fn decrypt(&self, ct: &Ciphertext) -> Vec<f64> {
        let q = self.moduli[0];
        let table = &self.tables[0];

        let mut c1 = ct.c1().limb(0).to_vec();
        table.forward(&mut c1);
        for (x, s) in c1.iter_mut().zip(&self.secret[0]) {
            *x = mul_mod(*x, *s, q);
        }
        table.inverse(&mut c1);

        ct.c0()
            .limb(0)
            .iter()
            .zip(&c1)
            .take(ct.len())
            .map(|(&a, &b)| center(add_mod(a, b, q), q) as f64 / ct.scale())
            .collect()
    }

    /// Small error coefficients from a rounded, tail cut gaussian.
    fn sample_error<R: Rng + ?Sized>(&self, rng: &mut R) -> Vec<i64> {
        (0..self.slots())
            .map(|_| {
                let e = self.error_dist.sample(rng);
                e.clamp(-ERROR_TAIL_CUT, ERROR_TAIL_CUT).round() as i64
            })
            .collect()
    }
}

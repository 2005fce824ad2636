use serde::{Deserialize, Serialize};

use crate::{Result, SamplerErr};

const MIN_MODULUS_BITS: u32 = 20;
const MAX_MODULUS_BITS: u32 = 61;

/// The parameters of the approximate-arithmetic encryption scheme, fixed for a whole run.
///
/// The first modulus of the chain is the base prime that decryption happens under; every further
/// modulus is consumed by one rescaling, so the multiplicative depth is `len - 1`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", default)]
pub struct CkksParams {
    /// Ring degree `n`; also the amount of values packed per ciphertext.
    pub ring_degree: usize,
    pub coeff_mod_bit_sizes: Vec<u32>,
    /// `log2` of the encoding scale.
    pub scale_bits: u32,
}

impl Default for CkksParams {
    fn default() -> Self {
        Self {
            ring_degree: 8192,
            coeff_mod_bit_sizes: vec![50, 30, 30, 30],
            scale_bits: 30,
        }
    }
}

impl CkksParams {
    /// The amount of rescalings a fresh ciphertext supports.
    pub fn depth(&self) -> usize {
        self.coeff_mod_bit_sizes.len().saturating_sub(1)
    }

    pub fn scale(&self) -> f64 {
        2f64.powi(self.scale_bits as i32)
    }

    /// Checks the parameters before any key material is generated.
    ///
    /// # Returns
    /// A configuration error describing the first invalid parameter.
    pub fn validate(&self) -> Result<()> {
        let n = self.ring_degree;
        if !n.is_power_of_two() || !(8..=32768).contains(&n) {
            return Err(SamplerErr::Configuration(format!(
                "the ring degree must be a power of two within [8, 32768], got {n}"
            )));
        }

        if self.coeff_mod_bit_sizes.len() < 2 {
            return Err(SamplerErr::Configuration(
                "the modulus chain needs a base prime and at least one rescaling prime".into(),
            ));
        }

        if let Some(bits) = self
            .coeff_mod_bit_sizes
            .iter()
            .find(|b| !(MIN_MODULUS_BITS..=MAX_MODULUS_BITS).contains(*b))
        {
            return Err(SamplerErr::Configuration(format!(
                "modulus sizes must lie within [{MIN_MODULUS_BITS}, {MAX_MODULUS_BITS}] bits, got {bits}"
            )));
        }

        let base_bits = self.coeff_mod_bit_sizes[0];
        if self.scale_bits == 0 || self.scale_bits + 2 > base_bits {
            return Err(SamplerErr::Configuration(format!(
                "the scale (2^{}) must leave headroom below the {base_bits}-bit base prime",
                self.scale_bits
            )));
        }

        Ok(())
    }
}

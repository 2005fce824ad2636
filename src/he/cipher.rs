use super::{context::CkksContext, poly::RnsPoly};
use crate::{Result, SamplerErr};

/// Relative difference under which two scales count as equal.
const SCALE_TOLERANCE: f64 = 1e-9;

/// A ciphertext `(c0, c1)` with `c0 + c1 * s = scale * m + e` modulo the remaining primes.
#[derive(Debug, Clone)]
pub struct Ciphertext {
    c0: RnsPoly,
    c1: RnsPoly,
    scale: f64,
    len: usize,
    /// Upper bound on `|m|` over every slot, carried through each operation.
    magnitude: f64,
}

impl Ciphertext {
    pub(super) fn new(c0: RnsPoly, c1: RnsPoly, scale: f64, len: usize, magnitude: f64) -> Self {
        Self {
            c0,
            c1,
            scale,
            len,
            magnitude,
        }
    }

    pub(super) fn c0(&self) -> &RnsPoly {
        &self.c0
    }

    pub(super) fn c1(&self) -> &RnsPoly {
        &self.c1
    }

    pub fn scale(&self) -> f64 {
        self.scale
    }

    /// The amount of meaningful values packed in this ciphertext.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// An upper bound on the magnitude of the encrypted values.
    pub fn magnitude(&self) -> f64 {
        self.magnitude
    }

    /// The amount of rescalings this ciphertext still supports.
    pub fn level(&self) -> usize {
        self.c0.num_limbs() - 1
    }

    fn truncate(&mut self, num_limbs: usize) {
        self.c0.truncate(num_limbs);
        self.c1.truncate(num_limbs);
    }
}

impl CkksContext {
    /// Checks that a result bounded by `magnitude` still decrypts without wrapping around.
    fn check_magnitude(&self, magnitude: f64, scale: f64) -> Result<f64> {
        let limit = self.decryption_limit(scale);
        if !magnitude.is_finite() || magnitude >= limit {
            return Err(SamplerErr::ValueOutOfRange {
                value: magnitude,
                bound: limit,
            });
        }
        Ok(magnitude)
    }

    /// Multiplies a ciphertext by a real constant, consuming one level.
    ///
    /// The constant is encoded against the last prime of the chain, which the rescaling then
    /// divides out, so the scale of the result equals the scale of the input.
    ///
    /// # Returns
    /// The product, a depth exceeded error if `ct` is already at the base prime, or a value out
    /// of range error if the product could wrap around.
    pub fn mul_scalar(&self, ct: &Ciphertext, scalar: f64) -> Result<Ciphertext> {
        let level = ct.level();
        if level == 0 {
            return Err(SamplerErr::DepthExceeded {
                required: 1,
                available: 0,
            });
        }

        let moduli = &self.moduli()[..=level];
        let q_last = moduli[level] as f64;
        let bound = (i64::MAX as f64) / q_last / 2.0;
        if !scalar.is_finite() || scalar.abs() >= bound {
            return Err(SamplerErr::ValueOutOfRange {
                value: scalar,
                bound,
            });
        }
        let magnitude = self.check_magnitude(ct.magnitude * scalar.abs(), ct.scale)?;
        let encoded = (scalar * q_last).round() as i64;

        let mut c0 = ct.c0.clone();
        let mut c1 = ct.c1.clone();
        c0.mul_scalar(encoded, moduli);
        c1.mul_scalar(encoded, moduli);
        c0.rescale(moduli);
        c1.rescale(moduli);

        Ok(Ciphertext::new(c0, c1, ct.scale, ct.len, magnitude))
    }

    /// Adds plain values, encoded at the ciphertext's scale and level.
    ///
    /// # Returns
    /// The sum or an error if the lengths differ, a value cannot be encoded or the sum could
    /// wrap around.
    pub fn add_plain(&self, ct: &Ciphertext, values: &[f64]) -> Result<Ciphertext> {
        if values.len() != ct.len {
            return Err(SamplerErr::ShapeMismatch {
                what: "plain addend",
                got: values.len(),
                expected: ct.len,
            });
        }

        let num_limbs = ct.level() + 1;
        let plain = self.encode(values, ct.scale, num_limbs)?;
        let added = values.iter().fold(0.0f64, |m, v| m.max(v.abs()));
        let magnitude = self.check_magnitude(ct.magnitude + added, ct.scale)?;

        let mut c0 = ct.c0.clone();
        c0.add_assign(&plain, &self.moduli()[..num_limbs]);
        Ok(Ciphertext::new(
            c0,
            ct.c1.clone(),
            ct.scale,
            ct.len,
            magnitude,
        ))
    }

    pub fn sub_plain(&self, ct: &Ciphertext, values: &[f64]) -> Result<Ciphertext> {
        let negated: Vec<f64> = values.iter().map(|v| -v).collect();
        self.add_plain(ct, &negated)
    }

    /// Adds two ciphertexts, bringing them to the lower of both levels first.
    ///
    /// # Returns
    /// The sum or an error if their lengths or scales differ or the sum could wrap around.
    pub fn add(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        if lhs.len != rhs.len {
            return Err(SamplerErr::ShapeMismatch {
                what: "ciphertext addend",
                got: rhs.len,
                expected: lhs.len,
            });
        }

        if (lhs.scale - rhs.scale).abs() > SCALE_TOLERANCE * lhs.scale.abs().max(rhs.scale.abs()) {
            return Err(SamplerErr::ScaleMismatch {
                lhs: lhs.scale,
                rhs: rhs.scale,
            });
        }

        let magnitude = self.check_magnitude(lhs.magnitude + rhs.magnitude, lhs.scale)?;
        let num_limbs = lhs.level().min(rhs.level()) + 1;
        let moduli = &self.moduli()[..num_limbs];

        let mut sum = lhs.clone();
        sum.magnitude = magnitude;
        sum.truncate(num_limbs);
        let mut rhs = rhs.clone();
        rhs.truncate(num_limbs);

        sum.c0.add_assign(&rhs.c0, moduli);
        sum.c1.add_assign(&rhs.c1, moduli);
        Ok(sum)
    }

    pub fn negate(&self, ct: &Ciphertext) -> Ciphertext {
        let moduli = &self.moduli()[..=ct.level()];
        let mut neg = ct.clone();
        neg.c0.negate(moduli);
        neg.c1.negate(moduli);
        neg
    }

    pub fn sub(&self, lhs: &Ciphertext, rhs: &Ciphertext) -> Result<Ciphertext> {
        self.add(lhs, &self.negate(rhs))
    }
}

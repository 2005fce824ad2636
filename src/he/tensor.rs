use rand::{rngs::StdRng, Rng, SeedableRng};
use rayon::prelude::*;

use super::{cipher::Ciphertext, context::CkksContext};
use crate::{update::LinearOps, Result, SamplerErr};

/// A flat vector of values encrypted in chunks of one ciphertext each.
#[derive(Debug, Clone)]
pub struct EncryptedTensor {
    chunks: Vec<Ciphertext>,
    len: usize,
}

impl EncryptedTensor {
    /// Encrypts `values`, one ciphertext per `ctx.slots()` values.
    ///
    /// Every chunk gets its own generator seeded from `rng`, so the result does not depend on
    /// how the chunks are scheduled across threads.
    pub fn encrypt<R: Rng + ?Sized>(ctx: &CkksContext, values: &[f32], rng: &mut R) -> Result<Self> {
        let slots = ctx.slots();
        let seeds: Vec<u64> = values.chunks(slots).map(|_| rng.random()).collect();

        let chunks = values
            .par_chunks(slots)
            .zip(seeds.par_iter())
            .map(|(chunk, &seed)| {
                let mut rng = StdRng::seed_from_u64(seed);
                let chunk: Vec<f64> = chunk.iter().map(|&v| v as f64).collect();
                ctx.encrypt(&chunk, &mut rng)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chunks,
            len: values.len(),
        })
    }

    pub fn decrypt(&self, ctx: &CkksContext) -> Vec<f32> {
        let decrypted: Vec<Vec<f64>> = self.chunks.par_iter().map(|ct| ctx.decrypt(ct)).collect();
        decrypted.into_iter().flatten().map(|v| v as f32).collect()
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// The lowest level among the chunks, `None` for an empty tensor.
    pub fn level(&self) -> Option<usize> {
        self.chunks.iter().map(Ciphertext::level).min()
    }

    pub fn mul_scalar(&self, ctx: &CkksContext, scalar: f64) -> Result<Self> {
        let chunks = self
            .chunks
            .par_iter()
            .map(|ct| ctx.mul_scalar(ct, scalar))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chunks,
            len: self.len,
        })
    }

    pub fn add_plain(&self, ctx: &CkksContext, values: &[f32]) -> Result<Self> {
        if values.len() != self.len {
            return Err(SamplerErr::ShapeMismatch {
                what: "plain addend",
                got: values.len(),
                expected: self.len,
            });
        }

        let chunks = self
            .chunks
            .par_iter()
            .zip(values.par_chunks(ctx.slots()))
            .map(|(ct, chunk)| {
                let chunk: Vec<f64> = chunk.iter().map(|&v| v as f64).collect();
                ctx.add_plain(ct, &chunk)
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chunks,
            len: self.len,
        })
    }

    pub fn add(&self, ctx: &CkksContext, other: &Self) -> Result<Self> {
        if other.len != self.len {
            return Err(SamplerErr::ShapeMismatch {
                what: "encrypted addend",
                got: other.len,
                expected: self.len,
            });
        }

        let chunks = self
            .chunks
            .par_iter()
            .zip(other.chunks.par_iter())
            .map(|(a, b)| ctx.add(a, b))
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            chunks,
            len: self.len,
        })
    }

    pub fn negate(&self, ctx: &CkksContext) -> Self {
        Self {
            chunks: self.chunks.par_iter().map(|ct| ctx.negate(ct)).collect(),
            len: self.len,
        }
    }

    pub fn sub(&self, ctx: &CkksContext, other: &Self) -> Result<Self> {
        self.add(ctx, &other.negate(ctx))
    }
}

/// An encrypted tensor bound to the context that operates on it.
#[derive(Debug, Clone)]
pub struct EncryptedComponent<'c> {
    ctx: &'c CkksContext,
    tensor: EncryptedTensor,
}

impl<'c> EncryptedComponent<'c> {
    pub fn new(ctx: &'c CkksContext, tensor: EncryptedTensor) -> Self {
        Self { ctx, tensor }
    }

    pub fn decrypt(&self) -> Vec<f32> {
        self.tensor.decrypt(self.ctx)
    }
}

impl LinearOps for EncryptedComponent<'_> {
    fn scalar_multiply(&self, scalar: f64) -> Result<Self> {
        Ok(Self::new(self.ctx, self.tensor.mul_scalar(self.ctx, scalar)?))
    }

    fn add_plain(&self, values: &[f32]) -> Result<Self> {
        Ok(Self::new(self.ctx, self.tensor.add_plain(self.ctx, values)?))
    }
}

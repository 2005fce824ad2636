use super::arith::{add_mod, inv_mod, mul_mod, pow_mod, primitive_root_2n, sub_mod};
use crate::Result;

/// Precomputed data for negacyclic number theoretic transforms over `Z_q[X] / (X^n + 1)`.
///
/// The forward transform twists the coefficients by powers of a primitive `2n`-th root `psi`,
/// so that a cyclic transform with `omega = psi^2` computes negacyclic products.
#[derive(Debug, Clone)]
pub struct NttTable {
    n: usize,
    q: u64,
    log_n: u32,
    omega: u64,
    omega_inv: u64,
    n_inv: u64,
    psi_powers: Vec<u64>,
    psi_inv_powers: Vec<u64>,
}

impl NttTable {
    /// Creates the table for ring degree `n` (a power of two) and prime `q = 1 mod 2n`.
    pub fn new(n: usize, q: u64) -> Result<Self> {
        let psi = primitive_root_2n(n, q)?;
        let psi_inv = inv_mod(psi, q);
        let omega = mul_mod(psi, psi, q);

        let powers = |root: u64| -> Vec<u64> {
            std::iter::successors(Some(1u64), |p| Some(mul_mod(*p, root, q)))
                .take(n)
                .collect()
        };

        Ok(Self {
            n,
            q,
            log_n: n.trailing_zeros(),
            omega,
            omega_inv: inv_mod(omega, q),
            n_inv: inv_mod(n as u64, q),
            psi_powers: powers(psi),
            psi_inv_powers: powers(psi_inv),
        })
    }

    pub fn modulus(&self) -> u64 {
        self.q
    }

    /// Coefficients to evaluations, in place.
    pub fn forward(&self, a: &mut [u64]) {
        for (x, p) in a.iter_mut().zip(&self.psi_powers) {
            *x = mul_mod(*x, *p, self.q);
        }
        self.cyclic(a, self.omega);
    }

    /// Evaluations to coefficients, in place.
    pub fn inverse(&self, a: &mut [u64]) {
        self.cyclic(a, self.omega_inv);
        for (x, p) in a.iter_mut().zip(&self.psi_inv_powers) {
            *x = mul_mod(mul_mod(*x, self.n_inv, self.q), *p, self.q);
        }
    }

    /// Iterative Cooley-Tukey decimation in time over bit-reversed input.
    fn cyclic(&self, a: &mut [u64], root: u64) {
        let n = self.n;
        let q = self.q;

        for i in 0..n {
            let j = bit_reverse(i, self.log_n);
            if j > i {
                a.swap(i, j);
            }
        }

        let mut m = 1;
        while m < n {
            let m2 = m << 1;
            let w_m = pow_mod(root, (n / m2) as u64, q);

            for k in (0..n).step_by(m2) {
                let mut w = 1u64;
                for j in 0..m {
                    let t = mul_mod(w, a[k + j + m], q);
                    let u = a[k + j];
                    a[k + j] = add_mod(u, t, q);
                    a[k + j + m] = sub_mod(u, t, q);
                    w = mul_mod(w, w_m, q);
                }
            }

            m = m2;
        }
    }
}

fn bit_reverse(x: usize, bits: u32) -> usize {
    if bits == 0 {
        return 0;
    }
    x.reverse_bits() >> (usize::BITS - bits)
}

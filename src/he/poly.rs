use super::{
    arith::{add_mod, center, inv_mod, mul_mod, neg_mod, reduce_i64, sub_mod},
    ntt::NttTable,
};

/// A polynomial of `Z_Q[X] / (X^n + 1)` in residue number system form: one limb of coefficients
/// per prime of the modulus chain, starting at the base prime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RnsPoly {
    limbs: Vec<Vec<u64>>,
}

impl RnsPoly {
    /// Reduces small signed coefficients modulo every prime of `moduli`.
    pub fn from_signed(coeffs: &[i64], moduli: &[u64]) -> Self {
        let limbs = moduli
            .iter()
            .map(|&q| coeffs.iter().map(|&c| reduce_i64(c, q)).collect())
            .collect();

        Self { limbs }
    }

    pub fn from_limbs(limbs: Vec<Vec<u64>>) -> Self {
        Self { limbs }
    }

    pub fn num_limbs(&self) -> usize {
        self.limbs.len()
    }

    pub fn limb(&self, i: usize) -> &[u64] {
        &self.limbs[i]
    }

    pub fn add_assign(&mut self, other: &Self, moduli: &[u64]) {
        for ((a, b), &q) in self.limbs.iter_mut().zip(&other.limbs).zip(moduli) {
            a.iter_mut().zip(b).for_each(|(x, y)| *x = add_mod(*x, *y, q));
        }
    }

    pub fn sub_assign(&mut self, other: &Self, moduli: &[u64]) {
        for ((a, b), &q) in self.limbs.iter_mut().zip(&other.limbs).zip(moduli) {
            a.iter_mut().zip(b).for_each(|(x, y)| *x = sub_mod(*x, *y, q));
        }
    }

    pub fn negate(&mut self, moduli: &[u64]) {
        for (a, &q) in self.limbs.iter_mut().zip(moduli) {
            a.iter_mut().for_each(|x| *x = neg_mod(*x, q));
        }
    }

    /// Multiplies every coefficient by a signed integer constant.
    pub fn mul_scalar(&mut self, scalar: i64, moduli: &[u64]) {
        for (a, &q) in self.limbs.iter_mut().zip(moduli) {
            let s = reduce_i64(scalar, q);
            a.iter_mut().for_each(|x| *x = mul_mod(*x, s, q));
        }
    }

    /// The negacyclic product with a polynomial given in evaluation form, limb by limb.
    pub fn mul_evaluated(&self, other_evals: &[Vec<u64>], tables: &[NttTable]) -> Self {
        let limbs = self
            .limbs
            .iter()
            .zip(other_evals)
            .zip(tables)
            .map(|((a, b), table)| {
                let q = table.modulus();
                let mut a = a.clone();
                table.forward(&mut a);
                a.iter_mut().zip(b).for_each(|(x, y)| *x = mul_mod(*x, *y, q));
                table.inverse(&mut a);
                a
            })
            .collect();

        Self { limbs }
    }

    /// Drops limbs until `num_limbs` remain. Valid for any polynomial whose centered
    /// coefficients fit in the remaining modulus.
    pub fn truncate(&mut self, num_limbs: usize) {
        self.limbs.truncate(num_limbs);
    }

    /// Divides by the last prime of the chain, rounding, and drops its limb.
    pub fn rescale(&mut self, moduli: &[u64]) {
        let Some(last) = self.limbs.pop() else {
            return;
        };
        let q_last = moduli[self.limbs.len()];

        for (a, &q) in self.limbs.iter_mut().zip(moduli) {
            let q_last_inv = inv_mod(q_last % q, q);

            for (x, &r) in a.iter_mut().zip(&last) {
                let r = reduce_i64(center(r, q_last), q);
                *x = mul_mod(sub_mod(*x, r, q), q_last_inv, q);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::he::arith::ntt_prime;

    fn moduli(n: usize) -> Vec<u64> {
        let q0 = ntt_prime(40, n, &[]).unwrap();
        let q1 = ntt_prime(30, n, &[q0]).unwrap();
        vec![q0, q1]
    }

    #[test]
    fn signed_coefficients_survive_every_limb() {
        let moduli = moduli(8);
        let coeffs = [-3, 0, 5, -1, 2, 0, 0, 7];
        let poly = RnsPoly::from_signed(&coeffs, &moduli);

        for (i, &q) in moduli.iter().enumerate() {
            let back: Vec<i64> = poly.limb(i).iter().map(|&x| center(x, q)).collect();
            assert_eq!(back, coeffs);
        }
    }

    #[test]
    fn rescale_divides_by_the_last_prime() {
        let moduli = moduli(8);
        let q1 = moduli[1] as i64;
        let coeffs: Vec<i64> = vec![3 * q1, -2 * q1, 5 * q1 + 1, 0, q1 / 2, -7 * q1, 1, 9 * q1];
        let mut poly = RnsPoly::from_signed(&coeffs, &moduli);

        poly.rescale(&moduli);
        assert_eq!(poly.num_limbs(), 1);

        let got: Vec<i64> = poly.limb(0).iter().map(|&x| center(x, moduli[0])).collect();
        let expected: Vec<f64> = coeffs.iter().map(|&c| c as f64 / q1 as f64).collect();
        for (g, e) in got.iter().zip(&expected) {
            assert!((*g as f64 - e).abs() <= 0.5 + 1e-9, "{g} vs {e}");
        }
    }

    #[test]
    fn arithmetic_matches_integers() {
        let moduli = moduli(4);
        let mut a = RnsPoly::from_signed(&[1, -2, 3, -4], &moduli);
        let b = RnsPoly::from_signed(&[10, 20, -30, 40], &moduli);

        a.add_assign(&b, &moduli);
        a.mul_scalar(-3, &moduli);
        a.sub_assign(&RnsPoly::from_signed(&[1, 1, 1, 1], &moduli), &moduli);
        a.negate(&moduli);

        assert_eq!(a, RnsPoly::from_signed(&[34, 55, -80, 109], &moduli));
    }
}

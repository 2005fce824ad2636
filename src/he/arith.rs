//! Word-sized modular arithmetic and NTT-friendly prime search.

use primality_test::is_prime;

use crate::{Result, SamplerErr};

#[inline(always)]
pub fn add_mod(a: u64, b: u64, q: u64) -> u64 {
    let s = a + b;
    if s >= q {
        s - q
    } else {
        s
    }
}

#[inline(always)]
pub fn sub_mod(a: u64, b: u64, q: u64) -> u64 {
    if a >= b {
        a - b
    } else {
        a + q - b
    }
}

#[inline(always)]
pub fn mul_mod(a: u64, b: u64, q: u64) -> u64 {
    ((a as u128 * b as u128) % q as u128) as u64
}

#[inline(always)]
pub fn neg_mod(a: u64, q: u64) -> u64 {
    if a == 0 {
        0
    } else {
        q - a
    }
}

pub fn pow_mod(mut base: u64, mut exp: u64, q: u64) -> u64 {
    let mut result = 1 % q;
    base %= q;

    while exp > 0 {
        if exp & 1 == 1 {
            result = mul_mod(result, base, q);
        }
        base = mul_mod(base, base, q);
        exp >>= 1;
    }

    result
}

/// The inverse of `a` modulo the prime `q` (Fermat).
pub fn inv_mod(a: u64, q: u64) -> u64 {
    pow_mod(a, q - 2, q)
}

/// Reduces a signed integer into `[0, q)`.
#[inline(always)]
pub fn reduce_i64(x: i64, q: u64) -> u64 {
    let r = (x as i128).rem_euclid(q as i128);
    r as u64
}

/// Lifts a residue to its representative in `(-q/2, q/2]`.
#[inline(always)]
pub fn center(x: u64, q: u64) -> i64 {
    if x > q / 2 {
        -((q - x) as i64)
    } else {
        x as i64
    }
}

/// Finds the largest prime below `2^bits` that is congruent to 1 modulo `2n`, skipping the ones
/// in `taken`.
///
/// # Arguments
/// * `bits` - The bit size of the prime.
/// * `n` - The ring degree.
/// * `taken` - Primes already in use by the modulus chain.
///
/// # Returns
/// The prime or a configuration error if none exists with `bits` bits.
pub fn ntt_prime(bits: u32, n: usize, taken: &[u64]) -> Result<u64> {
    let m = 2 * n as u64;
    let upper = 1u64 << bits;
    let lower = 1u64 << (bits - 1);

    let mut q = (upper - 1) / m * m + 1;
    if q >= upper {
        q -= m;
    }

    while q > lower {
        if !taken.contains(&q) && is_prime(q) {
            return Ok(q);
        }
        q -= m;
    }

    Err(SamplerErr::Configuration(format!(
        "no {bits}-bit prime is congruent to 1 modulo {m}"
    )))
}

/// A primitive `2n`-th root of unity modulo the prime `q`, where `q = 1 mod 2n`.
pub fn primitive_root_2n(n: usize, q: u64) -> Result<u64> {
    let m = 2 * n as u64;

    for g in 2..q.min(1 << 20) {
        let psi = pow_mod(g, (q - 1) / m, q);
        // Since 2n is a power of two, psi^n = -1 means psi has order exactly 2n.
        if pow_mod(psi, n as u64, q) == q - 1 {
            return Ok(psi);
        }
    }

    Err(SamplerErr::Configuration(format!(
        "no primitive {m}-th root of unity modulo {q}"
    )))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ntt_primes_are_distinct_and_friendly() {
        let n = 1024;
        let q0 = ntt_prime(30, n, &[]).unwrap();
        let q1 = ntt_prime(30, n, &[q0]).unwrap();

        assert_ne!(q0, q1);
        for q in [q0, q1] {
            assert!(is_prime(q));
            assert_eq!(q % (2 * n as u64), 1);
            assert!(q < 1 << 30 && q > 1 << 29);
        }
    }

    #[test]
    fn ntt_prime_is_the_largest_candidate_below_the_bit_size() {
        let trial_division = |q: u64| q > 1 && (2..).take_while(|d| d * d <= q).all(|d| q % d != 0);

        for (bits, n) in [(16, 16), (20, 64), (24, 512)] {
            let m = 2 * n as u64;
            let expected = (1u64 << (bits - 1)..1u64 << bits)
                .rev()
                .find(|q| q % m == 1 && trial_division(*q))
                .unwrap();

            assert_eq!(ntt_prime(bits, n, &[]).unwrap(), expected);
        }
    }

    #[test]
    fn primitive_root_has_order_2n() {
        let n = 16;
        let q = ntt_prime(20, n, &[]).unwrap();
        let psi = primitive_root_2n(n, q).unwrap();

        assert_eq!(pow_mod(psi, 2 * n as u64, q), 1);
        assert_eq!(pow_mod(psi, n as u64, q), q - 1);
    }

    #[test]
    fn inverse_and_centering() {
        let q = 998_244_353;
        assert_eq!(mul_mod(inv_mod(12345, q), 12345, q), 1);
        assert_eq!(center(q - 3, q), -3);
        assert_eq!(center(3, q), 3);
        assert_eq!(reduce_i64(-3, q), q - 3);
        assert_eq!(sub_mod(1, 2, q), q - 1);
        assert_eq!(add_mod(q - 1, 2, q), 1);
    }
}

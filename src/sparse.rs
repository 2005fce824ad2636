use ndarray::{Array4, ArrayView4, Zip};

use crate::{Result, SamplerErr};

/// The large-magnitude part of a sample state in coordinate form: the flat (row-major) indices
/// of the kept elements and their values. Every other element is implicitly zero.
#[derive(Debug, Clone, PartialEq)]
pub struct SparseOutlier {
    shape: (usize, usize, usize, usize),
    indices: Vec<usize>,
    values: Vec<f32>,
}

impl SparseOutlier {
    /// Builds an outlier from its coordinates.
    ///
    /// # Returns
    /// An error if the lengths differ or an index falls outside of `shape`.
    pub fn new(
        shape: (usize, usize, usize, usize),
        indices: Vec<usize>,
        values: Vec<f32>,
    ) -> Result<Self> {
        if indices.len() != values.len() {
            return Err(SamplerErr::ShapeMismatch {
                what: "outlier values",
                got: values.len(),
                expected: indices.len(),
            });
        }

        let size = shape.0 * shape.1 * shape.2 * shape.3;
        if let Some(&i) = indices.iter().find(|&&i| i >= size) {
            return Err(SamplerErr::ShapeMismatch {
                what: "outlier index",
                got: i,
                expected: size,
            });
        }

        Ok(Self {
            shape,
            indices,
            values,
        })
    }

    pub fn shape(&self) -> (usize, usize, usize, usize) {
        self.shape
    }

    pub fn indices(&self) -> &[usize] {
        &self.indices
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    /// The amount of kept elements.
    pub fn nnz(&self) -> usize {
        self.indices.len()
    }

    /// The amount of elements of the full tensor.
    pub fn size(&self) -> usize {
        self.shape.0 * self.shape.1 * self.shape.2 * self.shape.3
    }

    /// Picks the elements of `tensor` at this outlier's support, in support order.
    ///
    /// # Returns
    /// The gathered values or an error if `tensor` has another shape.
    pub fn gather(&self, tensor: ArrayView4<f32>) -> Result<Vec<f32>> {
        if tensor.dim() != self.shape {
            return Err(SamplerErr::ShapeMismatch {
                what: "gathered tensor",
                got: tensor.len(),
                expected: self.size(),
            });
        }

        Ok(match tensor.as_slice() {
            Some(flat) => self.indices.iter().map(|&i| flat[i]).collect(),
            None => {
                let flat: Vec<f32> = tensor.iter().copied().collect();
                self.indices.iter().map(|&i| flat[i]).collect()
            }
        })
    }

    /// Replaces the values at the support, keeping the indices.
    pub fn with_values(&self, values: Vec<f32>) -> Result<Self> {
        Self::new(self.shape, self.indices.clone(), values)
    }

    /// Writes the values into a dense zero tensor.
    pub fn to_dense(&self) -> Array4<f32> {
        let mut dense = Array4::zeros(self.shape);
        self.scatter_add(&mut dense);
        dense
    }

    /// A tensor that is 1 at the support and 0 elsewhere.
    pub fn mask(&self) -> Array4<f32> {
        let mut mask = Array4::<f32>::zeros(self.shape);
        if let Some(flat) = mask.as_slice_mut() {
            for &i in &self.indices {
                flat[i] = 1.0;
            }
        }
        mask
    }

    /// Adds the values onto `dense` at the support. `dense` must be in standard layout.
    fn scatter_add(&self, dense: &mut Array4<f32>) {
        if let Some(flat) = dense.as_slice_mut() {
            for (&i, &v) in self.indices.iter().zip(&self.values) {
                flat[i] += v;
            }
        }
    }
}

/// A sample state split into a sparse outlier and a dense remainder.
#[derive(Debug, Clone)]
pub struct Decomposition {
    pub outlier: SparseOutlier,
    pub remainder: Array4<f32>,
}

impl Decomposition {
    /// Checks that `outlier + remainder` rebuilds `original` exactly and that both parts have
    /// disjoint supports.
    ///
    /// # Returns
    /// A decomposition invariant error naming the first offending element.
    pub fn verify(&self, original: ArrayView4<f32>) -> Result<()> {
        let rebuilt = self.merge(self.outlier.values(), self.remainder.view())?;

        for (index, (got, expected)) in rebuilt.iter().zip(original.iter()).enumerate() {
            if got != expected {
                return Err(SamplerErr::DecompositionInvariant {
                    index,
                    got: *got,
                    expected: *expected,
                });
            }
        }

        if let Some(flat) = self.remainder.as_slice() {
            if let Some(&index) = self.outlier.indices().iter().find(|&&i| flat[i] != 0.0) {
                return Err(SamplerErr::DecompositionInvariant {
                    index,
                    got: flat[index],
                    expected: 0.0,
                });
            }
        }

        Ok(())
    }

    /// Recombines updated outlier values with an updated remainder: the elementwise sum of the
    /// scattered outlier and the remainder.
    ///
    /// # Arguments
    /// * `outlier_values` - The new values at the outlier's support.
    /// * `remainder` - The new remainder.
    ///
    /// # Returns
    /// The merged state or a shape mismatch error.
    pub fn merge(&self, outlier_values: &[f32], remainder: ArrayView4<f32>) -> Result<Array4<f32>> {
        if remainder.dim() != self.outlier.shape() {
            return Err(SamplerErr::ShapeMismatch {
                what: "merged remainder",
                got: remainder.len(),
                expected: self.outlier.size(),
            });
        }

        let outlier = self.outlier.with_values(outlier_values.to_vec())?;
        let mut merged = remainder.as_standard_layout().into_owned();
        outlier.scatter_add(&mut merged);
        Ok(merged)
    }
}

/// Splits `state` into the elements whose magnitude exceeds `threshold` (the outlier) and
/// everything else (the remainder), so that `outlier + remainder == state` elementwise.
///
/// A `threshold <= 0` puts every element, zeros included, in the outlier.
///
/// # Arguments
/// * `state` - The tensor to split.
/// * `threshold` - The magnitude above which an element is an outlier.
///
/// # Returns
/// The decomposition.
pub fn decompose(state: ArrayView4<f32>, threshold: f32) -> Decomposition {
    let state = state.as_standard_layout();
    let keep_all = threshold <= 0.0;

    let mut indices = Vec::new();
    let mut values = Vec::new();
    let mut remainder = Array4::zeros(state.dim());

    Zip::from(&mut remainder).and(&state).for_each(|r, &x| {
        if !(keep_all || x.abs() > threshold) {
            *r = x;
        }
    });

    for (i, &x) in state.iter().enumerate() {
        if keep_all || x.abs() > threshold {
            indices.push(i);
            values.push(x);
        }
    }

    Decomposition {
        outlier: SparseOutlier {
            shape: state.dim(),
            indices,
            values,
        },
        remainder,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array;

    fn sample() -> Array4<f32> {
        Array::from_shape_vec(
            (1, 2, 2, 2),
            vec![0.5, -0.001, 0.02, 0.0, -0.8, 0.01, -0.01, 3.0],
        )
        .unwrap()
    }

    #[test]
    fn decomposition_rebuilds_the_original() {
        let state = sample();
        let d = decompose(state.view(), 0.01);

        assert_eq!(d.outlier.indices(), &[0, 2, 4, 7]);
        assert_eq!(d.outlier.values(), &[0.5, 0.02, -0.8, 3.0]);
        assert_eq!(&d.outlier.to_dense() + &d.remainder, state);
        d.verify(state.view()).unwrap();
    }

    #[test]
    fn elements_at_the_threshold_stay_in_the_remainder() {
        let state = sample();
        let d = decompose(state.view(), 0.01);

        let flat = d.remainder.as_slice().unwrap();
        assert_eq!(flat[5], 0.01);
        assert_eq!(flat[6], -0.01);
        assert!(d.outlier.indices().iter().all(|&i| flat[i] == 0.0));
    }

    #[test]
    fn non_positive_threshold_keeps_everything() {
        let state = sample();

        for threshold in [0.0, -1.0] {
            let d = decompose(state.view(), threshold);
            assert_eq!(d.outlier.nnz(), state.len());
            assert_eq!(d.outlier.to_dense(), state);
            assert!(d.remainder.iter().all(|&x| x == 0.0));
        }
    }

    #[test]
    fn huge_threshold_keeps_nothing() {
        let state = sample();
        let d = decompose(state.view(), 10.0);

        assert_eq!(d.outlier.nnz(), 0);
        assert_eq!(d.remainder, state);
    }

    #[test]
    fn decomposition_of_a_transposed_view() {
        let state = sample();
        let permuted = state.view().permuted_axes([0, 1, 3, 2]);
        let d = decompose(permuted, 0.01);

        let rebuilt = &d.outlier.to_dense() + &d.remainder;
        assert_eq!(rebuilt, permuted);
        d.verify(permuted).unwrap();
    }

    #[test]
    fn tampered_decomposition_fails_verification() {
        let state = sample();
        let mut d = decompose(state.view(), 0.01);
        d.remainder[[0, 1, 1, 1]] = 1.0;

        let err = d.verify(state.view()).unwrap_err();
        assert!(matches!(
            err,
            SamplerErr::DecompositionInvariant { index: 7, .. }
        ));
    }

    #[test]
    fn merge_sums_scattered_values_with_the_remainder() {
        let state = sample();
        let d = decompose(state.view(), 0.01);

        let doubled: Vec<f32> = d.outlier.values().iter().map(|v| v * 2.0).collect();
        let merged = d.merge(&doubled, d.remainder.view()).unwrap();

        let flat = merged.as_slice().unwrap();
        assert_eq!(flat[0], 1.0);
        assert_eq!(flat[1], -0.001);
        assert_eq!(flat[7], 6.0);
    }

    #[test]
    fn gather_follows_the_support() {
        let state = sample();
        let d = decompose(state.view(), 0.01);

        let gathered = d.outlier.gather(state.view()).unwrap();
        assert_eq!(gathered, d.outlier.values());

        let mask = d.outlier.mask();
        assert_eq!(mask.sum(), 4.0);
    }

    #[test]
    fn outlier_rejects_out_of_range_indices() {
        assert!(SparseOutlier::new((1, 1, 1, 2), vec![2], vec![1.0]).is_err());
        assert!(SparseOutlier::new((1, 1, 1, 2), vec![0, 1], vec![1.0]).is_err());
    }
}

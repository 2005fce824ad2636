use ndarray::ArrayView4;

use super::config::StrategyConfig;
use crate::sparse::{decompose, Decomposition};

/// Decides which elements of the sample state go through the encrypted path.
pub trait SplitStrategy {
    /// Splits the state into the encrypted outlier and the plaintext remainder.
    fn split(&self, state: ArrayView4<f32>) -> Decomposition;
}

/// Runtime-selectable split strategy.
///
/// Both variants share the same integrator and step orchestration, they only differ in the
/// decomposition they hand to it.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Strategy {
    Dense(DenseStrategy),
    Sparse(SparseStrategy),
}

impl Strategy {
    /// Builds a strategy from its configuration.
    ///
    /// # Args
    /// * `config` - Strategy selection of the sampling run.
    ///
    /// # Returns
    /// A concrete strategy implementation.
    pub fn from_config(config: &StrategyConfig) -> Self {
        match *config {
            StrategyConfig::Dense => Self::Dense(DenseStrategy),
            StrategyConfig::Sparse { threshold } => Self::Sparse(SparseStrategy { threshold }),
        }
    }

    /// Returns a stable identifier for the strategy kind.
    pub fn kind(&self) -> &'static str {
        match self {
            Strategy::Dense(_) => "dense",
            Strategy::Sparse(_) => "sparse",
        }
    }
}

impl SplitStrategy for Strategy {
    fn split(&self, state: ArrayView4<f32>) -> Decomposition {
        match self {
            Strategy::Dense(s) => s.split(state),
            Strategy::Sparse(s) => s.split(state),
        }
    }
}

/// Encrypts every element; the remainder is always zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DenseStrategy;

impl SplitStrategy for DenseStrategy {
    fn split(&self, state: ArrayView4<f32>) -> Decomposition {
        decompose(state, 0.0)
    }
}

/// Encrypts the elements whose magnitude exceeds `threshold`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SparseStrategy {
    pub threshold: f32,
}

impl SplitStrategy for SparseStrategy {
    fn split(&self, state: ArrayView4<f32>) -> Decomposition {
        decompose(state, self.threshold)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array4;

    #[test]
    fn strategies_from_config() {
        let dense = Strategy::from_config(&StrategyConfig::Dense);
        assert_eq!(dense.kind(), "dense");

        let sparse = Strategy::from_config(&StrategyConfig::Sparse { threshold: 0.5 });
        assert_eq!(sparse.kind(), "sparse");
        assert_eq!(sparse, Strategy::Sparse(SparseStrategy { threshold: 0.5 }));
    }

    #[test]
    fn dense_split_encrypts_everything() {
        let state = Array4::<f32>::from_shape_vec((1, 1, 1, 4), vec![0.0, 2.0, -0.1, 0.3]).unwrap();

        let dense = Strategy::from_config(&StrategyConfig::Dense).split(state.view());
        assert_eq!(dense.outlier.nnz(), 4);
        assert!(dense.remainder.iter().all(|&v| v == 0.0));

        let sparse = Strategy::from_config(&StrategyConfig::Sparse { threshold: 0.2 });
        let sparse = sparse.split(state.view());
        assert_eq!(sparse.outlier.indices(), &[1, 3]);
    }
}

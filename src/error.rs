use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire sampler.
pub type Result<T> = std::result::Result<T, SamplerErr>;

/// The sampler's error type.
#[derive(Debug)]
pub enum SamplerErr {
    /// Invalid schedule, eta or encryption parameters, caught before the first step.
    Configuration(String),
    ShapeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    /// A ciphertext ran out of rescaling levels.
    DepthExceeded {
        required: usize,
        available: usize,
    },
    /// `outlier + remainder` did not rebuild the original tensor.
    DecompositionInvariant {
        index: usize,
        got: f32,
        expected: f32,
    },
    ScaleMismatch {
        lhs: f64,
        rhs: f64,
    },
    /// A value is too large to be encoded, or a result too large to decrypt, at the current scale.
    ValueOutOfRange {
        value: f64,
        bound: f64,
    },
    /// Failure reported by the denoising network or the score corrector.
    Model(String),
    Io(io::Error),
    Json(serde_json::Error),
}

impl Display for SamplerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerErr::Configuration(msg) => write!(f, "invalid configuration: {msg}"),
            SamplerErr::ShapeMismatch {
                what,
                got,
                expected,
            } => write!(f, "shape mismatch in {what}: got {got}, expected {expected}"),
            SamplerErr::DepthExceeded {
                required,
                available,
            } => write!(
                f,
                "multiplicative depth exceeded: {required} level(s) required, {available} available"
            ),
            SamplerErr::DecompositionInvariant {
                index,
                got,
                expected,
            } => write!(
                f,
                "outlier + remainder does not rebuild element {index}: got {got}, expected {expected}"
            ),
            SamplerErr::ScaleMismatch { lhs, rhs } => {
                write!(f, "ciphertext scales differ: {lhs} and {rhs}")
            }
            SamplerErr::ValueOutOfRange { value, bound } => {
                write!(f, "value {value} is out of range, magnitude bound is {bound}")
            }
            SamplerErr::Model(msg) => write!(f, "model error: {msg}"),
            SamplerErr::Io(e) => write!(f, "io error: {e}"),
            SamplerErr::Json(e) => write!(f, "json error: {e}"),
        }
    }
}

impl Error for SamplerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SamplerErr::Io(e) => Some(e),
            SamplerErr::Json(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for SamplerErr {
    fn from(value: io::Error) -> Self {
        Self::Io(value)
    }
}

impl From<serde_json::Error> for SamplerErr {
    fn from(value: serde_json::Error) -> Self {
        Self::Json(value)
    }
}

impl From<rand_distr::NormalError> for SamplerErr {
    fn from(value: rand_distr::NormalError) -> Self {
        Self::Configuration(format!("invalid normal distribution: {value}"))
    }
}

impl From<rand::distr::BernoulliError> for SamplerErr {
    fn from(value: rand::distr::BernoulliError) -> Self {
        Self::Configuration(format!("invalid bernoulli distribution: {value}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn messages_share_one_register() {
        let errors = [
            SamplerErr::Configuration("eta must be 0".into()),
            SamplerErr::ShapeMismatch {
                what: "initial state",
                got: 9,
                expected: 4,
            },
            SamplerErr::DepthExceeded {
                required: 1,
                available: 0,
            },
            SamplerErr::ScaleMismatch { lhs: 1.0, rhs: 2.0 },
            SamplerErr::ValueOutOfRange {
                value: 3.0,
                bound: 2.0,
            },
            SamplerErr::Model("no estimate".into()),
        ];

        for err in &errors {
            let msg = err.to_string();
            assert!(msg.starts_with(char::is_lowercase), "{msg}");
        }

        assert_eq!(
            errors[1].to_string(),
            "shape mismatch in initial state: got 9, expected 4"
        );
    }
}

//! Leveled approximate homomorphic encryption over `Z_Q[X] / (X^n + 1)`, just enough of it to run
//! the linear step update on encrypted values.

mod arith;
mod cipher;
mod context;
mod ntt;
mod params;
mod poly;
mod tensor;

pub use cipher::Ciphertext;
pub use context::CkksContext;
pub use params::CkksParams;
pub use tensor::{EncryptedComponent, EncryptedTensor};

//! Oracle infrastructure: solver, interpolation, built-in oracle

pub mod fourier_motzkin;
pub mod interpolation;
pub mod linear_oracle;

pub use fourier_motzkin::FourierMotzkinSolver;
pub use interpolation::{predicates_of, wp, WpInterpolator};
pub use linear_oracle::LinearArithmeticOracle;

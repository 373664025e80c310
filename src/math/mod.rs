//! Matrix-level numerics shared by the estimator and the simulation engine.

pub mod correlation;

pub use correlation::{
    CholeskyFactor, factorize_covariance, is_positive_semidefinite, min_eigenvalue_symmetric,
    nearest_psd_by_eigenvalue_clipping, validate_covariance_matrix,
};

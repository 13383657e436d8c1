//! Reproduction numbers and related closed-form quantities.
use crate::{
    error::{ModelError, Result},
    prelude::{Real, Time},
};
use ndarray::{Array1, Array2};

const NEWTON_TOLERANCE: Real = 1e-12;
const POWER_TOLERANCE: Real = 1e-12;
const MAX_ITER: usize = 10_000;

/// Basic reproduction number of a homogeneous SIR-like model:
/// contact rate times the mean infectious duration.
pub fn basic_reproduction_number(contact_rate: Real, infectious_duration: Time) -> Result<Real> {
    if contact_rate < 0.0 || !contact_rate.is_finite() {
        return Err(ModelError::InvalidArgument(format!(
            "contact rate must be non-negative, got {}",
            contact_rate
        )));
    }
    if !(infectious_duration > 0.0) {
        return Err(ModelError::InvalidArgument(format!(
            "infectious duration must be positive, got {}",
            infectious_duration
        )));
    }
    return Ok(contact_rate * infectious_duration);
}

/// Effective reproduction number when only a fraction of the population is
/// susceptible.
pub fn effective_reproduction_number(r0: Real, susceptible_fraction: Real) -> Result<Real> {
    if !(0.0..=1.0).contains(&susceptible_fraction) {
        return Err(ModelError::InvalidArgument(format!(
            "susceptible fraction must be in [0, 1], got {}",
            susceptible_fraction
        )));
    }
    return Ok(r0 * susceptible_fraction);
}

/// Fraction of the population that must be immune to prevent epidemic
/// growth: 1 - 1/R0, or zero when R0 <= 1.
pub fn herd_immunity_threshold(r0: Real) -> Real {
    if r0 <= 1.0 {
        0.0
    } else {
        1.0 - 1.0 / r0
    }
}

/// Fraction of the population ever infected in a SIR epidemic started by a
/// vanishingly small number of cases: the positive root of z = 1 - exp(-R0 z).
///
/// Zero if R0 <= 1.
pub fn final_size(r0: Real) -> Result<Real> {
    if r0 < 0.0 || !r0.is_finite() {
        return Err(ModelError::InvalidArgument(format!("invalid R0: {}", r0)));
    }
    if r0 <= 1.0 {
        return Ok(0.0);
    }

    // Newton iteration on f(z) = z - 1 + exp(-R0 z), starting from 1 so that
    // it does not converge to the trivial root.
    let mut z: Real = 1.0;
    for _ in 0..MAX_ITER {
        let e = (-r0 * z).exp();
        let f = z - 1.0 + e;
        let df = 1.0 - r0 * e;
        let next = z - f / df;
        if (next - z).abs() < NEWTON_TOLERANCE {
            return Ok(next);
        }
        z = next;
    }
    return Ok(z);
}

/// Next generation matrix for a stratified model with mixing matrix M,
/// contact rate beta, mean infectious duration D and stratum populations N:
///
/// K[i, j] = beta * D * M[i, j] * N[i] / N[j]
///
/// Entry (i, j) is the expected number of infections in stratum i caused by
/// one infectious individual in stratum j in a fully susceptible population.
pub fn next_generation_matrix(
    mixing: &Array2<Real>,
    contact_rate: Real,
    infectious_duration: Time,
    populations: &[Real],
) -> Result<Array2<Real>> {
    let n = populations.len();
    if mixing.nrows() != n || mixing.ncols() != n {
        return Err(ModelError::InvalidArgument(format!(
            "mixing matrix has shape {:?}, expected ({}, {})",
            mixing.shape(),
            n,
            n
        )));
    }
    if populations.iter().any(|&x| !(x > 0.0)) {
        return Err(ModelError::InvalidArgument(
            "stratum populations must be positive".into(),
        ));
    }
    let scale = contact_rate * infectious_duration;
    let ngm = Array2::from_shape_fn((n, n), |(i, j)| {
        scale * mixing[(i, j)] * populations[i] / populations[j]
    });
    return Ok(ngm);
}

/// Dominant eigenvalue of a non-negative square matrix by power iteration.
/// For a next generation matrix, this is R0.
pub fn dominant_eigenvalue(matrix: &Array2<Real>) -> Result<Real> {
    let n = matrix.nrows();
    if n == 0 || matrix.ncols() != n {
        return Err(ModelError::InvalidArgument(format!(
            "expected a non-empty square matrix, got shape {:?}",
            matrix.shape()
        )));
    }

    let mut v = Array1::from_elem(n, 1.0 / n as Real);
    let mut lambda = 0.0;
    for _ in 0..MAX_ITER {
        let w = matrix.dot(&v);
        let norm: Real = w.iter().map(|x| x.abs()).sum();
        if norm == 0.0 {
            return Ok(0.0);
        }
        let next = w / norm;
        let delta: Real = (&next - &v).iter().map(|x| x.abs()).sum();
        v = next;
        lambda = norm;
        if delta < POWER_TOLERANCE {
            break;
        }
    }
    return Ok(lambda);
}

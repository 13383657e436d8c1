//! Closed-form relations between rates, risks and durations.
//!
//! All formulas assume constant per-capita rates. They are the analytical
//! counterpart of simple two-compartment models and are used to validate
//! the output of the numerical solvers.
use crate::{
    error::{ModelError, Result},
    prelude::{Real, Time},
};

/// Proportion of a compartment that exits during an interval of length `t`
/// when the only exit happens with constant per-capita `rate`.
///
/// risk = 1 - exp(-rate * t)
pub fn risk_from_rate(rate: Real, t: Time) -> Result<Real> {
    check_non_negative("rate", rate)?;
    check_positive("time", t)?;
    Ok(1.0 - (-rate * t).exp())
}

/// Inverse of risk_from_rate(): the constant rate that produces the given
/// cumulative risk after time `t`.
///
/// rate = -ln(1 - risk) / t
pub fn rate_from_risk(risk: Real, t: Time) -> Result<Real> {
    if !(0.0..1.0).contains(&risk) {
        return Err(ModelError::InvalidArgument(format!(
            "risk must be in [0, 1), got {}",
            risk
        )));
    }
    check_positive("time", t)?;
    Ok(-(1.0 - risk).ln() / t)
}

/// Rate corresponding to a mean sojourn of `duration` in a single-exit
/// compartment.
pub fn rate_from_duration(duration: Time) -> Result<Real> {
    check_positive("duration", duration)?;
    Ok(1.0 / duration)
}

/// Probability of leaving a compartment in a single step of size `dt`.
#[inline]
pub fn step_probability(rate: Real, dt: Time) -> Result<Real> {
    risk_from_rate(rate, dt)
}

/// Proportion remaining in a compartment after `n` explicit Euler steps of
/// size `dt`. This is the discrete counterpart of exp(-rate * n * dt).
pub fn euler_remaining(rate: Real, dt: Time, n: usize) -> Real {
    (1.0 - rate * dt).powi(n as i32)
}

/// Expected time spent in a compartment with competing constant exits.
///
/// sojourn = 1 / sum(rates)
pub fn sojourn_time(rates: &[Real]) -> Result<Real> {
    Ok(1.0 / total_rate(rates)?)
}

/// Median time until any of the competing exits happens.
///
/// median = -ln(0.5) / sum(rates)
pub fn median_exit_time(rates: &[Real]) -> Result<Real> {
    Ok(-(0.5 as Real).ln() / total_rate(rates)?)
}

/// Probability that an individual leaves through each of the competing exits.
///
/// The i-th entry is rates[i] / sum(rates) and the result sums to one.
pub fn exit_proportions(rates: &[Real]) -> Result<Vec<Real>> {
    let total = total_rate(rates)?;
    Ok(rates.iter().map(|r| r / total).collect())
}

fn total_rate(rates: &[Real]) -> Result<Real> {
    if rates.is_empty() {
        return Err(ModelError::InvalidArgument(
            "at least one exit rate is required".into(),
        ));
    }
    for &r in rates {
        check_non_negative("rate", r)?;
    }
    let total: Real = rates.iter().sum();
    if total <= 0.0 {
        return Err(ModelError::InvalidArgument(
            "sum of exit rates must be positive".into(),
        ));
    }
    return Ok(total);
}

fn check_positive(what: &str, value: Real) -> Result<()> {
    if value > 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InvalidArgument(format!(
            "{} must be positive, got {}",
            what, value
        )))
    }
}

fn check_non_negative(what: &str, value: Real) -> Result<()> {
    if value >= 0.0 && value.is_finite() {
        Ok(())
    } else {
        Err(ModelError::InvalidArgument(format!(
            "{} must be non-negative, got {}",
            what, value
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn risk_after_ten_days() {
        let risk = risk_from_rate(0.1, 10.0).unwrap();
        assert_approx_eq!(risk, 1.0 - (-1.0 as Real).exp(), 1e-12);
        assert_approx_eq!(risk, 0.632, 1e-3);
    }

    #[test]
    fn rate_and_risk_are_inverse() {
        for &(risk, t) in &[(0.05, 1.0), (0.5, 7.0), (0.9, 30.0)] {
            let rate = rate_from_risk(risk, t).unwrap();
            assert_approx_eq!(risk_from_rate(rate, t).unwrap(), risk, 1e-6);
        }
    }

    #[test]
    fn competing_exits() {
        let rates = [0.01, 0.02];
        assert_approx_eq!(sojourn_time(&rates).unwrap(), 33.333, 1e-3);
        assert_approx_eq!(median_exit_time(&rates).unwrap(), 23.105, 1e-3);
        let props = exit_proportions(&rates).unwrap();
        assert_approx_eq!(props[0], 1.0 / 3.0, 1e-12);
        assert_approx_eq!(props.iter().sum::<Real>(), 1.0, 1e-12);
    }

    #[test]
    fn euler_remaining_matches_discrete_step() {
        assert_approx_eq!(euler_remaining(0.1, 1.0, 10), 0.9_f64.powi(10), 1e-12);
    }

    #[test]
    fn invalid_arguments() {
        assert!(rate_from_risk(1.0, 1.0).is_err());
        assert!(rate_from_risk(-0.1, 1.0).is_err());
        assert!(risk_from_rate(0.1, 0.0).is_err());
        assert!(sojourn_time(&[]).is_err());
        assert!(sojourn_time(&[0.0, 0.0]).is_err());
        assert!(rate_from_duration(-3.0).is_err());
    }
}

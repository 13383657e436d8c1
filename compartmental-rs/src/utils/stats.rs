use crate::prelude::{Real, INF, NAN};
use getset::CopyGetters;
use serde::{Deserialize, Serialize};

/// Accumulates a stream of samples and reports summary statistics.
pub trait Stats {
    fn add(&mut self, x: Real);
    fn add_many<I>(&mut self, xs: I)
    where
        I: IntoIterator<Item = Real>,
    {
        for x in xs {
            self.add(x);
        }
    }
    fn size(&self) -> usize;
    fn total(&self) -> Real;
    fn min(&self) -> Real;
    fn max(&self) -> Real;
    fn var(&self) -> Real;
    fn std(&self) -> Real {
        self.var().sqrt()
    }
    fn mean(&self) -> Real {
        self.total() / self.size() as Real
    }
    fn last(&self) -> Real;
    fn stats(&self) -> PointStats {
        PointStats {
            mean: self.mean(),
            std: self.std(),
            min: self.min(),
            max: self.max(),
            median: NAN,
            size: self.size(),
        }
    }
}

/// Stores all samples. Slower than PointStatsAcc, but can compute quantiles.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StatsVec {
    data: Vec<Real>,
}

impl StatsVec {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn stats_acc(&self) -> PointStatsAcc {
        let mut acc = PointStatsAcc::new();
        acc.add_many(self.data.iter().copied());
        return acc;
    }

    /// Quantile q in [0, 1] with linear interpolation between samples.
    pub fn quantile(&self, q: Real) -> Real {
        if self.data.is_empty() || !(0.0..=1.0).contains(&q) {
            return NAN;
        }
        let mut sorted = self.data.clone();
        sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
        let pos = q * (sorted.len() - 1) as Real;
        let (lo, hi) = (pos.floor() as usize, pos.ceil() as usize);
        let frac = pos - lo as Real;
        return sorted[lo] * (1.0 - frac) + sorted[hi] * frac;
    }

    pub fn median(&self) -> Real {
        self.quantile(0.5)
    }
}

impl From<Vec<Real>> for StatsVec {
    fn from(data: Vec<Real>) -> Self {
        StatsVec { data }
    }
}

impl Stats for StatsVec {
    fn add(&mut self, x: Real) {
        self.data.push(x);
    }
    fn total(&self) -> Real {
        return self.data.iter().sum();
    }
    fn var(&self) -> Real {
        self.stats_acc().var()
    }
    fn size(&self) -> usize {
        return self.data.len();
    }
    fn min(&self) -> Real {
        return self.data.iter().fold(INF, |acc, x| acc.min(*x));
    }
    fn max(&self) -> Real {
        return self.data.iter().fold(-INF, |acc, x| acc.max(*x));
    }
    fn stats(&self) -> PointStats {
        let acc = self.stats_acc();
        PointStats {
            mean: acc.mean(),
            std: acc.std(),
            min: acc.min(),
            max: acc.max(),
            median: self.median(),
            size: acc.size(),
        }
    }
    fn last(&self) -> Real {
        match self.data.last() {
            Some(x) => *x,
            _ => NAN,
        }
    }
}

/// Running statistics that do not store samples.
#[derive(Debug, Copy, Clone, PartialEq, CopyGetters)]
pub struct PointStatsAcc {
    n: usize,
    m1: Real,
    m2: Real,
    min: Real,
    max: Real,
    last: Real,
}

impl PointStatsAcc {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Stats for PointStatsAcc {
    fn add(&mut self, x: Real) {
        self.n += 1;
        self.m1 += x;
        self.m2 += x * x;
        self.min = Real::min(x, self.min);
        self.max = Real::max(x, self.max);
        self.last = x;
    }

    fn mean(&self) -> Real {
        self.m1 / self.n as Real
    }

    fn total(&self) -> Real {
        return self.m1;
    }

    fn var(&self) -> Real {
        let m = self.mean();
        return (self.m2 / self.n as Real - m * m).max(0.0);
    }

    fn min(&self) -> Real {
        self.min
    }
    fn max(&self) -> Real {
        self.max
    }
    fn size(&self) -> usize {
        self.n
    }
    fn last(&self) -> Real {
        return self.last;
    }
}

impl Default for PointStatsAcc {
    fn default() -> Self {
        PointStatsAcc {
            n: 0,
            m1: 0.,
            m2: 0.,
            min: INF,
            max: -INF,
            last: NAN,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, CopyGetters, Deserialize, Serialize)]
#[getset(get_copy = "pub")]
pub struct PointStats {
    mean: Real,
    std: Real,
    min: Real,
    max: Real,
    median: Real,
    size: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn simple_stats() {
        let mut acc = PointStatsAcc::new();
        acc.add(0.);
        acc.add_many(vec![1., 2., 3., 4.]);
        let st = acc.stats();
        assert_eq!(st.size(), 5);
        assert_approx_eq!(st.mean(), 2.0, 0.001);
        assert_approx_eq!(st.std(), 1.4142, 0.001);
        assert_eq!(st.max(), 4.0);
        assert!(st.median().is_nan());
    }

    #[test]
    fn stats_vec_quantiles() {
        let data = StatsVec::from(vec![4., 0., 3., 1., 2.]);
        let st = data.stats();
        assert_approx_eq!(st.mean(), 2.0, 1e-12);
        assert_approx_eq!(st.median(), 2.0, 1e-12);
        assert_approx_eq!(data.quantile(0.25), 1.0, 1e-12);
        assert_approx_eq!(data.quantile(0.125), 0.5, 1e-12);
        assert!(data.quantile(1.5).is_nan());
    }
}

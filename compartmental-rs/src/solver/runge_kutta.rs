use super::{OdeSystem, Solver};
use crate::prelude::{Real, Time};

/// Classical fourth-order Runge-Kutta method with a fixed step.
///
/// Buffers are kept between steps to avoid allocations.
#[derive(Debug, Clone, Default)]
pub struct RungeKutta4 {
    k1: Vec<Real>,
    k2: Vec<Real>,
    k3: Vec<Real>,
    k4: Vec<Real>,
    tmp: Vec<Real>,
}

impl RungeKutta4 {
    pub fn new() -> Self {
        Self::default()
    }

    fn resize(&mut self, n: usize) {
        if self.k1.len() != n {
            self.k1.resize(n, 0.0);
            self.k2.resize(n, 0.0);
            self.k3.resize(n, 0.0);
            self.k4.resize(n, 0.0);
            self.tmp.resize(n, 0.0);
        }
    }
}

impl Solver for RungeKutta4 {
    fn name(&self) -> &'static str {
        "rk4"
    }

    fn step<S: OdeSystem + ?Sized>(&mut self, system: &S, t: Time, y: &mut [Real], dt: Time) {
        let n = y.len();
        self.resize(n);
        let half = 0.5 * dt;

        system.derivatives(t, y, &mut self.k1);
        for i in 0..n {
            self.tmp[i] = y[i] + half * self.k1[i];
        }
        system.derivatives(t + half, &self.tmp, &mut self.k2);
        for i in 0..n {
            self.tmp[i] = y[i] + half * self.k2[i];
        }
        system.derivatives(t + half, &self.tmp, &mut self.k3);
        for i in 0..n {
            self.tmp[i] = y[i] + dt * self.k3[i];
        }
        system.derivatives(t + dt, &self.tmp, &mut self.k4);

        for i in 0..n {
            y[i] += (dt / 6.0) * (self.k1[i] + 2.0 * self.k2[i] + 2.0 * self.k3[i] + self.k4[i]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::{tests::Decay, Euler};
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn rk4_matches_exponential_decay() {
        let mut solver = RungeKutta4::new();
        let mut y = [1.0];
        for n in 0..100 {
            solver.step(&Decay(0.1), n as Time * 0.1, &mut y, 0.1);
        }
        assert_approx_eq!(y[0], (-1.0 as Real).exp(), 1e-9);
    }

    #[test]
    fn rk4_is_more_accurate_than_euler() {
        let (mut rk, mut euler) = (RungeKutta4::new(), Euler::new());
        let (mut a, mut b) = ([1.0], [1.0]);
        for n in 0..10 {
            rk.step(&Decay(0.1), n as Time, &mut a, 1.0);
            euler.step(&Decay(0.1), n as Time, &mut b, 1.0);
        }
        let exact = (-1.0 as Real).exp();
        assert!((a[0] - exact).abs() < 1e-5);
        assert!((a[0] - exact).abs() < (b[0] - exact).abs());
    }
}

use super::{OdeSystem, Solver};
use crate::prelude::{Real, Time};

/// Explicit (forward) Euler method:
///
/// y(t + dt) = y(t) + dt * f(t, y(t))
///
/// First order accurate. Large steps relative to the fastest rate in the
/// system overshoot and may drive compartments negative. This is a property
/// of the method and is not corrected.
#[derive(Debug, Clone, Default)]
pub struct Euler {
    dy: Vec<Real>,
}

impl Euler {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Solver for Euler {
    fn name(&self) -> &'static str {
        "euler"
    }

    fn step<S: OdeSystem + ?Sized>(&mut self, system: &S, t: Time, y: &mut [Real], dt: Time) {
        self.dy.resize(y.len(), 0.0);
        system.derivatives(t, y, &mut self.dy);
        for (x, dx) in y.iter_mut().zip(self.dy.iter()) {
            *x += dt * dx;
        }
    }
}

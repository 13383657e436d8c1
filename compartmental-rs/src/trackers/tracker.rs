/// Trait that implements a method that tracks some value of type T and
/// performs some action, like recording trajectories, collecting statistics
/// or emitting log messages.
///
/// The tracker receives an immutable reference to the tracked value.
/// Closures can be used as trackers by wrapping them in a FnTracker.
pub trait Tracker<T: ?Sized> {
    /// Track value.
    fn track(&mut self, value: &T);

    /// Execute tracker at iteration n only if it matches the given frequency
    /// and offset.
    fn maybe_track(&mut self, value: &T, n: usize, freq: usize, offset: usize) {
        if n >= offset && ((n - offset) % freq) == 0 {
            self.track(value);
        }
    }
}

/////////////////////////////////////////////////////////////////////////////
// Tracker instances
/////////////////////////////////////////////////////////////////////////////

impl<T: ?Sized> Tracker<T> for () {
    fn track(&mut self, _: &T) {}
}

impl<T, R1, R2> Tracker<T> for (R1, R2)
where
    T: ?Sized,
    R1: Tracker<T>,
    R2: Tracker<T>,
{
    fn track(&mut self, value: &T) {
        self.0.track(value);
        self.1.track(value);
    }
}

impl<T, R1, R2, R3> Tracker<T> for (R1, R2, R3)
where
    T: ?Sized,
    R1: Tracker<T>,
    R2: Tracker<T>,
    R3: Tracker<T>,
{
    fn track(&mut self, value: &T) {
        self.0.track(value);
        self.1.track(value);
        self.2.track(value);
    }
}

impl<T: ?Sized, R: Tracker<T>> Tracker<T> for &mut R {
    fn track(&mut self, value: &T) {
        (**self).track(value);
    }
}

/////////////////////////////////////////////////////////////////////////////
// Wrappers
/////////////////////////////////////////////////////////////////////////////

/// Wraps a closure as a tracker.
pub struct FnTracker<F>(pub F);

impl<T, F> Tracker<T> for FnTracker<F>
where
    T: ?Sized,
    F: FnMut(&T),
{
    fn track(&mut self, value: &T) {
        (&mut self.0)(value)
    }
}

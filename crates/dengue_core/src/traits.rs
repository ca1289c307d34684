use num_traits::{NumOps, One, Zero};
use std::fmt::Debug;
use std::ops::Neg;

/// A trait for types that can be used as scalars in the model right-hand side.
/// Must support field arithmetic, integer powers and conversion from f64.
pub trait Scalar: Copy + Debug + NumOps + Neg<Output = Self> + Zero + One + 'static {
    fn from_f64(value: f64) -> Self;

    /// Real part of the scalar (the value itself for f64).
    fn value(self) -> f64;

    fn powi(self, n: i32) -> Self;
}

impl Scalar for f64 {
    fn from_f64(value: f64) -> Self {
        value
    }

    fn value(self) -> f64 {
        self
    }

    fn powi(self, n: i32) -> Self {
        f64::powi(self, n)
    }
}

/// Represents a continuous-time dynamical system.
pub trait DynamicalSystem<T: Scalar> {
    /// Returns the dimension of the state space.
    fn dimension(&self) -> usize;

    /// Evaluates the vector field.
    /// x: current state
    /// t: current time
    /// out: buffer to write dx/dt into
    fn apply(&self, t: T, x: &[T], out: &mut [T]);
}

/// A trait for solvers that can step a system forward.
pub trait Steppable<T: Scalar> {
    /// Performs one step of size dt.
    /// t: current time (updated after step)
    /// state: current state (updated after step)
    /// dt: step size
    fn step(&mut self, system: &impl DynamicalSystem<T>, t: &mut T, state: &mut [T], dt: T);
}

use crate::traits::{DynamicalSystem, Scalar};
use num_traits::{One, Zero};
use std::ops::{Add, Div, Mul, Neg, Rem, Sub};

/// Simple Dual Number for Forward Mode AD
/// val: real part
/// eps: infinitesimal part
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Dual {
    pub val: f64,
    pub eps: f64,
}

impl Dual {
    pub fn new(val: f64, eps: f64) -> Self {
        Self { val, eps }
    }

    pub fn constant(val: f64) -> Self {
        Self::new(val, 0.0)
    }
}

impl Zero for Dual {
    fn zero() -> Self {
        Self::new(0.0, 0.0)
    }
    fn is_zero(&self) -> bool {
        self.val == 0.0 && self.eps == 0.0
    }
}

impl One for Dual {
    fn one() -> Self {
        Self::new(1.0, 0.0)
    }
}

impl Add for Dual {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self::new(self.val + rhs.val, self.eps + rhs.eps)
    }
}

impl Sub for Dual {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self::new(self.val - rhs.val, self.eps - rhs.eps)
    }
}

impl Mul for Dual {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self::new(self.val * rhs.val, self.val * rhs.eps + self.eps * rhs.val)
    }
}

impl Div for Dual {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        let denom = rhs.val * rhs.val;
        Self::new(
            self.val / rhs.val,
            (self.eps * rhs.val - self.val * rhs.eps) / denom,
        )
    }
}

impl Neg for Dual {
    type Output = Self;
    fn neg(self) -> Self {
        Self::new(-self.val, -self.eps)
    }
}

impl Rem for Dual {
    type Output = Self;
    fn rem(self, rhs: Self) -> Self {
        // Piecewise constant slope is dropped.
        Self::new(self.val % rhs.val, 0.0)
    }
}

impl Scalar for Dual {
    fn from_f64(value: f64) -> Self {
        Self::constant(value)
    }

    fn value(self) -> f64 {
        self.val
    }

    fn powi(self, n: i32) -> Self {
        let val_pow = self.val.powi(n);
        Self::new(val_pow, (n as f64) * self.val.powi(n - 1) * self.eps)
    }
}

/// Forward-mode Jacobian of `system` at `(t, state)`.
///
/// Column j is obtained by seeding `eps = 1` on the j-th state component.
/// The result is row-major: `jacobian[i * n + j] = d f_i / d x_j`.
pub fn forward_jacobian<S>(system: &S, t: f64, state: &[f64]) -> Vec<f64>
where
    S: DynamicalSystem<Dual>,
{
    let n = system.dimension();
    let mut jacobian = vec![0.0; n * n];
    let mut dual_x = vec![Dual::zero(); n];
    let mut dual_out = vec![Dual::zero(); n];
    let t_dual = Dual::constant(t);

    for j in 0..n {
        for i in 0..n {
            dual_x[i] = Dual::new(state[i], if i == j { 1.0 } else { 0.0 });
        }
        system.apply(t_dual, &dual_x, &mut dual_out);
        for i in 0..n {
            jacobian[i * n + j] = dual_out[i].eps;
        }
    }

    jacobian
}

#[cfg(test)]
mod tests {
    use super::{forward_jacobian, Dual};
    use crate::traits::{DynamicalSystem, Scalar};

    struct Quadratic;

    impl<T: Scalar> DynamicalSystem<T> for Quadratic {
        fn dimension(&self) -> usize {
            2
        }

        fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
            out[0] = x[0] * x[1];
            out[1] = x[0] / x[1] - x[1].powi(2);
        }
    }

    #[test]
    fn dual_quotient_rule_matches_closed_form() {
        let x = Dual::new(3.0, 1.0);
        let y = Dual::constant(2.0);
        let q = x / y;
        assert_eq!(q.val, 1.5);
        assert_eq!(q.eps, 0.5);

        let r = Dual::constant(3.0) / Dual::new(2.0, 1.0);
        assert!((r.eps + 0.75).abs() < 1e-15);
    }

    #[test]
    fn dual_powi_handles_negative_exponents() {
        let x = Dual::new(2.0, 1.0);
        let p = x.powi(-2);
        assert!((p.val - 0.25).abs() < 1e-15);
        assert!((p.eps + 0.25).abs() < 1e-15);
    }

    #[test]
    fn forward_jacobian_is_row_major() {
        let jac = forward_jacobian(&Quadratic, 0.0, &[2.0, 4.0]);
        let expected = [4.0, 2.0, 0.25, -2.0 / 16.0 - 8.0];
        for (got, want) in jac.iter().zip(expected.iter()) {
            assert!((got - want).abs() < 1e-12, "got {got}, want {want}");
        }
    }
}

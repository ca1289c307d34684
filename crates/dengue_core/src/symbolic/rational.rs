use super::expr::{rational_powi, Expr};
use super::poly::Poly;
use super::SymbolicError;
use num_rational::BigRational;
use num_traits::{One, ToPrimitive, Zero};
use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Quotient of polynomials kept in factored form:
/// `coefficient * Π factor^exponent`.
///
/// Factors are primitive, non-constant and distinct; exponents are non-zero
/// (negative exponents form the denominator). A value is zero exactly when its
/// coefficient is zero, which makes the zero test exact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RationalFunction {
    coefficient: BigRational,
    factors: BTreeMap<Poly, i32>,
}

impl RationalFunction {
    pub fn zero() -> Self {
        Self::constant(BigRational::zero())
    }

    pub fn one() -> Self {
        Self::constant(BigRational::one())
    }

    pub fn constant(value: BigRational) -> Self {
        Self {
            coefficient: value,
            factors: BTreeMap::new(),
        }
    }

    pub fn symbol(name: &str) -> Self {
        Self::from_poly(&Poly::symbol(name), &[])
    }

    /// Factors `poly` into numeric content, single-symbol factors and the
    /// polynomials of `known` that divide it exactly.
    pub fn from_poly(poly: &Poly, known: &[&Poly]) -> Self {
        if poly.is_zero() {
            return Self::zero();
        }
        let (content, primitive) = poly.primitive_part();
        let mut out = Self::constant(content);

        let monomial = primitive.monomial_content();
        let mut rest = primitive
            .div_monomial(&monomial)
            .unwrap_or_else(|| primitive.clone());
        for (name, e) in monomial.powers() {
            out.insert_factor(Poly::symbol(name), *e as i32);
        }

        for candidate in known {
            if candidate.num_terms() < 2 {
                continue;
            }
            while rest.num_terms() > 1 {
                match rest.exact_div(candidate) {
                    Some(quotient) => {
                        rest = quotient;
                        out.insert_factor((*candidate).clone(), 1);
                    }
                    None => break,
                }
            }
        }

        let (content, rest) = rest.primitive_part();
        out.coefficient *= content;
        match rest.constant_value() {
            Some(value) => out.coefficient *= value,
            None => out.insert_factor(rest, 1),
        }
        out
    }

    /// Exact conversion of an expression tree.
    pub fn from_expr(expr: &Expr) -> Result<Self, SymbolicError> {
        match expr {
            Expr::Number(n) => Ok(Self::constant(n.clone())),
            Expr::Symbol(name) => Ok(Self::symbol(name)),
            Expr::Add(items) => items
                .iter()
                .try_fold(Self::zero(), |acc, item| Ok(acc.add(&Self::from_expr(item)?))),
            Expr::Mul(items) => items
                .iter()
                .try_fold(Self::one(), |acc, item| Ok(acc.mul(&Self::from_expr(item)?))),
            Expr::Pow(base, n) => Self::from_expr(base)?.powi(*n),
        }
    }

    fn insert_factor(&mut self, poly: Poly, exponent: i32) {
        let entry = self.factors.entry(poly).or_insert(0);
        *entry += exponent;
        if *entry == 0 {
            self.factors.retain(|_, e| *e != 0);
        }
    }

    pub fn is_zero(&self) -> bool {
        self.coefficient.is_zero()
    }

    /// Distinct factors of the numerator.
    pub fn numerator_factors(&self) -> Vec<&Poly> {
        self.factors
            .iter()
            .filter(|(_, e)| **e > 0)
            .map(|(p, _)| p)
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.factors.keys().any(|p| p.contains(name))
    }

    pub fn contains_any(&self, names: &[String]) -> bool {
        names.iter().any(|n| self.contains(n))
    }

    pub fn mul(&self, other: &Self) -> Self {
        if self.is_zero() || other.is_zero() {
            return Self::zero();
        }
        let mut out = self.clone();
        out.coefficient = &out.coefficient * &other.coefficient;
        for (poly, e) in &other.factors {
            out.insert_factor(poly.clone(), *e);
        }
        out
    }

    pub fn recip(&self) -> Result<Self, SymbolicError> {
        if self.is_zero() {
            return Err(SymbolicError::DivisionByZero(self.to_string()));
        }
        Ok(Self {
            coefficient: self.coefficient.recip(),
            factors: self.factors.iter().map(|(p, e)| (p.clone(), -e)).collect(),
        })
    }

    pub fn div(&self, other: &Self) -> Result<Self, SymbolicError> {
        Ok(self.mul(&other.recip()?))
    }

    pub fn neg(&self) -> Self {
        let mut out = self.clone();
        out.coefficient = -out.coefficient;
        out
    }

    pub fn powi(&self, exponent: i32) -> Result<Self, SymbolicError> {
        if exponent == 0 {
            return Ok(Self::one());
        }
        if self.is_zero() {
            if exponent < 0 {
                return Err(SymbolicError::DivisionByZero("0".to_string()));
            }
            return Ok(Self::zero());
        }
        Ok(Self {
            coefficient: rational_powi(&self.coefficient, exponent),
            factors: self
                .factors
                .iter()
                .map(|(p, e)| (p.clone(), e * exponent))
                .collect(),
        })
    }

    /// Sum over the common denominator. Factors shared by both operands are
    /// pulled out before expansion and reused to cancel the new numerator.
    pub fn add(&self, other: &Self) -> Self {
        if self.is_zero() {
            return other.clone();
        }
        if other.is_zero() {
            return self.clone();
        }

        let mut shared: BTreeMap<&Poly, i32> = BTreeMap::new();
        for poly in self.factors.keys().chain(other.factors.keys()) {
            let a = self.factors.get(poly).copied().unwrap_or(0);
            let b = other.factors.get(poly).copied().unwrap_or(0);
            shared.insert(poly, a.min(b));
        }

        let expand = |value: &Self| {
            let mut acc = Poly::constant(value.coefficient.clone());
            for (poly, base) in &shared {
                let e = value.factors.get(*poly).copied().unwrap_or(0) - base;
                if e > 0 {
                    acc = &acc * &poly.powi(e as u32);
                }
            }
            acc
        };
        let numerator = &expand(self) + &expand(other);

        let known: Vec<&Poly> = shared.keys().copied().collect();
        let mut out = Self::from_poly(&numerator, &known);
        if out.is_zero() {
            return out;
        }
        for (poly, e) in shared {
            if e != 0 {
                out.insert_factor(poly.clone(), e);
            }
        }
        out
    }

    pub fn sub(&self, other: &Self) -> Self {
        self.add(&other.neg())
    }

    /// Replaces the symbol `name` by `value`.
    pub fn substitute(&self, name: &str, value: &Self) -> Result<Self, SymbolicError> {
        let mut out = Self::constant(self.coefficient.clone());
        for (poly, e) in &self.factors {
            let replaced = if poly.contains(name) {
                evaluate_at(poly, name, value)
            } else {
                let mut single = Self::one();
                single.insert_factor(poly.clone(), 1);
                single
            };
            out = out.mul(&replaced.powi(*e)?);
        }
        Ok(out)
    }

    pub fn evaluate(&self, values: &HashMap<String, f64>) -> Result<f64, SymbolicError> {
        let mut total = self.coefficient.to_f64().unwrap_or(f64::NAN);
        for (poly, e) in &self.factors {
            let v = poly.evaluate(values)?;
            if v == 0.0 && *e < 0 {
                return Err(SymbolicError::DivisionByZero(poly.to_expr().to_string()));
            }
            total *= v.powi(*e);
        }
        Ok(total)
    }

    pub fn to_expr(&self) -> Expr {
        let mut items = vec![Expr::Number(self.coefficient.clone())];
        for (poly, e) in &self.factors {
            items.push(poly.to_expr().pow(*e));
        }
        Expr::Mul(items).simplify()
    }
}

/// Horner evaluation of `poly` in `name` at a rational-function point.
fn evaluate_at(poly: &Poly, name: &str, value: &RationalFunction) -> RationalFunction {
    let known: Vec<&Poly> = value.factors.keys().collect();
    let coefficients = poly.coefficients_in(name);
    let mut acc = RationalFunction::zero();
    for coefficient in coefficients.iter().rev() {
        acc = acc
            .mul(value)
            .add(&RationalFunction::from_poly(coefficient, &known));
    }
    acc
}

impl fmt::Display for RationalFunction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_expr())
    }
}

#[cfg(test)]
mod tests {
    use super::RationalFunction;
    use crate::equation_engine::parse;

    fn rf(input: &str) -> RationalFunction {
        RationalFunction::from_expr(&parse(input).expect("expression should parse"))
            .expect("expression should convert")
    }

    #[test]
    fn sums_over_common_denominators_cancel() {
        let sum = rf("a/(a + b) + b/(a + b)");
        assert_eq!(sum, RationalFunction::one());
        assert!(rf("x/y - x/y").is_zero());
    }

    #[test]
    fn shared_numerator_factors_are_kept() {
        let value = rf("x*(a + b) + x*(a - b)");
        assert_eq!(value.to_string(), "2*a*x");
    }

    #[test]
    fn substitute_detects_vanishing_denominators() {
        let value = rf("1/(x - a)");
        let err = value
            .substitute("x", &rf("a"))
            .expect_err("denominator should vanish");
        assert!(err.to_string().contains("Division by zero"), "unexpected error: {err}");
    }

    #[test]
    fn substitute_then_evaluate_matches_direct_evaluation() {
        let value = rf("(x + 1)/(y*x - 2)");
        let replaced = value.substitute("x", &rf("y/3")).expect("substitution should work");
        let mut values = std::collections::HashMap::new();
        values.insert("y".to_string(), 4.0);
        let direct = (4.0 / 3.0 + 1.0) / (4.0 * 4.0 / 3.0 - 2.0);
        let got = replaced.evaluate(&values).expect("evaluation should work");
        assert!((got - direct).abs() < 1e-12, "got {got}, want {direct}");
    }

    #[test]
    fn display_writes_factored_quotients() {
        assert_eq!(rf("Lambda_H*N_H/(mu_H*N_H)").to_string(), "Lambda_H/mu_H");
        assert_eq!(rf("-(a + b)").to_string(), "-a - b");
    }
}

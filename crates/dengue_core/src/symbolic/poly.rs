use super::expr::{rational_powi, Expr};
use super::SymbolicError;
use num_bigint::BigInt;
use num_integer::Integer;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::{Add, Mul, Neg, Sub};

/// Power product of named symbols, e.g. `x^2*y`.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Monomial(BTreeMap<String, u32>);

impl Monomial {
    pub fn one() -> Self {
        Self(BTreeMap::new())
    }

    pub fn var(name: &str) -> Self {
        let mut powers = BTreeMap::new();
        powers.insert(name.to_string(), 1);
        Self(powers)
    }

    pub fn is_one(&self) -> bool {
        self.0.is_empty()
    }

    pub fn degree_in(&self, name: &str) -> u32 {
        self.0.get(name).copied().unwrap_or(0)
    }

    pub fn powers(&self) -> impl Iterator<Item = (&String, &u32)> {
        self.0.iter()
    }

    pub fn mul(&self, other: &Monomial) -> Monomial {
        let mut powers = self.0.clone();
        for (name, e) in &other.0 {
            *powers.entry(name.clone()).or_insert(0) += e;
        }
        Monomial(powers)
    }

    /// `self / other` when `other` divides `self`.
    pub fn divide(&self, other: &Monomial) -> Option<Monomial> {
        let mut powers = self.0.clone();
        for (name, e) in &other.0 {
            let current = powers.get(name).copied().unwrap_or(0);
            if current < *e {
                return None;
            }
            if current == *e {
                powers.remove(name);
            } else {
                powers.insert(name.clone(), current - e);
            }
        }
        Some(Monomial(powers))
    }

    pub fn gcd(&self, other: &Monomial) -> Monomial {
        let powers = self
            .0
            .iter()
            .filter_map(|(name, e)| {
                let shared = (*e).min(other.degree_in(name));
                (shared > 0).then(|| (name.clone(), shared))
            })
            .collect();
        Monomial(powers)
    }

    pub fn without(&self, name: &str) -> Monomial {
        let mut powers = self.0.clone();
        powers.remove(name);
        Monomial(powers)
    }

    /// Lexicographic term order with symbols ranked alphabetically.
    /// Compatible with multiplication, so it can drive exact division.
    pub fn lex_cmp(&self, other: &Monomial) -> Ordering {
        let names: BTreeSet<&String> = self.0.keys().chain(other.0.keys()).collect();
        for name in names {
            let ord = self.degree_in(name).cmp(&other.degree_in(name));
            if ord != Ordering::Equal {
                return ord;
            }
        }
        Ordering::Equal
    }

    fn to_expr(&self) -> Vec<Expr> {
        self.0
            .iter()
            .map(|(name, e)| {
                let symbol = Expr::Symbol(name.clone());
                if *e == 1 {
                    symbol
                } else {
                    symbol.pow(*e as i32)
                }
            })
            .collect()
    }
}

/// Expanded multivariate polynomial with exact rational coefficients.
/// Zero coefficients are never stored.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Poly {
    terms: BTreeMap<Monomial, BigRational>,
}

impl Poly {
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn constant(value: BigRational) -> Self {
        Self::term(Monomial::one(), value)
    }

    pub fn integer(value: i64) -> Self {
        Self::constant(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn symbol(name: &str) -> Self {
        Self::term(Monomial::var(name), BigRational::one())
    }

    pub fn term(monomial: Monomial, coefficient: BigRational) -> Self {
        let mut terms = BTreeMap::new();
        if !coefficient.is_zero() {
            terms.insert(monomial, coefficient);
        }
        Self { terms }
    }

    pub fn is_zero(&self) -> bool {
        self.terms.is_empty()
    }

    pub fn num_terms(&self) -> usize {
        self.terms.len()
    }

    pub fn terms(&self) -> impl Iterator<Item = (&Monomial, &BigRational)> {
        self.terms.iter()
    }

    /// The value of a constant polynomial (zero included).
    pub fn constant_value(&self) -> Option<BigRational> {
        match self.terms.len() {
            0 => Some(BigRational::zero()),
            1 => self
                .terms
                .iter()
                .next()
                .filter(|(m, _)| m.is_one())
                .map(|(_, c)| c.clone()),
            _ => None,
        }
    }

    pub fn symbols(&self) -> BTreeSet<String> {
        self.terms
            .keys()
            .flat_map(|m| m.powers().map(|(name, _)| name.clone()))
            .collect()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.terms.keys().any(|m| m.degree_in(name) > 0)
    }

    pub fn contains_any(&self, names: &[String]) -> bool {
        names.iter().any(|n| self.contains(n))
    }

    pub fn degree_in(&self, name: &str) -> u32 {
        self.terms.keys().map(|m| m.degree_in(name)).max().unwrap_or(0)
    }

    pub fn scale(&self, factor: &BigRational) -> Poly {
        if factor.is_zero() {
            return Poly::zero();
        }
        let terms = self
            .terms
            .iter()
            .map(|(m, c)| (m.clone(), c * factor))
            .collect();
        Poly { terms }
    }

    pub fn powi(&self, exponent: u32) -> Poly {
        let mut acc = Poly::integer(1);
        for _ in 0..exponent {
            acc = &acc * self;
        }
        acc
    }

    fn add_term(&mut self, monomial: Monomial, coefficient: BigRational) {
        let entry = self.terms.entry(monomial).or_insert_with(BigRational::zero);
        *entry += coefficient;
        if entry.is_zero() {
            self.terms.retain(|_, c| !c.is_zero());
        }
    }

    /// Leading term under [`Monomial::lex_cmp`].
    pub fn leading_term(&self) -> Option<(&Monomial, &BigRational)> {
        self.terms.iter().max_by(|a, b| a.0.lex_cmp(b.0))
    }

    /// Coefficients of `self` viewed as a polynomial in `name`; index is the power.
    pub fn coefficients_in(&self, name: &str) -> Vec<Poly> {
        let degree = self.degree_in(name) as usize;
        let mut out = vec![Poly::zero(); degree + 1];
        for (m, c) in &self.terms {
            out[m.degree_in(name) as usize].add_term(m.without(name), c.clone());
        }
        out
    }

    /// Largest monomial dividing every term.
    pub fn monomial_content(&self) -> Monomial {
        let mut iter = self.terms.keys();
        let first = match iter.next() {
            Some(m) => m.clone(),
            None => return Monomial::one(),
        };
        iter.fold(first, |acc, m| acc.gcd(m))
    }

    pub fn div_monomial(&self, divisor: &Monomial) -> Option<Poly> {
        let mut terms = BTreeMap::new();
        for (m, c) in &self.terms {
            terms.insert(m.divide(divisor)?, c.clone());
        }
        Some(Poly { terms })
    }

    /// Splits `self` into `content * primitive` where the primitive part has
    /// coprime integer coefficients and a positive leading coefficient.
    pub fn primitive_part(&self) -> (BigRational, Poly) {
        if self.is_zero() {
            return (BigRational::zero(), Poly::zero());
        }
        let denom_lcm = self
            .terms
            .values()
            .fold(BigInt::one(), |acc, c| acc.lcm(c.denom()));
        let numer_gcd = self.terms.values().fold(BigInt::zero(), |acc, c| {
            let scaled = c.numer() * (&denom_lcm / c.denom());
            acc.gcd(&scaled)
        });
        let mut content = BigRational::new(numer_gcd, denom_lcm);
        if let Some((_, lc)) = self.leading_term() {
            if lc.is_negative() {
                content = -content;
            }
        }
        let primitive = self.scale(&content.recip());
        (content, primitive)
    }

    /// Exact quotient `self / divisor`, or `None` when the division leaves a remainder.
    pub fn exact_div(&self, divisor: &Poly) -> Option<Poly> {
        let (lead_m, lead_c) = divisor.leading_term()?;
        let (lead_m, lead_c) = (lead_m.clone(), lead_c.clone());
        let mut remainder = self.clone();
        let mut quotient = Poly::zero();
        while let Some((m, c)) = remainder.leading_term() {
            let step = Poly::term(m.divide(&lead_m)?, c / &lead_c);
            remainder = &remainder - &(&step * divisor);
            quotient = &quotient + &step;
        }
        Some(quotient)
    }

    pub fn evaluate(&self, values: &HashMap<String, f64>) -> Result<f64, SymbolicError> {
        let mut total = 0.0;
        for (m, c) in &self.terms {
            let mut term = c.to_f64().unwrap_or(f64::NAN);
            for (name, e) in m.powers() {
                let value = values
                    .get(name)
                    .ok_or_else(|| SymbolicError::UnknownSymbol(name.clone()))?;
                term *= value.powi(*e as i32);
            }
            total += term;
        }
        Ok(total)
    }

    pub fn to_expr(&self) -> Expr {
        let terms: Vec<Expr> = self
            .terms
            .iter()
            .map(|(m, c)| {
                let mut factors = vec![Expr::Number(c.clone())];
                factors.extend(m.to_expr());
                Expr::Mul(factors)
            })
            .collect();
        Expr::Add(terms).simplify()
    }

    /// Expands an expression without negative powers into a polynomial.
    pub fn from_expr(expr: &Expr) -> Result<Poly, SymbolicError> {
        match expr {
            Expr::Number(n) => Ok(Poly::constant(n.clone())),
            Expr::Symbol(name) => Ok(Poly::symbol(name)),
            Expr::Add(items) => items
                .iter()
                .try_fold(Poly::zero(), |acc, item| Ok(&acc + &Poly::from_expr(item)?)),
            Expr::Mul(items) => items
                .iter()
                .try_fold(Poly::integer(1), |acc, item| Ok(&acc * &Poly::from_expr(item)?)),
            Expr::Pow(base, n) if *n >= 0 => Ok(Poly::from_expr(base)?.powi(*n as u32)),
            Expr::Pow(base, n) => match base.as_ref() {
                Expr::Number(v) if !v.is_zero() => Ok(Poly::constant(rational_powi(v, *n))),
                _ => Err(SymbolicError::Unsupported(format!(
                    "{expr} is not a polynomial"
                ))),
            },
        }
    }
}

impl Add for &Poly {
    type Output = Poly;
    fn add(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), c.clone());
        }
        out
    }
}

impl Sub for &Poly {
    type Output = Poly;
    fn sub(self, rhs: &Poly) -> Poly {
        let mut out = self.clone();
        for (m, c) in &rhs.terms {
            out.add_term(m.clone(), -c.clone());
        }
        out
    }
}

impl Mul for &Poly {
    type Output = Poly;
    fn mul(self, rhs: &Poly) -> Poly {
        let mut out = Poly::zero();
        for (ma, ca) in &self.terms {
            for (mb, cb) in &rhs.terms {
                out.add_term(ma.mul(mb), ca * cb);
            }
        }
        out
    }
}

impl Neg for &Poly {
    type Output = Poly;
    fn neg(self) -> Poly {
        self.scale(&-BigRational::one())
    }
}

#[cfg(test)]
mod tests {
    use super::{Monomial, Poly};
    use crate::equation_engine::parse;
    use num_bigint::BigInt;
    use num_rational::BigRational;
    use std::cmp::Ordering;

    fn poly(input: &str) -> Poly {
        Poly::from_expr(&parse(input).expect("expression should parse"))
            .expect("expression should be polynomial")
    }

    #[test]
    fn lex_order_is_compatible_with_multiplication() {
        let a = Monomial::var("a");
        let b = Monomial::var("b");
        assert_eq!(a.lex_cmp(&b), Ordering::Greater);
        let ab = a.mul(&b);
        let aa = a.mul(&a);
        assert_eq!(aa.lex_cmp(&ab), Ordering::Greater);
        assert_eq!(aa.mul(&b).lex_cmp(&ab.mul(&b)), Ordering::Greater);
    }

    #[test]
    fn expansion_cancels_terms() {
        let p = poly("(x + y)*(x - y) - x^2 + y^2");
        assert!(p.is_zero());
    }

    #[test]
    fn exact_div_detects_factors() {
        let product = poly("(a + 2*b)*(c - a)");
        let quotient = product
            .exact_div(&poly("a + 2*b"))
            .expect("factor should divide");
        assert_eq!(quotient, poly("c - a"));
        assert!(product.exact_div(&poly("a + b")).is_none());
    }

    #[test]
    fn primitive_part_normalizes_content_and_sign() {
        let p = poly("-2*x/3 - 4*y/3");
        let (content, primitive) = p.primitive_part();
        assert_eq!(content, BigRational::new(BigInt::from(-2), BigInt::from(3)));
        assert_eq!(primitive, poly("x + 2*y"));
    }

    #[test]
    fn coefficients_in_splits_by_power() {
        let p = poly("a*x^2 + b*x + c");
        let coeffs = p.coefficients_in("x");
        assert_eq!(coeffs.len(), 3);
        assert_eq!(coeffs[0], poly("c"));
        assert_eq!(coeffs[1], poly("b"));
        assert_eq!(coeffs[2], poly("a"));
        assert_eq!(p.monomial_content(), Monomial::one());
        assert_eq!(poly("x^2*y + x*y^3").monomial_content(), Monomial::var("x").mul(&Monomial::var("y")));
    }
}

use super::SymbolicError;
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::{One, Signed, ToPrimitive, Zero};
use RustedSciThe::symbolic::symbolic_engine::Expr as SciExpr;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

/// Symbolic expression tree.
///
/// Subtraction is stored as addition of a `-1` multiple and division as a
/// negative integer power, so the tree only needs sums, products and powers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Expr {
    Number(BigRational),
    Symbol(String),
    Add(Vec<Expr>),
    Mul(Vec<Expr>),
    Pow(Box<Expr>, i32),
}

impl Expr {
    pub fn int(value: i64) -> Self {
        Expr::Number(BigRational::from_integer(BigInt::from(value)))
    }

    pub fn zero() -> Self {
        Expr::int(0)
    }

    pub fn one() -> Self {
        Expr::int(1)
    }

    pub fn symbol(name: &str) -> Self {
        Expr::Symbol(name.to_string())
    }

    pub fn pow(self, exponent: i32) -> Self {
        Expr::Pow(Box::new(self), exponent)
    }

    pub fn is_zero(&self) -> bool {
        matches!(self, Expr::Number(n) if n.is_zero())
    }

    pub fn is_one(&self) -> bool {
        matches!(self, Expr::Number(n) if n.is_one())
    }

    /// Names of all symbols appearing in the expression.
    pub fn symbols(&self) -> BTreeSet<String> {
        let mut out = BTreeSet::new();
        self.collect_symbols(&mut out);
        out
    }

    fn collect_symbols(&self, out: &mut BTreeSet<String>) {
        match self {
            Expr::Number(_) => {}
            Expr::Symbol(name) => {
                out.insert(name.clone());
            }
            Expr::Add(items) | Expr::Mul(items) => {
                for item in items {
                    item.collect_symbols(out);
                }
            }
            Expr::Pow(base, _) => base.collect_symbols(out),
        }
    }

    /// Exact copy of a RustedSciThe expression. Constants become the rational
    /// equal to their `f64` value; powers need an integer exponent.
    pub fn from_sci(expr: &SciExpr) -> Result<Expr, SymbolicError> {
        Ok(match expr {
            SciExpr::Var(name) => Expr::Symbol(name.clone()),
            SciExpr::Const(value) => BigRational::from_float(*value)
                .map(Expr::Number)
                .ok_or_else(|| SymbolicError::Unsupported(format!("non-finite constant {value}")))?,
            SciExpr::Add(a, b) => Expr::from_sci(a)? + Expr::from_sci(b)?,
            SciExpr::Sub(a, b) => Expr::from_sci(a)? - Expr::from_sci(b)?,
            SciExpr::Mul(a, b) => Expr::from_sci(a)? * Expr::from_sci(b)?,
            SciExpr::Div(a, b) => Expr::from_sci(a)? / Expr::from_sci(b)?,
            SciExpr::Pow(base, exponent) => {
                let n = match Expr::from_sci(exponent)?.simplify() {
                    Expr::Number(n) if n.is_integer() => n.to_integer().to_i32(),
                    _ => None,
                };
                match n {
                    Some(n) => Expr::from_sci(base)?.pow(n),
                    None => {
                        return Err(SymbolicError::Unsupported(format!("non-integer power in {expr}")))
                    }
                }
            }
            other => return Err(SymbolicError::Unsupported(other.to_string())),
        })
    }

    /// Replaces symbols by expressions. The result is not simplified.
    pub fn substitute(&self, values: &HashMap<String, Expr>) -> Expr {
        match self {
            Expr::Number(_) => self.clone(),
            Expr::Symbol(name) => values.get(name).cloned().unwrap_or_else(|| self.clone()),
            Expr::Add(items) => Expr::Add(items.iter().map(|i| i.substitute(values)).collect()),
            Expr::Mul(items) => Expr::Mul(items.iter().map(|i| i.substitute(values)).collect()),
            Expr::Pow(base, n) => Expr::Pow(Box::new(base.substitute(values)), *n),
        }
    }

    /// Canonical simplification: flattening, constant folding, like-term and
    /// like-factor collection, and distribution of a numeric coefficient over a
    /// single sum. No expansion of products of sums.
    pub fn simplify(&self) -> Expr {
        match self {
            Expr::Number(_) | Expr::Symbol(_) => self.clone(),
            Expr::Add(items) => simplify_add(items.iter().map(Expr::simplify).collect()),
            Expr::Mul(items) => simplify_mul(items.iter().map(Expr::simplify).collect()),
            Expr::Pow(base, n) => simplify_pow(base.simplify(), *n),
        }
    }

    /// Splits a simplified term into its numeric coefficient and the rest.
    fn split_coefficient(&self) -> (BigRational, Expr) {
        match self {
            Expr::Number(n) => (n.clone(), Expr::one()),
            Expr::Mul(items) => match items.first() {
                Some(Expr::Number(n)) => {
                    let rest: Vec<Expr> = items[1..].to_vec();
                    let rest = if rest.len() == 1 {
                        rest.into_iter().next().unwrap_or_else(Expr::one)
                    } else {
                        Expr::Mul(rest)
                    };
                    (n.clone(), rest)
                }
                _ => (BigRational::one(), self.clone()),
            },
            _ => (BigRational::one(), self.clone()),
        }
    }

    fn precedence(&self) -> u8 {
        match self {
            Expr::Add(_) => 1,
            Expr::Mul(_) => 2,
            Expr::Number(n) if !n.is_integer() || n.is_negative() => 2,
            Expr::Pow(_, n) if *n < 0 => 2,
            Expr::Pow(_, _) => 3,
            Expr::Number(_) | Expr::Symbol(_) => 4,
        }
    }
}

pub(crate) fn rational_powi(base: &BigRational, exponent: i32) -> BigRational {
    let mut acc = BigRational::one();
    for _ in 0..exponent.unsigned_abs() {
        acc = &acc * base;
    }
    if exponent < 0 {
        acc.recip()
    } else {
        acc
    }
}

fn simplify_pow(base: Expr, exponent: i32) -> Expr {
    if exponent == 0 {
        return Expr::one();
    }
    if exponent == 1 {
        return base;
    }
    match base {
        Expr::Number(n) if !(n.is_zero() && exponent < 0) => Expr::Number(rational_powi(&n, exponent)),
        Expr::Pow(inner, m) => simplify_pow(*inner, m * exponent),
        Expr::Mul(items) => {
            simplify_mul(items.into_iter().map(|f| simplify_pow(f, exponent)).collect())
        }
        other => Expr::Pow(Box::new(other), exponent),
    }
}

fn simplify_mul(items: Vec<Expr>) -> Expr {
    let mut coefficient = BigRational::one();
    let mut powers: BTreeMap<Expr, i32> = BTreeMap::new();
    let mut stack = items;
    while let Some(item) = stack.pop() {
        match item {
            Expr::Mul(inner) => stack.extend(inner),
            Expr::Number(n) => coefficient *= n,
            Expr::Pow(base, n) => *powers.entry(*base).or_insert(0) += n,
            other => *powers.entry(other).or_insert(0) += 1,
        }
    }
    if coefficient.is_zero() {
        return Expr::zero();
    }

    let mut factors = Vec::new();
    for (base, n) in powers {
        match simplify_pow(base, n) {
            Expr::Number(c) => coefficient *= c,
            Expr::Mul(inner) => {
                for f in inner {
                    match f {
                        Expr::Number(c) => coefficient *= c,
                        other => factors.push(other),
                    }
                }
            }
            other => factors.push(other),
        }
    }
    factors.sort();

    if factors.is_empty() {
        return Expr::Number(coefficient);
    }
    if factors.len() == 1 {
        if coefficient.is_one() {
            return factors.remove(0);
        }
        if let Expr::Add(terms) = &factors[0] {
            let scaled = terms
                .iter()
                .map(|t| simplify_mul(vec![Expr::Number(coefficient.clone()), t.clone()]))
                .collect();
            return simplify_add(scaled);
        }
    }
    if !coefficient.is_one() {
        factors.insert(0, Expr::Number(coefficient));
    }
    Expr::Mul(factors)
}

fn simplify_add(items: Vec<Expr>) -> Expr {
    let mut constant = BigRational::zero();
    let mut collected: BTreeMap<Expr, BigRational> = BTreeMap::new();
    let mut stack = items;
    while let Some(item) = stack.pop() {
        match item {
            Expr::Add(inner) => stack.extend(inner),
            Expr::Number(n) => constant += n,
            other => {
                let (c, rest) = other.split_coefficient();
                *collected.entry(rest).or_insert_with(BigRational::zero) += c;
            }
        }
    }

    let mut terms = Vec::new();
    for (rest, c) in collected {
        if c.is_zero() {
            continue;
        }
        if c.is_one() {
            terms.push(rest);
        } else {
            terms.push(simplify_mul(vec![Expr::Number(c), rest]));
        }
    }
    terms.sort_by(|a, b| {
        let (_, ra) = a.split_coefficient();
        let (_, rb) = b.split_coefficient();
        ra.cmp(&rb)
    });
    if !constant.is_zero() {
        terms.push(Expr::Number(constant));
    }

    match terms.len() {
        0 => Expr::zero(),
        1 => terms.remove(0),
        _ => Expr::Add(terms),
    }
}

impl Add for Expr {
    type Output = Expr;
    fn add(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, rhs])
    }
}

impl Sub for Expr {
    type Output = Expr;
    fn sub(self, rhs: Expr) -> Expr {
        Expr::Add(vec![self, -rhs])
    }
}

impl Mul for Expr {
    type Output = Expr;
    fn mul(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs])
    }
}

impl Div for Expr {
    type Output = Expr;
    fn div(self, rhs: Expr) -> Expr {
        Expr::Mul(vec![self, rhs.pow(-1)])
    }
}

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Mul(vec![Expr::int(-1), self])
    }
}

// --- Display ---

fn write_wrapped(f: &mut fmt::Formatter<'_>, expr: &Expr, min_precedence: u8) -> fmt::Result {
    if expr.precedence() < min_precedence {
        write!(f, "({expr})")
    } else {
        write!(f, "{expr}")
    }
}

/// Powers sort next to their base so `N_H^2` lands where `N_H` would.
fn display_base(expr: &Expr) -> &Expr {
    match expr {
        Expr::Pow(base, _) => base,
        other => other,
    }
}

fn write_product(f: &mut fmt::Formatter<'_>, factors: &[Expr]) -> fmt::Result {
    let mut coefficient = BigRational::one();
    let mut numerator: Vec<Expr> = Vec::new();
    let mut denominator: Vec<Expr> = Vec::new();
    for factor in factors {
        match factor {
            Expr::Number(n) => coefficient *= n,
            Expr::Pow(base, n) if *n < 0 => {
                denominator.push(simplify_pow((**base).clone(), -n));
            }
            other => numerator.push(other.clone()),
        }
    }
    numerator.sort_by(|a, b| display_base(a).cmp(display_base(b)));
    denominator.sort_by(|a, b| display_base(a).cmp(display_base(b)));

    let numer_int = coefficient.numer().clone();
    let denom_int = coefficient.denom().clone();
    if numer_int.is_negative() {
        write!(f, "-")?;
    }
    let numer_abs = numer_int.abs();
    if numerator.is_empty() {
        write!(f, "{numer_abs}")?;
    } else {
        if !numer_abs.is_one() {
            write!(f, "{numer_abs}*")?;
        }
        for (idx, factor) in numerator.iter().enumerate() {
            if idx > 0 {
                write!(f, "*")?;
            }
            write_wrapped(f, factor, 3)?;
        }
    }

    if !denom_int.is_one() {
        denominator.insert(0, Expr::Number(BigRational::from_integer(denom_int)));
    }
    match denominator.len() {
        0 => Ok(()),
        1 => {
            write!(f, "/")?;
            write_wrapped(f, &denominator[0], 3)
        }
        _ => {
            write!(f, "/(")?;
            for (idx, factor) in denominator.iter().enumerate() {
                if idx > 0 {
                    write!(f, "*")?;
                }
                write_wrapped(f, factor, 3)?;
            }
            write!(f, ")")
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Number(n) => {
                if n.is_integer() {
                    write!(f, "{}", n.numer())
                } else {
                    write!(f, "{}/{}", n.numer(), n.denom())
                }
            }
            Expr::Symbol(name) => write!(f, "{name}"),
            Expr::Add(terms) => {
                for (idx, term) in terms.iter().enumerate() {
                    let (c, rest) = term.split_coefficient();
                    if c.is_negative() {
                        let positive = simplify_mul(vec![Expr::Number(-c), rest]);
                        if idx == 0 {
                            write!(f, "-")?;
                        } else {
                            write!(f, " - ")?;
                        }
                        write_wrapped(f, &positive, 2)?;
                    } else {
                        if idx > 0 {
                            write!(f, " + ")?;
                        }
                        write!(f, "{term}")?;
                    }
                }
                Ok(())
            }
            Expr::Mul(factors) => write_product(f, factors),
            Expr::Pow(_, n) if *n < 0 => write_product(f, std::slice::from_ref(self)),
            Expr::Pow(base, n) => {
                write_wrapped(f, base, 4)?;
                write!(f, "^{n}")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{Expr, SciExpr, SymbolicError};
    use crate::equation_engine::parse;

    fn simplified(input: &str) -> String {
        parse(input).expect("expression should parse").simplify().to_string()
    }

    #[test]
    fn simplify_collects_like_terms_and_factors() {
        assert_eq!(simplified("x + x + 2*y - y"), "2*x + y");
        assert_eq!(simplified("x*y*x/y"), "x^2");
        assert_eq!(simplified("a - a"), "0");
        assert_eq!(simplified("3*(a + b)"), "3*a + 3*b");
    }

    #[test]
    fn display_writes_quotients() {
        assert_eq!(simplified("beta_H*S_H*I_V/N_H"), "I_V*S_H*beta_H/N_H");
        assert_eq!(simplified("a/(b*c)"), "a/(b*c)");
        assert_eq!(simplified("-a/2"), "-a/2");
        assert_eq!(simplified("1/(a + b)"), "1/(a + b)");
    }

    #[test]
    fn display_orders_powers_with_their_base() {
        assert_eq!(simplified("beta_H*S_H^2*I_V"), "I_V*S_H^2*beta_H");
        assert_eq!(simplified("z*x^2*a"), "a*x^2*z");
        assert_eq!(simplified("b/(a*N_H^2*c)"), "b/(N_H^2*a*c)");
    }

    #[test]
    fn converts_rusted_sci_the_expressions() {
        let x = SciExpr::Var("x".to_string());
        let y = SciExpr::Var("y".to_string());
        let sci = (SciExpr::Const(1.0) - x.clone()) * y.clone() / (x.clone() + SciExpr::Const(0.5));
        let exact = Expr::from_sci(&sci).expect("expression should convert");
        assert_eq!(exact.simplify(), parse("(1 - x)*y/(x + 1/2)").expect("expression should parse").simplify());

        let squared = SciExpr::Pow(Box::new(x.clone()), Box::new(SciExpr::Const(2.0)));
        assert_eq!(Expr::from_sci(&squared).expect("integer power").simplify().to_string(), "x^2");

        let root = SciExpr::Pow(Box::new(x), Box::new(SciExpr::Const(0.5)));
        let err = Expr::from_sci(&root).expect_err("fractional power is outside the exact layer");
        assert!(matches!(err, SymbolicError::Unsupported(_)));
    }

    #[test]
    fn substitute_replaces_symbols() {
        let expr = parse("a*b + c").expect("expression should parse");
        let mut values = std::collections::HashMap::new();
        values.insert("b".to_string(), Expr::int(0));
        assert_eq!(expr.substitute(&values).simplify().to_string(), "c");
    }
}

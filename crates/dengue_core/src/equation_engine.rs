use crate::symbolic::{Expr, SymbolicError};
use crate::traits::{DynamicalSystem, Scalar};
use num_bigint::BigInt;
use num_rational::BigRational;
use num_traits::ToPrimitive;
use std::cell::RefCell;
use std::collections::HashMap;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values (f64 or Dual).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a state variable (by index) onto the stack.
    LoadVar(usize),
    /// Pushes the value of a parameter (by index) onto the stack.
    LoadParam(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top value (a), pushes a^n.
    Powi(i32),
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating compiled expressions.
///
/// The VM is stateless; `execute` takes the state vector, the parameter
/// vector and a scratch stack, and returns the value left on the stack.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(bytecode: &Bytecode, vars: &[T], params: &[T], stack: &mut Vec<T>) -> T {
        stack.clear();

        for op in &bytecode.ops {
            match op {
                OpCode::LoadConst(val) => stack.push(T::from_f64(*val)),
                OpCode::LoadVar(idx) => stack.push(vars[*idx]),
                OpCode::LoadParam(idx) => stack.push(params[*idx]),
                OpCode::Add => {
                    let b = stack.pop().unwrap_or_else(T::zero);
                    let a = stack.pop().unwrap_or_else(T::zero);
                    stack.push(a + b);
                }
                OpCode::Mul => {
                    let b = stack.pop().unwrap_or_else(T::one);
                    let a = stack.pop().unwrap_or_else(T::one);
                    stack.push(a * b);
                }
                OpCode::Powi(n) => {
                    let a = stack.pop().unwrap_or_else(T::zero);
                    stack.push(a.powi(*n));
                }
            }
        }

        stack.pop().unwrap_or_else(T::zero)
    }
}

/// Compiles a symbolic `Expr` into `Bytecode`.
/// Resolves variable and parameter names to indices.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
    pub param_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String], param_names: &[String]) -> Self {
        let var_map = var_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        let param_map = param_names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();
        Self { var_map, param_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, SymbolicError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), SymbolicError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(n.to_f64().unwrap_or(f64::NAN))),
            Expr::Symbol(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else if let Some(&idx) = self.param_map.get(name) {
                    ops.push(OpCode::LoadParam(idx));
                } else {
                    return Err(SymbolicError::UnknownSymbol(name.clone()));
                }
            }
            Expr::Add(items) => self.compile_fold(items, OpCode::Add, 0.0, ops)?,
            Expr::Mul(items) => self.compile_fold(items, OpCode::Mul, 1.0, ops)?,
            Expr::Pow(base, n) => {
                self.compile_recursive(base, ops)?;
                ops.push(OpCode::Powi(*n));
            }
        }
        Ok(())
    }

    fn compile_fold(
        &self,
        items: &[Expr],
        op: OpCode,
        identity: f64,
        ops: &mut Vec<OpCode>,
    ) -> Result<(), SymbolicError> {
        let Some((first, rest)) = items.split_first() else {
            ops.push(OpCode::LoadConst(identity));
            return Ok(());
        };
        self.compile_recursive(first, ops)?;
        for item in rest {
            self.compile_recursive(item, ops)?;
            ops.push(op);
        }
        Ok(())
    }
}

// --- Parser ---

/// Parses a string expression into an exact symbolic tree.
///
/// Supported syntax: decimal literals, identifiers, `+ - * /`, unary minus,
/// parentheses and `^` with an integer exponent.
pub fn parse(input: &str) -> Result<Expr, SymbolicError> {
    let tokens = tokenize(input)?;
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        None => Ok(expr),
        Some(token) => Err(SymbolicError::Parse(format!("unexpected token {token:?}"))),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(BigRational),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

/// Exact value of a decimal literal such as `0.05`.
fn parse_decimal(text: &str) -> Result<BigRational, SymbolicError> {
    let invalid = || SymbolicError::Parse(format!("invalid number '{text}'"));
    let (whole, frac) = match text.split_once('.') {
        Some((w, f)) => (w, f),
        None => (text, ""),
    };
    if whole.is_empty() && frac.is_empty() {
        return Err(invalid());
    }
    let digits = format!("{whole}{frac}");
    let numer: BigInt = digits.parse().map_err(|_| invalid())?;
    let denom = num_traits::pow(BigInt::from(10), frac.len());
    Ok(BigRational::new(numer, denom))
}

fn tokenize(input: &str) -> Result<Vec<Token>, SymbolicError> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if c.is_whitespace() {
            chars.next();
        } else if c.is_ascii_digit() || c == '.' {
            let mut num_str = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_ascii_digit() || d == '.' {
                    num_str.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Number(parse_decimal(&num_str)?));
        } else if c.is_alphabetic() || c == '_' {
            let mut ident = String::new();
            while let Some(&d) = chars.peek() {
                if d.is_alphanumeric() || d == '_' {
                    ident.push(d);
                    chars.next();
                } else {
                    break;
                }
            }
            tokens.push(Token::Identifier(ident));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                other => {
                    return Err(SymbolicError::Parse(format!("unexpected character '{other}'")))
                }
            };
            tokens.push(token);
            chars.next();
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn consume(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn parse_expression(&mut self) -> Result<Expr, SymbolicError> {
        let mut left = self.parse_product()?;
        loop {
            match self.peek() {
                Some(Token::Plus) => {
                    self.consume();
                    left = left + self.parse_product()?;
                }
                Some(Token::Minus) => {
                    self.consume();
                    left = left - self.parse_product()?;
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_product(&mut self) -> Result<Expr, SymbolicError> {
        let mut left = self.parse_unary()?;
        loop {
            match self.peek() {
                Some(Token::Star) => {
                    self.consume();
                    left = left * self.parse_unary()?;
                }
                Some(Token::Slash) => {
                    self.consume();
                    left = left / self.parse_unary()?;
                }
                _ => return Ok(left),
            }
        }
    }

    fn parse_unary(&mut self) -> Result<Expr, SymbolicError> {
        if let Some(Token::Minus) = self.peek() {
            self.consume();
            return Ok(-self.parse_unary()?);
        }
        self.parse_power()
    }

    fn parse_power(&mut self) -> Result<Expr, SymbolicError> {
        let base = self.parse_primary()?;
        if let Some(Token::Caret) = self.peek() {
            self.consume();
            let exponent = self.parse_exponent()?;
            return Ok(base.pow(exponent));
        }
        Ok(base)
    }

    fn parse_exponent(&mut self) -> Result<i32, SymbolicError> {
        let negative = if let Some(Token::Minus) = self.peek() {
            self.consume();
            true
        } else {
            false
        };
        let value = match self.consume() {
            Some(Token::Number(n)) if n.is_integer() => n.to_integer().to_i32(),
            Some(Token::LParen) => {
                let inner = self.parse_expression()?.simplify();
                match self.consume() {
                    Some(Token::RParen) => {}
                    _ => return Err(SymbolicError::Parse("expected ')'".to_string())),
                }
                match inner {
                    Expr::Number(n) if n.is_integer() => n.to_integer().to_i32(),
                    _ => None,
                }
            }
            _ => None,
        };
        match value {
            Some(n) if negative => Ok(-n),
            Some(n) => Ok(n),
            None => Err(SymbolicError::Unsupported(
                "exponents must be integer literals".to_string(),
            )),
        }
    }

    fn parse_primary(&mut self) -> Result<Expr, SymbolicError> {
        match self.consume() {
            Some(Token::Number(n)) => Ok(Expr::Number(n)),
            Some(Token::Identifier(name)) => {
                if let Some(Token::LParen) = self.peek() {
                    return Err(SymbolicError::Unsupported(format!("function call {name}(...)")));
                }
                Ok(Expr::Symbol(name))
            }
            Some(Token::LParen) => {
                let expr = self.parse_expression()?;
                match self.consume() {
                    Some(Token::RParen) => Ok(expr),
                    _ => Err(SymbolicError::Parse("expected ')'".to_string())),
                }
            }
            Some(token) => Err(SymbolicError::Parse(format!("unexpected token {token:?}"))),
            None => Err(SymbolicError::Parse("unexpected end of input".to_string())),
        }
    }
}

// --- EquationSystem ---

/// A `DynamicalSystem` backed by one compiled expression per state variable.
pub struct EquationSystem<T: Scalar> {
    pub equations: Vec<Bytecode>,
    pub params: Vec<T>,
    // Scratch stack reused across evaluations; makes the system !Sync.
    stack: RefCell<Vec<T>>,
}

impl<T: Scalar> EquationSystem<T> {
    pub fn new(equations: Vec<Bytecode>, params: Vec<T>) -> Self {
        Self {
            equations,
            params,
            stack: RefCell::new(Vec::with_capacity(64)),
        }
    }

    /// Compiles `expressions` against the given variable and parameter names.
    pub fn compile(
        expressions: &[Expr],
        var_names: &[String],
        param_names: &[String],
        params: Vec<T>,
    ) -> Result<Self, SymbolicError> {
        let compiler = Compiler::new(var_names, param_names);
        let equations = expressions
            .iter()
            .map(|e| compiler.compile(e))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(Self::new(equations, params))
    }
}

impl<T: Scalar> DynamicalSystem<T> for EquationSystem<T> {
    fn dimension(&self) -> usize {
        self.equations.len()
    }

    fn apply(&self, _t: T, x: &[T], out: &mut [T]) {
        let mut stack = self.stack.borrow_mut();
        for (i, eq) in self.equations.iter().enumerate() {
            out[i] = VM::execute(eq, x, &self.params, &mut stack);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse, Compiler, EquationSystem, VM};
    use crate::symbolic::SymbolicError;
    use crate::traits::DynamicalSystem;

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_decimals_exactly() {
        let expr = parse("0.1 + 0.2").expect("expression should parse").simplify();
        assert_eq!(expr.to_string(), "3/10");
    }

    #[test]
    fn rejects_unknown_characters_and_calls() {
        assert!(matches!(parse("a $ b"), Err(SymbolicError::Parse(_))));
        assert!(matches!(parse("sin(x)"), Err(SymbolicError::Unsupported(_))));
        assert!(matches!(parse("x^y"), Err(SymbolicError::Unsupported(_))));
        assert!(matches!(parse("(a + b"), Err(SymbolicError::Parse(_))));
        assert!(matches!(parse("a b"), Err(SymbolicError::Parse(_))));
    }

    #[test]
    fn vm_evaluates_compiled_expression() {
        let expr = parse("-(a + 1)*x^2/y - 3").expect("expression should parse");
        let compiler = Compiler::new(&names(&["x", "y"]), &names(&["a"]));
        let bytecode = compiler.compile(&expr).expect("expression should compile");
        let mut stack = Vec::new();
        let value = VM::execute(&bytecode, &[2.0, 4.0], &[0.5], &mut stack);
        assert!((value - (-1.5 * 4.0 / 4.0 - 3.0)).abs() < 1e-12, "got {value}");
    }

    #[test]
    fn compile_reports_unknown_symbols() {
        let expr = parse("x + z").expect("expression should parse");
        let err = Compiler::new(&names(&["x"]), &[])
            .compile(&expr)
            .expect_err("z is not declared");
        assert_eq!(err, SymbolicError::UnknownSymbol("z".to_string()));
    }

    #[test]
    fn equation_system_applies_each_equation() {
        let exprs = vec![
            parse("k - x*y").expect("expression should parse"),
            parse("x").expect("expression should parse"),
        ];
        let system =
            EquationSystem::compile(&exprs, &names(&["x", "y"]), &names(&["k"]), vec![5.0])
                .expect("system should compile");
        let mut out = [0.0; 2];
        system.apply(0.0, &[2.0, 3.0], &mut out);
        assert_eq!(system.dimension(), 2);
        assert_eq!(out, [-1.0, 2.0]);
    }
}

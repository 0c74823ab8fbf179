use std::fmt;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Function {
    Sin,
    Cos,
    Tan,
    Exp,
    Log,
    Sqrt,
    Abs,
    Min,
    Max,
}

impl Function {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sin" => Some(Function::Sin),
            "cos" => Some(Function::Cos),
            "tan" => Some(Function::Tan),
            "exp" => Some(Function::Exp),
            "log" => Some(Function::Log),
            "sqrt" => Some(Function::Sqrt),
            "abs" => Some(Function::Abs),
            "min" => Some(Function::Min),
            "max" => Some(Function::Max),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Function::Sin => "sin",
            Function::Cos => "cos",
            Function::Tan => "tan",
            Function::Exp => "exp",
            Function::Log => "log",
            Function::Sqrt => "sqrt",
            Function::Abs => "abs",
            Function::Min => "min",
            Function::Max => "max",
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Function::Min | Function::Max => 2,
            _ => 1,
        }
    }

    fn apply(&self, args: &[f64]) -> f64 {
        match self {
            Function::Sin => args[0].sin(),
            Function::Cos => args[0].cos(),
            Function::Tan => args[0].tan(),
            Function::Exp => args[0].exp(),
            Function::Log => args[0].ln(),
            Function::Sqrt => args[0].sqrt(),
            Function::Abs => args[0].abs(),
            Function::Min => args[0].min(args[1]),
            Function::Max => args[0].max(args[1]),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

impl BinaryOp {
    pub fn from_char(op: char) -> Option<Self> {
        match op {
            '+' => Some(BinaryOp::Add),
            '-' => Some(BinaryOp::Sub),
            '*' => Some(BinaryOp::Mul),
            '/' => Some(BinaryOp::Div),
            '^' => Some(BinaryOp::Pow),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            BinaryOp::Add => '+',
            BinaryOp::Sub => '-',
            BinaryOp::Mul => '*',
            BinaryOp::Div => '/',
            BinaryOp::Pow => '^',
        }
    }
}

/// An expression with every name resolved to a time, state or algebraic slot.
/// Parameters are folded to constants before an `Expr` is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Number(f64),
    Time,
    State(usize),
    Algebraic(usize),
    Neg(Box<Expr>),
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
}

impl Expr {
    pub fn eval(&self, t: f64, states: &[f64], algebraics: &[f64]) -> f64 {
        match self {
            Expr::Number(value) => *value,
            Expr::Time => t,
            Expr::State(i) => states[*i],
            Expr::Algebraic(i) => algebraics[*i],
            Expr::Neg(child) => -child.eval(t, states, algebraics),
            Expr::Binary { op, left, right } => {
                let l = left.eval(t, states, algebraics);
                let r = right.eval(t, states, algebraics);
                match op {
                    BinaryOp::Add => l + r,
                    BinaryOp::Sub => l - r,
                    BinaryOp::Mul => l * r,
                    BinaryOp::Div => l / r,
                    BinaryOp::Pow => l.powf(r),
                }
            }
            Expr::Call { func, args } => {
                let values = args
                    .iter()
                    .map(|a| a.eval(t, states, algebraics))
                    .collect::<Vec<_>>();
                func.apply(values.as_slice())
            }
        }
    }

    /// Returns the value if the expression does not depend on time, states or algebraics.
    pub fn as_constant(&self) -> Option<f64> {
        if self.is_constant() {
            Some(self.eval(0.0, &[], &[]))
        } else {
            None
        }
    }

    pub fn is_constant(&self) -> bool {
        match self {
            Expr::Number(_) => true,
            Expr::Time | Expr::State(_) | Expr::Algebraic(_) => false,
            Expr::Neg(child) => child.is_constant(),
            Expr::Binary { left, right, .. } => left.is_constant() && right.is_constant(),
            Expr::Call { args, .. } => args.iter().all(|a| a.is_constant()),
        }
    }

    pub fn algebraic_dependents(&self) -> Vec<usize> {
        let mut deps = Vec::new();
        self.visit(&mut |e| {
            if let Expr::Algebraic(i) = e {
                deps.push(*i);
            }
        });
        deps
    }

    pub fn max_state_index(&self) -> Option<usize> {
        let mut max = None;
        self.visit(&mut |e| {
            if let Expr::State(i) = e {
                max = Some(max.map_or(*i, |m: usize| m.max(*i)));
            }
        });
        max
    }

    pub fn max_algebraic_index(&self) -> Option<usize> {
        self.algebraic_dependents().into_iter().max()
    }

    /// The first call with the wrong number of arguments, as (function, argument count).
    pub fn bad_call(&self) -> Option<(Function, usize)> {
        let mut bad = None;
        self.visit(&mut |e| {
            if let Expr::Call { func, args } = e {
                if bad.is_none() && args.len() != func.arity() {
                    bad = Some((*func, args.len()));
                }
            }
        });
        bad
    }

    // replaces every algebraic index `i` with `map[i]`
    pub fn remap_algebraics(&mut self, map: &[usize]) {
        match self {
            Expr::Algebraic(i) => *i = map[*i],
            Expr::Neg(child) => child.remap_algebraics(map),
            Expr::Binary { left, right, .. } => {
                left.remap_algebraics(map);
                right.remap_algebraics(map);
            }
            Expr::Call { args, .. } => args.iter_mut().for_each(|a| a.remap_algebraics(map)),
            Expr::Number(_) | Expr::Time | Expr::State(_) => (),
        }
    }

    fn visit<F: FnMut(&Expr)>(&self, f: &mut F) {
        f(self);
        match self {
            Expr::Neg(child) => child.visit(f),
            Expr::Binary { left, right, .. } => {
                left.visit(f);
                right.visit(f);
            }
            Expr::Call { args, .. } => args.iter().for_each(|a| a.visit(f)),
            Expr::Number(_) | Expr::Time | Expr::State(_) | Expr::Algebraic(_) => (),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Number(value) => write!(f, "{}", value),
            Expr::Time => write!(f, "time"),
            Expr::State(i) => write!(f, "x[{}]", i),
            Expr::Algebraic(i) => write!(f, "w[{}]", i),
            Expr::Neg(child) => write!(f, "-{}", child),
            Expr::Binary { op, left, right } => write!(f, "({} {} {})", left, op.as_char(), right),
            Expr::Call { func, args } => {
                write!(f, "{}(", func.name())?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
        }
    }
}

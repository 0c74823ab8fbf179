use std::boxed::Box;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Variability {
    Continuous,
    Parameter,
    Constant,
}

impl Variability {
    pub fn is_fixed(&self) -> bool {
        matches!(self, Variability::Parameter | Variability::Constant)
    }
}

#[derive(Debug)]
pub struct Model<'a> {
    pub name: &'a str,
    pub description: Option<&'a str>,
    pub declarations: Vec<Box<Ast<'a>>>,
    pub equations: Vec<Box<Ast<'a>>>,
    pub end_name: &'a str,
}

#[derive(Debug)]
pub struct Declaration<'a> {
    pub name: &'a str,
    pub variability: Variability,
    pub start: Option<Box<Ast<'a>>>,
    pub binding: Option<Box<Ast<'a>>>,
    pub description: Option<&'a str>,
}

#[derive(Debug)]
pub struct Equation<'a> {
    pub lhs: Box<Ast<'a>>,
    pub rhs: Box<Ast<'a>>,
}

#[derive(Debug)]
pub struct Binop<'a> {
    pub op: char,
    pub left: Box<Ast<'a>>,
    pub right: Box<Ast<'a>>,
}

#[derive(Debug)]
pub struct Monop<'a> {
    pub op: char,
    pub child: Box<Ast<'a>>,
}

#[derive(Debug)]
pub struct Call<'a> {
    pub fn_name: &'a str,
    pub args: Vec<Box<Ast<'a>>>,
}

#[derive(Debug)]
pub enum AstKind<'a> {
    Model(Model<'a>),
    Declaration(Declaration<'a>),
    Equation(Equation<'a>),
    Derivative(&'a str),
    Binop(Binop<'a>),
    Monop(Monop<'a>),
    Call(Call<'a>),
    Number(f64),
    Name(&'a str),
}

impl<'a> AstKind<'a> {
    pub fn as_model(&self) -> Option<&Model<'a>> {
        match self {
            AstKind::Model(m) => Some(m),
            _ => None,
        }
    }
    pub fn as_declaration(&self) -> Option<&Declaration<'a>> {
        match self {
            AstKind::Declaration(d) => Some(d),
            _ => None,
        }
    }
    pub fn as_equation(&self) -> Option<&Equation<'a>> {
        match self {
            AstKind::Equation(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StringSpan {
    pub pos_start: usize,
    pub pos_end: usize,
}

impl fmt::Display for StringSpan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{}, {}]", self.pos_start, self.pos_end)
    }
}

#[derive(Debug)]
pub struct Ast<'a> {
    pub kind: AstKind<'a>,
    pub span: Option<StringSpan>,
}

impl<'a> Ast<'a> {
    // names referenced by an expression, in order of appearance (duplicates included)
    pub fn get_dependents(&self) -> Vec<&'a str> {
        let mut deps = Vec::new();
        self.collect_dependents(&mut deps);
        deps
    }

    fn collect_dependents(&self, deps: &mut Vec<&'a str>) {
        match &self.kind {
            AstKind::Name(name) => deps.push(*name),
            AstKind::Derivative(name) => deps.push(*name),
            AstKind::Binop(binop) => {
                binop.left.collect_dependents(deps);
                binop.right.collect_dependents(deps);
            }
            AstKind::Monop(monop) => monop.child.collect_dependents(deps),
            AstKind::Call(call) => call.args.iter().for_each(|a| a.collect_dependents(deps)),
            AstKind::Equation(eqn) => {
                eqn.lhs.collect_dependents(deps);
                eqn.rhs.collect_dependents(deps);
            }
            AstKind::Number(_)
            | AstKind::Model(_)
            | AstKind::Declaration(_) => (),
        }
    }
}

impl<'a> fmt::Display for Ast<'a> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            AstKind::Model(model) => {
                writeln!(f, "model {}", model.name)?;
                for decl in &model.declarations {
                    writeln!(f, "  {};", decl)?;
                }
                writeln!(f, "equation")?;
                for eqn in &model.equations {
                    writeln!(f, "  {};", eqn)?;
                }
                write!(f, "end {};", model.end_name)
            }
            AstKind::Declaration(decl) => {
                match decl.variability {
                    Variability::Parameter => write!(f, "parameter ")?,
                    Variability::Constant => write!(f, "constant ")?,
                    Variability::Continuous => (),
                }
                write!(f, "Real {}", decl.name)?;
                if let Some(start) = &decl.start {
                    write!(f, "(start = {})", start)?;
                }
                if let Some(binding) = &decl.binding {
                    write!(f, " = {}", binding)?;
                }
                Ok(())
            }
            AstKind::Equation(eqn) => write!(f, "{} = {}", eqn.lhs, eqn.rhs),
            AstKind::Derivative(name) => write!(f, "der({})", name),
            AstKind::Binop(binop) => write!(f, "({} {} {})", binop.left, binop.op, binop.right),
            AstKind::Monop(monop) => write!(f, "{}{}", monop.op, monop.child),
            AstKind::Call(call) => {
                write!(f, "{}(", call.fn_name)?;
                for (i, arg) in call.args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{}", arg)?;
                }
                write!(f, ")")
            }
            AstKind::Number(num) => write!(f, "{}", num),
            AstKind::Name(name) => write!(f, "{}", name),
        }
    }
}

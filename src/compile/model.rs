use std::collections::{HashMap, HashSet};
use std::fmt;

use itertools::Itertools;
use log::debug;
use serde::{Deserialize, Serialize};

use crate::ast;
use crate::ast::Ast;
use crate::ast::AstKind;
use crate::ast::StringSpan;

use super::expr::{BinaryOp, Expr, Function};
use super::ValidationError;
use super::ValidationErrors;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub name: String,
    pub value: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
    pub name: String,
    pub start: f64,
    pub derivative: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Algebraic {
    pub name: String,
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// An explicit ODE system `dx/dt = f(t, x, w)` with algebraic variables
/// `w = g(t, x, w)`, stored so that each `w[i]` only depends on `w[j]`, `j < i`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledModel {
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,
    parameters: Vec<Parameter>,
    states: Vec<State>,
    algebraics: Vec<Algebraic>,
}

#[derive(Debug, Clone, Copy, PartialEq)]
enum Slot {
    Parameter(f64),
    State(usize),
    Algebraic(usize),
    Unsolved,
}

struct VariableInfo<'s> {
    name: &'s str,
    span: Option<StringSpan>,
    description: Option<&'s str>,
    start: Option<&'s Ast<'s>>,
}

struct Env<'s> {
    errs: ValidationErrors,
    slots: HashMap<&'s str, Slot>,
}

impl<'s> Env<'s> {
    fn new() -> Self {
        Self {
            errs: ValidationErrors::new(),
            slots: HashMap::new(),
        }
    }

    fn error(&mut self, text: String, span: Option<StringSpan>) {
        self.errs.push(ValidationError::new(text, span));
    }

    fn lower(&mut self, ast: &'s Ast<'s>) -> Option<Expr> {
        match &ast.kind {
            AstKind::Number(value) => Some(Expr::Number(*value)),
            AstKind::Name("time") => Some(Expr::Time),
            AstKind::Name(name) => match self.slots.get(name).copied() {
                Some(Slot::Parameter(value)) => Some(Expr::Number(value)),
                Some(Slot::State(i)) => Some(Expr::State(i)),
                Some(Slot::Algebraic(i)) => Some(Expr::Algebraic(i)),
                Some(Slot::Unsolved) => {
                    self.error(format!("'{}' is not defined yet", name), ast.span);
                    None
                }
                None => {
                    self.error(format!("'{}' is not declared", name), ast.span);
                    None
                }
            },
            AstKind::Monop(monop) => {
                let child = self.lower(monop.child.as_ref())?;
                match monop.op {
                    '-' => Some(Expr::Neg(Box::new(child))),
                    _ => Some(child),
                }
            }
            AstKind::Binop(binop) => {
                let left = self.lower(binop.left.as_ref());
                let right = self.lower(binop.right.as_ref());
                let op = BinaryOp::from_char(binop.op)?;
                Some(Expr::Binary {
                    op,
                    left: Box::new(left?),
                    right: Box::new(right?),
                })
            }
            AstKind::Call(call) => self.lower_call(call, ast.span),
            AstKind::Derivative(name) => {
                self.error(
                    format!("der({}) may only appear on the left of an equation", name),
                    ast.span,
                );
                None
            }
            AstKind::Model(_) | AstKind::Declaration(_) | AstKind::Equation(_) => {
                self.error("expected an expression".to_string(), ast.span);
                None
            }
        }
    }

    fn lower_call(&mut self, call: &'s ast::Call<'s>, span: Option<StringSpan>) -> Option<Expr> {
        let args = call
            .args
            .iter()
            .map(|arg| self.lower(arg.as_ref()))
            .collect::<Vec<_>>();
        let func = match Function::from_name(call.fn_name) {
            Some(func) => func,
            None => {
                self.error(format!("unknown function '{}'", call.fn_name), span);
                return None;
            }
        };
        if args.len() != func.arity() {
            self.error(
                format!(
                    "{} expects {} argument(s), got {}",
                    func.name(),
                    func.arity(),
                    args.len()
                ),
                span,
            );
            return None;
        }
        let args = args.into_iter().collect::<Option<Vec<_>>>()?;
        Some(Expr::Call { func, args })
    }

    // lowers an expression that must fold to a constant (parameter bindings, start values)
    fn lower_constant(&mut self, ast: &'s Ast<'s>, what: &str) -> Option<f64> {
        let expr = self.lower(ast)?;
        match expr.as_constant() {
            Some(value) => Some(value),
            None => {
                self.error(
                    format!("{} must only depend on parameters and constants", what),
                    ast.span,
                );
                None
            }
        }
    }
}

impl CompiledModel {
    pub fn build<'s>(model_ast: &'s Ast<'s>) -> Result<Self, ValidationErrors> {
        let mut env = Env::new();
        let model = match model_ast.kind.as_model() {
            Some(model) => model,
            None => {
                env.error("not a model".to_string(), model_ast.span);
                return Err(env.errs);
            }
        };
        if model.name != model.end_name {
            env.error(
                format!(
                    "model '{}' is closed with 'end {}'",
                    model.name, model.end_name
                ),
                model_ast.span,
            );
        }

        // parameters are folded in declaration order, so bindings can only see earlier ones
        let mut parameters = Vec::new();
        let mut continuous: Vec<VariableInfo<'s>> = Vec::new();
        for decl_ast in model.declarations.iter() {
            let decl = match decl_ast.kind.as_declaration() {
                Some(decl) => decl,
                None => continue,
            };
            if decl.name == "time" {
                env.error("'time' is a reserved name".to_string(), decl_ast.span);
                continue;
            }
            if env.slots.contains_key(decl.name) {
                env.error(
                    format!("'{}' is already declared", decl.name),
                    decl_ast.span,
                );
                continue;
            }
            if decl.variability.is_fixed() {
                if decl.start.is_some() {
                    env.error(
                        format!("parameter '{}' cannot have a start value", decl.name),
                        decl_ast.span,
                    );
                }
                let value = match decl.binding.as_ref() {
                    Some(binding) => env.lower_constant(binding.as_ref(), "a parameter binding"),
                    None => {
                        env.error(
                            format!("parameter '{}' has no value", decl.name),
                            decl_ast.span,
                        );
                        None
                    }
                };
                // keep going with a dummy value so later references are not reported twice
                let value = value.unwrap_or(0.0);
                env.slots.insert(decl.name, Slot::Parameter(value));
                parameters.push(Parameter {
                    name: decl.name.to_string(),
                    value,
                    description: decl.description.map(str::to_string),
                });
            } else {
                if decl.binding.is_some() {
                    env.error(
                        format!(
                            "'{}' is a continuous variable, give it an equation instead of a binding",
                            decl.name
                        ),
                        decl_ast.span,
                    );
                }
                env.slots.insert(decl.name, Slot::Unsolved);
                continuous.push(VariableInfo {
                    name: decl.name,
                    span: decl_ast.span,
                    description: decl.description,
                    start: decl.start.as_deref(),
                });
            }
        }

        // classify equations: der(x) = ... makes x a state, y = ... makes y algebraic
        let mut derivative_eqns: HashMap<&'s str, &'s Ast<'s>> = HashMap::new();
        let mut algebraic_eqns: HashMap<&'s str, &'s Ast<'s>> = HashMap::new();
        for eqn_ast in model.equations.iter() {
            let eqn = match eqn_ast.kind.as_equation() {
                Some(eqn) => eqn,
                None => continue,
            };
            let (name, is_derivative) = match eqn.lhs.kind {
                AstKind::Derivative(name) => (name, true),
                AstKind::Name(name) => (name, false),
                _ => {
                    env.error(
                        "left hand side must be der(name) or name".to_string(),
                        eqn.lhs.span,
                    );
                    continue;
                }
            };
            match env.slots.get(name).copied() {
                Some(Slot::Parameter(_)) => {
                    env.error(
                        format!("'{}' is a parameter and cannot be solved for", name),
                        eqn.lhs.span,
                    );
                    continue;
                }
                None => {
                    env.error(format!("'{}' is not declared", name), eqn.lhs.span);
                    continue;
                }
                _ => (),
            }
            let (target, other) = if is_derivative {
                (&mut derivative_eqns, &algebraic_eqns)
            } else {
                (&mut algebraic_eqns, &derivative_eqns)
            };
            if target.contains_key(name) || other.contains_key(name) {
                env.error(
                    format!("'{}' has more than one equation", name),
                    eqn_ast.span,
                );
                continue;
            }
            target.insert(name, eqn.rhs.as_ref());
        }

        let mut state_infos = Vec::new();
        let mut algebraic_infos = Vec::new();
        for info in continuous {
            if derivative_eqns.contains_key(info.name) {
                env.slots.insert(info.name, Slot::State(state_infos.len()));
                state_infos.push(info);
            } else if algebraic_eqns.contains_key(info.name) {
                env.slots
                    .insert(info.name, Slot::Algebraic(algebraic_infos.len()));
                algebraic_infos.push(info);
            } else {
                env.error(format!("'{}' has no equation", info.name), info.span);
            }
        }

        let mut states = Vec::new();
        for info in state_infos.iter() {
            let start = match info.start {
                Some(start) => env.lower_constant(start, "a start value"),
                None => Some(0.0),
            };
            let derivative = env.lower(derivative_eqns[info.name]);
            if let (Some(start), Some(derivative)) = (start, derivative) {
                states.push(State {
                    name: info.name.to_string(),
                    start,
                    derivative,
                    description: info.description.map(str::to_string),
                });
            }
        }

        let mut algebraics = Vec::new();
        for info in algebraic_infos.iter() {
            if info.start.is_some() {
                debug!("ignoring start value of algebraic variable '{}'", info.name);
            }
            if let Some(expr) = env.lower(algebraic_eqns[info.name]) {
                algebraics.push(Algebraic {
                    name: info.name.to_string(),
                    expr,
                    description: info.description.map(str::to_string),
                });
            }
        }

        if !env.errs.is_empty() {
            return Err(env.errs);
        }

        let (algebraics, map) = match sort_algebraics(algebraics) {
            Ok(sorted) => sorted,
            Err(cycle) => {
                env.error(
                    format!("algebraic loop between {}", cycle.iter().join(", ")),
                    model_ast.span,
                );
                return Err(env.errs);
            }
        };
        for state in states.iter_mut() {
            state.derivative.remap_algebraics(&map);
        }
        Ok(Self {
            name: model.name.to_string(),
            description: model.description.map(str::to_string),
            parameters,
            states,
            algebraics,
        })
    }

    pub fn name(&self) -> &str {
        self.name.as_str()
    }

    pub fn description(&self) -> Option<&str> {
        self.description.as_deref()
    }

    pub fn parameters(&self) -> &[Parameter] {
        self.parameters.as_ref()
    }

    pub fn states(&self) -> &[State] {
        self.states.as_ref()
    }

    pub fn algebraics(&self) -> &[Algebraic] {
        self.algebraics.as_ref()
    }

    /// Checks the index invariants of a model that did not come out of `build`,
    /// e.g. one read back from a compiled unit.
    pub fn check(&self) -> Result<(), String> {
        let n_states = self.states.len();
        let mut names = HashSet::new();
        let all_names = self
            .parameters
            .iter()
            .map(|p| p.name.as_str())
            .chain(self.states.iter().map(|s| s.name.as_str()))
            .chain(self.algebraics.iter().map(|a| a.name.as_str()));
        for name in all_names {
            if !names.insert(name) {
                return Err(format!("duplicate variable '{}'", name));
            }
        }
        let exprs = self
            .states
            .iter()
            .map(|s| (s.name.as_str(), &s.derivative))
            .chain(self.algebraics.iter().map(|a| (a.name.as_str(), &a.expr)));
        for (name, expr) in exprs {
            if let Some((func, n_args)) = expr.bad_call() {
                return Err(format!(
                    "'{}' calls {} with {} argument(s), expected {}",
                    name,
                    func.name(),
                    n_args,
                    func.arity()
                ));
            }
        }
        for state in self.states.iter() {
            if state.derivative.max_state_index().is_some_and(|i| i >= n_states) {
                return Err(format!("derivative of '{}' refers to a missing state", state.name));
            }
            if state
                .derivative
                .max_algebraic_index()
                .is_some_and(|i| i >= self.algebraics.len())
            {
                return Err(format!(
                    "derivative of '{}' refers to a missing algebraic variable",
                    state.name
                ));
            }
        }
        for (i, alg) in self.algebraics.iter().enumerate() {
            if alg.expr.max_state_index().is_some_and(|j| j >= n_states) {
                return Err(format!("'{}' refers to a missing state", alg.name));
            }
            if alg.expr.max_algebraic_index().is_some_and(|j| j >= i) {
                return Err(format!("'{}' is not in evaluation order", alg.name));
            }
        }
        Ok(())
    }

    pub fn initial_state(&self) -> Vec<f64> {
        self.states.iter().map(|s| s.start).collect()
    }

    /// Evaluates all algebraic variables in order into `out`.
    pub fn calc_algebraics(&self, t: f64, states: &[f64], out: &mut [f64]) {
        for (i, alg) in self.algebraics.iter().enumerate() {
            out[i] = alg.expr.eval(t, states, &out[..i]);
        }
    }

    /// Evaluates `dx/dt` into `rr`, using `algebraics` as scratch space.
    pub fn rhs(&self, t: f64, states: &[f64], algebraics: &mut [f64], rr: &mut [f64]) {
        if states.len() != self.states.len() {
            panic!("Expected {} states, got {}", self.states.len(), states.len());
        }
        if rr.len() != self.states.len() {
            panic!(
                "Expected {} residual states, got {}",
                self.states.len(),
                rr.len()
            );
        }
        self.calc_algebraics(t, states, algebraics);
        for (i, state) in self.states.iter().enumerate() {
            rr[i] = state.derivative.eval(t, states, algebraics);
        }
    }
}

// orders algebraic variables so each only depends on earlier ones, together with the
// old -> new index map, or returns the names on a cycle
fn sort_algebraics(
    algebraics: Vec<Algebraic>,
) -> Result<(Vec<Algebraic>, Vec<usize>), Vec<String>> {
    #[derive(Clone, Copy, PartialEq)]
    enum Mark {
        New,
        Visiting,
        Done,
    }

    fn visit(
        i: usize,
        deps: &[Vec<usize>],
        marks: &mut [Mark],
        stack: &mut Vec<usize>,
        order: &mut Vec<usize>,
    ) -> Result<(), Vec<usize>> {
        match marks[i] {
            Mark::Done => return Ok(()),
            Mark::Visiting => {
                let pos = stack.iter().position(|&j| j == i).unwrap_or(0);
                return Err(stack[pos..].to_vec());
            }
            Mark::New => (),
        }
        marks[i] = Mark::Visiting;
        stack.push(i);
        for &j in deps[i].iter() {
            visit(j, deps, marks, stack, order)?;
        }
        stack.pop();
        marks[i] = Mark::Done;
        order.push(i);
        Ok(())
    }

    let deps = algebraics
        .iter()
        .map(|a| a.expr.algebraic_dependents())
        .collect::<Vec<_>>();
    let mut marks = vec![Mark::New; algebraics.len()];
    let mut order = Vec::with_capacity(algebraics.len());
    let mut stack = Vec::new();
    for i in 0..algebraics.len() {
        if let Err(cycle) = visit(i, &deps, &mut marks, &mut stack, &mut order) {
            return Err(cycle
                .into_iter()
                .map(|j| algebraics[j].name.clone())
                .collect());
        }
    }

    // old index -> new index
    let mut map = vec![0; algebraics.len()];
    for (new, &old) in order.iter().enumerate() {
        map[old] = new;
    }
    let mut slots = algebraics.into_iter().map(Some).collect::<Vec<_>>();
    let mut sorted = Vec::with_capacity(slots.len());
    for &old in order.iter() {
        if let Some(mut alg) = slots[old].take() {
            alg.expr.remap_algebraics(&map);
            sorted.push(alg);
        }
    }
    Ok((sorted, map))
}

impl fmt::Display for CompiledModel {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        writeln!(f, "model {}", self.name)?;
        for p in &self.parameters {
            writeln!(f, "  param {} = {}", p.name, p.value)?;
        }
        for (i, a) in self.algebraics.iter().enumerate() {
            writeln!(f, "  w[{}] {} = {}", i, a.name, a.expr)?;
        }
        for (i, s) in self.states.iter().enumerate() {
            writeln!(f, "  x[{}] {}(0) = {}, dx/dt = {}", i, s.name, s.start, s.derivative)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;

    use super::*;
    use crate::parser::parse_mo_string;

    fn build(text: &str) -> Result<CompiledModel, ValidationErrors> {
        let models = parse_mo_string(text).unwrap();
        CompiledModel::build(&models[0])
    }

    #[test]
    fn hello_world() {
        let model = build(include_str!("../../models/hello_world.mo")).unwrap();
        assert_eq!(model.name(), "HelloWorld");
        assert_eq!(model.parameters().len(), 1);
        assert_relative_eq!(model.parameters()[0].value, -1.0);
        assert_eq!(model.states().len(), 1);
        assert_relative_eq!(model.states()[0].start, 1.0);
        assert_eq!(model.initial_state(), vec![1.0]);
        let mut rr = vec![0.0];
        model.rhs(0.0, &[2.0], &mut [], &mut rr);
        assert_relative_eq!(rr[0], -2.0);
        assert!(model.check().is_ok());
    }

    #[test]
    fn parameters_fold_in_order() {
        let model = build(
            "model P
               parameter Real a = 2;
               parameter Real b = a * 3 + sqrt(4);
               Real x(start = b);
             equation
               der(x) = b;
             end P;",
        )
        .unwrap();
        assert_relative_eq!(model.parameters()[1].value, 8.0);
        assert_relative_eq!(model.states()[0].start, 8.0);
        assert_eq!(model.states()[0].derivative, Expr::Number(8.0));
    }

    #[test]
    fn algebraics_are_sorted() {
        let model = build(
            "model A
               Real x(start = 1);
               Real y;
               Real z;
             equation
               der(x) = y;
               y = 2 * z;
               z = x + time;
             end A;",
        )
        .unwrap();
        let names = model
            .algebraics()
            .iter()
            .map(|a| a.name.as_str())
            .collect::<Vec<_>>();
        assert_eq!(names, vec!["z", "y"]);
        assert!(model.check().is_ok());
        let mut w = vec![0.0; 2];
        let mut rr = vec![0.0];
        model.rhs(1.0, &[3.0], &mut w, &mut rr);
        assert_relative_eq!(w[0], 4.0);
        assert_relative_eq!(w[1], 8.0);
        assert_relative_eq!(rr[0], 8.0);
    }

    #[test]
    fn algebraic_loop() {
        let errs = build(
            "model L Real a; Real b; equation a = b + 1; b = a * 2; end L;",
        )
        .unwrap_err();
        assert!(errs.has_error_contains("algebraic loop"));
    }

    #[test]
    fn semantic_errors() {
        let text = "model E
              parameter Real p;
              parameter Real q = r;
              parameter Real r = 1;
              Real x;
              Real y;
              Real u;
            equation
              der(x) = foo(x);
              der(p) = 1;
              y = sin(x, x);
              y = 2;
              der(z) = 0;
            end F;";
        let errs = build(text).unwrap_err();
        assert!(errs.has_error_contains("parameter 'p' has no value"));
        assert!(errs.has_error_contains("'r' is not declared"));
        assert!(errs.has_error_contains("unknown function 'foo'"));
        assert!(errs.has_error_contains("'p' is a parameter"));
        assert!(errs.has_error_contains("sin expects 1 argument(s), got 2"));
        assert!(errs.has_error_contains("'y' has more than one equation"));
        assert!(errs.has_error_contains("'z' is not declared"));
        assert!(errs.has_error_contains("'u' has no equation"));
        assert!(errs.has_error_contains("closed with 'end F'"));
        let message = errs.as_error_message(text);
        assert!(message.contains("Line 2, Column 15"));
    }

    #[test]
    fn start_value_must_be_constant() {
        let errs = build(
            "model S Real x(start = time); equation der(x) = 1; end S;",
        )
        .unwrap_err();
        assert!(errs.has_error_contains("a start value must only depend on parameters"));
    }

    #[test]
    fn check_rejects_bad_indices() {
        let mut model = build(include_str!("../../models/hello_world.mo")).unwrap();
        model.states[0].derivative = Expr::State(3);
        assert!(model.check().is_err());
    }

    #[test]
    fn check_rejects_wrong_arity() {
        let mut model = build(include_str!("../../models/hello_world.mo")).unwrap();
        model.states[0].derivative = Expr::Call {
            func: Function::Max,
            args: vec![Expr::State(0)],
        };
        let err = model.check().unwrap_err();
        assert_eq!(err, "'x' calls max with 1 argument(s), expected 2");
    }
}

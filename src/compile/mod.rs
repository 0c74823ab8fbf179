use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use itertools::Itertools;
use log::{debug, info};

use crate::parser::parse_mo_string;
use crate::unit;

pub mod error;
pub use error::{ValidationError, ValidationErrors};

pub mod expr;
pub use expr::{BinaryOp, Expr, Function};

pub mod model;
pub use model::{Algebraic, CompiledModel, Parameter, State};

/// Parses `code` and builds the model called `model_name`.
pub fn compile_str(code: &str, model_name: &str) -> Result<CompiledModel> {
    let models = parse_mo_string(code).map_err(|e| anyhow!(e.to_string()))?;
    let model_ast = models
        .iter()
        .find(|m| m.kind.as_model().is_some_and(|m| m.name == model_name))
        .ok_or_else(|| {
            let available = models
                .iter()
                .filter_map(|m| m.kind.as_model())
                .map(|m| m.name)
                .join(", ");
            anyhow!(
                "model '{}' not found (available: [{}])",
                model_name,
                available
            )
        })?;
    let model =
        CompiledModel::build(model_ast).map_err(|e| anyhow!(e.as_error_message(code)))?;
    debug!("built model:\n{}", model);
    Ok(model)
}

/// Compiles `model_name` from the source file at `source` into a unit file
/// `<out_dir>/<model_name>.<extension>`, returning its path.
pub fn compile_file(
    model_name: &str,
    source: &Path,
    out_dir: &Path,
    extension: &str,
) -> Result<PathBuf> {
    let code = fs::read_to_string(source)
        .with_context(|| format!("cannot read model source {}", source.display()))?;
    let model = compile_str(code.as_str(), model_name)?;
    if !out_dir.exists() {
        fs::create_dir_all(out_dir)
            .with_context(|| format!("cannot create output directory {}", out_dir.display()))?;
    }
    let out = out_dir.join(format!("{}.{}", model_name, extension));
    unit::write_unit(&model, out.as_path())?;
    info!(
        "compiled model '{}' ({} states, {} algebraics, {} parameters) to {}",
        model.name(),
        model.states().len(),
        model.algebraics().len(),
        model.parameters().len(),
        out.display()
    );
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn compile_str_selects_model_by_name() {
        let code = "model A Real x(start = 1); equation der(x) = -x; end A;
                    model B Real y; equation y = 2; end B;";
        let b = compile_str(code, "B").unwrap();
        assert_eq!(b.name(), "B");
        assert_eq!(b.algebraics().len(), 1);

        let err = compile_str(code, "C").unwrap_err().to_string();
        assert!(err.contains("model 'C' not found"));
        assert!(err.contains("A, B"));
    }

    #[test]
    fn compile_str_reports_syntax_errors() {
        assert!(compile_str("model A Real x equation end A;", "A").is_err());
    }

    #[test]
    fn compile_file_writes_unit() {
        let dir = tempfile::tempdir().unwrap();
        let source = dir.path().join("hello_world.mo");
        fs::write(&source, include_str!("../../models/hello_world.mo")).unwrap();
        let out_dir = dir.path().join("build");
        let out = compile_file("HelloWorld", &source, &out_dir, "fmu").unwrap();
        assert_eq!(out, out_dir.join("HelloWorld.fmu"));
        let model = unit::read_unit(&out).unwrap();
        assert_eq!(model.name(), "HelloWorld");
    }

    #[test]
    fn compile_file_missing_source() {
        let dir = tempfile::tempdir().unwrap();
        let err = compile_file("M", &dir.path().join("nope.mo"), dir.path(), "fmu")
            .unwrap_err()
            .to_string();
        assert!(err.contains("cannot read model source"));
    }
}

//! Compiled simulation units: a versioned JSON envelope around a [`CompiledModel`].

use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

use crate::compile::CompiledModel;

pub const UNIT_FORMAT: &str = "simrun-unit";
pub const UNIT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct UnitFile {
    format: String,
    version: u32,
    model: CompiledModel,
}

pub fn write_unit(model: &CompiledModel, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create unit file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    let unit = UnitFile {
        format: UNIT_FORMAT.to_string(),
        version: UNIT_VERSION,
        model: model.clone(),
    };
    serde_json::to_writer_pretty(&mut writer, &unit)?;
    writer.flush()?;
    Ok(())
}

pub fn read_unit(path: &Path) -> Result<CompiledModel> {
    let file =
        File::open(path).with_context(|| format!("cannot open unit file {}", path.display()))?;
    let unit: UnitFile = serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("{} is not a valid simulation unit", path.display()))?;
    if unit.format != UNIT_FORMAT {
        return Err(anyhow!(
            "{} has format '{}', expected '{}'",
            path.display(),
            unit.format,
            UNIT_FORMAT
        ));
    }
    if unit.version != UNIT_VERSION {
        return Err(anyhow!(
            "{} has unit version {}, this engine supports version {}",
            path.display(),
            unit.version,
            UNIT_VERSION
        ));
    }
    unit.model
        .check()
        .map_err(|e| anyhow!("{} is inconsistent: {}", path.display(), e))?;
    Ok(unit.model)
}

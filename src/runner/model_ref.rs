use std::fmt;
use std::path::{Path, PathBuf};

use log::debug;

use crate::config::RunnerConfig;

use super::ResolutionError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ModelKind {
    /// Source text that has to be compiled; the file may hold several models.
    RawModel { model_name: String },
    PrecompiledUnit,
}

/// What the caller wants simulated: a path and how to treat it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelReference {
    path: PathBuf,
    kind: ModelKind,
}

impl ModelReference {
    pub fn raw(path: impl Into<PathBuf>, model_name: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            kind: ModelKind::RawModel {
                model_name: model_name.into(),
            },
        }
    }

    pub fn precompiled(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: ModelKind::PrecompiledUnit,
        }
    }

    /// Picks the kind from the file extension, as the command line does.
    pub fn infer(
        path: impl Into<PathBuf>,
        model_name: Option<&str>,
        config: &RunnerConfig,
    ) -> Result<Self, ResolutionError> {
        let path = path.into();
        if has_extension(&path, config.raw_extension()) {
            match model_name {
                Some(name) => Ok(Self::raw(path, name)),
                None => Err(ResolutionError::MissingModelName(path)),
            }
        } else if has_extension(&path, config.unit_extension()) {
            if let Some(name) = model_name {
                debug!("ignoring model name '{}' for compiled unit {}", name, path.display());
            }
            Ok(Self::precompiled(path))
        } else {
            Err(ResolutionError::UnsupportedFormat(path))
        }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn kind(&self) -> &ModelKind {
        &self.kind
    }

    pub fn model_name(&self) -> Option<&str> {
        match &self.kind {
            ModelKind::RawModel { model_name } => Some(model_name.as_str()),
            ModelKind::PrecompiledUnit => None,
        }
    }
}

impl fmt::Display for ModelReference {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.kind {
            ModelKind::RawModel { model_name } => {
                write!(f, "model '{}' in {}", model_name, self.path.display())
            }
            ModelKind::PrecompiledUnit => write!(f, "unit {}", self.path.display()),
        }
    }
}

pub(crate) fn has_extension(path: &Path, extension: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(extension))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ArtifactOrigin {
    Compiled { model_name: String, source: PathBuf },
    Precompiled,
}

/// A handle to a compiled unit that the engine can load.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompiledArtifact {
    path: PathBuf,
    origin: ArtifactOrigin,
}

impl CompiledArtifact {
    pub fn new(path: PathBuf, origin: ArtifactOrigin) -> Self {
        Self { path, origin }
    }

    pub fn path(&self) -> &Path {
        self.path.as_path()
    }

    pub fn origin(&self) -> &ArtifactOrigin {
        &self.origin
    }

    /// Human readable name used in logs and plot titles.
    pub fn label(&self) -> String {
        match &self.origin {
            ArtifactOrigin::Compiled { model_name, .. } => model_name.clone(),
            ArtifactOrigin::Precompiled => self
                .path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .unwrap_or_else(|| self.path.display().to_string()),
        }
    }
}

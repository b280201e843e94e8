//! Pipeline configuration, read once per invocation.

use std::{
    collections::BTreeMap,
    io,
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    enrich::{DEFAULT_DEPTH_FIELD, DEFAULT_OBSERVATION_FIELD},
    header::DEFAULT_COMPOUND_FIELD,
    validate::RequiredFields,
};

pub const DEFAULT_LOG_FILE: &str = "vcf-flatten.log";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("required field list is absent or empty")]
    MissingRequiredFields,
    #[error("no samples configured")]
    NoSamples,
    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
}

/// Column names and annotation field used while flattening.
#[derive(Debug, Clone, Deserialize, Serialize, Eq, PartialEq)]
#[serde(default)]
pub struct FlattenOptions {
    /// INFO field expanded into sub-columns.
    pub compound_field: String,
    pub depth_field: String,
    pub observation_field: String,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            compound_field: DEFAULT_COMPOUND_FIELD.to_string(),
            depth_field: DEFAULT_DEPTH_FIELD.to_string(),
            observation_field: DEFAULT_OBSERVATION_FIELD.to_string(),
        }
    }
}

/// Contents of the YAML configuration file.
///
/// Relative paths are resolved against the directory holding the file.
#[derive(Debug, Clone, Deserialize)]
pub struct PipelineConfig {
    #[serde(default)]
    required_fields: Option<Vec<String>>,
    #[serde(default = "default_log_file")]
    pub log_file: PathBuf,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
    /// Sample identifier → variant file.
    #[serde(default)]
    pub samples: BTreeMap<String, PathBuf>,
    #[serde(default = "default_threads")]
    pub threads: usize,
    /// Memory hint in MiB; recorded, not enforced.
    #[serde(default)]
    pub memory_mb: Option<u64>,
    #[serde(flatten)]
    pub options: FlattenOptions,
}

fn default_log_file() -> PathBuf {
    PathBuf::from(DEFAULT_LOG_FILE)
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_threads() -> usize {
    1
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_yaml(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn from_yaml(contents: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(contents)
    }

    /// The required-field list; its absence is fatal before any row is processed.
    pub fn required_fields(&self) -> Result<RequiredFields, ConfigError> {
        match &self.required_fields {
            Some(names) => RequiredFields::new(names),
            None => Err(ConfigError::MissingRequiredFields),
        }
    }

    /// Checks everything a run needs up front.
    pub fn validate(&self) -> Result<RequiredFields, ConfigError> {
        let required = self.required_fields()?;
        if self.samples.is_empty() {
            return Err(ConfigError::NoSamples);
        }
        Ok(required)
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.log_file);
        resolve(&mut self.output_dir);
        self.samples.values_mut().for_each(resolve);
    }
}

/// Reads a required-field list from a plain file: names separated by
/// newlines, tabs, commas or spaces. Lines starting with `#` are ignored.
pub fn required_fields_from_path(path: &Path) -> Result<RequiredFields, ConfigError> {
    let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    let names = contents
        .lines()
        .filter(|line| !line.trim_start().starts_with('#'))
        .flat_map(|line| line.split(|c: char| c == ',' || c.is_whitespace()));
    RequiredFields::new(names)
}

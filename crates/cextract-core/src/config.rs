//! Configuration types

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// cextract configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractConfig {
    /// Extraction request
    pub extract: ExtractOptions,

    /// Front end configuration
    pub frontend: FrontendConfig,
}

/// What to extract and how to post-process it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractOptions {
    /// Functions forming the closure roots
    pub functions: Vec<String>,

    /// Symbols to externalize even when they have external linkage
    pub export_symbols: Vec<String>,

    /// Output file (stdout when absent)
    pub output: Option<PathBuf>,

    /// Turn private callees and listed symbols into `klp_` pointers
    pub externalize: bool,

    /// Write the intermediate closure report
    pub dump_passes: bool,
}

impl Default for ExtractOptions {
    fn default() -> Self {
        Self {
            functions: Vec::new(),
            export_symbols: Vec::new(),
            output: None,
            externalize: true,
            dump_passes: false,
        }
    }
}

/// Front end configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrontendConfig {
    /// Include search paths for quoted includes
    pub include_paths: Vec<PathBuf>,

    /// Reproduce `#include` lines instead of flattening local headers
    pub keep_includes: bool,
}

impl ExtractConfig {
    /// Load a YAML configuration file
    pub fn from_yaml_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_yaml_str(&text)
    }

    /// Parse a YAML configuration document
    pub fn from_yaml_str(text: &str) -> Result<Self> {
        serde_yaml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    /// Reject requests the closure engine cannot run and normalize names.
    ///
    /// Names are trimmed and deduplicated, keeping the first occurrence so the
    /// closure roots stay in the order the user gave them.
    pub fn validate(mut self) -> Result<Self> {
        self.extract.functions = normalize_names(&self.extract.functions);
        self.extract.export_symbols = normalize_names(&self.extract.export_symbols);

        if self.extract.functions.is_empty() {
            return Err(Error::Config("no functions to extract".into()));
        }
        if let Some(bad) = self
            .extract
            .functions
            .iter()
            .chain(&self.extract.export_symbols)
            .find(|n| !is_c_identifier(n))
        {
            return Err(Error::Config(format!("`{}` is not a C identifier", bad)));
        }
        Ok(self)
    }
}

fn normalize_names(names: &[String]) -> Vec<String> {
    let mut out: Vec<String> = Vec::with_capacity(names.len());
    for name in names {
        let name = name.trim();
        if !name.is_empty() && !out.iter().any(|n| n == name) {
            out.push(name.to_string());
        }
    }
    out
}

fn is_c_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    match chars.next() {
        Some(c) if c == '_' || c.is_ascii_alphabetic() => {}
        _ => return false,
    }
    chars.all(|c| c == '_' || c.is_ascii_alphanumeric())
}

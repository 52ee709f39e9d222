//! cextract Parser
//!
//! C front end built on tree-sitter. Produces the [`ProgramGraph`] the
//! closure engine runs on.
//!
//! ## Modules
//!
//! - `treesitter` - Program graph builder
//! - `preprocessor` - Header resolution, macro-body lexing and constant folding

pub mod preprocessor;
pub mod treesitter;

use cextract_core::config::FrontendConfig;
use cextract_core::{Error, ProgramGraph, Result};
use std::path::Path;

pub use treesitter::{GraphBuilder, TreeSitterFrontend};

/// Front end trait for different backends
pub trait Frontend: Send + Sync {
    /// Build the program graph of a translation unit held in memory
    fn parse(&self, source: &str, filename: &str, config: &FrontendConfig) -> Result<ProgramGraph>;

    /// Build the program graph of a file on disk
    fn parse_file(&self, path: &Path, config: &FrontendConfig) -> Result<ProgramGraph> {
        if !path.is_file() {
            return Err(Error::FileNotFound(path.display().to_string()));
        }
        let source = std::fs::read_to_string(path)?;
        let filename = path.to_string_lossy();
        self.parse(&source, &filename, config)
    }

    /// Get front end name
    fn name(&self) -> &str;

    /// Check if the front end can run
    fn is_available(&self) -> bool;
}

/// Get the best available front end
pub fn get_frontend() -> Box<dyn Frontend> {
    Box::new(TreeSitterFrontend)
}

#[cfg(test)]
mod tests;

#[cfg(test)]
mod basic_tests {
    use super::*;

    #[test]
    fn test_frontend_available() {
        let frontend = get_frontend();
        assert!(frontend.is_available());
        assert_eq!(frontend.name(), "tree-sitter");
    }

    #[test]
    fn test_missing_file() {
        let frontend = get_frontend();
        let err = frontend
            .parse_file(Path::new("/nonexistent/x.c"), &FrontendConfig::default())
            .unwrap_err();
        assert!(matches!(err, Error::FileNotFound(_)));
    }
}

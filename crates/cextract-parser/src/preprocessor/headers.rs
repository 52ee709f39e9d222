//! Header File Resolver
//!
//! Resolves `#include` operands to files on disk.

use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Errors reading an included header
#[derive(Debug, Error)]
pub enum IncludeError {
    #[error("header not found: {0}")]
    NotFound(String),

    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Header file resolver for C projects
#[derive(Debug, Clone, Default)]
pub struct HeaderResolver {
    /// Include search paths
    include_paths: Vec<PathBuf>,
}

impl HeaderResolver {
    /// Create a new header resolver
    pub fn new(include_paths: Vec<PathBuf>) -> Self {
        let mut resolver = Self::default();
        for path in include_paths {
            resolver.add_include_path(path);
        }
        resolver
    }

    /// Add an include path
    pub fn add_include_path(&mut self, path: PathBuf) {
        if !self.include_paths.contains(&path) {
            self.include_paths.push(path);
        }
    }

    /// Get all include paths
    pub fn include_paths(&self) -> &[PathBuf] {
        &self.include_paths
    }

    /// Resolve a quoted header (`#include "x.h"`)
    ///
    /// Searched next to the including file first, then along the include
    /// paths in order.
    pub fn resolve(&self, header: &str, from_file: Option<&Path>) -> Option<PathBuf> {
        if let Some(parent) = from_file.and_then(Path::parent) {
            let relative_path = parent.join(header);
            if relative_path.is_file() {
                debug!("Resolved {} relative to {:?}", header, from_file);
                return Some(relative_path);
            }
        }

        for include_path in &self.include_paths {
            let full_path = include_path.join(header);
            if full_path.is_file() {
                debug!("Resolved {} in {:?}", header, include_path);
                return Some(full_path);
            }
        }

        debug!("Failed to resolve header: {}", header);
        None
    }

    /// Resolve and read a header
    pub fn read(
        &self,
        header: &str,
        from_file: Option<&Path>,
    ) -> Result<(PathBuf, String), IncludeError> {
        let path = self
            .resolve(header, from_file)
            .ok_or_else(|| IncludeError::NotFound(header.to_string()))?;
        let text = std::fs::read_to_string(&path).map_err(|source| IncludeError::Io {
            path: path.clone(),
            source,
        })?;
        Ok((path, text))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn create_tree() -> TempDir {
        let temp = TempDir::new().unwrap();
        let root = temp.path();
        fs::create_dir_all(root.join("src")).unwrap();
        fs::create_dir_all(root.join("include/lib")).unwrap();
        fs::write(root.join("src/local.h"), "int local;").unwrap();
        fs::write(root.join("include/lib/api.h"), "int api;").unwrap();
        temp
    }

    #[test]
    fn quoted_include_prefers_including_directory() {
        let temp = create_tree();
        let resolver = HeaderResolver::new(vec![temp.path().join("include")]);
        let main = temp.path().join("src/main.c");

        let resolved = resolver.resolve("local.h", Some(&main)).unwrap();
        assert!(resolved.ends_with("src/local.h"));
        let resolved = resolver.resolve("lib/api.h", Some(&main)).unwrap();
        assert!(resolved.ends_with("include/lib/api.h"));
    }

    #[test]
    fn include_paths_are_searched_in_order() {
        let temp = create_tree();
        fs::write(temp.path().join("src/api.h"), "int shadow;").unwrap();
        let resolver = HeaderResolver::new(vec![
            temp.path().join("src"),
            temp.path().join("include/lib"),
        ]);
        let resolved = resolver.resolve("api.h", None).unwrap();
        assert!(resolved.ends_with("src/api.h"));
    }

    #[test]
    fn read_reports_missing_headers() {
        let resolver = HeaderResolver::new(vec![]);
        assert!(matches!(
            resolver.read("nope.h", None),
            Err(IncludeError::NotFound(_))
        ));
    }

    #[test]
    fn include_paths_are_deduplicated() {
        let mut resolver = HeaderResolver::new(vec![PathBuf::from("a")]);
        resolver.add_include_path(PathBuf::from("a"));
        assert_eq!(resolver.include_paths().len(), 1);
    }
}

//! Closure dump
//!
//! JSON view of a closure for `--dump-passes`.

use cextract_core::{DeclId, Error, Location, ProgramGraph, Result};
use serde::Serialize;
use std::collections::BTreeSet;

use crate::closure::Closure;
use crate::externalize::RenameCandidate;

#[derive(Debug, Clone, Serialize)]
pub struct DeclEntry {
    pub name: Option<String>,
    pub kind: &'static str,
    pub location: Location,
    /// Survived redundancy reduction
    pub emitted: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct MacroEntry {
    pub name: String,
    pub location: Location,
    pub needs_undef: bool,
}

/// Serializable summary of one extraction
#[derive(Debug, Clone, Serialize)]
pub struct ClosureReport {
    pub file: String,
    pub functions: Vec<String>,
    pub decls: Vec<DeclEntry>,
    pub macros: Vec<MacroEntry>,
    pub renames: Vec<RenameCandidate>,
    pub pass_sizes: Vec<usize>,
}

impl ClosureReport {
    pub fn new(graph: &ProgramGraph, closure: &Closure, reduced: &BTreeSet<DeclId>) -> Self {
        let decls = closure
            .decls
            .iter()
            .map(|&id| {
                let decl = graph.decl(id);
                DeclEntry {
                    name: decl.name.clone(),
                    kind: decl.kind_name(),
                    location: graph.location(decl.span),
                    emitted: reduced.contains(&id),
                }
            })
            .collect();
        let macros = closure
            .macros
            .iter()
            .map(|&id| {
                let directive = graph.macro_directive(id);
                MacroEntry {
                    name: directive.name.clone(),
                    location: graph.location(directive.span),
                    needs_undef: closure.needs_undef.contains(&id),
                }
            })
            .collect();
        Self {
            file: graph
                .main_file()
                .map(|f| f.path.display().to_string())
                .unwrap_or_default(),
            functions: closure
                .roots
                .iter()
                .filter_map(|&r| graph.decl(r).name.clone())
                .collect(),
            decls,
            macros,
            renames: closure.renames.values().cloned().collect(),
            pass_sizes: closure.pass_sizes.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Other(format!("cannot serialize closure report: {}", e)))
    }
}

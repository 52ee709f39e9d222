//! cextract Analysis Engine
//!
//! Computes and prints the dependency closure of C functions:
//! - Enum constant table (recovering folded array sizes)
//! - Macro redefinition tracking (positional macro resolution)
//! - Include membership (expanded headers vs. kept `#include` lines)
//! - Closure engine (worklist fixed point over calls, types and macros)
//! - Redundant declaration reduction
//! - Symbol externalization (`klp_` pointers for internal symbols)
//! - Source emission

pub mod closure;
pub mod emitter;
pub mod enum_table;
pub mod externalize;
pub mod includes;
pub mod macros;
pub mod reduce;
pub mod report;

use cextract_core::config::ExtractConfig;
use cextract_core::{DeclId, ProgramGraph, Result};
use cextract_parser::get_frontend;
use std::collections::BTreeSet;
use std::path::Path;
use tracing::info;

pub use closure::{Closure, ClosureEngine, EngineContext};
pub use emitter::Emitter;
pub use enum_table::EnumConstantTable;
pub use externalize::{Externalizer, RenameCandidate, SymbolKind, RENAME_PREFIX};
pub use includes::IncludeOracle;
pub use macros::MacroTracker;
pub use reduce::remove_redundant_decls;
pub use report::ClosureReport;

/// Result of one extraction request
#[derive(Debug, Clone)]
pub struct Extraction {
    /// Full dependency closure
    pub closure: Closure,
    /// Closure after redundancy reduction
    pub reduced: BTreeSet<DeclId>,
    /// Emitted source text
    pub text: String,
}

/// Extraction session over one translation unit.
///
/// The per-unit services are built once and shared read-only by every
/// request; each request owns its own marking state.
pub struct Extractor {
    graph: ProgramGraph,
    enums: EnumConstantTable,
    macros: MacroTracker,
    includes: IncludeOracle,
    externalizer: Externalizer,
}

impl Extractor {
    pub fn new(graph: ProgramGraph, config: &ExtractConfig) -> Self {
        let enums = EnumConstantTable::build(&graph);
        let macros = MacroTracker::build(&graph);
        let includes = IncludeOracle::build(&graph, config.frontend.keep_includes);
        let externalizer = Externalizer::new(&config.extract);
        Self {
            graph,
            enums,
            macros,
            includes,
            externalizer,
        }
    }

    /// Parse `path` with the default front end and open a session on it
    pub fn from_file(path: &Path, config: &ExtractConfig) -> Result<Self> {
        let graph = get_frontend().parse_file(path, &config.frontend)?;
        Ok(Self::new(graph, config))
    }

    pub fn graph(&self) -> &ProgramGraph {
        &self.graph
    }

    fn context(&self) -> EngineContext<'_> {
        EngineContext {
            graph: &self.graph,
            enums: &self.enums,
            macros: &self.macros,
            includes: &self.includes,
            externalizer: &self.externalizer,
        }
    }

    /// Dependency closure of `functions`
    pub fn compute_closure(&self, functions: &[String]) -> Result<Closure> {
        ClosureEngine::new(self.context()).compute(functions)
    }

    /// Closure, reduction and emission for `functions`
    pub fn extract(&self, functions: &[String]) -> Result<Extraction> {
        let closure = self.compute_closure(functions)?;
        let reduced = remove_redundant_decls(&self.graph, &closure.decls)?;
        let text = Emitter::new(&self.graph, &self.includes, &self.macros).emit(&closure, &reduced);
        info!(
            "Extracted {} ({} decls, {} emitted, {} macros, {} externalized)",
            functions.join(", "),
            closure.decls.len(),
            reduced.len(),
            closure.macros.len(),
            closure.renames.len()
        );
        Ok(Extraction {
            closure,
            reduced,
            text,
        })
    }

    /// JSON dump of an extraction
    pub fn report(&self, extraction: &Extraction) -> ClosureReport {
        ClosureReport::new(&self.graph, &extraction.closure, &extraction.reduced)
    }
}

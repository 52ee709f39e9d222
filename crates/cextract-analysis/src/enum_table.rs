//! Enum constant table
//!
//! Maps a folded integer value back to the enum constant that may have
//! produced it. Built once per translation unit.

use cextract_core::{DeclId, DeclKind, ProgramGraph};
use std::collections::HashMap;
use tracing::trace;

/// `(value, enclosing function)` to enum constant
#[derive(Debug, Default, Clone)]
pub struct EnumConstantTable {
    constants: HashMap<(i64, Option<DeclId>), DeclId>,
}

impl EnumConstantTable {
    /// Index every enum constant of the graph. When two constants share a
    /// value in the same context, the one declared last wins.
    pub fn build(graph: &ProgramGraph) -> Self {
        let mut constants = HashMap::new();
        for decl in &graph.decls {
            let DeclKind::EnumConstant { value, .. } = decl.kind else {
                continue;
            };
            if let Some(previous) = constants.insert((value, decl.context), decl.id) {
                trace!(
                    "enum value {} now maps to {:?} instead of {:?}",
                    value,
                    decl.name,
                    graph.decl(previous).name
                );
            }
        }
        Self { constants }
    }

    /// Constant folding to `value` in `context`, falling back to file scope
    pub fn lookup(&self, value: i64, context: Option<DeclId>) -> Option<DeclId> {
        self.constants
            .get(&(value, context))
            .or_else(|| context.and_then(|_| self.constants.get(&(value, None))))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.constants.len()
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty()
    }
}

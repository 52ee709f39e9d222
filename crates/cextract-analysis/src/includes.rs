//! Include membership oracle
//!
//! Decides which parts of the translation unit are flattened into the
//! output and which stay behind an `#include` line.

use cextract_core::{FileId, IncludeId, ItemId, ProgramGraph, SourcePos};

/// Expanded-region bookkeeping for one translation unit
#[derive(Debug, Default, Clone)]
pub struct IncludeOracle {
    file_expanded: Vec<bool>,
    include_expanded: Vec<bool>,
}

impl IncludeOracle {
    /// The main file is always expanded. A header is expanded when its
    /// include is quoted, resolved and parsed, every enclosing include is
    /// expanded too, and `keep_includes` is off.
    pub fn build(graph: &ProgramGraph, keep_includes: bool) -> Self {
        let mut include_expanded = vec![false; graph.includes.len()];
        // Parents are allocated before the includes they contain
        for include in &graph.includes {
            let parent_expanded = include
                .parent
                .map_or(true, |p| include_expanded[p.index()]);
            include_expanded[include.id.index()] =
                !keep_includes && !include.system && include.file.is_some() && parent_expanded;
        }
        let file_expanded = graph
            .files
            .iter()
            .map(|f| f.included_by.map_or(true, |i| include_expanded[i.index()]))
            .collect();
        Self {
            file_expanded,
            include_expanded,
        }
    }

    pub fn is_inside_expanded_region(&self, graph: &ProgramGraph, pos: SourcePos) -> bool {
        self.is_file_expanded(graph.file_of(pos))
    }

    pub fn is_file_expanded(&self, file: FileId) -> bool {
        self.file_expanded.get(file.0 as usize).copied().unwrap_or(false)
    }

    pub fn is_include_expanded(&self, include: IncludeId) -> bool {
        self.include_expanded
            .get(include.index())
            .copied()
            .unwrap_or(false)
    }

    /// Whether `file` was brought in, directly or not, by `include`
    pub fn in_subtree(&self, graph: &ProgramGraph, include: IncludeId, file: FileId) -> bool {
        let mut current = graph.file(file).included_by;
        while let Some(i) = current {
            if i == include {
                return true;
            }
            current = graph.include(i).parent;
        }
        false
    }

    /// Item of the main output that stands for `item`: the item itself when
    /// its file is expanded, else the outermost `#include` hiding it
    pub fn emission_slot(&self, graph: &ProgramGraph, item: ItemId) -> ItemId {
        let mut current = graph.file(graph.item(item).file).included_by;
        let mut slot = item;
        while let Some(i) = current {
            if self.is_include_expanded(i) {
                break;
            }
            let include = graph.include(i);
            slot = include.item;
            current = include.parent;
        }
        slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cextract_core::config::FrontendConfig;
    use cextract_parser::get_frontend;
    use std::fs;
    use tempfile::TempDir;

    fn graph_with_headers(temp: &TempDir) -> ProgramGraph {
        fs::write(temp.path().join("outer.h"), "#include \"inner.h\"\nint outer;\n").unwrap();
        fs::write(temp.path().join("inner.h"), "int inner;\n").unwrap();
        let main = temp.path().join("main.c");
        fs::write(&main, "#include \"outer.h\"\n#include <sys.h>\nint x;\n").unwrap();
        get_frontend()
            .parse_file(&main, &FrontendConfig::default())
            .unwrap()
    }

    fn file_of(graph: &ProgramGraph, name: &str) -> FileId {
        graph.decl(graph.file_scope[name][0]).span.file
    }

    #[test]
    fn quoted_headers_expand_transitively() {
        let temp = TempDir::new().unwrap();
        let graph = graph_with_headers(&temp);
        let oracle = IncludeOracle::build(&graph, false);
        assert!(oracle.is_file_expanded(file_of(&graph, "x")));
        assert!(oracle.is_file_expanded(file_of(&graph, "outer")));
        assert!(oracle.is_file_expanded(file_of(&graph, "inner")));
        let system = graph.includes.iter().find(|i| i.system).unwrap();
        assert!(!oracle.is_include_expanded(system.id));
    }

    #[test]
    fn keep_includes_only_expands_main_file() {
        let temp = TempDir::new().unwrap();
        let graph = graph_with_headers(&temp);
        let oracle = IncludeOracle::build(&graph, true);
        assert!(oracle.is_file_expanded(file_of(&graph, "x")));
        assert!(!oracle.is_file_expanded(file_of(&graph, "inner")));

        let outer_include = graph.includes[0].id;
        let inner_item = graph.decl(graph.file_scope["inner"][0]).item;
        assert!(oracle.in_subtree(&graph, outer_include, file_of(&graph, "inner")));
        assert_eq!(
            oracle.emission_slot(&graph, inner_item),
            graph.includes[0].item
        );
    }
}

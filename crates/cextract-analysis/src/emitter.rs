//! Output emitter
//!
//! Prints the reduced closure in the original top-level order. Expanded
//! headers are printed inline; headers that stay behind their `#include`
//! keep the directive line when the closure needs something from them.

use cextract_core::{
    ChainId, Decl, DeclId, DeclKind, FileId, IncludeId, Item, ItemId, ItemKind, MacroId,
    ProgramGraph, Span, StmtKind,
};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::trace;

use crate::closure::Closure;
use crate::externalize::{pointer_declaration, strip_storage_and_typedef};
use crate::includes::IncludeOracle;
use crate::macros::MacroTracker;

/// A text replacement inside one file
#[derive(Debug, Clone, PartialEq, Eq)]
struct Edit {
    span: Span,
    text: String,
}

/// Prints one extraction result
pub struct Emitter<'a> {
    graph: &'a ProgramGraph,
    includes: &'a IncludeOracle,
    macros: &'a MacroTracker,
}

/// Output state of one `emit` call
struct Output<'c> {
    closure: &'c Closure,
    chunks: Vec<String>,
    /// Externalized entities whose pointer was printed already
    pointers: HashSet<ChainId>,
}

impl<'a> Emitter<'a> {
    pub fn new(
        graph: &'a ProgramGraph,
        includes: &'a IncludeOracle,
        macros: &'a MacroTracker,
    ) -> Self {
        Self {
            graph,
            includes,
            macros,
        }
    }

    /// Render `reduced`, the redundancy-free subset of `closure`
    pub fn emit(&self, closure: &Closure, reduced: &BTreeSet<DeclId>) -> String {
        let graph = self.graph;
        let undefs = self.undef_slots(closure);
        let needed_files = self.needed_files(closure);
        let mut out = Output {
            closure,
            chunks: Vec::new(),
            pointers: HashSet::new(),
        };

        for item in &graph.items {
            if let Some(names) = undefs.get(&item.id) {
                for name in names {
                    out.chunks.push(format!("#undef {}", name));
                }
            }
            if !self.includes.is_file_expanded(item.file) {
                continue;
            }
            match &item.kind {
                ItemKind::Include(include) => {
                    if self.keep_include_line(*include, &needed_files) {
                        out.chunks.push(graph.text(item.span).to_string());
                    }
                }
                ItemKind::Macro(m) => {
                    if closure.macros.contains(m) {
                        out.chunks.push(graph.text(item.span).to_string());
                    }
                }
                ItemKind::Decls(decls) => {
                    if decls.iter().any(|d| reduced.contains(d)) {
                        self.emit_decls(item, decls, &mut out);
                    }
                }
                ItemKind::Other => {}
            }
        }

        let chunks: Vec<&str> = out
            .chunks
            .iter()
            .map(|c| c.trim())
            .filter(|c| !c.is_empty())
            .collect();
        if chunks.is_empty() {
            return String::new();
        }
        let mut text = chunks.join("\n\n");
        text.push('\n');
        text
    }

    /// Items before which an `#undef` restores the original definition order
    fn undef_slots(&self, closure: &Closure) -> BTreeMap<ItemId, BTreeSet<String>> {
        let graph = self.graph;
        let mut slots: BTreeMap<ItemId, BTreeSet<String>> = BTreeMap::new();
        for &m in &closure.needs_undef {
            let Some(next) = self.macros.next_directive(graph, m) else {
                continue;
            };
            let slot = self
                .includes
                .emission_slot(graph, graph.macro_directive(next).item);
            let name = &graph.macro_directive(m).name;
            trace!("#undef {} goes before item {:?}", name, slot);
            slots.entry(slot).or_default().insert(name.clone());
        }
        slots
    }

    /// Files holding something the closure needs
    fn needed_files(&self, closure: &Closure) -> BTreeSet<FileId> {
        let graph = self.graph;
        let decls = closure.decls.iter().map(|&d| graph.decl(d).span.file);
        let macros = closure
            .macros
            .iter()
            .map(|&m: &MacroId| graph.macro_directive(m).span.file);
        decls.chain(macros).collect()
    }

    fn keep_include_line(&self, include: IncludeId, needed_files: &BTreeSet<FileId>) -> bool {
        let graph = self.graph;
        if self.includes.is_include_expanded(include) {
            return false;
        }
        if graph.include(include).resolved.is_none() {
            return true;
        }
        needed_files
            .iter()
            .any(|&file| self.includes.in_subtree(graph, include, file))
    }

    fn emit_decls(&self, item: &Item, decls: &[DeclId], out: &mut Output<'_>) {
        let graph = self.graph;
        let closure = out.closure;
        let declarators: Vec<&Decl> = decls
            .iter()
            .map(|&d| graph.decl(d))
            .filter(|d| d.declarator.is_some())
            .collect();

        let mut printed: Vec<&Decl> = Vec::new();
        let mut pointer_here = false;
        for decl in declarators.iter().copied().filter(|d| closure.contains(d.id)) {
            let Some(candidate) = closure.rename_for(graph, decl.id) else {
                printed.push(decl);
                continue;
            };
            if !out.pointers.insert(decl.chain) {
                continue;
            }
            let Some(spans) = decl.declarator else {
                continue;
            };
            let specifiers = Span::new(item.file, item.span.start, spans.full.start);
            if let Some(text) = pointer_declaration(graph, decl, specifiers, candidate) {
                out.chunks.push(text);
                pointer_here = true;
            }
        }

        let is_definition = printed
            .iter()
            .any(|d| matches!(d.kind, DeclKind::Function { body: Some(_), .. }));
        if is_definition || printed.len() == declarators.len() {
            let edits = self.rename_edits(closure, &printed);
            out.chunks.push(apply_edits(graph, item.span, &edits));
            return;
        }

        let first = declarators
            .first()
            .and_then(|d| d.declarator)
            .map_or(item.span.end, |spans| spans.full.start);
        let prefix = graph.text(Span::new(item.file, item.span.start, first));

        if printed.is_empty() {
            let tags_marked = decls.iter().any(|&d| {
                closure.contains(d)
                    && matches!(graph.decl(d).kind, DeclKind::Record { .. } | DeclKind::Enum { .. })
            });
            if tags_marked && !pointer_here {
                out.chunks.push(format!("{};", strip_storage_and_typedef(prefix)));
            }
            return;
        }

        let edits = self.rename_edits(closure, &printed);
        let parts: Vec<String> = printed
            .iter()
            .filter_map(|d| d.declarator)
            .map(|spans| apply_edits(graph, spans.full, &edits))
            .collect();
        out.chunks.push(format!("{}{};", prefix, parts.join(", ")));
    }

    /// Spelled uses of externalized symbols inside the given declarations
    fn rename_edits(&self, closure: &Closure, decls: &[&Decl]) -> Vec<Edit> {
        let graph = self.graph;
        if closure.renames.is_empty() {
            return Vec::new();
        }
        let mut edits = Vec::new();
        let roots = decls.iter().filter_map(|d| match &d.kind {
            DeclKind::Function { body, .. } => body.as_ref(),
            DeclKind::Variable { init, .. } => init.as_ref(),
            _ => None,
        });
        let mut stack: Vec<_> = roots.collect();
        while let Some(stmt) = stack.pop() {
            match &stmt.kind {
                StmtKind::DeclRef {
                    decl,
                    spelled: true,
                } => {
                    if let Some(candidate) = closure.rename_for(graph, *decl) {
                        edits.push(Edit {
                            span: stmt.span,
                            text: candidate.use_text(),
                        });
                    }
                }
                StmtKind::LocalDecl(local) => {
                    if let DeclKind::Variable { init: Some(init), .. } = &graph.decl(*local).kind {
                        stack.push(init);
                    }
                }
                _ => {}
            }
            stack.extend(stmt.children.iter());
        }
        edits.sort_by_key(|e| (e.span.file, e.span.start));
        edits.dedup();
        edits
    }
}

/// Text of `span` with the edits that fall inside it applied
fn apply_edits(graph: &ProgramGraph, span: Span, edits: &[Edit]) -> String {
    let mut text = String::new();
    let mut cursor = span.start;
    for edit in edits.iter().filter(|e| e.span.is_within(&span)) {
        if edit.span.start < cursor {
            continue;
        }
        text.push_str(graph.text(Span::new(span.file, cursor, edit.span.start)));
        text.push_str(&edit.text);
        cursor = edit.span.end;
    }
    text.push_str(graph.text(Span::new(span.file, cursor, span.end)));
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use cextract_core::config::FrontendConfig;
    use cextract_parser::get_frontend;

    #[test]
    fn edits_replace_only_inside_span() {
        let graph = get_frontend()
            .parse("int g; int h;\n", "t.c", &FrontendConfig::default())
            .unwrap();
        let file = graph.items[0].file;
        let edits = vec![
            Edit {
                span: Span::new(file, 4, 5),
                text: "(*klp_g)".into(),
            },
            Edit {
                span: Span::new(file, 11, 12),
                text: "X".into(),
            },
        ];
        assert_eq!(apply_edits(&graph, Span::new(file, 0, 6), &edits), "int (*klp_g);");
    }
}

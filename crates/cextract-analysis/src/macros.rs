//! Macro redefinition tracker
//!
//! A macro name may be defined, undefined and redefined any number of times
//! in one translation unit. The tracker answers which directive is in effect
//! at a given source position.

use cextract_core::{Error, MacroId, ProgramGraph, Result, SourcePos};
use std::collections::HashMap;

#[derive(Debug, Clone, Copy)]
struct Entry {
    pos: SourcePos,
    id: MacroId,
    define: bool,
}

/// Per-name directive lists in translation order
#[derive(Debug, Default, Clone)]
pub struct MacroTracker {
    by_name: HashMap<String, Vec<Entry>>,
}

impl MacroTracker {
    pub fn build(graph: &ProgramGraph) -> Self {
        let mut by_name: HashMap<String, Vec<Entry>> = HashMap::new();
        for directive in &graph.macros {
            by_name
                .entry(directive.name.clone())
                .or_default()
                .push(Entry {
                    pos: directive.pos,
                    id: directive.id,
                    define: directive.is_define(),
                });
        }
        for entries in by_name.values_mut() {
            entries.sort_by_key(|e| e.pos);
        }
        Self { by_name }
    }

    /// Whether any directive mentions `name`
    pub fn is_macro(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    /// The `#define` of `name` visible at `pos`.
    ///
    /// Fails with [`Error::NoVisibleDefinition`] when `name` was never defined
    /// before `pos` or the latest directive is an `#undef`.
    pub fn resolve(&self, graph: &ProgramGraph, name: &str, pos: SourcePos) -> Result<MacroId> {
        let entries = self.by_name.get(name).map(Vec::as_slice).unwrap_or(&[]);
        let idx = entries.partition_point(|e| e.pos <= pos);
        match idx.checked_sub(1).map(|i| entries[i]) {
            Some(entry) if entry.define => Ok(entry.id),
            _ => Err(Error::NoVisibleDefinition {
                name: name.to_string(),
                location: graph.pos_location(pos),
            }),
        }
    }

    /// Directive of the same name that follows `id`
    pub fn next_directive(&self, graph: &ProgramGraph, id: MacroId) -> Option<MacroId> {
        let directive = graph.macro_directive(id);
        let entries = self.by_name.get(&directive.name)?;
        let idx = entries.partition_point(|e| e.pos <= directive.pos);
        entries.get(idx).map(|e| e.id)
    }

    /// Definitions of the same name that follow `id`
    pub fn later_definitions<'a>(
        &'a self,
        graph: &'a ProgramGraph,
        id: MacroId,
    ) -> impl Iterator<Item = MacroId> + 'a {
        let directive = graph.macro_directive(id);
        let entries = self
            .by_name
            .get(&directive.name)
            .map(Vec::as_slice)
            .unwrap_or(&[]);
        let idx = entries.partition_point(|e| e.pos <= directive.pos);
        entries[idx..].iter().filter(|e| e.define).map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cextract_core::config::FrontendConfig;
    use cextract_parser::get_frontend;

    const SOURCE: &str = "\
#define A 1
int before = A;
#undef A
int gap;
#define A 2
int after = A;
";

    fn setup() -> (ProgramGraph, MacroTracker) {
        let graph = get_frontend()
            .parse(SOURCE, "t.c", &FrontendConfig::default())
            .unwrap();
        let tracker = MacroTracker::build(&graph);
        (graph, tracker)
    }

    fn item_pos(graph: &ProgramGraph, var: &str) -> SourcePos {
        graph.decl(graph.file_scope[var][0]).pos
    }

    #[test]
    fn resolves_by_position() {
        let (graph, tracker) = setup();
        let first = tracker.resolve(&graph, "A", item_pos(&graph, "before")).unwrap();
        let second = tracker.resolve(&graph, "A", item_pos(&graph, "after")).unwrap();
        assert_eq!(graph.macro_directive(first).pos.seq, 0);
        assert_ne!(first, second);
    }

    #[test]
    fn undef_hides_definition() {
        let (graph, tracker) = setup();
        let err = tracker
            .resolve(&graph, "A", item_pos(&graph, "gap"))
            .unwrap_err();
        assert!(matches!(err, Error::NoVisibleDefinition { .. }));
        assert!(err.is_recoverable());
        assert!(tracker.resolve(&graph, "B", item_pos(&graph, "gap")).is_err());
    }

    #[test]
    fn next_and_later_directives() {
        let (graph, tracker) = setup();
        let first = MacroId(0);
        assert_eq!(tracker.next_directive(&graph, first), Some(MacroId(1)));
        let later: Vec<MacroId> = tracker.later_definitions(&graph, first).collect();
        assert_eq!(later, vec![MacroId(2)]);
        assert_eq!(tracker.next_directive(&graph, MacroId(2)), None);
    }
}

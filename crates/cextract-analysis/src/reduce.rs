//! Redundant declaration reducer
//!
//! Several marked declarations can come from the same source text: a struct
//! defined inside a typedef, the locals of a marked function, every
//! declarator of `int a, b;`. Printing each would duplicate code, so only
//! the outermost span of every nest survives.

use cextract_core::{DeclId, Error, ProgramGraph, Result};
use std::cmp::Reverse;
use std::collections::BTreeSet;
use tracing::trace;

/// Drop every declaration whose span lies inside another kept one.
///
/// Equal spans keep the lower id. Two spans that overlap without nesting
/// cannot be printed without duplication and fail with
/// [`Error::RedundantDeclConflict`].
pub fn remove_redundant_decls(
    graph: &ProgramGraph,
    decls: &BTreeSet<DeclId>,
) -> Result<BTreeSet<DeclId>> {
    let mut order: Vec<DeclId> = decls.iter().copied().collect();
    order.sort_by_key(|&d| {
        let span = graph.decl(d).span;
        (span.file, span.start, Reverse(span.end), d)
    });

    let mut kept = BTreeSet::new();
    let mut outer: Option<DeclId> = None;
    for d in order {
        let span = graph.decl(d).span;
        if let Some(o) = outer {
            let outer_span = graph.decl(o).span;
            if span.is_within(&outer_span) {
                trace!("{:?} is covered by {:?}", d, o);
                continue;
            }
            if span.overlaps(&outer_span) {
                return Err(Error::RedundantDeclConflict {
                    first: graph.location(outer_span),
                    second: graph.location(span),
                });
            }
        }
        outer = Some(d);
        kept.insert(d);
    }
    Ok(kept)
}

#[cfg(test)]
mod tests {
    use super::*;
    use cextract_core::{DeclKind, ItemKind, SourcePos, Span, StorageClass, Type};
    use std::path::PathBuf;

    /// Graph with one `int` variable per span, all in one file
    fn graph_with_spans(spans: &[(u32, u32)]) -> (ProgramGraph, Vec<DeclId>) {
        let mut g = ProgramGraph::new();
        let text = " ".repeat(64);
        let file = g.add_file(PathBuf::from("t.c"), text, None);
        let item = g.add_item(file, Span::new(file, 0, 64), ItemKind::Other);
        let int = g.add_type(Type::Builtin("int".into()));
        let ids = spans
            .iter()
            .enumerate()
            .map(|(i, &(start, end))| {
                g.add_decl(
                    Some(format!("v{}", i)),
                    DeclKind::Variable { ty: int, init: None },
                    StorageClass::None,
                    Span::new(file, start, end),
                    SourcePos::new(0, start),
                    None,
                    item,
                    None,
                )
            })
            .collect();
        (g, ids)
    }

    #[test]
    fn nested_spans_collapse_to_outermost() {
        let (g, ids) = graph_with_spans(&[(0, 30), (5, 10), (12, 30), (40, 50)]);
        let all: BTreeSet<_> = ids.iter().copied().collect();
        let kept = remove_redundant_decls(&g, &all).unwrap();
        assert_eq!(kept, BTreeSet::from([ids[0], ids[3]]));
    }

    #[test]
    fn equal_spans_keep_lower_id() {
        let (g, ids) = graph_with_spans(&[(0, 10), (0, 10)]);
        let all: BTreeSet<_> = ids.iter().copied().collect();
        let kept = remove_redundant_decls(&g, &all).unwrap();
        assert_eq!(kept, BTreeSet::from([ids[0]]));
    }

    #[test]
    fn partial_overlap_is_fatal() {
        let (g, ids) = graph_with_spans(&[(0, 10), (5, 20)]);
        let all: BTreeSet<_> = ids.iter().copied().collect();
        let err = remove_redundant_decls(&g, &all).unwrap_err();
        assert!(matches!(err, Error::RedundantDeclConflict { .. }));
    }

    #[test]
    fn adjacent_spans_do_not_conflict() {
        let (g, ids) = graph_with_spans(&[(0, 10), (10, 20)]);
        let all: BTreeSet<_> = ids.iter().copied().collect();
        let kept = remove_redundant_decls(&g, &all).unwrap();
        assert_eq!(kept.len(), 2);
    }
}

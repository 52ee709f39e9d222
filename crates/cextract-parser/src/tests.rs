//! Extended tests for the cextract front end
//!
//! These tests check the program graph built for small translation units:
//! redeclaration chains, folded constants, macro bookkeeping and includes.

use super::*;
use cextract_core::{Decl, DeclKind, ItemKind, MacroKind, Stmt, StmtKind, Type};
use pretty_assertions::assert_eq;
use std::fs;
use tempfile::TempDir;

fn parse(source: &str) -> ProgramGraph {
    get_frontend()
        .parse(source, "test.c", &FrontendConfig::default())
        .unwrap()
}

fn named<'g>(graph: &'g ProgramGraph, name: &str) -> Vec<&'g Decl> {
    graph
        .decls
        .iter()
        .filter(|d| d.name.as_deref() == Some(name))
        .collect()
}

fn collect_kinds(stmt: &Stmt) -> Vec<StmtKind> {
    let mut kinds = Vec::new();
    stmt.visit(|s| kinds.push(s.kind.clone()));
    kinds
}

/// A prototype and its definition form one redeclaration chain
#[test]
fn test_prototype_and_definition_share_chain() {
    let graph = parse("int f(void);\nint f(void) { return 0; }\n");
    let decls = named(&graph, "f");
    assert_eq!(decls.len(), 2);
    assert_eq!(decls[0].chain, decls[1].chain);
    assert!(!decls[0].has_body());
    assert!(decls[1].has_body());
    assert_eq!(graph.function_chains("f").len(), 1);
}

/// A second definition of the same name opens a new chain
#[test]
fn test_duplicate_definitions_open_separate_chains() {
    let graph = parse("static int f(void) { return 1; }\nstatic int f(void) { return 2; }\n");
    assert_eq!(graph.function_chains("f").len(), 2);
}

/// Enumerator values are folded through macros and earlier constants
#[test]
fn test_enum_values_fold() {
    let graph = parse("#define BASE 4\nenum e { A, B = BASE * 2, C };\n");
    let value = |name: &str| match named(&graph, name)[0].kind {
        DeclKind::EnumConstant { value, .. } => value,
        _ => panic!("{} is not an enum constant", name),
    };
    assert_eq!(value("A"), 0);
    assert_eq!(value("B"), 8);
    assert_eq!(value("C"), 9);
}

/// Array sizes keep only their folded value
#[test]
fn test_array_size_is_folded() {
    let graph = parse("enum { N = 3 };\nint arr[N + 1];\n");
    let arr = named(&graph, "arr")[0];
    let DeclKind::Variable { ty, .. } = arr.kind else {
        panic!("arr should be a variable");
    };
    assert!(matches!(graph.ty(ty), Type::Array { size: Some(4), .. }));
}

/// Function-like macros only expand when followed by a parenthesis
#[test]
fn test_function_like_macro_needs_paren() {
    let graph = parse("#define F(x) x\n#define O 1\nint F;\nint a = F(2) + O;\n");
    let names: Vec<&str> = graph.expansions.iter().map(|e| e.name.as_str()).collect();
    assert_eq!(names, vec!["F", "O"]);
}

/// Macro uses in a body carry what the macro body references
#[test]
fn test_macro_expansion_references() {
    let graph = parse("int g;\n#define USE_G (g + 1)\nint f(void) { return USE_G; }\n");
    let g = named(&graph, "g")[0].id;
    let f = named(&graph, "f")[0];
    let kinds = collect_kinds(f.body().unwrap());
    assert!(kinds.contains(&StmtKind::Expansion("USE_G".into())));
    assert!(kinds.contains(&StmtKind::DeclRef {
        decl: g,
        spelled: false
    }));
}

/// A tag mentioned before its definition chains to that definition
#[test]
fn test_implicit_struct_chains_to_definition() {
    let graph = parse("struct s *p;\nstruct s { int x; };\n");
    let tags = named(&graph, "s");
    assert_eq!(tags.len(), 2);
    assert_eq!(tags[0].chain, tags[1].chain);
    assert!(matches!(tags[0].kind, DeclKind::Record { complete: false, .. }));
    assert!(matches!(tags[1].kind, DeclKind::Record { complete: true, .. }));
    assert!(tags[0].is_file_scope());
}

/// Every declarator of an item spans the whole item
#[test]
fn test_declarator_spans() {
    let source = "int a = 1, b;\n";
    let graph = parse(source);
    let a = named(&graph, "a")[0];
    let b = named(&graph, "b")[0];
    let item = graph.item(a.item);
    assert_eq!(a.span, item.span);
    assert_eq!(b.span, item.span);
    let spans = a.declarator.unwrap();
    assert_eq!(graph.text(spans.full), "a = 1");
    assert_eq!(graph.text(spans.bare), "a");
    assert_eq!(graph.text(spans.name), "a");
}

/// `typedef struct P {...} P;` is one item holding both declarations
#[test]
fn test_typedef_struct_item() {
    let graph = parse("typedef struct Point { int x; int y; } Point;\n");
    let item = graph
        .items
        .iter()
        .find(|i| matches!(i.kind, ItemKind::Decls(_)))
        .unwrap();
    let ItemKind::Decls(decls) = &item.kind else {
        unreachable!()
    };
    let kinds: Vec<&str> = decls.iter().map(|&d| graph.decl(d).kind_name()).collect();
    assert_eq!(kinds, vec!["struct", "typedef"]);
}

/// Both branches of a conditional group are visible
#[test]
fn test_conditional_groups_are_transparent() {
    let graph = parse("#ifdef X\nint a;\n#else\nint b;\n#endif\n");
    assert!(graph.file_scope.contains_key("a"));
    assert!(graph.file_scope.contains_key("b"));
}

/// `#undef` ends macro visibility
#[test]
fn test_undef_is_recorded() {
    let graph = parse("#define A 1\n#undef A\nint x = A;\n");
    assert_eq!(graph.macros.len(), 2);
    assert_eq!(graph.macros[1].kind, MacroKind::Undef);
    assert!(graph.expansions.is_empty());
}

/// Locals shadow file-scope declarations of the same name
#[test]
fn test_local_shadows_global() {
    let graph = parse("int x;\nint f(void) { int x = 1; return x; }\n");
    let f = named(&graph, "f")[0];
    let refs: Vec<_> = collect_kinds(f.body().unwrap())
        .into_iter()
        .filter_map(|k| match k {
            StmtKind::DeclRef { decl, .. } => Some(decl),
            _ => None,
        })
        .collect();
    assert_eq!(refs.len(), 1);
    assert_eq!(graph.decl(refs[0]).context, Some(f.id));
}

/// A header included twice is parsed only once
#[test]
fn test_header_parsed_once() {
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("a.h"), "int from_header;\n").unwrap();
    let main = temp.path().join("main.c");
    fs::write(&main, "#include \"a.h\"\n#include \"a.h\"\nint x;\n").unwrap();

    let graph = get_frontend()
        .parse_file(&main, &FrontendConfig::default())
        .unwrap();
    assert_eq!(graph.files.len(), 2);
    assert_eq!(graph.includes.len(), 2);
    assert!(graph.includes[0].file.is_some());
    assert!(graph.includes[1].file.is_none());
    assert!(graph.includes[1].resolved.is_some());
    let header_decl = named(&graph, "from_header")[0];
    assert_eq!(graph.file(header_decl.span.file).included_by, Some(graph.includes[0].id));
}

/// System headers that do not resolve stay directives
#[test]
fn test_system_include_unresolved() {
    let graph = parse("#include <stdio.h>\nint main(void) { return 0; }\n");
    let include = &graph.includes[0];
    assert!(include.system);
    assert_eq!(include.spelled, "stdio.h");
    assert!(include.resolved.is_none());
}

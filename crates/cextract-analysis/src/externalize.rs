//! Symbol externalization
//!
//! A patch module cannot link against `static` symbols of the code it
//! patches. Such callees and variables are turned into `klp_`-prefixed
//! pointers that the patch loader fills in, and every use in the emitted
//! code is rewritten to go through the pointer.

use cextract_core::config::ExtractOptions;
use cextract_core::{ChainId, Decl, DeclKind, ProgramGraph, Span, StorageClass};
use regex::Regex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::OnceLock;

/// Prefix of externalized symbol names
pub const RENAME_PREFIX: &str = "klp_";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SymbolKind {
    Function,
    Variable,
}

/// A symbol eligible for rename, keyed by its original name
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RenameCandidate {
    pub original: String,
    pub new_name: String,
    pub kind: SymbolKind,
    #[serde(skip)]
    pub chain: ChainId,
}

impl RenameCandidate {
    /// Text that replaces a spelled use of the symbol
    pub fn use_text(&self) -> String {
        match self.kind {
            SymbolKind::Function => self.new_name.clone(),
            SymbolKind::Variable => format!("(*{})", self.new_name),
        }
    }
}

/// Externalization policy of one extraction session
#[derive(Debug, Clone, Default)]
pub struct Externalizer {
    enabled: bool,
    export_symbols: HashSet<String>,
}

impl Externalizer {
    pub fn new(options: &ExtractOptions) -> Self {
        Self {
            enabled: options.externalize,
            export_symbols: options.export_symbols.iter().cloned().collect(),
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Rename candidate for `decl` if it must be reached through a pointer.
    ///
    /// Only file-scope functions and variables qualify, and only when some
    /// declaration of the entity is `static` or the name was exported
    /// explicitly. Closure roots never qualify; callers filter them out.
    pub fn candidate(&self, graph: &ProgramGraph, decl: &Decl) -> Option<RenameCandidate> {
        if !self.enabled || !decl.is_file_scope() {
            return None;
        }
        let kind = match decl.kind {
            DeclKind::Function { .. } => SymbolKind::Function,
            DeclKind::Variable { .. } => SymbolKind::Variable,
            _ => return None,
        };
        let name = decl.name.as_deref()?;
        let internal = graph
            .redecls(decl.id)
            .iter()
            .any(|&d| graph.decl(d).storage == StorageClass::Static);
        if !internal && !self.export_symbols.contains(name) {
            return None;
        }
        Some(RenameCandidate {
            original: name.to_string(),
            new_name: format!("{}{}", RENAME_PREFIX, name),
            kind,
            chain: decl.chain,
        })
    }
}

fn storage_keywords() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"\b(static|extern|inline|__inline|__inline__|register|auto)\b\s*")
            .expect("keyword pattern is valid")
    })
}

fn typedef_keyword() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\btypedef\b\s*").expect("keyword pattern is valid"))
}

/// Drop storage-class and inline keywords from declaration specifiers
pub fn strip_storage(specifiers: &str) -> String {
    storage_keywords()
        .replace_all(specifiers, "")
        .trim()
        .to_string()
}

/// Specifiers of an item reduced to the tag types they define
pub fn strip_storage_and_typedef(specifiers: &str) -> String {
    let stripped = strip_storage(specifiers);
    typedef_keyword().replace_all(&stripped, "").trim().to_string()
}

/// `static <specifiers> <declarator with (*klp_name)>;` for one declaration
pub fn pointer_declaration(
    graph: &ProgramGraph,
    decl: &Decl,
    specifiers: Span,
    candidate: &RenameCandidate,
) -> Option<String> {
    let spans = decl.declarator?;
    let bare = graph.text(spans.bare);
    let name_start = (spans.name.start - spans.bare.start) as usize;
    let name_end = (spans.name.end - spans.bare.start) as usize;
    let declarator = format!(
        "{}(*{}){}",
        bare.get(..name_start)?,
        candidate.new_name,
        bare.get(name_end..)?
    );
    let specifiers = strip_storage(graph.text(specifiers));
    Some(format!("static {} {};", specifiers, declarator))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cextract_core::config::FrontendConfig;
    use cextract_parser::get_frontend;

    fn parse(source: &str) -> ProgramGraph {
        get_frontend()
            .parse(source, "t.c", &FrontendConfig::default())
            .unwrap()
    }

    #[test]
    fn strips_storage_keywords() {
        assert_eq!(strip_storage("static inline const char *"), "const char *");
        assert_eq!(strip_storage("extern struct statics "), "struct statics");
        assert_eq!(
            strip_storage_and_typedef("typedef struct p {\n    int x;\n} "),
            "struct p {\n    int x;\n}"
        );
    }

    #[test]
    fn only_internal_or_exported_symbols_qualify() {
        let graph = parse("static int g(void) { return 1; }\nint h(void) { return 2; }\nint v;\n");
        let options = ExtractOptions {
            export_symbols: vec!["v".into()],
            ..ExtractOptions::default()
        };
        let externalizer = Externalizer::new(&options);
        let decl = |name: &str| graph.decl(graph.file_scope[name][0]);

        let g = externalizer.candidate(&graph, decl("g")).unwrap();
        assert_eq!(g.new_name, "klp_g");
        assert_eq!(g.use_text(), "klp_g");
        assert!(externalizer.candidate(&graph, decl("h")).is_none());
        let v = externalizer.candidate(&graph, decl("v")).unwrap();
        assert_eq!(v.use_text(), "(*klp_v)");
    }

    #[test]
    fn disabled_policy_keeps_everything() {
        let graph = parse("static int g(void) { return 1; }\n");
        let options = ExtractOptions {
            externalize: false,
            ..ExtractOptions::default()
        };
        let externalizer = Externalizer::new(&options);
        assert!(externalizer
            .candidate(&graph, graph.decl(graph.file_scope["g"][0]))
            .is_none());
    }

    #[test]
    fn builds_pointer_declaration() {
        let graph = parse("static char *g(int a) { return 0; }\n");
        let g = graph.decl(graph.file_scope["g"][0]);
        let candidate = Externalizer::new(&ExtractOptions::default())
            .candidate(&graph, g)
            .unwrap();
        let spans = g.declarator.unwrap();
        let specifiers = Span::new(g.span.file, g.span.start, spans.full.start);
        assert_eq!(
            pointer_declaration(&graph, g, specifiers, &candidate).unwrap(),
            "static char *(*klp_g)(int a);"
        );
    }
}

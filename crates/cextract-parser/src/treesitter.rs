//! Tree-sitter based front end for C
//!
//! Builds a [`ProgramGraph`] for one translation unit. Quoted headers that
//! resolve are parsed in place, so items are numbered in
//! flattened translation order. Conditional groups are transparent: every
//! branch of `#if`/`#ifdef` contributes its items.

use cextract_core::config::FrontendConfig;
use cextract_core::{
    ChainId, DeclId, DeclKind, DeclaratorSpans, Error, Field, FileId, IncludeId, IncludeNode,
    ItemId, ItemKind, MacroExpansion, MacroId, MacroKind, ProgramGraph, Result, SourcePos, Span,
    Stmt, StmtKind, StorageClass, Type, TypeId,
};
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::{debug, trace, warn};
use tree_sitter::{Node, Parser as TSParser};

use crate::preprocessor::consteval::{self, parse_int_literal};
use crate::preprocessor::headers::IncludeError;
use crate::preprocessor::lexer::{followed_by_paren, identifiers, splice_lines};
use crate::preprocessor::HeaderResolver;

/// Object-like macros nest at most this deep when folding constants
const MAX_MACRO_DEPTH: u32 = 16;

/// Tree-sitter front end
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeSitterFrontend;

impl crate::Frontend for TreeSitterFrontend {
    fn parse(
        &self,
        source: &str,
        filename: &str,
        config: &FrontendConfig,
    ) -> Result<ProgramGraph> {
        let headers = HeaderResolver::new(config.include_paths.clone());
        GraphBuilder::new(&headers)?.build(PathBuf::from(filename), source.to_string())
    }

    fn name(&self) -> &str {
        "tree-sitter"
    }

    fn is_available(&self) -> bool {
        TSParser::new()
            .set_language(&tree_sitter_c::LANGUAGE.into())
            .is_ok()
    }
}

#[derive(Debug, Default)]
struct Scope {
    ordinary: HashMap<String, DeclId>,
    tags: HashMap<String, DeclId>,
}

/// What new declarations attach to
#[derive(Debug, Clone, Copy)]
struct ItemCx {
    file: FileId,
    item: ItemId,
    /// Span given to declarations created now
    span: Span,
    /// Function whose body is being walked
    function: Option<DeclId>,
}

#[derive(Debug, Default, Clone, Copy)]
struct Specifiers {
    storage: StorageClass,
    inline: bool,
}

impl Specifiers {
    fn of(node: Node, src: &str) -> Self {
        let mut spec = Self::default();
        for child in named_children(node) {
            if child.kind() != "storage_class_specifier" {
                continue;
            }
            match text(child, src) {
                "static" => spec.storage = StorageClass::Static,
                "extern" => spec.storage = StorageClass::Extern,
                "auto" => spec.storage = StorageClass::Auto,
                "register" => spec.storage = StorageClass::Register,
                "inline" | "__inline" | "__inline__" | "__forceinline" => spec.inline = true,
                _ => {}
            }
        }
        spec
    }
}

struct Param {
    name: Option<(String, Span)>,
    ty: TypeId,
    span: Span,
}

/// Result of applying a declarator to a base type
struct Derived {
    name: Option<(String, Span)>,
    ty: TypeId,
    /// Parameters of the innermost function declarator
    params: Vec<Param>,
}

/// Builds the program graph of one translation unit
pub struct GraphBuilder<'h> {
    parser: TSParser,
    headers: &'h HeaderResolver,
    graph: ProgramGraph,
    scopes: Vec<Scope>,
    /// Currently visible `#define`s
    macros: HashMap<String, MacroId>,
    parsed_headers: HashSet<PathBuf>,
    /// Chains that already have a function definition
    defined: HashSet<ChainId>,
    cx: ItemCx,
}

impl<'h> GraphBuilder<'h> {
    pub fn new(headers: &'h HeaderResolver) -> Result<Self> {
        let mut parser = TSParser::new();
        parser
            .set_language(&tree_sitter_c::LANGUAGE.into())
            .map_err(|e| Error::Parse(format!("failed to load C grammar: {}", e)))?;
        let file = FileId(0);
        Ok(Self {
            parser,
            headers,
            graph: ProgramGraph::new(),
            scopes: vec![Scope::default()],
            macros: HashMap::new(),
            parsed_headers: HashSet::new(),
            defined: HashSet::new(),
            cx: ItemCx {
                file,
                item: ItemId(0),
                span: Span::new(file, 0, 0),
                function: None,
            },
        })
    }

    /// Parse the main file and everything it includes
    pub fn build(mut self, path: PathBuf, text: String) -> Result<ProgramGraph> {
        self.build_file(path, text, None)?;
        self.graph.finish();
        debug!(
            files = self.graph.files.len(),
            items = self.graph.items.len(),
            decls = self.graph.decls.len(),
            macros = self.graph.macros.len(),
            expansions = self.graph.expansions.len(),
            "program graph built"
        );
        Ok(self.graph)
    }

    fn build_file(
        &mut self,
        path: PathBuf,
        text: String,
        included_by: Option<IncludeId>,
    ) -> Result<FileId> {
        let tree = self
            .parser
            .parse(&text, None)
            .ok_or_else(|| Error::Parse(format!("failed to parse {}", path.display())))?;
        let root = tree.root_node();
        if root.has_error() {
            warn!("{} has syntax errors; affected items are skipped", path.display());
        }
        debug!("Parsing {}", path.display());
        let file = self.graph.add_file(path, text.clone(), included_by);
        self.build_items(file, &named_children(root), &text)?;
        Ok(file)
    }

    fn build_items(&mut self, file: FileId, nodes: &[Node], src: &str) -> Result<()> {
        for &node in nodes {
            match node.kind() {
                "comment" => {}
                "preproc_if"
                | "preproc_ifdef"
                | "preproc_else"
                | "preproc_elif"
                | "preproc_elifdef" => {
                    self.build_items(file, &conditional_children(node), src)?;
                }
                _ => self.build_item(file, node, src)?,
            }
        }
        Ok(())
    }

    fn build_item(&mut self, file: FileId, node: Node, src: &str) -> Result<()> {
        let span = item_span(file, node);
        let item = self.graph.add_item(file, span, ItemKind::Other);
        self.cx = ItemCx {
            file,
            item,
            span,
            function: None,
        };

        let kind = match node.kind() {
            "preproc_include" => {
                let saved = self.cx;
                let include = self.include(node, src)?;
                self.cx = saved;
                ItemKind::Include(include)
            }
            "preproc_def" | "preproc_function_def" => ItemKind::Macro(self.define(node, src)),
            "preproc_call" => match self.undef(node, src) {
                Some(m) => ItemKind::Macro(m),
                None => ItemKind::Other,
            },
            kind => {
                self.scan_expansions(span, src);
                let first = self.graph.decls.len();
                match kind {
                    "function_definition" => self.function_definition(node, src),
                    "declaration" => self.declaration(node, src),
                    "type_definition" => self.type_definition(node, src),
                    "struct_specifier" | "union_specifier" | "enum_specifier" => {
                        self.type_specifier(node, src, true);
                    }
                    "ERROR" => {
                        let (line, _) = self.graph.file(file).line_col(span.start);
                        warn!(
                            "skipping unparsable text at {}:{}",
                            self.graph.file(file).path.display(),
                            line
                        );
                    }
                    other => trace!("top-level {} kept as opaque item", other),
                }
                let decls: Vec<DeclId> = (first..self.graph.decls.len())
                    .map(|i| DeclId(i as u32))
                    .filter(|&d| self.graph.decl(d).is_file_scope())
                    .collect();
                if decls.is_empty() {
                    ItemKind::Other
                } else {
                    ItemKind::Decls(decls)
                }
            }
        };
        self.graph.items[item.index()].kind = kind;
        Ok(())
    }

    // ---- preprocessor items -------------------------------------------------

    fn include(&mut self, node: Node, src: &str) -> Result<IncludeId> {
        let raw = node
            .child_by_field_name("path")
            .map(|p| text(p, src))
            .unwrap_or("")
            .trim();
        let (spelled, system) = match raw.strip_prefix('<') {
            Some(rest) => (rest.trim_end_matches('>'), true),
            None => (raw.trim_matches('"'), false),
        };
        let including = self.graph.file(self.cx.file);
        let parent = including.included_by;
        let from = including.path.clone();

        let (resolved, text) = if system {
            trace!("<{}> left to the compiler", spelled);
            (None, None)
        } else {
            match self.headers.read(spelled, Some(&from)) {
                Ok((path, text)) => (Some(path), Some(text)),
                Err(IncludeError::NotFound(header)) => {
                    debug!("{} stays an include directive", header);
                    (None, None)
                }
                Err(e) => {
                    warn!("{}", e);
                    (None, None)
                }
            }
        };

        let id = self.graph.add_include(IncludeNode {
            id: IncludeId(0),
            spelled: spelled.to_string(),
            system,
            resolved: resolved.clone(),
            file: None,
            parent,
            item: self.cx.item,
        });

        if let (Some(path), Some(text)) = (resolved, text) {
            let key = path.canonicalize().unwrap_or_else(|_| path.clone());
            if self.parsed_headers.insert(key) {
                let file = self.build_file(path, text, Some(id))?;
                self.graph.includes[id.index()].file = Some(file);
            } else {
                debug!("{} already parsed", path.display());
            }
        }
        Ok(id)
    }

    fn define(&mut self, node: Node, src: &str) -> MacroId {
        let name = node
            .child_by_field_name("name")
            .map(|n| text(n, src).to_string())
            .unwrap_or_default();
        let params: Option<Vec<String>> = node.child_by_field_name("parameters").map(|p| {
            all_children(p)
                .into_iter()
                .map(|c| text(c, src))
                .filter(|t| *t == "..." || t.chars().all(|c| c == '_' || c.is_ascii_alphanumeric()))
                .map(str::to_string)
                .collect()
        });
        let body = node
            .child_by_field_name("value")
            .map(|v| splice_lines(text(v, src)).trim().to_string())
            .unwrap_or_default();

        let mut body_identifiers: Vec<String> = Vec::new();
        for (_, ident) in identifiers(&body) {
            let is_param = params.as_ref().is_some_and(|ps| ps.iter().any(|p| p == ident));
            if !is_param && ident != name && !body_identifiers.iter().any(|b| b == ident) {
                body_identifiers.push(ident.to_string());
            }
        }

        let span = item_span(self.cx.file, node);
        let id = self.graph.add_macro(
            name.clone(),
            MacroKind::Define {
                params,
                body,
                body_identifiers,
            },
            span,
            SourcePos::new(self.cx.item.0, span.start),
            self.cx.item,
        );
        trace!("#define {}", name);
        self.macros.insert(name, id);
        id
    }

    fn undef(&mut self, node: Node, src: &str) -> Option<MacroId> {
        let directive: String = node
            .child_by_field_name("directive")
            .map(|d| text(d, src))?
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect();
        if directive != "#undef" {
            return None;
        }
        let name = node
            .child_by_field_name("argument")
            .map(|a| text(a, src).trim().to_string())?;
        let span = item_span(self.cx.file, node);
        let id = self.graph.add_macro(
            name.clone(),
            MacroKind::Undef,
            span,
            SourcePos::new(self.cx.item.0, span.start),
            self.cx.item,
        );
        self.macros.remove(&name);
        Some(id)
    }

    /// Record every use of a visible macro inside a non-directive item
    fn scan_expansions(&mut self, span: Span, src: &str) {
        let text = src.get(span.start as usize..span.end as usize).unwrap_or("");
        for (off, ident) in identifiers(text) {
            let Some(&m) = self.macros.get(ident) else {
                continue;
            };
            if self.graph.macro_directive(m).is_function_like()
                && !followed_by_paren(text, off + ident.len())
            {
                continue;
            }
            let start = span.start + off as u32;
            self.graph.expansions.push(MacroExpansion {
                name: ident.to_string(),
                pos: SourcePos::new(self.cx.item.0, start),
                span: Span::new(self.cx.file, start, start + ident.len() as u32),
            });
        }
    }

    // ---- declarations -------------------------------------------------------

    fn function_definition(&mut self, node: Node, src: &str) {
        let spec = Specifiers::of(node, src);
        let base = self.base_type(node, src, false);
        let Some(declarator) = node.child_by_field_name("declarator") else {
            return;
        };
        let derived = self.derive(declarator, base, src);
        let Some((name, name_span)) = derived.name else {
            warn!("function definition without a name at byte {}", node.start_byte());
            return;
        };

        let prev = self.scopes[0].ordinary.get(&name).copied().filter(|&p| {
            let decl = self.graph.decl(p);
            decl.is_function() && !self.defined.contains(&decl.chain)
        });
        if prev.is_none() && self.scopes[0].ordinary.contains_key(&name) {
            debug!("definition of {} starts a new redeclaration chain", name);
        }
        let id = self.new_decl(
            Some(name.clone()),
            DeclKind::Function {
                ty: derived.ty,
                body: None,
                is_inline: spec.inline,
            },
            spec.storage,
            name_span.start,
            prev,
        );
        let decl_span = self.span(declarator);
        self.graph.decl_mut(id).declarator = Some(DeclaratorSpans {
            full: decl_span,
            bare: decl_span,
            name: name_span,
        });
        self.defined.insert(self.graph.decl(id).chain);
        self.bind_ordinary(name, id);

        self.cx.function = Some(id);
        self.scopes.push(Scope::default());
        for param in derived.params {
            let Some((pname, pspan)) = param.name else {
                continue;
            };
            let pid = self.graph.add_decl(
                Some(pname.clone()),
                DeclKind::Variable {
                    ty: param.ty,
                    init: None,
                },
                StorageClass::None,
                param.span,
                SourcePos::new(self.cx.item.0, pspan.start),
                Some(id),
                self.cx.item,
                None,
            );
            self.bind_ordinary(pname, pid);
        }
        let body = node
            .child_by_field_name("body")
            .and_then(|b| self.stmt(b, src));
        self.scopes.pop();
        self.cx.function = None;

        if let DeclKind::Function { body: slot, .. } = &mut self.graph.decl_mut(id).kind {
            *slot = body;
        }
    }

    fn declaration(&mut self, node: Node, src: &str) {
        let spec = Specifiers::of(node, src);
        let declarators = field_children(node, "declarator");
        let base = self.base_type(node, src, declarators.is_empty());

        for d in declarators {
            let (bare, init) = if d.kind() == "init_declarator" {
                (d.child_by_field_name("declarator"), d.child_by_field_name("value"))
            } else {
                (Some(d), None)
            };
            let Some(bare) = bare else {
                continue;
            };
            let derived = self.derive(bare, base, src);
            let Some((name, name_span)) = derived.name else {
                continue;
            };
            let is_function = matches!(self.graph.ty(derived.ty), Type::Function { .. });
            let kind = if is_function {
                DeclKind::Function {
                    ty: derived.ty,
                    body: None,
                    is_inline: spec.inline,
                }
            } else {
                DeclKind::Variable {
                    ty: derived.ty,
                    init: None,
                }
            };
            let prev = self.redeclaration_of(&name, is_function, spec.storage);
            let id = self.new_decl(Some(name.clone()), kind, spec.storage, name_span.start, prev);
            self.graph.decl_mut(id).declarator = Some(DeclaratorSpans {
                full: self.span(d),
                bare: self.span(bare),
                name: name_span,
            });
            self.bind_ordinary(name, id);

            if let Some(value) = init {
                let stmt = self.stmt(value, src);
                if let DeclKind::Variable { init: slot, .. } = &mut self.graph.decl_mut(id).kind {
                    *slot = stmt;
                }
            }
        }
    }

    fn type_definition(&mut self, node: Node, src: &str) {
        let base = self.base_type(node, src, false);
        for d in field_children(node, "declarator") {
            let derived = self.derive(d, base, src);
            let Some((name, name_span)) = derived.name else {
                continue;
            };
            let prev = self
                .scopes
                .last()
                .and_then(|s| s.ordinary.get(&name))
                .copied()
                .filter(|&p| matches!(self.graph.decl(p).kind, DeclKind::Typedef { .. }));
            let id = self.new_decl(
                Some(name.clone()),
                DeclKind::Typedef {
                    underlying: derived.ty,
                },
                StorageClass::None,
                name_span.start,
                prev,
            );
            let span = self.span(d);
            self.graph.decl_mut(id).declarator = Some(DeclaratorSpans {
                full: span,
                bare: span,
                name: name_span,
            });
            self.bind_ordinary(name, id);
        }
    }

    /// Earlier declaration a new function or variable redeclares
    fn redeclaration_of(
        &self,
        name: &str,
        is_function: bool,
        storage: StorageClass,
    ) -> Option<DeclId> {
        let at_file_scope = self.cx.function.is_none();
        if !at_file_scope && !is_function && storage != StorageClass::Extern {
            return None;
        }
        let prev = *self.scopes[0].ordinary.get(name)?;
        let decl = self.graph.decl(prev);
        let same_kind = if is_function {
            decl.is_function()
        } else {
            decl.is_variable()
        };
        same_kind.then_some(prev)
    }

    fn new_decl(
        &mut self,
        name: Option<String>,
        kind: DeclKind,
        storage: StorageClass,
        offset: u32,
        prev: Option<DeclId>,
    ) -> DeclId {
        let ItemCx {
            item,
            span,
            function,
            ..
        } = self.cx;
        self.graph.add_decl(
            name,
            kind,
            storage,
            span,
            SourcePos::new(item.0, offset),
            function,
            item,
            prev,
        )
    }

    fn bind_ordinary(&mut self, name: String, id: DeclId) {
        if let Some(scope) = self.scopes.last_mut() {
            scope.ordinary.insert(name, id);
        }
    }

    fn lookup_ordinary(&self, name: &str) -> Option<DeclId> {
        self.scopes.iter().rev().find_map(|s| s.ordinary.get(name)).copied()
    }

    fn lookup_tag(&self, name: &str) -> Option<DeclId> {
        self.scopes.iter().rev().find_map(|s| s.tags.get(name)).copied()
    }

    // ---- types --------------------------------------------------------------

    fn base_type(&mut self, node: Node, src: &str, standalone: bool) -> TypeId {
        match node.child_by_field_name("type") {
            Some(t) => self.type_specifier(t, src, standalone),
            None => self.graph.add_type(Type::Builtin("int".into())),
        }
    }

    /// `standalone` is set for `struct S;`, which declares rather than references
    fn type_specifier(&mut self, node: Node, src: &str, standalone: bool) -> TypeId {
        let ty = match node.kind() {
            "primitive_type" | "sized_type_specifier" => {
                Type::Builtin(text(node, src).split_whitespace().collect::<Vec<_>>().join(" "))
            }
            "type_identifier" => {
                let name = text(node, src);
                match self.lookup_ordinary(name) {
                    Some(d) if matches!(self.graph.decl(d).kind, DeclKind::Typedef { .. }) => {
                        Type::Typedef(d)
                    }
                    _ => Type::Unresolved(name.to_string()),
                }
            }
            "struct_specifier" => Type::Record(self.record(node, src, false, standalone)),
            "union_specifier" => Type::Record(self.record(node, src, true, standalone)),
            "enum_specifier" => Type::Enum(self.enumeration(node, src, standalone)),
            "macro_type_specifier" => Type::Unresolved(text(node, src).to_string()),
            _ => Type::Builtin(text(node, src).to_string()),
        };
        self.graph.add_type(ty)
    }

    fn record(&mut self, node: Node, src: &str, is_union: bool, standalone: bool) -> DeclId {
        let name = node
            .child_by_field_name("name")
            .map(|n| text(n, src).to_string());
        let Some(body) = node.child_by_field_name("body") else {
            let kind = DeclKind::Record {
                is_union,
                fields: Vec::new(),
                complete: false,
            };
            return self.tag_reference(name.unwrap_or_default(), node, kind, standalone);
        };

        let prev = self.incomplete_tag_in_scope(name.as_deref());
        let id = self.new_decl(
            name.clone(),
            DeclKind::Record {
                is_union,
                fields: Vec::new(),
                complete: true,
            },
            StorageClass::None,
            node.start_byte() as u32,
            prev,
        );
        if let Some(name) = name {
            if let Some(scope) = self.scopes.last_mut() {
                scope.tags.insert(name, id);
            }
        }

        let fields = self.fields(body, src);
        if let DeclKind::Record { fields: slot, .. } = &mut self.graph.decl_mut(id).kind {
            *slot = fields;
        }
        id
    }

    fn fields(&mut self, body: Node, src: &str) -> Vec<Field> {
        let mut fields = Vec::new();
        for fd in flatten_conditionals(named_children(body)) {
            if fd.kind() != "field_declaration" {
                continue;
            }
            let span = self.span(fd);
            let base = self.base_type(fd, src, false);
            let declarators = field_children(fd, "declarator");
            if declarators.is_empty() {
                fields.push(Field {
                    name: None,
                    ty: base,
                    span,
                });
            }
            for d in declarators {
                let derived = self.derive(d, base, src);
                fields.push(Field {
                    name: derived.name.map(|(n, _)| n),
                    ty: derived.ty,
                    span,
                });
            }
        }
        fields
    }

    fn enumeration(&mut self, node: Node, src: &str, standalone: bool) -> DeclId {
        let name = node
            .child_by_field_name("name")
            .map(|n| text(n, src).to_string());
        let Some(body) = node.child_by_field_name("body") else {
            let kind = DeclKind::Enum {
                constants: Vec::new(),
                complete: false,
            };
            return self.tag_reference(name.unwrap_or_default(), node, kind, standalone);
        };

        let prev = self.incomplete_tag_in_scope(name.as_deref());
        let id = self.new_decl(
            name.clone(),
            DeclKind::Enum {
                constants: Vec::new(),
                complete: true,
            },
            StorageClass::None,
            node.start_byte() as u32,
            prev,
        );
        if let Some(name) = name {
            if let Some(scope) = self.scopes.last_mut() {
                scope.tags.insert(name, id);
            }
        }

        let mut constants = Vec::new();
        let mut next: i64 = 0;
        for e in flatten_conditionals(named_children(body)) {
            if e.kind() != "enumerator" {
                continue;
            }
            let Some(name_node) = e.child_by_field_name("name") else {
                continue;
            };
            let cname = text(name_node, src).to_string();
            let value_node = e.child_by_field_name("value");
            let value = match value_node {
                Some(v) => self.fold(text(v, src)).unwrap_or_else(|| {
                    debug!("cannot fold value of {}; using {}", cname, next);
                    next
                }),
                None => next,
            };
            let init = value_node.and_then(|v| self.stmt(v, src));
            let c = self.new_decl(
                Some(cname.clone()),
                DeclKind::EnumConstant {
                    value,
                    owner: id,
                    init,
                },
                StorageClass::None,
                name_node.start_byte() as u32,
                None,
            );
            self.bind_ordinary(cname, c);
            constants.push(c);
            next = value.wrapping_add(1);
        }
        if let DeclKind::Enum { constants: slot, .. } = &mut self.graph.decl_mut(id).kind {
            *slot = constants;
        }
        id
    }

    /// Forward declaration or definition-less tag use
    fn tag_reference(
        &mut self,
        name: String,
        node: Node,
        kind: DeclKind,
        standalone: bool,
    ) -> DeclId {
        if !standalone {
            if let Some(d) = self.lookup_tag(&name) {
                return d;
            }
            // First mention of an undeclared tag binds it at file scope
            let ItemCx { item, span, .. } = self.cx;
            let id = self.graph.add_decl(
                Some(name.clone()),
                kind,
                StorageClass::None,
                span,
                SourcePos::new(item.0, node.start_byte() as u32),
                None,
                item,
                None,
            );
            self.scopes[0].tags.insert(name, id);
            return id;
        }
        let prev = self.scopes.last().and_then(|s| s.tags.get(&name)).copied();
        let id = self.new_decl(
            Some(name.clone()),
            kind,
            StorageClass::None,
            node.start_byte() as u32,
            prev,
        );
        if let Some(scope) = self.scopes.last_mut() {
            scope.tags.insert(name, id);
        }
        id
    }

    fn incomplete_tag_in_scope(&self, name: Option<&str>) -> Option<DeclId> {
        let prev = *self.scopes.last()?.tags.get(name?)?;
        let incomplete = matches!(
            self.graph.decl(prev).kind,
            DeclKind::Record { complete: false, .. } | DeclKind::Enum { complete: false, .. }
        );
        incomplete.then_some(prev)
    }

    /// Apply a (possibly abstract) declarator to `base`, inside out
    fn derive(&mut self, node: Node, base: TypeId, src: &str) -> Derived {
        let mut ty = base;
        let mut params = Vec::new();
        let mut name = None;
        let mut cur = Some(node);
        while let Some(n) = cur {
            cur = match n.kind() {
                "identifier" | "field_identifier" | "type_identifier" => {
                    name = Some((text(n, src).to_string(), self.span(n)));
                    None
                }
                "pointer_declarator" | "abstract_pointer_declarator" => {
                    ty = self.graph.add_type(Type::Pointer(ty));
                    n.child_by_field_name("declarator")
                }
                "array_declarator" | "abstract_array_declarator" => {
                    let size = n
                        .child_by_field_name("size")
                        .and_then(|s| self.fold(text(s, src)));
                    ty = self.graph.add_type(Type::Array { element: ty, size });
                    n.child_by_field_name("declarator")
                }
                "function_declarator" | "abstract_function_declarator" => {
                    let (ps, variadic) = match n.child_by_field_name("parameters") {
                        Some(list) => self.parameters(list, src),
                        None => (Vec::new(), false),
                    };
                    ty = self.graph.add_type(Type::Function {
                        ret: ty,
                        params: ps.iter().map(|p| p.ty).collect(),
                        variadic,
                    });
                    params = ps;
                    n.child_by_field_name("declarator")
                }
                "init_declarator" => n.child_by_field_name("declarator"),
                "parenthesized_declarator"
                | "abstract_parenthesized_declarator"
                | "attributed_declarator" => named_children(n)
                    .into_iter()
                    .find(|c| !c.kind().starts_with("attribute")),
                _ => None,
            };
        }
        Derived { name, ty, params }
    }

    fn parameters(&mut self, list: Node, src: &str) -> (Vec<Param>, bool) {
        let mut params = Vec::new();
        let mut variadic = false;
        for p in named_children(list) {
            match p.kind() {
                "parameter_declaration" => {
                    let span = self.span(p);
                    let base = self.base_type(p, src, false);
                    let param = match p.child_by_field_name("declarator") {
                        Some(d) => {
                            let derived = self.derive(d, base, src);
                            Param {
                                name: derived.name,
                                ty: derived.ty,
                                span,
                            }
                        }
                        None => Param {
                            name: None,
                            ty: base,
                            span,
                        },
                    };
                    params.push(param);
                }
                "variadic_parameter" => variadic = true,
                _ => {}
            }
        }
        // `(void)` declares no parameters
        let void_only = matches!(
            params.as_slice(),
            [only] if only.name.is_none()
                && matches!(self.graph.ty(only.ty), Type::Builtin(b) if b == "void")
        );
        if void_only {
            params.clear();
        }
        (params, variadic)
    }

    fn type_descriptor(&mut self, node: Node, src: &str) -> TypeId {
        let base = self.base_type(node, src, false);
        match node.child_by_field_name("declarator") {
            Some(d) => self.derive(d, base, src).ty,
            None => base,
        }
    }

    // ---- constant folding ---------------------------------------------------

    fn fold(&self, expr: &str) -> Option<i64> {
        consteval::eval(expr, &mut |name| self.constant_value(name, 0))
    }

    fn constant_value(&self, name: &str, depth: u32) -> Option<i64> {
        if depth > MAX_MACRO_DEPTH {
            return None;
        }
        if let Some(&m) = self.macros.get(name) {
            return match &self.graph.macro_directive(m).kind {
                MacroKind::Define {
                    params: None, body, ..
                } => consteval::eval(body, &mut |n| self.constant_value(n, depth + 1)),
                _ => None,
            };
        }
        match &self.graph.decl(self.lookup_ordinary(name)?).kind {
            DeclKind::EnumConstant { value, .. } => Some(*value),
            _ => None,
        }
    }

    // ---- function bodies ----------------------------------------------------

    fn stmts(&mut self, nodes: Vec<Node>, src: &str) -> Vec<Stmt> {
        nodes.into_iter().filter_map(|n| self.stmt(n, src)).collect()
    }

    fn stmt(&mut self, node: Node, src: &str) -> Option<Stmt> {
        let span = self.span(node);
        match node.kind() {
            "comment" | "string_literal" | "concatenated_string" | "char_literal"
            | "field_identifier" | "statement_identifier" | "primitive_type" | "preproc_def"
            | "preproc_function_def" | "preproc_call" | "preproc_include" => None,
            "compound_statement" | "for_statement" => {
                self.scopes.push(Scope::default());
                let children = self.stmts(named_children(node), src);
                self.scopes.pop();
                Some(Stmt {
                    kind: StmtKind::Block,
                    span,
                    children,
                })
            }
            "declaration" | "type_definition" | "struct_specifier" | "union_specifier"
            | "enum_specifier" => Some(self.local_declaration(node, src)),
            "identifier" => self.identifier(node, src),
            "call_expression" => Some(self.call(node, src)),
            "field_expression" => {
                let argument = node
                    .child_by_field_name("argument")
                    .and_then(|a| self.stmt(a, src))?;
                Some(Stmt {
                    kind: StmtKind::Other,
                    span,
                    children: vec![argument],
                })
            }
            "type_descriptor" => Some(Stmt::leaf(
                StmtKind::TypeRef(self.type_descriptor(node, src)),
                span,
            )),
            "number_literal" => {
                let kind = parse_int_literal(text(node, src))
                    .map_or(StmtKind::Other, StmtKind::IntLiteral);
                Some(Stmt::leaf(kind, span))
            }
            "preproc_if"
            | "preproc_ifdef"
            | "preproc_else"
            | "preproc_elif"
            | "preproc_elifdef" => {
                let children = self.stmts(conditional_children(node), src);
                Some(Stmt {
                    kind: StmtKind::Block,
                    span,
                    children,
                })
            }
            _ => {
                let children = self.stmts(named_children(node), src);
                (!children.is_empty()).then_some(Stmt {
                    kind: StmtKind::Other,
                    span,
                    children,
                })
            }
        }
    }

    fn local_declaration(&mut self, node: Node, src: &str) -> Stmt {
        let span = self.span(node);
        let saved = self.cx;
        self.cx.span = span;
        let first = self.graph.decls.len();
        match node.kind() {
            "declaration" => self.declaration(node, src),
            "type_definition" => self.type_definition(node, src),
            _ => {
                self.type_specifier(node, src, true);
            }
        }
        self.cx = saved;
        let function = self.cx.function;
        let children = (first..self.graph.decls.len())
            .map(|i| DeclId(i as u32))
            .filter(|&d| self.graph.decl(d).context == function)
            .map(|d| Stmt::leaf(StmtKind::LocalDecl(d), span))
            .collect();
        Stmt {
            kind: StmtKind::Block,
            span,
            children,
        }
    }

    fn identifier(&mut self, node: Node, src: &str) -> Option<Stmt> {
        let name = text(node, src);
        let span = self.span(node);
        if let Some(&m) = self.macros.get(name) {
            if !self.graph.macro_directive(m).is_function_like() {
                return Some(self.expansion(m, span, &mut HashSet::new()));
            }
        }
        match self.lookup_ordinary(name) {
            Some(decl) => Some(Stmt::leaf(StmtKind::DeclRef { decl, spelled: true }, span)),
            None => {
                trace!("unresolved identifier {}", name);
                None
            }
        }
    }

    fn call(&mut self, node: Node, src: &str) -> Stmt {
        let span = self.span(node);
        let mut children = Vec::new();
        if let Some(function) = node.child_by_field_name("function") {
            let macro_call = (function.kind() == "identifier")
                .then(|| self.macros.get(text(function, src)).copied())
                .flatten()
                .filter(|&m| self.graph.macro_directive(m).is_function_like());
            match macro_call {
                Some(m) => {
                    children.push(self.expansion(m, self.span(function), &mut HashSet::new()))
                }
                None => children.extend(self.stmt(function, src)),
            }
        }
        if let Some(args) = node.child_by_field_name("arguments") {
            children.extend(self.stmts(named_children(args), src));
        }
        Stmt {
            kind: StmtKind::Call,
            span,
            children,
        }
    }

    /// What a macro use refers to once expanded, through nested macros
    fn expansion(&self, m: MacroId, span: Span, active: &mut HashSet<MacroId>) -> Stmt {
        let directive = self.graph.macro_directive(m);
        active.insert(m);
        let mut children = Vec::new();
        for ident in directive.body_identifiers() {
            if let Some(&inner) = self.macros.get(ident.as_str()) {
                if !active.contains(&inner) {
                    children.push(self.expansion(inner, span, active));
                    continue;
                }
            }
            if let Some(decl) = self.lookup_ordinary(ident) {
                children.push(Stmt::leaf(StmtKind::DeclRef { decl, spelled: false }, span));
            }
        }
        active.remove(&m);
        Stmt {
            kind: StmtKind::Expansion(directive.name.clone()),
            span,
            children,
        }
    }

    fn span(&self, node: Node) -> Span {
        Span::new(self.cx.file, node.start_byte() as u32, node.end_byte() as u32)
    }
}

fn text<'s>(node: Node, src: &'s str) -> &'s str {
    node.utf8_text(src.as_bytes()).unwrap_or("")
}

fn named_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.named_children(&mut cursor).collect()
}

fn all_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children(&mut cursor).collect()
}

fn field_children<'t>(node: Node<'t>, field: &str) -> Vec<Node<'t>> {
    let mut cursor = node.walk();
    node.children_by_field_name(field, &mut cursor).collect()
}

/// Items of a conditional group, without its condition
fn conditional_children<'t>(node: Node<'t>) -> Vec<Node<'t>> {
    let skip = [
        node.child_by_field_name("condition"),
        node.child_by_field_name("name"),
    ];
    named_children(node)
        .into_iter()
        .filter(|c| !skip.contains(&Some(*c)))
        .collect()
}

fn flatten_conditionals<'t>(nodes: Vec<Node<'t>>) -> Vec<Node<'t>> {
    let mut out = Vec::with_capacity(nodes.len());
    for node in nodes {
        if node.kind().starts_with("preproc_if")
            || node.kind() == "preproc_else"
            || node.kind().starts_with("preproc_elif")
        {
            out.extend(flatten_conditionals(conditional_children(node)));
        } else {
            out.push(node);
        }
    }
    out
}

/// Top-level tag declarations own the `;` that follows them
fn item_span(file: FileId, node: Node) -> Span {
    let mut end = node.end_byte();
    if matches!(node.kind(), "struct_specifier" | "union_specifier" | "enum_specifier") {
        if let Some(next) = node.next_sibling().filter(|n| n.kind() == ";") {
            end = next.end_byte();
        }
    }
    Span::new(file, node.start_byte() as u32, end as u32)
}


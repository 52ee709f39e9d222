//! Program graph
//!
//! Arena representation of one parsed translation unit. Every node is
//! addressed by a small integer handle, so dependency sets can key on the
//! handle instead of on references. Handles are allocated in flattened
//! translation order, which makes `DeclId` order equal to source order.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;

use crate::location::{FileId, Location, SourcePos, Span};

macro_rules! handle {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
        )]
        pub struct $name(pub u32);

        impl $name {
            pub fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

handle!(
    /// Declaration handle
    DeclId
);
handle!(
    /// Type handle
    TypeId
);
handle!(
    /// Macro directive handle
    MacroId
);
handle!(
    /// Top-level item handle (its value is the item's sequence number)
    ItemId
);
handle!(
    /// `#include` directive handle
    IncludeId
);
handle!(
    /// Redeclaration chain handle
    ChainId
);

/// A parsed file and its line table
#[derive(Debug, Clone)]
pub struct SourceFile {
    pub id: FileId,
    pub path: PathBuf,
    pub text: String,
    /// Include directive that brought this file in (`None` for the main file)
    pub included_by: Option<IncludeId>,
    line_starts: Vec<u32>,
}

impl SourceFile {
    pub fn new(id: FileId, path: PathBuf, text: String, included_by: Option<IncludeId>) -> Self {
        let mut line_starts = vec![0];
        line_starts.extend(
            text.bytes()
                .enumerate()
                .filter(|(_, b)| *b == b'\n')
                .map(|(i, _)| i as u32 + 1),
        );
        Self {
            id,
            path,
            text,
            included_by,
            line_starts,
        }
    }

    /// 1-based line and 0-based column of a byte offset
    pub fn line_col(&self, offset: u32) -> (u32, u32) {
        let line = self.line_starts.partition_point(|&s| s <= offset).max(1);
        let column = offset - self.line_starts[line - 1];
        (line as u32, column)
    }

    pub fn slice(&self, start: u32, end: u32) -> &str {
        self.text.get(start as usize..end as usize).unwrap_or("")
    }
}

/// Storage class written on a declaration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum StorageClass {
    #[default]
    None,
    Static,
    Extern,
    Auto,
    Register,
}

/// Spans of one declarator inside a declaration statement
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeclaratorSpans {
    /// Declarator including its initializer
    pub full: Span,
    /// Declarator without the initializer
    pub bare: Span,
    /// The declared identifier
    pub name: Span,
}

/// Struct or union member
#[derive(Debug, Clone)]
pub struct Field {
    pub name: Option<String>,
    pub ty: TypeId,
    pub span: Span,
}

#[derive(Debug, Clone)]
pub enum DeclKind {
    Function {
        ty: TypeId,
        body: Option<Stmt>,
        is_inline: bool,
    },
    Variable {
        ty: TypeId,
        init: Option<Stmt>,
    },
    Record {
        is_union: bool,
        fields: Vec<Field>,
        complete: bool,
    },
    Enum {
        constants: Vec<DeclId>,
        complete: bool,
    },
    EnumConstant {
        value: i64,
        owner: DeclId,
        init: Option<Stmt>,
    },
    Typedef {
        underlying: TypeId,
    },
}

/// A declaration node
#[derive(Debug, Clone)]
pub struct Decl {
    pub id: DeclId,
    pub name: Option<String>,
    pub kind: DeclKind,
    pub storage: StorageClass,
    pub span: Span,
    pub pos: SourcePos,
    pub declarator: Option<DeclaratorSpans>,
    /// Enclosing function for block-scope declarations
    pub context: Option<DeclId>,
    pub item: ItemId,
    pub chain: ChainId,
}

impl Decl {
    pub fn is_function(&self) -> bool {
        matches!(self.kind, DeclKind::Function { .. })
    }

    pub fn is_variable(&self) -> bool {
        matches!(self.kind, DeclKind::Variable { .. })
    }

    pub fn is_file_scope(&self) -> bool {
        self.context.is_none()
    }

    /// Function body or variable/enumerator initializer
    pub fn body(&self) -> Option<&Stmt> {
        match &self.kind {
            DeclKind::Function { body, .. } => body.as_ref(),
            DeclKind::Variable { init, .. } => init.as_ref(),
            DeclKind::EnumConstant { init, .. } => init.as_ref(),
            _ => None,
        }
    }

    pub fn has_body(&self) -> bool {
        matches!(&self.kind, DeclKind::Function { body: Some(_), .. })
    }

    pub fn kind_name(&self) -> &'static str {
        match self.kind {
            DeclKind::Function { .. } => "function",
            DeclKind::Variable { .. } => "variable",
            DeclKind::Record { is_union: true, .. } => "union",
            DeclKind::Record { .. } => "struct",
            DeclKind::Enum { .. } => "enum",
            DeclKind::EnumConstant { .. } => "enum constant",
            DeclKind::Typedef { .. } => "typedef",
        }
    }
}

/// Type descriptor. Qualifiers are not modelled.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Builtin(String),
    Pointer(TypeId),
    /// Only the folded size survives, as in a real front end.
    Array {
        element: TypeId,
        size: Option<i64>,
    },
    Function {
        ret: TypeId,
        params: Vec<TypeId>,
        variadic: bool,
    },
    Record(DeclId),
    Enum(DeclId),
    Typedef(DeclId),
    /// Named type with no declaration in this translation unit
    Unresolved(String),
}

/// Statement / expression tree node with resolved symbol references
#[derive(Debug, Clone)]
pub struct Stmt {
    pub kind: StmtKind,
    pub span: Span,
    pub children: Vec<Stmt>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    Block,
    /// `spelled` is false when the reference comes out of a macro expansion
    /// and has no token of its own in the source text.
    DeclRef {
        decl: DeclId,
        spelled: bool,
    },
    LocalDecl(DeclId),
    TypeRef(TypeId),
    IntLiteral(i64),
    Call,
    /// Use of a macro; children hold what its expansion references
    Expansion(String),
    Other,
}

impl Stmt {
    pub fn leaf(kind: StmtKind, span: Span) -> Self {
        Self {
            kind,
            span,
            children: Vec::new(),
        }
    }

    /// Pre-order traversal without recursion
    pub fn visit(&self, mut f: impl FnMut(&Stmt)) {
        let mut stack = vec![self];
        while let Some(node) = stack.pop() {
            f(node);
            stack.extend(node.children.iter().rev());
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum MacroKind {
    Define {
        /// `None` for object-like macros
        params: Option<Vec<String>>,
        body: String,
        /// Identifiers of the replacement list, parameters excluded
        body_identifiers: Vec<String>,
    },
    Undef,
}

/// One `#define` or `#undef` directive
#[derive(Debug, Clone)]
pub struct MacroDirective {
    pub id: MacroId,
    pub name: String,
    pub kind: MacroKind,
    pub span: Span,
    pub pos: SourcePos,
    pub item: ItemId,
}

impl MacroDirective {
    pub fn is_define(&self) -> bool {
        matches!(self.kind, MacroKind::Define { .. })
    }

    pub fn is_function_like(&self) -> bool {
        matches!(self.kind, MacroKind::Define { params: Some(_), .. })
    }

    pub fn body_identifiers(&self) -> &[String] {
        match &self.kind {
            MacroKind::Define {
                body_identifiers, ..
            } => body_identifiers,
            MacroKind::Undef => &[],
        }
    }

    /// Same parameter list and same replacement tokens
    pub fn same_definition(&self, other: &MacroDirective) -> bool {
        match (&self.kind, &other.kind) {
            (
                MacroKind::Define { params: pa, body: ba, .. },
                MacroKind::Define { params: pb, body: bb, .. },
            ) => pa == pb && ba.split_whitespace().eq(bb.split_whitespace()),
            _ => false,
        }
    }
}

/// Use of a macro name in the source text
#[derive(Debug, Clone, PartialEq)]
pub struct MacroExpansion {
    pub name: String,
    pub pos: SourcePos,
    pub span: Span,
}

/// One `#include` directive
#[derive(Debug, Clone)]
pub struct IncludeNode {
    pub id: IncludeId,
    /// Header name as written, without delimiters
    pub spelled: String,
    /// `<...>` form
    pub system: bool,
    pub resolved: Option<PathBuf>,
    /// Parsed file, when the header was resolved and read
    pub file: Option<FileId>,
    /// Include of the file containing this directive
    pub parent: Option<IncludeId>,
    pub item: ItemId,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ItemKind {
    /// Declarations introduced by one top-level construct
    Decls(Vec<DeclId>),
    Macro(MacroId),
    Include(IncludeId),
    Other,
}

/// Top-level construct of a file
#[derive(Debug, Clone)]
pub struct Item {
    pub id: ItemId,
    pub file: FileId,
    pub span: Span,
    pub kind: ItemKind,
}

/// The parsed translation unit
#[derive(Debug, Clone, Default)]
pub struct ProgramGraph {
    pub files: Vec<SourceFile>,
    pub items: Vec<Item>,
    pub decls: Vec<Decl>,
    pub types: Vec<Type>,
    pub chains: Vec<Vec<DeclId>>,
    pub macros: Vec<MacroDirective>,
    /// Sorted by position
    pub expansions: Vec<MacroExpansion>,
    pub includes: Vec<IncludeNode>,
    /// File-scope ordinary identifiers, each in declaration order
    pub file_scope: BTreeMap<String, Vec<DeclId>>,
    type_index: HashMap<Type, TypeId>,
}

impl ProgramGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn main_file(&self) -> Option<&SourceFile> {
        self.files.first()
    }

    pub fn file(&self, id: FileId) -> &SourceFile {
        &self.files[id.0 as usize]
    }

    pub fn item(&self, id: ItemId) -> &Item {
        &self.items[id.index()]
    }

    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    pub fn decl_mut(&mut self, id: DeclId) -> &mut Decl {
        &mut self.decls[id.index()]
    }

    pub fn ty(&self, id: TypeId) -> &Type {
        &self.types[id.index()]
    }

    pub fn macro_directive(&self, id: MacroId) -> &MacroDirective {
        &self.macros[id.index()]
    }

    pub fn include(&self, id: IncludeId) -> &IncludeNode {
        &self.includes[id.index()]
    }

    /// All declarations of the logical entity `id` belongs to
    pub fn redecls(&self, id: DeclId) -> &[DeclId] {
        &self.chains[self.decl(id).chain.index()]
    }

    pub fn text(&self, span: Span) -> &str {
        self.file(span.file).slice(span.start, span.end)
    }

    pub fn location(&self, span: Span) -> Location {
        let file = self.file(span.file);
        let (line, column) = file.line_col(span.start);
        let (end_line, end_column) = file.line_col(span.end);
        Location::with_range(
            file.path.to_string_lossy(),
            line,
            column,
            end_line,
            end_column,
        )
    }

    pub fn file_of(&self, pos: SourcePos) -> FileId {
        self.items[pos.seq as usize].file
    }

    pub fn pos_location(&self, pos: SourcePos) -> Location {
        let file = self.file_of(pos);
        self.location(Span::new(file, pos.offset, pos.offset))
    }

    /// Macro expansion records whose position falls in `[start, end)`
    pub fn expansions_between(&self, start: SourcePos, end: SourcePos) -> &[MacroExpansion] {
        let lo = self.expansions.partition_point(|e| e.pos < start);
        let hi = self.expansions.partition_point(|e| e.pos < end);
        &self.expansions[lo..hi.max(lo)]
    }

    /// Expansion records inside a declaration's text
    pub fn expansions_in_decl(&self, id: DeclId) -> &[MacroExpansion] {
        let decl = self.decl(id);
        let seq = decl.item.0;
        self.expansions_between(
            SourcePos::new(seq, decl.span.start),
            SourcePos::new(seq, decl.span.end),
        )
    }

    /// Distinct function chains declared at file scope under `name`
    pub fn function_chains(&self, name: &str) -> Vec<ChainId> {
        let mut chains: Vec<ChainId> = Vec::new();
        let decls = self.file_scope.get(name).into_iter().flatten();
        for decl in decls.map(|&d| self.decl(d)) {
            if decl.is_function() && !chains.contains(&decl.chain) {
                chains.push(decl.chain);
            }
        }
        chains
    }

    /// Pick the definition of a chain, falling back to its latest member
    pub fn chain_representative(&self, chain: ChainId) -> DeclId {
        let members = &self.chains[chain.index()];
        members
            .iter()
            .copied()
            .find(|&d| {
                let decl = self.decl(d);
                decl.has_body()
                    || matches!(decl.kind, DeclKind::Record { complete: true, .. })
                    || matches!(decl.kind, DeclKind::Enum { complete: true, .. })
            })
            .or_else(|| members.last().copied())
            .expect("redeclaration chains are never empty")
    }

    // ---- construction ------------------------------------------------------

    pub fn add_file(
        &mut self,
        path: PathBuf,
        text: String,
        included_by: Option<IncludeId>,
    ) -> FileId {
        let id = FileId(self.files.len() as u32);
        self.files.push(SourceFile::new(id, path, text, included_by));
        id
    }

    pub fn add_item(&mut self, file: FileId, span: Span, kind: ItemKind) -> ItemId {
        let id = ItemId(self.items.len() as u32);
        self.items.push(Item {
            id,
            file,
            span,
            kind,
        });
        id
    }

    pub fn add_type(&mut self, ty: Type) -> TypeId {
        if let Some(&id) = self.type_index.get(&ty) {
            return id;
        }
        let id = TypeId(self.types.len() as u32);
        self.types.push(ty.clone());
        self.type_index.insert(ty, id);
        id
    }

    /// Allocate a declaration. `prev` links it into an existing chain.
    #[allow(clippy::too_many_arguments)]
    pub fn add_decl(
        &mut self,
        name: Option<String>,
        kind: DeclKind,
        storage: StorageClass,
        span: Span,
        pos: SourcePos,
        context: Option<DeclId>,
        item: ItemId,
        prev: Option<DeclId>,
    ) -> DeclId {
        let id = DeclId(self.decls.len() as u32);
        let chain = match prev {
            Some(p) => {
                let chain = self.decl(p).chain;
                self.chains[chain.index()].push(id);
                chain
            }
            None => {
                let chain = ChainId(self.chains.len() as u32);
                self.chains.push(vec![id]);
                chain
            }
        };
        if context.is_none() && !matches!(kind, DeclKind::Record { .. } | DeclKind::Enum { .. }) {
            if let Some(name) = &name {
                self.file_scope.entry(name.clone()).or_default().push(id);
            }
        }
        self.decls.push(Decl {
            id,
            name,
            kind,
            storage,
            span,
            pos,
            declarator: None,
            context,
            item,
            chain,
        });
        id
    }

    pub fn add_macro(
        &mut self,
        name: String,
        kind: MacroKind,
        span: Span,
        pos: SourcePos,
        item: ItemId,
    ) -> MacroId {
        let id = MacroId(self.macros.len() as u32);
        self.macros.push(MacroDirective {
            id,
            name,
            kind,
            span,
            pos,
            item,
        });
        id
    }

    pub fn add_include(&mut self, mut node: IncludeNode) -> IncludeId {
        let id = IncludeId(self.includes.len() as u32);
        node.id = id;
        self.includes.push(node);
        id
    }

    /// Sort the expansion records once construction is done
    pub fn finish(&mut self) {
        self.expansions.sort_by_key(|e| e.pos);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph_with_file(text: &str) -> (ProgramGraph, FileId, ItemId) {
        let mut g = ProgramGraph::new();
        let file = g.add_file(PathBuf::from("t.c"), text.to_string(), None);
        let item = g.add_item(file, Span::new(file, 0, text.len() as u32), ItemKind::Other);
        (g, file, item)
    }

    #[test]
    fn line_col_is_one_based_lines_zero_based_columns() {
        let f = SourceFile::new(FileId(0), "a.c".into(), "ab\ncd\n".into(), None);
        assert_eq!(f.line_col(0), (1, 0));
        assert_eq!(f.line_col(4), (2, 1));
    }

    #[test]
    fn redeclarations_share_a_chain() {
        let (mut g, file, item) = graph_with_file("int f(); int f() {}");
        let int = g.add_type(Type::Builtin("int".into()));
        let fty = g.add_type(Type::Function {
            ret: int,
            params: vec![],
            variadic: false,
        });
        let proto = g.add_decl(
            Some("f".into()),
            DeclKind::Function { ty: fty, body: None, is_inline: false },
            StorageClass::None,
            Span::new(file, 0, 7),
            SourcePos::new(0, 0),
            None,
            item,
            None,
        );
        let def = g.add_decl(
            Some("f".into()),
            DeclKind::Function {
                ty: fty,
                body: Some(Stmt::leaf(StmtKind::Block, Span::new(file, 17, 19))),
                is_inline: false,
            },
            StorageClass::None,
            Span::new(file, 9, 19),
            SourcePos::new(0, 9),
            None,
            item,
            Some(proto),
        );
        assert_eq!(g.redecls(proto), &[proto, def]);
        assert_eq!(g.function_chains("f").len(), 1);
        assert_eq!(g.chain_representative(g.decl(proto).chain), def);
    }

    #[test]
    fn interleaved_chains_are_counted_once() {
        let (mut g, file, item) = graph_with_file("int f() {} int f() {} int f();");
        let int = g.add_type(Type::Builtin("int".into()));
        let fty = g.add_type(Type::Function {
            ret: int,
            params: vec![],
            variadic: false,
        });
        let function = |g: &mut ProgramGraph, start: u32, end: u32, body, prev| {
            g.add_decl(
                Some("f".into()),
                DeclKind::Function { ty: fty, body, is_inline: false },
                StorageClass::None,
                Span::new(file, start, end),
                SourcePos::new(0, start),
                None,
                item,
                prev,
            )
        };
        let first = function(
            &mut g,
            0,
            10,
            Some(Stmt::leaf(StmtKind::Block, Span::new(file, 8, 10))),
            None,
        );
        let second = function(
            &mut g,
            11,
            21,
            Some(Stmt::leaf(StmtKind::Block, Span::new(file, 19, 21))),
            None,
        );
        function(&mut g, 22, 30, None, Some(first));

        let chains = g.function_chains("f");
        assert_eq!(chains, vec![g.decl(first).chain, g.decl(second).chain]);
    }

    #[test]
    fn types_are_interned() {
        let mut g = ProgramGraph::new();
        let a = g.add_type(Type::Builtin("int".into()));
        let b = g.add_type(Type::Builtin("int".into()));
        assert_eq!(a, b);
    }

    #[test]
    fn visit_is_preorder() {
        let file = FileId(0);
        let span = Span::new(file, 0, 1);
        let tree = Stmt {
            kind: StmtKind::Block,
            span,
            children: vec![
                Stmt::leaf(StmtKind::IntLiteral(1), span),
                Stmt {
                    kind: StmtKind::Call,
                    span,
                    children: vec![Stmt::leaf(StmtKind::IntLiteral(2), span)],
                },
                Stmt::leaf(StmtKind::IntLiteral(3), span),
            ],
        };
        let mut seen = Vec::new();
        tree.visit(|s| {
            if let StmtKind::IntLiteral(v) = s.kind {
                seen.push(v);
            }
        });
        assert_eq!(seen, vec![1, 2, 3]);
    }
}

//! Closure engine
//!
//! Computes every declaration and macro directive the requested functions
//! need to compile on their own. Marking runs as a worklist fixed point:
//! newly marked declarations are processed from a queue, function bodies
//! are walked in passes over a pending set ordered by declaration id (which
//! is source order), and type decomposition uses an explicit stack.

use cextract_core::{
    ChainId, DeclId, DeclKind, Error, MacroId, ProgramGraph, Result, SourcePos, StmtKind, Type,
    TypeId, UnresolvedReason,
};
use std::collections::{BTreeMap, BTreeSet, HashSet, VecDeque};
use tracing::{debug, trace};

use crate::enum_table::EnumConstantTable;
use crate::externalize::{Externalizer, RenameCandidate};
use crate::includes::IncludeOracle;
use crate::macros::MacroTracker;

/// Output of one closure computation
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Closure {
    /// Resolved closure roots, in request order
    pub roots: Vec<DeclId>,
    /// Dependency set
    pub decls: BTreeSet<DeclId>,
    /// Required macro directives
    pub macros: BTreeSet<MacroId>,
    /// Marked definitions that a later, different definition replaces
    pub needs_undef: BTreeSet<MacroId>,
    /// Symbols reached through `klp_` pointers, keyed by original name
    pub renames: BTreeMap<String, RenameCandidate>,
    /// Size of the dependency set after each worklist pass
    pub pass_sizes: Vec<usize>,
}

impl Closure {
    pub fn contains(&self, decl: DeclId) -> bool {
        self.decls.contains(&decl)
    }

    /// Rename candidate of the entity `decl` belongs to
    pub fn rename_for(&self, graph: &ProgramGraph, decl: DeclId) -> Option<&RenameCandidate> {
        let d = graph.decl(decl);
        let candidate = self.renames.get(d.name.as_deref()?)?;
        (candidate.chain == d.chain).then_some(candidate)
    }
}

/// Read-only services the engine runs against
#[derive(Clone, Copy)]
pub struct EngineContext<'a> {
    pub graph: &'a ProgramGraph,
    pub enums: &'a EnumConstantTable,
    pub macros: &'a MacroTracker,
    pub includes: &'a IncludeOracle,
    pub externalizer: &'a Externalizer,
}

/// Per-request marking state
pub struct ClosureEngine<'a> {
    cx: EngineContext<'a>,
    closure: Closure,
    root_chains: HashSet<ChainId>,
    /// Marked declarations not processed yet
    queue: VecDeque<DeclId>,
    /// Declarations whose body or initializer still has to be walked
    pending: BTreeSet<DeclId>,
    walked: HashSet<DeclId>,
    /// Marked declarations outside the expanded region
    deferred_decls: BTreeSet<DeclId>,
    deferred_macros: BTreeSet<MacroId>,
    visited_types: HashSet<(TypeId, Option<DeclId>)>,
    visited_expansions: HashSet<(MacroId, SourcePos)>,
}

impl<'a> ClosureEngine<'a> {
    pub fn new(cx: EngineContext<'a>) -> Self {
        Self {
            cx,
            closure: Closure::default(),
            root_chains: HashSet::new(),
            queue: VecDeque::new(),
            pending: BTreeSet::new(),
            walked: HashSet::new(),
            deferred_decls: BTreeSet::new(),
            deferred_macros: BTreeSet::new(),
            visited_types: HashSet::new(),
            visited_expansions: HashSet::new(),
        }
    }

    /// Compute the closure of `functions`
    pub fn compute(mut self, functions: &[String]) -> Result<Closure> {
        for name in functions {
            let root = self.resolve_root(name)?;
            self.closure.roots.push(root);
            self.root_chains.insert(self.cx.graph.decl(root).chain);
        }
        for root in self.closure.roots.clone() {
            debug!("closure root {}", self.describe(root));
            self.add_decl_and_prevs(root);
        }

        loop {
            self.run_to_fixed_point();
            let before = (self.closure.decls.len(), self.deferred_decls.len());
            self.include_enum_constants_referenced_by_macros();
            self.drain();
            let after = (self.closure.decls.len(), self.deferred_decls.len());
            if before == after && self.pending.is_empty() {
                break;
            }
        }

        self.insert_decls_from_non_expanded_includes();
        self.populate_needs_undef();
        debug!(
            decls = self.closure.decls.len(),
            macros = self.closure.macros.len(),
            needs_undef = self.closure.needs_undef.len(),
            renames = self.closure.renames.len(),
            passes = self.closure.pass_sizes.len(),
            "closure computed"
        );
        Ok(self.closure)
    }

    fn resolve_root(&self, name: &str) -> Result<DeclId> {
        let graph = self.cx.graph;
        let chains = graph.function_chains(name);
        let unresolved = |reason, candidates| Error::UnresolvedSymbol {
            name: name.to_string(),
            reason,
            file: graph
                .main_file()
                .map(|f| f.path.display().to_string())
                .unwrap_or_default(),
            candidates,
        };
        match chains.as_slice() {
            [chain] => Ok(graph.chain_representative(*chain)),
            [] => match graph.file_scope.get(name) {
                Some(decls) => Err(unresolved(
                    UnresolvedReason::NotAFunction,
                    decls.iter().map(|&d| graph.location(graph.decl(d).span)).collect(),
                )),
                None => Err(unresolved(UnresolvedReason::NotFound, Vec::new())),
            },
            _ => Err(unresolved(
                UnresolvedReason::Ambiguous,
                chains
                    .iter()
                    .map(|&c| graph.location(graph.decl(graph.chain_representative(c)).span))
                    .collect(),
            )),
        }
    }

    /// Walk pending bodies in passes until a pass marks nothing new
    fn run_to_fixed_point(&mut self) {
        loop {
            self.drain();
            if self.pending.is_empty() {
                break;
            }
            let batch = std::mem::take(&mut self.pending);
            for decl in batch {
                self.walk_body(decl);
                self.drain();
            }
            self.closure.pass_sizes.push(self.closure.decls.len());
            trace!(
                "pass {} ends with {} decls",
                self.closure.pass_sizes.len(),
                self.closure.decls.len()
            );
        }
    }

    fn drain(&mut self) {
        while let Some(decl) = self.queue.pop_front() {
            self.process(decl);
        }
    }

    /// Mark `decl` and every earlier declaration of the same entity
    fn add_decl_and_prevs(&mut self, decl: DeclId) {
        let graph = self.cx.graph;
        for &member in graph.redecls(decl) {
            if member > decl {
                break;
            }
            let pos = graph.decl(member).pos;
            if !self.cx.includes.is_inside_expanded_region(graph, pos) {
                // Still processed so its own prerequisites are recorded
                if self.deferred_decls.insert(member) {
                    trace!("{} stays behind its #include", self.describe(member));
                    self.queue.push_back(member);
                }
                continue;
            }
            if self.closure.decls.insert(member) {
                self.queue.push_back(member);
            }
        }
    }

    /// Mark the entity `decl` names: its defining declaration and `decl` itself
    fn mark_entity(&mut self, decl: DeclId) {
        let graph = self.cx.graph;
        let representative = graph.chain_representative(graph.decl(decl).chain);
        self.add_decl_and_prevs(representative);
        if representative < decl {
            self.add_decl_and_prevs(decl);
        }
    }

    fn process(&mut self, id: DeclId) {
        let graph = self.cx.graph;
        let decl = graph.decl(id);
        trace!("marked {}", self.describe(id));

        // A kept #include still provides deferred declarations
        let is_root = self.root_chains.contains(&decl.chain);
        let rename = if is_root || self.deferred_decls.contains(&id) {
            None
        } else {
            self.cx.externalizer.candidate(graph, decl)
        };

        match &decl.kind {
            DeclKind::Function { ty, body, .. } => {
                self.add_type_and_depends(*ty, id);
                if rename.is_none() && body.is_some() {
                    self.pending.insert(id);
                }
            }
            DeclKind::Variable { ty, init } => {
                self.add_type_and_depends(*ty, id);
                if rename.is_none() && init.is_some() {
                    self.pending.insert(id);
                }
            }
            DeclKind::Record { fields, .. } => {
                for field in fields {
                    self.add_type_and_depends(field.ty, id);
                }
            }
            DeclKind::Enum { constants, .. } => {
                for &constant in constants {
                    self.add_decl_and_prevs(constant);
                }
            }
            DeclKind::EnumConstant { owner, init, .. } => {
                self.mark_entity(*owner);
                if init.is_some() {
                    self.pending.insert(id);
                }
            }
            DeclKind::Typedef { underlying } => self.add_type_and_depends(*underlying, id),
        }

        let range = match (&rename, decl.declarator) {
            // Only the declaration of an externalized symbol is emitted
            (Some(_), Some(spans)) => (decl.span.start, spans.bare.end),
            _ => (decl.span.start, decl.span.end),
        };
        let seq = decl.item.0;
        for expansion in graph.expansions_between(
            SourcePos::new(seq, range.0),
            SourcePos::new(seq, range.1),
        ) {
            self.backtrack_macro_expansion(&expansion.name, expansion.pos);
        }

        if let Some(candidate) = rename {
            if !self.closure.renames.contains_key(&candidate.original) {
                debug!("externalizing {} as {}", candidate.original, candidate.new_name);
                self.closure
                    .renames
                    .insert(candidate.original.clone(), candidate);
            }
        }
    }

    /// Mark the named declarations a type is built from
    fn add_type_and_depends(&mut self, ty: TypeId, origin: DeclId) {
        let graph = self.cx.graph;
        let context = self.lookup_context(origin);
        let mut stack = vec![ty];
        while let Some(t) = stack.pop() {
            if !self.visited_types.insert((t, context)) {
                continue;
            }
            match graph.ty(t) {
                Type::Pointer(element) => stack.push(*element),
                Type::Array { element, size } => {
                    stack.push(*element);
                    if let Some(value) = size {
                        self.handle_array_size(*value, origin);
                    }
                }
                Type::Function { ret, params, .. } => {
                    stack.push(*ret);
                    stack.extend(params.iter().copied());
                }
                Type::Record(decl) | Type::Enum(decl) | Type::Typedef(decl) => {
                    self.mark_entity(*decl);
                }
                Type::Builtin(_) | Type::Unresolved(_) => {}
            }
        }
    }

    /// Enclosing function used for enum constant lookups from `origin`
    fn lookup_context(&self, origin: DeclId) -> Option<DeclId> {
        let decl = self.cx.graph.decl(origin);
        match decl.context {
            Some(function) => Some(function),
            None if decl.has_body() => Some(origin),
            None => None,
        }
    }

    /// Recover the enum an array size may have been folded from
    fn handle_array_size(&mut self, value: i64, origin: DeclId) {
        let graph = self.cx.graph;
        match self.cx.enums.lookup(value, self.lookup_context(origin)) {
            Some(constant) => {
                if let DeclKind::EnumConstant { owner, .. } = graph.decl(constant).kind {
                    debug!(
                        "array size {} in {} recovered as {}",
                        value,
                        self.describe(origin),
                        self.describe(constant)
                    );
                    self.mark_entity(owner);
                }
            }
            None => {
                let err = Error::MalformedConstantFold {
                    value,
                    location: graph.location(graph.decl(origin).span),
                };
                trace!("{}", err);
            }
        }
    }

    fn walk_body(&mut self, id: DeclId) {
        if !self.walked.insert(id) {
            return;
        }
        let graph = self.cx.graph;
        let Some(body) = graph.decl(id).body() else {
            return;
        };
        let mut stack = vec![body];
        while let Some(stmt) = stack.pop() {
            match &stmt.kind {
                StmtKind::DeclRef { decl, .. } => {
                    let file_scope = graph
                        .redecls(*decl)
                        .iter()
                        .any(|&d| graph.decl(d).is_file_scope());
                    if file_scope {
                        self.mark_entity(*decl);
                    }
                }
                StmtKind::LocalDecl(local) => match &graph.decl(*local).kind {
                    DeclKind::Variable { ty, init } => {
                        self.add_type_and_depends(*ty, *local);
                        if let Some(init) = init {
                            stack.push(init);
                        }
                    }
                    _ => self.add_decl_and_prevs(*local),
                },
                StmtKind::TypeRef(ty) => self.add_type_and_depends(*ty, id),
                StmtKind::Block
                | StmtKind::IntLiteral(_)
                | StmtKind::Call
                | StmtKind::Expansion(_)
                | StmtKind::Other => {}
            }
            stack.extend(stmt.children.iter().rev());
        }
    }

    /// Mark the directive visible at `pos` for `name` and, through the same
    /// position, every macro its replacement list uses
    fn backtrack_macro_expansion(&mut self, name: &str, pos: SourcePos) {
        let graph = self.cx.graph;
        let mut stack = vec![name];
        while let Some(name) = stack.pop() {
            let directive = match self.cx.macros.resolve(graph, name, pos) {
                Ok(m) => m,
                Err(err) => {
                    trace!("{}", err);
                    continue;
                }
            };
            if !self.visited_expansions.insert((directive, pos)) {
                continue;
            }
            trace!(
                "{} at {} uses directive {:?}",
                name,
                graph.pos_location(pos),
                directive
            );
            let directive_pos = graph.macro_directive(directive).pos;
            if self.cx.includes.is_inside_expanded_region(graph, directive_pos) {
                self.closure.macros.insert(directive);
            } else {
                self.deferred_macros.insert(directive);
            }
            for ident in graph.macro_directive(directive).body_identifiers() {
                if self.cx.macros.is_macro(ident) {
                    stack.push(ident);
                }
            }
        }
    }

    /// Enum constants named directly in marked macro bodies
    fn include_enum_constants_referenced_by_macros(&mut self) {
        let graph = self.cx.graph;
        let macros: Vec<MacroId> = self.closure.macros.iter().copied().collect();
        for m in macros {
            for ident in graph.macro_directive(m).body_identifiers() {
                let Some(decls) = graph.file_scope.get(ident) else {
                    continue;
                };
                for &d in decls {
                    if let DeclKind::EnumConstant { owner, .. } = graph.decl(d).kind {
                        if !self.closure.contains(owner) {
                            debug!(
                                "macro {} pulls in {}",
                                graph.macro_directive(m).name,
                                self.describe(owner)
                            );
                        }
                        self.mark_entity(owner);
                    }
                }
            }
        }
    }

    /// Prerequisites found in headers that stay `#include` lines
    fn insert_decls_from_non_expanded_includes(&mut self) {
        if !self.deferred_decls.is_empty() {
            debug!(
                "{} declarations come from non-expanded headers",
                self.deferred_decls.len()
            );
        }
        self.closure.decls.append(&mut self.deferred_decls);
        self.closure.macros.append(&mut self.deferred_macros);
    }

    /// Marked definitions that a later, different definition replaces
    fn populate_needs_undef(&mut self) {
        let graph = self.cx.graph;
        for &m in &self.closure.macros {
            let directive = graph.macro_directive(m);
            if !directive.is_define()
                || !self.cx.includes.is_inside_expanded_region(graph, directive.pos)
            {
                continue;
            }
            let redefined = self
                .cx
                .macros
                .later_definitions(graph, m)
                .any(|later| !graph.macro_directive(later).same_definition(directive));
            if redefined {
                trace!("{} needs #undef", directive.name);
                self.closure.needs_undef.insert(m);
            }
        }
    }

    fn describe(&self, id: DeclId) -> String {
        let decl = self.cx.graph.decl(id);
        format!(
            "{} {}",
            decl.kind_name(),
            decl.name.as_deref().unwrap_or("<anonymous>")
        )
    }
}

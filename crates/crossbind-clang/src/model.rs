//! Header model construction.
//!
//! Walks the cursor tree produced by the engine and builds the per-header
//! graph of declarations the backends consume. Every node lives in an
//! arena owned by the [`Model`] and is addressed by [`NodeId`]; headers and
//! nested aggregates store ids, so arbitrarily deep struct nesting never
//! builds recursive ownership chains.

use crate::declare::{DeclareCache, DeclareError, Declarator};
use crate::tree::{Cursor, CursorKind};
use crossbind_common::{header_name, normalize, Guid};
use indexmap::IndexMap;
use rustc_hash::{FxHashMap, FxHashSet};
use smol_str::SmolStr;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Result type for model construction.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Fatal conditions during model construction.
///
/// Expected filtering (operator overloads, bodied definitions, invalid
/// typedefs, guard macros) never appears here; it is handled with an
/// ignored outcome inside the builder. Anything below is corruption that
/// must stop the run before a backend emits misleading output.
#[derive(Error, Debug)]
pub enum ModelError {
    #[error(transparent)]
    Declare(#[from] DeclareError),

    #[error("unknown cursor kind {kind} in {context}")]
    UnexpectedKind { kind: String, context: &'static str },

    #[error("function {0} has more than one return type")]
    DuplicateReturn(String),

    #[error("enum constant {0} carries no resolved value")]
    MissingEnumValue(String),
}

/// Index of a node in the model arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(u32);

/// One modeled declaration.
#[derive(Debug)]
pub struct Node {
    pub name: SmolStr,
    pub path: PathBuf,
    pub hash: u64,
    /// Canonical cursor hash when it differs from `hash`
    pub canonical: Option<u64>,
    /// Set on the redeclaration that turned out to be a forward stub;
    /// suppressed at emission time
    pub is_forward: bool,
    pub kind: NodeKind,
}

/// The declaration variants a header can own.
#[derive(Debug)]
pub enum NodeKind {
    Struct(StructDecl),
    Enum(EnumDecl),
    Function(FunctionDecl),
    Typedef(TypedefDecl),
}

/// A struct, union or COM-style interface.
#[derive(Debug)]
pub struct StructDecl {
    pub is_union: bool,
    pub fields: Vec<Field>,
    /// 128-bit interface identifier; presence marks the node an interface
    pub iid: Option<Guid>,
    /// Single base type name (single inheritance only)
    pub base: Option<SmolStr>,
    /// Declaration order is significant: it fixes vtable slot numbering
    pub methods: Vec<Method>,
}

impl StructDecl {
    fn new(is_union: bool) -> Self {
        Self {
            is_union,
            fields: Vec::new(),
            iid: None,
            base: None,
            methods: Vec::new(),
        }
    }

    pub fn is_interface(&self) -> bool {
        self.iid.is_some()
    }
}

#[derive(Debug)]
pub struct Field {
    pub name: SmolStr,
    pub ty: FieldType,
}

/// A field is either a plain declarator or a nested anonymous aggregate
/// allocated in the arena.
#[derive(Debug)]
pub enum FieldType {
    Declare(Declarator),
    Nested(NodeId),
}

#[derive(Debug)]
pub struct Method {
    pub name: SmolStr,
    pub ret: Declarator,
    pub params: Vec<Param>,
}

#[derive(Debug)]
pub struct Param {
    pub name: SmolStr,
    pub ty: Declarator,
}

#[derive(Debug)]
pub struct EnumDecl {
    pub values: Vec<EnumValue>,
}

#[derive(Debug)]
pub struct EnumValue {
    pub name: SmolStr,
    pub value: i64,
}

#[derive(Debug)]
pub struct FunctionDecl {
    pub ret: Declarator,
    pub params: Vec<Param>,
}

#[derive(Debug)]
pub struct TypedefDecl {
    pub target: Declarator,
}

/// A retained object-like preprocessor constant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MacroDefinition {
    pub name: SmolStr,
    pub value: String,
}

/// Per-source-file container of modeled nodes, include edges and macros.
#[derive(Debug)]
pub struct Header {
    pub path: PathBuf,
    /// Normalized file name, e.g. `d3d11.h`
    pub name: String,
    pub nodes: Vec<NodeId>,
    /// Include edges by target path. Duplicates from diamond includes are
    /// tolerated here; backends deduplicate at emission time.
    pub includes: Vec<PathBuf>,
    pub macros: Vec<MacroDefinition>,
}

impl Header {
    fn new(path: PathBuf) -> Self {
        let name = header_name(&path);
        Self {
            path,
            name,
            nodes: Vec::new(),
            includes: Vec::new(),
            macros: Vec::new(),
        }
    }
}

/// The completed header graph plus the node arena backing it.
#[derive(Debug, Default)]
pub struct Model {
    headers: IndexMap<PathBuf, Header>,
    arena: Vec<Node>,
}

impl Model {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.arena[id.0 as usize]
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.arena[id.0 as usize]
    }

    pub(crate) fn alloc(&mut self, node: Node) -> NodeId {
        let id = NodeId(self.arena.len() as u32);
        self.arena.push(node);
        id
    }

    pub fn header(&self, path: &Path) -> Option<&Header> {
        self.headers.get(path)
    }

    pub(crate) fn get_or_create_header(&mut self, path: &Path) -> &mut Header {
        self.headers
            .entry(path.to_path_buf())
            .or_insert_with(|| Header::new(path.to_path_buf()))
    }

    /// Headers in the order they were first seen.
    pub fn headers(&self) -> impl Iterator<Item = &Header> {
        self.headers.values()
    }

    /// All arena nodes, nested aggregates included.
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.arena.iter()
    }
}

/// Outcome of classifying one declaration cursor.
enum Built {
    Node(Node),
    /// Expected filtering, not an error
    Ignored(&'static str),
}

/// Build the header model from a declaration-level cursor tree.
///
/// `include` bounds which files' declarations are modeled; names are
/// normalized before matching. The caller is expected to have added the
/// entry file's own name.
pub fn build(tree: &Cursor, include: &[String], cache: &mut DeclareCache) -> Result<Model> {
    let mut builder = ModelBuilder {
        cache,
        include: include.iter().map(|n| normalize(n)).collect(),
        used: FxHashMap::default(),
        model: Model::new(),
    };
    for child in &tree.children {
        builder.traverse(child)?;
    }
    Ok(builder.finish())
}

struct ModelBuilder<'a> {
    cache: &'a mut DeclareCache,
    include: FxHashSet<String>,
    /// Processed cursor hashes; every declaration is modeled at most once
    used: FxHashMap<u64, NodeId>,
    model: Model,
}

impl ModelBuilder<'_> {
    fn traverse(&mut self, c: &Cursor) -> Result<()> {
        let Some(file) = &c.file else {
            return Ok(());
        };
        if !self.include.contains(&header_name(file)) {
            return Ok(());
        }
        if self.used.contains_key(&c.hash) {
            return Ok(());
        }

        match c.kind {
            CursorKind::LinkageSpec => {
                if c.is_extern_block() {
                    for child in &c.children {
                        self.traverse(child)?;
                    }
                }
                Ok(())
            }
            CursorKind::StructDecl
            | CursorKind::UnionDecl
            | CursorKind::EnumDecl
            | CursorKind::FunctionDecl
            | CursorKind::TypedefDecl => {
                match self.classify(c)? {
                    Built::Node(node) => {
                        let id = self.model.alloc(node);
                        self.used.insert(c.hash, id);
                        self.model.get_or_create_header(file).nodes.push(id);
                    }
                    Built::Ignored(reason) => {
                        debug!(name = %c.spelling, reason, "skipped declaration");
                    }
                }
                Ok(())
            }
            // any other top-level kind in an included file is not modeled
            _ => Ok(()),
        }
    }

    fn classify(&mut self, c: &Cursor) -> Result<Built> {
        match c.kind {
            CursorKind::StructDecl | CursorKind::UnionDecl => {
                Ok(Built::Node(self.build_struct(c)?))
            }
            CursorKind::EnumDecl => Ok(Built::Node(self.build_enum(c)?)),
            CursorKind::FunctionDecl => {
                if c.spelling.starts_with("operator") {
                    return Ok(Built::Ignored("operator overload"));
                }
                let (func, has_body) = self.build_function(c)?;
                if has_body {
                    return Ok(Built::Ignored("definition with body"));
                }
                Ok(Built::Node(node_shell(c, NodeKind::Function(func))))
            }
            CursorKind::TypedefDecl => match self.build_typedef(c)? {
                Some(node) => Ok(Built::Node(node)),
                None => Ok(Built::Ignored("redundant typedef")),
            },
            _ => Err(ModelError::UnexpectedKind {
                kind: format!("{:?}", c.kind),
                context: "top-level declaration",
            }),
        }
    }

    fn build_struct(&mut self, c: &Cursor) -> Result<Node> {
        let mut decl = StructDecl::new(c.kind == CursorKind::UnionDecl);

        for child in &c.children {
            match child.kind {
                CursorKind::FieldDecl => {
                    let spelling = field_type_spelling(child);
                    let ty = self.cache.parse(spelling)?;
                    decl.fields.push(Field {
                        name: child.spelling.as_str().into(),
                        ty: FieldType::Declare(ty),
                    });
                }
                CursorKind::StructDecl | CursorKind::UnionDecl => {
                    let nested = self.build_struct(child)?;
                    let id = self.model.alloc(nested);
                    decl.fields.push(Field {
                        name: child.spelling.as_str().into(),
                        ty: FieldType::Nested(id),
                    });
                }
                CursorKind::UnexposedAttr => match parse_interface_id(&child.tokens) {
                    Some(iid) => decl.iid = Some(iid),
                    // a struct without a recognizable identifier still
                    // models fine as a plain aggregate
                    None => debug!(tokens = ?child.tokens, "unrecognized attribute"),
                },
                CursorKind::BaseSpecifier => {
                    decl.base = Some(field_type_spelling(child).into());
                }
                CursorKind::Method => {
                    let (sig, has_body) = self.build_function(child)?;
                    if !has_body {
                        decl.methods.push(Method {
                            name: child.spelling.as_str().into(),
                            ret: sig.ret,
                            params: sig.params,
                        });
                    }
                }
                CursorKind::Constructor
                | CursorKind::Destructor
                | CursorKind::ConversionFunction
                | CursorKind::AccessSpecifier => {}
                _ => {
                    return Err(ModelError::UnexpectedKind {
                        kind: format!("{:?}", child.kind),
                        context: "struct member",
                    })
                }
            }
        }

        Ok(node_shell(c, NodeKind::Struct(decl)))
    }

    fn build_enum(&mut self, c: &Cursor) -> Result<Node> {
        let mut values = Vec::with_capacity(c.children.len());
        for child in &c.children {
            if child.kind != CursorKind::EnumConstantDecl {
                return Err(ModelError::UnexpectedKind {
                    kind: format!("{:?}", child.kind),
                    context: "enum member",
                });
            }
            let value = child
                .enum_value
                .ok_or_else(|| ModelError::MissingEnumValue(child.spelling.clone()))?;
            values.push(EnumValue {
                name: child.spelling.as_str().into(),
                value,
            });
        }
        Ok(node_shell(c, NodeKind::Enum(EnumDecl { values })))
    }

    fn build_function(&mut self, c: &Cursor) -> Result<(FunctionDecl, bool)> {
        let mut ret: Option<Declarator> = None;
        let mut params = Vec::new();
        let mut has_body = false;

        for child in &c.children {
            match child.kind {
                CursorKind::TypeRef => {
                    if ret.is_some() {
                        return Err(ModelError::DuplicateReturn(c.spelling.clone()));
                    }
                    ret = Some(self.cache.parse(&child.spelling)?);
                }
                CursorKind::ParmDecl => {
                    params.push(Param {
                        name: child.spelling.as_str().into(),
                        ty: self.cache.parse(&child.type_spelling)?,
                    });
                }
                CursorKind::CompoundStmt => has_body = true,
                CursorKind::UnexposedAttr => {}
                _ => {
                    return Err(ModelError::UnexpectedKind {
                        kind: format!("{:?}", child.kind),
                        context: "function declaration",
                    })
                }
            }
        }

        Ok((
            FunctionDecl {
                // primitive returns surface no type reference; void stands in
                ret: ret.unwrap_or_else(Declarator::void),
                params,
            },
            has_body,
        ))
    }

    fn build_typedef(&mut self, c: &Cursor) -> Result<Option<Node>> {
        let target = if let Some(under) = underlying_type_ref(c) {
            Some(self.cache.parse(&under.spelling)?)
        } else {
            // token fallback for aliases libclang exposes no reference for
            let tokens: Vec<&str> = c
                .tokens
                .iter()
                .map(String::as_str)
                .filter(|t| *t != ";")
                .collect();
            if tokens.len() == 3 {
                Some(self.cache.parse(tokens[1])?)
            } else {
                None
            }
        };

        let Some(target) = target else {
            return Ok(None);
        };
        if !typedef_is_valid(&c.spelling, &target) {
            return Ok(None);
        }
        Ok(Some(node_shell(
            c,
            NodeKind::Typedef(TypedefDecl { target }),
        )))
    }

    /// Demote forward stubs: for every processed node whose canonical hash
    /// names another processed node, the canonical one is the earlier,
    /// incomplete redeclaration and loses to this fuller one.
    fn finish(mut self) -> Model {
        let marks: Vec<NodeId> = self
            .used
            .iter()
            .filter_map(|(hash, id)| {
                let canonical = self.model.node(*id).canonical?;
                if canonical != *hash {
                    self.used.get(&canonical).copied()
                } else {
                    None
                }
            })
            .collect();
        for id in marks {
            self.model.node_mut(id).is_forward = true;
        }
        self.model
    }
}

fn node_shell(c: &Cursor, kind: NodeKind) -> Node {
    Node {
        name: c.spelling.as_str().into(),
        path: c.file.clone().unwrap_or_default(),
        hash: c.hash,
        canonical: (c.canonical_hash != c.hash).then_some(c.canonical_hash),
        is_forward: false,
        kind,
    }
}

/// The type spelling for a field or base specifier, resolved through a
/// typedef indirection when the cursor's own type is a typedef.
fn field_type_spelling(c: &Cursor) -> &str {
    if c.type_is_typedef {
        if let Some(under) = underlying_type_ref(c) {
            return &under.spelling;
        }
    }
    &c.type_spelling
}

/// The single underlying type reference of a typedef-typed cursor, when
/// libclang exposes exactly one.
fn underlying_type_ref(c: &Cursor) -> Option<&Cursor> {
    if !c.type_is_typedef && c.kind != CursorKind::TypedefDecl {
        return None;
    }
    if c.children.len() != 1 {
        return None;
    }
    let child = &c.children[0];
    match child.kind {
        CursorKind::TypeRef
        | CursorKind::StructDecl
        | CursorKind::UnionDecl
        | CursorKind::EnumDecl
        | CursorKind::ParmDecl => Some(child),
        _ => None,
    }
}

/// A typedef is worth modeling unless it restates its own name, possibly
/// through a struct tag (`typedef struct D3D_NAME D3D_NAME;`).
fn typedef_is_valid(name: &str, target: &Declarator) -> bool {
    match target {
        Declarator::Base { name: n, .. } => n != name,
        _ => true,
    }
}

/// Interface-identifier annotations come in two spellings; both carry the
/// identifier as a quoted string argument.
fn parse_interface_id(tokens: &[String]) -> Option<Guid> {
    const SPELLINGS: [&str; 2] = ["MIDL_INTERFACE", "DX_DECLARE_INTERFACE"];
    let first = tokens.first()?;
    if !SPELLINGS.contains(&first.as_str()) {
        return None;
    }
    let quoted = tokens.iter().find(|t| t.starts_with('"'))?;
    quoted.trim_matches('"').parse().ok()
}

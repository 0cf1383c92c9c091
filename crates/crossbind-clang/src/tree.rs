//! Cursor tree representation.
//!
//! This is the surface the model builder consumes: a simplified view of the
//! libclang cursor hierarchy carrying only what header modeling needs. The
//! engine materializes it from a real translation unit; tests assemble it
//! directly.

use smol_str::SmolStr;
use std::path::PathBuf;

/// Kinds of cursors the builder and resolver care about.
///
/// Anything libclang reports that has no counterpart here arrives as
/// `Other`; the builder decides per position whether that is skippable
/// or fatal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CursorKind {
    /// Translation unit (root)
    TranslationUnit,
    /// `extern "C" { ... }` style linkage block
    LinkageSpec,
    StructDecl,
    UnionDecl,
    EnumDecl,
    EnumConstantDecl,
    FieldDecl,
    FunctionDecl,
    ParmDecl,
    TypedefDecl,
    /// Reference to a named type (carries the return type on functions)
    TypeRef,
    /// Function body
    CompoundStmt,
    /// Attribute libclang does not expose structurally; tokens carry the text
    UnexposedAttr,
    /// Base-class specifier on a struct
    BaseSpecifier,
    Method,
    Constructor,
    Destructor,
    ConversionFunction,
    AccessSpecifier,
    /// `#include` directive (preprocessing-aware parse only)
    InclusionDirective,
    /// `#define` (preprocessing-aware parse only)
    MacroDefinition,
    MacroInstantiation,
    /// Any kind not modeled above, keeping the engine's spelling of it
    Other(SmolStr),
}

/// One node of the externally produced syntax tree.
#[derive(Debug, Clone)]
pub struct Cursor {
    pub kind: CursorKind,
    /// Declared name (empty for anonymous declarations)
    pub spelling: String,
    /// Stable hash identifying this cursor within one translation unit
    pub hash: u64,
    /// Hash of the canonical declaration; equals `hash` unless this cursor
    /// redeclares an entity introduced elsewhere
    pub canonical_hash: u64,
    /// Hash of the referenced declaration, where one exists
    pub referenced_hash: Option<u64>,
    /// Source file owning this cursor (None for the synthetic root)
    pub file: Option<PathBuf>,
    pub line: u32,
    /// Spelling of the cursor's type, e.g. `const float *`
    pub type_spelling: String,
    /// Whether the cursor's type is a typedef that should be resolved
    /// through its underlying type reference
    pub type_is_typedef: bool,
    /// Resolved value for enum constants; never re-lexed from tokens
    pub enum_value: Option<i64>,
    /// Token spellings covering the cursor's extent, populated for the
    /// kinds that are interpreted textually (attributes, macros, includes,
    /// linkage blocks, typedef fallback)
    pub tokens: Vec<String>,
    pub children: Vec<Cursor>,
}

impl Cursor {
    /// Create a node with the given kind; everything else defaults.
    pub fn new(kind: CursorKind) -> Self {
        Self {
            kind,
            spelling: String::new(),
            hash: 0,
            canonical_hash: 0,
            referenced_hash: None,
            file: None,
            line: 0,
            type_spelling: String::new(),
            type_is_typedef: false,
            enum_value: None,
            tokens: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_spelling(mut self, spelling: impl Into<String>) -> Self {
        self.spelling = spelling.into();
        self
    }

    /// Set both the identity hash and the canonical hash.
    pub fn with_hash(mut self, hash: u64) -> Self {
        self.hash = hash;
        self.canonical_hash = hash;
        self
    }

    pub fn with_canonical(mut self, canonical: u64) -> Self {
        self.canonical_hash = canonical;
        self
    }

    pub fn with_file(mut self, file: impl Into<PathBuf>) -> Self {
        self.file = Some(file.into());
        self
    }

    pub fn with_type(mut self, spelling: impl Into<String>) -> Self {
        self.type_spelling = spelling.into();
        self
    }

    pub fn with_typedef_type(mut self, spelling: impl Into<String>) -> Self {
        self.type_spelling = spelling.into();
        self.type_is_typedef = true;
        self
    }

    pub fn with_enum_value(mut self, value: i64) -> Self {
        self.enum_value = Some(value);
        self
    }

    pub fn with_tokens<I, S>(mut self, tokens: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tokens = tokens.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_child(mut self, child: Cursor) -> Self {
        self.children.push(child);
        self
    }

    pub fn with_children(mut self, children: Vec<Cursor>) -> Self {
        self.children = children;
        self
    }

    /// Whether this linkage block is an `extern` block whose declarations
    /// should be modeled as if they were top level.
    pub fn is_extern_block(&self) -> bool {
        self.kind == CursorKind::LinkageSpec
            && self.tokens.first().map(String::as_str) == Some("extern")
    }
}

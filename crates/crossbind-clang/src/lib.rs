//! Clang cursor-tree ingestion and header model construction for crossbind.
//!
//! This crate provides:
//! - C++ header parsing via libclang (the `engine` module)
//! - Declarator parsing for raw C type spellings
//! - Construction of the per-header declaration model
//! - Macro and include-edge resolution from a preprocessing-aware parse
//!
//! # Architecture
//!
//! ```text
//! Header → libclang → Cursor tree → model::build    (declarations)
//! Header → libclang → Cursor tree → macros::resolve (macros + includes)
//! ```
//!
//! The two passes are a strict linear sequence over two parses of the same
//! input; macro visibility needs a different parse configuration than
//! declaration visibility.

mod declare;
mod engine;
mod macros;
mod model;
mod tree;

pub use declare::{AggregateTag, DeclareCache, DeclareError, Declarator, RefSigil};
pub use engine::ClangEngine;
pub use macros::resolve;
pub use model::{
    build, EnumDecl, EnumValue, Field, FieldType, FunctionDecl, Header, MacroDefinition, Method,
    Model, ModelError, Node, NodeId, NodeKind, Param, StructDecl, TypedefDecl,
};
pub use tree::{Cursor, CursorKind};

use miette::{miette, Result};
use std::path::{Path, PathBuf};

/// Run both passes over a header file and return the completed model.
///
/// The entry file's own name is implicitly part of the allow-list.
pub fn parse_header(path: &Path, include: &[String], include_dirs: &[PathBuf]) -> Result<Model> {
    let engine = ClangEngine::new()?;
    let mut allow: Vec<String> = include.to_vec();
    allow.push(crossbind_common::header_name(path));

    let decl_tree = engine.parse_file(path, include_dirs, false)?;
    let mut cache = DeclareCache::new();
    let mut model =
        build(&decl_tree, &allow, &mut cache).map_err(|e| miette!("{}: {}", path.display(), e))?;

    let macro_tree = engine.parse_file(path, include_dirs, true)?;
    resolve(&macro_tree, &mut model, &allow);

    Ok(model)
}

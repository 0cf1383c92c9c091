//! Target-language backends for crossbind.
//!
//! Both backends walk the include graph depth-first from the entry header,
//! emit every reachable module exactly once, and map native types through
//! backend-specific tables. The C# backend additionally synthesizes
//! vtable-indexed proxies for COM-style interfaces.

mod csharp;
mod dlang;
mod names;
mod registry;
mod writer;

pub use csharp::CsGenerator;
pub use dlang::DlangGenerator;
pub use registry::{InterfaceRegistry, ROOT_INTERFACE, ROOT_METHOD_COUNT};

use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type for code generation.
pub type Result<T> = std::result::Result<T, GenerateError>;

/// Errors that can occur while emitting output files.
#[derive(Error, Debug)]
pub enum GenerateError {
    #[error("failed to write output: {0}")]
    Io(#[from] std::io::Error),

    /// An include edge points at a header the model never saw. Edges are
    /// only recorded for modeled headers, so this indicates corruption.
    #[error("include edge references unknown header: {0}")]
    MissingHeader(PathBuf),
}

/// Remove and recreate the destination directory so a re-run never merges
/// with stale output.
pub(crate) fn prepare_output_root(dest: &Path) -> Result<()> {
    if dest.exists() {
        fs::remove_dir_all(dest)?;
    }
    fs::create_dir_all(dest)?;
    Ok(())
}

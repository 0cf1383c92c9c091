//! Second-pass macro and include resolution.
//!
//! Macro visibility requires a preprocessing-aware parse, so this runs over
//! a second tree of the same input and augments the headers the model
//! builder already produced: include edges from inclusion directives, and
//! object-like macro constants that survive filtering.

use crate::model::{MacroDefinition, Model};
use crate::tree::{Cursor, CursorKind};
use crossbind_common::normalize;
use rustc_hash::{FxHashMap, FxHashSet};
use std::path::PathBuf;
use tracing::debug;

/// Macros that redefine themselves in terms of other macros or pull in
/// environment-specific names; expanding them would emit dangling
/// references, so they are dropped wholesale.
const MACRO_DENYLIST: [&[&str]; 4] = [
    &["IID_ID3DBlob", "IID_ID3D10Blob"],
    &["INTERFACE", "ID3DInclude"],
    &["D2D1_INVALID_TAG", "ULONGLONG_MAX"],
    &["D2D1FORCEINLINE", "FORCEINLINE"],
];

/// Attach include edges and macro constants to `model` from a tree parsed
/// with preprocessor detail retained.
pub fn resolve(tree: &Cursor, model: &mut Model, include: &[String]) {
    let allowed: FxHashSet<String> = include.iter().map(|n| normalize(n)).collect();

    // headers already known to the model, keyed by normalized file name
    let name_map: FxHashMap<String, PathBuf> = model
        .headers()
        .filter(|h| allowed.contains(&h.name))
        .map(|h| (h.name.clone(), h.path.clone()))
        .collect();

    let mut resolver = MacroResolver {
        model,
        allowed,
        name_map,
        seen: FxHashSet::default(),
    };
    for child in &tree.children {
        resolver.traverse(child);
    }
}

struct MacroResolver<'m> {
    model: &'m mut Model,
    allowed: FxHashSet<String>,
    name_map: FxHashMap<String, PathBuf>,
    seen: FxHashSet<u64>,
}

impl MacroResolver<'_> {
    fn traverse(&mut self, c: &Cursor) {
        let Some(file) = &c.file else {
            return;
        };
        if !self.seen.insert(c.hash) {
            return;
        }
        let current_name = crossbind_common::header_name(file);
        if !self.allowed.contains(&current_name) {
            return;
        }

        match c.kind {
            CursorKind::LinkageSpec => {
                if c.is_extern_block() {
                    for child in &c.children {
                        self.traverse(child);
                    }
                }
            }
            CursorKind::InclusionDirective => {
                if let Some(name) = included_header_name(&c.tokens) {
                    if let Some(target) = self.name_map.get(&name) {
                        let target = target.clone();
                        self.model
                            .get_or_create_header(file)
                            .includes
                            .push(target);
                    }
                }
            }
            CursorKind::MacroDefinition => {
                if let Some(def) = filter_macro(&c.spelling, &c.tokens) {
                    self.model.get_or_create_header(file).macros.push(def);
                } else {
                    debug!(name = %c.spelling, "dropped macro");
                }
            }
            CursorKind::MacroInstantiation => {}
            _ => {}
        }
    }
}

/// Recover the included header name from an inclusion directive's tokens,
/// handling both `#include <dxgi.h>` and `#include "dxgi.h"`.
fn included_header_name(tokens: &[String]) -> Option<String> {
    if let Some(open) = tokens.iter().position(|t| t == "<") {
        let name: String = tokens[open + 1..tokens.len().saturating_sub(1)].concat();
        if name.is_empty() {
            return None;
        }
        return Some(normalize(&name));
    }
    let last = tokens.last()?;
    let name = last.trim_matches('"');
    if name == last || name.is_empty() {
        return None;
    }
    Some(normalize(name))
}

/// Apply the object-like macro filter: header guards (a bare name),
/// function-like macros and denylisted names are dropped; everything else
/// keeps its space-joined value text.
fn filter_macro(name: &str, tokens: &[String]) -> Option<MacroDefinition> {
    if tokens.len() <= 1 {
        return None;
    }
    if MACRO_DENYLIST
        .iter()
        .any(|deny| deny.len() == tokens.len() && deny.iter().zip(tokens).all(|(a, b)| a == b))
    {
        return None;
    }
    if tokens.len() >= 3
        && tokens[1] == "("
        && tokens[2].chars().next().is_some_and(|c| c.is_alphabetic())
    {
        return None;
    }
    Some(MacroDefinition {
        name: name.into(),
        value: tokens[1..].join(" "),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::declare::DeclareCache;
    use crate::model::build;
    use crate::tree::{Cursor, CursorKind};

    fn struct_in(file: &str, name: &str, hash: u64) -> Cursor {
        Cursor::new(CursorKind::StructDecl)
            .with_spelling(name)
            .with_hash(hash)
            .with_file(file)
    }

    fn model_for(files: &[(&str, &str, u64)], include: &[&str]) -> Model {
        let tree = Cursor::new(CursorKind::TranslationUnit).with_children(
            files
                .iter()
                .map(|(file, name, hash)| struct_in(file, name, *hash))
                .collect(),
        );
        let include: Vec<String> = include.iter().map(|s| s.to_string()).collect();
        build(&tree, &include, &mut DeclareCache::new()).unwrap()
    }

    #[test]
    fn include_edges_from_both_token_forms() {
        let mut model = model_for(
            &[("d3d11.h", "A", 1), ("dxgi.h", "B", 2)],
            &["d3d11.h", "dxgi.h"],
        );
        let macro_tree = Cursor::new(CursorKind::TranslationUnit)
            .with_child(
                Cursor::new(CursorKind::InclusionDirective)
                    .with_hash(10)
                    .with_file("d3d11.h")
                    .with_tokens(["#", "include", "<", "dxgi", ".", "h", ">"]),
            )
            .with_child(
                Cursor::new(CursorKind::InclusionDirective)
                    .with_hash(11)
                    .with_file("dxgi.h")
                    .with_tokens(["#", "include", "\"d3d11.h\""]),
            );
        resolve(
            &macro_tree,
            &mut model,
            &["d3d11.h".to_string(), "dxgi.h".to_string()],
        );

        let d3d11 = model.header(std::path::Path::new("d3d11.h")).unwrap();
        assert_eq!(d3d11.includes, vec![PathBuf::from("dxgi.h")]);
        let dxgi = model.header(std::path::Path::new("dxgi.h")).unwrap();
        assert_eq!(dxgi.includes, vec![PathBuf::from("d3d11.h")]);
    }

    #[test]
    fn unknown_include_targets_are_ignored() {
        let mut model = model_for(&[("d3d11.h", "A", 1)], &["d3d11.h"]);
        let macro_tree = Cursor::new(CursorKind::TranslationUnit).with_child(
            Cursor::new(CursorKind::InclusionDirective)
                .with_hash(10)
                .with_file("d3d11.h")
                .with_tokens(["#", "include", "<", "windows", ".", "h", ">"]),
        );
        resolve(&macro_tree, &mut model, &["d3d11.h".to_string()]);
        assert!(model
            .header(std::path::Path::new("d3d11.h"))
            .unwrap()
            .includes
            .is_empty());
    }

    #[test]
    fn guard_macros_are_dropped() {
        assert!(filter_macro("__D3D11_H__", &["__D3D11_H__".to_string()]).is_none());
    }

    #[test]
    fn function_like_macros_are_dropped() {
        let tokens: Vec<String> = ["MAX", "(", "a", ",", "b", ")", "(", "a", ")"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(filter_macro("MAX", &tokens).is_none());
    }

    #[test]
    fn parenthesized_values_are_kept() {
        let tokens: Vec<String> = ["FLAGS", "(", "1", "<<", "3", ")"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let def = filter_macro("FLAGS", &tokens).unwrap();
        assert_eq!(def.value, "( 1 << 3 )");
    }

    #[test]
    fn denylisted_macros_are_dropped() {
        let tokens: Vec<String> = ["INTERFACE", "ID3DInclude"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        assert!(filter_macro("INTERFACE", &tokens).is_none());
    }

    #[test]
    fn value_macros_are_retained() {
        let tokens: Vec<String> = ["FOO", "0x10"].iter().map(|s| s.to_string()).collect();
        let def = filter_macro("FOO", &tokens).unwrap();
        assert_eq!(def.name, "FOO");
        assert_eq!(def.value, "0x10");
    }

    #[test]
    fn macros_attach_to_their_header() {
        let mut model = model_for(&[("d3d11.h", "A", 1)], &["d3d11.h"]);
        let macro_tree = Cursor::new(CursorKind::TranslationUnit).with_child(
            Cursor::new(CursorKind::MacroDefinition)
                .with_spelling("D3D11_SDK_VERSION")
                .with_hash(10)
                .with_file("d3d11.h")
                .with_tokens(["D3D11_SDK_VERSION", "7"]),
        );
        resolve(&macro_tree, &mut model, &["d3d11.h".to_string()]);
        let header = model.header(std::path::Path::new("d3d11.h")).unwrap();
        assert_eq!(header.macros.len(), 1);
        assert_eq!(header.macros[0].name, "D3D11_SDK_VERSION");
        assert_eq!(header.macros[0].value, "7");
    }
}

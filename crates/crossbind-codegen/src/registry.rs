//! Interface registry and vtable slot computation.
//!
//! Backends need to know, for any interface, how many virtual methods its
//! ancestry contributes before its own methods start. The registry is
//! built once from the whole model so cross-header inheritance
//! (`ID3D11Device : IDXGIObject` with the base declared in another file)
//! resolves without ordering concerns.

use crossbind_clang::{Model, NodeKind};
use rustc_hash::FxHashMap;
use smol_str::SmolStr;

/// The universal root every interface chain bottoms out in.
pub const ROOT_INTERFACE: &str = "IUnknown";

/// Vtable slots occupied by the root's own methods
/// (QueryInterface, AddRef, Release).
pub const ROOT_METHOD_COUNT: usize = 3;

struct InterfaceEntry {
    base: Option<SmolStr>,
    methods: usize,
}

/// Name → inheritance info for every interface-shaped struct in the model.
pub struct InterfaceRegistry {
    map: FxHashMap<SmolStr, InterfaceEntry>,
}

impl InterfaceRegistry {
    pub fn build(model: &Model) -> Self {
        let mut map = FxHashMap::default();
        for node in model.nodes() {
            if node.is_forward {
                // forward stubs carry no methods; the full declaration wins
                continue;
            }
            let NodeKind::Struct(s) = &node.kind else {
                continue;
            };
            if s.is_interface() || s.base.is_some() {
                map.insert(
                    node.name.clone(),
                    InterfaceEntry {
                        base: s.base.clone(),
                        methods: s.methods.len(),
                    },
                );
            }
        }
        Self { map }
    }

    /// Whether a type name refers to a virtual-dispatch interface.
    pub fn is_interface(&self, name: &str) -> bool {
        name == ROOT_INTERFACE || self.map.contains_key(name)
    }

    /// The vtable slot of an interface's first own method, given its
    /// declared base: the sum of all ancestor method counts. A root
    /// interface (no base, or based directly on the universal root)
    /// starts right after the root's implicit methods. A base the model
    /// never saw is treated as the root.
    pub fn first_slot(&self, base: Option<&str>) -> usize {
        self.first_slot_guarded(base, 0)
    }

    fn first_slot_guarded(&self, base: Option<&str>, depth: usize) -> usize {
        // inheritance is single and chains are short; a longer walk means
        // a declaration cycle, which gets the root numbering
        if depth > 64 {
            return ROOT_METHOD_COUNT;
        }
        match base {
            None => ROOT_METHOD_COUNT,
            Some(ROOT_INTERFACE) => ROOT_METHOD_COUNT,
            Some(name) => match self.map.get(name) {
                Some(entry) => {
                    self.first_slot_guarded(entry.base.as_deref(), depth + 1) + entry.methods
                }
                None => ROOT_METHOD_COUNT,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbind_clang::{build, Cursor, CursorKind, DeclareCache};

    fn interface(name: &str, hash: u64, base: Option<&str>, methods: &[&str]) -> Cursor {
        let mut c = Cursor::new(CursorKind::StructDecl)
            .with_spelling(name)
            .with_hash(hash)
            .with_file("test.h")
            .with_child(Cursor::new(CursorKind::UnexposedAttr).with_tokens([
                "MIDL_INTERFACE",
                "(",
                "\"00000000-0000-0000-c000-000000000046\"",
                ")",
            ]));
        if let Some(base) = base {
            c = c.with_child(Cursor::new(CursorKind::BaseSpecifier).with_type(base));
        }
        for m in methods {
            c = c.with_child(Cursor::new(CursorKind::Method).with_spelling(*m));
        }
        c
    }

    fn registry_for(children: Vec<Cursor>) -> InterfaceRegistry {
        let tree = Cursor::new(CursorKind::TranslationUnit).with_children(children);
        let model = build(&tree, &["test.h".to_string()], &mut DeclareCache::new()).unwrap();
        InterfaceRegistry::build(&model)
    }

    #[test]
    fn root_interface_starts_after_root_methods() {
        let reg = registry_for(vec![interface("IA", 1, None, &["a0", "a1"])]);
        assert_eq!(reg.first_slot(None), ROOT_METHOD_COUNT);
        assert_eq!(reg.first_slot(Some(ROOT_INTERFACE)), ROOT_METHOD_COUNT);
    }

    #[test]
    fn derived_interface_counts_all_ancestors() {
        let reg = registry_for(vec![
            interface("IA", 1, Some("IUnknown"), &["a0", "a1"]),
            interface("IB", 2, Some("IA"), &["b0"]),
            interface("IC", 3, Some("IB"), &["c0"]),
        ]);
        // a0 → 3, a1 → 4, b0 → 5, c0 → 6
        assert_eq!(reg.first_slot(Some("IA")), 5);
        assert_eq!(reg.first_slot(Some("IB")), 6);
    }

    #[test]
    fn unknown_base_is_treated_as_root() {
        let reg = registry_for(vec![]);
        assert_eq!(reg.first_slot(Some("INotModeled")), ROOT_METHOD_COUNT);
    }

    #[test]
    fn interface_detection_covers_root_and_registered() {
        let reg = registry_for(vec![interface("IA", 1, Some("IUnknown"), &["a0"])]);
        assert!(reg.is_interface("IUnknown"));
        assert!(reg.is_interface("IA"));
        assert!(!reg.is_interface("DXGI_RATIONAL"));
    }

    #[test]
    fn forward_stub_does_not_shadow_full_declaration() {
        let forward = Cursor::new(CursorKind::StructDecl)
            .with_spelling("IA")
            .with_hash(10)
            .with_file("test.h");
        let full = interface("IA", 20, Some("IUnknown"), &["a0", "a1"]).with_canonical(10);
        let reg = registry_for(vec![forward, full]);
        assert_eq!(reg.first_slot(Some("IA")), ROOT_METHOD_COUNT + 2);
    }
}

//! D systems-language backend.
//!
//! Emits one module per header. D has native COM interfaces, so interface
//! nodes become `interface I : Base` declarations with an `iidof` constant
//! instead of synthesized proxies; the runtime's vtable dispatch does the
//! rest. Include edges become `public import` lines.

use crate::names::strip_enum_constant;
use crate::registry::{InterfaceRegistry, ROOT_INTERFACE};
use crate::writer::Writer;
use crate::{prepare_output_root, GenerateError, Result};
use crossbind_clang::{
    Declarator, EnumDecl, Field, FieldType, FunctionDecl, Header, Method, Model, Node, NodeKind,
    Param, StructDecl,
};
use crossbind_common::{module_stem, Guid};
use rustc_hash::FxHashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

const IMPORT: &str = "import core.sys.windows.windef;\nimport core.sys.windows.com;";

/// D code generator.
pub struct DlangGenerator {
    visited: FxHashSet<String>,
}

impl DlangGenerator {
    pub fn new() -> Self {
        Self {
            visited: FxHashSet::default(),
        }
    }

    /// Generate D modules for every header reachable from `root` under
    /// `<out_root>/<namespace>/<package_name>/`.
    pub fn generate(
        &mut self,
        model: &Model,
        root: &Path,
        out_root: &Path,
        package_name: &str,
        namespace: &str,
        multi_header: bool,
    ) -> Result<()> {
        let dest = out_root.join(namespace).join(package_name);
        prepare_output_root(&dest)?;

        let root_header = model
            .header(root)
            .ok_or_else(|| GenerateError::MissingHeader(root.to_path_buf()))?;

        let mut emitter = DlangEmitter {
            model,
            registry: InterfaceRegistry::build(model),
            dest,
            package: format!("{}.{}", namespace, package_name),
            visited: &mut self.visited,
        };
        emitter.emit_header(root_header, !multi_header)
    }
}

impl Default for DlangGenerator {
    fn default() -> Self {
        Self::new()
    }
}

struct DlangEmitter<'m> {
    model: &'m Model,
    registry: InterfaceRegistry,
    dest: PathBuf,
    /// Dotted module prefix, e.g. `windowskits.build_10_0_17763_0`
    package: String,
    visited: &'m mut FxHashSet<String>,
}

impl DlangEmitter<'_> {
    fn emit_header(&mut self, header: &Header, emit_self: bool) -> Result<()> {
        let module = module_stem(&header.name).to_string();
        if !self.visited.insert(module.clone()) {
            return Ok(());
        }

        if emit_self {
            let mut w = Writer::new();
            w.writeln("// crossbind generated");
            w.writeln(&format!("module {}.{};", self.package, module));
            w.blank();
            w.writeln(IMPORT);

            let mut imported = FxHashSet::default();
            for inc_path in &header.includes {
                let include = self
                    .model
                    .header(inc_path)
                    .ok_or_else(|| GenerateError::MissingHeader(inc_path.clone()))?;
                let inc_module = module_stem(&include.name).to_string();
                if imported.insert(inc_module.clone()) {
                    w.writeln(&format!("public import {}.{};", self.package, inc_module));
                }
            }

            w.blank();
            w.writeln("extern(Windows){");
            w.blank();
            w.writeln("alias IID = GUID;");
            w.blank();

            if let Some(snippet) = module_snippet(&module) {
                w.writeln(snippet);
                w.blank();
            }

            for m in &header.macros {
                w.writeln(&format!("enum {} = {};", m.name, m.value));
            }
            if !header.macros.is_empty() {
                w.blank();
            }

            for id in &header.nodes {
                let node = self.model.node(*id);
                if node.name.is_empty() {
                    debug!(header = %header.name, "skipping anonymous declaration");
                    continue;
                }
                match &node.kind {
                    NodeKind::Enum(e) => {
                        emit_enum(&mut w, &node.name, e);
                        w.blank();
                    }
                    NodeKind::Typedef(t) => {
                        if alias_is_suppressed(&node.name, &t.target) {
                            debug!(alias = %node.name, "suppressed redundant alias");
                            continue;
                        }
                        if node.name.starts_with("PFN_") {
                            w.writeln(&format!("alias {} = void *;", node.name));
                        } else {
                            w.writeln(&format!("alias {} = {};", node.name, d_type(&t.target)));
                        }
                        w.blank();
                    }
                    NodeKind::Struct(s) => {
                        if node.is_forward || node.name.starts_with('C') {
                            continue;
                        }
                        if self.emits_as_interface(s) {
                            self.emit_interface(&mut w, node, s);
                        } else {
                            self.emit_struct(&mut w, node, s);
                        }
                        w.blank();
                    }
                    NodeKind::Function(f) => {
                        self.emit_function(&mut w, &node.name, f);
                        w.blank();
                    }
                }
            }

            w.writeln("}");

            let path = self.dest.join(format!("{}.d", module));
            info!(file = %path.display(), "writing");
            fs::write(path, w.into_string())?;
        }

        for inc_path in &header.includes {
            let include = self
                .model
                .header(inc_path)
                .ok_or_else(|| GenerateError::MissingHeader(inc_path.clone()))?;
            self.emit_header(include, true)?;
        }
        Ok(())
    }

    fn emits_as_interface(&self, s: &StructDecl) -> bool {
        s.is_interface()
            || s.base
                .as_deref()
                .is_some_and(|b| self.registry.is_interface(b))
    }

    fn emit_interface(&self, w: &mut Writer, node: &Node, s: &StructDecl) {
        let base = s.base.as_deref().unwrap_or(ROOT_INTERFACE);
        w.writeln(&format!("interface {}: {} {{", node.name, base));
        w.indent();
        if let Some(iid) = &s.iid {
            w.writeln(&format!("static immutable iidof = GUID({});", d_guid(iid)));
        }
        for method in &s.methods {
            self.emit_method(w, method);
        }
        w.dedent();
        w.writeln("}");
    }

    fn emit_method(&self, w: &mut Writer, method: &Method) {
        let params = self.param_list(&method.params);
        w.writeln(&format!(
            "{} {}({});",
            d_type(&method.ret),
            method.name,
            params
        ));
    }

    fn emit_function(&self, w: &mut Writer, name: &str, f: &FunctionDecl) {
        let params = self.param_list(&f.params);
        w.writeln(&format!("{} {}({});", d_type(&f.ret), name, params));
    }

    fn param_list(&self, params: &[Param]) -> String {
        params
            .iter()
            .enumerate()
            .map(|(i, p)| {
                let name = if p.name.is_empty() {
                    format!("arg{}", i)
                } else {
                    p.name.to_string()
                };
                format!("{} {}", d_param(&self.registry, &p.ty), name)
            })
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn emit_struct(&self, w: &mut Writer, node: &Node, s: &StructDecl) {
        let keyword = if s.is_union { "union" } else { "struct" };
        w.writeln(&format!("{} {}", keyword, node.name));
        w.writeln("{");
        w.indent();
        self.emit_fields(w, &s.fields);
        w.dedent();
        w.writeln("}");
    }

    fn emit_fields(&self, w: &mut Writer, fields: &[Field]) {
        for field in fields {
            match &field.ty {
                FieldType::Declare(d) => {
                    w.writeln(&format!("{} {};", d_type(d), field.name));
                }
                FieldType::Nested(id) => {
                    let NodeKind::Struct(nested) = &self.model.node(*id).kind else {
                        continue;
                    };
                    // anonymous aggregates nest natively in D
                    let keyword = if nested.is_union { "union" } else { "struct" };
                    if field.name.is_empty() {
                        w.writeln(&format!("{} {{", keyword));
                    } else {
                        w.writeln(&format!("{} {} {{", keyword, field.name));
                    }
                    w.indent();
                    self.emit_fields(w, &nested.fields);
                    w.dedent();
                    w.writeln("}");
                }
            }
        }
    }
}

/// Windows typedef → D native type, where windef's alias would be a
/// pointless indirection.
fn d_primitive(name: &str) -> &str {
    match name {
        "BYTE" | "UINT8" => "ubyte",
        "INT" | "LONG" => "int",
        "UINT" | "ULONG" | "DWORD" | "UINT32" => "uint",
        "USHORT" | "WORD" => "ushort",
        "UINT64" | "ULONGLONG" => "ulong",
        "LARGE_INTEGER" | "LONGLONG" => "long",
        "FLOAT" => "float",
        "DOUBLE" => "double",
        "WCHAR" => "wchar",
        "CHAR" => "char",
        "SIZE_T" => "size_t",
        "LPVOID" => "void *",
        "LPCVOID" => "const(void) *",
        other => other,
    }
}

fn d_type(d: &Declarator) -> String {
    match d {
        Declarator::Void { is_const: true } => "const(void)".to_string(),
        Declarator::Void { is_const: false } => "void".to_string(),
        Declarator::Base { name, is_const, .. } => {
            let prim = d_primitive(name);
            if *is_const {
                format!("const({})", prim)
            } else {
                prim.to_string()
            }
        }
        Declarator::Pointer { target, .. } => format!("{}*", d_type(target)),
        Declarator::Array { length, target } => format!("{}[{}]", d_type(target), length),
    }
}

/// Interfaces are reference types in D, so one level of indirection folds
/// into the interface handle itself.
fn d_param(registry: &InterfaceRegistry, decl: &Declarator) -> String {
    let arity = decl.pointer_arity();
    if arity >= 1 {
        if let Some(name) = decl.pointee().base_name() {
            if registry.is_interface(name) {
                return format!("{}{}", name, "*".repeat(arity - 1));
            }
        }
    }
    d_type(decl)
}

fn d_guid(guid: &Guid) -> String {
    let bytes: Vec<String> = guid
        .data4
        .iter()
        .map(|b| format!("0x{:02x}", b))
        .collect();
    format!(
        "0x{:08x}, 0x{:04x}, 0x{:04x}, [{}]",
        guid.data1,
        guid.data2,
        guid.data3,
        bytes.join(", ")
    )
}

fn emit_enum(w: &mut Writer, tag: &str, e: &EnumDecl) {
    w.writeln(&format!("enum {} {{", tag));
    w.indent();
    for value in &e.values {
        w.writeln(&format!(
            "{} = {:#010x},",
            strip_enum_constant(tag, &value.name),
            value.value
        ));
    }
    w.dedent();
    w.writeln("}");
}

/// Same suppression rules as the managed backend, against the D map.
fn alias_is_suppressed(name: &str, target: &Declarator) -> bool {
    match target {
        Declarator::Base {
            name: target_name, ..
        } => {
            d_primitive(name) == d_primitive(target_name)
                || name.replace("D2D1_", "D2D_") == target_name.as_str()
        }
        _ => false,
    }
}

/// Hand-maintained per-module preamble snippets the headers themselves
/// cannot express.
fn module_snippet(module: &str) -> Option<&'static str> {
    match module {
        "d2d1" => Some("enum D2DERR_RECREATE_TARGET = 0x8899000CL;"),
        "d2dbasetypes" => Some(
            "struct D3DCOLORVALUE\n{\n    float r;\n    float g;\n    float b;\n    float a;\n}",
        ),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crossbind_clang::{build, Cursor, CursorKind, DeclareCache};

    fn registry_with_device() -> InterfaceRegistry {
        let tree = Cursor::new(CursorKind::TranslationUnit).with_child(
            Cursor::new(CursorKind::StructDecl)
                .with_spelling("ID3D11Device")
                .with_hash(1)
                .with_file("d3d11.h")
                .with_child(Cursor::new(CursorKind::UnexposedAttr).with_tokens([
                    "MIDL_INTERFACE",
                    "(",
                    "\"db6f6ddb-ac77-4e88-8253-819df9bbf140\"",
                    ")",
                ])),
        );
        let model = build(&tree, &["d3d11.h".to_string()], &mut DeclareCache::new()).unwrap();
        InterfaceRegistry::build(&model)
    }

    fn parse(src: &str) -> Declarator {
        DeclareCache::new().parse(src).unwrap()
    }

    #[test]
    fn interface_pointers_lose_one_level() {
        let registry = registry_with_device();
        assert_eq!(d_param(&registry, &parse("ID3D11Device *")), "ID3D11Device");
        assert_eq!(
            d_param(&registry, &parse("ID3D11Device **")),
            "ID3D11Device*"
        );
        assert_eq!(d_param(&registry, &parse("float*")), "float*");
    }

    #[test]
    fn const_types_use_d_syntax() {
        let registry = registry_with_device();
        assert_eq!(
            d_param(&registry, &parse("const D3D11_BUFFER_DESC *")),
            "const(D3D11_BUFFER_DESC)*"
        );
    }

    #[test]
    fn arrays_render_with_length() {
        assert_eq!(d_type(&parse("FLOAT [6]")), "float[6]");
    }

    #[test]
    fn guid_renders_as_aggregate_initializer() {
        let guid: Guid = "db6f6ddb-ac77-4e88-8253-819df9bbf140".parse().unwrap();
        assert_eq!(
            d_guid(&guid),
            "0xdb6f6ddb, 0xac77, 0x4e88, [0x82, 0x53, 0x81, 0x9d, 0xf9, 0xbb, 0xf1, 0x40]"
        );
    }

    #[test]
    fn windef_aliases_are_suppressed() {
        assert!(alias_is_suppressed("FLOAT", &parse("float")));
        assert!(!alias_is_suppressed("D3D11_RECT", &parse("RECT")));
    }
}

//! C# managed-interop backend.
//!
//! Emits one file per type (interfaces, structs, enums, aliases) plus a
//! per-header static class for free functions and preprocessor constants.
//! Splitting per type sidesteps type-ordering problems in the emitted
//! source. Interfaces become handle structs whose methods are
//! vtable-indexed proxy calls.

use crate::names::strip_enum_constant;
use crate::registry::InterfaceRegistry;
use crate::writer::Writer;
use crate::{prepare_output_root, GenerateError, Result};
use crossbind_clang::{
    Declarator, EnumDecl, Field, FieldType, FunctionDecl, Header, Method, Model, Node, NodeKind,
    Param, StructDecl, TypedefDecl,
};
use crossbind_common::module_stem;
use rustc_hash::FxHashSet;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Byte unit the explicit union layout advances per emitted field.
const FIELD_UNIT: usize = 4;

/// C# code generator.
///
/// The visited-module set lives on the generator so diamond includes emit
/// each module exactly once.
pub struct CsGenerator {
    visited: FxHashSet<String>,
}

impl CsGenerator {
    pub fn new() -> Self {
        Self {
            visited: FxHashSet::default(),
        }
    }

    /// Generate C# sources for every header reachable from `root`.
    ///
    /// Output lands under `<out_root>/<namespace>/<package_name>/`. With
    /// `multi_header` set, the entry header is a synthetic concatenation
    /// and only its includes are emitted.
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

        let mut emitter = CsEmitter {
            model,
            registry: InterfaceRegistry::build(model),
            dest,
            namespace: format!("{}.{}", namespace, package_name),
            visited: &mut self.visited,
        };
        emitter.emit_header(root_header, !multi_header)
    }
}

impl Default for CsGenerator {
    fn default() -> Self {
        Self::new()
    }
}

struct CsEmitter<'m> {
    model: &'m Model,
    registry: InterfaceRegistry,
    dest: PathBuf,
    namespace: String,
    visited: &'m mut FxHashSet<String>,
}

impl CsEmitter<'_> {
    fn emit_header(&mut self, header: &Header, emit_self: bool) -> Result<()> {
        let module = module_stem(&header.name).to_string();
        if !self.visited.insert(module.clone()) {
            return Ok(());
        }

        if emit_self {
            let mut functions: Vec<(&Node, &FunctionDecl)> = Vec::new();

            for id in &header.nodes {
                let node = self.model.node(*id);
                if node.name.is_empty() {
                    debug!(header = %header.name, "skipping anonymous declaration");
                    continue;
                }
                match &node.kind {
                    NodeKind::Enum(e) => {
                        self.write_type_file(&node.name, |w, _| emit_enum(w, &node.name, e))?
                    }
                    NodeKind::Typedef(t) => {
                        if alias_is_suppressed(&node.name, &t.target) {
                            debug!(alias = %node.name, "suppressed redundant alias");
                            continue;
                        }
                        self.write_type_file(&node.name, |w, _| emit_alias(w, &node.name, t))?;
                    }
                    NodeKind::Struct(s) => {
                        if node.is_forward {
                            continue;
                        }
                        // implementation classes are not binary interop surface
                        if node.name.starts_with('C') {
                            continue;
                        }
                        if self.emits_as_interface(s) {
                            self.write_type_file(&node.name, |w, this| {
                                this.emit_interface(w, node, s)
                            })?;
                        } else {
                            self.write_type_file(&node.name, |w, this| {
                                this.emit_struct(w, node, s)
                            })?;
                        }
                    }
                    NodeKind::Function(f) => functions.push((node, f)),
                }
            }

            if !functions.is_empty() || !header.macros.is_empty() {
                self.write_module_file(&module, header, &functions)?;
            }
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

    fn write_type_file<F>(&mut self, name: &str, body: F) -> Result<()>
    where
        F: FnOnce(&mut Writer, &mut Self),
    {
        let mut w = Writer::new();
        w.writeln("using System;");
        w.writeln("using System.Runtime.InteropServices;");
        w.writeln("using System.Numerics;");
        w.blank();
        w.writeln(&format!("namespace {} {{", self.namespace));
        w.blank();
        body(&mut w, self);
        w.blank();
        w.writeln("}");

        let path = self.dest.join(format!("{}.cs", name));
        info!(file = %path.display(), "writing");
        fs::write(path, w.into_string())?;
        Ok(())
    }

    fn write_module_file(
        &mut self,
        module: &str,
        header: &Header,
        functions: &[(&Node, &FunctionDecl)],
    ) -> Result<()> {
        let dll = format!("{}.dll", module);
        let mut w = Writer::new();
        w.writeln("using System;");
        w.writeln("using System.Runtime.InteropServices;");
        w.writeln("using System.Numerics;");
        w.blank();
        w.writeln(&format!("namespace {} {{", self.namespace));
        w.blank();
        w.writeln(&format!("public static class {} {{", module));
        w.indent();
        for m in &header.macros {
            w.writeln(&format!("public const int {} = {};", m.name, m.value));
        }
        if !header.macros.is_empty() && !functions.is_empty() {
            w.blank();
        }
        for (node, f) in functions {
            w.writeln(&format!("[DllImport(\"{}\")]", dll));
            w.writeln(&format!(
                "public static extern {} {}({});",
                cs_return(&f.ret),
                node.name,
                param_list(&self.registry, &f.params),
            ));
            w.blank();
        }
        w.dedent();
        w.writeln("}");
        w.blank();
        w.writeln("}");

        let path = self.dest.join(format!("{}.cs", module));
        info!(file = %path.display(), "writing");
        fs::write(path, w.into_string())?;
        Ok(())
    }

    /// Interface proxy: a handle struct whose methods resolve the function
    /// pointer at the method's vtable slot, cast it to a matching delegate
    /// and call it with the instance handle first.
    fn emit_interface(&self, w: &mut Writer, node: &Node, s: &StructDecl) {
        if let Some(iid) = &s.iid {
            w.writeln(&format!("[Guid(\"{}\")]", iid));
        }
        w.writeln(&format!("public struct {} {{", node.name));
        w.indent();
        w.writeln("public IntPtr Ptr;");

        let first_slot = self.registry.first_slot(s.base.as_deref());
        for (index, method) in s.methods.iter().enumerate() {
            w.blank();
            self.emit_proxy_method(w, method, first_slot + index);
        }

        w.dedent();
        w.writeln("}");
    }

    fn emit_proxy_method(&self, w: &mut Writer, method: &Method, slot: usize) {
        let ret = cs_return(&method.ret);
        let params = marshalled_params(&self.registry, &method.params);

        let signature: Vec<String> = params
            .iter()
            .map(|(name, ty)| format!("{} {}", ty, name))
            .collect();
        let mut args = vec!["Ptr".to_string()];
        args.extend(params.iter().map(|(name, ty)| {
            if ty.starts_with("ref ") {
                format!("ref {}", name)
            } else {
                name.clone()
            }
        }));

        w.writeln(&format!(
            "public {} {}({}) {{",
            ret,
            method.name,
            signature.join(", ")
        ));
        w.indent();
        w.writeln("var vtbl = Marshal.ReadIntPtr(Ptr);");
        w.writeln(&format!(
            "var fp = Marshal.ReadIntPtr(vtbl, {} * IntPtr.Size);",
            slot
        ));
        w.writeln(&format!(
            "var fn = Marshal.GetDelegateForFunctionPointer<{}Proc>(fp);",
            method.name
        ));
        if ret == "void" {
            w.writeln(&format!("fn({});", args.join(", ")));
        } else {
            w.writeln(&format!("return fn({});", args.join(", ")));
        }
        w.dedent();
        w.writeln("}");

        let mut delegate_params = vec!["IntPtr self".to_string()];
        delegate_params.extend(signature);
        w.writeln(&format!(
            "private delegate {} {}Proc({});",
            ret,
            method.name,
            delegate_params.join(", ")
        ));
    }

    fn emit_struct(&self, w: &mut Writer, node: &Node, s: &StructDecl) {
        if self.has_union_member(s) {
            w.writeln("[StructLayout(LayoutKind.Explicit)]");
            w.writeln(&format!("public struct {} {{", node.name));
            w.indent();
            let mut offset = 0;
            self.emit_explicit_fields(w, &s.fields, &mut offset);
            w.dedent();
            w.writeln("}");
        } else {
            w.writeln("[StructLayout(LayoutKind.Sequential, CharSet=CharSet.Unicode)]");
            w.writeln(&format!("public struct {} {{", node.name));
            w.indent();
            self.emit_sequential_fields(w, &s.fields);
            w.dedent();
            w.writeln("}");
        }
    }

    fn has_union_member(&self, s: &StructDecl) -> bool {
        s.is_union
            || s.fields.iter().any(|f| match &f.ty {
                FieldType::Nested(id) => match &self.model.node(*id).kind {
                    NodeKind::Struct(nested) => nested.is_union,
                    _ => false,
                },
                FieldType::Declare(_) => false,
            })
    }

    fn emit_sequential_fields(&self, w: &mut Writer, fields: &[Field]) {
        for field in fields {
            match &field.ty {
                FieldType::Declare(d) => {
                    let (attr, ty) = cs_field(d);
                    if let Some(attr) = attr {
                        w.writeln(&attr);
                    }
                    w.writeln(&format!("public {} {};", ty, field.name));
                }
                FieldType::Nested(id) => {
                    // anonymous aggregates flatten into the parent
                    if let NodeKind::Struct(nested) = &self.model.node(*id).kind {
                        self.emit_sequential_fields(w, &nested.fields);
                    }
                }
            }
        }
    }

    fn emit_explicit_fields(&self, w: &mut Writer, fields: &[Field], offset: &mut usize) {
        for field in fields {
            self.emit_explicit_field(w, field, offset);
        }
    }

    /// Every leaf lands at a manually tracked byte offset advancing by a
    /// fixed unit per field; union members share their union's start.
    fn emit_explicit_field(&self, w: &mut Writer, field: &Field, offset: &mut usize) {
        match &field.ty {
            FieldType::Declare(d) => {
                let (attr, ty) = cs_field(d);
                w.writeln(&format!("[FieldOffset({})]", offset));
                if let Some(attr) = attr {
                    w.writeln(&attr);
                }
                w.writeln(&format!("public {} {};", ty, field.name));
                *offset += FIELD_UNIT;
            }
            FieldType::Nested(id) => {
                let NodeKind::Struct(nested) = &self.model.node(*id).kind else {
                    return;
                };
                if nested.is_union {
                    let start = *offset;
                    let mut end = start;
                    for member in &nested.fields {
                        let mut local = start;
                        self.emit_explicit_field(w, member, &mut local);
                        end = end.max(local);
                    }
                    *offset = end;
                } else {
                    self.emit_explicit_fields(w, &nested.fields, offset);
                }
            }
        }
    }
}

/// Windows primitive name → C# counterpart.
/// https://docs.microsoft.com/en-us/windows/desktop/winprog/windows-data-types
fn cs_primitive(name: &str) -> &str {
    match name {
        "BYTE" | "UINT8" => "Byte",
        "INT" | "BOOL" | "HRESULT" | "int" | "long" | "LONG" => "Int32",
        "LARGE_INTEGER" | "LONGLONG" => "Int64",
        "USHORT" | "UINT16" | "WORD" => "UInt16",
        "UINT" | "DWORD" | "UINT32" | "ULONG" => "UInt32",
        "UINT64" | "ULONGLONG" => "UInt64",
        "FLOAT" | "float" => "Single",
        "DOUBLE" | "double" => "Double",
        "CHAR" | "char" => "SByte",
        "WCHAR" | "wchar_t" => "Char",
        "bool" => "Boolean",
        "HANDLE" | "HMODULE" | "HWND" | "HMONITOR" | "HDC" | "LPCSTR" | "LPSTR" | "LPVOID"
        | "LPCVOID" => "IntPtr",
        "SIZE_T" => "UIntPtr",
        "GUID" | "LUID" | "IID" | "REFIID" | "REFGUID" => "Guid",
        other => other,
    }
}

/// Parameter-position marshalling by pointer arity.
fn cs_param(registry: &InterfaceRegistry, decl: &Declarator) -> String {
    match decl {
        Declarator::Void { .. } => "void".to_string(),
        Declarator::Base { name, .. } => {
            if registry.is_interface(name) {
                // interface passed by value is still just its handle
                "IntPtr".to_string()
            } else {
                cs_primitive(name).to_string()
            }
        }
        Declarator::Array { length, target } => {
            // arrays decay to a reference in parameter position
            if *length == 4 && matches!(target.base_name(), Some("FLOAT") | Some("float")) {
                "ref Vector4".to_string()
            } else {
                match target.base_name() {
                    Some(name) => format!("ref {}", cs_primitive(name)),
                    None => "IntPtr".to_string(),
                }
            }
        }
        Declarator::Pointer { .. } => {
            let arity = decl.pointer_arity();
            match decl.pointee() {
                // a pointer to void carries no element type to reference
                Declarator::Void { .. } => match arity {
                    1 => "IntPtr".to_string(),
                    _ => "ref IntPtr".to_string(),
                },
                Declarator::Base { name, .. } => {
                    if registry.is_interface(name) {
                        match arity {
                            // opaque handle in, handle reference out
                            1 => "IntPtr".to_string(),
                            _ => "ref IntPtr".to_string(),
                        }
                    } else {
                        match arity {
                            1 => format!("ref {}", cs_primitive(name)),
                            _ => "ref IntPtr".to_string(),
                        }
                    }
                }
                _ => "IntPtr".to_string(),
            }
        }
    }
}

/// Return-position marshalling: values map through the primitive table,
/// any indirection collapses to an opaque handle.
fn cs_return(decl: &Declarator) -> String {
    match decl {
        Declarator::Void { .. } => "void".to_string(),
        Declarator::Base { name, .. } => cs_primitive(name).to_string(),
        Declarator::Pointer { .. } | Declarator::Array { .. } => "IntPtr".to_string(),
    }
}

/// Field-position marshalling. Returns an optional marshalling attribute
/// line plus the field type.
fn cs_field(decl: &Declarator) -> (Option<String>, String) {
    match decl {
        Declarator::Void { .. } => (None, "IntPtr".to_string()),
        Declarator::Base { name, .. } => (None, cs_primitive(name).to_string()),
        // pointers in field position are always opaque
        Declarator::Pointer { .. } => (None, "IntPtr".to_string()),
        Declarator::Array { length, target } => match target.base_name() {
            // wide-character buffers marshal as inline strings
            Some("WCHAR") | Some("wchar_t") => (
                Some(format!(
                    "[MarshalAs(UnmanagedType.ByValTStr, SizeConst={})]",
                    length
                )),
                "string".to_string(),
            ),
            Some(name) => (
                Some(format!(
                    "[MarshalAs(UnmanagedType.ByValArray, SizeConst={})]",
                    length
                )),
                format!("{}[]", cs_primitive(name)),
            ),
            None => (None, "IntPtr".to_string()),
        },
    }
}

fn marshalled_params(registry: &InterfaceRegistry, params: &[Param]) -> Vec<(String, String)> {
    params
        .iter()
        .enumerate()
        .map(|(i, p)| {
            let name = if p.name.is_empty() {
                format!("arg{}", i)
            } else {
                p.name.to_string()
            };
            (name, cs_param(registry, &p.ty))
        })
        .collect()
}

fn param_list(registry: &InterfaceRegistry, params: &[Param]) -> String {
    marshalled_params(registry, params)
        .iter()
        .map(|(name, ty)| format!("{} {}", ty, name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn emit_enum(w: &mut Writer, tag: &str, e: &EnumDecl) {
    w.writeln(&format!("public enum {} {{", tag));
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

fn emit_alias(w: &mut Writer, name: &str, t: &TypedefDecl) {
    w.writeln(&format!("public struct {} {{", name));
    w.indent();
    if name.starts_with("PFN_") {
        // function-pointer alias: only the pointer value crosses the boundary
        w.writeln("public IntPtr Value;");
    } else {
        let value_ty = match &t.target {
            Declarator::Base { name, .. } => cs_primitive(name).to_string(),
            Declarator::Void { .. } | Declarator::Pointer { .. } | Declarator::Array { .. } => {
                "IntPtr".to_string()
            }
        };
        w.writeln(&format!("public {} Value;", value_ty));
    }
    w.dedent();
    w.writeln("}");
}

/// An alias adds nothing when it maps to the same primitive as its target
/// or is a known region rename (`D2D1_...` restating `D2D_...`).
fn alias_is_suppressed(name: &str, target: &Declarator) -> bool {
    match target {
        Declarator::Base {
            name: target_name, ..
        } => {
            cs_primitive(name) == cs_primitive(target_name)
                || name.replace("D2D1_", "D2D_") == target_name.as_str()
        }
        _ => false,
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
    fn pointer_arity_distinguishes_marshalling() {
        let registry = registry_with_device();
        let double_iface = cs_param(&registry, &parse("ID3D11Device **"));
        let single_value = cs_param(&registry, &parse("float*"));
        assert_eq!(double_iface, "ref IntPtr");
        assert_eq!(single_value, "ref Single");
        assert_ne!(double_iface, single_value);
    }

    #[test]
    fn interface_single_pointer_is_opaque_handle() {
        let registry = registry_with_device();
        assert_eq!(cs_param(&registry, &parse("ID3D11Device *")), "IntPtr");
        assert_eq!(cs_param(&registry, &parse("IUnknown *")), "IntPtr");
    }

    #[test]
    fn void_pointers_are_always_handles() {
        let registry = registry_with_device();
        assert_eq!(cs_param(&registry, &parse("void *")), "IntPtr");
        assert_eq!(cs_param(&registry, &parse("const void *")), "IntPtr");
        assert_eq!(cs_param(&registry, &parse("void **")), "ref IntPtr");
    }

    #[test]
    fn float4_array_param_is_vector4() {
        let registry = registry_with_device();
        assert_eq!(cs_param(&registry, &parse("FLOAT [4]")), "ref Vector4");
        assert_eq!(cs_param(&registry, &parse("UINT [8]")), "ref UInt32");
    }

    #[test]
    fn array_fields_are_inline_buffers() {
        let (attr, ty) = cs_field(&parse("FLOAT [2]"));
        assert_eq!(
            attr.as_deref(),
            Some("[MarshalAs(UnmanagedType.ByValArray, SizeConst=2)]")
        );
        assert_eq!(ty, "Single[]");

        let (attr, ty) = cs_field(&parse("WCHAR [32]"));
        assert_eq!(
            attr.as_deref(),
            Some("[MarshalAs(UnmanagedType.ByValTStr, SizeConst=32)]")
        );
        assert_eq!(ty, "string");
    }

    #[test]
    fn pointer_fields_are_opaque() {
        let (attr, ty) = cs_field(&parse("ID3D11Device *"));
        assert!(attr.is_none());
        assert_eq!(ty, "IntPtr");
    }

    #[test]
    fn redundant_aliases_are_suppressed() {
        assert!(alias_is_suppressed("FLOAT", &parse("float")));
        assert!(alias_is_suppressed("D2D1_POINT_2F", &parse("D2D_POINT_2F")));
        assert!(!alias_is_suppressed("D3D11_RECT", &parse("RECT")));
        assert!(!alias_is_suppressed("PFN_CALLBACK", &parse("void *")));
    }
}

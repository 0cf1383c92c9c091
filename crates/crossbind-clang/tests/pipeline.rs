//! Two-pass pipeline tests over hand-built cursor trees.
//!
//! These exercise the declaration pass and the macro pass together against
//! the same header set, the way a generation run drives them.

use crossbind_clang::{
    build, resolve, Cursor, CursorKind, DeclareCache, FieldType, NodeKind,
};
use std::path::Path;

/// A miniature d3d11.h / dxgi.h pair: the entry header declares an
/// interface deriving from one declared in the included header, plus a
/// free function; the included header carries an enum and a struct.
fn declaration_tree() -> Cursor {
    Cursor::new(CursorKind::TranslationUnit)
        .with_child(
            Cursor::new(CursorKind::EnumDecl)
                .with_spelling("DXGI_FORMAT")
                .with_hash(1)
                .with_file("dxgi.h")
                .with_child(
                    Cursor::new(CursorKind::EnumConstantDecl)
                        .with_spelling("DXGI_FORMAT_UNKNOWN")
                        .with_enum_value(0),
                ),
        )
        .with_child(
            Cursor::new(CursorKind::StructDecl)
                .with_spelling("IDXGIObject")
                .with_hash(2)
                .with_file("dxgi.h")
                .with_child(Cursor::new(CursorKind::UnexposedAttr).with_tokens([
                    "MIDL_INTERFACE",
                    "(",
                    "\"aec22fb8-76f3-4639-9be0-28eb43a67a2e\"",
                    ")",
                ]))
                .with_child(Cursor::new(CursorKind::BaseSpecifier).with_type("IUnknown"))
                .with_child(
                    Cursor::new(CursorKind::Method)
                        .with_spelling("GetParent")
                        .with_child(Cursor::new(CursorKind::TypeRef).with_spelling("HRESULT"))
                        .with_child(
                            Cursor::new(CursorKind::ParmDecl)
                                .with_spelling("ppParent")
                                .with_type("void **"),
                        ),
                ),
        )
        .with_child(
            Cursor::new(CursorKind::StructDecl)
                .with_spelling("ID3D11Device")
                .with_hash(3)
                .with_file("d3d11.h")
                .with_child(Cursor::new(CursorKind::UnexposedAttr).with_tokens([
                    "MIDL_INTERFACE",
                    "(",
                    "\"db6f6ddb-ac77-4e88-8253-819df9bbf140\"",
                    ")",
                ]))
                .with_child(Cursor::new(CursorKind::BaseSpecifier).with_type("IDXGIObject"))
                .with_child(
                    Cursor::new(CursorKind::Method)
                        .with_spelling("CreateBuffer")
                        .with_child(Cursor::new(CursorKind::TypeRef).with_spelling("HRESULT"))
                        .with_child(
                            Cursor::new(CursorKind::ParmDecl)
                                .with_spelling("pDesc")
                                .with_type("const D3D11_BUFFER_DESC *"),
                        ),
                ),
        )
        .with_child(
            Cursor::new(CursorKind::LinkageSpec)
                .with_file("d3d11.h")
                .with_tokens(["extern", "\"C\"", "{"])
                .with_child(
                    Cursor::new(CursorKind::FunctionDecl)
                        .with_spelling("D3D11CreateDevice")
                        .with_hash(4)
                        .with_file("d3d11.h")
                        .with_child(
                            Cursor::new(CursorKind::TypeRef).with_spelling("HRESULT"),
                        )
                        .with_child(
                            Cursor::new(CursorKind::ParmDecl)
                                .with_spelling("ppDevice")
                                .with_type("ID3D11Device **"),
                        ),
                ),
        )
}

fn macro_tree() -> Cursor {
    Cursor::new(CursorKind::TranslationUnit)
        .with_child(
            Cursor::new(CursorKind::InclusionDirective)
                .with_hash(100)
                .with_file("d3d11.h")
                .with_tokens(["#", "include", "<", "dxgi", ".", "h", ">"]),
        )
        .with_child(
            Cursor::new(CursorKind::MacroDefinition)
                .with_spelling("D3D11_SDK_VERSION")
                .with_hash(101)
                .with_file("d3d11.h")
                .with_tokens(["D3D11_SDK_VERSION", "7"]),
        )
        .with_child(
            Cursor::new(CursorKind::MacroDefinition)
                .with_spelling("__D3D11_H__")
                .with_hash(102)
                .with_file("d3d11.h")
                .with_tokens(["__D3D11_H__"]),
        )
}

fn allow() -> Vec<String> {
    vec!["d3d11.h".to_string(), "dxgi.h".to_string()]
}

#[test]
fn two_pass_pipeline_builds_complete_model() {
    let mut cache = DeclareCache::new();
    let mut model = build(&declaration_tree(), &allow(), &mut cache).unwrap();
    resolve(&macro_tree(), &mut model, &allow());

    let d3d11 = model.header(Path::new("d3d11.h")).unwrap();
    assert_eq!(d3d11.nodes.len(), 2);
    assert_eq!(d3d11.includes, vec![std::path::PathBuf::from("dxgi.h")]);
    assert_eq!(d3d11.macros.len(), 1);
    assert_eq!(d3d11.macros[0].name, "D3D11_SDK_VERSION");

    let dxgi = model.header(Path::new("dxgi.h")).unwrap();
    assert_eq!(dxgi.nodes.len(), 2);

    let device = model.node(d3d11.nodes[0]);
    match &device.kind {
        NodeKind::Struct(s) => {
            assert!(s.is_interface());
            assert_eq!(s.base.as_deref(), Some("IDXGIObject"));
        }
        other => panic!("expected interface struct, got {:?}", other),
    }
}

#[test]
fn declarators_are_shared_through_the_cache() {
    let mut cache = DeclareCache::new();
    let model = build(&declaration_tree(), &allow(), &mut cache).unwrap();

    // the same spelling parsed anywhere yields structurally equal results
    let again = cache.parse("ID3D11Device **").unwrap();
    let d3d11 = model.header(Path::new("d3d11.h")).unwrap();
    let func = model.node(d3d11.nodes[1]);
    match &func.kind {
        NodeKind::Function(f) => assert_eq!(f.params[0].ty, again),
        other => panic!("expected function, got {:?}", other),
    }
}

#[test]
fn nested_aggregates_stay_reachable_from_fields() {
    let tree = Cursor::new(CursorKind::TranslationUnit).with_child(
        Cursor::new(CursorKind::StructDecl)
            .with_spelling("D2D_MATRIX_3X2_F")
            .with_hash(1)
            .with_file("d2d1.h")
            .with_child(
                Cursor::new(CursorKind::UnionDecl)
                    .with_child(
                        Cursor::new(CursorKind::StructDecl)
                            .with_child(
                                Cursor::new(CursorKind::FieldDecl)
                                    .with_spelling("m11")
                                    .with_type("float"),
                            )
                            .with_child(
                                Cursor::new(CursorKind::FieldDecl)
                                    .with_spelling("m12")
                                    .with_type("float"),
                            ),
                    )
                    .with_child(
                        Cursor::new(CursorKind::FieldDecl)
                            .with_spelling("m")
                            .with_type("float [6]"),
                    ),
            ),
    );

    let mut cache = DeclareCache::new();
    let model = build(&tree, &["d2d1.h".to_string()], &mut cache).unwrap();
    let header = model.header(Path::new("d2d1.h")).unwrap();
    let outer = model.node(header.nodes[0]);

    let NodeKind::Struct(outer_struct) = &outer.kind else {
        panic!("expected struct");
    };
    let FieldType::Nested(union_id) = &outer_struct.fields[0].ty else {
        panic!("expected nested union field");
    };
    let NodeKind::Struct(union_struct) = &model.node(*union_id).kind else {
        panic!("expected union node");
    };
    assert!(union_struct.is_union);
    assert_eq!(union_struct.fields.len(), 2);
    let FieldType::Nested(inner_id) = &union_struct.fields[0].ty else {
        panic!("expected nested struct inside union");
    };
    let NodeKind::Struct(inner) = &model.node(*inner_id).kind else {
        panic!("expected inner struct node");
    };
    assert_eq!(inner.fields.len(), 2);
}

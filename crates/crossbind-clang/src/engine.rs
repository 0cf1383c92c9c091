//! Cursor tree production via libclang.
//!
//! Everything behind this module boundary is the external parsing engine:
//! the model builder and resolver consume only the [`Cursor`] tree it
//! returns and never touch libclang themselves.

use crate::tree::{Cursor, CursorKind};
use miette::{miette, Result};
use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};
use std::ptr;

/// Engine that parses C++ headers through libclang.
pub struct ClangEngine {
    index: clang_sys::CXIndex,
}

impl ClangEngine {
    pub fn new() -> Result<Self> {
        unsafe {
            let index = clang_sys::clang_createIndex(0, 0);
            if index.is_null() {
                return Err(miette!("Failed to create clang index"));
            }
            Ok(Self { index })
        }
    }

    /// Parse a header into a cursor tree.
    ///
    /// `detailed_preprocessing` retains macro definitions and inclusion
    /// directives; macro visibility requires a second parse with this set,
    /// distinct from the declaration parse.
    pub fn parse_file(
        &self,
        path: &Path,
        include_dirs: &[PathBuf],
        detailed_preprocessing: bool,
    ) -> Result<Cursor> {
        if !path.exists() {
            return Err(miette!("No such file: {}", path.display()));
        }
        let path_str = path.to_string_lossy();
        let c_path =
            CString::new(path_str.as_ref()).map_err(|_| miette!("Invalid path: {}", path_str))?;

        let mut args: Vec<CString> = vec![
            CString::new("-x").unwrap(),
            CString::new("c++").unwrap(),
            CString::new("-DUNICODE=1").unwrap(),
            CString::new("-DNOMINMAX=1").unwrap(),
        ];
        for dir in include_dirs {
            args.push(CString::new(format!("-I{}", dir.display())).unwrap());
        }
        let c_args: Vec<*const std::os::raw::c_char> = args.iter().map(|s| s.as_ptr()).collect();

        let options = if detailed_preprocessing {
            clang_sys::CXTranslationUnit_DetailedPreprocessingRecord
        } else {
            clang_sys::CXTranslationUnit_None
        };

        unsafe {
            let tu = clang_sys::clang_parseTranslationUnit(
                self.index,
                c_path.as_ptr(),
                c_args.as_ptr(),
                c_args.len() as i32,
                ptr::null_mut(),
                0,
                options,
            );
            if tu.is_null() {
                return Err(miette!("Failed to parse file: {}", path_str));
            }

            let num_diagnostics = clang_sys::clang_getNumDiagnostics(tu);
            for i in 0..num_diagnostics {
                let diag = clang_sys::clang_getDiagnostic(tu, i);
                let severity = clang_sys::clang_getDiagnosticSeverity(diag);
                if severity >= clang_sys::CXDiagnostic_Error {
                    let spelling = clang_sys::clang_getDiagnosticSpelling(diag);
                    let msg = cx_string_to_string(spelling);
                    clang_sys::clang_disposeDiagnostic(diag);
                    clang_sys::clang_disposeTranslationUnit(tu);
                    return Err(miette!("Clang error: {}", msg));
                }
                clang_sys::clang_disposeDiagnostic(diag);
            }

            let cursor = clang_sys::clang_getTranslationUnitCursor(tu);
            let root = self.convert_cursor(tu, cursor);
            clang_sys::clang_disposeTranslationUnit(tu);
            Ok(root)
        }
    }

    /// Convert a libclang cursor (and its subtree) to our representation.
    fn convert_cursor(
        &self,
        tu: clang_sys::CXTranslationUnit,
        cursor: clang_sys::CXCursor,
    ) -> Cursor {
        unsafe {
            let cx_kind = clang_sys::clang_getCursorKind(cursor);
            let kind = convert_kind(cx_kind);

            let mut node = Cursor::new(kind.clone());
            node.spelling = cursor_spelling(cursor);
            node.hash = clang_sys::clang_hashCursor(cursor) as u64;
            node.canonical_hash =
                clang_sys::clang_hashCursor(clang_sys::clang_getCanonicalCursor(cursor)) as u64;

            let referenced = clang_sys::clang_getCursorReferenced(cursor);
            if clang_sys::clang_Cursor_isNull(referenced) == 0 {
                let ref_hash = clang_sys::clang_hashCursor(referenced) as u64;
                if ref_hash != node.hash {
                    node.referenced_hash = Some(ref_hash);
                }
            }

            let (file, line) = cursor_location(cursor);
            node.file = file;
            node.line = line;

            let ty = clang_sys::clang_getCursorType(cursor);
            node.type_spelling = cx_string_to_string(clang_sys::clang_getTypeSpelling(ty));
            node.type_is_typedef = ty.kind == clang_sys::CXType_Typedef;

            if cx_kind == clang_sys::CXCursor_EnumConstantDecl {
                node.enum_value = Some(clang_sys::clang_getEnumConstantDeclValue(cursor));
            }

            if wants_tokens(&kind) {
                node.tokens = cursor_tokens(tu, cursor);
            }

            let mut ctx = VisitData {
                engine: self,
                tu,
                children: Vec::new(),
            };

            extern "C" fn visitor(
                child: clang_sys::CXCursor,
                _parent: clang_sys::CXCursor,
                data: clang_sys::CXClientData,
            ) -> clang_sys::CXChildVisitResult {
                unsafe {
                    let ctx = &mut *(data as *mut VisitData);
                    if clang_sys::clang_Cursor_isNull(child) != 0 {
                        return clang_sys::CXChildVisit_Continue;
                    }
                    let node = ctx.engine.convert_cursor(ctx.tu, child);
                    ctx.children.push(node);
                    clang_sys::CXChildVisit_Continue
                }
            }

            clang_sys::clang_visitChildren(
                cursor,
                visitor,
                &mut ctx as *mut VisitData as clang_sys::CXClientData,
            );
            node.children = ctx.children;
            node
        }
    }
}

struct VisitData<'a> {
    engine: &'a ClangEngine,
    tu: clang_sys::CXTranslationUnit,
    children: Vec<Cursor>,
}

impl Drop for ClangEngine {
    fn drop(&mut self) {
        unsafe {
            clang_sys::clang_disposeIndex(self.index);
        }
    }
}

/// Kinds whose meaning lives in their token text rather than structure.
fn wants_tokens(kind: &CursorKind) -> bool {
    matches!(
        kind,
        CursorKind::LinkageSpec
            | CursorKind::UnexposedAttr
            | CursorKind::InclusionDirective
            | CursorKind::MacroDefinition
            | CursorKind::TypedefDecl
    )
}

fn convert_kind(kind: clang_sys::CXCursorKind) -> CursorKind {
    match kind {
        clang_sys::CXCursor_TranslationUnit => CursorKind::TranslationUnit,
        // extern "C" blocks surface as either of these depending on
        // libclang exposure
        clang_sys::CXCursor_UnexposedDecl | clang_sys::CXCursor_LinkageSpec => {
            CursorKind::LinkageSpec
        }
        clang_sys::CXCursor_StructDecl | clang_sys::CXCursor_ClassDecl => CursorKind::StructDecl,
        clang_sys::CXCursor_UnionDecl => CursorKind::UnionDecl,
        clang_sys::CXCursor_EnumDecl => CursorKind::EnumDecl,
        clang_sys::CXCursor_EnumConstantDecl => CursorKind::EnumConstantDecl,
        clang_sys::CXCursor_FieldDecl => CursorKind::FieldDecl,
        clang_sys::CXCursor_FunctionDecl => CursorKind::FunctionDecl,
        clang_sys::CXCursor_ParmDecl => CursorKind::ParmDecl,
        clang_sys::CXCursor_TypedefDecl => CursorKind::TypedefDecl,
        clang_sys::CXCursor_TypeRef => CursorKind::TypeRef,
        clang_sys::CXCursor_CompoundStmt => CursorKind::CompoundStmt,
        clang_sys::CXCursor_UnexposedAttr => CursorKind::UnexposedAttr,
        clang_sys::CXCursor_CXXBaseSpecifier => CursorKind::BaseSpecifier,
        clang_sys::CXCursor_CXXMethod => CursorKind::Method,
        clang_sys::CXCursor_Constructor => CursorKind::Constructor,
        clang_sys::CXCursor_Destructor => CursorKind::Destructor,
        clang_sys::CXCursor_ConversionFunction => CursorKind::ConversionFunction,
        clang_sys::CXCursor_CXXAccessSpecifier => CursorKind::AccessSpecifier,
        clang_sys::CXCursor_InclusionDirective => CursorKind::InclusionDirective,
        clang_sys::CXCursor_MacroDefinition => CursorKind::MacroDefinition,
        clang_sys::CXCursor_MacroExpansion => CursorKind::MacroInstantiation,
        other => CursorKind::Other(format!("CXCursorKind({})", other).into()),
    }
}

fn cursor_location(cursor: clang_sys::CXCursor) -> (Option<PathBuf>, u32) {
    unsafe {
        let loc = clang_sys::clang_getCursorLocation(cursor);
        let mut file: clang_sys::CXFile = ptr::null_mut();
        let mut line: u32 = 0;
        let mut column: u32 = 0;
        clang_sys::clang_getSpellingLocation(
            loc,
            &mut file,
            &mut line,
            &mut column,
            ptr::null_mut(),
        );
        if file.is_null() {
            return (None, line);
        }
        let name = cx_string_to_string(clang_sys::clang_getFileName(file));
        (Some(PathBuf::from(name)), line)
    }
}

fn cursor_tokens(tu: clang_sys::CXTranslationUnit, cursor: clang_sys::CXCursor) -> Vec<String> {
    unsafe {
        let range = clang_sys::clang_getCursorExtent(cursor);
        let mut tokens: *mut clang_sys::CXToken = ptr::null_mut();
        let mut count: u32 = 0;
        clang_sys::clang_tokenize(tu, range, &mut tokens, &mut count);
        if tokens.is_null() {
            return Vec::new();
        }
        let mut spellings = Vec::with_capacity(count as usize);
        for i in 0..count {
            let token = *tokens.add(i as usize);
            spellings.push(cx_string_to_string(clang_sys::clang_getTokenSpelling(
                tu, token,
            )));
        }
        clang_sys::clang_disposeTokens(tu, tokens, count);
        spellings
    }
}

/// Retrieve a cursor's spelling as a Rust String.
fn cursor_spelling(cursor: clang_sys::CXCursor) -> String {
    unsafe { cx_string_to_string(clang_sys::clang_getCursorSpelling(cursor)) }
}

/// Convert a CXString to a Rust String.
fn cx_string_to_string(cx_string: clang_sys::CXString) -> String {
    unsafe {
        let c_str = clang_sys::clang_getCString(cx_string);
        let result = if c_str.is_null() {
            String::new()
        } else {
            CStr::from_ptr(c_str).to_string_lossy().into_owned()
        };
        clang_sys::clang_disposeString(cx_string);
        result
    }
}

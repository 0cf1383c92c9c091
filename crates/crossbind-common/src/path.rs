//! Header-name normalization shared by the model builder, the macro
//! resolver and the backends.

use std::path::Path;

/// Normalize a header file name for allow-list and include-edge matching.
///
/// Windows headers are included with inconsistent casing (`D3D11.h` vs
/// `d3d11.h`), and the filesystem resolves both to the same file, so names
/// are folded to lowercase there. Case-sensitive platforms keep the name
/// as spelled.
pub fn normalize(name: &str) -> String {
    if cfg!(windows) {
        name.to_lowercase()
    } else {
        name.to_string()
    }
}

/// The normalized file name of a header path.
pub fn header_name(path: &Path) -> String {
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    normalize(&name)
}

/// The output module name for a header: file name minus the `.h` suffix.
pub fn module_stem(header_name: &str) -> &str {
    header_name
        .strip_suffix(".h")
        .or_else(|| header_name.strip_suffix(".hpp"))
        .unwrap_or(header_name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn stem_strips_header_suffix() {
        assert_eq!(module_stem("d3d11.h"), "d3d11");
        assert_eq!(module_stem("dxgi.hpp"), "dxgi");
        assert_eq!(module_stem("noext"), "noext");
    }

    #[test]
    fn header_name_uses_file_name() {
        let path = PathBuf::from("/usr/include/d3d11.h");
        assert_eq!(header_name(&path), normalize("d3d11.h"));
    }
}

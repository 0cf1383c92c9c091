//! Name normalization shared by the backends.

/// Strip the enum's tag from a constant name, keeping the separating
/// underscore when the remainder would otherwise start with a digit
/// (`DXGI_FORMAT_420_OPAQUE` → `_420_OPAQUE`, still a valid identifier).
/// Closely related tags differing by a trailing qualifier word also strip
/// (`D3D11_BIND_FLAG` tags constants named `D3D11_BIND_...`).
pub(crate) fn strip_enum_constant(tag: &str, name: &str) -> String {
    const TAG_SUFFIXES: [&str; 2] = ["_FLAG", "_MODE"];

    if let Some(stripped) = strip_with_prefix(tag, name) {
        return stripped;
    }
    for suffix in TAG_SUFFIXES {
        if let Some(base) = tag.strip_suffix(suffix) {
            if let Some(stripped) = strip_with_prefix(base, name) {
                return stripped;
            }
        }
    }
    name.to_string()
}

fn strip_with_prefix(prefix: &str, name: &str) -> Option<String> {
    let rest = name.strip_prefix(prefix)?;
    let mut chars = rest.chars();
    match (chars.next(), chars.next()) {
        (Some('_'), Some(c)) if c.is_ascii_digit() => Some(rest.to_string()),
        (Some('_'), Some(_)) => Some(rest[1..].to_string()),
        _ => None,
    }
}

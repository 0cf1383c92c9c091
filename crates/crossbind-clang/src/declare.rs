//! Declarator parsing.
//!
//! Turns a raw C type spelling (`"ID3D11Device**"`, `"const float [4]"`)
//! into a structured declarator tree. The grammar scans right to left:
//! trailing `[N]` makes an array, the right-most pointer/reference sigil
//! makes a pointer, and whatever remains is a base type or `void`.

use rustc_hash::FxHashMap;
use smol_str::SmolStr;
use std::fmt;
use thiserror::Error;

/// Result type for declarator parsing.
pub type Result<T> = std::result::Result<T, DeclareError>;

/// A type spelling the parser cannot safely turn into a declarator.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DeclareError {
    /// Three or more levels of indirection have no transparent mapping in
    /// any supported target, so the run stops rather than emit a guess.
    #[error("unsupported declarator shape (triple indirection): {0}")]
    TooManyIndirections(String),

    /// Residual tokens that match neither an array, a pointer run, a
    /// qualified base type nor `void`.
    #[error("unrecognized type spelling: {0}")]
    Unrecognized(String),
}

/// Aggregate tag prefix on a base type spelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateTag {
    Struct,
    Union,
}

/// Pointer-like sigil kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSigil {
    /// `*`
    Pointer,
    /// `&`
    Reference,
}

/// Structured representation of a C type spelling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Declarator {
    Void {
        is_const: bool,
    },
    Base {
        name: SmolStr,
        is_const: bool,
        tag: Option<AggregateTag>,
    },
    Pointer {
        sigil: RefSigil,
        is_const: bool,
        target: Box<Declarator>,
    },
    Array {
        length: usize,
        target: Box<Declarator>,
    },
}

impl Declarator {
    pub fn void() -> Self {
        Declarator::Void { is_const: false }
    }

    pub fn base(name: impl Into<SmolStr>) -> Self {
        Declarator::Base {
            name: name.into(),
            is_const: false,
            tag: None,
        }
    }

    /// Number of pointer/reference levels wrapping the innermost type.
    pub fn pointer_arity(&self) -> usize {
        match self {
            Declarator::Pointer { target, .. } => 1 + target.pointer_arity(),
            _ => 0,
        }
    }

    /// The declarator under all pointer/reference levels.
    pub fn pointee(&self) -> &Declarator {
        match self {
            Declarator::Pointer { target, .. } => target.pointee(),
            other => other,
        }
    }

    /// Base-type name, if this is a plain named type.
    pub fn base_name(&self) -> Option<&str> {
        match self {
            Declarator::Base { name, .. } => Some(name.as_str()),
            _ => None,
        }
    }
}

impl fmt::Display for Declarator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Declarator::Void { is_const: true } => write!(f, "(const void)"),
            Declarator::Void { is_const: false } => write!(f, "(void)"),
            Declarator::Base {
                name,
                is_const,
                tag,
            } => {
                write!(f, "(")?;
                if *is_const {
                    write!(f, "const ")?;
                }
                match tag {
                    Some(AggregateTag::Struct) => write!(f, "struct ")?,
                    Some(AggregateTag::Union) => write!(f, "union ")?,
                    None => {}
                }
                write!(f, "{})", name)
            }
            Declarator::Pointer {
                sigil,
                is_const,
                target,
            } => {
                let c = match sigil {
                    RefSigil::Pointer => '*',
                    RefSigil::Reference => '&',
                };
                if *is_const {
                    write!(f, "(const {}{})", c, target)
                } else {
                    write!(f, "({}{})", c, target)
                }
            }
            Declarator::Array { length, target } => write!(f, "{}[{}]", target, length),
        }
    }
}

/// Memoizing declarator parser.
///
/// The cache is a pure function of the input spelling and is never
/// invalidated during a run. It is an explicit context object owned by the
/// generation run, not process state; independent runs stay independent.
#[derive(Debug, Default)]
pub struct DeclareCache {
    memo: FxHashMap<String, Declarator>,
}

impl DeclareCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a type spelling, returning the memoized result when the same
    /// spelling was seen before.
    pub fn parse(&mut self, src: &str) -> Result<Declarator> {
        if let Some(found) = self.memo.get(src) {
            return Ok(found.clone());
        }
        let parsed = parse_declarator(src.trim())?;
        self.memo.insert(src.to_string(), parsed.clone());
        Ok(parsed)
    }

    pub fn len(&self) -> usize {
        self.memo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.memo.is_empty()
    }
}

fn parse_declarator(src: &str) -> Result<Declarator> {
    if src.is_empty() {
        return Err(DeclareError::Unrecognized(src.to_string()));
    }
    if longest_sigil_run(src) >= 3 {
        return Err(DeclareError::TooManyIndirections(src.to_string()));
    }

    if src.ends_with(']') {
        let open = src
            .rfind('[')
            .ok_or_else(|| DeclareError::Unrecognized(src.to_string()))?;
        let length: usize = src[open + 1..src.len() - 1]
            .trim()
            .parse()
            .map_err(|_| DeclareError::Unrecognized(src.to_string()))?;
        let target = parse_declarator(src[..open].trim())?;
        return Ok(Declarator::Array {
            length,
            target: Box::new(target),
        });
    }

    if let Some(last) = src.rfind(['*', '&']) {
        let sigil = if src.as_bytes()[last] == b'*' {
            RefSigil::Pointer
        } else {
            RefSigil::Reference
        };
        let is_const = src[last + 1..].contains("const");
        let target = parse_declarator(src[..last].trim_end())?;
        return Ok(Declarator::Pointer {
            sigil,
            is_const,
            target: Box::new(target),
        });
    }

    if src.contains("void") {
        return parse_void(src);
    }
    parse_base(src)
}

/// Longest run of pointer/reference sigils, treating whitespace between
/// sigils as part of the run (`"int * * *"` counts as three).
fn longest_sigil_run(src: &str) -> usize {
    let mut longest = 0;
    let mut run = 0;
    for c in src.chars() {
        if c == '*' || c == '&' {
            run += 1;
            longest = longest.max(run);
        } else if !c.is_whitespace() {
            run = 0;
        }
    }
    longest
}

fn parse_void(src: &str) -> Result<Declarator> {
    let words: Vec<&str> = src.split_whitespace().collect();
    match words.as_slice() {
        [_] => Ok(Declarator::Void { is_const: false }),
        ["const", _] => Ok(Declarator::Void { is_const: true }),
        _ => Err(DeclareError::Unrecognized(src.to_string())),
    }
}

fn parse_base(src: &str) -> Result<Declarator> {
    let words: Vec<&str> = src.split_whitespace().collect();
    match words.as_slice() {
        [] => Err(DeclareError::Unrecognized(src.to_string())),
        ["struct", rest @ ..] if !rest.is_empty() => Ok(Declarator::Base {
            name: rest.join(" ").into(),
            is_const: false,
            tag: Some(AggregateTag::Struct),
        }),
        ["union", rest @ ..] if !rest.is_empty() => Ok(Declarator::Base {
            name: rest.join(" ").into(),
            is_const: false,
            tag: Some(AggregateTag::Union),
        }),
        // the enum's own name is the type
        ["enum", name] => Ok(Declarator::Base {
            name: (*name).into(),
            is_const: false,
            tag: None,
        }),
        [name] => Ok(Declarator::Base {
            name: (*name).into(),
            is_const: false,
            tag: None,
        }),
        ["const", name] => Ok(Declarator::Base {
            name: (*name).into(),
            is_const: true,
            tag: None,
        }),
        _ => Err(DeclareError::Unrecognized(src.to_string())),
    }
}

use clap::{Parser, Subcommand, ValueEnum};
use crossbind_clang::{
    ClangEngine, Cursor, FieldType, Header, Model, NodeKind,
};
use crossbind_codegen::{CsGenerator, DlangGenerator};
use miette::{miette, Result};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Parser)]
#[command(name = "crossbind")]
#[command(author, version, about = "Generate interop bindings from C/C++ headers")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Dump the raw cursor tree of a header
    Debug {
        /// Header to parse
        entrypoint: PathBuf,

        /// Additional include directories
        #[arg(short = 'I', long)]
        include_dir: Vec<PathBuf>,
    },

    /// Build the header model and print its declarations
    Parse {
        /// Header to parse
        entrypoint: PathBuf,

        /// Header names to include in the model
        #[arg(short, long)]
        include: Vec<String>,

        /// Additional include directories
        #[arg(short = 'I', long)]
        include_dir: Vec<PathBuf>,
    },

    /// Generate bindings for a target language
    Gen {
        /// Header to parse
        entrypoint: PathBuf,

        /// Output directory root
        #[arg(short, long)]
        outfolder: PathBuf,

        /// Header names to include in the model
        #[arg(short, long)]
        include: Vec<String>,

        /// Additional include directories
        #[arg(short = 'I', long)]
        include_dir: Vec<PathBuf>,

        /// Code generator
        #[arg(short, long)]
        generator: Generator,

        /// Kit name used in the package name (defaults to the entry's
        /// grandparent directory name)
        #[arg(long)]
        kit_name: Option<String>,

        /// Vendor namespace the package nests under
        #[arg(long)]
        namespace: Option<String>,

        /// Treat the entry file as a synthetic concatenation: emit only
        /// the headers it includes
        #[arg(long)]
        multi_header: bool,
    },
}

#[derive(Clone, Copy, ValueEnum)]
enum Generator {
    Csharp,
    Dlang,
}

fn main() -> Result<()> {
    miette::set_hook(Box::new(|_| {
        Box::new(
            miette::MietteHandlerOpts::new()
                .terminal_links(true)
                .unicode(true)
                .context_lines(3)
                .build(),
        )
    }))?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Debug {
            entrypoint,
            include_dir,
        } => {
            let engine = ClangEngine::new()?;
            let tree = engine.parse_file(&entrypoint, &include_dir, false)?;
            for child in &tree.children {
                dump_cursor(child, "", &entrypoint);
            }
        }

        Commands::Parse {
            entrypoint,
            include,
            include_dir,
        } => {
            let model = crossbind_clang::parse_header(&entrypoint, &include, &include_dir)?;
            let root = model
                .header(&resolve_entry(&model, &entrypoint))
                .ok_or_else(|| miette!("entry header produced no declarations"))?;
            let mut seen = HashSet::new();
            print_header(&model, root, &mut seen);
        }

        Commands::Gen {
            entrypoint,
            outfolder,
            include,
            include_dir,
            generator,
            kit_name,
            namespace,
            multi_header,
        } => {
            debug!("parse...");
            let model = crossbind_clang::parse_header(&entrypoint, &include, &include_dir)?;
            let root = resolve_entry(&model, &entrypoint);

            let kit_name = kit_name.unwrap_or_else(|| derive_kit_name(&entrypoint));
            let package_name = format!("build_{}", kit_name.replace('.', "_"));

            debug!("generate...");
            match generator {
                Generator::Csharp => {
                    let namespace = namespace.unwrap_or_else(|| "WindowsKits".to_string());
                    CsGenerator::new()
                        .generate(
                            &model,
                            &root,
                            &outfolder,
                            &package_name,
                            &namespace,
                            multi_header,
                        )
                        .map_err(|e| miette!("{}", e))?;
                }
                Generator::Dlang => {
                    let namespace = namespace.unwrap_or_else(|| "windowskits".to_string());
                    DlangGenerator::new()
                        .generate(
                            &model,
                            &root,
                            &outfolder,
                            &package_name,
                            &namespace,
                            multi_header,
                        )
                        .map_err(|e| miette!("{}", e))?;
                }
            }
        }
    }

    Ok(())
}

/// The model keys headers by the path the engine reported, which may
/// differ in spelling from the CLI argument.
fn resolve_entry(model: &Model, entrypoint: &Path) -> PathBuf {
    let entry_name = crossbind_common::header_name(entrypoint);
    model
        .headers()
        .find(|h| h.name == entry_name)
        .map(|h| h.path.clone())
        .unwrap_or_else(|| entrypoint.to_path_buf())
}

/// Kit naming convention: headers live under `<kit>/um/d3d11.h`.
fn derive_kit_name(entrypoint: &Path) -> String {
    entrypoint
        .parent()
        .and_then(Path::parent)
        .and_then(Path::file_name)
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "headers".to_string())
}

fn dump_cursor(c: &Cursor, indent: &str, entry: &Path) {
    if c.file.as_deref() != Some(entry) {
        return;
    }

    let referenced = c
        .referenced_hash
        .map(|h| format!(" => {:#010x}", h))
        .unwrap_or_default();
    let canonical = if c.canonical_hash != c.hash {
        format!(" => {:#010x} (forward decl)", c.canonical_hash)
    } else {
        String::new()
    };
    println!(
        "{:#010x}:{} {:?}: {}{}{}",
        c.hash, indent, c.kind, c.spelling, referenced, canonical
    );

    let child_indent = format!("{}  ", indent);
    for child in &c.children {
        dump_cursor(child, &child_indent, entry);
    }
}

/// Print every header's surviving declarations, includes first.
fn print_header(model: &Model, header: &Header, seen: &mut HashSet<PathBuf>) {
    if !seen.insert(header.path.clone()) {
        return;
    }
    for include in &header.includes {
        if let Some(included) = model.header(include) {
            print_header(model, included, seen);
        }
    }

    println!("#### {} ####", header.path.display());
    for id in &header.nodes {
        let node = model.node(*id);
        if node.is_forward {
            continue;
        }
        match &node.kind {
            NodeKind::Struct(s) => {
                let tag = if s.is_interface() {
                    "interface"
                } else if s.is_union {
                    "union"
                } else {
                    "struct"
                };
                match &s.base {
                    Some(base) => println!("{} {}: {} {{", tag, node.name, base),
                    None => println!("{} {} {{", tag, node.name),
                }
                for field in &s.fields {
                    match &field.ty {
                        FieldType::Declare(d) => println!("  {} {};", d, field.name),
                        FieldType::Nested(id) => {
                            println!("  {} {};", model.node(*id).name, field.name)
                        }
                    }
                }
                for method in &s.methods {
                    let params: Vec<String> = method
                        .params
                        .iter()
                        .map(|p| format!("{}: {}", p.name, p.ty))
                        .collect();
                    println!("  {}({}) -> {};", method.name, params.join(", "), method.ret);
                }
                println!("}}");
            }
            NodeKind::Enum(e) => {
                println!("enum {} {{", node.name);
                for value in &e.values {
                    println!("  {} = {:#010x},", value.name, value.value);
                }
                println!("}}");
            }
            NodeKind::Function(f) => {
                let params: Vec<String> = f
                    .params
                    .iter()
                    .map(|p| format!("{}: {}", p.name, p.ty))
                    .collect();
                println!("{}({}) -> {};", node.name, params.join(", "), f.ret);
            }
            NodeKind::Typedef(t) => println!("{} = {}", node.name, t.target),
        }
    }
    println!();
}

// Ferric driver: runs the middle-end stages over a parsed crate.
//
// The parser collaborator hands the AST over as JSON; this binary
// selects the target, expands, resolves, and type-checks the crate, then
// answers layout queries for every concrete type definition. The typed
// tree can be dumped back out as JSON for the MIR stages.

use anyhow::{Context, Result};
use clap::Parser;
use ferric_ast::{Crate, Edition, Item, Module, TypeRef};
use ferric_diagnostics::{DiagnosticEngine, Fatal};
use ferric_expand::{expand_crate, CfgState, Registry, TokenReparser};
use ferric_layout::{builtin_cfg, CfgEntry, LayoutEngine, LayoutError, TargetSpec};
use ferric_resolve::resolve_crate;
use ferric_typeck::check_crate;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "ferric", about = "Ferric compiler middle-end driver", version)]
struct Cli {
    /// Serialised AST of the crate to compile (JSON)
    input: PathBuf,

    /// Target triple or path to a target description file
    #[arg(long, default_value = "x86_64-linux-gnu")]
    target: String,

    /// Additional cfg atoms: NAME or NAME=VALUE (repeatable)
    #[arg(long = "cfg")]
    cfgs: Vec<String>,

    /// Language edition
    #[arg(long, default_value = "2015")]
    edition: String,

    /// Collect #[test] functions into the crate's test list
    #[arg(long)]
    test: bool,

    /// Write the resolved, typed tree to this path
    #[arg(long)]
    dump_hir: Option<PathBuf>,
}

fn build_cfg_state(spec: &TargetSpec, extra: &[String]) -> CfgState {
    let mut cfg = CfgState::new();
    for entry in builtin_cfg(spec) {
        match entry {
            CfgEntry::Flag(name) => cfg.set_flag(&name),
            CfgEntry::Value(name, value) => cfg.set_value(&name, &value),
            CfgEntry::Multi(name, values) => cfg.set_multi_value(&name, values),
        }
    }
    for atom in extra {
        match atom.split_once('=') {
            Some((name, value)) => cfg.set_value(name.trim(), value.trim().trim_matches('"')),
            None => cfg.set_flag(atom.trim()),
        }
    }
    cfg
}

/// Report a fatal diagnostic and terminate with a failing exit code
fn bail_fatal(diag: &DiagnosticEngine, fatal: Fatal) -> ! {
    eprintln!("{}", fatal.diagnostic);
    diag.print_all();
    diag.print_summary();
    std::process::exit(1);
}

/// Ask the layout engine about every concrete type definition, so repr
/// problems surface before MIR construction.
fn check_layouts(krate: &Crate, spec: &TargetSpec) -> Result<(), Fatal> {
    let engine = LayoutEngine::new(krate, spec);
    let mut queue: Vec<&Module> = vec![&krate.root];
    while let Some(module) = queue.pop() {
        for entry in &module.items {
            let is_type_def = matches!(
                entry.item,
                Item::Struct(_) | Item::Enum(_) | Item::Union(_)
            );
            if !is_type_def {
                if let Item::Module(child) = &entry.item {
                    queue.push(child);
                }
                continue;
            }
            let item_path = module.path.child(&entry.name);
            let ty = TypeRef::path(ferric_ast::Path {
                class: ferric_ast::PathClass::Absolute {
                    krate: item_path.krate.clone(),
                    nodes: item_path
                        .nodes
                        .iter()
                        .map(|n| ferric_ast::PathNode::new(n))
                        .collect(),
                },
                bindings: ferric_ast::Bindings {
                    type_ns: match &entry.item {
                        Item::Enum(_) => ferric_ast::TypeBinding::Enum(item_path.clone()),
                        Item::Union(_) => ferric_ast::TypeBinding::Union(item_path.clone()),
                        _ => ferric_ast::TypeBinding::Struct(item_path.clone()),
                    },
                    value_ns: ferric_ast::ValueBinding::Unbound,
                },
            });
            match engine.type_repr(&ty) {
                Ok(repr) => {
                    log::debug!(
                        "layout {}: size={:?} align={}",
                        item_path,
                        repr.size,
                        repr.align
                    );
                }
                // Generic definitions have no layout of their own;
                // their instantiations are queried on demand
                Err(LayoutError::Generic) => {}
                Err(err) => {
                    return Err(Fatal::new(
                        entry.span.clone(),
                        err.code(),
                        err.to_string(),
                    ));
                }
            }
        }
    }
    Ok(())
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    let spec = match TargetSpec::from_selector(&cli.target) {
        Ok(spec) => spec,
        Err(err) => {
            let fatal = Fatal::new(
                ferric_diagnostics::Span::unknown(),
                match err {
                    ferric_layout::TargetError::UnknownTarget(_) => {
                        ferric_diagnostics::error_codes::UNKNOWN_TARGET
                    }
                    _ => ferric_diagnostics::error_codes::BAD_TARGET_FILE,
                },
                err.to_string(),
            );
            bail_fatal(&DiagnosticEngine::new(), fatal);
        }
    };
    log::info!("target: {spec}");

    let text = std::fs::read_to_string(&cli.input)
        .with_context(|| format!("cannot read {}", cli.input.display()))?;
    let mut krate: Crate = serde_json::from_str(&text)
        .with_context(|| format!("cannot parse AST from {}", cli.input.display()))?;

    krate.edition = match cli.edition.as_str() {
        "2015" => Edition::E2015,
        "2018" => Edition::E2018,
        other => anyhow::bail!("unknown edition `{other}`"),
    };
    krate.test_harness |= cli.test;

    let cfg = build_cfg_state(&spec, &cli.cfgs);
    let registry = Registry::with_builtins();
    let reparser = TokenReparser::new();
    let mut diag = DiagnosticEngine::new();

    log::info!("stage: expansion");
    if let Err(err) = expand_crate(&mut krate, &registry, &cfg, &reparser, &mut diag) {
        bail_fatal(&diag, err.into());
    }

    log::info!("stage: resolution");
    if let Err(err) = resolve_crate(&mut krate) {
        bail_fatal(&diag, err.into());
    }

    log::info!("stage: type inference");
    if let Err(err) = check_crate(&mut krate) {
        bail_fatal(&diag, err.into());
    }

    log::info!("stage: layout");
    if let Err(fatal) = check_layouts(&krate, &spec) {
        bail_fatal(&diag, fatal);
    }

    if krate.test_harness {
        log::info!("collected {} test(s)", krate.tests.len());
    }

    if let Some(out) = &cli.dump_hir {
        let json = serde_json::to_string_pretty(&krate).context("serialising typed tree")?;
        std::fs::write(out, json).with_context(|| format!("cannot write {}", out.display()))?;
        log::info!("typed tree written to {}", out.display());
    }

    diag.print_all();
    diag.print_summary();
    Ok(())
}

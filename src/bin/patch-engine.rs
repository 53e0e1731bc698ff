use std::fs::{self, File};
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use patch_engine::{engine, Layout};
use tracing_subscriber::EnvFilter;

fn usage() -> &'static str {
    "Usage:\n  patch-engine apply <installation_root>\n  patch-engine diff <installation_root>\n  patch-engine verify <installation_root> [--verbose]\n  patch-engine drift <installation_root>"
}

fn main() -> Result<()> {
    let args: Vec<String> = std::env::args().skip(1).collect();

    match args.as_slice() {
        [cmd, root] if cmd == "apply" => run_apply(Path::new(root)),
        [cmd, root] if cmd == "diff" => run_diff(Path::new(root)),
        [cmd, root] if cmd == "verify" => run_verify(Path::new(root), false),
        [cmd, root, flag] if cmd == "verify" && flag == "--verbose" => {
            run_verify(Path::new(root), true)
        }
        [cmd, root] if cmd == "drift" => run_drift(Path::new(root)),
        _ => bail!(usage()),
    }
}

/// Route engine output to the operation log under `logs/`.
fn init_logging(layout: &Layout) -> Result<()> {
    let log_path = layout.patch_log_path();
    if let Some(parent) = log_path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("creating log directory '{}'", parent.display()))?;
    }
    let log_file = File::options()
        .create(true)
        .append(true)
        .open(&log_path)
        .with_context(|| format!("opening operation log '{}'", log_path.display()))?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(Arc::new(log_file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn run_apply(root: &Path) -> Result<()> {
    let layout = Layout::discover(root)?;
    init_logging(&layout)?;

    // Launcher flow: report changes, apply from the pristine base, verify.
    let diff = engine::compute_overlay_diff(&layout)?;
    let report = engine::apply_overlays(&layout)?;
    let warnings = engine::verify_integrity(&layout, true)?;

    if report.bootstrapped {
        println!("bootstrapped backup of the live directory");
    }
    println!(
        "applied {} overlay(s) ({} new, {} reverted since last run)",
        report.applied.len(),
        diff.added.len(),
        diff.reverted.len()
    );
    if !warnings.is_empty() {
        println!(
            "verification found {} problem(s); see {}",
            warnings.len(),
            layout.patch_log_path().display()
        );
    }
    Ok(())
}

fn run_diff(root: &Path) -> Result<()> {
    let layout = Layout::discover(root)?;
    init_logging(&layout)?;

    let diff = engine::compute_overlay_diff(&layout)?;
    for name in &diff.added {
        println!("added\t{name}");
    }
    for name in &diff.reverted {
        println!("reverted\t{name}");
    }
    if !diff.is_changed() {
        println!("no overlay changes");
    }
    Ok(())
}

fn run_verify(root: &Path, verbose: bool) -> Result<()> {
    let layout = Layout::discover(root)?;
    init_logging(&layout)?;

    let warnings = engine::verify_integrity(&layout, verbose)?;
    if warnings.is_empty() {
        println!("verification passed");
    } else {
        for warning in &warnings {
            println!("warning\t{warning}");
        }
    }
    Ok(())
}

fn run_drift(root: &Path) -> Result<()> {
    let layout = Layout::discover(root)?;
    init_logging(&layout)?;

    if engine::has_drifted(&layout)? {
        println!("drifted");
    } else {
        println!("clean");
    }
    Ok(())
}

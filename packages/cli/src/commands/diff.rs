use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::fs;
use std::path::{Path, PathBuf};
use tether_vdom::{diff as diff_trees, LiveTree, Patch, PatchEngine, VNode};

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Tree before the change (JSON)
    pub old: PathBuf,

    /// Tree after the change (JSON)
    pub new: PathBuf,

    /// Apply the patches to the old tree and check the result
    #[arg(long)]
    pub verify: bool,
}

fn read_tree(path: &Path) -> Result<VNode> {
    let content = fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("{} is not a tree", path.display()))
}

/// Patches turning `old` into `new`, and whether applying them reproduces `new`.
pub fn diff_and_verify(old: &VNode, new: &VNode) -> (Vec<Patch>, bool) {
    let patches = diff_trees(old, new);
    let mut tree = LiveTree::new(old);
    let report = PatchEngine::new().apply(&mut tree, &patches);
    let matches = report.is_success() && tree.snapshot(tree.root()).as_ref() == Some(new);
    (patches, matches)
}

pub fn diff(args: DiffArgs, cwd: &Path) -> Result<()> {
    let old = read_tree(&cwd.join(&args.old))?;
    let new = read_tree(&cwd.join(&args.new))?;

    let (patches, matches) = diff_and_verify(&old, &new);
    println!("{}", serde_json::to_string_pretty(&patches)?);

    if args.verify {
        if matches {
            eprintln!("{} {} patches reproduce the new tree", "✓".green(), patches.len());
        } else {
            eprintln!("{} patches do not reproduce the new tree", "✗".red());
            std::process::exit(1);
        }
    }

    Ok(())
}

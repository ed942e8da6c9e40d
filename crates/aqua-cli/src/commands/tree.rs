//! `aqua log` and `aqua verify`.

use super::VerifyArgs;
use crate::files::DirectoryFiles;
use anyhow::{Context, Result};
use aqua_model::{AquaTree, Revision, RevisionKind, Structure};
use aqua_prov::{
    NodeStatus, TreeCollection, VerificationGraphData, Verifier, VerifierConfig,
};
use camino::{Utf8Path, Utf8PathBuf};
use colored::Colorize;
use tracing::debug;

fn load_tree(file: &Utf8Path) -> Result<AquaTree> {
    AquaTree::load(file).with_context(|| format!("failed to load aqua tree from {file}"))
}

/// Handle `aqua log`.
pub fn cmd_log(file: &Utf8Path) -> Result<()> {
    let tree = load_tree(file)?;
    if tree.is_empty() {
        println!("{}", "Tree is empty".yellow());
        return Ok(());
    }

    let structure = tree.derive_structure();
    println!("{}", "Aqua Tree".bold().underline());
    println!("{}: {}", "File".bold(), file);
    println!("{}: {}", "Revisions".bold(), tree.len());
    println!("{}: {}", "Roots".bold(), structure.roots.len());
    if let Some(latest) = tree.latest(Default::default()) {
        println!("{}: {}", "Latest".bold(), latest);
    }
    println!();

    for root in &structure.roots {
        log_branch(&tree, &structure, root);
    }
    for hash in &structure.unreachable {
        println!("{} {} {}", "!".red().bold(), hash, "(unreachable: predecessor cycle)".red());
    }
    Ok(())
}

fn log_branch(tree: &AquaTree, structure: &Structure, root: &str) {
    let mut stack = vec![(root, 0)];
    while let Some((hash, depth)) = stack.pop() {
        let Some(revision) = tree.get(hash) else {
            continue;
        };
        log_revision(tree, hash, revision, depth);
        let children = structure.children_of(hash);
        let child_depth = if children.len() > 1 { depth + 1 } else { depth };
        stack.extend(children.iter().rev().map(|child| (child.as_str(), child_depth)));
    }
}

fn log_revision(tree: &AquaTree, hash: &str, revision: &Revision, depth: usize) {
    let indent = "  ".repeat(depth);
    println!(
        "{indent}{} {}",
        revision.revision_type().to_string().bold().cyan(),
        hash
    );
    println!("{indent}  {}: {}", "Timestamp".bold(), revision.local_timestamp);
    if !revision.is_genesis() {
        println!("{indent}  {}: {}", "Previous".bold(), revision.previous_verification_hash);
    }
    match &revision.kind {
        RevisionKind::File(file) => {
            if let Some(name) = tree.file_name(hash).or_else(|| tree.file_name(&file.file_hash)) {
                println!("{indent}  {}: {}", "Name".bold(), name);
            }
            println!("{indent}  {}: {}", "File Hash".bold(), file.file_hash);
        }
        RevisionKind::Signature(sig) => {
            println!(
                "{indent}  {}: {} ({} item(s))",
                "Signer".bold(),
                sig.signature_public_key.green(),
                sig.signature.signatures.len()
            );
        }
        RevisionKind::Witness(w) => {
            println!(
                "{indent}  {}: {} on {}",
                "Anchor".bold(),
                w.witness_transaction_hash,
                w.witness_network
            );
        }
        RevisionKind::Form(form) => {
            let keys: Vec<&str> = form.form_keys().map(|(k, _)| k.as_str()).collect();
            println!("{indent}  {}: [{}]", "Fields".bold(), keys.join(", "));
        }
        RevisionKind::Link(link) => {
            for target in &link.link_verification_hashes {
                println!("{indent}  {}: {}", "Links".bold(), target);
            }
        }
    }
}

/// Handle `aqua verify`. Returns whether the tree verified.
pub async fn cmd_verify(args: &VerifyArgs) -> Result<bool> {
    let tree = load_tree(&args.file)?;

    let mut config = match &args.config {
        Some(path) => VerifierConfig::load(path)
            .with_context(|| format!("failed to load verifier config from {path}"))?,
        None => VerifierConfig::default(),
    };
    if args.offline {
        config.require_anchor_confirmation = false;
    }

    let files_root = match &args.files {
        Some(dir) => dir.clone(),
        None => args
            .file
            .parent()
            .filter(|p| !p.as_str().is_empty())
            .map(Utf8Path::to_path_buf)
            .unwrap_or_else(|| Utf8PathBuf::from(".")),
    };
    let mut linked = TreeCollection::default();
    for path in &args.linked {
        linked.push(load_tree(path)?);
    }
    debug!(files = %files_root, linked = linked.len(), "configured verifier");

    let verifier = Verifier::builder()
        .config(config)
        .files(DirectoryFiles::new(files_root))
        .linked_trees(linked)
        .build();

    if args.all {
        let forest = verifier
            .build_forest(&tree)
            .await
            .context("verification aborted")?;
        if args.json {
            println!("{}", serde_json::to_string_pretty(&forest)?);
        } else {
            for root in &forest.roots {
                print_graph(root, 0);
            }
            for hash in &forest.unreachable {
                println!(
                    "{} {} {}",
                    "✗".red().bold(),
                    hash,
                    "unreachable (predecessor cycle)".red()
                );
            }
            print_summary(forest.flatten().len(), forest.overall_success());
        }
        return Ok(forest.overall_success());
    }

    let report = verifier
        .build(&tree, args.hash.as_deref())
        .await
        .context("verification aborted")?;
    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_graph(&report, 0);
        print_summary(report.flatten().len(), report.overall_success());
    }
    Ok(report.overall_success())
}

/// Print a report depth-first; linked trees are listed before successors.
fn print_graph(root: &VerificationGraphData, depth: usize) {
    // (node, depth, whether it is the root of a linked tree)
    let mut stack = vec![(root, depth, false)];
    while let Some((node, depth, linked)) = stack.pop() {
        if linked {
            println!("{}    {}", "  ".repeat(depth - 3), "linked tree:".dimmed());
        }
        let indent = "  ".repeat(depth);
        let mark = match node.status {
            NodeStatus::Valid => "✓".green().bold(),
            NodeStatus::Invalid => "✗".red().bold(),
            NodeStatus::Error | NodeStatus::Pending => "?".yellow().bold(),
        };
        println!("{indent}{mark} {} {}", node.revision_type.to_string().bold(), node.hash);
        for failure in &node.failures {
            println!("{indent}    {}: {}", failure.reason.to_string().red(), failure.detail);
        }

        let successors = &node.verification_graph_data;
        let child_depth = if successors.len() > 1 { depth + 1 } else { depth };
        stack.extend(successors.iter().rev().map(|child| (child, child_depth, false)));
        let links = node.link_verification_graph_data.iter().rev();
        stack.extend(links.map(|graph| (graph, depth + 3, true)));
    }
}

fn print_summary(nodes: usize, success: bool) {
    println!();
    println!("{}", "Summary:".bold().underline());
    println!("  {}: {}", "Revisions".bold(), nodes);
    let status = if success {
        "VALID".green().bold()
    } else {
        "INVALID".red().bold()
    };
    println!("  {}: {}", "Status".bold(), status);
}

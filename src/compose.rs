use crate::{
    blocks::{Block, BlockArena, BlockFile, BlockResolutionError, FileKind},
    manifest::TemplateSpec,
    vfs::{FileDescriptor, Node, VirtualFileTree},
};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
#[error("Blocks '{first}' and '{second}' both produce '{path}'")]
#[diagnostic(
    code(stratum::compose::conflict),
    help("Blocks never override each other; remove the path from one of them")
)]
pub struct CompositionConflictError {
    pub path: PathBuf,
    pub first: String,
    pub second: String,
}

#[derive(Debug, Error, Diagnostic)]
pub enum ComposeError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Block(#[from] BlockResolutionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Conflict(#[from] CompositionConflictError),
}

/// Merges the shared block (if any) and then `spec.blocks`, in order, into one tree.
///
/// Every output path must come from exactly one block. A path claimed twice, or a path
/// that is both a file and the parent directory of another file, is a conflict.
pub fn compose(spec: &TemplateSpec, blocks: &BlockArena) -> Result<VirtualFileTree, ComposeError> {
    let declared = spec
        .blocks
        .iter()
        .map(|name| blocks.get(name))
        .collect::<Result<Vec<_>, _>>()?;

    let mut tree = VirtualFileTree::new();

    for block in blocks.shared().into_iter().chain(declared) {
        for file in &block.files {
            register(&mut tree, block, file)?;
        }
    }

    log::debug!("composed '{}' into {} entries", spec.id, tree.len());

    Ok(tree)
}

fn register(
    tree: &mut VirtualFileTree,
    block: &Block,
    file: &BlockFile,
) -> Result<(), CompositionConflictError> {
    let path = &file.output;

    let conflict = |contested: PathBuf, existing: &FileDescriptor| CompositionConflictError {
        path: contested,
        first: existing.origin.clone(),
        second: block.name.clone(),
    };

    if let Some(existing) = tree.get(path) {
        return Err(conflict(path.clone(), existing));
    }

    // a registered file cannot also be a directory
    for ancestor in path.ancestors().skip(1) {
        if let Some(existing) = tree.get(ancestor) {
            return Err(conflict(ancestor.to_path_buf(), existing));
        }
    }

    if let Some((_, existing)) = tree.first_descendant(path) {
        return Err(conflict(path.clone(), existing));
    }

    let node = match file.kind {
        FileKind::Literal => Node::File(file.content.clone()),
        FileKind::Render => Node::Template(file.content.clone()),
        FileKind::SymlinkSentinel => Node::Sentinel(file.content.clone()),
    };

    tree.insert(
        path.clone(),
        FileDescriptor {
            node,
            origin: block.name.clone(),
            executable: file.executable,
        },
    );

    Ok(())
}

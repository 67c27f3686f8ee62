use crate::vfs::{Node, VirtualFileTree};
use miette::Diagnostic;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum SymlinkError {
    #[error("Symlink sentinel for '{path}' is empty")]
    #[diagnostic(
        code(stratum::symlink::empty),
        help("A sentinel must contain the link target, e.g. `../../assets`")
    )]
    Empty { path: PathBuf },

    #[error("Symlink sentinel for '{path}' spans more than one line")]
    #[diagnostic(
        code(stratum::symlink::multi_line),
        help("A sentinel must contain exactly one link target")
    )]
    MultiLine { path: PathBuf },

    #[error("Symlink sentinel for '{path}' is not valid UTF-8")]
    #[diagnostic(code(stratum::symlink::encoding))]
    Encoding { path: PathBuf },
}

/// Parses sentinel content into a link target: trimmed, otherwise verbatim.
pub fn parse_target(path: &std::path::Path, content: &[u8]) -> Result<PathBuf, SymlinkError> {
    let text = std::str::from_utf8(content).map_err(|_| SymlinkError::Encoding { path: path.into() })?;

    let target = text.trim();

    if target.is_empty() {
        return Err(SymlinkError::Empty { path: path.into() });
    }

    if target.lines().count() > 1 {
        return Err(SymlinkError::MultiLine { path: path.into() });
    }

    Ok(PathBuf::from(target))
}

/// Turns every [`Node::Sentinel`] in `tree` into a [`Node::Symlink`].
///
/// Targets are neither normalized nor checked for existence; they may point outside
/// the template's own root.
pub fn resolve(mut tree: VirtualFileTree) -> Result<VirtualFileTree, SymlinkError> {
    for (path, descriptor) in tree.iter_mut() {
        let Node::Sentinel(content) = &descriptor.node else {
            continue;
        };

        let target = parse_target(path, content)?;

        log::debug!("link {} -> {}", path.display(), target.display());

        descriptor.node = Node::Symlink(target);
    }

    Ok(tree)
}

use crate::{
    errors::{FileOperation, IoError},
    transactions::{Active, RollbackOperation, Transaction},
    vfs::{Node, VirtualFileTree},
};
use miette::Diagnostic;
use std::{
    fs, io,
    path::{Path, PathBuf},
};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum WriteError {
    #[error("Unable to write output: {0}: {io_source}", io_source = .0.source)]
    #[diagnostic(code(stratum::write::io))]
    Io(#[from] IoError),

    #[error("'{path}' has not been rendered or resolved and cannot be written")]
    #[diagnostic(code(stratum::write::unresolved))]
    Unresolved { path: PathBuf },
}

/// Removes `output_root` and everything below it. A missing root is not an error.
pub fn clear(output_root: &Path) -> Result<(), IoError> {
    let metadata = match fs::symlink_metadata(output_root) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(error) => return Err(IoError::new(FileOperation::Read, output_root.into(), error)),
    };

    let result = if metadata.is_dir() {
        fs::remove_dir_all(output_root)
    } else {
        fs::remove_file(output_root)
    };

    result.map_err(|error| IoError::new(FileOperation::Remove, output_root.into(), error))
}

/// Writes `tree` under `output_root`, replacing whatever was there before.
///
/// Entries are written in sorted path order. If any write fails, the partially written
/// root is removed again. Returns the written paths, relative to `output_root`.
pub fn write(tree: &VirtualFileTree, output_root: &Path) -> Result<Vec<PathBuf>, WriteError> {
    if let Some((path, _)) = tree.iter().find(|(_, entry)| !entry.node.is_resolved()) {
        return Err(WriteError::Unresolved { path: path.clone() });
    }

    clear(output_root)?;

    let mut trx = Transaction::<Active>::new();

    create_directory(&mut trx, output_root)?;

    let mut written = Vec::with_capacity(tree.len());

    for (relative, descriptor) in tree.iter() {
        let path = output_root.join(relative);

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|error| IoError::new(FileOperation::Mkdir, parent.into(), error))?;
        }

        match &descriptor.node {
            Node::File(contents) => write_file(&mut trx, &path, contents, descriptor.executable)?,
            Node::Symlink(target) => create_symlink(&mut trx, &path, target)?,
            Node::Template(_) | Node::Sentinel(_) => {
                return Err(WriteError::Unresolved {
                    path: relative.clone(),
                })
            }
        }

        written.push(relative.clone());
    }

    trx.commit();

    log::info!("wrote {} entries to {}", written.len(), output_root.display());

    Ok(written)
}

fn create_directory(trx: &mut Transaction<Active>, path: &Path) -> Result<(), IoError> {
    fs::create_dir_all(path).map_err(|error| IoError::new(FileOperation::Mkdir, path.into(), error))?;

    trx.add_operation(RollbackOperation::RemoveDir(path.to_path_buf()));

    Ok(())
}

fn write_file(
    trx: &mut Transaction<Active>,
    path: &Path,
    contents: &[u8],
    executable: bool,
) -> Result<(), IoError> {
    fs::write(path, contents).map_err(|error| IoError::new(FileOperation::Write, path.into(), error))?;

    trx.add_operation(RollbackOperation::RemoveFile(path.to_path_buf()));

    if executable {
        set_executable(path)?;
    }

    log::debug!("create {}", path.display());

    Ok(())
}

fn create_symlink(trx: &mut Transaction<Active>, path: &Path, target: &Path) -> Result<(), IoError> {
    #[cfg(unix)]
    let result = std::os::unix::fs::symlink(target, path);
    #[cfg(windows)]
    let result = std::os::windows::fs::symlink_file(target, path);

    result.map_err(|error| IoError::new(FileOperation::Symlink, path.into(), error))?;

    trx.add_operation(RollbackOperation::RemoveFile(path.to_path_buf()));

    log::debug!("link {} -> {}", path.display(), target.display());

    Ok(())
}

#[cfg(unix)]
fn set_executable(path: &Path) -> Result<(), IoError> {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755))
        .map_err(|error| IoError::new(FileOperation::Permissions, path.into(), error))
}

#[cfg(not(unix))]
fn set_executable(_path: &Path) -> Result<(), IoError> {
    Ok(())
}

use crate::errors::{FileOperation, IoError};
use indexmap::IndexMap;
use miette::Diagnostic;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

/// Extensions marking a file for rendering. `j2` keeps Jinja-era blocks working.
pub const RENDER_EXTENSIONS: [&str; 2] = ["tera", "j2"];
/// Extension marking a symlink sentinel.
pub const SYMLINK_EXTENSION: &str = "symlink";
/// Name under which the shared-files directory is composed into every template.
pub const SHARED_BLOCK_NAME: &str = "files";

const GITIGNORE_PREFIX: &str = "_gitignore";
const GITIGNORE_NAME: &str = ".gitignore";

#[derive(Debug, Error, Diagnostic)]
pub enum BlockResolutionError {
    #[error("Unable to read block: {0}: {io_source}", io_source = .0.source)]
    #[diagnostic(code(stratum::blocks::io))]
    Io(#[from] IoError),

    #[error("Block not found: {block}")]
    #[diagnostic(
        code(stratum::blocks::unknown),
        help("Every block must be a directory directly under the blocks root")
    )]
    Unknown { block: String },

    #[error("Block directory '{path}' uses the name reserved for the shared files directory")]
    #[diagnostic(
        code(stratum::blocks::reserved_name),
        help("Rename the block; 'files' always refers to the shared files")
    )]
    ReservedName { path: PathBuf },

    #[error("Blocks directory does not exist: '{path}'")]
    #[diagnostic(code(stratum::blocks::missing_root), help("Check the `blocks` path in stratum.toml"))]
    MissingRoot { path: PathBuf },
}

/// How a block file turns into output, decided once from its name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileKind {
    /// Copied verbatim.
    Literal,
    /// Rendered with the template context; render suffix stripped.
    Render,
    /// Becomes a symbolic link to the target stored in the file; suffix stripped.
    SymlinkSentinel,
}
impl FileKind {
    /// Classifies a block file name and returns its kind along with the output file name.
    ///
    /// A name that would strip to nothing (`.tera`, `.symlink`) stays literal.
    pub fn classify(file_name: &str) -> (Self, String) {
        let (kind, stem) = match file_name.rsplit_once('.') {
            Some((stem, extension)) if !stem.is_empty() && RENDER_EXTENSIONS.contains(&extension) => {
                (Self::Render, stem)
            }
            Some((stem, SYMLINK_EXTENSION)) if !stem.is_empty() => (Self::SymlinkSentinel, stem),
            _ => (Self::Literal, file_name),
        };

        let output = match stem.strip_prefix(GITIGNORE_PREFIX) {
            Some(rest) => format!("{GITIGNORE_NAME}{rest}"),
            None => stem.to_string(),
        };

        (kind, output)
    }
}

/// A single file inside a block, already classified.
#[derive(Debug, Clone)]
pub struct BlockFile {
    /// Path relative to the block root, as found on disk.
    pub source: PathBuf,
    /// Output-relative path after suffix stripping and renames.
    pub output: PathBuf,
    pub kind: FileKind,
    pub content: Vec<u8>,
    pub executable: bool,
}
impl BlockFile {
    pub fn new(source: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        let source = source.into();

        let file_name = source
            .file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_string();

        let (kind, output_name) = FileKind::classify(&file_name);

        let output = source.with_file_name(output_name);

        Self {
            source,
            output,
            kind,
            content: content.into(),
            executable: false,
        }
    }

    pub fn executable(mut self, executable: bool) -> Self {
        self.executable = executable;
        self
    }
}

#[derive(Debug, Clone)]
pub struct Block {
    pub name: String,
    pub files: Vec<BlockFile>,
}
impl Block {
    /// Builds a block from in-memory files. Files are kept in source-path order.
    pub fn new(name: impl Into<String>, files: impl IntoIterator<Item = BlockFile>) -> Self {
        let mut files: Vec<BlockFile> = files.into_iter().collect();

        files.sort_by(|a, b| a.source.cmp(&b.source));

        Self {
            name: name.into(),
            files,
        }
    }
    /// Walks `root` and reads every file beneath it. Empty directories produce nothing.
    pub fn load(name: &str, root: &Path) -> Result<Self, BlockResolutionError> {
        let mut files = Vec::new();

        for entry in WalkDir::new(root).min_depth(1).sort_by_file_name() {
            let entry = entry.map_err(IoError::from)?;
            let path = entry.path();

            if path.is_dir() {
                continue;
            }

            let relative = path.strip_prefix(root).unwrap_or(path);

            let content = fs::read(path)
                .map_err(|error| IoError::new(FileOperation::Read, path.into(), error))?;

            let file = BlockFile::new(relative, content).executable(is_executable(path)?);

            log::debug!(
                "block '{}': {} -> {} ({:?})",
                name,
                file.source.display(),
                file.output.display(),
                file.kind
            );

            files.push(file);
        }

        Ok(Self::new(name, files))
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> Result<bool, IoError> {
    use std::os::unix::fs::PermissionsExt;

    let metadata =
        fs::metadata(path).map_err(|error| IoError::new(FileOperation::Read, path.into(), error))?;

    Ok(metadata.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(_path: &Path) -> Result<bool, IoError> {
    Ok(false)
}

/// Every block available to a run, keyed by name, plus the optional shared block.
#[derive(Debug, Clone, Default)]
pub struct BlockArena {
    blocks: IndexMap<String, Block>,
    shared: Option<Block>,
}
impl BlockArena {
    pub fn new() -> Self {
        Self::default()
    }
    /// Loads each directory under `root` as a block, and `shared` (when it exists) as the
    /// shared block.
    pub fn load(root: &Path, shared: Option<&Path>) -> Result<Self, BlockResolutionError> {
        if !root.is_dir() {
            return Err(BlockResolutionError::MissingRoot { path: root.into() });
        }

        let shared = shared.filter(|path| path.is_dir());

        let mut arena = Self::new();

        for entry in WalkDir::new(root)
            .min_depth(1)
            .max_depth(1)
            .sort_by_file_name()
        {
            let entry = entry.map_err(IoError::from)?;

            if !entry.path().is_dir() {
                log::debug!("skipping non-directory in blocks root: {}", entry.path().display());
                continue;
            }

            let name = entry.file_name().to_string_lossy().to_string();

            if shared.is_some() && name == SHARED_BLOCK_NAME {
                return Err(BlockResolutionError::ReservedName {
                    path: entry.path().into(),
                });
            }

            let block = Block::load(&name, entry.path())?;

            arena = arena.with_block(block);
        }

        if let Some(shared) = shared {
            arena = arena.with_shared(Block::load(SHARED_BLOCK_NAME, shared)?);
        }

        log::info!("loaded {} blocks from {}", arena.blocks.len(), root.display());

        Ok(arena)
    }

    pub fn with_block(mut self, block: Block) -> Self {
        self.blocks.insert(block.name.clone(), block);
        self
    }

    pub fn with_shared(mut self, block: Block) -> Self {
        self.shared = Some(block);
        self
    }

    pub fn get(&self, name: &str) -> Result<&Block, BlockResolutionError> {
        self.blocks
            .get(name)
            .ok_or_else(|| BlockResolutionError::Unknown {
                block: name.to_string(),
            })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.blocks.contains_key(name)
    }

    pub fn shared(&self) -> Option<&Block> {
        self.shared.as_ref()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.blocks.keys().map(String::as_str)
    }

    /// Named blocks in load order; the shared block is not included.
    pub fn iter(&self) -> impl Iterator<Item = &Block> {
        self.blocks.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_suffixes() {
        assert_eq!(
            FileKind::classify("README.md"),
            (FileKind::Literal, "README.md".to_string())
        );
        assert_eq!(
            FileKind::classify("Makefile.tera"),
            (FileKind::Render, "Makefile".to_string())
        );
        assert_eq!(
            FileKind::classify("main.R.j2"),
            (FileKind::Render, "main.R".to_string())
        );
        assert_eq!(
            FileKind::classify("assets.symlink"),
            (FileKind::SymlinkSentinel, "assets".to_string())
        );
    }

    #[test]
    fn test_classify_bare_suffix_stays_literal() {
        assert_eq!(
            FileKind::classify(".tera"),
            (FileKind::Literal, ".tera".to_string())
        );
    }

    #[test]
    fn test_classify_renames_gitignore() {
        assert_eq!(
            FileKind::classify("_gitignore"),
            (FileKind::Literal, ".gitignore".to_string())
        );
        assert_eq!(
            FileKind::classify("_gitignore.tera"),
            (FileKind::Render, ".gitignore".to_string())
        );
    }

    #[test]
    fn test_block_file_keeps_directories() {
        let file = BlockFile::new("docs/index.md.tera", "x");

        assert_eq!(file.output, PathBuf::from("docs/index.md"));
        assert_eq!(file.kind, FileKind::Render);
    }

    #[test]
    fn test_load_arena_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = dir.path().join("blocks");
        fs::create_dir_all(blocks.join("base/.devcontainer")).unwrap();
        fs::create_dir_all(blocks.join("python")).unwrap();
        fs::write(blocks.join("base/README.md.tera"), "# {{ id }}").unwrap();
        fs::write(blocks.join("base/.devcontainer/devcontainer.json"), "{}").unwrap();
        fs::write(blocks.join("python/main.py"), "print(1)").unwrap();
        fs::write(blocks.join("stray.txt"), "ignored").unwrap();

        let shared = dir.path().join("files");
        fs::create_dir_all(&shared).unwrap();
        fs::write(shared.join("LICENSE"), "MIT").unwrap();

        let arena = BlockArena::load(&blocks, Some(&shared)).unwrap();

        assert_eq!(arena.names().collect::<Vec<_>>(), vec!["base", "python"]);

        let base = arena.get("base").unwrap();
        let outputs: Vec<_> = base.files.iter().map(|f| f.output.clone()).collect();
        assert_eq!(
            outputs,
            vec![
                PathBuf::from(".devcontainer/devcontainer.json"),
                PathBuf::from("README.md"),
            ]
        );

        assert_eq!(arena.shared().unwrap().name, SHARED_BLOCK_NAME);
    }

    #[test]
    fn test_block_named_like_shared_files_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let blocks = dir.path().join("blocks");
        fs::create_dir_all(blocks.join(SHARED_BLOCK_NAME)).unwrap();
        fs::write(blocks.join(SHARED_BLOCK_NAME).join("LICENSE"), "MIT").unwrap();

        let arena = BlockArena::load(&blocks, None).unwrap();
        assert!(arena.contains(SHARED_BLOCK_NAME));

        let shared = dir.path().join("shared");
        fs::create_dir_all(&shared).unwrap();

        let error = BlockArena::load(&blocks, Some(&shared)).unwrap_err();
        assert!(matches!(
            error,
            BlockResolutionError::ReservedName { ref path } if path.ends_with(SHARED_BLOCK_NAME)
        ));
    }

    #[test]
    fn test_io_error_message_names_path_and_cause() {
        let error = BlockResolutionError::from(IoError::new(
            FileOperation::Read,
            PathBuf::from("blocks/base/README.md"),
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "permission denied"),
        ));

        let message = error.to_string();
        assert!(message.contains("blocks/base/README.md"));
        assert!(message.contains("permission denied"));
    }

    #[test]
    fn test_missing_blocks_root() {
        let dir = tempfile::tempdir().unwrap();

        let error = BlockArena::load(&dir.path().join("absent"), None).unwrap_err();

        assert!(matches!(error, BlockResolutionError::MissingRoot { .. }));
    }

    #[test]
    fn test_unknown_block() {
        let arena = BlockArena::new().with_block(Block::new("base", []));

        assert!(arena.get("base").is_ok());
        assert!(matches!(
            arena.get("r"),
            Err(BlockResolutionError::Unknown { ref block }) if block == "r"
        ));
    }

    #[cfg(unix)]
    #[test]
    fn test_executable_bit_is_recorded() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let script = dir.path().join("setup.sh");
        fs::write(&script, "#!/bin/sh\n").unwrap();
        fs::set_permissions(&script, fs::Permissions::from_mode(0o755)).unwrap();

        let block = Block::load("scripts", dir.path()).unwrap();

        assert!(block.files[0].executable);
    }
}

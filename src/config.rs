use crate::errors::{FileFormat, FileOperation, IoError, ParseError};
use miette::Diagnostic;
use serde::Deserialize;
use std::{
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;

pub const CONFIG_FILE_NAME: &str = "stratum.toml";

const DEFAULT_MANIFEST: &str = "templates.toml";
const DEFAULT_BLOCKS: &str = "src/blocks";
const DEFAULT_ATOMS: &str = "src/atoms";
const DEFAULT_FILES: &str = "src/files";
const DEFAULT_OUTPUT: &str = "out";

#[derive(Debug, Error, Diagnostic)]
pub enum ConfigError {
    #[error("I/O error within config domain")]
    #[diagnostic(code(stratum::config::io))]
    Io(#[from] IoError),

    #[error("Unable to parse config")]
    #[diagnostic(code(stratum::config::parse), help("Review stratum.toml"))]
    Parse(#[from] ParseError),
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, deny_unknown_fields)]
struct LayoutFile {
    manifest: Option<PathBuf>,
    blocks: Option<PathBuf>,
    atoms: Option<PathBuf>,
    files: Option<PathBuf>,
    output: Option<PathBuf>,
}

/// Where a project's inputs live and where its output goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Layout {
    pub manifest: PathBuf,
    pub blocks: PathBuf,
    pub atoms: PathBuf,
    /// Shared files composed into every template; ignored when missing.
    pub files: PathBuf,
    pub output: PathBuf,
}
impl Layout {
    /// The default layout under `root`.
    pub fn with_root(root: &Path) -> Self {
        Self::resolve(root, LayoutFile::default())
    }
    /// Reads a layout file. Relative paths are resolved against the file's directory.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();

        let content = fs::read_to_string(path)
            .map_err(|error| IoError::new(FileOperation::Read, path.into(), error))?;

        let parsed: LayoutFile = toml::from_str(&content)
            .map_err(|error| ParseError::new(FileFormat::Toml, path.into(), error))?;

        let root = path.parent().unwrap_or_else(|| Path::new(""));

        Ok(Self::resolve(root, parsed))
    }
    /// Uses `root/stratum.toml` when present, the default layout otherwise.
    pub fn discover(root: &Path) -> Result<Self, ConfigError> {
        let config = root.join(CONFIG_FILE_NAME);

        if config.is_file() {
            log::debug!("using layout from {}", config.display());

            Self::from_file(config)
        } else {
            Ok(Self::with_root(root))
        }
    }

    fn resolve(root: &Path, file: LayoutFile) -> Self {
        let path = |value: Option<PathBuf>, default: &str| root.join(value.unwrap_or_else(|| default.into()));

        Self {
            manifest: path(file.manifest, DEFAULT_MANIFEST),
            blocks: path(file.blocks, DEFAULT_BLOCKS),
            atoms: path(file.atoms, DEFAULT_ATOMS),
            files: path(file.files, DEFAULT_FILES),
            output: path(file.output, DEFAULT_OUTPUT),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let layout = Layout::with_root(Path::new("/project"));

        assert_eq!(layout.manifest, PathBuf::from("/project/templates.toml"));
        assert_eq!(layout.blocks, PathBuf::from("/project/src/blocks"));
        assert_eq!(layout.atoms, PathBuf::from("/project/src/atoms"));
        assert_eq!(layout.files, PathBuf::from("/project/src/files"));
        assert_eq!(layout.output, PathBuf::from("/project/out"));
    }

    #[test]
    fn test_discover_reads_config_relative_to_itself() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(
            dir.path().join(CONFIG_FILE_NAME),
            "manifest = \"manifest.toml\"\noutput = \"build/templates\"\n",
        )
        .unwrap();

        let layout = Layout::discover(dir.path()).unwrap();

        assert_eq!(layout.manifest, dir.path().join("manifest.toml"));
        assert_eq!(layout.output, dir.path().join("build/templates"));
        assert_eq!(layout.blocks, dir.path().join("src/blocks"));
    }

    #[test]
    fn test_discover_without_config() {
        let dir = tempfile::tempdir().unwrap();

        assert_eq!(Layout::discover(dir.path()).unwrap(), Layout::with_root(dir.path()));
    }

    #[test]
    fn test_unknown_key_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let config = dir.path().join(CONFIG_FILE_NAME);
        fs::write(&config, "outptu = \"typo\"\n").unwrap();

        assert!(matches!(Layout::from_file(&config), Err(ConfigError::Parse(_))));
    }
}

//! Shared content ("atoms") injected into every template's render context.
//!
//! The atoms root is scanned once per run. Each top-level entry becomes one atom:
//!
//! - `license.toml` / `meta.json` → [`AtomValue::Structured`] under `license` / `meta`
//! - `footer.md` → [`AtomValue::Text`] under `footer`
//! - `intro/` containing `intro.md` and `intro.tex` → [`AtomValue::Formats`] under `intro`,
//!   keyed by `md` and `tex`
//!
//! Atoms never decide where a file is written; they only feed rendered content.
use crate::errors::{FileFormat, FileOperation, IoError, ParseError};
use indexmap::IndexMap;
use miette::Diagnostic;
use serde::Serialize;
use std::{
    collections::HashMap,
    fs,
    path::{Path, PathBuf},
};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Debug, Error, Diagnostic)]
pub enum AtomError {
    #[error("I/O error within atoms domain")]
    #[diagnostic(code(stratum::atoms::io))]
    Io(#[from] IoError),

    #[error("Unable to parse structured atom")]
    #[diagnostic(code(stratum::atoms::parse), help("Fix the syntax of the atom file"))]
    Parse(#[from] ParseError),

    #[error("Atom at '{path}' is not valid UTF-8")]
    #[diagnostic(code(stratum::atoms::encoding))]
    Encoding { path: PathBuf },

    #[error("Unknown atom: {name}")]
    #[diagnostic(
        code(stratum::atoms::unknown),
        help("Atoms are named after the file stem or directory name under the atoms root")
    )]
    Unknown { name: String },

    #[error("Atom '{name}' is defined twice: '{first}' and '{second}'")]
    #[diagnostic(
        code(stratum::atoms::duplicate_name),
        help("Rename or remove one of the entries")
    )]
    DuplicateName {
        name: String,
        first: PathBuf,
        second: PathBuf,
    },

    #[error("Atom group '{name}' has more than one '{format}' member (second at '{path}')")]
    #[diagnostic(code(stratum::atoms::duplicate_format))]
    DuplicateFormat {
        name: String,
        format: String,
        path: PathBuf,
    },
}

/// The content of a single atom.
///
/// Serializes untagged so that templates reach into it naturally:
/// `{{ atoms.footer }}`, `{{ atoms.meta.version }}`, `{{ atoms.intro.md }}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum AtomValue {
    Text(String),
    Structured(serde_json::Value),
    Formats(IndexMap<String, String>),
}

/// Read-only, name-keyed collection of atoms.
#[derive(Debug, Clone, Default)]
pub struct AtomRegistry {
    atoms: IndexMap<String, AtomValue>,
    /// Raw text of every atom file, keyed by its path relative to the atoms root.
    sources: Vec<(PathBuf, String)>,
}
impl AtomRegistry {
    /// Scans `root` and loads every atom beneath it.
    ///
    /// A missing root yields an empty registry. Any unreadable or malformed atom
    /// fails the whole load.
    pub fn load(root: &Path) -> Result<Self, AtomError> {
        if !root.exists() {
            log::info!("no atoms directory at {}, continuing without atoms", root.display());

            return Ok(Self::default());
        }

        let mut atoms = IndexMap::new();
        let mut sources = Vec::new();
        let mut origins: HashMap<String, PathBuf> = HashMap::new();

        for entry in list_dir(root) {
            let entry = entry.map_err(IoError::from)?;
            let path = entry.path();

            let (name, value) = if path.is_dir() {
                let name = entry.file_name().to_string_lossy().to_string();
                let group = load_group(&name, path, root, &mut sources)?;

                (name, group)
            } else {
                let content = read_text(path)?;
                let atom = load_file(path, &content)?;

                sources.push((relative(root, path), content));

                atom
            };

            if let Some(first) = origins.insert(name.clone(), path.to_path_buf()) {
                return Err(AtomError::DuplicateName {
                    name,
                    first,
                    second: path.to_path_buf(),
                });
            }

            log::debug!("loaded atom '{}' from {}", name, path.display());

            atoms.insert(name, value);
        }

        Ok(Self { atoms, sources })
    }
    /// Builds a registry from in-memory atoms. Later entries replace earlier ones.
    pub fn from_entries<I, N>(entries: I) -> Self
    where
        I: IntoIterator<Item = (N, AtomValue)>,
        N: Into<String>,
    {
        let mut atoms: IndexMap<String, AtomValue> = entries
            .into_iter()
            .map(|(name, value)| (name.into(), value))
            .collect();

        atoms.sort_keys();

        Self {
            atoms,
            sources: Vec::new(),
        }
    }

    pub fn get(&self, name: &str) -> Result<&AtomValue, AtomError> {
        self.atoms.get(name).ok_or_else(|| AtomError::Unknown {
            name: name.to_string(),
        })
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.atoms.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.atoms.len()
    }

    pub fn is_empty(&self) -> bool {
        self.atoms.is_empty()
    }

    /// All atoms keyed by name, in name order.
    pub fn as_map(&self) -> &IndexMap<String, AtomValue> {
        &self.atoms
    }

    /// Raw text of each atom file as loaded from disk, in path order.
    pub fn sources(&self) -> impl Iterator<Item = (&Path, &str)> {
        self.sources
            .iter()
            .map(|(path, text)| (path.as_path(), text.as_str()))
    }
}

fn relative(root: &Path, path: &Path) -> PathBuf {
    path.strip_prefix(root).unwrap_or(path).to_path_buf()
}

/// Immediate, non-hidden children of `dir`, sorted by name.
fn list_dir(dir: &Path) -> impl Iterator<Item = walkdir::Result<walkdir::DirEntry>> {
    WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !entry.file_name().to_string_lossy().starts_with('.'))
}

fn read_text(path: &Path) -> Result<String, AtomError> {
    let bytes =
        fs::read(path).map_err(|error| IoError::new(FileOperation::Read, path.into(), error))?;

    String::from_utf8(bytes).map_err(|_| AtomError::Encoding { path: path.into() })
}

fn load_file(path: &Path, content: &str) -> Result<(String, AtomValue), AtomError> {
    let name = path
        .file_stem()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let format = path
        .extension()
        .and_then(|extension| FileFormat::from_extension(&extension.to_string_lossy()));

    let value = match format {
        Some(FileFormat::Toml) => {
            let parsed = toml::from_str::<toml::Table>(content)
                .map_err(|error| ParseError::new(FileFormat::Toml, path.into(), error))?;

            AtomValue::Structured(toml_to_json(toml::Value::Table(parsed)))
        }
        Some(FileFormat::Json) => {
            let parsed = serde_json::from_str::<serde_json::Value>(content)
                .map_err(|error| ParseError::new(FileFormat::Json, path.into(), error))?;

            AtomValue::Structured(parsed)
        }
        None => AtomValue::Text(content.to_string()),
    };

    Ok((name, value))
}

/// Converts TOML into the value type templates render from. Datetimes become their
/// TOML string form, and non-finite floats their textual form, since JSON has neither.
fn toml_to_json(value: toml::Value) -> serde_json::Value {
    use serde_json::Value as Json;

    match value {
        toml::Value::String(text) => Json::String(text),
        toml::Value::Integer(number) => Json::from(number),
        toml::Value::Float(number) => serde_json::Number::from_f64(number)
            .map(Json::Number)
            .unwrap_or_else(|| Json::String(number.to_string())),
        toml::Value::Boolean(flag) => Json::Bool(flag),
        toml::Value::Datetime(datetime) => Json::String(datetime.to_string()),
        toml::Value::Array(items) => Json::Array(items.into_iter().map(toml_to_json).collect()),
        toml::Value::Table(table) => Json::Object(
            table
                .into_iter()
                .map(|(key, value)| (key, toml_to_json(value)))
                .collect(),
        ),
    }
}

/// Loads a multi-format group: each member is keyed by its extension (or its
/// whole name when it has none) and kept as raw text.
fn load_group(
    name: &str,
    dir: &Path,
    root: &Path,
    sources: &mut Vec<(PathBuf, String)>,
) -> Result<AtomValue, AtomError> {
    let mut formats = IndexMap::new();

    for entry in list_dir(dir) {
        let entry = entry.map_err(IoError::from)?;
        let path = entry.path();

        if path.is_dir() {
            log::warn!("ignoring nested directory in atom group: {}", path.display());
            continue;
        }

        let format = path
            .extension()
            .unwrap_or_else(|| entry.file_name())
            .to_string_lossy()
            .to_string();

        if formats.contains_key(&format) {
            return Err(AtomError::DuplicateFormat {
                name: name.to_string(),
                format,
                path: path.to_path_buf(),
            });
        }

        let content = read_text(path)?;

        sources.push((relative(root, path), content.clone()));
        formats.insert(format, content);
    }

    Ok(AtomValue::Formats(formats))
}

use crate::{
    blocks::BlockArena,
    errors::{FileFormat, FileOperation, IoError, ParseError},
};
use miette::Diagnostic;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, fs, path::Path};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum ManifestError {
    #[error("I/O error within manifest domain")]
    #[diagnostic(code(stratum::manifest::io))]
    Io(#[from] IoError),

    #[error("Unable to parse manifest")]
    #[diagnostic(code(stratum::manifest::parse))]
    Parse(#[from] ParseError),

    #[error("Manifest at '{path}' declares no templates")]
    #[diagnostic(
        code(stratum::manifest::empty),
        help("Add at least one [[templates]] table")
    )]
    Empty { path: std::path::PathBuf },

    #[error("Template '{template}': field '{field}' {reason}")]
    #[diagnostic(code(stratum::manifest::invalid_field))]
    InvalidField {
        template: String,
        field: &'static str,
        reason: String,
    },

    #[error("Template id '{template}' is declared more than once")]
    #[diagnostic(code(stratum::manifest::duplicate_template))]
    DuplicateTemplate { template: String },

    #[error("Template '{template}' lists block '{block}' more than once")]
    #[diagnostic(code(stratum::manifest::duplicate_block))]
    DuplicateBlock { template: String, block: String },

    #[error("Template '{template}' references unknown block '{block}'")]
    #[diagnostic(
        code(stratum::manifest::unknown_block),
        help("Every block must be a directory directly under the blocks root")
    )]
    UnknownBlock { template: String, block: String },
}

/// One template to build. Immutable once loaded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TemplateSpec {
    pub id: String,
    pub size: String,
    pub language: String,
    pub setup: String,
    pub run: String,
    pub test: Option<String>,
    /// Blocks to compose, in order.
    pub blocks: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct Manifest {
    pub release: Option<String>,
    pub templates: Vec<TemplateSpec>,
}

#[derive(Debug, Deserialize)]
struct RawManifest {
    release: Option<String>,
    #[serde(default)]
    templates: Vec<RawTemplate>,
}

#[derive(Debug, Deserialize)]
struct RawTemplate {
    id: Option<String>,
    size: Option<String>,
    language: Option<String>,
    setup: Option<String>,
    run: Option<String>,
    test: Option<String>,
    blocks: Option<Vec<String>>,
}

lazy_static::lazy_static! {
    static ref TEMPLATE_ID_REGEX: regex::Regex =
        regex::Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._-]*$").expect("a valid regex pattern");
}

impl Manifest {
    /// Reads and validates the manifest at `path` against the available `blocks`.
    pub fn load(path: &Path, blocks: &BlockArena) -> Result<Self, ManifestError> {
        let content = fs::read_to_string(path)
            .map_err(|error| IoError::new(FileOperation::Read, path.into(), error))?;

        Self::parse(&content, path, blocks)
    }
    /// Parses manifest text; `path` is only used for error reporting.
    pub fn parse(content: &str, path: &Path, blocks: &BlockArena) -> Result<Self, ManifestError> {
        let raw: RawManifest = toml::from_str(content)
            .map_err(|error| ParseError::new(FileFormat::Toml, path.into(), error))?;

        if raw.templates.is_empty() {
            return Err(ManifestError::Empty { path: path.into() });
        }

        let mut seen = HashSet::new();
        let mut templates = Vec::with_capacity(raw.templates.len());

        for (index, entry) in raw.templates.into_iter().enumerate() {
            let spec = validate(index, entry, blocks)?;

            if !seen.insert(spec.id.clone()) {
                return Err(ManifestError::DuplicateTemplate { template: spec.id });
            }

            templates.push(spec);
        }

        log::debug!("manifest declares {} templates", templates.len());

        Ok(Self {
            release: raw.release.filter(|release| !release.trim().is_empty()),
            templates,
        })
    }

    pub fn get(&self, id: &str) -> Option<&TemplateSpec> {
        self.templates.iter().find(|spec| spec.id == id)
    }
}

fn required(
    template: &str,
    field: &'static str,
    value: Option<String>,
) -> Result<String, ManifestError> {
    match value {
        Some(value) if !value.trim().is_empty() => Ok(value),
        Some(_) => Err(ManifestError::InvalidField {
            template: template.to_string(),
            field,
            reason: "must not be empty".into(),
        }),
        None => Err(ManifestError::InvalidField {
            template: template.to_string(),
            field,
            reason: "is required".into(),
        }),
    }
}

fn validate(
    index: usize,
    raw: RawTemplate,
    blocks: &BlockArena,
) -> Result<TemplateSpec, ManifestError> {
    // entries without a usable id are reported by position
    let label = raw
        .id
        .clone()
        .filter(|id| !id.trim().is_empty())
        .unwrap_or_else(|| format!("#{index}"));

    let id = required(&label, "id", raw.id)?;

    if !TEMPLATE_ID_REGEX.is_match(&id) {
        return Err(ManifestError::InvalidField {
            template: label,
            field: "id",
            reason: "must start with a letter or digit and contain only letters, digits, '.', '_' or '-'".into(),
        });
    }

    let size = required(&label, "size", raw.size)?;
    let language = required(&label, "language", raw.language)?;
    let setup = required(&label, "setup", raw.setup)?;
    let run = required(&label, "run", raw.run)?;

    let test = match raw.test {
        Some(test) if test.trim().is_empty() => {
            return Err(ManifestError::InvalidField {
                template: label,
                field: "test",
                reason: "must not be empty when given".into(),
            })
        }
        other => other,
    };

    let template_blocks = match raw.blocks {
        Some(list) if !list.is_empty() => list,
        Some(_) => {
            return Err(ManifestError::InvalidField {
                template: label,
                field: "blocks",
                reason: "must list at least one block".into(),
            })
        }
        None => {
            return Err(ManifestError::InvalidField {
                template: label,
                field: "blocks",
                reason: "is required".into(),
            })
        }
    };

    let mut seen = HashSet::new();
    for block in &template_blocks {
        if !seen.insert(block.as_str()) {
            return Err(ManifestError::DuplicateBlock {
                template: label,
                block: block.clone(),
            });
        }

        if !blocks.contains(block) {
            return Err(ManifestError::UnknownBlock {
                template: label,
                block: block.clone(),
            });
        }
    }

    Ok(TemplateSpec {
        id,
        size,
        language,
        setup,
        run,
        test,
        blocks: template_blocks,
    })
}

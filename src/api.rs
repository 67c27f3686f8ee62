use crate::{
    atoms::{AtomError, AtomRegistry},
    blocks::{BlockArena, BlockResolutionError},
    build::{self, BuildContext, TemplateError},
    config::{ConfigError, Layout},
    manifest::{Manifest, ManifestError, TemplateSpec},
    render::Engine,
    report::BuildReport,
    vfs::VirtualFileTree,
};
use std::path::Path;

#[derive(Debug, thiserror::Error, miette::Diagnostic)]
pub enum StratumError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Manifest(#[from] ManifestError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Atom(#[from] AtomError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Blocks(#[from] BlockResolutionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Template(#[from] TemplateError),

    #[error("Template not found in manifest: {id}")]
    #[diagnostic(
        code(stratum::unknown_template),
        help("Run `stratum list` to see the declared templates")
    )]
    UnknownTemplate { id: String },
}

/// Everything loaded for one run: the manifest and the shared, read-only build inputs.
#[derive(Debug)]
pub struct Project {
    pub layout: Layout,
    pub manifest: Manifest,
    pub context: BuildContext,
}

/// Loads blocks, atoms and the manifest described by `layout`.
///
/// # Errors
///
/// Returns a [`StratumError`] if:
///
/// - The blocks directory is missing or a block cannot be read.
/// - An atom cannot be read or parsed.
/// - The manifest cannot be read, parsed or validated.
///
/// Any of these aborts the run before a single template is built.
pub fn load_project(layout: Layout) -> Result<Project, StratumError> {
    let blocks = BlockArena::load(&layout.blocks, Some(&layout.files))?;

    let atoms = AtomRegistry::load(&layout.atoms)?;

    let manifest = Manifest::load(&layout.manifest, &blocks)?;

    log::debug!(
        "loaded project: {} templates, {} atoms",
        manifest.templates.len(),
        atoms.len()
    );

    let engine = Engine::load(&blocks, &atoms);

    let context = BuildContext {
        blocks,
        atoms,
        engine,
        release: manifest.release.clone(),
    };

    Ok(Project {
        layout,
        manifest,
        context,
    })
}

impl Project {
    /// Convenience for [`load_project`] with the layout discovered under `root`.
    pub fn open(root: &Path) -> Result<Self, StratumError> {
        load_project(Layout::discover(root)?)
    }
    /// Templates named in `ids` in manifest order, or every template when `ids` is empty.
    pub fn select(&self, ids: &[String]) -> Result<Vec<TemplateSpec>, StratumError> {
        if let Some(unknown) = ids.iter().find(|id| self.manifest.get(id).is_none()) {
            return Err(StratumError::UnknownTemplate {
                id: unknown.clone(),
            });
        }

        Ok(self
            .manifest
            .templates
            .iter()
            .filter(|spec| ids.is_empty() || ids.contains(&spec.id))
            .cloned()
            .collect())
    }
    /// Builds the selected templates into the layout's output directory.
    ///
    /// Template-level failures are recorded in the returned report and never stop the
    /// remaining templates.
    pub fn build(&self, ids: &[String], jobs: usize) -> Result<BuildReport, StratumError> {
        let templates = self.select(ids)?;

        let results = build::build_all(&templates, &self.context, &self.layout.output, jobs);

        Ok(BuildReport::new(results))
    }
    /// Composes, renders and resolves one template without writing anything.
    pub fn plan(&self, id: &str) -> Result<VirtualFileTree, StratumError> {
        let spec = self
            .manifest
            .get(id)
            .ok_or_else(|| StratumError::UnknownTemplate { id: id.to_string() })?;

        Ok(build::plan(spec, &self.context)?)
    }
}

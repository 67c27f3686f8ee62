//! Per-template pipeline: compose → render → resolve links → write.
//!
//! Every error raised here is scoped to one template. A batch keeps going when a
//! template fails, and the failed template's output directory is removed so that
//! it never looks like a finished build.
use crate::{
    atoms::AtomRegistry,
    blocks::{BlockArena, BlockResolutionError},
    compose::{compose, ComposeError, CompositionConflictError},
    manifest::TemplateSpec,
    render::{render, Engine, RenderError},
    symlink::{resolve, SymlinkError},
    vfs::VirtualFileTree,
    writer::{self, WriteError},
};
use miette::Diagnostic;
use std::{
    path::{Path, PathBuf},
    sync::atomic::{AtomicUsize, Ordering},
};
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum TemplateError {
    #[error(transparent)]
    #[diagnostic(transparent)]
    BlockResolution(#[from] BlockResolutionError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Conflict(#[from] CompositionConflictError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Render(#[from] RenderError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Symlink(#[from] SymlinkError),

    #[error(transparent)]
    #[diagnostic(transparent)]
    Write(#[from] WriteError),
}
impl From<ComposeError> for TemplateError {
    fn from(error: ComposeError) -> Self {
        match error {
            ComposeError::Block(error) => Self::BlockResolution(error),
            ComposeError::Conflict(error) => Self::Conflict(error),
        }
    }
}
impl TemplateError {
    /// Short name of the failing stage, as shown in the run report.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BlockResolution(_) => "BlockResolutionError",
            Self::Conflict(_) => "CompositionConflictError",
            Self::Render(_) => "RenderError",
            Self::Symlink(_) => "SymlinkError",
            Self::Write(_) => "WriteError",
        }
    }
}

/// Read-only inputs shared by every template in a run.
#[derive(Debug, Clone, Default)]
pub struct BuildContext {
    pub blocks: BlockArena,
    pub atoms: AtomRegistry,
    pub engine: Engine,
    pub release: Option<String>,
}

/// Outcome of building one template.
#[derive(Debug)]
pub struct BuildResult {
    pub template_id: String,
    pub output_root: PathBuf,
    /// Written paths relative to `output_root`, or the error that stopped the build.
    pub outcome: Result<Vec<PathBuf>, TemplateError>,
}
impl BuildResult {
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }

    pub fn files(&self) -> &[PathBuf] {
        match &self.outcome {
            Ok(files) => files,
            Err(_) => &[],
        }
    }

    pub fn error(&self) -> Option<&TemplateError> {
        self.outcome.as_ref().err()
    }
}

/// Builds the fully resolved tree for `spec` without touching the output directory.
pub fn plan(spec: &TemplateSpec, context: &BuildContext) -> Result<VirtualFileTree, TemplateError> {
    let tree = compose(spec, &context.blocks)?;

    let tree = render(
        tree,
        spec,
        &context.engine,
        &context.atoms,
        context.release.as_deref(),
    )?;

    Ok(resolve(tree)?)
}

/// Builds one template into `output_base/<id>`.
pub fn build_template(spec: &TemplateSpec, context: &BuildContext, output_base: &Path) -> BuildResult {
    let output_root = output_base.join(&spec.id);

    log::info!("building '{}' into {}", spec.id, output_root.display());

    let outcome = plan(spec, context)
        .and_then(|tree| writer::write(&tree, &output_root).map_err(TemplateError::from));

    if let Err(error) = &outcome {
        log::warn!("template '{}' failed: {}", spec.id, error);

        if let Err(clear_error) = writer::clear(&output_root) {
            log::warn!(
                "unable to remove output of failed template '{}': {}",
                spec.id,
                clear_error
            );
        }
    }

    BuildResult {
        template_id: spec.id.clone(),
        output_root,
        outcome,
    }
}

/// Builds every template in `templates`. Results are returned in the order given.
///
/// With `jobs > 1`, templates are spread over that many scoped worker threads. Each
/// template owns its own output directory, so workers share nothing but `context`.
pub fn build_all(
    templates: &[TemplateSpec],
    context: &BuildContext,
    output_base: &Path,
    jobs: usize,
) -> Vec<BuildResult> {
    let workers = jobs.clamp(1, templates.len().max(1));

    if workers == 1 {
        return templates
            .iter()
            .map(|spec| build_template(spec, context, output_base))
            .collect();
    }

    let counter = AtomicUsize::new(0);
    let next = &counter;

    let mut results: Vec<(usize, BuildResult)> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..workers)
            .map(move |_| {
                scope.spawn(move || {
                    let mut done = Vec::new();

                    loop {
                        let index = next.fetch_add(1, Ordering::Relaxed);

                        let Some(spec) = templates.get(index) else {
                            break;
                        };

                        done.push((index, build_template(spec, context, output_base)));
                    }

                    done
                })
            })
            .collect();

        handles
            .into_iter()
            .flat_map(|handle| {
                handle
                    .join()
                    .unwrap_or_else(|panic| std::panic::resume_unwind(panic))
            })
            .collect()
    });

    results.sort_by_key(|(index, _)| *index);

    results.into_iter().map(|(_, result)| result).collect()
}

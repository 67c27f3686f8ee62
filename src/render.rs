use crate::{
    atoms::AtomRegistry,
    blocks::{BlockArena, FileKind},
    manifest::TemplateSpec,
    vfs::{Node, VirtualFileTree},
};
use miette::Diagnostic;
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};
use tera::{Context, Template, Tera};
use thiserror::Error;

/// Tera built-ins whose output depends on the clock, the environment or an RNG.
const IMPURE_FUNCTIONS: [&str; 3] = ["now", "get_env", "get_random"];

/// Name prefixes for includable sources, matching the usual `src/` layout.
const ATOMS_PREFIX: &str = "atoms";
const BLOCKS_PREFIX: &str = "blocks";
const SHARED_PREFIX: &str = "files";

#[derive(Debug, Error, Diagnostic)]
pub enum RenderError {
    #[error("Template '{template}': failed to render '{path}': {message}")]
    #[diagnostic(
        code(stratum::render::tera),
        help("Check for undefined variables or template syntax errors")
    )]
    Tera {
        template: String,
        path: PathBuf,
        message: String,
    },

    #[error("Template '{template}': '{path}' is marked for rendering but is not valid UTF-8")]
    #[diagnostic(
        code(stratum::render::encoding),
        help("Drop the render suffix to copy the file verbatim")
    )]
    Encoding { template: String, path: PathBuf },
}

/// Makes the render [`Context`] for one template: its own manifest fields at the top
/// level plus every atom under `atoms`.
pub fn make_context(spec: &TemplateSpec, atoms: &AtomRegistry, release: Option<&str>) -> Context {
    let mut context = Context::new();

    context.insert("id", &spec.id);
    context.insert("size", &spec.size);
    context.insert("language", &spec.language);
    context.insert("setup", &spec.setup);
    context.insert("run", &spec.run);
    context.insert("blocks", &spec.blocks);

    if let Some(test) = &spec.test {
        context.insert("test", test);
    }

    if let Some(release) = release {
        context.insert("release", release);
    }

    context.insert("atoms", atoms.as_map());

    context
}

/// The Tera instance shared by every template of a run.
///
/// Atom files and render-kind block files are registered under their source path
/// (`atoms/intro/intro.md`, `blocks/base/README.md.tera`, `files/NOTICE.j2`), so any
/// rendered file can `include`, `import` or `extends` them. Impure functions fail.
#[derive(Debug, Clone)]
pub struct Engine {
    tera: Tera,
}
impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}
impl Engine {
    /// An engine with nothing to include.
    pub fn new() -> Self {
        let mut tera = Tera::default();

        tera.autoescape_on(Vec::new());

        for name in IMPURE_FUNCTIONS {
            tera.register_function(
                name,
                move |_: &HashMap<String, tera::Value>| -> tera::Result<tera::Value> {
                    Err(tera::Error::msg(format!(
                        "`{name}` is disabled: rendered output must only depend on the template and its context"
                    )))
                },
            );
        }

        Self { tera }
    }
    /// Registers every atom and every render-kind block file as an includable template.
    ///
    /// Sources that do not parse are left out with a warning; rendering a file that
    /// includes one of them then fails for that template only.
    pub fn load(blocks: &BlockArena, atoms: &AtomRegistry) -> Self {
        let mut sources: Vec<(String, String)> = atoms
            .sources()
            .map(|(path, text)| (source_name(ATOMS_PREFIX, path), trim_block_lines(text)))
            .collect();

        let shared = blocks
            .shared()
            .map(|block| (SHARED_PREFIX.to_string(), block));
        let named = blocks
            .iter()
            .map(|block| (format!("{BLOCKS_PREFIX}/{}", block.name), block));

        for (prefix, block) in shared.into_iter().chain(named) {
            for file in block.files.iter().filter(|file| file.kind == FileKind::Render) {
                let Ok(text) = std::str::from_utf8(&file.content) else {
                    continue;
                };

                sources.push((source_name(&prefix, &file.source), trim_block_lines(text)));
            }
        }

        sources.retain(|(name, text)| match Template::new(name, None, text) {
            Ok(_) => true,
            Err(error) => {
                log::warn!("'{name}' cannot be included: {}", describe(&error));
                false
            }
        });

        let mut engine = Self::new();

        match engine.tera.add_raw_templates(sources.iter().map(|(name, text)| (name, text))) {
            Ok(()) => {
                log::debug!("registered {} includable sources", sources.len());

                engine
            }
            Err(error) => {
                log::warn!("includes are disabled for this run: {}", describe(&error));

                Self::new()
            }
        }
    }

    /// Whether `name` can be included from a rendered file.
    pub fn includes(&self, name: &str) -> bool {
        self.tera.get_template_names().any(|known| known == name)
    }
}

/// `prefix/a/b/c`, with `/` separators whatever the platform.
fn source_name(prefix: &str, path: &Path) -> String {
    path.components().fold(prefix.to_string(), |mut name, component| {
        name.push('/');
        name.push_str(&component.as_os_str().to_string_lossy());
        name
    })
}

/// Applies Jinja's `trim_blocks` and `lstrip_blocks` to `source`: indentation before a
/// `{% %}` or `{# #}` tag that opens its line is dropped, as is the newline right after
/// such a tag. Expression tags and plain text are left alone.
pub fn trim_block_lines(source: &str) -> String {
    let mut out = String::with_capacity(source.len());
    // start (in `out`) of the current line while it holds nothing but indentation
    let mut indent = Some(0);
    let mut rest = source;

    while let Some(open) = rest.find('{') {
        let (text, tail) = rest.split_at(open);
        push_text(&mut out, &mut indent, text);

        let close = match tail.get(..2) {
            Some("{%") => "%}",
            Some("{#") => "#}",
            Some("{{") => "}}",
            _ => {
                push_text(&mut out, &mut indent, "{");
                rest = &tail[1..];
                continue;
            }
        };

        let Some(end) = tail[2..].find(close).map(|index| index + 4) else {
            // unterminated; left for the engine to report
            out.push_str(tail);
            return out;
        };

        let (tag, after) = tail.split_at(end);
        let is_block = close != "}}";

        if let Some(start) = indent.filter(|_| is_block) {
            out.truncate(start);
        }

        out.push_str(tag);
        indent = None;
        rest = after;

        if is_block {
            if let Some(next) = rest.strip_prefix("\r\n").or_else(|| rest.strip_prefix('\n')) {
                rest = next;
                indent = Some(out.len());
            }
        }
    }

    push_text(&mut out, &mut indent, rest);

    out
}

fn push_text(out: &mut String, indent: &mut Option<usize>, text: &str) {
    let line = match text.rfind('\n') {
        Some(newline) => {
            *indent = Some(out.len() + newline + 1);
            &text[newline + 1..]
        }
        None => text,
    };

    out.push_str(text);

    if !line.chars().all(|c| c == ' ' || c == '\t') {
        *indent = None;
    }
}

/// Flattens a tera error and its causes into one line.
fn describe(error: &tera::Error) -> String {
    let mut message = error.to_string();
    let mut source = std::error::Error::source(error);

    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = std::error::Error::source(cause);
    }

    message
}

/// Renders every [`Node::Template`] in `tree` into a [`Node::File`]. Other entries are
/// left as they are, so paths never change here.
///
/// Block tags get Jinja's `trim_blocks`/`lstrip_blocks` treatment (see [`trim_block_lines`]).
pub fn render(
    mut tree: VirtualFileTree,
    spec: &TemplateSpec,
    engine: &Engine,
    atoms: &AtomRegistry,
    release: Option<&str>,
) -> Result<VirtualFileTree, RenderError> {
    let context = make_context(spec, atoms, release);

    let mut tera = engine.tera.clone();

    for (path, descriptor) in tree.iter_mut() {
        let Node::Template(source) = &descriptor.node else {
            continue;
        };

        let text = std::str::from_utf8(source).map_err(|_| RenderError::Encoding {
            template: spec.id.clone(),
            path: path.clone(),
        })?;

        let rendered = tera
            .render_str(&trim_block_lines(text), &context)
            .map_err(|error| RenderError::Tera {
                template: spec.id.clone(),
                path: path.clone(),
                message: describe(&error),
            })?;

        log::debug!("rendered {} for '{}'", path.display(), spec.id);

        descriptor.node = Node::File(rendered.into_bytes());
    }

    Ok(tree)
}

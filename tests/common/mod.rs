#![allow(dead_code)]

use std::{
    fs,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;

pub const MANIFEST: &str = r#"
release = "2026-q1"

[[templates]]
id = "r-small"
size = "small"
language = "r"
setup = "make setup"
run = "make"
test = "make test"
blocks = ["base", "r"]

[[templates]]
id = "broken"
size = "small"
language = "r"
setup = "make setup"
run = "make"
blocks = ["base", "bad-render"]

[[templates]]
id = "clash"
size = "small"
language = "r"
setup = "make setup"
run = "make"
blocks = ["base", "docs"]

[[templates]]
id = "python-small"
size = "small"
language = "python"
setup = "pip install -r requirements.txt"
run = "python main.py"
blocks = ["base", "python"]
"#;

pub fn write(root: &Path, relative: &str, contents: &str) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, contents).unwrap();
}

/// Lays out a complete project (manifest, blocks, atoms, shared files) under `root`.
pub fn project(root: &Path) {
    write(root, "templates.toml", MANIFEST);

    write(
        root,
        "src/blocks/base/README.md.tera",
        "# {{ id }} ({{ release }})\n\n{{ atoms.intro.md }}\n",
    );
    write(root, "src/blocks/base/assets.symlink", "../../assets\n");
    write(root, "src/blocks/base/_gitignore", "out/\n");

    write(
        root,
        "src/blocks/r/main.R.tera",
        "# maintained by {{ atoms.meta.owner }}\nprint(\"{{ language }}\")\n",
    );
    write(root, "src/blocks/r/scripts/setup.sh", "#!/bin/sh\nRscript -e 'renv::restore()'\n");
    make_executable(&root.join("src/blocks/r/scripts/setup.sh"));

    write(root, "src/blocks/python/main.py", "print(1)\n");
    write(root, "src/blocks/docs/README.md", "plain readme\n");
    write(root, "src/blocks/bad-render/oops.txt.tera", "{{ atoms.nope }}\n");

    write(root, "src/atoms/intro/intro.md", "Welcome to RECAP.");
    write(root, "src/atoms/intro/intro.tex", "\\section{Welcome}");
    write(root, "src/atoms/meta.toml", "owner = \"recap\"\n");

    write(root, "src/files/LICENSE", "MIT\n");
}

#[cfg(unix)]
fn make_executable(path: &Path) {
    use std::os::unix::fs::PermissionsExt;

    fs::set_permissions(path, fs::Permissions::from_mode(0o755)).unwrap();
}

#[cfg(not(unix))]
fn make_executable(_path: &Path) {}

#[derive(Debug, PartialEq, Eq)]
pub enum Entry {
    File(Vec<u8>),
    Link(PathBuf),
    Dir,
}

/// Every entry under `root`, in sorted order, without following links.
pub fn snapshot(root: &Path) -> Vec<(PathBuf, Entry)> {
    WalkDir::new(root)
        .min_depth(1)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter()
        .map(|entry| {
            let entry = entry.unwrap();
            let relative = entry.path().strip_prefix(root).unwrap().to_path_buf();
            let kind = if entry.path_is_symlink() {
                Entry::Link(fs::read_link(entry.path()).unwrap())
            } else if entry.file_type().is_dir() {
                Entry::Dir
            } else {
                Entry::File(fs::read(entry.path()).unwrap())
            };
            (relative, kind)
        })
        .collect()
}

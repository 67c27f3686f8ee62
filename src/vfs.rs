use std::{
    collections::BTreeMap,
    path::{Path, PathBuf},
};

/// What a path in the tree currently holds.
///
/// Composition produces `File`, `Template` and `Sentinel` nodes; rendering turns every
/// `Template` into a `File` and symlink resolution turns every `Sentinel` into a `Symlink`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    File(Vec<u8>),
    Template(Vec<u8>),
    Sentinel(Vec<u8>),
    Symlink(PathBuf),
}
impl Node {
    pub fn is_resolved(&self) -> bool {
        matches!(self, Self::File(_) | Self::Symlink(_))
    }
}

/// A single output entry together with the block that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub node: Node,
    pub origin: String,
    pub executable: bool,
}

/// In-memory output tree for one template, keyed by output-relative path.
///
/// Iteration is always in sorted path order, independent of how the tree was filled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct VirtualFileTree {
    entries: BTreeMap<PathBuf, FileDescriptor>,
}
impl VirtualFileTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, path: impl AsRef<Path>) -> Option<&FileDescriptor> {
        self.entries.get(path.as_ref())
    }

    pub fn contains(&self, path: impl AsRef<Path>) -> bool {
        self.entries.contains_key(path.as_ref())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&PathBuf, &FileDescriptor)> {
        self.entries.iter()
    }

    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&PathBuf, &mut FileDescriptor)> {
        self.entries.iter_mut()
    }

    pub fn paths(&self) -> impl Iterator<Item = &PathBuf> {
        self.entries.keys()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First registered path that is a strict descendant of `path`, if any.
    pub fn first_descendant(&self, path: &Path) -> Option<(&PathBuf, &FileDescriptor)> {
        self.entries
            .range::<Path, _>((std::ops::Bound::Excluded(path), std::ops::Bound::Unbounded))
            .next()
            .filter(|(candidate, _)| candidate.starts_with(path))
    }

    /// Inserts without any conflict checking; callers own that invariant.
    pub(crate) fn insert(&mut self, path: PathBuf, descriptor: FileDescriptor) {
        self.entries.insert(path, descriptor);
    }
}

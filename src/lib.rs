//! Builds project-template directories from a manifest, composable filesystem blocks
//! and shared content atoms.
//!
//! For each template in the manifest, its blocks are merged into one
//! [`VirtualFileTree`](vfs::VirtualFileTree) (two blocks may never produce the same
//! path), `.tera`/`.j2` files are rendered with the template's fields and the atoms,
//! `.symlink` sentinels become links, and the result replaces `out/<id>`.
mod api;
pub mod atoms;
pub mod blocks;
pub mod build;
pub mod compose;
pub mod config;
pub mod errors;
pub mod manifest;
pub mod preview;
pub mod render;
pub mod report;
pub mod symlink;
pub mod transactions;
pub mod vfs;
pub mod writer;

pub use api::{load_project, Project, StratumError};

use crate::vfs::{Node, VirtualFileTree};
use colored::Colorize;
use std::{collections::BTreeMap, fmt::Write as _, path::PathBuf};

/// Represents a node in the tree (either file, link or directory).
#[derive(Debug, Default)]
struct TreeNode {
    children: BTreeMap<String, TreeNode>,
    leaf: Option<Leaf>,
}

#[derive(Debug)]
enum Leaf {
    File,
    Link(PathBuf),
}

/// Build the directory tree from the virtual tree's paths.
fn build_tree(tree: &VirtualFileTree) -> TreeNode {
    let mut root = TreeNode::default();

    for (path, descriptor) in tree.iter() {
        let mut node = &mut root;

        for component in path.components() {
            let name = component.as_os_str().to_string_lossy().to_string();
            node = node.children.entry(name).or_default();
        }

        node.leaf = Some(match &descriptor.node {
            Node::Symlink(target) => Leaf::Link(target.clone()),
            _ => Leaf::File,
        });
    }

    root
}

fn write_children(out: &mut String, node: &TreeNode, prefix: &str) {
    let len = node.children.len();

    for (i, (name, child)) in node.children.iter().enumerate() {
        let is_last = i == len - 1;

        let connector = if is_last { "└── " } else { "├── " };

        let label = match &child.leaf {
            Some(Leaf::File) => name.green().to_string(),
            Some(Leaf::Link(target)) => {
                format!("{} -> {}", name.cyan(), target.display())
            }
            None => name.blue().to_string(),
        };

        let _ = writeln!(out, "{}{}{}", prefix.yellow(), connector.yellow(), label);

        let child_prefix = if is_last {
            format!("{prefix}    ")
        } else {
            format!("{prefix}│   ")
        };

        write_children(out, child, &child_prefix);
    }
}

/// Formats `tree` as an ASCII tree rooted at `root_name`.
pub fn render_tree(tree: &VirtualFileTree, root_name: &str) -> String {
    let mut out = String::new();

    let _ = writeln!(out, "{}", root_name.blue());

    write_children(&mut out, &build_tree(tree), "");

    out
}

pub fn preview_as_tree(tree: &VirtualFileTree, root_name: &str) {
    println!(
        "Legend: {} = (directory), {} = (file), {} = (link)",
        "blue".blue(),
        "green".green(),
        "cyan".cyan()
    );

    println!("{}", render_tree(tree, root_name));
}

//! Device filesystem listing and the nested tree built from it.

use std::cmp::Ordering;
use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::codec::extract;
use crate::device::Device;
use crate::error::Result;

const LIST_CODE: &str = "print(json.dumps(get_all_files('')))";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Folder,
}

impl EntryKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "file",
            Self::Folder => "folder",
        }
    }
}

/// One record of the flat listing printed by the companion script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileEntry {
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileTreeNode {
    /// Last path segment.
    pub title: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub child_nodes: Vec<FileTreeNode>,
}

impl FileTreeNode {
    fn new(title: &str, path: String, kind: EntryKind) -> Self {
        Self {
            title: title.to_string(),
            path,
            kind,
            child_nodes: Vec::new(),
        }
    }

    pub fn is_folder(&self) -> bool {
        self.kind == EntryKind::Folder
    }
}

/// Folders first, then by title.
fn node_order(a: &FileTreeNode, b: &FileTreeNode) -> Ordering {
    b.kind
        .as_str()
        .cmp(a.kind.as_str())
        .then_with(|| a.title.cmp(&b.title))
}

/// Nest a flat listing by path segment.
///
/// Segments that only appear as a prefix get a folder node whose path
/// is the prefix itself; the entry naming that path later takes the
/// node over. When two entries name the same path the first one wins.
pub fn build_tree(entries: &[FileEntry]) -> Vec<FileTreeNode> {
    let mut root: Vec<FileTreeNode> = Vec::new();
    let mut listed: HashSet<String> = HashSet::new();

    for entry in entries {
        let segments: Vec<&str> = entry.path.split('/').filter(|s| !s.is_empty()).collect();
        let mut level = &mut root;
        let mut prefix = String::new();

        for (i, segment) in segments.iter().enumerate() {
            prefix.push('/');
            prefix.push_str(segment);
            let terminal = i + 1 == segments.len();

            let idx = match level.iter().position(|n| n.title == *segment) {
                Some(idx) => {
                    if terminal && listed.insert(prefix.clone()) {
                        let node = &mut level[idx];
                        node.path = entry.path.clone();
                        node.kind = entry.kind;
                    }
                    idx
                }
                None => {
                    let node = if terminal {
                        listed.insert(prefix.clone());
                        FileTreeNode::new(segment, entry.path.clone(), entry.kind)
                    } else {
                        FileTreeNode::new(segment, prefix.clone(), EntryKind::Folder)
                    };
                    level.push(node);
                    level.len() - 1
                }
            };

            // Re-sorting moves the node, so find it again by title.
            level.sort_by(node_order);
            let idx = level
                .iter()
                .position(|n| n.title == *segment)
                .unwrap_or(idx);
            level = &mut level[idx].child_nodes;
        }
    }

    root.sort_by(node_order);
    root
}

/// Flatten a tree into `(depth, node)` pairs in display order.
pub fn flatten(tree: &[FileTreeNode]) -> Vec<(usize, &FileTreeNode)> {
    let mut out = Vec::new();
    for node in tree {
        collect(node, 0, &mut out);
    }
    out
}

fn collect<'a>(node: &'a FileTreeNode, depth: usize, out: &mut Vec<(usize, &'a FileTreeNode)>) {
    out.push((depth, node));
    for child in &node.child_nodes {
        collect(child, depth + 1, out);
    }
}

impl Device {
    /// Flat recursive listing of the whole device filesystem.
    pub async fn list_entries(&self) -> Result<Vec<FileEntry>> {
        self.run_helper().await?;
        self.enter_raw_repl().await?;
        let out = self.execute_raw(LIST_CODE).await?;
        self.exit_raw_repl().await?;

        let entries: Vec<FileEntry> = serde_json::from_str(extract(&out))?;
        debug!(count = entries.len(), "listed");
        Ok(entries)
    }

    /// The device filesystem as a tree.
    pub async fn list_files(&self) -> Result<Vec<FileTreeNode>> {
        let entries = self.list_entries().await?;
        Ok(build_tree(&entries))
    }
}

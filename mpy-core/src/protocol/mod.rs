//! Raw REPL operations on a connected [`Device`].
//!
//! - [`repl`]: prompt, raw mode, chunked execution
//! - [`file`]: uploads, downloads and filesystem commands
//! - [`tree`]: recursive listing and the tree built from it
//! - [`helper`]: the companion script those operations rely on
//!
//! [`Device`]: crate::device::Device

pub mod file;
pub mod helper;
pub mod repl;
pub mod tree;

pub use file::{RemoveOutcome, progress_percent};
pub use helper::HELPER_CODE;
pub use tree::{EntryKind, FileEntry, FileTreeNode, build_tree, flatten};

//! Subcommands and their dispatch onto a connected [`Device`].

use std::io::Write;
use std::path::PathBuf;

use clap::Subcommand;
use mpy_core::{Device, FileTreeNode, MpyError, RemoveOutcome, Transcript, flatten};
use tracing::info;

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// List the board filesystem as an indented tree.
    Ls,
    /// Print a text file.
    Cat { path: String },
    /// Write a file's raw bytes to stdout.
    Get { path: String },
    /// Upload a local file.
    Put {
        local: PathBuf,
        remote: String,
        /// Read the file back and compare digests.
        #[arg(long)]
        verify: bool,
    },
    /// Replace a file's contents with the given text.
    Write { remote: String, text: String },
    /// Create an empty file.
    Touch { path: String },
    Mkdir { path: String },
    /// Rename a file or folder.
    Mv { old: String, new: String },
    /// Remove a file.
    Rm { path: String },
    /// Remove a folder and everything below it.
    Rmdir { path: String },
    /// Execute a snippet and print its output.
    Exec { code: String },
    /// Execute a local script.
    Run { script: PathBuf },
    /// Soft reset the board.
    Reset,
    /// Interrupt whatever is running.
    Stop,
}

/// Render a tree one node per line, two spaces per level, folders
/// suffixed with `/`.
pub fn render_tree(tree: &[FileTreeNode]) -> String {
    let mut out = String::new();
    for (depth, node) in flatten(tree) {
        out.push_str(&"  ".repeat(depth));
        out.push_str(&node.title);
        if node.is_folder() {
            out.push('/');
        }
        out.push('\n');
    }
    out
}

/// Run `cmd`, writing its output to `out`.
pub async fn execute<W: Write>(
    device: &Device,
    cmd: Command,
    out: &mut W,
) -> Result<(), Box<dyn std::error::Error>> {
    match cmd {
        Command::Ls => {
            let tree = device.list_files().await?;
            out.write_all(render_tree(&tree).as_bytes())?;
        }
        Command::Cat { path } => {
            let text = device.load_file(&path).await?;
            out.write_all(text.as_bytes())?;
        }
        Command::Get { path } => {
            let bytes = device.download_file_bytes(&path).await?;
            out.write_all(&bytes)?;
        }
        Command::Put {
            local,
            remote,
            verify,
        } => {
            let content = tokio::fs::read(&local).await?;
            let progress = |pct: &str| eprint!("\r{remote}: {pct}");
            if verify {
                device.upload_file_verified(&remote, &content, progress).await?;
            } else {
                device.upload_file(&remote, &content, progress).await?;
            }
            eprintln!();
            info!(local = %local.display(), remote = %remote, bytes = content.len(), "put");
        }
        Command::Write { remote, text } => device.save_file(&remote, &text).await?,
        Command::Touch { path } => device.create_file(&path).await?,
        Command::Mkdir { path } => device.create_folder(&path).await?,
        Command::Mv { old, new } => device.rename_item(&old, &new).await?,
        Command::Rm { path } => {
            if device.remove_file(&path).await? == RemoveOutcome::NotFound {
                return Err(format!("{path}: no such file").into());
            }
        }
        Command::Rmdir { path } => device.remove_folder(&path).await?,
        Command::Exec { code } => {
            let stdout = device.exec(&code).await?;
            out.write_all(stdout.as_bytes())?;
        }
        Command::Run { script } => {
            let code = tokio::fs::read_to_string(&script).await?;
            let transcript = Transcript::parse(&device.run(&code).await?);
            out.write_all(transcript.stdout.as_bytes())?;
            if transcript.is_error() {
                out.flush()?;
                return Err(MpyError::Device(transcript.stderr.trim().to_string()).into());
            }
        }
        Command::Reset => device.soft_reset().await?,
        Command::Stop => device.stop().await?,
    }
    out.flush()?;
    Ok(())
}

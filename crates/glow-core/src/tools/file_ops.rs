//! File operation tools: read_file, write_file, create_file, delete_file, list_files.

use serde::Deserialize;
use std::io::ErrorKind;
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::exec::truncate_output;
use crate::watcher::{ChangeKind, FileChange};

use super::executor::ToolContext;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PathArgs {
    pub file_path: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WriteFileArgs {
    pub file_path: String,
    pub content: String,
}

#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
pub struct ListFilesArgs {
    #[serde(default)]
    pub directory: Option<String>,
}

/// Execute the `read_file` tool.
pub async fn execute_read_file(args: PathArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    let path = ctx.context.resolve(&args.file_path);
    debug!("Reading file: {}", path.display());

    match tokio::fs::read_to_string(&path).await {
        Ok(content) => Ok(truncate_output(&content, ctx.settings.max_output_chars)),
        Err(e) if e.kind() == ErrorKind::NotFound => ctx
            .context
            .cached_content(&args.file_path)
            .map(|cached| truncate_output(cached, ctx.settings.max_output_chars))
            .ok_or_else(|| ToolError::io("Failed to read", path, e)),
        Err(e) => Err(ToolError::io("Failed to read", path, e)),
    }
}

/// Execute the `write_file` tool.
pub async fn execute_write_file(args: WriteFileArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    let path = ctx.context.resolve(&args.file_path);
    let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);

    tokio::fs::write(&path, &args.content)
        .await
        .map_err(|e| ToolError::io("Failed to write", &path, e))?;

    let kind = if existed {
        ChangeKind::Change
    } else {
        ChangeKind::Create
    };
    ctx.publish(FileChange::new(path.clone(), kind));

    Ok(format!(
        "Wrote {} bytes to {}",
        args.content.len(),
        path.display()
    ))
}

/// Execute the `create_file` tool. Parent directories are created as needed
/// and an existing file is overwritten.
pub async fn execute_create_file(
    args: WriteFileArgs,
    ctx: &ToolContext<'_>,
) -> ToolResult<String> {
    let path = ctx.context.resolve(&args.file_path);
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| ToolError::io("Failed to create directory", parent, e))?;
    }
    let existed = tokio::fs::try_exists(&path).await.unwrap_or(false);

    tokio::fs::write(&path, &args.content)
        .await
        .map_err(|e| ToolError::io("Failed to create", &path, e))?;

    let kind = if existed {
        ChangeKind::Change
    } else {
        ChangeKind::Create
    };
    ctx.publish(FileChange::new(path.clone(), kind));

    Ok(format!("Created {}", path.display()))
}

/// Execute the `delete_file` tool.
pub async fn execute_delete_file(args: PathArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    let path = ctx.context.resolve(&args.file_path);
    tokio::fs::remove_file(&path)
        .await
        .map_err(|e| ToolError::io("Failed to delete", &path, e))?;

    ctx.publish(FileChange::new(path.clone(), ChangeKind::Delete));
    Ok(format!("Deleted {}", path.display()))
}

/// Execute the `list_files` tool: the known-file snapshot plus one directory level on disk.
pub async fn execute_list_files(args: ListFilesArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    let directory = args.directory.as_deref().unwrap_or(".");
    let path = ctx.context.resolve(directory);

    let mut reader = tokio::fs::read_dir(&path)
        .await
        .map_err(|e| ToolError::io("Failed to list", &path, e))?;

    let mut entries = Vec::new();
    while let Some(entry) = reader
        .next_entry()
        .await
        .map_err(|e| ToolError::io("Failed to list", &path, e))?
    {
        let name = entry.file_name().to_string_lossy().to_string();
        let is_dir = entry
            .file_type()
            .await
            .map(|t| t.is_dir())
            .unwrap_or(false);
        entries.push(if is_dir { format!("{}/", name) } else { name });
    }
    entries.sort();

    let mut output = format!("{}:\n", path.display());
    if entries.is_empty() {
        output.push_str("  (empty)\n");
    }
    for entry in &entries {
        output.push_str(&format!("  {}\n", entry));
    }

    if !ctx.context.files.is_empty() {
        output.push_str("\nKnown project files:\n");
        for file in &ctx.context.files {
            let marker = if file.content.is_some() { " (cached)" } else { "" };
            output.push_str(&format!("  {}{}\n", file.path, marker));
        }
    }

    Ok(truncate_output(output.trim_end(), ctx.settings.max_output_chars))
}

//! Git tools. Every operation passes the double gate in `safety` before a
//! process is spawned.

use serde::Deserialize;
use std::path::PathBuf;
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::exec::{truncate_output, CommandSpec};
use crate::safety::check_git_directory;

use super::executor::ToolContext;

const DEFAULT_LOG_LIMIT: u32 = 10;
const MAX_LOG_LIMIT: u32 = 100;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GitArgs {
    pub cwd: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GitAddArgs {
    pub cwd: String,
    #[serde(default)]
    pub paths: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GitCommitArgs {
    pub cwd: String,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GitRemoteArgs {
    pub cwd: String,
    #[serde(default)]
    pub remote: Option<String>,
    #[serde(default)]
    pub branch: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GitDiffArgs {
    pub cwd: String,
    #[serde(default)]
    pub staged: bool,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct GitLogArgs {
    pub cwd: String,
    #[serde(default)]
    pub limit: Option<u32>,
}

/// Resolve and gate the directory, then run `git <args>` in it.
async fn run_git(ctx: &ToolContext<'_>, cwd: &str, args: &[&str]) -> ToolResult<String> {
    let requested = ctx.context.resolve(cwd);
    let dir: PathBuf = check_git_directory(&requested)?;
    debug!("git {} in {}", args.join(" "), dir.display());

    let result = ctx
        .run(CommandSpec::new("git", args, dir, ctx.settings.command_timeout))
        .await?;
    Ok(truncate_output(&result.summary(), ctx.settings.max_output_chars))
}

pub async fn execute_git_status(args: GitArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    run_git(ctx, &args.cwd, &["status", "--short", "--branch"]).await
}

pub async fn execute_git_add(args: GitAddArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    let mut git_args = vec!["add"];
    match args.paths.as_deref() {
        Some(paths) if !paths.is_empty() => {
            git_args.push("--");
            git_args.extend(paths.iter().map(String::as_str));
        }
        _ => git_args.push("-A"),
    }
    run_git(ctx, &args.cwd, &git_args).await
}

pub async fn execute_git_commit(args: GitCommitArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    if args.message.trim().is_empty() {
        return Err(ToolError::InvalidArguments {
            tool: "git_commit".to_string(),
            message: "commit message must not be empty".to_string(),
        });
    }
    run_git(ctx, &args.cwd, &["commit", "-m", &args.message]).await
}

fn remote_args<'a>(verb: &'a str, args: &'a GitRemoteArgs) -> ToolResult<Vec<&'a str>> {
    // git would read a leading dash as an option such as --receive-pack.
    for value in [args.remote.as_deref(), args.branch.as_deref()].into_iter().flatten() {
        if value.starts_with('-') {
            return Err(ToolError::InvalidArguments {
                tool: format!("git_{}", verb),
                message: format!("'{}' is not a remote or branch name", value),
            });
        }
    }

    let mut git_args = vec![verb];
    match (args.remote.as_deref(), args.branch.as_deref()) {
        (Some(remote), Some(branch)) => git_args.extend([remote, branch]),
        (Some(remote), None) => git_args.push(remote),
        (None, Some(branch)) => git_args.extend(["origin", branch]),
        (None, None) => {}
    }
    Ok(git_args)
}

pub async fn execute_git_push(args: GitRemoteArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    run_git(ctx, &args.cwd, &remote_args("push", &args)?).await
}

pub async fn execute_git_pull(args: GitRemoteArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    run_git(ctx, &args.cwd, &remote_args("pull", &args)?).await
}

pub async fn execute_git_diff(args: GitDiffArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    if args.staged {
        run_git(ctx, &args.cwd, &["diff", "--staged"]).await
    } else {
        run_git(ctx, &args.cwd, &["diff"]).await
    }
}

pub async fn execute_git_log(args: GitLogArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    let limit = args
        .limit
        .unwrap_or(DEFAULT_LOG_LIMIT)
        .clamp(1, MAX_LOG_LIMIT)
        .to_string();
    run_git(ctx, &args.cwd, &["log", "--oneline", "-n", &limit]).await
}

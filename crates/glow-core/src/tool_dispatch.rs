//! Tool dispatch - turns a raw tool call into a typed invocation and routes it
//! to its implementation in `tools/`.

use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::error::{ToolError, ToolResult};
use crate::tool_definitions::ToolName;
use crate::tools::executor::ToolContext;
use crate::tools::file_ops::{ListFilesArgs, PathArgs, WriteFileArgs};
use crate::tools::git::{
    GitAddArgs, GitArgs, GitCommitArgs, GitDiffArgs, GitLogArgs, GitRemoteArgs,
};
use crate::tools::scaffold::CreateProjectArgs;
use crate::tools::shell::RunCommandArgs;
use crate::tools::{file_ops, git, scaffold, shell};
use crate::ToolCall;

/// A tool call with its arguments validated against the tool's shape.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "tool", content = "args", rename_all = "snake_case")]
pub enum ToolInvocation {
    ReadFile(PathArgs),
    WriteFile(WriteFileArgs),
    CreateFile(WriteFileArgs),
    DeleteFile(PathArgs),
    ListFiles(ListFilesArgs),
    RunCommand(RunCommandArgs),
    GitStatus(GitArgs),
    GitAdd(GitAddArgs),
    GitCommit(GitCommitArgs),
    GitPush(GitRemoteArgs),
    GitPull(GitRemoteArgs),
    GitDiff(GitDiffArgs),
    GitLog(GitLogArgs),
    CreateProject(CreateProjectArgs),
}

impl ToolInvocation {
    pub fn from_call(call: &ToolCall) -> ToolResult<Self> {
        let name: ToolName = call
            .tool
            .parse()
            .map_err(|_| ToolError::UnknownTool(call.tool.clone()))?;

        let args = match &call.args {
            Value::Null => json!({}),
            other => other.clone(),
        };

        serde_json::from_value(json!({ "tool": name.as_str(), "args": args })).map_err(|e| {
            ToolError::InvalidArguments {
                tool: name.to_string(),
                message: e.to_string(),
            }
        })
    }

    pub fn name(&self) -> ToolName {
        match self {
            ToolInvocation::ReadFile(_) => ToolName::ReadFile,
            ToolInvocation::WriteFile(_) => ToolName::WriteFile,
            ToolInvocation::CreateFile(_) => ToolName::CreateFile,
            ToolInvocation::DeleteFile(_) => ToolName::DeleteFile,
            ToolInvocation::ListFiles(_) => ToolName::ListFiles,
            ToolInvocation::RunCommand(_) => ToolName::RunCommand,
            ToolInvocation::GitStatus(_) => ToolName::GitStatus,
            ToolInvocation::GitAdd(_) => ToolName::GitAdd,
            ToolInvocation::GitCommit(_) => ToolName::GitCommit,
            ToolInvocation::GitPush(_) => ToolName::GitPush,
            ToolInvocation::GitPull(_) => ToolName::GitPull,
            ToolInvocation::GitDiff(_) => ToolName::GitDiff,
            ToolInvocation::GitLog(_) => ToolName::GitLog,
            ToolInvocation::CreateProject(_) => ToolName::CreateProject,
        }
    }
}

/// Dispatch a validated invocation to its handler.
pub async fn dispatch_tool(invocation: ToolInvocation, ctx: &ToolContext<'_>) -> ToolResult<String> {
    debug!("Dispatching tool: {}", invocation.name());

    match invocation {
        // File operations
        ToolInvocation::ReadFile(args) => file_ops::execute_read_file(args, ctx).await,
        ToolInvocation::WriteFile(args) => file_ops::execute_write_file(args, ctx).await,
        ToolInvocation::CreateFile(args) => file_ops::execute_create_file(args, ctx).await,
        ToolInvocation::DeleteFile(args) => file_ops::execute_delete_file(args, ctx).await,
        ToolInvocation::ListFiles(args) => file_ops::execute_list_files(args, ctx).await,

        ToolInvocation::RunCommand(args) => shell::execute_run_command(args, ctx).await,

        // Version control
        ToolInvocation::GitStatus(args) => git::execute_git_status(args, ctx).await,
        ToolInvocation::GitAdd(args) => git::execute_git_add(args, ctx).await,
        ToolInvocation::GitCommit(args) => git::execute_git_commit(args, ctx).await,
        ToolInvocation::GitPush(args) => git::execute_git_push(args, ctx).await,
        ToolInvocation::GitPull(args) => git::execute_git_pull(args, ctx).await,
        ToolInvocation::GitDiff(args) => git::execute_git_diff(args, ctx).await,
        ToolInvocation::GitLog(args) => git::execute_git_log(args, ctx).await,

        ToolInvocation::CreateProject(args) => scaffold::execute_create_project(args, ctx).await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(tool: &str, args: Value) -> ToolCall {
        ToolCall {
            id: "call_1".to_string(),
            tool: tool.to_string(),
            args,
        }
    }

    #[test]
    fn test_every_catalog_tool_has_an_invocation() {
        let samples = [
            json!({"file_path": "a"}),
            json!({"file_path": "a", "content": "b"}),
            json!({"file_path": "a", "content": "b"}),
            json!({"file_path": "a"}),
            json!({}),
            json!({"command": "ls"}),
            json!({"cwd": "."}),
            json!({"cwd": "."}),
            json!({"cwd": ".", "message": "m"}),
            json!({"cwd": "."}),
            json!({"cwd": "."}),
            json!({"cwd": "."}),
            json!({"cwd": "."}),
            json!({"template": "html", "directory": "site"}),
        ];
        for (name, args) in ToolName::ALL.iter().zip(samples) {
            let invocation = ToolInvocation::from_call(&call(name.as_str(), args)).unwrap();
            assert_eq!(invocation.name(), *name);
        }
    }

    #[test]
    fn test_unknown_tool() {
        let err = ToolInvocation::from_call(&call("format_disk", json!({}))).unwrap_err();
        assert_eq!(err.to_string(), "Unknown tool: format_disk");
    }

    #[test]
    fn test_missing_required_argument() {
        let err = ToolInvocation::from_call(&call("write_file", json!({"file_path": "a"})))
            .unwrap_err();
        assert!(matches!(err, ToolError::InvalidArguments { ref tool, .. } if tool == "write_file"));
    }

    #[test]
    fn test_null_args_for_optional_only_tool() {
        let invocation = ToolInvocation::from_call(&call("list_files", Value::Null)).unwrap();
        assert_eq!(invocation, ToolInvocation::ListFiles(ListFilesArgs::default()));
    }
}

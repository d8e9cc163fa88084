//! Tool definitions for the agent's available tools.
//!
//! The catalog is built once and shared by every provider adapter, so all
//! backends see exactly the same tool set.

use glow_providers::Tool;
use serde_json::json;
use std::str::FromStr;
use std::sync::OnceLock;

/// Every tool the executor knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolName {
    ReadFile,
    WriteFile,
    CreateFile,
    DeleteFile,
    ListFiles,
    RunCommand,
    GitStatus,
    GitAdd,
    GitCommit,
    GitPush,
    GitPull,
    GitDiff,
    GitLog,
    CreateProject,
}

impl ToolName {
    pub const ALL: [ToolName; 14] = [
        ToolName::ReadFile,
        ToolName::WriteFile,
        ToolName::CreateFile,
        ToolName::DeleteFile,
        ToolName::ListFiles,
        ToolName::RunCommand,
        ToolName::GitStatus,
        ToolName::GitAdd,
        ToolName::GitCommit,
        ToolName::GitPush,
        ToolName::GitPull,
        ToolName::GitDiff,
        ToolName::GitLog,
        ToolName::CreateProject,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ToolName::ReadFile => "read_file",
            ToolName::WriteFile => "write_file",
            ToolName::CreateFile => "create_file",
            ToolName::DeleteFile => "delete_file",
            ToolName::ListFiles => "list_files",
            ToolName::RunCommand => "run_command",
            ToolName::GitStatus => "git_status",
            ToolName::GitAdd => "git_add",
            ToolName::GitCommit => "git_commit",
            ToolName::GitPush => "git_push",
            ToolName::GitPull => "git_pull",
            ToolName::GitDiff => "git_diff",
            ToolName::GitLog => "git_log",
            ToolName::CreateProject => "create_project",
        }
    }

    pub fn is_git(&self) -> bool {
        matches!(
            self,
            ToolName::GitStatus
                | ToolName::GitAdd
                | ToolName::GitCommit
                | ToolName::GitPush
                | ToolName::GitPull
                | ToolName::GitDiff
                | ToolName::GitLog
        )
    }
}

impl FromStr for ToolName {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ToolName::ALL
            .iter()
            .copied()
            .find(|name| name.as_str() == s)
            .ok_or(())
    }
}

impl std::fmt::Display for ToolName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The shared, immutable tool catalog.
pub fn list() -> &'static [Tool] {
    static CATALOG: OnceLock<Vec<Tool>> = OnceLock::new();
    CATALOG.get_or_init(|| ToolName::ALL.iter().map(|name| definition(*name)).collect())
}

fn cwd_property() -> serde_json::Value {
    json!({
        "type": "string",
        "description": "Repository directory. Must be the repository root itself, not a subdirectory."
    })
}

fn remote_branch_schema() -> serde_json::Value {
    json!({
        "type": "object",
        "properties": {
            "cwd": cwd_property(),
            "remote": {
                "type": "string",
                "description": "Remote name (default: origin)"
            },
            "branch": {
                "type": "string",
                "description": "Branch name (default: the current branch)"
            }
        },
        "required": ["cwd"]
    })
}

fn definition(name: ToolName) -> Tool {
    let (description, input_schema) = match name {
        ToolName::ReadFile => (
            "Read the contents of a file. Relative paths are resolved against the project root.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The path to the file to read"
                    }
                },
                "required": ["file_path"]
            }),
        ),
        ToolName::WriteFile => (
            "Write content to an existing or new file, replacing whatever it contained.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The path to the file to write"
                    },
                    "content": {
                        "type": "string",
                        "description": "The full new content of the file"
                    }
                },
                "required": ["file_path", "content"]
            }),
        ),
        ToolName::CreateFile => (
            "Create a file with the given content. Missing parent directories are created.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The path of the file to create"
                    },
                    "content": {
                        "type": "string",
                        "description": "The content of the new file"
                    }
                },
                "required": ["file_path", "content"]
            }),
        ),
        ToolName::DeleteFile => (
            "Delete a single file.",
            json!({
                "type": "object",
                "properties": {
                    "file_path": {
                        "type": "string",
                        "description": "The path of the file to delete"
                    }
                },
                "required": ["file_path"]
            }),
        ),
        ToolName::ListFiles => (
            "List the files known for this project and the entries of a directory.",
            json!({
                "type": "object",
                "properties": {
                    "directory": {
                        "type": "string",
                        "description": "Directory to list (default: the project root)"
                    }
                },
                "required": []
            }),
        ),
        ToolName::RunCommand => (
            "Run a shell command and return its output. Destructive commands are refused.",
            json!({
                "type": "object",
                "properties": {
                    "command": {
                        "type": "string",
                        "description": "The shell command to execute"
                    },
                    "cwd": {
                        "type": "string",
                        "description": "Working directory (default: the project root)"
                    }
                },
                "required": ["command"]
            }),
        ),
        ToolName::GitStatus => (
            "Show the working tree status of a repository.",
            json!({
                "type": "object",
                "properties": { "cwd": cwd_property() },
                "required": ["cwd"]
            }),
        ),
        ToolName::GitAdd => (
            "Stage files for commit.",
            json!({
                "type": "object",
                "properties": {
                    "cwd": cwd_property(),
                    "paths": {
                        "type": "array",
                        "items": { "type": "string" },
                        "description": "Paths to stage (default: everything)"
                    }
                },
                "required": ["cwd"]
            }),
        ),
        ToolName::GitCommit => (
            "Commit the staged changes.",
            json!({
                "type": "object",
                "properties": {
                    "cwd": cwd_property(),
                    "message": {
                        "type": "string",
                        "description": "The commit message"
                    }
                },
                "required": ["cwd", "message"]
            }),
        ),
        ToolName::GitPush => (
            "Push commits to a remote.",
            remote_branch_schema(),
        ),
        ToolName::GitPull => (
            "Pull commits from a remote.",
            remote_branch_schema(),
        ),
        ToolName::GitDiff => (
            "Show changes in the working tree, or staged changes.",
            json!({
                "type": "object",
                "properties": {
                    "cwd": cwd_property(),
                    "staged": {
                        "type": "boolean",
                        "description": "Show staged changes instead of unstaged (default: false)"
                    }
                },
                "required": ["cwd"]
            }),
        ),
        ToolName::GitLog => (
            "Show recent commits.",
            json!({
                "type": "object",
                "properties": {
                    "cwd": cwd_property(),
                    "limit": {
                        "type": "integer",
                        "description": "Number of commits to show (default: 10)"
                    }
                },
                "required": ["cwd"]
            }),
        ),
        ToolName::CreateProject => (
            "Scaffold a new project from a template (html, node, react-vite, python) and install its dependencies.",
            json!({
                "type": "object",
                "properties": {
                    "template": {
                        "type": "string",
                        "enum": ["html", "node", "react-vite", "python"],
                        "description": "Template name"
                    },
                    "directory": {
                        "type": "string",
                        "description": "Directory to create the project in"
                    }
                },
                "required": ["template", "directory"]
            }),
        ),
    };

    Tool {
        name: name.as_str().to_string(),
        description: description.to_string(),
        input_schema,
    }
}

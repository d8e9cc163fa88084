//! Shell command execution tool.

use serde::Deserialize;
use tracing::debug;

use crate::error::ToolResult;
use crate::exec::{truncate_output, CommandSpec};
use crate::safety::check_command;

use super::executor::ToolContext;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RunCommandArgs {
    pub command: String,
    #[serde(default)]
    pub cwd: Option<String>,
}

/// Execute the `run_command` tool. The deny-list is checked before anything
/// is spawned.
pub async fn execute_run_command(args: RunCommandArgs, ctx: &ToolContext<'_>) -> ToolResult<String> {
    check_command(&args.command)?;

    let cwd = match args.cwd.as_deref() {
        Some(dir) => ctx.context.resolve(dir),
        None => ctx.context.project_root.clone(),
    };
    debug!("Running command in {}: {}", cwd.display(), args.command);

    let result = ctx
        .run(CommandSpec::shell(
            &args.command,
            cwd,
            ctx.settings.command_timeout,
        ))
        .await?;

    Ok(truncate_output(&result.summary(), ctx.settings.max_output_chars))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::AgentContext;
    use crate::error::ToolError;
    use crate::exec::{ExecutionResult, RecordingRunner};
    use crate::tools::executor::ExecutorSettings;
    use crate::watcher::ChangeNotifier;
    use std::path::PathBuf;

    async fn run(runner: &RecordingRunner, args: RunCommandArgs) -> ToolResult<String> {
        let context = AgentContext::new("/work/app");
        let notifier = ChangeNotifier::default();
        let settings = ExecutorSettings::default();
        let ctx = ToolContext {
            context: &context,
            runner,
            notifier: &notifier,
            settings: &settings,
        };
        execute_run_command(args, &ctx).await
    }

    #[tokio::test]
    async fn test_denied_command_never_spawns() {
        let runner = RecordingRunner::new();
        let err = run(
            &runner,
            RunCommandArgs {
                command: "rm -rf /".to_string(),
                cwd: None,
            },
        )
        .await
        .unwrap_err();

        assert!(matches!(err, ToolError::CommandDenied { .. }));
        assert!(runner.calls().is_empty());
    }

    #[tokio::test]
    async fn test_command_runs_in_resolved_cwd() {
        let runner = RecordingRunner::new().with_results(vec![ExecutionResult::ok("a\nb\n")]);
        let out = run(
            &runner,
            RunCommandArgs {
                command: "ls".to_string(),
                cwd: Some("web".to_string()),
            },
        )
        .await
        .unwrap();

        assert_eq!(out, "a\nb");
        let calls = runner.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].cwd, PathBuf::from("/work/app/web"));
        assert_eq!(calls[0].display(), "ls");
    }

    #[tokio::test]
    async fn test_non_zero_exit_is_failure() {
        let runner = RecordingRunner::new()
            .with_results(vec![ExecutionResult::failed(127, "sh: nope: not found")]);
        let err = run(
            &runner,
            RunCommandArgs {
                command: "nope".to_string(),
                cwd: None,
            },
        )
        .await
        .unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}

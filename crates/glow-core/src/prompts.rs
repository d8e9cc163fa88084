use crate::context::AgentContext;

const SYSTEM_PROMPT: &str = "You are an AI programming agent working inside a user's project.

You have access to tools. When you need to accomplish a task, you MUST use the appropriate tool. Do not just describe what you would do - actually use the tools.

IMPORTANT: You must call tools to achieve goals. When you receive a request:
1. Analyze and identify what needs to be done
2. Call the appropriate tool with the required parameters
3. Continue or complete the task based on the result
4. If you repeatedly try something and it fails, try a different approach
5. When your task is complete, reply with a short summary of what was accomplished and no tool calls.

Paths are relative to the project root unless absolute.
Git tools must be given the repository root itself as `cwd`; they refuse subdirectories and protected locations such as the home directory.
Use create_project to start a new project from a template instead of writing every starter file by hand.";

/// Sent when the model answers a forced turn with prose instead of a tool call.
pub const TOOL_REQUIRED_REMINDER: &str = "You answered without calling a tool. Do not describe the actions you would take - call the appropriate tool now.";

/// System prompt with the project root and known files appended.
pub fn agent_system_prompt(context: &AgentContext) -> String {
    let mut prompt = format!(
        "{}\n\nProject root: {}",
        SYSTEM_PROMPT,
        context.project_root.display()
    );
    if !context.files.is_empty() {
        prompt.push_str("\nKnown files:");
        for file in &context.files {
            prompt.push_str("\n- ");
            prompt.push_str(&file.path);
        }
    }
    prompt
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A file the caller already knows about, optionally with its cached text.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KnownFile {
    pub path: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

/// Project the run operates on. Owned by the caller and only read by the loop
/// and the executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentContext {
    pub project_root: PathBuf,
    #[serde(default)]
    pub files: Vec<KnownFile>,
}

impl AgentContext {
    pub fn new(project_root: impl Into<PathBuf>) -> Self {
        Self {
            project_root: project_root.into(),
            files: Vec::new(),
        }
    }

    pub fn with_files(mut self, files: Vec<KnownFile>) -> Self {
        self.files = files;
        self
    }

    /// Resolve a tool-supplied path: `~` is expanded, absolute paths are kept,
    /// anything else is taken relative to the project root.
    pub fn resolve(&self, path: &str) -> PathBuf {
        let expanded = shellexpand::tilde(path);
        let candidate = Path::new(expanded.as_ref());
        if candidate.is_absolute() {
            candidate.to_path_buf()
        } else {
            self.project_root.join(candidate)
        }
    }

    pub fn cached_content(&self, path: &str) -> Option<&str> {
        self.files
            .iter()
            .find(|f| f.path == path)
            .and_then(|f| f.content.as_deref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_relative_and_absolute() {
        let ctx = AgentContext::new("/work/project");
        assert_eq!(ctx.resolve("src/main.rs"), PathBuf::from("/work/project/src/main.rs"));
        assert_eq!(ctx.resolve("/etc/hosts"), PathBuf::from("/etc/hosts"));
    }

    #[test]
    fn test_cached_content_lookup() {
        let ctx = AgentContext::new("/p").with_files(vec![
            KnownFile {
                path: "a.txt".to_string(),
                content: Some("alpha".to_string()),
            },
            KnownFile {
                path: "b.txt".to_string(),
                content: None,
            },
        ]);
        assert_eq!(ctx.cached_content("a.txt"), Some("alpha"));
        assert_eq!(ctx.cached_content("b.txt"), None);
        assert_eq!(ctx.cached_content("c.txt"), None);
    }
}

//! Safety gates checked before any process is spawned.
//!
//! Shell commands are matched against a deny-list of destructive patterns.
//! Git operations go through a double gate: the directory must not be a
//! protected location, and it must itself be the root of the repository that
//! git would discover from it.

use regex::Regex;
use std::path::{Component, Path, PathBuf};
use std::sync::OnceLock;
use tracing::warn;

use crate::error::{ToolError, ToolResult};

const COMMAND_DENY_RULES: [(&str, &str); 6] = [
    (
        "recursive delete of a root-like path",
        r#"(?:^|[;&|(\s])rm\s+(?:-{1,2}[\w-]+\s+)*?(?:-[a-zA-Z]*[rR][a-zA-Z]*|--recursive)\s+(?:-{1,2}[\w-]+\s+)*(?:/\*?|~/?\*?|\$HOME/?\*?|"\$HOME"/?\*?|\$\{HOME\}/?\*?)\s*(?:$|[;&|)])"#,
    ),
    ("elevated delete", r"\bsudo\s+(?:-\S+\s+)*rm\b"),
    ("filesystem formatting", r"\bmkfs(?:\.\w+)?\b"),
    ("drive formatting", r"(?i)\bformat\s+[a-z]:"),
    (
        "raw write to a disk device",
        r"\bdd\b.*\bof=/dev/(?:r?disk|sd|hd|nvme|mmcblk|xvd)\w*",
    ),
    ("disk erase", r"\bdiskutil\s+(?:erase\w*|partitionDisk)\b"),
];

const DANGEROUS_PATH_PATTERNS: [&str; 7] = [
    r"^/$",
    r"^/root$",
    r"^/(?:Users|home)/[^/]+$",
    r"^/(?:Users|home)/[^/]+/(?:Desktop|Documents)$",
    r"^/root/(?:Desktop|Documents)$",
    r"^[A-Za-z]:\\?$",
    r"(?i)^[A-Za-z]:\\Users\\[^\\]+(?:\\(?:Desktop|Documents))?$",
];

fn command_rules() -> &'static [(&'static str, Regex)] {
    static RULES: OnceLock<Vec<(&'static str, Regex)>> = OnceLock::new();
    RULES.get_or_init(|| {
        COMMAND_DENY_RULES
            .iter()
            .filter_map(|(rule, pattern)| Regex::new(pattern).ok().map(|re| (*rule, re)))
            .collect()
    })
}

fn path_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        DANGEROUS_PATH_PATTERNS
            .iter()
            .filter_map(|pattern| Regex::new(pattern).ok())
            .collect()
    })
}

/// Refuse a shell command that matches the deny-list.
pub fn check_command(command: &str) -> ToolResult<()> {
    for (rule, re) in command_rules() {
        if re.is_match(command) {
            warn!("blocked command ({}): {}", rule, command);
            return Err(ToolError::CommandDenied {
                command: command.to_string(),
                rule,
            });
        }
    }
    Ok(())
}

/// Lexically normalize a path: drop `.`, fold `..`, strip trailing separators.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push("..");
                }
            }
            other => out.push(other.as_os_str()),
        }
    }
    out
}

/// Whether a directory is a protected location git must never run in.
pub fn is_dangerous_path(path: &Path) -> bool {
    let normalized = normalize(path);

    let actual = [
        dirs::home_dir(),
        dirs::desktop_dir(),
        dirs::document_dir(),
    ];
    if actual.iter().flatten().any(|dir| normalize(dir) == normalized) {
        return true;
    }

    let text = normalized.to_string_lossy();
    let text: &str = if text.len() > 1 {
        text.trim_end_matches(['/', '\\'])
    } else {
        text.as_ref()
    };
    path_patterns().iter().any(|re| re.is_match(text))
}

/// Walk up from `start` looking for a directory containing a `.git` entry.
pub fn discover_repo_root(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// The git double gate. Returns the canonical directory git may run in.
pub fn check_git_directory(cwd: &Path) -> ToolResult<PathBuf> {
    if is_dangerous_path(cwd) {
        return Err(ToolError::PathSafetyViolation {
            path: cwd.to_path_buf(),
        });
    }

    let canonical = cwd
        .canonicalize()
        .map_err(|e| ToolError::io("Cannot resolve directory", cwd, e))?;
    if is_dangerous_path(&canonical) {
        return Err(ToolError::PathSafetyViolation { path: canonical });
    }

    let root = discover_repo_root(&canonical)
        .ok_or_else(|| ToolError::NotARepository(canonical.clone()))?;

    if root.to_string_lossy() != canonical.to_string_lossy() {
        warn!(
            "git refused in {}: enclosing repository is {}",
            canonical.display(),
            root.display()
        );
        return Err(ToolError::GitRootMismatch {
            requested: canonical,
            discovered: root,
        });
    }

    Ok(canonical)
}

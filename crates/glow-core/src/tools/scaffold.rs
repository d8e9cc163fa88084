//! Project scaffolding: `create_project`.
//!
//! A template is a fixed set of starter files plus post-install commands.
//! Commands run one after another in the new project directory; later steps
//! depend on earlier ones, so the first failure stops the sequence.

use serde::Deserialize;
use serde_json::{json, Value};
use std::path::Path;
use tracing::{debug, info};

use crate::error::{ToolError, ToolResult};
use crate::exec::CommandSpec;
use crate::safety::check_command;
use crate::watcher::{ChangeKind, FileChange};

use super::executor::ToolContext;

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct CreateProjectArgs {
    pub template: String,
    pub directory: String,
}

/// A named starter project. `{name}` in file contents is replaced with the
/// project directory's name. `package.json`, when present, is built as JSON
/// so the name is always escaped.
pub struct Template {
    pub name: &'static str,
    pub package_json: Option<fn(&str) -> Value>,
    pub files: &'static [(&'static str, &'static str)],
    pub commands: &'static [&'static str],
}

const HTML_FILES: &[(&str, &str)] = &[
    (
        "index.html",
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <meta name="viewport" content="width=device-width, initial-scale=1.0">
  <title>{name}</title>
  <link rel="stylesheet" href="styles.css">
</head>
<body>
  <main>
    <h1>{name}</h1>
  </main>
  <script src="script.js"></script>
</body>
</html>
"#,
    ),
    (
        "styles.css",
        "body {\n  font-family: system-ui, sans-serif;\n  margin: 0;\n  padding: 2rem;\n}\n",
    ),
    ("script.js", "console.log('{name} loaded');\n"),
];

fn node_package(name: &str) -> Value {
    json!({
        "name": name,
        "version": "0.1.0",
        "private": true,
        "main": "index.js",
        "scripts": {
            "start": "node index.js"
        }
    })
}

const NODE_FILES: &[(&str, &str)] = &[
    ("index.js", "console.log('Hello from {name}');\n"),
    (".gitignore", "node_modules/\n"),
];

fn react_vite_package(name: &str) -> Value {
    json!({
        "name": name,
        "version": "0.1.0",
        "private": true,
        "type": "module",
        "scripts": {
            "dev": "vite",
            "build": "vite build",
            "preview": "vite preview"
        },
        "dependencies": {
            "react": "^18.2.0",
            "react-dom": "^18.2.0"
        },
        "devDependencies": {
            "@vitejs/plugin-react": "^4.2.0",
            "vite": "^5.0.0"
        }
    })
}

const REACT_VITE_FILES: &[(&str, &str)] = &[
    (
        "vite.config.js",
        "import { defineConfig } from 'vite'\nimport react from '@vitejs/plugin-react'\n\nexport default defineConfig({\n  plugins: [react()],\n})\n",
    ),
    (
        "index.html",
        r#"<!DOCTYPE html>
<html lang="en">
<head>
  <meta charset="UTF-8">
  <title>{name}</title>
</head>
<body>
  <div id="root"></div>
  <script type="module" src="/src/main.jsx"></script>
</body>
</html>
"#,
    ),
    (
        "src/main.jsx",
        "import React from 'react'\nimport ReactDOM from 'react-dom/client'\nimport App from './App.jsx'\n\nReactDOM.createRoot(document.getElementById('root')).render(<App />)\n",
    ),
    (
        "src/App.jsx",
        "export default function App() {\n  return <h1>{name}</h1>\n}\n",
    ),
    (".gitignore", "node_modules/\ndist/\n"),
];

const PYTHON_FILES: &[(&str, &str)] = &[
    (
        "main.py",
        "def main():\n    print(\"Hello from {name}\")\n\n\nif __name__ == \"__main__\":\n    main()\n",
    ),
    ("requirements.txt", ""),
    (".gitignore", ".venv/\n__pycache__/\n"),
];

pub const TEMPLATES: &[Template] = &[
    Template {
        name: "html",
        package_json: None,
        files: HTML_FILES,
        commands: &[],
    },
    Template {
        name: "node",
        package_json: Some(node_package),
        files: NODE_FILES,
        commands: &["npm install"],
    },
    Template {
        name: "react-vite",
        package_json: Some(react_vite_package),
        files: REACT_VITE_FILES,
        commands: &["npm install"],
    },
    Template {
        name: "python",
        package_json: None,
        files: PYTHON_FILES,
        commands: &[
            "python3 -m venv .venv",
            ".venv/bin/pip install -r requirements.txt",
        ],
    },
];

pub fn find_template(name: &str) -> ToolResult<&'static Template> {
    TEMPLATES
        .iter()
        .find(|t| t.name == name)
        .ok_or_else(|| ToolError::UnknownTemplate {
            name: name.to_string(),
            available: TEMPLATES
                .iter()
                .map(|t| t.name)
                .collect::<Vec<_>>()
                .join(", "),
        })
}

async fn is_non_empty_dir(path: &Path) -> ToolResult<bool> {
    match tokio::fs::read_dir(path).await {
        Ok(mut entries) => Ok(entries
            .next_entry()
            .await
            .map_err(|e| ToolError::io("Failed to inspect", path, e))?
            .is_some()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(ToolError::io("Failed to inspect", path, e)),
    }
}

/// Execute the `create_project` tool.
pub async fn execute_create_project(
    args: CreateProjectArgs,
    ctx: &ToolContext<'_>,
) -> ToolResult<String> {
    let template = find_template(&args.template)?;
    let dir = ctx.context.resolve(&args.directory);

    if is_non_empty_dir(&dir).await? {
        return Err(ToolError::InvalidArguments {
            tool: "create_project".to_string(),
            message: format!("{} already exists and is not empty", dir.display()),
        });
    }

    let project_name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "project".to_string());

    let mut log = vec![format!(
        "Created {} project at {}",
        template.name,
        dir.display()
    )];

    let mut files: Vec<(&str, String)> = Vec::new();
    if let Some(package_json) = template.package_json {
        files.push(("package.json", format!("{:#}\n", package_json(&project_name))));
    }
    files.extend(
        template
            .files
            .iter()
            .map(|(relative, content)| (*relative, content.replace("{name}", &project_name))),
    );

    for (relative, content) in files {
        let path = dir.join(relative);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| ToolError::io("Failed to create directory", parent, e))?;
        }
        tokio::fs::write(&path, content)
            .await
            .map_err(|e| ToolError::io("Failed to create", &path, e))?;
        ctx.publish(FileChange::new(path, ChangeKind::Create));
        log.push(format!("  + {}", relative));
    }

    for command in template.commands {
        check_command(command)?;
        debug!("create_project: running {}", command);
        match ctx
            .run(CommandSpec::shell(
                command,
                dir.clone(),
                ctx.settings.command_timeout,
            ))
            .await
        {
            Ok(_) => log.push(format!("$ {} (ok)", command)),
            Err(e) => {
                log.push(format!("$ {} (failed)", command));
                return Err(ToolError::CommandFailed(format!(
                    "{}\n{}",
                    log.join("\n"),
                    e
                )));
            }
        }
    }

    info!(
        "Scaffolded {} project in {}",
        template.name,
        dir.display()
    );
    Ok(log.join("\n"))
}

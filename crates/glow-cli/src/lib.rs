//! glow CLI - command-line entry point for the agent runtime.

mod cli_args;
mod commands;

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use tracing::debug;

use glow_config::Config;

pub use cli_args::{Cli, Command};

const GLOW_CRATES: [&str; 6] = [
    "glow",
    "glow_cli",
    "glow_core",
    "glow_browser",
    "glow_providers",
    "glow_config",
];

pub async fn run() -> Result<()> {
    let cli = Cli::parse();

    initialize_logging(&cli);

    let workspace_dir = determine_workspace_dir(&cli)?;
    debug!("workspace: {}", workspace_dir.display());

    // The catalog needs no configuration or credentials.
    if let Command::Tools { format } = &cli.command {
        return commands::print_tools(format);
    }

    let config = Config::load(cli.config.as_deref())?;

    match cli.command {
        Command::Run { task, model } => {
            commands::run_agent(&config, workspace_dir, &task, model.as_deref()).await
        }
        Command::Browse {
            task,
            max_steps,
            webdriver,
            headless,
        } => commands::browse(&config, &task, max_steps, webdriver.as_deref(), headless).await,
        Command::Serve { port, webdriver } => {
            commands::serve(&config, workspace_dir, port, webdriver.as_deref()).await
        }
        Command::Tools { .. } => Ok(()),
    }
}

fn initialize_logging(cli: &Cli) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let level = if cli.verbose { "debug" } else { "info" };
    let mut filter = EnvFilter::from_default_env();
    for krate in GLOW_CRATES {
        if let Ok(directive) = format!("{}={}", krate, level).parse() {
            filter = filter.add_directive(directive);
        }
    }

    // stdout carries JSON results
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn determine_workspace_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.workspace {
        Some(ws) => ws
            .canonicalize()
            .with_context(|| format!("Workspace directory {} does not exist", ws.display())),
        None => Ok(std::env::current_dir()?),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_run_with_globals_after_subcommand() {
        let cli = Cli::try_parse_from(["glow", "run", "make a landing page", "--model", "gemini", "-v"]).unwrap();
        assert!(cli.verbose);
        match cli.command {
            Command::Run { task, model } => {
                assert_eq!(task, "make a landing page");
                assert_eq!(model.as_deref(), Some("gemini"));
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_parse_browse() {
        let cli = Cli::try_parse_from([
            "glow",
            "--config",
            "glow.toml",
            "browse",
            "find lunch near Gangnam",
            "--max-steps",
            "6",
            "--webdriver",
            "http://localhost:9515",
        ])
        .unwrap();
        assert_eq!(cli.config.as_deref(), Some("glow.toml"));
        match cli.command {
            Command::Browse {
                max_steps,
                webdriver,
                headless,
                ..
            } => {
                assert_eq!(max_steps, Some(6));
                assert_eq!(webdriver.as_deref(), Some("http://localhost:9515"));
                assert!(!headless);
            }
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_subcommand_is_required() {
        assert!(Cli::try_parse_from(["glow"]).is_err());
        assert!(Cli::try_parse_from(["glow", "tools", "--format", "gemini"]).is_ok());
    }

    #[test]
    fn test_workspace_must_exist() {
        let dir = tempfile::TempDir::new().unwrap();
        let cli = Cli::try_parse_from(["glow", "-w", dir.path().to_str().unwrap(), "tools"]).unwrap();
        assert_eq!(
            determine_workspace_dir(&cli).unwrap(),
            dir.path().canonicalize().unwrap()
        );

        let missing = dir.path().join("missing");
        let cli = Cli::try_parse_from(["glow", "-w", missing.to_str().unwrap(), "tools"]).unwrap();
        assert!(determine_workspace_dir(&cli).is_err());
    }
}

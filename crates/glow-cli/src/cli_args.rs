//! CLI argument parsing for glow.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Clone, Debug)]
#[command(name = "glow")]
#[command(about = "Tool-calling agent runtime with browser automation")]
#[command(version)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Workspace directory (defaults to current directory)
    #[arg(short, long, global = true)]
    pub workspace: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Clone, Debug)]
pub enum Command {
    /// Run the tool-calling agent loop on a task
    Run {
        task: String,

        /// Provider reference to use (e.g. 'openai.default' or 'gemini')
        #[arg(long, value_name = "MODEL")]
        model: Option<String>,
    },

    /// Drive a browser window through a task with the vision model
    Browse {
        task: String,

        /// Maximum observe/act cycles
        #[arg(long, value_name = "N")]
        max_steps: Option<usize>,

        /// WebDriver server URL (overrides [browser].webdriver_url)
        #[arg(long, value_name = "URL")]
        webdriver: Option<String>,

        /// Run the browser without a visible window
        #[arg(long)]
        headless: bool,
    },

    /// Serve the loopback control endpoint and log workspace changes
    Serve {
        /// Port to bind to (overrides [server].port)
        #[arg(long)]
        port: Option<u16>,

        #[arg(long, value_name = "URL")]
        webdriver: Option<String>,
    },

    /// Print the tool catalog in a provider's declaration format
    Tools {
        /// openai, openai_compatible or gemini
        #[arg(long, default_value = "openai")]
        format: String,
    },
}

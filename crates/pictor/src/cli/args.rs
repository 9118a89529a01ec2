use clap::{Parser, Subcommand};

/// Chat with a language model that can generate images.
#[derive(Parser)]
#[command(version, about, long_about = None, author)]
pub struct Cli {
    /// Model to use (overrides the config file and PICTOR_MODEL)
    #[arg(short, long)]
    pub model: Option<String>,

    /// Subcommands
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum Commands {
    /// Start an interactive chat (default)
    Chat,
    /// Manage the configuration file
    Config {
        #[command(subcommand)]
        action: ConfigCommands,
    },
    /// Print the client-side tool declarations as JSON
    Schema,
}

#[derive(Subcommand, Clone, Debug, PartialEq, Eq)]
pub enum ConfigCommands {
    /// Write the default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Show the effective configuration
    Show,
}

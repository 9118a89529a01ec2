use clap::Parser;
use eyre::Result;

use pictor::cli::{Cli, Commands, ConfigCommands};
use pictor::commands::{
    Command,
    chat::ChatCommand,
    config::{ConfigAction, ConfigCommand},
    schema::SchemaCommand,
};

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();

    pictor_core::config::load_env();

    // Level configured via RUST_LOG
    pictor_core::utils::tracing::init_tracing()?;

    match cli.command.unwrap_or(Commands::Chat) {
        Commands::Chat => {
            let mut config = pictor_core::config::load_config()?;
            if let Some(model) = cli.model {
                config.model = model;
            }
            ChatCommand { config }.execute().await
        }
        Commands::Config { action } => {
            let cmd = ConfigCommand {
                action: match action {
                    ConfigCommands::Init { force } => ConfigAction::Init { force },
                    ConfigCommands::Show => ConfigAction::Show,
                },
            };
            cmd.execute().await
        }
        Commands::Schema => SchemaCommand.execute().await,
    }
}

use super::Command;
use crate::error::Error;
use async_trait::async_trait;
use eyre::Result;
use pictor_core::config::{self, Config};
use std::io::Write;

pub struct ConfigCommand {
    pub action: ConfigAction,
}

pub enum ConfigAction {
    Init { force: bool },
    Show,
}

#[async_trait]
impl Command for ConfigCommand {
    async fn execute(&self) -> Result<()> {
        match &self.action {
            ConfigAction::Init { force } => self.init(*force).map_err(Into::into),
            ConfigAction::Show => self.show().map_err(Into::into),
        }
    }
}

impl ConfigCommand {
    fn init(&self, force: bool) -> std::result::Result<(), Error> {
        let path = config::init_config(force)?;
        let mut stdout = std::io::stdout();
        writeln!(stdout, "Wrote default configuration to {}", path.display())?;
        Ok(())
    }

    fn show(&self) -> std::result::Result<(), Error> {
        let path = config::get_config_path()?;
        let config = config::load_config()?;

        let mut stdout = std::io::stdout();
        writeln!(stdout, "Config file: {}", path.display())?;
        write_summary(&mut stdout, &config)?;
        Ok(())
    }
}

fn write_summary(out: &mut impl Write, config: &Config) -> std::result::Result<(), Error> {
    writeln!(out, "\n{}", toml::to_string_pretty(config)?)?;
    let key_status = if config.api_key.is_some() {
        "set"
    } else {
        "not set"
    };
    writeln!(out, "{}: {key_status}", config::ENV_OPENAI_API_KEY)?;
    Ok(())
}

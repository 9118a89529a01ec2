use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub const DEFAULT_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_SYSTEM_PROMPT: &str = "You are a helpful assistant that can generate images. \
When the user asks you to create or generate an image, use the generateTextToImage tool. \
Otherwise reply as a helpful assistant";
pub const DEFAULT_STREAM_TIMEOUT_SECS: u64 = 30;

pub const ENV_OPENAI_API_KEY: &str = "OPENAI_API_KEY";
pub const ENV_OPENAI_BASE_URL: &str = "OPENAI_BASE_URL";
pub const ENV_MODEL: &str = "PICTOR_MODEL";
pub const ENV_IMAGE_ENDPOINT: &str = "PICTOR_IMAGE_ENDPOINT";
pub const ENV_IMAGE_API_KEY: &str = "PICTOR_IMAGE_API_KEY";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub system_prompt: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_base_url: Option<String>,
    /// Read from the environment only.
    #[serde(skip)]
    pub api_key: Option<String>,
    pub stream_timeout_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_endpoint: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_api_key: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            system_prompt: DEFAULT_SYSTEM_PROMPT.to_string(),
            api_base_url: None,
            api_key: None,
            stream_timeout_secs: DEFAULT_STREAM_TIMEOUT_SECS,
            image_endpoint: None,
            image_api_key: None,
        }
    }
}

impl Config {
    pub fn apply_env_overrides(&mut self) {
        self.apply_env(&StdEnvProvider);
    }

    fn apply_env(&mut self, env: &dyn EnvProvider) {
        if let Some(key) = env.var(ENV_OPENAI_API_KEY) {
            self.api_key = Some(key);
        }
        if let Some(url) = env.var(ENV_OPENAI_BASE_URL) {
            self.api_base_url = Some(url);
        }
        if let Some(model) = env.var(ENV_MODEL) {
            self.model = model;
        }
        if let Some(endpoint) = env.var(ENV_IMAGE_ENDPOINT) {
            self.image_endpoint = Some(endpoint);
        }
        if let Some(key) = env.var(ENV_IMAGE_API_KEY) {
            self.image_api_key = Some(key);
        }
    }

    pub fn require_api_key(&self) -> Result<&str> {
        self.api_key.as_deref().ok_or_else(|| {
            Error::Configuration(format!("{ENV_OPENAI_API_KEY} is not set"))
        })
    }

    pub fn require_image_endpoint(&self) -> Result<&str> {
        self.image_endpoint.as_deref().ok_or_else(|| {
            Error::Configuration(format!(
                "No image endpoint configured. Set image_endpoint in the config file or {ENV_IMAGE_ENDPOINT}"
            ))
        })
    }
}

/// Loads `.env` from the working directory if present.
pub fn load_env() {
    if let Err(e) = dotenvy::dotenv()
        && !e.not_found()
    {
        tracing::warn!(target: "pictor::config", error = %e, "Failed to load .env file");
    }
}

/// Get the path to the config file
pub fn get_config_path() -> Result<PathBuf> {
    let config_dir = dirs::config_dir()
        .ok_or_else(|| Error::Configuration("Could not find config directory".to_string()))?
        .join("pictor");

    fs::create_dir_all(&config_dir)
        .map_err(|e| Error::Configuration(format!("Failed to create config directory: {e}")))?;

    Ok(config_dir.join("config.toml"))
}

/// Load the configuration file and apply environment overrides.
pub fn load_config() -> Result<Config> {
    let mut config = load_config_from(&get_config_path()?)?;
    config.apply_env_overrides();
    Ok(config)
}

/// Missing files yield the defaults. Missing keys take their default value.
pub fn load_config_from(path: &Path) -> Result<Config> {
    if !path.exists() {
        return Ok(Config::default());
    }

    let config_str = fs::read_to_string(path)
        .map_err(|e| Error::Configuration(format!("Failed to read config file: {e}")))?;

    Ok(toml::from_str(&config_str)?)
}

/// Write the default configuration. Returns the path written.
pub fn init_config(force: bool) -> Result<PathBuf> {
    let config_path = get_config_path()?;
    init_config_at(&config_path, force)?;
    Ok(config_path)
}

pub fn init_config_at(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        return Err(Error::Configuration(
            "Config file already exists. Use --force to overwrite.".to_string(),
        ));
    }

    let config_toml = toml::to_string_pretty(&Config::default())?;

    fs::write(path, config_toml)
        .map_err(|e| Error::Configuration(format!("Failed to write config file: {e}")))?;

    Ok(())
}

trait EnvProvider: Send + Sync {
    fn var(&self, key: &str) -> Option<String>;
}

struct StdEnvProvider;

impl EnvProvider for StdEnvProvider {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[derive(Default)]
    struct TestEnvProvider {
        vars: HashMap<String, String>,
    }

    impl EnvProvider for TestEnvProvider {
        fn var(&self, key: &str) -> Option<String> {
            self.vars.get(key).cloned()
        }
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_from(&dir.path().join("config.toml")).expect("load");

        assert_eq!(config, Config::default());
        assert_eq!(config.model, "gpt-4o-mini");
        assert_eq!(config.stream_timeout_secs, 30);
    }

    #[test]
    fn partial_file_keeps_defaults_for_missing_keys() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(
            &path,
            "model = \"gpt-4o\"\nimage_endpoint = \"http://localhost:3000/api/generate\"\n",
        )
        .expect("write");

        let config = load_config_from(&path).expect("load");
        assert_eq!(config.model, "gpt-4o");
        assert_eq!(
            config.image_endpoint.as_deref(),
            Some("http://localhost:3000/api/generate")
        );
        assert_eq!(config.system_prompt, DEFAULT_SYSTEM_PROMPT);
    }

    #[test]
    fn invalid_toml_is_an_error() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "model = [").expect("write");

        assert!(matches!(load_config_from(&path), Err(Error::ConfigParse(_))));
    }

    #[test]
    fn init_refuses_to_overwrite_unless_forced() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("config.toml");

        init_config_at(&path, false).expect("first init");
        assert_eq!(load_config_from(&path).expect("load"), Config::default());

        fs::write(&path, "model = \"custom\"\n").expect("write");
        assert!(matches!(
            init_config_at(&path, false),
            Err(Error::Configuration(_))
        ));
        assert_eq!(load_config_from(&path).expect("load").model, "custom");

        init_config_at(&path, true).expect("forced init");
        assert_eq!(load_config_from(&path).expect("load").model, DEFAULT_MODEL);
    }

    #[test]
    fn environment_overrides_file_values() {
        let mut env = TestEnvProvider::default();
        env.vars.insert(ENV_OPENAI_API_KEY.into(), "sk-test".into());
        env.vars.insert(ENV_MODEL.into(), "gpt-4.1".into());
        env.vars
            .insert(ENV_IMAGE_ENDPOINT.into(), "https://images.example/api".into());
        env.vars.insert(ENV_IMAGE_API_KEY.into(), "img-key".into());

        let mut config = Config::default();
        config.apply_env(&env);

        assert_eq!(config.require_api_key().expect("key"), "sk-test");
        assert_eq!(config.model, "gpt-4.1");
        assert_eq!(
            config.require_image_endpoint().expect("endpoint"),
            "https://images.example/api"
        );
        assert_eq!(config.image_api_key.as_deref(), Some("img-key"));
        assert!(config.api_base_url.is_none());
    }

    #[test]
    fn api_key_is_never_written_to_disk() {
        let config = Config {
            api_key: Some("sk-secret".into()),
            ..Config::default()
        };
        let serialized = toml::to_string_pretty(&config).expect("serialize");
        assert!(!serialized.contains("sk-secret"));
    }
}

use crate::adapters::ModelConfig;
use crate::core::diff_parser::{DEFAULT_CONTEXT_LINES, DEFAULT_MIN_CHANGES};
use crate::core::ReviewMode;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

const CONFIG_FILE_NAMES: [&str; 2] = [".prscope.yml", ".prscope.yaml"];

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub github_token: Option<String>,
    pub github_webhook_secret: Option<String>,

    #[serde(default = "default_github_api_url")]
    pub github_api_url: String,

    pub openai_api_key: Option<String>,
    pub openai_base_url: Option<String>,

    #[serde(default = "default_model")]
    pub openai_model: String,

    #[serde(default = "default_temperature")]
    pub temperature: f32,

    #[serde(default = "default_max_tokens")]
    pub max_tokens: usize,

    pub system_prompt: Option<String>,

    #[serde(default)]
    pub review_mode: ReviewMode,

    #[serde(default = "default_min_changes")]
    pub min_changes: usize,

    #[serde(default = "default_context_lines")]
    pub context_lines: usize,

    #[serde(default = "default_host")]
    pub host: String,

    #[serde(default = "default_port")]
    pub port: u16,

    #[serde(default = "default_environment")]
    pub environment: String,

    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            github_token: None,
            github_webhook_secret: None,
            github_api_url: default_github_api_url(),
            openai_api_key: None,
            openai_base_url: None,
            openai_model: default_model(),
            temperature: default_temperature(),
            max_tokens: default_max_tokens(),
            system_prompt: None,
            review_mode: ReviewMode::default(),
            min_changes: default_min_changes(),
            context_lines: default_context_lines(),
            host: default_host(),
            port: default_port(),
            environment: default_environment(),
            log_level: default_log_level(),
        }
    }
}

impl Config {
    /// Loads the first config file found (working directory, then home
    /// directory) and applies environment overrides on top.
    pub fn load() -> Result<Self> {
        let mut candidates: Vec<PathBuf> = CONFIG_FILE_NAMES
            .iter()
            .map(|name| PathBuf::from(*name))
            .collect();
        if let Some(home_dir) = dirs::home_dir() {
            candidates.push(home_dir.join(CONFIG_FILE_NAMES[0]));
        }

        let mut config = Self::load_from(&candidates)?;
        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn load_from(candidates: &[PathBuf]) -> Result<Self> {
        for path in candidates {
            if path.exists() {
                return Self::from_file(path);
            }
        }
        Ok(Config::default())
    }

    fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let config: Config = serde_yaml::from_str(&content)
            .with_context(|| format!("Invalid config file {}", path.display()))?;
        Ok(config)
    }

    /// Overrides fields from environment variables. Unparseable numeric
    /// values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(token) = get("GITHUB_TOKEN") {
            self.github_token = Some(token);
        }
        if let Some(secret) = get("GITHUB_WEBHOOK_SECRET") {
            self.github_webhook_secret = Some(secret);
        }
        if let Some(url) = get("GITHUB_API_URL") {
            self.github_api_url = url;
        }
        if let Some(key) = get("OPENAI_API_KEY") {
            self.openai_api_key = Some(key);
        }
        if let Some(url) = get("OPENAI_BASE_URL") {
            self.openai_base_url = Some(url);
        }
        if let Some(model) = get("OPENAI_MODEL") {
            self.openai_model = model;
        }
        if let Some(host) = get("HOST") {
            self.host = host;
        }
        if let Some(port) = get("PORT").and_then(|p| p.trim().parse().ok()) {
            self.port = port;
        }
        if let Some(environment) = get("ENVIRONMENT") {
            self.environment = environment;
        }
        if let Some(level) = get("LOG_LEVEL") {
            self.log_level = level.to_lowercase();
        }
    }

    pub fn merge_with_cli(&mut self, cli_model: Option<String>, cli_mode: Option<ReviewMode>) {
        if let Some(model) = cli_model {
            self.openai_model = model;
        }
        if let Some(mode) = cli_mode {
            self.review_mode = mode;
        }
    }

    pub fn is_development(&self) -> bool {
        self.environment.eq_ignore_ascii_case("development")
    }

    /// Fails unless the credentials needed to serve webhooks are present.
    pub fn validate_for_server(&self) -> Result<()> {
        if self.github_webhook_secret.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("GITHUB_WEBHOOK_SECRET must be set to verify webhook deliveries");
        }
        if self.github_token.as_deref().map_or(true, str::is_empty) {
            anyhow::bail!("GITHUB_TOKEN must be set to read diffs and post reviews");
        }
        Ok(())
    }

    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            model_name: self.openai_model.clone(),
            api_key: self.openai_api_key.clone(),
            base_url: self.openai_base_url.clone(),
            temperature: self.temperature,
            max_tokens: self.max_tokens,
        }
    }
}

fn default_github_api_url() -> String {
    "https://api.github.com".to_string()
}

fn default_model() -> String {
    "gpt-4".to_string()
}

fn default_temperature() -> f32 {
    0.3
}

fn default_max_tokens() -> usize {
    1000
}

fn default_min_changes() -> usize {
    DEFAULT_MIN_CHANGES
}

fn default_context_lines() -> usize {
    DEFAULT_CONTEXT_LINES
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8000
}

fn default_environment() -> String {
    "development".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

use std::path::PathBuf;

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

const CONFIG_FILE: &str = "aem_scraper";

fn default_timeout_secs() -> u64 {
    30
}

fn default_concurrency() -> usize {
    8
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("data/fetch_cache.sqlite")
}

fn default_max_depth() -> usize {
    64
}

fn default_path_separator() -> String {
    " > ".to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from("out")
}

/// Run settings: `aem_scraper.toml` (optional), then `AEM_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// AEM author origin, e.g. `https://author.example.com`
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Value of the `login-token` cookie, used instead of basic auth when set
    #[serde(default)]
    pub login_token: Option<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
    #[serde(default = "default_cache_path")]
    pub cache_path: PathBuf,
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    #[serde(default = "default_path_separator")]
    pub path_separator: String,
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            host: String::new(),
            username: None,
            password: None,
            login_token: None,
            timeout_secs: default_timeout_secs(),
            concurrency: default_concurrency(),
            cache_path: default_cache_path(),
            max_depth: default_max_depth(),
            path_separator: default_path_separator(),
            output_dir: default_output_dir(),
        }
    }
}

impl Settings {
    pub fn load() -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(CONFIG_FILE).required(false))
            .add_source(Environment::with_prefix("AEM"))
            .build()?
            .try_deserialize::<Settings>()?;
        Ok(settings.normalized())
    }

    fn normalized(mut self) -> Self {
        self.host = self.host.trim_end_matches('/').to_string();
        if self.concurrency == 0 {
            self.concurrency = 1;
        }
        self
    }
}

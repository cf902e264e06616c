use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const ENV_BASE_URL: &str = "OPENAI_BASE_URL";

/// User configuration read from `config.toml`. Every field is optional in
/// the file; missing fields take their defaults.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key.
    pub api_key_env: String,
    pub python_command: String,
    pub node_command: String,
    /// Template for the system turn; `{tools}` is replaced by one line per tool.
    pub system_prompt: String,
}

impl Config {
    /// Applies environment overrides. `lookup` is `std::env::var` outside of
    /// tests.
    pub fn apply_env_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(base_url) = lookup(ENV_BASE_URL).filter(|value| !value.trim().is_empty()) {
            self.base_url = base_url.trim().to_string();
        }
    }

    pub fn api_key(&self, lookup: impl Fn(&str) -> Option<String>) -> Option<String> {
        lookup(&self.api_key_env)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
    }
}

pub fn path_display<P: AsRef<Path>>(path: P) -> String {
    let path = path.as_ref();

    #[cfg(unix)]
    {
        if let Some(home) = std::env::var_os("HOME") {
            let home_path = PathBuf::from(home);
            if let Ok(relative) = path.strip_prefix(&home_path) {
                return format!("~/{}", relative.display());
            }
        }
    }

    path.display().to_string()
}

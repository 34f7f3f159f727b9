//! Environment configuration.

use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chat_api::{normalize_base_url, ChatApiConfig};

#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub api_url: Option<String>,
    pub store_dir: Option<String>,
    pub timeout: Option<Duration>,
    pub streaming: bool,
    pub log_filter: Option<String>,
}

impl EnvConfig {
    pub fn from_env() -> Self {
        Self {
            api_url: env_string_opt("GENE_CHAT_API_URL"),
            store_dir: env_string_opt("GENE_CHAT_STORE_DIR"),
            timeout: env_u64_opt("GENE_CHAT_TIMEOUT_SEC").map(Duration::from_secs),
            streaming: env_flag_or("GENE_CHAT_STREAM", true),
            log_filter: env_string_opt("GENE_CHAT_LOG"),
        }
    }

    pub fn api_config(&self) -> ChatApiConfig {
        let mut config = match self.api_url.as_deref() {
            Some(url) => ChatApiConfig::new(normalize_base_url(url)),
            None => ChatApiConfig::default(),
        };
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout);
        }
        config
    }

    /// Directory holding the conversation record; defaults under `cwd`.
    pub fn store_root(&self, cwd: &Path) -> PathBuf {
        match self.store_dir.as_deref() {
            Some(dir) => PathBuf::from(dir),
            None => conversation_store::store_root(cwd),
        }
    }
}

fn env_flag_or(key: &str, default: bool) -> bool {
    env::var(key)
        .map(|value| value.trim() == "1")
        .unwrap_or(default)
}

fn env_string_opt(key: &str) -> Option<String> {
    env::var(key).ok().and_then(|value| {
        if value.trim().is_empty() {
            None
        } else {
            Some(value)
        }
    })
}

fn env_u64_opt(key: &str) -> Option<u64> {
    env_string_opt(key).and_then(|value| value.trim().parse().ok())
}

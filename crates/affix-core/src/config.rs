//! Configuration module
//!
//! Environment-driven configuration for the storage tiers and upload
//! behavior. Values are read once at startup; `.env` files are honored in
//! development.

use std::env;

const DEFAULT_CACHE_KEY: &str = "cache";
const DEFAULT_STORE_KEY: &str = "store";
const DEFAULT_BACKEND: &str = "memory";

#[derive(Clone, Debug)]
pub struct Config {
    /// Symbolic key of the transient tier.
    pub cache_key: String,
    /// Symbolic key of the permanent tier.
    pub store_key: String,
    /// Backend kind for each tier: "memory" or "local".
    pub cache_backend: String,
    pub store_backend: String,
    /// Root directory for the local backend.
    pub local_storage_path: Option<String>,
    /// Base URL the local backend serves files from.
    pub local_storage_base_url: Option<String>,
    // Upload validation
    pub max_file_size_bytes: Option<u64>,
    pub allowed_mime_types: Option<Vec<String>>,
    pub allowed_extensions: Option<Vec<String>>,
    // Derivative processing behavior
    pub create_on_promote: bool,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            cache_key: DEFAULT_CACHE_KEY.to_string(),
            store_key: DEFAULT_STORE_KEY.to_string(),
            cache_backend: DEFAULT_BACKEND.to_string(),
            store_backend: DEFAULT_BACKEND.to_string(),
            local_storage_path: None,
            local_storage_base_url: None,
            max_file_size_bytes: None,
            allowed_mime_types: None,
            allowed_extensions: None,
            create_on_promote: false,
        }
    }
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        let defaults = Config::default();

        Config {
            cache_key: env_string("AFFIX_CACHE_KEY").unwrap_or(defaults.cache_key),
            store_key: env_string("AFFIX_STORE_KEY").unwrap_or(defaults.store_key),
            cache_backend: env_string("AFFIX_CACHE_BACKEND").unwrap_or(defaults.cache_backend),
            store_backend: env_string("AFFIX_STORE_BACKEND").unwrap_or(defaults.store_backend),
            local_storage_path: env_string("AFFIX_LOCAL_STORAGE_PATH"),
            local_storage_base_url: env_string("AFFIX_LOCAL_STORAGE_BASE_URL"),
            max_file_size_bytes: env_string("AFFIX_MAX_FILE_SIZE_BYTES")
                .and_then(|value| value.parse().ok()),
            allowed_mime_types: env_list("AFFIX_ALLOWED_MIME_TYPES"),
            allowed_extensions: env_list("AFFIX_ALLOWED_EXTENSIONS"),
            create_on_promote: env_bool("AFFIX_CREATE_ON_PROMOTE"),
        }
    }
}

fn env_string(name: &str) -> Option<String> {
    env::var(name).ok().filter(|value| !value.is_empty())
}

fn env_list(name: &str) -> Option<Vec<String>> {
    env_string(name).map(|value| {
        value
            .split(',')
            .map(|item| item.trim().to_string())
            .filter(|item| !item.is_empty())
            .collect()
    })
}

fn env_bool(name: &str) -> bool {
    matches!(
        env_string(name).as_deref(),
        Some("1") | Some("true") | Some("yes")
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.cache_key, "cache");
        assert_eq!(config.store_key, "store");
        assert_eq!(config.cache_backend, "memory");
        assert!(!config.create_on_promote);
    }
}

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Connection settings for one hosted backend deployment.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct BackendConfig {
    /// Base URL of the deployment, e.g. `https://xyz.example.co`.
    pub url: String,
    /// Anonymous API key; row-level access control does the real gating.
    pub anon_key: String,
    /// Bucket for item photos; defaults to `item-photos` when absent.
    pub photo_bucket: Option<String>,
}

impl BackendConfig {
    pub fn photo_bucket(&self) -> &str {
        self.photo_bucket
            .as_deref()
            .unwrap_or(crate::photos::DEFAULT_PHOTO_BUCKET)
    }
}

pub fn default_config_path() -> PathBuf {
    PathBuf::from("homestash.toml")
}

pub fn load_config(path: Option<&Path>) -> anyhow::Result<Option<BackendConfig>> {
    let path = path.map(Path::to_path_buf).unwrap_or_else(default_config_path);
    if !path.exists() {
        return Ok(None);
    }

    let contents = std::fs::read_to_string(&path)?;
    let config: BackendConfig = toml::from_str(&contents)?;
    Ok(Some(config))
}

pub fn write_config(path: &Path, config: &BackendConfig, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!("config already exists at {} (use force to overwrite)", path.display());
    }

    let contents = toml::to_string_pretty(config)?;
    std::fs::write(path, contents)?;
    Ok(())
}

/// Build a config from `HOMESTASH_URL` and `HOMESTASH_ANON_KEY`, with
/// `HOMESTASH_PHOTO_BUCKET` optional. Returns `None` unless both required
/// variables are set.
pub fn from_env() -> Option<BackendConfig> {
    let url = std::env::var("HOMESTASH_URL").ok()?;
    let anon_key = std::env::var("HOMESTASH_ANON_KEY").ok()?;
    Some(BackendConfig {
        url,
        anon_key,
        photo_bucket: std::env::var("HOMESTASH_PHOTO_BUCKET").ok(),
    })
}

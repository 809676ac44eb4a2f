use serde::Deserialize;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::models::PreviewMode;

/// Application configuration
#[derive(Debug, Clone, Deserialize, Default)]
pub struct Config {
    #[serde(default)]
    pub backend: BackendConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub preview: PreviewConfig,
    #[serde(default)]
    pub chat: ChatConfig,
}

/// Which backend implementation serves auth, tables and objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Local,
    Rest,
}

impl BackendKind {
    fn from_str(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "local" => Some(BackendKind::Local),
            "rest" => Some(BackendKind::Rest),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    #[serde(default = "default_backend_kind")]
    pub kind: BackendKind,
    #[serde(default)]
    pub url: String,
    #[serde(default)]
    pub anon_key: String,
    #[serde(default = "default_bucket")]
    pub bucket: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_db_path")]
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_local_path")]
    pub local_path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_token_path")]
    pub token_path: String,
    #[serde(default = "default_jwt_secret")]
    pub jwt_secret: String,
    #[serde(default = "default_token_ttl")]
    pub token_ttl_hours: u64,
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PreviewConfig {
    /// How PDF previews get their bytes: `signed_url` (renewed) or `in_memory`
    #[serde(default = "default_preview_mode")]
    pub mode: PreviewMode,
    #[serde(default = "default_signed_url_ttl")]
    pub signed_url_ttl_secs: u64,
    #[serde(default = "default_renew_interval")]
    pub renew_interval_secs: u64,
    #[serde(default = "default_download_dir")]
    pub download_dir: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatConfig {
    #[serde(default = "default_reply_delay")]
    pub reply_delay_ms: u64,
}

// Default values
fn default_backend_kind() -> BackendKind {
    BackendKind::Local
}

fn default_bucket() -> String {
    "documents".to_string()
}

fn default_db_path() -> String {
    "data/minder.db".to_string()
}

fn default_local_path() -> String {
    "data/objects".to_string()
}

fn default_token_path() -> String {
    "data/.session".to_string()
}

fn default_jwt_secret() -> String {
    "change-me-minder-local-secret".to_string()
}

fn default_token_ttl() -> u64 {
    24
}

fn default_login_url() -> String {
    "/auth/login".to_string()
}

fn default_preview_mode() -> PreviewMode {
    PreviewMode::SignedUrl
}

fn preview_mode_from_str(s: &str) -> Option<PreviewMode> {
    match s.trim().to_lowercase().as_str() {
        "signed_url" => Some(PreviewMode::SignedUrl),
        "in_memory" => Some(PreviewMode::InMemory),
        _ => None,
    }
}

fn default_signed_url_ttl() -> u64 {
    60
}

fn default_renew_interval() -> u64 {
    45
}

fn default_download_dir() -> String {
    "downloads".to_string()
}

fn default_reply_delay() -> u64 {
    1000
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            kind: default_backend_kind(),
            url: String::new(),
            anon_key: String::new(),
            bucket: default_bucket(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_db_path(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            local_path: default_local_path(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            token_path: default_token_path(),
            jwt_secret: default_jwt_secret(),
            token_ttl_hours: default_token_ttl(),
            login_url: default_login_url(),
        }
    }
}

impl Default for PreviewConfig {
    fn default() -> Self {
        Self {
            mode: default_preview_mode(),
            signed_url_ttl_secs: default_signed_url_ttl(),
            renew_interval_secs: default_renew_interval(),
            download_dir: default_download_dir(),
        }
    }
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            reply_delay_ms: default_reply_delay(),
        }
    }
}

impl PreviewConfig {
    pub fn signed_url_ttl(&self) -> Duration {
        Duration::from_secs(self.signed_url_ttl_secs)
    }

    pub fn renew_interval(&self) -> Duration {
        Duration::from_secs(self.renew_interval_secs)
    }
}

impl ChatConfig {
    pub fn reply_delay(&self) -> Duration {
        Duration::from_millis(self.reply_delay_ms)
    }
}

impl Config {
    /// Load configuration from file and environment variables
    pub fn load() -> anyhow::Result<Self> {
        let mut config = Self::load_from_file()?;
        config.apply_env_overrides();
        config.validate()?;
        config.ensure_directories()?;
        if config.backend.kind == BackendKind::Local {
            config.ensure_jwt_secret()?;
        }
        tracing::debug!(
            "Backend config: kind={:?}, bucket={}, renew every {}s against a {}s TTL",
            config.backend.kind,
            config.backend.bucket,
            config.preview.renew_interval_secs,
            config.preview.signed_url_ttl_secs
        );
        Ok(config)
    }

    /// Load configuration from the first config file found
    fn load_from_file() -> anyhow::Result<Self> {
        let config_paths = ["minder.toml", "config.toml", "data/minder.toml"];

        for path in config_paths {
            if Path::new(path).exists() {
                let content = fs::read_to_string(path)?;
                let config = Self::from_toml(&content)?;
                tracing::info!("Loaded configuration from {}", path);
                return Ok(config);
            }
        }

        tracing::info!("No configuration file found, using defaults");
        Ok(Config::default())
    }

    fn from_toml(content: &str) -> anyhow::Result<Self> {
        Ok(toml::from_str(content)?)
    }

    /// Apply environment variable overrides
    /// Format: MINDER_CONF_<SECTION>_<KEY>, e.g. MINDER_CONF_PREVIEW_RENEW_INTERVAL_SECS
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| env::var(key).ok());
    }

    fn apply_overrides(&mut self, var: impl Fn(&str) -> Option<String>) {
        // Backend overrides
        if let Some(val) = var("MINDER_CONF_BACKEND_KIND") {
            match BackendKind::from_str(&val) {
                Some(kind) => self.backend.kind = kind,
                None => tracing::warn!("Ignoring unknown backend kind: {}", val),
            }
        }
        if let Some(val) = var("MINDER_CONF_BACKEND_URL") {
            self.backend.url = val;
        }
        if let Some(val) = var("MINDER_CONF_BACKEND_ANON_KEY") {
            self.backend.anon_key = val;
        }
        if let Some(val) = var("MINDER_CONF_BACKEND_BUCKET") {
            if !val.trim().is_empty() {
                self.backend.bucket = val;
            }
        }

        // Database overrides
        if let Some(val) = var("MINDER_CONF_DATABASE_PATH") {
            self.database.path = val;
        }

        // Storage overrides
        if let Some(val) = var("MINDER_CONF_STORAGE_LOCAL_PATH") {
            self.storage.local_path = val;
        }

        // Session overrides
        if let Some(val) = var("MINDER_CONF_SESSION_TOKEN_PATH") {
            self.session.token_path = val;
        }
        if let Some(val) = var("MINDER_CONF_SESSION_JWT_SECRET") {
            self.session.jwt_secret = val;
        }
        if let Some(val) = var("MINDER_CONF_SESSION_TOKEN_TTL_HOURS") {
            if let Ok(hours) = val.parse() {
                self.session.token_ttl_hours = hours;
            }
        }
        if let Some(val) = var("MINDER_CONF_SESSION_LOGIN_URL") {
            if !val.trim().is_empty() {
                self.session.login_url = val;
            }
        }

        // Preview overrides
        if let Some(val) = var("MINDER_CONF_PREVIEW_MODE") {
            match preview_mode_from_str(&val) {
                Some(mode) => self.preview.mode = mode,
                None => tracing::warn!("Ignoring unknown preview mode: {}", val),
            }
        }
        if let Some(val) = var("MINDER_CONF_PREVIEW_SIGNED_URL_TTL_SECS") {
            if let Ok(secs) = val.parse() {
                self.preview.signed_url_ttl_secs = secs;
            }
        }
        if let Some(val) = var("MINDER_CONF_PREVIEW_RENEW_INTERVAL_SECS") {
            if let Ok(secs) = val.parse() {
                self.preview.renew_interval_secs = secs;
            }
        }
        if let Some(val) = var("MINDER_CONF_PREVIEW_DOWNLOAD_DIR") {
            self.preview.download_dir = val;
        }

        // Chat overrides
        if let Some(val) = var("MINDER_CONF_CHAT_REPLY_DELAY_MS") {
            if let Ok(ms) = val.parse() {
                self.chat.reply_delay_ms = ms;
            }
        }
    }

    fn validate(&self) -> anyhow::Result<()> {
        if self.preview.renew_interval_secs == 0 {
            anyhow::bail!("preview.renew_interval_secs must be greater than zero");
        }
        if self.preview.renew_interval_secs >= self.preview.signed_url_ttl_secs {
            anyhow::bail!(
                "preview.renew_interval_secs ({}) must be shorter than preview.signed_url_ttl_secs ({})",
                self.preview.renew_interval_secs,
                self.preview.signed_url_ttl_secs
            );
        }
        if self.backend.kind == BackendKind::Rest && self.backend.url.trim().is_empty() {
            anyhow::bail!("backend.url is required for the rest backend");
        }
        Ok(())
    }

    /// Persisted signing secret, kept next to the database
    fn jwt_secret_path(&self) -> PathBuf {
        Path::new(&self.database.path)
            .parent()
            .unwrap_or_else(|| Path::new("."))
            .join(".jwt_secret")
    }

    /// Ensure the signing secret is not the shipped default and persists across runs
    fn ensure_jwt_secret(&mut self) -> anyhow::Result<()> {
        if self.session.jwt_secret == default_jwt_secret() || self.session.jwt_secret.is_empty() {
            let secret_path = self.jwt_secret_path();

            if secret_path.exists() {
                let secret = fs::read_to_string(&secret_path)?;
                self.session.jwt_secret = secret.trim().to_string();
                tracing::info!("Loaded persisted JWT secret from {:?}", secret_path);
            } else {
                let secret = uuid::Uuid::new_v4().to_string();

                if let Some(parent) = secret_path.parent() {
                    fs::create_dir_all(parent)?;
                }

                fs::write(&secret_path, &secret)?;
                self.session.jwt_secret = secret;
                tracing::info!("Generated and persisted new JWT secret to {:?}", secret_path);
            }
        }
        Ok(())
    }

    /// Ensure required directories exist
    fn ensure_directories(&self) -> anyhow::Result<()> {
        if let Some(parent) = Path::new(&self.session.token_path).parent() {
            fs::create_dir_all(parent)?;
        }

        if self.backend.kind == BackendKind::Local {
            if let Some(parent) = Path::new(&self.database.path).parent() {
                fs::create_dir_all(parent)?;
            }
            fs::create_dir_all(&self.storage.local_path)?;
        }

        Ok(())
    }
}

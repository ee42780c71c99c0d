//! Configuration loading and storage paths

use anyhow::{bail, Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Where the identity layer keeps its token cache.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CacheLocation {
    /// Tokens live only as long as the process.
    #[default]
    #[serde(alias = "sessionStorage")]
    Session,
    /// Tokens are written to `token_cache.toml` in the data directory.
    #[serde(alias = "localStorage")]
    Local,
}

/// Identity provider settings (Entra ID app registration)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// Application (client) ID of the public client registration
    pub client_id: String,
    /// Authority URL, e.g. `https://login.microsoftonline.com/<tenant-id>`
    pub authority: String,
    /// Redirect URI registered for the application
    pub redirect_uri: String,
    pub cache_location: CacheLocation,
    /// Accepted for compatibility with browser configs. Has no effect here.
    pub store_auth_state_in_cookie: bool,
    /// Scopes requested at sign-in
    pub login_scopes: Vec<String>,
    /// Scopes requested when calling the backend API
    pub api_scopes: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            client_id: "YOUR_CLIENT_ID_HERE".to_string(),
            authority: "https://login.microsoftonline.com/YOUR_TENANT_ID_HERE".to_string(),
            redirect_uri: "https://login.microsoftonline.com/common/oauth2/nativeclient"
                .to_string(),
            cache_location: CacheLocation::Session,
            store_auth_state_in_cookie: false,
            login_scopes: vec!["User.Read".to_string()],
            api_scopes: vec![
                "api://YOUR_BACKEND_API_CLIENT_ID_HERE/user_impersonation".to_string(),
            ],
        }
    }
}

/// Backend API settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Base URL of the copilot backend. `/api/chat` is appended for chat calls.
    pub base_url: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8000".to_string(),
        }
    }
}

/// Application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub identity: IdentityConfig,
    pub api: ApiConfig,
}

impl Config {
    fn project_dirs() -> Result<ProjectDirs> {
        ProjectDirs::from("com", "fs-copilot", "fs-copilot")
            .context("Could not determine config directory")
    }

    /// Default config file path
    pub fn default_path() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.config_dir().join("config.toml"))
    }

    /// Directory holding the persistent token cache
    pub fn data_dir() -> Result<PathBuf> {
        Ok(Self::project_dirs()?.data_dir().to_path_buf())
    }

    /// Load configuration from `path`, or from the default location.
    ///
    /// A missing file yields the built-in defaults.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(p) => p.to_path_buf(),
            None => Self::default_path()?,
        };

        if !path.exists() {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(Self::default());
        }

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from TOML text.
    pub fn parse(content: &str) -> Result<Self> {
        let config: Self = toml::from_str(content).context("Failed to parse config file")?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations that cannot possibly work.
    pub fn validate(&self) -> Result<()> {
        if self.identity.client_id.trim().is_empty() {
            bail!("identity.client_id must not be empty");
        }
        url::Url::parse(&self.identity.authority)
            .with_context(|| format!("identity.authority is not a URL: {}", self.identity.authority))?;
        if self.identity.api_scopes.is_empty() {
            bail!("identity.api_scopes must list at least one scope");
        }
        url::Url::parse(&self.api.base_url)
            .with_context(|| format!("api.base_url is not a URL: {}", self.api.base_url))?;
        Ok(())
    }

    /// Render the effective configuration as TOML.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Write the configuration to `path`, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).context("Failed to create config directory")?;
        }
        fs::write(path, self.to_toml()?)
            .with_context(|| format!("Failed to write config file {}", path.display()))
    }
}

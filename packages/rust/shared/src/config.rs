//! Application configuration for mailsift.
//!
//! User config lives at `~/.mailsift/mailsift.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{MailsiftError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "mailsift.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".mailsift";

// ---------------------------------------------------------------------------
// Config structs (matching mailsift.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global defaults.
    #[serde(default)]
    pub defaults: DefaultsConfig,

    /// Per-step retry budgets.
    #[serde(default)]
    pub retries: RetriesConfig,

    /// Identity resolution policy.
    #[serde(default)]
    pub identity: IdentityConfig,

    /// Mailbox source settings.
    #[serde(default)]
    pub mailbox: MailboxConfig,
}

/// `[defaults]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Default export destination.
    #[serde(default = "default_output_path")]
    pub output_path: String,

    /// Whether to merge probable duplicate identities.
    #[serde(default = "default_true")]
    pub enable_resolution: bool,

    /// Whether to check that recipient domains resolve.
    #[serde(default)]
    pub verify_domains: bool,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            output_path: default_output_path(),
            enable_resolution: true,
            verify_domains: false,
        }
    }
}

fn default_output_path() -> String {
    "recipients.csv".into()
}
fn default_true() -> bool {
    true
}

/// `[retries]` section. Each value is the number of extra attempts a step gets.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetriesConfig {
    #[serde(default = "default_fetch_retries")]
    pub fetch: u32,
    #[serde(default = "default_verify_retries")]
    pub verify: u32,
    #[serde(default)]
    pub resolve: u32,
    #[serde(default = "default_export_retries")]
    pub export: u32,
    /// Delay between attempts of the same step, in ms.
    #[serde(default)]
    pub backoff_ms: u64,
}

impl Default for RetriesConfig {
    fn default() -> Self {
        Self {
            fetch: default_fetch_retries(),
            verify: default_verify_retries(),
            resolve: 0,
            export: default_export_retries(),
            backoff_ms: 0,
        }
    }
}

fn default_fetch_retries() -> u32 {
    2
}
fn default_verify_retries() -> u32 {
    1
}
fn default_export_retries() -> u32 {
    1
}

/// `[identity]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Clusters merge while their average feature distance is below this.
    #[serde(default = "default_distance_threshold")]
    pub distance_threshold: f64,

    /// Leading characters of the normalized local part that feed the feature hash.
    #[serde(default = "default_stem_len")]
    pub stem_len: usize,

    /// Features are reduced modulo this value.
    #[serde(default = "default_feature_range")]
    pub feature_range: u64,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            distance_threshold: default_distance_threshold(),
            stem_len: default_stem_len(),
            feature_range: default_feature_range(),
        }
    }
}

fn default_distance_threshold() -> f64 {
    25.0
}
fn default_stem_len() -> usize {
    3
}
fn default_feature_range() -> u64 {
    10_000
}

/// `[mailbox]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MailboxConfig {
    /// Address of the mailbox owner; never reported as a recipient.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,

    /// Default mbox file to read messages from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mbox_path: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.mailsift/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| MailsiftError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.mailsift/mailsift.toml`).
pub fn config_file_path() -> Result<PathBuf> {
    Ok(config_dir()?.join(CONFIG_FILE_NAME))
}

/// Load the application config from disk. Returns defaults if the file does not exist.
pub fn load_config() -> Result<AppConfig> {
    let path = config_file_path()?;

    if !path.exists() {
        tracing::debug!(?path, "config file not found, using defaults");
        return Ok(AppConfig::default());
    }

    load_config_from(&path)
}

/// Load the application config from a specific file path.
pub fn load_config_from(path: &Path) -> Result<AppConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| MailsiftError::io(path, e))?;

    let config: AppConfig = toml::from_str(&content).map_err(|e| {
        MailsiftError::config(format!("failed to parse {}: {e}", path.display()))
    })?;
    validate_config(&config)?;
    Ok(config)
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| MailsiftError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| MailsiftError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| MailsiftError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

/// Reject identity policies the clustering cannot work with.
pub fn validate_config(config: &AppConfig) -> Result<()> {
    let identity = &config.identity;
    if identity.stem_len == 0 {
        return Err(MailsiftError::config("identity.stem_len must be positive"));
    }
    if identity.feature_range == 0 {
        return Err(MailsiftError::config("identity.feature_range must be positive"));
    }
    if !identity.distance_threshold.is_finite() || identity.distance_threshold < 0.0 {
        return Err(MailsiftError::config(
            "identity.distance_threshold must be a non-negative number",
        ));
    }
    Ok(())
}

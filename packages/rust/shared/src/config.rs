//! Application configuration for coursenotes.
//!
//! User config lives at `~/.coursenotes/coursenotes.toml`.
//! CLI flags override config file values, which override defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::{CourseNotesError, Result};

/// Default configuration file name.
const CONFIG_FILE_NAME: &str = "coursenotes.toml";

/// Default config directory name under the user's home.
const CONFIG_DIR_NAME: &str = ".coursenotes";

/// Service name reported when the notes endpoint is missing.
const NOTES_SERVICE_NAME: &str = "EdxNotes";

// ---------------------------------------------------------------------------
// Config structs (matching coursenotes.toml schema)
// ---------------------------------------------------------------------------

/// Top-level application config, deserialized from TOML.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    /// Global feature flags.
    #[serde(default)]
    pub features: FeaturesConfig,

    /// External notes service.
    #[serde(default)]
    pub notes: NotesConfig,

    /// Local course database.
    #[serde(default)]
    pub storage: StorageConfig,

    /// LMS link generation.
    #[serde(default)]
    pub lms: LmsConfig,
}

/// `[features]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FeaturesConfig {
    /// Global switch for the notes feature; courses also need the tab.
    #[serde(default)]
    pub enable_edxnotes: bool,
}

/// `[notes]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NotesConfig {
    /// Base URL of the notes service. Required before any notes request.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Name of the env var holding the service ID token (never store the token itself).
    #[serde(default = "default_token_env")]
    pub token_env: String,

    /// Name of the env var holding the secret used to anonymize user ids.
    #[serde(default = "default_secret_env")]
    pub anonymous_id_secret_env: String,

    /// Request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for NotesConfig {
    fn default() -> Self {
        Self {
            url: None,
            token_env: default_token_env(),
            anonymous_id_secret_env: default_secret_env(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

fn default_token_env() -> String {
    "EDXNOTES_ID_TOKEN".into()
}
fn default_secret_env() -> String {
    "COURSENOTES_SECRET_KEY".into()
}
fn default_timeout_secs() -> u64 {
    10
}

impl NotesConfig {
    /// Resolve `path` against the configured service URL.
    ///
    /// The base always gains a trailing slash; a non-empty `path` loses any
    /// leading slash and gains a trailing one.
    pub fn endpoint(&self, path: &str) -> Result<Url> {
        let base = self
            .url
            .as_deref()
            .filter(|u| !u.trim().is_empty())
            .ok_or_else(|| CourseNotesError::MisconfiguredEndpoint {
                service: NOTES_SERVICE_NAME.into(),
            })?;

        let mut joined = base.to_string();
        if !joined.ends_with('/') {
            joined.push('/');
        }

        let path = path.trim_start_matches('/');
        if !path.is_empty() {
            joined.push_str(path);
            if !path.ends_with('/') {
                joined.push('/');
            }
        }

        Url::parse(&joined)
            .map_err(|e| CourseNotesError::config(format!("invalid notes url {joined:?}: {e}")))
    }
}

/// `[storage]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Path of the libSQL database holding imported courses.
    #[serde(default = "default_db_path")]
    pub db_path: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            db_path: default_db_path(),
        }
    }
}

fn default_db_path() -> String {
    "~/.coursenotes/courses.db".into()
}

impl StorageConfig {
    /// Database path with a leading `~` expanded to the home directory.
    pub fn resolved_db_path(&self) -> Result<PathBuf> {
        expand_home(&self.db_path)
    }
}

/// `[lms]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LmsConfig {
    /// When set, generated links are absolute under this origin.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
}

// ---------------------------------------------------------------------------
// Config loading
// ---------------------------------------------------------------------------

/// Get the path to the config directory (`~/.coursenotes/`).
pub fn config_dir() -> Result<PathBuf> {
    let home = dirs::home_dir()
        .ok_or_else(|| CourseNotesError::config("could not determine home directory"))?;
    Ok(home.join(CONFIG_DIR_NAME))
}

/// Get the path to the config file (`~/.coursenotes/coursenotes.toml`).
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
    let content = std::fs::read_to_string(path).map_err(|e| CourseNotesError::io(path, e))?;

    toml::from_str(&content).map_err(|e| {
        CourseNotesError::config(format!("failed to parse {}: {e}", path.display()))
    })
}

/// Create the config directory and write a default config file.
/// Returns the path to the created file.
pub fn init_config() -> Result<PathBuf> {
    let dir = config_dir()?;
    std::fs::create_dir_all(&dir).map_err(|e| CourseNotesError::io(&dir, e))?;

    let path = dir.join(CONFIG_FILE_NAME);
    let config = AppConfig::default();
    let content =
        toml::to_string_pretty(&config).map_err(|e| CourseNotesError::config(e.to_string()))?;

    std::fs::write(&path, content).map_err(|e| CourseNotesError::io(&path, e))?;
    tracing::info!(?path, "created default config file");

    Ok(path)
}

fn expand_home(path: &str) -> Result<PathBuf> {
    match path.strip_prefix("~/") {
        Some(rest) => {
            let home = dirs::home_dir()
                .ok_or_else(|| CourseNotesError::config("could not determine home directory"))?;
            Ok(home.join(rest))
        }
        None => Ok(PathBuf::from(path)),
    }
}

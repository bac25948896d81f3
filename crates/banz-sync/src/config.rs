//! # Configuration
//!
//! Configuration for the workflows and the operator binary.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     BANZ_STORE=Banca Socorro                                           │
//! │     BANZ_SYNC_MODE=offline                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/banz-pos/banz.toml (Linux)                               │
//! │     ~/Library/Application Support/com.banz.pos/banz.toml (macOS)       │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! │     ConnectivityMode::Auto, legacy matching on, 60s window             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [store]
//! default = "Banca Socorro"
//!
//! [database]
//! local_path = "/var/lib/banz/local.db"
//! remote_path = "/srv/banz/remote.db"
//!
//! [sync]
//! mode = "auto"            # auto | online | offline
//! legacy_match = true
//! legacy_window_ms = 60000
//! max_version_retries = 5
//!
//! [closeout]
//! auto_close_on_load = true
//! export_dir = "/var/backups/banz"
//!
//! [admin]
//! password_hash = "$argon2id$v=19$..."
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};

use banz_core::reconcile::MatchPolicy;
use banz_core::LEGACY_MATCH_WINDOW_MS;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Connectivity Mode
// =============================================================================

/// How the workflows decide between the online and the queued path.
///
/// ```text
/// AUTO     probe the remote store; queue when it's unreachable
/// ONLINE   always write to the remote store; fail when it's unreachable
/// OFFLINE  always queue; reconciliation is a no-op
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectivityMode {
    #[default]
    Auto,
    Online,
    Offline,
}

impl std::fmt::Display for ConnectivityMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectivityMode::Auto => write!(f, "auto"),
            ConnectivityMode::Online => write!(f, "online"),
            ConnectivityMode::Offline => write!(f, "offline"),
        }
    }
}

impl std::str::FromStr for ConnectivityMode {
    type Err = SyncError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "auto" => Ok(ConnectivityMode::Auto),
            "online" => Ok(ConnectivityMode::Online),
            "offline" | "disabled" => Ok(ConnectivityMode::Offline),
            other => Err(SyncError::InvalidConfig(format!(
                "Unknown sync mode: '{}'. Valid options: auto, online, offline",
                other
            ))),
        }
    }
}

// =============================================================================
// Sections
// =============================================================================

/// Store selected when the session has none.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoreSettings {
    #[serde(default)]
    pub default: Option<String>,
}

/// Database file locations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSettings {
    /// Queue, mirror cache and session.
    #[serde(default = "default_local_path")]
    pub local_path: PathBuf,

    /// Document store shared by every device of the operation.
    #[serde(default = "default_remote_path")]
    pub remote_path: PathBuf,
}

fn data_dir() -> PathBuf {
    directories::ProjectDirs::from("com", "banz", "pos")
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from("."))
}

fn default_local_path() -> PathBuf {
    data_dir().join("local.db")
}

fn default_remote_path() -> PathBuf {
    data_dir().join("remote.db")
}

impl Default for DatabaseSettings {
    fn default() -> Self {
        DatabaseSettings {
            local_path: default_local_path(),
            remote_path: default_remote_path(),
        }
    }
}

/// Reconciliation and concurrency settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    #[serde(default)]
    pub mode: ConnectivityMode,

    /// Match records without a correlation id by field equality.
    #[serde(default = "default_true")]
    pub legacy_match: bool,

    /// Maximum timestamp distance for a legacy match (milliseconds).
    #[serde(default = "default_legacy_window")]
    pub legacy_window_ms: i64,

    /// Attempts at a compare-and-set stock update before giving up.
    #[serde(default = "default_max_version_retries")]
    pub max_version_retries: u32,
}

fn default_true() -> bool {
    true
}

fn default_legacy_window() -> i64 {
    LEGACY_MATCH_WINDOW_MS
}

fn default_max_version_retries() -> u32 {
    5
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            mode: ConnectivityMode::default(),
            legacy_match: default_true(),
            legacy_window_ms: default_legacy_window(),
            max_version_retries: default_max_version_retries(),
        }
    }
}

/// Closeout settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloseoutSettings {
    /// Close eligible past days whenever a session starts.
    #[serde(default = "default_true")]
    pub auto_close_on_load: bool,

    /// Where backup exports are written.
    #[serde(default = "default_export_dir")]
    pub export_dir: PathBuf,
}

fn default_export_dir() -> PathBuf {
    data_dir().join("backups")
}

impl Default for CloseoutSettings {
    fn default() -> Self {
        CloseoutSettings {
            auto_close_on_load: default_true(),
            export_dir: default_export_dir(),
        }
    }
}

/// Administration settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdminSettings {
    /// Argon2 PHC string. Admin actions are refused while unset.
    #[serde(default)]
    pub password_hash: Option<String>,
}

// =============================================================================
// Main Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BanzConfig {
    #[serde(default)]
    pub store: StoreSettings,

    #[serde(default)]
    pub database: DatabaseSettings,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub closeout: CloseoutSettings,

    #[serde(default)]
    pub admin: AdminSettings,
}

impl BanzConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (banz.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(())
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if self.sync.legacy_window_ms <= 0 {
            return Err(SyncError::InvalidConfig(
                "legacy_window_ms must be greater than 0".into(),
            ));
        }

        if self.sync.max_version_retries == 0 {
            return Err(SyncError::InvalidConfig(
                "max_version_retries must be greater than 0".into(),
            ));
        }

        if let Some(store) = &self.store.default {
            if store.trim().is_empty() {
                return Err(SyncError::InvalidConfig("default store must not be blank".into()));
            }
        }

        if let Some(hash) = &self.admin.password_hash {
            argon2::PasswordHash::new(hash).map_err(|e| {
                SyncError::InvalidConfig(format!("admin password_hash is not a PHC string: {}", e))
            })?;
        }

        Ok(())
    }

    /// Applies environment variable overrides.
    fn apply_env_overrides(&mut self) {
        self.apply_overrides(|key| std::env::var(key).ok());
    }

    fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(store) = lookup("BANZ_STORE") {
            debug!(store = %store, "Overriding default store from environment");
            self.store.default = Some(store);
        }

        if let Some(path) = lookup("BANZ_LOCAL_DB") {
            self.database.local_path = PathBuf::from(path);
        }

        if let Some(path) = lookup("BANZ_REMOTE_DB") {
            self.database.remote_path = PathBuf::from(path);
        }

        if let Some(mode) = lookup("BANZ_SYNC_MODE") {
            match mode.parse() {
                Ok(parsed) => {
                    debug!(mode = %mode, "Overriding sync mode from environment");
                    self.sync.mode = parsed;
                }
                Err(_) => warn!(mode = %mode, "Unknown sync mode in environment"),
            }
        }

        if let Some(flag) = lookup("BANZ_LEGACY_MATCH") {
            match flag.to_lowercase().as_str() {
                "1" | "true" | "on" | "yes" => self.sync.legacy_match = true,
                "0" | "false" | "off" | "no" => self.sync.legacy_match = false,
                _ => warn!(value = %flag, "Unknown BANZ_LEGACY_MATCH value"),
            }
        }

        if let Some(dir) = lookup("BANZ_EXPORT_DIR") {
            self.closeout.export_dir = PathBuf::from(dir);
        }

        if let Some(hash) = lookup("BANZ_ADMIN_PASSWORD_HASH") {
            self.admin.password_hash = Some(hash);
        }
    }

    /// Returns the default config file path.
    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "banz", "pos")
            .map(|dirs| dirs.config_dir().join("banz.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    pub fn mode(&self) -> ConnectivityMode {
        self.sync.mode
    }

    /// Matching policy derived from the `[sync]` section.
    pub fn match_policy(&self) -> MatchPolicy {
        MatchPolicy {
            legacy: self.sync.legacy_match,
            window_ms: self.sync.legacy_window_ms,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("auto".parse::<ConnectivityMode>().unwrap(), ConnectivityMode::Auto);
        assert_eq!("ONLINE".parse::<ConnectivityMode>().unwrap(), ConnectivityMode::Online);
        assert_eq!("offline".parse::<ConnectivityMode>().unwrap(), ConnectivityMode::Offline);
        assert!("primary".parse::<ConnectivityMode>().is_err());
    }

    #[test]
    fn test_default_config() {
        let config = BanzConfig::default();
        assert_eq!(config.mode(), ConnectivityMode::Auto);
        assert_eq!(config.match_policy(), MatchPolicy::default());
        assert!(config.closeout.auto_close_on_load);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validation() {
        let mut config = BanzConfig::default();
        config.sync.legacy_window_ms = 0;
        assert!(config.validate().is_err());

        let mut config = BanzConfig::default();
        config.admin.password_hash = Some("hunter2".to_string());
        assert!(config.validate().unwrap_err().is_config_error());
    }

    #[test]
    fn test_overrides() {
        let env: HashMap<&str, &str> = [
            ("BANZ_STORE", "Banca Centro"),
            ("BANZ_SYNC_MODE", "offline"),
            ("BANZ_LEGACY_MATCH", "off"),
            ("BANZ_EXPORT_DIR", "/tmp/banz"),
        ]
        .into_iter()
        .collect();

        let mut config = BanzConfig::default();
        config.apply_overrides(|k| env.get(k).map(|v| v.to_string()));

        assert_eq!(config.store.default.as_deref(), Some("Banca Centro"));
        assert_eq!(config.mode(), ConnectivityMode::Offline);
        assert!(!config.match_policy().legacy);
        assert_eq!(config.closeout.export_dir, PathBuf::from("/tmp/banz"));
    }

    #[test]
    fn test_save_and_load_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("banz.toml");

        let mut config = BanzConfig::default();
        config.store.default = Some("Banca Socorro".to_string());
        config.sync.mode = ConnectivityMode::Online;
        config.save(Some(path.clone())).unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert!(contents.contains("[sync]"));

        let loaded: BanzConfig = toml::from_str(&contents).unwrap();
        assert_eq!(loaded.store.default.as_deref(), Some("Banca Socorro"));
        assert_eq!(loaded.mode(), ConnectivityMode::Online);
    }

    #[test]
    fn test_partial_file_uses_defaults() {
        let config: BanzConfig = toml::from_str("[sync]\nlegacy_match = false\n").unwrap();
        assert!(!config.sync.legacy_match);
        assert_eq!(config.sync.legacy_window_ms, LEGACY_MATCH_WINDOW_MS);
        assert_eq!(config.sync.max_version_retries, 5);
    }
}

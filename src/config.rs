use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::credentials::CredentialConfig;

fn default_month_offsets() -> Vec<i32> {
    vec![-2, -1, 0]
}

/// Default wall-clock budget for one statement download (22s).
fn default_download_timeout() -> std::time::Duration {
    std::time::Duration::from_secs(22)
}

/// How long the download watcher waits after the last new file (30s).
fn default_download_idle() -> std::time::Duration {
    std::time::Duration::from_secs(30)
}

/// Portal fetch configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FetchConfig {
    /// Billing-month offsets to download, relative to the portal's selected
    /// month. The current month (offset 0) is always visited last.
    pub month_offsets: Vec<i32>,

    /// Run the browser without a window. Defaults to false: the portal's
    /// anti-automation checks are far less touchy against a headful browser,
    /// and a visible window lets the user dismiss unexpected popups.
    pub headless: bool,

    /// Per-download timeout.
    #[serde(default = "default_download_timeout", with = "duration_secs")]
    pub download_timeout: std::time::Duration,

    /// Stop waiting for further downloads after this much inactivity.
    #[serde(default = "default_download_idle", with = "duration_secs")]
    pub download_idle: std::time::Duration,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            month_offsets: default_month_offsets(),
            headless: false,
            download_timeout: default_download_timeout(),
            download_idle: default_download_idle(),
        }
    }
}

/// Durations are written as plain seconds in the TOML file.
mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(
        value: &std::time::Duration,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<std::time::Duration, D::Error> {
        let secs = u64::deserialize(deserializer)?;
        Ok(std::time::Duration::from_secs(secs))
    }
}

fn default_gemini_model() -> String {
    "gemini-1.5-flash".to_string()
}

fn default_gemini_base_url() -> String {
    "https://generativelanguage.googleapis.com/v1beta/models".to_string()
}

/// Gemini insights configuration. The feature is off until an API key is set.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// API key. Leave empty to skip the insights step.
    pub api_key: Option<String>,

    pub model: String,

    /// Override for tests and proxies.
    pub base_url: String,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            model: default_gemini_model(),
            base_url: default_gemini_base_url(),
        }
    }
}

fn default_dashboard_addr() -> String {
    "127.0.0.1:8321".to_string()
}

/// Dashboard HTTP server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DashboardConfig {
    /// Bind address. Loopback by default; the dashboard is a local tool.
    pub listen: String,
}

impl Default for DashboardConfig {
    fn default() -> Self {
        Self {
            listen: default_dashboard_addr(),
        }
    }
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    /// Path to the data directory holding downloads, markdown statements and
    /// insights files. If relative, resolved from the config file location.
    /// If not specified, defaults to the config file's directory.
    pub data_dir: Option<PathBuf>,

    /// Portal login credentials.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub portal: Option<CredentialConfig>,

    /// Fetch settings.
    pub fetch: FetchConfig,

    /// Gemini insights settings.
    pub gemini: GeminiConfig,

    /// Dashboard settings.
    pub dashboard: DashboardConfig,
}

impl Config {
    /// Load config from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Load config from a file, or return default config if file doesn't exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Resolve the data directory path.
    ///
    /// If `data_dir` is set and relative, it's resolved relative to `config_dir`.
    /// If `data_dir` is not set, returns `config_dir`.
    pub fn resolve_data_dir(&self, config_dir: &Path) -> PathBuf {
        match &self.data_dir {
            Some(data_dir) if data_dir.is_absolute() => data_dir.clone(),
            Some(data_dir) => config_dir.join(data_dir),
            None => config_dir.to_path_buf(),
        }
    }
}

/// Loaded configuration with resolved paths.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    /// The resolved data directory path.
    pub data_dir: PathBuf,

    /// Portal login credentials.
    pub portal: Option<CredentialConfig>,

    /// Fetch settings.
    pub fetch: FetchConfig,

    /// Gemini insights settings.
    pub gemini: GeminiConfig,

    /// Dashboard settings.
    pub dashboard: DashboardConfig,
}

/// Returns the default config file path.
///
/// Resolution order:
/// 1. `./cardkeep.toml` if it exists in current directory
/// 2. `~/.local/share/cardkeep/cardkeep.toml` (XDG data directory)
pub fn default_config_path() -> PathBuf {
    let local_config = PathBuf::from("cardkeep.toml");
    if local_config.exists() {
        return local_config;
    }

    if let Some(data_dir) = dirs::data_dir() {
        return data_dir.join("cardkeep").join("cardkeep.toml");
    }

    // Final fallback to local
    local_config
}

impl ResolvedConfig {
    /// Load and resolve config from a file path.
    ///
    /// The data directory is resolved relative to the config file's parent directory.
    pub fn load(config_path: &Path) -> Result<Self> {
        let config_path = config_path
            .canonicalize()
            .with_context(|| format!("Config file not found: {}", config_path.display()))?;

        let config_dir = config_path
            .parent()
            .context("Config file has no parent directory")?;

        let config = Config::load(&config_path)?;
        let data_dir = config.resolve_data_dir(config_dir);

        Ok(Self {
            data_dir,
            portal: config.portal,
            fetch: config.fetch,
            gemini: config.gemini,
            dashboard: config.dashboard,
        })
    }

    /// Load config, creating a default if the file doesn't exist.
    ///
    /// If the config file doesn't exist, uses the config file's intended
    /// parent directory as the data directory.
    pub fn load_or_default(config_path: &Path) -> Result<Self> {
        if config_path.exists() {
            Self::load(config_path)
        } else {
            let config_path = if config_path.is_relative() {
                std::env::current_dir()
                    .context("Failed to get current directory")?
                    .join(config_path)
            } else {
                config_path.to_path_buf()
            };

            let config_dir = config_path
                .parent()
                .context("Config path has no parent directory")?;

            Ok(Self {
                data_dir: config_dir.to_path_buf(),
                portal: None,
                fetch: FetchConfig::default(),
                gemini: GeminiConfig::default(),
                dashboard: DashboardConfig::default(),
            })
        }
    }

    /// Directory for downloaded statement files.
    pub fn downloads_dir(&self) -> PathBuf {
        self.data_dir.clone()
    }

    /// Directory for cached portal sessions.
    pub fn sessions_dir(&self) -> PathBuf {
        self.data_dir.join("sessions")
    }

    /// Directory for the browser's persistent profile.
    pub fn profile_dir(&self) -> PathBuf {
        self.data_dir.join("profile")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::TempDir;

    #[test]
    fn test_default_data_dir_is_config_dir() {
        let config = Config::default();
        let config_dir = Path::new("/home/user/finances");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/finances")
        );
    }

    #[test]
    fn test_relative_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("data")),
            ..Default::default()
        };
        let config_dir = Path::new("/home/user/finances");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/home/user/finances/data")
        );
    }

    #[test]
    fn test_absolute_data_dir() {
        let config = Config {
            data_dir: Some(PathBuf::from("/var/cardkeep/data")),
            ..Default::default()
        };
        let config_dir = Path::new("/home/user/finances");
        assert_eq!(
            config.resolve_data_dir(config_dir),
            PathBuf::from("/var/cardkeep/data")
        );
    }

    #[test]
    fn test_load_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("cardkeep.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "data_dir = \"./my-data\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.data_dir, Some(PathBuf::from("./my-data")));

        Ok(())
    }

    #[test]
    fn test_load_empty_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("cardkeep.toml");

        std::fs::File::create(&config_path)?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.data_dir, None);
        assert!(config.portal.is_none());

        Ok(())
    }

    #[test]
    fn test_load_fetch_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("cardkeep.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[fetch]")?;
        writeln!(file, "month_offsets = [-1, 0]")?;
        writeln!(file, "headless = true")?;
        writeln!(file, "download_timeout = 40")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.fetch.month_offsets, vec![-1, 0]);
        assert!(config.fetch.headless);
        assert_eq!(
            config.fetch.download_timeout,
            std::time::Duration::from_secs(40)
        );
        assert_eq!(
            config.fetch.download_idle,
            std::time::Duration::from_secs(30)
        );

        Ok(())
    }

    #[test]
    fn test_load_gemini_config() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("cardkeep.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[gemini]")?;
        writeln!(file, "api_key = \"test-key\"")?;
        writeln!(file, "model = \"gemini-1.5-pro\"")?;

        let config = Config::load(&config_path)?;
        assert_eq!(config.gemini.api_key.as_deref(), Some("test-key"));
        assert_eq!(config.gemini.model, "gemini-1.5-pro");
        assert!(config.gemini.base_url.contains("generativelanguage"));

        Ok(())
    }

    #[test]
    fn test_load_portal_credentials() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("cardkeep.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "[portal]")?;
        writeln!(file, "backend = \"inline\"")?;
        writeln!(file, "username = \"user\"")?;
        writeln!(file, "password = \"hunter2\"")?;

        let config = Config::load(&config_path)?;
        assert!(config.portal.is_some());

        Ok(())
    }

    #[test]
    fn test_default_fetch_config() {
        let config = Config::default();
        assert_eq!(config.fetch.month_offsets, vec![-2, -1, 0]);
        assert!(!config.fetch.headless);
    }

    #[test]
    fn test_default_dashboard_listens_on_loopback() {
        let config = Config::default();
        assert!(config.dashboard.listen.starts_with("127.0.0.1"));
    }

    #[test]
    fn test_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("missing.toml");

        let config = Config::load_or_default(&config_path)?;
        assert_eq!(config.data_dir, None);

        Ok(())
    }

    #[test]
    fn test_resolved_config_load_or_default_missing_file() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("cardkeep.toml");

        let resolved = ResolvedConfig::load_or_default(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path());

        Ok(())
    }

    #[test]
    fn test_resolved_config_resolves_relative_data_dir() -> Result<()> {
        let dir = TempDir::new()?;
        let config_path = dir.path().join("cardkeep.toml");

        let mut file = std::fs::File::create(&config_path)?;
        writeln!(file, "data_dir = \"./data\"")?;

        let resolved = ResolvedConfig::load(&config_path)?;
        assert_eq!(resolved.data_dir, dir.path().join("data"));

        Ok(())
    }
}

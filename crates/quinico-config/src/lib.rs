use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const QUINICO_DIR_NAME: &str = ".quinico";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_BIND: &str = "127.0.0.1:8080";
pub const DEFAULT_DATABASE_PATH: &str = "quinico.sqlite";
pub const DEFAULT_PAGESPEED_UPLOAD_DIR: &str = "pagespeed";
pub const DEFAULT_DASHBOARD_WIDTH: u32 = 400;
pub const DEFAULT_DASHBOARD_HEIGHT: u32 = 250;
pub const DEFAULT_DASHBOARD_FONT: u32 = 12;
pub const DEFAULT_MAX_KEYWORD_RESULTS: u32 = 100;

/// Blank values in TOML read as `Unset`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum SeomozAccountType {
    #[default]
    Free,
    Paid,
    Unset,
}

impl SeomozAccountType {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Free => "free",
            Self::Paid => "paid",
            Self::Unset => "unset",
        }
    }
}

impl TryFrom<String> for SeomozAccountType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl std::str::FromStr for SeomozAccountType {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim() {
            "free" => Ok(Self::Free),
            "paid" => Ok(Self::Paid),
            "unset" | "" => Ok(Self::Unset),
            other => Err(format!(
                "invalid seomoz account type '{other}', expected one of: free, paid, unset"
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct QuinicoConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub dashboard: DashboardDefaults,
    #[serde(default)]
    pub keyword_rank: KeywordRankConfig,
    #[serde(default)]
    pub pagespeed: PagespeedConfig,
    #[serde(default)]
    pub seomoz: SeomozConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// Relative paths resolve against the root directory.
    #[serde(default = "default_database_path")]
    pub path: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            path: default_database_path(),
        }
    }
}

/// Size and font used for embeddable fragments when the viewer has no
/// saved dashboard settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DashboardDefaults {
    #[serde(default = "default_dashboard_width")]
    pub width: u32,
    #[serde(default = "default_dashboard_height")]
    pub height: u32,
    #[serde(default = "default_dashboard_font")]
    pub font: u32,
}

impl Default for DashboardDefaults {
    fn default() -> Self {
        Self {
            width: DEFAULT_DASHBOARD_WIDTH,
            height: DEFAULT_DASHBOARD_HEIGHT,
            font: DEFAULT_DASHBOARD_FONT,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeywordRankConfig {
    #[serde(default = "default_max_keyword_results")]
    pub max_keyword_results: u32,
}

impl Default for KeywordRankConfig {
    fn default() -> Self {
        Self {
            max_keyword_results: DEFAULT_MAX_KEYWORD_RESULTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PagespeedConfig {
    #[serde(default = "default_pagespeed_upload_dir")]
    pub upload_dir: String,
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

impl Default for PagespeedConfig {
    fn default() -> Self {
        Self {
            upload_dir: default_pagespeed_upload_dir(),
            utc_offset_minutes: 0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct SeomozConfig {
    #[serde(default)]
    pub account_type: SeomozAccountType,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigWarning {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config TOML: {0}")]
    TomlParse(#[from] toml::de::Error),
    #[error("failed to serialize config TOML: {0}")]
    TomlSerialize(#[from] toml::ser::Error),
}

pub fn quinico_dir(root: impl AsRef<Path>) -> PathBuf {
    root.as_ref().join(QUINICO_DIR_NAME)
}

pub fn config_path(root: impl AsRef<Path>) -> PathBuf {
    quinico_dir(root).join(CONFIG_FILE_NAME)
}

impl QuinicoConfig {
    pub fn database_path(&self, root: impl AsRef<Path>) -> PathBuf {
        resolve_under(root.as_ref(), &self.database.path)
    }

    pub fn pagespeed_upload_dir(&self, root: impl AsRef<Path>) -> PathBuf {
        resolve_under(root.as_ref(), &self.pagespeed.upload_dir)
    }
}

pub fn load_config(root: impl AsRef<Path>) -> Result<QuinicoConfig, ConfigError> {
    let path = config_path(root);
    if !path.exists() {
        return Ok(QuinicoConfig::default());
    }

    let raw = fs::read_to_string(path)?;
    let parsed: QuinicoConfig = toml::from_str(&raw)?;
    Ok(normalize_config(parsed))
}

pub fn ensure_config(root: impl AsRef<Path>) -> Result<QuinicoConfig, ConfigError> {
    let root = root.as_ref();
    fs::create_dir_all(quinico_dir(root))?;

    let path = config_path(root);
    if path.exists() {
        return load_config(root);
    }

    let config = QuinicoConfig::default();
    let content = toml::to_string_pretty(&config)?;
    fs::write(path, content)?;

    Ok(config)
}

pub fn validate_config(config: &QuinicoConfig) -> Vec<ConfigWarning> {
    let mut warnings = Vec::new();

    if config.dashboard.width == 0 || config.dashboard.height == 0 {
        warnings.push(ConfigWarning {
            code: "dashboard_size_zero",
            message: format!(
                "dashboard width/height should be positive, got {}x{}",
                config.dashboard.width, config.dashboard.height
            ),
        });
    }

    if config.keyword_rank.max_keyword_results == 0 {
        warnings.push(ConfigWarning {
            code: "max_keyword_results_zero",
            message: "keyword_rank.max_keyword_results is 0; history charts will be flat"
                .to_owned(),
        });
    }

    if config.seomoz.account_type == SeomozAccountType::Unset {
        warnings.push(ConfigWarning {
            code: "seomoz_account_unset",
            message: "seomoz.account_type is unset; no SEO graphs will be offered".to_owned(),
        });
    }

    warnings
}

fn resolve_under(root: &Path, value: &str) -> PathBuf {
    let path = Path::new(value);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    }
}

fn default_bind() -> String {
    DEFAULT_BIND.to_owned()
}

fn default_database_path() -> String {
    DEFAULT_DATABASE_PATH.to_owned()
}

fn default_pagespeed_upload_dir() -> String {
    DEFAULT_PAGESPEED_UPLOAD_DIR.to_owned()
}

fn default_dashboard_width() -> u32 {
    DEFAULT_DASHBOARD_WIDTH
}

fn default_dashboard_height() -> u32 {
    DEFAULT_DASHBOARD_HEIGHT
}

fn default_dashboard_font() -> u32 {
    DEFAULT_DASHBOARD_FONT
}

fn default_max_keyword_results() -> u32 {
    DEFAULT_MAX_KEYWORD_RESULTS
}

fn normalize_required(value: &str, fallback: fn() -> String) -> String {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        fallback()
    } else {
        trimmed.to_owned()
    }
}

fn normalize_config(mut config: QuinicoConfig) -> QuinicoConfig {
    config.server.bind = normalize_required(&config.server.bind, default_bind);
    config.database.path = normalize_required(&config.database.path, default_database_path);
    config.pagespeed.upload_dir =
        normalize_required(&config.pagespeed.upload_dir, default_pagespeed_upload_dir);
    config
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::*;

    #[test]
    fn ensure_config_creates_default_file() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();

        let config = ensure_config(root).expect("ensure config");

        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(config.dashboard.width, DEFAULT_DASHBOARD_WIDTH);
        assert_eq!(config.seomoz.account_type, SeomozAccountType::Free);
        assert!(config_path(root).exists());

        let content = fs::read_to_string(config_path(root)).expect("read config file");
        assert!(content.contains("[server]"));
        assert!(content.contains("[dashboard]"));
        assert!(content.contains("account_type = \"free\""));
    }

    #[test]
    fn load_config_parses_values_and_normalizes_blanks() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(quinico_dir(root)).expect("create .quinico");

        let raw = r#"
[server]
bind = "   "

[database]
path = "/var/lib/quinico/data.sqlite"

[dashboard]
width = 640
height = 320
font = 14

[keyword_rank]
max_keyword_results = 50

[pagespeed]
upload_dir = "reports"
utc_offset_minutes = -300

[seomoz]
account_type = "paid"
"#;
        fs::write(config_path(root), raw).expect("write config");

        let config = load_config(root).expect("load config");

        assert_eq!(config.server.bind, DEFAULT_BIND);
        assert_eq!(
            config.database_path(root),
            PathBuf::from("/var/lib/quinico/data.sqlite")
        );
        assert_eq!(config.dashboard.width, 640);
        assert_eq!(config.dashboard.font, 14);
        assert_eq!(config.keyword_rank.max_keyword_results, 50);
        assert_eq!(config.pagespeed_upload_dir(root), root.join("reports"));
        assert_eq!(config.pagespeed.utc_offset_minutes, -300);
        assert_eq!(config.seomoz.account_type, SeomozAccountType::Paid);
    }

    #[test]
    fn load_config_without_file_returns_defaults() {
        let temp = tempdir().expect("tempdir");
        let config = load_config(temp.path()).expect("load config");
        assert_eq!(config, QuinicoConfig::default());
        assert_eq!(
            config.database_path(temp.path()),
            temp.path().join(DEFAULT_DATABASE_PATH)
        );
    }

    #[test]
    fn validate_config_flags_zero_sizes_and_unset_account() {
        let mut config = QuinicoConfig::default();
        assert!(validate_config(&config).is_empty());

        config.dashboard.height = 0;
        config.keyword_rank.max_keyword_results = 0;
        config.seomoz.account_type = SeomozAccountType::Unset;

        let codes: Vec<&str> = validate_config(&config)
            .into_iter()
            .map(|warning| warning.code)
            .collect();
        assert_eq!(
            codes,
            vec![
                "dashboard_size_zero",
                "max_keyword_results_zero",
                "seomoz_account_unset"
            ]
        );
    }

    #[test]
    fn blank_seomoz_account_type_loads_as_unset() {
        let temp = tempdir().expect("tempdir");
        let root = temp.path();
        fs::create_dir_all(quinico_dir(root)).expect("create .quinico");
        fs::write(config_path(root), "[seomoz]\naccount_type = \"\"\n").expect("write config");

        let config = ensure_config(root).expect("load config");
        assert_eq!(config.seomoz.account_type, SeomozAccountType::Unset);

        fs::write(config_path(root), "[seomoz]\naccount_type = \"gold\"\n")
            .expect("write config");
        let err = load_config(root).expect_err("unknown account type");
        assert!(err.to_string().contains("invalid seomoz account type"));
    }

    #[test]
    fn seomoz_account_type_parses_known_values() {
        assert_eq!("paid".parse(), Ok(SeomozAccountType::Paid));
        assert_eq!(" free ".parse(), Ok(SeomozAccountType::Free));
        assert_eq!("".parse(), Ok(SeomozAccountType::Unset));
        let err = "gold".parse::<SeomozAccountType>().expect_err("invalid type");
        assert!(err.contains("invalid seomoz account type"));
    }
}

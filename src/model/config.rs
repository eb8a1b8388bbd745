use anyhow::{Context, Result, anyhow};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub general: GeneralConfig,
    pub markers: MarkerConfig,
    pub placeholder: PlaceholderConfig,
    pub charting: ChartingConfig,
    pub http: HttpConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GeneralConfig {
    pub output_dir: String,
    pub page_title: String,
}

/// Patterns searched (unanchored) in link URLs.
#[derive(Debug, Clone, Deserialize)]
pub struct MarkerConfig {
    pub image: String,
    pub plot: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlaceholderConfig {
    pub prefix: String,
    pub suffix_len: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChartingConfig {
    pub library_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HttpConfig {
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    pub filter: String,
}

const DEFAULTS: &str = include_str!("../../config/default.toml");

impl AppConfig {
    /// Load configuration with layering: defaults → user config → explicit file.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULTS)?;

        if let Some(proj_dirs) = directories::ProjectDirs::from("", "", "workbook") {
            let config_path = proj_dirs.config_dir().join("config.toml");
            if config_path.exists() {
                merge_tables(&mut merged, read_table(&config_path)?);
            }
        }

        if let Some(path) = explicit {
            merge_tables(&mut merged, read_table(path)?);
        }

        let mut config: AppConfig = toml::Value::Table(merged).try_into()?;

        // Expand ~ in output_dir
        if config.general.output_dir.starts_with('~') {
            let home = dirs_home().ok_or_else(|| anyhow!("cannot determine home directory"))?;
            config.general.output_dir =
                config
                    .general
                    .output_dir
                    .replacen('~', &home.to_string_lossy(), 1);
        }

        Ok(config)
    }

    /// Parse a full configuration from a TOML string layered over the defaults.
    #[cfg(test)]
    pub fn from_overrides(raw: &str) -> Result<Self> {
        let mut merged: toml::Table = toml::from_str(DEFAULTS)?;
        merge_tables(&mut merged, toml::from_str(raw)?);
        Ok(toml::Value::Table(merged).try_into()?)
    }

    pub fn output_dir(&self) -> Option<PathBuf> {
        if self.general.output_dir.is_empty() {
            None
        } else {
            Some(PathBuf::from(&self.general.output_dir))
        }
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http.timeout_secs)
    }
}

fn read_table(path: &Path) -> Result<toml::Table> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    toml::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Merge `overlay` into `base`, descending into nested tables.
fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(existing)), toml::Value::Table(nested)) => {
                merge_tables(existing, nested);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}

fn dirs_home() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.home_dir().to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_parse() {
        let config = AppConfig::from_overrides("").unwrap();
        assert_eq!(config.markers.image, "WORKBOOK_IMAGE");
        assert_eq!(config.markers.plot, "WORKBOOK_PLOT");
        assert_eq!(config.placeholder.prefix, "workbook-");
        assert_eq!(config.placeholder.suffix_len, 10);
        assert!(config.output_dir().is_none());
        assert_eq!(config.http_timeout(), Duration::from_secs(30));
    }

    #[test]
    fn overrides_merge_per_key() {
        let config = AppConfig::from_overrides("[placeholder]\nsuffix_len = 16\n").unwrap();
        assert_eq!(config.placeholder.suffix_len, 16);
        assert_eq!(config.placeholder.prefix, "workbook-");
    }

    #[test]
    fn explicit_file_is_layered_last() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[general]\noutput_dir = \"/tmp/workbook-out\"").unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.output_dir(), Some(PathBuf::from("/tmp/workbook-out")));
        assert_eq!(config.general.page_title, "Lab Workbook");
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(AppConfig::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}

use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};

use crate::model::{CategoryColor, DEFAULT_PALETTE};
use crate::timefmt::TimeAgoTemplates;

pub mod themes;

pub use themes::{ThemeName, ThemePalette};

const APP_DOMAIN: &str = "io";
const APP_ORG: &str = "PocketNotes";
const APP_NAME: &str = "pocketnotes";

pub const CONFIG_ENV: &str = "POCKETNOTES_CONFIG";
pub const DATA_ENV: &str = "POCKETNOTES_DATA";

const MILLIS_PER_DAY: i64 = 86_400_000;

pub struct ConfigLoader {
    paths: ConfigPaths,
}

impl ConfigLoader {
    pub fn discover() -> Result<Self> {
        let paths = ConfigPaths::discover()?;
        Ok(Self { paths })
    }

    pub fn with_paths(paths: ConfigPaths) -> Self {
        Self { paths }
    }

    pub fn paths(&self) -> &ConfigPaths {
        &self.paths
    }

    pub fn load_or_init(&self) -> Result<AppConfig> {
        self.paths.ensure_directories()?;
        if !self.paths.config_file.exists() {
            let mut default_cfg = AppConfig::default();
            default_cfg.post_load(&self.paths)?;
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<AppConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: AppConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load(&self.paths)?;
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &AppConfig) -> Result<()> {
        let toml = toml::to_string_pretty(cfg).context("serializing default config")?;
        if let Some(parent) = self.paths.config_file.parent() {
            fs::create_dir_all(parent).with_context(|| format!("creating {}", parent.display()))?;
        }
        let mut file = fs::File::create(&self.paths.config_file)
            .with_context(|| format!("creating config {}", self.paths.config_file.display()))?;
        file.write_all(toml.as_bytes())
            .context("writing default config")?;
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct ConfigPaths {
    pub config_dir: PathBuf,
    pub config_file: PathBuf,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub backup_dir: PathBuf,
    pub log_dir: PathBuf,
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);
        let override_data = env::var(DATA_ENV).ok().map(PathBuf::from);

        let project_dirs = ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
            .context("resolving XDG project directories")?;

        let config_dir = override_config
            .clone()
            .map(|p| {
                if p.is_dir() {
                    p
                } else {
                    p.parent().map(Path::to_path_buf).unwrap_or(p)
                }
            })
            .unwrap_or_else(|| project_dirs.config_dir().to_path_buf());

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("config.toml"));

        let data_root = override_data.unwrap_or_else(|| project_dirs.data_dir().to_path_buf());
        Ok(Self::rooted(config_dir, config_file, data_root))
    }

    /// Lays out data paths beneath `data_dir`.
    pub fn rooted(config_dir: PathBuf, config_file: PathBuf, data_dir: PathBuf) -> Self {
        Self {
            config_dir,
            config_file,
            database_path: data_dir.join("notes.db"),
            backup_dir: data_dir.join("backups"),
            log_dir: data_dir.join("logs"),
            data_dir,
        }
    }

    pub fn ensure_directories(&self) -> Result<()> {
        for dir in [
            &self.config_dir,
            &self.data_dir,
            &self.backup_dir,
            &self.log_dir,
        ] {
            fs::create_dir_all(dir)
                .with_context(|| format!("creating application directory {}", dir.display()))?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub theme: ThemeName,
    pub time_ago: TimeAgoTemplates,
    pub trash: TrashOptions,
    pub categories: CategoryOptions,
    pub storage: StorageOptions,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            theme: ThemeName::Dark,
            time_ago: TimeAgoTemplates::english(),
            trash: TrashOptions::default(),
            categories: CategoryOptions::default(),
            storage: StorageOptions::default(),
        }
    }
}

impl AppConfig {
    fn post_load(&mut self, paths: &ConfigPaths) -> Result<()> {
        self.storage
            .resolve(paths)
            .context("resolving storage paths")?;
        for err in self.time_ago.repair() {
            tracing::warn!(%err, "replacing time-ago template with the English default");
        }
        self.categories.sanitize();
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrashOptions {
    /// Trashed notes older than this are purged (0 = keep until emptied by hand)
    pub retention_days: u32,
    pub purge_on_start: bool,
}

impl Default for TrashOptions {
    fn default() -> Self {
        Self {
            retention_days: 30,
            purge_on_start: true,
        }
    }
}

impl TrashOptions {
    /// Deletion instants at or before the returned cutoff have expired.
    pub fn cutoff(&self, now: i64) -> Option<i64> {
        if self.retention_days == 0 {
            None
        } else {
            Some(now.saturating_sub(i64::from(self.retention_days) * MILLIS_PER_DAY))
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CategoryOptions {
    pub palette: Vec<String>,
}

impl Default for CategoryOptions {
    fn default() -> Self {
        Self {
            palette: DEFAULT_PALETTE.iter().map(|color| color.to_string()).collect(),
        }
    }
}

impl CategoryOptions {
    fn sanitize(&mut self) {
        self.palette.retain(|color| {
            let valid = CategoryColor::parse(color).is_some();
            if !valid {
                tracing::warn!(%color, "dropping invalid palette colour");
            }
            valid
        });
        if self.palette.is_empty() {
            *self = Self::default();
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageOptions {
    #[serde(skip)]
    pub database_path: PathBuf,
    pub wal_autocheckpoint: u32,
}

impl Default for StorageOptions {
    fn default() -> Self {
        Self {
            database_path: PathBuf::new(),
            wal_autocheckpoint: 1000,
        }
    }
}

impl StorageOptions {
    fn resolve(&mut self, paths: &ConfigPaths) -> Result<()> {
        if self.database_path.as_os_str().is_empty() {
            self.database_path = paths.database_path.clone();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let config_dir = root.path().join("config");
        ConfigPaths::rooted(
            config_dir.clone(),
            config_dir.join("config.toml"),
            root.path().join("data"),
        )
    }

    #[test]
    fn first_run_writes_defaults() -> Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(temp_paths(&temp));
        let cfg = loader.load_or_init()?;
        assert!(loader.paths().config_file.exists());
        assert_eq!(cfg.trash.retention_days, 30);
        assert_eq!(cfg.time_ago, TimeAgoTemplates::english());
        assert_eq!(cfg.storage.database_path, loader.paths().database_path);

        let reloaded = loader.load()?;
        assert_eq!(reloaded.categories.palette.len(), DEFAULT_PALETTE.len());
        Ok(())
    }

    #[test]
    fn partial_file_keeps_defaults_and_repairs_templates() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        fs::write(
            &paths.config_file,
            r##"
theme = "light"

[time_ago]
now = "gerade eben"
minutes = "vor {n} Minuten"
hours = "vor Stunden"

[trash]
retention_days = 0

[categories]
palette = ["#123456", "chartreuse"]
"##,
        )?;
        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.theme, ThemeName::Light);
        assert_eq!(cfg.time_ago.now, "gerade eben");
        assert_eq!(cfg.time_ago.minutes, "vor {n} Minuten");
        assert_eq!(cfg.time_ago.hours, "{n}h ago");
        assert_eq!(cfg.time_ago.days, "{n}d ago");
        assert_eq!(cfg.trash.retention_days, 0);
        assert!(cfg.trash.purge_on_start);
        assert_eq!(cfg.categories.palette, vec!["#123456".to_string()]);
        Ok(())
    }

    #[test]
    fn unknown_theme_loads_as_dark() -> Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        paths.ensure_directories()?;
        fs::write(&paths.config_file, "theme = \"solarized\"\n")?;
        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.theme, ThemeName::Dark);
        assert_eq!(cfg.trash.retention_days, 30);
        Ok(())
    }

    #[test]
    fn trash_cutoff_respects_retention() {
        let keep = TrashOptions {
            retention_days: 0,
            purge_on_start: true,
        };
        assert_eq!(keep.cutoff(1_000), None);
        let month = TrashOptions::default();
        assert_eq!(month.cutoff(31 * MILLIS_PER_DAY), Some(MILLIS_PER_DAY));
    }
}

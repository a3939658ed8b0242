use std::env;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use time::UtcOffset;

const APP_DOMAIN: &str = "im";
const APP_ORG: &str = "ChatFeed";
const APP_NAME: &str = "chat-feed";

const CONFIG_ENV: &str = "CHAT_FEED_CONFIG";

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

    pub fn load_or_init(&self) -> Result<FeedConfig> {
        if !self.paths.config_file.exists() {
            let mut default_cfg = FeedConfig::default();
            default_cfg.post_load();
            self.write_default_config(&default_cfg)?;
            return Ok(default_cfg);
        }

        self.load()
    }

    pub fn load(&self) -> Result<FeedConfig> {
        let raw = fs::read_to_string(&self.paths.config_file)
            .with_context(|| format!("reading config {}", self.paths.config_file.display()))?;
        let mut cfg: FeedConfig = toml::from_str(&raw).context("parsing config toml")?;
        cfg.post_load();
        Ok(cfg)
    }

    fn write_default_config(&self, cfg: &FeedConfig) -> Result<()> {
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
}

impl ConfigPaths {
    pub fn discover() -> Result<Self> {
        let override_config = env::var(CONFIG_ENV).ok().map(PathBuf::from);

        let config_dir = match &override_config {
            Some(path) if path.is_dir() => path.clone(),
            Some(path) => path
                .parent()
                .map(Path::to_path_buf)
                .unwrap_or_else(|| path.clone()),
            None => ProjectDirs::from(APP_DOMAIN, APP_ORG, APP_NAME)
                .context("resolving XDG project directories")?
                .config_dir()
                .to_path_buf(),
        };

        let config_file = override_config
            .filter(|p| p.is_file() || p.extension().is_some())
            .unwrap_or_else(|| config_dir.join("feed.toml"));

        Ok(Self {
            config_dir,
            config_file,
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedConfig {
    pub nesting: NestingConfig,
    pub calendar: CalendarConfig,
    pub scroll: ScrollConfig,
}

impl FeedConfig {
    fn post_load(&mut self) {
        if self.nesting.window_secs == 0 {
            tracing::warn!("nesting window of zero seconds in config, falling back to default");
            self.nesting = NestingConfig::default();
        }
        let offset_secs = self.calendar.utc_offset_minutes.saturating_mul(60);
        if UtcOffset::from_whole_seconds(offset_secs).is_err() {
            tracing::warn!(
                offset = self.calendar.utc_offset_minutes,
                "calendar offset out of range in config, falling back to UTC"
            );
            self.calendar = CalendarConfig::default();
        }
        let ratio = self.scroll.safety_margin_viewport_ratio;
        if !(0.0..=1.0).contains(&ratio) || self.scroll.safety_margin_min_px < 0.0 {
            tracing::warn!(
                ratio,
                min_px = self.scroll.safety_margin_min_px,
                "scroll safety margin out of range in config, falling back to default"
            );
            let debounce_ms = self.scroll.debounce_ms;
            self.scroll = ScrollConfig {
                debounce_ms,
                ..ScrollConfig::default()
            };
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NestingConfig {
    /// Consecutive lines from one author closer than this share an entry.
    pub window_secs: u64,
}

impl Default for NestingConfig {
    fn default() -> Self {
        Self { window_secs: 600 }
    }
}

impl NestingConfig {
    pub fn window(&self) -> time::Duration {
        time::Duration::seconds(self.window_secs as i64)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalendarConfig {
    /// Offset from UTC, in minutes, in which day boundaries are drawn.
    pub utc_offset_minutes: i32,
}

impl CalendarConfig {
    pub fn offset(&self) -> UtcOffset {
        UtcOffset::from_whole_seconds(self.utc_offset_minutes.saturating_mul(60))
            .unwrap_or(UtcOffset::UTC)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrollConfig {
    pub debounce_ms: u64,
    pub safety_margin_min_px: f64,
    pub safety_margin_viewport_ratio: f64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 10,
            safety_margin_min_px: 80.0,
            safety_margin_viewport_ratio: 0.4,
        }
    }
}

impl ScrollConfig {
    pub fn debounce_duration(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn temp_paths(root: &TempDir) -> ConfigPaths {
        let config_dir = root.path().join("config");
        ConfigPaths {
            config_file: config_dir.join("feed.toml"),
            config_dir,
        }
    }

    #[test]
    fn load_or_init_writes_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let loader = ConfigLoader::with_paths(temp_paths(&temp));

        let cfg = loader.load_or_init()?;
        assert_eq!(cfg, FeedConfig::default());
        assert!(loader.paths().config_file.exists());

        let reloaded = loader.load()?;
        assert_eq!(reloaded, cfg);
        Ok(())
    }

    #[test]
    fn partial_file_keeps_remaining_defaults() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        fs::create_dir_all(&paths.config_dir)?;
        fs::write(
            &paths.config_file,
            "[nesting]\nwindow_secs = 120\n\n[calendar]\nutc_offset_minutes = 120\n",
        )?;

        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.nesting.window(), time::Duration::minutes(2));
        assert_eq!(cfg.calendar.offset(), UtcOffset::from_hms(2, 0, 0)?);
        assert_eq!(cfg.scroll, ScrollConfig::default());
        Ok(())
    }

    #[test]
    fn out_of_range_values_fall_back() -> anyhow::Result<()> {
        let temp = TempDir::new()?;
        let paths = temp_paths(&temp);
        fs::create_dir_all(&paths.config_dir)?;
        fs::write(
            &paths.config_file,
            "[nesting]\nwindow_secs = 0\n\n[calendar]\nutc_offset_minutes = 100000\n\n\
             [scroll]\ndebounce_ms = 25\nsafety_margin_viewport_ratio = 3.5\n",
        )?;

        let cfg = ConfigLoader::with_paths(paths).load()?;
        assert_eq!(cfg.nesting, NestingConfig::default());
        assert_eq!(cfg.calendar.offset(), UtcOffset::UTC);
        assert_eq!(cfg.scroll.debounce_ms, 25);
        assert_eq!(cfg.scroll.safety_margin_viewport_ratio, 0.4);
        Ok(())
    }
}

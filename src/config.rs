use std::path::PathBuf;
use std::time::Duration;

use log::{debug, info};
use serde::Deserialize;

use crate::dispatch::DispatchSettings;
use crate::encoding::EncodingChoice;
use crate::index::IndexOptions;
use crate::parse::Delimiter;
use crate::window::DEFAULT_BUFFER_FACTOR;

// ---------------------------------------------------------------------------
// ConfigFile: deserialized from TOML (all fields optional)
// ---------------------------------------------------------------------------

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ConfigFile {
    pub encoding: Option<EncodingChoice>,
    /// Omitted means detect from the extension or the header line.
    pub delimiter: Option<Delimiter>,
    #[serde(default)]
    pub viewer: ViewerConfigFile,
}

#[derive(Default, Deserialize)]
#[serde(default)]
pub struct ViewerConfigFile {
    pub buffer_factor: Option<usize>,
    pub reload_delay_ms: Option<u64>,
    pub prefetch_delay_ms: Option<u64>,
    pub frame_budget_ms: Option<u64>,
    pub scroll_step: Option<u32>,
    pub column_width: Option<u16>,
}

// ---------------------------------------------------------------------------
// Config: resolved (all fields concrete)
// ---------------------------------------------------------------------------

pub struct Config {
    pub index: IndexOptions,
    pub viewer: ViewerConfig,
}

pub struct ViewerConfig {
    pub buffer_factor: usize,
    pub reload_delay: Duration,
    pub prefetch_delay: Duration,
    pub frame_budget: Duration,
    pub scroll_step: u32,
    pub column_width: u16,
}

impl ViewerConfig {
    pub fn dispatch_settings(&self, visible_row_count: usize) -> DispatchSettings {
        DispatchSettings {
            visible_row_count,
            buffer_factor: self.buffer_factor,
            reload_delay: self.reload_delay,
            prefetch_delay: self.prefetch_delay,
        }
    }
}

impl ConfigFile {
    /// Merge CLI values (overwrites non-None fields).
    pub fn merge_cli(&mut self, encoding: Option<EncodingChoice>, delimiter: Option<Delimiter>) {
        if let Some(v) = encoding {
            debug!("config: CLI override encoding={v}");
            self.encoding = encoding;
        }
        if let Some(v) = delimiter {
            debug!("config: CLI override delimiter={v}");
            self.delimiter = delimiter;
        }
    }

    /// Resolve to a Config by applying defaults to missing fields.
    pub fn resolve(self) -> Config {
        let config = Config {
            index: IndexOptions {
                encoding: self.encoding.unwrap_or_default(),
                delimiter: self.delimiter,
            },
            viewer: ViewerConfig {
                buffer_factor: self
                    .viewer
                    .buffer_factor
                    .unwrap_or(DEFAULT_BUFFER_FACTOR)
                    .max(1),
                reload_delay: Duration::from_millis(self.viewer.reload_delay_ms.unwrap_or(30)),
                prefetch_delay: Duration::from_millis(
                    self.viewer.prefetch_delay_ms.unwrap_or(120),
                ),
                frame_budget: Duration::from_millis(self.viewer.frame_budget_ms.unwrap_or(32)),
                scroll_step: self.viewer.scroll_step.unwrap_or(1).max(1),
                column_width: self.viewer.column_width.unwrap_or(16).max(3),
            },
        };
        info!(
            "config: resolved encoding={}, delimiter={}, buffer_factor={}, \
             reload_delay={}ms, prefetch_delay={}ms, frame_budget={}ms, \
             scroll_step={}, column_width={}",
            config.index.encoding,
            config
                .index
                .delimiter
                .map_or_else(|| "auto".to_string(), |d| d.to_string()),
            config.viewer.buffer_factor,
            config.viewer.reload_delay.as_millis(),
            config.viewer.prefetch_delay.as_millis(),
            config.viewer.frame_budget.as_millis(),
            config.viewer.scroll_step,
            config.viewer.column_width,
        );
        config
    }
}

/// Resolve the XDG config path for rowscope.
fn config_path() -> Option<PathBuf> {
    let config_dir = std::env::var_os("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .or_else(|| std::env::var_os("HOME").map(|h| PathBuf::from(h).join(".config")))?;
    Some(config_dir.join("rowscope").join("config.toml"))
}

/// Load config file. Returns `ConfigFile::default()` if no file exists.
/// Returns an error if the file exists but cannot be parsed.
pub fn load_config() -> anyhow::Result<ConfigFile> {
    let Some(path) = config_path() else {
        info!("config: no HOME or XDG_CONFIG_HOME set, using defaults");
        return Ok(ConfigFile::default());
    };
    debug!("config: looking for {}", path.display());
    match std::fs::read_to_string(&path) {
        Ok(text) => {
            info!("config: loaded from {}", path.display());
            toml::from_str(&text)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            info!("config: {} not found, using defaults", path.display());
            Ok(ConfigFile::default())
        }
        Err(e) => Err(anyhow::anyhow!("failed to read {}: {e}", path.display())),
    }
}

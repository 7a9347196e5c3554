//! Configuration
//!
//! Two files feed a review session:
//! - the shotdiff settings file (TOML, optional) describing the server and the
//!   external tools it drives;
//! - the engine configuration (YAML) declaring browsers and where each one keeps
//!   its reference screenshots.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};

/// Default engine configuration file name
pub const DEFAULT_ENGINE_CONFIG: &str = ".shotdiff.yml";

/// shotdiff settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ReviewConfig {
    /// Host the viewer server binds to
    pub hostname: String,

    /// Port the viewer server binds to
    pub port: u16,

    /// Start a run as soon as the tests are loaded
    pub auto_run: bool,

    /// External test engine
    pub engine: EngineSettings,

    /// Lossless PNG recompression tool
    pub compressor: CompressorSettings,

    /// Parent directory for the current/diff staging directories
    pub temp_root: Option<PathBuf>,

    /// Events buffered per viewer connection before it is dropped
    pub event_buffer: usize,
}

impl Default for ReviewConfig {
    fn default() -> Self {
        Self {
            hostname: "localhost".to_string(),
            port: 8000,
            auto_run: false,
            engine: EngineSettings::default(),
            compressor: CompressorSettings::default(),
            temp_root: None,
            event_buffer: 256,
        }
    }
}

/// External test engine settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    /// Engine executable
    pub binary: PathBuf,

    /// Engine configuration file
    pub config_path: PathBuf,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("shotdiff-engine"),
            config_path: PathBuf::from(DEFAULT_ENGINE_CONFIG),
        }
    }
}

/// Recompression tool settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CompressorSettings {
    /// Executable, invoked as `<binary> -out <output> <input>`
    pub binary: PathBuf,
}

impl Default for CompressorSettings {
    fn default() -> Self {
        Self {
            binary: PathBuf::from("optipng"),
        }
    }
}

impl ReviewConfig {
    /// Load settings from file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            config.validate()?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    pub fn validate(&self) -> Result<()> {
        if self.event_buffer == 0 {
            return Err(Error::Config("event_buffer must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Directory receiving current captures
    pub fn current_dir(&self) -> PathBuf {
        self.temp_root().join("curr")
    }

    /// Directory receiving generated diff images
    pub fn diff_dir(&self) -> PathBuf {
        self.temp_root().join("diff")
    }

    fn temp_root(&self) -> PathBuf {
        self.temp_root
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(format!("shotdiff-{}", std::process::id())))
    }
}

/// Engine configuration as declared in the YAML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EngineConfig {
    #[serde(default)]
    pub root_url: Option<String>,

    /// Reference root used by browsers without their own
    #[serde(default)]
    pub screenshots_dir: Option<PathBuf>,

    #[serde(default)]
    pub browsers: BTreeMap<String, BrowserConfig>,
}

/// Per-browser engine configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BrowserConfig {
    #[serde(default)]
    pub screenshots_dir: Option<PathBuf>,
}

impl EngineConfig {
    /// Parse the engine configuration, resolving relative directories against
    /// the directory of the file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read {}: {}", path.display(), e))
        })?;
        Self::from_yaml(&content, &base_dir(path)?)
    }

    pub fn from_yaml(yaml: &str, base: &Path) -> Result<Self> {
        let mut config: Self = serde_yaml::from_str(yaml)?;
        if config.browsers.is_empty() {
            return Err(Error::Config("no browsers declared".to_string()));
        }

        let default_dir = config
            .screenshots_dir
            .take()
            .unwrap_or_else(|| PathBuf::from("screenshots"));
        let default_dir = resolve(base, &default_dir);

        for browser in config.browsers.values_mut() {
            let dir = match browser.screenshots_dir.take() {
                Some(dir) => resolve(base, &dir),
                None => default_dir.clone(),
            };
            browser.screenshots_dir = Some(dir);
        }
        config.screenshots_dir = Some(default_dir);

        Ok(config)
    }

    /// Declared browser ids, sorted
    pub fn browser_ids(&self) -> Vec<String> {
        self.browsers.keys().cloned().collect()
    }

    /// Reference screenshot root for a browser
    pub fn screenshots_dir(&self, browser_id: &str) -> Option<&Path> {
        self.browsers
            .get(browser_id)
            .and_then(|b| b.screenshots_dir.as_deref())
    }
}

/// Absolute directory of a config file. A bare file name has an empty parent,
/// which resolves to the working directory.
fn base_dir(path: &Path) -> Result<PathBuf> {
    let parent = path.parent().unwrap_or_else(|| Path::new(""));
    if parent.is_absolute() {
        Ok(parent.to_path_buf())
    } else {
        Ok(std::env::current_dir()?.join(parent))
    }
}

fn resolve(base: &Path, path: &Path) -> PathBuf {
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

//! Configuration for the bridge, resolver and watcher.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Type-library GUID of Visio, as it appears in running-object display names.
pub const VISIO_CLASS_ID: &str = "{00021A21-0000-0000-C000-000000000046}";

/// Extensions of drawings and templates registered in the running object table.
pub const ROT_EXTENSIONS: [&str; 4] = [".vsdx", ".vsdm", ".vstx", ".vstm"];

/// Environment variable overriding [`BridgeConfig::bridge_exe`].
pub const BRIDGE_EXE_ENV: &str = "VISIO_BRIDGE_EXE";

/// How to launch the COM bridge process.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    /// Path to `visio-com-bridge.exe`. If None, searched next to the current
    /// executable and in the cross-compilation target directories.
    pub bridge_exe: Option<PathBuf>,

    /// Program that runs the bridge, e.g. `wine` on Linux. None runs it directly.
    pub launcher: Option<PathBuf>,

    /// WINEPREFIX for the launcher.
    pub wine_prefix: Option<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            bridge_exe: None,
            launcher: if cfg!(windows) {
                None
            } else {
                Some(PathBuf::from("wine"))
            },
            wine_prefix: None,
        }
    }
}

/// Which running-object entries count as Visio documents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Class identifiers matched as substrings of display names. The GUID the
    /// bridge discovers at runtime is added to these.
    pub class_ids: Vec<String>,

    /// File extensions matched as display-name suffixes.
    pub extensions: Vec<String>,
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            class_ids: vec![VISIO_CLASS_ID.to_string()],
            extensions: ROT_EXTENSIONS.iter().map(|e| e.to_string()).collect(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WatcherConfig {
    /// Time between selection polls, in milliseconds.
    pub poll_interval_ms: u64,
}

impl WatcherConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1000,
        }
    }
}

/// Top-level configuration, usually read from `visio-connect.toml`.
///
/// ```toml
/// [bridge]
/// launcher = "wine"
/// wine_prefix = "/home/me/.wine-visio"
///
/// [resolver]
/// extensions = [".vsdx", ".vsdm"]
///
/// [watcher]
/// poll_interval_ms = 500
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub bridge: BridgeConfig,
    pub resolver: ResolverConfig,
    pub watcher: WatcherConfig,
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("reading '{}': {e}", path.display())))?;
        Self::from_toml(&text)
    }

    /// Apply `VISIO_BRIDGE_EXE` and `WINEPREFIX` from the environment.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(exe) = std::env::var_os(BRIDGE_EXE_ENV) {
            self.bridge.bridge_exe = Some(PathBuf::from(exe));
        }
        if let Some(prefix) = std::env::var_os("WINEPREFIX") {
            self.bridge.wine_prefix = Some(PathBuf::from(prefix));
        }
        self
    }
}

use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;

use crate::frame::LinkIdentity;
use crate::sweep::{SweepDimension, SweepPlan, DEFAULT_MESSAGES_PER_SETTING};

pub const DEBUG_CONF: &str = "debug_conf.json";
pub const GLOBAL_CONF: &str = "global_conf.json";
pub const LOCAL_CONF: &str = "local_conf.json";

const DEFAULT_ROUTER_ID: &str = "0200000000EEFFC0";
const DEFAULT_DEVICE_ID: &str = "0123456789ABCDEF";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("no configuration file found in {}", .0.display())]
    NotFound(PathBuf),
    #[error("configuration read failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("configuration parse failed: {0}")]
    Json(#[from] serde_json::Error),
    #[error("link identifier in `{0}` is not 16 hex digits")]
    InvalidIdentity(String),
    #[error("{0}")]
    InvalidDimension(String),
    #[error("messages_per_setting must be at least 1")]
    InvalidMessageCount,
}

/// Everything a run needs, resolved to concrete values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TestConfig {
    pub identity: LinkIdentity,
    pub dimension: SweepDimension,
    pub messages_per_setting: u8,
}

impl TestConfig {
    pub fn plan(&self) -> SweepPlan {
        SweepPlan::new(self.dimension, self.messages_per_setting)
    }

    fn from_raw(raw: RawConfig) -> Result<Self, ConfigError> {
        let router = raw
            .link_conf
            .router_id
            .unwrap_or_else(|| DEFAULT_ROUTER_ID.to_string());
        let device = raw
            .link_conf
            .device_id
            .unwrap_or_else(|| DEFAULT_DEVICE_ID.to_string());
        let identity = LinkIdentity::from_hex(&router, &device)
            .ok_or_else(|| ConfigError::InvalidIdentity(format!("{}/{}", router, device)))?;

        let dimension = match raw.run_conf.dimension {
            Some(token) => token.parse().map_err(ConfigError::InvalidDimension)?,
            None => SweepDimension::Power,
        };

        let messages_per_setting = raw
            .run_conf
            .messages_per_setting
            .unwrap_or(DEFAULT_MESSAGES_PER_SETTING);
        if messages_per_setting == 0 {
            return Err(ConfigError::InvalidMessageCount);
        }

        Ok(Self {
            identity,
            dimension,
            messages_per_setting,
        })
    }
}

impl Default for TestConfig {
    fn default() -> Self {
        Self::from_raw(RawConfig::default()).unwrap()
    }
}

// Raw shape of the JSON files; every field optional, unknown fields ignored.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    link_conf: RawLinkConf,
    #[serde(default)]
    run_conf: RawRunConf,
}

#[derive(Debug, Default, Deserialize)]
struct RawLinkConf {
    router_id: Option<String>,
    device_id: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct RawRunConf {
    dimension: Option<String>,
    messages_per_setting: Option<u8>,
}

/// Load the configuration from a directory. `debug_conf.json` alone wins when
/// present; otherwise `local_conf.json` overlays `global_conf.json` field by
/// field; no file at all is fatal.
pub fn load<P: AsRef<Path>>(dir: P) -> Result<TestConfig, ConfigError> {
    let dir = dir.as_ref();

    let debug_conf = dir.join(DEBUG_CONF);
    if debug_conf.is_file() {
        info!("Configuring from {} alone.", debug_conf.display());
        return TestConfig::from_raw(read_raw(&debug_conf)?);
    }

    let global_conf = dir.join(GLOBAL_CONF);
    let local_conf = dir.join(LOCAL_CONF);

    let raw = match (global_conf.is_file(), local_conf.is_file()) {
        (true, true) => {
            info!(
                "Configuring from {}, overlaid by {}.",
                global_conf.display(),
                local_conf.display()
            );
            overlay(read_raw(&global_conf)?, read_raw(&local_conf)?)
        }
        (true, false) => read_raw(&global_conf)?,
        (false, true) => read_raw(&local_conf)?,
        (false, false) => return Err(ConfigError::NotFound(dir.to_path_buf())),
    };

    TestConfig::from_raw(raw)
}

fn read_raw(path: &Path) -> Result<RawConfig, ConfigError> {
    let contents = fs::read_to_string(path)?;
    Ok(serde_json::from_str(&contents)?)
}

fn overlay(base: RawConfig, local: RawConfig) -> RawConfig {
    RawConfig {
        link_conf: RawLinkConf {
            router_id: local.link_conf.router_id.or(base.link_conf.router_id),
            device_id: local.link_conf.device_id.or(base.link_conf.device_id),
        },
        run_conf: RawRunConf {
            dimension: local.run_conf.dimension.or(base.run_conf.dimension),
            messages_per_setting: local
                .run_conf
                .messages_per_setting
                .or(base.run_conf.messages_per_setting),
        },
    }
}

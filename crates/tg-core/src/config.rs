use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use directories::{BaseDirs, ProjectDirs};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Public test application credentials used by `init` when none are given.
pub const SAMPLE_APP_ID: i32 = 17349;
pub const SAMPLE_APP_HASH: &str = "344583e45741c457fe1862106095a5eb";
pub const SAMPLE_BOT_TOKEN: &str = "123456:10";

const CONFIG_FILE: &str = "tg.cli.yaml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parse config {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("no bot token provided")]
    MissingToken,
    #[error("config {0} already exists")]
    Exists(PathBuf),
    #[error("write config {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("encode config: {0}")]
    Encode(#[from] serde_yaml::Error),
    #[error("unable to determine configuration directory (no platform default)")]
    NoConfigDir,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    pub app_id: i32,
    pub app_hash: String,
    pub bot_token: String,
    /// Gateway base URL; the default gateway when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
}

impl Config {
    pub fn sample() -> Self {
        Self {
            app_id: SAMPLE_APP_ID,
            app_hash: SAMPLE_APP_HASH.to_string(),
            bot_token: SAMPLE_BOT_TOKEN.to_string(),
            endpoint: None,
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let data = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_yaml::from_str(&data).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        if config.bot_token.trim().is_empty() {
            return Err(ConfigError::MissingToken);
        }
        Ok(config)
    }

    /// Write the config to a new file. Refuses to overwrite.
    pub fn write_new(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if path.exists() {
            return Err(ConfigError::Exists(path.to_path_buf()));
        }
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            create_private_dir(parent).map_err(write_err)?;
        }
        let data = serde_yaml::to_string(self)?;
        write_private_file(path, data.as_bytes()).map_err(write_err)
    }

    /// Session file for this bot, kept beside the config file.
    pub fn session_path(&self, config_path: &Path) -> PathBuf {
        session_path(config_path, &self.bot_token)
    }
}

/// `tg.session.<md5(token)>.json` in the directory of `config_path`.
pub fn session_path(config_path: &Path, bot_token: &str) -> PathBuf {
    let name = format!("tg.session.{:x}.json", md5::compute(bot_token.as_bytes()));
    match config_path.parent() {
        Some(dir) => dir.join(name),
        None => PathBuf::from(name),
    }
}

/// Resolve the default config file.
/// Priority: platform standard -> ~/.config/tg
pub fn default_config_path() -> Result<PathBuf, ConfigError> {
    if let Some(proj) = ProjectDirs::from("", "", "tg") {
        return Ok(proj.config_dir().join(CONFIG_FILE));
    }
    if let Some(base) = BaseDirs::new() {
        return Ok(base.home_dir().join(".config").join("tg").join(CONFIG_FILE));
    }
    Err(ConfigError::NoConfigDir)
}

#[cfg(unix)]
fn create_private_dir(path: &Path) -> io::Result<()> {
    use std::os::unix::fs::DirBuilderExt;
    fs::DirBuilder::new().recursive(true).mode(0o700).create(path)
}

#[cfg(not(unix))]
fn create_private_dir(path: &Path) -> io::Result<()> {
    fs::create_dir_all(path)
}

#[cfg(unix)]
fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;
    use std::os::unix::fs::OpenOptionsExt;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(data)
}

#[cfg(not(unix))]
fn write_private_file(path: &Path, data: &[u8]) -> io::Result<()> {
    use std::io::Write;
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(data)
}

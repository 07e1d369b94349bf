//! Persistent sender configuration.
//!
//! The configuration is a pretty-printed JSON [`SenderConfig`] in the
//! platform configuration directory. Missing files yield the defaults,
//! missing keys take their default value. Command line options are layered
//! on top by [`apply_cli`].

use log::{debug, info};
use std::fs;
use std::io::{self, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use thiserror::Error;

use navcast_core::SenderConfig;

use crate::Cli;

const CONFIG_FILE: &str = "config.json";

#[derive(Error, Debug)]
pub enum SettingsError {
    #[error("Cannot access {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Invalid configuration in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("No configuration directory available on this platform")]
    NoConfigDir,
}

/// Location of the configuration file when none is given.
pub fn default_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("org", "navcast", "navcast")
        .map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn resolve(path: Option<&Path>) -> Result<PathBuf, SettingsError> {
    match path {
        Some(path) => Ok(path.to_path_buf()),
        None => default_path().ok_or(SettingsError::NoConfigDir),
    }
}

/// Load the configuration, or the defaults if there is no file yet.
pub fn load(path: Option<&Path>) -> Result<SenderConfig, SettingsError> {
    let path = resolve(path)?;
    let file = match fs::File::open(&path) {
        Ok(file) => file,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!("No configuration at {}, using defaults", path.display());
            return Ok(SenderConfig::default());
        }
        Err(source) => return Err(SettingsError::Io { path, source }),
    };

    let config = serde_json::from_reader(BufReader::new(file))
        .map_err(|source| SettingsError::Parse {
            path: path.clone(),
            source,
        })?;
    debug!("Loaded configuration from {}", path.display());
    Ok(config)
}

/// Write the configuration, creating parent directories as needed.
pub fn save(config: &SenderConfig, path: Option<&Path>) -> Result<PathBuf, SettingsError> {
    let path = resolve(path)?;
    let io_err = |source| SettingsError::Io {
        path: path.clone(),
        source,
    };

    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).map_err(io_err)?;
    }
    let file = fs::File::create(&path).map_err(io_err)?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, config).map_err(|source| SettingsError::Parse {
        path: path.clone(),
        source,
    })?;
    writer.write_all(b"\n").map_err(io_err)?;
    writer.flush().map_err(io_err)?;

    info!("Saved configuration to {}", path.display());
    Ok(path)
}

/// Override the stored configuration with whatever was given on the
/// command line.
pub fn apply_cli(mut config: SenderConfig, args: &Cli) -> SenderConfig {
    if let Some(host) = &args.host {
        config.endpoint.host = host.trim().to_string();
    }
    if let Some(port) = args.port {
        config.endpoint.port = port;
    }
    if let Some(mode) = args.heading {
        config.heading_mode = mode;
        config.heading_enabled = true;
    }
    if args.no_heading {
        config.heading_enabled = false;
    }
    if args.swap_heading_fields {
        config.swap_heading_fields = true;
    }
    if let Some(interval) = args.timer {
        config.timer_enabled = true;
        config.timer_interval = interval;
    }
    if args.no_timer {
        config.timer_enabled = false;
    }
    if args.show_errors {
        config.show_error_history = true;
    }
    config
}

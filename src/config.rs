use std::fmt::Display;
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs};

use crate::APPLICATION_NAME;

#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    pub client_id: String,
    pub redirect_uri: String,
    /// The address the authorization callback listener binds to. Must match `redirect_uri`.
    pub listen_address: String,
    pub poll_interval: Duration,
    /// How often a single poll cycle re-checks playback after skipping, before it gives up and
    /// waits for the next tick.
    pub max_rechecks: u32,
    pub recheck_delay: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: "3c334ae39e734129a8a0533019ac7225".to_string(),
            redirect_uri: "http://localhost:5173/callback".to_string(),
            listen_address: "127.0.0.1:5173".to_string(),
            poll_interval: Duration::from_secs(5),
            max_rechecks: 10,
            recheck_delay: Duration::ZERO,
        }
    }
}

/// Reads the config file, creating it first if it doesn't exist. Problems with the file are
/// logged, and the defaults are used for everything that could not be read.
pub fn get_config() -> Config {
    let path = match get_config_path() {
        Ok(config_path) => config_path.join(CONFIG_FILENAME),
        Err(e) => {
            warn!("{} Using default configuration.", e);
            return Config::default();
        }
    };
    create_initial_config_file(&path);
    match File::open(&path) {
        Ok(file) => parse_config(BufReader::new(file)),
        Err(e) => {
            warn!("Unable to open config file {:?}: {}", path, e);
            Config::default()
        }
    }
}

fn parse_config<R: BufRead>(reader: R) -> Config {
    let mut config = Config::default();

    for (line_number, line) in reader.lines().enumerate() {
        let line = match line {
            Ok(l) => l,
            Err(e) => {
                error!("Unable to read config file: {}", e);
                break;
            }
        };
        let line = line.trim();

        // The # char may be used for comments.
        if line.is_empty() || line.starts_with('#') {
            continue;
        }

        let (key, value) = match line.split_once('=') {
            Some((key, value)) => (key.trim(), value.trim()),
            None => {
                error!(
                    "Error in line {}: expected 'key = value', got: {}",
                    line_number + 1,
                    line
                );
                continue;
            }
        };

        if let Err(e) = apply_setting(&mut config, key, value) {
            error!("Error in line {}: {}", line_number + 1, e);
        }
    }

    config
}

fn apply_setting(config: &mut Config, key: &str, value: &str) -> Result<(), String> {
    match key {
        "client_id" => config.client_id = value.to_string(),
        "redirect_uri" => config.redirect_uri = value.to_string(),
        "listen_address" => config.listen_address = value.to_string(),
        "poll_interval_secs" => {
            let secs: u64 = value.parse().map_err(|e| invalid(key, value, e))?;
            if !(1..=MAX_POLL_INTERVAL_SECS).contains(&secs) {
                return Err(invalid(
                    key,
                    value,
                    format!("must be between 1 and {}", MAX_POLL_INTERVAL_SECS),
                ));
            }
            config.poll_interval = Duration::from_secs(secs);
        }
        "max_rechecks" => {
            config.max_rechecks = value.parse().map_err(|e| invalid(key, value, e))?;
        }
        "recheck_delay_millis" => {
            let millis: u64 = value.parse().map_err(|e| invalid(key, value, e))?;
            if millis > MAX_RECHECK_DELAY_MILLIS {
                return Err(invalid(
                    key,
                    value,
                    format!("must be at most {}", MAX_RECHECK_DELAY_MILLIS),
                ));
            }
            config.recheck_delay = Duration::from_millis(millis);
        }
        other => return Err(format!("unknown setting: {}", other)),
    }
    Ok(())
}

fn invalid(key: &str, value: &str, reason: impl Display) -> String {
    format!("invalid value for {}: {} ({})", key, value, reason)
}

pub fn get_config_path() -> Result<PathBuf, String> {
    if let Ok(config_dir) = env::var("CONFIGURATION_DIRECTORY") {
        // CONFIGURATION_DIRECTORY is set if this application runs via systemd: More details here:
        // https://www.freedesktop.org/software/systemd/man/latest/systemd.exec.html#RuntimeDirectory=
        Ok(Path::new(&config_dir).to_path_buf())
    } else if let Ok(xdg_config_home) = env::var("XDG_CONFIG_HOME") {
        Ok(Path::new(&xdg_config_home).join(APPLICATION_NAME))
    } else if let Ok(home) = env::var("HOME") {
        Ok(Path::new(&home).join(".config").join(APPLICATION_NAME))
    } else {
        Err(
            "None of the environment vars CONFIGURATION_DIRECTORY, XDG_CONFIG_HOME or HOME is set."
                .to_string(),
        )
    }
}

pub fn get_state_directory() -> PathBuf {
    if let Ok(state_dir) = env::var("STATE_DIRECTORY") {
        Path::new(&state_dir).to_path_buf()
    } else if let Ok(xdg_state_home) = env::var("XDG_STATE_HOME") {
        Path::new(&xdg_state_home).join(APPLICATION_NAME)
    } else if let Ok(home) = env::var("HOME") {
        Path::new(&home)
            .join(".local")
            .join("state")
            .join(APPLICATION_NAME)
    } else {
        // We try to avoid panic! in general, but this is one of those cases where skipwarden
        // is just not usable in any reasonable way: it could neither keep the blacklist nor
        // the login.
        panic!("None of the environment vars STATE_DIRECTORY, XDG_STATE_HOME or HOME is set.");
    }
}

pub fn get_runtime_directory() -> Result<PathBuf, String> {
    if let Ok(runtime_dir) = env::var("RUNTIME_DIRECTORY") {
        Ok(Path::new(&runtime_dir).to_path_buf())
    } else if let Ok(xdg_runtime_dir) = env::var("XDG_RUNTIME_DIR") {
        Ok(Path::new(&xdg_runtime_dir).join(APPLICATION_NAME))
    } else {
        Err(
            "Neither RUNTIME_DIRECTORY nor XDG_RUNTIME_DIR environment variables are set."
                .to_string(),
        )
    }
}

fn create_initial_config_file(path: &Path) {
    if let Some(parent) = path.parent() {
        if let Err(e) = fs::create_dir_all(parent) {
            warn!("Unable to create config directory at {:?}: {}", parent, e);
            return;
        }
    }
    match OpenOptions::new().create_new(true).write(true).open(path) {
        Ok(mut file) => {
            let explanation = b"# skipwarden configuration. Lines have the form 'key = value',\
            \n# lines starting with # are ignored. The values below are the defaults.\
            \n\n# Spotify app used for the login. If you register your own app, make sure that\
            \n# redirect_uri is listed in its settings and that listen_address matches it.\
            \n# client_id = 3c334ae39e734129a8a0533019ac7225\
            \n# redirect_uri = http://localhost:5173/callback\
            \n# listen_address = 127.0.0.1:5173\
            \n\n# How often to check what is currently playing.\
            \n# poll_interval_secs = 5\
            \n\n# After skipping a blocked song, playback is checked again right away until\
            \n# Spotify has moved on, but at most this many times per poll.\
            \n# max_rechecks = 10\
            \n# Pause between two of these checks.\
            \n# recheck_delay_millis = 0\n";
            if let Err(err) = file.write_all(explanation) {
                error!("Error writing to file: {}", err);
            }
        }
        Err(err) if err.kind() == ErrorKind::AlreadyExists => {
            debug!("File {:?} already exists.", path);
        }
        Err(err) => {
            warn!("Error creating file at path {:?}: {}", path, err);
        }
    }
}

const CONFIG_FILENAME: &str = "skipwarden.conf";
const MAX_POLL_INTERVAL_SECS: u64 = 24 * 60 * 60;
const MAX_RECHECK_DELAY_MILLIS: u64 = 60 * 1000;

//! Configuration and paths
//!
//! Stored as pretty JSON in `.air780e.json` in the working directory unless a
//! path is given explicitly. Missing fields take their defaults.

use crate::codec::{Charset, EncodingMode, ValidityPeriod};
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;

pub const CONFIG_FILENAME: &str = ".air780e.json";

/// All configurable paths and constants
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial device; discovered from `/dev/serial/by-id` when unset
    pub serial_port: Option<String>,
    pub baud_rate: u32,
    pub encoding: EncodingMode,
    pub command_timeout_ms: u64,
    pub read_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub acquire_timeout_ms: u64,
    /// How long the listener holds the session per poll
    pub listen_window_ms: u64,
    /// Pause before looking for the device again after it disappears
    pub scan_interval_secs: u64,
    pub log_file: PathBuf,
    pub control_socket: PathBuf,
    /// Sent after the standard init sequence
    pub extra_init_commands: Vec<String>,
    /// Forward and delete messages already stored when the listener starts
    pub sweep_on_start: bool,
    pub storage: String,
    pub validity_period: ValidityPeriod,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            serial_port: None,
            baud_rate: 115_200,
            encoding: EncodingMode::Pdu,
            command_timeout_ms: 5_000,
            read_timeout_ms: 10_000,
            send_timeout_ms: 60_000,
            acquire_timeout_ms: 30_000,
            listen_window_ms: 250,
            scan_interval_secs: 10,
            log_file: PathBuf::from("messages.jsonl"),
            control_socket: default_control_socket(),
            extra_init_commands: vec!["AT+RNDISCALL=0".to_string()],
            sweep_on_start: true,
            storage: "ME".to_string(),
            validity_period: ValidityPeriod::default(),
        }
    }
}

fn default_control_socket() -> PathBuf {
    dirs::runtime_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("air780e-sms.sock")
}

impl Config {
    /// Create config for testing with custom paths
    pub fn for_test(temp_dir: &Path) -> Self {
        Self {
            serial_port: Some(temp_dir.join("ttyFAKE").to_string_lossy().into_owned()),
            command_timeout_ms: 1_000,
            read_timeout_ms: 1_000,
            send_timeout_ms: 2_000,
            acquire_timeout_ms: 2_000,
            listen_window_ms: 50,
            scan_interval_secs: 1,
            log_file: temp_dir.join("messages.jsonl"),
            control_socket: temp_dir.join("air780e-sms.sock"),
            extra_init_commands: Vec::new(),
            ..Self::default()
        }
    }

    /// Text mode with `charset`, PDU otherwise.
    pub fn with_text_mode(mut self, charset: Charset) -> Self {
        self.encoding = EncodingMode::Text { charset };
        self
    }

    pub fn default_path() -> PathBuf {
        PathBuf::from(CONFIG_FILENAME)
    }

    /// Load from `path`. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))
    }

    /// Save atomically (temp file in the same directory, then rename).
    pub fn save(&self, path: &Path) -> Result<()> {
        let parent = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        fs::create_dir_all(parent)?;

        let mut temp = NamedTempFile::new_in(parent)?;
        let json = serde_json::to_string_pretty(self)?;
        temp.write_all(json.as_bytes())?;
        temp.write_all(b"\n")?;
        temp.as_file().sync_all()?;
        temp.persist(path).map_err(|e| Error::Io(e.error))?;
        Ok(())
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_millis(self.command_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn acquire_timeout(&self) -> Duration {
        Duration::from_millis(self.acquire_timeout_ms)
    }

    pub fn listen_window(&self) -> Duration {
        Duration::from_millis(self.listen_window_ms)
    }

    pub fn scan_interval(&self) -> Duration {
        Duration::from_secs(self.scan_interval_secs)
    }
}

//! AIR780E AT interface discovery
//!
//! The modem enumerates as a USB composite device with several serial
//! interfaces. Only the one whose sysfs `interface` string is "AT" speaks AT.

use crate::error::{Error, Result};
use std::fs;
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const BY_ID_DIR: &str = "/dev/serial/by-id";
pub const SYS_TTY_DIR: &str = "/sys/class/tty";
/// `/dev/serial/by-id` name prefix of the AIR780E composite device
pub const DEVICE_PREFIX: &str = "usb-EigenComm_EigenComm_Compo";

/// Device paths of every connected AT interface.
pub fn list_at_devices() -> Vec<PathBuf> {
    list_at_devices_in(Path::new(BY_ID_DIR), Path::new(SYS_TTY_DIR))
}

/// The one connected AT interface.
pub fn find_at_device() -> Result<PathBuf> {
    choose_device(list_at_devices())
}

/// Refuses to guess between several modems.
pub fn choose_device(mut devices: Vec<PathBuf>) -> Result<PathBuf> {
    match devices.len() {
        0 => Err(Error::Device(io::Error::new(
            ErrorKind::NotFound,
            "no AIR780E AT interface found",
        ))),
        1 => Ok(devices.remove(0)),
        _ => {
            let names: Vec<String> = devices.iter().map(|d| d.display().to_string()).collect();
            Err(Error::Config(format!(
                "multiple AT devices found ({}); please specify --port",
                names.join(", ")
            )))
        }
    }
}

pub fn list_at_devices_in(by_id: &Path, sys_tty: &Path) -> Vec<PathBuf> {
    let entries = match fs::read_dir(by_id) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("Cannot read {}: {}", by_id.display(), e);
            return Vec::new();
        }
    };

    let mut links: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .map(|name| name.to_string_lossy().starts_with(DEVICE_PREFIX))
                .unwrap_or(false)
        })
        .collect();
    links.sort();

    let mut devices = Vec::new();
    for link in links {
        let Ok(dev_path) = fs::canonicalize(&link) else {
            continue;
        };
        let Some(name) = dev_path.file_name() else {
            continue;
        };
        let interface = read_interface(&sys_tty.join(name).join("device"));
        debug!("{} -> {} ({:?})", link.display(), dev_path.display(), interface);
        let is_at = interface
            .map(|text| text.eq_ignore_ascii_case("at"))
            .unwrap_or(false);
        if is_at && !devices.contains(&dev_path) {
            devices.push(dev_path);
        }
    }
    devices
}

/// The `interface` attribute of `device` or one of its three nearest parents.
fn read_interface(device: &Path) -> Option<String> {
    let start = fs::canonicalize(device).unwrap_or_else(|_| device.to_path_buf());
    start
        .ancestors()
        .take(4)
        .filter_map(|dir| fs::read_to_string(dir.join("interface")).ok())
        .map(|text| text.trim().to_string())
        .find(|text| !text.is_empty())
}

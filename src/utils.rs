use std::fs;
use std::path::Path;

use tracing::{debug, info};
use v4l::{capability::Flags, video::Capture, Device, FourCC};

use crate::capture::v4l2::{FOURCC_RGB565_BE, FOURCC_RGB565_LE};
use crate::error::SensorError;

/// Auto-detect a capture device that can deliver RGB565
pub fn auto_detect_device() -> Result<String, SensorError> {
    info!("Auto-detecting capture devices...");

    for i in 0..10 {
        let path = format!("/dev/video{}", i);
        if !Path::new(&path).exists() {
            continue;
        }

        if let Ok(dev) = Device::with_path(&path) {
            if let Ok(caps) = dev.query_caps() {
                // Check for capture capability
                if caps.capabilities.contains(Flags::VIDEO_CAPTURE) {
                    if let Ok(formats) = dev.enum_formats() {
                        for fmt in formats {
                            if fmt.fourcc == FourCC::new(&FOURCC_RGB565_BE)
                                || fmt.fourcc == FourCC::new(&FOURCC_RGB565_LE)
                            {
                                info!("Found RGB565 device: {} - {}", path, caps.card);
                                return Ok(path);
                            }
                        }
                    }
                }
            }
        }
    }

    Err(SensorError::Unsupported("no RGB565 capture device found".into()))
}

/// Parse a colon-separated MAC address such as `b8:27:eb:12:34:56`.
pub fn parse_hardware_address(text: &str) -> Option<[u8; 6]> {
    let mut mac = [0u8; 6];
    let mut parts = text.trim().split(':');
    for byte in mac.iter_mut() {
        *byte = u8::from_str_radix(parts.next()?, 16).ok()?;
    }
    if parts.next().is_some() {
        return None;
    }
    Some(mac)
}

/// Read the hardware address of `iface` from sysfs.
pub fn read_hardware_address(iface: &str) -> Option<[u8; 6]> {
    let path = format!("/sys/class/net/{}/address", iface);
    let text = fs::read_to_string(&path).ok()?;
    parse_hardware_address(&text)
}

/// First non-loopback interface with a non-zero hardware address.
pub fn primary_interface() -> Option<(String, [u8; 6])> {
    let mut names: Vec<String> = fs::read_dir("/sys/class/net")
        .ok()?
        .filter_map(|entry| entry.ok())
        .filter_map(|entry| entry.file_name().into_string().ok())
        .filter(|name| name != "lo")
        .collect();
    names.sort();

    names.into_iter().find_map(|name| {
        let mac = read_hardware_address(&name)?;
        if mac == [0; 6] {
            debug!("Skipping {} with zero hardware address", name);
            return None;
        }
        Some((name, mac))
    })
}

/// Lower-case hex without separators.
pub fn hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

/// `<prefix>_<last six hex digits of the hardware address>`
pub fn device_id(prefix: &str, mac: &[u8; 6]) -> String {
    let hex = hex(mac);
    format!("{}_{}", prefix, &hex[hex.len() - 6..])
}

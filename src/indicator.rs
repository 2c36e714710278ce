//! Device-side status indicator

use std::fs;
use std::path::PathBuf;

use tracing::debug;

pub trait Indicator: Send {
    fn set(&mut self, on: bool);
}

/// Indicator that does nothing, for hosts without an LED.
#[derive(Debug, Default)]
pub struct NoIndicator;

impl Indicator for NoIndicator {
    fn set(&mut self, _on: bool) {}
}

/// LED exposed through `/sys/class/leds/<name>/brightness`.
#[derive(Debug)]
pub struct SysfsLed {
    brightness: PathBuf,
    state: Option<bool>,
}

impl SysfsLed {
    pub fn new(name: &str) -> Self {
        Self {
            brightness: PathBuf::from(format!("/sys/class/leds/{}/brightness", name)),
            state: None,
        }
    }
}

impl Indicator for SysfsLed {
    fn set(&mut self, on: bool) {
        if self.state == Some(on) {
            return;
        }
        if let Err(e) = fs::write(&self.brightness, if on { "1" } else { "0" }) {
            debug!("Failed to drive {}: {}", self.brightness.display(), e);
        }
        self.state = Some(on);
    }
}

/// Blink pattern: lit for four frames out of every eight.
pub fn blink_phase(sequence: u64) -> bool {
    sequence % 8 < 4
}

/// Pick the indicator configured for this host.
pub fn from_config(led: Option<&str>) -> Box<dyn Indicator> {
    match led {
        Some(name) => Box::new(SysfsLed::new(name)),
        None => Box::new(NoIndicator),
    }
}

// src/config.rs
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::drivers::DaqError;

/// Optional JSON settings for the power-supply monitor. Every field has a
/// default, so an empty object `{}` is a valid config file.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Substring an `*IDN?` answer must contain to count as a candidate.
    pub identity_filter: String,
    /// Resources to probe in addition to what the VISA library reports,
    /// e.g. LAN instruments that are not registered with it.
    pub extra_resources: Vec<String>,
    /// VISA open timeout.
    pub io_timeout_ms: u64,
    /// Second header line of the measurement log.
    pub expected_note: String,
    /// Upper bound of the fixed current axis in the channel plots.
    pub plot_y_max_ma: f64,
    pub window_title: String,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            identity_filter: "HMP4040".to_string(),
            extra_resources: Vec::new(),
            io_timeout_ms: 2000,
            expected_note:
                "expected V/mA ch1 1.85/500, ch2 1.25/150, ch3 3.33/140, ch4 1.95/500".to_string(),
            plot_y_max_ma: 600.0,
            window_title: "Power Supply Monitoring".to_string(),
        }
    }
}

impl MonitorConfig {
    pub fn load(path: &Path) -> Result<Self, DaqError> {
        let text = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&text)?)
    }
}

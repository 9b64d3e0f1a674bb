// src/cli.rs
use std::path::PathBuf;
use std::time::Duration;

use clap::Parser;

use crate::capture::CaptureSettings;
use crate::drivers::{DaqError, VoltageRange};

/// HMP4040 4 channel power supply monitoring. Separate path and file name
/// with a space character.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct MonitorArgs {
    /// Directory where the log file will be saved.
    pub file_path: PathBuf,
    /// Name of the log file (must be a .txt file).
    pub file_name: String,
    /// Plot size, an integer between 1 and 9 (x100 px).
    #[clap(long, alias = "plot_size", default_value = "1")]
    pub plot_size: u32,
    /// Samples shown per channel plot.
    #[clap(long, alias = "max_displayed_samples", default_value = "20")]
    pub max_displayed_samples: usize,
    /// Measurement interval in milliseconds.
    #[clap(long, alias = "update_rate_ms", default_value = "1000")]
    pub update_rate_ms: u64,
    /// Optional JSON config file.
    #[clap(long)]
    pub config: Option<PathBuf>,
    /// VISA resource to use instead of discovering one.
    #[clap(long)]
    pub resource: Option<String>,
    /// Run against a simulated power supply.
    #[clap(long)]
    pub simulate: bool,
}

impl MonitorArgs {
    pub fn validate(&self) -> Result<(), DaqError> {
        ensure(self.file_name.ends_with(".txt"), "The provided file name must be a .txt file")?;
        ensure(
            (1..10).contains(&self.plot_size),
            "Plot size must be between 1 and 9",
        )?;
        ensure(
            self.max_displayed_samples > 0,
            "max_displayed_samples must be greater than 0",
        )?;
        ensure(self.update_rate_ms > 0, "update_rate_ms must be greater than 0")
    }
    pub fn file_address(&self) -> PathBuf {
        self.file_path.join(&self.file_name)
    }
    pub fn update_interval(&self) -> Duration {
        Duration::from_millis(self.update_rate_ms)
    }
}

/// Capture a number of waveforms with a PicoScope whenever the input rises
/// through a threshold, and store them with metadata.
#[derive(Parser, Debug, Clone)]
#[clap(author, version, about, long_about = None)]
pub struct CaptureArgs {
    /// Directory where the waveform file will be saved.
    pub file_path: PathBuf,
    /// Name of the waveform file (must be a .h5 file).
    pub file_name: String,
    /// Threshold in mV that triggers a capture.
    pub voltage_trigger_mv: i32,
    /// Number of waveforms to capture (1-99).
    #[clap(long, alias = "num_waveforms", default_value = "10")]
    pub num_waveforms: usize,
    /// Input range: PS5000_100MV, PS5000_200MV, PS5000_500MV, PS5000_1V,
    /// PS5000_2V, PS5000_5V, PS5000_10V or PS5000_20V.
    #[clap(long, alias = "voltage_range", default_value = "PS5000_200MV")]
    pub voltage_range: String,
    /// Sampling interval code in 10s of ns.
    #[clap(long, alias = "timebase_10ns", default_value = "8")]
    pub timebase_10ns: i64,
    /// Samples kept before the trigger point.
    #[clap(long, alias = "preTriggerSamples", default_value = "200")]
    pub pre_trigger_samples: i64,
    /// Samples kept after the trigger point.
    #[clap(long, alias = "postTriggerSamples", default_value = "800")]
    pub post_trigger_samples: i64,
    /// Measurement type stored in the metadata.
    #[clap(long, alias = "waveform_type", default_value = "generated")]
    pub waveform_type: String,
    /// Author of the measurement stored in the metadata.
    #[clap(long, default_value = "expert_user")]
    pub user: String,
    /// Trigger anyway after this many ms without an event (0 waits forever).
    #[clap(long, default_value = "1000")]
    pub auto_trigger_ms: i16,
    /// Give up if a block is not ready within this many ms.
    #[clap(long, default_value = "10000")]
    pub ready_timeout_ms: u64,
    /// Where to write the grid plot (defaults to the waveform file with .png).
    #[clap(long)]
    pub plot: Option<PathBuf>,
    /// Skip the grid plot.
    #[clap(long)]
    pub no_plot: bool,
    /// Run against a simulated oscilloscope.
    #[clap(long)]
    pub simulate: bool,
}

impl CaptureArgs {
    pub fn validate(&self) -> Result<(), DaqError> {
        ensure(self.file_name.ends_with(".h5"), "The provided file name must be a .h5 file")?;
        ensure(
            self.voltage_trigger_mv > 0,
            "The voltage_trigger must be greater than 0 mV",
        )?;
        ensure(
            (1..100).contains(&self.num_waveforms),
            "num_waveforms must be between 1 and 99",
        )?;
        self.voltage_range.parse::<VoltageRange>()?;
        ensure(
            self.pre_trigger_samples > 0,
            "preTriggerSamples must be greater than 0",
        )?;
        ensure(
            self.post_trigger_samples > 0,
            "postTriggerSamples must be greater than 0",
        )?;
        ensure(
            (0..=u32::MAX as i64).contains(&self.timebase_10ns),
            "timebase must be non-negative",
        )?;
        ensure(self.auto_trigger_ms >= 0, "auto_trigger_ms must not be negative")?;
        ensure(self.ready_timeout_ms > 0, "ready_timeout_ms must be greater than 0")
    }
    pub fn file_address(&self) -> PathBuf {
        self.file_path.join(&self.file_name)
    }
    pub fn plot_path(&self) -> Option<PathBuf> {
        if self.no_plot {
            return None;
        }
        Some(
            self.plot
                .clone()
                .unwrap_or_else(|| self.file_address().with_extension("png")),
        )
    }
    /// Converts validated arguments into capture settings.
    pub fn settings(&self) -> Result<CaptureSettings, DaqError> {
        self.validate()?;
        Ok(CaptureSettings {
            trigger_mv: self.voltage_trigger_mv as f64,
            num_waveforms: self.num_waveforms,
            range: self.voltage_range.parse()?,
            timebase: self.timebase_10ns as u32,
            pre_trigger_samples: self.pre_trigger_samples as usize,
            post_trigger_samples: self.post_trigger_samples as usize,
            auto_trigger_ms: self.auto_trigger_ms,
            ready_timeout: Duration::from_millis(self.ready_timeout_ms),
            waveform_type: self.waveform_type.clone(),
            user: self.user.clone(),
        })
    }
}

fn ensure(condition: bool, message: &str) -> Result<(), DaqError> {
    if condition {
        Ok(())
    } else {
        Err(DaqError::InvalidArgument(message.to_string()))
    }
}

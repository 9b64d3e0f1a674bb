// src/capture.rs
use std::thread;
use std::time::{Duration, Instant};

use chrono::Local;
use log::{debug, info, warn};
use ndarray::Array2;

use crate::drivers::scope::{
    Channel, Coupling, Oscilloscope, SimpleTrigger, ThresholdDirection, VoltageRange,
};
use crate::drivers::DaqError;
use crate::waveform::{WaveformMetadata, WaveformSet};

const READY_POLL_INTERVAL: Duration = Duration::from_millis(1);

/// Everything the triggered block capture needs to know.
#[derive(Clone, Debug)]
pub struct CaptureSettings {
    pub trigger_mv: f64,
    pub num_waveforms: usize,
    pub range: VoltageRange,
    pub timebase: u32,
    pub pre_trigger_samples: usize,
    pub post_trigger_samples: usize,
    pub auto_trigger_ms: i16,
    pub ready_timeout: Duration,
    pub waveform_type: String,
    pub user: String,
}

impl CaptureSettings {
    pub fn total_samples(&self) -> usize {
        self.pre_trigger_samples + self.post_trigger_samples
    }
}

/// Arms the scope `num_waveforms` times and collects each block on channel A
/// in millivolts. The scope is stopped before returning, also on error.
pub fn capture_waveforms<S: Oscilloscope + ?Sized>(
    scope: &mut S,
    settings: &CaptureSettings,
) -> Result<WaveformSet, DaqError> {
    let result = run_capture(scope, settings);
    let stopped = scope.stop();
    let set = result?;
    stopped?;
    Ok(set)
}

fn run_capture<S: Oscilloscope + ?Sized>(
    scope: &mut S,
    settings: &CaptureSettings,
) -> Result<WaveformSet, DaqError> {
    let samples = settings.total_samples();
    scope.set_channel(Channel::A, true, Coupling::Dc, settings.range)?;
    let trigger = SimpleTrigger {
        source: Channel::A,
        threshold_adc: settings.range.mv_to_adc(settings.trigger_mv),
        direction: ThresholdDirection::Rising,
        delay_samples: 0,
        auto_trigger_ms: settings.auto_trigger_ms,
    };
    scope.set_simple_trigger(&trigger)?;
    let timebase = scope.timebase_info(settings.timebase, samples)?;
    if timebase.max_samples < samples {
        return Err(DaqError::InvalidArgument(format!(
            "{samples} samples requested but timebase {} allows {}",
            settings.timebase, timebase.max_samples
        )));
    }
    info!(
        "pre-trigger samples: {}, post-trigger samples: {}, timebase: {} ({} ns)",
        settings.pre_trigger_samples,
        settings.post_trigger_samples,
        settings.timebase,
        timebase.time_interval_ns
    );
    let mut data = Array2::<f32>::zeros((settings.num_waveforms, samples));
    for waveform in 0..settings.num_waveforms {
        scope.run_block(
            settings.pre_trigger_samples,
            settings.post_trigger_samples,
            settings.timebase,
        )?;
        wait_ready(scope, settings.ready_timeout)?;
        let block = scope.get_values(Channel::A, samples)?;
        if block.overflow {
            warn!("waveform {}: input exceeded {}", waveform + 1, settings.range);
        }
        if block.adc.len() < samples {
            warn!(
                "waveform {}: scope returned {} of {} samples",
                waveform + 1,
                block.adc.len(),
                samples
            );
        }
        for (dst, &adc) in data.row_mut(waveform).iter_mut().zip(&block.adc) {
            *dst = settings.range.adc_to_mv(adc) as f32;
        }
        debug!("captured waveform {}/{}", waveform + 1, settings.num_waveforms);
    }
    let metadata = WaveformMetadata {
        date: Local::now().format("%Y-%m-%d").to_string(),
        user: settings.user.clone(),
        waveform_type: settings.waveform_type.clone(),
        timebase: settings.timebase,
        num_waveforms: settings.num_waveforms,
        time_interval_ns: timebase.time_interval_ns,
        voltage_range: settings.range.name().to_string(),
        trigger_mv: settings.trigger_mv,
        pre_trigger_samples: settings.pre_trigger_samples,
    };
    WaveformSet::new(data, metadata)
}

fn wait_ready<S: Oscilloscope + ?Sized>(scope: &mut S, timeout: Duration) -> Result<(), DaqError> {
    let started = Instant::now();
    while !scope.is_ready()? {
        if started.elapsed() >= timeout {
            return Err(DaqError::Timeout(timeout));
        }
        thread::sleep(READY_POLL_INTERVAL);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::scope::SimulatedScope;

    fn settings(n: usize) -> CaptureSettings {
        CaptureSettings {
            trigger_mv: 50.0,
            num_waveforms: n,
            range: VoltageRange::Mv200,
            timebase: 8,
            pre_trigger_samples: 20,
            post_trigger_samples: 80,
            auto_trigger_ms: 1000,
            ready_timeout: Duration::from_secs(2),
            waveform_type: "generated".into(),
            user: "expert_user".into(),
        }
    }

    #[test]
    fn captures_requested_number_of_blocks() {
        let mut scope = SimulatedScope::new().with_noise(0);
        let set = capture_waveforms(&mut scope, &settings(4)).unwrap();
        assert_eq!(scope.blocks_captured(), 4);
        assert_eq!(scope.stops(), 1);
        assert_eq!(set.data().dim(), (4, 100));
        let meta = set.metadata();
        assert_eq!(meta.num_waveforms, 4);
        assert_eq!(meta.timebase, 8);
        assert_eq!(meta.time_interval_ns, 80.0);
        assert_eq!(meta.voltage_range, "PS5000_200MV");
        // Threshold 50 mV -> pulse peak at twice the trigger level.
        let row = set.data().row(0);
        assert_eq!(row[0], 0.0);
        assert!(row[20] > 99.0 && row[20] < 101.0);
        assert!(set.data().iter().all(|v| v.abs() <= 200.0));
    }
    #[test]
    fn never_ready_scope_times_out() {
        let mut scope = SimulatedScope::new().with_polls_until_ready(u32::MAX);
        let mut s = settings(1);
        s.ready_timeout = Duration::from_millis(20);
        let err = capture_waveforms(&mut scope, &s).unwrap_err();
        assert!(matches!(err, DaqError::Timeout(_)));
        assert_eq!(scope.blocks_captured(), 0);
        assert_eq!(scope.stops(), 1);
    }
}

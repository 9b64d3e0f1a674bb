use std::fmt;
use std::str::FromStr;

use rand::Rng;

use crate::drivers::DaqError;

/// Full-scale ADC count of the 5000-series in 8-bit block mode.
pub const MAX_ADC: i16 = 32512;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Channel {
    A,
    B,
}
impl Channel {
    pub fn sdk_code(self) -> i32 {
        match self {
            Channel::A => 0,
            Channel::B => 1,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Coupling {
    Ac,
    Dc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ThresholdDirection {
    Above,
    Below,
    Rising,
    Falling,
}
impl ThresholdDirection {
    pub fn sdk_code(self) -> i32 {
        match self {
            ThresholdDirection::Above => 0,
            ThresholdDirection::Below => 1,
            ThresholdDirection::Rising => 2,
            ThresholdDirection::Falling => 3,
        }
    }
}

/// Input ranges accepted on the command line.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VoltageRange {
    Mv100,
    Mv200,
    Mv500,
    V1,
    V2,
    V5,
    V10,
    V20,
}

impl VoltageRange {
    pub const ALL: [VoltageRange; 8] = [
        VoltageRange::Mv100,
        VoltageRange::Mv200,
        VoltageRange::Mv500,
        VoltageRange::V1,
        VoltageRange::V2,
        VoltageRange::V5,
        VoltageRange::V10,
        VoltageRange::V20,
    ];
    pub fn name(self) -> &'static str {
        match self {
            VoltageRange::Mv100 => "PS5000_100MV",
            VoltageRange::Mv200 => "PS5000_200MV",
            VoltageRange::Mv500 => "PS5000_500MV",
            VoltageRange::V1 => "PS5000_1V",
            VoltageRange::V2 => "PS5000_2V",
            VoltageRange::V5 => "PS5000_5V",
            VoltageRange::V10 => "PS5000_10V",
            VoltageRange::V20 => "PS5000_20V",
        }
    }
    /// Value of the `PS5000_RANGE` enum.
    pub fn sdk_code(self) -> i32 {
        match self {
            VoltageRange::Mv100 => 3,
            VoltageRange::Mv200 => 4,
            VoltageRange::Mv500 => 5,
            VoltageRange::V1 => 6,
            VoltageRange::V2 => 7,
            VoltageRange::V5 => 8,
            VoltageRange::V10 => 9,
            VoltageRange::V20 => 10,
        }
    }
    pub fn full_scale_mv(self) -> f64 {
        match self {
            VoltageRange::Mv100 => 100.0,
            VoltageRange::Mv200 => 200.0,
            VoltageRange::Mv500 => 500.0,
            VoltageRange::V1 => 1_000.0,
            VoltageRange::V2 => 2_000.0,
            VoltageRange::V5 => 5_000.0,
            VoltageRange::V10 => 10_000.0,
            VoltageRange::V20 => 20_000.0,
        }
    }
    pub fn adc_to_mv(self, adc: i16) -> f64 {
        adc as f64 * self.full_scale_mv() / MAX_ADC as f64
    }
    /// Truncates toward zero and saturates at the ADC limits.
    pub fn mv_to_adc(self, mv: f64) -> i16 {
        let counts = (mv * MAX_ADC as f64 / self.full_scale_mv()).trunc();
        counts.clamp(-(MAX_ADC as f64), MAX_ADC as f64) as i16
    }
}

impl fmt::Display for VoltageRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for VoltageRange {
    type Err = DaqError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        VoltageRange::ALL
            .into_iter()
            .find(|r| r.name() == s)
            .ok_or_else(|| {
                DaqError::InvalidArgument("voltage_range must be valid, try -h for help".into())
            })
    }
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimpleTrigger {
    pub source: Channel,
    pub threshold_adc: i16,
    pub direction: ThresholdDirection,
    pub delay_samples: u32,
    /// Fires anyway after this long without a trigger event; 0 waits forever.
    pub auto_trigger_ms: i16,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TimebaseInfo {
    pub time_interval_ns: f64,
    pub max_samples: usize,
}

#[derive(Clone, Debug, PartialEq)]
pub struct BlockData {
    pub adc: Vec<i16>,
    pub overflow: bool,
}

/// The block-mode calls the capture sequence needs from an oscilloscope.
pub trait Oscilloscope {
    fn set_channel(
        &mut self,
        channel: Channel,
        enabled: bool,
        coupling: Coupling,
        range: VoltageRange,
    ) -> Result<(), DaqError>;
    fn set_simple_trigger(&mut self, trigger: &SimpleTrigger) -> Result<(), DaqError>;
    fn timebase_info(&mut self, timebase: u32, samples: usize) -> Result<TimebaseInfo, DaqError>;
    fn run_block(&mut self, pre_trigger: usize, post_trigger: usize, timebase: u32) -> Result<(), DaqError>;
    fn is_ready(&mut self) -> Result<bool, DaqError>;
    fn get_values(&mut self, channel: Channel, samples: usize) -> Result<BlockData, DaqError>;
    fn stop(&mut self) -> Result<(), DaqError>;
}

/// Scope stand-in producing exponentially decaying pulses that cross the
/// trigger level right after the pre-trigger window.
pub struct SimulatedScope {
    range: VoltageRange,
    threshold_adc: i16,
    pre_trigger: usize,
    post_trigger: usize,
    polls_until_ready: u32,
    polls: u32,
    armed: bool,
    noise_counts: i16,
    blocks: usize,
    stops: usize,
}

impl Default for SimulatedScope {
    fn default() -> Self {
        Self {
            range: VoltageRange::Mv200,
            threshold_adc: 0,
            pre_trigger: 0,
            post_trigger: 0,
            polls_until_ready: 3,
            polls: 0,
            armed: false,
            noise_counts: 200,
            blocks: 0,
            stops: 0,
        }
    }
}

impl SimulatedScope {
    pub fn new() -> Self {
        Self::default()
    }
    /// Number of `is_ready` polls before a block completes; `u32::MAX`
    /// emulates a scope that never triggers.
    pub fn with_polls_until_ready(mut self, polls: u32) -> Self {
        self.polls_until_ready = polls;
        self
    }
    pub fn with_noise(mut self, counts: i16) -> Self {
        self.noise_counts = counts.max(0);
        self
    }
    pub fn blocks_captured(&self) -> usize {
        self.blocks
    }
    /// How many times `stop` was called.
    pub fn stops(&self) -> usize {
        self.stops
    }
    fn pulse(&self, total: usize) -> Vec<i16> {
        let mut rng = rand::thread_rng();
        let peak = (self.threshold_adc as f64 * 2.0).clamp(1000.0, MAX_ADC as f64 * 0.9);
        let tau = (self.post_trigger.max(1) as f64) / 5.0;
        (0..total)
            .map(|i| {
                let clean = if i < self.pre_trigger {
                    0.0
                } else {
                    peak * (-((i - self.pre_trigger) as f64) / tau).exp()
                };
                let noise = if self.noise_counts > 0 {
                    rng.gen_range(-self.noise_counts..=self.noise_counts) as f64
                } else {
                    0.0
                };
                (clean + noise).clamp(-(MAX_ADC as f64), MAX_ADC as f64) as i16
            })
            .collect()
    }
}

impl Oscilloscope for SimulatedScope {
    fn set_channel(
        &mut self,
        _channel: Channel,
        _enabled: bool,
        _coupling: Coupling,
        range: VoltageRange,
    ) -> Result<(), DaqError> {
        self.range = range;
        Ok(())
    }
    fn set_simple_trigger(&mut self, trigger: &SimpleTrigger) -> Result<(), DaqError> {
        self.threshold_adc = trigger.threshold_adc;
        Ok(())
    }
    fn timebase_info(&mut self, timebase: u32, samples: usize) -> Result<TimebaseInfo, DaqError> {
        Ok(TimebaseInfo {
            time_interval_ns: (timebase.max(1) as f64) * 10.0,
            max_samples: samples.max(1 << 20),
        })
    }
    fn run_block(&mut self, pre_trigger: usize, post_trigger: usize, _timebase: u32) -> Result<(), DaqError> {
        self.pre_trigger = pre_trigger;
        self.post_trigger = post_trigger;
        self.polls = 0;
        self.armed = true;
        Ok(())
    }
    fn is_ready(&mut self) -> Result<bool, DaqError> {
        if !self.armed {
            return Ok(false);
        }
        self.polls = self.polls.saturating_add(1);
        Ok(self.polls > self.polls_until_ready)
    }
    fn get_values(&mut self, _channel: Channel, samples: usize) -> Result<BlockData, DaqError> {
        self.armed = false;
        self.blocks += 1;
        Ok(BlockData {
            adc: self.pulse(samples),
            overflow: false,
        })
    }
    fn stop(&mut self) -> Result<(), DaqError> {
        self.armed = false;
        self.stops += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn adc_conversion_matches_range_scale() {
        let r = VoltageRange::Mv200;
        assert_eq!(r.adc_to_mv(MAX_ADC), 200.0);
        assert_eq!(r.adc_to_mv(0), 0.0);
        assert_eq!(r.mv_to_adc(100.0), 16256);
        assert_eq!(r.mv_to_adc(-100.0), -16256);
        // Values beyond full scale saturate instead of wrapping.
        assert_eq!(r.mv_to_adc(1_000.0), MAX_ADC);
        assert_eq!(VoltageRange::V1.mv_to_adc(10.0), 325);
    }
    #[test]
    fn range_names_parse() {
        for r in VoltageRange::ALL {
            assert_eq!(r.name().parse::<VoltageRange>().unwrap(), r);
        }
        assert_eq!(VoltageRange::V20.sdk_code(), 10);
        assert!("PS5000_50V".parse::<VoltageRange>().is_err());
        assert!("ps5000_200mv".parse::<VoltageRange>().is_err());
    }
    #[test]
    fn simulated_scope_needs_polls_before_ready() {
        let mut scope = SimulatedScope::new().with_polls_until_ready(2).with_noise(0);
        assert!(!scope.is_ready().unwrap());
        scope.run_block(10, 40, 8).unwrap();
        assert!(!scope.is_ready().unwrap());
        assert!(!scope.is_ready().unwrap());
        assert!(scope.is_ready().unwrap());
        let block = scope.get_values(Channel::A, 50).unwrap();
        assert_eq!(block.adc.len(), 50);
        assert!(block.adc[..10].iter().all(|&v| v == 0));
        assert!(block.adc[10] >= 1000);
        assert_eq!(scope.blocks_captured(), 1);
    }
}

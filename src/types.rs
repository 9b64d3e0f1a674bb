// src/types.rs

/// Number of output channels on the HMP4040.
pub const CHANNEL_COUNT: usize = 4;

// connection mode
#[derive(PartialEq, Eq, Clone, Copy, Debug)]
pub enum ConnectionMode {
    Simulation,
    Hardware,
}

// commands sent from the GUI to the engine
#[derive(Clone, Debug)]
pub enum GuiCommand {
    Connect,
    Disconnect,
    Beep,
    Shutdown,
}

// messages sent from the engine to the GUI
#[derive(Clone, Debug)]
pub enum MonitorMessage {
    Log(String),
    Status(bool),              // connected
    Sample(MeasurementSample), // one full sweep over all channels
    Fatal(String),             // engine stopped
}

/// Voltage (V) and current (mA) of a single output channel.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct ChannelReading {
    pub voltage_v: f64,
    pub current_ma: f64,
}

impl ChannelReading {
    /// Applies the display rounding: volts to 3 decimals, amps to 6 decimals
    /// before scaling to milliamps.
    pub fn from_raw(voltage_v: f64, current_a: f64) -> Self {
        Self {
            voltage_v: round_to(voltage_v, 3),
            current_ma: round_to(current_a, 6) * 1000.0,
        }
    }
}

/// One timestamped sweep over all four channels.
#[derive(Clone, Debug, PartialEq)]
pub struct MeasurementSample {
    pub timestamp: String,
    pub channels: [ChannelReading; CHANNEL_COUNT],
}

impl MeasurementSample {
    pub fn currents_ma(&self) -> [f64; CHANNEL_COUNT] {
        self.channels.map(|c| c.current_ma)
    }
}

pub fn round_to(value: f64, decimals: i32) -> f64 {
    let scale = 10f64.powi(decimals);
    (value * scale).round() / scale
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn raw_reading_is_rounded_and_scaled() {
        let r = ChannelReading::from_raw(1.849_6, 0.500_000_4);
        assert_eq!(r.voltage_v, 1.85);
        assert!((r.current_ma - 500.0).abs() < 1e-9);
    }
}

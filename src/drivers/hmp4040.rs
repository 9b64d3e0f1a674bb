use chrono::Local;
use log::debug;

use crate::drivers::{DaqError, Transport};
use crate::types::{ChannelReading, MeasurementSample, CHANNEL_COUNT};

/// Rohde & Schwarz HMP4040 four-channel power supply driven over SCPI.
pub struct Hmp4040 {
    transport: Box<dyn Transport>,
    selected: Option<u8>,
}

impl Hmp4040 {
    pub fn new(transport: Box<dyn Transport>) -> Self {
        Self {
            transport,
            selected: None,
        }
    }
    pub fn resource(&self) -> &str {
        self.transport.resource()
    }
    pub fn identify(&mut self) -> Result<String, DaqError> {
        self.transport.query("*IDN?").map(|s| s.trim().to_string())
    }
    pub fn beep(&mut self) -> Result<(), DaqError> {
        self.transport.write_line("SYST:BEEP")
    }
    pub fn selected_channel(&self) -> Option<u8> {
        self.selected
    }
    pub fn select_channel(&mut self, channel: u8) -> Result<(), DaqError> {
        if !(1..=CHANNEL_COUNT as u8).contains(&channel) {
            return Err(DaqError::InvalidArgument(format!(
                "channel must be between 1 and {CHANNEL_COUNT}, got {channel}"
            )));
        }
        self.transport.write_line(&format!("INST:NSEL {channel}"))?;
        self.selected = Some(channel);
        Ok(())
    }
    /// Voltage of the selected channel in volts.
    pub fn measured_voltage(&mut self) -> Result<f64, DaqError> {
        self.query_f64("MEAS:VOLT?")
    }
    /// Current of the selected channel in amps.
    pub fn measured_current(&mut self) -> Result<f64, DaqError> {
        self.query_f64("MEAS:CURR?")
    }
    /// Selects every channel in turn and reads voltage and current.
    pub fn measure_all(&mut self) -> Result<MeasurementSample, DaqError> {
        let timestamp = Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
        let mut channels = [ChannelReading::default(); CHANNEL_COUNT];
        for (i, reading) in channels.iter_mut().enumerate() {
            self.select_channel(i as u8 + 1)?;
            let voltage = self.measured_voltage()?;
            let current = self.measured_current()?;
            *reading = ChannelReading::from_raw(voltage, current);
        }
        debug!("{}: {:?}", self.resource(), channels);
        Ok(MeasurementSample {
            timestamp,
            channels,
        })
    }
    fn query_f64(&mut self, command: &str) -> Result<f64, DaqError> {
        let response = self.transport.query(command)?;
        response.trim().parse().map_err(|_| DaqError::Protocol {
            command: command.to_string(),
            response,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::visa::{Resource, SimulatedSupply};

    struct Garbled;
    impl Transport for Garbled {
        fn resource(&self) -> &str {
            "garbled"
        }
        fn write_line(&mut self, _command: &str) -> Result<(), DaqError> {
            Ok(())
        }
        fn read_line(&mut self) -> Result<String, DaqError> {
            Ok("not a number".into())
        }
    }

    fn sim_supply() -> Hmp4040 {
        Hmp4040::new(Box::new(SimulatedSupply::new(&Resource::Simulated { index: 0 })))
    }

    #[test]
    fn measure_all_reads_every_channel() {
        let mut psu = sim_supply();
        let sample = psu.measure_all().unwrap();
        assert_eq!(psu.selected_channel(), Some(4));
        let volts: Vec<f64> = sample.channels.iter().map(|c| c.voltage_v).collect();
        assert_eq!(volts, vec![1.85, 1.25, 3.33, 1.95]);
        let currents = sample.currents_ma();
        assert!((currents[0] - 500.0).abs() < 1e-9);
        assert!((currents[2] - 140.0).abs() < 1e-9);
        assert_eq!(sample.timestamp.len(), "2024-01-01 00:00:00".len());
    }
    #[test]
    fn rejects_channel_out_of_range() {
        let mut psu = sim_supply();
        assert!(psu.select_channel(0).is_err());
        assert!(psu.select_channel(5).is_err());
        assert_eq!(psu.selected_channel(), None);
    }
    #[test]
    fn malformed_reading_is_protocol_error() {
        let mut psu = Hmp4040::new(Box::new(Garbled));
        match psu.measured_voltage() {
            Err(DaqError::Protocol { command, .. }) => assert_eq!(command, "MEAS:VOLT?"),
            other => panic!("unexpected {other:?}"),
        }
    }
}

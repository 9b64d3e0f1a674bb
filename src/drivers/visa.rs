//! VISA resource addressing and the line transports behind it.
//!
//! Hardware resources (USB-TMC, LAN, GPIB, serial) go through the installed
//! VISA library via `visa-rs`. `SIMn::INSTR` resources are in-process
//! simulated HMP4040 supplies for dry runs and tests.
use std::fmt;
use std::io::ErrorKind;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use log::{debug, info, warn};
use rand::Rng;

use crate::config::MonitorConfig;
use crate::drivers::DaqError;
use crate::types::{ConnectionMode, CHANNEL_COUNT};

/// Interface prefixes the VISA library understands.
const VISA_INTERFACES: [&str; 6] = ["ASRL", "GPIB", "PXI", "TCPIP", "USB", "VXI"];

/// Search expression for every instrument the VISA library can see.
pub const FIND_ALL_INSTRUMENTS: &str = "?*INSTR";

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Resource {
    /// Handed to the VISA library verbatim.
    Visa(String),
    Simulated { index: u32 },
}

impl Resource {
    pub fn parse(resource: &str) -> Result<Self, DaqError> {
        let invalid = || DaqError::InvalidResource(resource.to_string());
        let resource = resource.trim();
        let parts: Vec<&str> = resource.split("::").collect();
        if parts.len() < 2 || parts.iter().any(|p| p.is_empty()) {
            return Err(invalid());
        }
        let head = parts[0].to_ascii_uppercase();
        if let Some(index) = head.strip_prefix("SIM") {
            if parts.len() != 2 || !parts[1].eq_ignore_ascii_case("INSTR") {
                return Err(invalid());
            }
            let index = if index.is_empty() { Ok(0) } else { index.parse() };
            return index.map(|index| Resource::Simulated { index }).map_err(|_| invalid());
        }
        let interface = VISA_INTERFACES.iter().find(|i| head.starts_with(**i));
        match interface {
            Some(i) if head.len() == i.len() || head[i.len()..].chars().all(|c| c.is_ascii_digit()) => {
                Ok(Resource::Visa(resource.to_string()))
            }
            // ASRL takes the port name directly (ASRL/dev/ttyUSB0::INSTR).
            Some(&"ASRL") => Ok(Resource::Visa(resource.to_string())),
            _ => Err(invalid()),
        }
    }
}

impl fmt::Display for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Resource::Visa(name) => f.write_str(name),
            Resource::Simulated { index } => write!(f, "SIM{index}::INSTR"),
        }
    }
}

/// Line-oriented SCPI transport.
pub trait Transport: Send {
    fn resource(&self) -> &str;
    fn write_line(&mut self, command: &str) -> Result<(), DaqError>;
    fn read_line(&mut self) -> Result<String, DaqError>;
    fn query(&mut self, command: &str) -> Result<String, DaqError> {
        self.write_line(command)?;
        self.read_line()
    }
}

#[cfg(feature = "visa")]
mod session {
    use std::ffi::CString;
    use std::io::{BufRead, BufReader, ErrorKind, Write};
    use std::time::Duration;

    use log::debug;
    use visa_rs::{flags::AccessMode, AsResourceManager, DefaultRM, Instrument};

    use super::Transport;
    use crate::drivers::DaqError;

    fn visa_name(text: &str) -> Result<CString, DaqError> {
        CString::new(text).map_err(|_| DaqError::InvalidResource(text.to_string()))
    }

    /// Every resource name matching `expr`.
    pub fn find_resources(expr: &str) -> Result<Vec<String>, DaqError> {
        let rm = DefaultRM::new()?;
        let mut list = rm.find_res_list(&visa_name(expr)?.into())?;
        let mut names = Vec::new();
        while let Some(name) = list.find_next()? {
            names.push(name.to_string());
        }
        Ok(names)
    }

    /// An open VISA session. Each session owns its resource manager so the
    /// instrument stays open for as long as the transport lives.
    pub struct VisaTransport {
        resource: String,
        instr: Instrument,
        _rm: DefaultRM,
    }

    impl VisaTransport {
        pub fn open(resource: &str, timeout: Duration) -> Result<Self, DaqError> {
            let rm = DefaultRM::new()?;
            let instr = rm.open(&visa_name(resource)?.into(), AccessMode::NO_LOCK, timeout)?;
            Ok(Self {
                resource: resource.to_string(),
                instr,
                _rm: rm,
            })
        }
    }

    impl Transport for VisaTransport {
        fn resource(&self) -> &str {
            &self.resource
        }
        fn write_line(&mut self, command: &str) -> Result<(), DaqError> {
            debug!("{} <- {}", self.resource, command);
            let mut instr = &self.instr;
            instr.write_all(command.as_bytes())?;
            instr.write_all(b"\n")?;
            Ok(())
        }
        fn read_line(&mut self) -> Result<String, DaqError> {
            let mut line = String::new();
            let n = BufReader::new(&self.instr).read_line(&mut line)?;
            if n == 0 {
                return Err(DaqError::Io(std::io::Error::new(
                    ErrorKind::UnexpectedEof,
                    "instrument returned no data",
                )));
            }
            let line = line.trim_end_matches(['\r', '\n']).to_string();
            debug!("{} -> {}", self.resource, line);
            Ok(line)
        }
    }
}

#[cfg(feature = "visa")]
pub use session::{find_resources, VisaTransport};

#[derive(Debug)]
struct SupplyState {
    identity: String,
    selected: usize,
    voltages_v: [f64; CHANNEL_COUNT],
    currents_a: [f64; CHANNEL_COUNT],
    noise_a: f64,
    pending: Option<String>,
    beeps: usize,
}

/// In-process stand-in for an HMP4040 that understands the SCPI subset the
/// monitor uses. Clones share the same instrument state, so a handle kept
/// by the caller sees what sessions opened later did to it.
#[derive(Clone, Debug)]
pub struct SimulatedSupply {
    resource: String,
    state: Arc<Mutex<SupplyState>>,
}

impl SimulatedSupply {
    pub fn new(resource: &Resource) -> Self {
        Self {
            resource: resource.to_string(),
            state: Arc::new(Mutex::new(SupplyState {
                identity: "ROHDE&SCHWARZ,HMP4040,000000,HW50020001/SW2.51".to_string(),
                selected: 1,
                voltages_v: [1.85, 1.25, 3.33, 1.95],
                currents_a: [0.5, 0.15, 0.14, 0.5],
                noise_a: 0.0,
                pending: None,
                beeps: 0,
            })),
        }
    }
    /// Adds uniform noise of +/- `amps` to every current reading.
    pub fn with_noise(self, amps: f64) -> Self {
        self.state().noise_a = amps.abs();
        self
    }
    pub fn with_outputs(self, voltages_v: [f64; CHANNEL_COUNT], currents_a: [f64; CHANNEL_COUNT]) -> Self {
        {
            let mut state = self.state();
            state.voltages_v = voltages_v;
            state.currents_a = currents_a;
        }
        self
    }
    /// Answer to `*IDN?`, for posing as another instrument.
    pub fn with_identity(self, identity: &str) -> Self {
        self.state().identity = identity.to_string();
        self
    }
    pub fn beeps(&self) -> usize {
        self.state().beeps
    }
    fn state(&self) -> MutexGuard<'_, SupplyState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
    fn respond(&mut self, command: &str) {
        let upper = command.trim().to_ascii_uppercase();
        let mut state = self.state();
        let idx = state.selected - 1;
        match upper.as_str() {
            "*IDN?" => state.pending = Some(state.identity.clone()),
            "INST:NSEL?" => state.pending = Some(state.selected.to_string()),
            "MEAS:VOLT?" => state.pending = Some(format!("{:.4}", state.voltages_v[idx])),
            "MEAS:CURR?" => {
                let noise = if state.noise_a > 0.0 {
                    rand::thread_rng().gen_range(-state.noise_a..state.noise_a)
                } else {
                    0.0
                };
                state.pending = Some(format!("{:.4}", (state.currents_a[idx] + noise).max(0.0)));
            }
            "SYST:BEEP" => state.beeps += 1,
            _ => {
                let channel = upper
                    .strip_prefix("INST:NSEL ")
                    .and_then(|n| n.trim().parse::<usize>().ok())
                    .filter(|n| (1..=CHANNEL_COUNT).contains(n));
                match channel {
                    Some(n) => state.selected = n,
                    None => warn!("{}: ignoring unknown command '{}'", self.resource, command),
                }
            }
        }
    }
}

impl Transport for SimulatedSupply {
    fn resource(&self) -> &str {
        &self.resource
    }
    fn write_line(&mut self, command: &str) -> Result<(), DaqError> {
        self.respond(command);
        Ok(())
    }
    fn read_line(&mut self) -> Result<String, DaqError> {
        self.state().pending.take().ok_or_else(|| {
            DaqError::Io(std::io::Error::new(ErrorKind::TimedOut, "no response pending"))
        })
    }
}

/// Lists and opens instrument resources.
pub struct ResourceManager {
    mode: ConnectionMode,
    extra_resources: Vec<String>,
    timeout: Duration,
    simulated: Vec<SimulatedSupply>,
}

impl ResourceManager {
    pub fn new(mode: ConnectionMode, config: &MonitorConfig) -> Self {
        let simulated = match mode {
            ConnectionMode::Simulation => {
                vec![SimulatedSupply::new(&Resource::Simulated { index: 0 }).with_noise(0.002)]
            }
            ConnectionMode::Hardware => Vec::new(),
        };
        Self {
            mode,
            extra_resources: config.extra_resources.clone(),
            timeout: Duration::from_millis(config.io_timeout_ms),
            simulated,
        }
    }
    /// A simulation-mode manager serving exactly `supplies`.
    pub fn with_simulated(supplies: Vec<SimulatedSupply>) -> Self {
        Self {
            mode: ConnectionMode::Simulation,
            extra_resources: Vec::new(),
            timeout: Duration::from_millis(100),
            simulated: supplies,
        }
    }
    pub fn mode(&self) -> ConnectionMode {
        self.mode
    }
    pub fn list_resources(&self) -> Vec<String> {
        let mut resources: Vec<String> = match self.mode {
            ConnectionMode::Simulation => self.simulated.iter().map(|s| s.resource.clone()).collect(),
            ConnectionMode::Hardware => self.visa_resources(),
        };
        for extra in &self.extra_resources {
            if !resources.contains(extra) {
                resources.push(extra.clone());
            }
        }
        resources
    }
    #[cfg(feature = "visa")]
    fn visa_resources(&self) -> Vec<String> {
        match find_resources(FIND_ALL_INSTRUMENTS) {
            Ok(found) => {
                info!("VISA reports {} resource(s)", found.len());
                found
            }
            Err(e) => {
                warn!("VISA resource search failed: {e}");
                Vec::new()
            }
        }
    }
    #[cfg(not(feature = "visa"))]
    fn visa_resources(&self) -> Vec<String> {
        warn!("built without VISA support; only configured resources are listed");
        Vec::new()
    }
    pub fn open(&self, resource: &str) -> Result<Box<dyn Transport>, DaqError> {
        match Resource::parse(resource)? {
            Resource::Simulated { .. } => {
                let supply = self
                    .simulated
                    .iter()
                    .find(|s| s.resource == resource.trim())
                    .cloned()
                    .ok_or_else(|| DaqError::NoDevice(resource.to_string()))?;
                Ok(Box::new(supply))
            }
            Resource::Visa(name) => self.open_visa(&name),
        }
    }
    #[cfg(feature = "visa")]
    fn open_visa(&self, name: &str) -> Result<Box<dyn Transport>, DaqError> {
        debug!("opening {name}");
        Ok(Box::new(VisaTransport::open(name, self.timeout)?))
    }
    #[cfg(not(feature = "visa"))]
    fn open_visa(&self, name: &str) -> Result<Box<dyn Transport>, DaqError> {
        Err(DaqError::InvalidArgument(format!(
            "cannot open {name}: built without the `visa` feature (use --simulate)"
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn accepts_standard_visa_resources() {
        for name in [
            "USB0::0x0AAD::0x0117::103781::INSTR",
            "TCPIP0::192.168.0.20::inst0::INSTR",
            "TCPIP0::192.168.0.20::5025::SOCKET",
            "TCPIP::hmp4040.lab::INSTR",
            "GPIB0::10::INSTR",
            "ASRL3::INSTR",
            "ASRL/dev/ttyUSB0::INSTR",
        ] {
            assert_eq!(Resource::parse(name).unwrap(), Resource::Visa(name.to_string()));
        }
        assert_eq!(
            Resource::parse("SIM1::INSTR").unwrap(),
            Resource::Simulated { index: 1 }
        );
    }
    #[test]
    fn rejects_malformed_resources() {
        for bad in ["", "INSTR", "FOO0::1::INSTR", "USBX::1::INSTR", "GPIB0::::INSTR", "SIMx::INSTR"] {
            assert!(
                matches!(Resource::parse(bad), Err(DaqError::InvalidResource(_))),
                "{bad}"
            );
        }
    }
    #[test]
    fn display_round_trips() {
        let r = Resource::Simulated { index: 2 };
        assert_eq!(Resource::parse(&r.to_string()).unwrap(), r);
        let v = Resource::parse(" GPIB0::10::INSTR ").unwrap();
        assert_eq!(v.to_string(), "GPIB0::10::INSTR");
    }
    #[test]
    fn simulated_supply_answers_measurements() {
        let mut sim = SimulatedSupply::new(&Resource::Simulated { index: 0 });
        assert!(sim.query("*IDN?").unwrap().contains("HMP4040"));
        sim.write_line("INST:NSEL 3").unwrap();
        assert_eq!(sim.query("INST:NSEL?").unwrap(), "3");
        assert_eq!(sim.query("MEAS:VOLT?").unwrap(), "3.3300");
        assert_eq!(sim.query("MEAS:CURR?").unwrap(), "0.1400");
        sim.write_line("SYST:BEEP").unwrap();
        assert_eq!(sim.beeps(), 1);
        assert!(sim.read_line().is_err());
    }
    #[test]
    fn clones_share_instrument_state() {
        let handle = SimulatedSupply::new(&Resource::Simulated { index: 0 });
        let mut session = handle.clone();
        session.write_line("SYST:BEEP").unwrap();
        session.write_line("SYST:BEEP").unwrap();
        assert_eq!(handle.beeps(), 2);
    }
    #[test]
    fn simulation_manager_lists_one_resource() {
        let rm = ResourceManager::new(ConnectionMode::Simulation, &MonitorConfig::default());
        let resources = rm.list_resources();
        assert_eq!(resources, vec!["SIM0::INSTR".to_string()]);
        let mut t = rm.open(&resources[0]).unwrap();
        assert_eq!(t.resource(), "SIM0::INSTR");
        assert!(t.query("*IDN?").unwrap().starts_with("ROHDE&SCHWARZ"));
        assert!(matches!(rm.open("SIM7::INSTR"), Err(DaqError::NoDevice(_))));
    }
    #[test]
    fn configured_resources_are_appended_once() {
        let config = MonitorConfig {
            extra_resources: vec!["TCPIP0::10.0.0.5::inst0::INSTR".into(), "SIM0::INSTR".into()],
            ..MonitorConfig::default()
        };
        let rm = ResourceManager::new(ConnectionMode::Simulation, &config);
        assert_eq!(
            rm.list_resources(),
            vec!["SIM0::INSTR".to_string(), "TCPIP0::10.0.0.5::inst0::INSTR".to_string()]
        );
    }
}

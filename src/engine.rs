// src/engine.rs
use std::path::PathBuf;
use std::sync::mpsc::{Receiver, Sender, TryRecvError};
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use log::{error, info, warn};

use crate::drivers::{DaqError, Hmp4040};
use crate::recorder::MeasurementLog;
use crate::types::*;

/// Opens a fresh session to the chosen power supply.
pub type Connector = Box<dyn FnMut() -> Result<Hmp4040, DaqError> + Send>;

#[derive(Clone, Debug)]
pub struct EngineSettings {
    pub update_interval: Duration,
    pub log_path: PathBuf,
    pub expected_note: String,
}

/// Starts the acquisition thread. It measures every `update_interval` while
/// connected and exits on `Shutdown` or when the GUI side hangs up.
pub fn spawn_thread(
    tx: Sender<MonitorMessage>,
    rx_cmd: Receiver<GuiCommand>,
    mut connector: Connector,
    settings: EngineSettings,
) -> JoinHandle<()> {
    thread::spawn(move || {
        let mut log = match MeasurementLog::open(&settings.log_path, &settings.expected_note) {
            Ok(log) => log,
            Err(e) => {
                error!("cannot open {}: {e}", settings.log_path.display());
                tx.send(MonitorMessage::Fatal(format!("log file: {e}"))).ok();
                return;
            }
        };
        tx.send(MonitorMessage::Log(format!("Logging to {}", log.path().display()))).ok();

        let mut session: Option<Hmp4040> = None;
        let mut next_due = Instant::now();
        let idle = settings.update_interval.min(Duration::from_millis(10));

        loop {
            // 1. commands from the GUI
            for _ in 0..10 {
                let cmd = match rx_cmd.try_recv() {
                    Ok(cmd) => cmd,
                    Err(TryRecvError::Empty) => break,
                    Err(TryRecvError::Disconnected) => return,
                };
                match cmd {
                    GuiCommand::Connect => {
                        session = None;
                        match connector() {
                            Ok(psu) => {
                                let msg = format!("Connected to {}", psu.resource());
                                info!("{msg}");
                                tx.send(MonitorMessage::Log(msg)).ok();
                                tx.send(MonitorMessage::Status(true)).ok();
                                session = Some(psu);
                                next_due = Instant::now();
                            }
                            Err(e) => {
                                warn!("connect failed: {e}");
                                tx.send(MonitorMessage::Log(format!("Connect failed: {e}"))).ok();
                                tx.send(MonitorMessage::Status(false)).ok();
                            }
                        }
                    }
                    GuiCommand::Disconnect => {
                        session = None;
                        tx.send(MonitorMessage::Status(false)).ok();
                    }
                    GuiCommand::Beep => match session.as_mut() {
                        Some(psu) => {
                            if let Err(e) = psu.beep() {
                                tx.send(MonitorMessage::Log(format!("Beep failed: {e}"))).ok();
                            }
                        }
                        None => {
                            tx.send(MonitorMessage::Log("Not connected".to_owned())).ok();
                        }
                    },
                    GuiCommand::Shutdown => return,
                }
            }

            // 2. periodic measurement
            let Some(psu) = session.as_mut() else {
                thread::sleep(Duration::from_millis(50));
                continue;
            };
            let now = Instant::now();
            if now < next_due {
                thread::sleep(idle.min(next_due - now));
                continue;
            }
            next_due += settings.update_interval;
            if next_due < now {
                next_due = now + settings.update_interval;
            }
            match psu.measure_all() {
                Ok(sample) => {
                    if let Err(e) = log.append(&sample) {
                        error!("writing {}: {e}", log.path().display());
                        tx.send(MonitorMessage::Fatal(format!("log file: {e}"))).ok();
                        return;
                    }
                    if tx.send(MonitorMessage::Sample(sample)).is_err() {
                        return;
                    }
                }
                Err(e) => {
                    warn!("measurement failed: {e}");
                    session = None;
                    tx.send(MonitorMessage::Log(format!("Measurement failed: {e}"))).ok();
                    tx.send(MonitorMessage::Status(false)).ok();
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::drivers::visa::{Resource, SimulatedSupply};
    use crate::recorder::read_log;
    use std::sync::mpsc::channel;

    fn sim_connector() -> Connector {
        Box::new(|| {
            Ok(Hmp4040::new(Box::new(SimulatedSupply::new(
                &Resource::Simulated { index: 0 },
            ))))
        })
    }

    #[test]
    fn connected_engine_logs_and_reports_samples() {
        let path = std::env::temp_dir().join(format!("labdaq_engine_{}.txt", std::process::id()));
        std::fs::remove_file(&path).ok();
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let handle = spawn_thread(
            tx,
            rx_cmd,
            sim_connector(),
            EngineSettings {
                update_interval: Duration::from_millis(5),
                log_path: path.clone(),
                expected_note: "note".into(),
            },
        );
        tx_cmd.send(GuiCommand::Connect).unwrap();
        let mut samples = Vec::new();
        let mut connected = false;
        while samples.len() < 3 {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                MonitorMessage::Status(s) => connected = s,
                MonitorMessage::Sample(s) => samples.push(s),
                MonitorMessage::Fatal(e) => panic!("engine stopped: {e}"),
                MonitorMessage::Log(_) => {}
            }
        }
        assert!(connected);
        tx_cmd.send(GuiCommand::Shutdown).unwrap();
        handle.join().unwrap();
        let logged = read_log(&path).unwrap();
        std::fs::remove_file(&path).ok();
        assert!(logged.len() >= 3);
        assert_eq!(logged[0].channels[1].voltage_v, 1.25);
        assert_eq!(samples[0].channels[3].voltage_v, 1.95);
    }

    #[test]
    fn failing_connector_reports_disconnected() {
        let path = std::env::temp_dir().join(format!("labdaq_engine_fail_{}.txt", std::process::id()));
        std::fs::remove_file(&path).ok();
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let handle = spawn_thread(
            tx,
            rx_cmd,
            Box::new(|| Err(DaqError::NoDevice("HMP4040".into()))),
            EngineSettings {
                update_interval: Duration::from_millis(5),
                log_path: path.clone(),
                expected_note: "note".into(),
            },
        );
        tx_cmd.send(GuiCommand::Connect).unwrap();
        loop {
            match rx.recv_timeout(Duration::from_secs(5)).unwrap() {
                MonitorMessage::Status(s) => {
                    assert!(!s);
                    break;
                }
                MonitorMessage::Sample(_) => panic!("no session, no samples"),
                _ => {}
            }
        }
        drop(tx_cmd);
        handle.join().unwrap();
        std::fs::remove_file(&path).ok();
    }
}

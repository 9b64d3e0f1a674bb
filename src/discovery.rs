// src/discovery.rs
//! Finds power supplies among the listed resources and lets the operator
//! pick one when more than one answers.
use std::io::{self, BufRead, Write};

use log::{info, warn};

use crate::drivers::{DaqError, Hmp4040, ResourceManager};
use crate::files::ask;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct DeviceIdentity {
    pub resource: String,
    pub identity: String,
}

/// Probes every resource with `*IDN?` and keeps the ones whose identity
/// contains `identity_filter`. Each match beeps so it can be found on the
/// bench.
pub fn discover<W: Write>(
    rm: &ResourceManager,
    identity_filter: &str,
    output: &mut W,
) -> Result<Vec<DeviceIdentity>, DaqError> {
    let resources = rm.list_resources();
    let total = resources.len();
    let mut found = Vec::new();
    for (i, resource) in resources.into_iter().enumerate() {
        writeln!(output, "attempting connection to {} ({}/{})", resource, i + 1, total)?;
        let probe = rm.open(&resource).and_then(|t| {
            let mut psu = Hmp4040::new(t);
            let identity = psu.identify()?;
            if identity.contains(identity_filter) {
                psu.beep()?;
            }
            Ok(identity)
        });
        match probe {
            Ok(identity) if identity.contains(identity_filter) => {
                writeln!(output, "connection established to: {identity}")?;
                found.push(DeviceIdentity { resource, identity });
            }
            Ok(identity) => info!("{resource}: skipping '{identity}'"),
            Err(e) => {
                warn!("{resource}: {e}");
                writeln!(output, "next")?;
            }
        }
    }
    Ok(found)
}

/// Picks one device. A single candidate is returned directly; several
/// candidates prompt for a 1-based index, allowing one retry on non-numeric
/// input.
pub fn choose_device<R: BufRead, W: Write>(
    candidates: &[DeviceIdentity],
    device_name: &str,
    input: &mut R,
    output: &mut W,
) -> Result<DeviceIdentity, DaqError> {
    match candidates {
        [] => Err(DaqError::NoDevice(device_name.to_string())),
        [only] => {
            writeln!(output, "connecting to {} at {}", only.identity, only.resource)?;
            Ok(only.clone())
        }
        _ => {
            writeln!(output, "Multiple connections found. Choose one")?;
            for (i, c) in candidates.iter().enumerate() {
                writeln!(output, "  {}: {} ({})", i + 1, c.resource, c.identity)?;
            }
            let question = format!("choose one (Number 1-{}): ", candidates.len());
            let mut chosen = ask(input, output, &question)?.parse::<usize>();
            if chosen.is_err() {
                writeln!(output, "number must be int")?;
                chosen = ask(input, output, &question)?.parse::<usize>();
            }
            let chosen = chosen.map_err(|_| {
                DaqError::InvalidArgument("number must be int and > 0 (1, 2, ...)".into())
            })?;
            if chosen == 0 || chosen > candidates.len() {
                return Err(DaqError::SelectionOutOfRange {
                    chosen,
                    available: candidates.len(),
                });
            }
            let device = candidates[chosen - 1].clone();
            writeln!(output, "connecting to {} at {}", device.resource, device.identity)?;
            Ok(device)
        }
    }
}

/// Rediscovers supplies for a Connect request from the GUI, without
/// prompting. The previously chosen `preferred` resource wins when it still
/// answers; otherwise a single remaining candidate is taken. Resources the
/// search does not list (an explicit `--resource`) are reopened directly.
pub fn rediscover(
    rm: &ResourceManager,
    identity_filter: &str,
    preferred: &str,
) -> Result<DeviceIdentity, DaqError> {
    let found = discover(rm, identity_filter, &mut io::sink())?;
    if let Some(device) = found.iter().find(|d| d.resource == preferred) {
        return Ok(device.clone());
    }
    match found.as_slice() {
        [] => Ok(DeviceIdentity {
            resource: preferred.to_string(),
            identity: identity_filter.to_string(),
        }),
        [only] => {
            info!("{preferred} is gone, switching to {}", only.resource);
            Ok(only.clone())
        }
        several => Err(DaqError::InvalidArgument(format!(
            "{preferred} is gone and {} other {identity_filter} supplies answer; restart to choose one",
            several.len()
        ))),
    }
}

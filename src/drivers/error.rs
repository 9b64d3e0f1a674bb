use std::time::Duration;
use thiserror::Error;
#[derive(Debug, Error)]
pub enum DaqError {
    #[error("{0}")]
    InvalidArgument(String),
    #[error("file '{0}' already exists; restart with a different file_path or file_name")]
    FileExists(String),
    #[error("maximum number of attempts reached")]
    TooManyAttempts,
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("unsupported VISA resource string '{0}'")]
    InvalidResource(String),
    #[cfg(feature = "visa")]
    #[error("VISA error: {0}")]
    Visa(#[from] visa_rs::Error),
    #[error("unexpected response to '{command}': {response:?}")]
    Protocol { command: String, response: String },
    #[error("no {0} connections found, check connections")]
    NoDevice(String),
    #[error("device selection out of range: {chosen} (1-{available})")]
    SelectionOutOfRange { chosen: usize, available: usize },
    #[error("{call} failed (PICO_STATUS 0x{status:08X})")]
    Sdk { call: &'static str, status: u32 },
    #[error("failed to load oscilloscope SDK: {0}")]
    SdkLoad(String),
    #[error("device not ready after {0:?}")]
    Timeout(Duration),
    #[error("malformed log file at line {line}: {reason}")]
    MalformedLog { line: usize, reason: String },
    #[error("waveform container error: {0}")]
    Container(String),
    #[error("config error: {0}")]
    Config(#[from] serde_json::Error),
    #[error("failed to render plot: {0}")]
    Plot(String),
}
impl From<hdf5::Error> for DaqError {
    fn from(value: hdf5::Error) -> Self {
        DaqError::Container(value.to_string())
    }
}
impl<E: std::error::Error + Send + Sync + 'static> From<plotters::drawing::DrawingAreaErrorKind<E>>
    for DaqError
{
    fn from(value: plotters::drawing::DrawingAreaErrorKind<E>) -> Self {
        DaqError::Plot(format!("{value:?}"))
    }
}
impl From<image::ImageError> for DaqError {
    fn from(value: image::ImageError) -> Self {
        DaqError::Plot(value.to_string())
    }
}

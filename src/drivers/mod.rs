// src/drivers/mod.rs
pub mod buffer;
pub mod error;
pub mod hmp4040;
pub mod picoscope;
pub mod plot;
pub mod scope;
pub mod visa;
pub use buffer::CurrentHistory;
pub use error::DaqError;
pub use hmp4040::Hmp4040;
pub use picoscope::PicoScope5000;
pub use plot::{grid_layout, render_waveform_grid_png, PlotStyle};
pub use scope::{Oscilloscope, SimulatedScope, VoltageRange};
pub use visa::{Resource, ResourceManager, Transport};

// src/lib.rs
pub mod capture;
pub mod cli;
pub mod config;
pub mod discovery;
pub mod drivers;
pub mod engine;
pub mod files;
pub mod gui;
pub mod recorder;
pub mod types;
pub mod waveform;

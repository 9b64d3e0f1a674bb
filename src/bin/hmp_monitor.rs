// src/bin/hmp_monitor.rs
use std::io;
use std::process;

use anyhow::Context;
use clap::Parser;
use eframe::egui;
use log::info;

use labdaq::cli::MonitorArgs;
use labdaq::config::MonitorConfig;
use labdaq::discovery::{choose_device, discover, rediscover, DeviceIdentity};
use labdaq::drivers::{Hmp4040, ResourceManager};
use labdaq::engine::{Connector, EngineSettings};
use labdaq::files::prepare_target_file;
use labdaq::gui::{MonitorApp, ViewSettings};
use labdaq::types::{ConnectionMode, CHANNEL_COUNT};

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = MonitorArgs::parse();
    if let Err(e) = args.validate() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
    let config = match &args.config {
        Some(path) => MonitorConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => MonitorConfig::default(),
    };

    let stdin = io::stdin();
    let mut input = stdin.lock();
    let mut output = io::stdout();
    let log_path = prepare_target_file(&args.file_address(), &mut input, &mut output)?;

    let mode = if args.simulate {
        ConnectionMode::Simulation
    } else {
        ConnectionMode::Hardware
    };
    let rm = ResourceManager::new(mode, &config);
    let device = match &args.resource {
        Some(resource) => DeviceIdentity {
            resource: resource.clone(),
            identity: config.identity_filter.clone(),
        },
        None => {
            let found = discover(&rm, &config.identity_filter, &mut output)?;
            choose_device(&found, &config.identity_filter, &mut input, &mut output)?
        }
    };
    info!("monitoring {} at {}", device.identity, device.resource);

    // Connect rediscovers, so a supply that was power-cycled or replugged
    // under a new address is picked up again.
    let identity_filter = config.identity_filter.clone();
    let mut resource = device.resource;
    let connector: Connector = Box::new(move || {
        let device = rediscover(&rm, &identity_filter, &resource)?;
        resource = device.resource;
        rm.open(&resource).map(Hmp4040::new)
    });
    let engine_settings = EngineSettings {
        update_interval: args.update_interval(),
        log_path,
        expected_note: config.expected_note.clone(),
    };
    let view = ViewSettings {
        plot_size: args.plot_size,
        max_displayed_samples: args.max_displayed_samples,
        plot_y_max_ma: config.plot_y_max_ma,
        repaint_every: args.update_interval(),
    };

    let side = args.plot_size as f32 * 100.0;
    let viewport = egui::ViewportBuilder::default()
        .with_inner_size([(side + 30.0) * CHANNEL_COUNT as f32, side + 220.0])
        .with_title(config.window_title.clone());
    let options = eframe::NativeOptions {
        viewport,
        ..Default::default()
    };
    eframe::run_native(
        &config.window_title,
        options,
        Box::new(move |_cc| Box::new(MonitorApp::start(view, connector, engine_settings))),
    )
    .map_err(|e| anyhow::anyhow!("GUI failed: {e}"))?;
    println!("Closing..");
    Ok(())
}

// src/bin/pico_capture.rs
use std::fs;
use std::io;
use std::process;

use anyhow::Context;
use clap::Parser;
use log::info;

use labdaq::capture::capture_waveforms;
use labdaq::cli::CaptureArgs;
use labdaq::drivers::{render_waveform_grid_png, Oscilloscope, PicoScope5000, PlotStyle, SimulatedScope};
use labdaq::files::prepare_target_file;
use labdaq::waveform::WaveformSet;

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let args = CaptureArgs::parse();
    let settings = match args.settings() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {e}");
            process::exit(1);
        }
    };

    let stdin = io::stdin();
    let path = prepare_target_file(&args.file_address(), &mut stdin.lock(), &mut io::stdout())?;

    let mut scope: Box<dyn Oscilloscope> = if args.simulate {
        Box::new(SimulatedScope::new())
    } else {
        Box::new(PicoScope5000::open().context("opening PicoScope")?)
    };
    println!(
        "Capturing {} waveforms on {} with trigger at {} mV",
        settings.num_waveforms, settings.range, settings.trigger_mv
    );
    let set = capture_waveforms(scope.as_mut(), &settings).context("capturing waveforms")?;
    drop(scope);

    set.save(&path)
        .with_context(|| format!("writing {}", path.display()))?;
    println!("Data saved to {}", path.display());

    if let Some(plot_path) = args.plot_path() {
        let stored = WaveformSet::load(&path)
            .with_context(|| format!("reading back {}", path.display()))?;
        let png = render_waveform_grid_png(&stored, &PlotStyle::default())?;
        fs::write(&plot_path, png)
            .with_context(|| format!("writing {}", plot_path.display()))?;
        info!("plot written to {}", plot_path.display());
        println!("Plot saved to {}", plot_path.display());
    }
    println!("Closing..");
    Ok(())
}

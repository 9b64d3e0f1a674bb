// src/gui.rs
use std::sync::mpsc::{channel, Receiver, Sender};
use std::thread::JoinHandle;
use std::time::Duration;

use eframe::egui;
use egui::{Color32, RichText};
use egui_plot::{Line, Plot, PlotBounds, PlotPoints};

use crate::drivers::CurrentHistory;
use crate::engine::{self, Connector, EngineSettings};
use crate::types::*;

/// Display options for the monitor window.
#[derive(Clone, Debug)]
pub struct ViewSettings {
    /// Plot edge length in hundreds of pixels (1-9).
    pub plot_size: u32,
    pub max_displayed_samples: usize,
    pub plot_y_max_ma: f64,
    pub repaint_every: Duration,
}

pub struct MonitorApp {
    // state
    is_connected: bool,
    fatal: Option<String>,
    latest: Option<MeasurementSample>,
    history: CurrentHistory,
    view: ViewSettings,

    // event log shown at the bottom
    log_messages: Vec<String>,

    // engine link
    rx: Receiver<MonitorMessage>,
    tx_cmd: Sender<GuiCommand>,
    engine: Option<JoinHandle<()>>,
}

impl MonitorApp {
    /// Spawns the acquisition engine and asks it to connect right away.
    pub fn start(view: ViewSettings, connector: Connector, engine_settings: EngineSettings) -> Self {
        let (tx, rx) = channel();
        let (tx_cmd, rx_cmd) = channel();
        let engine = engine::spawn_thread(tx, rx_cmd, connector, engine_settings);
        tx_cmd.send(GuiCommand::Connect).ok();
        Self {
            is_connected: false,
            fatal: None,
            latest: None,
            history: CurrentHistory::new(CHANNEL_COUNT, view.max_displayed_samples),
            view,
            log_messages: vec!["Power supply monitor ready.".to_owned()],
            rx,
            tx_cmd,
            engine: Some(engine),
        }
    }

    fn log(&mut self, msg: &str) {
        self.log_messages.push(format!("> {}", msg));
        if self.log_messages.len() > 8 {
            self.log_messages.remove(0);
        }
    }

    fn drain_messages(&mut self) {
        // bounded so a flood of samples cannot freeze a frame
        for _ in 0..50 {
            let Ok(msg) = self.rx.try_recv() else { break };
            match msg {
                MonitorMessage::Log(s) => self.log(&s),
                MonitorMessage::Status(b) => self.is_connected = b,
                MonitorMessage::Sample(sample) => {
                    self.history.push(&sample.currents_ma());
                    self.latest = Some(sample);
                }
                MonitorMessage::Fatal(e) => {
                    self.log(&format!("ENGINE STOPPED: {e}"));
                    self.is_connected = false;
                    self.fatal = Some(e);
                }
            }
        }
    }

    fn channel_panel(&self, ui: &mut egui::Ui, index: usize) {
        let size = self.view.plot_size as f32 * 100.0;
        ui.label(RichText::new(format!("Channel {}", index + 1)).strong());
        let latest_ma = self.history.latest(index).unwrap_or(0.0);
        ui.label(RichText::new(format!("{latest_ma:.3}")).size(22.0));
        let (min, max) = current_axis_bounds(self.history.capacity(), self.view.plot_y_max_ma);
        Plot::new(format!("current_ch{}", index + 1))
            .width(size)
            .height(size)
            .allow_drag(false)
            .allow_zoom(false)
            .allow_scroll(false)
            .show(ui, |plot_ui| {
                plot_ui.set_plot_bounds(PlotBounds::from_min_max(min, max));
                plot_ui.line(
                    Line::new(PlotPoints::new(self.history.plot_points(index)))
                        .color(Color32::from_rgb(0, 160, 255)),
                );
            });
        let reading = self.latest.as_ref().map(|s| s.channels[index]);
        match reading {
            Some(r) => {
                ui.label(format!("Voltage: {:.3} V", r.voltage_v));
                ui.label(format!("Current: {:.3} mA", r.current_ma));
            }
            None => {
                ui.label("Voltage: ");
                ui.label("Current: ");
            }
        }
    }
}

/// Fixed plot window: sample index on x, 0..`y_max_ma` on y.
fn current_axis_bounds(capacity: usize, y_max_ma: f64) -> ([f64; 2], [f64; 2]) {
    let x_max = (capacity.saturating_sub(1) as f64).max(1.0);
    ([0.0, 0.0], [x_max, y_max_ma.max(f64::EPSILON)])
}

impl eframe::App for MonitorApp {
    fn update(&mut self, ctx: &egui::Context, _frame: &mut eframe::Frame) {
        self.drain_messages();

        egui::TopBottomPanel::top("controls").show(ctx, |ui| {
            ui.horizontal(|ui| {
                if ui.button("Connect").clicked() {
                    self.tx_cmd.send(GuiCommand::Connect).ok();
                }
                if ui.button("Disconnect").clicked() {
                    self.tx_cmd.send(GuiCommand::Disconnect).ok();
                }
                if ui.button("Beep").clicked() {
                    self.tx_cmd.send(GuiCommand::Beep).ok();
                }
                ui.separator();
                if let Some(e) = &self.fatal {
                    ui.colored_label(Color32::RED, format!("STOPPED: {e}"));
                } else if self.is_connected {
                    ui.colored_label(Color32::GREEN, "CONNECTED");
                } else {
                    ui.colored_label(Color32::YELLOW, "DISCONNECTED");
                }
                if let Some(sample) = &self.latest {
                    ui.separator();
                    ui.label(format!("Last sample: {}", sample.timestamp));
                }
            });
        });

        egui::TopBottomPanel::bottom("log").show(ctx, |ui| {
            egui::ScrollArea::vertical().max_height(100.0).show(ui, |ui| {
                for m in &self.log_messages {
                    ui.monospace(m);
                }
            });
        });

        egui::CentralPanel::default().show(ctx, |ui| {
            ui.columns(CHANNEL_COUNT, |columns| {
                for (index, column) in columns.iter_mut().enumerate() {
                    self.channel_panel(column, index);
                }
            });
        });

        ctx.request_repaint_after(self.view.repaint_every);
    }
}

impl Drop for MonitorApp {
    fn drop(&mut self) {
        self.tx_cmd.send(GuiCommand::Shutdown).ok();
        if let Some(handle) = self.engine.take() {
            handle.join().ok();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    #[test]
    fn axis_is_pinned_to_configured_limit() {
        assert_eq!(current_axis_bounds(20, 600.0), ([0.0, 0.0], [19.0, 600.0]));
        // A single-sample history still gets a non-degenerate x-range.
        assert_eq!(current_axis_bounds(1, 3.0).1[0], 1.0);
    }
}

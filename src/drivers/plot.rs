use std::io::Cursor;
use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use plotters::prelude::LineSeries;
use plotters::prelude::*;
use crate::drivers::error::DaqError;
use crate::waveform::WaveformSet;
/// Headroom added above and below the global extremes, in mV.
const Y_MARGIN_MV: f64 = 5.0;
#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub palette: Vec<RGBColor>,
    /// Draw captions, axis descriptions and tick labels (needs system fonts).
    pub labels: bool,
}
impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 1600,
            height: 900,
            background: WHITE,
            palette: vec![BLUE, RED, GREEN, CYAN, MAGENTA, BLACK],
            labels: true,
        }
    }
}
/// Rows and columns of the subplot grid for `n` waveforms.
///
/// Rows follow `n / 5 + n % 5`; columns are rounded up so every waveform
/// gets a cell.
pub fn grid_layout(n: usize) -> (usize, usize) {
    if n == 0 {
        return (0, 0);
    }
    let rows = n / 5 + n % 5;
    let cols = (n + rows - 1) / rows;
    (rows, cols)
}
/// One subplot per waveform sharing a common y-range; x labels only on the
/// bottom row and y labels only on the left column.
pub fn render_waveform_grid_png(set: &WaveformSet, style: &PlotStyle) -> Result<Vec<u8>, DaqError> {
    let n = set.num_waveforms();
    if n == 0 || set.samples_per_waveform() == 0 {
        return Err(DaqError::Plot("waveform set has no samples".into()));
    }
    let (rows, cols) = grid_layout(n);
    let (lo, hi) = set
        .value_bounds()
        .ok_or_else(|| DaqError::Plot("waveform set has no samples".into()))?;
    let y_range = (lo as f64 - Y_MARGIN_MV)..(hi as f64 + Y_MARGIN_MV);
    let time = set.time_axis_us();
    let t_max = time.last().copied().filter(|t| *t > 0.0).unwrap_or(1.0);
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;
        let cells = root.split_evenly((rows, cols));
        for (i, (cell, waveform)) in cells.iter().zip(set.data().outer_iter()).enumerate() {
            let color = style.palette[i % style.palette.len()];
            let bottom_row = i + cols >= n;
            let left_col = i % cols == 0;
            let mut builder = ChartBuilder::on(cell);
            builder.margin(8);
            if style.labels {
                builder.caption(format!("Waveform {}", i + 1), ("sans-serif", 16));
                if bottom_row {
                    builder.set_label_area_size(LabelAreaPosition::Bottom, 35);
                }
                if left_col {
                    builder.set_label_area_size(LabelAreaPosition::Left, 50);
                }
            }
            let mut chart = builder.build_cartesian_2d(0f64..t_max, y_range.clone())?;
            if style.labels {
                let mut mesh = chart.configure_mesh();
                mesh.light_line_style(&BLACK.mix(0.05));
                if bottom_row {
                    mesh.x_desc("Time (us)");
                } else {
                    mesh.x_labels(0);
                }
                if left_col {
                    mesh.y_desc("Voltage (mV)");
                } else {
                    mesh.y_labels(0);
                }
                mesh.draw()?;
            }
            let series = time.iter().copied().zip(waveform.iter().map(|v| *v as f64));
            chart.draw_series(LineSeries::new(series, &color))?;
        }
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}
fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, DaqError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| DaqError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    let dynamic = DynamicImage::ImageRgb8(image);
    dynamic.write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}
#[cfg(test)]
mod tests {
    use super::*;
    use crate::waveform::WaveformMetadata;
    use ndarray::Array2;
    #[test]
    fn layout_has_a_cell_for_every_waveform() {
        assert_eq!(grid_layout(10), (2, 5));
        assert_eq!(grid_layout(3), (3, 1));
        assert_eq!(grid_layout(5), (1, 5));
        assert_eq!(grid_layout(0), (0, 0));
        for n in 1..100 {
            let (rows, cols) = grid_layout(n);
            assert!(rows * cols >= n, "n={n} rows={rows} cols={cols}");
        }
    }
    #[test]
    fn renders_png_without_labels() {
        let data = Array2::from_shape_fn((7, 64), |(w, s)| ((s as f32) * 0.1 + w as f32).sin() * 50.0);
        let meta = WaveformMetadata {
            date: "2024-05-25".into(),
            user: "u".into(),
            waveform_type: "t".into(),
            timebase: 8,
            num_waveforms: 7,
            time_interval_ns: 80.0,
            voltage_range: "PS5000_200MV".into(),
            trigger_mv: 10.0,
            pre_trigger_samples: 8,
        };
        let set = WaveformSet::new(data, meta).unwrap();
        let style = PlotStyle {
            width: 320,
            height: 240,
            labels: false,
            ..PlotStyle::default()
        };
        let png = render_waveform_grid_png(&set, &style).unwrap();
        assert_eq!(&png[1..4], b"PNG");
    }
}

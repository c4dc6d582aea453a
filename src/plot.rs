//! Sweep rendering: both channels of a result as line series, encoded to PNG
//! in memory, plus a monitor that redraws a file on every acquired point.

use std::io::Cursor;
use std::path::PathBuf;

use image::{DynamicImage, ImageBuffer, ImageFormat, Rgb};
use log::warn;
use plotters::prelude::*;

use crate::error::FmrError;
use crate::sweep::{AxisKind, SweepMonitor, SweepResult};

#[derive(Clone, Debug)]
pub struct PlotStyle {
    pub width: u32,
    pub height: u32,
    pub background: RGBColor,
    pub x_channel: RGBColor,
    pub y_channel: RGBColor,
}

impl Default for PlotStyle {
    fn default() -> Self {
        Self {
            width: 900,
            height: 600,
            background: WHITE,
            x_channel: GREEN,
            y_channel: RGBColor(128, 0, 128),
        }
    }
}

pub fn axis_label(axis: AxisKind) -> &'static str {
    match axis {
        AxisKind::FieldOe => "Field (Oe)",
        AxisKind::FrequencyGhz => "Frequency (GHz)",
    }
}

/// Render both channels of a (possibly partial) sweep to an in-memory PNG.
pub fn render_sweep_png(
    sweep: &SweepResult,
    title: &str,
    style: &PlotStyle,
) -> Result<Vec<u8>, FmrError> {
    if sweep.is_empty() {
        return Err(FmrError::Plot("sweep has no points".into()));
    }
    let mut buffer = vec![0u8; (style.width * style.height * 3) as usize];
    {
        let root = BitMapBackend::with_buffer(&mut buffer, (style.width, style.height))
            .into_drawing_area();
        root.fill(&style.background)?;

        let x_min = sweep.setpoints.iter().cloned().fold(f64::INFINITY, f64::min);
        let x_max = sweep.setpoints.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        let x_bounds = if (x_max - x_min).abs() < f64::EPSILON {
            (x_min - 1.0, x_max + 1.0)
        } else {
            (x_min, x_max)
        };
        let y_min = sweep
            .x
            .iter()
            .chain(sweep.y.iter())
            .cloned()
            .fold(f64::INFINITY, f64::min);
        let y_max = sweep
            .x
            .iter()
            .chain(sweep.y.iter())
            .cloned()
            .fold(f64::NEG_INFINITY, f64::max);
        let y_bounds = if (y_max - y_min).abs() < f64::EPSILON {
            (y_min - 1.0, y_max + 1.0)
        } else {
            (y_min, y_max)
        };

        let mut chart = ChartBuilder::on(&root)
            .margin(10)
            .caption(title, ("sans-serif", 20).into_font())
            .set_label_area_size(LabelAreaPosition::Left, 60)
            .set_label_area_size(LabelAreaPosition::Bottom, 40)
            .build_cartesian_2d(x_bounds.0..x_bounds.1, y_bounds.0..y_bounds.1)?;
        chart
            .configure_mesh()
            .x_desc(axis_label(sweep.axis))
            .y_desc("Voltage (AU)")
            .light_line_style(&BLACK.mix(0.1))
            .draw()?;

        let channels = [
            ("Channel 1 (X)", &sweep.x, style.x_channel),
            ("Channel 2 (Y)", &sweep.y, style.y_channel),
        ];
        for (label, values, color) in channels {
            let series = sweep
                .setpoints
                .iter()
                .cloned()
                .zip(values.iter().cloned());
            chart
                .draw_series(LineSeries::new(series, &color))?
                .label(label)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
        chart
            .configure_series_labels()
            .border_style(&BLACK.mix(0.2))
            .background_style(&style.background.mix(0.8))
            .draw()?;
        root.present()?;
    }
    encode_png(&buffer, style.width, style.height)
}

fn encode_png(buffer: &[u8], width: u32, height: u32) -> Result<Vec<u8>, FmrError> {
    let image = ImageBuffer::<Rgb<u8>, _>::from_raw(width, height, buffer.to_vec())
        .ok_or_else(|| FmrError::Plot("failed to allocate image buffer".into()))?;
    let mut output = Vec::new();
    DynamicImage::ImageRgb8(image).write_to(&mut Cursor::new(&mut output), ImageFormat::Png)?;
    Ok(output)
}

/// Render a sweep straight to a PNG file.
pub fn save_sweep_png(
    path: &std::path::Path,
    sweep: &SweepResult,
    title: &str,
    style: &PlotStyle,
) -> Result<(), FmrError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let png = render_sweep_png(sweep, title, style)?;
    std::fs::write(path, png)?;
    Ok(())
}

/// Live monitor: overwrites one PNG file after every acquired point. The
/// redraw runs inline on the acquisition thread; a failed render is logged
/// and the sweep carries on.
pub struct LivePlot {
    path: PathBuf,
    title: String,
    style: PlotStyle,
}

impl LivePlot {
    pub fn new(path: PathBuf, title: impl Into<String>) -> Self {
        Self {
            path,
            title: title.into(),
            style: PlotStyle::default(),
        }
    }

    pub fn with_style(mut self, style: PlotStyle) -> Self {
        self.style = style;
        self
    }
}

impl SweepMonitor for LivePlot {
    fn update(&mut self, partial: &SweepResult) {
        if let Err(e) = save_sweep_png(&self.path, partial, &self.title, &self.style) {
            warn!("live plot update failed: {e}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sweep::SweepPhase;

    fn sweep() -> SweepResult {
        SweepResult {
            axis: AxisKind::FieldOe,
            fixed: 9.4,
            setpoints: vec![0.0, 10.0, 20.0],
            currents: None,
            x: vec![1.0, -1.0, 0.0],
            y: vec![0.5, 0.0, -0.5],
            phase: SweepPhase::Done,
            fault: None,
        }
    }

    #[test]
    fn rendering_returns_png_bytes() {
        let png = render_sweep_png(&sweep(), "Field Sweep", &PlotStyle::default()).unwrap();
        assert!(!png.is_empty());
        assert_eq!(&png[1..4], b"PNG");
    }

    #[test]
    fn empty_sweep_cannot_be_rendered() {
        let mut empty = sweep();
        empty.setpoints.clear();
        empty.x.clear();
        empty.y.clear();
        assert!(matches!(
            render_sweep_png(&empty, "t", &PlotStyle::default()),
            Err(FmrError::Plot(_))
        ));
    }
}

//! Training Charts
//!
//! Renders per-epoch line charts to PNG with `plotters`. The bitmap backend
//! draws into an RGB buffer which is then written with `image`. No text is
//! drawn; the history CSV next to the charts carries the numbers.

use std::path::Path;

use plotters::prelude::*;
use tracing::debug;

use crate::utils::error::{AslError, Result};

/// Chart canvas size in pixels (10x7 inches at 100 dpi)
const CHART_WIDTH: u32 = 1000;
const CHART_HEIGHT: u32 = 700;
const CHART_MARGIN: u32 = 20;
const GRID_LINES: usize = 4;

const COLOR_GRID: RGBColor = RGBColor(220, 220, 220);

pub const COLOR_GREEN: RGBColor = RGBColor(0, 128, 0);
pub const COLOR_BLUE: RGBColor = RGBColor(0, 0, 255);
pub const COLOR_ORANGE: RGBColor = RGBColor(255, 165, 0);
pub const COLOR_RED: RGBColor = RGBColor(255, 0, 0);

/// A data series for a line chart
#[derive(Debug, Clone)]
pub struct DataSeries {
    pub name: String,
    /// One value per epoch, epoch numbering starts at 1
    pub values: Vec<f64>,
    pub color: RGBColor,
}

impl DataSeries {
    pub fn new(name: &str, values: &[f64], color: RGBColor) -> Self {
        Self {
            name: name.to_string(),
            values: values.to_vec(),
            color,
        }
    }

    fn points(&self) -> Vec<(f64, f64)> {
        self.values
            .iter()
            .enumerate()
            .map(|(i, v)| ((i + 1) as f64, *v))
            .collect()
    }
}

fn chart_err<E: std::fmt::Display>(e: E) -> AslError {
    AslError::Chart(e.to_string())
}

/// Render a line chart of epoch metrics to `output_path` (PNG)
///
/// The y axis spans `[y_min, y_max]`; `None` for `y_max` fits the data.
/// Only lines are drawn: plotters is built without a font backend, so the
/// chart carries no caption, tick labels or legend. Series are told apart by
/// colour and the y range is split by `GRID_LINES` horizontal rules.
pub fn generate_line_chart(
    title: &str,
    series: &[DataSeries],
    y_range: (f64, Option<f64>),
    output_path: &Path,
) -> Result<()> {
    if let Some(parent) = output_path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }

    let epochs = series.iter().map(|s| s.values.len()).max().unwrap_or(0);
    let x_max = epochs.max(2) as f64;
    let (y_min, y_max) = match y_range {
        (min, Some(max)) => (min, max),
        (min, None) => {
            let data_max = series
                .iter()
                .flat_map(|s| s.values.iter().copied())
                .filter(|v| v.is_finite())
                .fold(min, f64::max);
            let max = if data_max > min { data_max * 1.1 } else { min + 1.0 };
            (min, max)
        }
    };
    debug!(
        "Drawing {} chart: {} epochs, y in [{:.3}, {:.3}] -> {:?}",
        title, epochs, y_min, y_max, output_path
    );

    let mut buf = vec![0u8; (CHART_WIDTH * CHART_HEIGHT * 3) as usize];
    {
        let root =
            BitMapBackend::with_buffer(&mut buf, (CHART_WIDTH, CHART_HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(CHART_MARGIN)
            .build_cartesian_2d(1f64..x_max, y_min..y_max)
            .map_err(chart_err)?;

        let step = (y_max - y_min) / GRID_LINES as f64;
        let rules = (0..=GRID_LINES).map(|i| {
            let y = y_min + step * i as f64;
            PathElement::new(vec![(1.0, y), (x_max, y)], COLOR_GRID)
        });
        chart.draw_series(rules).map_err(chart_err)?;

        let frame = [(1.0, y_min), (1.0, y_max), (x_max, y_max), (x_max, y_min), (1.0, y_min)];
        chart
            .draw_series(std::iter::once(PathElement::new(frame.to_vec(), BLACK)))
            .map_err(chart_err)?;

        for s in series {
            let style = s.color.stroke_width(2);
            chart
                .draw_series(LineSeries::new(s.points(), style))
                .map_err(chart_err)?;
        }

        root.present().map_err(chart_err)?;
    }

    image::save_buffer(
        output_path,
        &buf,
        CHART_WIDTH,
        CHART_HEIGHT,
        image::ColorType::Rgb8,
    )
    .map_err(|e| AslError::encode(output_path, e))?;

    Ok(())
}

/// Accuracy chart: train in green, validation in blue, y axis 0..100
pub fn plot_accuracy(train: &[f64], validation: &[f64], output_path: &Path) -> Result<()> {
    generate_line_chart(
        "accuracy",
        &[
            DataSeries::new("train accuracy", train, COLOR_GREEN),
            DataSeries::new("validation accuracy", validation, COLOR_BLUE),
        ],
        (0.0, Some(100.0)),
        output_path,
    )
}

/// Loss chart: train in orange, validation in red
pub fn plot_loss(train: &[f64], validation: &[f64], output_path: &Path) -> Result<()> {
    generate_line_chart(
        "loss",
        &[
            DataSeries::new("train loss", train, COLOR_ORANGE),
            DataSeries::new("validation loss", validation, COLOR_RED),
        ],
        (0.0, None),
        output_path,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_accuracy_chart_written_as_png() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("diagrams").join("accuracy.png");

        plot_accuracy(&[20.0, 45.5, 60.0], &[18.0, 40.0, 52.5], &path).unwrap();

        let chart = image::open(&path).unwrap();
        assert_eq!(chart.width(), CHART_WIDTH);
        assert_eq!(chart.height(), CHART_HEIGHT);
    }

    #[test]
    fn test_loss_chart_single_epoch() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loss.png");

        plot_loss(&[1.61], &[1.58], &path).unwrap();

        assert!(path.exists());
    }

    #[test]
    fn test_chart_draws_every_series_colour() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("loss.png");

        plot_loss(&[2.0, 1.2, 0.8, 0.5], &[2.1, 1.5, 1.1, 0.9], &path).unwrap();

        let chart = image::open(&path).unwrap().to_rgb8();
        for colour in [COLOR_ORANGE, COLOR_RED] {
            let RGBColor(r, g, b) = colour;
            let drawn = chart.pixels().filter(|p| p.0 == [r, g, b]).count();
            assert!(drawn > 100, "{:?} drawn on {} pixels", colour, drawn);
        }
    }

    #[test]
    fn test_series_points_start_at_epoch_one() {
        let series = DataSeries::new("s", &[0.5, 0.25], COLOR_RED);
        assert_eq!(series.points(), vec![(1.0, 0.5), (2.0, 0.25)]);
    }
}

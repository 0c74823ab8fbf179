use std::fs::File;
use std::io::{BufWriter, Write};
use std::ops::Range;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use log::info;
use plotters::coord::Shift;
use plotters::prelude::*;

use crate::result::SimulationResult;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PlotFormat {
    Svg,
    Png,
}

impl PlotFormat {
    fn from_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("svg") => Ok(PlotFormat::Svg),
            Some(ext) if ext.eq_ignore_ascii_case("png") => Ok(PlotFormat::Png),
            Some(ext) => Err(anyhow!(
                "unsupported plot format '.{}', expected .svg or .png",
                ext
            )),
            None => Err(anyhow!("plot path {} has no extension", path.display())),
        }
    }
}

/// Renders every recorded variable of a result against time as a line chart.
/// SVG charts carry a caption, axis labels and a legend; PNG charts only the lines,
/// since no font rasteriser is built in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChartPlotter {
    pub width: u32,
    pub height: u32,
}

impl Default for ChartPlotter {
    fn default() -> Self {
        Self {
            width: 1024,
            height: 768,
        }
    }
}

impl ChartPlotter {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    pub fn render(&self, result: &SimulationResult, title: &str, path: &Path) -> Result<()> {
        let format = PlotFormat::from_path(path)?;
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() && !parent.is_dir() {
                return Err(anyhow!("directory {} does not exist", parent.display()));
            }
        }
        let (t0, t1) = match (result.first_time(), result.last_time()) {
            (Some(t0), Some(t1)) if t1 > t0 => (t0, t1),
            _ => return Err(anyhow!("nothing to plot, the result has fewer than two samples")),
        };
        let series = result
            .variables()
            .iter()
            .map(|name| (name.as_str(), result.series(name)))
            .filter(|(_, points)| !points.is_empty())
            .collect::<Vec<_>>();
        if series.is_empty() {
            return Err(anyhow!("nothing to plot, no variables were recorded"));
        }
        let (y0, y1) = value_range(series.iter().flat_map(|(_, p)| p.iter().map(|(_, v)| *v)));

        let size = (self.width, self.height);
        match format {
            PlotFormat::Svg => {
                let root = SVGBackend::new(path, size).into_drawing_area();
                draw_chart(root, Some(title), &series, t0..t1, y0..y1)?
            }
            PlotFormat::Png => {
                let root = BitMapBackend::new(path, size).into_drawing_area();
                draw_chart(root, None, &series, t0..t1, y0..y1)?
            }
        }
        info!("wrote plot to {}", path.display());
        Ok(())
    }
}

// draws the lines, and the caption, mesh labels and legend when there is a title
fn draw_chart<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    title: Option<&str>,
    series: &[(&str, Vec<(f64, f64)>)],
    x: Range<f64>,
    y: Range<f64>,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let mut builder = ChartBuilder::on(&root);
    builder.margin(12);
    if let Some(title) = title {
        builder
            .caption(title, ("sans-serif", 24))
            .x_label_area_size(40)
            .y_label_area_size(70);
    }
    let mut chart = builder.build_cartesian_2d(x, y)?;
    if title.is_some() {
        chart.configure_mesh().x_desc("time").draw()?;
    }

    for (i, (name, points)) in series.iter().enumerate() {
        let color = Palette99::pick(i).to_rgba();
        let anno =
            chart.draw_series(LineSeries::new(points.iter().copied(), color.stroke_width(2)))?;
        if title.is_some() {
            anno.label(*name)
                .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
        }
    }
    if title.is_some() {
        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()?;
    }
    root.present()?;
    Ok(())
}

// padded [min, max] of the finite values, never empty
fn value_range<I: Iterator<Item = f64>>(values: I) -> (f64, f64) {
    let (lo, hi) = values
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });
    if !lo.is_finite() {
        return (-1.0, 1.0);
    }
    let pad = if hi > lo {
        0.05 * (hi - lo)
    } else {
        0.5 * lo.abs().max(1.0)
    };
    (lo - pad, hi + pad)
}

/// Writes the result as pretty printed JSON.
pub fn write_json(result: &SimulationResult, path: &Path) -> Result<()> {
    let file = File::create(path)
        .with_context(|| format!("cannot create results file {}", path.display()))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, result)?;
    writer.flush()?;
    info!("wrote results to {}", path.display());
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use approx::assert_relative_eq;

    use super::*;
    use crate::result::Sample;

    fn result() -> SimulationResult {
        let samples = (0..=10)
            .map(|k| {
                let t = k as f64 * 0.5;
                let mut s = Sample::new(t);
                s.values.insert("x".to_string(), (-t).exp());
                s.values.insert("y".to_string(), 2.0);
                s
            })
            .collect();
        SimulationResult::new(vec!["x".to_string(), "y".to_string()], samples)
    }

    #[test]
    fn render_svg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.svg");
        ChartPlotter::default().render(&result(), "test", &path).unwrap();
        let svg = fs::read_to_string(&path).unwrap();
        assert!(svg.contains("<svg"));
        assert!(svg.contains("polyline") || svg.contains("path"));
        assert!(svg.contains("test"));
    }

    #[test]
    fn render_png() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("plot.PNG");
        ChartPlotter::new(320, 240)
            .render(&result(), "test", &path)
            .unwrap();
        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }

    #[test]
    fn render_failures() {
        let dir = tempfile::tempdir().unwrap();
        let plotter = ChartPlotter::default();
        let err = plotter
            .render(&result(), "t", &dir.path().join("plot.gif"))
            .unwrap_err();
        assert!(err.to_string().contains("unsupported plot format '.gif'"));
        assert!(plotter
            .render(&result(), "t", &dir.path().join("plot"))
            .is_err());
        let err = plotter
            .render(&result(), "t", &dir.path().join("missing/plot.svg"))
            .unwrap_err();
        assert!(err.to_string().contains("does not exist"));
        let empty = SimulationResult::new(vec![], vec![]);
        assert!(plotter
            .render(&empty, "t", &dir.path().join("plot.svg"))
            .is_err());
    }

    #[test]
    fn range_is_padded() {
        let (lo, hi) = value_range(vec![2.0, 2.0].into_iter());
        assert_relative_eq!(lo, 1.0);
        assert_relative_eq!(hi, 3.0);
        let (lo, hi) = value_range(vec![0.0, 10.0, f64::NAN].into_iter());
        assert_relative_eq!(lo, -0.5);
        assert_relative_eq!(hi, 10.5);
        assert_eq!(value_range(std::iter::empty()), (-1.0, 1.0));
    }

    #[test]
    fn json_export() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("results.json");
        write_json(&result(), &path).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["variables"][0], "x");
        assert_eq!(value["samples"].as_array().unwrap().len(), 11);
        assert_eq!(value["samples"][0]["values"]["y"], 2.0);
    }
}

//! Null distribution histograms.
//!
//! One SVG per (experiment, statistic, component): the permutation draws as bars, the
//! observed value as a vertical line, and the uncorrected p-value in the legend.

use plotters::coord::Shift;
use plotters::prelude::*;
use std::path::Path;
use thiserror::Error;

const PLOT_SIZE: (u32, u32) = (800, 600);

#[derive(Error, Debug)]
pub enum PlotError {
    #[error("Cannot draw a histogram without null draws.")]
    NoDraws,
    #[error("A histogram needs at least one bin.")]
    ZeroBins,
    #[error("Failed to render {}: {message}", .path.display())]
    Render {
        path: std::path::PathBuf,
        message: String,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HistogramBin {
    pub lower: f64,
    pub upper: f64,
    pub count: usize,
}

/// Equal-width bins spanning `[min, max]` of `values`; the last bin is closed on the
/// right. A constant sample gets the range `[v - 0.5, v + 0.5]`.
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<HistogramBin> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let (mut lo, mut hi) = values
        .iter()
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        });
    if lo == hi {
        lo -= 0.5;
        hi += 0.5;
    }
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &value in values {
        let slot = ((value - lo) / width).floor() as usize;
        counts[slot.min(bins - 1)] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, count)| HistogramBin {
            lower: lo + i as f64 * width,
            upper: if i + 1 == bins {
                hi
            } else {
                lo + (i + 1) as f64 * width
            },
            count,
        })
        .collect()
}

pub struct HistogramSpec<'a> {
    pub title: &'a str,
    pub x_label: &'a str,
    pub draws: &'a [f64],
    pub observed: f64,
    pub p_value: f64,
    pub bins: usize,
}

/// Renders `spec` as an SVG at `path`, replacing any existing file.
pub fn render_histogram(path: &Path, spec: &HistogramSpec<'_>) -> Result<(), PlotError> {
    if spec.draws.is_empty() {
        return Err(PlotError::NoDraws);
    }
    if spec.bins == 0 {
        return Err(PlotError::ZeroBins);
    }
    let bins = histogram_bins(spec.draws, spec.bins);
    let render_error = |message: String| PlotError::Render {
        path: path.to_path_buf(),
        message,
    };

    let root = SVGBackend::new(path, PLOT_SIZE).into_drawing_area();
    draw_histogram(&root, spec, &bins).map_err(|e| render_error(e.to_string()))?;
    root.present().map_err(|e| render_error(e.to_string()))?;
    Ok(())
}

fn draw_histogram<DB: DrawingBackend>(
    root: &DrawingArea<DB, Shift>,
    spec: &HistogramSpec<'_>,
    bins: &[HistogramBin],
) -> Result<(), DrawingAreaErrorKind<DB::ErrorType>> {
    root.fill(&WHITE)?;

    let data_lo = bins.first().map_or(spec.observed, |b| b.lower);
    let data_hi = bins.last().map_or(spec.observed, |b| b.upper);
    let x_lo = data_lo.min(spec.observed);
    let x_hi = data_hi.max(spec.observed);
    let pad = (x_hi - x_lo).max(f64::EPSILON) * 0.05;
    let y_max = bins.iter().map(|b| b.count).max().unwrap_or(0) as f64 * 1.1 + 1.0;

    let mut chart = ChartBuilder::on(root)
        .caption(spec.title, ("sans-serif", 22))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d((x_lo - pad)..(x_hi + pad), 0.0..y_max)?;

    chart
        .configure_mesh()
        .disable_x_mesh()
        .x_desc(spec.x_label)
        .y_desc("Counts")
        .draw()?;

    chart.draw_series(bins.iter().map(|bin| {
        Rectangle::new(
            [(bin.lower, 0.0), (bin.upper, bin.count as f64)],
            BLUE.mix(0.6).filled(),
        )
    }))?;

    chart
        .draw_series(std::iter::once(PathElement::new(
            vec![(spec.observed, 0.0), (spec.observed, y_max)],
            RED.stroke_width(2),
        )))?
        .label(format!("p_uncor = {:.4}", spec.p_value))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], RED.stroke_width(2)));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    Ok(())
}

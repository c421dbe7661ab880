// Diagnostic charts: fitted coefficients and held-out residuals.
use std::path::Path;

use plotters::prelude::*;

use crate::error::{ScoutError, ScoutResult};

fn plot_err<E: std::fmt::Display>(e: E) -> ScoutError {
    ScoutError::Plot(e.to_string())
}

/// `(lo - pad)..(hi + pad)`, widened when every value is the same.
fn padded_range(values: impl Iterator<Item = f64> + Clone) -> std::ops::Range<f64> {
    let lo = values.clone().fold(f64::INFINITY, f64::min);
    let hi = values.fold(f64::NEG_INFINITY, f64::max);
    if !lo.is_finite() || !hi.is_finite() {
        return -1.0..1.0;
    }
    let pad = if hi > lo { (hi - lo) * 0.1 } else { 0.5 };
    (lo - pad)..(hi + pad)
}

/// Horizontal bar chart of term coefficients, one bar per term.
pub fn plot_coefficients(path: &Path, coefs: &[(String, f64)]) -> ScoutResult<()> {
    let names: Vec<&str> = coefs.iter().map(|(n, _)| n.as_str()).collect();
    let count = coefs.len();
    let x_range = padded_range(coefs.iter().map(|(_, c)| *c).chain(std::iter::once(0.0)));

    let height = (count as u32 * 24).max(300) + 100;
    let root = BitMapBackend::new(path, (1000, height)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Projection Coefficients", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(240)
        .build_cartesian_2d(x_range, 0..count)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .y_labels(count)
        .y_label_formatter(&|idx| names.get(*idx).map(|n| n.to_string()).unwrap_or_default())
        .x_desc("Coefficient")
        .y_desc("Term")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(coefs.iter().enumerate().map(|(i, (_, coef))| {
            let start = 0.0_f64.min(*coef);
            let end = 0.0_f64.max(*coef);
            Rectangle::new([(start, i), (end, i + 1)], BLUE.mix(0.5).filled())
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

/// Residual against prediction for each held-out player, with the zero line.
pub fn plot_residuals(path: &Path, points: &[(f64, f64)]) -> ScoutResult<()> {
    let x_range = padded_range(points.iter().map(|(p, _)| *p));
    let y_range = padded_range(points.iter().map(|(_, r)| *r).chain(std::iter::once(0.0)));
    let (x_lo, x_hi) = (x_range.start, x_range.end);

    let root = BitMapBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Held-out Residuals", ("sans-serif", 24))
        .margin(10)
        .x_label_area_size(40)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, y_range)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Predicted")
        .y_desc("Residual")
        .draw()
        .map_err(plot_err)?;

    chart
        .draw_series(LineSeries::new(vec![(x_lo, 0.0), (x_hi, 0.0)], &RED))
        .map_err(plot_err)?;
    chart
        .draw_series(points.iter().map(|&(p, r)| Circle::new((p, r), 4, BLUE.filled())))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    Ok(())
}

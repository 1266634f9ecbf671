use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use plotters::coord::Shift;
use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::output::OutputArtifacts;
use crate::reweight::ReweightOutcome;

const CANVAS_SIZE: (u32, u32) = (680, 540);

pub fn render_all(outcome: &ReweightOutcome, artifacts: &OutputArtifacts) -> Result<()> {
    if outcome.weights.is_empty() {
        return Err(anyhow!("No samples available for plotting"));
    }

    if artifacts.toggles.distribution {
        draw_distribution_png(outcome, artifacts.histogram_bins, &artifacts.distribution_png)?;
        draw_distribution_svg(outcome, artifacts.histogram_bins, &artifacts.distribution_svg)?;
    }

    if artifacts.toggles.weights {
        draw_weights_png(outcome, &artifacts.weights_png)?;
        draw_weights_svg(outcome, &artifacts.weights_svg)?;
    }

    if artifacts.toggles.convergence {
        draw_convergence_png(outcome, &artifacts.convergence_png)?;
        draw_convergence_svg(outcome, &artifacts.convergence_svg)?;
    }

    if artifacts.toggles.difference {
        draw_difference_png(outcome, &artifacts.difference_png)?;
        draw_difference_svg(outcome, &artifacts.difference_svg)?;
    }

    Ok(())
}

fn draw_distribution_png(outcome: &ReweightOutcome, bins: usize, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = BitMapBackend::new(path, CANVAS_SIZE);
    draw_distribution_chart(backend.into_drawing_area(), outcome, bins)
}

fn draw_distribution_svg(outcome: &ReweightOutcome, bins: usize, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = SVGBackend::new(path, CANVAS_SIZE);
    draw_distribution_chart(backend.into_drawing_area(), outcome, bins)
}

fn draw_weights_png(outcome: &ReweightOutcome, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = BitMapBackend::new(path, CANVAS_SIZE);
    draw_weights_chart(backend.into_drawing_area(), outcome)
}

fn draw_weights_svg(outcome: &ReweightOutcome, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = SVGBackend::new(path, CANVAS_SIZE);
    draw_weights_chart(backend.into_drawing_area(), outcome)
}

fn draw_convergence_png(outcome: &ReweightOutcome, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = BitMapBackend::new(path, CANVAS_SIZE);
    draw_convergence_chart(backend.into_drawing_area(), outcome)
}

fn draw_convergence_svg(outcome: &ReweightOutcome, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = SVGBackend::new(path, CANVAS_SIZE);
    draw_convergence_chart(backend.into_drawing_area(), outcome)
}

fn draw_difference_png(outcome: &ReweightOutcome, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = BitMapBackend::new(path, CANVAS_SIZE);
    draw_difference_chart(backend.into_drawing_area(), outcome)
}

fn draw_difference_svg(outcome: &ReweightOutcome, path: &Path) -> Result<()> {
    ensure_parent(path)?;
    let backend = SVGBackend::new(path, CANVAS_SIZE);
    draw_difference_chart(backend.into_drawing_area(), outcome)
}

fn draw_distribution_chart<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    outcome: &ReweightOutcome,
    bins: usize,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let chart_area = split_title(root, "Target-model energy distributions")?;

    let range = shared_range(
        outcome
            .target_energy
            .iter()
            .chain(outcome.direct_energy.iter())
            .copied(),
    );
    let reweighted = histogram_density(&outcome.target_energy, range, bins);
    let direct = histogram_density(&outcome.direct_energy, range, bins);

    let peak = reweighted
        .iter()
        .chain(direct.iter())
        .map(|&(_, density)| density)
        .fold(0.0_f64, f64::max);
    let y_upper = if peak > 0.0 { peak * 1.08 } else { 1.0 };

    let mut chart = ChartBuilder::on(&chart_area)
        .margin_left(52)
        .margin_right(18)
        .margin_bottom(40)
        .margin_top(6)
        .set_label_area_size(LabelAreaPosition::Left, 58)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(range.0..range.1, 0.0..y_upper)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("target energy (kJ/mol)")
        .y_desc("probability density")
        .x_label_formatter(&|value| format_decimal_tick(*value))
        .y_label_formatter(&|value| format_decimal_tick(*value))
        .label_style(("sans-serif", 18))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            step_points(&reweighted),
            Palette99::pick(0).stroke_width(2),
        ))?
        .label("reweighting trajectory")
        .legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 18, y)], Palette99::pick(0).stroke_width(2))
        });

    chart
        .draw_series(LineSeries::new(
            step_points(&direct),
            Palette99::pick(4).stroke_width(2),
        ))?
        .label("direct simulation")
        .legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 18, y)], Palette99::pick(4).stroke_width(2))
        });

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .label_font(("sans-serif", 16))
        .draw()?;

    chart.draw_series(std::iter::once(PathElement::new(
        frame_points(range.0, range.1, 0.0, y_upper),
        &BLACK,
    )))?;

    chart_area
        .present()
        .map_err(|e| anyhow!("Failed to render distribution chart: {:?}", e))?;
    Ok(())
}

fn draw_weights_chart<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    outcome: &ReweightOutcome,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let chart_area = split_title(root, "Target-state sample weights")?;

    let count = outcome.weights.len();
    let uniform = 1.0 / count as f64;
    let (y_lower, y_upper) = padded_range(
        outcome
            .weights
            .iter()
            .copied()
            .chain(std::iter::once(uniform)),
    );
    let x_upper = (count.max(2) - 1) as f64;

    let mut chart = ChartBuilder::on(&chart_area)
        .margin_left(52)
        .margin_right(18)
        .margin_bottom(40)
        .margin_top(6)
        .set_label_area_size(LabelAreaPosition::Left, 58)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(0.0..x_upper, y_lower..y_upper)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("sample")
        .y_desc("weight")
        .y_label_formatter(&|value| format_decimal_tick(*value))
        .label_style(("sans-serif", 18))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            outcome
                .weights
                .iter()
                .enumerate()
                .map(|(n, &w)| (n as f64, w)),
            &BLACK,
        ))?
        .label("MBAR weight")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], BLACK.stroke_width(2)));

    chart
        .draw_series(LineSeries::new(
            [(0.0, uniform), (x_upper, uniform)],
            Palette99::pick(4).stroke_width(2),
        ))?
        .label("uniform 1/N")
        .legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 18, y)], Palette99::pick(4).stroke_width(2))
        });

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .label_font(("sans-serif", 16))
        .draw()?;

    chart.draw_series(std::iter::once(PathElement::new(
        frame_points(0.0, x_upper, y_lower, y_upper),
        &BLACK,
    )))?;

    chart_area
        .present()
        .map_err(|e| anyhow!("Failed to render weights chart: {:?}", e))?;
    Ok(())
}

fn draw_convergence_chart<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    outcome: &ReweightOutcome,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let chart_area = split_title(root, "Reweighted estimate convergence")?;

    let count = outcome.cumulative.len();
    let (y_lower, y_upper) = padded_range(
        outcome
            .cumulative
            .iter()
            .copied()
            .chain(std::iter::once(outcome.direct.mean)),
    );
    let x_upper = count.max(2) as f64;

    let mut chart = ChartBuilder::on(&chart_area)
        .margin_left(52)
        .margin_right(18)
        .margin_bottom(40)
        .margin_top(6)
        .set_label_area_size(LabelAreaPosition::Left, 58)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(1.0..x_upper, y_lower..y_upper)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("samples used")
        .y_desc("⟨U₀⟩ (kJ/mol)")
        .y_label_formatter(&|value| format_decimal_tick(*value))
        .label_style(("sans-serif", 18))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            outcome
                .cumulative
                .iter()
                .enumerate()
                .map(|(n, &value)| ((n + 1) as f64, value)),
            &BLACK,
        ))?
        .label("cumulative reweighted")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], BLACK.stroke_width(2)));

    chart
        .draw_series(LineSeries::new(
            [(1.0, outcome.direct.mean), (x_upper, outcome.direct.mean)],
            Palette99::pick(4).stroke_width(2),
        ))?
        .label("direct simulation mean")
        .legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 18, y)], Palette99::pick(4).stroke_width(2))
        });

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .label_font(("sans-serif", 16))
        .draw()?;

    chart.draw_series(std::iter::once(PathElement::new(
        frame_points(1.0, x_upper, y_lower, y_upper),
        &BLACK,
    )))?;

    chart_area
        .present()
        .map_err(|e| anyhow!("Failed to render convergence chart: {:?}", e))?;
    Ok(())
}

fn draw_difference_chart<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    outcome: &ReweightOutcome,
) -> Result<()>
where
    DB::ErrorType: 'static,
{
    let chart_area = split_title(root, "Per-sample energy difference")?;

    let differences: Vec<f64> = outcome
        .target_energy
        .iter()
        .zip(outcome.reference_energy.iter())
        .map(|(target, reference)| target - reference)
        .collect();
    let mean = differences.iter().sum::<f64>() / differences.len() as f64;

    let (y_lower, y_upper) =
        padded_range(differences.iter().copied().chain(std::iter::once(mean)));
    let x_upper = (differences.len().max(2) - 1) as f64;

    let mut chart = ChartBuilder::on(&chart_area)
        .margin_left(52)
        .margin_right(18)
        .margin_bottom(40)
        .margin_top(6)
        .set_label_area_size(LabelAreaPosition::Left, 58)
        .set_label_area_size(LabelAreaPosition::Bottom, 45)
        .build_cartesian_2d(0.0..x_upper, y_lower..y_upper)?;

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("sample")
        .y_desc("U₀ − U_ref (kJ/mol)")
        .y_label_formatter(&|value| format_decimal_tick(*value))
        .label_style(("sans-serif", 18))
        .axis_desc_style(("sans-serif", 20))
        .draw()?;

    chart
        .draw_series(LineSeries::new(
            differences
                .iter()
                .enumerate()
                .map(|(n, &value)| (n as f64, value)),
            &BLACK,
        ))?
        .label("U₀ − U_ref")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 18, y)], BLACK.stroke_width(2)));

    chart
        .draw_series(LineSeries::new(
            [(0.0, mean), (x_upper, mean)],
            Palette99::pick(4).stroke_width(2),
        ))?
        .label("mean difference")
        .legend(|(x, y)| {
            PathElement::new(vec![(x, y), (x + 18, y)], Palette99::pick(4).stroke_width(2))
        });

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperRight)
        .background_style(&WHITE.mix(0.85))
        .border_style(&BLACK)
        .label_font(("sans-serif", 16))
        .draw()?;

    chart.draw_series(std::iter::once(PathElement::new(
        frame_points(0.0, x_upper, y_lower, y_upper),
        &BLACK,
    )))?;

    chart_area
        .present()
        .map_err(|e| anyhow!("Failed to render difference chart: {:?}", e))?;
    Ok(())
}

fn split_title<DB: DrawingBackend>(
    root: DrawingArea<DB, Shift>,
    title: &str,
) -> Result<DrawingArea<DB, Shift>>
where
    DB::ErrorType: 'static,
{
    root.fill(&WHITE)?;
    let (title_area, chart_area) = root.split_vertically(36);
    let style_base = ("sans-serif", 28).into_text_style(&title_area);
    let style = style_base.pos(Pos::new(HPos::Center, VPos::Center));
    let dims = title_area.dim_in_pixel();
    title_area.draw_text(title, &style, (dims.0 as i32 / 2, dims.1 as i32 / 2))?;
    Ok(chart_area)
}

fn frame_points(x_lower: f64, x_upper: f64, y_lower: f64, y_upper: f64) -> Vec<(f64, f64)> {
    vec![
        (x_lower, y_lower),
        (x_upper, y_lower),
        (x_upper, y_upper),
        (x_lower, y_upper),
        (x_lower, y_lower),
    ]
}

/// Common bin range for overlaying histograms of several data sets.
fn shared_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    padded_range(values)
}

fn padded_range(values: impl Iterator<Item = f64>) -> (f64, f64) {
    let (min, max) = min_max(values);
    let span = (max - min).abs();
    let pad = if span < 1e-9 {
        max.abs().max(1.0) * 0.05
    } else {
        span * 0.05
    };
    (min - pad, max + pad)
}

fn min_max<I>(values: I) -> (f64, f64)
where
    I: Iterator<Item = f64>,
{
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;

    for value in values {
        if value < min {
            min = value;
        }
        if value > max {
            max = value;
        }
    }

    if !min.is_finite() || !max.is_finite() {
        return (0.0, 1.0);
    }
    (min, max)
}

/// Bin `values` over `range` and return ((bin start, bin end), density).
fn histogram_density(values: &[f64], range: (f64, f64), bins: usize) -> Vec<((f64, f64), f64)> {
    let (lower, upper) = range;
    let bins = bins.max(1);
    let width = (upper - lower) / bins as f64;
    if values.is_empty() || width <= 0.0 {
        return Vec::new();
    }

    let mut counts = vec![0_usize; bins];
    for &value in values {
        let mut index = ((value - lower) / width).floor() as isize;
        if index < 0 {
            index = 0;
        }
        if index >= bins as isize {
            index = bins as isize - 1;
        }
        counts[index as usize] += 1;
    }

    let norm = values.len() as f64 * width;
    counts
        .iter()
        .enumerate()
        .map(|(i, &count)| {
            let start = lower + i as f64 * width;
            ((start, start + width), count as f64 / norm)
        })
        .collect()
}

fn step_points(bins: &[((f64, f64), f64)]) -> Vec<(f64, f64)> {
    let mut points = Vec::with_capacity(bins.len() * 2);
    for &((start, end), density) in bins {
        points.push((start, density));
        points.push((end, density));
    }
    points
}

fn format_decimal_tick(value: f64) -> String {
    if value.abs() >= 1e4 || (value != 0.0 && value.abs() < 1e-3) {
        format!("{:.1e}", value)
    } else {
        format!("{:.6}", value)
            .trim_end_matches('0')
            .trim_end_matches('.')
            .to_string()
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create plot directory {}", parent.display()))?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn histogram_densities_integrate_to_one() {
        let values = [0.0, 0.5, 1.0, 1.5, 2.0, 2.5, 3.0];
        let bins = histogram_density(&values, (0.0, 3.0), 6);
        assert_eq!(bins.len(), 6);
        let integral: f64 = bins
            .iter()
            .map(|&((start, end), density)| (end - start) * density)
            .sum();
        assert_relative_eq!(integral, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn histogram_clamps_boundary_samples_into_the_last_bin() {
        let bins = histogram_density(&[1.0], (0.0, 1.0), 4);
        assert_relative_eq!(bins[3].1, 4.0, epsilon = 1e-12);
        for bin in &bins[..3] {
            assert_relative_eq!(bin.1, 0.0, epsilon = 1e-12);
        }
    }

    #[test]
    fn step_points_trace_each_bin_edge() {
        let bins = vec![((0.0, 1.0), 0.5), ((1.0, 2.0), 0.25)];
        let points = step_points(&bins);
        assert_eq!(points.len(), 4);
        assert_eq!(points[0], (0.0, 0.5));
        assert_eq!(points[3], (2.0, 0.25));
    }

    #[test]
    fn padded_range_expands_degenerate_spans() {
        let (lower, upper) = padded_range([5.0, 5.0].into_iter());
        assert!(lower < 5.0 && upper > 5.0);
        let (lower, upper) = padded_range(std::iter::empty::<f64>());
        assert!(lower < upper);
    }

    #[test]
    fn decimal_ticks_stay_compact() {
        assert_eq!(format_decimal_tick(0.25), "0.25");
        assert_eq!(format_decimal_tick(0.0), "0");
        assert_eq!(format_decimal_tick(12345.0), "1.2e4");
    }
}

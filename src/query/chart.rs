// Chart rendering with plotters

use std::path::{Path, PathBuf};

use plotters::prelude::*;
use uuid::Uuid;

use super::plan::{ChartSpec, ChartType};
use crate::dataset::{parse_number, DataTable};
use crate::types::{AppError, AppResult};

const WIDTH: u32 = 1000;
const HEIGHT: u32 = 600;

fn chart_err<E: std::fmt::Display>(e: E) -> AppError {
    AppError::Chart(e.to_string())
}

/// Render `spec` over `table` into a new PNG under `output_dir` and return
/// its path. Non-numeric y cells are skipped for lines and drawn as zero-height
/// bars.
pub fn render_chart(table: &DataTable, spec: &ChartSpec, output_dir: &Path) -> AppResult<PathBuf> {
    if table.is_empty() {
        return Err(AppError::Chart("no rows to plot".to_string()));
    }
    if spec.y.is_empty() {
        return Err(AppError::Chart("chart needs at least one y column".to_string()));
    }

    let x_idx = table
        .column_index(&spec.x)
        .ok_or_else(|| AppError::QueryAgent(format!("unknown chart column '{}'", spec.x)))?;
    let labels: Vec<String> = table.column_values(x_idx).map(str::to_string).collect();

    let mut series: Vec<(String, Vec<Option<f64>>)> = Vec::with_capacity(spec.y.len());
    for name in &spec.y {
        let idx = table
            .column_index(name)
            .ok_or_else(|| AppError::QueryAgent(format!("unknown chart column '{}'", name)))?;
        series.push((name.clone(), table.column_values(idx).map(parse_number).collect()));
    }

    let values = series.iter().flat_map(|(_, v)| v.iter().flatten().copied());
    let (min, max) = values.fold((0.0f64, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));
    if !max.is_finite() {
        return Err(AppError::Chart("y columns contain no numeric values".to_string()));
    }
    let pad = ((max - min).abs() * 0.1).max(1.0);
    let y_range = min..(max + pad);

    std::fs::create_dir_all(output_dir)
        .map_err(|e| AppError::Chart(format!("cannot create {}: {}", output_dir.display(), e)))?;
    let path = output_dir.join(format!("chart_{}.png", Uuid::new_v4().simple()));

    let n = labels.len();
    let x_range = -0.5f64..(n as f64 - 0.5);
    let title = spec.title.clone().unwrap_or_else(|| spec.y.join(" / "));

    {
        let root = BitMapBackend::new(&path, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE).map_err(chart_err)?;

        let mut chart = ChartBuilder::on(&root)
            .margin(20)
            .caption(&title, ("sans-serif", 24))
            .x_label_area_size(50)
            .y_label_area_size(70)
            .build_cartesian_2d(x_range, y_range)
            .map_err(chart_err)?;

        let label_fmt = |x: &f64| {
            let rounded = x.round();
            if (x - rounded).abs() < 1e-6 && rounded >= 0.0 {
                labels.get(rounded as usize).cloned().unwrap_or_default()
            } else {
                String::new()
            }
        };

        chart
            .configure_mesh()
            .x_labels(n.min(12))
            .x_label_formatter(&label_fmt)
            .x_desc(spec.x.as_str())
            .draw()
            .map_err(chart_err)?;

        let bar_width = 0.8 / series.len() as f64;
        for (k, (name, points)) in series.iter().enumerate() {
            let color = Palette99::pick(k).to_rgba();
            match spec.chart_type {
                ChartType::Line => {
                    chart
                        .draw_series(LineSeries::new(
                            points
                                .iter()
                                .enumerate()
                                .filter_map(|(i, v)| v.map(|v| (i as f64, v))),
                            color.stroke_width(2),
                        ))
                        .map_err(chart_err)?
                        .label(name.as_str())
                        .legend(move |(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], color));
                }
                ChartType::Bar => {
                    chart
                        .draw_series(points.iter().enumerate().map(|(i, v)| {
                            let left = i as f64 - 0.4 + k as f64 * bar_width;
                            Rectangle::new([(left, 0.0), (left + bar_width, v.unwrap_or(0.0))], color.filled())
                        }))
                        .map_err(chart_err)?
                        .label(name.as_str())
                        .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
                }
            }
        }

        chart
            .configure_series_labels()
            .background_style(WHITE.mix(0.8))
            .border_style(BLACK)
            .draw()
            .map_err(chart_err)?;

        root.present().map_err(chart_err)?;
    }

    Ok(path)
}

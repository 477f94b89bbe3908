//! Daily average temperature chart rendered to inline SVG

use anyhow::Result;
use plotters::prelude::*;

use crate::dashboard::DailyAverage;

const WIDTH: u32 = 900;
const HEIGHT: u32 = 420;

/// Line chart of one point per day; empty string when there is nothing to plot
pub fn temperature_chart(location_name: &str, points: &[DailyAverage]) -> Result<String> {
    if points.is_empty() {
        return Ok(String::new());
    }

    let (min_temp, max_temp) = points.iter().fold(
        (f64::INFINITY, f64::NEG_INFINITY),
        |(min, max), point| (min.min(point.temperature), max.max(point.temperature)),
    );
    // Pad the y-axis so flat series still get a visible band
    let y_padding = if (max_temp - min_temp).abs() > 1e-6 {
        (max_temp - min_temp) * 0.1
    } else {
        1.0
    };
    let x_end = points.len() as f64 - 0.5;

    let mut svg = String::new();
    {
        let root = SVGBackend::with_string(&mut svg, (WIDTH, HEIGHT)).into_drawing_area();
        root.fill(&WHITE)?;

        let caption = format!("Average Daily Temperature for {location_name}");
        let mut chart = ChartBuilder::on(&root)
            .caption(caption, ("sans-serif", 20))
            .margin(12)
            .x_label_area_size(40)
            .y_label_area_size(50)
            .build_cartesian_2d(-0.5..x_end, (min_temp - y_padding)..(max_temp + y_padding))?;

        let label_for = |x: &f64| {
            let index = x.round();
            if index < 0.0 || (x - index).abs() > 0.01 {
                return String::new();
            }
            points
                .get(index as usize)
                .map(|point| point.date.format("%m-%d").to_string())
                .unwrap_or_default()
        };

        chart
            .configure_mesh()
            .x_desc("Date")
            .y_desc("Temperature (°C)")
            .x_labels(points.len().min(12))
            .x_label_formatter(&label_for)
            .light_line_style(BLACK.mix(0.15))
            .draw()?;

        chart.draw_series(LineSeries::new(
            points
                .iter()
                .enumerate()
                .map(|(i, point)| (i as f64, point.temperature)),
            &BLUE,
        ))?;
        chart.draw_series(
            points
                .iter()
                .enumerate()
                .map(|(i, point)| Circle::new((i as f64, point.temperature), 3, BLUE.filled())),
        )?;

        root.present()?;
    }

    Ok(svg)
}

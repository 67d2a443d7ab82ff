//! PNG rendering of training curves and confusion matrices.

use std::ops::Range;
use std::path::Path;

use plotters::prelude::*;
use plotters::style::text_anchor::{HPos, Pos, VPos};

use crate::metrics::ConfusionMatrix;
use crate::training::History;
use crate::EmotionError;

const HISTORY_SIZE: (u32, u32) = (1200, 400);
const CONFUSION_SIZE: (u32, u32) = (800, 600);

const TRAIN_COLOR: RGBColor = RGBColor(31, 119, 180);
const VALID_COLOR: RGBColor = RGBColor(255, 127, 14);

fn plot_err<E: std::fmt::Display>(err: E) -> EmotionError {
    EmotionError::Plot(err.to_string())
}

fn prepare_output(path: &Path) -> crate::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    Ok(())
}

/// Y range covering every value of `series` with 10% headroom, never empty
pub(crate) fn value_range(series: &[&[f64]]) -> Range<f64> {
    let (lo, hi) = series
        .iter()
        .flat_map(|s| s.iter().copied())
        .filter(|v| v.is_finite())
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
            (lo.min(v), hi.max(v))
        });

    if lo > hi {
        return 0.0..1.0;
    }

    let lo = lo.min(0.0);
    let span = (hi - lo).max(1e-3);
    lo..hi + span * 0.1
}

/// Sequential white-to-blue palette, `intensity` clamped to [0, 1]
pub(crate) fn blues(intensity: f64) -> RGBColor {
    const LIGHT: (f64, f64, f64) = (247.0, 251.0, 255.0);
    const DARK: (f64, f64, f64) = (8.0, 48.0, 107.0);

    let t = if intensity.is_finite() {
        intensity.clamp(0.0, 1.0)
    } else {
        0.0
    };
    let mix = |a: f64, b: f64| (a + (b - a) * t).round() as u8;

    RGBColor(mix(LIGHT.0, DARK.0), mix(LIGHT.1, DARK.1), mix(LIGHT.2, DARK.2))
}

/// Annotation colour readable on top of `blues(intensity)`
pub(crate) fn annotation_color(intensity: f64) -> RGBColor {
    if intensity > 0.5 {
        WHITE
    } else {
        BLACK
    }
}

fn draw_curves<DB: DrawingBackend>(
    area: &DrawingArea<DB, plotters::coord::Shift>,
    title: &str,
    y_desc: &str,
    train: &[f64],
    valid: &[f64],
    y_range: Range<f64>,
) -> crate::Result<()> {
    let epochs = train.len().max(valid.len()).max(2);

    let mut chart = ChartBuilder::on(area)
        .margin(10)
        .caption(title, ("sans-serif", 20))
        .set_label_area_size(LabelAreaPosition::Left, 50)
        .set_label_area_size(LabelAreaPosition::Bottom, 40)
        .build_cartesian_2d(1f64..epochs as f64, y_range)
        .map_err(plot_err)?;

    chart
        .configure_mesh()
        .x_desc("Epoch")
        .y_desc(y_desc)
        .draw()
        .map_err(plot_err)?;

    let series = [("Train", train, TRAIN_COLOR), ("Validation", valid, VALID_COLOR)];
    for (label, values, color) in series {
        chart
            .draw_series(LineSeries::new(
                values.iter().enumerate().map(|(i, v)| ((i + 1) as f64, *v)),
                color.stroke_width(2),
            ))
            .map_err(plot_err)?
            .label(label)
            .legend(move |(x, y)| {
                PathElement::new(vec![(x, y), (x + 20, y)], color.stroke_width(2))
            });
    }

    chart
        .configure_series_labels()
        .position(SeriesLabelPosition::UpperLeft)
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()
        .map_err(plot_err)?;

    Ok(())
}

/// Accuracy (left) and loss (right) per epoch for training and validation
pub fn plot_training_history<P: AsRef<Path>>(history: &History, path: P) -> crate::Result<()> {
    if history.epochs() == 0 {
        return Err(EmotionError::Plot("history has no epochs".to_string()));
    }

    let path = path.as_ref();
    prepare_output(path)?;

    let root = BitMapBackend::new(path, HISTORY_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let panels = root.split_evenly((1, 2));

    draw_curves(
        &panels[0],
        "Model Accuracy",
        "Accuracy",
        &history.train_accuracy,
        &history.val_accuracy,
        0.0..1.0,
    )?;
    draw_curves(
        &panels[1],
        "Model Loss",
        "Loss",
        &history.train_loss,
        &history.val_loss,
        value_range(&[history.train_loss.as_slice(), history.val_loss.as_slice()]),
    )?;

    root.present().map_err(plot_err)?;
    log::info!("Saved training history plot to {:?}", path);

    Ok(())
}

/// Annotated heat map, true classes on rows and predictions on columns
pub fn plot_confusion_matrix<P: AsRef<Path>>(
    matrix: &ConfusionMatrix,
    class_names: &[String],
    path: P,
) -> crate::Result<()> {
    let n = matrix.num_classes();
    if n == 0 || class_names.len() != n {
        return Err(EmotionError::Plot(format!(
            "{} class names for a {}x{} confusion matrix",
            class_names.len(),
            n,
            n
        )));
    }

    let path = path.as_ref();
    prepare_output(path)?;

    let root = BitMapBackend::new(path, CONFUSION_SIZE).into_drawing_area();
    root.fill(&WHITE).map_err(plot_err)?;

    let mut chart = ChartBuilder::on(&root)
        .margin(10)
        .caption("Confusion Matrix", ("sans-serif", 24))
        .set_label_area_size(LabelAreaPosition::Left, 90)
        .set_label_area_size(LabelAreaPosition::Bottom, 60)
        .build_cartesian_2d((0..n - 1).into_segmented(), (0..n - 1).into_segmented())
        .map_err(plot_err)?;

    // integer ranges are inclusive, so 0..n-1 gives n segments; first class at the top
    let row_at = |y: usize| n - 1 - y;
    let name_of = |value: &SegmentValue<usize>, flip: bool| match value {
        SegmentValue::CenterOf(i) if *i < n => {
            class_names[if flip { row_at(*i) } else { *i }].clone()
        }
        _ => String::new(),
    };

    chart
        .configure_mesh()
        .disable_mesh()
        .x_desc("Predicted")
        .y_desc("True")
        .x_labels(n)
        .y_labels(n)
        .x_label_formatter(&|v| name_of(v, false))
        .y_label_formatter(&|v| name_of(v, true))
        .draw()
        .map_err(plot_err)?;

    let max = matrix.max_count().max(1) as f64;
    let cells: Vec<(usize, usize, usize)> = (0..n)
        .flat_map(|row| (0..n).map(move |col| (row, col)))
        .map(|(row, col)| (row, col, matrix.get(row, col)))
        .collect();

    chart
        .draw_series(cells.iter().map(|&(row, col, count)| {
            let y = row_at(row);
            Rectangle::new(
                [
                    (SegmentValue::Exact(col), SegmentValue::Exact(y)),
                    (SegmentValue::Exact(col + 1), SegmentValue::Exact(y + 1)),
                ],
                blues(count as f64 / max).filled(),
            )
        }))
        .map_err(plot_err)?;

    chart
        .draw_series(cells.iter().map(|&(row, col, count)| {
            let style = ("sans-serif", 16)
                .into_font()
                .color(&annotation_color(count as f64 / max))
                .pos(Pos::new(HPos::Center, VPos::Center));
            Text::new(
                count.to_string(),
                (SegmentValue::CenterOf(col), SegmentValue::CenterOf(row_at(row))),
                style,
            )
        }))
        .map_err(plot_err)?;

    root.present().map_err(plot_err)?;
    log::info!("Saved confusion matrix plot to {:?}", path);

    Ok(())
}

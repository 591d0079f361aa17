use ndarray::Array2;
use std::str::FromStr;
use tracing::trace;

use crate::{invalid, BBox, Result, VisionError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverlapMode {
    /// intersection over union
    #[default]
    Iou,
    /// intersection over the first box ("foreground")
    Iof,
}

impl OverlapMode {
    pub fn score(self, a: &BBox, b: &BBox) -> f32 {
        match self {
            OverlapMode::Iou => a.iou(b),
            OverlapMode::Iof => a.iof(b),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            OverlapMode::Iou => "iou",
            OverlapMode::Iof => "iof",
        }
    }
}

impl FromStr for OverlapMode {
    type Err = VisionError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "iou" => Ok(OverlapMode::Iou),
            "iof" => Ok(OverlapMode::Iof),
            other => Err(invalid(format!("unknown overlap mode: {other} (expected iou|iof)"))),
        }
    }
}

/// Overlap between two box sets.
///
/// Unaligned: every box of `boxes1` against every box of `boxes2`, shape `(m, n)`.
/// Aligned: `boxes1[i]` against `boxes2[i]` only, shape `(m, 1)`; both sets must
/// have the same length.
///
/// Empty inputs are fine and give a correctly shaped empty matrix. Pairs that
/// do not intersect score exactly `0.0`, including fully degenerate pairs whose
/// denominator would otherwise be zero.
pub fn bbox_overlaps(
    boxes1: &[BBox],
    boxes2: &[BBox],
    mode: OverlapMode,
    aligned: bool,
) -> Result<Array2<f32>> {
    let rows = boxes1.len();
    let cols = boxes2.len();
    if aligned && rows != cols {
        return Err(invalid(format!(
            "aligned overlap needs equal set sizes, got {rows} and {cols}"
        )));
    }

    let shape = if aligned { (rows, 1) } else { (rows, cols) };
    if rows * cols == 0 {
        return Ok(Array2::zeros(shape));
    }

    let out = if aligned {
        Array2::from_shape_fn(shape, |(i, _)| mode.score(&boxes1[i], &boxes2[i]))
    } else {
        Array2::from_shape_fn(shape, |(i, j)| mode.score(&boxes1[i], &boxes2[j]))
    };

    trace!(rows, cols, aligned, mode = mode.as_str(), "overlap computed");
    Ok(out)
}

use serde::{Deserialize, Serialize};

/// Axis-aligned box in pixel corners `(x1, y1, x2, y2)`.
///
/// Both corners are inclusive, so a box covers `x2 - x1 + 1` columns.
/// Inverted boxes (`x2 < x1`) are allowed and simply never overlap anything.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BBox {
    pub const fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1 + 1.0
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1 + 1.0
    }

    /// Inclusive-pixel area. Negative for boxes inverted on exactly one axis.
    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    pub fn intersection_area(&self, other: &BBox) -> f32 {
        let lt_x = self.x1.max(other.x1);
        let lt_y = self.y1.max(other.y1);
        let rb_x = self.x2.min(other.x2);
        let rb_y = self.y2.min(other.y2);

        let w = (rb_x - lt_x + 1.0).max(0.0);
        let h = (rb_y - lt_y + 1.0).max(0.0);
        w * h
    }

    /// Intersection over union. `0.0` whenever the boxes do not intersect.
    pub fn iou(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter == 0.0 {
            return 0.0;
        }
        inter / (self.area() + other.area() - inter)
    }

    /// Intersection over `self`'s own area (the "foreground").
    pub fn iof(&self, other: &BBox) -> f32 {
        let inter = self.intersection_area(other);
        if inter == 0.0 {
            return 0.0;
        }
        inter / self.area()
    }
}

impl From<[f32; 4]> for BBox {
    fn from(v: [f32; 4]) -> Self {
        Self::new(v[0], v[1], v[2], v[3])
    }
}

impl From<BBox> for [f32; 4] {
    fn from(b: BBox) -> Self {
        [b.x1, b.y1, b.x2, b.y2]
    }
}

//! Letterbox preprocessing: BGR frame in, normalized RGB canvas of a fixed
//! shape out, with boxes carried into the canvas coordinate space.

use image::{imageops, ImageBuffer, Rgb, Rgb32FImage};
use tracing::debug;

use crate::{invalid, BBox, Result};

/// Fill value of the letterbox border, on the 0..255 scale.
pub const PAD_VALUE: f32 = 128.0;

/// Borrowed interleaved `height x width x 3` frame in blue-green-red order.
///
/// `S` is the sample type, typically `u8` straight from a capture device or
/// `f32` already on the 0..255 scale.
#[derive(Debug, Clone, Copy)]
pub struct BgrFrame<'a, S> {
    width: u32,
    height: u32,
    data: &'a [S],
}

impl<'a, S: Copy + Into<f32>> BgrFrame<'a, S> {
    pub fn new(width: u32, height: u32, data: &'a [S]) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(invalid(format!("frame must be non-empty, got {width}x{height}")));
        }
        let need = width as usize * height as usize * 3;
        if data.len() != need {
            return Err(invalid(format!(
                "frame buffer has {} samples, {width}x{height}x3 needs {need}",
                data.len()
            )));
        }
        Ok(Self { width, height, data })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Swap to RGB and promote to `f32` in 0..1.
    ///
    /// Bilinear resampling is linear in the sample values, so dividing by 255
    /// here equals dividing the resized canvas.
    fn to_rgb_unit(&self) -> Rgb32FImage {
        let w = self.width as usize;
        ImageBuffer::from_fn(self.width, self.height, |x, y| {
            let i = (y as usize * w + x as usize) * 3;
            let px = &self.data[i..i + 3];
            let (b, g, r): (f32, f32, f32) = (px[0].into(), px[1].into(), px[2].into());
            Rgb([r / 255.0, g / 255.0, b / 255.0])
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetShape {
    pub height: u32,
    pub width: u32,
}

impl TargetShape {
    pub fn new(height: u32, width: u32) -> Result<Self> {
        let t = Self { height, width };
        t.validate()?;
        Ok(t)
    }

    pub fn validate(&self) -> Result<()> {
        if self.height == 0 || self.width == 0 {
            return Err(invalid(format!(
                "target shape must be positive, got {}x{} (h x w)",
                self.height, self.width
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxOptions {
    /// Preserve aspect ratio and pad; otherwise stretch to the target.
    pub keep_ratio: bool,
    /// Return the input boxes mapped into the output image.
    pub correct_boxes: bool,
    pub pad_value: f32,
}

impl Default for LetterboxOptions {
    fn default() -> Self {
        Self { keep_ratio: true, correct_boxes: true, pad_value: PAD_VALUE }
    }
}

/// Geometry of one preprocessing call.
///
/// Ratios are kept in `f64`; box coordinates are mapped in `f64` and rounded
/// to `f32` once.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LetterboxMeta {
    pub ratio_x: f64,
    pub ratio_y: f64,
    pub resized_width: u32,
    pub resized_height: u32,
    pub dw: u32,
    pub dh: u32,
}

impl LetterboxMeta {
    /// Source coordinates -> output canvas coordinates.
    pub fn map_box(&self, b: &BBox) -> BBox {
        let fx = |v: f32| (f64::from(v) * self.ratio_x + f64::from(self.dw)) as f32;
        let fy = |v: f32| (f64::from(v) * self.ratio_y + f64::from(self.dh)) as f32;
        BBox::new(fx(b.x1), fy(b.y1), fx(b.x2), fy(b.y2))
    }

    /// Output canvas coordinates -> source coordinates, e.g. for detections
    /// produced on the letterboxed image.
    pub fn unmap_box(&self, b: &BBox) -> BBox {
        let fx = |v: f32| ((f64::from(v) - f64::from(self.dw)) / self.ratio_x) as f32;
        let fy = |v: f32| ((f64::from(v) - f64::from(self.dh)) / self.ratio_y) as f32;
        BBox::new(fx(b.x1), fy(b.y1), fx(b.x2), fy(b.y2))
    }
}

#[derive(Debug, Clone)]
pub struct Letterboxed {
    /// RGB, values in 0..1, exactly the target shape.
    pub image: Rgb32FImage,
    /// `Some` iff `correct_boxes` was requested.
    pub boxes: Option<Vec<BBox>>,
    pub meta: LetterboxMeta,
}

pub fn preprocess<S: Copy + Into<f32>>(
    frame: &BgrFrame<'_, S>,
    boxes: Option<&[BBox]>,
    target: TargetShape,
    opts: LetterboxOptions,
) -> Result<Letterboxed> {
    target.validate()?;
    let (w_org, h_org) = (frame.width, frame.height);
    let (w_t, h_t) = (target.width, target.height);
    let rgb = frame.to_rgb_unit();

    let (image, meta) = if opts.keep_ratio {
        let ratio = (f64::from(w_t) / f64::from(w_org)).min(f64::from(h_t) / f64::from(h_org));
        let resize_w = ((ratio * f64::from(w_org)).round() as u32).clamp(1, w_t);
        let resize_h = ((ratio * f64::from(h_org)).round() as u32).clamp(1, h_t);
        let resized = resize_linear(rgb, resize_w, resize_h);

        let pad = opts.pad_value / 255.0;
        let mut canvas = Rgb32FImage::from_pixel(w_t, h_t, Rgb([pad, pad, pad]));
        // integer division truncates, matching the box offsets below
        let dw = (w_t - resize_w) / 2;
        let dh = (h_t - resize_h) / 2;
        imageops::replace(&mut canvas, &resized, i64::from(dw), i64::from(dh));

        let meta = LetterboxMeta {
            ratio_x: ratio,
            ratio_y: ratio,
            resized_width: resize_w,
            resized_height: resize_h,
            dw,
            dh,
        };
        (canvas, meta)
    } else {
        let image = resize_linear(rgb, w_t, h_t);
        let meta = LetterboxMeta {
            ratio_x: f64::from(w_t) / f64::from(w_org),
            ratio_y: f64::from(h_t) / f64::from(h_org),
            resized_width: w_t,
            resized_height: h_t,
            dw: 0,
            dh: 0,
        };
        (image, meta)
    };

    debug!(
        src = format!("{}x{}", w_org, h_org),
        dst = format!("{}x{}", w_t, h_t),
        resized = format!("{}x{}", meta.resized_width, meta.resized_height),
        dw = meta.dw,
        dh = meta.dh,
        keep_ratio = opts.keep_ratio,
        "letterbox"
    );

    let boxes = opts
        .correct_boxes
        .then(|| boxes.unwrap_or_default().iter().map(|b| meta.map_box(b)).collect());

    Ok(Letterboxed { image, boxes, meta })
}

/// One output row/column: the two source taps and the weight of the second.
#[derive(Debug, Clone, Copy)]
struct Tap {
    i0: u32,
    i1: u32,
    frac: f32,
}

/// Half-pixel-centre taps: source `(d + 0.5) * src / dst - 0.5`, clamped to
/// the edge pixels. Same convention as OpenCV `INTER_LINEAR`.
fn taps(src: u32, dst: u32) -> Vec<Tap> {
    let scale = f64::from(src) / f64::from(dst);
    let last = f64::from(src - 1);
    (0..dst)
        .map(|d| {
            let s = ((f64::from(d) + 0.5) * scale - 0.5).clamp(0.0, last);
            let i0 = s.floor() as u32;
            Tap { i0, i1: (i0 + 1).min(src - 1), frac: (s - f64::from(i0)) as f32 }
        })
        .collect()
}

/// Bilinear resize. Unlike `imageops::resize` with `FilterType::Triangle`,
/// the kernel does not widen when downscaling.
fn resize_linear(img: Rgb32FImage, w: u32, h: u32) -> Rgb32FImage {
    if img.dimensions() == (w, h) {
        return img;
    }
    let xs = taps(img.width(), w);
    let ys = taps(img.height(), h);
    let lerp = |a: f32, b: f32, t: f32| a + (b - a) * t;

    ImageBuffer::from_fn(w, h, |x, y| {
        let (tx, ty) = (xs[x as usize], ys[y as usize]);
        let p00 = img.get_pixel(tx.i0, ty.i0).0;
        let p01 = img.get_pixel(tx.i1, ty.i0).0;
        let p10 = img.get_pixel(tx.i0, ty.i1).0;
        let p11 = img.get_pixel(tx.i1, ty.i1).0;
        Rgb(std::array::from_fn(|c| {
            let top = lerp(p00[c], p01[c], tx.frac);
            let bottom = lerp(p10[c], p11[c], tx.frac);
            lerp(top, bottom, ty.frac)
        }))
    })
}

//! Mask-guided inpainting
//!
//! [`TeleaInpainter`] implements the fast marching method of A. Telea,
//! "An Image Inpainting Technique Based on the Fast Marching Method" (2004).
//! Masked pixels are filled in order of increasing distance from the mask
//! boundary; each is estimated from already known pixels within the radius,
//! weighted by direction, distance and level-set proximity.

use crate::error::{ObjRemovalError, Result};
use crate::types::Mask;
use image::{GrayImage, Rgb, RgbImage};
use imageproc::distance_transform::Norm;
use imageproc::morphology::dilate;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Neighborhood radius used for every frame
pub const INPAINT_RADIUS: u32 = 3;

/// Fills masked regions of a frame
pub trait Inpainter {
    /// Return a copy of `frame` with every masked pixel synthesized.
    ///
    /// Pixels outside the mask are returned unchanged.
    ///
    /// # Errors
    /// - Mask and frame dimensions differ
    fn inpaint(&self, frame: &RgbImage, mask: &Mask) -> Result<RgbImage>;
}

const KNOWN: u8 = 0;
const BAND: u8 = 1;
const INSIDE: u8 = 2;
const CHANGE: u8 = 3;

const FAR: f32 = 1.0e6;

/// Narrow-band entry ordered by smallest arrival time first
#[derive(Debug, Clone, Copy, PartialEq)]
struct Front {
    t: f32,
    x: u32,
    y: u32,
}

impl Eq for Front {}

impl Ord for Front {
    fn cmp(&self, other: &Self) -> Ordering {
        other
            .t
            .total_cmp(&self.t)
            .then_with(|| (other.y, other.x).cmp(&(self.y, self.x)))
    }
}

impl PartialOrd for Front {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

/// Per-pixel state and arrival time of the marching front
struct Field {
    width: u32,
    height: u32,
    flags: Vec<u8>,
    t: Vec<f32>,
}

impl Field {
    fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width,
            height,
            flags: vec![KNOWN; len],
            t: vec![FAR; len],
        }
    }

    fn index(&self, x: i64, y: i64) -> Option<usize> {
        if x >= 0 && y >= 0 && x < i64::from(self.width) && y < i64::from(self.height) {
            Some(y as usize * self.width as usize + x as usize)
        } else {
            None
        }
    }

    /// Out-of-frame positions count as unknown
    fn flag(&self, x: i64, y: i64) -> u8 {
        self.index(x, y)
            .and_then(|i| self.flags.get(i).copied())
            .unwrap_or(INSIDE)
    }

    fn time(&self, x: i64, y: i64) -> f32 {
        self.index(x, y)
            .and_then(|i| self.t.get(i).copied())
            .unwrap_or(FAR)
    }

    fn set(&mut self, x: u32, y: u32, flag: u8, t: f32) {
        if let Some(i) = self.index(i64::from(x), i64::from(y)) {
            if let Some(f) = self.flags.get_mut(i) {
                *f = flag;
            }
            if let Some(v) = self.t.get_mut(i) {
                *v = t;
            }
        }
    }

    fn set_flag(&mut self, x: u32, y: u32, flag: u8) {
        let t = self.time(i64::from(x), i64::from(y));
        self.set(x, y, flag, t);
    }

    /// First-order upwind solution of |∇T| = 1 from one vertical and one horizontal neighbor
    fn solve(&self, (x1, y1): (i64, i64), (x2, y2): (i64, i64)) -> f32 {
        let known1 = self.flag(x1, y1) != INSIDE;
        let known2 = self.flag(x2, y2) != INSIDE;
        let (a, b) = (self.time(x1, y1), self.time(x2, y2));
        match (known1, known2) {
            (true, true) => {
                if (a - b).abs() >= 1.0 {
                    1.0 + a.min(b)
                } else {
                    let d = a - b;
                    (a + b + (2.0 - d * d).sqrt()) * 0.5
                }
            },
            (true, false) => 1.0 + a,
            (false, true) => 1.0 + b,
            (false, false) => FAR,
        }
    }

    fn arrival(&self, x: i64, y: i64) -> f32 {
        let up = (x, y - 1);
        let down = (x, y + 1);
        let left = (x - 1, y);
        let right = (x + 1, y);
        self.solve(up, left)
            .min(self.solve(down, left))
            .min(self.solve(up, right))
            .min(self.solve(down, right))
    }

    /// One-sided or central difference along an axis, skipping unknown samples
    fn gradient<F: Fn(i64, i64) -> f32>(&self, x: i64, y: i64, (dx, dy): (i64, i64), value: F) -> f32 {
        let (nx, ny) = (x + dx, y + dy);
        let (px, py) = (x - dx, y - dy);
        match (self.flag(nx, ny) != INSIDE, self.flag(px, py) != INSIDE) {
            (true, true) => (value(nx, ny) - value(px, py)) * 0.5,
            (true, false) => value(nx, ny) - value(x, y),
            (false, true) => value(x, y) - value(px, py),
            (false, false) => 0.0,
        }
    }

    fn neighbors(x: u32, y: u32) -> [(i64, i64); 4] {
        let (x, y) = (i64::from(x), i64::from(y));
        [(x, y - 1), (x - 1, y), (x, y + 1), (x + 1, y)]
    }
}

/// Telea fast-marching inpainter
#[derive(Debug, Clone, Copy)]
pub struct TeleaInpainter {
    radius: u32,
}

impl Default for TeleaInpainter {
    fn default() -> Self {
        Self {
            radius: INPAINT_RADIUS,
        }
    }
}

impl TeleaInpainter {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inpainter with a custom neighborhood radius
    ///
    /// # Errors
    /// - Zero radius
    pub fn with_radius(radius: u32) -> Result<Self> {
        if radius == 0 {
            return Err(ObjRemovalError::config_value_error(
                "inpaint radius",
                radius,
                "at least 1",
                Some(INPAINT_RADIUS),
            ));
        }
        Ok(Self { radius })
    }

    #[must_use]
    pub fn radius(&self) -> u32 {
        self.radius
    }

    /// Known pixels next to the mask (4-connected) seed the front at T = 0
    fn seed_band(mask: &GrayImage) -> GrayImage {
        let mut band = dilate(mask, Norm::L1, 1);
        for (b, m) in band.pixels_mut().zip(mask.pixels()) {
            if m.0[0] != 0 {
                b.0[0] = 0;
            }
        }
        band
    }

    /// March outward from the band so that known pixels near the mask carry
    /// negative distances, giving the level-set weight a meaningful scale.
    fn march_outside(&self, field: &mut Field, mask: &GrayImage, band: &GrayImage) {
        let k = u8::try_from(self.radius).unwrap_or(u8::MAX);
        let ring = dilate(mask, Norm::LInf, k);

        let mut heap = BinaryHeap::new();
        for (x, y, r) in ring.enumerate_pixels() {
            let masked = mask.get_pixel(x, y).0[0] != 0;
            let banded = band.get_pixel(x, y).0[0] != 0;
            if banded {
                field.set(x, y, BAND, 0.0);
                heap.push(Front { t: 0.0, x, y });
            } else if r.0[0] != 0 && !masked {
                field.set(x, y, INSIDE, FAR);
            } else {
                field.set(x, y, KNOWN, FAR);
            }
        }

        while let Some(Front { x, y, .. }) = heap.pop() {
            field.set_flag(x, y, CHANGE);
            for (nx, ny) in Field::neighbors(x, y) {
                if field.flag(nx, ny) == INSIDE && field.index(nx, ny).is_some() {
                    let t = field.arrival(nx, ny);
                    let (ux, uy) = (nx as u32, ny as u32);
                    field.set(ux, uy, BAND, t);
                    heap.push(Front { t, x: ux, y: uy });
                }
            }
        }

        for (flag, t) in field.flags.iter_mut().zip(field.t.iter_mut()) {
            if *flag == CHANGE {
                *flag = KNOWN;
                *t = -*t;
            }
        }
    }

    /// Weighted estimate of one masked pixel from known pixels within the radius
    fn estimate(&self, field: &Field, out: &RgbImage, x: u32, y: u32) -> Option<Rgb<u8>> {
        let (px, py) = (i64::from(x), i64::from(y));
        let t_p = field.time(px, py);
        let time = |qx: i64, qy: i64| field.time(qx, qy);
        let grad_t = (
            field.gradient(px, py, (1, 0), time),
            field.gradient(px, py, (0, 1), time),
        );

        let r = i64::from(self.radius);
        let mut acc = [0.0f32; 3];
        let mut weight_sum = 0.0f32;

        for qy in (py - r)..=(py + r) {
            for qx in (px - r)..=(px + r) {
                let (dx, dy) = (px - qx, py - qy);
                if dx * dx + dy * dy > r * r || field.flag(qx, qy) == INSIDE {
                    continue;
                }
                let len2 = (dx * dx + dy * dy) as f32;
                if len2 == 0.0 {
                    continue;
                }
                let (rx, ry) = (dx as f32, dy as f32);

                let dst = 1.0 / (len2 * len2.sqrt());
                let lev = 1.0 / (1.0 + (field.time(qx, qy) - t_p).abs());
                let mut dir = rx * grad_t.0 + ry * grad_t.1;
                if dir.abs() <= 0.01 {
                    dir = 1.0e-6;
                }
                let w = (dst * lev * dir).abs();

                for (c, slot) in acc.iter_mut().enumerate() {
                    let intensity = |ix: i64, iy: i64| -> f32 {
                        out.get_pixel_checked(ix as u32, iy as u32)
                            .and_then(|p| p.0.get(c).copied())
                            .map_or(0.0, f32::from)
                    };
                    let gx = field.gradient(qx, qy, (1, 0), intensity);
                    let gy = field.gradient(qx, qy, (0, 1), intensity);
                    *slot += w * (intensity(qx, qy) + gx * rx + gy * ry);
                }
                weight_sum += w;
            }
        }

        if weight_sum <= 0.0 {
            return None;
        }
        Some(Rgb(acc.map(|v| (v / weight_sum).round().clamp(0.0, 255.0) as u8)))
    }
}

impl Inpainter for TeleaInpainter {
    fn inpaint(&self, frame: &RgbImage, mask: &Mask) -> Result<RgbImage> {
        if frame.dimensions() != mask.dimensions() {
            return Err(ObjRemovalError::processing(format!(
                "Mask is {}x{} but frame is {}x{}",
                mask.width(),
                mask.height(),
                frame.width(),
                frame.height()
            )));
        }

        let mut out = frame.clone();
        if mask.is_empty() {
            return Ok(out);
        }

        let (width, height) = frame.dimensions();
        let mask_img = mask.as_gray();
        let band = Self::seed_band(mask_img);
        if band.pixels().all(|p| p.0[0] == 0) {
            log::warn!("Mask covers the whole frame; nothing to inpaint from");
            return Ok(out);
        }

        let mut field = Field::new(width, height);
        self.march_outside(&mut field, mask_img, &band);

        let mut heap = BinaryHeap::new();
        for (x, y, m) in mask_img.enumerate_pixels() {
            let t = field.time(i64::from(x), i64::from(y));
            if m.0[0] != 0 {
                field.set(x, y, INSIDE, FAR);
            } else if band.get_pixel(x, y).0[0] != 0 {
                field.set(x, y, BAND, 0.0);
                heap.push(Front { t: 0.0, x, y });
            } else {
                field.set(x, y, KNOWN, t);
            }
        }

        while let Some(Front { x, y, .. }) = heap.pop() {
            field.set_flag(x, y, KNOWN);
            for (nx, ny) in Field::neighbors(x, y) {
                if field.index(nx, ny).is_none() || field.flag(nx, ny) != INSIDE {
                    continue;
                }
                let (ux, uy) = (nx as u32, ny as u32);
                let t = field.arrival(nx, ny);
                field.set(ux, uy, INSIDE, t);

                let fallback = *out.get_pixel(x, y);
                let value = self.estimate(&field, &out, ux, uy).unwrap_or(fallback);
                out.put_pixel(ux, uy, value);

                field.set(ux, uy, BAND, t);
                heap.push(Front { t, x: ux, y: uy });
            }
        }

        Ok(out)
    }
}

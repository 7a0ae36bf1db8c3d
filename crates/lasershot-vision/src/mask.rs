//! Binary masks: colour/intensity thresholds and morphology.

use lasershot_core::{luminance, GrayImageView, RgbImageView};
use serde::{Deserialize, Serialize};

/// Row-major binary image.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Mask {
    pub width: usize,
    pub height: usize,
    pub data: Vec<bool>,
}

impl Mask {
    pub fn new(width: usize, height: usize) -> Self {
        Self {
            width,
            height,
            data: vec![false; width * height],
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> bool {
        self.data[y * self.width + x]
    }

    #[inline]
    pub fn set(&mut self, x: usize, y: usize, v: bool) {
        self.data[y * self.width + x] = v;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|&&v| v).count()
    }

    pub fn is_empty(&self) -> bool {
        !self.data.iter().any(|&v| v)
    }

    /// Pixel-wise OR. Masks must share dimensions.
    pub fn or(mut self, other: &Mask) -> Mask {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        for (a, &b) in self.data.iter_mut().zip(other.data.iter()) {
            *a |= b;
        }
        self
    }
}

/// Pixels whose Rec. 601 luma is at least `cutoff`.
pub fn luminance_mask(img: &RgbImageView<'_>, cutoff: u8) -> Mask {
    Mask {
        width: img.width,
        height: img.height,
        data: img
            .data
            .chunks_exact(3)
            .map(|p| luminance([p[0], p[1], p[2]]) >= cutoff)
            .collect(),
    }
}

/// Strongly coloured pixels (HSV saturation / value gate).
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct NonGrayParams {
    /// Minimal `(max - min) / max` over the RGB channels.
    pub min_saturation: f32,
    /// Minimal `max` channel value.
    pub min_value: u8,
}

impl Default for NonGrayParams {
    fn default() -> Self {
        Self {
            min_saturation: 0.45,
            min_value: 150,
        }
    }
}

pub fn non_gray_mask(img: &RgbImageView<'_>, params: &NonGrayParams) -> Mask {
    Mask {
        width: img.width,
        height: img.height,
        data: img
            .data
            .chunks_exact(3)
            .map(|p| {
                let max = p[0].max(p[1]).max(p[2]);
                let min = p[0].min(p[1]).min(p[2]);
                if max < params.min_value || max == 0 {
                    return false;
                }
                (max - min) as f32 / max as f32 >= params.min_saturation
            })
            .collect(),
    }
}

/// Pixels strictly darker than `threshold` (ink on paper).
pub fn dark_mask(img: &GrayImageView<'_>, threshold: u8) -> Mask {
    Mask {
        width: img.width,
        height: img.height,
        data: img.data.iter().map(|&v| v < threshold).collect(),
    }
}

/// Erosion with a `k x k` square kernel. Pixels outside the image count as
/// background, so blobs touching the border shrink from that side too.
pub fn erode(mask: &Mask, k: usize) -> Mask {
    morph(mask, k, true)
}

/// Dilation with a `k x k` square kernel.
pub fn dilate(mask: &Mask, k: usize) -> Mask {
    morph(mask, k, false)
}

/// Morphological opening: erode then dilate.
pub fn open(mask: &Mask, k: usize) -> Mask {
    dilate(&erode(mask, k), k)
}

fn morph(mask: &Mask, k: usize, erode: bool) -> Mask {
    if k <= 1 {
        return mask.clone();
    }
    let r_lo = (k - 1) / 2;
    let r_hi = k / 2;
    let (w, h) = (mask.width, mask.height);

    // Separable: rows then columns.
    let mut tmp = Mask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let x0 = x.checked_sub(r_lo);
            let x1 = x + r_hi;
            let v = match (x0, x1 < w) {
                (Some(x0), true) => window(mask, erode, (x0..=x1).map(|xx| (xx, y))),
                _ if erode => false,
                _ => {
                    let x0 = x.saturating_sub(r_lo);
                    let x1 = x1.min(w - 1);
                    window(mask, erode, (x0..=x1).map(|xx| (xx, y)))
                }
            };
            tmp.set(x, y, v);
        }
    }

    let mut out = Mask::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let y0 = y.checked_sub(r_lo);
            let y1 = y + r_hi;
            let v = match (y0, y1 < h) {
                (Some(y0), true) => window(&tmp, erode, (y0..=y1).map(|yy| (x, yy))),
                _ if erode => false,
                _ => {
                    let y0 = y.saturating_sub(r_lo);
                    let y1 = y1.min(h - 1);
                    window(&tmp, erode, (y0..=y1).map(|yy| (x, yy)))
                }
            };
            out.set(x, y, v);
        }
    }
    out
}

#[inline]
fn window(mask: &Mask, all: bool, mut coords: impl Iterator<Item = (usize, usize)>) -> bool {
    if all {
        coords.all(|(x, y)| mask.get(x, y))
    } else {
        coords.any(|(x, y)| mask.get(x, y))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lasershot_core::RgbImage;

    fn square_mask(w: usize, h: usize, x: usize, y: usize, s: usize) -> Mask {
        let mut m = Mask::new(w, h);
        for yy in y..y + s {
            for xx in x..x + s {
                m.set(xx, yy, true);
            }
        }
        m
    }

    #[test]
    fn opening_removes_isolated_pixels_and_keeps_blobs() {
        let mut m = square_mask(30, 30, 10, 10, 8);
        m.set(2, 2, true);
        m.set(25, 3, true);
        let opened = open(&m, 3);
        assert!(!opened.get(2, 2));
        assert!(!opened.get(25, 3));
        assert_eq!(opened, square_mask(30, 30, 10, 10, 8));
    }

    #[test]
    fn erode_and_dilate_change_square_size() {
        let m = square_mask(20, 20, 5, 5, 6);
        assert_eq!(erode(&m, 3), square_mask(20, 20, 6, 6, 4));
        assert_eq!(dilate(&m, 3), square_mask(20, 20, 4, 4, 8));
    }

    #[test]
    fn luminance_and_colour_masks() {
        let mut img = RgbImage::filled(4, 1, [128, 128, 128]);
        img.put_pixel(0, 0, [255, 255, 255]);
        img.put_pixel(1, 0, [250, 40, 40]);
        img.put_pixel(2, 0, [240, 235, 238]);

        let bright = luminance_mask(&img.view(), 230);
        assert_eq!(bright.data, vec![true, false, true, false]);

        let colour = non_gray_mask(&img.view(), &NonGrayParams::default());
        assert_eq!(colour.data, vec![false, true, false, false]);

        assert_eq!(bright.or(&colour).count(), 3);
    }

    #[test]
    fn dark_mask_is_strict() {
        let img = lasershot_core::GrayImage {
            width: 3,
            height: 1,
            data: vec![10, 100, 101],
        };
        assert_eq!(dark_mask(&img.view(), 101).data, vec![true, true, false]);
    }
}

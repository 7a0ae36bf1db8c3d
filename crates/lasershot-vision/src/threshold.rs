//! Global thresholding for target photos.

use lasershot_core::GrayImageView;

/// 256-bin intensity histogram.
#[derive(Clone, Debug)]
pub struct Histogram {
    bins: [u64; 256],
    total: u64,
}

impl Histogram {
    pub fn from_samples(samples: &[u8]) -> Self {
        let mut bins = [0u64; 256];
        for &v in samples {
            bins[v as usize] += 1;
        }
        Self {
            bins,
            total: samples.len() as u64,
        }
    }

    pub fn total(&self) -> u64 {
        self.total
    }

    /// Darkest and brightest populated bins.
    pub fn range(&self) -> Option<(u8, u8)> {
        let lo = self.bins.iter().position(|&n| n > 0)?;
        let hi = self.bins.iter().rposition(|&n| n > 0)?;
        Some((lo as u8, hi as u8))
    }

    /// Otsu split: the first `t` maximising between-class variance, with
    /// `<= t` as the dark class.
    ///
    /// Empty input gives 127, a single level gives that level and two levels
    /// give their midpoint.
    pub fn otsu(&self) -> u8 {
        let Some((lo, hi)) = self.range() else {
            return 127;
        };
        if lo == hi {
            return lo;
        }
        if self.bins.iter().filter(|&&n| n > 0).count() == 2 {
            return ((lo as u16 + hi as u16) / 2) as u8;
        }

        let total = self.total as f64;
        let mass: f64 = self
            .bins
            .iter()
            .enumerate()
            .map(|(v, &n)| v as f64 * n as f64)
            .sum();

        let (mut dark_n, mut dark_mass) = (0.0, 0.0);
        let mut best = (f64::NEG_INFINITY, 127u8);
        for t in lo..hi {
            let n = self.bins[t as usize] as f64;
            dark_n += n;
            dark_mass += t as f64 * n;
            let light_n = total - dark_n;
            if dark_n == 0.0 || light_n == 0.0 {
                continue;
            }
            let gap = dark_mass / dark_n - (mass - dark_mass) / light_n;
            let between = dark_n * light_n * gap * gap;
            if between > best.0 {
                best = (between, t);
            }
        }
        best.1
    }
}

/// Otsu threshold over a full grayscale image.
pub fn otsu_threshold(img: &GrayImageView<'_>) -> u8 {
    Histogram::from_samples(img.data).otsu()
}

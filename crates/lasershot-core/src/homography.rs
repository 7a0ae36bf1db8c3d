use crate::image::{sample_bilinear_rgb, sample_bilinear_u8};
use crate::{GrayImage, GrayImageView, RgbImage, RgbImageView};
use nalgebra::{DMatrix, Matrix3, Point2, SMatrix, SVector, Vector2, Vector3};
use serde::{Deserialize, Serialize};

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    #[inline]
    pub fn apply(&self, p: Point2<f64>) -> Point2<f64> {
        let v = self.h * Vector3::new(p.x, p.y, 1.0);
        let w = v[2];
        Point2::new(v[0] / w, v[1] / w)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }
}

/// Hartley conditioning: centroid to the origin, mean distance `sqrt(2)`.
struct Conditioned {
    points: Vec<Point2<f64>>,
    t: Matrix3<f64>,
}

impl Conditioned {
    fn new(pts: &[Point2<f64>]) -> Self {
        let n = pts.len() as f64;
        let centroid = pts.iter().fold(Vector2::zeros(), |acc, p| acc + p.coords) / n;
        let mean_dist = pts.iter().map(|p| (p.coords - centroid).norm()).sum::<f64>() / n;
        let s = if mean_dist > 1e-12 {
            std::f64::consts::SQRT_2 / mean_dist
        } else {
            1.0
        };
        let t = Matrix3::new(
            s, 0.0, -s * centroid.x, //
            0.0, s, -s * centroid.y, //
            0.0, 0.0, 1.0,
        );
        let points = pts
            .iter()
            .map(|p| Point2::from((p.coords - centroid) * s))
            .collect();
        Self { points, t }
    }
}

/// The two DLT rows contributed by `(x, y) -> (u, v)`, unknowns ordered
/// `h11 .. h33`.
fn dlt_rows(p: Point2<f64>, q: Point2<f64>) -> [[f64; 9]; 2] {
    let (x, y, u, v) = (p.x, p.y, q.x, q.y);
    [
        [x, y, 1.0, 0.0, 0.0, 0.0, -u * x, -u * y, -u],
        [0.0, 0.0, 0.0, x, y, 1.0, -v * x, -v * y, -v],
    ]
}

/// Undo the conditioning and scale so that `h33 = 1`.
fn finish(hn: Matrix3<f64>, src: &Conditioned, dst: &Conditioned) -> Option<Homography> {
    let h = dst.t.try_inverse()? * hn * src.t;
    let s = h[(2, 2)];
    if s.abs() < 1e-12 || !s.is_finite() {
        return None;
    }
    Some(Homography::new(h / s))
}

/// Estimate H such that `dst ~ H * src` from N >= 4 correspondences.
///
/// Exactly four points go through [`homography_from_4pt`]; more use the
/// conditioned DLT, taking the right singular vector of the smallest
/// singular value.
pub fn estimate_homography(src: &[Point2<f64>], dst: &[Point2<f64>]) -> Option<Homography> {
    if src.len() != dst.len() || src.len() < 4 {
        return None;
    }
    if let (Ok(s), Ok(d)) = (
        <&[Point2<f64>; 4]>::try_from(src),
        <&[Point2<f64>; 4]>::try_from(dst),
    ) {
        return homography_from_4pt(s, d);
    }

    let cs = Conditioned::new(src);
    let cd = Conditioned::new(dst);
    let mut a = DMatrix::<f64>::zeros(2 * src.len(), 9);
    for (k, (p, q)) in cs.points.iter().zip(&cd.points).enumerate() {
        for (r, row) in dlt_rows(*p, *q).iter().enumerate() {
            for (c, v) in row.iter().enumerate() {
                a[(2 * k + r, c)] = *v;
            }
        }
    }

    let vt = a.svd(false, true).v_t?;
    let h = vt.row(vt.nrows().checked_sub(1)?);
    let hn = Matrix3::from_iterator(h.iter().copied()).transpose();
    finish(hn, &cs, &cd)
}

/// Compute H such that `dst ~ H * src` from exactly four correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None`
/// for degenerate configurations (three colinear points, repeated points).
pub fn homography_from_4pt(src: &[Point2<f64>; 4], dst: &[Point2<f64>; 4]) -> Option<Homography> {
    let cs = Conditioned::new(src);
    let cd = Conditioned::new(dst);
    if has_colinear_triple(&cs.points) || has_colinear_triple(&cd.points) {
        return None;
    }

    // Fix h33 = 1 and move its column to the right-hand side.
    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();
    for (k, (p, q)) in cs.points.iter().zip(&cd.points).enumerate() {
        for (r, row) in dlt_rows(*p, *q).iter().enumerate() {
            let i = 2 * k + r;
            for c in 0..8 {
                a[(i, c)] = row[c];
            }
            b[i] = -row[8];
        }
    }

    let x = a.lu().solve(&b)?;
    if x.iter().any(|v| !v.is_finite()) {
        return None;
    }
    let hn = Matrix3::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );
    finish(hn, &cs, &cd)
}

// Expects Hartley-normalized points so a fixed tolerance is meaningful.
fn has_colinear_triple(pts: &[Point2<f64>]) -> bool {
    const MIN_AREA2: f64 = 1e-9;
    let n = pts.len();
    for i in 0..n {
        for j in i + 1..n {
            for k in j + 1..n {
                let ab = pts[j] - pts[i];
                let ac = pts[k] - pts[i];
                if (ab.x * ac.y - ab.y * ac.x).abs() < MIN_AREA2 {
                    return true;
                }
            }
        }
    }
    false
}

/// Warp into an `out_w x out_h` canvas: each output pixel centre is mapped
/// through `h_src_from_dst` and sampled bilinearly.
pub fn warp_perspective_gray(
    src: &GrayImageView<'_>,
    h_src_from_dst: Homography,
    out_w: usize,
    out_h: usize,
) -> GrayImage {
    let mut out = vec![0u8; out_w * out_h];

    for y in 0..out_h {
        for x in 0..out_w {
            let pd = Point2::new(x as f64 + 0.5, y as f64 + 0.5);
            let ps = h_src_from_dst.apply(pd);
            out[y * out_w + x] = sample_bilinear_u8(src, ps.x - 0.5, ps.y - 0.5);
        }
    }

    GrayImage {
        width: out_w,
        height: out_h,
        data: out,
    }
}

/// RGB counterpart of [`warp_perspective_gray`].
pub fn warp_perspective_rgb(
    src: &RgbImageView<'_>,
    h_src_from_dst: Homography,
    out_w: usize,
    out_h: usize,
) -> RgbImage {
    let mut out = RgbImage::new(out_w, out_h);

    for y in 0..out_h {
        for x in 0..out_w {
            let pd = Point2::new(x as f64 + 0.5, y as f64 + 0.5);
            let ps = h_src_from_dst.apply(pd);
            out.put_pixel(x, y, sample_bilinear_rgb(src, ps.x - 0.5, ps.y - 0.5));
        }
    }

    out
}

//! Connected-component labelling on binary masks.

use crate::mask::Mask;
use lasershot_core::BoundingBox;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Connectivity {
    Four,
    Eight,
}

impl Connectivity {
    fn offsets(self) -> &'static [(i64, i64)] {
        match self {
            Connectivity::Four => &[(1, 0), (-1, 0), (0, 1), (0, -1)],
            Connectivity::Eight => &[
                (1, 0),
                (-1, 0),
                (0, 1),
                (0, -1),
                (1, 1),
                (1, -1),
                (-1, 1),
                (-1, -1),
            ],
        }
    }
}

/// One foreground component.
#[derive(Clone, Debug, PartialEq)]
pub struct Component {
    /// Pixel-aligned bounding box (`x + width` is one past the last column).
    pub bbox: BoundingBox,
    /// Number of pixels.
    pub area: usize,
}

impl Component {
    pub fn width(&self) -> usize {
        self.bbox.width as usize
    }

    pub fn height(&self) -> usize {
        self.bbox.height as usize
    }
}

/// Label foreground pixels of `mask`, returned in raster order of each
/// component's first pixel.
pub fn label_components(mask: &Mask, connectivity: Connectivity) -> Vec<Component> {
    let (w, h) = (mask.width, mask.height);
    let mut visited = vec![false; w * h];
    let mut out = Vec::new();
    let mut stack = Vec::new();

    for start in 0..w * h {
        if visited[start] || !mask.data[start] {
            continue;
        }
        visited[start] = true;
        stack.push(start);

        let (mut x0, mut y0, mut x1, mut y1) = (usize::MAX, usize::MAX, 0usize, 0usize);
        let mut area = 0usize;

        while let Some(i) = stack.pop() {
            let (x, y) = (i % w, i / w);
            area += 1;
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);

            for &(dx, dy) in connectivity.offsets() {
                let nx = x as i64 + dx;
                let ny = y as i64 + dy;
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let j = ny as usize * w + nx as usize;
                if !visited[j] && mask.data[j] {
                    visited[j] = true;
                    stack.push(j);
                }
            }
        }

        out.push(Component {
            bbox: BoundingBox::new(
                x0 as f64,
                y0 as f64,
                (x1 - x0 + 1) as f64,
                (y1 - y0 + 1) as f64,
            ),
            area,
        });
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn mask_from(rows: &[&str]) -> Mask {
        let h = rows.len();
        let w = rows[0].len();
        let mut m = Mask::new(w, h);
        for (y, row) in rows.iter().enumerate() {
            for (x, c) in row.chars().enumerate() {
                m.set(x, y, c == '#');
            }
        }
        m
    }

    #[test]
    fn diagonal_neighbours_depend_on_connectivity() {
        let m = mask_from(&["#...", ".#..", "..##", "...."]);
        assert_eq!(label_components(&m, Connectivity::Four).len(), 3);

        let eight = label_components(&m, Connectivity::Eight);
        assert_eq!(eight.len(), 1);
        assert_eq!(eight[0].area, 4);
        assert_eq!(eight[0].bbox, BoundingBox::new(0.0, 0.0, 4.0, 3.0));
    }

    #[test]
    fn ring_is_a_single_component() {
        let m = mask_from(&["#####", "#...#", "#...#", "#####"]);
        let comps = label_components(&m, Connectivity::Four);
        assert_eq!(comps.len(), 1);
        assert_eq!((comps[0].width(), comps[0].height()), (5, 4));
        assert_eq!(comps[0].area, 14);
    }

    #[test]
    fn empty_mask_has_no_components() {
        assert!(label_components(&Mask::new(8, 8), Connectivity::Eight).is_empty());
    }
}

//! Annotation rectangles, labeled contours and their exported document form.
//!
//! Contours live in image coordinates (`[x, y]`, x to the right, y down).
//! Rectangles are stored as `top, left, bottom, right` and are sliced
//! half-open: row `bottom` and column `right` are not part of the region.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{HyspecError, Result};

/// Label marking a white reference region inside a scan.
pub const WHITE_REFERENCE_LABEL: &str = "white_reference";
/// Label marking a black reference region inside a scan.
pub const BLACK_REFERENCE_LABEL: &str = "black_reference";
/// Labels that mark calibration targets rather than objects of interest.
pub const REFERENCE_LABELS: [&str; 2] = [WHITE_REFERENCE_LABEL, BLACK_REFERENCE_LABEL];

/// Axis-aligned rectangle in pixel indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rect {
    pub top: usize,
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
}

impl Rect {
    pub const fn new(top: usize, left: usize, bottom: usize, right: usize) -> Self {
        Self {
            top,
            left,
            bottom,
            right,
        }
    }

    pub fn height(&self) -> usize {
        self.bottom.saturating_sub(self.top)
    }

    pub fn width(&self) -> usize {
        self.right.saturating_sub(self.left)
    }

    /// True when the half-open region contains no pixel.
    pub fn is_empty(&self) -> bool {
        self.height() == 0 || self.width() == 0
    }

    /// Fail unless the rectangle is non-empty and inside a `height × width` image.
    pub fn check_within(&self, height: usize, width: usize) -> Result<()> {
        if self.is_empty() || self.bottom > height || self.right > width {
            return Err(HyspecError::config(format!(
                "annotation rectangle {self:?} is empty or outside a {height}x{width} image"
            )));
        }
        Ok(())
    }

    /// Bounding box of a point set, clamped to the image. Returns `None` for
    /// an empty point list.
    pub fn bounding(points: &[[f32; 2]], height: usize, width: usize) -> Option<Self> {
        let first = points.first()?;
        let (mut x0, mut y0, mut x1, mut y1) = (first[0], first[1], first[0], first[1]);
        for p in &points[1..] {
            x0 = x0.min(p[0]);
            y0 = y0.min(p[1]);
            x1 = x1.max(p[0]);
            y1 = y1.max(p[1]);
        }
        let clamp = |v: f32, hi: usize| (v.max(0.0) as usize).min(hi);
        Some(Self {
            top: clamp(y0.floor(), height),
            left: clamp(x0.floor(), width),
            bottom: clamp(y1.ceil(), height),
            right: clamp(x1.ceil(), width),
        })
    }
}

/// One labeled polygon drawn on a scan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Contour {
    pub label: String,
    pub points: Vec<[f32; 2]>,
}

impl Contour {
    pub fn new(label: impl Into<String>, points: Vec<[f32; 2]>) -> Self {
        Self {
            label: label.into(),
            points,
        }
    }

    /// Closed rectangle contour covering `rect`.
    pub fn from_rect(label: impl Into<String>, rect: Rect) -> Self {
        let (t, l, b, r) = (
            rect.top as f32,
            rect.left as f32,
            rect.bottom as f32,
            rect.right as f32,
        );
        Self::new(label, vec![[l, t], [r, t], [r, b], [l, b]])
    }

    /// Even-odd test of a point against the polygon.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        let pts = &self.points;
        if pts.len() < 3 {
            return false;
        }
        let mut inside = false;
        let mut j = pts.len() - 1;
        for i in 0..pts.len() {
            let (xi, yi) = (pts[i][0], pts[i][1]);
            let (xj, yj) = (pts[j][0], pts[j][1]);
            if (yi > y) != (yj > y) && x < (xj - xi) * (y - yi) / (yj - yi) + xi {
                inside = !inside;
            }
            j = i;
        }
        inside
    }
}

/// The annotation collection attached to the current scan.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContourSet {
    pub contours: Vec<Contour>,
}

impl ContourSet {
    pub fn new(contours: Vec<Contour>) -> Self {
        Self { contours }
    }

    pub fn has_annotations(&self) -> bool {
        !self.contours.is_empty()
    }

    pub fn push(&mut self, contour: Contour) {
        self.contours.push(contour);
    }

    /// Export to the document form consumed by annotation-based locators.
    pub fn export(&self, width: usize, height: usize) -> AnnotationDocument {
        let objects = self
            .contours
            .iter()
            .filter_map(|c| {
                let bbox = Rect::bounding(&c.points, height, width)?;
                Some(AnnotatedObject {
                    label: c.label.clone(),
                    polygon: c.points.clone(),
                    bbox,
                })
            })
            .collect();
        AnnotationDocument {
            width,
            height,
            objects,
        }
    }

    /// Rasterize every contour whose label is not in `excluded` into a
    /// `height × width` mask. A pixel is set when its center lies inside.
    pub fn rasterize(&self, height: usize, width: usize, excluded: &[&str]) -> Array2<bool> {
        let mut mask = Array2::from_elem((height, width), false);
        for contour in self
            .contours
            .iter()
            .filter(|c| !excluded.contains(&c.label.as_str()))
        {
            let Some(bbox) = Rect::bounding(&contour.points, height, width) else {
                continue;
            };
            for y in bbox.top..bbox.bottom {
                for x in bbox.left..bbox.right {
                    if contour.contains(x as f32 + 0.5, y as f32 + 0.5) {
                        mask[[y, x]] = true;
                    }
                }
            }
        }
        mask
    }
}

/// Exported annotation set: image size plus one entry per object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotationDocument {
    pub width: usize,
    pub height: usize,
    pub objects: Vec<AnnotatedObject>,
}

impl AnnotationDocument {
    /// First object carrying `label`.
    pub fn find(&self, label: &str) -> Option<&AnnotatedObject> {
        self.objects.iter().find(|o| o.label == label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnnotatedObject {
    pub label: String,
    pub polygon: Vec<[f32; 2]>,
    pub bbox: Rect,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_check_within_rejects_outside() {
        assert!(Rect::new(0, 0, 4, 4).check_within(4, 4).is_ok());
        assert!(Rect::new(0, 0, 5, 4).check_within(4, 4).is_err());
        assert!(Rect::new(2, 2, 2, 3).check_within(4, 4).is_err());
    }

    #[test]
    fn test_bounding_box_rounds_outward_and_clamps() {
        let rect = Rect::bounding(&[[1.2, 0.5], [3.7, 2.1], [-2.0, 1.0]], 3, 10).unwrap();
        assert_eq!(rect, Rect::new(0, 0, 3, 4));
    }

    #[test]
    fn test_export_finds_labeled_object() {
        let set = ContourSet::new(vec![
            Contour::from_rect("leaf", Rect::new(0, 0, 2, 2)),
            Contour::from_rect(WHITE_REFERENCE_LABEL, Rect::new(5, 6, 8, 9)),
        ]);
        let doc = set.export(10, 10);
        assert_eq!(doc.objects.len(), 2);
        let white = doc.find(WHITE_REFERENCE_LABEL).unwrap();
        assert_eq!(white.bbox, Rect::new(5, 6, 8, 9));
        assert!(doc.find("missing").is_none());
    }

    #[test]
    fn test_rasterize_skips_reference_labels() {
        let set = ContourSet::new(vec![
            Contour::from_rect("leaf", Rect::new(1, 1, 3, 3)),
            Contour::from_rect(WHITE_REFERENCE_LABEL, Rect::new(0, 0, 4, 4)),
        ]);
        let mask = set.rasterize(4, 4, &REFERENCE_LABELS);
        let count = mask.iter().filter(|&&m| m).count();
        assert_eq!(count, 4);
        assert!(mask[[1, 1]] && mask[[2, 2]]);
        assert!(!mask[[0, 0]] && !mask[[3, 3]]);
    }
}

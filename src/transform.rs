use crate::geometry_utils::Polyline;
use geo::BoundingRect;
use geo_types::{Coord, LineString, MultiLineString};
use serde::Serialize;

/// The single affine map from raw map units to the view box.
///
/// `view = (raw - min) * scale + pad`, with one scale for both axes.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ViewTransform {
    pub min_x: f64,
    pub min_y: f64,
    pub scale: f64,
    pub pad: f64,
    pub width: f64,
    pub height: f64,
}

impl ViewTransform {
    /// Fit the union bounding box of `paths` into `target_width`.
    /// Returns `None` when there is no finite bounding box.
    pub fn fit<'a>(
        paths: impl IntoIterator<Item = &'a Polyline>,
        target_width: f64,
        pad: f64,
    ) -> Option<ViewTransform> {
        let lines: MultiLineString<f64> = paths
            .into_iter()
            .filter(|p| !p.is_empty())
            .map(|p| LineString::new(p.clone()))
            .collect();
        let bbox = lines.bounding_rect()?;
        let (min, max) = (bbox.min(), bbox.max());
        if ![min.x, min.y, max.x, max.y].iter().all(|v| v.is_finite()) {
            return None;
        }

        let scale = (target_width - 2.0 * pad) / (max.x - min.x).max(1.0);
        Some(ViewTransform {
            min_x: min.x,
            min_y: min.y,
            scale,
            pad,
            width: target_width,
            height: (max.y - min.y) * scale + 2.0 * pad,
        })
    }

    pub fn apply(&self, c: Coord<f64>) -> Coord<f64> {
        Coord {
            x: (c.x - self.min_x) * self.scale + self.pad,
            y: (c.y - self.min_y) * self.scale + self.pad,
        }
    }

    pub fn apply_path(&self, path: &[Coord<f64>]) -> Polyline {
        path.iter().map(|&c| self.apply(c)).collect()
    }
}

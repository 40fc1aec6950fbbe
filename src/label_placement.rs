use crate::assignment::nearest_on_skeleton;
use crate::config::{LabelConfig, LabelMode};
use crate::geometry_utils::{
    Polyline, point_rect_distance, rects_overlap, rotate, segment_rect_distance, unit_direction,
    vertex_centroid,
};
use geo_types::{Coord, Rect};
use log::debug;
use rstar::{
    AABB, RTree,
    primitives::{GeomWithData, Line, Rectangle},
};

/// One label to place, in view units.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelRequest {
    pub point: Coord<f64>,
    pub text: String,
    pub group: usize,
    /// Offset of the text anchor declared by the source data
    pub declared_offset: Option<Coord<f64>>,
}

/// `anchor` is the text anchor: bottom-left corner of `bbox` (y grows downward).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LabelPlacement {
    pub anchor: Coord<f64>,
    pub bbox: Rect<f64>,
    /// No candidate passed, the label sits at the forced offset
    pub forced: bool,
}

/// Plan geometry the labels must keep clear of.
pub struct PlacementContext<'a> {
    group_paths: &'a [Vec<Polyline>],
    centroids: Vec<Option<Coord<f64>>>,
    segments: RTree<Line<[f64; 2]>>,
}

impl<'a> PlacementContext<'a> {
    pub fn new(group_paths: &'a [Vec<Polyline>]) -> Self {
        let centroids = group_paths.iter().map(|paths| vertex_centroid(paths)).collect();
        let segments: Vec<Line<[f64; 2]>> = group_paths
            .iter()
            .flatten()
            .flat_map(|path| path.windows(2))
            .map(|w| Line::new([w[0].x, w[0].y], [w[1].x, w[1].y]))
            .collect();
        Self {
            group_paths,
            centroids,
            segments: RTree::bulk_load(segments),
        }
    }

    /// Unit normal of the closest segment of the station's own line, pointing away
    /// from that line's centroid.
    fn outward_normal(&self, request: &LabelRequest) -> Coord<f64> {
        let up = Coord { x: 0.0, y: -1.0 };
        let Some(paths) = self.group_paths.get(request.group) else {
            return up;
        };
        let Some(hit) = nearest_on_skeleton(request.point, paths) else {
            return up;
        };
        let path = &paths[hit.path];
        let seg = hit.projection.segment;
        let Some(t) = unit_direction(path[seg], path[seg + 1]) else {
            return up;
        };
        let n = Coord { x: -t.y, y: t.x };
        let away = match self.centroids.get(request.group).copied().flatten() {
            Some(c) => Coord {
                x: request.point.x - c.x,
                y: request.point.y - c.y,
            },
            None => up,
        };
        if n.x * away.x + n.y * away.y < 0.0 {
            Coord { x: -n.x, y: -n.y }
        } else {
            n
        }
    }

    fn path_clearance(&self, rect: &Rect<f64>, clearance: f64) -> bool {
        let envelope = AABB::from_corners(
            [rect.min().x - clearance, rect.min().y - clearance],
            [rect.max().x + clearance, rect.max().y + clearance],
        );
        self.segments
            .locate_in_envelope_intersecting(&envelope)
            .all(|seg| {
                let a = Coord { x: seg.from[0], y: seg.from[1] };
                let b = Coord { x: seg.to[0], y: seg.to[1] };
                segment_rect_distance(a, b, rect) >= clearance
            })
    }
}

/// Boxes accepted so far, threaded through the placement of every label.
#[derive(Default)]
pub struct Occupancy {
    boxes: RTree<GeomWithData<Rectangle<[f64; 2]>, usize>>,
    rects: Vec<Rect<f64>>,
}

impl Occupancy {
    fn collides(&self, rect: &Rect<f64>) -> bool {
        let envelope = AABB::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]);
        self.boxes
            .locate_in_envelope_intersecting(&envelope)
            .any(|other| rects_overlap(rect, &self.rects[other.data]))
    }

    fn occupy(&mut self, rect: Rect<f64>) {
        let id = self.rects.len();
        self.rects.push(rect);
        self.boxes.insert(GeomWithData::new(
            Rectangle::from_corners([rect.min().x, rect.min().y], [rect.max().x, rect.max().y]),
            id,
        ));
    }
}

fn label_size(text: &str, cfg: &LabelConfig) -> (f64, f64) {
    let chars = text.chars().count().max(1);
    (chars as f64 * cfg.char_width, cfg.font_height)
}

fn box_at_anchor(anchor: Coord<f64>, w: f64, h: f64) -> Rect<f64> {
    Rect::new(
        Coord { x: anchor.x, y: anchor.y - h },
        Coord { x: anchor.x + w, y: anchor.y },
    )
}

/// Box whose nearest edge lies `gap` away from `point` in direction `dir`.
fn box_along(point: Coord<f64>, dir: Coord<f64>, gap: f64, w: f64, h: f64) -> Rect<f64> {
    let extent = dir.x.abs() * w / 2.0 + dir.y.abs() * h / 2.0;
    let center = Coord {
        x: point.x + dir.x * (gap + extent),
        y: point.y + dir.y * (gap + extent),
    };
    Rect::new(
        Coord { x: center.x - w / 2.0, y: center.y - h / 2.0 },
        Coord { x: center.x + w / 2.0, y: center.y + h / 2.0 },
    )
}

/// Candidate boxes in preference order: declared offset, outward normal fan, fallback ring.
fn candidates<'c>(
    request: &'c LabelRequest,
    normal: Coord<f64>,
    cfg: &'c LabelConfig,
    w: f64,
    h: f64,
) -> impl Iterator<Item = Rect<f64>> + 'c {
    let p = request.point;

    let declared = request
        .declared_offset
        .map(|o| box_at_anchor(Coord { x: p.x + o.x, y: p.y + o.y }, w, h));

    let fan = (1..=cfg.normal_steps).flat_map(move |step| {
        let gap = cfg.base_gap * step as f64;
        cfg.normal_deviations_deg
            .iter()
            .flat_map(|&dev| if dev == 0.0 { vec![0.0] } else { vec![dev, -dev] })
            .map(move |dev| box_along(p, rotate(normal, dev), gap, w, h))
    });

    let ring_count = (360.0 / cfg.ring_step_deg).ceil() as usize;
    let ring = (0..ring_count).map(move |k| {
        let angle = (k as f64 * cfg.ring_step_deg).to_radians();
        let dir = Coord { x: angle.cos(), y: angle.sin() };
        box_along(p, dir, cfg.ring_gap, w, h)
    });

    declared.into_iter().chain(fan).chain(ring)
}

fn forced_placement(request: &LabelRequest, cfg: &LabelConfig, w: f64, h: f64) -> LabelPlacement {
    let anchor = Coord {
        x: request.point.x + cfg.forced_offset[0],
        y: request.point.y + cfg.forced_offset[1],
    };
    LabelPlacement {
        anchor,
        bbox: box_at_anchor(anchor, w, h),
        forced: true,
    }
}

/// Place one label: the first candidate that clears every accepted box, its
/// station and every path is taken, otherwise the forced offset.
pub fn place_label(
    request: &LabelRequest,
    ctx: &PlacementContext,
    cfg: &LabelConfig,
    occupied: &mut Occupancy,
) -> LabelPlacement {
    let (w, h) = label_size(&request.text, cfg);

    let placement = match cfg.mode {
        LabelMode::Inline => forced_placement(request, cfg, w, h),
        LabelMode::Offset => {
            let normal = ctx.outward_normal(request);
            candidates(request, normal, cfg, w, h)
                .find(|rect| {
                    !occupied.collides(rect)
                        && point_rect_distance(request.point, rect) >= cfg.point_clearance
                        && ctx.path_clearance(rect, cfg.path_clearance)
                })
                .map(|rect| LabelPlacement {
                    anchor: Coord { x: rect.min().x, y: rect.max().y },
                    bbox: rect,
                    forced: false,
                })
                .unwrap_or_else(|| {
                    debug!("Label '{}' forced at fixed offset", request.text);
                    forced_placement(request, cfg, w, h)
                })
        }
    };

    occupied.occupy(placement.bbox);
    placement
}

/// Place labels in request order. Earlier requests claim space first.
pub fn place_labels(
    requests: &[LabelRequest],
    ctx: &PlacementContext,
    cfg: &LabelConfig,
) -> Vec<LabelPlacement> {
    let mut occupied = Occupancy::default();
    requests
        .iter()
        .map(|r| place_label(r, ctx, cfg, &mut occupied))
        .collect()
}

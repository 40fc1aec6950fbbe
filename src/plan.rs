use crate::assignment::{AssignmentReason, GroupVotes, ReasonCounts, UnplacedReason};
use crate::transform::ViewTransform;
use geo_types::{Coord, Rect};
use serde::Serialize;

/// `[x, y]` in view units.
pub type ViewPoint = [f64; 2];

pub fn view_point(c: Coord<f64>) -> ViewPoint {
    [c.x, c.y]
}

pub fn view_path(path: &[Coord<f64>]) -> Vec<ViewPoint> {
    path.iter().map(|&c| view_point(c)).collect()
}

/// The computed line plan. Everything a renderer needs, nothing it has to derive.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Plan {
    pub width: f64,
    pub height: f64,
    pub lines: Vec<PlanLine>,
    /// Raw fragments under the same affine map, when requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub overlay_paths: Option<Vec<Vec<ViewPoint>>>,
    /// Every raw-kg alias seen on an assigned sensor, sorted
    pub kg_list: Vec<u32>,
    pub diagnostics: Diagnostics,
}

impl Plan {
    /// A valid plan with no geometry, at a fixed canvas size.
    pub fn empty(width: f64, height: f64) -> Plan {
        Plan {
            width,
            height,
            lines: vec![],
            overlay_paths: None,
            kg_list: vec![],
            diagnostics: Diagnostics::default(),
        }
    }

    pub fn station_count(&self) -> usize {
        self.lines.iter().map(|l| l.stations.len()).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlanLine {
    pub group_index: usize,
    pub name: String,
    pub color: Option<String>,
    pub paths: Vec<Vec<ViewPoint>>,
    /// Stations ordered by position along their path
    pub stations: Vec<PlacedStation>,
    /// Sorted distinct raw-kg aliases of the sensors on this line
    pub kgs: Vec<u32>,
    pub dimmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StationSource {
    Sensor {
        idx: u32,
        code: String,
        kp: u32,
        kg: u32,
        raw_kg: u32,
        reason: AssignmentReason,
    },
    Pseudo,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LabelBox {
    pub min: ViewPoint,
    pub max: ViewPoint,
}

impl From<Rect<f64>> for LabelBox {
    fn from(rect: Rect<f64>) -> Self {
        LabelBox {
            min: view_point(rect.min()),
            max: view_point(rect.max()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedStation {
    pub source: StationSource,
    /// Draw position in view units
    pub point: ViewPoint,
    pub path: usize,
    /// Normalized position along `path`
    pub position: f64,
    pub label: String,
    pub label_anchor: ViewPoint,
    pub label_box: LabelBox,
    pub label_forced: bool,
    /// Raw sensor position was farther than the projection tolerance from its path
    pub off_line: bool,
    pub dimmed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UnplacedSensor {
    pub idx: u32,
    pub code: String,
    pub reason: UnplacedReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StitchStats {
    pub group_index: usize,
    pub fragments: usize,
    pub paths: usize,
    pub joins: usize,
    pub cap_exhausted: bool,
    /// Paths left after trunk selection
    pub trunks: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Diagnostics {
    pub votes: Vec<GroupVotes>,
    pub unplaced: Vec<UnplacedSensor>,
    pub reason_counts: ReasonCounts,
    pub stitch: Vec<StitchStats>,
    pub transform: Option<ViewTransform>,
}

use serde::{Deserialize, Serialize};

/// Which part of the plan stays at full opacity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ActiveFilter {
    #[default]
    All,
    Group { index: usize },
    KpKg { kp: u32, kg: u32 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelMode {
    /// Every label sits at the forced offset, no collision search
    Inline,
    #[default]
    Offset,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelText {
    Index,
    #[default]
    Code,
}

/// Fragment joining tolerances.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StitchConfig {
    /// Maximum endpoint separation for a join (raw units)
    pub join_distance: f64,
    /// Maximum angle between tangents at the join (degrees)
    pub join_angle_deg: f64,
    /// Upper bound on join iterations per group
    pub max_iterations: usize,
}

impl Default for StitchConfig {
    fn default() -> Self {
        Self {
            join_distance: 12.0,
            join_angle_deg: 35.0,
            max_iterations: 2000,
        }
    }
}

/// Label geometry and search parameters, all in view units.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LabelConfig {
    pub mode: LabelMode,
    pub text: LabelText,
    /// Estimated advance per character
    pub char_width: f64,
    pub font_height: f64,
    /// Distance between the station and the nearest label edge for the first normal candidate
    pub base_gap: f64,
    /// Number of radii tried along the outward normal
    pub normal_steps: usize,
    /// Angular deviations tried around the normal at each radius (degrees)
    pub normal_deviations_deg: [f64; 3],
    pub ring_gap: f64,
    pub ring_step_deg: f64,
    /// Minimum distance between a label box and its own station
    pub point_clearance: f64,
    /// Minimum distance between a label box and any path of the plan
    pub path_clearance: f64,
    /// Text anchor offset used for forced placement and inline mode
    pub forced_offset: [f64; 2],
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            mode: LabelMode::Offset,
            text: LabelText::Code,
            char_width: 7.0,
            font_height: 12.0,
            base_gap: 6.0,
            normal_steps: 4,
            normal_deviations_deg: [0.0, 20.0, 40.0],
            ring_gap: 10.0,
            ring_step_deg: 30.0,
            point_clearance: 3.0,
            path_clearance: 2.0,
            forced_offset: [10.0, -10.0],
        }
    }
}

/// Schematic lane spacing used when the map shape is not preserved (view units).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LaneConfig {
    /// Horizontal distance between neighbouring stations
    pub gap_x: f64,
    /// Vertical distance between lanes
    pub gap_y: f64,
    pub left: f64,
    /// Y of the first lane
    pub top: f64,
    /// Space below the last lane
    pub bottom: f64,
}

impl Default for LaneConfig {
    fn default() -> Self {
        Self {
            gap_x: 80.0,
            gap_y: 90.0,
            left: 50.0,
            top: 60.0,
            bottom: 80.0,
        }
    }
}

/// Every tuning parameter of the plan pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PlanConfig {
    pub target_width: f64,
    pub padding: f64,
    /// Canvas height used when there is no geometry at all
    pub empty_height: f64,
    pub stitch: StitchConfig,
    pub simplify_epsilon: f64,
    pub smooth_passes: u32,
    /// Stitched paths shorter than this are left out of the skeleton (raw units)
    pub min_trunk_length: f64,
    /// Number of longest paths kept when the trunk filter removes everything
    pub fallback_trunk_count: usize,
    /// Sensors farther than this from their path are flagged `off_line` (view units)
    pub projection_tolerance: f64,
    /// 0 keeps the raw sensor position, 100 puts it on the path
    pub snap_strength: f64,
    /// Color and kg buckets with fewer sensors than this do not vote
    pub min_vote_sensors: usize,
    pub pseudo_station_count: usize,
    pub active_filter: ActiveFilter,
    pub labels: LabelConfig,
    pub include_overlay: bool,
    /// Draw paths in map shape; when false every group becomes a straight lane
    pub preserve_shape: bool,
    pub lanes: LaneConfig,
}

impl Default for PlanConfig {
    fn default() -> Self {
        Self {
            target_width: 1024.0,
            padding: 40.0,
            empty_height: 600.0,
            stitch: StitchConfig::default(),
            simplify_epsilon: 2.0,
            smooth_passes: 0,
            min_trunk_length: 0.0,
            fallback_trunk_count: 6,
            projection_tolerance: 12.0,
            snap_strength: 100.0,
            min_vote_sensors: 1,
            pseudo_station_count: 20,
            active_filter: ActiveFilter::All,
            labels: LabelConfig::default(),
            include_overlay: false,
            preserve_shape: true,
            lanes: LaneConfig::default(),
        }
    }
}

fn finite_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() { value } else { fallback }
}

fn non_negative_or(value: f64, fallback: f64) -> f64 {
    if value.is_finite() && value >= 0.0 {
        value
    } else {
        fallback
    }
}

impl PlanConfig {
    pub const MAX_SMOOTH_PASSES: u32 = 3;

    /// Replace impossible values with safe fallbacks and clamp bounded knobs.
    pub fn sanitized(&self) -> PlanConfig {
        let d = PlanConfig::default();
        let dl = LabelConfig::default();
        let mut c = self.clone();

        c.padding = non_negative_or(c.padding, d.padding);
        c.target_width = finite_or(c.target_width, d.target_width).max(2.0 * c.padding + 1.0);
        c.empty_height = non_negative_or(c.empty_height, d.empty_height);
        c.stitch.join_distance = non_negative_or(c.stitch.join_distance, d.stitch.join_distance);
        c.stitch.join_angle_deg =
            non_negative_or(c.stitch.join_angle_deg, d.stitch.join_angle_deg).min(180.0);
        c.simplify_epsilon = non_negative_or(c.simplify_epsilon, d.simplify_epsilon);
        c.smooth_passes = c.smooth_passes.min(Self::MAX_SMOOTH_PASSES);
        c.min_trunk_length = finite_or(c.min_trunk_length, d.min_trunk_length);
        c.projection_tolerance = non_negative_or(c.projection_tolerance, d.projection_tolerance);
        c.snap_strength = finite_or(c.snap_strength, d.snap_strength).clamp(0.0, 100.0);
        c.min_vote_sensors = c.min_vote_sensors.max(1);

        let dn = LaneConfig::default();
        let n = &mut c.lanes;
        n.gap_x = non_negative_or(n.gap_x, dn.gap_x);
        n.gap_y = non_negative_or(n.gap_y, dn.gap_y);
        n.left = finite_or(n.left, dn.left);
        n.top = finite_or(n.top, dn.top);
        n.bottom = non_negative_or(n.bottom, dn.bottom);

        let l = &mut c.labels;
        l.char_width = non_negative_or(l.char_width, dl.char_width);
        l.font_height = non_negative_or(l.font_height, dl.font_height);
        l.base_gap = non_negative_or(l.base_gap, dl.base_gap);
        l.ring_gap = non_negative_or(l.ring_gap, dl.ring_gap);
        if !(l.ring_step_deg.is_finite() && l.ring_step_deg > 0.0) {
            l.ring_step_deg = dl.ring_step_deg;
        }
        l.point_clearance = non_negative_or(l.point_clearance, dl.point_clearance);
        l.path_clearance = non_negative_or(l.path_clearance, dl.path_clearance);
        for deviation in l.normal_deviations_deg.iter_mut() {
            *deviation = finite_or(*deviation, 0.0);
        }
        if !l.forced_offset.iter().all(|v| v.is_finite()) {
            l.forced_offset = dl.forced_offset;
        }
        c
    }

    /// Snap strength as a blend factor in [0, 1].
    pub fn snap_alpha(&self) -> f64 {
        (self.snap_strength / 100.0).clamp(0.0, 1.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitized_clamps() {
        let mut cfg = PlanConfig::default();
        cfg.smooth_passes = 9;
        cfg.snap_strength = 250.0;
        cfg.simplify_epsilon = f64::NAN;
        cfg.stitch.join_distance = -4.0;
        cfg.min_vote_sensors = 0;
        cfg.lanes.gap_x = f64::INFINITY;

        let s = cfg.sanitized();
        assert_eq!(s.smooth_passes, 3);
        assert_eq!(s.snap_strength, 100.0);
        assert_eq!(s.simplify_epsilon, PlanConfig::default().simplify_epsilon);
        assert_eq!(s.stitch.join_distance, StitchConfig::default().join_distance);
        assert_eq!(s.min_vote_sensors, 1);
        assert_eq!(s.lanes.gap_x, LaneConfig::default().gap_x);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let cfg: PlanConfig = serde_json::from_str(
            r#"{"simplify_epsilon": 5, "stitch": {"join_angle_deg": 10}, "active_filter": {"kind": "kp_kg", "kp": 3, "kg": 5}}"#,
        )
        .unwrap();
        assert_eq!(cfg.simplify_epsilon, 5.0);
        assert_eq!(cfg.stitch.join_angle_deg, 10.0);
        assert_eq!(cfg.stitch.join_distance, 12.0);
        assert_eq!(cfg.active_filter, ActiveFilter::KpKg { kp: 3, kg: 5 });
        assert_eq!(cfg.labels.mode, LabelMode::Offset);
        assert_eq!(cfg.min_vote_sensors, 1);
        assert!(cfg.preserve_shape);
        assert_eq!(cfg.lanes.top, 60.0);
    }
}

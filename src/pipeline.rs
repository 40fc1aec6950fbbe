//! Composition of every stage into a [`Plan`].
//!
//! Stages run strictly in order: stitch, trunk selection, simplify, transform,
//! assign, label placement. Nothing is cached between calls, so the same inputs
//! always give the same plan and concurrent calls never interfere.

use crate::assignment::{AssignmentConfig, AssignmentReason, AssignmentResult, assign_sensors};
use crate::config::{ActiveFilter, LabelText, PlanConfig};
use crate::geometry_utils::{
    Polyline, interpolate_along_polyline, lerp, polyline_length, project_point_to_polyline,
};
use crate::label_placement::{LabelRequest, PlacementContext, place_labels};
use crate::map_geometry::{LineGroup, MapGeometry};
use crate::overrides::OverrideTable;
use crate::plan::{
    Diagnostics, LabelBox, PlacedStation, Plan, PlanLine, StationSource, StitchStats,
    UnplacedSensor, ViewPoint, view_path, view_point,
};
use crate::sensor_text::Sensor;
use crate::simplify::{simplify_path, smooth_path};
use crate::stitching::stitch_fragments;
use crate::transform::ViewTransform;
use geo_types::Coord;
use itertools::Itertools;
use log::{debug, info};
use rayon::prelude::*;

/// Stitched and simplified paths of one group, in raw units.
struct Skeleton {
    paths: Vec<Polyline>,
    stats: StitchStats,
}

/// Keep paths of at least `min_trunk_length`; if none qualify, the longest few.
fn select_trunks(paths: Vec<Polyline>, cfg: &PlanConfig) -> Vec<Polyline> {
    if cfg.min_trunk_length <= 0.0 {
        return paths;
    }
    let (trunks, short): (Vec<Polyline>, Vec<Polyline>) = paths
        .into_iter()
        .partition(|p| polyline_length(p) >= cfg.min_trunk_length);
    if !trunks.is_empty() {
        return trunks;
    }
    short
        .into_iter()
        .sorted_by(|a, b| polyline_length(b).total_cmp(&polyline_length(a)))
        .take(cfg.fallback_trunk_count)
        .collect()
}

fn build_skeleton(group: &LineGroup, cfg: &PlanConfig) -> Skeleton {
    let stitched = stitch_fragments(&group.fragments, &cfg.stitch);
    let stitched_count = stitched.paths.len();

    let paths: Vec<Polyline> = select_trunks(stitched.paths, cfg)
        .iter()
        .map(|p| smooth_path(&simplify_path(p, cfg.simplify_epsilon), cfg.smooth_passes))
        .collect();

    debug!(
        "Group {}: {} fragments -> {} paths ({} joins), {} trunks",
        group.display_name(),
        group.fragments.len(),
        stitched_count,
        stitched.joins,
        paths.len()
    );

    Skeleton {
        stats: StitchStats {
            group_index: group.index,
            fragments: group.fragments.len(),
            paths: stitched_count,
            joins: stitched.joins,
            cap_exhausted: stitched.cap_exhausted,
            trunks: paths.len(),
        },
        paths,
    }
}

/// A station in line order, before it has a draw position.
struct StationStub {
    source: StationSource,
    path: usize,
    position: f64,
    label: String,
    declared_offset: Option<Coord<f64>>,
    /// Raw sensor position, `None` for pseudo-stations
    raw: Option<Coord<f64>>,
}

/// A station with its draw position, in view units.
struct StationDraft {
    stub: StationStub,
    point: Coord<f64>,
    off_line: bool,
}

/// Everything label placement and the plan need from a layout.
struct Layout {
    width: f64,
    height: f64,
    paths: Vec<Vec<Polyline>>,
    stations: Vec<Vec<StationDraft>>,
    transform: Option<ViewTransform>,
}

/// Blend the raw view position toward its projection on the path by snap
/// strength. The flag marks positions farther than the projection tolerance.
fn snap_to_path(
    raw: Coord<f64>,
    path: &[Coord<f64>],
    position: f64,
    cfg: &PlanConfig,
) -> (Coord<f64>, bool) {
    match project_point_to_polyline(raw, path) {
        Some(p) => (
            lerp(raw, p.point, cfg.snap_alpha()),
            p.distance > cfg.projection_tolerance,
        ),
        None => (interpolate_along_polyline(path, position), false),
    }
}

fn label_text(sensor: &Sensor, text: LabelText) -> String {
    match text {
        LabelText::Index => sensor.idx.to_string(),
        LabelText::Code => sensor.code.clone(),
    }
}

/// Stations of every group, each group ordered by position along its path.
fn station_stubs(
    groups: usize,
    sensors: &[Sensor],
    assigned: &AssignmentResult,
    cfg: &PlanConfig,
) -> Vec<Vec<StationStub>> {
    let mut per_group: Vec<Vec<StationStub>> = (0..groups).map(|_| Vec::new()).collect();

    for a in &assigned.assignments {
        let sensor = &sensors[a.sensor];
        let Some(raw) = sensor.position() else {
            continue;
        };
        per_group[a.group].push(StationStub {
            source: StationSource::Sensor {
                idx: sensor.idx,
                code: sensor.code.clone(),
                kp: sensor.kp,
                kg: sensor.kg,
                raw_kg: sensor.raw_kg,
                reason: a.reason,
            },
            path: a.path,
            position: a.position,
            label: label_text(sensor, cfg.labels.text),
            declared_offset: sensor.label_offset(),
            raw: Some(raw),
        });
    }

    for p in &assigned.pseudo_stations {
        per_group[p.group].push(StationStub {
            source: StationSource::Pseudo,
            path: p.path,
            position: p.position,
            label: p.label.clone(),
            declared_offset: None,
            raw: None,
        });
    }

    for stations in per_group.iter_mut() {
        stations.sort_by(|a, b| a.position.total_cmp(&b.position));
    }
    per_group
}

/// Map geometry kept: skeleton paths and stations go through the view transform.
fn shaped_layout(
    raw_paths: &[Vec<Polyline>],
    stubs: Vec<Vec<StationStub>>,
    transform: ViewTransform,
    cfg: &PlanConfig,
) -> Layout {
    let paths: Vec<Vec<Polyline>> = raw_paths
        .iter()
        .map(|group| group.iter().map(|p| transform.apply_path(p)).collect())
        .collect();

    let stations = stubs
        .into_iter()
        .enumerate()
        .map(|(g, group)| {
            group
                .into_iter()
                .map(|stub| {
                    let path = &paths[g][stub.path];
                    let (point, off_line) = match stub.raw {
                        Some(raw) => snap_to_path(transform.apply(raw), path, stub.position, cfg),
                        None => (interpolate_along_polyline(path, stub.position), false),
                    };
                    StationDraft { stub, point, off_line }
                })
                .collect()
        })
        .collect();

    Layout {
        width: transform.width,
        height: transform.height,
        paths,
        stations,
        transform: Some(transform),
    }
}

/// Schematic layout: one horizontal lane per group, stations at a fixed spacing
/// in position order.
fn lane_layout(stubs: Vec<Vec<StationStub>>, cfg: &PlanConfig) -> Layout {
    let lanes = &cfg.lanes;
    let mut paths = Vec::with_capacity(stubs.len());
    let mut stations = Vec::with_capacity(stubs.len());
    let mut right = lanes.left;

    for (g, group) in stubs.into_iter().enumerate() {
        let y = lanes.top + g as f64 * lanes.gap_y;
        let span = group.len().saturating_sub(1).max(1) as f64 * lanes.gap_x;
        right = right.max(lanes.left + span);
        paths.push(vec![vec![
            Coord { x: lanes.left, y },
            Coord { x: lanes.left + span, y },
        ]]);
        stations.push(
            group
                .into_iter()
                .enumerate()
                .map(|(i, mut stub)| {
                    stub.path = 0;
                    StationDraft {
                        stub,
                        point: Coord { x: lanes.left + i as f64 * lanes.gap_x, y },
                        off_line: false,
                    }
                })
                .collect(),
        );
    }

    let lane_count = paths.len();
    Layout {
        width: cfg.target_width.max(right + lanes.left),
        height: lanes.top + lane_count.saturating_sub(1) as f64 * lanes.gap_y + lanes.bottom,
        paths,
        stations,
        transform: None,
    }
}

fn station_matches(source: &StationSource, kp: u32, kg: u32) -> bool {
    match source {
        StationSource::Sensor {
            kp: skp,
            kg: skg,
            raw_kg,
            ..
        } => *skp == kp && (*skg == kg || *raw_kg == kg),
        StationSource::Pseudo => false,
    }
}

/// Apply the active filter. Nothing is removed, non-matching parts are only flagged.
fn apply_filter(lines: &mut [PlanLine], filter: ActiveFilter) {
    match filter {
        ActiveFilter::All => {}
        ActiveFilter::Group { index } => {
            for line in lines.iter_mut() {
                let dimmed = line.group_index != index;
                line.dimmed = dimmed;
                for s in line.stations.iter_mut() {
                    s.dimmed = dimmed;
                }
            }
        }
        ActiveFilter::KpKg { kp, kg } => {
            for line in lines.iter_mut() {
                for s in line.stations.iter_mut() {
                    s.dimmed = !station_matches(&s.source, kp, kg);
                }
                line.dimmed = line.stations.iter().all(|s| s.dimmed);
            }
        }
    }
}

fn diagnostics(
    sensors: &[Sensor],
    assigned: AssignmentResult,
    stitch: Vec<StitchStats>,
    transform: Option<ViewTransform>,
) -> Diagnostics {
    Diagnostics {
        unplaced: assigned
            .unplaced
            .iter()
            .map(|u| UnplacedSensor {
                idx: sensors[u.sensor].idx,
                code: sensors[u.sensor].code.clone(),
                reason: u.reason,
            })
            .collect(),
        votes: assigned.votes,
        reason_counts: assigned.counts,
        stitch,
        transform,
    }
}

/// Compute the full plan for one parameter set.
///
/// Never fails: unusable inputs shrink the plan down to an empty canvas.
pub fn build_plan(
    map: &MapGeometry,
    sensors: &[Sensor],
    overrides: &OverrideTable,
    config: &PlanConfig,
) -> Plan {
    let cfg = config.sanitized();

    let skeletons: Vec<Skeleton> = map.groups.iter().map(|g| build_skeleton(g, &cfg)).collect();
    let stitch_stats: Vec<StitchStats> = skeletons.iter().map(|s| s.stats.clone()).collect();
    let raw_paths: Vec<Vec<Polyline>> = skeletons.into_iter().map(|s| s.paths).collect();

    let transform = ViewTransform::fit(raw_paths.iter().flatten(), cfg.target_width, cfg.padding);

    let assigned = assign_sensors(
        &map.groups,
        &raw_paths,
        sensors,
        overrides,
        &AssignmentConfig {
            min_vote_sensors: cfg.min_vote_sensors,
            pseudo_station_count: cfg.pseudo_station_count,
        },
    );

    let Some(transform) = transform else {
        info!("No drawable geometry, returning an empty plan");
        let mut plan = Plan::empty(cfg.target_width, cfg.empty_height);
        plan.diagnostics = diagnostics(sensors, assigned, stitch_stats, None);
        return plan;
    };

    let stubs = station_stubs(map.groups.len(), sensors, &assigned, &cfg);
    let layout = if cfg.preserve_shape {
        shaped_layout(&raw_paths, stubs, transform, &cfg)
    } else {
        lane_layout(stubs, &cfg)
    };

    // Labels claim space in group-then-position order
    let requests: Vec<LabelRequest> = layout
        .stations
        .iter()
        .enumerate()
        .flat_map(|(group, stations)| {
            stations.iter().map(move |s| LabelRequest {
                point: s.point,
                text: s.stub.label.clone(),
                group,
                declared_offset: s.stub.declared_offset,
            })
        })
        .collect();
    let ctx = PlacementContext::new(&layout.paths);
    let placements = place_labels(&requests, &ctx, &cfg.labels);
    let forced = placements.iter().filter(|p| p.forced).count();
    let mut placements = placements.into_iter();

    let mut lines: Vec<PlanLine> = Vec::with_capacity(map.groups.len());
    for (g, (group, stations)) in map.groups.iter().zip(layout.stations).enumerate() {
        let kgs: Vec<u32> = assigned
            .assignments
            .iter()
            .filter(|a| a.group == g)
            .map(|a| sensors[a.sensor].raw_kg)
            .sorted()
            .dedup()
            .collect();

        let stations: Vec<PlacedStation> = stations
            .into_iter()
            .zip(placements.by_ref())
            .map(|(draft, placed)| PlacedStation {
                source: draft.stub.source,
                point: view_point(draft.point),
                path: draft.stub.path,
                position: draft.stub.position,
                label: draft.stub.label,
                label_anchor: view_point(placed.anchor),
                label_box: LabelBox::from(placed.bbox),
                label_forced: placed.forced,
                off_line: draft.off_line,
                dimmed: false,
            })
            .collect();

        lines.push(PlanLine {
            group_index: group.index,
            name: group.display_name(),
            color: group.color.clone(),
            paths: layout.paths[g].iter().map(|p| view_path(p)).collect(),
            stations,
            kgs,
            dimmed: false,
        });
    }
    apply_filter(&mut lines, cfg.active_filter);

    let kg_list: Vec<u32> = lines
        .iter()
        .flat_map(|l| l.kgs.iter().copied())
        .sorted()
        .dedup()
        .collect();

    // Raw fragments only line up with the shaped layout
    let overlay_paths: Option<Vec<Vec<ViewPoint>>> = layout
        .transform
        .filter(|_| cfg.include_overlay)
        .map(|t| {
            map.groups
                .iter()
                .flat_map(|g| g.fragments.iter())
                .map(|f| view_path(&t.apply_path(f.points())))
                .collect()
        });

    info!(
        "Plan {:.0}x{:.0}: {} lines, {} stations ({} labels forced), {} unplaced",
        layout.width,
        layout.height,
        lines.len(),
        requests.len(),
        forced,
        assigned.counts.unplaced
    );

    let counts_by_reason = AssignmentReason::CASCADE
        .iter()
        .map(|r| {
            let n = assigned.assignments.iter().filter(|a| a.reason == *r).count();
            format!("{:?}={}", r, n)
        })
        .join(", ");
    debug!("Assignments by reason: {}", counts_by_reason);

    Plan {
        width: layout.width,
        height: layout.height,
        lines,
        overlay_paths,
        kg_list,
        diagnostics: diagnostics(sensors, assigned, stitch_stats, layout.transform),
    }
}

/// Compute one plan per parameter set, in parallel. Each plan equals what
/// [`build_plan`] returns for the same parameters.
pub fn build_plans(
    map: &MapGeometry,
    sensors: &[Sensor],
    overrides: &OverrideTable,
    configs: &[PlanConfig],
) -> Vec<Plan> {
    configs
        .par_iter()
        .map(|cfg| build_plan(map, sensors, overrides, cfg))
        .collect()
}

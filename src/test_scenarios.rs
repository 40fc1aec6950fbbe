use crate::assignment::{AssignmentReason, UnplacedReason};
use crate::config::{ActiveFilter, PlanConfig, StitchConfig};
use crate::geometry_utils::rects_overlap;
use crate::map_geometry::MapGeometry;
use crate::overrides::OverrideTable;
use crate::pipeline::{build_plan, build_plans};
use crate::plan::{Plan, StationSource};
use crate::sensor_text::{parse_sensor_source, parse_sensor_text};
use geo_types::{Coord, Rect};

const TWO_LINES: &str = r##"{
    "groups": [
        { "id": 10, "name": "GroupA", "color": "#e74c3c", "polylines": [[[0, 0], [100, 0]]] },
        { "id": 11, "name": "GroupB", "color": "#2ecc71", "polylines": [[[0, 20], [100, 20]]] }
    ]
}"##;

// Four sensors close to GroupA and one marginally closer to GroupB, all kg 5
const KG_FIVE: &str = "\
[Main collector]
1 T1 Inlet valve 1 5 40 10 4 0 0 a1
2 T2 Pump house 1 5 40 30 4 0 0 a2
3 T3 Crossing 1 5 40 50 4 0 0 a3
4 T4 Outlet 1 5 40 70 4 0 0 a4
5 T5 Junction 1 5 40 90 11 0 0 a5
";

fn reasons(plan: &Plan, line: usize) -> Vec<AssignmentReason> {
    plan.lines[line]
        .stations
        .iter()
        .filter_map(|s| match &s.source {
            StationSource::Sensor { reason, .. } => Some(*reason),
            StationSource::Pseudo => None,
        })
        .collect()
}

fn sensor_count(plan: &Plan, line: usize) -> usize {
    reasons(plan, line).len()
}

fn config() -> PlanConfig {
    PlanConfig {
        pseudo_station_count: 3,
        ..PlanConfig::default()
    }
}

#[test]
fn test_scenario_a_fragments_join() {
    let map = MapGeometry::from_json_str(
        r#"{"groups": [{"name": "A", "polylines": [[[0, 0], [10, 0]], [[10, 0], [20, 0]]]}]}"#,
    )
    .unwrap();
    let cfg = PlanConfig {
        stitch: StitchConfig {
            join_distance: 1.0,
            join_angle_deg: 10.0,
            ..StitchConfig::default()
        },
        ..config()
    };
    let plan = build_plan(&map, &[], &OverrideTable::new(), &cfg);

    let stats = &plan.diagnostics.stitch[0];
    assert_eq!(stats.fragments, 2);
    assert_eq!(stats.paths, 1);
    assert_eq!(stats.joins, 1);
    assert!(!stats.cap_exhausted);

    let path = &plan.lines[0].paths[0];
    assert_eq!(path[0], [40.0, 40.0]);
    assert_eq!(path[path.len() - 1], [984.0, 40.0]);
}

#[test]
fn test_scenario_b_kg_median_outvotes_nearest() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(KG_FIVE);
    assert_eq!(sensors.len(), 5);

    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    assert_eq!(reasons(&plan, 0), vec![AssignmentReason::Kg; 5]);
    assert_eq!(sensor_count(&plan, 1), 0);
    assert_eq!(plan.diagnostics.reason_counts.kg, 5);
    assert_eq!(plan.lines[0].kgs, vec![5]);
    assert_eq!(plan.kg_list, vec![5]);
}

#[test]
fn test_scenario_c_override_wins() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let mut text = KG_FIVE.to_string();
    // Different kp and kg, a bucket of its own on the nearest line
    text.push_str("6 T6 Vent 2 8 40 50 1 0 0 a6\n");
    let sensors = parse_sensor_text(&text);
    let overrides = OverrideTable::from_json_str(r#"{"1|5": "GroupB"}"#).unwrap();

    let plan = build_plan(&map, &sensors, &overrides, &config());
    assert_eq!(reasons(&plan, 1), vec![AssignmentReason::Override; 5]);
    assert_eq!(reasons(&plan, 0), vec![AssignmentReason::Kg]);
    assert_eq!(plan.diagnostics.votes[1].override_hits, 5);
}

#[test]
fn test_color_group_outranks_kg_group() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_source(
        r#"{"sensors": [
            {"idx": 1, "code": "T1", "kp": 1, "kg": 7, "x": 40, "y": 17, "colorId": 9},
            {"idx": 2, "code": "T2", "kp": 1, "kg": 7, "x": 50, "y": 2},
            {"idx": 3, "code": "T3", "kp": 1, "kg": 7, "x": 60, "y": 3}
        ]}"#,
    );
    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    assert_eq!(reasons(&plan, 1), vec![AssignmentReason::Color]);
    assert_eq!(reasons(&plan, 0), vec![AssignmentReason::Kg; 2]);
}

#[test]
fn test_override_beats_proximity_under_header_kp_kg() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    // Header sets effective KP3 KG7, raw kg stays 2
    let sensors = parse_sensor_text("KP3 KG7\n1 T1 Gate valve 9 2 40 50 1 0 0 ab12\n");
    let overrides = OverrideTable::from_json_str(r#"{"3|7": "GroupB"}"#).unwrap();
    let plan = build_plan(&map, &sensors, &overrides, &config());
    assert_eq!(reasons(&plan, 1), vec![AssignmentReason::Override]);
    assert_eq!(plan.lines[1].kgs, vec![2]);

    // The raw alias is accepted as a second key
    let alias = OverrideTable::from_json_str(r#"{"3|2": "1"}"#).unwrap();
    let plan = build_plan(&map, &sensors, &alias, &config());
    assert_eq!(reasons(&plan, 1), vec![AssignmentReason::Override]);
}

#[test]
fn test_scenario_d_pseudo_stations_for_empty_line() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(KG_FIVE);
    let cfg = PlanConfig {
        pseudo_station_count: 5,
        ..PlanConfig::default()
    };
    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &cfg);

    let line = &plan.lines[1];
    assert_eq!(line.stations.len(), 5);
    let labels: Vec<&str> = line.stations.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["S1", "S2", "S3", "S4", "S5"]);
    let path = &line.paths[0];
    for (i, s) in line.stations.iter().enumerate() {
        assert_eq!(s.source, StationSource::Pseudo);
        assert!((s.position - i as f64 / 4.0).abs() < 1e-9);
        // On the horizontal path
        assert!((s.point[1] - path[0][1]).abs() < 1e-9);
    }
    assert_eq!(plan.diagnostics.reason_counts.pseudo, 5);
}

#[test]
fn test_stations_ordered_by_position() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(
        "3 T3 C 1 5 40 90 2 0 0 c\n1 T1 A 1 5 40 10 2 0 0 a\n2 T2 B 1 5 40 50 2 0 0 b\n",
    );
    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    let labels: Vec<&str> = plan.lines[0].stations.iter().map(|s| s.label.as_str()).collect();
    assert_eq!(labels, vec!["T1", "T2", "T3"]);
}

#[test]
fn test_unplaced_reasons_reported() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_source(
        r#"{"sensors": [{"idx": 7, "code": "T7", "kp": 1, "kg": 5, "x": null, "y": null}]}"#,
    );
    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    assert_eq!(plan.diagnostics.unplaced.len(), 1);
    assert_eq!(plan.diagnostics.unplaced[0].idx, 7);
    assert_eq!(plan.diagnostics.unplaced[0].reason, UnplacedReason::MissingCoordinates);
    assert_eq!(plan.station_count(), 6);
}

#[test]
fn test_empty_inputs_give_default_canvas() {
    let sensors = parse_sensor_text(KG_FIVE);
    let plan = build_plan(&MapGeometry::default(), &sensors, &OverrideTable::new(), &config());
    assert_eq!(plan.width, 1024.0);
    assert_eq!(plan.height, 600.0);
    assert!(plan.lines.is_empty());
    assert!(plan.diagnostics.transform.is_none());
    assert_eq!(plan.diagnostics.unplaced.len(), 5);
    assert!(plan
        .diagnostics
        .unplaced
        .iter()
        .all(|u| u.reason == UnplacedReason::NoCandidateLine));

    let empty = build_plan(
        &MapGeometry::from_json_or_empty("not json"),
        &parse_sensor_text(""),
        &OverrideTable::from_json_or_empty(""),
        &config(),
    );
    assert!(empty.lines.is_empty());
    assert_eq!(empty.station_count(), 0);
}

#[test]
fn test_view_geometry_within_padding() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(KG_FIVE);
    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    let pad = config().padding;
    let eps = 1e-9;
    for line in &plan.lines {
        for p in line.paths.iter().flatten() {
            assert!(p[0] >= pad - eps && p[0] <= plan.width - pad + eps);
            assert!(p[1] >= pad - eps && p[1] <= plan.height - pad + eps);
        }
    }
}

#[test]
fn test_accepted_labels_do_not_overlap() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(KG_FIVE);
    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    let boxes: Vec<Rect<f64>> = plan
        .lines
        .iter()
        .flat_map(|l| l.stations.iter())
        .filter(|s| !s.label_forced)
        .map(|s| {
            Rect::new(
                Coord { x: s.label_box.min[0], y: s.label_box.min[1] },
                Coord { x: s.label_box.max[0], y: s.label_box.max[1] },
            )
        })
        .collect();
    assert!(!boxes.is_empty());
    for (i, a) in boxes.iter().enumerate() {
        for b in boxes.iter().skip(i + 1) {
            assert!(!rects_overlap(a, b));
        }
    }
}

#[test]
fn test_kp_kg_filter_dims_other_lines() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(KG_FIVE);
    let cfg = PlanConfig {
        active_filter: ActiveFilter::KpKg { kp: 1, kg: 5 },
        ..config()
    };
    let plan = build_plan(&map, &sensors, &OverrideTable::new(), &cfg);
    assert!(!plan.lines[0].dimmed);
    assert!(plan.lines[1].dimmed);
    assert_eq!(plan.lines[0].stations.iter().filter(|s| s.dimmed).count(), 0);
}

#[test]
fn test_rebuild_is_deterministic() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(KG_FIVE);
    let a = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    let b = build_plan(&map, &sensors, &OverrideTable::new(), &config());
    assert_eq!(a, b);
    assert_eq!(
        serde_json::to_string(&a).unwrap(),
        serde_json::to_string(&b).unwrap()
    );
}

#[test]
fn test_parallel_sweep_matches_sequential() {
    let map = MapGeometry::from_json_str(TWO_LINES).unwrap();
    let sensors = parse_sensor_text(KG_FIVE);
    let overrides = OverrideTable::from_json_str(r#"{"1|5": "GroupB"}"#).unwrap();
    let configs: Vec<PlanConfig> = (0..8)
        .map(|i| PlanConfig {
            target_width: 600.0 + 50.0 * i as f64,
            smooth_passes: i % 4,
            snap_strength: 12.5 * i as f64,
            ..config()
        })
        .collect();

    let parallel = build_plans(&map, &sensors, &overrides, &configs);
    assert_eq!(parallel.len(), configs.len());
    for (plan, cfg) in parallel.iter().zip(&configs) {
        assert_eq!(plan, &build_plan(&map, &sensors, &overrides, cfg));
        assert_eq!(plan.width, cfg.target_width);
    }
}

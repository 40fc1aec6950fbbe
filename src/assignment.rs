//! Sensor-to-line resolution.
//!
//! Every sensor is measured against the raw skeleton of every group first. The
//! measurements feed one tallying pass that builds the vote book (override
//! lookups, color plurality, kg medians), and a second pass walks each sensor
//! through the cascade override > color > kg > nearest. The first signal that
//! names a usable group wins.

use crate::geometry_utils::{Polyline, PolylineProjection, polyline_length, project_point_to_polyline};
use crate::map_geometry::LineGroup;
use crate::overrides::{OverrideTable, resolve_target};
use crate::sensor_text::Sensor;
use ahash::{HashMap, HashMapExt};
use log::{debug, info, trace, warn};
use ordered_float::OrderedFloat;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AssignmentReason {
    Override,
    Color,
    Kg,
    Nearest,
}

impl AssignmentReason {
    /// Resolution order, highest priority first.
    pub const CASCADE: [AssignmentReason; 4] = [
        AssignmentReason::Override,
        AssignmentReason::Color,
        AssignmentReason::Kg,
        AssignmentReason::Nearest,
    ];
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnplacedReason {
    MissingCoordinates,
    NoCandidateLine,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Assigned {
        group: usize,
        reason: AssignmentReason,
    },
    Unplaced {
        reason: UnplacedReason,
    },
}

/// Closest approach of a sensor to one group's skeleton.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LineHit {
    pub path: usize,
    pub projection: PolylineProjection,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    /// Index into the sensor slice
    pub sensor: usize,
    pub group: usize,
    pub path: usize,
    /// Normalized position along `path`, in [0, 1]
    pub position: f64,
    /// Raw distance from the sensor to `path`
    pub distance: f64,
    pub reason: AssignmentReason,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Unplaced {
    pub sensor: usize,
    pub reason: UnplacedReason,
}

/// Synthetic station for a group that received no sensors.
#[derive(Debug, Clone, PartialEq)]
pub struct PseudoStation {
    pub group: usize,
    pub path: usize,
    pub position: f64,
    pub label: String,
}

/// Per-group vote tallies, read-only diagnostics.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct GroupVotes {
    pub group: usize,
    /// Sensors whose nearest line is this group
    pub nearest_votes: usize,
    /// Sensors whose nearest vote went to this group inside a voting color bucket
    pub color_votes: usize,
    pub color_buckets_won: usize,
    pub kg_buckets_won: usize,
    /// Sensors with an override entry naming this group
    pub override_hits: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReasonCounts {
    #[serde(rename = "override")]
    pub override_: usize,
    pub color: usize,
    pub kg: usize,
    pub nearest: usize,
    pub unplaced: usize,
    pub pseudo: usize,
}

impl ReasonCounts {
    fn record(&mut self, reason: AssignmentReason) {
        match reason {
            AssignmentReason::Override => self.override_ += 1,
            AssignmentReason::Color => self.color += 1,
            AssignmentReason::Kg => self.kg += 1,
            AssignmentReason::Nearest => self.nearest += 1,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AssignmentResult {
    pub assignments: Vec<Assignment>,
    pub unplaced: Vec<Unplaced>,
    pub pseudo_stations: Vec<PseudoStation>,
    pub votes: Vec<GroupVotes>,
    pub counts: ReasonCounts,
}

#[derive(Debug, Clone, Copy)]
pub struct AssignmentConfig {
    pub min_vote_sensors: usize,
    pub pseudo_station_count: usize,
}

/// Best hit of `point` on any path of one skeleton, first path wins ties.
pub fn nearest_on_skeleton(point: geo_types::Coord<f64>, paths: &[Polyline]) -> Option<LineHit> {
    let mut best: Option<LineHit> = None;
    for (path, coords) in paths.iter().enumerate() {
        if let Some(projection) = project_point_to_polyline(point, coords) {
            if best.map_or(true, |b| projection.distance < b.projection.distance) {
                best = Some(LineHit { path, projection });
            }
        }
    }
    best
}

/// Measurements of one sensor against every group.
struct SensorReach {
    per_group: Vec<Option<LineHit>>,
    /// Group of the overall closest approach, first group wins ties
    nearest: Option<usize>,
}

fn measure(sensor: &Sensor, skeletons: &[Vec<Polyline>]) -> Option<SensorReach> {
    let point = sensor.position()?;
    let per_group: Vec<Option<LineHit>> = skeletons
        .iter()
        .map(|paths| nearest_on_skeleton(point, paths))
        .collect();

    let mut nearest: Option<(usize, f64)> = None;
    for (group, hit) in per_group.iter().enumerate() {
        if let Some(hit) = hit {
            if nearest.map_or(true, |(_, d)| hit.projection.distance < d) {
                nearest = Some((group, hit.projection.distance));
            }
        }
    }
    Some(SensorReach {
        per_group,
        nearest: nearest.map(|(g, _)| g),
    })
}

fn median(values: &mut [f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    values.sort_by(|a, b| a.total_cmp(b));
    let mid = values.len() / 2;
    if values.len() % 2 == 1 {
        Some(values[mid])
    } else {
        Some((values[mid - 1] + values[mid]) / 2.0)
    }
}

/// Tally of nearest votes inside one color bucket.
struct ColorBucket {
    members: usize,
    counts: Vec<usize>,
    /// Order in which each group first received a vote
    first_seen: Vec<Option<usize>>,
    seen: usize,
}

impl ColorBucket {
    fn new(groups: usize) -> Self {
        Self {
            members: 0,
            counts: vec![0; groups],
            first_seen: vec![None; groups],
            seen: 0,
        }
    }

    fn vote(&mut self, group: usize) {
        self.counts[group] += 1;
        if self.first_seen[group].is_none() {
            self.first_seen[group] = Some(self.seen);
            self.seen += 1;
        }
    }

    /// Plurality winner, ties go to the group voted for first.
    fn winner(&self) -> Option<usize> {
        let mut best: Option<usize> = None;
        for (group, &count) in self.counts.iter().enumerate() {
            if count == 0 {
                continue;
            }
            best = match best {
                None => Some(group),
                Some(b) if count > self.counts[b] => Some(group),
                Some(b) if count == self.counts[b] && self.first_seen[group] < self.first_seen[b] => {
                    Some(group)
                }
                keep => keep,
            };
        }
        best
    }
}

/// Outcome of the tallying pass, consumed by the resolution pass.
struct VoteBook {
    overrides: Vec<Option<usize>>,
    color_winner: HashMap<u32, usize>,
    kg_winner: HashMap<u32, usize>,
    votes: Vec<GroupVotes>,
}

impl VoteBook {
    fn tally(
        sensors: &[Sensor],
        reach: &[Option<SensorReach>],
        groups: &[LineGroup],
        overrides: &OverrideTable,
        cfg: &AssignmentConfig,
    ) -> VoteBook {
        let n_groups = groups.len();
        let mut votes: Vec<GroupVotes> = (0..n_groups)
            .map(|group| GroupVotes {
                group,
                ..Default::default()
            })
            .collect();

        // Overrides, one resolution per distinct target
        let mut resolved: HashMap<String, Option<usize>> = HashMap::new();
        let mut lookup = |key: &str| -> Option<usize> {
            let target = overrides.get(key)?;
            *resolved.entry(target.to_string()).or_insert_with(|| {
                let group = resolve_target(target, groups);
                if group.is_none() {
                    warn!("Override target '{}' does not name any line group", target);
                }
                group
            })
        };
        let override_groups: Vec<Option<usize>> = sensors
            .iter()
            .map(|s| {
                if overrides.is_empty() {
                    return None;
                }
                lookup(&s.override_key()).or_else(|| lookup(&s.raw_override_key()))
            })
            .collect();
        for group in override_groups.iter().flatten() {
            votes[*group].override_hits += 1;
        }

        // Nearest votes and color buckets
        let mut color_buckets: HashMap<u32, ColorBucket> = HashMap::new();
        let mut kg_members: HashMap<u32, Vec<usize>> = HashMap::new();
        for (i, sensor) in sensors.iter().enumerate() {
            let Some(r) = &reach[i] else {
                continue;
            };
            let Some(nearest) = r.nearest else {
                continue;
            };
            votes[nearest].nearest_votes += 1;
            if let Some(color) = sensor.color_id {
                let bucket = color_buckets
                    .entry(color)
                    .or_insert_with(|| ColorBucket::new(n_groups));
                bucket.members += 1;
                bucket.vote(nearest);
            }
            kg_members.entry(sensor.kg).or_default().push(i);
        }

        let mut color_winner = HashMap::new();
        for (color, bucket) in &color_buckets {
            if bucket.members < cfg.min_vote_sensors {
                continue;
            }
            for (group, count) in bucket.counts.iter().enumerate() {
                votes[group].color_votes += count;
            }
            if let Some(winner) = bucket.winner() {
                trace!("Color {} votes for group {}", color, winner);
                votes[winner].color_buckets_won += 1;
                color_winner.insert(*color, winner);
            }
        }

        // Kg buckets pick the group with the smallest median distance
        let mut kg_winner = HashMap::new();
        for (kg, members) in &kg_members {
            if members.len() < cfg.min_vote_sensors {
                continue;
            }
            let mut best: Option<(usize, OrderedFloat<f64>)> = None;
            for group in 0..n_groups {
                let mut distances: Vec<f64> = members
                    .iter()
                    .filter_map(|&i| reach[i].as_ref()?.per_group[group])
                    .map(|hit| hit.projection.distance)
                    .collect();
                if distances.len() < members.len() {
                    // Group has no usable path
                    continue;
                }
                let Some(m) = median(&mut distances) else {
                    continue;
                };
                let m = OrderedFloat(m);
                if best.map_or(true, |(_, d)| m < d) {
                    best = Some((group, m));
                }
            }
            if let Some((winner, m)) = best {
                trace!("KG {} votes for group {} (median {:.2})", kg, winner, m.0);
                votes[winner].kg_buckets_won += 1;
                kg_winner.insert(*kg, winner);
            }
        }

        VoteBook {
            overrides: override_groups,
            color_winner,
            kg_winner,
            votes,
        }
    }

    fn vote(&self, reason: AssignmentReason, i: usize, sensor: &Sensor, reach: &SensorReach) -> Option<usize> {
        match reason {
            AssignmentReason::Override => self.overrides[i],
            AssignmentReason::Color => sensor.color_id.and_then(|c| self.color_winner.get(&c).copied()),
            AssignmentReason::Kg => self.kg_winner.get(&sensor.kg).copied(),
            AssignmentReason::Nearest => reach.nearest,
        }
    }

    /// Walk the cascade; a signal naming a group without a usable path falls through.
    fn resolve(&self, i: usize, sensor: &Sensor, reach: Option<&SensorReach>) -> Resolution {
        let Some(reach) = reach else {
            return Resolution::Unplaced {
                reason: UnplacedReason::MissingCoordinates,
            };
        };
        for reason in AssignmentReason::CASCADE {
            let Some(group) = self.vote(reason, i, sensor, reach) else {
                continue;
            };
            if reach.per_group.get(group).copied().flatten().is_some() {
                return Resolution::Assigned { group, reason };
            }
            debug!(
                "Sensor {} ({}): {:?} names group {} which has no path",
                sensor.idx, sensor.code, reason, group
            );
        }
        Resolution::Unplaced {
            reason: UnplacedReason::NoCandidateLine,
        }
    }
}

/// Evenly spaced positions, both ends included.
fn pseudo_positions(n: usize) -> Vec<f64> {
    match n {
        0 => vec![],
        1 => vec![0.5],
        _ => (0..n).map(|i| i as f64 / (n - 1) as f64).collect(),
    }
}

fn longest_path(paths: &[Polyline]) -> Option<usize> {
    let mut best: Option<(usize, f64)> = None;
    for (i, p) in paths.iter().enumerate() {
        if p.len() < 2 {
            continue;
        }
        let len = polyline_length(p);
        if best.map_or(true, |(_, l)| len > l) {
            best = Some((i, len));
        }
    }
    best.map(|(i, _)| i)
}

/// Resolve the owning line and position of every sensor.
///
/// `skeletons[g]` holds the raw (untransformed) simplified paths of `groups[g]`.
pub fn assign_sensors(
    groups: &[LineGroup],
    skeletons: &[Vec<Polyline>],
    sensors: &[Sensor],
    overrides: &OverrideTable,
    cfg: &AssignmentConfig,
) -> AssignmentResult {
    let reach: Vec<Option<SensorReach>> = sensors.iter().map(|s| measure(s, skeletons)).collect();
    let book = VoteBook::tally(sensors, &reach, groups, overrides, cfg);

    let mut assignments = Vec::new();
    let mut unplaced = Vec::new();
    let mut counts = ReasonCounts::default();

    for (i, sensor) in sensors.iter().enumerate() {
        match book.resolve(i, sensor, reach[i].as_ref()) {
            Resolution::Assigned { group, reason } => {
                let Some(hit) = reach[i].as_ref().and_then(|r| r.per_group[group]) else {
                    continue;
                };
                counts.record(reason);
                assignments.push(Assignment {
                    sensor: i,
                    group,
                    path: hit.path,
                    position: hit.projection.fraction(),
                    distance: hit.projection.distance,
                    reason,
                });
            }
            Resolution::Unplaced { reason } => {
                debug!("Sensor {} ({}) unplaced: {:?}", sensor.idx, sensor.code, reason);
                counts.unplaced += 1;
                unplaced.push(Unplaced { sensor: i, reason });
            }
        }
    }

    // Groups left without sensors get synthetic stations
    let mut has_sensor = vec![false; skeletons.len()];
    for a in &assignments {
        has_sensor[a.group] = true;
    }
    let mut pseudo_stations = Vec::new();
    for (group, paths) in skeletons.iter().enumerate() {
        if has_sensor[group] {
            continue;
        }
        let Some(path) = longest_path(paths) else {
            continue;
        };
        for (k, position) in pseudo_positions(cfg.pseudo_station_count).into_iter().enumerate() {
            pseudo_stations.push(PseudoStation {
                group,
                path,
                position,
                label: format!("S{}", k + 1),
            });
        }
    }
    counts.pseudo = pseudo_stations.len();

    info!(
        "Assigned {} sensors (override {}, color {}, kg {}, nearest {}), {} unplaced, {} pseudo-stations",
        assignments.len(),
        counts.override_,
        counts.color,
        counts.kg,
        counts.nearest,
        counts.unplaced,
        counts.pseudo
    );

    AssignmentResult {
        assignments,
        unplaced,
        pseudo_stations,
        votes: book.votes,
        counts,
    }
}

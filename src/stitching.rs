use crate::config::StitchConfig;
use crate::geometry_utils::{Polyline, angle_between_deg, distance, unit_direction};
use crate::map_geometry::Fragment;
use geo_types::Coord;
use log::{debug, warn};

/// Which end of a path takes part in a join.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum End {
    Start,
    End,
}

/// Candidate joins of a pair, in the order they are tried.
const JOIN_ORDER: [(End, End); 4] = [
    (End::End, End::Start),
    (End::End, End::End),
    (End::Start, End::Start),
    (End::Start, End::End),
];

#[derive(Debug, Clone, PartialEq)]
pub struct StitchResult {
    pub paths: Vec<Polyline>,
    pub joins: usize,
    /// The iteration cap stopped the scan before a fixed point
    pub cap_exhausted: bool,
}

fn endpoint(path: &[Coord<f64>], end: End) -> Coord<f64> {
    match end {
        End::Start => path[0],
        End::End => path[path.len() - 1],
    }
}

/// Direction leaving the path through `end`, from the second-nearest to the nearest point.
fn outward_tangent(path: &[Coord<f64>], end: End) -> Coord<f64> {
    let n = path.len();
    let (from, to) = match end {
        End::Start => (path[1], path[0]),
        End::End => (path[n - 2], path[n - 1]),
    };
    unit_direction(from, to).unwrap_or(Coord { x: 1.0, y: 0.0 })
}

fn joinable(a: &[Coord<f64>], a_end: End, b: &[Coord<f64>], b_end: End, cfg: &StitchConfig) -> bool {
    if distance(endpoint(a, a_end), endpoint(b, b_end)) > cfg.join_distance {
        return false;
    }
    // Continuing through the join means entering B against its outward tangent.
    let leaving_a = outward_tangent(a, a_end);
    let out_of_b = outward_tangent(b, b_end);
    let entering_b = Coord {
        x: -out_of_b.x,
        y: -out_of_b.y,
    };
    angle_between_deg(leaving_a, entering_b) <= cfg.join_angle_deg
}

/// Orient A and B so the end of A meets the start of B and concatenate, dropping the shared point.
fn join(mut a: Polyline, a_end: End, mut b: Polyline, b_end: End) -> Polyline {
    if a_end == End::Start {
        a.reverse();
    }
    if b_end == End::End {
        b.reverse();
    }
    a.extend(b.into_iter().skip(1));
    a
}

/// Find the first joinable pair in scan order: outer index ascending, inner ascending,
/// then the fixed candidate order.
fn find_join(paths: &[Polyline], cfg: &StitchConfig) -> Option<(usize, usize, End, End)> {
    for i in 0..paths.len() {
        for j in (i + 1)..paths.len() {
            let (a, b) = (&paths[i], &paths[j]);
            if a.len() < 2 || b.len() < 2 {
                continue;
            }
            for &(a_end, b_end) in JOIN_ORDER.iter() {
                if joinable(a, a_end, b, b_end, cfg) {
                    return Some((i, j, a_end, b_end));
                }
            }
        }
    }
    None
}

/// Greedily join paths until no pair joins or the iteration cap is reached.
///
/// The scan restarts from the first pair after every join, so the result only
/// depends on the input order and the tolerances.
pub fn stitch_paths(paths: Vec<Polyline>, cfg: &StitchConfig) -> StitchResult {
    let mut paths = paths;
    let mut joins = 0;

    if paths.len() <= 1 {
        return StitchResult {
            paths,
            joins,
            cap_exhausted: false,
        };
    }

    while joins < cfg.max_iterations {
        let Some((i, j, a_end, b_end)) = find_join(&paths, cfg) else {
            return StitchResult {
                paths,
                joins,
                cap_exhausted: false,
            };
        };
        let b = paths.remove(j);
        let a = std::mem::take(&mut paths[i]);
        paths[i] = join(a, a_end, b, b_end);
        joins += 1;
    }

    let cap_exhausted = find_join(&paths, cfg).is_some();
    if cap_exhausted {
        warn!(
            "Stitching stopped at the iteration cap ({}) with {} paths left",
            cfg.max_iterations,
            paths.len()
        );
    }
    StitchResult {
        paths,
        joins,
        cap_exhausted,
    }
}

pub fn stitch_fragments(fragments: &[Fragment], cfg: &StitchConfig) -> StitchResult {
    let result = stitch_paths(
        fragments.iter().map(|f| f.points().to_vec()).collect(),
        cfg,
    );
    debug!(
        "Stitched {} fragments into {} paths ({} joins)",
        fragments.len(),
        result.paths.len(),
        result.joins
    );
    result
}

use crate::geometry_utils::{Polyline, lerp};
use geo::Simplify;
use geo_types::{Coord, LineString};

/// Douglas-Peucker simplification.
///
/// Splits at the vertex deviating most from the chord between the endpoints
/// while that deviation exceeds `epsilon`. Paths with fewer than 3 points
/// come back unchanged.
pub fn simplify_path(path: &[Coord<f64>], epsilon: f64) -> Polyline {
    if path.len() < 3 {
        return path.to_vec();
    }
    let line = LineString::new(path.to_vec());
    line.simplify(&epsilon).0
}

/// Chaikin corner cutting.
///
/// Each pass replaces every edge by the points at 25% and 75% of it. The
/// first and last points are kept exactly.
pub fn smooth_path(path: &[Coord<f64>], passes: u32) -> Polyline {
    if path.len() < 3 {
        return path.to_vec();
    }
    (0..passes).fold(path.to_vec(), |line, _| {
        let (first, last) = (line[0], line[line.len() - 1]);
        std::iter::once(first)
            .chain(
                line.windows(2)
                    .flat_map(|edge| [lerp(edge[0], edge[1], 0.25), lerp(edge[0], edge[1], 0.75)]),
            )
            .chain(std::iter::once(last))
            .collect()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn zigzag() -> Polyline {
        vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 1.0, y: 0.4 },
            Coord { x: 2.0, y: -0.3 },
            Coord { x: 3.0, y: 2.5 },
            Coord { x: 4.0, y: 0.1 },
            Coord { x: 5.0, y: 6.0 },
            Coord { x: 6.0, y: 5.8 },
            Coord { x: 7.0, y: 0.0 },
        ]
    }

    #[test]
    fn test_simplify_collapses_straight_line() {
        let line = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 5.0, y: 0.1 },
            Coord { x: 10.0, y: 0.0 },
        ];
        let out = simplify_path(&line, 1.0);
        assert_eq!(out, vec![line[0], line[2]]);
    }

    #[test]
    fn test_simplify_short_paths_unchanged() {
        let line = vec![Coord { x: 0.0, y: 0.0 }, Coord { x: 5.0, y: 5.0 }];
        assert_eq!(simplify_path(&line, 100.0), line);
    }

    #[test]
    fn test_simplify_monotonic_in_epsilon() {
        let line = zigzag();
        let epsilons = [0.0, 0.2, 0.5, 1.0, 2.0, 3.0, 10.0];
        let counts: Vec<usize> = epsilons.iter().map(|&e| simplify_path(&line, e).len()).collect();
        for pair in counts.windows(2) {
            assert!(pair[0] >= pair[1], "counts {:?}", counts);
        }
        assert_eq!(*counts.last().unwrap(), 2);
    }

    #[test]
    fn test_smooth_zero_passes_is_identity() {
        let line = zigzag();
        assert_eq!(smooth_path(&line, 0), line);
    }

    #[test]
    fn test_smooth_keeps_endpoints() {
        let line = zigzag();
        for passes in 1..=3 {
            let out = smooth_path(&line, passes);
            assert_eq!(out[0], line[0]);
            assert_eq!(out[out.len() - 1], line[line.len() - 1]);
        }
    }

    #[test]
    fn test_smooth_single_pass_points() {
        let line = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 10.0, y: 10.0 },
            Coord { x: 20.0, y: 0.0 },
        ];
        let out = smooth_path(&line, 1);
        // start + 2 per edge + end
        assert_eq!(out.len(), 6);
        assert_eq!(out[1], Coord { x: 2.5, y: 2.5 });
        assert_eq!(out[2], Coord { x: 7.5, y: 7.5 });
        assert_eq!(out[3], Coord { x: 12.5, y: 7.5 });
        assert_eq!(out[4], Coord { x: 17.5, y: 2.5 });
    }

    #[test]
    fn test_smooth_point_count_per_pass() {
        let line = zigzag();
        // n points -> 2(n - 1) + 2
        assert_eq!(smooth_path(&line, 1).len(), 16);
        assert_eq!(smooth_path(&line, 2).len(), 32);
    }

    #[test]
    fn test_simplify_keeps_sharp_corner() {
        let line = vec![
            Coord { x: 0.0, y: 0.0 },
            Coord { x: 5.0, y: 8.0 },
            Coord { x: 10.0, y: 0.0 },
        ];
        assert_eq!(simplify_path(&line, 2.0), line);
    }
}

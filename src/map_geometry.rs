use crate::geometry_utils::Polyline;
use geo_types::Coord;
use log::warn;
use serde::Deserialize;

/// An unjoined raw polyline with at least two points.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment(Polyline);

impl Fragment {
    pub fn new(points: Polyline) -> Option<Fragment> {
        if points.len() < 2 {
            return None;
        }
        Some(Fragment(points))
    }

    pub fn points(&self) -> &[Coord<f64>] {
        &self.0
    }
}

/// One colored line of the source map, as extracted, before any stitching.
#[derive(Debug, Clone, PartialEq)]
pub struct LineGroup {
    /// Position of the group in the source file
    pub index: usize,
    pub id: Option<String>,
    pub name: Option<String>,
    pub color: Option<String>,
    pub fragments: Vec<Fragment>,
}

impl LineGroup {
    /// Name for logs and labels, falling back to the positional index.
    pub fn display_name(&self) -> String {
        self.name
            .clone()
            .or_else(|| self.id.clone())
            .unwrap_or_else(|| format!("group {}", self.index))
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MapGeometry {
    pub groups: Vec<LineGroup>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(i64),
    Text(String),
}

#[derive(Deserialize)]
struct RawGroup {
    id: Option<RawId>,
    name: Option<String>,
    color: Option<String>,
    #[serde(default)]
    polylines: Vec<Vec<[f64; 2]>>,
}

#[derive(Deserialize)]
struct RawMap {
    #[serde(default)]
    groups: Vec<RawGroup>,
}

impl MapGeometry {
    pub fn from_json_str(text: &str) -> Result<MapGeometry, serde_json::Error> {
        let raw: RawMap = serde_json::from_str(text)?;

        let groups = raw
            .groups
            .into_iter()
            .enumerate()
            .map(|(index, g)| {
                let total = g.polylines.len();
                let fragments: Vec<Fragment> = g
                    .polylines
                    .into_iter()
                    .filter_map(|pl| {
                        let points: Polyline = pl
                            .into_iter()
                            .filter(|[x, y]| x.is_finite() && y.is_finite())
                            .map(|[x, y]| Coord { x, y })
                            .collect();
                        Fragment::new(points)
                    })
                    .collect();
                if fragments.len() < total {
                    warn!(
                        "Group {}: dropped {} polylines with fewer than 2 points",
                        index,
                        total - fragments.len()
                    );
                }
                LineGroup {
                    index,
                    id: g.id.map(|id| match id {
                        RawId::Number(n) => n.to_string(),
                        RawId::Text(s) => s,
                    }),
                    name: g.name,
                    color: g.color,
                    fragments,
                }
            })
            .collect();

        Ok(MapGeometry { groups })
    }

    /// Parse map JSON, treating unreadable geometry as an empty map.
    pub fn from_json_or_empty(text: &str) -> MapGeometry {
        match MapGeometry::from_json_str(text) {
            Ok(map) => map,
            Err(e) => {
                warn!("Map geometry is not valid JSON, using an empty map: {}", e);
                MapGeometry::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_groups() {
        // Canvas size of the source drawing is not used
        let text = r##"{
            "width": 800, "height": 600,
            "groups": [
                {"id": 0, "name": "red", "color": "#e74c3c", "polylines": [[[0,0],[10,0]], [[5,5]]]},
                {"id": "b", "polylines": []}
            ]
        }"##;
        let map = MapGeometry::from_json_str(text).unwrap();
        assert_eq!(map.groups.len(), 2);
        assert_eq!(map.groups[0].id.as_deref(), Some("0"));
        assert_eq!(map.groups[0].fragments.len(), 1);
        assert_eq!(map.groups[0].fragments[0].points()[1], Coord { x: 10.0, y: 0.0 });
        assert_eq!(map.groups[1].display_name(), "b");
        assert!(map.groups[1].fragments.is_empty());
    }

    #[test]
    fn test_invalid_json_is_empty() {
        let map = MapGeometry::from_json_or_empty("not json");
        assert!(map.groups.is_empty());
    }
}

use crate::config::PlanConfig;
use crate::error::LoadError;
use crate::map_geometry::MapGeometry;
use crate::overrides::OverrideTable;
use crate::sensor_text::{Sensor, parse_sensor_source};
use log::{info, warn};
use std::path::Path;

async fn read_text(path: &Path) -> Result<String, LoadError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|e| LoadError::io(path, e))
}

pub async fn load_map(path: &Path) -> Result<MapGeometry, LoadError> {
    let text = read_text(path).await?;
    let map = MapGeometry::from_json_str(&text).map_err(|e| LoadError::json(path, e))?;
    info!("Loaded {} line groups from {}", map.groups.len(), path.display());
    Ok(map)
}

/// Sensor description text or converted sensor JSON. Bad lines are skipped, not errors.
pub async fn load_sensors(path: &Path) -> Result<Vec<Sensor>, LoadError> {
    let text = read_text(path).await?;
    let sensors = parse_sensor_source(&text);
    info!("Loaded {} sensors from {}", sensors.len(), path.display());
    Ok(sensors)
}

pub async fn load_overrides(path: &Path) -> Result<OverrideTable, LoadError> {
    let text = read_text(path).await?;
    OverrideTable::from_json_str(&text).map_err(|e| LoadError::json(path, e))
}

pub async fn load_config(path: &Path) -> Result<PlanConfig, LoadError> {
    let text = read_text(path).await?;
    serde_json::from_str(&text).map_err(|e| LoadError::json(path, e))
}

/// An unreadable source counts as an empty one.
pub fn or_empty<T: Default>(what: &str, loaded: Result<T, LoadError>) -> T {
    match loaded {
        Ok(value) => value,
        Err(e) => {
            warn!("{} unavailable, continuing without it: {}", what, e);
            T::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn scratch(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("sensorplan_{}_{}", std::process::id(), name));
        std::fs::write(&path, contents).unwrap();
        path
    }

    #[tokio::test]
    async fn test_missing_file_is_empty() {
        let path = Path::new("/nonexistent/sensorplan/map.json");
        let loaded = load_map(path).await;
        assert!(matches!(loaded, Err(LoadError::Io { .. })));
        assert_eq!(or_empty("map", loaded), MapGeometry::default());
    }

    #[tokio::test]
    async fn test_bad_json_is_reported() {
        let path = scratch("bad_overrides.json", "{not json");
        let loaded = load_overrides(&path).await;
        assert!(matches!(loaded, Err(LoadError::Json { .. })));
        assert!(or_empty("overrides", loaded).is_empty());
        std::fs::remove_file(path).ok();
    }

    #[tokio::test]
    async fn test_config_defaults_fill_gaps() {
        let path = scratch("config.json", r#"{"target_width": 800, "smooth_passes": 2}"#);
        let cfg = load_config(&path).await.unwrap();
        assert_eq!(cfg.target_width, 800.0);
        assert_eq!(cfg.smooth_passes, 2);
        assert_eq!(cfg.padding, PlanConfig::default().padding);
        std::fs::remove_file(path).ok();
    }
}

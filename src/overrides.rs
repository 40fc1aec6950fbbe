use crate::map_geometry::LineGroup;
use ahash::{HashMap, HashMapExt};
use log::warn;
use serde::Deserialize;

/// Manual corrections, keyed by `"kp|kg"`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OverrideTable {
    entries: HashMap<String, String>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTarget {
    Index(i64),
    Label(String),
}

impl OverrideTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, target: impl Into<String>) {
        self.entries.insert(key.into(), target.into());
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn from_json_str(text: &str) -> Result<OverrideTable, serde_json::Error> {
        let raw: HashMap<String, RawTarget> = serde_json::from_str(text)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for (key, target) in raw {
            let target = match target {
                RawTarget::Index(i) => i.to_string(),
                RawTarget::Label(s) => s,
            };
            entries.insert(key.trim().to_string(), target);
        }
        Ok(OverrideTable { entries })
    }

    pub fn from_json_or_empty(text: &str) -> OverrideTable {
        match OverrideTable::from_json_str(text) {
            Ok(table) => table,
            Err(e) => {
                warn!("Override table is not valid JSON, ignoring it: {}", e);
                OverrideTable::default()
            }
        }
    }
}

/// Resolve an override target to a group index.
///
/// Tried in order: declared name, declared color, declared id, positional index.
/// Names and colors compare case-insensitively.
pub fn resolve_target(target: &str, groups: &[LineGroup]) -> Option<usize> {
    let target = target.trim();
    let eq = |v: &Option<String>| v.as_deref().is_some_and(|v| v.trim().eq_ignore_ascii_case(target));

    groups
        .iter()
        .position(|g| eq(&g.name))
        .or_else(|| groups.iter().position(|g| eq(&g.color)))
        .or_else(|| groups.iter().position(|g| g.id.as_deref() == Some(target)))
        .or_else(|| {
            target
                .parse::<usize>()
                .ok()
                .filter(|&i| i < groups.len())
        })
}

//! Sensor description files.
//!
//! The files are hand maintained, one record per line, with optional header
//! lines that change the route context of the records below them:
//!
//! ```text
//! ; comment
//! [North line]
//! KP3 KG7
//! 12 T12 Pump house 2 2 40 1520 860 4 -6 1A2F
//! 13 T13 Pump house east 2 2 40 1580 866 0 0 1A30 T 4 2
//! ```
//!
//! Parsing is a fold of [`step`] over the lines; lines that fit no shape are dropped.

use geo_types::Coord;
use lazy_static::lazy_static;
use log::warn;
use regex::Regex;
use serde::{Deserialize, Serialize};

lazy_static! {
    static ref BRACKET_HEADER: Regex = Regex::new(r"^\s*\[(.+?)\]\s*$").unwrap();
    static ref LINE_HEADER: Regex =
        Regex::new(r"(?i)^\s*(?:LINIA|LINIE|LINE)[:\s-]+(.+?)\s*$").unwrap();
    static ref KP_KG_HEADER: Regex =
        Regex::new(r"(?i)^\s*KP\s*([0-9]+)\s*KG\s*([0-9]+)\s*$").unwrap();
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sensor {
    pub idx: u32,
    pub code: String,
    pub name: String,
    /// Collector column as written in the record
    pub collector: u32,
    /// Effective KP, the header override when one is active
    pub kp: u32,
    /// Effective KG, the header override when one is active
    pub kg: u32,
    /// KG column as written in the record, never overridden
    pub raw_kg: u32,
    pub limit: u32,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub dx: i32,
    pub dy: i32,
    pub serial: String,
    pub kind: Option<String>,
    pub code_id: Option<u32>,
    pub color_id: Option<u32>,
    /// Route name from the closest header above the record
    pub route: Option<String>,
}

impl Sensor {
    pub fn position(&self) -> Option<Coord<f64>> {
        match (self.x, self.y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some(Coord { x, y }),
            _ => None,
        }
    }

    /// Declared label offset, `None` when the record leaves it at zero.
    pub fn label_offset(&self) -> Option<Coord<f64>> {
        if self.dx == 0 && self.dy == 0 {
            return None;
        }
        Some(Coord {
            x: self.dx as f64,
            y: self.dy as f64,
        })
    }

    pub fn override_key(&self) -> String {
        format!("{}|{}", self.kp, self.kg)
    }

    pub fn raw_override_key(&self) -> String {
        format!("{}|{}", self.kp, self.raw_kg)
    }
}

/// Header context carried from one line to the next.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParserState {
    pub route: Option<String>,
    pub kp: Option<u32>,
    pub kg: Option<u32>,
}

/// Consume one line: either update the header context or emit a record.
pub fn step(state: ParserState, line: &str) -> (ParserState, Option<Sensor>) {
    let line = line.trim();
    if line.is_empty() || line.starts_with(';') || line.starts_with('#') {
        return (state, None);
    }

    let starts_with_digit = line.chars().next().is_some_and(|c| c.is_ascii_digit());
    if !starts_with_digit {
        if let Some(caps) = BRACKET_HEADER
            .captures(line)
            .or_else(|| LINE_HEADER.captures(line))
        {
            let next = ParserState {
                route: Some(caps[1].trim().to_string()),
                kp: None,
                kg: None,
            };
            return (next, None);
        }
        if let Some(caps) = KP_KG_HEADER.captures(line) {
            if let (Ok(kp), Ok(kg)) = (caps[1].parse::<u32>(), caps[2].parse::<u32>()) {
                let next = ParserState {
                    route: Some(format!("KP{} KG{}", kp, kg)),
                    kp: Some(kp),
                    kg: Some(kg),
                };
                return (next, None);
            }
        }
        return (state, None);
    }

    let record = parse_record(line, &state);
    (state, record)
}

/// Parse a whole file in order.
pub fn parse_sensor_text(text: &str) -> Vec<Sensor> {
    text.lines()
        .scan(ParserState::default(), |state, line| {
            let (next, record) = step(std::mem::take(state), line);
            *state = next;
            Some(record)
        })
        .flatten()
        .collect()
}

struct NumericTail {
    collector: u32,
    kg: u32,
    limit: u32,
    x: i64,
    y: i64,
    dx: i32,
    dy: i32,
    serial: String,
}

struct Extension {
    kind: String,
    code_id: u32,
    color_id: u32,
}

fn digits<T: std::str::FromStr>(token: &str) -> Option<T> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }
    token.parse().ok()
}

fn signed<T: std::str::FromStr>(token: &str) -> Option<T> {
    let body = token.strip_prefix('-').unwrap_or(token);
    digits::<u64>(body)?;
    token.parse().ok()
}

fn hex(token: &str) -> Option<String> {
    if token.is_empty() || !token.chars().all(|c| c.is_ascii_hexdigit()) {
        return None;
    }
    Some(token.to_ascii_uppercase())
}

fn is_code(token: &str) -> bool {
    !token.is_empty()
        && token
            .chars()
            .all(|c| c.is_ascii_uppercase() || c.is_ascii_digit())
}

fn numeric_tail(t: &[&str]) -> Option<NumericTail> {
    let [collector, kg, limit, x, y, dx, dy, serial] = t else {
        return None;
    };
    Some(NumericTail {
        collector: digits(collector)?,
        kg: digits(kg)?,
        limit: digits(limit)?,
        x: signed(x)?,
        y: signed(y)?,
        dx: signed(dx)?,
        dy: signed(dy)?,
        serial: hex(serial)?,
    })
}

fn extension(t: &[&str]) -> Option<Extension> {
    let [kind, code_id, color_id] = t else {
        return None;
    };
    if !kind.chars().all(char::is_alphabetic) {
        return None;
    }
    Some(Extension {
        kind: kind.to_string(),
        code_id: digits(code_id)?,
        color_id: digits(color_id)?,
    })
}

/// Split `tokens` (everything after idx) into a head and a numeric tail,
/// with or without the three trailing extension fields.
fn split_tail<'a>(tokens: &'a [&'a str]) -> Option<(&'a [&'a str], NumericTail, Option<Extension>)> {
    let n = tokens.len();
    if n >= 9 {
        if let Some(tail) = numeric_tail(&tokens[n - 8..]) {
            return Some((&tokens[..n - 8], tail, None));
        }
    }
    if n >= 12 {
        if let (Some(tail), Some(ext)) = (
            numeric_tail(&tokens[n - 11..n - 3]),
            extension(&tokens[n - 3..]),
        ) {
            return Some((&tokens[..n - 11], tail, Some(ext)));
        }
    }
    None
}

fn parse_record(line: &str, state: &ParserState) -> Option<Sensor> {
    let tokens: Vec<&str> = line.split_whitespace().collect();
    let (first, rest) = tokens.split_first()?;
    let idx: u32 = digits(first)?;
    let (head, tail, ext) = split_tail(rest)?;

    // A leading upper-case token is the code, unless it is the only head token.
    let (code, name_tokens) = match head.split_first() {
        Some((code, name)) if is_code(code) && !name.is_empty() => (code.to_string(), name),
        _ => (format!("S{}", idx), head),
    };
    if name_tokens.is_empty() {
        return None;
    }

    Some(Sensor {
        idx,
        code,
        name: name_tokens.join(" "),
        collector: tail.collector,
        kp: state.kp.unwrap_or(tail.collector),
        kg: state.kg.unwrap_or(tail.kg),
        raw_kg: tail.kg,
        limit: tail.limit,
        x: Some(tail.x as f64),
        y: Some(tail.y as f64),
        dx: tail.dx,
        dy: tail.dy,
        serial: tail.serial,
        kind: ext.as_ref().map(|e| e.kind.clone()),
        code_id: ext.as_ref().map(|e| e.code_id),
        color_id: ext.as_ref().map(|e| e.color_id),
        route: state.route.clone(),
    })
}

// --- Converted JSON sensor files ---

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct JsonSensor {
    idx: u32,
    code: Option<String>,
    #[serde(default)]
    name: String,
    #[serde(default)]
    collector: u32,
    kp: Option<u32>,
    #[serde(default)]
    kg: u32,
    aaa: Option<u32>,
    #[serde(default)]
    limit: u32,
    x: Option<f64>,
    y: Option<f64>,
    #[serde(default)]
    dx: i32,
    #[serde(default)]
    dy: i32,
    #[serde(default)]
    serial: String,
    #[serde(rename = "type")]
    kind: Option<String>,
    code_id: Option<u32>,
    color_id: Option<u32>,
    line: Option<String>,
}

#[derive(Deserialize)]
struct JsonSensorFile {
    #[serde(default)]
    sensors: Vec<JsonSensor>,
}

impl From<JsonSensor> for Sensor {
    fn from(s: JsonSensor) -> Self {
        Sensor {
            code: s.code.unwrap_or_else(|| format!("S{}", s.idx)),
            idx: s.idx,
            name: s.name.trim().to_string(),
            collector: s.collector,
            kp: s.kp.unwrap_or(s.collector),
            kg: s.kg,
            raw_kg: s.aaa.unwrap_or(s.kg),
            limit: s.limit,
            x: s.x,
            y: s.y,
            dx: s.dx,
            dy: s.dy,
            serial: s.serial.to_ascii_uppercase(),
            kind: s.kind,
            code_id: s.code_id,
            color_id: s.color_id,
            route: s.line,
        }
    }
}

/// Parse either a converted `.sensors.json` file or raw description text.
pub fn parse_sensor_source(text: &str) -> Vec<Sensor> {
    if text.trim_start().starts_with('{') {
        match serde_json::from_str::<JsonSensorFile>(text) {
            Ok(file) => return file.sensors.into_iter().map(Sensor::from).collect(),
            Err(e) => {
                warn!("Sensor JSON could not be read, no sensors loaded: {}", e);
                return Vec::new();
            }
        }
    }
    parse_sensor_text(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kp_kg_header_overrides() {
        let text = "KP3 KG7\n1 T1 Gate valve 9 2 40 100 200 0 0 ab12\n";
        let sensors = parse_sensor_text(text);
        assert_eq!(sensors.len(), 1);
        let s = &sensors[0];
        assert_eq!(s.kp, 3);
        assert_eq!(s.kg, 7);
        assert_eq!(s.raw_kg, 2);
        assert_eq!(s.collector, 9);
        assert_eq!(s.serial, "AB12");
        assert_eq!(s.route.as_deref(), Some("KP3 KG7"));
    }

    #[test]
    fn test_route_header_clears_overrides() {
        let text = "\
KP3 KG7
[North line]
1 T1 Gate valve 9 2 40 100 200 0 0 1A
LINE: South line
2 T2 Pump 4 5 40 100 200 0 0 1B
";
        let sensors = parse_sensor_text(text);
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].kp, 9);
        assert_eq!(sensors[0].kg, 2);
        assert_eq!(sensors[0].route.as_deref(), Some("North line"));
        assert_eq!(sensors[1].route.as_deref(), Some("South line"));
    }

    #[test]
    fn test_extended_record() {
        let line = "13 T13 Pump house east 2 2 40 1580 866 -3 4 1A30 T 4 2";
        let sensors = parse_sensor_text(line);
        assert_eq!(sensors.len(), 1);
        let s = &sensors[0];
        assert_eq!(s.code, "T13");
        assert_eq!(s.name, "Pump house east");
        assert_eq!(s.kind.as_deref(), Some("T"));
        assert_eq!(s.code_id, Some(4));
        assert_eq!(s.color_id, Some(2));
        assert_eq!(s.label_offset(), Some(Coord { x: -3.0, y: 4.0 }));
        assert_eq!(s.position(), Some(Coord { x: 1580.0, y: 866.0 }));
    }

    #[test]
    fn test_codeless_record_gets_synthetic_code() {
        let sensors = parse_sensor_text("7 Pump house 2 2 40 10 20 0 0 FF");
        assert_eq!(sensors.len(), 1);
        assert_eq!(sensors[0].code, "S7");
        assert_eq!(sensors[0].name, "Pump house");
        assert_eq!(sensors[0].label_offset(), None);
    }

    #[test]
    fn test_malformed_lines_are_dropped() {
        let text = "\
; comment
garbage line
12 T12 too short 1 2
12 T12 Name 1 2 3 x 5 6 7 ZZ

";
        assert!(parse_sensor_text(text).is_empty());
    }

    #[test]
    fn test_step_is_pure() {
        let state = ParserState::default();
        let (next, record) = step(state.clone(), "KP1 KG2");
        assert!(record.is_none());
        assert_eq!(next.kp, Some(1));
        assert_eq!(state, ParserState::default());
    }

    #[test]
    fn test_json_source() {
        let text = r#"{"source": "a.ini", "count": 2, "sensors": [
            {"idx": 1, "code": "T1", "name": "A", "collector": 3, "kp": 3, "kg": 7, "aaa": 2, "x": 1, "y": 2, "serial": "ff", "colorId": 4},
            {"idx": 2, "kg": 7, "x": null}
        ]}"#;
        let sensors = parse_sensor_source(text);
        assert_eq!(sensors.len(), 2);
        assert_eq!(sensors[0].raw_kg, 2);
        assert_eq!(sensors[0].color_id, Some(4));
        assert_eq!(sensors[0].serial, "FF");
        assert_eq!(sensors[1].code, "S2");
        assert!(sensors[1].position().is_none());
    }
}

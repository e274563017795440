use std::collections::BTreeMap;

use chrono::{DateTime, Local, NaiveDateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use super::{ArtifactRef, EntityId};

pub type RecordMap = BTreeMap<EntityId, TrackingRecord>;

const OPEN_SINCE_FIELD: &str = "ingreso";
const ACCUMULATED_FIELD: &str = "total_segundos";
const ANCHOR_FIELD: &str = "mensaje_id";
/// Minutes counter written by the first deployment of the bot.
const LEGACY_MINUTES_FIELD: &str = "total_minutos";

/// Per-channel time ledger entry, as persisted in the durable JSON file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingRecord {
    #[serde(rename = "ingreso", default)]
    pub(crate) open_since: Option<DateTime<Utc>>,
    /// Raw seconds over all closed sessions; acceleration is never baked in.
    #[serde(rename = "total_segundos", default)]
    pub(crate) accumulated_seconds: f64,
    #[serde(rename = "mensaje_id", default)]
    pub(crate) display_anchor_id: Option<ArtifactRef>,
    #[serde(flatten)]
    pub(crate) extra: Map<String, Value>,
}

impl Default for TrackingRecord {
    fn default() -> Self {
        Self {
            open_since: None,
            accumulated_seconds: 0.0,
            display_anchor_id: None,
            extra: Map::new(),
        }
    }
}

impl TrackingRecord {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_since(&self) -> Option<DateTime<Utc>> {
        self.open_since
    }

    pub fn accumulated_seconds(&self) -> f64 {
        self.accumulated_seconds
    }

    pub fn display_anchor_id(&self) -> Option<ArtifactRef> {
        self.display_anchor_id
    }

    pub fn extra(&self) -> &Map<String, Value> {
        &self.extra
    }

    pub(crate) fn set_display_anchor(&mut self, anchor: Option<ArtifactRef>) {
        self.display_anchor_id = anchor;
    }

    /// Builds a record from one entry of the durable form, repairing whatever
    /// can be repaired. Present, well-formed fields are kept as they are and
    /// unknown fields ride along in `extra`. Every repair is described in the
    /// returned list so the caller can log it.
    pub fn from_durable(value: Value) -> (Self, Vec<String>) {
        let mut repairs = Vec::new();

        let mut fields = match value {
            Value::Object(fields) => fields,
            other => {
                repairs.push(format!(
                    "expected an object, found {}; reset to an empty record",
                    json_kind(&other)
                ));
                return (Self::default(), repairs);
            }
        };

        let open_since = match fields.remove(OPEN_SINCE_FIELD) {
            None => {
                repairs.push(format!("missing '{OPEN_SINCE_FIELD}', set to null"));
                None
            }
            Some(Value::Null) => None,
            Some(Value::String(raw)) => match parse_timestamp(&raw) {
                Some((timestamp, false)) => Some(timestamp),
                Some((timestamp, true)) => {
                    repairs.push(format!(
                        "'{OPEN_SINCE_FIELD}' {raw:?} had no offset; read as local time"
                    ));
                    Some(timestamp)
                }
                None => {
                    repairs.push(format!(
                        "unparseable '{OPEN_SINCE_FIELD}' {raw:?} discarded"
                    ));
                    None
                }
            },
            Some(other) => {
                repairs.push(format!(
                    "'{OPEN_SINCE_FIELD}' was {}, discarded",
                    json_kind(&other)
                ));
                None
            }
        };

        let accumulated_seconds = match fields.remove(ACCUMULATED_FIELD) {
            Some(value) => match value.as_f64() {
                Some(seconds) if seconds.is_finite() && seconds >= 0.0 => seconds,
                _ => {
                    repairs.push(format!(
                        "'{ACCUMULATED_FIELD}' was {value}, reset to 0"
                    ));
                    0.0
                }
            },
            None => match fields.get(LEGACY_MINUTES_FIELD).and_then(Value::as_f64) {
                Some(minutes) if minutes.is_finite() && minutes >= 0.0 => {
                    fields.remove(LEGACY_MINUTES_FIELD);
                    repairs.push(format!(
                        "migrated '{LEGACY_MINUTES_FIELD}' = {minutes} to seconds"
                    ));
                    minutes * 60.0
                }
                _ => {
                    repairs.push(format!("missing '{ACCUMULATED_FIELD}', set to 0"));
                    0.0
                }
            },
        };

        let display_anchor_id = match fields.remove(ANCHOR_FIELD) {
            None => {
                repairs.push(format!("missing '{ANCHOR_FIELD}', set to null"));
                None
            }
            Some(Value::Null) => None,
            Some(value) => match serde_json::from_value::<ArtifactRef>(value.clone()) {
                Ok(anchor) => Some(anchor),
                Err(_) => {
                    repairs.push(format!("'{ANCHOR_FIELD}' was {value}, discarded"));
                    None
                }
            },
        };

        let record = Self {
            open_since,
            accumulated_seconds,
            display_anchor_id,
            extra: fields,
        };
        (record, repairs)
    }
}

/// RFC 3339 first; otherwise a naive ISO-8601 stamp in the process-local zone.
/// The flag reports whether the naive fallback was used.
fn parse_timestamp(raw: &str) -> Option<(DateTime<Utc>, bool)> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(raw) {
        return Some((timestamp.with_timezone(&Utc), false));
    }

    let naive = NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()?;
    let local = Local.from_local_datetime(&naive).earliest()?;
    Some((local.with_timezone(&Utc), true))
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn well_formed_entry_needs_no_repairs() {
        let (record, repairs) = TrackingRecord::from_durable(json!({
            "ingreso": "2024-05-01T08:00:00Z",
            "total_segundos": 120.5,
            "mensaje_id": 1430000000000000000u64,
        }));

        assert!(repairs.is_empty(), "unexpected repairs: {repairs:?}");
        assert_eq!(
            record.open_since(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
        assert_eq!(record.accumulated_seconds(), 120.5);
        assert_eq!(
            record.display_anchor_id(),
            Some(ArtifactRef::new(1430000000000000000))
        );
    }

    #[test]
    fn missing_anchor_is_backfilled_without_touching_other_fields() {
        let (record, repairs) = TrackingRecord::from_durable(json!({
            "ingreso": "2024-05-01T08:00:00+00:00",
            "total_segundos": 3600,
        }));

        assert_eq!(repairs.len(), 1);
        assert_eq!(record.display_anchor_id(), None);
        assert_eq!(record.accumulated_seconds(), 3600.0);
        assert_eq!(
            record.open_since(),
            Some(Utc.with_ymd_and_hms(2024, 5, 1, 8, 0, 0).unwrap())
        );
    }

    #[test]
    fn legacy_minutes_are_migrated_to_seconds() {
        let (record, repairs) = TrackingRecord::from_durable(json!({
            "ingreso": null,
            "total_minutos": 90,
        }));

        assert_eq!(record.accumulated_seconds(), 5400.0);
        assert!(!record.extra().contains_key("total_minutos"));
        assert!(repairs.iter().any(|r| r.contains("total_minutos")));
    }

    #[test]
    fn legacy_minutes_are_kept_when_seconds_are_present() {
        let (record, _) = TrackingRecord::from_durable(json!({
            "ingreso": null,
            "total_segundos": 10,
            "total_minutos": 90,
            "mensaje_id": null,
        }));

        assert_eq!(record.accumulated_seconds(), 10.0);
        assert_eq!(record.extra().get("total_minutos"), Some(&json!(90)));
    }

    #[test]
    fn naive_timestamp_is_read_as_local_time() {
        let (record, repairs) = TrackingRecord::from_durable(json!({
            "ingreso": "2024-05-01T08:00:00.250000",
            "total_segundos": 0,
            "mensaje_id": null,
        }));

        let naive = NaiveDateTime::parse_from_str("2024-05-01T08:00:00.25", "%Y-%m-%dT%H:%M:%S%.f")
            .unwrap();
        let expected = Local
            .from_local_datetime(&naive)
            .earliest()
            .unwrap()
            .with_timezone(&Utc);
        assert_eq!(record.open_since(), Some(expected));
        assert_eq!(repairs.len(), 1);
    }

    #[test]
    fn garbage_values_are_reset() {
        let (record, repairs) = TrackingRecord::from_durable(json!({
            "ingreso": "yesterday-ish",
            "total_segundos": -40,
            "mensaje_id": "not-a-snowflake",
        }));

        assert_eq!(record, TrackingRecord::default());
        assert_eq!(repairs.len(), 3);
    }

    #[test]
    fn non_object_entry_becomes_default_record() {
        let (record, repairs) = TrackingRecord::from_durable(json!([1, 2, 3]));
        assert_eq!(record, TrackingRecord::default());
        assert_eq!(repairs.len(), 1);
    }

    #[test]
    fn unknown_fields_survive_serialization() {
        let (record, _) = TrackingRecord::from_durable(json!({
            "ingreso": null,
            "total_segundos": 60,
            "mensaje_id": 7,
            "apodo": "torno 3",
        }));

        let value = serde_json::to_value(&record).unwrap();
        assert_eq!(value["apodo"], json!("torno 3"));
        assert_eq!(value["total_segundos"], json!(60.0));
        assert_eq!(value["mensaje_id"], json!(7));
        assert_eq!(value["ingreso"], Value::Null);
    }
}

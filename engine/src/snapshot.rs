//! Snapshot documents: the portable, versioned form of a whole dataset.
//!
//! A document is produced once per export and consumed once per import.
//! Decoding validates its shape against a [`Registry`] and stops at the
//! first violation, in this order: body shape, version, app, tables.

use crate::{error::Result, Error, Record, Registry, TableName};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// The only document format version accepted on import.
pub const SNAPSHOT_VERSION: u32 = 1;

/// Application identifier stamped on every document.
pub const SNAPSHOT_APP: &str = "zenpire-inventory";

/// A point-in-time copy of every registered table.
///
/// Tables are kept in a BTreeMap for deterministic serialization; rows
/// within a table keep their source order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Document format version
    pub version: u32,
    /// Producing application
    pub app: String,
    /// Informational export time, never validated
    #[serde(default, with = "iso_millis", skip_serializing_if = "Option::is_none")]
    pub exported_at: Option<DateTime<Utc>>,
    /// Set when binary columns were stripped
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub plain: bool,
    /// Rows by table name
    pub tables: BTreeMap<TableName, Vec<Record>>,
}

impl Snapshot {
    /// Stamp a set of tables into a document, copying rows verbatim.
    pub fn encode(tables: BTreeMap<TableName, Vec<Record>>, exported_at: DateTime<Utc>) -> Self {
        Self {
            version: SNAPSHOT_VERSION,
            app: SNAPSHOT_APP.to_string(),
            exported_at: Some(exported_at),
            plain: false,
            tables,
        }
    }

    /// Like [`Snapshot::encode`], passing every row through `transform` first.
    pub fn encode_with<F>(
        mut tables: BTreeMap<TableName, Vec<Record>>,
        exported_at: DateTime<Utc>,
        mut transform: F,
    ) -> Self
    where
        F: FnMut(&str, &mut Record),
    {
        for (name, rows) in tables.iter_mut() {
            for row in rows.iter_mut() {
                transform(name, row);
            }
        }
        Self::encode(tables, exported_at)
    }

    /// Validate an arbitrary JSON value and turn it into a document.
    ///
    /// Only tables named by the registry are kept; extra tables are ignored.
    pub fn decode(registry: &Registry, input: &Value) -> Result<Self> {
        let body = input
            .as_object()
            .ok_or_else(|| Error::MalformedBody("expected JSON object".into()))?;

        // Numeric equality: `1` and `1.0` are the same version.
        let version = body.get("version");
        if version.and_then(Value::as_f64) != Some(f64::from(SNAPSHOT_VERSION)) {
            return Err(Error::VersionMismatch {
                expected: SNAPSHOT_VERSION,
                actual: describe(version),
            });
        }

        let app = body.get("app");
        if app.and_then(Value::as_str) != Some(SNAPSHOT_APP) {
            return Err(Error::AppMismatch {
                expected: SNAPSHOT_APP.to_string(),
                actual: describe(app),
            });
        }

        let source = body
            .get("tables")
            .and_then(Value::as_object)
            .ok_or_else(|| Error::MalformedBody("missing tables object".into()))?;

        let mut present = Vec::with_capacity(registry.len());
        for name in registry.table_names() {
            match source.get(name).and_then(Value::as_array) {
                Some(rows) => present.push((name, rows)),
                None => return Err(Error::MissingTable(name.to_string())),
            }
        }

        let mut tables = BTreeMap::new();
        for (name, rows) in present {
            tables.insert(name.to_string(), decode_rows(registry, name, rows)?);
        }

        Ok(Self {
            version: SNAPSHOT_VERSION,
            app: SNAPSHOT_APP.to_string(),
            exported_at: body
                .get("exported_at")
                .and_then(Value::as_str)
                .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
                .map(|dt| dt.with_timezone(&Utc)),
            plain: body.get("plain").and_then(Value::as_bool).unwrap_or(false),
            tables,
        })
    }

    /// Parse and validate a JSON document.
    pub fn from_json(registry: &Registry, json: &str) -> Result<Self> {
        let value: Value =
            serde_json::from_str(json).map_err(|e| Error::MalformedBody(e.to_string()))?;
        Self::decode(registry, &value)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    /// Rows of a table, empty when the table is not in the document.
    pub fn table(&self, name: &str) -> &[Record] {
        self.tables.get(name).map(Vec::as_slice).unwrap_or_default()
    }

    /// Count rows across all tables.
    pub fn record_count(&self) -> usize {
        self.tables.values().map(Vec::len).sum()
    }
}

fn decode_rows(registry: &Registry, name: &str, rows: &[Value]) -> Result<Vec<Record>> {
    let spec = registry.table(name);
    let mut records = Vec::with_capacity(rows.len());

    for (index, row) in rows.iter().enumerate() {
        let record = Record::from_value(row).ok_or_else(|| {
            Error::MalformedBody(format!("row {} of table {} is not an object", index, name))
        })?;

        if let Some(spec) = spec {
            for edge in &spec.deferred {
                if !record.get_or_null(&edge.field).is_null() && record.id().is_none() {
                    return Err(Error::MalformedBody(format!(
                        "row {} of table {} has {} set but no id",
                        index, name, edge.field
                    )));
                }
            }
        }

        records.push(record);
    }

    Ok(records)
}

fn describe(value: Option<&Value>) -> String {
    match value {
        None => "nothing".to_string(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

/// Summary of a snapshot (without the rows).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotSummary {
    pub version: u32,
    pub app: String,
    pub exported_at: Option<DateTime<Utc>>,
    pub plain: bool,
    /// Row count per table
    pub counts: BTreeMap<TableName, usize>,
}

impl From<&Snapshot> for SnapshotSummary {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            version: snapshot.version,
            app: snapshot.app.clone(),
            exported_at: snapshot.exported_at,
            plain: snapshot.plain,
            counts: snapshot
                .tables
                .iter()
                .map(|(name, rows)| (name.clone(), rows.len()))
                .collect(),
        }
    }
}

/// `exported_at` as an ISO-8601 string with millisecond precision.
///
/// Unparseable values read back as `None`.
mod iso_millis {
    use chrono::{DateTime, SecondsFormat, Utc};
    use serde::{Deserialize, Deserializer, Serializer};
    use serde_json::Value;

    pub fn serialize<S>(value: &Option<DateTime<Utc>>, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        match value {
            Some(dt) => serializer.serialize_str(&dt.to_rfc3339_opts(SecondsFormat::Millis, true)),
            None => serializer.serialize_none(),
        }
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(value
            .as_str()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| dt.with_timezone(&Utc)))
    }
}

impl From<Snapshot> for Value {
    fn from(snapshot: Snapshot) -> Self {
        let mut body = Map::new();
        body.insert("version".into(), Value::from(snapshot.version));
        body.insert("app".into(), Value::String(snapshot.app));
        if let Some(at) = snapshot.exported_at {
            body.insert(
                "exported_at".into(),
                Value::String(at.to_rfc3339_opts(chrono::SecondsFormat::Millis, true)),
            );
        }
        if snapshot.plain {
            body.insert("plain".into(), Value::Bool(true));
        }
        let tables = snapshot
            .tables
            .into_iter()
            .map(|(name, rows)| (name, Value::Array(rows.into_iter().map(Value::from).collect())))
            .collect();
        body.insert("tables".into(), Value::Object(tables));
        Value::Object(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TableSpec;
    use chrono::TimeZone;
    use serde_json::json;

    fn kitchen() -> Registry {
        Registry::builder()
            .table(TableSpec::independent("unit"))
            .table(
                TableSpec::deferring("ingredient")
                    .defer("produced_by_recipe_id", "recipe")
                    .with_binary_fields(["image_data"]),
            )
            .table(TableSpec::referenced("recipe"))
            .table(TableSpec::dependent("recipe_component"))
            .build()
            .unwrap()
    }

    fn valid_body() -> Value {
        json!({
            "version": 1,
            "app": "zenpire-inventory",
            "exported_at": "2026-03-01T10:00:00.000Z",
            "tables": {
                "unit": [{"id": "U1", "code": "g"}],
                "ingredient": [{"id": "I1", "produced_by_recipe_id": "R1"}],
                "recipe": [{"id": "R1"}],
                "recipe_component": []
            }
        })
    }

    fn at() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 10, 0, 0).unwrap()
    }

    #[test]
    fn encode_stamps_header() {
        let mut tables = BTreeMap::new();
        tables.insert("unit".to_string(), vec![Record::new().with("id", "U1")]);

        let snapshot = Snapshot::encode(tables, at());

        assert_eq!(snapshot.version, SNAPSHOT_VERSION);
        assert_eq!(snapshot.app, SNAPSHOT_APP);
        assert_eq!(snapshot.exported_at, Some(at()));
        assert!(!snapshot.plain);
        assert_eq!(snapshot.record_count(), 1);
    }

    #[test]
    fn encode_with_transforms_every_row() {
        let mut tables = BTreeMap::new();
        tables.insert(
            "recipe".to_string(),
            vec![Record::new().with("id", "R1").with("image_data", "abc")],
        );
        tables.insert(
            "unit".to_string(),
            vec![Record::new().with("id", "U1").with("image_data", "keep")],
        );

        let snapshot = Snapshot::encode_with(tables, at(), |table, row| {
            if table == "recipe" {
                row.null_out("image_data");
            }
        });

        assert_eq!(snapshot.table("recipe")[0].get("image_data"), Some(&Value::Null));
        assert_eq!(snapshot.table("unit")[0].get("image_data"), Some(&json!("keep")));
    }

    #[test]
    fn wire_format() {
        let mut tables = BTreeMap::new();
        tables.insert("unit".to_string(), vec![Record::new().with("id", "U1")]);
        let mut snapshot = Snapshot::encode(tables, at());

        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(
            json,
            json!({
                "version": 1,
                "app": "zenpire-inventory",
                "exported_at": "2026-03-01T10:00:00.000Z",
                "tables": {"unit": [{"id": "U1"}]}
            })
        );

        snapshot.plain = true;
        let json = serde_json::to_value(&snapshot).unwrap();
        assert_eq!(json["plain"], json!(true));
        assert_eq!(Value::from(snapshot), json);
    }

    #[test]
    fn decode_valid_body() {
        let snapshot = Snapshot::decode(&kitchen(), &valid_body()).unwrap();

        assert_eq!(snapshot.tables.len(), 4);
        assert_eq!(snapshot.table("ingredient")[0].get("produced_by_recipe_id"), Some(&json!("R1")));
        assert_eq!(snapshot.exported_at, Some(at()));
        assert!(!snapshot.plain);
    }

    #[test]
    fn decode_rejects_non_object() {
        for body in [json!(null), json!([1]), json!("snapshot"), json!(1)] {
            let result = Snapshot::decode(&kitchen(), &body);
            assert!(matches!(result, Err(Error::MalformedBody(_))), "{}", body);
        }
    }

    #[test]
    fn decode_rejects_wrong_version() {
        let mut body = valid_body();
        body["version"] = json!(2);
        let result = Snapshot::decode(&kitchen(), &body);
        assert_eq!(
            result,
            Err(Error::VersionMismatch {
                expected: 1,
                actual: "2".into()
            })
        );

        body["version"] = json!("1");
        assert!(matches!(
            Snapshot::decode(&kitchen(), &body),
            Err(Error::VersionMismatch { .. })
        ));
    }

    #[test]
    fn decode_accepts_float_version() {
        let mut body = valid_body();
        body["version"] = json!(1.0);
        let snapshot = Snapshot::decode(&kitchen(), &body).unwrap();
        assert_eq!(snapshot.version, SNAPSHOT_VERSION);

        body["version"] = json!(1.5);
        assert_eq!(
            Snapshot::decode(&kitchen(), &body),
            Err(Error::VersionMismatch {
                expected: 1,
                actual: "1.5".into()
            })
        );
    }

    #[test]
    fn version_checked_before_tables() {
        let body = json!({"version": 3, "app": "zenpire-inventory", "tables": 17});
        assert!(matches!(
            Snapshot::decode(&kitchen(), &body),
            Err(Error::VersionMismatch { .. })
        ));
    }

    #[test]
    fn app_checked_before_tables() {
        let mut body = valid_body();
        body["app"] = json!("other-app");
        body["tables"] = json!({});
        let result = Snapshot::decode(&kitchen(), &body);
        assert!(matches!(result, Err(Error::AppMismatch { actual, .. }) if actual == "other-app"));
    }

    #[test]
    fn decode_reports_first_missing_table_in_registry_order() {
        let mut body = valid_body();
        body["tables"].as_object_mut().unwrap().remove("recipe_component");
        body["tables"].as_object_mut().unwrap().remove("ingredient");

        let result = Snapshot::decode(&kitchen(), &body);
        assert_eq!(result, Err(Error::MissingTable("ingredient".into())));
    }

    #[test]
    fn decode_rejects_non_array_table() {
        let mut body = valid_body();
        body["tables"]["recipe"] = json!({"id": "R1"});
        let result = Snapshot::decode(&kitchen(), &body);
        assert_eq!(result, Err(Error::MissingTable("recipe".into())));
    }

    #[test]
    fn decode_rejects_missing_tables_object() {
        let mut body = valid_body();
        body.as_object_mut().unwrap().remove("tables");
        assert!(matches!(
            Snapshot::decode(&kitchen(), &body),
            Err(Error::MalformedBody(_))
        ));
    }

    #[test]
    fn decode_rejects_non_object_row() {
        let mut body = valid_body();
        body["tables"]["recipe_component"] = json!([42]);
        let result = Snapshot::decode(&kitchen(), &body);
        assert!(matches!(result, Err(Error::MalformedBody(m)) if m.contains("recipe_component")));
    }

    #[test]
    fn decode_rejects_deferred_row_without_id() {
        let mut body = valid_body();
        body["tables"]["ingredient"] = json!([{"produced_by_recipe_id": "R1"}]);
        assert!(matches!(
            Snapshot::decode(&kitchen(), &body),
            Err(Error::MalformedBody(_))
        ));
    }

    #[test]
    fn decode_ignores_extra_tables_and_bad_timestamp() {
        let mut body = valid_body();
        body["tables"]["app_user"] = json!([{"id": "X"}]);
        body["exported_at"] = json!("yesterday");
        body["plain"] = json!(true);

        let snapshot = Snapshot::decode(&kitchen(), &body).unwrap();
        assert!(!snapshot.tables.contains_key("app_user"));
        assert_eq!(snapshot.exported_at, None);
        assert!(snapshot.plain);
    }

    #[test]
    fn from_json_maps_parse_errors() {
        let result = Snapshot::from_json(&kitchen(), "{not json");
        assert!(matches!(result, Err(Error::MalformedBody(_))));

        let json = serde_json::to_string(&valid_body()).unwrap();
        assert!(Snapshot::from_json(&kitchen(), &json).is_ok());
    }

    #[test]
    fn json_roundtrip_preserves_row_order() {
        let snapshot = Snapshot::decode(&kitchen(), &valid_body()).unwrap();
        let json = snapshot.to_json().unwrap();
        let restored = Snapshot::from_json(&kitchen(), &json).unwrap();
        assert_eq!(snapshot, restored);
    }

    #[test]
    fn snapshot_summary() {
        let snapshot = Snapshot::decode(&kitchen(), &valid_body()).unwrap();
        let summary: SnapshotSummary = (&snapshot).into();

        assert_eq!(summary.version, 1);
        assert_eq!(summary.counts["unit"], 1);
        assert_eq!(summary.counts["recipe_component"], 0);
    }
}

//! SQLite table sink.
//!
//! The database and the table are created on the first record; their names
//! come from templates that may contain `{experiment_id}`. Columns:
//!
//! | column | type |
//! |---|---|
//! | `id` | `INTEGER PRIMARY KEY AUTOINCREMENT` |
//! | `create_time` | `TEXT`, RFC 3339 |
//! | `deleted` | `BOOLEAN DEFAULT 0`, never set here |
//! | `experiment_id` | `TEXT` |
//! | `setting.*`, `stat.*` | from the first non-null value |
//!
//! Keys first seen in a later record are added with `ALTER TABLE … ADD
//! COLUMN` under the same lock that guards the insert.

use super::{ensure_parent, expand_template, ExperimentRecord, ExperimentRecorder, RecordOutcome};
use crate::error::{ConflictResolution, RecordError, SchemaConflict};
use parking_lot::Mutex;
use rusqlite::types::Value as SqlValue;
use rusqlite::{params_from_iter, Connection};
use serde_json::Value;
use std::collections::HashMap;
use tracing::{debug, info, warn};

/// Declared type of a dynamic column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ColumnType {
    Integer,
    Real,
    Text,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Integer => "INTEGER",
            ColumnType::Real => "REAL",
            ColumnType::Text => "TEXT",
        }
    }

    /// Type of a non-null value; `None` for null.
    fn of(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Integer),
            Value::Number(n) if n.is_i64() => Some(ColumnType::Integer),
            Value::Number(_) => Some(ColumnType::Real),
            _ => Some(ColumnType::Text),
        }
    }
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn text_of(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Convert `value` for storage in a column of type `column`.
fn coerce(column: &str, column_type: ColumnType, value: &Value) -> (SqlValue, Option<SchemaConflict>) {
    let Some(value_type) = ColumnType::of(value) else {
        return (SqlValue::Null, None);
    };
    let conflict = |resolution| SchemaConflict {
        column: column.to_string(),
        column_type: column_type.sql(),
        value_type: value_type.sql(),
        resolution,
    };
    let numeric = match value {
        Value::Bool(b) => Some(SqlValue::Integer(*b as i64)),
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => SqlValue::Integer(i),
            None => SqlValue::Real(n.as_f64().unwrap_or(f64::NAN)),
        }),
        _ => None,
    };

    match (column_type, numeric) {
        (ColumnType::Text, Some(_)) => (
            SqlValue::Text(text_of(value)),
            Some(conflict(ConflictResolution::Widened)),
        ),
        (ColumnType::Text, None) => (SqlValue::Text(text_of(value)), None),
        (ColumnType::Integer, Some(SqlValue::Real(f))) => {
            (SqlValue::Real(f), Some(conflict(ConflictResolution::Widened)))
        }
        (ColumnType::Real, Some(SqlValue::Integer(i))) => (SqlValue::Real(i as f64), None),
        (_, Some(number)) => (number, None),
        (_, None) => (SqlValue::Null, Some(conflict(ConflictResolution::Rejected))),
    }
}

struct TableState {
    connection: Connection,
    table: String,
    experiment_id: String,
    columns: HashMap<String, ColumnType>,
}

impl TableState {
    fn open(path: &str, table: &str, record: &ExperimentRecord, fields: &[(String, Value)]) -> Result<Self, RecordError> {
        ensure_parent(path)?;
        let connection = Connection::open(path)?;
        let mut state = Self {
            connection,
            table: table.to_string(),
            experiment_id: record.experiment_id.clone(),
            columns: HashMap::new(),
        };

        let mut definitions = vec![
            "\"id\" INTEGER PRIMARY KEY AUTOINCREMENT".to_string(),
            "\"create_time\" TEXT DEFAULT CURRENT_TIMESTAMP".to_string(),
            "\"deleted\" BOOLEAN DEFAULT 0".to_string(),
            "\"experiment_id\" TEXT".to_string(),
        ];
        for (key, value) in fields {
            if state.columns.contains_key(key) {
                continue;
            }
            if let Some(column_type) = ColumnType::of(value) {
                definitions.push(format!("{} {}", quote_identifier(key), column_type.sql()));
                state.columns.insert(key.clone(), column_type);
            }
        }
        let ddl = format!(
            "CREATE TABLE IF NOT EXISTS {} ({})",
            quote_identifier(table),
            definitions.join(", ")
        );
        state.connection.execute(&ddl, [])?;
        state.load_existing_columns()?;
        info!("Recording to table {} in {}", table, path);
        Ok(state)
    }

    /// Pick up columns of a pre-existing table so re-runs append cleanly.
    fn load_existing_columns(&mut self) -> Result<(), RecordError> {
        let mut statement = self
            .connection
            .prepare(&format!("PRAGMA table_info({})", quote_identifier(&self.table)))?;
        let rows = statement.query_map([], |row| Ok((row.get::<_, String>(1)?, row.get::<_, String>(2)?)))?;
        for row in rows {
            let (name, declared) = row?;
            let column_type = match declared.to_ascii_uppercase().as_str() {
                "INTEGER" => ColumnType::Integer,
                "REAL" => ColumnType::Real,
                _ => ColumnType::Text,
            };
            self.columns.entry(name).or_insert(column_type);
        }
        Ok(())
    }

    fn add_column(&mut self, key: &str, column_type: ColumnType) -> Result<(), RecordError> {
        debug!("Adding column {} {}", key, column_type.sql());
        self.connection.execute(
            &format!(
                "ALTER TABLE {} ADD COLUMN {} {}",
                quote_identifier(&self.table),
                quote_identifier(key),
                column_type.sql()
            ),
            [],
        )?;
        self.columns.insert(key.to_string(), column_type);
        Ok(())
    }

    fn insert(&mut self, record: &ExperimentRecord, fields: &[(String, Value)]) -> Result<RecordOutcome, RecordError> {
        if record.experiment_id != self.experiment_id {
            return Err(RecordError::ExperimentIdChanged {
                expected: self.experiment_id.clone(),
                actual: record.experiment_id.clone(),
            });
        }

        for (key, value) in fields {
            if self.columns.contains_key(key) {
                continue;
            }
            if let Some(column_type) = ColumnType::of(value) {
                self.add_column(key, column_type)?;
            }
        }

        let mut outcome = RecordOutcome::default();
        let mut names = vec![quote_identifier("create_time"), quote_identifier("experiment_id")];
        let mut values = vec![
            SqlValue::Text(record.create_time()),
            SqlValue::Text(record.experiment_id.clone()),
        ];
        for (key, value) in fields {
            let Some(column_type) = self.columns.get(key).copied() else {
                continue;
            };
            let (stored, conflict) = coerce(key, column_type, value);
            if let Some(conflict) = conflict {
                warn!("{}", conflict);
                outcome.conflicts.push(conflict);
            }
            names.push(quote_identifier(key));
            values.push(stored);
        }

        let placeholders = vec!["?"; values.len()].join(", ");
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote_identifier(&self.table),
            names.join(", "),
            placeholders
        );
        self.connection.execute(&sql, params_from_iter(values.iter()))?;
        Ok(outcome)
    }
}

/// Appends records as rows of one SQLite table.
pub struct TableRecorder {
    path_template: String,
    table_template: String,
    state: Mutex<Option<TableState>>,
}

impl TableRecorder {
    pub fn new(path_template: &str, table_template: &str) -> Self {
        Self {
            path_template: path_template.to_string(),
            table_template: table_template.to_string(),
            state: Mutex::new(None),
        }
    }
}

impl ExperimentRecorder for TableRecorder {
    fn record(&self, record: &ExperimentRecord) -> Result<RecordOutcome, RecordError> {
        let fields = record.fields();
        let mut guard = self.state.lock();
        let mut state = match guard.take() {
            Some(state) => state,
            None => {
                let path = expand_template(&self.path_template, &record.experiment_id);
                let table = expand_template(&self.table_template, &record.experiment_id);
                TableState::open(&path, &table, record, &fields)?
            }
        };
        let outcome = state.insert(record, &fields);
        *guard = Some(state);
        outcome
    }

    fn name(&self) -> &'static str {
        "table"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config_space::{Configuration, NodeBatch};
    use crate::recorder::tests::sample_record;
    use crate::stats::{MergedStats, ParsedReport, ReportKind, StatValue, StatisticRecord};
    use tempfile::TempDir;

    fn record_with(id: &str, field: &str, value: Option<StatValue>) -> ExperimentRecord {
        let mut report = ParsedReport::new(ReportKind::Runtime);
        let record: StatisticRecord = vec![(field.to_string(), value)].into_iter().collect();
        report.snapshot_mut("vpp_wk_0").insert("ip4-lookup", record);
        let mut stats = MergedStats::new();
        stats.merge(&report);
        let configuration = Configuration::builder()
            .node("ip4-lookup", NodeBatch::new(32, 100))
            .build()
            .unwrap();
        ExperimentRecord::new(id, configuration, stats)
    }

    fn recorder(dir: &TempDir) -> (TableRecorder, String) {
        let template = dir.path().join("vpp_exp_{experiment_id}.sqlite");
        let template = template.display().to_string();
        (TableRecorder::new(&template, "vpp_exp_data"), template)
    }

    fn count_rows(path: &str) -> i64 {
        let conn = Connection::open(path).unwrap();
        conn.query_row("SELECT COUNT(*) FROM vpp_exp_data", [], |row| row.get(0))
            .unwrap()
    }

    #[test]
    fn test_first_record_creates_table() {
        let dir = TempDir::new().unwrap();
        let (recorder, template) = recorder(&dir);
        let outcome = recorder.record(&sample_record("e1")).unwrap();
        assert!(outcome.conflicts.is_empty());
        recorder.record(&sample_record("e1")).unwrap();

        let path = expand_template(&template, "e1");
        assert_eq!(count_rows(&path), 2);
        let conn = Connection::open(&path).unwrap();
        let (value, deleted): (f64, bool) = conn
            .query_row(
                "SELECT \"stat.vpp_wk_0.dpdk-input.perfmon.l1i_miss_per_pkt\", deleted FROM vpp_exp_data LIMIT 1",
                [],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .unwrap();
        assert_eq!(value, 13.88);
        assert!(!deleted);
    }

    #[test]
    fn test_new_keys_add_columns() {
        let dir = TempDir::new().unwrap();
        let (recorder, template) = recorder(&dir);
        recorder
            .record(&record_with("e1", "calls", Some(StatValue::Int(10))))
            .unwrap();
        recorder
            .record(&record_with("e1", "vectors", Some(StatValue::Int(320))))
            .unwrap();

        let conn = Connection::open(expand_template(&template, "e1")).unwrap();
        let vectors: Option<i64> = conn
            .query_row(
                "SELECT \"stat.vpp_wk_0.ip4-lookup.runtime.vectors\" FROM vpp_exp_data ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(vectors, Some(320));
    }

    #[test]
    fn test_experiment_id_must_stay_constant() {
        let dir = TempDir::new().unwrap();
        let (recorder, _) = recorder(&dir);
        recorder.record(&sample_record("e1")).unwrap();
        let err = recorder.record(&sample_record("e2")).unwrap_err();
        assert!(matches!(err, RecordError::ExperimentIdChanged { .. }));
    }

    #[test]
    fn test_integer_column_widens_float() {
        let dir = TempDir::new().unwrap();
        let (recorder, template) = recorder(&dir);
        recorder
            .record(&record_with("e1", "clocks", Some(StatValue::Int(8))))
            .unwrap();
        let outcome = recorder
            .record(&record_with("e1", "clocks", Some(StatValue::Float(8.5))))
            .unwrap();
        assert_eq!(outcome.conflicts.len(), 1);
        assert_eq!(outcome.conflicts[0].resolution, ConflictResolution::Widened);

        let conn = Connection::open(expand_template(&template, "e1")).unwrap();
        let clocks: f64 = conn
            .query_row(
                "SELECT \"stat.vpp_wk_0.ip4-lookup.runtime.clocks\" FROM vpp_exp_data ORDER BY id DESC LIMIT 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(clocks, 8.5);
    }

    #[test]
    fn test_text_in_numeric_column_is_rejected() {
        let dir = TempDir::new().unwrap();
        let (recorder, template) = recorder(&dir);
        recorder
            .record(&record_with("e1", "state", Some(StatValue::Int(1))))
            .unwrap();
        let outcome = recorder
            .record(&record_with("e1", "state", Some(StatValue::Text("polling".into()))))
            .unwrap();
        assert_eq!(outcome.conflicts[0].resolution, ConflictResolution::Rejected);
        assert_eq!(outcome.conflicts[0].column_type, "INTEGER");
        assert_eq!(count_rows(&expand_template(&template, "e1")), 2);
    }

    #[test]
    fn test_numbers_into_text_column_are_stringified() {
        let (stored, conflict) = coerce("c", ColumnType::Text, &serde_json::json!(42));
        assert_eq!(stored, SqlValue::Text("42".to_string()));
        assert_eq!(conflict.unwrap().resolution, ConflictResolution::Widened);
    }

    #[test]
    fn test_null_first_value_defers_column() {
        let dir = TempDir::new().unwrap();
        let (recorder, template) = recorder(&dir);
        recorder.record(&record_with("e1", "suspends", None)).unwrap();
        recorder
            .record(&record_with("e1", "suspends", Some(StatValue::Float(0.5))))
            .unwrap();
        let conn = Connection::open(expand_template(&template, "e1")).unwrap();
        let declared: String = conn
            .query_row(
                "SELECT type FROM pragma_table_info('vpp_exp_data') WHERE name = 'stat.vpp_wk_0.ip4-lookup.runtime.suspends'",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(declared, "REAL");
    }

    #[test]
    fn test_quote_identifier() {
        assert_eq!(quote_identifier("stat.a\"b"), "\"stat.a\"\"b\"");
    }
}

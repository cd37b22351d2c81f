//! JSON Lines sink: one object per record, appended and flushed per line.

use super::{ensure_parent, expand_template, ExperimentRecord, ExperimentRecorder, RecordOutcome};
use crate::error::RecordError;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use tracing::info;

struct JsonlState {
    experiment_id: String,
    writer: BufWriter<File>,
}

pub struct JsonlRecorder {
    path_template: String,
    state: Mutex<Option<JsonlState>>,
}

impl JsonlRecorder {
    pub fn new(path_template: &str) -> Self {
        Self {
            path_template: path_template.to_string(),
            state: Mutex::new(None),
        }
    }

    fn open(&self, experiment_id: &str) -> Result<JsonlState, RecordError> {
        let path = expand_template(&self.path_template, experiment_id);
        ensure_parent(&path)?;
        let file = OpenOptions::new().create(true).append(true).open(&path)?;
        info!("Appending records to {}", path);
        Ok(JsonlState {
            experiment_id: experiment_id.to_string(),
            writer: BufWriter::new(file),
        })
    }
}

fn to_line(record: &ExperimentRecord) -> Result<String, RecordError> {
    let mut object = Map::new();
    object.insert("experiment_id".to_string(), Value::String(record.experiment_id.clone()));
    object.insert("create_time".to_string(), Value::String(record.create_time()));
    for (key, value) in record.fields() {
        object.insert(key, value);
    }
    Ok(serde_json::to_string(&Value::Object(object))?)
}

impl ExperimentRecorder for JsonlRecorder {
    fn record(&self, record: &ExperimentRecord) -> Result<RecordOutcome, RecordError> {
        let line = to_line(record)?;
        let mut guard = self.state.lock();
        if guard.is_none() {
            *guard = Some(self.open(&record.experiment_id)?);
        }
        if let Some(state) = guard.as_mut() {
            if state.experiment_id != record.experiment_id {
                return Err(RecordError::ExperimentIdChanged {
                    expected: state.experiment_id.clone(),
                    actual: record.experiment_id.clone(),
                });
            }
            writeln!(state.writer, "{}", line)?;
            state.writer.flush()?;
        }
        Ok(RecordOutcome::default())
    }

    fn name(&self) -> &'static str {
        "jsonl"
    }

    fn flush(&self) -> Result<(), RecordError> {
        if let Some(state) = self.state.lock().as_mut() {
            state.writer.flush()?;
        }
        Ok(())
    }
}

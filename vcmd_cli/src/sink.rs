//! CSV telemetry sink: one file per run, header once, one row per record.

use std::fs::File;
use std::path::Path;

use vcmd_core::telemetry::{FIELD_NAMES, TelemetryRecord, TelemetrySink};
use vcmd_core::CoreError;

pub struct CsvSink {
    writer: csv::Writer<File>,
}

impl CsvSink {
    pub fn create(path: &Path) -> eyre::Result<Self> {
        let mut writer = csv::Writer::from_path(path)?;
        writer.write_record(FIELD_NAMES)?;
        Ok(Self { writer })
    }
}

fn io_err(e: impl std::fmt::Display) -> CoreError {
    CoreError::Hardware(format!("telemetry file: {e}"))
}

impl TelemetrySink for CsvSink {
    fn append(&mut self, record: &TelemetryRecord) -> Result<(), CoreError> {
        let row = record.values().map(|v| v.to_string());
        self.writer.write_record(&row).map_err(io_err)
    }

    fn finish(&mut self) -> Result<(), CoreError> {
        self.writer.flush().map_err(io_err)
    }
}

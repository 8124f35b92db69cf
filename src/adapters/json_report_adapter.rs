//! JSON report adapter.

use crate::domain::error::QmetricsError;
use crate::ports::report_port::ReportPort;
use serde::Serialize;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::PathBuf;

/// Writes reports as JSON to a file, or to stdout when no path is set.
pub struct JsonReportAdapter {
    output: Option<PathBuf>,
    pretty: bool,
}

impl JsonReportAdapter {
    pub fn new(output: Option<PathBuf>, pretty: bool) -> Self {
        Self { output, pretty }
    }

    fn write_to<W: Write, T: Serialize>(&self, mut writer: W, report: &T) -> Result<(), QmetricsError> {
        if self.pretty {
            serde_json::to_writer_pretty(&mut writer, report).map_err(io::Error::from)?;
        } else {
            serde_json::to_writer(&mut writer, report).map_err(io::Error::from)?;
        }
        writeln!(writer)?;
        writer.flush()?;
        Ok(())
    }
}

impl ReportPort for JsonReportAdapter {
    fn write<T: Serialize>(&self, report: &T) -> Result<(), QmetricsError> {
        match &self.output {
            Some(path) => {
                let file = File::create(path)?;
                self.write_to(BufWriter::new(file), report)?;
                tracing::info!(path = %path.display(), "report written");
                Ok(())
            }
            None => self.write_to(io::stdout().lock(), report),
        }
    }
}

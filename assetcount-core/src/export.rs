//! CSV report export
//!
//! Fixed five-column layout:
//!
//! ```text
//! Date,Account ID,Type,Quantity,Account Name
//! 9/8/2022,111,vm,2,Alpha
//! ```
//!
//! The header is always written, so an empty run still produces a valid
//! (header-only) report.

use std::io::Write;

use crate::error::{Error, Result};
use crate::types::AggregateRow;

/// Report column labels, in output order.
pub const REPORT_HEADER: [&str; 5] = ["Date", "Account ID", "Type", "Quantity", "Account Name"];

/// Serializes aggregate rows as CSV.
#[derive(Debug, Default, Clone, Copy)]
pub struct ReportExporter;

impl ReportExporter {
    pub fn new() -> Self {
        Self
    }

    /// Render the report into memory.
    pub fn export(&self, rows: &[AggregateRow]) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.write_to(&mut buf, rows)?;
        Ok(buf)
    }

    /// Write the report to any writer, in the order given.
    pub fn write_to<W: Write>(&self, writer: W, rows: &[AggregateRow]) -> Result<()> {
        let mut csv_writer = csv::WriterBuilder::new()
            .has_headers(false)
            .from_writer(writer);

        csv_writer.write_record(REPORT_HEADER)?;
        for row in rows {
            csv_writer.serialize(row)?;
        }
        csv_writer
            .flush()
            .map_err(|e| Error::Export(format!("failed to flush report: {}", e)))?;
        Ok(())
    }
}

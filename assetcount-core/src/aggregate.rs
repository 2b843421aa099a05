//! Streaming aggregation
//!
//! Folds asset records into one count per (account, asset type). Only the
//! counts are kept: memory grows with the number of distinct pairs, never
//! with the number of records.
//!
//! Rows come out in the order their key was first seen. Counting is order
//! independent, so any permutation of the input gives the same set of rows.

use std::collections::HashMap;

use crate::directory::AccountDirectory;
use crate::error::Result;
use crate::stream::AssetRecordStream;
use crate::types::{AggregateRow, AssetRecord};

/// Running per-(account, type) counts for one report date.
#[derive(Debug)]
pub struct Aggregator {
    report_date: String,
    index: HashMap<(String, String), usize>,
    rows: Vec<AggregateRow>,
    total: u64,
}

impl Aggregator {
    pub fn new(report_date: impl Into<String>) -> Self {
        Self {
            report_date: report_date.into(),
            index: HashMap::new(),
            rows: Vec::new(),
            total: 0,
        }
    }

    /// Count one record.
    ///
    /// Fails if the record is missing its account or type, or if its account
    /// is not in the directory. Nothing is counted on failure.
    pub fn observe(&mut self, record: &AssetRecord, directory: &AccountDirectory) -> Result<()> {
        record.validate()?;
        let account_name = directory.lookup(&record.account_id)?;

        let key = (record.account_id.clone(), record.asset_type.clone());
        match self.index.get(&key) {
            Some(&i) => self.rows[i].quantity += 1,
            None => {
                self.index.insert(key, self.rows.len());
                self.rows.push(AggregateRow {
                    date: self.report_date.clone(),
                    account_id: record.account_id.clone(),
                    account_name: account_name.to_string(),
                    asset_type: record.asset_type.clone(),
                    quantity: 1,
                });
            }
        }
        self.total += 1;
        Ok(())
    }

    /// Number of distinct (account, type) pairs so far.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of records counted so far.
    pub fn total(&self) -> u64 {
        self.total
    }

    pub fn report_date(&self) -> &str {
        &self.report_date
    }

    /// The finished table, in first-seen order.
    pub fn finalize(self) -> Vec<AggregateRow> {
        self.rows
    }
}

/// Drive `stream` to its end, counting every record.
///
/// The directory must already be fully built; records are only pulled once
/// this is called.
pub async fn aggregate(
    stream: &mut dyn AssetRecordStream,
    directory: &AccountDirectory,
    report_date: &str,
) -> Result<Aggregator> {
    let mut aggregator = Aggregator::new(report_date);
    while let Some(record) = stream.next_record().await? {
        aggregator.observe(&record, directory)?;
    }
    tracing::info!(
        records = aggregator.total(),
        rows = aggregator.len(),
        "Aggregation complete"
    );
    Ok(aggregator)
}

//! Single-record append with optimistic concurrency and rollback
//!
//! The file is fingerprinted before and after the record is encoded. If the
//! two differ another writer got in between, so nothing is written and the
//! cached header is reloaded. The same happens when the stored record count
//! differs from the cached one or the file ends before the cached data end,
//! which is how a handle notices appends made through another handle since
//! its last reload. Otherwise the record, the record count and the
//! last-update date are written in that order and flushed. Any failure in
//! that sequence runs the whole rollback, since every undo step restores a
//! pre-append value and is harmless for a step that never ran.
//!
//! The guard is cooperative: a change landing between the second fingerprint
//! and the first write goes unnoticed. A crash mid-sequence is not recovered.

use chrono::Local;
use std::io;
use tracing::{error, info, warn};

use super::table::{Table, TableState};
use crate::error::{AppendStep, DbfError, DbfResult, RollbackReport, RollbackStep};
use crate::file_manager::TableFile;
use crate::storage::header::{LastUpdate, TableHeader, EOF_MARKER, LAST_UPDATE_OFFSET, NUM_RECORDS_OFFSET};
use crate::storage::record::encode_record;

/// Write the encoded record and the updated header fields, then flush
fn write_record(
    file: &mut dyn TableFile,
    original: &TableHeader,
    buf: &[u8],
    num_records: u32,
    today: LastUpdate,
) -> Result<(), (AppendStep, io::Error)> {
    // The buffer starts over the old sentinel and ends with a new one
    file.write_all_at(buf, original.data_end())
        .map_err(|e| (AppendStep::Record, e))?;
    file.write_all_at(&num_records.to_le_bytes(), NUM_RECORDS_OFFSET)
        .map_err(|e| (AppendStep::RecordCount, e))?;
    file.write_all_at(&today.to_bytes(), LAST_UPDATE_OFFSET)
        .map_err(|e| (AppendStep::LastUpdate, e))?;
    file.sync().map_err(|e| (AppendStep::Sync, e))
}

fn restore_records(file: &mut dyn TableFile, original: &TableHeader) -> io::Result<()> {
    let end = original.data_end();
    file.set_len(end)?;
    file.write_all_at(&[EOF_MARKER], end)
}

/// Put the file back to its pre-append state, attempting every step
fn roll_back(file: &mut dyn TableFile, original: &TableHeader) -> RollbackReport {
    let mut report = RollbackReport::default();

    report.record(RollbackStep::Record, restore_records(file, original));
    report.record(
        RollbackStep::RecordCount,
        file.write_all_at(&original.num_records.to_le_bytes(), NUM_RECORDS_OFFSET),
    );
    report.record(
        RollbackStep::LastUpdate,
        file.write_all_at(&original.last_update.to_bytes(), LAST_UPDATE_OFFSET),
    );
    report.record(RollbackStep::Sync, file.sync());

    report
}

impl<R> Table<R> {
    fn discard_stale(&self, state: &mut TableState) -> DbfError {
        if let Err(e) = state.reload(&self.schema, self.codec.as_ref()) {
            error!("Reload after concurrent modification failed: {}", e);
        }
        DbfError::ConcurrentModification
    }

    /// Append one record at the end of the table
    ///
    /// Fails with `ConcurrentModification` if the file changed while the
    /// record was being encoded, or if another handle appended since the
    /// last reload; the table has then been reloaded and the call can be
    /// retried. Fails with `AppendFailed` if a write step failed,
    /// carrying the outcome of the rollback.
    pub fn append(&self, record: &R) -> DbfResult<()> {
        let mut guard = self.state.write();
        let state = &mut *guard;

        let num_records = state.header.num_records.checked_add(1).ok_or_else(|| {
            DbfError::OutOfRange(format!("table already holds {} records", state.header.num_records))
        })?;

        let before = state.file.fingerprint()?;
        let buf = encode_record(
            record,
            &state.binding,
            &self.schema,
            self.codec.as_ref(),
            state.header.record_length,
        )?;
        let after = state.file.fingerprint()?;

        if before != after {
            warn!(
                "Table changed during append ({:?} -> {:?}), discarding cached header",
                before, after
            );
            return Err(self.discard_stale(state));
        }

        // Records appended through another handle since the last reload
        let mut stored = [0u8; 4];
        state.file.read_exact_at(&mut stored, NUM_RECORDS_OFFSET)?;
        let stored = u32::from_le_bytes(stored);
        let size = state.file.size()?;
        if stored != state.header.num_records || size <= state.header.data_end() {
            warn!(
                "Table holds {} records in {} bytes, cached header says {}, discarding cached header",
                stored, size, state.header.num_records
            );
            return Err(self.discard_stale(state));
        }

        let original = state.header.clone();
        let today = LastUpdate::from_date(Local::now().date_naive());

        if let Err((step, source)) = write_record(state.file.as_mut(), &original, &buf, num_records, today) {
            warn!("Append failed at {}: {}, rolling back", step, source);
            let rollback = roll_back(state.file.as_mut(), &original);
            for failure in &rollback.failures {
                error!("Rollback of {} failed: {}", failure.step, failure.source);
            }
            return Err(DbfError::AppendFailed {
                step,
                source,
                rollback,
            });
        }

        state.header.num_records = num_records;
        state.header.last_update = today;
        info!("Appended record {}", original.num_records);
        Ok(())
    }
}

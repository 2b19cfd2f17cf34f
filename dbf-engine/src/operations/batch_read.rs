//! Parallel range reads
//!
//! A fixed set of scoped worker threads, each fed through its own bounded
//! queue. A task carries the output and error slot for one record, so
//! results land in index order without a merge step. Leaving the thread
//! scope is the completion barrier.

use std::sync::mpsc::{sync_channel, Receiver, SyncSender};
use std::thread;
use tracing::debug;

use super::table::{Table, TableState};
use crate::error::{DbfError, DbfResult};
use crate::schema::RecordSchema;
use crate::storage::charset::TextCodec;

/// Depth of each worker's task queue
const QUEUE_DEPTH: usize = 16;

/// One record to decode, with the slots its outcome goes to
struct ReadTask<'a, R> {
    index: u32,
    out: &'a mut R,
    err: &'a mut Option<DbfError>,
}

fn run_worker<R: Default>(
    tasks: Receiver<ReadTask<'_, R>>,
    state: &TableState,
    schema: &RecordSchema<R>,
    codec: &dyn TextCodec,
) {
    for task in tasks {
        match state.read_record(task.index, schema, codec) {
            Ok(record) => *task.out = record,
            Err(e) => *task.err = Some(e),
        }
    }
}

fn check_range(start: u32, end: u32, num_records: u32) -> DbfResult<()> {
    if start > end || end > num_records {
        return Err(DbfError::OutOfRange(format!(
            "range {}..{} of {} records",
            start, end, num_records
        )));
    }
    Ok(())
}

impl<R: Default + Send> Table<R> {
    /// Read records `start..end` using up to `workers` threads
    ///
    /// The result is identical for any worker count.
    pub fn get_range(&self, start: u32, end: u32, workers: usize) -> DbfResult<Vec<R>> {
        check_range(start, end, self.record_count())?;
        let mut out: Vec<R> = (start..end).map(|_| R::default()).collect();
        self.get_range_into(start, end, workers, &mut out)?;
        Ok(out)
    }

    /// Read records `start..end` into the front of `out`
    ///
    /// Every record is attempted even after one fails. On failure the error
    /// of the lowest failing index is returned and `out` holds whatever the
    /// other records decoded to.
    pub fn get_range_into(&self, start: u32, end: u32, workers: usize, out: &mut [R]) -> DbfResult<()> {
        let state = self.state.read();
        check_range(start, end, state.header.num_records)?;

        let count = (end - start) as usize;
        if out.len() < count {
            return Err(DbfError::OutOfRange(format!(
                "output holds {} records, range needs {}",
                out.len(),
                count
            )));
        }
        if count == 0 {
            return Ok(());
        }

        let workers = workers.clamp(1, count);
        debug!("Reading records {}..{} on {} workers", start, end, workers);

        let mut errors: Vec<Option<DbfError>> = (0..count).map(|_| None).collect();
        let state: &TableState = &state;
        let schema = &self.schema;
        let codec = self.codec.as_ref();

        thread::scope(|scope| {
            let mut queues: Vec<SyncSender<ReadTask<'_, R>>> = Vec::with_capacity(workers);
            for _ in 0..workers {
                let (tx, rx) = sync_channel(QUEUE_DEPTH);
                scope.spawn(move || run_worker(rx, state, schema, codec));
                queues.push(tx);
            }

            let slots = out[..count].iter_mut().zip(errors.iter_mut());
            for (i, (out, err)) in slots.enumerate() {
                let task = ReadTask {
                    index: start + i as u32,
                    out,
                    err,
                };
                // Only a panicked worker drops its receiver; the scope re-raises it
                if queues[i % workers].send(task).is_err() {
                    break;
                }
            }

            // Closing the queues lets the workers drain and exit
            drop(queues);
        });

        match errors.into_iter().flatten().next() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

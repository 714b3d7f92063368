//! Remote collection abstraction.

use crate::error::{SyncError, SyncResult};
use credsync_records::{Guid, RawRecord, Record};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

/// One downloaded batch of records.
#[derive(Debug, Clone, Default)]
pub struct FetchBatch {
    /// Records modified since the requested watermark, envelope-parsed but
    /// with payloads still unvalidated.
    pub records: Vec<RawRecord>,
    /// The collection's last-modified timestamp as of this batch, ms.
    pub last_modified: i64,
}

/// The server's answer to an upload.
#[derive(Debug, Clone, Default)]
pub struct PutResponse {
    /// Server timestamp assigned to the accepted records, ms.
    pub modified: i64,
    /// Identifiers the server accepted.
    pub succeeded: Vec<Guid>,
    /// Identifiers the server rejected.
    pub failed: Vec<Guid>,
}

/// A client for one remote record collection.
///
/// This trait abstracts the network layer (HTTP, mock for testing). Retry
/// and backoff policy belong to the implementation, never to the engine.
pub trait RecordClient {
    /// Fetches every record modified strictly after `watermark`, plus the
    /// batch's own last-modified timestamp.
    fn get_since(&self, watermark: i64) -> SyncResult<FetchBatch>;

    /// Uploads a batch of records.
    fn put(&self, records: &[Record]) -> SyncResult<PutResponse>;
}

impl<C: RecordClient> RecordClient for Arc<C> {
    fn get_since(&self, watermark: i64) -> SyncResult<FetchBatch> {
        (**self).get_since(watermark)
    }

    fn put(&self, records: &[Record]) -> SyncResult<PutResponse> {
        (**self).put(records)
    }
}

/// A mock record client for testing.
///
/// Queued fetch batches are returned in order; once the queue is empty an
/// empty batch is served with `last_modified` equal to the requested
/// watermark. Uploads succeed wholesale and are recorded for inspection.
#[derive(Debug, Default)]
pub struct MockRecordClient {
    fetch_queue: Mutex<VecDeque<FetchBatch>>,
    fail_next_fetch: Mutex<Option<SyncError>>,
    fail_next_put: Mutex<Option<SyncError>>,
    server_modified: AtomicI64,
    uploads: Mutex<Vec<Vec<Record>>>,
    fetch_watermarks: Mutex<Vec<i64>>,
}

impl MockRecordClient {
    /// Creates a new mock client.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a batch to be returned by the next `get_since` call.
    pub fn queue_fetch(&self, batch: FetchBatch) {
        self.fetch_queue.lock().unwrap().push_back(batch);
    }

    /// Makes the next `get_since` call fail with the given error.
    pub fn fail_next_fetch(&self, error: SyncError) {
        *self.fail_next_fetch.lock().unwrap() = Some(error);
    }

    /// Makes the next `put` call fail with the given error.
    pub fn fail_next_put(&self, error: SyncError) {
        *self.fail_next_put.lock().unwrap() = Some(error);
    }

    /// Sets the server timestamp stamped onto accepted uploads.
    pub fn set_server_modified(&self, modified: i64) {
        self.server_modified.store(modified, Ordering::SeqCst);
    }

    /// Every batch uploaded so far.
    pub fn uploads(&self) -> Vec<Vec<Record>> {
        self.uploads.lock().unwrap().clone()
    }

    /// The watermarks passed to `get_since`, in call order.
    pub fn fetch_watermarks(&self) -> Vec<i64> {
        self.fetch_watermarks.lock().unwrap().clone()
    }
}

impl RecordClient for MockRecordClient {
    fn get_since(&self, watermark: i64) -> SyncResult<FetchBatch> {
        self.fetch_watermarks.lock().unwrap().push(watermark);
        if let Some(error) = self.fail_next_fetch.lock().unwrap().take() {
            return Err(error);
        }
        Ok(self
            .fetch_queue
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(FetchBatch {
                records: Vec::new(),
                last_modified: watermark,
            }))
    }

    fn put(&self, records: &[Record]) -> SyncResult<PutResponse> {
        if let Some(error) = self.fail_next_put.lock().unwrap().take() {
            return Err(error);
        }
        self.uploads.lock().unwrap().push(records.to_vec());
        Ok(PutResponse {
            modified: self.server_modified.load(Ordering::SeqCst),
            succeeded: records.iter().map(|r| r.guid.clone()).collect(),
            failed: Vec::new(),
        })
    }
}

//! Durable destinations for accepted records. The poll loop only sees the
//! [`RecordSink`] trait; [`FileLogSink`] is the newline-delimited file
//! implementation that bounds its own size through [`RecordSink::trim`].

pub mod file;

use crate::content::Record;
use futures::future::BoxFuture;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

pub use file::FileLogSink;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open sink {path}: {source}")]
    Open {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write sink {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to read sink {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("record contains a line break and cannot be stored as a single line")]
    MultiLineRecord,
}

pub trait RecordSink: Send + Sync {
    /// Persists one record. The underlying resource is released before returning.
    fn append<'a>(&'a self, record: &'a str) -> BoxFuture<'a, Result<(), SinkError>>;

    /// Drops the oldest records so at most `max_records` remain. Returns the
    /// number of records removed.
    fn trim(&self, max_records: usize) -> BoxFuture<'_, Result<usize, SinkError>>;

    /// Returns up to `limit` of the most recently appended records, oldest first.
    fn recent(&self, limit: usize) -> BoxFuture<'_, Result<Vec<Record>, SinkError>>;
}

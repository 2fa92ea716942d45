use std::io;
use std::time::Duration;

use thiserror::Error;

/// Failures reported by an [`OutputSink`](crate::OutputSink).
#[derive(Debug, Error)]
pub enum SinkError {
    /// The client went away. Streaming stops quietly on this one.
    #[error("output channel is closed")]
    Closed,
    #[error("headers have already been sent")]
    HeadersSent,
    #[error("write did not complete within {0:?}")]
    TimedOut(Duration),
    #[error("output failed: {0}")]
    Io(#[from] io::Error),
}

impl SinkError {
    pub fn is_closed(&self) -> bool {
        matches!(self, SinkError::Closed)
    }
}

#[derive(Debug, Error)]
pub enum DownloadError {
    /// Nothing was bound with [`Downloader::with_resource`](crate::Downloader::with_resource).
    /// Returned before any output is produced.
    #[error("no resource bound to the download")]
    MissingResource,
    #[error("failed to read {length} bytes at offset {offset}: {source}")]
    Read {
        offset: u64,
        length: u64,
        #[source]
        source: io::Error,
    },
    #[error("read at offset {offset} exceeded the {limit:?} time limit")]
    ReadTimedOut { offset: u64, limit: Duration },
    #[error(transparent)]
    Sink(#[from] SinkError),
}

pub type DownloadResult<T> = Result<T, DownloadError>;

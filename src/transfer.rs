//! The body streaming loop.

use std::time::Duration;

use bytes::Bytes;

use crate::multipart;
use crate::throttle::Throttle;
use crate::{DownloadError, DownloadOptions, DownloadResult, OutputSink, Resource, SinkError, TransferPlan};

/// How far a transfer got.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub(crate) struct Streamed {
    pub(crate) bytes_written: u64,
    /// The client closed the channel before everything was written.
    pub(crate) aborted: bool,
}

impl Streamed {
    /// Writes all of `data`, resubmitting whatever a short write left over.
    /// `Ok(false)` once the channel is closed.
    async fn write<S: OutputSink>(&mut self, sink: &mut S, mut data: Bytes) -> DownloadResult<bool> {
        while !data.is_empty() {
            match sink.write(data.clone()).await {
                // nothing accepted for a non-empty write
                Ok(0) | Err(SinkError::Closed) => {
                    self.abort();
                    return Ok(false);
                }
                Ok(written) => {
                    let written = written.min(data.len());
                    self.bytes_written += written as u64;
                    data = data.slice(written..);
                }
                Err(err) => return Err(err.into()),
            }
        }
        Ok(true)
    }

    async fn flush<S: OutputSink>(&mut self, sink: &mut S) -> DownloadResult<bool> {
        match sink.flush().await {
            Ok(()) => Ok(true),
            Err(SinkError::Closed) => {
                self.abort();
                Ok(false)
            }
            Err(err) => Err(err.into()),
        }
    }

    fn abort(&mut self) {
        tracing::debug!(bytes_written = self.bytes_written, "output closed, stopping transfer");
        self.aborted = true;
    }
}

/// Streams the bytes selected by `plan` from `resource` into `sink`.
///
/// Stops early, without an error, when the sink reports the channel closed or
/// the resource runs out of data.
pub(crate) async fn send<R, S>(
    resource: &mut R,
    sink: &mut S,
    plan: &TransferPlan,
    options: &DownloadOptions,
) -> DownloadResult<Streamed>
where
    R: Resource + ?Sized,
    S: OutputSink,
{
    let previous_limit = sink.time_limit();
    let result = stream_ranges(resource, sink, plan, options).await;
    if options.restore_previous_time_limit {
        sink.set_time_limit(previous_limit);
    }
    result
}

async fn stream_ranges<R, S>(
    resource: &mut R,
    sink: &mut S,
    plan: &TransferPlan,
    options: &DownloadOptions,
) -> DownloadResult<Streamed>
where
    R: Resource + ?Sized,
    S: OutputSink,
{
    let mut streamed = Streamed::default();
    let mut throttle = Throttle::new(options.max_bytes_per_second);
    let read_limit = options.read_time_limit();
    let chunk_len = resource.chunk_len();

    for range in plan.transfer_ranges() {
        if let Some(boundary) = plan.boundary() {
            let framing = multipart::part_header(boundary, plan.mime(), &range, plan.size());
            if !streamed.write(sink, Bytes::from(framing)).await? {
                return Ok(streamed);
            }
        }

        let mut offset = range.start();
        let mut remaining = range.len();

        while remaining > 0 {
            if sink.is_closed() {
                streamed.abort();
                return Ok(streamed);
            }

            let want = throttle.chunk_len(remaining, chunk_len);
            let data = read_chunk(resource, sink, offset, want, read_limit).await?;
            let Some(mut data) = data.filter(|data| !data.is_empty()) else {
                tracing::debug!(offset, remaining, "resource returned no data, ending transfer");
                return Ok(streamed);
            };
            if data.len() as u64 > remaining {
                // `remaining` is below `data.len()`, so it fits in usize
                data.truncate(remaining as usize);
            }

            let read = data.len() as u64;
            tracing::trace!(offset, read, remaining, "sending chunk");

            if !streamed.write(sink, data).await? {
                return Ok(streamed);
            }
            offset += read;
            remaining -= read;

            if throttle.is_enabled() {
                if !streamed.flush(sink).await? {
                    return Ok(streamed);
                }
                throttle.pace(read).await;
            }
        }
    }

    if let Some(boundary) = plan.boundary() {
        streamed.write(sink, Bytes::from(multipart::closing_delimiter(boundary))).await?;
    }

    Ok(streamed)
}

/// One bounded read. The time limit, when set, is re-armed on the sink and
/// enforced on this read alone.
async fn read_chunk<R, S>(
    resource: &mut R,
    sink: &mut S,
    offset: u64,
    length: u64,
    limit: Option<Duration>,
) -> DownloadResult<Option<Bytes>>
where
    R: Resource + ?Sized,
    S: OutputSink,
{
    let read = resource.read_bytes(offset, length);
    let result = match limit {
        Some(limit) => {
            sink.set_time_limit(Some(limit));
            tokio::time::timeout(limit, read)
                .await
                .map_err(|_| DownloadError::ReadTimedOut { offset, limit })?
        }
        None => read.await,
    };

    result.map_err(|source| {
        tracing::warn!(offset, length, %source, "resource read failed");
        DownloadError::Read { offset, length, source }
    })
}

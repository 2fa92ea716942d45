use std::time::Duration;

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use bytes::{Bytes, BytesMut};

use crate::SinkError;

/// Where a download writes its response.
///
/// Status and headers are set first. They are committed no later than the
/// first `write`, `flush` or `end`, after which `add_header` fails with
/// [`SinkError::HeadersSent`].
#[async_trait]
pub trait OutputSink: Send {
    fn set_status(&mut self, status: StatusCode) -> Result<(), SinkError>;

    fn add_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), SinkError>;

    /// Writes body bytes, returning how many were accepted. Fails with
    /// [`SinkError::Closed`] once the client is gone.
    ///
    /// A short write is allowed: the download resubmits the remaining bytes.
    /// Accepting nothing of a non-empty write counts as closed.
    async fn write(&mut self, data: Bytes) -> Result<usize, SinkError>;

    async fn flush(&mut self) -> Result<(), SinkError>;

    /// Finishes the response. Nothing may be written afterwards.
    async fn end(&mut self);

    fn is_closed(&self) -> bool;

    /// Time limit the surrounding runtime currently enforces on this response.
    fn time_limit(&self) -> Option<Duration> {
        None
    }

    /// Re-arms the surrounding runtime's time limit.
    fn set_time_limit(&mut self, _limit: Option<Duration>) {}
}

/// [`OutputSink`] collecting the whole response in memory.
#[derive(Debug, Default)]
pub struct BufferSink {
    status: Option<StatusCode>,
    headers: HeaderMap,
    body: BytesMut,
    headers_sent: bool,
    ended: bool,
    flushes: usize,
    close_after: Option<u64>,
    time_limit: Option<Duration>,
    time_limit_updates: Vec<Option<Duration>>,
}

impl BufferSink {
    pub fn new() -> Self {
        BufferSink::default()
    }

    /// Reports the channel closed once `limit` body bytes have been accepted,
    /// like a client hanging up mid transfer.
    pub fn closing_after(limit: u64) -> Self {
        BufferSink { close_after: Some(limit), ..BufferSink::default() }
    }

    /// Starts out with a time limit already armed.
    pub fn with_time_limit(mut self, limit: Duration) -> Self {
        self.time_limit = Some(limit);
        self
    }

    pub fn status(&self) -> Option<StatusCode> {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value as text, `None` when missing or not visible ASCII.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub fn body(&self) -> &[u8] {
        &self.body
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    pub fn flushes(&self) -> usize {
        self.flushes
    }

    pub fn time_limit_updates(&self) -> &[Option<Duration>] {
        &self.time_limit_updates
    }

    fn commit(&mut self) {
        self.headers_sent = true;
    }
}

#[async_trait]
impl OutputSink for BufferSink {
    fn set_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        if self.headers_sent {
            return Err(SinkError::HeadersSent);
        }
        self.status = Some(status);
        Ok(())
    }

    fn add_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), SinkError> {
        if self.headers_sent {
            return Err(SinkError::HeadersSent);
        }
        self.headers.append(name, value);
        Ok(())
    }

    async fn write(&mut self, data: Bytes) -> Result<usize, SinkError> {
        self.commit();
        if self.is_closed() {
            return Err(SinkError::Closed);
        }

        let accepted = match self.close_after {
            Some(limit) => {
                let room = limit.saturating_sub(self.body.len() as u64);
                usize::try_from(room).unwrap_or(usize::MAX).min(data.len())
            }
            None => data.len(),
        };
        self.body.extend_from_slice(&data[..accepted]);

        if accepted < data.len() {
            return Err(SinkError::Closed);
        }
        Ok(accepted)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.commit();
        self.flushes += 1;
        Ok(())
    }

    async fn end(&mut self) {
        self.commit();
        self.ended = true;
    }

    fn is_closed(&self) -> bool {
        self.ended || matches!(self.close_after, Some(limit) if self.body.len() as u64 >= limit)
    }

    fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn set_time_limit(&mut self, limit: Option<Duration>) {
        self.time_limit = limit;
        self.time_limit_updates.push(limit);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::header;

    #[tokio::test]
    async fn test_headers_locked_after_write() {
        let mut sink = BufferSink::new();
        sink.set_status(StatusCode::OK).unwrap();
        sink.add_header(header::CONTENT_LENGTH, HeaderValue::from_static("5")).unwrap();
        assert_eq!(5, sink.write(Bytes::from_static(b"hello")).await.unwrap());

        assert!(sink.add_header(header::ETAG, HeaderValue::from_static("\"x\"")).is_err());
        assert!(sink.set_status(StatusCode::NOT_FOUND).is_err());
        assert_eq!(Some("5"), sink.header("content-length"));
        assert_eq!(b"hello", sink.body());
    }

    #[tokio::test]
    async fn test_closing_after() {
        let mut sink = BufferSink::closing_after(4);
        assert_eq!(3, sink.write(Bytes::from_static(b"abc")).await.unwrap());
        assert!(!sink.is_closed());

        let err = sink.write(Bytes::from_static(b"def")).await.unwrap_err();
        assert!(err.is_closed());
        assert!(sink.is_closed());
        assert_eq!(b"abcd", sink.body());
    }

    #[tokio::test]
    async fn test_end_closes() {
        let mut sink = BufferSink::new();
        sink.end().await;
        assert!(sink.is_ended());
        assert!(sink.write(Bytes::from_static(b"late")).await.unwrap_err().is_closed());
    }
}

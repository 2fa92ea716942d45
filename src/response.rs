use std::mem;
use std::time::Duration;

use async_trait::async_trait;
use axum::http::header::CONTENT_LENGTH;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use tokio::sync::{mpsc, oneshot};

use crate::{DownloadRequest, Downloader, OutputSink, Resource, SinkError, TransferBody};

/// Chunks buffered between a running download and the response body.
const CHANNEL_CAPACITY: usize = 4;

type Head = (StatusCode, HeaderMap);

/// [`OutputSink`] that hands its output to an axum response.
///
/// Status and headers are collected until the first write, flush or end and
/// then sent as one unit. Body chunks travel over a bounded channel to the
/// paired [`TransferBody`], so a slow client applies backpressure to the
/// transfer and a gone client shows up as [`SinkError::Closed`].
///
/// The time limit bounds each body write.
#[derive(Debug)]
pub struct ChannelSink {
    status: StatusCode,
    headers: HeaderMap,
    head: Option<oneshot::Sender<Head>>,
    body: Option<mpsc::Sender<Bytes>>,
    time_limit: Option<Duration>,
}

impl ChannelSink {
    /// Returns the sink, a receiver resolving once the head is committed, and
    /// the body fed by the sink.
    pub fn new(capacity: usize) -> (ChannelSink, oneshot::Receiver<Head>, TransferBody) {
        let (head_tx, head_rx) = oneshot::channel();
        let (body_tx, body_rx) = mpsc::channel(capacity.max(1));
        let sink = ChannelSink {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            head: Some(head_tx),
            body: Some(body_tx),
            time_limit: None,
        };
        (sink, head_rx, TransferBody::new(body_rx))
    }

    fn commit(&mut self) {
        if let Some(head) = self.head.take() {
            let headers = mem::take(&mut self.headers);
            if head.send((self.status, headers)).is_err() {
                tracing::debug!("response dropped before headers were sent");
                self.body = None;
            }
        }
    }
}

#[async_trait]
impl OutputSink for ChannelSink {
    fn set_status(&mut self, status: StatusCode) -> Result<(), SinkError> {
        if self.head.is_none() {
            return Err(SinkError::HeadersSent);
        }
        self.status = status;
        Ok(())
    }

    fn add_header(&mut self, name: HeaderName, value: HeaderValue) -> Result<(), SinkError> {
        if self.head.is_none() {
            return Err(SinkError::HeadersSent);
        }
        self.headers.append(name, value);
        Ok(())
    }

    async fn write(&mut self, data: Bytes) -> Result<usize, SinkError> {
        self.commit();
        let Some(tx) = self.body.as_ref() else {
            return Err(SinkError::Closed);
        };
        let len = data.len();
        if len == 0 {
            return Ok(0);
        }

        let sent = match self.time_limit {
            Some(limit) => tokio::time::timeout(limit, tx.send(data))
                .await
                .map_err(|_| SinkError::TimedOut(limit))?,
            None => tx.send(data).await,
        };
        if sent.is_err() {
            self.body = None;
            return Err(SinkError::Closed);
        }
        Ok(len)
    }

    async fn flush(&mut self) -> Result<(), SinkError> {
        self.commit();
        if self.is_closed() {
            return Err(SinkError::Closed);
        }
        Ok(())
    }

    async fn end(&mut self) {
        self.commit();
        self.body = None;
    }

    fn is_closed(&self) -> bool {
        self.body.as_ref().map_or(true, mpsc::Sender::is_closed)
    }

    fn time_limit(&self) -> Option<Duration> {
        self.time_limit
    }

    fn set_time_limit(&mut self, limit: Option<Duration>) {
        self.time_limit = limit;
    }
}

impl<R: Resource + 'static> Downloader<R> {
    /// Answers `request` with an axum [`Response`] whose body is streamed by
    /// a spawned task.
    ///
    /// Failures after the headers went out end the body early. Failures
    /// before that, such as a missing resource, produce a bare 500.
    pub async fn respond(mut self, request: DownloadRequest) -> Response {
        let (mut sink, head, body) = ChannelSink::new(CHANNEL_CAPACITY);
        let wants_body = request.wants_body();

        tokio::spawn(async move {
            if let Err(err) = self.download(&request, &mut sink).await {
                tracing::warn!(%err, "download failed");
            }
        });

        let Ok((status, headers)) = head.await else {
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        };

        let length = headers
            .get(CONTENT_LENGTH)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.parse::<u64>().ok());
        let body = match length {
            Some(length) if wants_body => body.with_length(length),
            _ => body,
        };

        let mut response = body.into_response();
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}

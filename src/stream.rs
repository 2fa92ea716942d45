use std::io;
use std::pin::Pin;
use std::task::{Context, Poll};

use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use futures::Stream;
use http_body::{Body, Frame, SizeHint};
use tokio::sync::mpsc;

/// Response body fed by a running download. Implements [`Stream`], [`Body`],
/// and [`IntoResponse`].
///
/// Ends when the producing [`ChannelSink`](crate::ChannelSink) is ended or
/// dropped. Dropping the body is how the producer learns the client left.
#[derive(Debug)]
pub struct TransferBody {
    rx: mpsc::Receiver<Bytes>,
    remaining: Option<u64>,
}

impl TransferBody {
    pub(crate) fn new(rx: mpsc::Receiver<Bytes>) -> Self {
        TransferBody { rx, remaining: None }
    }

    /// Announces the exact body length to the server through the size hint.
    pub(crate) fn with_length(mut self, length: u64) -> Self {
        self.remaining = Some(length);
        self
    }
}

impl IntoResponse for TransferBody {
    fn into_response(self) -> Response {
        Response::new(axum::body::Body::new(self))
    }
}

impl Body for TransferBody {
    type Data = Bytes;
    type Error = io::Error;

    fn size_hint(&self) -> SizeHint {
        match self.remaining {
            Some(remaining) => SizeHint::with_exact(remaining),
            None => SizeHint::default(),
        }
    }

    fn poll_frame(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Frame<Bytes>>>> {
        self.poll_next(cx).map(|item| item.map(|result| result.map(Frame::data)))
    }
}

impl Stream for TransferBody {
    type Item = io::Result<Bytes>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<io::Result<Bytes>>> {
        let this = self.get_mut();
        match this.rx.poll_recv(cx) {
            Poll::Ready(Some(chunk)) => {
                if let Some(remaining) = this.remaining.as_mut() {
                    *remaining = remaining.saturating_sub(chunk.len() as u64);
                }
                Poll::Ready(Some(Ok(chunk)))
            }
            Poll::Ready(None) => match this.remaining {
                // the producer stopped short of what the headers promised
                Some(remaining) if remaining > 0 => {
                    this.remaining = Some(0);
                    Poll::Ready(Some(Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        format!("download ended {remaining} bytes short"),
                    ))))
                }
                _ => Poll::Ready(None),
            },
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn test_yields_chunks_until_sender_dropped() {
        let (tx, rx) = mpsc::channel(4);
        let mut body = TransferBody::new(rx);

        tx.send(Bytes::from_static(b"Hello ")).await.unwrap();
        tx.send(Bytes::from_static(b"world")).await.unwrap();
        drop(tx);

        let mut collected = Vec::new();
        while let Some(chunk) = body.next().await.transpose().unwrap() {
            collected.extend_from_slice(&chunk);
        }
        assert_eq!(b"Hello world", &collected[..]);
    }

    #[tokio::test]
    async fn test_short_body_is_an_error() {
        let (tx, rx) = mpsc::channel(4);
        let mut body = TransferBody::new(rx).with_length(10);
        assert_eq!(Some(10), Body::size_hint(&body).exact());

        tx.send(Bytes::from_static(b"abc")).await.unwrap();
        drop(tx);

        assert_eq!(&b"abc"[..], &body.next().await.unwrap().unwrap()[..]);
        assert_eq!(Some(7), Body::size_hint(&body).exact());
        let err = body.next().await.unwrap().unwrap_err();
        assert_eq!(io::ErrorKind::UnexpectedEof, err.kind());
        assert!(body.next().await.is_none());
    }

    #[tokio::test]
    async fn test_dropping_body_closes_channel() {
        let (tx, rx) = mpsc::channel(1);
        drop(TransferBody::new(rx));
        assert!(tx.send(Bytes::from_static(b"late")).await.is_err());
    }
}

//! # axum-download
//!
//! Range-aware, throttled file downloads for [`axum`][1].
//!
//! A [`Downloader`] answers a request for one [`Resource`]. It resolves the
//! `Range`, `If-Modified-Since` and `If-None-Match` headers into a
//! [`TransferPlan`], emits status and headers, and then streams the selected
//! bytes into an [`OutputSink`]. Multiple ranges are served as
//! `multipart/byteranges`, and output can be capped to a byte rate.
//!
//! Any type implementing both [`AsyncRead`] and [`AsyncSeek`] can be used
//! through the [`KnownSize`] adapter struct. There is also special cased
//! support for [`tokio::fs::File`], see the [`KnownSize::file`] method.
//!
//! ```
//! use axum::Router;
//! use axum::http::{HeaderMap, Method};
//! use axum::response::Response;
//! use axum::routing::get;
//!
//! use axum_download::{DownloadOptions, DownloadRequest, Downloader, KnownSize};
//!
//! async fn file(method: Method, headers: HeaderMap) -> Response {
//!     let body = KnownSize::file("document.txt").await.unwrap();
//!     let options = DownloadOptions {
//!         file_name: Some("document.txt".to_string()),
//!         max_bytes_per_second: 64 * 1024,
//!         ..DownloadOptions::default()
//!     };
//!     Downloader::new(options)
//!         .with_resource(body)
//!         .respond(DownloadRequest::from_headers(&method, &headers))
//!         .await
//! }
//!
//! #[tokio::main]
//! async fn main() {
//!     // build our application with a single route
//!     let _app = Router::<()>::new().route("/", get(file));
//!
//!     // run it on localhost:3000
//!     #[cfg(feature = "run_server_in_example")]
//!     {
//!         let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await.unwrap();
//!         axum::serve(listener, _app).await.unwrap();
//!     }
//! }
//! ```
//!
//! [`AsyncRead`]: tokio::io::AsyncRead
//! [`AsyncSeek`]: tokio::io::AsyncSeek
//! [1]: https://docs.rs/axum

mod download;
mod error;
mod file;
mod headers;
mod multipart;
mod options;
mod plan;
mod range;
mod request;
mod response;
mod sink;
mod stream;
mod throttle;
mod transfer;

use std::io;
use std::time::SystemTime;

use async_trait::async_trait;
use bytes::Bytes;

pub use download::{Downloader, TransferReport};
pub use error::{DownloadError, DownloadResult, SinkError};
pub use file::{KnownSize, MemoryResource};
pub use multipart::extract_boundary;
pub use options::{CacheMode, Disposition, DownloadOptions};
pub use plan::{Classification, TransferPlan};
pub use range::{ByteRange, RangeDefaults, RangeError, RangeSet};
pub use request::DownloadRequest;
pub use response::ChannelSink;
pub use sink::{BufferSink, OutputSink};
pub use stream::TransferBody;

/// Read size used when a resource does not pick its own.
pub const DEFAULT_CHUNK_LEN: u64 = 64 * 1024;

/// Something with a fixed byte size that can be read at arbitrary offsets.
#[async_trait]
pub trait Resource: Send {
    /// The total size of the underlying data.
    ///
    /// This should not change for the lifetime of the object once queried.
    /// Behaviour is not guaranteed if it does change.
    fn byte_size(&self) -> u64;

    fn mime(&self) -> &str;

    fn last_modified(&self) -> Option<SystemTime> {
        None
    }

    /// Opaque validator, quoted or not.
    fn entity_tag(&self) -> Option<&str> {
        None
    }

    /// How much to read per iteration when output is not throttled.
    fn chunk_len(&self) -> u64 {
        DEFAULT_CHUNK_LEN
    }

    /// Reads up to `length` bytes at `offset`. `None`, or an empty chunk,
    /// means no data is available there and ends the transfer.
    async fn read_bytes(&mut self, offset: u64, length: u64) -> io::Result<Option<Bytes>>;
}

/// Snapshot of the [`Resource`] properties that end up in headers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceMetadata {
    pub size: u64,
    pub mime: String,
    pub last_modified: Option<SystemTime>,
    pub entity_tag: Option<String>,
}

impl ResourceMetadata {
    pub fn of<R: Resource + ?Sized>(resource: &R) -> Self {
        ResourceMetadata {
            size: resource.byte_size(),
            mime: resource.mime().to_owned(),
            last_modified: resource.last_modified(),
            entity_tag: resource.entity_tag().map(str::to_owned),
        }
    }
}

use std::iter;
use std::time::SystemTime;

use axum::http::{HeaderValue, StatusCode};
use axum_extra::headers::{ETag, Header, IfModifiedSince, IfNoneMatch};

use crate::headers::{quoted_entity_tag, response_headers};
use crate::{
    multipart, transfer, Classification, DownloadError, DownloadOptions, DownloadRequest, DownloadResult,
    OutputSink, RangeDefaults, RangeError, RangeSet, Resource, ResourceMetadata, TransferPlan,
};

/// Outcome of a finished download.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TransferReport {
    pub classification: Classification,
    pub status: StatusCode,
    /// Body bytes accepted by the sink, multipart framing included.
    pub bytes_written: u64,
    /// The client went away before the body was complete.
    pub aborted: bool,
}

/// Serves one [`Resource`] with range, conditional and throttling support.
///
/// A downloader holds configuration only. Everything decided for a single
/// request lives in the [`TransferPlan`] built for it, so one downloader can
/// answer any number of requests in turn.
///
/// ```
/// use axum_download::{BufferSink, DownloadOptions, DownloadRequest, Downloader, MemoryResource};
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let resource = MemoryResource::new("one two three four").with_mime("text/plain");
/// let mut downloader = Downloader::new(DownloadOptions::default()).with_resource(resource);
///
/// let mut sink = BufferSink::new();
/// let request = DownloadRequest::get().with_range("bytes=8-12");
/// let report = downloader.download(&request, &mut sink).await.unwrap();
///
/// assert_eq!(206, report.status.as_u16());
/// assert_eq!(Some("bytes 8-12/18"), sink.header("content-range"));
/// assert_eq!(b"three", sink.body());
/// # }
/// ```
#[derive(Debug)]
pub struct Downloader<R> {
    options: DownloadOptions,
    resource: Option<R>,
}

impl<R: Resource> Downloader<R> {
    pub fn new(options: DownloadOptions) -> Self {
        Downloader { options, resource: None }
    }

    pub fn with_resource(mut self, resource: R) -> Self {
        self.resource = Some(resource);
        self
    }

    pub fn set_resource(&mut self, resource: R) {
        self.resource = Some(resource);
    }

    pub fn resource(&self) -> Option<&R> {
        self.resource.as_ref()
    }

    pub fn options(&self) -> &DownloadOptions {
        &self.options
    }

    pub fn options_mut(&mut self) -> &mut DownloadOptions {
        &mut self.options
    }

    /// Decides how `request` is answered without producing any output.
    pub fn plan(&self, request: &DownloadRequest) -> DownloadResult<TransferPlan> {
        let resource = self.resource.as_ref().ok_or(DownloadError::MissingResource)?;
        Ok(classify(resource, request, &self.options))
    }

    /// Answers `request` through `sink`: status, headers and, for GET
    /// requests that resolve to content, the body.
    ///
    /// The sink is always ended once headers went out, also when streaming
    /// fails. A client hanging up is not an error, see
    /// [`TransferReport::aborted`].
    pub async fn download<S: OutputSink>(
        &mut self,
        request: &DownloadRequest,
        sink: &mut S,
    ) -> DownloadResult<TransferReport> {
        self.run(request, sink, request.wants_body()).await
    }

    /// Like [`Downloader::download`] but never sends a body, for HEAD.
    pub async fn headers<S: OutputSink>(
        &mut self,
        request: &DownloadRequest,
        sink: &mut S,
    ) -> DownloadResult<TransferReport> {
        self.run(request, sink, false).await
    }

    async fn run<S: OutputSink>(
        &mut self,
        request: &DownloadRequest,
        sink: &mut S,
        with_body: bool,
    ) -> DownloadResult<TransferReport> {
        let resource = self.resource.as_mut().ok_or(DownloadError::MissingResource)?;

        let plan = classify(&*resource, request, &self.options);
        let meta = ResourceMetadata::of(&*resource);
        let mut report = TransferReport {
            classification: plan.classification(),
            status: plan.status(),
            bytes_written: 0,
            aborted: false,
        };

        sink.set_status(plan.status())?;
        for (name, value) in response_headers(&plan, &meta, &self.options).iter() {
            sink.add_header(name.clone(), value.clone())?;
        }

        if !with_body || !plan.classification().has_body() {
            sink.end().await;
            return Ok(report);
        }

        let result = transfer::send(resource, sink, &plan, &self.options).await;
        sink.end().await;

        let streamed = result?;
        report.bytes_written = streamed.bytes_written;
        report.aborted = streamed.aborted;
        tracing::debug!(
            status = report.status.as_u16(),
            bytes_written = report.bytes_written,
            aborted = report.aborted,
            "download finished"
        );
        Ok(report)
    }
}

fn classify<R: Resource + ?Sized>(resource: &R, request: &DownloadRequest, options: &DownloadOptions) -> TransferPlan {
    let size = resource.byte_size();
    let mime = resource.mime();

    let ranges = match request.range.as_deref() {
        Some(header) if options.byte_ranges => match requested_ranges(header, size) {
            Ok(ranges) => ranges,
            Err(err) => {
                tracing::debug!(header, %err, "range not satisfiable");
                return TransferPlan::without_ranges(Classification::RangeNotSatisfiable, size, mime);
            }
        },
        _ => None,
    };

    if is_not_modified(resource, request) {
        tracing::debug!("resource not modified");
        return TransferPlan::without_ranges(Classification::NotModified, size, mime);
    }

    let plan = match ranges {
        None => TransferPlan::full(size, mime),
        Some(ranges) if ranges.covers(size) => TransferPlan::full(size, mime),
        Some(ranges) if ranges.len() == 1 => TransferPlan::single(ranges, size, mime),
        Some(ranges) if !options.multipart => {
            tracing::debug!(count = ranges.len(), "multiple ranges requested with multipart responses disabled");
            TransferPlan::without_ranges(Classification::Unsupported, size, mime)
        }
        Some(ranges) => {
            let boundary = options
                .boundary
                .clone()
                .unwrap_or_else(|| multipart::generate_boundary(options.file_name.as_deref(), size));
            TransferPlan::multi(ranges, boundary, size, mime)
        }
    };
    tracing::debug!(classification = ?plan.classification(), ranges = plan.ranges().len(), "classified request");
    plan
}

fn requested_ranges(header: &str, size: u64) -> Result<Option<RangeSet>, RangeError> {
    let ranges = RangeSet::parse(header, RangeDefaults::for_size(size))?;
    if let Some(ranges) = &ranges {
        ranges.check_bounds(size)?;
    }
    Ok(ranges)
}

fn is_not_modified<R: Resource + ?Sized>(resource: &R, request: &DownloadRequest) -> bool {
    // If-None-Match takes precedence whenever it can be evaluated
    if let (Some(header), Some(tag)) = (request.if_none_match.as_deref(), resource.entity_tag()) {
        let if_none_match = decode::<IfNoneMatch>(header);
        let etag = quoted_entity_tag(tag).parse::<ETag>().ok();
        if let (Some(if_none_match), Some(etag)) = (if_none_match, etag) {
            return !if_none_match.precondition_passes(&etag);
        }
    }

    let (Some(header), Some(last_modified)) = (request.if_modified_since.as_deref(), resource.last_modified()) else {
        return false;
    };
    let Some(since) = decode::<IfModifiedSince>(header) else {
        return false;
    };
    if SystemTime::from(since.clone()) > SystemTime::now() {
        tracing::debug!(header, "ignoring If-Modified-Since in the future");
        return false;
    }
    !since.is_modified(last_modified)
}

fn decode<H: Header>(text: &str) -> Option<H> {
    let value = HeaderValue::from_str(text).ok()?;
    H::decode(&mut iter::once(&value)).ok()
}
